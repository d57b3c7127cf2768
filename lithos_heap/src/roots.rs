//! Stable roots.
//!
//! A small, fixed set of singletons that every process creates identically
//! during bootstrap. A value found in this table can be referred to by its
//! [`RootIndex`] alone.

/// Index into the root table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum RootIndex {
    Undefined = 0,
    TheHole = 1,
    Null = 2,
    True = 3,
    False = 4,
    Uninitialized = 5,
    Exception = 6,
    EmptyString = 7,
    EmptyFixedArray = 8,
    EmptyDoubleArray = 9,
    NanValue = 10,
    /// Root shape of plain objects (`{}`).
    ObjectShape = 11,
    /// Root shape of closures.
    FunctionShape = 12,
    IteratorSymbol = 13,
    ToPrimitiveSymbol = 14,
    /// Private symbol keying elements-kind transitions.
    ElementsTransitionSymbol = 15,
    /// Private symbol keying freeze transitions.
    FrozenSymbol = 16,
    /// Private symbol keying observe transitions.
    ObservedSymbol = 17,
}

impl RootIndex {
    /// Number of roots.
    pub const COUNT: usize = 18;

    /// Wire value meaning "not a root".
    pub const NOT_FOUND: u16 = u16::MAX;

    /// Every root, in table order.
    pub const ALL: [RootIndex; Self::COUNT] = [
        RootIndex::Undefined,
        RootIndex::TheHole,
        RootIndex::Null,
        RootIndex::True,
        RootIndex::False,
        RootIndex::Uninitialized,
        RootIndex::Exception,
        RootIndex::EmptyString,
        RootIndex::EmptyFixedArray,
        RootIndex::EmptyDoubleArray,
        RootIndex::NanValue,
        RootIndex::ObjectShape,
        RootIndex::FunctionShape,
        RootIndex::IteratorSymbol,
        RootIndex::ToPrimitiveSymbol,
        RootIndex::ElementsTransitionSymbol,
        RootIndex::FrozenSymbol,
        RootIndex::ObservedSymbol,
    ];

    /// Decode a wire value.
    pub fn from_u16(value: u16) -> Option<Self> {
        Self::ALL.get(value as usize).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_order_matches_discriminants() {
        for (i, root) in RootIndex::ALL.iter().enumerate() {
            assert_eq!(*root as usize, i);
        }
        assert!(RootIndex::from_u16(RootIndex::NOT_FOUND).is_none());
    }
}
