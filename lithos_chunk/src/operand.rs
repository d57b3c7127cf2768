//! Instruction operands.
//!
//! An operand is a location kind plus an index, packed into one `u32`:
//!
//! ```text
//!   31                              3 2     0
//!   ┌────────────────────────────────┬───────┐
//!   │ index                          │ kind  │
//!   └────────────────────────────────┴───────┘
//! ```
//!
//! Constant operands index the chunk's constant pool by value id.

use std::fmt;

/// Location kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OperandKind {
    Unallocated = 0,
    Constant = 1,
    StackSlot = 2,
    DoubleStackSlot = 3,
    Register = 4,
    DoubleRegister = 5,
}

impl OperandKind {
    pub const fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0 => OperandKind::Unallocated,
            1 => OperandKind::Constant,
            2 => OperandKind::StackSlot,
            3 => OperandKind::DoubleStackSlot,
            4 => OperandKind::Register,
            5 => OperandKind::DoubleRegister,
            _ => return None,
        })
    }
}

/// A location an instruction reads or writes.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Operand(u32);

impl Operand {
    const KIND_BITS: u32 = 3;
    const KIND_MASK: u32 = (1 << Self::KIND_BITS) - 1;

    /// Largest encodable index.
    pub const MAX_INDEX: u32 = u32::MAX >> Self::KIND_BITS;

    #[inline]
    pub const fn new(kind: OperandKind, index: u32) -> Self {
        debug_assert!(index <= Self::MAX_INDEX);
        Operand((index << Self::KIND_BITS) | kind as u32)
    }

    /// Reference to constant-pool entry `id`.
    #[inline]
    pub const fn constant(id: u32) -> Self {
        Self::new(OperandKind::Constant, id)
    }

    #[inline]
    pub const fn register(code: u32) -> Self {
        Self::new(OperandKind::Register, code)
    }

    #[inline]
    pub const fn double_register(code: u32) -> Self {
        Self::new(OperandKind::DoubleRegister, code)
    }

    #[inline]
    pub const fn stack_slot(index: u32) -> Self {
        Self::new(OperandKind::StackSlot, index)
    }

    #[inline]
    pub const fn unallocated(virtual_register: u32) -> Self {
        Self::new(OperandKind::Unallocated, virtual_register)
    }

    /// Decode a packed word. `None` for an unknown kind.
    #[inline]
    pub const fn from_bits(bits: u32) -> Option<Self> {
        match OperandKind::from_u8((bits & Self::KIND_MASK) as u8) {
            Some(_) => Some(Operand(bits)),
            None => None,
        }
    }

    /// Packed word.
    #[inline]
    pub const fn bits(self) -> u32 {
        self.0
    }

    #[inline]
    pub fn kind(self) -> OperandKind {
        match OperandKind::from_u8((self.0 & Self::KIND_MASK) as u8) {
            Some(kind) => kind,
            None => unreachable!("operand constructed with an invalid kind"),
        }
    }

    #[inline]
    pub const fn index(self) -> u32 {
        self.0 >> Self::KIND_BITS
    }

    /// Constant-pool id, for constant operands.
    #[inline]
    pub fn constant_id(self) -> Option<u32> {
        (self.kind() == OperandKind::Constant).then_some(self.index())
    }
}

impl fmt::Debug for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let index = self.index();
        match self.kind() {
            OperandKind::Unallocated => write!(f, "v{}", index),
            OperandKind::Constant => write!(f, "[constant:{}]", index),
            OperandKind::StackSlot => write!(f, "[stack:{}]", index),
            OperandKind::DoubleStackSlot => write!(f, "[double_stack:{}]", index),
            OperandKind::Register => write!(f, "r{}", index),
            OperandKind::DoubleRegister => write!(f, "d{}", index),
        }
    }
}

/// Formats an optional operand the way instruction dumps show it.
pub struct OptionalOperand(pub Option<Operand>);

impl fmt::Display for OptionalOperand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(op) => write!(f, "{}", op),
            None => f.write_str("(0)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_unpack() {
        let op = Operand::stack_slot(12345);
        assert_eq!(op.kind(), OperandKind::StackSlot);
        assert_eq!(op.index(), 12345);
        assert_eq!(Operand::from_bits(op.bits()), Some(op));
    }

    #[test]
    fn test_constant_id() {
        assert_eq!(Operand::constant(7).constant_id(), Some(7));
        assert_eq!(Operand::register(7).constant_id(), None);
    }

    #[test]
    fn test_from_bits_rejects_unknown_kind() {
        assert!(Operand::from_bits(0b111).is_none());
    }

    #[test]
    fn test_display() {
        assert_eq!(Operand::register(3).to_string(), "r3");
        assert_eq!(Operand::constant(2).to_string(), "[constant:2]");
        assert_eq!(OptionalOperand(None).to_string(), "(0)");
    }
}
