//! Constant pool.
//!
//! Constants are keyed by the id of the IR value they were lowered from.
//! Constant operands and constant value references both use that id.

use crate::instruction::ValueRepresentation;
use lithos_heap::{ObjectId, Value};
use rustc_hash::FxHashMap;

/// Code stubs a chunk can embed by kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CodeStubKind {
    ArgumentsAdaptor = 0,
    CEntry = 1,
    StackCheck = 2,
    Deoptimizer = 3,
}

impl CodeStubKind {
    pub const fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0 => CodeStubKind::ArgumentsAdaptor,
            1 => CodeStubKind::CEntry,
            2 => CodeStubKind::StackCheck,
            3 => CodeStubKind::Deoptimizer,
            _ => return None,
        })
    }
}

bitflags::bitflags! {
    /// Facts known about a constant's value.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ConstantFlags: u8 {
        const HAS_SMI_VALUE       = 1 << 0;
        const HAS_INT32_VALUE     = 1 << 1;
        const HAS_DOUBLE_VALUE    = 1 << 2;
        const IS_NOT_IN_NEW_SPACE = 1 << 3;
        const BOOLEAN_VALUE       = 1 << 4;
        const IS_UNDETECTABLE     = 1 << 5;
    }
}

/// What a constant denotes.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstantValue {
    Integer(i32),
    Double(f64),
    /// Process-level external address, by table index.
    ExternalReference(u32),
    /// An object reached through a global or builtins property.
    Named {
        name: String,
        is_builtin: bool,
        object: ObjectId,
    },
    /// The literals array of a function.
    LiteralsArray { owner: ObjectId },
    /// The context of a function.
    Context { owner: ObjectId },
    CodeStub(CodeStubKind),
    Object(Value),
}

/// A pooled constant.
#[derive(Debug, Clone, PartialEq)]
pub struct Constant {
    pub representation: ValueRepresentation,
    pub flags: ConstantFlags,
    pub value: ConstantValue,
}

impl Constant {
    pub fn integer(value: i32) -> Self {
        Constant {
            representation: ValueRepresentation::Integer32,
            flags: ConstantFlags::HAS_SMI_VALUE | ConstantFlags::HAS_INT32_VALUE | ConstantFlags::HAS_DOUBLE_VALUE,
            value: ConstantValue::Integer(value),
        }
    }

    pub fn double(value: f64) -> Self {
        let mut flags = ConstantFlags::HAS_DOUBLE_VALUE;
        if value.fract() == 0.0 && value >= i32::MIN as f64 && value <= i32::MAX as f64 && !(value == 0.0 && value.is_sign_negative()) {
            flags |= ConstantFlags::HAS_INT32_VALUE;
        }
        Constant {
            representation: ValueRepresentation::Double,
            flags,
            value: ConstantValue::Double(value),
        }
    }

    pub fn tagged(value: ConstantValue) -> Self {
        Constant {
            representation: ValueRepresentation::Tagged,
            flags: ConstantFlags::IS_NOT_IN_NEW_SPACE,
            value,
        }
    }

    pub fn object(value: Value) -> Self {
        Self::tagged(ConstantValue::Object(value))
    }
}

/// Constants of one chunk by value id.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConstantPool {
    entries: FxHashMap<u32, Constant>,
}

impl ConstantPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the constant for `id`.
    pub fn insert(&mut self, id: u32, constant: Constant) -> Option<Constant> {
        self.entries.insert(id, constant)
    }

    #[inline]
    pub fn get(&self, id: u32) -> Option<&Constant> {
        self.entries.get(&id)
    }

    #[inline]
    pub fn contains(&self, id: u32) -> bool {
        self.entries.contains_key(&id)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Ids in ascending order.
    pub fn ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.entries.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_insert_get() {
        let mut pool = ConstantPool::new();
        assert!(pool.insert(7, Constant::integer(42)).is_none());
        pool.insert(3, Constant::double(0.5));
        assert_eq!(pool.len(), 2);
        assert_eq!(pool.get(7).map(|c| &c.value), Some(&ConstantValue::Integer(42)));
        assert_eq!(pool.ids(), vec![3, 7]);
        assert!(!pool.contains(4));
    }

    #[test]
    fn test_double_flags() {
        assert!(Constant::double(3.0).flags.contains(ConstantFlags::HAS_INT32_VALUE));
        assert!(!Constant::double(3.5).flags.contains(ConstantFlags::HAS_INT32_VALUE));
        assert!(!Constant::double(-0.0).flags.contains(ConstantFlags::HAS_INT32_VALUE));
    }

    #[test]
    fn test_code_stub_from_u8() {
        assert_eq!(CodeStubKind::from_u8(1), Some(CodeStubKind::CEntry));
        assert_eq!(CodeStubKind::from_u8(4), None);
    }
}
