//! Tagged values and heap handles.
//!
//! A [`Value`] is what a slot holds: nothing, a small integer, or a handle to
//! a heap object. Handles are arena indices, so they never dangle across an
//! allocation.

use std::fmt;

use crate::arena::Id;
use crate::object::HeapObject;

/// Handle to any heap object.
pub type ObjectId = Id<HeapObject>;

/// Handle to a heap object that is known to be a [`Shape`](crate::Shape).
///
/// Shapes live in the object arena like every other heap value, so a shape
/// can itself be stored in a slot.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShapeId(ObjectId);

impl ShapeId {
    /// Reinterpret an object handle as a shape handle.
    ///
    /// Callers must have checked that the object is a shape; accessors on
    /// [`Heap`](crate::Heap) panic otherwise.
    #[inline]
    pub const fn from_object(id: ObjectId) -> Self {
        ShapeId(id)
    }

    /// The underlying object handle.
    #[inline]
    pub const fn object(self) -> ObjectId {
        self.0
    }
}

impl fmt::Debug for ShapeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "shape{}", self.0)
    }
}

/// Contents of a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Value {
    /// No value at all (a null pointer in the slot).
    #[default]
    Empty,
    /// Small integer stored inline.
    Smi(i32),
    /// Heap-allocated value.
    Object(ObjectId),
}

impl Value {
    /// Whether this is the empty slot.
    #[inline]
    pub const fn is_empty(self) -> bool {
        matches!(self, Value::Empty)
    }

    /// The small integer payload, if any.
    #[inline]
    pub const fn as_smi(self) -> Option<i32> {
        match self {
            Value::Smi(v) => Some(v),
            _ => None,
        }
    }

    /// The heap handle, if any.
    #[inline]
    pub const fn as_object(self) -> Option<ObjectId> {
        match self {
            Value::Object(id) => Some(id),
            _ => None,
        }
    }
}

impl From<ObjectId> for Value {
    #[inline]
    fn from(id: ObjectId) -> Self {
        Value::Object(id)
    }
}

impl From<ShapeId> for Value {
    #[inline]
    fn from(id: ShapeId) -> Self {
        Value::Object(id.object())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Empty => write!(f, "<empty>"),
            Value::Smi(v) => write!(f, "{}", v),
            Value::Object(id) => write!(f, "{}", id),
        }
    }
}
