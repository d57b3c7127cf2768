//! Runtime object model for Lithos.
//!
//! This crate provides:
//! - Typed arenas and index handles for heap entities
//! - Tagged values and heap object layouts
//! - Shapes (hidden classes) with descriptors, transitions and back pointers
//! - Shared function units, closures and lexical contexts
//! - Dictionary namespaces for the global and builtins objects
//! - The stable root table and the symbol registry
//! - A deterministic bootstrap so independent heaps agree on builtins

#![deny(unsafe_op_in_unsafe_fn)]

pub mod arena;
pub mod bootstrap;
pub mod function;
pub mod heap;
pub mod namespace;
pub mod object;
pub mod resolve;
pub mod roots;
pub mod shape;
pub mod value;

pub use arena::{Arena, Id};
pub use function::{
    BuiltinFunctionId, Context, ContextKind, ContextSlot, JsFunction, Script, ScriptId, SharedFunctionInfo,
};
pub use heap::Heap;
pub use namespace::{Namespace, NamespaceEntry, PropertyKey, SymbolRegistry};
pub use object::{
    AccessorId, AccessorInfo, ElementsKind, Foreign, HeapObject, InstanceType, JsArray, JsBoxed, JsObject,
    JsRegExp, JsString, JsTypedArray, OddballKind, RegExpFlags, Symbol, TypedArrayKind,
};
pub use roots::RootIndex;
pub use shape::{
    BitField3, Descriptor, PropertyAttributes, PropertyDetails, PropertyKind, PropertyLocation, Representation,
    Shape, Transition,
};
pub use value::{ObjectId, ShapeId, Value};
