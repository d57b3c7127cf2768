//! Heap object layouts.
//!
//! # Overview
//!
//! Every heap-allocated value is one [`HeapObject`] variant. The variant set
//! mirrors what compiled code can embed: numbers, strings, symbols, arrays,
//! record-like objects with a [`Shape`], functions and the units they were
//! compiled from, plus a handful of process singletons.
//!
//! ```text
//!   Value::Object(id) ──► Arena<HeapObject>[id]
//!                              │
//!                              ├── Object { shape, elements, properties }
//!                              │             │
//!                              │             └──► Shape (also in the arena)
//!                              └── Function { shared, context, shape, .. }
//! ```

use std::fmt;

use crate::function::{Context, ContextKind, JsFunction, SharedFunctionInfo};
use crate::shape::Shape;
use crate::value::{ObjectId, ShapeId, Value};

// =============================================================================
// Instance Type
// =============================================================================

/// Detailed instance type of a heap object.
///
/// Strings are normalized to a single type; internalization is a flag on
/// the string, not a separate type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum InstanceType {
    Oddball = 0,
    HeapNumber = 1,
    Symbol = 2,
    String = 3,
    RegExp = 4,
    FixedArray = 5,
    FixedDoubleArray = 6,
    Array = 7,
    ArrayBuffer = 8,
    TypedArray = 9,
    Function = 10,
    SharedFunctionInfo = 11,
    Shape = 12,
    Object = 13,
    BoxedValue = 14,
    AccessorInfo = 15,
    Foreign = 16,
    GlobalObject = 17,
    GlobalProxy = 18,
    BuiltinsObject = 19,
    NativeContext = 20,
    AllocationSite = 21,
    AccessorPair = 22,
    Context = 23,
}

impl InstanceType {
    /// Decode a raw tag.
    pub const fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0 => InstanceType::Oddball,
            1 => InstanceType::HeapNumber,
            2 => InstanceType::Symbol,
            3 => InstanceType::String,
            4 => InstanceType::RegExp,
            5 => InstanceType::FixedArray,
            6 => InstanceType::FixedDoubleArray,
            7 => InstanceType::Array,
            8 => InstanceType::ArrayBuffer,
            9 => InstanceType::TypedArray,
            10 => InstanceType::Function,
            11 => InstanceType::SharedFunctionInfo,
            12 => InstanceType::Shape,
            13 => InstanceType::Object,
            14 => InstanceType::BoxedValue,
            15 => InstanceType::AccessorInfo,
            16 => InstanceType::Foreign,
            17 => InstanceType::GlobalObject,
            18 => InstanceType::GlobalProxy,
            19 => InstanceType::BuiltinsObject,
            20 => InstanceType::NativeContext,
            21 => InstanceType::AllocationSite,
            22 => InstanceType::AccessorPair,
            23 => InstanceType::Context,
            _ => return None,
        })
    }

    /// Display name.
    pub const fn name(self) -> &'static str {
        match self {
            InstanceType::Oddball => "oddball",
            InstanceType::HeapNumber => "heap-number",
            InstanceType::Symbol => "symbol",
            InstanceType::String => "string",
            InstanceType::RegExp => "regexp",
            InstanceType::FixedArray => "fixed-array",
            InstanceType::FixedDoubleArray => "fixed-double-array",
            InstanceType::Array => "array",
            InstanceType::ArrayBuffer => "array-buffer",
            InstanceType::TypedArray => "typed-array",
            InstanceType::Function => "function",
            InstanceType::SharedFunctionInfo => "shared-function-info",
            InstanceType::Shape => "shape",
            InstanceType::Object => "object",
            InstanceType::BoxedValue => "boxed-value",
            InstanceType::AccessorInfo => "accessor-info",
            InstanceType::Foreign => "foreign",
            InstanceType::GlobalObject => "global-object",
            InstanceType::GlobalProxy => "global-proxy",
            InstanceType::BuiltinsObject => "builtins-object",
            InstanceType::NativeContext => "native-context",
            InstanceType::AllocationSite => "allocation-site",
            InstanceType::AccessorPair => "accessor-pair",
            InstanceType::Context => "context",
        }
    }
}

impl fmt::Display for InstanceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// Small Enums
// =============================================================================

/// Which singleton an oddball is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OddballKind {
    Undefined = 0,
    TheHole = 1,
    Null = 2,
    True = 3,
    False = 4,
    Uninitialized = 5,
    Exception = 6,
}

impl OddballKind {
    /// All kinds, in root-table order.
    pub const ALL: [OddballKind; 7] = [
        OddballKind::Undefined,
        OddballKind::TheHole,
        OddballKind::Null,
        OddballKind::True,
        OddballKind::False,
        OddballKind::Uninitialized,
        OddballKind::Exception,
    ];

    /// Decode a raw kind byte.
    pub const fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0 => OddballKind::Undefined,
            1 => OddballKind::TheHole,
            2 => OddballKind::Null,
            3 => OddballKind::True,
            4 => OddballKind::False,
            5 => OddballKind::Uninitialized,
            6 => OddballKind::Exception,
            _ => return None,
        })
    }
}

/// Backing-store representation of array elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum ElementsKind {
    FastSmi = 0,
    FastHoleySmi = 1,
    #[default]
    Fast = 2,
    FastHoley = 3,
    FastDouble = 4,
    FastHoleyDouble = 5,
    Dictionary = 6,
}

impl ElementsKind {
    /// Decode a raw kind byte.
    pub const fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0 => ElementsKind::FastSmi,
            1 => ElementsKind::FastHoleySmi,
            2 => ElementsKind::Fast,
            3 => ElementsKind::FastHoley,
            4 => ElementsKind::FastDouble,
            5 => ElementsKind::FastHoleyDouble,
            6 => ElementsKind::Dictionary,
            _ => return None,
        })
    }

    /// Whether elements are unboxed doubles.
    #[inline]
    pub const fn is_double(self) -> bool {
        matches!(self, ElementsKind::FastDouble | ElementsKind::FastHoleyDouble)
    }
}

/// Element type of a typed array view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TypedArrayKind {
    Int8 = 0,
    Uint8 = 1,
    Uint8Clamped = 2,
    Int16 = 3,
    Uint16 = 4,
    Int32 = 5,
    Uint32 = 6,
    Float32 = 7,
    Float64 = 8,
}

impl TypedArrayKind {
    /// Decode a raw kind byte.
    pub const fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0 => TypedArrayKind::Int8,
            1 => TypedArrayKind::Uint8,
            2 => TypedArrayKind::Uint8Clamped,
            3 => TypedArrayKind::Int16,
            4 => TypedArrayKind::Uint16,
            5 => TypedArrayKind::Int32,
            6 => TypedArrayKind::Uint32,
            7 => TypedArrayKind::Float32,
            8 => TypedArrayKind::Float64,
            _ => return None,
        })
    }

    /// Width of one element in bytes.
    pub const fn element_size(self) -> usize {
        match self {
            TypedArrayKind::Int8 | TypedArrayKind::Uint8 | TypedArrayKind::Uint8Clamped => 1,
            TypedArrayKind::Int16 | TypedArrayKind::Uint16 => 2,
            TypedArrayKind::Int32 | TypedArrayKind::Uint32 | TypedArrayKind::Float32 => 4,
            TypedArrayKind::Float64 => 8,
        }
    }
}

/// Native accessor callbacks that a foreign object can point at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum AccessorId {
    ArrayLength = 0,
    FunctionPrototype = 1,
    FunctionName = 2,
    FunctionLength = 3,
    StringLength = 4,
    ScriptSource = 5,
}

impl AccessorId {
    /// Decode a raw accessor id.
    pub const fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0 => AccessorId::ArrayLength,
            1 => AccessorId::FunctionPrototype,
            2 => AccessorId::FunctionName,
            3 => AccessorId::FunctionLength,
            4 => AccessorId::StringLength,
            5 => AccessorId::ScriptSource,
            _ => return None,
        })
    }
}

bitflags::bitflags! {
    /// Regular expression flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct RegExpFlags: u8 {
        const GLOBAL = 1 << 0;
        const IGNORE_CASE = 1 << 1;
        const MULTILINE = 1 << 2;
        const STICKY = 1 << 3;
    }
}

impl RegExpFlags {
    /// Render as the flag string used in source, in `gimy` order.
    pub fn to_flag_string(self) -> String {
        let mut out = String::with_capacity(4);
        if self.contains(RegExpFlags::GLOBAL) {
            out.push('g');
        }
        if self.contains(RegExpFlags::IGNORE_CASE) {
            out.push('i');
        }
        if self.contains(RegExpFlags::MULTILINE) {
            out.push('m');
        }
        if self.contains(RegExpFlags::STICKY) {
            out.push('y');
        }
        out
    }

    /// Parse a flag string. Repeated or unknown flags are rejected.
    pub fn parse(flags: &str) -> Option<Self> {
        let mut out = RegExpFlags::empty();
        for c in flags.chars() {
            let flag = match c {
                'g' => RegExpFlags::GLOBAL,
                'i' => RegExpFlags::IGNORE_CASE,
                'm' => RegExpFlags::MULTILINE,
                'y' => RegExpFlags::STICKY,
                _ => return None,
            };
            if out.contains(flag) {
                return None;
            }
            out |= flag;
        }
        Some(out)
    }
}

// =============================================================================
// Object Payloads
// =============================================================================

/// String contents plus the internalization bit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsString {
    pub text: String,
    pub interned: bool,
}

/// A symbol. Private symbols key special shape transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub description: Option<String>,
    pub private: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsRegExp {
    /// Pattern source, a string object.
    pub pattern: ObjectId,
    pub flags: RegExpFlags,
}

/// Array wrapper around a fixed backing store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsArray {
    pub kind: ElementsKind,
    /// Length as a value: a small integer, a heap number, or empty when the
    /// array was never initialized.
    pub length: Value,
    /// A fixed array or fixed double array.
    pub elements: ObjectId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsTypedArray {
    pub kind: TypedArrayKind,
    pub buffer: ObjectId,
    pub byte_offset: usize,
    pub length: usize,
}

/// Shape-bearing record.
///
/// Field values live in `properties`; the shape's descriptors say which
/// field index holds which named property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsObject {
    pub shape: ShapeId,
    /// A fixed array or fixed double array.
    pub elements: ObjectId,
    /// A fixed array of field values.
    pub properties: ObjectId,
}

/// Primitive wrapped in an object (`new Number(1)`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsBoxed {
    pub object: JsObject,
    pub value: Value,
}

/// Accessor implemented by native getter/setter callbacks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessorInfo {
    pub getter: Value,
    pub setter: Value,
    pub data: Value,
}

/// Raw native pointer. Only pointers to known accessor callbacks carry an
/// [`AccessorId`]; anything else cannot leave the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Foreign {
    pub accessor: Option<AccessorId>,
}

// =============================================================================
// Heap Object
// =============================================================================

/// One heap-allocated value.
#[derive(Debug, Clone)]
pub enum HeapObject {
    Oddball(OddballKind),
    Number(f64),
    String(JsString),
    Symbol(Symbol),
    RegExp(JsRegExp),
    FixedArray(Vec<Value>),
    DoubleArray(Vec<f64>),
    Array(JsArray),
    ArrayBuffer(Vec<u8>),
    TypedArray(JsTypedArray),
    Function(JsFunction),
    SharedFunction(SharedFunctionInfo),
    Shape(Shape),
    Object(JsObject),
    Boxed(JsBoxed),
    AccessorInfo(AccessorInfo),
    Foreign(Foreign),
    Context(Context),
    GlobalObject,
    GlobalProxy,
    BuiltinsObject,
    AllocationSite,
    AccessorPair { getter: Value, setter: Value },
}

impl HeapObject {
    /// Detailed instance type.
    pub fn instance_type(&self) -> InstanceType {
        match self {
            HeapObject::Oddball(_) => InstanceType::Oddball,
            HeapObject::Number(_) => InstanceType::HeapNumber,
            HeapObject::String(_) => InstanceType::String,
            HeapObject::Symbol(_) => InstanceType::Symbol,
            HeapObject::RegExp(_) => InstanceType::RegExp,
            HeapObject::FixedArray(_) => InstanceType::FixedArray,
            HeapObject::DoubleArray(_) => InstanceType::FixedDoubleArray,
            HeapObject::Array(_) => InstanceType::Array,
            HeapObject::ArrayBuffer(_) => InstanceType::ArrayBuffer,
            HeapObject::TypedArray(_) => InstanceType::TypedArray,
            HeapObject::Function(_) => InstanceType::Function,
            HeapObject::SharedFunction(_) => InstanceType::SharedFunctionInfo,
            HeapObject::Shape(_) => InstanceType::Shape,
            HeapObject::Object(_) => InstanceType::Object,
            HeapObject::Boxed(_) => InstanceType::BoxedValue,
            HeapObject::AccessorInfo(_) => InstanceType::AccessorInfo,
            HeapObject::Foreign(_) => InstanceType::Foreign,
            HeapObject::Context(ctx) if ctx.kind == ContextKind::Native => {
                InstanceType::NativeContext
            }
            HeapObject::Context(_) => InstanceType::Context,
            HeapObject::GlobalObject => InstanceType::GlobalObject,
            HeapObject::GlobalProxy => InstanceType::GlobalProxy,
            HeapObject::BuiltinsObject => InstanceType::BuiltinsObject,
            HeapObject::AllocationSite => InstanceType::AllocationSite,
            HeapObject::AccessorPair { .. } => InstanceType::AccessorPair,
        }
    }

    /// Shape of a shape-bearing object.
    pub fn shape(&self) -> Option<ShapeId> {
        match self {
            HeapObject::Object(obj) => Some(obj.shape),
            HeapObject::Boxed(boxed) => Some(boxed.object.shape),
            HeapObject::Function(func) => Some(func.shape),
            _ => None,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
