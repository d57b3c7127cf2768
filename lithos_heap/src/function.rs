//! Functions, the units they are compiled from, and lexical scopes.

use std::fmt;

use crate::arena::Id;
use crate::value::{ObjectId, ShapeId, Value};

/// Handle to a [`Script`].
pub type ScriptId = Id<Script>;

/// Source text a family of shared function units was parsed from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    pub name: String,
    pub source: String,
}

// =============================================================================
// Builtin Function Ids
// =============================================================================

/// Built-in entry points that can be re-found by id in any process.
///
/// Each id names its holder (a dotted path from the global object) and the
/// property under which the function is installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum BuiltinFunctionId {
    MathFloor = 0,
    MathRound = 1,
    MathAbs = 2,
    MathSqrt = 3,
    MathMax = 4,
    MathMin = 5,
    MathPow = 6,
    MathExp = 7,
    MathLog = 8,
    MathImul = 9,
    StringFromCharCode = 10,
    StringCharCodeAt = 11,
    StringCharAt = 12,
    ArrayPush = 13,
    ArrayPop = 14,
    ArrayShift = 15,
}

impl BuiltinFunctionId {
    /// Every id, in tag order.
    pub const ALL: [BuiltinFunctionId; 16] = [
        BuiltinFunctionId::MathFloor,
        BuiltinFunctionId::MathRound,
        BuiltinFunctionId::MathAbs,
        BuiltinFunctionId::MathSqrt,
        BuiltinFunctionId::MathMax,
        BuiltinFunctionId::MathMin,
        BuiltinFunctionId::MathPow,
        BuiltinFunctionId::MathExp,
        BuiltinFunctionId::MathLog,
        BuiltinFunctionId::MathImul,
        BuiltinFunctionId::StringFromCharCode,
        BuiltinFunctionId::StringCharCodeAt,
        BuiltinFunctionId::StringCharAt,
        BuiltinFunctionId::ArrayPush,
        BuiltinFunctionId::ArrayPop,
        BuiltinFunctionId::ArrayShift,
    ];

    /// Decode a raw id.
    pub fn from_u8(value: u8) -> Option<Self> {
        Self::ALL.get(value as usize).copied()
    }

    /// Dotted path of the holder object, starting at the global object.
    pub const fn holder(self) -> &'static str {
        use BuiltinFunctionId::*;
        match self {
            MathFloor | MathRound | MathAbs | MathSqrt | MathMax | MathMin | MathPow | MathExp
            | MathLog | MathImul => "Math",
            StringFromCharCode => "String",
            StringCharCodeAt | StringCharAt => "String.prototype",
            ArrayPush | ArrayPop | ArrayShift => "Array.prototype",
        }
    }

    /// Property name on the holder.
    pub const fn name(self) -> &'static str {
        use BuiltinFunctionId::*;
        match self {
            MathFloor => "floor",
            MathRound => "round",
            MathAbs => "abs",
            MathSqrt => "sqrt",
            MathMax => "max",
            MathMin => "min",
            MathPow => "pow",
            MathExp => "exp",
            MathLog => "log",
            MathImul => "imul",
            StringFromCharCode => "fromCharCode",
            StringCharCodeAt => "charCodeAt",
            StringCharAt => "charAt",
            ArrayPush => "push",
            ArrayPop => "pop",
            ArrayShift => "shift",
        }
    }
}

impl fmt::Display for BuiltinFunctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.holder(), self.name())
    }
}

// =============================================================================
// Shared Function Info
// =============================================================================

/// Compilation unit shared by every closure created from the same source
/// range.
///
/// Units form a tree: `outer` points at the enclosing unit, `inner` lists
/// nested units in source order. An inner slot is `None` until the nested
/// function has been compiled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharedFunctionInfo {
    pub name: String,
    /// Offset of the parameter list's opening parenthesis.
    pub start_position: i32,
    pub end_position: i32,
    pub native: bool,
    pub builtin: Option<BuiltinFunctionId>,
    pub script: Option<ScriptId>,
    pub outer: Option<ObjectId>,
    pub inner: Vec<Option<ObjectId>>,
    pub has_deopt_support: bool,
}

impl SharedFunctionInfo {
    /// A non-native unit parsed from `script`.
    pub fn from_script(name: &str, script: ScriptId, start_position: i32, end_position: i32) -> Self {
        SharedFunctionInfo {
            name: name.to_string(),
            start_position,
            end_position,
            native: false,
            builtin: None,
            script: Some(script),
            outer: None,
            inner: Vec::new(),
            has_deopt_support: false,
        }
    }
}

// =============================================================================
// Function
// =============================================================================

/// A closure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsFunction {
    pub shared: ObjectId,
    /// Context the closure was created in.
    pub context: ObjectId,
    pub shape: ShapeId,
    /// `prototype` property for constructors, empty otherwise.
    pub prototype: Value,
    /// Shape given to objects this constructor creates.
    pub initial_shape: Option<ShapeId>,
    /// Boilerplate literals array, empty until the first literal is created.
    pub literals: Value,
}

// =============================================================================
// Context
// =============================================================================

/// Kind of lexical scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextKind {
    /// The top-level scope of the process.
    Native,
    Function,
    Block,
}

/// Named binding in a context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextSlot {
    pub name: String,
    pub value: Value,
}

/// Lexical scope. Lookups walk `previous` until the native context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Context {
    pub kind: ContextKind,
    pub previous: Option<ObjectId>,
    /// Function owning this scope, for function contexts.
    pub closure: Option<ObjectId>,
    pub slots: Vec<ContextSlot>,
}

impl Context {
    /// Slot index of `name` in this context only.
    pub fn slot_index(&self, name: &str) -> Option<usize> {
        self.slots.iter().position(|slot| slot.name == name)
    }
}
