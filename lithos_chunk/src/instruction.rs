//! Lowered instructions.
//!
//! An instruction is an [`Op`] (opcode plus its payload), operand slots
//! sized by the opcode's [`Layout`], the value metadata the code generator
//! consults, and the optional deoptimization environment and pointer map.

use crate::block::BlockId;
use crate::environment::Environment;
use crate::opcode::{Gap, Layout, Opcode, Token};
use crate::operand::{Operand, OptionalOperand};
use crate::pointer_map::PointerMap;
use lithos_heap::{ObjectId, ShapeId, Value};
use smallvec::SmallVec;
use std::fmt;

// =============================================================================
// Value Metadata
// =============================================================================

/// Machine representation of an IR value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum ValueRepresentation {
    #[default]
    None = 0,
    Integer32 = 1,
    Smi = 2,
    Double = 3,
    HeapObject = 4,
    Tagged = 5,
    External = 6,
}

impl ValueRepresentation {
    pub const fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0 => ValueRepresentation::None,
            1 => ValueRepresentation::Integer32,
            2 => ValueRepresentation::Smi,
            3 => ValueRepresentation::Double,
            4 => ValueRepresentation::HeapObject,
            5 => ValueRepresentation::Tagged,
            6 => ValueRepresentation::External,
            _ => return None,
        })
    }
}

bitflags::bitflags! {
    /// Value flags consulted during code generation.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ValueFlags: u32 {
        const CAN_OVERFLOW               = 1 << 0;
        const BAILOUT_ON_MINUS_ZERO      = 1 << 1;
        const CAN_BE_DIV_BY_ZERO         = 1 << 2;
        const LEFT_CAN_BE_MIN_INT        = 1 << 3;
        const LEFT_CAN_BE_NEGATIVE       = 1 << 4;
        const ALLOW_UNDEFINED_AS_NAN     = 1 << 5;
        const IS_ARGUMENTS               = 1 << 6;
        const TRUNCATING_TO_INT32        = 1 << 7;
        const UINT32                     = 1 << 8;
        const DEOPTIMIZE_ON_UNDEFINED    = 1 << 9;
        const HAS_NO_OBSERVABLE_SIDE_EFFECTS = 1 << 10;
    }
}

/// Metadata of an IR value that is not a pooled constant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValueInfo {
    pub id: u32,
    pub block: BlockId,
    /// Source position, or -1.
    pub position: i32,
    pub representation: ValueRepresentation,
    /// Static type lattice bits.
    pub htype: u16,
    pub flags: ValueFlags,
}

impl ValueInfo {
    pub fn new(id: u32, block: BlockId, representation: ValueRepresentation) -> Self {
        ValueInfo {
            id,
            block,
            position: -1,
            representation,
            htype: 0,
            flags: ValueFlags::empty(),
        }
    }
}

/// The IR value an instruction was lowered from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValueRef {
    #[default]
    None,
    /// A constant-pool entry, by id.
    Constant(u32),
    Value(ValueInfo),
}

impl ValueRef {
    #[inline]
    pub fn constant_id(&self) -> Option<u32> {
        match self {
            ValueRef::Constant(id) => Some(*id),
            _ => None,
        }
    }
}

// =============================================================================
// Payload Types
// =============================================================================

/// Successor blocks of a two-way branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Targets {
    pub if_true: BlockId,
    pub if_false: BlockId,
}

/// A named field access on an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldAccess {
    pub offset: i32,
    pub in_object: bool,
    pub representation: ValueRepresentation,
    /// Property name, when the access is by a known name.
    pub name: Option<ObjectId>,
}

/// Opcode with its payload.
///
/// Payload fields fall into two groups: operation parameters (divisors,
/// tokens, flags, gap moves, block targets of `Goto`) and value metadata
/// that references the heap (shapes, names, functions).
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    Gap(Gap),
    Label(Gap),
    Goto { block: BlockId },
    Parameter,
    Context,
    UnknownOsrValue,
    OsrEntry,
    StackCheck { backwards: bool },
    LazyBailout,
    Deoptimize { reason: String },
    ConstantI,
    ConstantS,
    ConstantD,
    ConstantT,
    ConstantE,
    AddI,
    SubI,
    MulI,
    BitI { op: Token },
    ShiftI { op: Token, can_deopt: bool },
    ModByPowerOf2I { divisor: i32 },
    ModByConstI { divisor: i32 },
    DivByPowerOf2I { divisor: i32 },
    DivByConstI { divisor: i32 },
    FlooringDivByPowerOf2I { divisor: i32 },
    FlooringDivByConstI { divisor: i32 },
    ArithmeticD { op: Token },
    ArithmeticT { op: Token },
    SmiTag,
    SmiUntag { needs_check: bool },
    NumberTagD,
    TaggedToI,
    CheckSmi,
    CheckNonSmi,
    CheckMaps { shapes: SmallVec<[ShapeId; 2]> },
    CheckValue { object: Value },
    Branch { targets: Targets },
    CompareNumericAndBranch { token: Token, targets: Targets },
    TypeofIsAndBranch { literal: String, targets: Targets },
    LoadContextSlot { slot_index: i32 },
    StoreContextSlot { slot_index: i32 },
    LoadNamedField { access: FieldAccess },
    StoreNamedField { access: FieldAccess, transition: Option<ShapeId> },
    LoadNamedGeneric { name: ObjectId },
    LoadGlobalGeneric { name: ObjectId, for_typeof: bool },
    FunctionLiteral { shared: ObjectId, pretenure: bool },
    CallJSFunction { argument_count: i32 },
    CallWithDescriptor { argument_count: i32 },
    CallRuntime { function: u16, argument_count: i32 },
    InstanceOfKnownGlobal {
        function: ObjectId,
        /// Environment for the lazy bailout after the deferred call.
        lazy_environment: Option<Box<Environment>>,
    },
    PushArgument,
    Drop { count: i32 },
    Return,
}

impl Op {
    pub fn opcode(&self) -> Opcode {
        match self {
            Op::Gap(_) => Opcode::Gap,
            Op::Label(_) => Opcode::Label,
            Op::Goto { .. } => Opcode::Goto,
            Op::Parameter => Opcode::Parameter,
            Op::Context => Opcode::Context,
            Op::UnknownOsrValue => Opcode::UnknownOsrValue,
            Op::OsrEntry => Opcode::OsrEntry,
            Op::StackCheck { .. } => Opcode::StackCheck,
            Op::LazyBailout => Opcode::LazyBailout,
            Op::Deoptimize { .. } => Opcode::Deoptimize,
            Op::ConstantI => Opcode::ConstantI,
            Op::ConstantS => Opcode::ConstantS,
            Op::ConstantD => Opcode::ConstantD,
            Op::ConstantT => Opcode::ConstantT,
            Op::ConstantE => Opcode::ConstantE,
            Op::AddI => Opcode::AddI,
            Op::SubI => Opcode::SubI,
            Op::MulI => Opcode::MulI,
            Op::BitI { .. } => Opcode::BitI,
            Op::ShiftI { .. } => Opcode::ShiftI,
            Op::ModByPowerOf2I { .. } => Opcode::ModByPowerOf2I,
            Op::ModByConstI { .. } => Opcode::ModByConstI,
            Op::DivByPowerOf2I { .. } => Opcode::DivByPowerOf2I,
            Op::DivByConstI { .. } => Opcode::DivByConstI,
            Op::FlooringDivByPowerOf2I { .. } => Opcode::FlooringDivByPowerOf2I,
            Op::FlooringDivByConstI { .. } => Opcode::FlooringDivByConstI,
            Op::ArithmeticD { .. } => Opcode::ArithmeticD,
            Op::ArithmeticT { .. } => Opcode::ArithmeticT,
            Op::SmiTag => Opcode::SmiTag,
            Op::SmiUntag { .. } => Opcode::SmiUntag,
            Op::NumberTagD => Opcode::NumberTagD,
            Op::TaggedToI => Opcode::TaggedToI,
            Op::CheckSmi => Opcode::CheckSmi,
            Op::CheckNonSmi => Opcode::CheckNonSmi,
            Op::CheckMaps { .. } => Opcode::CheckMaps,
            Op::CheckValue { .. } => Opcode::CheckValue,
            Op::Branch { .. } => Opcode::Branch,
            Op::CompareNumericAndBranch { .. } => Opcode::CompareNumericAndBranch,
            Op::TypeofIsAndBranch { .. } => Opcode::TypeofIsAndBranch,
            Op::LoadContextSlot { .. } => Opcode::LoadContextSlot,
            Op::StoreContextSlot { .. } => Opcode::StoreContextSlot,
            Op::LoadNamedField { .. } => Opcode::LoadNamedField,
            Op::StoreNamedField { .. } => Opcode::StoreNamedField,
            Op::LoadNamedGeneric { .. } => Opcode::LoadNamedGeneric,
            Op::LoadGlobalGeneric { .. } => Opcode::LoadGlobalGeneric,
            Op::FunctionLiteral { .. } => Opcode::FunctionLiteral,
            Op::CallJSFunction { .. } => Opcode::CallJSFunction,
            Op::CallWithDescriptor { .. } => Opcode::CallWithDescriptor,
            Op::CallRuntime { .. } => Opcode::CallRuntime,
            Op::InstanceOfKnownGlobal { .. } => Opcode::InstanceOfKnownGlobal,
            Op::PushArgument => Opcode::PushArgument,
            Op::Drop { .. } => Opcode::Drop,
            Op::Return => Opcode::Return,
        }
    }

    /// Gap payload of gap-like ops.
    #[inline]
    pub fn gap(&self) -> Option<&Gap> {
        match self {
            Op::Gap(gap) | Op::Label(gap) => Some(gap),
            _ => None,
        }
    }
}

// =============================================================================
// Instruction
// =============================================================================

/// A lowered instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub op: Op,
    pub result: Option<Operand>,
    pub inputs: SmallVec<[Option<Operand>; 4]>,
    pub temps: SmallVec<[Option<Operand>; 3]>,
    pub value: ValueRef,
    pub environment: Option<Box<Environment>>,
    pub pointer_map: Option<PointerMap>,
}

impl Instruction {
    /// Instruction with empty operand slots sized by the opcode's layout.
    pub fn new(op: Op) -> Self {
        let layout = op.opcode().layout();
        Instruction {
            op,
            result: None,
            inputs: std::iter::repeat(None).take(layout.inputs.unwrap_or(0)).collect(),
            temps: std::iter::repeat(None).take(layout.temps).collect(),
            value: ValueRef::None,
            environment: None,
            pointer_map: None,
        }
    }

    pub fn with_result(mut self, result: Operand) -> Self {
        debug_assert!(self.layout().result, "{} has no result", self.opcode());
        self.result = Some(result);
        self
    }

    /// Replace the input slots. Fixed-arity opcodes must supply exactly
    /// their layout's count.
    pub fn with_inputs(mut self, inputs: impl IntoIterator<Item = Operand>) -> Self {
        self.inputs = inputs.into_iter().map(Some).collect();
        self
    }

    pub fn with_temps(mut self, temps: impl IntoIterator<Item = Operand>) -> Self {
        self.temps = temps.into_iter().map(Some).collect();
        self
    }

    pub fn with_value(mut self, value: ValueRef) -> Self {
        self.value = value;
        self
    }

    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = Some(Box::new(environment));
        self
    }

    pub fn with_pointer_map(mut self, pointer_map: PointerMap) -> Self {
        self.pointer_map = Some(pointer_map);
        self
    }

    #[inline]
    pub fn opcode(&self) -> Opcode {
        self.op.opcode()
    }

    #[inline]
    pub fn layout(&self) -> Layout {
        self.opcode().layout()
    }

    #[inline]
    pub fn is_gap(&self) -> bool {
        self.opcode().is_gap()
    }

    /// Whether operand counts agree with the opcode's layout.
    pub fn matches_layout(&self) -> bool {
        let layout = self.layout();
        (layout.result || self.result.is_none())
            && layout.inputs.map_or(true, |n| n == self.inputs.len())
            && layout.temps == self.temps.len()
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.opcode().name())?;
        if let Some(gap) = self.op.gap() {
            write!(f, " {}", gap.block)?;
            for op in gap.operands() {
                write!(f, " {}", op)?;
            }
            return Ok(());
        }
        if self.layout().result {
            write!(f, " {} =", OptionalOperand(self.result))?;
        }
        for input in &self.inputs {
            write!(f, " {}", OptionalOperand(*input))?;
        }
        match &self.op {
            Op::Goto { block } => write!(f, " {}", block)?,
            Op::BitI { op } | Op::ArithmeticD { op } | Op::ArithmeticT { op } => write!(f, " ({})", op)?,
            Op::ShiftI { op, .. } => write!(f, " ({})", op)?,
            Op::Branch { targets } => write!(f, " then {} else {}", targets.if_true, targets.if_false)?,
            Op::CompareNumericAndBranch { token, targets } => {
                write!(f, " ({}) then {} else {}", token, targets.if_true, targets.if_false)?
            }
            Op::Drop { count } => write!(f, " {}", count)?,
            _ => {}
        }
        if let Some(env) = &self.environment {
            write!(f, " env[{}]", env.depth())?;
        }
        Ok(())
    }
}
