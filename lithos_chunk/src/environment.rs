//! Deoptimization environments.
//!
//! An environment describes one frame of the unoptimized state an
//! instruction must be able to rebuild if it bails out. Inlining produces a
//! chain: the innermost frame points at its caller through `outer`.
//!
//! ```text
//!   instruction ──► Environment (inlined callee)
//!                        │ outer
//!                        ▼
//!                   Environment (compiled function)
//!                        │ outer
//!                        ▼
//!                       None
//! ```

use crate::block::BailoutId;
use crate::operand::Operand;
use lithos_heap::ObjectId;
use smallvec::SmallVec;

/// Kind of frame an environment rebuilds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameType {
    JsFunction = 0,
    JsConstruct = 1,
    JsGetter = 2,
    JsSetter = 3,
    ArgumentsAdaptor = 4,
    Stub = 5,
}

impl FrameType {
    pub const fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0 => FrameType::JsFunction,
            1 => FrameType::JsConstruct,
            2 => FrameType::JsGetter,
            3 => FrameType::JsSetter,
            4 => FrameType::ArgumentsAdaptor,
            5 => FrameType::Stub,
            _ => return None,
        })
    }
}

/// The function an environment frame belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvClosure {
    /// The closure the chunk was compiled for.
    Compiled,
    /// An inlined function.
    Function(ObjectId),
}

/// One value slot of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EnvValue {
    pub operand: Option<Operand>,
    pub is_tagged: bool,
    pub is_uint32: bool,
}

impl EnvValue {
    pub const fn tagged(operand: Operand) -> Self {
        EnvValue {
            operand: Some(operand),
            is_tagged: true,
            is_uint32: false,
        }
    }
}

/// A deoptimization frame description.
#[derive(Debug, Clone, PartialEq)]
pub struct Environment {
    pub outer: Option<Box<Environment>>,
    pub frame_type: FrameType,
    pub arguments_stack_height: i32,
    pub bailout_id: BailoutId,
    pub translation_size: i32,
    pub parameter_count: i32,
    pub has_been_used: bool,
    pub closure: EnvClosure,
    pub values: SmallVec<[EnvValue; 8]>,
    /// Captured/duplicated object descriptions, as raw encoded words.
    pub object_mapping: Vec<u32>,
}

impl Environment {
    pub fn new(closure: EnvClosure, frame_type: FrameType, bailout_id: BailoutId) -> Self {
        Environment {
            outer: None,
            frame_type,
            arguments_stack_height: 0,
            bailout_id,
            translation_size: 0,
            parameter_count: 0,
            has_been_used: false,
            closure,
            values: SmallVec::new(),
            object_mapping: Vec::new(),
        }
    }

    /// Append a value slot.
    pub fn push_value(&mut self, value: EnvValue) {
        self.values.push(value);
        self.translation_size = self.values.len() as i32;
    }

    /// Wrap this frame in an outer frame.
    pub fn with_outer(mut self, outer: Environment) -> Self {
        self.outer = Some(Box::new(outer));
        self
    }

    /// This frame followed by each enclosing frame.
    pub fn chain(&self) -> impl Iterator<Item = &Environment> {
        std::iter::successors(Some(self), |env| env.outer.as_deref())
    }

    /// Number of frames in the chain.
    #[inline]
    pub fn depth(&self) -> usize {
        self.chain().count()
    }

    /// Every operand referenced anywhere in the chain.
    pub fn operands(&self) -> impl Iterator<Item = Operand> + '_ {
        self.chain()
            .flat_map(|env| env.values.iter().filter_map(|v| v.operand))
    }
}
