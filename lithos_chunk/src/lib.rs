//! Compiled-unit model for Lithos.
//!
//! A [`Chunk`] is the lowered, register-allocated form of one optimized
//! function: basic blocks, instructions with fixed operand layouts,
//! deoptimization environments, pointer maps and a constant pool.

#![deny(unsafe_op_in_unsafe_fn)]

pub mod bit_vector;
pub mod block;
pub mod chunk;
pub mod constant;
pub mod environment;
pub mod instruction;
pub mod opcode;
pub mod operand;
pub mod pointer_map;

pub use bit_vector::BitVector;
pub use block::{BailoutId, BasicBlock, BlockFlags, BlockId};
pub use chunk::{Chunk, OsrInfo, PlatformData};
pub use constant::{CodeStubKind, Constant, ConstantFlags, ConstantPool, ConstantValue};
pub use environment::{EnvClosure, EnvValue, Environment, FrameType};
pub use instruction::{FieldAccess, Instruction, Op, Targets, ValueFlags, ValueInfo, ValueRef, ValueRepresentation};
pub use opcode::{Gap, GapPosition, Layout, MoveOperands, Opcode, ParallelMove, Token};
pub use operand::{Operand, OperandKind};
pub use pointer_map::PointerMap;
