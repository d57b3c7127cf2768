//! Pointer maps.
//!
//! A pointer map records, at a safepoint, which operands hold tagged
//! pointers the collector must visit and which hold raw words it must skip.

use crate::operand::{Operand, OperandKind};
use smallvec::SmallVec;

/// Tagged and untagged operands live at one safepoint.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PointerMap {
    pointer_operands: SmallVec<[Option<Operand>; 4]>,
    untagged_operands: SmallVec<[Option<Operand>; 2]>,
    /// Source position of the safepoint, or -1.
    pub position: i32,
}

impl PointerMap {
    pub fn new(position: i32) -> Self {
        PointerMap {
            pointer_operands: SmallVec::new(),
            untagged_operands: SmallVec::new(),
            position,
        }
    }

    /// Record a tagged operand. Constants are never recorded.
    pub fn record_pointer(&mut self, operand: Operand) {
        if operand.kind() != OperandKind::Constant {
            self.pointer_operands.push(Some(operand));
        }
    }

    /// Forget a tagged operand that turned out to be dead.
    pub fn remove_pointer(&mut self, operand: Operand) {
        self.pointer_operands.retain(|op| *op != Some(operand));
    }

    /// Record a stack slot holding a raw value.
    pub fn record_untagged(&mut self, operand: Operand) {
        if operand.kind() != OperandKind::Constant {
            self.untagged_operands.push(Some(operand));
        }
    }

    /// Append an operand slot verbatim; empty slots are allowed.
    pub fn push_pointer_slot(&mut self, operand: Option<Operand>) {
        self.pointer_operands.push(operand);
    }

    /// Append an untagged slot verbatim; empty slots are allowed.
    pub fn push_untagged_slot(&mut self, operand: Option<Operand>) {
        self.untagged_operands.push(operand);
    }

    #[inline]
    pub fn pointer_operands(&self) -> &[Option<Operand>] {
        &self.pointer_operands
    }

    #[inline]
    pub fn untagged_operands(&self) -> &[Option<Operand>] {
        &self.untagged_operands
    }
}
