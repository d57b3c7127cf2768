//! The compiled unit.
//!
//! ```text
//!   Chunk
//!   ├── platform data (dehoisted key ids)
//!   ├── blocks        [B0 entry, B1, ...]
//!   ├── constants     {value id → Constant}
//!   ├── instructions  [label B0, ..., goto B1, label B1, ...]
//!   └── inlined functions (shared units)
//! ```

use crate::bit_vector::BitVector;
use crate::block::{BasicBlock, BlockId};
use crate::constant::{Constant, ConstantPool};
use crate::instruction::Instruction;
use lithos_heap::ObjectId;
use std::fmt;

/// Architecture-specific block data.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PlatformData {
    /// Value ids of keyed accesses whose constant offset was folded.
    pub dehoisted_key_ids: BitVector,
}

/// On-stack-replacement entry data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OsrInfo {
    pub unoptimized_frame_slots: i32,
}

/// Optimized IR for one function.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub platform: PlatformData,
    /// Whether the receiver is read anywhere.
    pub this_has_uses: bool,
    pub spill_slot_count: i32,
    pub osr: Option<OsrInfo>,
    blocks: Vec<BasicBlock>,
    pub constants: ConstantPool,
    instructions: Vec<Instruction>,
    /// Shared units inlined into this chunk.
    pub inlined_functions: Vec<ObjectId>,
}

impl Chunk {
    /// Empty chunk holding only the entry block.
    pub fn new() -> Self {
        Chunk {
            platform: PlatformData::default(),
            this_has_uses: false,
            spill_slot_count: 0,
            osr: None,
            blocks: vec![BasicBlock::new(BlockId::ENTRY)],
            constants: ConstantPool::new(),
            instructions: Vec::new(),
            inlined_functions: Vec::new(),
        }
    }

    // =========================================================================
    // Blocks
    // =========================================================================

    /// Append a block and return its id.
    pub fn new_block(&mut self) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(BasicBlock::new(id));
        id
    }

    #[inline]
    pub fn blocks(&self) -> &[BasicBlock] {
        &self.blocks
    }

    #[inline]
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    #[inline]
    pub fn block(&self, id: BlockId) -> Option<&BasicBlock> {
        self.blocks.get(id.index())
    }

    #[inline]
    pub fn block_mut(&mut self, id: BlockId) -> Option<&mut BasicBlock> {
        self.blocks.get_mut(id.index())
    }

    // =========================================================================
    // Instructions
    // =========================================================================

    /// Append `instruction` to `block`, extending the block's range.
    ///
    /// # Panics
    ///
    /// Panics if `block` does not exist.
    pub fn emit(&mut self, block: BlockId, instruction: Instruction) -> usize {
        let index = self.instructions.len();
        let Some(b) = self.blocks.get_mut(block.index()) else {
            panic!("emit into missing block {}", block);
        };
        if b.first_instruction_index < 0 {
            b.first_instruction_index = index as i32;
        }
        b.last_instruction_index = index as i32;
        self.instructions.push(instruction);
        index
    }

    /// Append without touching block ranges.
    pub fn push_instruction(&mut self, instruction: Instruction) -> usize {
        self.instructions.push(instruction);
        self.instructions.len() - 1
    }

    #[inline]
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    // =========================================================================
    // Constants
    // =========================================================================

    pub fn add_constant(&mut self, id: u32, constant: Constant) {
        self.constants.insert(id, constant);
    }

    #[inline]
    pub fn lookup_constant(&self, id: u32) -> Option<&Constant> {
        self.constants.get(id)
    }
}

impl Default for Chunk {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Chunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, instruction) in self.instructions.iter().enumerate() {
            writeln!(f, "  [{:02}] {}", index, instruction)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::Op;
    use crate::opcode::Gap;
    use crate::operand::Operand;

    #[test]
    fn test_new_has_entry_block() {
        let chunk = Chunk::new();
        assert_eq!(chunk.block_count(), 1);
        assert_eq!(chunk.blocks()[0].id, BlockId::ENTRY);
        assert!(chunk.instructions().is_empty());
    }

    #[test]
    fn test_emit_tracks_block_ranges() {
        let mut chunk = Chunk::new();
        let b1 = chunk.new_block();
        chunk.emit(BlockId::ENTRY, Instruction::new(Op::Label(Gap::new(BlockId::ENTRY))));
        chunk.emit(BlockId::ENTRY, Instruction::new(Op::Goto { block: b1 }));
        chunk.emit(b1, Instruction::new(Op::Label(Gap::new(b1))));

        let entry = chunk.block(BlockId::ENTRY).unwrap();
        assert_eq!((entry.first_instruction_index, entry.last_instruction_index), (0, 1));
        let b1 = chunk.block(b1).unwrap();
        assert_eq!((b1.first_instruction_index, b1.last_instruction_index), (2, 2));
    }

    #[test]
    fn test_display_lists_instructions() {
        let mut chunk = Chunk::new();
        chunk.emit(
            BlockId::ENTRY,
            Instruction::new(Op::Parameter).with_result(Operand::stack_slot(0)),
        );
        assert_eq!(chunk.to_string(), "  [00] parameter [stack:0] =\n");
    }

    #[test]
    #[should_panic(expected = "missing block")]
    fn test_emit_into_missing_block_panics() {
        let mut chunk = Chunk::new();
        chunk.emit(BlockId(5), Instruction::new(Op::Return));
    }
}
