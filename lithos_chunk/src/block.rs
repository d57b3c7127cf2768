//! Basic blocks of a compiled chunk.
//!
//! Blocks carry only the metadata the code generator consults after
//! lowering; instruction ranges index into the chunk's instruction list.

use std::fmt;

/// Block index within its chunk. Block 0 is the entry block.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);

impl BlockId {
    pub const ENTRY: BlockId = BlockId(0);

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "B{}", self.0)
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "B{}", self.0)
    }
}

/// Position in unoptimized code where execution resumes on bailout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BailoutId(pub i32);

impl BailoutId {
    pub const NONE: BailoutId = BailoutId(-1);

    #[inline]
    pub const fn is_none(self) -> bool {
        self.0 == Self::NONE.0
    }
}

impl Default for BailoutId {
    fn default() -> Self {
        Self::NONE
    }
}

bitflags::bitflags! {
    /// Per-block flags preserved across save/load.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct BlockFlags: u8 {
        const LOOP_HEADER               = 1 << 0;
        const REACHABLE                 = 1 << 1;
        const LOOP_SUCCESSOR_DOMINATOR  = 1 << 2;
        const OSR_ENTRY                 = 1 << 3;
        const ORDERED                   = 1 << 4;
    }
}

/// A basic block.
#[derive(Debug, Clone, PartialEq)]
pub struct BasicBlock {
    pub id: BlockId,
    pub entry_bailout_id: BailoutId,
    pub flags: BlockFlags,
    /// Continuation block when this block ends an inlined call.
    pub inline_return_target: Option<BlockId>,
    /// First instruction index, or -1 before lowering.
    pub first_instruction_index: i32,
    /// Last instruction index, or -1 before lowering.
    pub last_instruction_index: i32,
}

impl BasicBlock {
    pub fn new(id: BlockId) -> Self {
        BasicBlock {
            id,
            entry_bailout_id: BailoutId::NONE,
            flags: BlockFlags::REACHABLE,
            inline_return_target: None,
            first_instruction_index: -1,
            last_instruction_index: -1,
        }
    }

    #[inline]
    pub fn is_loop_header(&self) -> bool {
        self.flags.contains(BlockFlags::LOOP_HEADER)
    }

    #[inline]
    pub fn is_reachable(&self) -> bool {
        self.flags.contains(BlockFlags::REACHABLE)
    }

    #[inline]
    pub fn is_osr_entry(&self) -> bool {
        self.flags.contains(BlockFlags::OSR_ENTRY)
    }
}
