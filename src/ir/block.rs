//! Basic blocks.

use bitflags::bitflags;

use crate::{ir::InstId, utils::graph::NodeId};

/// Handle of a basic block in its graph arena.
pub type BlockId = NodeId;

bitflags! {
    /// Structural role of a basic block.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct BlockFlags : u32 {
        /// The synthetic entry block holding constants and parameters
        const START = 0x0001;
        /// Empty block entering a try region
        const TRY_BEGIN = 0x0002;
        /// Empty block leaving a try region
        const TRY_END = 0x0004;
        /// Code covered by at least one try region
        const TRY = 0x0008;
        /// Catch entry holding catch phis and the exception object
        const CATCH_BEGIN = 0x0010;
        /// Handler code reached from a catch entry
        const CATCH = 0x0020;
        /// Target of a back edge
        const LOOP_HEADER = 0x0040;
        /// Boundary block no path reaches; kept for try-order bookkeeping
        const UNREACHABLE = 0x0080;
    }
}

/// An ordered sequence of instructions with its control-flow edges.
///
/// Normal edges (`preds`/`succs`) describe ordinary control flow and phi
/// input order. Exception edges connect blocks containing potentially throwing
/// instructions to the catch entries of the covering try regions.
#[derive(Debug, Clone)]
pub struct BasicBlock {
    pub(crate) id: BlockId,
    pub(crate) guest_pc: Option<u32>,
    pub(crate) flags: BlockFlags,
    pub(crate) phis: Vec<InstId>,
    pub(crate) insts: Vec<InstId>,
    pub(crate) preds: Vec<BlockId>,
    pub(crate) succs: Vec<BlockId>,
    pub(crate) exception_preds: Vec<BlockId>,
    pub(crate) exception_succs: Vec<BlockId>,
    pub(crate) removed: bool,
}

impl BasicBlock {
    pub(crate) fn new(id: BlockId, guest_pc: Option<u32>, flags: BlockFlags) -> Self {
        Self {
            id,
            guest_pc,
            flags,
            phis: Vec::new(),
            insts: Vec::new(),
            preds: Vec::new(),
            succs: Vec::new(),
            exception_preds: Vec::new(),
            exception_succs: Vec::new(),
            removed: false,
        }
    }

    /// The block's handle.
    #[must_use]
    pub fn id(&self) -> BlockId {
        self.id
    }

    /// Bytecode offset of the block's first instruction. Boundary blocks carry
    /// the pc of the region edge they bracket.
    #[must_use]
    pub fn guest_pc(&self) -> Option<u32> {
        self.guest_pc
    }

    /// The block's flags.
    #[must_use]
    pub fn flags(&self) -> BlockFlags {
        self.flags
    }

    /// Phis and catch phis, in creation order.
    #[must_use]
    pub fn phis(&self) -> &[InstId] {
        &self.phis
    }

    /// Non-phi instructions in program order.
    #[must_use]
    pub fn insts(&self) -> &[InstId] {
        &self.insts
    }

    /// Phis followed by instructions.
    pub fn all_insts(&self) -> impl Iterator<Item = InstId> + '_ {
        self.phis.iter().chain(self.insts.iter()).copied()
    }

    /// Predecessors along normal edges, in phi-input order.
    #[must_use]
    pub fn predecessors(&self) -> &[BlockId] {
        &self.preds
    }

    /// Successors along normal edges. For a conditional branch the taken
    /// target comes first.
    #[must_use]
    pub fn successors(&self) -> &[BlockId] {
        &self.succs
    }

    /// Blocks throwing into this catch entry.
    #[must_use]
    pub fn exception_predecessors(&self) -> &[BlockId] {
        &self.exception_preds
    }

    /// Catch entries this block may throw into, innermost region first and
    /// in handler-declaration order within a region.
    #[must_use]
    pub fn exception_successors(&self) -> &[BlockId] {
        &self.exception_succs
    }

    /// The synthetic entry block.
    #[must_use]
    pub fn is_start(&self) -> bool {
        self.flags.contains(BlockFlags::START)
    }

    /// Entry block of a try region.
    #[must_use]
    pub fn is_try_begin(&self) -> bool {
        self.flags.contains(BlockFlags::TRY_BEGIN)
    }

    /// Exit block of a try region.
    #[must_use]
    pub fn is_try_end(&self) -> bool {
        self.flags.contains(BlockFlags::TRY_END)
    }

    /// Catch entry block.
    #[must_use]
    pub fn is_catch_begin(&self) -> bool {
        self.flags.contains(BlockFlags::CATCH_BEGIN)
    }

    /// Target of a back edge.
    #[must_use]
    pub fn is_loop_header(&self) -> bool {
        self.flags.contains(BlockFlags::LOOP_HEADER)
    }

    /// Boundary block flagged unreachable.
    #[must_use]
    pub fn is_unreachable(&self) -> bool {
        self.flags.contains(BlockFlags::UNREACHABLE)
    }

    /// Boundary blocks are the synthetic try-begin, try-end and catch-begin blocks.
    #[must_use]
    pub fn is_boundary(&self) -> bool {
        self.flags
            .intersects(BlockFlags::TRY_BEGIN | BlockFlags::TRY_END | BlockFlags::CATCH_BEGIN)
    }

    /// Returns `true` once the block was unlinked from the graph.
    #[must_use]
    pub fn is_removed(&self) -> bool {
        self.removed
    }
}
