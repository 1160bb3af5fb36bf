//! The try-order list.

use crate::{ir::BlockId, runtime::EntityId};

/// One handler of a try region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatchHandler {
    /// Exception class caught; `None` for a catch-all handler.
    pub type_id: Option<EntityId>,
    /// Bytecode offset of the handler code.
    pub handler_pc: u32,
    /// The catch-begin block dispatching into the handler.
    pub catch_begin: BlockId,
}

/// A try region as recorded in the graph.
///
/// The graph keeps these in bytecode emission order regardless of nesting;
/// re-encoding the method relies on that order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TryBlockInfo {
    /// Position of the region in the method's try table.
    pub index: usize,
    /// First covered pc.
    pub start_pc: u32,
    /// First pc after the region.
    pub end_pc: u32,
    /// The try-begin boundary block.
    pub begin: BlockId,
    /// The try-end boundary block.
    pub end: BlockId,
    /// Handlers in declaration order.
    pub handlers: Vec<CatchHandler>,
}

impl TryBlockInfo {
    /// Returns `true` if `pc` lies in the region.
    #[must_use]
    pub fn covers(&self, pc: u32) -> bool {
        self.start_pc <= pc && pc < self.end_pc
    }
}
