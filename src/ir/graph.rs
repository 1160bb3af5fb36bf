//! The graph arena.
//!
//! [`Graph`] owns every block and instruction built for one method. Blocks and
//! instructions refer to each other only through [`BlockId`] and [`InstId`]
//! handles, so the naturally cyclic structure (phi → input → user list → phi)
//! needs no reference counting; dropping the graph drops everything.
//!
//! Deleted instructions and unlinked blocks stay in the arena with their
//! `removed` flag set. Handles therefore never dangle, and iteration helpers
//! skip removed entries.

use std::collections::HashMap;

use crate::{
    ir::{
        BasicBlock, BlockFlags, BlockId, ConstValue, DataType, Input, Inst, InstId, InstKind,
        TryBlockInfo, UnresolvedTypesTable, VRegInfo,
    },
    runtime::EntityId,
    utils::graph::{
        algorithms::{compute_dominators, reverse_postorder, DominatorTree},
        NodeId, Predecessors, RootedGraph, Successors,
    },
};

/// The SSA graph of one method.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    method: EntityId,
    num_vregs: u16,
    num_args: u16,
    blocks: Vec<BasicBlock>,
    insts: Vec<Inst>,
    start: Option<BlockId>,
    constants: HashMap<(u8, u64), InstId>,
    null_ptr: Option<InstId>,
    params: Vec<InstId>,
    try_blocks: Vec<TryBlockInfo>,
    unresolved: UnresolvedTypesTable,
    non_optimizable: bool,
}

impl Graph {
    /// Creates an empty graph for `method`.
    #[must_use]
    pub fn new(method: EntityId, num_vregs: u16, num_args: u16) -> Self {
        Self {
            method,
            num_vregs,
            num_args,
            ..Self::default()
        }
    }

    /// Drops every block, instruction and per-build table so the arena can be
    /// reused for another method.
    pub fn reset(&mut self, method: EntityId, num_vregs: u16, num_args: u16) {
        self.method = method;
        self.num_vregs = num_vregs;
        self.num_args = num_args;
        self.blocks.clear();
        self.insts.clear();
        self.start = None;
        self.constants.clear();
        self.null_ptr = None;
        self.params.clear();
        self.try_blocks.clear();
        self.unresolved.clear();
        self.non_optimizable = false;
    }

    // ============================================================================================
    // Queries
    // ============================================================================================

    /// The method the graph was built for.
    #[must_use]
    pub fn method(&self) -> EntityId {
        self.method
    }

    /// Number of virtual registers (locals plus arguments).
    #[must_use]
    pub fn num_vregs(&self) -> u16 {
        self.num_vregs
    }

    /// Number of argument registers.
    #[must_use]
    pub fn num_args(&self) -> u16 {
        self.num_args
    }

    /// The start block, once created.
    #[must_use]
    pub fn start_block(&self) -> Option<BlockId> {
        self.start
    }

    /// Returns a block by handle, removed or not.
    #[must_use]
    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id.index()]
    }

    /// Returns an instruction by handle, removed or not.
    #[must_use]
    pub fn inst(&self, id: InstId) -> &Inst {
        &self.insts[id.index()]
    }

    /// Live blocks in arena order.
    pub fn blocks(&self) -> impl Iterator<Item = &BasicBlock> {
        self.blocks.iter().filter(|b| !b.removed)
    }

    /// Live instructions in arena order.
    pub fn insts(&self) -> impl Iterator<Item = &Inst> {
        self.insts.iter().filter(|i| !i.removed)
    }

    /// Live instructions matching `pred`.
    pub fn insts_where<'g>(
        &'g self,
        pred: impl Fn(&Inst) -> bool + 'g,
    ) -> impl Iterator<Item = &'g Inst> + 'g {
        self.insts().filter(move |i| pred(i))
    }

    /// Number of live blocks, boundary blocks included.
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.blocks().count()
    }

    /// Number of live instructions.
    #[must_use]
    pub fn inst_count(&self) -> usize {
        self.insts().count()
    }

    /// Parameter instructions in argument order.
    #[must_use]
    pub fn parameters(&self) -> &[InstId] {
        &self.params
    }

    /// Try regions in bytecode emission order.
    #[must_use]
    pub fn try_blocks(&self) -> &[TryBlockInfo] {
        &self.try_blocks
    }

    /// Slots registered for runtime resolution.
    #[must_use]
    pub fn unresolved_types(&self) -> &UnresolvedTypesTable {
        &self.unresolved
    }

    /// Returns `true` if the build hit an anomaly that makes the graph unfit
    /// for optimization (a phi without any real input).
    #[must_use]
    pub fn is_non_optimizable(&self) -> bool {
        self.non_optimizable
    }

    /// Computes the dominator tree over normal edges.
    #[must_use]
    pub fn dominators(&self) -> DominatorTree {
        compute_dominators(self)
    }

    /// Live blocks reachable from the start block, in reverse postorder.
    #[must_use]
    pub fn rpo(&self) -> Vec<BlockId> {
        match self.start {
            Some(start) => reverse_postorder(self, start),
            None => Vec::new(),
        }
    }

    /// Follows an instruction's definition through check nodes to the value
    /// they guard.
    #[must_use]
    pub fn skip_checks(&self, mut id: InstId) -> InstId {
        loop {
            let inst = self.inst(id);
            match inst.kind {
                InstKind::NullCheck
                | InstKind::ZeroCheck
                | InstKind::NegativeCheck
                | InstKind::RefTypeCheck => match inst.input(0) {
                    Some(input) => id = input,
                    None => return id,
                },
                _ => return id,
            }
        }
    }

    // ============================================================================================
    // Blocks and edges
    // ============================================================================================

    pub(crate) fn add_block(&mut self, guest_pc: Option<u32>, flags: BlockFlags) -> BlockId {
        let id = BlockId::new(self.blocks.len());
        self.blocks.push(BasicBlock::new(id, guest_pc, flags));
        if flags.contains(BlockFlags::START) {
            self.start = Some(id);
        }
        id
    }

    pub(crate) fn add_edge(&mut self, from: BlockId, to: BlockId) {
        self.blocks[from.index()].succs.push(to);
        self.blocks[to.index()].preds.push(from);
    }

    /// Redirects the edge `from -> old` to `from -> new`, keeping the
    /// successor's position in `from`.
    pub(crate) fn replace_successor(&mut self, from: BlockId, old: BlockId, new: BlockId) {
        if let Some(pos) = self.blocks[from.index()].succs.iter().position(|&s| s == old) {
            self.replace_successor_at(from, pos, new);
        }
    }

    /// Redirects successor `index` of `from` to `new`.
    pub(crate) fn replace_successor_at(&mut self, from: BlockId, index: usize, new: BlockId) {
        let Some(&old) = self.blocks[from.index()].succs.get(index) else {
            return;
        };
        self.blocks[from.index()].succs[index] = new;
        let preds = &mut self.blocks[old.index()].preds;
        if let Some(p) = preds.iter().position(|&p| p == from) {
            preds.remove(p);
        }
        self.blocks[new.index()].preds.push(from);
    }

    pub(crate) fn add_exception_edge(&mut self, from: BlockId, to: BlockId) {
        if self.blocks[from.index()].exception_succs.contains(&to) {
            return;
        }
        self.blocks[from.index()].exception_succs.push(to);
        self.blocks[to.index()].exception_preds.push(from);
    }

    /// Drops every edge touching `id` and marks it removed.
    pub(crate) fn unlink_block(&mut self, id: BlockId) {
        self.clear_edges(id);
        self.blocks[id.index()].removed = true;
    }

    /// Drops every edge touching `id`, keeping the block.
    pub(crate) fn clear_edges(&mut self, id: BlockId) {
        let succs = std::mem::take(&mut self.blocks[id.index()].succs);
        for succ in succs {
            self.blocks[succ.index()].preds.retain(|&p| p != id);
        }
        let preds = std::mem::take(&mut self.blocks[id.index()].preds);
        for pred in preds {
            self.blocks[pred.index()].succs.retain(|&s| s != id);
        }
        let exc_succs = std::mem::take(&mut self.blocks[id.index()].exception_succs);
        for succ in exc_succs {
            self.blocks[succ.index()].exception_preds.retain(|&p| p != id);
        }
        let exc_preds = std::mem::take(&mut self.blocks[id.index()].exception_preds);
        for pred in exc_preds {
            self.blocks[pred.index()].exception_succs.retain(|&s| s != id);
        }
    }

    pub(crate) fn set_block_flag(&mut self, id: BlockId, flag: BlockFlags) {
        self.blocks[id.index()].flags.insert(flag);
    }

    pub(crate) fn push_try_block(&mut self, info: TryBlockInfo) {
        self.try_blocks.push(info);
    }

    // ============================================================================================
    // Instructions
    // ============================================================================================

    /// Allocates an instruction that is not yet part of any block.
    pub(crate) fn create_inst(&mut self, kind: InstKind, ty: DataType, pc: Option<u32>) -> InstId {
        let id = InstId::new(self.insts.len());
        self.insts.push(Inst::new(id, kind, ty, pc));
        id
    }

    pub(crate) fn inst_mut(&mut self, id: InstId) -> &mut Inst {
        &mut self.insts[id.index()]
    }

    pub(crate) fn append_inst(&mut self, block: BlockId, id: InstId) {
        self.insts[id.index()].block = Some(block);
        self.blocks[block.index()].insts.push(id);
    }

    pub(crate) fn append_phi(&mut self, block: BlockId, id: InstId) {
        self.insts[id.index()].block = Some(block);
        self.blocks[block.index()].phis.push(id);
    }

    pub(crate) fn add_input(&mut self, inst: InstId, input: InstId, ty: DataType) {
        self.insts[inst.index()].inputs.push(Input::new(input, ty));
        self.insts[input.index()].users.push(inst);
    }

    /// Adds a SaveState input together with the register it stands for.
    pub(crate) fn add_state_input(&mut self, state: InstId, input: InstId, vreg: VRegInfo) {
        self.add_input(state, input, vreg.ty());
        self.insts[state.index()].vregs.push(vreg);
    }

    /// Rewrites every SaveState input recording `def`, edge type and register
    /// annotation alike, from the current type and kind of `def`.
    pub(crate) fn refresh_state_inputs(&mut self, def: InstId) {
        let (ty, constant) = {
            let d = &self.insts[def.index()];
            (d.ty, d.is_constant())
        };
        let mut users = self.insts[def.index()].users.clone();
        users.sort_unstable();
        users.dedup();
        for user in users {
            let node = &mut self.insts[user.index()];
            if !node.is_save_state() {
                continue;
            }
            for (input, vreg) in node.inputs.iter_mut().zip(node.vregs.iter_mut()) {
                if input.inst == def {
                    input.ty = ty;
                    vreg.set_value(ty, constant);
                }
            }
        }
    }

    /// Removes input `index`, and its register annotation for SaveStates.
    pub(crate) fn remove_input(&mut self, inst: InstId, index: usize) {
        let node = &mut self.insts[inst.index()];
        let removed = node.inputs.remove(index);
        if index < node.vregs.len() {
            node.vregs.remove(index);
        }
        Self::drop_one_use(&mut self.insts[removed.inst.index()].users, inst);
    }

    /// Points every use of `old` at `new`.
    pub(crate) fn replace_users(&mut self, old: InstId, new: InstId) {
        if old == new {
            return;
        }
        // The user list holds one entry per use, so each entry moves over once.
        let users = std::mem::take(&mut self.insts[old.index()].users);
        for user in users {
            for input in &mut self.insts[user.index()].inputs {
                if input.inst == old {
                    input.inst = new;
                }
            }
            self.insts[new.index()].users.push(user);
        }
    }

    /// Deletes an instruction: detaches it from its inputs' user lists and
    /// from its block. Callers rewire or drop its users first.
    pub(crate) fn remove_inst(&mut self, id: InstId) {
        let inputs = std::mem::take(&mut self.insts[id.index()].inputs);
        for input in inputs {
            Self::drop_one_use(&mut self.insts[input.inst.index()].users, id);
        }
        self.insts[id.index()].vregs.clear();
        if let Some(block) = self.insts[id.index()].block {
            let b = &mut self.blocks[block.index()];
            b.phis.retain(|&i| i != id);
            b.insts.retain(|&i| i != id);
        }
        self.insts[id.index()].removed = true;
    }

    fn drop_one_use(users: &mut Vec<InstId>, user: InstId) {
        if let Some(pos) = users.iter().position(|&u| u == user) {
            users.swap_remove(pos);
        }
    }

    /// Returns the deduplicated constant `value`, creating it in the start block.
    pub(crate) fn find_or_create_constant(&mut self, value: ConstValue) -> InstId {
        if let Some(&id) = self.constants.get(&value.key()) {
            return id;
        }
        let id = self.create_inst(InstKind::Constant(value), value.ty(), None);
        if let Some(start) = self.start {
            self.append_inst(start, id);
        }
        self.constants.insert(value.key(), id);
        id
    }

    /// Returns the null reference constant, creating it in the start block.
    pub(crate) fn find_or_create_null_ptr(&mut self) -> InstId {
        if let Some(id) = self.null_ptr {
            return id;
        }
        let id = self.create_inst(InstKind::NullPtr, DataType::Reference, None);
        if let Some(start) = self.start {
            self.append_inst(start, id);
        }
        self.null_ptr = Some(id);
        id
    }

    pub(crate) fn add_parameter(&mut self, index: u16, ty: DataType) -> InstId {
        let id = self.create_inst(InstKind::Parameter { index }, ty, None);
        if let Some(start) = self.start {
            self.append_inst(start, id);
        }
        self.params.push(id);
        id
    }

    pub(crate) fn set_non_optimizable(&mut self) {
        self.non_optimizable = true;
    }

    pub(crate) fn unresolved_types_mut(&mut self) -> &mut UnresolvedTypesTable {
        &mut self.unresolved
    }
}

impl Successors for Graph {
    fn node_count(&self) -> usize {
        self.blocks.len()
    }

    fn successors(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.blocks[node.index()].succs.iter().copied()
    }
}

impl Predecessors for Graph {
    fn predecessors(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.blocks[node.index()].preds.iter().copied()
    }
}

impl RootedGraph for Graph {
    fn entry(&self) -> NodeId {
        self.start.unwrap_or(NodeId::new(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph_with_blocks(n: usize) -> (Graph, Vec<BlockId>) {
        let mut graph = Graph::new(EntityId(1), 2, 0);
        let mut ids = vec![graph.add_block(None, BlockFlags::START)];
        for pc in 1..n {
            ids.push(graph.add_block(Some(pc as u32), BlockFlags::empty()));
        }
        (graph, ids)
    }

    #[test]
    fn test_constants_are_deduplicated() {
        let (mut graph, _) = graph_with_blocks(1);
        let a = graph.find_or_create_constant(ConstValue::Int(1));
        let b = graph.find_or_create_constant(ConstValue::Int(1));
        let c = graph.find_or_create_constant(ConstValue::Float64(1.0));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(graph.inst(a).ty(), DataType::Int64);
    }

    #[test]
    fn test_replace_users_moves_every_use() {
        let (mut graph, blocks) = graph_with_blocks(2);
        let one = graph.find_or_create_constant(ConstValue::Int(1));
        let two = graph.find_or_create_constant(ConstValue::Int(2));
        let add = graph.create_inst(
            InstKind::Binary(crate::ir::BinaryOp::Add),
            DataType::Int32,
            Some(0),
        );
        graph.add_input(add, one, DataType::Int32);
        graph.add_input(add, one, DataType::Int32);
        graph.append_inst(blocks[1], add);

        graph.replace_users(one, two);
        assert!(graph.inst(one).users().is_empty());
        assert_eq!(graph.inst(two).users(), &[add, add]);
        assert_eq!(graph.inst(add).input(1), Some(two));
    }

    #[test]
    fn test_replace_successor_keeps_position() {
        let (mut graph, b) = graph_with_blocks(4);
        graph.add_edge(b[0], b[1]);
        graph.add_edge(b[0], b[2]);
        graph.replace_successor(b[0], b[1], b[3]);
        assert_eq!(graph.block(b[0]).successors(), &[b[3], b[2]]);
        assert!(graph.block(b[1]).predecessors().is_empty());
        assert_eq!(graph.block(b[3]).predecessors(), &[b[0]]);
    }

    #[test]
    fn test_unlink_and_reset() {
        let (mut graph, b) = graph_with_blocks(3);
        graph.add_edge(b[0], b[1]);
        graph.add_edge(b[2], b[1]);
        graph.unlink_block(b[2]);
        assert_eq!(graph.block_count(), 2);
        assert_eq!(graph.block(b[1]).predecessors(), &[b[0]]);

        graph.reset(EntityId(2), 1, 1);
        assert_eq!(graph.block_count(), 0);
        assert_eq!(graph.inst_count(), 0);
        assert!(graph.unresolved_types().is_empty());
        assert_eq!(graph.method(), EntityId(2));
    }
}
