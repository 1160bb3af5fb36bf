//! On-the-fly SSA construction.
//!
//! [`VRegState`] maps every register slot to its reaching definition while a
//! block is being built, and keeps the exit table of every finished block so
//! successors can merge them. Blocks are visited in reverse postorder, so all
//! predecessors of a block are finished before it unless the block is a loop
//! header. Loop headers get placeholder phis which are back-patched once the
//! last back edge is sealed.
//!
//! Each block moves through [`BlockPhase::Seeding`] (definitions inherited or
//! merged from predecessors), [`BlockPhase::Building`] (the instruction
//! builder reads and writes the table) and [`BlockPhase::Sealed`] (exit table
//! stored).

use std::collections::HashMap;

use crate::{
    bytecode::MethodBody,
    ir::{BlockId, DataType, EnvSlot, Graph, InstId, InstKind, VRegInfo, VRegKind},
    utils::BitSet,
    Result,
};

/// Layout of the definition table: frame registers, then the accumulator,
/// then the environment slots of methods that carry one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SlotLayout {
    num_vregs: u16,
    uses_environment: bool,
}

impl SlotLayout {
    pub(crate) fn new(method: &MethodBody) -> Self {
        Self {
            num_vregs: method.num_vregs,
            uses_environment: method.uses_environment,
        }
    }

    pub(crate) fn len(&self) -> usize {
        usize::from(self.num_vregs) + 1 + if self.uses_environment { EnvSlot::ALL.len() } else { 0 }
    }

    pub(crate) fn acc(&self) -> usize {
        usize::from(self.num_vregs)
    }

    pub(crate) fn env(&self, slot: EnvSlot) -> Option<usize> {
        if !self.uses_environment {
            return None;
        }
        let offset = EnvSlot::ALL.iter().position(|&s| s == slot)?;
        Some(self.acc() + 1 + offset)
    }

    pub(crate) fn kind(&self, slot: usize) -> VRegKind {
        let acc = self.acc();
        if slot < acc {
            VRegKind::Ordinary
        } else if slot == acc {
            VRegKind::Accumulator
        } else {
            VRegKind::Env(EnvSlot::ALL[(slot - acc - 1) % EnvSlot::ALL.len()])
        }
    }

    /// Describes the value `def` held in `slot` for a SaveState.
    pub(crate) fn info(&self, slot: usize, graph: &Graph, def: InstId) -> VRegInfo {
        let inst = graph.inst(def);
        let kind = self.kind(slot);
        let index = u16::try_from(slot).unwrap_or(u16::MAX);
        if inst.is_constant() {
            VRegInfo::constant(index, kind, inst.ty())
        } else {
            VRegInfo::new(index, kind, inst.ty())
        }
    }
}

/// Where a block is in its construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum BlockPhase {
    #[default]
    Unvisited,
    Seeding,
    Building,
    Sealed,
}

type DefTable = Vec<Option<InstId>>;

/// Per-slot reaching definitions.
pub(crate) struct VRegState {
    layout: SlotLayout,
    defs: DefTable,
    phases: Vec<BlockPhase>,
    exits: Vec<Option<DefTable>>,
    /// Placeholder phis per loop header, with the slot each stands for
    pending: HashMap<BlockId, Vec<(usize, InstId)>>,
    /// Phis merging a value that is undefined on some path
    undefined: Vec<InstId>,
}

impl VRegState {
    pub(crate) fn new(layout: SlotLayout, block_count: usize) -> Self {
        Self {
            layout,
            defs: vec![None; layout.len()],
            phases: vec![BlockPhase::Unvisited; block_count],
            exits: vec![None; block_count],
            pending: HashMap::new(),
            undefined: Vec::new(),
        }
    }

    pub(crate) fn layout(&self) -> SlotLayout {
        self.layout
    }

    pub(crate) fn phase(&self, block: BlockId) -> BlockPhase {
        self.phases
            .get(block.index())
            .copied()
            .unwrap_or(BlockPhase::Unvisited)
    }

    fn set_phase(&mut self, block: BlockId, phase: BlockPhase) {
        if block.index() >= self.phases.len() {
            self.phases.resize(block.index() + 1, BlockPhase::Unvisited);
            self.exits.resize(block.index() + 1, None);
        }
        self.phases[block.index()] = phase;
    }

    /// Starts `block` with an explicit table (start block parameters, catch
    /// entry phis).
    pub(crate) fn seed(&mut self, block: BlockId, defs: DefTable) {
        self.set_phase(block, BlockPhase::Seeding);
        self.defs = defs;
        self.defs.resize(self.layout.len(), None);
        self.set_phase(block, BlockPhase::Building);
    }

    /// Starts `block` from its predecessors' exit tables.
    pub(crate) fn begin_block(&mut self, graph: &mut Graph, block: BlockId) -> Result<()> {
        self.set_phase(block, BlockPhase::Seeding);
        let preds = graph.block(block).predecessors().to_vec();
        let all_sealed = preds
            .iter()
            .all(|&p| self.phase(p) == BlockPhase::Sealed);

        if graph.block(block).is_loop_header() || !all_sealed {
            self.seed_loop_header(graph, block);
        } else {
            self.merge_predecessors(graph, block, &preds)?;
        }
        self.set_phase(block, BlockPhase::Building);
        Ok(())
    }

    fn seed_loop_header(&mut self, graph: &mut Graph, block: BlockId) {
        let pc = graph.block(block).guest_pc();
        let mut placeholders = Vec::with_capacity(self.layout.len());
        for slot in 0..self.layout.len() {
            let phi = graph.create_inst(InstKind::Phi, DataType::NoType, pc);
            graph.append_phi(block, phi);
            placeholders.push((slot, phi));
            self.defs[slot] = Some(phi);
        }
        tracing::trace!(%block, phis = placeholders.len(), "seeded loop header");
        self.pending.insert(block, placeholders);
    }

    fn merge_predecessors(
        &mut self,
        graph: &mut Graph,
        block: BlockId,
        preds: &[BlockId],
    ) -> Result<()> {
        let tables = preds
            .iter()
            .map(|p| {
                self.exits[p.index()]
                    .clone()
                    .ok_or_else(|| graph_error!("predecessor {} of {} has no exit table", p, block))
            })
            .collect::<Result<Vec<_>>>()?;

        let Some((first, rest)) = tables.split_first() else {
            self.defs.iter_mut().for_each(|d| *d = None);
            return Ok(());
        };

        let pc = graph.block(block).guest_pc();
        for slot in 0..self.layout.len() {
            let head = first[slot];
            if rest.iter().all(|t| t[slot] == head) {
                self.defs[slot] = head;
                continue;
            }
            if tables.iter().any(|t| t[slot].is_none()) {
                self.defs[slot] = None;
                continue;
            }
            let phi = graph.create_inst(InstKind::Phi, DataType::NoType, pc);
            graph.append_phi(block, phi);
            for table in &tables {
                if let Some(def) = table[slot] {
                    let ty = graph.inst(def).ty();
                    graph.add_input(phi, def, ty);
                }
            }
            graph.inst_mut(phi).ty = merged_type(graph, phi);
            self.defs[slot] = Some(phi);
        }
        Ok(())
    }

    pub(crate) fn read(&self, slot: usize) -> Option<InstId> {
        self.defs.get(slot).copied().flatten()
    }

    pub(crate) fn write(&mut self, slot: usize, def: Option<InstId>) {
        if let Some(entry) = self.defs.get_mut(slot) {
            *entry = def;
        }
    }

    pub(crate) fn defs(&self) -> &[Option<InstId>] {
        &self.defs
    }

    /// Stores the exit table of `block` and back-patches every loop header
    /// whose predecessors are now all sealed.
    pub(crate) fn seal(&mut self, graph: &mut Graph, block: BlockId) {
        self.exits[block.index()] = Some(self.defs.clone());
        self.set_phase(block, BlockPhase::Sealed);

        let succs = graph.block(block).successors().to_vec();
        for succ in succs {
            if !self.pending.contains_key(&succ) {
                continue;
            }
            let ready = graph
                .block(succ)
                .predecessors()
                .iter()
                .all(|&p| self.phase(p) == BlockPhase::Sealed);
            if ready {
                self.patch_loop_header(graph, succ);
            }
        }
    }

    fn patch_loop_header(&mut self, graph: &mut Graph, header: BlockId) {
        let Some(placeholders) = self.pending.remove(&header) else {
            return;
        };
        let preds = graph.block(header).predecessors().to_vec();
        for (slot, phi) in placeholders {
            let inputs: Vec<Option<InstId>> = preds
                .iter()
                .map(|p| self.exits[p.index()].as_ref().and_then(|t| t[slot]))
                .collect();
            if inputs.iter().any(Option::is_none) {
                self.undefined.push(phi);
                continue;
            }
            for def in inputs.into_iter().flatten() {
                let ty = graph.inst(def).ty();
                graph.add_input(phi, def, ty);
            }
            graph.inst_mut(phi).ty = merged_type(graph, phi);
            graph.refresh_state_inputs(phi);
        }
        tracing::trace!(block = %header, "back-patched loop phis");
    }

    /// Ends construction, returning the phis that merge an undefined value.
    pub(crate) fn finish(&mut self) -> Result<Vec<InstId>> {
        if let Some(header) = self.pending.keys().next() {
            return Err(graph_error!("loop header {} was never sealed", header));
        }
        Ok(std::mem::take(&mut self.undefined))
    }
}

/// Type of a phi at creation: the inputs' type when they all agree,
/// [`DataType::NoType`] otherwise. Self references are ignored.
pub(crate) fn merged_type(graph: &Graph, phi: InstId) -> DataType {
    let mut types = graph
        .inst(phi)
        .inputs()
        .iter()
        .filter(|i| i.inst != phi)
        .map(|i| graph.inst(i.inst).ty());
    let Some(first) = types.next() else {
        return DataType::NoType;
    };
    if types.all(|t| t == first) {
        first
    } else {
        DataType::NoType
    }
}

/// Deletes phis that merge an undefined value, together with every phi that
/// consumes one of them.
///
/// SaveState uses of a deleted phi are dropped along with their register
/// annotation. Any other use means the bytecode reads a register that is not
/// defined on every path.
pub(crate) fn discard_undefined(graph: &mut Graph, seeds: Vec<InstId>) -> Result<usize> {
    let mut doomed = BitSet::new(graph.inst_count());
    let mut order = Vec::new();
    let mut worklist = seeds;
    while let Some(phi) = worklist.pop() {
        if graph.inst(phi).is_removed() || !doomed.insert(phi.index()) {
            continue;
        }
        order.push(phi);
        for &user in graph.inst(phi).users() {
            let inst = graph.inst(user);
            if inst.is_phi() {
                worklist.push(user);
            } else if !inst.is_save_state() {
                return Err(invalid_bytecode!(
                    inst.pc(),
                    "{} reads a register that is undefined on some path",
                    inst.kind().name()
                ));
            }
        }
    }

    for &phi in &order {
        let users = graph.inst(phi).users().to_vec();
        for user in users {
            if !graph.inst(user).is_save_state() {
                continue;
            }
            while let Some(pos) = graph.inst(user).inputs().iter().position(|i| i.inst == phi) {
                graph.remove_input(user, pos);
            }
        }
    }
    for &phi in &order {
        graph.remove_inst(phi);
    }
    if !order.is_empty() {
        tracing::trace!(count = order.len(), "discarded phis of undefined values");
    }
    Ok(order.len())
}
