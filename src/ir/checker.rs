//! Structural verification of a built graph.
//!
//! The checker is run after the build when [`crate::BuilderConfig::verify_graph`]
//! is set, and by the tests on every graph they inspect. Each violated
//! invariant is reported as [`crate::Error::GraphError`] naming the offending
//! block or instruction.

use crate::{
    ir::{BlockFlags, BlockId, Graph, Inst, InstId, InstKind, VRegLocation},
    utils::graph::algorithms::DominatorTree,
    Result,
};

/// Verifies the structural invariants of a [`Graph`].
pub struct GraphChecker<'g> {
    graph: &'g Graph,
    dominators: DominatorTree,
}

impl<'g> GraphChecker<'g> {
    /// Prepares a checker for `graph`.
    #[must_use]
    pub fn new(graph: &'g Graph) -> Self {
        Self {
            graph,
            dominators: graph.dominators(),
        }
    }

    /// Runs every check, stopping at the first violation.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::GraphError`] describing the first broken invariant.
    pub fn check(&self) -> Result<()> {
        self.check_edges()?;
        self.check_def_use()?;
        self.check_phis()?;
        self.check_save_states()?;
        self.check_try_regions()?;
        Ok(())
    }

    fn check_edges(&self) -> Result<()> {
        for block in self.graph.blocks() {
            for &succ in block.successors() {
                let target = self.graph.block(succ);
                if target.is_removed() {
                    return Err(graph_error!("{} has removed successor {}", block.id(), succ));
                }
                let forward = block.successors().iter().filter(|&&s| s == succ).count();
                let backward = target
                    .predecessors()
                    .iter()
                    .filter(|&&p| p == block.id())
                    .count();
                if forward != backward {
                    return Err(graph_error!(
                        "edge {} -> {} is not mirrored in the predecessor list",
                        block.id(),
                        succ
                    ));
                }
            }
            for &succ in block.exception_successors() {
                if !self.graph.block(succ).is_catch_begin() {
                    return Err(graph_error!(
                        "exception edge {} -> {} does not target a catch entry",
                        block.id(),
                        succ
                    ));
                }
            }
        }
        Ok(())
    }

    fn check_def_use(&self) -> Result<()> {
        for inst in self.graph.insts() {
            if inst.block().is_none() {
                return Err(graph_error!("{} is not placed in a block", inst.id()));
            }
            for input in inst.inputs() {
                let def = self.graph.inst(input.inst);
                if def.is_removed() {
                    return Err(graph_error!("{} uses removed {}", inst.id(), input.inst));
                }
                let uses = inst.inputs().iter().filter(|i| i.inst == input.inst).count();
                let recorded = def.users().iter().filter(|&&u| u == inst.id()).count();
                if uses != recorded {
                    return Err(graph_error!(
                        "{} uses {} {} times but is listed {} times as its user",
                        inst.id(),
                        input.inst,
                        uses,
                        recorded
                    ));
                }
            }
        }
        Ok(())
    }

    fn check_phis(&self) -> Result<()> {
        for block in self.graph.blocks() {
            for &phi_id in block.phis() {
                let phi = self.graph.inst(phi_id);
                match phi.kind() {
                    InstKind::Phi => {
                        if phi.inputs().len() != block.predecessors().len() {
                            return Err(graph_error!(
                                "{} in {} has {} inputs for {} predecessors",
                                phi_id,
                                block.id(),
                                phi.inputs().len(),
                                block.predecessors().len()
                            ));
                        }
                        for (input, &pred) in phi.inputs().iter().zip(block.predecessors()) {
                            self.check_dominates_block(input.inst, pred, phi_id)?;
                        }
                    }
                    InstKind::CatchPhi { throwers } => {
                        if !block.is_catch_begin() {
                            return Err(graph_error!(
                                "catch phi {} outside a catch entry ({})",
                                phi_id,
                                block.id()
                            ));
                        }
                        if throwers.len() != phi.inputs().len() {
                            return Err(graph_error!(
                                "catch phi {} has {} inputs for {} throwers",
                                phi_id,
                                phi.inputs().len(),
                                throwers.len()
                            ));
                        }
                    }
                    _ => {
                        return Err(graph_error!("{} in the phi list is not a phi", phi_id));
                    }
                }
            }
        }
        Ok(())
    }

    fn check_save_states(&self) -> Result<()> {
        for block in self.graph.blocks() {
            for (pos, &id) in block.insts().iter().enumerate() {
                let inst = self.graph.inst(id);
                if inst.is_save_state() && inst.vregs().len() != inst.inputs().len() {
                    return Err(graph_error!(
                        "{} has {} inputs but {} register annotations",
                        id,
                        inst.inputs().len(),
                        inst.vregs().len()
                    ));
                }
                if inst.is_save_state() {
                    self.check_annotations(id, inst)?;
                }
                if !inst.requires_state() {
                    continue;
                }
                let Some(state) = inst.save_state() else {
                    return Err(graph_error!("{} requires a SaveState but has no inputs", id));
                };
                let state_inst = self.graph.inst(state);
                if !state_inst.is_save_state() {
                    return Err(graph_error!(
                        "last input of {} is {}, not a SaveState",
                        id,
                        state_inst.kind().name()
                    ));
                }
                let earlier = block.insts()[..pos].contains(&state);
                if state_inst.block() != Some(block.id()) || !earlier {
                    return Err(graph_error!(
                        "SaveState {} of {} does not precede it in {}",
                        state,
                        id,
                        block.id()
                    ));
                }
            }
        }
        Ok(())
    }

    /// Every live annotation of a SaveState must describe its definition as
    /// it is now: same type, constant location iff the definition is a constant.
    fn check_annotations(&self, id: InstId, state: &Inst) -> Result<()> {
        for (input, vreg) in state.inputs().iter().zip(state.vregs()) {
            if !vreg.is_live() {
                continue;
            }
            let def = self.graph.inst(input.inst);
            let location = if def.is_constant() {
                VRegLocation::Constant
            } else {
                VRegLocation::Slot
            };
            if input.ty != def.ty() || vreg.ty() != def.ty() || vreg.location() != location {
                return Err(graph_error!(
                    "{} records {} as {:?} in {:?}, but it is {:?} in {:?}",
                    id,
                    input.inst,
                    vreg.ty(),
                    vreg.location(),
                    def.ty(),
                    location
                ));
            }
        }
        Ok(())
    }

    fn check_try_regions(&self) -> Result<()> {
        for info in self.graph.try_blocks() {
            let begin = self.graph.block(info.begin);
            let end = self.graph.block(info.end);
            if !begin.flags().contains(BlockFlags::TRY_BEGIN) {
                return Err(graph_error!("{} is not flagged as try-begin", info.begin));
            }
            if !end.flags().contains(BlockFlags::TRY_END) {
                return Err(graph_error!("{} is not flagged as try-end", info.end));
            }
            for handler in &info.handlers {
                if !self.graph.block(handler.catch_begin).is_catch_begin() {
                    return Err(graph_error!(
                        "handler at pc {} has no catch entry",
                        handler.handler_pc
                    ));
                }
            }
        }
        for block in self.graph.blocks() {
            let Some(pc) = block.guest_pc() else {
                continue;
            };
            if block.is_boundary() || block.is_start() {
                continue;
            }
            let covered = self.graph.try_blocks().iter().any(|t| t.covers(pc));
            if covered != block.flags().contains(BlockFlags::TRY) {
                return Err(graph_error!(
                    "{} at pc {} has an inconsistent try flag",
                    block.id(),
                    pc
                ));
            }
        }
        Ok(())
    }

    /// Values defined inside a try region reach its handlers along exception
    /// edges, which the dominator tree does not see: `pred` is accepted if a
    /// catch entry dominating it belongs to a region whose try-begin
    /// dominates `def_block`.
    fn reaches_by_throw(&self, def_block: BlockId, pred: BlockId) -> bool {
        let mut current = Some(pred);
        while let Some(block) = current {
            let b = self.graph.block(block);
            if b.is_catch_begin() {
                let covered = b.predecessors().iter().any(|&p| {
                    self.graph.block(p).is_try_begin() && self.dominators.dominates(p, def_block)
                });
                if covered {
                    return true;
                }
            }
            current = self
                .dominators
                .immediate_dominator(block)
                .filter(|&idom| idom != block);
        }
        false
    }

    /// A phi input must dominate the end of the predecessor it flows from.
    fn check_dominates_block(
        &self,
        def: InstId,
        pred: BlockId,
        phi: InstId,
    ) -> Result<()> {
        let Some(def_block) = self.graph.inst(def).block() else {
            return Err(graph_error!("input {} of {} is not placed", def, phi));
        };
        if !self.dominators.is_reachable(pred) {
            return Ok(());
        }
        if !self.dominators.dominates(def_block, pred) && !self.reaches_by_throw(def_block, pred) {
            return Err(graph_error!(
                "input {} of {} does not dominate predecessor {}",
                def,
                phi,
                pred
            ));
        }
        Ok(())
    }
}
