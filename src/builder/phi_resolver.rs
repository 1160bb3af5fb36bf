//! Phi pruning and type inference.
//!
//! On-the-fly SSA construction creates phis eagerly: a placeholder per slot
//! at every loop header and a merge wherever predecessor definitions differ.
//! Most of them are never read. [`PhiResolver`] runs once after all blocks
//! are built and
//!
//! 1. deletes phis that no real instruction consumes (SaveState uses do not
//!    count and are dropped together with their register annotation),
//! 2. collapses phis whose inputs are all one definition,
//! 3. types the remaining `NoType` phis from their transitive real inputs.
//!
//! Steps 1 and 2 repeat until neither changes the graph. Running the resolver
//! a second time changes nothing.

use crate::{
    ir::{DataType, Graph, InstId, InstKind},
    utils::BitSet,
    Error, Result,
};

/// What one [`PhiResolver::run`] changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PhiResolverStats {
    /// Phis deleted because nothing real consumed them
    pub removed: usize,
    /// Phis replaced by their single input definition
    pub collapsed: usize,
    /// Phis given a type
    pub typed: usize,
    /// Phis typed [`DataType::Undefined`] for lack of any real input
    pub undefined: usize,
}

impl PhiResolverStats {
    /// Returns `true` if the run left the graph untouched.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Prunes and types the phis of a built graph.
///
/// # Examples
///
/// ```rust,no_run
/// use arkir::{builder::PhiResolver, ir::Graph};
///
/// fn settle(graph: &mut Graph) -> arkir::Result<()> {
///     let stats = PhiResolver::new(graph).run()?;
///     assert!(PhiResolver::new(graph).run()?.is_empty());
///     println!("removed {} phis", stats.removed);
///     Ok(())
/// }
/// ```
pub struct PhiResolver<'g> {
    graph: &'g mut Graph,
}

impl<'g> PhiResolver<'g> {
    /// Creates a resolver over `graph`.
    pub fn new(graph: &'g mut Graph) -> Self {
        Self { graph }
    }

    /// Runs pruning to a fixed point, then typing.
    ///
    /// # Errors
    ///
    /// [`Error::TypeInconsistency`] when a phi merges values of incompatible
    /// type classes, [`Error::GraphError`] for a phi whose input count does not
    /// match its block's predecessors.
    pub fn run(&mut self) -> Result<PhiResolverStats> {
        let mut stats = PhiResolverStats::default();
        loop {
            let removed = self.remove_dead_phis();
            let collapsed = self.collapse_trivial_phis()?;
            stats.removed += removed;
            stats.collapsed += collapsed;
            if removed == 0 && collapsed == 0 {
                break;
            }
        }
        self.infer_types(&mut stats)?;
        tracing::trace!(?stats, "resolved phis");
        Ok(stats)
    }

    fn phis(&self) -> Vec<InstId> {
        self.graph
            .insts_where(|i| i.is_phi())
            .map(|i| i.id())
            .collect()
    }

    /// Deletes every phi without a real consumer, directly or through other phis.
    fn remove_dead_phis(&mut self) -> usize {
        let phis = self.phis();
        let mut live = BitSet::new(self.graph.insts().count());
        let mut worklist = Vec::new();
        for &phi in &phis {
            let used = self.graph.inst(phi).users().iter().any(|&u| {
                let user = self.graph.inst(u);
                !user.is_phi() && !user.is_save_state()
            });
            if used && live.insert(phi.index()) {
                worklist.push(phi);
            }
        }
        while let Some(phi) = worklist.pop() {
            for input in self.graph.inst(phi).inputs() {
                if self.graph.inst(input.inst).is_phi() && live.insert(input.inst.index()) {
                    worklist.push(input.inst);
                }
            }
        }

        let dead: Vec<InstId> = phis
            .into_iter()
            .filter(|p| !live.contains(p.index()))
            .collect();
        for &phi in &dead {
            let users = self.graph.inst(phi).users().to_vec();
            for user in users {
                if !self.graph.inst(user).is_save_state() {
                    continue;
                }
                while let Some(pos) = self
                    .graph
                    .inst(user)
                    .inputs()
                    .iter()
                    .position(|i| i.inst == phi)
                {
                    self.graph.remove_input(user, pos);
                }
            }
        }
        for &phi in &dead {
            self.graph.remove_inst(phi);
        }
        dead.len()
    }

    /// Replaces phis whose inputs, self references aside, are one definition.
    fn collapse_trivial_phis(&mut self) -> Result<usize> {
        let mut collapsed = 0;
        for phi in self.phis() {
            if self.graph.inst(phi).is_removed() {
                continue;
            }
            let inst = self.graph.inst(phi);
            let mut distinct: Vec<InstId> = Vec::new();
            for input in inst.inputs() {
                if input.inst != phi && !distinct.contains(&input.inst) {
                    distinct.push(input.inst);
                }
            }

            if let [single] = distinct[..] {
                self.graph.replace_users(phi, single);
                self.graph.remove_inst(phi);
                self.graph.refresh_state_inputs(single);
                collapsed += 1;
                continue;
            }

            if matches!(inst.kind(), InstKind::Phi) {
                let preds = inst
                    .block()
                    .map_or(0, |b| self.graph.block(b).predecessors().len());
                if inst.inputs().len() != preds {
                    return Err(graph_error!(
                        "{} has {} inputs for {} predecessors",
                        phi,
                        inst.inputs().len(),
                        preds
                    ));
                }
            }
        }
        Ok(collapsed)
    }

    /// Non-phi definitions reaching `phi` through any chain of phis.
    fn real_inputs(&self, phi: InstId) -> Vec<InstId> {
        let mut visited = BitSet::new(0);
        let mut worklist = vec![phi];
        let mut real = Vec::new();
        visited.insert(phi.index());
        while let Some(current) = worklist.pop() {
            for input in self.graph.inst(current).inputs() {
                if !visited.insert(input.inst.index()) {
                    continue;
                }
                if self.graph.inst(input.inst).is_phi() {
                    worklist.push(input.inst);
                } else {
                    real.push(input.inst);
                }
            }
        }
        real
    }

    /// Integer constants do not pin a type; every other input must share its
    /// type class with the rest.
    fn infer_type(&self, phi: InstId) -> Result<DataType> {
        let mut merged: Option<DataType> = None;
        let mut int_constant = false;
        for input in self.real_inputs(phi) {
            let inst = self.graph.inst(input);
            if inst.is_int_constant() {
                int_constant = true;
                continue;
            }
            let ty = inst.ty();
            merged = Some(match merged {
                None => ty,
                Some(prev) => prev.merge(ty).ok_or(Error::TypeInconsistency {
                    phi,
                    first: prev,
                    second: ty,
                })?,
            });
        }

        match (merged, int_constant) {
            (Some(ty), true) if !ty.is_integer() => Err(Error::TypeInconsistency {
                phi,
                first: ty,
                second: DataType::Int64,
            }),
            (Some(ty), _) => Ok(ty),
            (None, true) => Ok(DataType::Int64),
            (None, false) => Ok(DataType::Undefined),
        }
    }

    fn infer_types(&mut self, stats: &mut PhiResolverStats) -> Result<()> {
        for phi in self.phis() {
            if self.graph.inst(phi).ty() != DataType::NoType {
                continue;
            }
            let ty = self.infer_type(phi)?;
            if ty == DataType::Undefined {
                tracing::warn!(%phi, method = %self.graph.method(), "phi has no real inputs");
                self.graph.set_non_optimizable();
                stats.undefined += 1;
            }
            self.set_type(phi, ty);
            stats.typed += 1;
        }
        Ok(())
    }

    /// Sets the type of `phi`, of its input edges and of the SaveState
    /// annotations recording it.
    fn set_type(&mut self, phi: InstId, ty: DataType) {
        let inst = self.graph.inst_mut(phi);
        inst.ty = ty;
        for input in &mut inst.inputs {
            input.ty = ty;
        }
        self.graph.refresh_state_inputs(phi);
    }
}
