//! Try regions, throw edges and catch phis.
//!
//! A pc may be covered by several nested regions. Regions are well nested:
//! two regions are either disjoint or one contains the other, and a thrown
//! exception is offered to the innermost region's handlers first. The
//! resolver answers coverage queries in that order, wires exception edges
//! from throwing blocks to catch entries, and owns the catch phis that merge
//! the register state of every throwing instruction.

use std::collections::HashMap;

use crate::{
    builder::vregs::{discard_undefined, merged_type, SlotLayout},
    bytecode::{MethodBody, TryBlock},
    config::BuilderConfig,
    error::LimitKind,
    ir::{BlockId, DataType, Graph, InstId, InstKind},
    utils::BitSet,
    Error, Result,
};

/// Catch phis of one catch entry, one per slot (`None` for the accumulator,
/// which is defined by the exception object instead).
struct CatchEntry {
    phis: Vec<Option<InstId>>,
    exception: InstId,
}

pub(crate) struct ExceptionRegionResolver<'m> {
    regions: &'m [TryBlock],
    /// Per region, regions ordered innermost first
    nesting: Vec<usize>,
    catches: HashMap<BlockId, CatchEntry>,
    /// Catch phis that saw an undefined slot
    undefined: BitSet,
}

impl<'m> ExceptionRegionResolver<'m> {
    /// Validates the try table of `method`.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidBytecode`] for an empty, out-of-bounds or partially
    /// overlapping region, [`Error::MethodTooLarge`] for nesting deeper than
    /// the configured limit.
    pub(crate) fn new(method: &'m MethodBody, config: &BuilderConfig) -> Result<Self> {
        let regions = method.try_blocks.as_slice();
        let end_pc = method.end_pc();
        for region in regions {
            if region.start_pc >= region.end_pc || region.end_pc > end_pc {
                return Err(invalid_bytecode!(
                    Some(region.start_pc),
                    "try region [{}, {}) is empty or exceeds the method",
                    region.start_pc,
                    region.end_pc
                ));
            }
            if region.catches.is_empty() {
                return Err(invalid_bytecode!(
                    Some(region.start_pc),
                    "try region without handlers"
                ));
            }
            for catch in &region.catches {
                if method.index_of(catch.handler_pc).is_none() {
                    return Err(invalid_bytecode!(
                        Some(catch.handler_pc),
                        "handler pc is not an instruction boundary"
                    ));
                }
            }
        }

        for (i, a) in regions.iter().enumerate() {
            for b in &regions[i + 1..] {
                let disjoint = a.end_pc <= b.start_pc || b.end_pc <= a.start_pc;
                let nested = (a.start_pc <= b.start_pc && b.end_pc <= a.end_pc)
                    || (b.start_pc <= a.start_pc && a.end_pc <= b.end_pc);
                if !disjoint && !nested {
                    return Err(invalid_bytecode!(
                        Some(b.start_pc),
                        "try regions [{}, {}) and [{}, {}) overlap without nesting",
                        a.start_pc,
                        a.end_pc,
                        b.start_pc,
                        b.end_pc
                    ));
                }
            }
        }

        let mut nesting: Vec<usize> = (0..regions.len()).collect();
        nesting.sort_by_key(|&i| (regions[i].len(), i));

        let resolver = Self {
            regions,
            nesting,
            catches: HashMap::new(),
            undefined: BitSet::new(0),
        };
        for region in regions {
            let depth = resolver.covering_try_blocks(region.start_pc).len();
            if depth > config.max_try_depth {
                return Err(Error::MethodTooLarge {
                    limit: LimitKind::TryNesting,
                    actual: depth,
                    max: config.max_try_depth,
                });
            }
        }
        Ok(resolver)
    }

    /// The method's regions in emission order.
    pub(crate) fn regions(&self) -> &'m [TryBlock] {
        self.regions
    }

    /// Regions covering `pc`, innermost first; equal ranges in declaration order.
    pub(crate) fn covering_try_blocks(&self, pc: u32) -> Vec<usize> {
        self.nesting
            .iter()
            .copied()
            .filter(|&i| self.regions[i].covers(pc))
            .collect()
    }

    /// Returns `true` if any region covers `pc`.
    pub(crate) fn is_covered(&self, pc: u32) -> bool {
        self.regions.iter().any(|r| r.covers(pc))
    }

    /// Adds exception edges from `block` to every handler of `region`, in
    /// declaration order.
    pub(crate) fn connect_throw_block(&self, graph: &mut Graph, block: BlockId, region: usize) {
        let Some(info) = graph.try_blocks().iter().find(|t| t.index == region) else {
            return;
        };
        let targets: Vec<BlockId> = info.handlers.iter().map(|h| h.catch_begin).collect();
        for target in targets {
            if !graph.block(target).is_removed() {
                graph.add_exception_edge(block, target);
            }
        }
    }

    /// Seeds every reachable catch entry with one catch phi per register and
    /// environment slot and a `LoadException` for the accumulator.
    pub(crate) fn create_catch_phis(&mut self, graph: &mut Graph, layout: SlotLayout) {
        let entries: Vec<BlockId> = graph
            .blocks()
            .filter(|b| b.is_catch_begin() && !b.is_unreachable())
            .map(|b| b.id())
            .collect();
        for block in entries {
            let pc = graph.block(block).guest_pc();
            let mut phis = Vec::with_capacity(layout.len());
            for slot in 0..layout.len() {
                if slot == layout.acc() {
                    phis.push(None);
                    continue;
                }
                let phi = graph.create_inst(
                    InstKind::CatchPhi {
                        throwers: Vec::new(),
                    },
                    DataType::NoType,
                    pc,
                );
                graph.append_phi(block, phi);
                phis.push(Some(phi));
            }
            let exception = graph.create_inst(InstKind::LoadException, DataType::Reference, pc);
            graph.append_inst(block, exception);
            self.catches.insert(block, CatchEntry { phis, exception });
        }
    }

    /// The definition table a catch entry starts with, `None` for other blocks.
    pub(crate) fn catch_defs(&self, block: BlockId, layout: SlotLayout) -> Option<Vec<Option<InstId>>> {
        let entry = self.catches.get(&block)?;
        let mut defs = entry.phis.clone();
        if let Some(acc) = defs.get_mut(layout.acc()) {
            *acc = Some(entry.exception);
        }
        Some(defs)
    }

    /// Records that `thrower`, built at `pc`, may transfer control to every
    /// handler covering `pc` with the register state `defs`.
    pub(crate) fn add_catch_phi_inputs(
        &mut self,
        graph: &mut Graph,
        pc: u32,
        thrower: InstId,
        defs: &[Option<InstId>],
    ) {
        for region in self.covering_try_blocks(pc) {
            let Some(info) = graph.try_blocks().iter().find(|t| t.index == region) else {
                continue;
            };
            let entries: Vec<BlockId> = info.handlers.iter().map(|h| h.catch_begin).collect();
            for block in entries {
                let Some(entry) = self.catches.get(&block) else {
                    continue;
                };
                for (slot, phi) in entry.phis.iter().enumerate() {
                    let Some(phi) = *phi else {
                        continue;
                    };
                    match defs.get(slot).copied().flatten() {
                        Some(def) => {
                            let ty = graph.inst(def).ty();
                            graph.add_input(phi, def, ty);
                            if let InstKind::CatchPhi { throwers } = &mut graph.inst_mut(phi).kind {
                                throwers.push(thrower);
                            }
                        }
                        None => {
                            self.undefined.insert(phi.index());
                        }
                    }
                }
            }
        }
    }

    /// Catch phis to discard: those without throwers or with an undefined input.
    pub(crate) fn undefined_catch_phis(&self, graph: &Graph) -> Vec<InstId> {
        self.catches
            .values()
            .flat_map(|entry| entry.phis.iter().flatten().copied())
            .filter(|&phi| {
                !graph.inst(phi).is_removed()
                    && (self.undefined.contains(phi.index()) || graph.inst(phi).inputs().is_empty())
            })
            .collect()
    }

    /// Finalizes catch phis: discards the undefined ones (see
    /// [`Self::undefined_catch_phis`]) and replaces those whose inputs are all
    /// one definition by that definition. Returns the number of catch phis kept.
    pub(crate) fn build_catch_phis(&mut self, graph: &mut Graph) -> Result<usize> {
        let doomed = self.undefined_catch_phis(graph);
        discard_undefined(graph, doomed)?;

        let mut kept = 0;
        let mut blocks: Vec<&BlockId> = self.catches.keys().collect();
        blocks.sort();
        for block in blocks {
            for phi in self.catches[block].phis.iter().flatten().copied() {
                if graph.inst(phi).is_removed() {
                    continue;
                }
                let first = graph.inst(phi).input(0);
                let single = graph.inst(phi).inputs().iter().all(|i| Some(i.inst) == first);
                match first {
                    Some(def) if single => {
                        graph.replace_users(phi, def);
                        graph.remove_inst(phi);
                        graph.refresh_state_inputs(def);
                    }
                    _ => {
                        graph.inst_mut(phi).ty = merged_type(graph, phi);
                        graph.refresh_state_inputs(phi);
                        kept += 1;
                    }
                }
            }
        }
        Ok(kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::{CatchBlock, MethodAssembler, Opcode};

    fn method_with_regions(regions: &[(u32, u32)]) -> MethodBody {
        let mut asm = MethodAssembler::new(1, 0);
        for _ in 0..8 {
            asm.emit(Opcode::Nop, &[]).expect("nop assembles");
        }
        asm.emit(Opcode::ReturnVoid, &[]).expect("return assembles");
        let mut method = asm.finish().expect("method assembles");
        method.try_blocks = regions
            .iter()
            .map(|&(start_pc, end_pc)| TryBlock {
                start_pc,
                end_pc,
                catches: vec![CatchBlock {
                    type_id: None,
                    handler_pc: 8,
                }],
            })
            .collect();
        method
    }

    #[test]
    fn test_covering_order_is_innermost_first() -> Result<()> {
        let method = method_with_regions(&[(0, 8), (2, 4), (2, 6)]);
        let resolver = ExceptionRegionResolver::new(&method, &BuilderConfig::default())?;
        assert_eq!(resolver.covering_try_blocks(3), vec![1, 2, 0]);
        assert_eq!(resolver.covering_try_blocks(5), vec![2, 0]);
        assert!(resolver.covering_try_blocks(8).is_empty());
        Ok(())
    }

    #[test]
    fn test_equal_ranges_keep_declaration_order() -> Result<()> {
        let method = method_with_regions(&[(0, 4), (0, 4)]);
        let resolver = ExceptionRegionResolver::new(&method, &BuilderConfig::default())?;
        assert_eq!(resolver.covering_try_blocks(1), vec![0, 1]);
        Ok(())
    }

    #[test]
    fn test_partial_overlap_is_rejected() {
        let method = method_with_regions(&[(0, 4), (2, 6)]);
        let result = ExceptionRegionResolver::new(&method, &BuilderConfig::default());
        assert!(matches!(result, Err(Error::InvalidBytecode { .. })));
    }

    #[test]
    fn test_nesting_limit() {
        let method = method_with_regions(&[(0, 8), (1, 7), (2, 6)]);
        let config = BuilderConfig::default().with_max_try_depth(2);
        let result = ExceptionRegionResolver::new(&method, &config);
        assert!(matches!(
            result,
            Err(Error::MethodTooLarge {
                limit: LimitKind::TryNesting,
                actual: 3,
                max: 2
            })
        ));
    }
}
