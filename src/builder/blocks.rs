//! Basic-block discovery and control-flow edges.
//!
//! The block graph is built before any instruction is translated. Block
//! boundaries come from jump targets, fallthrough points after block-ending
//! instructions, try region edges and handler entries. Try regions are then
//! bracketed with empty try-begin and try-end boundary blocks, and every
//! handler gets a catch-begin block that later holds its catch phis.

use std::{collections::BTreeMap, collections::BTreeSet, ops::Range};

use crate::{
    builder::exceptions::ExceptionRegionResolver,
    bytecode::{BytecodeInstruction, MethodBody},
    config::BuilderConfig,
    error::LimitKind,
    ir::{BlockFlags, BlockId, CatchHandler, Graph, TryBlockInfo},
    utils::graph::{algorithms::reachable, Successors},
    Error, Result,
};

/// Rejects methods exceeding the configured resource limits.
///
/// # Errors
///
/// Returns [`Error::MethodTooLarge`] naming the first limit exceeded.
pub(crate) fn check_limits(method: &MethodBody, config: &BuilderConfig) -> Result<()> {
    if method.instructions.len() > config.max_instructions {
        return Err(Error::MethodTooLarge {
            limit: LimitKind::Instructions,
            actual: method.instructions.len(),
            max: config.max_instructions,
        });
    }
    if usize::from(method.num_vregs) > config.max_vregs {
        return Err(Error::MethodTooLarge {
            limit: LimitKind::VirtualRegisters,
            actual: usize::from(method.num_vregs),
            max: config.max_vregs,
        });
    }
    Ok(())
}

/// Which bytecode instructions each code block holds.
#[derive(Debug, Default)]
pub(crate) struct BlockLayout {
    ranges: Vec<Option<Range<usize>>>,
}

impl BlockLayout {
    /// Instruction index range of `block`; `None` for the start block,
    /// boundary blocks and removed blocks.
    pub(crate) fn instructions(&self, block: BlockId) -> Option<Range<usize>> {
        self.ranges.get(block.index()).cloned().flatten()
    }

    fn set(&mut self, block: BlockId, range: Option<Range<usize>>) {
        if block.index() >= self.ranges.len() {
            self.ranges.resize(block.index() + 1, None);
        }
        self.ranges[block.index()] = range;
    }
}

/// Splits a method body into basic blocks and wires their edges.
///
/// # Algorithm
///
/// 1. Validate the instruction stream and collect block boundaries
/// 2. Create the start block and one code block per boundary
/// 3. Wire normal edges: taken target before fallthrough for conditional
///    jumps, the target for unconditional jumps, nothing after return or throw
/// 4. Create catch-begin blocks, then bracket each try region, outermost
///    first, with try-begin and try-end blocks
/// 5. Unlink unreachable code blocks; keep unreachable boundary blocks,
///    flagged, so the try-order list stays complete
/// 6. Add exception edges from throwing blocks to the catch entries of every
///    covering region, innermost first
/// 7. Flag loop headers
pub(crate) struct BasicBlockGraphBuilder<'a, 'm> {
    method: &'m MethodBody,
    exceptions: &'a ExceptionRegionResolver<'m>,
    graph: &'a mut Graph,
    layout: BlockLayout,
    /// Code block starting at each boundary pc
    by_pc: BTreeMap<u32, BlockId>,
    /// Catch-begin block of each handler pc
    catch_begins: BTreeMap<u32, BlockId>,
}

impl<'a, 'm> BasicBlockGraphBuilder<'a, 'm> {
    pub(crate) fn new(
        method: &'m MethodBody,
        exceptions: &'a ExceptionRegionResolver<'m>,
        graph: &'a mut Graph,
    ) -> Self {
        Self {
            method,
            exceptions,
            graph,
            layout: BlockLayout::default(),
            by_pc: BTreeMap::new(),
            catch_begins: BTreeMap::new(),
        }
    }

    /// Builds the block graph into the (empty) graph.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidBytecode`] for malformed instruction streams,
    /// jumps to non-boundary pcs and execution falling off the end.
    pub(crate) fn build(mut self) -> Result<BlockLayout> {
        let boundaries = self.discover_boundaries()?;
        self.create_blocks(&boundaries);
        self.connect_edges()?;
        self.create_catch_begins();
        self.create_try_boundaries();
        self.remove_unreachable();
        self.connect_throw_blocks();
        self.mark_loop_headers();
        tracing::trace!(
            blocks = self.graph.block_count(),
            regions = self.graph.try_blocks().len(),
            "built block graph"
        );
        Ok(self.layout)
    }

    fn discover_boundaries(&self) -> Result<BTreeSet<u32>> {
        let insts = &self.method.instructions;
        if insts.is_empty() {
            return Err(invalid_bytecode!(None, "method has no instructions"));
        }
        if self.method.num_args > self.method.num_vregs {
            return Err(invalid_bytecode!(
                None,
                "{} arguments do not fit {} registers",
                self.method.num_args,
                self.method.num_vregs
            ));
        }

        let end_pc = self.method.end_pc();
        let mut boundaries = BTreeSet::new();
        let mut expected = 0;
        for inst in insts {
            if inst.pc != expected {
                return Err(invalid_bytecode!(
                    Some(inst.pc),
                    "instruction expected at pc {}",
                    expected
                ));
            }
            inst.validate()?;
            expected = inst.next_pc();

            if let Some(target) = inst.jump_target()? {
                if target >= end_pc || self.method.index_of(target).is_none() {
                    return Err(invalid_bytecode!(
                        Some(inst.pc),
                        "jump target {} is not an instruction boundary",
                        target
                    ));
                }
                boundaries.insert(target);
            }
            if inst.opcode.ends_block() && inst.next_pc() < end_pc {
                boundaries.insert(inst.next_pc());
            }
        }
        boundaries.insert(0);

        for region in self.exceptions.regions() {
            if self.method.index_of(region.start_pc).is_none() {
                return Err(invalid_bytecode!(
                    Some(region.start_pc),
                    "try region does not start at an instruction boundary"
                ));
            }
            boundaries.insert(region.start_pc);
            if region.end_pc < end_pc {
                if self.method.index_of(region.end_pc).is_none() {
                    return Err(invalid_bytecode!(
                        Some(region.end_pc),
                        "try region does not end at an instruction boundary"
                    ));
                }
                boundaries.insert(region.end_pc);
            }
            for catch in &region.catches {
                boundaries.insert(catch.handler_pc);
            }
        }
        Ok(boundaries)
    }

    fn create_blocks(&mut self, boundaries: &BTreeSet<u32>) {
        let start = self.graph.add_block(None, BlockFlags::START);
        self.layout.set(start, None);

        let handlers: BTreeSet<u32> = self
            .exceptions
            .regions()
            .iter()
            .flat_map(|r| r.catches.iter().map(|c| c.handler_pc))
            .collect();
        let count = self.method.instructions.len();
        let pcs: Vec<u32> = boundaries.iter().copied().collect();
        for (i, &pc) in pcs.iter().enumerate() {
            let first = self.method.index_of(pc).unwrap_or(count);
            let last = pcs
                .get(i + 1)
                .and_then(|&next| self.method.index_of(next))
                .unwrap_or(count);

            let mut flags = BlockFlags::empty();
            if self.exceptions.is_covered(pc) {
                flags |= BlockFlags::TRY;
            }
            if handlers.contains(&pc) {
                flags |= BlockFlags::CATCH;
            }
            let block = self.graph.add_block(Some(pc), flags);
            self.layout.set(block, Some(first..last));
            self.by_pc.insert(pc, block);
        }

        if let Some(&entry) = self.by_pc.get(&0) {
            self.graph.add_edge(start, entry);
        }
    }

    /// The code block starting at `pc`.
    fn block_at(&self, pc: u32) -> Result<BlockId> {
        self.by_pc
            .get(&pc)
            .copied()
            .ok_or_else(|| graph_error!("no block starts at pc {}", pc))
    }

    fn last_instruction(&self, block: BlockId) -> Option<&'m BytecodeInstruction> {
        let range = self.layout.instructions(block)?;
        self.method.instructions.get(range.end.checked_sub(1)?)
    }

    fn connect_edges(&mut self) -> Result<()> {
        let end_pc = self.method.end_pc();
        let blocks: Vec<BlockId> = self.by_pc.values().copied().collect();
        for block in blocks {
            let Some(last) = self.last_instruction(block) else {
                continue;
            };
            let opcode = last.opcode;

            if let Some(target) = last.jump_target()? {
                let target = self.block_at(target)?;
                self.graph.add_edge(block, target);
            }
            let falls_through = !opcode.is_terminator();
            if falls_through {
                let next = last.next_pc();
                if next >= end_pc {
                    return Err(invalid_bytecode!(
                        Some(last.pc),
                        "execution falls off the end of the method"
                    ));
                }
                let next = self.block_at(next)?;
                self.graph.add_edge(block, next);
            }
        }
        Ok(())
    }

    fn create_catch_begins(&mut self) {
        let regions = self.exceptions.regions();
        for catch in regions.iter().flat_map(|r| r.catches.iter()) {
            if self.catch_begins.contains_key(&catch.handler_pc) {
                continue;
            }
            let Some(&handler) = self.by_pc.get(&catch.handler_pc) else {
                continue;
            };
            let begin = self
                .graph
                .add_block(Some(catch.handler_pc), BlockFlags::CATCH_BEGIN);
            self.graph.add_edge(begin, handler);
            self.catch_begins.insert(catch.handler_pc, begin);
        }
    }

    /// Returns `true` if `block` is a code block inside `[start, end)`.
    fn inside(&self, block: BlockId, start: u32, end: u32) -> bool {
        let b = self.graph.block(block);
        if b.is_start() || b.is_boundary() {
            return false;
        }
        b.guest_pc().is_some_and(|pc| start <= pc && pc < end)
    }

    /// Position of the edge leaving `block` by fallthrough or unconditional
    /// jump, i.e. the edge a try region is exited through.
    fn exit_position(&self, block: BlockId) -> Option<usize> {
        let last = self.last_instruction(block)?;
        let opcode = last.opcode;
        if opcode.is_conditional() {
            Some(1)
        } else if opcode.is_jump() || !opcode.is_terminator() {
            Some(0)
        } else {
            None
        }
    }

    fn create_try_boundaries(&mut self) {
        let regions = self.exceptions.regions();
        let mut order: Vec<usize> = (0..regions.len()).collect();
        order.sort_by_key(|&i| std::cmp::Reverse((regions[i].len(), i)));

        let mut infos: Vec<Option<TryBlockInfo>> = vec![None; regions.len()];
        for index in order {
            let region = &regions[index];
            let Some(&first) = self.by_pc.get(&region.start_pc) else {
                continue;
            };
            let begin = self
                .graph
                .add_block(Some(region.start_pc), BlockFlags::TRY_BEGIN);
            let end = self
                .graph
                .add_block(Some(region.end_pc), BlockFlags::TRY_END);

            let preds = self.graph.block(first).predecessors().to_vec();
            for pred in preds {
                if !self.inside(pred, region.start_pc, region.end_pc) {
                    self.graph.replace_successor(pred, first, begin);
                }
            }
            self.graph.add_edge(begin, first);

            let last = self
                .by_pc
                .range(region.start_pc..region.end_pc)
                .next_back()
                .map(|(_, &b)| b);
            if let Some(last) = last {
                let exit = self
                    .exit_position(last)
                    .and_then(|pos| Some((pos, *self.graph.block(last).successors().get(pos)?)));
                if let Some((pos, succ)) = exit {
                    if !self.inside(succ, region.start_pc, region.end_pc) {
                        self.graph.replace_successor_at(last, pos, end);
                        self.graph.add_edge(end, succ);
                    }
                }
            }

            let may_throw = self
                .method
                .instructions
                .iter()
                .filter(|i| region.covers(i.pc))
                .any(|i| i.opcode.may_throw());

            let mut handlers = Vec::with_capacity(region.catches.len());
            for catch in &region.catches {
                let Some(&catch_begin) = self.catch_begins.get(&catch.handler_pc) else {
                    continue;
                };
                let wired = handlers
                    .iter()
                    .any(|h: &CatchHandler| h.catch_begin == catch_begin);
                if may_throw && !wired {
                    self.graph.add_edge(begin, catch_begin);
                    self.graph.add_edge(end, catch_begin);
                }
                handlers.push(CatchHandler {
                    type_id: catch.type_id,
                    handler_pc: catch.handler_pc,
                    catch_begin,
                });
            }

            infos[index] = Some(TryBlockInfo {
                index,
                start_pc: region.start_pc,
                end_pc: region.end_pc,
                begin,
                end,
                handlers,
            });
        }

        for info in infos.into_iter().flatten() {
            self.graph.push_try_block(info);
        }
    }

    fn remove_unreachable(&mut self) {
        let Some(start) = self.graph.start_block() else {
            return;
        };
        let live = reachable(&*self.graph, start);
        let all: Vec<BlockId> = self.graph.blocks().map(|b| b.id()).collect();
        for block in all {
            if live.contains(block.index()) {
                continue;
            }
            if self.graph.block(block).is_boundary() {
                self.graph.clear_edges(block);
                self.graph.set_block_flag(block, BlockFlags::UNREACHABLE);
            } else {
                tracing::trace!(%block, "removed unreachable block");
                self.graph.unlink_block(block);
                self.layout.set(block, None);
            }
        }
    }

    fn connect_throw_blocks(&mut self) {
        let blocks: Vec<BlockId> = self
            .graph
            .blocks()
            .filter(|b| b.flags().contains(BlockFlags::TRY))
            .map(|b| b.id())
            .collect();
        for block in blocks {
            let Some(range) = self.layout.instructions(block) else {
                continue;
            };
            let throws = self.method.instructions[range]
                .iter()
                .any(|i| i.opcode.may_throw());
            let Some(pc) = self.graph.block(block).guest_pc() else {
                continue;
            };
            if !throws {
                continue;
            }
            for region in self.exceptions.covering_try_blocks(pc) {
                self.exceptions.connect_throw_block(self.graph, block, region);
            }
        }
    }

    fn mark_loop_headers(&mut self) {
        let rpo = self.graph.rpo();
        let mut position = vec![usize::MAX; Successors::node_count(&*self.graph)];
        for (i, block) in rpo.iter().enumerate() {
            position[block.index()] = i;
        }

        let mut headers = Vec::new();
        for &block in &rpo {
            for &succ in self.graph.block(block).successors() {
                if position[succ.index()] <= position[block.index()] {
                    headers.push(succ);
                }
            }
        }
        for header in headers {
            self.graph.set_block_flag(header, BlockFlags::LOOP_HEADER);
        }
    }
}
