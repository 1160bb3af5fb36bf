//! Bytecode to SSA graph construction.
//!
//! [`IrBuilder`] turns one [`MethodBody`] into a [`Graph`]. Construction is a
//! fixed pipeline over a single graph arena:
//!
//! 1. size limits are checked and the try table is validated
//!    ([`exceptions`]),
//! 2. block boundaries, edges, try boundaries and loop headers are laid out
//!    ([`blocks`]),
//! 3. catch entries receive one catch phi per register,
//! 4. blocks are visited in reverse postorder; each bytecode instruction is
//!    lowered by the instruction builder while [`vregs`] tracks the reaching
//!    definition of every register,
//! 5. undefined and trivial catch phis are settled,
//! 6. the [`PhiResolver`] prunes and types the remaining phis,
//! 7. optionally the [`GraphChecker`](crate::ir::GraphChecker) verifies the
//!    result.
//!
//! # Examples
//!
//! ```rust,no_run
//! use arkir::prelude::*;
//!
//! fn compile(runtime: &InMemoryRuntime, method: &MethodBody) -> arkir::Result<Graph> {
//!     let config = BuilderConfig::jit();
//!     IrBuilder::new(runtime, &config).build(method)
//! }
//! ```

mod blocks;
mod calls;
mod exceptions;
mod inst_builder;
mod intrinsics;
mod phi_resolver;
mod vregs;

pub use phi_resolver::{PhiResolver, PhiResolverStats};

use rayon::prelude::*;

use crate::{
    builder::{
        blocks::{check_limits, BasicBlockGraphBuilder},
        exceptions::ExceptionRegionResolver,
        inst_builder::InstBuilder,
        vregs::{discard_undefined, SlotLayout, VRegState},
    },
    bytecode::MethodBody,
    config::BuilderConfig,
    ir::{Graph, GraphChecker},
    runtime::RuntimeInterface,
    utils::graph::Successors,
    Error, Result,
};

/// Builds SSA graphs for methods against one runtime and configuration.
///
/// The builder itself holds no per-method state, so one instance can build
/// any number of methods, also concurrently through [`IrBuilder::build_all`].
pub struct IrBuilder<'a, R: RuntimeInterface + ?Sized> {
    runtime: &'a R,
    config: &'a BuilderConfig,
}

impl<'a, R: RuntimeInterface + ?Sized> IrBuilder<'a, R> {
    /// Creates a builder resolving entities through `runtime`.
    pub fn new(runtime: &'a R, config: &'a BuilderConfig) -> Self {
        Self { runtime, config }
    }

    /// The configuration this builder was created with.
    #[must_use]
    pub fn config(&self) -> &BuilderConfig {
        self.config
    }

    /// Builds the graph of `method`.
    ///
    /// # Errors
    ///
    /// - [`Error::MethodTooLarge`] when a configured limit is exceeded
    /// - [`Error::InvalidBytecode`] for malformed control flow, operands or
    ///   try tables
    /// - [`Error::UnsupportedConstruct`] when an instruction cannot be
    ///   legalized in the configured mode
    /// - [`Error::TypeInconsistency`] when a phi merges incompatible types
    /// - [`Error::GraphError`] when verification is enabled and fails
    pub fn build(&self, method: &MethodBody) -> Result<Graph> {
        let mut graph = Graph::new(method.id, method.num_vregs, method.num_args);
        self.build_into(method, &mut graph)?;
        Ok(graph)
    }

    /// Builds the graph of `method` into `graph`, reusing its allocations.
    ///
    /// Whatever `graph` held before is discarded. On error the graph is left
    /// partially built and must not be used.
    ///
    /// # Errors
    ///
    /// See [`IrBuilder::build`].
    pub fn build_into(&self, method: &MethodBody, graph: &mut Graph) -> Result<()> {
        tracing::debug!(
            method = %method.id,
            instructions = method.instructions.len(),
            vregs = method.num_vregs,
            mode = ?self.config.mode,
            "building graph"
        );
        check_limits(method, self.config)?;
        graph.reset(method.id, method.num_vregs, method.num_args);

        let exceptions = ExceptionRegionResolver::new(method, self.config)?;
        let layout = BasicBlockGraphBuilder::new(method, &exceptions, graph).build()?;

        let mut exceptions = exceptions;
        let slots = SlotLayout::new(method);
        exceptions.create_catch_phis(graph, slots);
        let vregs = VRegState::new(slots, Successors::node_count(&*graph));

        let mut builder = InstBuilder::new(graph, self.runtime, self.config, method, vregs, exceptions);
        for block in builder.graph.rpo() {
            builder.begin_block(block)?;
            if let Some(range) = layout.instructions(block) {
                for inst in &method.instructions[range] {
                    builder.build_instruction(inst)?;
                    if let Some(reason) = builder.failure() {
                        tracing::debug!(method = %method.id, pc = inst.pc, reason, "cannot legalize");
                        return Err(Error::UnsupportedConstruct {
                            pc: inst.pc,
                            reason: reason.to_string(),
                        });
                    }
                }
            }
            builder.end_block();
        }

        let (mut vregs, mut exceptions) = builder.into_parts();
        discard_undefined(graph, vregs.finish()?)?;
        exceptions.build_catch_phis(graph)?;
        PhiResolver::new(graph).run()?;

        if self.config.verify_graph {
            GraphChecker::new(graph).check()?;
        }
        tracing::debug!(
            method = %method.id,
            blocks = graph.block_count(),
            insts = graph.inst_count(),
            "built graph"
        );
        Ok(())
    }

    /// Builds every method in `methods` in parallel, one result per method in
    /// input order.
    pub fn build_all(&self, methods: &[MethodBody]) -> Vec<Result<Graph>> {
        methods.par_iter().map(|m| self.build(m)).collect()
    }
}
