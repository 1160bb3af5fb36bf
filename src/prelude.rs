//! # arkir Prelude
//!
//! Convenient re-exports of the types needed to assemble a method, describe
//! the runtime it runs against and build its graph.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all arkir operations
pub use crate::Error;

/// The result type used throughout arkir
pub use crate::Result;

/// Which resource limit a method exceeded
pub use crate::LimitKind;

// ================================================================================================
// Configuration and Entry Point
// ================================================================================================

pub use crate::config::{Arch, BuilderConfig, CompilationMode};

/// Builds SSA graphs from method bodies
pub use crate::builder::{IrBuilder, PhiResolver};

// ================================================================================================
// Bytecode Input
// ================================================================================================

pub use crate::bytecode::{
    BytecodeInstruction, CatchBlock, MethodAssembler, MethodBody, Opcode, Operand, TryBlock,
};

// ================================================================================================
// Runtime Interface
// ================================================================================================

pub use crate::runtime::{
    EntityId, FieldInfo, InMemoryRuntime, IntrinsicId, LiteralArray, LiteralTag, LiteralValue,
    MethodSignature, ResolvedMethod, RuntimeInterface,
};

// ================================================================================================
// Intermediate Representation
// ================================================================================================

pub use crate::ir::{
    BasicBlock, BlockFlags, BlockId, DataType, Graph, GraphChecker, Inst, InstFlags, InstId,
    InstKind, TryBlockInfo, VRegInfo, VRegKind, VRegLocation,
};
