//! The SSA intermediate representation.
//!
//! A method is represented by a [`Graph`] arena holding [`BasicBlock`]s and
//! [`Inst`]s. Control flow is expressed by ordered predecessor and successor
//! lists on blocks; data flow by ordered [`Input`] edges on instructions with
//! mirrored user lists. Exception flow uses separate exception edges from
//! throwing blocks to catch-begin blocks, where [`InstKind::CatchPhi`] nodes
//! merge the register state of every potentially throwing instruction.
//!
//! # Key Components
//!
//! - [`Graph`] - the arena, start block, constant cache, try-order list and
//!   unresolved types table
//! - [`Inst`] / [`InstKind`] - instructions as a closed sum type
//! - [`BasicBlock`] / [`BlockFlags`] - blocks and their structural roles
//! - [`VRegInfo`] - the register each SaveState input stands for
//! - [`GraphChecker`] - structural verification of a built graph

mod block;
mod checker;
mod display;
mod graph;
mod inst;
mod try_blocks;
mod types;
mod unresolved;
mod vreg;

pub use block::{BasicBlock, BlockFlags, BlockId};
pub use checker::GraphChecker;
pub use graph::Graph;
pub use inst::{
    BinaryOp, ConditionCode, ConstValue, Input, Inst, InstFlags, InstId, InstKind, MonitorKind,
    UnaryOp,
};
pub use try_blocks::{CatchHandler, TryBlockInfo};
pub use types::DataType;
pub use unresolved::{SlotId, SlotKind, UnresolvedEntry, UnresolvedTypesTable};
pub use vreg::{EnvSlot, VRegInfo, VRegKind, VRegLocation};
