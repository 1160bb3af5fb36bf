//! The bytecode input model.
//!
//! A method reaches the builder as a [`MethodBody`]: a pc-ordered list of
//! decoded [`BytecodeInstruction`]s plus frame layout, signature and try
//! regions. Jump targets are implicit (pc-relative offsets) and are only
//! turned into blocks by the builder.
//!
//! # Key Components
//!
//! - [`Opcode`] - the opcode table with operand formats and [`OpcodeFlags`]
//! - [`BytecodeInstruction`] / [`Operand`] - decoded instructions
//! - [`MethodBody`] / [`TryBlock`] / [`CatchBlock`] - a method as handed to the builder
//! - [`MethodAssembler`] - label-resolving construction of method bodies

mod assembler;
mod instruction;
mod method;
mod opcode;

pub use assembler::MethodAssembler;
pub use instruction::{BytecodeInstruction, Operand};
pub use method::{CatchBlock, MethodBody, TryBlock};
pub use opcode::{Opcode, OpcodeFlags, OperandKind};
