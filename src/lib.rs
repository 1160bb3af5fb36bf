// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![deny(unsafe_code)]

//! # arkir
//!
//! Construction of SSA intermediate representation from ArkCompiler register
//! bytecode.
//!
//! `arkir` takes one method body, a pc-ordered list of accumulator/register
//! instructions with try regions, and produces a [`ir::Graph`]: basic blocks
//! with explicit control and exception edges, instructions in SSA form with
//! phis at merge points and catch phis at handler entries, explicit runtime
//! checks, and SaveStates recording the register state wherever execution may
//! leave compiled code.
//!
//! ## Features
//!
//! - **Block discovery** - jump targets, fallthroughs, try boundaries and loop
//!   headers from the bytecode alone
//! - **On-the-fly SSA** - a single reverse-postorder pass with placeholder phis
//!   for loop headers and back-patching on seal
//! - **Exception modelling** - nested try regions, catch phis fed by every
//!   throwing instruction, unreachable handler pruning
//! - **Three compilation modes** - JIT, AOT and the bytecode optimizer, each
//!   with its own resolution and legalization rules
//! - **Runtime independence** - all entity lookups go through
//!   [`runtime::RuntimeInterface`]; unresolved entities become resolution
//!   nodes instead of errors
//!
//! ## Quick Start
//!
//! ```rust
//! use arkir::prelude::*;
//!
//! // int32 f(int32 a) { return a + 1; }
//! let mut asm = MethodAssembler::new(1, 1).with_signature(&[DataType::Int32], DataType::Int32);
//! asm.emit_lda(0)?;
//! asm.emit(Opcode::Addi, &[Operand::Imm(1)])?;
//! asm.emit(Opcode::Return, &[])?;
//! let method = asm.finish()?;
//!
//! let runtime = InMemoryRuntime::new();
//! let config = BuilderConfig::jit();
//! let graph = IrBuilder::new(&runtime, &config).build(&method)?;
//!
//! println!("{graph}");
//! # Ok::<(), arkir::Error>(())
//! ```
//!
//! ## Error Handling
//!
//! Every fallible operation returns [`Result`]. Malformed input yields
//! [`Error::InvalidBytecode`], resource limits [`Error::MethodTooLarge`], and
//! instructions the configured mode cannot express
//! [`Error::UnsupportedConstruct`]. No partial graph is ever returned.

#[macro_use]
pub(crate) mod error;

/// Convenient re-exports of the most commonly used types.
///
/// # Example
///
/// ```rust
/// use arkir::prelude::*;
///
/// let config = BuilderConfig::aot().with_arch(Arch::AArch32);
/// assert!(config.is_aot());
/// ```
pub mod prelude;

/// The bytecode input model and a label-resolving assembler.
pub mod bytecode;

/// Graph construction: block layout, instruction lowering, SSA and phis.
pub mod builder;

/// Builder configuration: compilation mode, target and limits.
pub mod config;

/// The SSA graph: blocks, instructions, types and verification.
pub mod ir;

/// The runtime query interface and an in-memory implementation.
pub mod runtime;

/// Bit sets and generic graph algorithms.
pub mod utils;

/// `arkir` Result type
///
/// A type alias for `std::result::Result<T, Error>` where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `arkir` Error type
///
/// Each variant documents the conditions raising it.
pub use error::{Error, LimitKind};

pub use builder::IrBuilder;
pub use config::{Arch, BuilderConfig, CompilationMode};
