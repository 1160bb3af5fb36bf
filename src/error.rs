use thiserror::Error;

use crate::ir::{DataType, InstId};

macro_rules! invalid_bytecode {
    // Single string version
    ($pc:expr, $msg:expr) => {
        crate::Error::InvalidBytecode {
            message: $msg.to_string(),
            pc: $pc,
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($pc:expr, $fmt:expr, $($arg:tt)*) => {
        crate::Error::InvalidBytecode {
            message: format!($fmt, $($arg)*),
            pc: $pc,
            file: file!(),
            line: line!(),
        }
    };
}

macro_rules! graph_error {
    ($msg:expr) => {
        crate::Error::GraphError($msg.to_string())
    };

    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::GraphError(format!($fmt, $($arg)*))
    };
}

/// The resource limit that a method exceeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum LimitKind {
    /// Number of bytecode instructions in the method body.
    #[strum(serialize = "instruction count")]
    Instructions,
    /// Number of virtual registers (locals plus arguments).
    #[strum(serialize = "virtual register count")]
    VirtualRegisters,
    /// Depth of nested try regions covering a single pc.
    #[strum(serialize = "try nesting depth")]
    TryNesting,
}

/// The generic Error type, covering every way a build can fail.
///
/// The variants mirror the failure classes of IR construction. They differ in
/// who is expected to react to them:
///
/// ## Fatal input errors
/// - [`Error::InvalidBytecode`] - structurally malformed method body
/// - [`Error::TypeInconsistency`] - phi inputs whose types cannot be reconciled
///
/// ## Driver-level fallbacks
/// - [`Error::MethodTooLarge`] - a configured resource guard was exceeded
/// - [`Error::UnsupportedConstruct`] - the builder cannot legalize an instruction
///   for the current compilation mode; the caller should use a simpler tier
///
/// ## Internal errors
/// - [`Error::GraphError`] - a built graph violates an IR invariant
///
/// Unresolved methods, fields and classes are never errors. They are modelled
/// in the graph with `Resolve*` nodes and unresolved-types table slots.
///
/// # Examples
///
/// ```rust,no_run
/// use arkir::{BuilderConfig, Error, IrBuilder, bytecode::MethodBody, runtime::InMemoryRuntime};
///
/// fn compile(method: &MethodBody, runtime: &InMemoryRuntime) {
///     let config = BuilderConfig::jit();
///     match IrBuilder::new(runtime, &config).build(method) {
///         Ok(graph) => println!("built {} blocks", graph.block_count()),
///         Err(Error::UnsupportedConstruct { reason, .. }) => {
///             eprintln!("falling back to the interpreter: {reason}");
///         }
///         Err(e) => eprintln!("rejected: {e}"),
///     }
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The method body is structurally malformed.
    ///
    /// Raised for jump targets outside the body or not on an instruction
    /// boundary, execution falling off the end of the method, reads of a
    /// virtual register that no definition reaches, malformed operands and
    /// malformed literal-array tags. The build is aborted and no graph is
    /// returned.
    #[error("Invalid bytecode - {file}:{line}: {message}")]
    InvalidBytecode {
        /// The message to be printed for the InvalidBytecode error
        message: String,
        /// The bytecode offset the error was detected at, if any
        pc: Option<u32>,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// The method exceeds a configured resource limit.
    ///
    /// This is a deliberate guard against resource exhaustion, detected during
    /// block discovery before any instruction is translated.
    #[error("Method too large - {limit} is {actual}, limit is {max}")]
    MethodTooLarge {
        /// Which limit was exceeded
        limit: LimitKind,
        /// The observed value
        actual: usize,
        /// The configured maximum
        max: usize,
    },

    /// Two inputs of a phi carry types that cannot be merged.
    #[error("Type inconsistency - phi {phi} merges {first} and {second}")]
    TypeInconsistency {
        /// The phi whose inputs disagree
        phi: InstId,
        /// The type adopted from the first concrete input
        first: DataType,
        /// The conflicting type
        second: DataType,
    },

    /// The builder abandoned the method because an instruction cannot be
    /// legalized for the active compilation mode or target architecture.
    #[error("Unsupported construct at pc {pc:#x}: {reason}")]
    UnsupportedConstruct {
        /// Bytecode offset of the offending instruction
        pc: u32,
        /// Why the instruction could not be translated
        reason: String,
    },

    /// A graph invariant does not hold.
    #[error("{0}")]
    GraphError(String),
}
