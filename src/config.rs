//! Configuration for IR construction.
//!
//! Every option the builder consults lives in one immutable [`BuilderConfig`]
//! passed by reference to [`IrBuilder`](crate::IrBuilder). Two builds running
//! concurrently with different configurations cannot observe each other.

/// The compilation tier the graph is being built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, strum::Display)]
pub enum CompilationMode {
    /// Interpreter-targeting optimizer: the graph is re-encoded to bytecode,
    /// so entity ids stay symbolic and only a subset of opcodes is supported.
    #[strum(serialize = "bytecode-optimizer")]
    BytecodeOptimizer,
    /// Just-in-time compilation with a live runtime.
    #[default]
    #[strum(serialize = "jit")]
    Jit,
    /// Ahead-of-time compilation of a single compilation unit.
    #[strum(serialize = "aot")]
    Aot,
}

/// Target architecture of the compiled code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, strum::Display)]
pub enum Arch {
    /// 64-bit x86
    #[default]
    #[strum(serialize = "x86_64")]
    X86_64,
    /// 64-bit ARM
    #[strum(serialize = "aarch64")]
    AArch64,
    /// 32-bit ARM
    #[strum(serialize = "arm32")]
    AArch32,
}

impl Arch {
    /// Cross-VM interop calls are only lowered on 64-bit targets.
    #[must_use]
    pub const fn supports_interop(self) -> bool {
        matches!(self, Arch::X86_64 | Arch::AArch64)
    }
}

/// Options controlling one IR build.
///
/// # Examples
///
/// ```rust
/// use arkir::{BuilderConfig, CompilationMode};
///
/// let config = BuilderConfig::aot()
///     .with_unfold_const_array_max_size(8)
///     .with_safepoints(false);
/// assert_eq!(config.mode, CompilationMode::Aot);
/// assert_eq!(config.unfold_const_array_max_size, 8);
/// ```
#[derive(Debug, Clone)]
pub struct BuilderConfig {
    /// Compilation tier (default: JIT).
    pub mode: CompilationMode,

    /// Target architecture (default: x86_64).
    pub arch: Arch,

    /// Lower recognized intrinsics to specialized shapes (default: true).
    pub intrinsics_enabled: bool,

    /// Constant arrays with at most this many elements are unfolded into
    /// individual stores (default: 4).
    pub unfold_const_array_max_size: usize,

    /// Treat every method, field and class as unresolved. Test-only override
    /// (default: false).
    pub force_unresolved: bool,

    /// Insert a SafePoint at every loop header (default: true).
    pub use_safepoint: bool,

    /// Maximum number of bytecode instructions per method (default: 65535).
    pub max_instructions: usize,

    /// Maximum number of virtual registers per method (default: 65535).
    pub max_vregs: usize,

    /// Maximum nesting depth of try regions (default: 32).
    pub max_try_depth: usize,

    /// Run the graph checker after every build (default: on in debug builds).
    pub verify_graph: bool,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            mode: CompilationMode::Jit,
            arch: Arch::X86_64,
            intrinsics_enabled: true,
            unfold_const_array_max_size: 4,
            force_unresolved: false,
            use_safepoint: true,
            max_instructions: 65_535,
            max_vregs: 65_535,
            max_try_depth: 32,
            verify_graph: cfg!(debug_assertions),
        }
    }
}

impl BuilderConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration for JIT compilation.
    #[must_use]
    pub fn jit() -> Self {
        Self::default()
    }

    /// Configuration for AOT compilation.
    #[must_use]
    pub fn aot() -> Self {
        Self {
            mode: CompilationMode::Aot,
            ..Self::default()
        }
    }

    /// Configuration for the bytecode optimizer.
    ///
    /// Intrinsic encoding, constant-array unfolding and safepoints have no
    /// meaning for re-encoded bytecode and are switched off.
    #[must_use]
    pub fn bytecode_optimizer() -> Self {
        Self {
            mode: CompilationMode::BytecodeOptimizer,
            intrinsics_enabled: false,
            unfold_const_array_max_size: 0,
            use_safepoint: false,
            ..Self::default()
        }
    }

    /// Returns `true` when building for the bytecode optimizer.
    #[must_use]
    pub fn is_bytecode_optimizer(&self) -> bool {
        self.mode == CompilationMode::BytecodeOptimizer
    }

    /// Returns `true` when building for AOT compilation.
    #[must_use]
    pub fn is_aot(&self) -> bool {
        self.mode == CompilationMode::Aot
    }

    /// Sets the compilation mode.
    #[must_use]
    pub fn with_mode(mut self, mode: CompilationMode) -> Self {
        self.mode = mode;
        self
    }

    /// Sets the target architecture.
    #[must_use]
    pub fn with_arch(mut self, arch: Arch) -> Self {
        self.arch = arch;
        self
    }

    /// Enables or disables intrinsic lowering.
    #[must_use]
    pub fn with_intrinsics(mut self, enabled: bool) -> Self {
        self.intrinsics_enabled = enabled;
        self
    }

    /// Sets the constant-array unfolding threshold.
    #[must_use]
    pub fn with_unfold_const_array_max_size(mut self, size: usize) -> Self {
        self.unfold_const_array_max_size = size;
        self
    }

    /// Forces every method, field and class through runtime resolution.
    #[must_use]
    pub fn with_force_unresolved(mut self, enabled: bool) -> Self {
        self.force_unresolved = enabled;
        self
    }

    /// Enables or disables loop-header safepoints.
    #[must_use]
    pub fn with_safepoints(mut self, enabled: bool) -> Self {
        self.use_safepoint = enabled;
        self
    }

    /// Sets the instruction-count limit.
    #[must_use]
    pub fn with_max_instructions(mut self, max: usize) -> Self {
        self.max_instructions = max;
        self
    }

    /// Sets the virtual-register-count limit.
    #[must_use]
    pub fn with_max_vregs(mut self, max: usize) -> Self {
        self.max_vregs = max;
        self
    }

    /// Sets the try nesting limit.
    #[must_use]
    pub fn with_max_try_depth(mut self, max: usize) -> Self {
        self.max_try_depth = max;
        self
    }

    /// Enables or disables graph verification after each build.
    #[must_use]
    pub fn with_verification(mut self, enabled: bool) -> Self {
        self.verify_graph = enabled;
        self
    }
}
