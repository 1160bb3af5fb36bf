//! Method bodies.

use crate::{bytecode::BytecodeInstruction, ir::DataType, runtime::EntityId};

/// One handler of a try region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatchBlock {
    /// Exception class caught; `None` catches everything.
    pub type_id: Option<EntityId>,
    /// First pc of the handler code.
    pub handler_pc: u32,
}

/// A try region of a method body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TryBlock {
    /// First covered pc.
    pub start_pc: u32,
    /// First pc after the region.
    pub end_pc: u32,
    /// Handlers in declaration order.
    pub catches: Vec<CatchBlock>,
}

impl TryBlock {
    /// Returns `true` if `pc` lies in the region.
    #[must_use]
    pub fn covers(&self, pc: u32) -> bool {
        self.start_pc <= pc && pc < self.end_pc
    }

    /// Number of covered bytes.
    #[must_use]
    pub fn len(&self) -> u32 {
        self.end_pc.saturating_sub(self.start_pc)
    }

    /// Returns `true` for a region covering nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A method as handed to the builder.
///
/// Registers `0..num_vregs` are the frame. The last `num_args` of them hold
/// the arguments on entry, receiver first for instance methods.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodBody {
    /// The method's own id.
    pub id: EntityId,
    /// Instructions in pc order.
    pub instructions: Vec<BytecodeInstruction>,
    /// Number of frame registers, arguments included.
    pub num_vregs: u16,
    /// Number of argument registers.
    pub num_args: u16,
    /// Types of the argument registers, in order.
    pub param_types: Vec<DataType>,
    /// Declared return type.
    pub return_type: DataType,
    /// Try regions in emission order.
    pub try_blocks: Vec<TryBlock>,
    /// Whether the method carries a lexical environment.
    pub uses_environment: bool,
}

impl MethodBody {
    /// First pc past the last instruction.
    #[must_use]
    pub fn end_pc(&self) -> u32 {
        self.instructions.last().map_or(0, BytecodeInstruction::next_pc)
    }

    /// Index of the instruction starting exactly at `pc`.
    #[must_use]
    pub fn index_of(&self, pc: u32) -> Option<usize> {
        self.instructions.binary_search_by_key(&pc, |i| i.pc).ok()
    }

    /// Register index of argument `arg`.
    #[must_use]
    pub fn arg_vreg(&self, arg: u16) -> u16 {
        self.num_vregs.saturating_sub(self.num_args) + arg
    }

    /// Type of argument `arg`; [`DataType::Any`] if not declared.
    #[must_use]
    pub fn param_type(&self, arg: u16) -> DataType {
        self.param_types
            .get(usize::from(arg))
            .copied()
            .unwrap_or(DataType::Any)
    }
}
