//! IR instructions.
//!
//! An [`Inst`] is a node of the graph arena. Its operation is the closed sum
//! type [`InstKind`]; everything opcode-specific (ids, condition codes,
//! immediates, catch type lists) is carried as variant payload, so passes
//! dispatch by `match` and the compiler checks exhaustiveness.

use std::fmt;

use bitflags::bitflags;
use strum::IntoStaticStr;

use crate::{
    ir::{BlockId, DataType, SlotId, VRegInfo},
    runtime::{EntityId, IntrinsicId},
};

/// Handle of an instruction in its graph arena.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InstId(pub(crate) u32);

impl InstId {
    /// Creates an id from a raw arena index.
    #[must_use]
    pub const fn new(index: usize) -> Self {
        InstId(index as u32)
    }

    /// Returns the arena index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for InstId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InstId({})", self.0)
    }
}

impl fmt::Display for InstId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Value of a constant instruction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConstValue {
    /// Integer constant; typed `i64` in the graph
    Int(i64),
    /// Single-precision constant
    Float32(f32),
    /// Double-precision constant
    Float64(f64),
}

impl ConstValue {
    /// The type of the constant instruction holding this value.
    #[must_use]
    pub const fn ty(self) -> DataType {
        match self {
            ConstValue::Int(_) => DataType::Int64,
            ConstValue::Float32(_) => DataType::Float32,
            ConstValue::Float64(_) => DataType::Float64,
        }
    }

    /// Bit-exact key used to deduplicate constants (`0.0` and `-0.0` differ).
    #[must_use]
    pub(crate) fn key(self) -> (u8, u64) {
        match self {
            ConstValue::Int(v) => (0, v as u64),
            ConstValue::Float32(v) => (1, u64::from(v.to_bits())),
            ConstValue::Float64(v) => (2, v.to_bits()),
        }
    }
}

impl fmt::Display for ConstValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstValue::Int(v) => write!(f, "{v}"),
            ConstValue::Float32(v) => write!(f, "{v}f"),
            ConstValue::Float64(v) => write!(f, "{v}"),
        }
    }
}

/// Comparison condition codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoStaticStr)]
#[strum(serialize_all = "UPPERCASE")]
pub enum ConditionCode {
    /// Equal
    Eq,
    /// Not equal
    Ne,
    /// Signed less than
    Lt,
    /// Signed less than or equal
    Le,
    /// Signed greater than
    Gt,
    /// Signed greater than or equal
    Ge,
}

impl ConditionCode {
    /// The condition that holds exactly when `self` does not.
    #[must_use]
    pub const fn inverse(self) -> Self {
        match self {
            ConditionCode::Eq => ConditionCode::Ne,
            ConditionCode::Ne => ConditionCode::Eq,
            ConditionCode::Lt => ConditionCode::Ge,
            ConditionCode::Le => ConditionCode::Gt,
            ConditionCode::Gt => ConditionCode::Le,
            ConditionCode::Ge => ConditionCode::Lt,
        }
    }
}

/// Two-operand arithmetic and logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoStaticStr)]
pub enum BinaryOp {
    /// Addition
    Add,
    /// Subtraction
    Sub,
    /// Multiplication
    Mul,
    /// Division; traps on an integer zero divisor
    Div,
    /// Remainder; traps on an integer zero divisor
    Mod,
    /// Bitwise and
    And,
    /// Bitwise or
    Or,
    /// Bitwise exclusive or
    Xor,
    /// Shift left
    Shl,
    /// Logical shift right
    Shr,
    /// Arithmetic shift right
    AShr,
    /// Smaller operand
    Min,
    /// Larger operand
    Max,
}

impl BinaryOp {
    /// Integer division and remainder trap on a zero divisor.
    #[must_use]
    pub const fn traps_on_zero(self, ty: DataType) -> bool {
        matches!(self, BinaryOp::Div | BinaryOp::Mod) && ty.is_integer()
    }
}

/// One-operand arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoStaticStr)]
pub enum UnaryOp {
    /// Arithmetic negation
    Neg,
    /// Bitwise complement
    Not,
    /// Absolute value
    Abs,
    /// Square root
    Sqrt,
}

/// Monitor operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoStaticStr)]
pub enum MonitorKind {
    /// Acquire the object's monitor
    Enter,
    /// Release the object's monitor
    Exit,
}

/// The operation of an instruction.
///
/// Inputs are not part of the kind; their order per variant is fixed:
/// checked operands first, then a resolved pointer (if any), then the
/// SaveState (if the operation requires one).
#[derive(Debug, Clone, PartialEq, IntoStaticStr)]
pub enum InstKind {
    // ============================================================================================
    // Values living in the start block
    // ============================================================================================
    /// Deduplicated constant
    Constant(ConstValue),
    /// Incoming argument
    Parameter {
        /// Position among the method's arguments, receiver first
        index: u16,
    },
    /// The null reference
    NullPtr,

    // ============================================================================================
    // SSA merges and state snapshots
    // ============================================================================================
    /// Merge of one value per predecessor, in predecessor order
    Phi,
    /// Merge at a catch entry of the values live at each throwing instruction.
    CatchPhi {
        /// Throwing instructions; inputs are parallel to them
        throwers: Vec<InstId>,
    },
    /// Snapshot of the live registers. Inputs are parallel to the
    /// instruction's VReg annotations.
    SaveState,
    /// SaveState at a loop header where the runtime may suspend the thread
    SafePoint,
    /// The exception object, first instruction of a catch entry
    LoadException,
    /// Marks a try-begin block.
    Try {
        /// Handler types in handler order; `None` catches everything
        catch_types: Vec<Option<EntityId>>,
    },

    // ============================================================================================
    // Checks: (value, [len,] save state) -> checked value
    // ============================================================================================
    /// Throws on a null reference
    NullCheck,
    /// Throws on a zero divisor
    ZeroCheck,
    /// Throws on a negative array length
    NegativeCheck,
    /// Throws unless `0 <= index < len`; inputs are (len, index, state)
    BoundsCheck,
    /// Throws unless the stored reference fits the array's element type
    RefTypeCheck,

    // ============================================================================================
    // Arithmetic and comparison
    // ============================================================================================
    /// Arithmetic on two inputs
    Binary(BinaryOp),
    /// Arithmetic on one input and an immediate.
    BinaryImm {
        /// Operation
        op: BinaryOp,
        /// Right operand
        imm: i64,
    },
    /// Arithmetic on one input
    Unary(UnaryOp),
    /// Three-way compare producing -1, 0 or 1.
    Cmp {
        /// NaN compares greater when set, less otherwise
        fcmpg: bool,
    },
    /// Boolean comparison of two inputs.
    Compare {
        /// Condition tested
        cc: ConditionCode,
    },
    /// Conditional branch comparing its input with an immediate.
    IfImm {
        /// Condition under which the true successor is taken
        cc: ConditionCode,
        /// Compared value
        imm: i64,
    },
    /// Numeric conversion to the instruction's type.
    Cast {
        /// Type of the input
        from: DataType,
    },

    // ============================================================================================
    // Arrays and strings
    // ============================================================================================
    /// Length of a checked array
    LenArray,
    /// Length of a checked string
    LenString,
    /// Element read: (array, checked index)
    LoadArray,
    /// Element write: (array, checked index, value)
    StoreArray,
    /// Array allocation: (class, checked length, state).
    NewArray {
        /// Array class
        class: EntityId,
    },
    /// Constant array loaded whole from the literal table.
    LoadConstArray {
        /// Literal array id
        literal: EntityId,
    },
    /// Constant array filled in one step after allocation.
    FillConstArray {
        /// Literal array id
        literal: EntityId,
    },

    // ============================================================================================
    // Classes, objects and statics
    // ============================================================================================
    /// Class pointer of a resolved class, initializing it if needed.
    LoadAndInitClass {
        /// Class loaded
        class: EntityId,
    },
    /// Class pointer read from a runtime slot, initializing it if needed.
    UnresolvedLoadAndInitClass {
        /// Class loaded
        class: EntityId,
        /// Slot holding the class pointer
        slot: SlotId,
    },
    /// Class pointer of a resolved class, without initialization.
    LoadClass {
        /// Class loaded
        class: EntityId,
    },
    /// Class pointer read from a runtime slot, without initialization.
    UnresolvedLoadType {
        /// Class loaded
        class: EntityId,
        /// Slot holding the class pointer
        slot: SlotId,
    },
    /// Object allocation: (class, state).
    NewObject {
        /// Class instantiated
        class: EntityId,
    },
    /// Instance field read at a known offset.
    LoadObject {
        /// Field read
        field: EntityId,
    },
    /// Instance field write at a known offset.
    StoreObject {
        /// Field written
        field: EntityId,
    },
    /// Static field read at a known offset.
    LoadStatic {
        /// Field read
        field: EntityId,
    },
    /// Static field write at a known offset.
    StoreStatic {
        /// Field written
        field: EntityId,
    },
    /// Instance field offset resolved at run time.
    ResolveObjectField {
        /// Field resolved
        field: EntityId,
        /// Slot caching the offset
        slot: SlotId,
    },
    /// Instance field read at a resolved offset.
    LoadResolvedObjectField {
        /// Field read
        field: EntityId,
    },
    /// Instance field write at a resolved offset.
    StoreResolvedObjectField {
        /// Field written
        field: EntityId,
    },
    /// Static field address resolved at run time.
    ResolveObjectFieldStatic {
        /// Field resolved
        field: EntityId,
        /// Slot caching the address
        slot: SlotId,
    },
    /// Static field read through a resolved address.
    LoadResolvedObjectFieldStatic {
        /// Field read
        field: EntityId,
    },
    /// Static field write through a resolved address.
    StoreResolvedObjectFieldStatic {
        /// Field written
        field: EntityId,
    },
    /// String object of a string id.
    LoadString {
        /// String id
        id: EntityId,
    },
    /// Type object of a class id.
    LoadType {
        /// Class id
        id: EntityId,
    },
    /// Throws unless the input is an instance of `class` or null.
    CheckCast {
        /// Target class
        class: EntityId,
    },
    /// Boolean instance test.
    IsInstance {
        /// Tested class
        class: EntityId,
    },

    // ============================================================================================
    // Calls
    // ============================================================================================
    /// Direct call of a resolved method.
    CallStatic {
        /// Callee
        method: EntityId,
    },
    /// Dispatch through the receiver's class.
    CallVirtual {
        /// Callee
        method: EntityId,
    },
    /// Method pointer of a static callee resolved at run time.
    ResolveStatic {
        /// Callee
        method: EntityId,
        /// Slot caching the method pointer
        slot: SlotId,
    },
    /// Method pointer of a virtual callee resolved on the receiver.
    ResolveVirtual {
        /// Callee
        method: EntityId,
        /// Slot caching the method pointer
        slot: SlotId,
    },
    /// Call through a resolved static method pointer.
    CallResolvedStatic {
        /// Callee
        method: EntityId,
    },
    /// Call through a resolved virtual method pointer.
    CallResolvedVirtual {
        /// Callee
        method: EntityId,
    },
    /// Call of a recognized intrinsic without a specialized lowering.
    Intrinsic {
        /// Intrinsic called
        id: IntrinsicId,
        /// Method the intrinsic stands for
        method: EntityId,
    },
    /// Call into another language runtime.
    CallInterop {
        /// Callee
        method: EntityId,
    },

    // ============================================================================================
    // Control and synchronization
    // ============================================================================================
    /// Monitor enter or exit on the input object
    Monitor(MonitorKind),
    /// Raises the input as an exception
    Throw,
    /// Returns the input
    Return,
    /// Returns without a value
    ReturnVoid,
}

bitflags! {
    /// Properties of an instruction.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct InstFlags : u32 {
        /// May raise an exception and so needs catch-phi inputs inside a try
        const CAN_THROW = 0x0001;
        /// Takes a SaveState as its last input
        const REQUIRE_STATE = 0x0002;
        /// Stores a reference and needs a GC write barrier
        const BARRIER = 0x0004;
        /// Any kind of call
        const CALL = 0x0008;
        /// Allocates a managed object
        const ALLOC = 0x0010;
        /// Must not be removed even without users
        const NO_DCE = 0x0020;
        /// Ends its basic block
        const TERMINATOR = 0x0040;
    }
}

impl InstKind {
    /// Flags every instruction of this kind carries.
    #[must_use]
    pub fn default_flags(&self) -> InstFlags {
        use InstKind as K;

        let state = InstFlags::REQUIRE_STATE | InstFlags::NO_DCE;
        let throwing = state | InstFlags::CAN_THROW;
        match self {
            K::NullCheck | K::ZeroCheck | K::NegativeCheck | K::BoundsCheck | K::RefTypeCheck => {
                throwing
            }
            K::LoadAndInitClass { .. }
            | K::UnresolvedLoadAndInitClass { .. }
            | K::LoadClass { .. }
            | K::UnresolvedLoadType { .. }
            | K::ResolveObjectField { .. }
            | K::ResolveObjectFieldStatic { .. }
            | K::ResolveStatic { .. }
            | K::ResolveVirtual { .. }
            | K::LoadString { .. }
            | K::LoadType { .. }
            | K::CheckCast { .. }
            | K::IsInstance { .. }
            | K::LoadConstArray { .. }
            | K::FillConstArray { .. } => throwing,
            K::NewArray { .. } | K::NewObject { .. } => throwing | InstFlags::ALLOC,
            K::CallStatic { .. }
            | K::CallVirtual { .. }
            | K::CallResolvedStatic { .. }
            | K::CallResolvedVirtual { .. }
            | K::CallInterop { .. }
            | K::Intrinsic { .. } => throwing | InstFlags::CALL,
            K::Monitor(_) => throwing,
            K::Throw => throwing | InstFlags::TERMINATOR,
            K::Return | K::ReturnVoid => InstFlags::NO_DCE | InstFlags::TERMINATOR,
            K::IfImm { .. } => InstFlags::NO_DCE | InstFlags::TERMINATOR,
            K::StoreArray
            | K::StoreObject { .. }
            | K::StoreStatic { .. }
            | K::StoreResolvedObjectField { .. }
            | K::StoreResolvedObjectFieldStatic { .. } => InstFlags::NO_DCE,
            K::SaveState | K::SafePoint | K::Try { .. } => InstFlags::NO_DCE,
            _ => InstFlags::empty(),
        }
    }

    /// Returns the short name used in dumps.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.into()
    }
}

/// An input edge: the producing instruction and the type this use requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Input {
    /// The producing instruction
    pub inst: InstId,
    /// The type the consumer expects
    pub ty: DataType,
}

impl Input {
    /// Creates an input edge.
    #[must_use]
    pub const fn new(inst: InstId, ty: DataType) -> Self {
        Self { inst, ty }
    }
}

/// A node in the IR graph.
#[derive(Debug, Clone)]
pub struct Inst {
    pub(crate) id: InstId,
    pub(crate) kind: InstKind,
    pub(crate) ty: DataType,
    pub(crate) inputs: Vec<Input>,
    pub(crate) users: Vec<InstId>,
    pub(crate) vregs: Vec<VRegInfo>,
    pub(crate) pc: Option<u32>,
    pub(crate) block: Option<BlockId>,
    pub(crate) flags: InstFlags,
    pub(crate) removed: bool,
}

impl Inst {
    pub(crate) fn new(id: InstId, kind: InstKind, ty: DataType, pc: Option<u32>) -> Self {
        let flags = kind.default_flags();
        Self {
            id,
            kind,
            ty,
            inputs: Vec::new(),
            users: Vec::new(),
            vregs: Vec::new(),
            pc,
            block: None,
            flags,
            removed: false,
        }
    }

    /// The instruction's handle.
    #[must_use]
    pub fn id(&self) -> InstId {
        self.id
    }

    /// The operation.
    #[must_use]
    pub fn kind(&self) -> &InstKind {
        &self.kind
    }

    /// The result type.
    #[must_use]
    pub fn ty(&self) -> DataType {
        self.ty
    }

    /// Ordered input edges.
    #[must_use]
    pub fn inputs(&self) -> &[Input] {
        &self.inputs
    }

    /// The instruction feeding input `index`.
    #[must_use]
    pub fn input(&self, index: usize) -> Option<InstId> {
        self.inputs.get(index).map(|i| i.inst)
    }

    /// Consumers, one entry per use.
    #[must_use]
    pub fn users(&self) -> &[InstId] {
        &self.users
    }

    /// Virtual registers represented by the inputs of a SaveState or SafePoint.
    #[must_use]
    pub fn vregs(&self) -> &[VRegInfo] {
        &self.vregs
    }

    /// Bytecode offset the instruction was built from.
    #[must_use]
    pub fn pc(&self) -> Option<u32> {
        self.pc
    }

    /// The block holding the instruction.
    #[must_use]
    pub fn block(&self) -> Option<BlockId> {
        self.block
    }

    /// The instruction's flags.
    #[must_use]
    pub fn flags(&self) -> InstFlags {
        self.flags
    }

    /// Returns `true` once the instruction was deleted from the graph.
    #[must_use]
    pub fn is_removed(&self) -> bool {
        self.removed
    }

    /// Returns `true` for phis and catch phis.
    #[must_use]
    pub fn is_phi(&self) -> bool {
        matches!(self.kind, InstKind::Phi | InstKind::CatchPhi { .. })
    }

    /// Returns `true` for catch phis.
    #[must_use]
    pub fn is_catch_phi(&self) -> bool {
        matches!(self.kind, InstKind::CatchPhi { .. })
    }

    /// SaveState and SafePoint both snapshot the register state.
    #[must_use]
    pub fn is_save_state(&self) -> bool {
        matches!(self.kind, InstKind::SaveState | InstKind::SafePoint)
    }

    /// Returns `true` for constants of any type.
    #[must_use]
    pub fn is_constant(&self) -> bool {
        matches!(self.kind, InstKind::Constant(_))
    }

    /// Integer constants are the only inputs that do not pin a phi's type.
    #[must_use]
    pub fn is_int_constant(&self) -> bool {
        matches!(self.kind, InstKind::Constant(ConstValue::Int(_)))
    }

    /// Returns `true` for every kind of call.
    #[must_use]
    pub fn is_call(&self) -> bool {
        self.flags.contains(InstFlags::CALL)
    }

    /// Returns `true` if the instruction may raise an exception.
    #[must_use]
    pub fn can_throw(&self) -> bool {
        self.flags.contains(InstFlags::CAN_THROW)
    }

    /// Returns `true` if the last input is a SaveState.
    #[must_use]
    pub fn requires_state(&self) -> bool {
        self.flags.contains(InstFlags::REQUIRE_STATE)
    }

    /// Returns `true` for reference stores that need a GC write barrier.
    #[must_use]
    pub fn needs_barrier(&self) -> bool {
        self.flags.contains(InstFlags::BARRIER)
    }

    /// The SaveState input of a state-requiring instruction.
    #[must_use]
    pub fn save_state(&self) -> Option<InstId> {
        if self.requires_state() {
            self.inputs.last().map(|i| i.inst)
        } else {
            None
        }
    }

    /// For calls: the argument inputs, receiver included, without the
    /// resolved method pointer and the SaveState.
    #[must_use]
    pub fn call_arguments(&self) -> &[Input] {
        let trailing = match self.kind {
            InstKind::CallResolvedStatic { .. } | InstKind::CallResolvedVirtual { .. } => 2,
            _ if self.requires_state() => 1,
            _ => 0,
        };
        let end = self.inputs.len().saturating_sub(trailing);
        &self.inputs[..end]
    }
}
