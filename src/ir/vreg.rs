//! Virtual-register descriptors attached to SaveState inputs.

use std::fmt;

use crate::ir::DataType;

/// Environment slots of methods that carry a lexical environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter, strum::Display)]
pub enum EnvSlot {
    /// The currently executing function object
    #[strum(serialize = "func")]
    ThisFunction,
    /// The constant pool of the function
    #[strum(serialize = "cp")]
    ConstPool,
    /// The innermost lexical environment
    #[strum(serialize = "env")]
    LexEnv,
}

impl EnvSlot {
    /// All environment slots in table order.
    pub const ALL: [EnvSlot; 3] = [EnvSlot::ThisFunction, EnvSlot::ConstPool, EnvSlot::LexEnv];
}

/// Register class of a virtual-register slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VRegKind {
    /// An ordinary frame register
    Ordinary,
    /// The implicit accumulator
    Accumulator,
    /// An environment slot
    Env(EnvSlot),
}

/// Where a value lives when the interpreter frame is rebuilt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum VRegLocation {
    /// Not live
    #[default]
    None,
    /// Stored in its interpreter frame slot
    Slot,
    /// Held in an integer machine register
    IntRegister,
    /// Held in a floating-point machine register
    FloatRegister,
    /// Rematerialized from a constant
    Constant,
}

/// Describes which virtual register a SaveState input stands for.
///
/// A `VRegInfo` with [`VRegLocation::None`] is not live. Live entries pair the
/// value type with a location consistent with it: constants are rebuilt from
/// the constant, everything else is read back from its frame slot. Register
/// locations are assigned after IR construction.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct VRegInfo {
    index: u16,
    kind: VRegKind,
    location: VRegLocation,
    ty: DataType,
}

impl VRegInfo {
    /// Creates a live descriptor stored in its frame slot.
    #[must_use]
    pub const fn new(index: u16, kind: VRegKind, ty: DataType) -> Self {
        Self {
            index,
            kind,
            location: VRegLocation::Slot,
            ty,
        }
    }

    /// Creates a descriptor for a value rematerialized from a constant.
    #[must_use]
    pub const fn constant(index: u16, kind: VRegKind, ty: DataType) -> Self {
        Self {
            index,
            kind,
            location: VRegLocation::Constant,
            ty,
        }
    }

    /// Slot index in the definition table.
    #[must_use]
    pub const fn index(&self) -> u16 {
        self.index
    }

    /// Register class.
    #[must_use]
    pub const fn kind(&self) -> VRegKind {
        self.kind
    }

    /// Location kind.
    #[must_use]
    pub const fn location(&self) -> VRegLocation {
        self.location
    }

    /// Type of the recorded value.
    #[must_use]
    pub const fn ty(&self) -> DataType {
        self.ty
    }

    /// Returns `true` unless the location is [`VRegLocation::None`].
    #[must_use]
    pub const fn is_live(&self) -> bool {
        !matches!(self.location, VRegLocation::None)
    }

    /// Returns `true` for the accumulator.
    #[must_use]
    pub const fn is_accumulator(&self) -> bool {
        matches!(self.kind, VRegKind::Accumulator)
    }

    /// Re-describes the recorded value after its definition changed.
    pub(crate) fn set_value(&mut self, ty: DataType, constant: bool) {
        self.ty = ty;
        self.location = if constant {
            VRegLocation::Constant
        } else {
            VRegLocation::Slot
        };
    }
}

impl fmt::Debug for VRegInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

impl fmt::Display for VRegInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            VRegKind::Ordinary => write!(f, "vr{}", self.index),
            VRegKind::Accumulator => write!(f, "acc"),
            VRegKind::Env(slot) => write!(f, "{slot}"),
        }
    }
}
