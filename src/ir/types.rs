//! Value types of IR instructions.

use strum::{EnumCount, EnumIter};

/// The result type of an instruction, or the type an input edge requires.
///
/// `NoType` marks a value whose type is not known yet (a phi whose inputs
/// disagreed at creation); the phi resolver replaces it. `Undefined` is the
/// sentinel for a phi that has no real input to take a type from.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, EnumIter, EnumCount, strum::Display,
)]
#[strum(serialize_all = "lowercase")]
pub enum DataType {
    /// Type not inferred yet
    #[default]
    #[strum(serialize = "notype")]
    NoType,
    /// No value can be typed; see [`Graph::is_non_optimizable`](crate::ir::Graph::is_non_optimizable)
    Undefined,
    /// Boolean (`u1`)
    Bool,
    /// 32-bit integer
    #[strum(serialize = "i32")]
    Int32,
    /// 64-bit integer
    #[strum(serialize = "i64")]
    Int64,
    /// 32-bit float
    #[strum(serialize = "f32")]
    Float32,
    /// 64-bit float
    #[strum(serialize = "f64")]
    Float64,
    /// Managed object reference
    #[strum(serialize = "ref")]
    Reference,
    /// Raw pointer (resolved method, field or class address)
    #[strum(serialize = "ptr")]
    Pointer,
    /// Dynamically typed value
    Any,
    /// No result
    Void,
}

impl DataType {
    /// Returns `true` for `Bool`, `Int32` and `Int64`.
    #[must_use]
    pub const fn is_integer(self) -> bool {
        matches!(self, DataType::Bool | DataType::Int32 | DataType::Int64)
    }

    /// Returns `true` for `Float32` and `Float64`.
    #[must_use]
    pub const fn is_float(self) -> bool {
        matches!(self, DataType::Float32 | DataType::Float64)
    }

    /// Returns `true` for managed references.
    #[must_use]
    pub const fn is_reference(self) -> bool {
        matches!(self, DataType::Reference)
    }

    /// Returns `true` for every type a value can actually have.
    #[must_use]
    pub const fn is_concrete(self) -> bool {
        !matches!(self, DataType::NoType | DataType::Undefined | DataType::Void)
    }

    /// Returns the type class used to decide whether two values may meet in a
    /// phi. All integer widths share the `Int64` class.
    #[must_use]
    pub const fn common(self) -> DataType {
        match self {
            DataType::Bool | DataType::Int32 | DataType::Int64 => DataType::Int64,
            other => other,
        }
    }

    /// Merges two concrete types meeting in a phi.
    ///
    /// Types of the same class merge to the wider one; anything else does not
    /// merge.
    #[must_use]
    pub fn merge(self, other: DataType) -> Option<DataType> {
        if self == other {
            return Some(self);
        }
        if self.common() != other.common() {
            return None;
        }
        Some(if self.rank() >= other.rank() { self } else { other })
    }

    const fn rank(self) -> u8 {
        match self {
            DataType::Bool => 1,
            DataType::Int32 => 2,
            DataType::Int64 => 3,
            _ => 0,
        }
    }
}
