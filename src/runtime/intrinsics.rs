//! Intrinsic ids recognized by the runtime.

use strum::{EnumCount, EnumIter, IntoStaticStr};

use crate::ir::DataType;

/// Standard-library methods the runtime recognizes as intrinsics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, EnumCount, IntoStaticStr)]
#[allow(missing_docs)]
pub enum IntrinsicId {
    #[strum(serialize = "Math.absI32")]
    MathAbsI32,
    #[strum(serialize = "Math.absI64")]
    MathAbsI64,
    #[strum(serialize = "Math.absF64")]
    MathAbsF64,
    #[strum(serialize = "Math.minI32")]
    MathMinI32,
    #[strum(serialize = "Math.minI64")]
    MathMinI64,
    #[strum(serialize = "Math.minF64")]
    MathMinF64,
    #[strum(serialize = "Math.maxI32")]
    MathMaxI32,
    #[strum(serialize = "Math.maxI64")]
    MathMaxI64,
    #[strum(serialize = "Math.maxF64")]
    MathMaxF64,
    #[strum(serialize = "Math.sqrt")]
    MathSqrt,
    #[strum(serialize = "String.length")]
    StringLength,
    #[strum(serialize = "Int32Array.get")]
    TypedArrayGetI32,
    #[strum(serialize = "Int32Array.set")]
    TypedArraySetI32,
    #[strum(serialize = "System.arraycopy")]
    SystemArrayCopy,
    #[strum(serialize = "Object.hashCode")]
    ObjectHashCode,
}

impl IntrinsicId {
    /// Operand type of the numeric intrinsics.
    #[must_use]
    pub const fn operand_type(self) -> DataType {
        match self {
            IntrinsicId::MathAbsI32 | IntrinsicId::MathMinI32 | IntrinsicId::MathMaxI32 => {
                DataType::Int32
            }
            IntrinsicId::MathAbsI64 | IntrinsicId::MathMinI64 | IntrinsicId::MathMaxI64 => {
                DataType::Int64
            }
            IntrinsicId::MathAbsF64
            | IntrinsicId::MathMinF64
            | IntrinsicId::MathMaxF64
            | IntrinsicId::MathSqrt => DataType::Float64,
            IntrinsicId::TypedArrayGetI32 | IntrinsicId::TypedArraySetI32 => DataType::Int32,
            IntrinsicId::StringLength
            | IntrinsicId::SystemArrayCopy
            | IntrinsicId::ObjectHashCode => DataType::Reference,
        }
    }

    /// Number of argument values the intrinsic takes, receiver included.
    #[must_use]
    pub const fn arity(self) -> usize {
        match self {
            IntrinsicId::MathAbsI32
            | IntrinsicId::MathAbsI64
            | IntrinsicId::MathAbsF64
            | IntrinsicId::MathSqrt
            | IntrinsicId::StringLength
            | IntrinsicId::ObjectHashCode => 1,
            IntrinsicId::MathMinI32
            | IntrinsicId::MathMinI64
            | IntrinsicId::MathMinF64
            | IntrinsicId::MathMaxI32
            | IntrinsicId::MathMaxI64
            | IntrinsicId::MathMaxF64
            | IntrinsicId::TypedArrayGetI32 => 2,
            IntrinsicId::TypedArraySetI32 => 3,
            IntrinsicId::SystemArrayCopy => 5,
        }
    }

    /// Pure numeric intrinsics neither throw nor need a SaveState.
    #[must_use]
    pub const fn needs_state(self) -> bool {
        !matches!(
            self,
            IntrinsicId::MathAbsI32
                | IntrinsicId::MathAbsI64
                | IntrinsicId::MathAbsF64
                | IntrinsicId::MathMinI32
                | IntrinsicId::MathMinI64
                | IntrinsicId::MathMinF64
                | IntrinsicId::MathMaxI32
                | IntrinsicId::MathMaxI64
                | IntrinsicId::MathMaxF64
                | IntrinsicId::MathSqrt
        )
    }

    /// Name used in graph dumps.
    #[must_use]
    pub fn name(self) -> &'static str {
        self.into()
    }
}

#[cfg(test)]
mod tests {
    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn test_stateless_intrinsics_are_numeric() {
        for id in IntrinsicId::iter().filter(|id| !id.needs_state()) {
            assert!(
                matches!(
                    id.operand_type(),
                    DataType::Int32 | DataType::Int64 | DataType::Float64
                ),
                "{}",
                id.name()
            );
            assert!(id.arity() <= 2, "{}", id.name());
        }
    }

    #[test]
    fn test_names_are_distinct() {
        let mut names: Vec<&str> = IntrinsicId::iter().map(IntrinsicId::name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), IntrinsicId::COUNT);
    }
}
