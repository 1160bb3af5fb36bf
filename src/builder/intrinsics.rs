//! Lowering of recognized intrinsics.
//!
//! Numeric intrinsics become plain arithmetic nodes without a SaveState.
//! String length and typed-array accesses reuse the array and string nodes
//! with their checks. Every other intrinsic keeps the generic `Intrinsic`
//! call shape.

use crate::{
    builder::inst_builder::InstBuilder,
    ir::{BinaryOp, DataType, InstId, InstKind, UnaryOp},
    runtime::{EntityId, IntrinsicId, MethodSignature, RuntimeInterface},
    Result,
};

impl<R: RuntimeInterface + ?Sized> InstBuilder<'_, '_, R> {
    /// Lowers a call of intrinsic `id`. `args` are marshalled as for a call:
    /// an instance receiver is already null-checked, a static first argument
    /// is checked here before a string or array node reads it. `ss` is `None`
    /// only for intrinsics that do not [need a state](IntrinsicId::needs_state).
    pub(super) fn build_intrinsic(
        &mut self,
        id: IntrinsicId,
        method: EntityId,
        signature: &MethodSignature,
        args: &[InstId],
        ss: Option<InstId>,
    ) -> Result<InstId> {
        if args.len() != id.arity() {
            return Err(invalid_bytecode!(
                Some(self.pc),
                "intrinsic {} takes {} arguments, got {}",
                id.name(),
                id.arity(),
                args.len()
            ));
        }
        let ty = id.operand_type();

        let specialized = match (id, ss) {
            (IntrinsicId::MathAbsI32 | IntrinsicId::MathAbsI64 | IntrinsicId::MathAbsF64, _) => {
                Some(self.append(InstKind::Unary(UnaryOp::Abs), ty, &[(args[0], ty)]))
            }
            (IntrinsicId::MathSqrt, _) => {
                Some(self.append(InstKind::Unary(UnaryOp::Sqrt), ty, &[(args[0], ty)]))
            }
            (IntrinsicId::MathMinI32 | IntrinsicId::MathMinI64 | IntrinsicId::MathMinF64, _) => {
                Some(self.append(
                    InstKind::Binary(BinaryOp::Min),
                    ty,
                    &[(args[0], ty), (args[1], ty)],
                ))
            }
            (IntrinsicId::MathMaxI32 | IntrinsicId::MathMaxI64 | IntrinsicId::MathMaxF64, _) => {
                Some(self.append(
                    InstKind::Binary(BinaryOp::Max),
                    ty,
                    &[(args[0], ty), (args[1], ty)],
                ))
            }
            (IntrinsicId::StringLength, Some(ss)) => {
                let string = self.checked_object(signature, args[0], ss);
                Some(self.append(
                    InstKind::LenString,
                    DataType::Int32,
                    &[(string, DataType::Reference)],
                ))
            }
            (IntrinsicId::TypedArrayGetI32, Some(ss)) => {
                let array = self.checked_object(signature, args[0], ss);
                let bc = self.bounds_check(array, args[1], ss);
                Some(self.append(
                    InstKind::LoadArray,
                    DataType::Int32,
                    &[(array, DataType::Reference), (bc, DataType::Int32)],
                ))
            }
            (IntrinsicId::TypedArraySetI32, Some(ss)) => {
                let array = self.checked_object(signature, args[0], ss);
                let bc = self.bounds_check(array, args[1], ss);
                Some(self.store_array(array, bc, args[2], DataType::Int32, Some(ss)))
            }
            _ => None,
        };
        if let Some(node) = specialized {
            return Ok(node);
        }

        let ss = ss.ok_or_else(|| graph_error!("intrinsic {} needs a SaveState", id.name()))?;
        let mut inputs: Vec<(InstId, DataType)> = args
            .iter()
            .enumerate()
            .map(|(i, &arg)| {
                let receiver = usize::from(!signature.is_static);
                let ty = match i.checked_sub(receiver) {
                    Some(param) => signature.params.get(param).copied().unwrap_or(DataType::Any),
                    None => DataType::Reference,
                };
                (arg, ty)
            })
            .collect();
        inputs.push((ss, DataType::NoType));
        Ok(self.append(
            InstKind::Intrinsic { id, method },
            signature.return_type,
            &inputs,
        ))
    }

    /// The first argument as a checked reference: instance receivers were
    /// checked during marshalling, static arguments get their NullCheck here.
    fn checked_object(&mut self, signature: &MethodSignature, value: InstId, ss: InstId) -> InstId {
        if signature.is_static {
            self.null_check(value, ss)
        } else {
            value
        }
    }
}
