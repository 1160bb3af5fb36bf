//! Call lowering.
//!
//! A call site is classified twice. Its [`CallShape`] follows from the opcode
//! alone: who the callee is looked up as and where the arguments come from.
//! Its [`CallState`] is decided once from the runtime and the configuration:
//! whether the callee is known ahead of time, must be resolved through a
//! runtime slot, or is an intrinsic with a specialized lowering.
//!
//! Arguments are marshalled uniformly: receiver (null-checked) first, the
//! declared arguments in order, then the resolved method pointer for
//! unresolved calls, then the SaveState. The unresolved path therefore has the
//! same argument order and count as the resolved one.

use crate::{
    builder::inst_builder::InstBuilder,
    bytecode::{BytecodeInstruction, Opcode, OperandKind},
    ir::{DataType, InstFlags, InstId, InstKind, SlotKind},
    runtime::{EntityId, IntrinsicId, MethodSignature, ResolvedMethod, RuntimeInterface},
    Result,
};

/// How the callee of a call site is dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CallKind {
    /// Direct call of a static or non-virtual method
    Static,
    /// Dispatch through the receiver's class
    Virtual,
    /// Allocation followed by a constructor call
    InitObject,
    /// Call into another VM
    Interop,
}

/// Where the argument values of a call site come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CallArgs {
    /// The register operands, in order
    List,
    /// A contiguous register window starting at the first register operand
    Range,
    /// The register operands with the accumulator inserted at `position`
    Accumulator { position: usize },
}

/// Opcode-derived description of a call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CallShape {
    pub(crate) kind: CallKind,
    pub(crate) args: CallArgs,
}

impl CallShape {
    /// The shape of `inst`, `None` for non-call opcodes.
    pub(crate) fn of(inst: &BytecodeInstruction) -> Result<Option<Self>> {
        use Opcode as O;

        let (kind, args) = match inst.opcode {
            O::CallShort | O::Call => (CallKind::Static, CallArgs::List),
            O::CallRange => (CallKind::Static, CallArgs::Range),
            O::CallVirtShort | O::CallVirt => (CallKind::Virtual, CallArgs::List),
            O::CallVirtRange => (CallKind::Virtual, CallArgs::Range),
            O::CallAcc | O::CallVirtAcc => {
                let position = inst.imm(inst.operands.len().saturating_sub(1))?;
                let position = usize::try_from(position).map_err(|_| {
                    invalid_bytecode!(Some(inst.pc), "negative accumulator position {}", position)
                })?;
                let kind = if inst.opcode == O::CallAcc {
                    CallKind::Static
                } else {
                    CallKind::Virtual
                };
                (kind, CallArgs::Accumulator { position })
            }
            O::InitObj => (CallKind::InitObject, CallArgs::List),
            O::CallInterop => (CallKind::Interop, CallArgs::Range),
            _ => return Ok(None),
        };
        Ok(Some(Self { kind, args }))
    }
}

/// What is known about the callee of a call site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum CallState {
    /// Resolved through a runtime slot when the code first runs
    Unresolved,
    /// Known ahead of time
    ResolvedDirect(ResolvedMethod),
    /// A recognized intrinsic
    Intrinsic(IntrinsicId),
}

impl<R: RuntimeInterface + ?Sized> InstBuilder<'_, '_, R> {
    fn call_state(&self, method: EntityId) -> CallState {
        if self.config.is_bytecode_optimizer() {
            return CallState::ResolvedDirect(ResolvedMethod::default());
        }
        if self.config.force_unresolved {
            return CallState::Unresolved;
        }
        let Some(resolved) = self.runtime.resolve_method(method) else {
            return CallState::Unresolved;
        };
        match resolved.intrinsic {
            Some(id) if self.config.intrinsics_enabled => CallState::Intrinsic(id),
            _ if self.config.is_aot() && resolved.is_external => CallState::Unresolved,
            _ => CallState::ResolvedDirect(resolved),
        }
    }

    /// Reads the argument values of a call site, receiver included.
    fn call_values(
        &self,
        inst: &BytecodeInstruction,
        args: CallArgs,
        count: usize,
    ) -> Result<Vec<InstId>> {
        let registers: Vec<u16> = inst
            .operands
            .iter()
            .enumerate()
            .filter(|(_, op)| op.kind() == OperandKind::VReg)
            .map(|(i, _)| inst.vreg(i))
            .collect::<Result<_>>()?;

        match args {
            CallArgs::List => {
                if count > registers.len() {
                    return Err(invalid_bytecode!(
                        Some(inst.pc),
                        "{} passes {} arguments, callee takes {}",
                        inst.opcode.mnemonic(),
                        registers.len(),
                        count
                    ));
                }
                registers[..count].iter().map(|&r| self.read(r)).collect()
            }
            CallArgs::Range => {
                let first = registers.first().copied().unwrap_or(0);
                (0..count)
                    .map(|i| {
                        let vreg = u16::try_from(usize::from(first) + i).map_err(|_| {
                            invalid_bytecode!(Some(inst.pc), "argument range exceeds registers")
                        })?;
                        self.read(vreg)
                    })
                    .collect()
            }
            CallArgs::Accumulator { position } => {
                if count > registers.len() + 1 || (count > 0 && position >= count) {
                    return Err(invalid_bytecode!(
                        Some(inst.pc),
                        "accumulator position {} invalid for {} arguments",
                        position,
                        count
                    ));
                }
                let mut regs = registers.iter();
                (0..count)
                    .map(|i| {
                        if i == position {
                            self.read_acc()
                        } else {
                            let reg = regs.next().copied().ok_or_else(|| {
                                invalid_bytecode!(Some(inst.pc), "missing call argument {}", i)
                            })?;
                            self.read(reg)
                        }
                    })
                    .collect()
            }
        }
    }

    /// Lowers a call-shaped instruction.
    pub(super) fn build_call(&mut self, inst: &BytecodeInstruction) -> Result<()> {
        let shape = CallShape::of(inst)?
            .ok_or_else(|| graph_error!("{} is not a call", inst.opcode.mnemonic()))?;
        let method = inst.id(0)?;

        if shape.kind == CallKind::Interop {
            if self.config.is_bytecode_optimizer() {
                self.fail("interop calls are not supported by the bytecode optimizer");
                return Ok(());
            }
            if !self.config.arch.supports_interop() {
                self.fail(format!("interop calls are not supported on {}", self.config.arch));
                return Ok(());
            }
        }

        let signature = self.runtime.method_signature(method).ok_or_else(|| {
            invalid_bytecode!(Some(self.pc), "unknown method {}", method)
        })?;
        if shape.kind == CallKind::Virtual && signature.is_static {
            return Err(invalid_bytecode!(
                Some(self.pc),
                "virtual call of static method {}",
                method
            ));
        }

        let count = if shape.kind == CallKind::InitObject {
            signature.params.len()
        } else {
            signature.arg_count()
        };
        let mut values = self.call_values(inst, shape.args, count)?;
        let state = self.call_state(method);

        if let CallState::Intrinsic(id) = state {
            if !id.needs_state() {
                let result = self.build_intrinsic(id, method, &signature, &values, None)?;
                self.finish_call(&signature, result);
                return Ok(());
            }
        }

        let mut ss = self.save_state();
        if shape.kind == CallKind::InitObject {
            let object = self.new_object(signature.class, ss);
            ss = self.save_state();
            values.insert(0, object);
        } else if !signature.is_static {
            let receiver = values
                .first()
                .copied()
                .ok_or_else(|| graph_error!("instance call without a receiver"))?;
            values[0] = self.null_check(receiver, ss);
        }

        let result = match state {
            CallState::Intrinsic(id) => {
                self.build_intrinsic(id, method, &signature, &values, Some(ss))?
            }
            CallState::ResolvedDirect(resolved) => {
                let kind = match shape.kind {
                    CallKind::Virtual if resolved.is_interface || !resolved.is_final => {
                        InstKind::CallVirtual { method }
                    }
                    CallKind::Interop => InstKind::CallInterop { method },
                    _ => InstKind::CallStatic { method },
                };
                let inputs = self.call_inputs(&signature, &values, None, ss);
                let call = self.append(kind, signature.return_type, &inputs);
                if resolved.is_native && !resolved.native_can_throw {
                    self.graph.inst_mut(call).flags.remove(InstFlags::CAN_THROW);
                }
                call
            }
            CallState::Unresolved => {
                if shape.kind == CallKind::Interop {
                    let inputs = self.call_inputs(&signature, &values, None, ss);
                    self.append(InstKind::CallInterop { method }, signature.return_type, &inputs)
                } else if shape.kind == CallKind::Virtual {
                    let slot = self
                        .graph
                        .unresolved_types_mut()
                        .add(SlotKind::VirtualMethod, method);
                    let receiver = values
                        .first()
                        .copied()
                        .ok_or_else(|| graph_error!("virtual call without a receiver"))?;
                    let ptr = self.append(
                        InstKind::ResolveVirtual { method, slot },
                        DataType::Pointer,
                        &[(receiver, DataType::Reference), (ss, DataType::NoType)],
                    );
                    let inputs = self.call_inputs(&signature, &values, Some(ptr), ss);
                    self.append(
                        InstKind::CallResolvedVirtual { method },
                        signature.return_type,
                        &inputs,
                    )
                } else {
                    let slot = self
                        .graph
                        .unresolved_types_mut()
                        .add(SlotKind::StaticMethod, method);
                    let ptr = self.append(
                        InstKind::ResolveStatic { method, slot },
                        DataType::Pointer,
                        &[(ss, DataType::NoType)],
                    );
                    let inputs = self.call_inputs(&signature, &values, Some(ptr), ss);
                    self.append(
                        InstKind::CallResolvedStatic { method },
                        signature.return_type,
                        &inputs,
                    )
                }
            }
        };

        if shape.kind == CallKind::InitObject {
            self.write_acc(values.first().copied());
        } else {
            self.finish_call(&signature, result);
        }
        Ok(())
    }

    /// Typed inputs of a call: arguments, optional method pointer, SaveState.
    fn call_inputs(
        &self,
        signature: &MethodSignature,
        values: &[InstId],
        ptr: Option<InstId>,
        ss: InstId,
    ) -> Vec<(InstId, DataType)> {
        let receiver = usize::from(values.len() > signature.params.len());
        let mut inputs: Vec<(InstId, DataType)> = values
            .iter()
            .enumerate()
            .map(|(i, &v)| {
                let ty = match i.checked_sub(receiver) {
                    Some(param) => signature.params.get(param).copied().unwrap_or(DataType::Any),
                    None => DataType::Reference,
                };
                (v, ty)
            })
            .collect();
        if let Some(ptr) = ptr {
            inputs.push((ptr, DataType::Pointer));
        }
        inputs.push((ss, DataType::NoType));
        inputs
    }

    fn finish_call(&mut self, signature: &MethodSignature, result: InstId) {
        if signature.return_type == DataType::Void {
            self.write_acc(None);
        } else {
            self.write_acc(Some(result));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::Operand;

    #[test]
    fn test_call_shapes() -> Result<()> {
        let call = BytecodeInstruction::new(
            0,
            Opcode::CallVirtRange,
            vec![Operand::Id(EntityId(1)), Operand::VReg(2)],
        );
        let shape = CallShape::of(&call)?.expect("call shape");
        assert_eq!(shape.kind, CallKind::Virtual);
        assert_eq!(shape.args, CallArgs::Range);

        let acc = BytecodeInstruction::new(
            0,
            Opcode::CallAcc,
            vec![
                Operand::Id(EntityId(1)),
                Operand::VReg(0),
                Operand::VReg(1),
                Operand::VReg(2),
                Operand::Imm(1),
            ],
        );
        let shape = CallShape::of(&acc)?.expect("call shape");
        assert_eq!(shape.args, CallArgs::Accumulator { position: 1 });

        let lda = BytecodeInstruction::new(0, Opcode::Lda, vec![Operand::VReg(0)]);
        assert_eq!(CallShape::of(&lda)?, None);
        Ok(())
    }
}
