//! Translation of single bytecode instructions.
//!
//! [`InstBuilder`] lowers one instruction at a time into the block being
//! built, reading and writing reaching definitions through [`VRegState`].
//! Every instruction that may suspend, throw or deoptimize gets a SaveState
//! first; checks (null, zero, negative size, bounds, store type) are explicit
//! nodes whose results replace the checked value for the rest of the step.
//!
//! Calls are lowered in [`super::calls`], intrinsics in [`super::intrinsics`].

use std::collections::HashMap;

use crate::{
    builder::{exceptions::ExceptionRegionResolver, vregs::VRegState},
    bytecode::{BytecodeInstruction, MethodBody, Opcode},
    config::BuilderConfig,
    ir::{
        BinaryOp, BlockId, ConditionCode, ConstValue, DataType, EnvSlot, Graph, InstFlags, InstId,
        InstKind, MonitorKind, SlotKind, UnaryOp,
    },
    runtime::{EntityId, LiteralTag, LiteralValue, RuntimeInterface},
    Result,
};

/// Builds IR for the instructions of one method, block by block.
pub(crate) struct InstBuilder<'a, 'm, R: RuntimeInterface + ?Sized> {
    pub(super) graph: &'a mut Graph,
    pub(super) runtime: &'a R,
    pub(super) config: &'a BuilderConfig,
    pub(super) method: &'m MethodBody,
    pub(super) vregs: VRegState,
    exceptions: ExceptionRegionResolver<'m>,
    block: BlockId,
    pub(super) pc: u32,
    /// NullChecks built during the current step, by checked value
    null_checks: HashMap<InstId, InstId>,
    failed: Option<String>,
}

impl<'a, 'm, R: RuntimeInterface + ?Sized> InstBuilder<'a, 'm, R> {
    pub(crate) fn new(
        graph: &'a mut Graph,
        runtime: &'a R,
        config: &'a BuilderConfig,
        method: &'m MethodBody,
        vregs: VRegState,
        exceptions: ExceptionRegionResolver<'m>,
    ) -> Self {
        let block = graph.start_block().unwrap_or(BlockId::new(0));
        Self {
            graph,
            runtime,
            config,
            method,
            vregs,
            exceptions,
            block,
            pc: 0,
            null_checks: HashMap::new(),
            failed: None,
        }
    }

    /// Releases the SSA and exception state for finalization.
    pub(crate) fn into_parts(self) -> (VRegState, ExceptionRegionResolver<'m>) {
        (self.vregs, self.exceptions)
    }

    /// Why the last instruction could not be legalized, if it could not.
    pub(crate) fn failure(&self) -> Option<&str> {
        self.failed.as_deref()
    }

    pub(super) fn fail(&mut self, reason: impl Into<String>) {
        self.failed = Some(reason.into());
    }

    // ============================================================================================
    // Blocks
    // ============================================================================================

    /// Seeds the definition table of `block` and emits its leading nodes
    /// (parameters, try marker, safepoint).
    pub(crate) fn begin_block(&mut self, block: BlockId) -> Result<()> {
        self.block = block;
        let b = self.graph.block(block);
        let (start, catch_begin, try_begin) = (b.is_start(), b.is_catch_begin(), b.is_try_begin());
        let safepoint = b.is_loop_header()
            && !b.is_boundary()
            && self.config.use_safepoint
            && !self.config.is_bytecode_optimizer();

        if start {
            self.seed_start_block(block);
            return Ok(());
        }
        if catch_begin {
            let defs = self
                .exceptions
                .catch_defs(block, self.vregs.layout())
                .ok_or_else(|| graph_error!("catch entry {} has no catch phis", block))?;
            self.vregs.seed(block, defs);
            return Ok(());
        }

        self.vregs.begin_block(self.graph, block)?;
        if try_begin {
            self.build_try_marker(block);
        }
        if safepoint {
            let sp = self.graph.create_inst(
                InstKind::SafePoint,
                DataType::Void,
                self.graph.block(block).guest_pc(),
            );
            self.fill_state(sp);
            self.graph.append_inst(block, sp);
        }
        Ok(())
    }

    /// Stores the exit table of the current block.
    pub(crate) fn end_block(&mut self) {
        self.vregs.seal(self.graph, self.block);
    }

    fn seed_start_block(&mut self, block: BlockId) {
        let layout = self.vregs.layout();
        let mut defs = vec![None; layout.len()];
        for arg in 0..self.method.num_args {
            let param = self.graph.add_parameter(arg, self.method.param_type(arg));
            defs[usize::from(self.method.arg_vreg(arg))] = Some(param);
        }
        for (k, slot) in EnvSlot::ALL.into_iter().enumerate() {
            let Some(index) = layout.env(slot) else {
                continue;
            };
            let k = u16::try_from(k).unwrap_or(u16::MAX);
            let param = self
                .graph
                .add_parameter(self.method.num_args.saturating_add(k), DataType::Any);
            defs[index] = Some(param);
        }
        self.vregs.seed(block, defs);
    }

    fn build_try_marker(&mut self, block: BlockId) {
        let Some(info) = self.graph.try_blocks().iter().find(|t| t.begin == block) else {
            return;
        };
        let catch_types = info.handlers.iter().map(|h| h.type_id).collect();
        let pc = Some(info.start_pc);
        let marker = self
            .graph
            .create_inst(InstKind::Try { catch_types }, DataType::Void, pc);
        self.graph.append_inst(block, marker);
    }

    // ============================================================================================
    // Node helpers
    // ============================================================================================

    /// Creates a node at the current pc with `inputs` and appends it to the
    /// current block.
    pub(super) fn append(
        &mut self,
        kind: InstKind,
        ty: DataType,
        inputs: &[(InstId, DataType)],
    ) -> InstId {
        let id = self.graph.create_inst(kind, ty, Some(self.pc));
        for &(input, input_ty) in inputs {
            self.graph.add_input(id, input, input_ty);
        }
        self.graph.append_inst(self.block, id);
        id
    }

    fn fill_state(&mut self, state: InstId) {
        let layout = self.vregs.layout();
        let defs = self.vregs.defs().to_vec();
        for (slot, def) in defs.into_iter().enumerate() {
            if let Some(def) = def {
                let info = layout.info(slot, self.graph, def);
                self.graph.add_state_input(state, def, info);
            }
        }
    }

    /// A SaveState capturing every defined slot.
    pub(super) fn save_state(&mut self) -> InstId {
        let ss = self
            .graph
            .create_inst(InstKind::SaveState, DataType::Void, Some(self.pc));
        self.fill_state(ss);
        self.graph.append_inst(self.block, ss);
        ss
    }

    pub(super) fn constant(&mut self, value: ConstValue) -> InstId {
        self.graph.find_or_create_constant(value)
    }

    pub(super) fn int(&mut self, value: i64) -> InstId {
        self.constant(ConstValue::Int(value))
    }

    /// Reads register `vreg`.
    pub(super) fn read(&self, vreg: u16) -> Result<InstId> {
        if vreg >= self.method.num_vregs {
            return Err(invalid_bytecode!(
                Some(self.pc),
                "register v{} out of range ({} registers)",
                vreg,
                self.method.num_vregs
            ));
        }
        self.vregs.read(usize::from(vreg)).ok_or_else(|| {
            invalid_bytecode!(Some(self.pc), "read of undefined register v{}", vreg)
        })
    }

    pub(super) fn write(&mut self, vreg: u16, def: InstId) -> Result<()> {
        if vreg >= self.method.num_vregs {
            return Err(invalid_bytecode!(
                Some(self.pc),
                "register v{} out of range ({} registers)",
                vreg,
                self.method.num_vregs
            ));
        }
        self.vregs.write(usize::from(vreg), Some(def));
        Ok(())
    }

    pub(super) fn read_acc(&self) -> Result<InstId> {
        let acc = self.vregs.layout().acc();
        self.vregs
            .read(acc)
            .ok_or_else(|| invalid_bytecode!(Some(self.pc), "read of undefined accumulator"))
    }

    pub(super) fn write_acc(&mut self, def: Option<InstId>) {
        let acc = self.vregs.layout().acc();
        self.vregs.write(acc, def);
    }

    fn env_slot(&self, slot: EnvSlot) -> Result<usize> {
        self.vregs.layout().env(slot).ok_or_else(|| {
            invalid_bytecode!(
                Some(self.pc),
                "method without a lexical environment accesses {}",
                slot
            )
        })
    }

    /// NullCheck of `value`, shared by every use within the current step.
    pub(super) fn null_check(&mut self, value: InstId, ss: InstId) -> InstId {
        if let Some(&nc) = self.null_checks.get(&value) {
            return nc;
        }
        let nc = self.append(
            InstKind::NullCheck,
            DataType::Reference,
            &[(value, DataType::Reference), (ss, DataType::NoType)],
        );
        self.null_checks.insert(value, nc);
        nc
    }

    /// `LenArray` and `BoundsCheck` of `index` against the checked array.
    pub(super) fn bounds_check(&mut self, array: InstId, index: InstId, ss: InstId) -> InstId {
        let len = self.append(InstKind::LenArray, DataType::Int32, &[(array, DataType::Reference)]);
        self.append(
            InstKind::BoundsCheck,
            DataType::Int32,
            &[
                (len, DataType::Int32),
                (index, DataType::Int32),
                (ss, DataType::NoType),
            ],
        )
    }

    fn class_resolved(&self, class: EntityId) -> bool {
        self.config.is_bytecode_optimizer()
            || (!self.config.force_unresolved && self.runtime.resolve_class(class).is_some())
    }

    fn field_resolved(&self, field: EntityId) -> bool {
        self.config.is_bytecode_optimizer()
            || (!self.config.force_unresolved && self.runtime.resolve_field(field).is_some())
    }

    /// Loads and initializes `class`, through a runtime slot when unresolved.
    pub(super) fn load_and_init_class(&mut self, class: EntityId, ss: InstId) -> InstId {
        let kind = if self.class_resolved(class) {
            InstKind::LoadAndInitClass { class }
        } else {
            let slot = self.graph.unresolved_types_mut().add(SlotKind::Class, class);
            InstKind::UnresolvedLoadAndInitClass { class, slot }
        };
        self.append(kind, DataType::Reference, &[(ss, DataType::NoType)])
    }

    fn load_class(&mut self, class: EntityId, ss: InstId) -> InstId {
        let kind = if self.class_resolved(class) {
            InstKind::LoadClass { class }
        } else {
            let slot = self.graph.unresolved_types_mut().add(SlotKind::Class, class);
            InstKind::UnresolvedLoadType { class, slot }
        };
        self.append(kind, DataType::Reference, &[(ss, DataType::NoType)])
    }

    // ============================================================================================
    // Instructions
    // ============================================================================================

    /// Lowers one instruction into the current block. Catch phis of every
    /// covering handler receive the register state the instruction started
    /// with when it may throw.
    pub(crate) fn build_instruction(&mut self, inst: &BytecodeInstruction) -> Result<()> {
        self.pc = inst.pc;
        self.null_checks.clear();

        let snapshot = (inst.opcode.may_throw() && self.exceptions.is_covered(inst.pc))
            .then(|| self.vregs.defs().to_vec());
        let first = self.graph.block(self.block).insts().len();

        self.lower(inst)?;

        if let Some(defs) = snapshot {
            let built = &self.graph.block(self.block).insts()[first..];
            let thrower = built
                .iter()
                .copied()
                .find(|&i| self.graph.inst(i).can_throw())
                .or_else(|| built.first().copied());
            if let Some(thrower) = thrower {
                self.exceptions
                    .add_catch_phi_inputs(self.graph, inst.pc, thrower, &defs);
            }
        }
        Ok(())
    }

    fn lower(&mut self, inst: &BytecodeInstruction) -> Result<()> {
        use Opcode as O;

        match inst.opcode {
            O::Nop | O::Jmp => {}

            O::Mov | O::MovWide | O::MovObj => {
                let value = self.read(inst.vreg(1)?)?;
                self.write(inst.vreg(0)?, value)?;
            }
            O::Movi | O::MoviWide => {
                let value = self.int(inst.imm(1)?);
                self.write(inst.vreg(0)?, value)?;
            }
            O::FmoviWide => {
                let value = self.constant(ConstValue::Float64(inst.fimm(1)?));
                self.write(inst.vreg(0)?, value)?;
            }
            O::Lda | O::LdaWide | O::LdaObj => {
                let value = self.read(inst.vreg(0)?)?;
                self.write_acc(Some(value));
            }
            O::Ldai | O::LdaiWide => {
                let value = self.int(inst.imm(0)?);
                self.write_acc(Some(value));
            }
            O::FldaiWide => {
                let value = self.constant(ConstValue::Float64(inst.fimm(0)?));
                self.write_acc(Some(value));
            }
            O::Sta | O::StaWide | O::StaObj => {
                let value = self.read_acc()?;
                self.write(inst.vreg(0)?, value)?;
            }
            O::LdaNull => {
                let null = self.graph.find_or_create_null_ptr();
                self.write_acc(Some(null));
            }
            O::LdaStr | O::LdaType => {
                let id = inst.id(0)?;
                let ss = self.save_state();
                let kind = if inst.opcode == O::LdaStr {
                    InstKind::LoadString { id }
                } else {
                    InstKind::LoadType { id }
                };
                let value = self.append(kind, DataType::Reference, &[(ss, DataType::NoType)]);
                self.write_acc(Some(value));
            }
            O::LdaConst => self.build_load_const_array(inst.vreg(0)?, inst.id(1)?)?,

            O::Add2 | O::Add2Wide | O::Sub2 | O::Sub2Wide | O::Mul2 | O::Mul2Wide => {
                self.build_binary(inst)?;
            }
            O::Div2 | O::Div2Wide | O::Mod2 | O::Mod2Wide => self.build_binary(inst)?,
            O::And2 | O::Or2 | O::Xor2 | O::Shl2 | O::Shr2 | O::Ashr2 => self.build_binary(inst)?,
            O::Fadd2Wide | O::Fsub2Wide | O::Fmul2Wide | O::Fdiv2Wide => self.build_binary(inst)?,

            O::Addi | O::Subi | O::Muli | O::Andi | O::Ori | O::Shli => {
                let op = match inst.opcode {
                    O::Addi => BinaryOp::Add,
                    O::Subi => BinaryOp::Sub,
                    O::Muli => BinaryOp::Mul,
                    O::Andi => BinaryOp::And,
                    O::Ori => BinaryOp::Or,
                    _ => BinaryOp::Shl,
                };
                let acc = self.read_acc()?;
                let imm = inst.imm(0)?;
                let value = self.append(
                    InstKind::BinaryImm { op, imm },
                    DataType::Int32,
                    &[(acc, DataType::Int32)],
                );
                self.write_acc(Some(value));
            }
            O::Divi => {
                let acc = self.read_acc()?;
                let imm = inst.imm(0)?;
                let value = if imm == 0 {
                    let ss = self.save_state();
                    let zero = self.int(0);
                    let zc = self.append(
                        InstKind::ZeroCheck,
                        DataType::Int32,
                        &[(zero, DataType::Int32), (ss, DataType::NoType)],
                    );
                    self.append(
                        InstKind::Binary(BinaryOp::Div),
                        DataType::Int32,
                        &[(acc, DataType::Int32), (zc, DataType::Int32)],
                    )
                } else {
                    self.append(
                        InstKind::BinaryImm {
                            op: BinaryOp::Div,
                            imm,
                        },
                        DataType::Int32,
                        &[(acc, DataType::Int32)],
                    )
                };
                self.write_acc(Some(value));
            }

            O::Neg | O::NegWide | O::FnegWide | O::Not | O::NotWide => {
                let (op, ty) = match inst.opcode {
                    O::Neg => (UnaryOp::Neg, DataType::Int32),
                    O::NegWide => (UnaryOp::Neg, DataType::Int64),
                    O::FnegWide => (UnaryOp::Neg, DataType::Float64),
                    O::Not => (UnaryOp::Not, DataType::Int32),
                    _ => (UnaryOp::Not, DataType::Int64),
                };
                let acc = self.read_acc()?;
                let value = self.append(InstKind::Unary(op), ty, &[(acc, ty)]);
                self.write_acc(Some(value));
            }
            O::Inci => {
                let vreg = inst.vreg(0)?;
                let src = self.read(vreg)?;
                let value = self.append(
                    InstKind::BinaryImm {
                        op: BinaryOp::Add,
                        imm: inst.imm(1)?,
                    },
                    DataType::Int32,
                    &[(src, DataType::Int32)],
                );
                self.write(vreg, value)?;
            }

            O::CmpWide | O::FcmplWide | O::FcmpgWide => {
                let operand_ty = if inst.opcode == O::CmpWide {
                    DataType::Int64
                } else {
                    DataType::Float64
                };
                let acc = self.read_acc()?;
                let rhs = self.read(inst.vreg(0)?)?;
                let value = self.append(
                    InstKind::Cmp {
                        fcmpg: inst.opcode == O::FcmpgWide,
                    },
                    DataType::Int32,
                    &[(acc, operand_ty), (rhs, operand_ty)],
                );
                self.write_acc(Some(value));
            }

            O::I32toI64 | O::I64toI32 | O::I32toF64 | O::F64toI32 | O::I64toF64 | O::F64toI64 => {
                let (from, to) = match inst.opcode {
                    O::I32toI64 => (DataType::Int32, DataType::Int64),
                    O::I64toI32 => (DataType::Int64, DataType::Int32),
                    O::I32toF64 => (DataType::Int32, DataType::Float64),
                    O::F64toI32 => (DataType::Float64, DataType::Int32),
                    O::I64toF64 => (DataType::Int64, DataType::Float64),
                    _ => (DataType::Float64, DataType::Int64),
                };
                let acc = self.read_acc()?;
                let value = self.append(InstKind::Cast { from }, to, &[(acc, from)]);
                self.write_acc(Some(value));
            }

            O::Jeqz
            | O::Jnez
            | O::Jltz
            | O::Jgtz
            | O::Jlez
            | O::Jgez
            | O::JeqzObj
            | O::JnezObj
            | O::Jeq
            | O::Jne
            | O::Jlt
            | O::Jgt
            | O::Jle
            | O::Jge
            | O::JeqObj
            | O::JneObj => self.build_conditional_jump(inst)?,

            O::Newarr => {
                let (dst, size, class) = (inst.vreg(0)?, inst.vreg(1)?, inst.id(2)?);
                let len = self.read(size)?;
                let ss = self.save_state();
                let cls = self.load_and_init_class(class, ss);
                let checked = self.append(
                    InstKind::NegativeCheck,
                    DataType::Int32,
                    &[(len, DataType::Int32), (ss, DataType::NoType)],
                );
                let array = self.append(
                    InstKind::NewArray { class },
                    DataType::Reference,
                    &[
                        (cls, DataType::Reference),
                        (checked, DataType::Int32),
                        (ss, DataType::NoType),
                    ],
                );
                self.write(dst, array)?;
            }
            O::Lenarr => {
                let array = self.read(inst.vreg(0)?)?;
                let ss = self.save_state();
                let nc = self.null_check(array, ss);
                let len = self.append(InstKind::LenArray, DataType::Int32, &[(nc, DataType::Reference)]);
                self.write_acc(Some(len));
            }
            O::Ldarr | O::LdarrWide | O::FldarrWide | O::LdarrObj => {
                let ty = element_type(inst.opcode);
                let array = self.read(inst.vreg(0)?)?;
                let index = self.read_acc()?;
                let ss = self.save_state();
                let nc = self.null_check(array, ss);
                let bc = self.bounds_check(nc, index, ss);
                let value = self.append(
                    InstKind::LoadArray,
                    ty,
                    &[(nc, DataType::Reference), (bc, DataType::Int32)],
                );
                self.write_acc(Some(value));
            }
            O::Starr | O::StarrWide | O::FstarrWide | O::StarrObj => {
                let ty = element_type(inst.opcode);
                let array = self.read(inst.vreg(0)?)?;
                let index = self.read(inst.vreg(1)?)?;
                let value = self.read_acc()?;
                let ss = self.save_state();
                let nc = self.null_check(array, ss);
                let bc = self.bounds_check(nc, index, ss);
                self.store_array(nc, bc, value, ty, Some(ss));
            }

            O::Newobj => {
                let (dst, class) = (inst.vreg(0)?, inst.id(1)?);
                let ss = self.save_state();
                let object = self.new_object(class, ss);
                self.write(dst, object)?;
            }
            O::Ldobj | O::LdobjWide | O::LdobjObj => {
                let (object, field) = (self.read(inst.vreg(0)?)?, inst.id(1)?);
                let ty = self.field_type(field, inst.opcode);
                let ss = self.save_state();
                let nc = self.null_check(object, ss);
                let value = if self.field_resolved(field) {
                    self.append(InstKind::LoadObject { field }, ty, &[(nc, DataType::Reference)])
                } else {
                    let ptr = self.resolve_field(field, SlotKind::Field, ss);
                    self.append(
                        InstKind::LoadResolvedObjectField { field },
                        ty,
                        &[(nc, DataType::Reference), (ptr, DataType::Pointer)],
                    )
                };
                self.write_acc(Some(value));
            }
            O::Stobj | O::StobjWide | O::StobjObj => {
                let (object, field) = (self.read(inst.vreg(0)?)?, inst.id(1)?);
                let ty = self.field_type(field, inst.opcode);
                let value = self.read_acc()?;
                let ss = self.save_state();
                let nc = self.null_check(object, ss);
                let store = if self.field_resolved(field) {
                    self.append(
                        InstKind::StoreObject { field },
                        DataType::Void,
                        &[(nc, DataType::Reference), (value, ty)],
                    )
                } else {
                    let ptr = self.resolve_field(field, SlotKind::Field, ss);
                    self.append(
                        InstKind::StoreResolvedObjectField { field },
                        DataType::Void,
                        &[(nc, DataType::Reference), (value, ty), (ptr, DataType::Pointer)],
                    )
                };
                self.mark_barrier(store, ty);
            }
            O::Ldstatic | O::LdstaticWide | O::LdstaticObj => {
                let field = inst.id(0)?;
                let ty = self.field_type(field, inst.opcode);
                let ss = self.save_state();
                let value = if self.field_resolved(field) {
                    let cls = self.static_field_class(field, ss)?;
                    self.append(InstKind::LoadStatic { field }, ty, &[(cls, DataType::Reference)])
                } else {
                    let ptr = self.resolve_field(field, SlotKind::StaticField, ss);
                    self.append(
                        InstKind::LoadResolvedObjectFieldStatic { field },
                        ty,
                        &[(ptr, DataType::Pointer)],
                    )
                };
                self.write_acc(Some(value));
            }
            O::Ststatic | O::StstaticWide | O::StstaticObj => {
                let field = inst.id(0)?;
                let ty = self.field_type(field, inst.opcode);
                let value = self.read_acc()?;
                let ss = self.save_state();
                let store = if self.field_resolved(field) {
                    let cls = self.static_field_class(field, ss)?;
                    self.append(
                        InstKind::StoreStatic { field },
                        DataType::Void,
                        &[(cls, DataType::Reference), (value, ty)],
                    )
                } else {
                    let ptr = self.resolve_field(field, SlotKind::StaticField, ss);
                    self.append(
                        InstKind::StoreResolvedObjectFieldStatic { field },
                        DataType::Void,
                        &[(value, ty), (ptr, DataType::Pointer)],
                    )
                };
                self.mark_barrier(store, ty);
            }
            O::Checkcast | O::Isinstance => {
                let class = inst.id(0)?;
                let object = self.read_acc()?;
                let ss = self.save_state();
                let cls = self.load_class(class, ss);
                let inputs = [
                    (object, DataType::Reference),
                    (cls, DataType::Reference),
                    (ss, DataType::NoType),
                ];
                if inst.opcode == O::Checkcast {
                    self.append(InstKind::CheckCast { class }, DataType::Void, &inputs);
                } else {
                    let value = self.append(InstKind::IsInstance { class }, DataType::Bool, &inputs);
                    self.write_acc(Some(value));
                }
            }

            O::CallShort
            | O::Call
            | O::CallRange
            | O::CallAcc
            | O::CallVirtShort
            | O::CallVirt
            | O::CallVirtRange
            | O::CallVirtAcc
            | O::InitObj
            | O::CallInterop => self.build_call(inst)?,

            O::MonitorEnter | O::MonitorExit => {
                if self.config.is_bytecode_optimizer() {
                    self.fail("monitors are not supported by the bytecode optimizer");
                    return Ok(());
                }
                let kind = if inst.opcode == O::MonitorEnter {
                    MonitorKind::Enter
                } else {
                    MonitorKind::Exit
                };
                let object = self.read_acc()?;
                let ss = self.save_state();
                let nc = self.null_check(object, ss);
                self.append(
                    InstKind::Monitor(kind),
                    DataType::Void,
                    &[(nc, DataType::Reference), (ss, DataType::NoType)],
                );
            }
            O::Throw => {
                let object = self.read(inst.vreg(0)?)?;
                let ss = self.save_state();
                self.append(
                    InstKind::Throw,
                    DataType::Void,
                    &[(object, DataType::Reference), (ss, DataType::NoType)],
                );
            }
            O::Return | O::ReturnWide | O::ReturnObj => {
                let ty = self.method.return_type;
                let value = self.read_acc()?;
                self.append(InstKind::Return, ty, &[(value, ty)]);
            }
            O::ReturnVoid => {
                self.append(InstKind::ReturnVoid, DataType::Void, &[]);
            }
            O::LdLexEnv => {
                let slot = self.env_slot(EnvSlot::LexEnv)?;
                let env = self.vregs.read(slot).ok_or_else(|| {
                    invalid_bytecode!(Some(self.pc), "read of undefined lexical environment")
                })?;
                self.write_acc(Some(env));
            }
            O::StLexEnv => {
                let slot = self.env_slot(EnvSlot::LexEnv)?;
                let value = self.read_acc()?;
                self.vregs.write(slot, Some(value));
            }
        }
        Ok(())
    }

    fn build_binary(&mut self, inst: &BytecodeInstruction) -> Result<()> {
        use Opcode as O;

        let (op, ty) = match inst.opcode {
            O::Add2 => (BinaryOp::Add, DataType::Int32),
            O::Add2Wide => (BinaryOp::Add, DataType::Int64),
            O::Sub2 => (BinaryOp::Sub, DataType::Int32),
            O::Sub2Wide => (BinaryOp::Sub, DataType::Int64),
            O::Mul2 => (BinaryOp::Mul, DataType::Int32),
            O::Mul2Wide => (BinaryOp::Mul, DataType::Int64),
            O::Div2 => (BinaryOp::Div, DataType::Int32),
            O::Div2Wide => (BinaryOp::Div, DataType::Int64),
            O::Mod2 => (BinaryOp::Mod, DataType::Int32),
            O::Mod2Wide => (BinaryOp::Mod, DataType::Int64),
            O::And2 => (BinaryOp::And, DataType::Int32),
            O::Or2 => (BinaryOp::Or, DataType::Int32),
            O::Xor2 => (BinaryOp::Xor, DataType::Int32),
            O::Shl2 => (BinaryOp::Shl, DataType::Int32),
            O::Shr2 => (BinaryOp::Shr, DataType::Int32),
            O::Ashr2 => (BinaryOp::AShr, DataType::Int32),
            O::Fadd2Wide => (BinaryOp::Add, DataType::Float64),
            O::Fsub2Wide => (BinaryOp::Sub, DataType::Float64),
            O::Fmul2Wide => (BinaryOp::Mul, DataType::Float64),
            O::Fdiv2Wide => (BinaryOp::Div, DataType::Float64),
            other => {
                return Err(graph_error!("{} is not a binary operation", other.mnemonic()));
            }
        };

        let acc = self.read_acc()?;
        let mut rhs = self.read(inst.vreg(0)?)?;
        if op.traps_on_zero(ty) {
            let ss = self.save_state();
            rhs = self.append(InstKind::ZeroCheck, ty, &[(rhs, ty), (ss, DataType::NoType)]);
        }
        let value = self.append(InstKind::Binary(op), ty, &[(acc, ty), (rhs, ty)]);
        self.write_acc(Some(value));
        Ok(())
    }

    fn build_conditional_jump(&mut self, inst: &BytecodeInstruction) -> Result<()> {
        use Opcode as O;

        let cc = match inst.opcode {
            O::Jeqz | O::JeqzObj | O::Jeq | O::JeqObj => ConditionCode::Eq,
            O::Jnez | O::JnezObj | O::Jne | O::JneObj => ConditionCode::Ne,
            O::Jltz | O::Jlt => ConditionCode::Lt,
            O::Jgtz | O::Jgt => ConditionCode::Gt,
            O::Jlez | O::Jle => ConditionCode::Le,
            _ => ConditionCode::Ge,
        };
        let acc = self.read_acc()?;
        let (rhs, ty) = match inst.opcode {
            O::JeqzObj | O::JnezObj => (self.graph.find_or_create_null_ptr(), DataType::Reference),
            O::JeqObj | O::JneObj => (self.read(inst.vreg(0)?)?, DataType::Reference),
            O::Jeq | O::Jne | O::Jlt | O::Jgt | O::Jle | O::Jge => {
                (self.read(inst.vreg(0)?)?, DataType::Int32)
            }
            _ => (self.int(0), DataType::Int32),
        };
        let compare = self.append(InstKind::Compare { cc }, DataType::Bool, &[(acc, ty), (rhs, ty)]);
        self.append(
            InstKind::IfImm {
                cc: ConditionCode::Ne,
                imm: 0,
            },
            DataType::Void,
            &[(compare, DataType::Bool)],
        );
        Ok(())
    }

    /// `StoreArray(array, index, value)`, with a store type check and a
    /// barrier for references. `ss` is required for reference stores.
    pub(super) fn store_array(
        &mut self,
        array: InstId,
        index: InstId,
        value: InstId,
        ty: DataType,
        ss: Option<InstId>,
    ) -> InstId {
        let mut stored = value;
        if let (true, Some(ss)) = (ty.is_reference(), ss) {
            stored = self.append(
                InstKind::RefTypeCheck,
                DataType::Reference,
                &[
                    (value, DataType::Reference),
                    (array, DataType::Reference),
                    (ss, DataType::NoType),
                ],
            );
        }
        let store = self.append(
            InstKind::StoreArray,
            DataType::Void,
            &[(array, DataType::Reference), (index, DataType::Int32), (stored, ty)],
        );
        self.mark_barrier(store, ty);
        store
    }

    fn mark_barrier(&mut self, store: InstId, ty: DataType) {
        if ty.is_reference() {
            self.graph.inst_mut(store).flags |= InstFlags::BARRIER;
        }
    }

    /// `LoadAndInitClass` followed by `NewObject`.
    pub(super) fn new_object(&mut self, class: EntityId, ss: InstId) -> InstId {
        let cls = self.load_and_init_class(class, ss);
        self.append(
            InstKind::NewObject { class },
            DataType::Reference,
            &[(cls, DataType::Reference), (ss, DataType::NoType)],
        )
    }

    fn resolve_field(&mut self, field: EntityId, kind: SlotKind, ss: InstId) -> InstId {
        let slot = self.graph.unresolved_types_mut().add(kind, field);
        let resolve = if kind == SlotKind::StaticField {
            InstKind::ResolveObjectFieldStatic { field, slot }
        } else {
            InstKind::ResolveObjectField { field, slot }
        };
        self.append(resolve, DataType::Pointer, &[(ss, DataType::NoType)])
    }

    fn static_field_class(&mut self, field: EntityId, ss: InstId) -> Result<InstId> {
        let info = self.runtime.field_info(field).ok_or_else(|| {
            invalid_bytecode!(Some(self.pc), "unknown static field {}", field)
        })?;
        Ok(self.load_and_init_class(info.class, ss))
    }

    /// Type of a field access: the declared type when known, otherwise the
    /// width the opcode implies.
    fn field_type(&self, field: EntityId, opcode: Opcode) -> DataType {
        let implied = match opcode {
            Opcode::LdobjWide | Opcode::StobjWide | Opcode::LdstaticWide | Opcode::StstaticWide => {
                DataType::Int64
            }
            Opcode::LdobjObj | Opcode::StobjObj | Opcode::LdstaticObj | Opcode::StstaticObj => {
                DataType::Reference
            }
            _ => DataType::Int32,
        };
        match self.runtime.field_info(field) {
            Some(info) if info.ty.common() == implied.common() || info.ty.is_float() => info.ty,
            _ => implied,
        }
    }

    fn build_load_const_array(&mut self, dst: u16, literal: EntityId) -> Result<()> {
        let array = self.runtime.literal_array(literal).ok_or_else(|| {
            invalid_bytecode!(Some(self.pc), "unknown literal array {}", literal)
        })?;
        let tag = LiteralTag::try_from(array.tag).map_err(|raw| {
            invalid_bytecode!(Some(self.pc), "malformed literal array tag {}", raw)
        })?;
        let len = i64::try_from(array.values.len()).unwrap_or(i64::MAX);

        let ss = self.save_state();
        if self.config.is_bytecode_optimizer() {
            let value = self.append(
                InstKind::LoadConstArray { literal },
                DataType::Reference,
                &[(ss, DataType::NoType)],
            );
            return self.write(dst, value);
        }

        if array.values.len() <= self.config.unfold_const_array_max_size {
            let cls = self.load_and_init_class(array.class, ss);
            let size = self.int(len);
            let object = self.append(
                InstKind::NewArray { class: array.class },
                DataType::Reference,
                &[
                    (cls, DataType::Reference),
                    (size, DataType::Int32),
                    (ss, DataType::NoType),
                ],
            );
            let ty = tag.element_type();
            for (i, value) in array.values.iter().enumerate() {
                let element = match (tag, *value) {
                    (LiteralTag::String, LiteralValue::String(id)) => self.append(
                        InstKind::LoadString { id },
                        DataType::Reference,
                        &[(ss, DataType::NoType)],
                    ),
                    (LiteralTag::Float32, LiteralValue::Float(v)) => {
                        self.constant(ConstValue::Float32(v as f32))
                    }
                    (LiteralTag::Float64, LiteralValue::Float(v)) => {
                        self.constant(ConstValue::Float64(v))
                    }
                    (LiteralTag::Bool | LiteralTag::Int32 | LiteralTag::Int64, LiteralValue::Int(v)) => {
                        self.int(v)
                    }
                    _ => {
                        return Err(invalid_bytecode!(
                            Some(self.pc),
                            "literal array {} element {} does not match tag {}",
                            literal,
                            i,
                            tag
                        ));
                    }
                };
                let index = self.int(i64::try_from(i).unwrap_or(i64::MAX));
                self.store_array(object, index, element, ty, None);
            }
            return self.write(dst, object);
        }

        let value = if tag == LiteralTag::String {
            self.append(
                InstKind::LoadConstArray { literal },
                DataType::Reference,
                &[(ss, DataType::NoType)],
            )
        } else {
            let cls = self.load_and_init_class(array.class, ss);
            let size = self.int(len);
            let object = self.append(
                InstKind::NewArray { class: array.class },
                DataType::Reference,
                &[
                    (cls, DataType::Reference),
                    (size, DataType::Int32),
                    (ss, DataType::NoType),
                ],
            );
            self.append(
                InstKind::FillConstArray { literal },
                DataType::Void,
                &[(object, DataType::Reference), (ss, DataType::NoType)],
            );
            object
        };
        self.write(dst, value)
    }
}

/// Element type accessed by an array load or store opcode.
fn element_type(opcode: Opcode) -> DataType {
    match opcode {
        Opcode::LdarrWide | Opcode::StarrWide => DataType::Int64,
        Opcode::FldarrWide | Opcode::FstarrWide => DataType::Float64,
        Opcode::LdarrObj | Opcode::StarrObj => DataType::Reference,
        _ => DataType::Int32,
    }
}
