//! End-to-end graph construction tests.
//!
//! Methods are assembled with `MethodAssembler`, built with `IrBuilder`
//! against an `InMemoryRuntime`, and the resulting graphs are inspected
//! through the public IR API. Every build runs with graph verification
//! enabled.

use std::collections::BTreeSet;

use arkir::{
    ir::{BinaryOp, ConstValue, MonitorKind, SlotKind, UnaryOp, VRegKind, VRegLocation},
    prelude::*,
};

const CLASS: EntityId = EntityId(100);
const CALLEE: EntityId = EntityId(200);
const FIELD: EntityId = EntityId(300);
const LITERALS: EntityId = EntityId(400);

fn build(runtime: &InMemoryRuntime, config: BuilderConfig, method: &MethodBody) -> Result<Graph> {
    let config = config.with_verification(true);
    IrBuilder::new(runtime, &config).build(method)
}

fn insts_of<'g>(graph: &'g Graph, pred: impl Fn(&InstKind) -> bool + 'g) -> Vec<&'g Inst> {
    graph.insts().filter(|i| pred(i.kind())).collect()
}

fn single<'g>(graph: &'g Graph, pred: impl Fn(&InstKind) -> bool + 'g) -> &'g Inst {
    let found = insts_of(graph, pred);
    assert_eq!(found.len(), 1, "expected exactly one match, got {found:?}");
    found[0]
}

/// Phi inputs match the predecessors in count, and each input is defined in
/// a block dominating the corresponding predecessor.
fn assert_ssa_valid(graph: &Graph) {
    let dominators = graph.dominators();
    for block in graph.blocks() {
        for &phi_id in block.phis() {
            let phi = graph.inst(phi_id);
            if !matches!(phi.kind(), InstKind::Phi) {
                continue;
            }
            assert_eq!(
                phi.inputs().len(),
                block.predecessors().len(),
                "{phi_id} in {}",
                block.id()
            );
            for (input, &pred) in phi.inputs().iter().zip(block.predecessors()) {
                let def_block = graph.inst(input.inst).block().expect("placed input");
                assert!(
                    dominators.dominates(def_block, pred),
                    "{} of {phi_id} does not dominate {pred}",
                    input.inst
                );
            }
        }
    }
}

/// Every SaveState and SafePoint annotation describes its definition as
/// finally built: same type, constant location exactly for constants.
fn assert_states_match_definitions(graph: &Graph) -> usize {
    let mut constants = 0;
    for state in graph.insts().filter(|i| i.is_save_state()) {
        assert_eq!(state.inputs().len(), state.vregs().len(), "{}", state.id());
        for (input, vreg) in state.inputs().iter().zip(state.vregs()) {
            let def = graph.inst(input.inst);
            let expected = if def.is_constant() {
                constants += 1;
                VRegLocation::Constant
            } else {
                VRegLocation::Slot
            };
            assert_eq!(input.ty, def.ty(), "{} in {}", input.inst, state.id());
            assert_eq!(vreg.ty(), def.ty(), "{} in {}", input.inst, state.id());
            assert_eq!(vreg.location(), expected, "{} in {}", input.inst, state.id());
        }
    }
    constants
}

fn static_callee(params: &[DataType], ret: DataType, intrinsic: IntrinsicId) -> InMemoryRuntime {
    InMemoryRuntime::new().with_resolved_method(
        CALLEE,
        MethodSignature::new_static(params, ret),
        ResolvedMethod {
            intrinsic: Some(intrinsic),
            ..ResolvedMethod::default()
        },
    )
}

#[test]
fn test_straight_line_arithmetic() -> Result<()> {
    let mut asm = MethodAssembler::new(1, 1).with_signature(&[DataType::Int32], DataType::Int32);
    asm.emit_lda(0)?;
    asm.emit(Opcode::Addi, &[Operand::Imm(1)])?;
    asm.emit(Opcode::Return, &[])?;
    let method = asm.finish()?;

    let graph = build(&InMemoryRuntime::new(), BuilderConfig::jit(), &method)?;

    let ret = single(&graph, |k| matches!(k, InstKind::Return));
    let add = graph.inst(ret.input(0).expect("return value"));
    assert_eq!(
        *add.kind(),
        InstKind::BinaryImm {
            op: BinaryOp::Add,
            imm: 1
        }
    );
    assert_eq!(add.input(0), graph.parameters().first().copied());
    assert!(insts_of(&graph, |k| matches!(k, InstKind::SaveState)).is_empty());
    assert!(!graph.is_non_optimizable());
    Ok(())
}

#[test]
fn test_diamond_merges_through_phi() -> Result<()> {
    let mut asm = MethodAssembler::new(2, 1).with_signature(&[DataType::Int32], DataType::Int32);
    asm.emit_lda(1)?;
    asm.emit_branch(Opcode::Jeqz, &[], "else")?;
    asm.emit_movi(0, 1)?;
    asm.emit_branch(Opcode::Jmp, &[], "join")?;
    asm.label("else")?;
    asm.emit_movi(0, 2)?;
    asm.label("join")?;
    asm.emit_lda(0)?;
    asm.emit(Opcode::Return, &[])?;
    let method = asm.finish()?;

    let graph = build(&InMemoryRuntime::new(), BuilderConfig::jit(), &method)?;
    assert_ssa_valid(&graph);

    let phi = single(&graph, |k| matches!(k, InstKind::Phi));
    assert_eq!(phi.inputs().len(), 2);
    assert_eq!(phi.ty(), DataType::Int64);

    let ret = single(&graph, |k| matches!(k, InstKind::Return));
    assert_eq!(ret.input(0), Some(phi.id()));

    let branch = single(&graph, |k| matches!(k, InstKind::IfImm { .. }));
    let compare = graph.inst(branch.input(0).expect("condition"));
    assert!(matches!(compare.kind(), InstKind::Compare { .. }));
    assert_eq!(compare.ty(), DataType::Bool);
    Ok(())
}

#[test]
fn test_loop_phi_is_typed_from_real_inputs() -> Result<()> {
    let mut asm = MethodAssembler::new(2, 1).with_signature(&[DataType::Int32], DataType::Int32);
    asm.emit_ldai(0)?;
    asm.emit_sta(0)?;
    asm.label("loop")?;
    asm.emit_lda(1)?;
    asm.emit_branch(Opcode::Jeqz, &[], "exit")?;
    asm.emit(Opcode::Inci, &[Operand::VReg(0), Operand::Imm(1)])?;
    asm.emit_branch(Opcode::Jmp, &[], "loop")?;
    asm.label("exit")?;
    asm.emit_lda(0)?;
    asm.emit(Opcode::Return, &[])?;
    let method = asm.finish()?;

    let graph = build(&InMemoryRuntime::new(), BuilderConfig::jit(), &method)?;
    assert_ssa_valid(&graph);

    let phi = single(&graph, |k| matches!(k, InstKind::Phi));
    let header = graph.block(phi.block().expect("placed phi"));
    assert!(header.is_loop_header());
    assert_eq!(phi.ty(), DataType::Int32);
    assert!(phi.inputs().iter().all(|i| i.ty == DataType::Int32));

    let safepoint = single(&graph, |k| matches!(k, InstKind::SafePoint));
    assert_eq!(safepoint.block(), Some(header.id()));

    let optimized = build(
        &InMemoryRuntime::new(),
        BuilderConfig::bytecode_optimizer(),
        &method,
    )?;
    assert!(insts_of(&optimized, |k| matches!(k, InstKind::SafePoint)).is_empty());
    Ok(())
}

#[test]
fn test_array_round_trip() -> Result<()> {
    let mut asm = MethodAssembler::new(3, 0).with_signature(&[], DataType::Int32);
    asm.emit_movi(1, 5)?;
    asm.emit(
        Opcode::Newarr,
        &[Operand::VReg(0), Operand::VReg(1), Operand::Id(CLASS)],
    )?;
    asm.emit_movi(2, 0)?;
    asm.emit_ldai(42)?;
    asm.emit(Opcode::Starr, &[Operand::VReg(0), Operand::VReg(2)])?;
    asm.emit_lda(2)?;
    asm.emit(Opcode::Ldarr, &[Operand::VReg(0)])?;
    asm.emit(Opcode::Return, &[])?;
    let method = asm.finish()?;

    let runtime = InMemoryRuntime::new().with_class(CLASS, 0x1000);
    let graph = build(&runtime, BuilderConfig::jit(), &method)?;

    let new_array = single(&graph, |k| matches!(k, InstKind::NewArray { .. }));
    let negative = single(&graph, |k| matches!(k, InstKind::NegativeCheck));
    let length = graph.inst(negative.input(0).expect("checked length"));
    assert_eq!(*length.kind(), InstKind::Constant(ConstValue::Int(5)));
    assert_eq!(new_array.input(1), Some(negative.id()));

    let store = single(&graph, |k| matches!(k, InstKind::StoreArray));
    let store_index = graph.inst(store.input(1).expect("store index"));
    assert_eq!(*store_index.kind(), InstKind::BoundsCheck);
    assert!(!store.needs_barrier());

    let load = single(&graph, |k| matches!(k, InstKind::LoadArray));
    let load_index = graph.inst(load.input(1).expect("load index"));
    assert_eq!(*load_index.kind(), InstKind::BoundsCheck);

    let ret = single(&graph, |k| matches!(k, InstKind::Return));
    assert_eq!(ret.input(0), Some(load.id()));
    assert!(insts_of(&graph, |k| matches!(k, InstKind::Phi)).is_empty());
    Ok(())
}

#[test]
fn test_null_check_shared_within_step() -> Result<()> {
    let mut asm = MethodAssembler::new(4, 2)
        .with_signature(&[DataType::Reference, DataType::Reference], DataType::Void);
    asm.emit_movi(0, 0)?;
    asm.emit_lda(3)?;
    asm.emit(Opcode::StarrObj, &[Operand::VReg(2), Operand::VReg(0)])?;
    asm.emit(Opcode::ReturnVoid, &[])?;
    let method = asm.finish()?;

    let graph = build(&InMemoryRuntime::new(), BuilderConfig::jit(), &method)?;

    let null_check = single(&graph, |k| matches!(k, InstKind::NullCheck));
    let store = single(&graph, |k| matches!(k, InstKind::StoreArray));
    let type_check = single(&graph, |k| matches!(k, InstKind::RefTypeCheck));
    let length = single(&graph, |k| matches!(k, InstKind::LenArray));

    assert_eq!(store.input(0), Some(null_check.id()));
    assert_eq!(type_check.input(1), Some(null_check.id()));
    assert_eq!(length.input(0), Some(null_check.id()));
    assert_eq!(store.input(2), Some(type_check.id()));
    assert!(store.needs_barrier());
    Ok(())
}

#[test]
fn test_save_state_records_defined_registers() -> Result<()> {
    let mut asm = MethodAssembler::new(3, 1).with_signature(&[DataType::Int32], DataType::Void);
    asm.emit_movi(0, 7)?;
    asm.emit(
        Opcode::CallShort,
        &[Operand::Id(CALLEE), Operand::VReg(0), Operand::VReg(0)],
    )?;
    asm.emit(Opcode::ReturnVoid, &[])?;
    let method = asm.finish()?;

    let runtime = InMemoryRuntime::new().with_resolved_method(
        CALLEE,
        MethodSignature::new_static(&[DataType::Int32], DataType::Void),
        ResolvedMethod::default(),
    );
    let graph = build(&runtime, BuilderConfig::jit(), &method)?;

    let call = single(&graph, |k| matches!(k, InstKind::CallStatic { .. }));
    let state = graph.inst(call.save_state().expect("call state"));
    assert_eq!(*state.kind(), InstKind::SaveState);

    let recorded: BTreeSet<u16> = state.vregs().iter().map(VRegInfo::index).collect();
    assert_eq!(recorded, BTreeSet::from([0, 2]));
    assert!(state.vregs().iter().all(|v| v.kind() == VRegKind::Ordinary));

    let param = graph.parameters()[0];
    assert!(state.inputs().iter().any(|i| i.inst == param));

    let args: Vec<InstKind> = call
        .call_arguments()
        .iter()
        .map(|i| graph.inst(i.inst).kind().clone())
        .collect();
    assert_eq!(args, vec![InstKind::Constant(ConstValue::Int(7))]);
    Ok(())
}

#[test]
fn test_unresolved_call_keeps_argument_shape() -> Result<()> {
    let mut asm = MethodAssembler::new(2, 0).with_signature(&[], DataType::Int32);
    asm.emit_movi(0, 1)?;
    asm.emit_movi(1, 2)?;
    asm.emit(
        Opcode::CallShort,
        &[Operand::Id(CALLEE), Operand::VReg(0), Operand::VReg(1)],
    )?;
    asm.emit(Opcode::Return, &[])?;
    let method = asm.finish()?;

    let runtime = InMemoryRuntime::new().with_resolved_method(
        CALLEE,
        MethodSignature::new_static(&[DataType::Int32, DataType::Int64], DataType::Int32),
        ResolvedMethod {
            ptr: 0x2000,
            ..ResolvedMethod::default()
        },
    );
    let resolved = build(&runtime, BuilderConfig::jit(), &method)?;
    let unresolved = build(&runtime, BuilderConfig::jit().with_force_unresolved(true), &method)?;

    let shape = |graph: &Graph, call: &Inst| -> Vec<(InstKind, DataType)> {
        call.call_arguments()
            .iter()
            .map(|i| (graph.inst(i.inst).kind().clone(), i.ty))
            .collect()
    };
    let direct = single(&resolved, |k| matches!(k, InstKind::CallStatic { .. }));
    let indirect = single(&unresolved, |k| matches!(k, InstKind::CallResolvedStatic { .. }));
    assert_eq!(shape(&resolved, direct), shape(&unresolved, indirect));

    let resolve = single(&unresolved, |k| matches!(k, InstKind::ResolveStatic { .. }));
    let ptr_pos = indirect.inputs().len() - 2;
    assert_eq!(indirect.input(ptr_pos), Some(resolve.id()));
    assert_eq!(resolve.save_state(), indirect.save_state());

    assert!(resolved.unresolved_types().is_empty());
    let entries: Vec<_> = unresolved.unresolved_types().iter().map(|(_, e)| *e).collect();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].kind, SlotKind::StaticMethod);
    assert_eq!(entries[0].id, CALLEE);

    assert_eq!(resolved.inst_count() + 1, unresolved.inst_count());
    Ok(())
}

#[test]
fn test_final_virtual_call_is_devirtualized() -> Result<()> {
    let mut asm = MethodAssembler::new(2, 2)
        .with_signature(&[DataType::Reference, DataType::Int32], DataType::Int32);
    asm.emit(
        Opcode::CallVirtShort,
        &[Operand::Id(CALLEE), Operand::VReg(0), Operand::VReg(1)],
    )?;
    asm.emit(Opcode::Return, &[])?;
    let method = asm.finish()?;

    let signature = MethodSignature::new_instance(&[DataType::Int32], DataType::Int32);
    let final_runtime = InMemoryRuntime::new().with_resolved_method(
        CALLEE,
        signature.clone(),
        ResolvedMethod {
            is_final: true,
            ..ResolvedMethod::default()
        },
    );
    let graph = build(&final_runtime, BuilderConfig::jit(), &method)?;
    let call = single(&graph, |k| matches!(k, InstKind::CallStatic { .. }));
    let receiver = graph.inst(call.input(0).expect("receiver"));
    assert_eq!(*receiver.kind(), InstKind::NullCheck);
    assert_eq!(receiver.input(0), graph.parameters().first().copied());

    let open_runtime =
        InMemoryRuntime::new().with_resolved_method(CALLEE, signature, ResolvedMethod::default());
    let graph = build(&open_runtime, BuilderConfig::jit(), &method)?;
    single(&graph, |k| matches!(k, InstKind::CallVirtual { .. }));
    Ok(())
}

#[test]
fn test_unresolved_virtual_call_resolves_on_receiver() -> Result<()> {
    let mut asm = MethodAssembler::new(1, 1).with_signature(&[DataType::Reference], DataType::Void);
    asm.emit(
        Opcode::CallVirtShort,
        &[Operand::Id(CALLEE), Operand::VReg(0), Operand::VReg(0)],
    )?;
    asm.emit(Opcode::ReturnVoid, &[])?;
    let method = asm.finish()?;

    let runtime = InMemoryRuntime::new()
        .with_method(CALLEE, MethodSignature::new_instance(&[], DataType::Void));
    let graph = build(&runtime, BuilderConfig::aot(), &method)?;

    let null_check = single(&graph, |k| matches!(k, InstKind::NullCheck));
    let resolve = single(&graph, |k| matches!(k, InstKind::ResolveVirtual { .. }));
    let call = single(&graph, |k| matches!(k, InstKind::CallResolvedVirtual { .. }));
    assert_eq!(resolve.input(0), Some(null_check.id()));
    assert_eq!(call.call_arguments().len(), 1);
    assert_eq!(call.input(1), Some(resolve.id()));
    Ok(())
}

#[test]
fn test_field_access_resolution() -> Result<()> {
    let mut asm = MethodAssembler::new(1, 1).with_signature(&[DataType::Reference], DataType::Int32);
    asm.emit(Opcode::Ldobj, &[Operand::VReg(0), Operand::Id(FIELD)])?;
    asm.emit(Opcode::Return, &[])?;
    let method = asm.finish()?;

    let info = FieldInfo {
        ty: DataType::Int32,
        class: CLASS,
        is_static: false,
        is_volatile: false,
    };

    let resolved = InMemoryRuntime::new().with_field(FIELD, info, Some(16));
    let graph = build(&resolved, BuilderConfig::jit(), &method)?;
    let load = single(&graph, |k| matches!(k, InstKind::LoadObject { .. }));
    assert_eq!(load.ty(), DataType::Int32);
    assert!(graph.unresolved_types().is_empty());

    let unresolved = InMemoryRuntime::new().with_field(FIELD, info, None);
    let graph = build(&unresolved, BuilderConfig::aot(), &method)?;
    let resolve = single(&graph, |k| matches!(k, InstKind::ResolveObjectField { .. }));
    let load = single(&graph, |k| matches!(k, InstKind::LoadResolvedObjectField { .. }));
    assert_eq!(load.input(1), Some(resolve.id()));
    assert_eq!(graph.unresolved_types().len(), 1);
    assert!(graph.unresolved_types().find(SlotKind::Field, FIELD).is_some());
    Ok(())
}

#[test]
fn test_static_store_initializes_class() -> Result<()> {
    let mut asm = MethodAssembler::new(1, 1).with_signature(&[DataType::Reference], DataType::Void);
    asm.emit_lda(0)?;
    asm.emit(Opcode::StstaticObj, &[Operand::Id(FIELD)])?;
    asm.emit(Opcode::ReturnVoid, &[])?;
    let method = asm.finish()?;

    let runtime = InMemoryRuntime::new()
        .with_field(
            FIELD,
            FieldInfo {
                ty: DataType::Reference,
                class: CLASS,
                is_static: true,
                is_volatile: false,
            },
            Some(8),
        )
        .with_class(CLASS, 0x4000);
    let graph = build(&runtime, BuilderConfig::jit(), &method)?;

    let class = single(&graph, |k| matches!(k, InstKind::LoadAndInitClass { .. }));
    let store = single(&graph, |k| matches!(k, InstKind::StoreStatic { .. }));
    assert_eq!(store.input(0), Some(class.id()));
    assert!(store.needs_barrier());
    Ok(())
}

#[test]
fn test_pure_intrinsic_needs_no_state() -> Result<()> {
    let mut asm = MethodAssembler::new(1, 1).with_signature(&[DataType::Int32], DataType::Int32);
    asm.emit(
        Opcode::CallShort,
        &[Operand::Id(CALLEE), Operand::VReg(0), Operand::VReg(0)],
    )?;
    asm.emit(Opcode::Return, &[])?;
    let method = asm.finish()?;

    let runtime = InMemoryRuntime::new().with_resolved_method(
        CALLEE,
        MethodSignature::new_static(&[DataType::Int32], DataType::Int32),
        ResolvedMethod {
            intrinsic: Some(IntrinsicId::MathAbsI32),
            ..ResolvedMethod::default()
        },
    );
    let graph = build(&runtime, BuilderConfig::jit(), &method)?;
    let abs = single(&graph, |k| matches!(k, InstKind::Unary(UnaryOp::Abs)));
    let ret = single(&graph, |k| matches!(k, InstKind::Return));
    assert_eq!(ret.input(0), Some(abs.id()));
    assert!(insts_of(&graph, |k| matches!(k, InstKind::SaveState)).is_empty());

    let plain = build(&runtime, BuilderConfig::jit().with_intrinsics(false), &method)?;
    single(&plain, |k| matches!(k, InstKind::CallStatic { .. }));
    Ok(())
}

#[test]
fn test_array_and_generic_intrinsics() -> Result<()> {
    let mut asm = MethodAssembler::new(2, 2)
        .with_signature(&[DataType::Reference, DataType::Int32], DataType::Int32);
    asm.emit(
        Opcode::CallVirtShort,
        &[Operand::Id(CALLEE), Operand::VReg(0), Operand::VReg(1)],
    )?;
    asm.emit(Opcode::Return, &[])?;
    let method = asm.finish()?;

    let get = InMemoryRuntime::new().with_resolved_method(
        CALLEE,
        MethodSignature::new_instance(&[DataType::Int32], DataType::Int32),
        ResolvedMethod {
            intrinsic: Some(IntrinsicId::TypedArrayGetI32),
            ..ResolvedMethod::default()
        },
    );
    let graph = build(&get, BuilderConfig::jit(), &method)?;
    let nc = single(&graph, |k| matches!(k, InstKind::NullCheck));
    let bc = single(&graph, |k| matches!(k, InstKind::BoundsCheck));
    let load = single(&graph, |k| matches!(k, InstKind::LoadArray));
    assert_eq!(load.input(0), Some(nc.id()));
    assert_eq!(load.input(1), Some(bc.id()));
    assert_eq!(single(&graph, |k| matches!(k, InstKind::Return)).input(0), Some(load.id()));
    assert!(insts_of(&graph, |k| matches!(k, InstKind::CallVirtual { .. })).is_empty());

    let hash = InMemoryRuntime::new().with_resolved_method(
        CALLEE,
        MethodSignature::new_instance(&[DataType::Int32], DataType::Int32),
        ResolvedMethod {
            intrinsic: Some(IntrinsicId::ObjectHashCode),
            ..ResolvedMethod::default()
        },
    );
    let result = build(&hash, BuilderConfig::jit(), &method);
    assert!(matches!(result, Err(Error::InvalidBytecode { .. })), "{result:?}");

    let mut asm = MethodAssembler::new(1, 1).with_signature(&[DataType::Reference], DataType::Int32);
    asm.emit(
        Opcode::CallVirtShort,
        &[Operand::Id(CALLEE), Operand::VReg(0), Operand::VReg(0)],
    )?;
    asm.emit(Opcode::Return, &[])?;
    let method = asm.finish()?;
    let hash = InMemoryRuntime::new().with_resolved_method(
        CALLEE,
        MethodSignature::new_instance(&[], DataType::Int32),
        ResolvedMethod {
            intrinsic: Some(IntrinsicId::ObjectHashCode),
            ..ResolvedMethod::default()
        },
    );
    let graph = build(&hash, BuilderConfig::jit(), &method)?;
    let intrinsic = single(&graph, |k| matches!(k, InstKind::Intrinsic { .. }));
    let ss = intrinsic.save_state().expect("intrinsic state");
    assert!(graph.inst(ss).is_save_state());
    let nc = single(&graph, |k| matches!(k, InstKind::NullCheck));
    assert_eq!(intrinsic.input(0), Some(nc.id()));
    Ok(())
}

#[test]
fn test_static_intrinsics_null_check_their_object() -> Result<()> {
    let mut asm = MethodAssembler::new(2, 2)
        .with_signature(&[DataType::Reference, DataType::Int32], DataType::Int32);
    asm.emit(
        Opcode::CallShort,
        &[Operand::Id(CALLEE), Operand::VReg(0), Operand::VReg(1)],
    )?;
    asm.emit(Opcode::Return, &[])?;
    let method = asm.finish()?;

    let runtime = static_callee(
        &[DataType::Reference, DataType::Int32],
        DataType::Int32,
        IntrinsicId::TypedArrayGetI32,
    );
    let graph = build(&runtime, BuilderConfig::jit(), &method)?;
    let nc = single(&graph, |k| matches!(k, InstKind::NullCheck));
    assert_eq!(nc.input(0), graph.parameters().first().copied());
    let len = single(&graph, |k| matches!(k, InstKind::LenArray));
    let load = single(&graph, |k| matches!(k, InstKind::LoadArray));
    assert_eq!(len.input(0), Some(nc.id()));
    assert_eq!(load.input(0), Some(nc.id()));

    let mut asm = MethodAssembler::new(3, 3).with_signature(
        &[DataType::Reference, DataType::Int32, DataType::Int32],
        DataType::Void,
    );
    asm.emit(
        Opcode::Call,
        &[
            Operand::Id(CALLEE),
            Operand::VReg(0),
            Operand::VReg(1),
            Operand::VReg(2),
            Operand::VReg(2),
        ],
    )?;
    asm.emit(Opcode::ReturnVoid, &[])?;
    let method = asm.finish()?;

    let runtime = static_callee(
        &[DataType::Reference, DataType::Int32, DataType::Int32],
        DataType::Void,
        IntrinsicId::TypedArraySetI32,
    );
    let graph = build(&runtime, BuilderConfig::jit(), &method)?;
    let nc = single(&graph, |k| matches!(k, InstKind::NullCheck));
    let len = single(&graph, |k| matches!(k, InstKind::LenArray));
    let store = single(&graph, |k| matches!(k, InstKind::StoreArray));
    assert_eq!(len.input(0), Some(nc.id()));
    assert_eq!(store.input(0), Some(nc.id()));

    let mut asm = MethodAssembler::new(1, 1).with_signature(&[DataType::Reference], DataType::Int32);
    asm.emit(
        Opcode::CallShort,
        &[Operand::Id(CALLEE), Operand::VReg(0), Operand::VReg(0)],
    )?;
    asm.emit(Opcode::Return, &[])?;
    let method = asm.finish()?;

    let runtime = static_callee(&[DataType::Reference], DataType::Int32, IntrinsicId::StringLength);
    let graph = build(&runtime, BuilderConfig::jit(), &method)?;
    let nc = single(&graph, |k| matches!(k, InstKind::NullCheck));
    let length = single(&graph, |k| matches!(k, InstKind::LenString));
    assert_eq!(length.input(0), Some(nc.id()));
    assert_eq!(single(&graph, |k| matches!(k, InstKind::Return)).input(0), Some(length.id()));
    Ok(())
}

#[test]
fn test_loop_state_annotations_follow_phi_resolution() -> Result<()> {
    let mut asm = MethodAssembler::new(3, 1).with_signature(&[DataType::Int32], DataType::Int32);
    asm.emit_movi(1, 7)?;
    asm.emit_ldai(0)?;
    asm.emit_sta(0)?;
    asm.label("loop")?;
    asm.emit_lda(2)?;
    asm.emit_branch(Opcode::Jeqz, &[], "exit")?;
    asm.emit(
        Opcode::CallShort,
        &[Operand::Id(CALLEE), Operand::VReg(1), Operand::VReg(1)],
    )?;
    asm.emit(Opcode::Inci, &[Operand::VReg(0), Operand::Imm(1)])?;
    asm.emit_branch(Opcode::Jmp, &[], "loop")?;
    asm.label("exit")?;
    asm.emit_lda(0)?;
    asm.emit(Opcode::Return, &[])?;
    let method = asm.finish()?;

    let runtime = InMemoryRuntime::new().with_resolved_method(
        CALLEE,
        MethodSignature::new_static(&[DataType::Int32], DataType::Void),
        ResolvedMethod::default(),
    );
    let graph = build(&runtime, BuilderConfig::jit(), &method)?;
    assert_ssa_valid(&graph);

    let phi = single(&graph, |k| matches!(k, InstKind::Phi));
    assert_eq!(phi.ty(), DataType::Int32);
    assert!(assert_states_match_definitions(&graph) > 0);

    let safepoint = single(&graph, |k| matches!(k, InstKind::SafePoint));
    let counter = safepoint
        .inputs()
        .iter()
        .zip(safepoint.vregs())
        .find(|(input, _)| input.inst == phi.id())
        .map(|(_, vreg)| *vreg)
        .expect("counter recorded at the header");
    assert_eq!(counter.ty(), DataType::Int32);
    assert_eq!(counter.location(), VRegLocation::Slot);
    Ok(())
}

#[test]
fn test_reassigned_constant_is_recorded_as_constant() -> Result<()> {
    let mut asm = MethodAssembler::new(2, 1).with_signature(&[DataType::Int32], DataType::Int32);
    asm.emit_ldai(0)?;
    asm.emit_movi(0, 3)?;
    asm.label("loop")?;
    asm.emit_lda(1)?;
    asm.emit_branch(Opcode::Jeqz, &[], "exit")?;
    asm.emit(
        Opcode::CallShort,
        &[Operand::Id(CALLEE), Operand::VReg(0), Operand::VReg(0)],
    )?;
    asm.emit_movi(0, 3)?;
    asm.emit_branch(Opcode::Jmp, &[], "loop")?;
    asm.label("exit")?;
    asm.emit_lda(0)?;
    asm.emit(Opcode::Return, &[])?;
    let method = asm.finish()?;

    let runtime = InMemoryRuntime::new().with_resolved_method(
        CALLEE,
        MethodSignature::new_static(&[DataType::Int32], DataType::Void),
        ResolvedMethod::default(),
    );
    let graph = build(&runtime, BuilderConfig::jit(), &method)?;
    assert!(insts_of(&graph, |k| matches!(k, InstKind::Phi)).is_empty());
    assert_states_match_definitions(&graph);

    let call = single(&graph, |k| matches!(k, InstKind::CallStatic { .. }));
    let state = graph.inst(call.save_state().expect("call state"));
    let three = state
        .vregs()
        .iter()
        .find(|v| v.index() == 0)
        .copied()
        .expect("v0 recorded");
    assert_eq!(three.location(), VRegLocation::Constant);
    assert_eq!(three.ty(), DataType::Int64);
    Ok(())
}

#[test]
fn test_const_array_lowering_by_mode() -> Result<()> {
    let mut asm = MethodAssembler::new(1, 0).with_signature(&[], DataType::Reference);
    asm.emit(Opcode::LdaConst, &[Operand::VReg(0), Operand::Id(LITERALS)])?;
    asm.emit_lda(0)?;
    asm.emit(Opcode::ReturnObj, &[])?;
    let method = asm.finish()?;

    let runtime = InMemoryRuntime::new()
        .with_class(CLASS, 0x1000)
        .with_literal_array(
            LITERALS,
            LiteralArray {
                tag: LiteralTag::Int32 as u8,
                class: CLASS,
                values: vec![LiteralValue::Int(1), LiteralValue::Int(2), LiteralValue::Int(3)],
            },
        );

    let jit = build(&runtime, BuilderConfig::jit(), &method)?;
    single(&jit, |k| matches!(k, InstKind::NewArray { .. }));
    assert_eq!(insts_of(&jit, |k| matches!(k, InstKind::StoreArray)).len(), 3);

    let optimizer = build(&runtime, BuilderConfig::bytecode_optimizer(), &method)?;
    single(&optimizer, |k| matches!(k, InstKind::LoadConstArray { .. }));
    assert!(insts_of(&optimizer, |k| matches!(k, InstKind::StoreArray)).is_empty());
    Ok(())
}

#[test]
fn test_malformed_literal_tag_is_rejected() -> Result<()> {
    let mut asm = MethodAssembler::new(1, 0).with_signature(&[], DataType::Void);
    asm.emit(Opcode::LdaConst, &[Operand::VReg(0), Operand::Id(LITERALS)])?;
    asm.emit(Opcode::ReturnVoid, &[])?;
    let method = asm.finish()?;

    let runtime = InMemoryRuntime::new().with_literal_array(
        LITERALS,
        LiteralArray {
            tag: 0xff,
            class: CLASS,
            values: Vec::new(),
        },
    );
    let result = build(&runtime, BuilderConfig::jit(), &method);
    assert!(matches!(result, Err(Error::InvalidBytecode { .. })));
    Ok(())
}

#[test]
fn test_unsupported_constructs_abandon_the_build() -> Result<()> {
    let mut asm = MethodAssembler::new(1, 1).with_signature(&[DataType::Reference], DataType::Void);
    asm.emit(Opcode::CallInterop, &[Operand::Id(CALLEE), Operand::VReg(0)])?;
    asm.emit(Opcode::ReturnVoid, &[])?;
    let interop = asm.finish()?;

    let runtime = InMemoryRuntime::new()
        .with_method(CALLEE, MethodSignature::new_static(&[DataType::Reference], DataType::Void));
    let result = build(&runtime, BuilderConfig::jit().with_arch(Arch::AArch32), &interop);
    assert!(matches!(result, Err(Error::UnsupportedConstruct { pc: 0, .. })));

    let graph = build(&runtime, BuilderConfig::jit(), &interop)?;
    single(&graph, |k| matches!(k, InstKind::CallInterop { .. }));

    let mut asm = MethodAssembler::new(1, 1).with_signature(&[DataType::Reference], DataType::Void);
    asm.emit_lda(0)?;
    asm.emit(Opcode::MonitorEnter, &[])?;
    asm.emit(Opcode::ReturnVoid, &[])?;
    let monitor = asm.finish()?;

    let result = build(&runtime, BuilderConfig::bytecode_optimizer(), &monitor);
    assert!(matches!(result, Err(Error::UnsupportedConstruct { .. })));
    let graph = build(&runtime, BuilderConfig::jit(), &monitor)?;
    single(&graph, |k| matches!(k, InstKind::Monitor(MonitorKind::Enter)));
    Ok(())
}

#[test]
fn test_invalid_methods_are_rejected() -> Result<()> {
    let runtime = InMemoryRuntime::new();

    let mut asm = MethodAssembler::new(1, 0).with_signature(&[], DataType::Int32);
    asm.emit_lda(0)?;
    asm.emit(Opcode::Return, &[])?;
    let undefined = asm.finish()?;
    assert!(matches!(
        build(&runtime, BuilderConfig::jit(), &undefined),
        Err(Error::InvalidBytecode { .. })
    ));

    let mut asm = MethodAssembler::new(1, 0).with_signature(&[], DataType::Void);
    for _ in 0..3 {
        asm.emit(Opcode::Nop, &[])?;
    }
    asm.emit(Opcode::ReturnVoid, &[])?;
    let long = asm.finish()?;
    assert!(matches!(
        build(&runtime, BuilderConfig::jit().with_max_instructions(2), &long),
        Err(Error::MethodTooLarge {
            limit: LimitKind::Instructions,
            actual: 4,
            max: 2,
        })
    ));
    Ok(())
}

#[test]
fn test_build_into_reuses_graph() -> Result<()> {
    let mut asm = MethodAssembler::new(1, 1).with_signature(&[DataType::Int32], DataType::Int32);
    asm.emit_lda(0)?;
    asm.emit(Opcode::Return, &[])?;
    let method = asm.finish()?;

    let runtime = InMemoryRuntime::new();
    let config = BuilderConfig::jit().with_verification(true);
    let builder = IrBuilder::new(&runtime, &config);

    let mut graph = builder.build(&method)?;
    let first = graph.to_string();
    builder.build_into(&method, &mut graph)?;
    assert_eq!(graph.to_string(), first);
    Ok(())
}

#[test]
fn test_build_all_preserves_order() -> Result<()> {
    let methods: Vec<MethodBody> = (0..8u32)
        .map(|i| {
            let mut asm = MethodAssembler::new(1, 1)
                .with_id(EntityId(i))
                .with_signature(&[DataType::Int32], DataType::Int32);
            asm.emit_lda(0)?;
            asm.emit(Opcode::Muli, &[Operand::Imm(i64::from(i))])?;
            asm.emit(Opcode::Return, &[])?;
            asm.finish()
        })
        .collect::<Result<_>>()?;

    let runtime = InMemoryRuntime::new();
    let config = BuilderConfig::jit();
    let graphs = IrBuilder::new(&runtime, &config).build_all(&methods);

    assert_eq!(graphs.len(), methods.len());
    for (i, graph) in graphs.into_iter().enumerate() {
        assert_eq!(graph?.method(), methods[i].id);
    }
    Ok(())
}
