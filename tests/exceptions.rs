//! Try region and catch handler tests.

use arkir::{
    ir::{CatchHandler, ConstValue},
    prelude::*,
};

const TYPE_A: EntityId = EntityId(10);
const TYPE_B: EntityId = EntityId(11);
const CALLEE: EntityId = EntityId(20);

fn runtime() -> InMemoryRuntime {
    InMemoryRuntime::new().with_resolved_method(
        CALLEE,
        MethodSignature::new_static(&[], DataType::Void),
        ResolvedMethod::default(),
    )
}

fn build(method: &MethodBody) -> Result<Graph> {
    let config = BuilderConfig::jit().with_verification(true);
    IrBuilder::new(&runtime(), &config).build(method)
}

fn call(asm: &mut MethodAssembler) -> Result<()> {
    asm.emit(
        Opcode::CallShort,
        &[Operand::Id(CALLEE), Operand::VReg(0), Operand::VReg(0)],
    )
}

/// Handler code shared by the nested-handler tests: returns `v0 + v1`.
fn handler(asm: &mut MethodAssembler, label: &str) -> Result<()> {
    asm.label(label)?;
    asm.emit_lda(0)?;
    asm.emit(Opcode::Add2, &[Operand::VReg(1)])?;
    asm.emit(Opcode::Return, &[])
}

/// Two calls inside an inner region (catching `TYPE_A`) nested in an outer
/// region (catching `TYPE_B`). `v0` differs between the calls, `v1` does not.
fn nested_handlers() -> Result<MethodBody> {
    let mut asm = MethodAssembler::new(2, 0).with_signature(&[], DataType::Int32);
    asm.emit_movi(0, 1)?;
    asm.emit_movi(1, 7)?;
    asm.label("try")?;
    call(&mut asm)?;
    asm.emit_movi(0, 2)?;
    call(&mut asm)?;
    asm.label("inner_end")?;
    asm.emit(Opcode::Nop, &[])?;
    asm.label("outer_end")?;
    asm.emit_ldai(0)?;
    asm.emit(Opcode::Return, &[])?;
    handler(&mut asm, "catch_a")?;
    handler(&mut asm, "catch_b")?;
    asm.try_block("try", "outer_end", &[(Some(TYPE_B), "catch_b")]);
    asm.try_block("try", "inner_end", &[(Some(TYPE_A), "catch_a")]);
    asm.finish()
}

fn handler_of(info: &TryBlockInfo) -> CatchHandler {
    info.handlers[0]
}

#[test]
fn test_throwing_block_edges_innermost_first() -> Result<()> {
    let method = nested_handlers()?;
    let graph = build(&method)?;

    let try_blocks = graph.try_blocks();
    assert_eq!(try_blocks.len(), 2);
    let outer = handler_of(&try_blocks[0]);
    let inner = handler_of(&try_blocks[1]);
    assert_eq!(outer.type_id, Some(TYPE_B));
    assert_eq!(inner.type_id, Some(TYPE_A));

    let throwing: Vec<&BasicBlock> = graph
        .blocks()
        .filter(|b| !b.exception_successors().is_empty())
        .collect();
    assert_eq!(throwing.len(), 1);
    assert_eq!(
        throwing[0].exception_successors(),
        &[inner.catch_begin, outer.catch_begin]
    );
    Ok(())
}

#[test]
fn test_catch_phis_only_for_diverging_registers() -> Result<()> {
    let method = nested_handlers()?;
    let graph = build(&method)?;

    for info in graph.try_blocks() {
        let entry = graph.block(handler_of(info).catch_begin);
        assert!(entry.is_catch_begin());
        assert_eq!(entry.phis().len(), 1, "catch entry {}", entry.id());

        let phi = graph.inst(entry.phis()[0]);
        let InstKind::CatchPhi { throwers } = phi.kind() else {
            panic!("expected a catch phi, got {}", phi.kind().name());
        };
        assert_eq!(phi.inputs().len(), 2);
        assert_eq!(throwers.len(), 2);
        assert!(throwers
            .iter()
            .all(|&t| matches!(graph.inst(t).kind(), InstKind::CallStatic { .. })));

        let values: Vec<&InstKind> = phi.inputs().iter().map(|i| graph.inst(i.inst).kind()).collect();
        assert_eq!(
            values,
            vec![
                &InstKind::Constant(ConstValue::Int(1)),
                &InstKind::Constant(ConstValue::Int(2))
            ]
        );

        let exception = entry
            .insts()
            .iter()
            .filter(|&&i| matches!(graph.inst(i).kind(), InstKind::LoadException))
            .count();
        assert_eq!(exception, 1);
    }

    let seven = graph
        .insts()
        .find(|i| *i.kind() == InstKind::Constant(ConstValue::Int(7)))
        .expect("constant 7");
    let adds = graph
        .insts()
        .filter(|i| matches!(i.kind(), InstKind::Binary(_)))
        .count();
    assert_eq!(adds, 2);
    assert!(graph
        .insts()
        .filter(|i| matches!(i.kind(), InstKind::Binary(_)))
        .all(|add| add.input(1) == Some(seven.id())));
    Ok(())
}

#[test]
fn test_try_order_follows_declaration() -> Result<()> {
    let mut asm = MethodAssembler::new(1, 0).with_signature(&[], DataType::Void);
    asm.label("a")?;
    call(&mut asm)?;
    asm.label("b")?;
    call(&mut asm)?;
    asm.label("c")?;
    call(&mut asm)?;
    asm.label("d")?;
    asm.emit(Opcode::ReturnVoid, &[])?;
    asm.label("handler")?;
    asm.emit(Opcode::ReturnVoid, &[])?;

    // innermost declared first, then the enclosing region, then a sibling
    asm.try_block("b", "c", &[(None, "handler")]);
    asm.try_block("a", "d", &[(None, "handler")]);
    asm.try_block("a", "b", &[(None, "handler")]);
    let method = asm.finish()?;

    let graph = build(&method)?;
    let order: Vec<(usize, u32, u32)> = graph
        .try_blocks()
        .iter()
        .map(|t| (t.index, t.start_pc, t.end_pc))
        .collect();
    let expected: Vec<(usize, u32, u32)> = method
        .try_blocks
        .iter()
        .enumerate()
        .map(|(i, t)| (i, t.start_pc, t.end_pc))
        .collect();
    assert_eq!(order, expected);

    for info in graph.try_blocks() {
        assert!(graph.block(info.begin).is_try_begin());
        assert!(graph.block(info.end).is_try_end());
    }
    Ok(())
}

#[test]
fn test_handler_of_non_throwing_region_is_unreachable() -> Result<()> {
    let mut asm = MethodAssembler::new(1, 0).with_signature(&[], DataType::Int32);
    asm.label("try")?;
    asm.emit_movi(0, 3)?;
    asm.label("end")?;
    asm.emit_lda(0)?;
    asm.emit(Opcode::Return, &[])?;
    asm.label("handler")?;
    asm.emit_ldai(-1)?;
    asm.emit(Opcode::Return, &[])?;
    asm.try_block("try", "end", &[(None, "handler")]);
    let method = asm.finish()?;

    let graph = build(&method)?;
    assert!(graph.blocks().all(|b| b.exception_successors().is_empty()));
    assert!(graph
        .insts()
        .all(|i| !matches!(i.kind(), InstKind::LoadException | InstKind::CatchPhi { .. })));
    assert_eq!(
        graph
            .insts()
            .filter(|i| matches!(i.kind(), InstKind::Return))
            .count(),
        1
    );
    Ok(())
}

#[test]
fn test_overlapping_regions_are_rejected() -> Result<()> {
    let mut asm = MethodAssembler::new(1, 0).with_signature(&[], DataType::Void);
    asm.label("a")?;
    call(&mut asm)?;
    asm.label("b")?;
    call(&mut asm)?;
    asm.label("c")?;
    call(&mut asm)?;
    asm.label("d")?;
    asm.emit(Opcode::ReturnVoid, &[])?;
    asm.try_block("a", "c", &[(None, "d")]);
    asm.try_block("b", "d", &[(None, "d")]);
    let method = asm.finish()?;

    assert!(matches!(build(&method), Err(Error::InvalidBytecode { .. })));
    Ok(())
}

#[test]
fn test_try_nesting_limit() -> Result<()> {
    let method = nested_handlers()?;
    let config = BuilderConfig::jit().with_max_try_depth(1);
    let result = IrBuilder::new(&runtime(), &config).build(&method);
    assert!(matches!(
        result,
        Err(Error::MethodTooLarge {
            limit: LimitKind::TryNesting,
            actual: 2,
            max: 1,
        })
    ));
    Ok(())
}

/// Single region whose handler calls out before returning `v0 + v1`, so the
/// catch entry's values are recorded by a SaveState.
fn calling_handler() -> Result<MethodBody> {
    let mut asm = MethodAssembler::new(2, 0).with_signature(&[], DataType::Int32);
    asm.emit_movi(0, 1)?;
    asm.emit_movi(1, 7)?;
    asm.label("try")?;
    call(&mut asm)?;
    asm.emit_movi(0, 2)?;
    call(&mut asm)?;
    asm.label("try_end")?;
    asm.emit_ldai(0)?;
    asm.emit(Opcode::Return, &[])?;
    asm.label("catch")?;
    call(&mut asm)?;
    asm.emit_lda(0)?;
    asm.emit(Opcode::Add2, &[Operand::VReg(1)])?;
    asm.emit(Opcode::Return, &[])?;
    asm.try_block("try", "try_end", &[(None, "catch")]);
    asm.finish()
}

#[test]
fn test_catch_state_annotations_match_definitions() -> Result<()> {
    let graph = build(&calling_handler()?)?;

    let entry = graph.block(handler_of(&graph.try_blocks()[0]).catch_begin);
    assert_eq!(entry.phis().len(), 1);
    let phi = entry.phis()[0];

    let handler_call = graph
        .insts()
        .filter(|i| matches!(i.kind(), InstKind::CallStatic { .. }))
        .find(|i| graph.inst(i.save_state().expect("call state")).inputs().iter().any(|s| s.inst == phi))
        .expect("handler call");
    let state = graph.inst(handler_call.save_state().expect("call state"));

    let mut locations = Vec::new();
    for (input, vreg) in state.inputs().iter().zip(state.vregs()) {
        let def = graph.inst(input.inst);
        let expected = if def.is_constant() {
            VRegLocation::Constant
        } else {
            VRegLocation::Slot
        };
        assert_eq!(input.ty, def.ty(), "{} in {}", input.inst, state.id());
        assert_eq!(vreg.ty(), def.ty(), "{} in {}", input.inst, state.id());
        assert_eq!(vreg.location(), expected, "{} in {}", input.inst, state.id());
        locations.push((vreg.index(), vreg.location()));
    }
    assert!(locations.contains(&(0, VRegLocation::Slot)));
    assert!(locations.contains(&(1, VRegLocation::Constant)));
    Ok(())
}
