//! Benchmarks for graph construction.
//!
//! Measures the full build pipeline on synthetic methods:
//! - Straight-line arithmetic of growing length
//! - A loop nest exercising placeholder phis and back-patching
//! - A method with nested try regions and calls (catch phis)
//! - Parallel building of many methods

extern crate arkir;

use arkir::prelude::*;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::hint::black_box;

const CALLEE: EntityId = EntityId(1);

fn runtime() -> InMemoryRuntime {
    InMemoryRuntime::new().with_resolved_method(
        CALLEE,
        MethodSignature::new_static(&[DataType::Int32], DataType::Int32),
        ResolvedMethod::default(),
    )
}

/// `acc = a; acc += i` repeated `len` times.
fn straight_line(len: usize) -> MethodBody {
    let mut asm = MethodAssembler::new(4, 1).with_signature(&[DataType::Int32], DataType::Int32);
    asm.emit_lda(3).unwrap();
    for i in 0..len {
        asm.emit(Opcode::Addi, &[Operand::Imm(i as i64)]).unwrap();
        asm.emit_sta((i % 3) as u16).unwrap();
        asm.emit(Opcode::Add2, &[Operand::VReg((i % 3) as u16)]).unwrap();
    }
    asm.emit(Opcode::Return, &[]).unwrap();
    asm.finish().unwrap()
}

/// Two nested counting loops updating three registers.
fn loop_nest() -> MethodBody {
    let mut asm = MethodAssembler::new(5, 1).with_signature(&[DataType::Int32], DataType::Int32);
    asm.emit_movi(0, 0).unwrap();
    asm.emit_movi(1, 0).unwrap();
    asm.label("outer").unwrap();
    asm.emit_lda(0).unwrap();
    asm.emit_branch(Opcode::Jge, &[Operand::VReg(4)], "done").unwrap();
    asm.emit_movi(2, 0).unwrap();
    asm.label("inner").unwrap();
    asm.emit_lda(2).unwrap();
    asm.emit_branch(Opcode::Jge, &[Operand::VReg(4)], "next").unwrap();
    asm.emit_lda(1).unwrap();
    asm.emit(Opcode::Add2, &[Operand::VReg(2)]).unwrap();
    asm.emit_sta(1).unwrap();
    asm.emit(Opcode::Inci, &[Operand::VReg(2), Operand::Imm(1)]).unwrap();
    asm.emit_branch(Opcode::Jmp, &[], "inner").unwrap();
    asm.label("next").unwrap();
    asm.emit(Opcode::Inci, &[Operand::VReg(0), Operand::Imm(1)]).unwrap();
    asm.emit_branch(Opcode::Jmp, &[], "outer").unwrap();
    asm.label("done").unwrap();
    asm.emit_lda(1).unwrap();
    asm.emit(Opcode::Return, &[]).unwrap();
    asm.finish().unwrap()
}

/// Calls inside two nested try regions, each with its own handler.
fn guarded_calls() -> MethodBody {
    let mut asm = MethodAssembler::new(3, 1).with_signature(&[DataType::Int32], DataType::Int32);
    asm.emit_movi(0, 0).unwrap();
    asm.label("try").unwrap();
    for _ in 0..8 {
        asm.emit(
            Opcode::CallShort,
            &[Operand::Id(CALLEE), Operand::VReg(2), Operand::VReg(2)],
        )
        .unwrap();
        asm.emit_sta(0).unwrap();
    }
    asm.label("inner_end").unwrap();
    asm.emit(Opcode::Nop, &[]).unwrap();
    asm.label("outer_end").unwrap();
    asm.emit_lda(0).unwrap();
    asm.emit(Opcode::Return, &[]).unwrap();
    for handler in ["inner", "outer"] {
        asm.label(handler).unwrap();
        asm.emit_lda(0).unwrap();
        asm.emit(Opcode::Return, &[]).unwrap();
    }
    asm.try_block("try", "outer_end", &[(None, "outer")]);
    asm.try_block("try", "inner_end", &[(None, "inner")]);
    asm.finish().unwrap()
}

fn bench_straight_line(c: &mut Criterion) {
    let runtime = runtime();
    let config = BuilderConfig::jit().with_verification(false);
    let builder = IrBuilder::new(&runtime, &config);

    let mut group = c.benchmark_group("build_straight_line");
    for len in [16, 256, 4096] {
        let method = straight_line(len);
        group.bench_with_input(BenchmarkId::from_parameter(len), &method, |b, method| {
            b.iter(|| black_box(builder.build(black_box(method)).unwrap()));
        });
    }
    group.finish();
}

fn bench_loop_nest(c: &mut Criterion) {
    let runtime = runtime();
    let config = BuilderConfig::jit().with_verification(false);
    let builder = IrBuilder::new(&runtime, &config);
    let method = loop_nest();

    c.bench_function("build_loop_nest", |b| {
        b.iter(|| black_box(builder.build(black_box(&method)).unwrap()));
    });
}

fn bench_build_into_reuse(c: &mut Criterion) {
    let runtime = runtime();
    let config = BuilderConfig::jit().with_verification(false);
    let builder = IrBuilder::new(&runtime, &config);
    let method = loop_nest();
    let mut graph = builder.build(&method).unwrap();

    c.bench_function("build_into_loop_nest", |b| {
        b.iter(|| {
            builder.build_into(black_box(&method), &mut graph).unwrap();
            black_box(graph.inst_count())
        });
    });
}

fn bench_guarded_calls(c: &mut Criterion) {
    let runtime = runtime();
    let config = BuilderConfig::aot().with_verification(false);
    let builder = IrBuilder::new(&runtime, &config);
    let method = guarded_calls();

    c.bench_function("build_guarded_calls", |b| {
        b.iter(|| black_box(builder.build(black_box(&method)).unwrap()));
    });
}

fn bench_build_all(c: &mut Criterion) {
    let runtime = runtime();
    let config = BuilderConfig::jit().with_verification(false);
    let builder = IrBuilder::new(&runtime, &config);
    let methods: Vec<MethodBody> = (0..256)
        .map(|i| if i % 2 == 0 { loop_nest() } else { guarded_calls() })
        .collect();

    c.bench_function("build_all_256", |b| {
        b.iter(|| black_box(builder.build_all(black_box(&methods))));
    });
}

criterion_group!(
    benches,
    bench_straight_line,
    bench_loop_nest,
    bench_build_into_reuse,
    bench_guarded_calls,
    bench_build_all
);
criterion_main!(benches);
