//! Textual dump of a graph.
//!
//! ```text
//! BB bb0 [START] preds: [] succs: [bb1]
//!     v0 = Constant 1 -> i64
//! BB bb1 pc 0 preds: [bb0] succs: []
//!     v1 = Return v0:i32 -> i32
//! ```

use std::fmt;

use crate::ir::{BasicBlock, Graph, Inst, InstKind};

fn write_list<T: fmt::Display>(f: &mut fmt::Formatter<'_>, items: &[T]) -> fmt::Result {
    write!(f, "[")?;
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{item}")?;
    }
    write!(f, "]")
}

fn write_block_header(f: &mut fmt::Formatter<'_>, block: &BasicBlock) -> fmt::Result {
    write!(f, "BB {}", block.id())?;
    if !block.flags().is_empty() {
        write!(f, " {:?}", block.flags())?;
    }
    if let Some(pc) = block.guest_pc() {
        write!(f, " pc {pc}")?;
    }
    write!(f, " preds: ")?;
    write_list(f, block.predecessors())?;
    write!(f, " succs: ")?;
    write_list(f, block.successors())?;
    if !block.exception_successors().is_empty() {
        write!(f, " throws: ")?;
        write_list(f, block.exception_successors())?;
    }
    writeln!(f)
}

fn write_payload(f: &mut fmt::Formatter<'_>, kind: &InstKind) -> fmt::Result {
    match kind {
        InstKind::Constant(value) => write!(f, " {value}"),
        InstKind::Parameter { index } => write!(f, " arg{index}"),
        InstKind::BinaryImm { op, imm } => write!(f, " {}, {imm}", <&str>::from(*op)),
        InstKind::Binary(op) => write!(f, " {}", <&str>::from(*op)),
        InstKind::Unary(op) => write!(f, " {}", <&str>::from(*op)),
        InstKind::Compare { cc } => write!(f, " {}", <&str>::from(*cc)),
        InstKind::IfImm { cc, imm } => write!(f, " {} {imm}", <&str>::from(*cc)),
        InstKind::Cast { from } => write!(f, " from {from}"),
        InstKind::Intrinsic { id, method } => write!(f, " {} {method}", id.name()),
        InstKind::UnresolvedLoadAndInitClass { class, slot }
        | InstKind::UnresolvedLoadType { class, slot } => write!(f, " {class} {slot}"),
        InstKind::ResolveObjectField { field, slot }
        | InstKind::ResolveObjectFieldStatic { field, slot } => write!(f, " {field} {slot}"),
        InstKind::ResolveStatic { method, slot } | InstKind::ResolveVirtual { method, slot } => {
            write!(f, " {method} {slot}")
        }
        InstKind::CallStatic { method }
        | InstKind::CallVirtual { method }
        | InstKind::CallResolvedStatic { method }
        | InstKind::CallResolvedVirtual { method }
        | InstKind::CallInterop { method } => write!(f, " {method}"),
        _ => Ok(()),
    }
}

fn write_inst(f: &mut fmt::Formatter<'_>, inst: &Inst) -> fmt::Result {
    write!(f, "    {} = {}", inst.id(), inst.kind().name())?;
    write_payload(f, inst.kind())?;
    for (i, input) in inst.inputs().iter().enumerate() {
        write!(f, "{}{}:{}", if i == 0 { " " } else { ", " }, input.inst, input.ty)?;
        if let Some(vreg) = inst.vregs().get(i) {
            write!(f, "({vreg})")?;
        }
    }
    writeln!(f, " -> {}", inst.ty())
}

impl fmt::Display for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "method {}", self.method())?;
        for block in self.blocks() {
            write_block_header(f, block)?;
            for id in block.all_insts() {
                write_inst(f, self.inst(id))?;
            }
        }
        Ok(())
    }
}
