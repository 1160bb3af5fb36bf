//! The opcode table.
//!
//! The instruction set is register/accumulator based: most instructions read
//! the implicit accumulator and at most a couple of virtual registers, and
//! write the accumulator. Each opcode carries a static operand format and a
//! set of [`OpcodeFlags`] describing its control-flow and exception behavior,
//! which is all that block discovery needs to know.
#![allow(missing_docs)]

use bitflags::bitflags;
use strum::{EnumCount, EnumIter, IntoStaticStr};

/// Kind of one encoded operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperandKind {
    /// Virtual register index (2 bytes)
    VReg,
    /// Signed integer immediate (8 bytes)
    Imm,
    /// Floating-point immediate (8 bytes)
    FImm,
    /// Entity id: method, field, class, string or literal array (4 bytes)
    Id,
    /// Branch offset relative to the instruction's pc (4 bytes)
    Offset,
}

impl OperandKind {
    /// Encoded size in bytes.
    #[must_use]
    pub const fn size(self) -> u32 {
        match self {
            OperandKind::VReg => 2,
            OperandKind::Imm | OperandKind::FImm => 8,
            OperandKind::Id | OperandKind::Offset => 4,
        }
    }
}

bitflags! {
    /// Static properties of an opcode.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct OpcodeFlags : u16 {
        /// Transfers control to a pc-relative target
        const JUMP = 0x0001;
        /// Jump taken only when a condition holds; falls through otherwise
        const CONDITIONAL = 0x0002;
        /// Leaves the method
        const RETURN = 0x0004;
        /// Unconditionally raises the accumulator-held or register-held exception
        const THROW = 0x0008;
        /// May raise an exception
        const MAY_THROW = 0x0010;
        /// Calls another method
        const CALL = 0x0020;
    }
}

// Operand formats
const NONE: &[OperandKind] = &[];
const V: &[OperandKind] = &[OperandKind::VReg];
const VV: &[OperandKind] = &[OperandKind::VReg, OperandKind::VReg];
const VI: &[OperandKind] = &[OperandKind::VReg, OperandKind::Imm];
const VF: &[OperandKind] = &[OperandKind::VReg, OperandKind::FImm];
const I: &[OperandKind] = &[OperandKind::Imm];
const F: &[OperandKind] = &[OperandKind::FImm];
const ID: &[OperandKind] = &[OperandKind::Id];
const V_ID: &[OperandKind] = &[OperandKind::VReg, OperandKind::Id];
const VV_ID: &[OperandKind] = &[OperandKind::VReg, OperandKind::VReg, OperandKind::Id];
const OFF: &[OperandKind] = &[OperandKind::Offset];
const V_OFF: &[OperandKind] = &[OperandKind::VReg, OperandKind::Offset];
const ID_V: &[OperandKind] = &[OperandKind::Id, OperandKind::VReg];
const ID_VV: &[OperandKind] = &[OperandKind::Id, OperandKind::VReg, OperandKind::VReg];
const ID_VVVV: &[OperandKind] = &[
    OperandKind::Id,
    OperandKind::VReg,
    OperandKind::VReg,
    OperandKind::VReg,
    OperandKind::VReg,
];
const ID_VVVI: &[OperandKind] = &[
    OperandKind::Id,
    OperandKind::VReg,
    OperandKind::VReg,
    OperandKind::VReg,
    OperandKind::Imm,
];

/// A bytecode opcode.
///
/// `2`-suffixed arithmetic computes `acc = acc op v`; `i`-suffixed forms take
/// an immediate instead of the register. `Wide` forms operate on 64-bit
/// values, `F` forms on doubles, `Obj` forms on references.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, EnumIter, EnumCount, IntoStaticStr,
)]
pub enum Opcode {
    #[strum(serialize = "nop")]
    Nop,

    // Moves and constants
    #[strum(serialize = "mov")]
    Mov,
    #[strum(serialize = "mov.64")]
    MovWide,
    #[strum(serialize = "mov.obj")]
    MovObj,
    #[strum(serialize = "movi")]
    Movi,
    #[strum(serialize = "movi.64")]
    MoviWide,
    #[strum(serialize = "fmovi.64")]
    FmoviWide,
    #[strum(serialize = "lda")]
    Lda,
    #[strum(serialize = "lda.64")]
    LdaWide,
    #[strum(serialize = "lda.obj")]
    LdaObj,
    #[strum(serialize = "ldai")]
    Ldai,
    #[strum(serialize = "ldai.64")]
    LdaiWide,
    #[strum(serialize = "fldai.64")]
    FldaiWide,
    #[strum(serialize = "sta")]
    Sta,
    #[strum(serialize = "sta.64")]
    StaWide,
    #[strum(serialize = "sta.obj")]
    StaObj,
    #[strum(serialize = "lda.null")]
    LdaNull,
    #[strum(serialize = "lda.str")]
    LdaStr,
    #[strum(serialize = "lda.type")]
    LdaType,
    #[strum(serialize = "lda.const")]
    LdaConst,

    // Two-register arithmetic
    #[strum(serialize = "add2")]
    Add2,
    #[strum(serialize = "add2.64")]
    Add2Wide,
    #[strum(serialize = "sub2")]
    Sub2,
    #[strum(serialize = "sub2.64")]
    Sub2Wide,
    #[strum(serialize = "mul2")]
    Mul2,
    #[strum(serialize = "mul2.64")]
    Mul2Wide,
    #[strum(serialize = "div2")]
    Div2,
    #[strum(serialize = "div2.64")]
    Div2Wide,
    #[strum(serialize = "mod2")]
    Mod2,
    #[strum(serialize = "mod2.64")]
    Mod2Wide,
    #[strum(serialize = "and2")]
    And2,
    #[strum(serialize = "or2")]
    Or2,
    #[strum(serialize = "xor2")]
    Xor2,
    #[strum(serialize = "shl2")]
    Shl2,
    #[strum(serialize = "shr2")]
    Shr2,
    #[strum(serialize = "ashr2")]
    Ashr2,
    #[strum(serialize = "fadd2.64")]
    Fadd2Wide,
    #[strum(serialize = "fsub2.64")]
    Fsub2Wide,
    #[strum(serialize = "fmul2.64")]
    Fmul2Wide,
    #[strum(serialize = "fdiv2.64")]
    Fdiv2Wide,

    // Immediate arithmetic
    #[strum(serialize = "addi")]
    Addi,
    #[strum(serialize = "subi")]
    Subi,
    #[strum(serialize = "muli")]
    Muli,
    #[strum(serialize = "divi")]
    Divi,
    #[strum(serialize = "andi")]
    Andi,
    #[strum(serialize = "ori")]
    Ori,
    #[strum(serialize = "shli")]
    Shli,

    // Unary
    #[strum(serialize = "neg")]
    Neg,
    #[strum(serialize = "neg.64")]
    NegWide,
    #[strum(serialize = "fneg.64")]
    FnegWide,
    #[strum(serialize = "not")]
    Not,
    #[strum(serialize = "not.64")]
    NotWide,
    #[strum(serialize = "inci")]
    Inci,

    // Three-way compares
    #[strum(serialize = "cmp.64")]
    CmpWide,
    #[strum(serialize = "fcmpl.64")]
    FcmplWide,
    #[strum(serialize = "fcmpg.64")]
    FcmpgWide,

    // Conversions
    #[strum(serialize = "i32toi64")]
    I32toI64,
    #[strum(serialize = "i64toi32")]
    I64toI32,
    #[strum(serialize = "i32tof64")]
    I32toF64,
    #[strum(serialize = "f64toi32")]
    F64toI32,
    #[strum(serialize = "i64tof64")]
    I64toF64,
    #[strum(serialize = "f64toi64")]
    F64toI64,

    // Jumps
    #[strum(serialize = "jmp")]
    Jmp,
    #[strum(serialize = "jeqz")]
    Jeqz,
    #[strum(serialize = "jnez")]
    Jnez,
    #[strum(serialize = "jltz")]
    Jltz,
    #[strum(serialize = "jgtz")]
    Jgtz,
    #[strum(serialize = "jlez")]
    Jlez,
    #[strum(serialize = "jgez")]
    Jgez,
    #[strum(serialize = "jeqz.obj")]
    JeqzObj,
    #[strum(serialize = "jnez.obj")]
    JnezObj,
    #[strum(serialize = "jeq")]
    Jeq,
    #[strum(serialize = "jne")]
    Jne,
    #[strum(serialize = "jlt")]
    Jlt,
    #[strum(serialize = "jgt")]
    Jgt,
    #[strum(serialize = "jle")]
    Jle,
    #[strum(serialize = "jge")]
    Jge,
    #[strum(serialize = "jeq.obj")]
    JeqObj,
    #[strum(serialize = "jne.obj")]
    JneObj,

    // Arrays
    #[strum(serialize = "newarr")]
    Newarr,
    #[strum(serialize = "lenarr")]
    Lenarr,
    #[strum(serialize = "ldarr")]
    Ldarr,
    #[strum(serialize = "ldarr.64")]
    LdarrWide,
    #[strum(serialize = "fldarr.64")]
    FldarrWide,
    #[strum(serialize = "ldarr.obj")]
    LdarrObj,
    #[strum(serialize = "starr")]
    Starr,
    #[strum(serialize = "starr.64")]
    StarrWide,
    #[strum(serialize = "fstarr.64")]
    FstarrWide,
    #[strum(serialize = "starr.obj")]
    StarrObj,

    // Objects and statics
    #[strum(serialize = "newobj")]
    Newobj,
    #[strum(serialize = "ldobj")]
    Ldobj,
    #[strum(serialize = "ldobj.64")]
    LdobjWide,
    #[strum(serialize = "ldobj.obj")]
    LdobjObj,
    #[strum(serialize = "stobj")]
    Stobj,
    #[strum(serialize = "stobj.64")]
    StobjWide,
    #[strum(serialize = "stobj.obj")]
    StobjObj,
    #[strum(serialize = "ldstatic")]
    Ldstatic,
    #[strum(serialize = "ldstatic.64")]
    LdstaticWide,
    #[strum(serialize = "ldstatic.obj")]
    LdstaticObj,
    #[strum(serialize = "ststatic")]
    Ststatic,
    #[strum(serialize = "ststatic.64")]
    StstaticWide,
    #[strum(serialize = "ststatic.obj")]
    StstaticObj,
    #[strum(serialize = "checkcast")]
    Checkcast,
    #[strum(serialize = "isinstance")]
    Isinstance,

    // Calls
    #[strum(serialize = "call.short")]
    CallShort,
    #[strum(serialize = "call")]
    Call,
    #[strum(serialize = "call.range")]
    CallRange,
    #[strum(serialize = "call.acc")]
    CallAcc,
    #[strum(serialize = "call.virt.short")]
    CallVirtShort,
    #[strum(serialize = "call.virt")]
    CallVirt,
    #[strum(serialize = "call.virt.range")]
    CallVirtRange,
    #[strum(serialize = "call.virt.acc")]
    CallVirtAcc,
    #[strum(serialize = "initobj")]
    InitObj,
    #[strum(serialize = "call.interop")]
    CallInterop,

    // Synchronization, exits and environment
    #[strum(serialize = "monitorenter")]
    MonitorEnter,
    #[strum(serialize = "monitorexit")]
    MonitorExit,
    #[strum(serialize = "return")]
    Return,
    #[strum(serialize = "return.64")]
    ReturnWide,
    #[strum(serialize = "return.obj")]
    ReturnObj,
    #[strum(serialize = "return.void")]
    ReturnVoid,
    #[strum(serialize = "throw")]
    Throw,
    #[strum(serialize = "ldlexenv")]
    LdLexEnv,
    #[strum(serialize = "stlexenv")]
    StLexEnv,
}

impl Opcode {
    /// Operand kinds in encoding order.
    #[must_use]
    pub const fn format(self) -> &'static [OperandKind] {
        use Opcode as O;

        match self {
            O::Nop
            | O::LdaNull
            | O::Neg
            | O::NegWide
            | O::FnegWide
            | O::Not
            | O::NotWide
            | O::I32toI64
            | O::I64toI32
            | O::I32toF64
            | O::F64toI32
            | O::I64toF64
            | O::F64toI64
            | O::MonitorEnter
            | O::MonitorExit
            | O::Return
            | O::ReturnWide
            | O::ReturnObj
            | O::ReturnVoid
            | O::LdLexEnv
            | O::StLexEnv => NONE,
            O::Mov | O::MovWide | O::MovObj | O::Starr | O::StarrWide | O::FstarrWide
            | O::StarrObj => VV,
            O::Movi | O::MoviWide | O::Inci => VI,
            O::FmoviWide => VF,
            O::Lda
            | O::LdaWide
            | O::LdaObj
            | O::Sta
            | O::StaWide
            | O::StaObj
            | O::Add2
            | O::Add2Wide
            | O::Sub2
            | O::Sub2Wide
            | O::Mul2
            | O::Mul2Wide
            | O::Div2
            | O::Div2Wide
            | O::Mod2
            | O::Mod2Wide
            | O::And2
            | O::Or2
            | O::Xor2
            | O::Shl2
            | O::Shr2
            | O::Ashr2
            | O::Fadd2Wide
            | O::Fsub2Wide
            | O::Fmul2Wide
            | O::Fdiv2Wide
            | O::CmpWide
            | O::FcmplWide
            | O::FcmpgWide
            | O::Lenarr
            | O::Ldarr
            | O::LdarrWide
            | O::FldarrWide
            | O::LdarrObj
            | O::Throw => V,
            O::Ldai | O::LdaiWide | O::Addi | O::Subi | O::Muli | O::Divi | O::Andi | O::Ori
            | O::Shli => I,
            O::FldaiWide => F,
            O::LdaStr
            | O::LdaType
            | O::Ldstatic
            | O::LdstaticWide
            | O::LdstaticObj
            | O::Ststatic
            | O::StstaticWide
            | O::StstaticObj
            | O::Checkcast
            | O::Isinstance => ID,
            O::LdaConst
            | O::Newobj
            | O::Ldobj
            | O::LdobjWide
            | O::LdobjObj
            | O::Stobj
            | O::StobjWide
            | O::StobjObj => V_ID,
            O::Newarr => VV_ID,
            O::Jmp => OFF,
            O::Jeqz
            | O::Jnez
            | O::Jltz
            | O::Jgtz
            | O::Jlez
            | O::Jgez
            | O::JeqzObj
            | O::JnezObj => OFF,
            O::Jeq | O::Jne | O::Jlt | O::Jgt | O::Jle | O::Jge | O::JeqObj | O::JneObj => V_OFF,
            O::CallShort | O::CallVirtShort => ID_VV,
            O::Call | O::CallVirt | O::InitObj => ID_VVVV,
            O::CallRange | O::CallVirtRange | O::CallInterop => ID_V,
            O::CallAcc | O::CallVirtAcc => ID_VVVI,
        }
    }

    /// Control-flow and exception properties.
    #[must_use]
    pub fn flags(self) -> OpcodeFlags {
        use Opcode as O;

        let call = OpcodeFlags::CALL | OpcodeFlags::MAY_THROW;
        match self {
            O::Jmp => OpcodeFlags::JUMP,
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
            | O::JneObj => OpcodeFlags::JUMP | OpcodeFlags::CONDITIONAL,
            O::Return | O::ReturnWide | O::ReturnObj | O::ReturnVoid => OpcodeFlags::RETURN,
            O::Throw => OpcodeFlags::THROW | OpcodeFlags::MAY_THROW,
            O::CallShort
            | O::Call
            | O::CallRange
            | O::CallAcc
            | O::CallVirtShort
            | O::CallVirt
            | O::CallVirtRange
            | O::CallVirtAcc
            | O::InitObj
            | O::CallInterop => call,
            O::Div2
            | O::Div2Wide
            | O::Mod2
            | O::Mod2Wide
            | O::Divi
            | O::LdaStr
            | O::LdaType
            | O::LdaConst
            | O::Newarr
            | O::Lenarr
            | O::Ldarr
            | O::LdarrWide
            | O::FldarrWide
            | O::LdarrObj
            | O::Starr
            | O::StarrWide
            | O::FstarrWide
            | O::StarrObj
            | O::Newobj
            | O::Ldobj
            | O::LdobjWide
            | O::LdobjObj
            | O::Stobj
            | O::StobjWide
            | O::StobjObj
            | O::Ldstatic
            | O::LdstaticWide
            | O::LdstaticObj
            | O::Ststatic
            | O::StstaticWide
            | O::StstaticObj
            | O::Checkcast
            | O::Isinstance
            | O::MonitorEnter
            | O::MonitorExit => OpcodeFlags::MAY_THROW,
            _ => OpcodeFlags::empty(),
        }
    }

    /// The assembler mnemonic.
    #[must_use]
    pub fn mnemonic(self) -> &'static str {
        self.into()
    }

    /// Encoded size in bytes: one opcode byte plus the operands.
    #[must_use]
    pub fn size(self) -> u32 {
        1 + self.format().iter().map(|k| k.size()).sum::<u32>()
    }

    /// Returns `true` for conditional and unconditional jumps.
    #[must_use]
    pub fn is_jump(self) -> bool {
        self.flags().contains(OpcodeFlags::JUMP)
    }

    /// Returns `true` for conditional jumps.
    #[must_use]
    pub fn is_conditional(self) -> bool {
        self.flags().contains(OpcodeFlags::CONDITIONAL)
    }

    /// Returns `true` if control never falls through to the next instruction.
    #[must_use]
    pub fn is_terminator(self) -> bool {
        let flags = self.flags();
        flags.intersects(OpcodeFlags::RETURN | OpcodeFlags::THROW)
            || (flags.contains(OpcodeFlags::JUMP) && !flags.contains(OpcodeFlags::CONDITIONAL))
    }

    /// Returns `true` if a block must end after this instruction.
    #[must_use]
    pub fn ends_block(self) -> bool {
        self.flags()
            .intersects(OpcodeFlags::JUMP | OpcodeFlags::RETURN | OpcodeFlags::THROW)
    }

    /// Returns `true` if executing the instruction may raise an exception.
    #[must_use]
    pub fn may_throw(self) -> bool {
        self.flags().contains(OpcodeFlags::MAY_THROW)
    }
}

#[cfg(test)]
mod tests {
    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn test_sizes() {
        assert_eq!(Opcode::Nop.size(), 1);
        assert_eq!(Opcode::Lda.size(), 3);
        assert_eq!(Opcode::Jeq.size(), 7);
        assert_eq!(Opcode::Call.size(), 13);
        assert_eq!(Opcode::FmoviWide.size(), 11);
    }

    #[test]
    fn test_block_enders() {
        assert!(Opcode::Jmp.is_terminator());
        assert!(!Opcode::Jeqz.is_terminator());
        assert!(Opcode::Jeqz.ends_block());
        assert!(Opcode::Throw.is_terminator());
        assert!(Opcode::ReturnVoid.is_terminator());
        assert!(!Opcode::Add2.ends_block());
    }

    #[test]
    fn test_jumps_end_with_offset() {
        for opcode in Opcode::iter().filter(|o| o.is_jump()) {
            assert_eq!(
                opcode.format().last(),
                Some(&OperandKind::Offset),
                "{} must carry its offset last",
                opcode.mnemonic()
            );
        }
    }

    #[test]
    fn test_mnemonics_are_unique() {
        let mut seen = std::collections::HashSet::new();
        for opcode in Opcode::iter() {
            assert!(seen.insert(opcode.mnemonic()), "{}", opcode.mnemonic());
        }
        assert_eq!(seen.len(), Opcode::COUNT);
    }
}
