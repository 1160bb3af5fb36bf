//! Decoded bytecode instructions.

use std::fmt;

use crate::{
    bytecode::{Opcode, OperandKind},
    runtime::EntityId,
    Result,
};

/// One decoded operand.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Operand {
    /// Virtual register index
    VReg(u16),
    /// Integer immediate
    Imm(i64),
    /// Floating-point immediate
    FImm(f64),
    /// Entity id
    Id(EntityId),
    /// Branch offset relative to the instruction's pc
    Offset(i32),
}

impl Operand {
    /// The kind this operand encodes as.
    #[must_use]
    pub const fn kind(&self) -> OperandKind {
        match self {
            Operand::VReg(_) => OperandKind::VReg,
            Operand::Imm(_) => OperandKind::Imm,
            Operand::FImm(_) => OperandKind::FImm,
            Operand::Id(_) => OperandKind::Id,
            Operand::Offset(_) => OperandKind::Offset,
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::VReg(v) => write!(f, "v{v}"),
            Operand::Imm(i) => write!(f, "{i}"),
            Operand::FImm(x) => write!(f, "{x:?}"),
            Operand::Id(id) => write!(f, "{id}"),
            Operand::Offset(o) => write!(f, "{o:+}"),
        }
    }
}

/// A decoded instruction at a known pc.
#[derive(Debug, Clone, PartialEq)]
pub struct BytecodeInstruction {
    /// Byte offset of the instruction in the method body
    pub pc: u32,
    /// The opcode
    pub opcode: Opcode,
    /// Operands in encoding order
    pub operands: Vec<Operand>,
}

impl BytecodeInstruction {
    /// Creates an instruction.
    #[must_use]
    pub fn new(pc: u32, opcode: Opcode, operands: Vec<Operand>) -> Self {
        Self {
            pc,
            opcode,
            operands,
        }
    }

    /// Encoded size in bytes.
    #[must_use]
    pub fn size(&self) -> u32 {
        self.opcode.size()
    }

    /// The pc of the textually next instruction.
    #[must_use]
    pub fn next_pc(&self) -> u32 {
        self.pc + self.size()
    }

    /// Checks the operands against the opcode's format.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidBytecode`] on a count or kind mismatch.
    pub fn validate(&self) -> Result<()> {
        let format = self.opcode.format();
        if format.len() != self.operands.len() {
            return Err(invalid_bytecode!(
                Some(self.pc),
                "{} takes {} operands, found {}",
                self.opcode.mnemonic(),
                format.len(),
                self.operands.len()
            ));
        }
        for (i, (kind, operand)) in format.iter().zip(&self.operands).enumerate() {
            if *kind != operand.kind() {
                return Err(invalid_bytecode!(
                    Some(self.pc),
                    "operand {} of {} must be {:?}, found {:?}",
                    i,
                    self.opcode.mnemonic(),
                    kind,
                    operand.kind()
                ));
            }
        }
        Ok(())
    }

    fn operand(&self, index: usize) -> Result<Operand> {
        self.operands.get(index).copied().ok_or_else(|| {
            invalid_bytecode!(
                Some(self.pc),
                "{} has no operand {}",
                self.opcode.mnemonic(),
                index
            )
        })
    }

    fn mismatch(&self, index: usize, expected: &str) -> crate::Error {
        invalid_bytecode!(
            Some(self.pc),
            "operand {} of {} is not {}",
            index,
            self.opcode.mnemonic(),
            expected
        )
    }

    /// Returns operand `index` as a register.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidBytecode`] if it is missing or of another kind.
    pub fn vreg(&self, index: usize) -> Result<u16> {
        match self.operand(index)? {
            Operand::VReg(v) => Ok(v),
            _ => Err(self.mismatch(index, "a register")),
        }
    }

    /// Returns operand `index` as an integer immediate.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidBytecode`] if it is missing or of another kind.
    pub fn imm(&self, index: usize) -> Result<i64> {
        match self.operand(index)? {
            Operand::Imm(i) => Ok(i),
            _ => Err(self.mismatch(index, "an immediate")),
        }
    }

    /// Returns operand `index` as a floating-point immediate.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidBytecode`] if it is missing or of another kind.
    pub fn fimm(&self, index: usize) -> Result<f64> {
        match self.operand(index)? {
            Operand::FImm(x) => Ok(x),
            _ => Err(self.mismatch(index, "a float immediate")),
        }
    }

    /// Returns operand `index` as an entity id.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidBytecode`] if it is missing or of another kind.
    pub fn id(&self, index: usize) -> Result<EntityId> {
        match self.operand(index)? {
            Operand::Id(id) => Ok(id),
            _ => Err(self.mismatch(index, "an id")),
        }
    }

    /// Returns the absolute target of a jump, `None` for other opcodes.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidBytecode`] if the offset leaves the
    /// addressable range.
    pub fn jump_target(&self) -> Result<Option<u32>> {
        if !self.opcode.is_jump() {
            return Ok(None);
        }
        let index = self.operands.len().saturating_sub(1);
        let Operand::Offset(offset) = self.operand(index)? else {
            return Err(self.mismatch(index, "an offset"));
        };
        let target = i64::from(self.pc) + i64::from(offset);
        u32::try_from(target)
            .map(Some)
            .map_err(|_| invalid_bytecode!(Some(self.pc), "jump target {} out of range", target))
    }
}

impl fmt::Display for BytecodeInstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}: {}", self.pc, self.opcode.mnemonic())?;
        for (i, operand) in self.operands.iter().enumerate() {
            write!(f, "{}{operand}", if i == 0 { " " } else { ", " })?;
        }
        Ok(())
    }
}
