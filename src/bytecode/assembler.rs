//! A label-resolving assembler for method bodies.
//!
//! Instructions are appended in order and get their pc from the running
//! encoded size. Jumps and try regions refer to named labels which are
//! resolved when the method is finished.
//!
//! # Examples
//!
//! ```rust
//! use arkir::bytecode::{MethodAssembler, Opcode, Operand};
//! use arkir::ir::DataType;
//!
//! let mut asm = MethodAssembler::new(2, 1).with_signature(&[DataType::Int32], DataType::Int32);
//! asm.emit_ldai(0)?;
//! asm.emit_sta(0)?;
//! asm.label("loop")?;
//! asm.emit_lda(1)?;
//! asm.emit_branch(Opcode::Jeqz, &[], "exit")?;
//! asm.emit(Opcode::Inci, &[Operand::VReg(0), Operand::Imm(1)])?;
//! asm.emit_branch(Opcode::Jmp, &[], "loop")?;
//! asm.label("exit")?;
//! asm.emit_lda(0)?;
//! asm.emit(Opcode::Return, &[])?;
//!
//! let method = asm.finish()?;
//! assert_eq!(method.instructions.len(), 8);
//! # Ok::<(), arkir::Error>(())
//! ```

use std::collections::HashMap;

use crate::{
    bytecode::{BytecodeInstruction, CatchBlock, MethodBody, Opcode, Operand, TryBlock},
    ir::DataType,
    runtime::EntityId,
    Result,
};

struct PendingTry {
    start: String,
    end: String,
    catches: Vec<(Option<EntityId>, String)>,
}

/// Builds a [`MethodBody`] instruction by instruction.
pub struct MethodAssembler {
    id: EntityId,
    num_vregs: u16,
    num_args: u16,
    param_types: Vec<DataType>,
    return_type: DataType,
    uses_environment: bool,
    instructions: Vec<BytecodeInstruction>,
    labels: HashMap<String, u32>,
    /// (instruction index, label) pairs whose offset operand awaits the label
    fixups: Vec<(usize, String)>,
    try_blocks: Vec<PendingTry>,
    pc: u32,
}

impl MethodAssembler {
    /// Creates an assembler for a method with `num_vregs` frame registers, the
    /// last `num_args` of which are arguments. Arguments default to `i32`, the
    /// return type to `void`.
    #[must_use]
    pub fn new(num_vregs: u16, num_args: u16) -> Self {
        Self {
            id: EntityId::default(),
            num_vregs,
            num_args,
            param_types: vec![DataType::Int32; usize::from(num_args)],
            return_type: DataType::Void,
            uses_environment: false,
            instructions: Vec::new(),
            labels: HashMap::new(),
            fixups: Vec::new(),
            try_blocks: Vec::new(),
            pc: 0,
        }
    }

    /// Sets the method id.
    #[must_use]
    pub fn with_id(mut self, id: EntityId) -> Self {
        self.id = id;
        self
    }

    /// Sets the argument and return types.
    #[must_use]
    pub fn with_signature(mut self, params: &[DataType], return_type: DataType) -> Self {
        self.param_types = params.to_vec();
        self.return_type = return_type;
        self
    }

    /// Marks the method as carrying a lexical environment.
    #[must_use]
    pub fn with_environment(mut self) -> Self {
        self.uses_environment = true;
        self
    }

    /// The pc the next instruction will get.
    #[must_use]
    pub fn current_pc(&self) -> u32 {
        self.pc
    }

    /// Binds `name` to the current pc.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidBytecode`] if the label is already bound.
    pub fn label(&mut self, name: &str) -> Result<()> {
        if self.labels.insert(name.to_string(), self.pc).is_some() {
            return Err(invalid_bytecode!(Some(self.pc), "label '{}' bound twice", name));
        }
        Ok(())
    }

    /// Appends an instruction with explicit operands.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidBytecode`] if the operands do not match
    /// the opcode's format.
    pub fn emit(&mut self, opcode: Opcode, operands: &[Operand]) -> Result<()> {
        let inst = BytecodeInstruction::new(self.pc, opcode, operands.to_vec());
        inst.validate()?;
        self.pc = inst.next_pc();
        self.instructions.push(inst);
        Ok(())
    }

    /// Appends a jump to `label`. `operands` are the operands preceding the
    /// offset (the compared register for two-operand jumps).
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidBytecode`] if `opcode` is not a jump or
    /// the operands do not match its format.
    pub fn emit_branch(&mut self, opcode: Opcode, operands: &[Operand], label: &str) -> Result<()> {
        if !opcode.is_jump() {
            return Err(invalid_bytecode!(
                Some(self.pc),
                "{} is not a jump",
                opcode.mnemonic()
            ));
        }
        let mut all = operands.to_vec();
        all.push(Operand::Offset(0));
        self.fixups.push((self.instructions.len(), label.to_string()));
        self.emit(opcode, &all)
    }

    /// `lda v`
    ///
    /// # Errors
    ///
    /// Never fails for well-formed operands; see [`Self::emit`].
    pub fn emit_lda(&mut self, vreg: u16) -> Result<()> {
        self.emit(Opcode::Lda, &[Operand::VReg(vreg)])
    }

    /// `sta v`
    ///
    /// # Errors
    ///
    /// See [`Self::emit`].
    pub fn emit_sta(&mut self, vreg: u16) -> Result<()> {
        self.emit(Opcode::Sta, &[Operand::VReg(vreg)])
    }

    /// `ldai imm`
    ///
    /// # Errors
    ///
    /// See [`Self::emit`].
    pub fn emit_ldai(&mut self, value: i64) -> Result<()> {
        self.emit(Opcode::Ldai, &[Operand::Imm(value)])
    }

    /// `movi v, imm`
    ///
    /// # Errors
    ///
    /// See [`Self::emit`].
    pub fn emit_movi(&mut self, vreg: u16, value: i64) -> Result<()> {
        self.emit(Opcode::Movi, &[Operand::VReg(vreg), Operand::Imm(value)])
    }

    /// Declares a try region from label `start` up to label `end`, with
    /// `(type, handler label)` pairs in declaration order.
    pub fn try_block(&mut self, start: &str, end: &str, catches: &[(Option<EntityId>, &str)]) {
        self.try_blocks.push(PendingTry {
            start: start.to_string(),
            end: end.to_string(),
            catches: catches
                .iter()
                .map(|(ty, handler)| (*ty, (*handler).to_string()))
                .collect(),
        });
    }

    fn resolve(&self, label: &str) -> Result<u32> {
        self.labels
            .get(label)
            .copied()
            .ok_or_else(|| invalid_bytecode!(None, "undefined label '{}'", label))
    }

    /// Resolves every label and produces the method body.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidBytecode`] for an undefined label.
    pub fn finish(mut self) -> Result<MethodBody> {
        let fixups = std::mem::take(&mut self.fixups);
        for (index, label) in fixups {
            let target = self.resolve(&label)?;
            let inst = &mut self.instructions[index];
            let offset = i64::from(target) - i64::from(inst.pc);
            let offset = i32::try_from(offset).map_err(|_| {
                invalid_bytecode!(Some(inst.pc), "jump to '{}' out of range", label)
            })?;
            if let Some(last) = inst.operands.last_mut() {
                *last = Operand::Offset(offset);
            }
        }

        let mut try_blocks = Vec::with_capacity(self.try_blocks.len());
        for pending in &self.try_blocks {
            let mut catches = Vec::with_capacity(pending.catches.len());
            for (type_id, handler) in &pending.catches {
                catches.push(CatchBlock {
                    type_id: *type_id,
                    handler_pc: self.resolve(handler)?,
                });
            }
            try_blocks.push(TryBlock {
                start_pc: self.resolve(&pending.start)?,
                end_pc: self.resolve(&pending.end)?,
                catches,
            });
        }

        Ok(MethodBody {
            id: self.id,
            instructions: self.instructions,
            num_vregs: self.num_vregs,
            num_args: self.num_args,
            param_types: self.param_types,
            return_type: self.return_type,
            try_blocks,
            uses_environment: self.uses_environment,
        })
    }
}
