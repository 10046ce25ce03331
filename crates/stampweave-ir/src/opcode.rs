//! Instruction set
//!
//! A CLI-style stack instruction set, restricted to what straight-line
//! property accessors and constructors need. Every opcode declares the kind of
//! operand it takes; [`Instruction::create`] refuses anything else.

use crate::error::IrError;
use crate::signature::{FieldRef, MethodRef};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// Operation code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OpCode {
    Nop,
    Ldarg0,
    Ldarg1,
    Ldarg2,
    Ldarg3,
    LdargS,
    LdargaS,
    Ldnull,
    LdcI4,
    Ldstr,
    Ldfld,
    Ldflda,
    Stfld,
    Call,
    Callvirt,
    Newobj,
    Dup,
    Pop,
    Ret,
}

/// Kind of operand an opcode takes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperandKind {
    None,
    Arg,
    Int32,
    String,
    Field,
    Method,
}

impl OpCode {
    /// Operand kind this opcode requires
    #[must_use]
    pub const fn operand_kind(self) -> OperandKind {
        match self {
            Self::Nop
            | Self::Ldarg0
            | Self::Ldarg1
            | Self::Ldarg2
            | Self::Ldarg3
            | Self::Ldnull
            | Self::Dup
            | Self::Pop
            | Self::Ret => OperandKind::None,
            Self::LdargS | Self::LdargaS => OperandKind::Arg,
            Self::LdcI4 => OperandKind::Int32,
            Self::Ldstr => OperandKind::String,
            Self::Ldfld | Self::Ldflda | Self::Stfld => OperandKind::Field,
            Self::Call | Self::Callvirt | Self::Newobj => OperandKind::Method,
        }
    }

    /// Assembly mnemonic
    #[must_use]
    pub const fn mnemonic(self) -> &'static str {
        match self {
            Self::Nop => "nop",
            Self::Ldarg0 => "ldarg.0",
            Self::Ldarg1 => "ldarg.1",
            Self::Ldarg2 => "ldarg.2",
            Self::Ldarg3 => "ldarg.3",
            Self::LdargS => "ldarg.s",
            Self::LdargaS => "ldarga.s",
            Self::Ldnull => "ldnull",
            Self::LdcI4 => "ldc.i4",
            Self::Ldstr => "ldstr",
            Self::Ldfld => "ldfld",
            Self::Ldflda => "ldflda",
            Self::Stfld => "stfld",
            Self::Call => "call",
            Self::Callvirt => "callvirt",
            Self::Newobj => "newobj",
            Self::Dup => "dup",
            Self::Pop => "pop",
            Self::Ret => "ret",
        }
    }
}

impl Display for OpCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

/// Instruction operand
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operand {
    None,
    /// Argument slot (0 is the instance for instance methods)
    Arg(u16),
    Int32(i32),
    String(String),
    Field(FieldRef),
    Method(MethodRef),
}

impl Operand {
    /// Kind of this operand
    #[must_use]
    pub const fn kind(&self) -> OperandKind {
        match self {
            Self::None => OperandKind::None,
            Self::Arg(_) => OperandKind::Arg,
            Self::Int32(_) => OperandKind::Int32,
            Self::String(_) => OperandKind::String,
            Self::Field(_) => OperandKind::Field,
            Self::Method(_) => OperandKind::Method,
        }
    }
}

/// Single instruction
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Instruction {
    opcode: OpCode,
    operand: Operand,
}

impl Instruction {
    /// Create instruction, checking the operand kind
    ///
    /// # Errors
    /// Returns [`IrError::OperandMismatch`] if the operand does not fit the opcode
    pub fn create(opcode: OpCode, operand: Operand) -> Result<Self, IrError> {
        let expected = opcode.operand_kind();
        let actual = operand.kind();
        if expected != actual {
            return Err(IrError::OperandMismatch {
                opcode,
                expected,
                actual,
            });
        }
        Ok(Self { opcode, operand })
    }

    /// Re-check the operand kind (after deserialization)
    ///
    /// # Errors
    /// Returns [`IrError::OperandMismatch`] if the operand does not fit the opcode
    pub fn validate(&self) -> Result<(), IrError> {
        let expected = self.opcode.operand_kind();
        let actual = self.operand.kind();
        if expected == actual {
            Ok(())
        } else {
            Err(IrError::OperandMismatch {
                opcode: self.opcode,
                expected,
                actual,
            })
        }
    }

    #[inline]
    const fn bare(opcode: OpCode) -> Self {
        Self {
            opcode,
            operand: Operand::None,
        }
    }

    #[must_use]
    pub const fn nop() -> Self {
        Self::bare(OpCode::Nop)
    }

    #[must_use]
    pub const fn ret() -> Self {
        Self::bare(OpCode::Ret)
    }

    #[must_use]
    pub const fn dup() -> Self {
        Self::bare(OpCode::Dup)
    }

    #[must_use]
    pub const fn pop() -> Self {
        Self::bare(OpCode::Pop)
    }

    #[must_use]
    pub const fn ldnull() -> Self {
        Self::bare(OpCode::Ldnull)
    }

    /// Load argument, using the short form for slots 0..=3
    #[must_use]
    pub const fn ldarg(slot: u16) -> Self {
        match slot {
            0 => Self::bare(OpCode::Ldarg0),
            1 => Self::bare(OpCode::Ldarg1),
            2 => Self::bare(OpCode::Ldarg2),
            3 => Self::bare(OpCode::Ldarg3),
            n => Self {
                opcode: OpCode::LdargS,
                operand: Operand::Arg(n),
            },
        }
    }

    /// Load argument address
    #[must_use]
    pub const fn ldarga(slot: u16) -> Self {
        Self {
            opcode: OpCode::LdargaS,
            operand: Operand::Arg(slot),
        }
    }

    #[must_use]
    pub const fn ldc_i4(value: i32) -> Self {
        Self {
            opcode: OpCode::LdcI4,
            operand: Operand::Int32(value),
        }
    }

    #[must_use]
    pub fn ldstr(value: impl Into<String>) -> Self {
        Self {
            opcode: OpCode::Ldstr,
            operand: Operand::String(value.into()),
        }
    }

    #[must_use]
    pub fn ldfld(field: FieldRef) -> Self {
        Self {
            opcode: OpCode::Ldfld,
            operand: Operand::Field(field),
        }
    }

    #[must_use]
    pub fn ldflda(field: FieldRef) -> Self {
        Self {
            opcode: OpCode::Ldflda,
            operand: Operand::Field(field),
        }
    }

    #[must_use]
    pub fn stfld(field: FieldRef) -> Self {
        Self {
            opcode: OpCode::Stfld,
            operand: Operand::Field(field),
        }
    }

    #[must_use]
    pub fn call(method: MethodRef) -> Self {
        Self {
            opcode: OpCode::Call,
            operand: Operand::Method(method),
        }
    }

    #[must_use]
    pub fn callvirt(method: MethodRef) -> Self {
        Self {
            opcode: OpCode::Callvirt,
            operand: Operand::Method(method),
        }
    }

    #[must_use]
    pub fn newobj(ctor: MethodRef) -> Self {
        Self {
            opcode: OpCode::Newobj,
            operand: Operand::Method(ctor),
        }
    }

    #[inline]
    #[must_use]
    pub fn opcode(&self) -> OpCode {
        self.opcode
    }

    #[inline]
    #[must_use]
    pub fn operand(&self) -> &Operand {
        &self.operand
    }

    /// Field operand, if any
    #[must_use]
    pub fn field(&self) -> Option<&FieldRef> {
        match &self.operand {
            Operand::Field(f) => Some(f),
            _ => None,
        }
    }

    /// Method operand, if any
    #[must_use]
    pub fn method(&self) -> Option<&MethodRef> {
        match &self.operand {
            Operand::Method(m) => Some(m),
            _ => None,
        }
    }

    /// Whether this instruction stores into `field`
    #[must_use]
    pub fn stores(&self, field: &FieldRef) -> bool {
        self.opcode == OpCode::Stfld && self.field() == Some(field)
    }

    /// Stack slots popped and pushed
    #[must_use]
    pub fn stack_effect(&self) -> (usize, usize) {
        match self.opcode {
            OpCode::Nop | OpCode::Ret => (0, 0),
            OpCode::Ldarg0
            | OpCode::Ldarg1
            | OpCode::Ldarg2
            | OpCode::Ldarg3
            | OpCode::LdargS
            | OpCode::LdargaS
            | OpCode::Ldnull
            | OpCode::LdcI4
            | OpCode::Ldstr => (0, 1),
            OpCode::Ldfld | OpCode::Ldflda => (1, 1),
            OpCode::Stfld => (2, 0),
            OpCode::Dup => (1, 2),
            OpCode::Pop => (1, 0),
            OpCode::Call | OpCode::Callvirt => match self.method() {
                Some(m) => (m.arg_slots(), usize::from(m.returns_value())),
                None => (0, 0),
            },
            OpCode::Newobj => match self.method() {
                Some(m) => (m.params.len(), 1),
                None => (0, 1),
            },
        }
    }
}

impl Display for Instruction {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.operand {
            Operand::None => write!(f, "{}", self.opcode),
            Operand::Arg(n) => write!(f, "{} {n}", self.opcode),
            Operand::Int32(v) => write!(f, "{} {v}", self.opcode),
            Operand::String(s) => write!(f, "{} {s:?}", self.opcode),
            Operand::Field(field) => write!(f, "{} {field}", self.opcode),
            Operand::Method(method) => write!(f, "{} {method}", self.opcode),
        }
    }
}
