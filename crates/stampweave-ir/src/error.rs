//! Error types for the IR and its on-disk codec

use crate::name::{FullName, NameError};
use crate::opcode::{OpCode, OperandKind};
use std::path::PathBuf;

/// Structural errors in the module graph
#[derive(Debug, thiserror::Error)]
pub enum IrError {
    #[error("{opcode} expects a {expected:?} operand, got {actual:?}")]
    OperandMismatch {
        opcode: OpCode,
        expected: OperandKind,
        actual: OperandKind,
    },

    #[error("instruction index {index} out of range (body has {len})")]
    InstructionOutOfRange { index: usize, len: usize },

    #[error("type {type_name} already declares a member named {member}")]
    DuplicateMember { type_name: FullName, member: String },

    #[error("type {0} is declared twice")]
    DuplicateType(FullName),

    #[error("type {type_name} declares no property {property}")]
    MissingProperty { type_name: FullName, property: String },

    #[error("property {property} refers to missing accessor {accessor}")]
    MissingAccessor { property: String, accessor: String },

    #[error(transparent)]
    Name(#[from] NameError),
}

/// Errors reading or writing module and symbol files
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("i/o error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("not a {expected} file (bad magic)")]
    BadMagic { expected: &'static str },

    #[error("file is truncated")]
    Truncated,

    #[error("unsupported format version {0}")]
    UnsupportedVersion(u16),

    #[error("encode error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    #[error("decode error: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    #[error("invalid module: {0}")]
    Invalid(#[from] IrError),
}

impl CodecError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
