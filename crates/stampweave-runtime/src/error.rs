//! Error types for timestamp conversion and evaluation

use stampweave_ir::FullName;

/// Errors formatting or parsing a timestamp
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConversionError {
    #[error("invalid format pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("input ended at {position}, expected {expected}")]
    UnexpectedEnd { position: usize, expected: String },

    #[error("mismatch at {position}: expected {expected}")]
    Mismatch { position: usize, expected: String },

    #[error("unparsed trailing input at {0}")]
    TrailingInput(usize),

    #[error("{0} is out of range")]
    OutOfRange(&'static str),

    #[error("conflicting values for {0}")]
    Conflict(&'static str),

    #[error("day of week does not match the date")]
    DayOfWeekMismatch,
}

/// Errors executing a method body
#[derive(Debug, thiserror::Error)]
pub enum EvalError {
    #[error("unknown type {0}")]
    UnknownType(FullName),

    #[error("no method {0}")]
    UnknownMethod(String),

    #[error("type {type_name} has no property {property}")]
    UnknownProperty { type_name: FullName, property: String },

    #[error("property {0} has no {1} accessor")]
    NoAccessor(String, &'static str),

    #[error("evaluation stack underflow in {0}")]
    StackUnderflow(String),

    #[error("argument slot {0} out of range")]
    BadArgument(u16),

    #[error("expected {expected}, found {found}")]
    TypeMismatch { expected: &'static str, found: String },

    #[error("null reference")]
    NullReference,

    #[error("call depth limit of {0} exceeded")]
    DepthExceeded(usize),

    #[error(transparent)]
    Conversion(#[from] ConversionError),
}
