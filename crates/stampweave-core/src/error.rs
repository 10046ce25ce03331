//! Error types for the weaving engine
//!
//! Every failure aborts the whole run. [`WeaveError::category`] maps each
//! variant onto the small set of categories reported to callers.

use serde::Serialize;
use stampweave_ir::{CodecError, FullName, IrError, TypeSig};
use std::fmt;
use std::path::PathBuf;

/// Main engine error type
#[derive(Debug, thiserror::Error)]
pub enum WeaveError {
    /// A flagged property does not have the timestamp type
    #[error("property {type_name}::{property} is flagged for serialization but has type {actual}, expected {expected}")]
    TypeMismatch {
        type_name: FullName,
        property: String,
        actual: TypeSig,
        expected: FullName,
    },

    /// A library, type or member the rewrite depends on cannot be found
    #[error("cannot resolve {what}: {reason}")]
    Unresolvable { what: String, reason: String },

    /// The backup copy could not be made; the artifact is untouched
    #[error("backing up {} failed: {source}", path.display())]
    BackupFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The rewritten artifact could not be stored; the backup exists
    #[error("writing {} failed: {source}", path.display())]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The rewritten module could not be encoded
    #[error("encoding the rewritten module failed: {0}")]
    Encode(#[source] CodecError),

    /// The artifact could not be read or decoded
    #[error("loading {} failed: {source}", path.display())]
    Load {
        path: PathBuf,
        #[source]
        source: CodecError,
    },

    /// The module graph rejected an edit
    #[error("invalid module structure: {0}")]
    Structure(#[from] IrError),

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(String),
}

/// Failure category reported alongside the boolean outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCategory {
    TypeMismatch,
    UnresolvableDependency,
    BackupFailure,
    WriteFailure,
    Load,
    Config,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::TypeMismatch => "type-mismatch",
            Self::UnresolvableDependency => "unresolvable-dependency",
            Self::BackupFailure => "backup-failure",
            Self::WriteFailure => "write-failure",
            Self::Load => "load",
            Self::Config => "config",
        })
    }
}

impl WeaveError {
    /// Category of this error
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::TypeMismatch { .. } => ErrorCategory::TypeMismatch,
            Self::Unresolvable { .. } => ErrorCategory::UnresolvableDependency,
            Self::BackupFailed { .. } => ErrorCategory::BackupFailure,
            Self::WriteFailed { .. } | Self::Encode(_) => ErrorCategory::WriteFailure,
            Self::Load { .. } | Self::Structure(_) => ErrorCategory::Load,
            Self::Config(_) => ErrorCategory::Config,
        }
    }

    /// Create an unresolvable-dependency error
    #[inline]
    pub fn unresolvable(what: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Unresolvable {
            what: what.into(),
            reason: reason.into(),
        }
    }

    /// Whether the artifact on disk is guaranteed unchanged
    #[inline]
    #[must_use]
    pub fn artifact_untouched(&self) -> bool {
        !matches!(self, Self::WriteFailed { .. })
    }
}

/// Result alias for engine operations
pub type Result<T> = std::result::Result<T, WeaveError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories() {
        let err = WeaveError::unresolvable("SQLite.IgnoreAttribute::.ctor()", "not found");
        assert_eq!(err.category(), ErrorCategory::UnresolvableDependency);
        assert_eq!(err.category().to_string(), "unresolvable-dependency");

        let err = WeaveError::WriteFailed {
            path: PathBuf::from("a.cmod"),
            source: std::io::Error::other("disk full"),
        };
        assert_eq!(err.category(), ErrorCategory::WriteFailure);
        assert!(!err.artifact_untouched());
    }

    #[test]
    fn category_serializes_kebab_case() {
        let json = serde_json::to_string(&ErrorCategory::TypeMismatch).unwrap();
        assert_eq!(json, "\"type-mismatch\"");
    }
}
