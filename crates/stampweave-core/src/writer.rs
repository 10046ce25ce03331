//! Backup and atomic replacement of the artifact

use crate::error::{Result, WeaveError};
use serde::Serialize;
use stampweave_ir::{module_to_bytes, symbols_path, symbols_to_bytes, ContentHash, Module};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// `<path>.bak`
#[must_use]
pub fn backup_path(path: &Path) -> PathBuf {
    let mut file = path.as_os_str().to_owned();
    file.push(".bak");
    PathBuf::from(file)
}

/// What [`ArtifactWriter::write`] left on disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WriteOutcome {
    pub path: PathBuf,
    pub backup: PathBuf,
    /// Hash of the bytes now stored at `path`
    pub hash: ContentHash,
    /// Rewritten symbol companion, if any
    pub symbols: Option<PathBuf>,
    /// Copy of the symbol companion as it was before the write
    pub symbols_backup: Option<PathBuf>,
}

/// Stores a rewritten module over its original
#[derive(Debug, Clone, Copy, Default)]
pub struct ArtifactWriter {
    with_symbols: bool,
}

impl ArtifactWriter {
    #[must_use]
    pub fn new(with_symbols: bool) -> Self {
        Self { with_symbols }
    }

    /// Back up `path`, then replace it (and its symbols) with `module`
    ///
    /// The module is encoded before anything on disk changes. Existing
    /// symbols are backed up beside the artifact's backup, and both
    /// replacements are staged before either is renamed into place. A stale
    /// backup is overwritten.
    ///
    /// # Errors
    /// - [`WeaveError::Encode`] if encoding fails; nothing was touched
    /// - [`WeaveError::BackupFailed`] if a copy fails; the artifact is untouched
    /// - [`WeaveError::WriteFailed`] if the replacement fails; the backups exist
    pub fn write(&self, path: &Path, module: &Module) -> Result<WriteOutcome> {
        let bytes = module_to_bytes(module).map_err(WeaveError::Encode)?;
        let symbols = if self.with_symbols {
            Some(symbols_to_bytes(module).map_err(WeaveError::Encode)?)
        } else {
            None
        };
        let sym_path = symbols_path(path);

        let backup = backup_path(path);
        Self::backup(path, &backup)?;
        tracing::debug!(backup = %backup.display(), "backed up artifact");
        let symbols_backup = if symbols.is_some() && sym_path.is_file() {
            let sym_backup = backup_path(&sym_path);
            Self::backup(&sym_path, &sym_backup)?;
            Some(sym_backup)
        } else {
            None
        };

        let staged = stage(path, &bytes)?;
        let staged_symbols = symbols
            .as_deref()
            .map(|symbol_bytes| stage(&sym_path, symbol_bytes))
            .transpose()?;
        commit(staged, path)?;
        let symbols = match staged_symbols {
            Some(tmp) => {
                commit(tmp, &sym_path)?;
                Some(sym_path)
            }
            None => None,
        };

        let hash = ContentHash::compute(&bytes);
        tracing::info!(
            path = %path.display(),
            hash = %hash.short(),
            bytes = bytes.len(),
            "wrote rewritten artifact"
        );
        Ok(WriteOutcome {
            path: path.to_path_buf(),
            backup,
            hash,
            symbols,
            symbols_backup,
        })
    }

    fn backup(path: &Path, backup: &Path) -> Result<()> {
        let failed = |source: std::io::Error| WeaveError::BackupFailed {
            path: backup.to_path_buf(),
            source,
        };
        if backup.exists() {
            fs::remove_file(backup).map_err(failed)?;
        }
        fs::copy(path, backup).map_err(failed)?;
        Ok(())
    }
}

fn write_failed(path: &Path) -> impl Fn(std::io::Error) -> WeaveError + '_ {
    move |source| WeaveError::WriteFailed {
        path: path.to_path_buf(),
        source,
    }
}

/// Write `bytes` to a synced temporary file beside `path`
fn stage(path: &Path, bytes: &[u8]) -> Result<NamedTempFile> {
    let failed = write_failed(path);
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let mut tmp = NamedTempFile::new_in(dir).map_err(&failed)?;
    tmp.write_all(bytes).map_err(&failed)?;
    tmp.as_file().sync_all().map_err(&failed)?;
    if let Ok(metadata) = fs::metadata(path) {
        tmp.as_file().set_permissions(metadata.permissions()).map_err(&failed)?;
    }
    Ok(tmp)
}

/// Rename a staged file over `path`
fn commit(tmp: NamedTempFile, path: &Path) -> Result<()> {
    tmp.persist(path).map_err(|e| write_failed(path)(e.error))?;
    Ok(())
}
