//! On-disk encoding of modules and their debugging-symbol companions
//!
//! Both files share the same framing: a 4-byte magic, a little-endian `u16`
//! format version, then a MessagePack body. Struct fields and maps are
//! emitted in a fixed order, so equal modules encode to equal bytes.

use crate::body::SequencePoint;
use crate::error::CodecError;
use crate::hash::ContentHash;
use crate::module::Module;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Magic prefix of module files
pub const MODULE_MAGIC: &[u8; 4] = b"SWMD";
/// Magic prefix of symbol files
pub const SYMBOLS_MAGIC: &[u8; 4] = b"SWSY";
/// Current format version of both files
pub const FORMAT_VERSION: u16 = 1;
/// Extension of module files
pub const MODULE_EXTENSION: &str = "cmod";
/// Extension of symbol companion files
pub const SYMBOLS_EXTENSION: &str = "csym";

const HEADER_LEN: usize = 6;

/// Sequence points per method, keyed by `Type::Method(Params)`
pub type SymbolTable = BTreeMap<String, Vec<SequencePoint>>;

/// Path of the symbol companion for a module path
#[must_use]
pub fn symbols_path(module_path: &Path) -> PathBuf {
    module_path.with_extension(SYMBOLS_EXTENSION)
}

fn encode<T: Serialize>(magic: &[u8; 4], value: &T) -> Result<Vec<u8>, CodecError> {
    let mut bytes = Vec::with_capacity(256);
    bytes.extend_from_slice(magic);
    bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    bytes.extend(rmp_serde::to_vec_named(value)?);
    Ok(bytes)
}

fn decode<T: DeserializeOwned>(
    magic: &'static [u8; 4],
    expected: &'static str,
    bytes: &[u8],
) -> Result<T, CodecError> {
    if bytes.len() < HEADER_LEN {
        return Err(CodecError::Truncated);
    }
    if &bytes[..4] != magic {
        return Err(CodecError::BadMagic { expected });
    }
    let version = u16::from_le_bytes([bytes[4], bytes[5]]);
    if version != FORMAT_VERSION {
        return Err(CodecError::UnsupportedVersion(version));
    }
    Ok(rmp_serde::from_slice(&bytes[HEADER_LEN..])?)
}

/// Encode a module (without sequence points)
///
/// # Errors
/// Returns [`CodecError::Encode`] if serialization fails
pub fn module_to_bytes(module: &Module) -> Result<Vec<u8>, CodecError> {
    encode(MODULE_MAGIC, module)
}

/// Decode and validate a module
///
/// # Errors
/// Returns a framing, decode or validation error
pub fn module_from_bytes(bytes: &[u8]) -> Result<Module, CodecError> {
    let module: Module = decode(MODULE_MAGIC, "module", bytes)?;
    module.validate()?;
    Ok(module)
}

/// Collect every body's sequence points
#[must_use]
pub fn collect_symbols(module: &Module) -> SymbolTable {
    let mut table = SymbolTable::new();
    for ty in &module.types {
        for method in &ty.methods {
            let Some(body) = &method.body else { continue };
            if body.sequence_points.is_empty() {
                continue;
            }
            let key = method.reference(&ty.name).signature_key();
            table.insert(key, body.sequence_points.clone());
        }
    }
    table
}

/// Encode the symbol companion of a module
///
/// # Errors
/// Returns [`CodecError::Encode`] if serialization fails
pub fn symbols_to_bytes(module: &Module) -> Result<Vec<u8>, CodecError> {
    encode(SYMBOLS_MAGIC, &collect_symbols(module))
}

/// Decode a symbol companion
///
/// # Errors
/// Returns a framing or decode error
pub fn symbols_from_bytes(bytes: &[u8]) -> Result<SymbolTable, CodecError> {
    decode(SYMBOLS_MAGIC, "symbols", bytes)
}

/// Attach sequence points to the bodies they describe
///
/// Returns the number of methods that received points; entries naming
/// methods the module does not declare are ignored.
pub fn apply_symbols(module: &mut Module, mut table: SymbolTable) -> usize {
    let mut applied = 0;
    for ty in &mut module.types {
        let owner = ty.name.clone();
        for method in &mut ty.methods {
            let key = method.reference(&owner).signature_key();
            if let (Some(body), Some(points)) = (method.body.as_mut(), table.remove(&key)) {
                body.sequence_points = points;
                applied += 1;
            }
        }
    }
    applied
}

/// Options for [`read_module`]
#[derive(Debug, Clone, Copy)]
pub struct ReadOptions {
    /// Load the symbol companion if one exists
    pub read_symbols: bool,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self { read_symbols: true }
    }
}

/// Module loaded from disk
#[derive(Debug, Clone)]
pub struct LoadedModule {
    pub module: Module,
    pub path: PathBuf,
    /// Hash of the module file bytes as read
    pub hash: ContentHash,
    /// Whether a symbol companion was loaded (and must be rewritten)
    pub has_symbols: bool,
}

/// Read a module and, optionally, its symbol companion
///
/// # Errors
/// Returns [`CodecError::Io`] if a file cannot be read, or a decode error
pub fn read_module(path: &Path, options: &ReadOptions) -> Result<LoadedModule, CodecError> {
    let bytes = fs::read(path).map_err(|e| CodecError::io(path, e))?;
    let hash = ContentHash::compute(&bytes);
    let mut module = module_from_bytes(&bytes)?;

    let mut has_symbols = false;
    if options.read_symbols {
        let sym_path = symbols_path(path);
        if sym_path.exists() {
            let sym_bytes = fs::read(&sym_path).map_err(|e| CodecError::io(&sym_path, e))?;
            apply_symbols(&mut module, symbols_from_bytes(&sym_bytes)?);
            has_symbols = true;
        }
    }

    Ok(LoadedModule {
        module,
        path: path.to_path_buf(),
        hash,
        has_symbols,
    })
}

/// Write a module (and its symbols when `with_symbols`) in place
///
/// Plain, non-atomic write used to lay out inputs.
///
/// # Errors
/// Returns [`CodecError::Io`] or [`CodecError::Encode`]
pub fn write_module(path: &Path, module: &Module, with_symbols: bool) -> Result<(), CodecError> {
    fs::write(path, module_to_bytes(module)?).map_err(|e| CodecError::io(path, e))?;
    if with_symbols {
        let sym_path = symbols_path(path);
        fs::write(&sym_path, symbols_to_bytes(module)?).map_err(|e| CodecError::io(&sym_path, e))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::MethodBody;
    use crate::module::{MethodDef, MethodFlags, TypeDef};
    use crate::opcode::Instruction;
    use crate::signature::TypeSig;
    use pretty_assertions::assert_eq;

    fn sample() -> Module {
        let mut ty = TypeDef::class("Models.Item".parse().unwrap());
        let mut body = MethodBody::from_instructions(vec![Instruction::ldnull(), Instruction::ret()]);
        body.sequence_points.push(SequencePoint {
            offset: 0,
            document: "Item.cs".into(),
            line: 7,
            column: 5,
        });
        ty.add_method(
            MethodDef::new("get_Name", MethodFlags::accessor(), TypeSig::String).with_body(body),
        )
        .unwrap();
        let mut module = Module::new("Models");
        module.add_type(ty).unwrap();
        module
    }

    #[test]
    fn encoding_is_deterministic() {
        let a = module_to_bytes(&sample()).unwrap();
        let b = module_to_bytes(&sample()).unwrap();
        assert_eq!(a, b);
        assert_eq!(&a[..4], MODULE_MAGIC);
    }

    #[test]
    fn module_bytes_exclude_sequence_points() {
        let decoded = module_from_bytes(&module_to_bytes(&sample()).unwrap()).unwrap();
        let body = decoded.types[0].methods[0].body.as_ref().unwrap();
        assert!(body.sequence_points.is_empty());
        assert_eq!(body.instructions.len(), 2);
    }

    #[test]
    fn rejects_foreign_and_short_input() {
        assert!(matches!(module_from_bytes(b"SW"), Err(CodecError::Truncated)));
        let mut bytes = module_to_bytes(&sample()).unwrap();
        bytes[0] = b'X';
        assert!(matches!(
            module_from_bytes(&bytes),
            Err(CodecError::BadMagic { expected: "module" })
        ));
    }

    #[test]
    fn rejects_unknown_version() {
        let mut bytes = module_to_bytes(&sample()).unwrap();
        bytes[4] = 9;
        assert!(matches!(
            module_from_bytes(&bytes),
            Err(CodecError::UnsupportedVersion(9))
        ));
    }

    #[test]
    fn read_module_restores_symbols() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Models.cmod");
        write_module(&path, &sample(), true).unwrap();
        assert!(symbols_path(&path).exists());

        let loaded = read_module(&path, &ReadOptions::default()).unwrap();
        assert!(loaded.has_symbols);
        assert_eq!(loaded.module, sample());
        assert_eq!(loaded.hash, ContentHash::compute(&fs::read(&path).unwrap()));

        let bare = read_module(&path, &ReadOptions { read_symbols: false }).unwrap();
        assert!(!bare.has_symbols);
    }

    #[test]
    fn read_missing_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_module(&dir.path().join("nope.cmod"), &ReadOptions::default()).unwrap_err();
        assert!(matches!(err, CodecError::Io { .. }));
    }
}
