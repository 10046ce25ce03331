//! Stampweave intermediate representation
//!
//! A mutable, in-memory model of a compiled module: types, members, custom
//! attributes and stack-machine instruction bodies, plus the on-disk codec
//! that loads and stores it.
//!
//! # Core Concepts
//!
//! - [`Module`]: types in declaration order, referenced libraries, imports
//! - [`TypeDef`]: fields, properties, methods and attributes of one type
//! - [`FieldRef`] / [`MethodRef`]: name-based member references
//! - [`BodyEditor`]: the only way instruction streams are changed
//! - [`read_module`] / [`module_to_bytes`]: the artifact codec
//!
//! # Example
//!
//! ```rust,ignore
//! use stampweave_ir::{read_module, ReadOptions};
//!
//! let loaded = read_module(path, &ReadOptions::default())?;
//! for ty in &loaded.module.types {
//!     println!("{} ({} properties)", ty.name, ty.properties.len());
//! }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod attribute;
mod body;
mod codec;
mod error;
mod hash;
mod module;
mod name;
mod opcode;
mod signature;

pub use attribute::{AttrArg, AttributeList, CustomAttribute};
pub use body::{BodyEditor, MethodBody, SequencePoint};
pub use codec::{
    apply_symbols, collect_symbols, module_from_bytes, module_to_bytes, read_module,
    symbols_from_bytes, symbols_path, symbols_to_bytes, write_module, LoadedModule, ReadOptions,
    SymbolTable, FORMAT_VERSION, MODULE_EXTENSION, MODULE_MAGIC, SYMBOLS_EXTENSION,
    SYMBOLS_MAGIC,
};
pub use error::{CodecError, IrError};
pub use hash::{ContentHash, HashError};
pub use module::{
    backing_field_name, Access, FieldDef, MethodDef, MethodFlags, Module, Param, PropertyDef,
    TypeDef,
};
pub use name::{FullName, NameError};
pub use opcode::{Instruction, OpCode, Operand, OperandKind};
pub use signature::{FieldRef, MethodRef, TypeSig};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod integration_tests {
    use super::*;

    #[test]
    fn build_encode_decode_module() {
        let mut ty = TypeDef::class("Models.Item".parse().unwrap());
        let field = ty
            .add_field(FieldDef::private(backing_field_name("Name"), TypeSig::String))
            .unwrap();
        let mut getter = MethodDef::new("get_Name", MethodFlags::accessor(), TypeSig::String);
        getter
            .body
            .get_or_insert_with(MethodBody::default)
            .editor()
            .emit(Instruction::ldarg(0))
            .emit(Instruction::ldfld(field))
            .emit(Instruction::ret());
        ty.add_method(getter).unwrap();
        ty.add_property(
            PropertyDef::new("Name", TypeSig::String).with_accessors(Some("get_Name".into()), None),
        )
        .unwrap();

        let mut module = Module::new("Models");
        module.add_type(ty).unwrap();

        let bytes = module_to_bytes(&module).unwrap();
        let decoded = module_from_bytes(&bytes).unwrap();
        assert_eq!(decoded, module);
        assert_eq!(decoded.types[0].method("get_Name").unwrap().body.as_ref().unwrap().max_stack, 1);
    }

    #[test]
    fn hash_fingerprints_encoding() {
        let module = Module::new("Empty");
        let bytes = module_to_bytes(&module).unwrap();
        assert_eq!(ContentHash::compute(&bytes), ContentHash::compute(&module_to_bytes(&module).unwrap()));
    }
}
