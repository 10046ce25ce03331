//! Testing utilities for the stampweave workspace
//!
//! Shared fixtures: the referenced libraries a data-model module links
//! against, a builder for auto-property model types, the sample `TestItem`
//! model and an on-disk layout helper.

#![allow(missing_docs)]
#![allow(clippy::missing_panics_doc)]

use stampweave_ir::{
    backing_field_name, write_module, AttrArg, CustomAttribute, FieldDef, FullName, Instruction,
    MethodBody, MethodDef, MethodFlags, MethodRef, Module, PropertyDef, SequencePoint, TypeDef,
    TypeSig, MODULE_EXTENSION,
};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const RUNTIME_LIBRARY: &str = "System.Runtime";
pub const PERSISTENCE_LIBRARY: &str = "SQLite.Net";
pub const MARKER_LIBRARY: &str = "SQLite.Net.DateTimeOffset.Attributes";
pub const MODELS_MODULE: &str = "SQLite.Net.DateTimeOffset.Test";
pub const TEST_ITEM: &str = "SQLite.Net.DateTimeOffset.Test.Models.TestItem";

pub const MARKER_ATTRIBUTE: &str = "SQLite.Net.DateTimeOffset.Attributes.DateTimeOffsetSerializeAttribute";
pub const TIMESTAMP_TYPE: &str = "System.DateTimeOffset";
pub const FORMAT_PROVIDER_TYPE: &str = "System.IFormatProvider";
pub const CULTURE_TYPE: &str = "System.Globalization.CultureInfo";

/// Value every fixture constructor stores into timestamp properties
pub const INITIAL_VALUE: &str = "2024-03-05T14:07:09.0000000+05:00";
/// Pattern [`INITIAL_VALUE`] is written in
pub const INITIAL_PATTERN: &str = "o";

/// Parse a fully-qualified name
#[must_use]
pub fn name(full: &str) -> FullName {
    full.parse().expect("fixture names are valid")
}

#[must_use]
pub fn timestamp_sig() -> TypeSig {
    TypeSig::value(name(TIMESTAMP_TYPE))
}

fn ctor_ref(declaring: &str, params: Vec<TypeSig>, scope: &str) -> MethodRef {
    MethodRef {
        declaring_type: name(declaring),
        name: MethodDef::CONSTRUCTOR.to_string(),
        has_this: true,
        params,
        return_type: TypeSig::Void,
        scope: Some(scope.to_string()),
    }
}

fn instance_ctor() -> MethodFlags {
    MethodFlags {
        special_name: true,
        hide_by_sig: true,
        ..MethodFlags::accessor()
    }
}

fn static_method() -> MethodFlags {
    MethodFlags {
        is_static: true,
        special_name: false,
        ..MethodFlags::accessor()
    }
}

fn instance_method() -> MethodFlags {
    MethodFlags {
        special_name: false,
        ..MethodFlags::accessor()
    }
}

// ============================================================================
// Referenced libraries
// ============================================================================

/// `System.Runtime`: object root, timestamp type, culture and format provider
#[must_use]
pub fn runtime_library() -> Module {
    let provider = TypeSig::class(name(FORMAT_PROVIDER_TYPE));
    let culture = TypeSig::class(name(CULTURE_TYPE));

    let mut object = TypeDef::class(name("System.Object"));
    object.base_type = None;
    object
        .add_method(MethodDef::external(MethodDef::CONSTRUCTOR, instance_ctor(), TypeSig::Void))
        .unwrap();

    let mut timestamp = TypeDef::value_type(name(TIMESTAMP_TYPE));
    let ts = timestamp_sig();
    for method in [
        MethodDef::external("ParseExact", static_method(), ts.clone())
            .with_param("input", TypeSig::String)
            .with_param("format", TypeSig::String),
        MethodDef::external("ParseExact", static_method(), ts.clone())
            .with_param("input", TypeSig::String)
            .with_param("format", TypeSig::String)
            .with_param("formatProvider", provider.clone()),
        MethodDef::external("ParseExact", static_method(), ts.clone())
            .with_param("input", TypeSig::String)
            .with_param("format", TypeSig::String)
            .with_param("formatProvider", provider.clone())
            .with_param("styles", TypeSig::Int32),
        MethodDef::external("ToString", instance_method(), TypeSig::String),
        MethodDef::external("ToString", instance_method(), TypeSig::String)
            .with_param("format", TypeSig::String),
        MethodDef::external("ToString", instance_method(), TypeSig::String)
            .with_param("format", TypeSig::String)
            .with_param("formatProvider", provider),
    ] {
        timestamp.add_method(method).unwrap();
    }

    let mut culture_info = TypeDef::class(name(CULTURE_TYPE));
    culture_info
        .add_method(MethodDef::external("get_InvariantCulture", static_method(), culture.clone()))
        .unwrap();
    culture_info
        .add_property(
            PropertyDef::new("InvariantCulture", culture)
                .with_accessors(Some("get_InvariantCulture".into()), None),
        )
        .unwrap();

    let provider_type = TypeDef::class(name(FORMAT_PROVIDER_TYPE));

    let mut module = Module::new(RUNTIME_LIBRARY);
    for ty in [object, timestamp, culture_info, provider_type] {
        module.add_type(ty).unwrap();
    }
    module
}

fn attribute_type(full: &str, ctors: &[Vec<TypeSig>]) -> TypeDef {
    let mut ty = TypeDef::class(name(full));
    ty.base_type = Some(TypeSig::class(name("System.Attribute")));
    for params in ctors {
        let mut ctor = MethodDef::external(MethodDef::CONSTRUCTOR, instance_ctor(), TypeSig::Void);
        for (i, p) in params.iter().enumerate() {
            ctor = ctor.with_param(format!("arg{i}"), p.clone());
        }
        ty.add_method(ctor).unwrap();
    }
    ty
}

/// `SQLite.Net`: persistence attributes
#[must_use]
pub fn persistence_library() -> Module {
    let mut module = Module::new(PERSISTENCE_LIBRARY);
    module.add_reference(RUNTIME_LIBRARY);
    for ty in [
        attribute_type("SQLite.IgnoreAttribute", &[vec![]]),
        attribute_type("SQLite.ColumnAttribute", &[vec![TypeSig::String]]),
        attribute_type("SQLite.TableAttribute", &[vec![TypeSig::String]]),
        attribute_type("SQLite.PrimaryKeyAttribute", &[vec![]]),
        attribute_type("SQLite.AutoIncrementAttribute", &[vec![]]),
    ] {
        module.add_type(ty).unwrap();
    }
    module
}

/// Library declaring the serialization marker attribute
#[must_use]
pub fn marker_library() -> Module {
    let mut module = Module::new(MARKER_LIBRARY);
    module.add_reference(RUNTIME_LIBRARY);
    module
        .add_type(attribute_type(
            MARKER_ATTRIBUTE,
            &[
                vec![],
                vec![TypeSig::String],
                vec![TypeSig::Boolean],
                vec![TypeSig::String, TypeSig::Boolean],
            ],
        ))
        .unwrap();
    module
}

// ============================================================================
// Attributes and member references
// ============================================================================

/// Marker attribute with the given positional arguments
#[must_use]
pub fn marker(args: &[AttrArg]) -> CustomAttribute {
    let params = args.iter().map(AttrArg::kind).collect();
    CustomAttribute {
        ctor: ctor_ref(MARKER_ATTRIBUTE, params, MARKER_LIBRARY),
        args: args.to_vec(),
    }
}

#[must_use]
pub fn ignore() -> CustomAttribute {
    CustomAttribute::new(ctor_ref("SQLite.IgnoreAttribute", vec![], PERSISTENCE_LIBRARY))
}

#[must_use]
pub fn column(column_name: &str) -> CustomAttribute {
    CustomAttribute::new(ctor_ref(
        "SQLite.ColumnAttribute",
        vec![TypeSig::String],
        PERSISTENCE_LIBRARY,
    ))
    .with_arg(AttrArg::String(column_name.to_string()))
}

#[must_use]
pub fn table(table_name: &str) -> CustomAttribute {
    CustomAttribute::new(ctor_ref(
        "SQLite.TableAttribute",
        vec![TypeSig::String],
        PERSISTENCE_LIBRARY,
    ))
    .with_arg(AttrArg::String(table_name.to_string()))
}

#[must_use]
pub fn primary_key() -> CustomAttribute {
    CustomAttribute::new(ctor_ref("SQLite.PrimaryKeyAttribute", vec![], PERSISTENCE_LIBRARY))
}

#[must_use]
pub fn auto_increment() -> CustomAttribute {
    CustomAttribute::new(ctor_ref("SQLite.AutoIncrementAttribute", vec![], PERSISTENCE_LIBRARY))
}

#[must_use]
pub fn parse_exact_ref() -> MethodRef {
    MethodRef {
        declaring_type: name(TIMESTAMP_TYPE),
        name: "ParseExact".into(),
        has_this: false,
        params: vec![
            TypeSig::String,
            TypeSig::String,
            TypeSig::class(name(FORMAT_PROVIDER_TYPE)),
        ],
        return_type: timestamp_sig(),
        scope: Some(RUNTIME_LIBRARY.into()),
    }
}

#[must_use]
pub fn to_string_ref() -> MethodRef {
    MethodRef {
        declaring_type: name(TIMESTAMP_TYPE),
        name: "ToString".into(),
        has_this: true,
        params: vec![TypeSig::String],
        return_type: TypeSig::String,
        scope: Some(RUNTIME_LIBRARY.into()),
    }
}

#[must_use]
pub fn invariant_culture_ref() -> MethodRef {
    MethodRef {
        declaring_type: name(CULTURE_TYPE),
        name: "get_InvariantCulture".into(),
        has_this: false,
        params: vec![],
        return_type: TypeSig::class(name(CULTURE_TYPE)),
        scope: Some(RUNTIME_LIBRARY.into()),
    }
}

#[must_use]
pub fn object_ctor_ref() -> MethodRef {
    ctor_ref("System.Object", vec![], RUNTIME_LIBRARY)
}

// ============================================================================
// Model types
// ============================================================================

/// Builds a class of auto-properties with a parameterless constructor
///
/// Timestamp properties added with [`ModelBuilder::timestamp`] are
/// initialized in the constructor to [`INITIAL_VALUE`]. Every accessor and
/// constructor initializer carries a sequence point.
#[derive(Debug)]
pub struct ModelBuilder {
    ty: TypeDef,
    initializers: Vec<Instruction>,
    ctor_points: Vec<SequencePoint>,
    line: u32,
}

impl ModelBuilder {
    #[must_use]
    pub fn new(full_name: &str) -> Self {
        Self {
            ty: TypeDef::class(name(full_name)),
            initializers: Vec::new(),
            ctor_points: Vec::new(),
            line: 10,
        }
    }

    fn document(&self) -> String {
        format!("{}.cs", self.ty.name.name())
    }

    fn point(&mut self, offset: usize) -> SequencePoint {
        self.line += 1;
        SequencePoint {
            offset: u32::try_from(offset).unwrap(),
            document: self.document(),
            line: self.line,
            column: 9,
        }
    }

    /// Type-level attribute
    #[must_use]
    pub fn attribute(mut self, attribute: CustomAttribute) -> Self {
        self.ty.attributes.push(attribute);
        self
    }

    /// Plain private field
    #[must_use]
    pub fn field(mut self, field_name: &str, sig: TypeSig) -> Self {
        self.ty.add_field(FieldDef::private(field_name, sig)).unwrap();
        self
    }

    /// Auto-property with backing field, getter and setter
    #[must_use]
    pub fn property(mut self, prop: &str, sig: TypeSig, attributes: Vec<CustomAttribute>) -> Self {
        let backing = self
            .ty
            .add_field(FieldDef::private(backing_field_name(prop), sig.clone()))
            .unwrap();

        let mut getter = MethodBody::from_instructions(vec![
            Instruction::ldarg(0),
            Instruction::ldfld(backing.clone()),
            Instruction::ret(),
        ]);
        getter.sequence_points.push(self.point(0));
        let mut setter = MethodBody::from_instructions(vec![
            Instruction::ldarg(0),
            Instruction::ldarg(1),
            Instruction::stfld(backing),
            Instruction::ret(),
        ]);
        setter.sequence_points.push(self.point(0));

        let get_name = format!("get_{prop}");
        let set_name = format!("set_{prop}");
        self.ty
            .add_method(
                MethodDef::new(&get_name, MethodFlags::accessor(), sig.clone()).with_body(getter),
            )
            .unwrap();
        self.ty
            .add_method(
                MethodDef::new(&set_name, MethodFlags::accessor(), TypeSig::Void)
                    .with_param("value", sig.clone())
                    .with_body(setter),
            )
            .unwrap();

        let mut property = PropertyDef::new(prop, sig).with_accessors(Some(get_name), Some(set_name));
        property.attributes = attributes;
        self.ty.add_property(property).unwrap();
        self
    }

    /// Timestamp auto-property initialized by the constructor
    #[must_use]
    pub fn timestamp(mut self, prop: &str, attributes: Vec<CustomAttribute>) -> Self {
        self = self.property(prop, timestamp_sig(), attributes);
        let backing = self.ty.field_ref(&backing_field_name(prop)).unwrap();
        let offset = self.initializers.len();
        let point = self.point(offset);
        self.ctor_points.push(point);
        self.initializers.extend([
            Instruction::ldarg(0),
            Instruction::ldstr(INITIAL_VALUE),
            Instruction::ldstr(INITIAL_PATTERN),
            Instruction::call(invariant_culture_ref()),
            Instruction::call(parse_exact_ref()),
            Instruction::stfld(backing),
        ]);
        self
    }

    #[must_use]
    pub fn build(mut self) -> TypeDef {
        let base_call = self.initializers.len();
        let point = self.point(base_call);
        self.ctor_points.push(point);

        let mut instructions = self.initializers;
        instructions.extend([
            Instruction::ldarg(0),
            Instruction::call(object_ctor_ref()),
            Instruction::ret(),
        ]);
        let mut body = MethodBody::from_instructions(instructions);
        body.sequence_points = self.ctor_points;

        self.ty
            .add_method(
                MethodDef::new(MethodDef::CONSTRUCTOR, instance_ctor(), TypeSig::Void).with_body(body),
            )
            .unwrap();
        self.ty
    }
}

/// The sample data model
#[must_use]
pub fn test_item() -> TypeDef {
    ModelBuilder::new(TEST_ITEM)
        .attribute(table("TestItems"))
        .property("Id", TypeSig::Int32, vec![primary_key(), auto_increment()])
        .timestamp("Test", vec![marker(&[])])
        .timestamp(
            "Test_KeepOriginal_CustomFormat",
            vec![marker(&[
                AttrArg::String("yyyy-MM-dd, HH:mm:ss".into()),
                AttrArg::Boolean(true),
            ])],
        )
        .timestamp("Test_Ignore", vec![marker(&[]), ignore()])
        .timestamp("Test_Columnname", vec![marker(&[]), column("Specialname1")])
        .timestamp(
            "Test_KeepOriginal_Columnname",
            vec![marker(&[AttrArg::Boolean(true)]), column("Specialname2")],
        )
        .build()
}

/// Module linking the fixture libraries, holding `types`
#[must_use]
pub fn models_module(types: Vec<TypeDef>) -> Module {
    let mut module = Module::new(MODELS_MODULE);
    for lib in [RUNTIME_LIBRARY, PERSISTENCE_LIBRARY, MARKER_LIBRARY] {
        module.add_reference(lib);
    }
    for ty in types {
        module.add_type(ty).unwrap();
    }
    module
}

/// Module holding only [`test_item`]
#[must_use]
pub fn test_models() -> Module {
    models_module(vec![test_item()])
}

// ============================================================================
// On-disk layout
// ============================================================================

/// Temporary directory holding a models artifact and its libraries
#[derive(Debug)]
pub struct Workspace {
    dir: TempDir,
    artifact: PathBuf,
}

impl Workspace {
    /// Lay out all fixture libraries and `models` (with symbols)
    #[must_use]
    pub fn new(models: &Module) -> Self {
        Self::with_libraries(models, &[RUNTIME_LIBRARY, PERSISTENCE_LIBRARY, MARKER_LIBRARY])
    }

    /// Lay out `models` and only the named libraries
    #[must_use]
    pub fn with_libraries(models: &Module, libraries: &[&str]) -> Self {
        let dir = tempfile::tempdir().unwrap();
        for lib in [runtime_library(), persistence_library(), marker_library()] {
            if libraries.contains(&lib.name.as_str()) {
                let path = dir.path().join(format!("{}.{MODULE_EXTENSION}", lib.name));
                write_module(&path, &lib, false).unwrap();
            }
        }
        let artifact = dir.path().join(format!("{}.{MODULE_EXTENSION}", models.name));
        write_module(&artifact, models, true).unwrap();
        Self { dir, artifact }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    #[must_use]
    pub fn artifact(&self) -> &Path {
        &self.artifact
    }

    /// `<artifact>.bak`
    #[must_use]
    pub fn backup(&self) -> PathBuf {
        let mut file = self.artifact.as_os_str().to_owned();
        file.push(".bak");
        PathBuf::from(file)
    }

    #[must_use]
    pub fn artifact_bytes(&self) -> Vec<u8> {
        fs::read(&self.artifact).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stampweave_ir::{read_module, AttributeList, ReadOptions};

    #[test]
    fn test_item_shape() {
        let ty = test_item();
        assert_eq!(ty.properties.len(), 6);
        let test = ty.property("Test").unwrap();
        assert!(test.attributes.has_attribute(&name(MARKER_ATTRIBUTE)));
        assert!(ty.field("<Test>k__BackingField").is_some());
        let ctor = ty.method(MethodDef::CONSTRUCTOR).unwrap();
        // five timestamp initializers of six instructions plus the base call
        assert_eq!(ctor.body.as_ref().unwrap().len(), 5 * 6 + 3);
    }

    #[test]
    fn marker_ctor_matches_library() {
        let lib = marker_library();
        let attr = marker(&[AttrArg::String("x".into()), AttrArg::Boolean(true)]);
        assert!(lib.resolve_method(&attr.ctor).is_some());
    }

    #[test]
    fn workspace_round_trips_models() {
        let ws = Workspace::new(&test_models());
        let loaded = read_module(ws.artifact(), &ReadOptions::default()).unwrap();
        assert!(loaded.has_symbols);
        assert_eq!(loaded.module, test_models());
        assert!(ws.dir().join("SQLite.Net.cmod").exists());
        assert!(ws.backup().to_string_lossy().ends_with(".cmod.bak"));
    }
}
