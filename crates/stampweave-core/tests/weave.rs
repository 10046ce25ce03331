//! End-to-end weaving of on-disk artifacts

use chrono::{DateTime, FixedOffset, TimeZone};
use pretty_assertions::assert_eq;
use stampweave_core::{ErrorCategory, Weaver, WeaverConfig};
use stampweave_ir::{read_module, AttributeList, MethodDef, Module, ReadOptions, TypeSig};
use stampweave_runtime::{Evaluator, Value};
use stampweave_test_utils::{
    column, ignore, marker, models_module, name, test_item, test_models, ModelBuilder, Workspace,
    MARKER_LIBRARY, RUNTIME_LIBRARY, TEST_ITEM,
};
use std::fs;

fn weaver() -> Weaver {
    Weaver::new(WeaverConfig::new()).unwrap()
}

fn load(ws: &Workspace) -> Module {
    read_module(ws.artifact(), &ReadOptions::default()).unwrap().module
}

fn at(offset_hours: i32, y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<FixedOffset> {
    FixedOffset::east_opt(offset_hours * 3600)
        .unwrap()
        .with_ymd_and_hms(y, mo, d, h, mi, s)
        .unwrap()
}

fn timestamp(value: &Value) -> String {
    value.as_timestamp().unwrap().to_rfc3339()
}

#[test]
fn woven_accessors_round_trip_through_shadow() {
    let ws = Workspace::new(&test_models());
    let report = weaver().run(ws.artifact()).unwrap();
    assert!(report.changed);
    assert_eq!(report.properties.len(), 4);

    let mut eval = Evaluator::new();
    eval.load(load(&ws));
    let item = eval.new_object(&name(TEST_ITEM)).unwrap();

    // the constructor initializer reached the shadow
    assert_eq!(
        eval.field(item, "<Test_Serialized>k__BackingField"),
        Some(&Value::String("2024-03-05 14:07:09 +05:00".into()))
    );
    let read = eval.get_property(item, "Test").unwrap();
    assert_eq!(timestamp(&read), "2024-03-05T14:07:09+05:00");

    let written = at(-7, 2021, 1, 2, 3, 4, 5);
    eval.set_property(item, "Test", Value::Timestamp(written)).unwrap();
    assert_eq!(
        eval.get_property(item, "Test_Serialized").unwrap(),
        Value::String("2021-01-02 03:04:05 -07:00".into())
    );
    assert_eq!(timestamp(&eval.get_property(item, "Test").unwrap()), written.to_rfc3339());
}

#[test]
fn custom_format_drops_what_it_does_not_carry() {
    let ws = Workspace::new(&test_models());
    weaver().run(ws.artifact()).unwrap();

    let mut eval = Evaluator::new();
    eval.load(load(&ws));
    let item = eval.new_object(&name(TEST_ITEM)).unwrap();

    assert_eq!(
        eval.get_property(item, "Test_KeepOriginal_CustomFormat_Serialized").unwrap(),
        Value::String("2024-03-05, 14:07:09".into())
    );
    // no offset in the pattern, so it reads back as UTC
    let read = eval.get_property(item, "Test_KeepOriginal_CustomFormat").unwrap();
    assert_eq!(timestamp(&read), "2024-03-05T14:07:09+00:00");
}

#[test]
fn excluded_property_is_left_alone() {
    let ws = Workspace::new(&test_models());
    weaver().run(ws.artifact()).unwrap();
    let module = load(&ws);
    let ty = module.find_type(&name(TEST_ITEM)).unwrap();

    assert!(ty.property("Test_Ignore_Serialized").is_none());
    let original = test_item();
    assert_eq!(ty.method("get_Test_Ignore"), original.method("get_Test_Ignore"));
    assert_eq!(ty.property("Test_Ignore"), original.property("Test_Ignore"));
}

#[test]
fn persistence_attributes_follow_keep_original() {
    let ws = Workspace::new(&test_models());
    weaver().run(ws.artifact()).unwrap();
    let module = load(&ws);
    let ty = module.find_type(&name(TEST_ITEM)).unwrap();
    let attrs = |prop: &str| ty.property(prop).unwrap().attributes.clone();

    assert_eq!(attrs("Test_Columnname"), vec![ignore()]);
    assert_eq!(attrs("Test_Columnname_Serialized"), vec![column("Specialname1")]);

    assert_eq!(attrs("Test_KeepOriginal_Columnname"), vec![column("Specialname2")]);
    assert_eq!(attrs("Test_KeepOriginal_Columnname_Serialized"), vec![column("Specialname2_Serialized")]);

    assert!(attrs("Test_KeepOriginal_CustomFormat").is_empty());
    assert_eq!(
        attrs("Test_KeepOriginal_CustomFormat_Serialized"),
        vec![column("Test_KeepOriginal_CustomFormat_Serialized")]
    );

    assert_eq!(attrs("Test"), vec![ignore()]);
    assert_eq!(attrs("Test_Serialized"), vec![column("Test")]);
}

#[test]
fn second_run_changes_nothing() {
    let ws = Workspace::new(&test_models());
    let original = ws.artifact_bytes();
    weaver().run(ws.artifact()).unwrap();
    let woven = ws.artifact_bytes();
    assert_ne!(woven, original);

    let report = weaver().run(ws.artifact()).unwrap();
    assert!(!report.changed);
    assert!(report.properties.is_empty());
    assert!(report.backup.is_none());
    assert_eq!(ws.artifact_bytes(), woven);
    // the backup still holds the pre-weave bytes
    assert_eq!(fs::read(ws.backup()).unwrap(), original);
}

#[test]
fn backup_equals_original_bytes() {
    let ws = Workspace::new(&test_models());
    let original = ws.artifact_bytes();
    let report = weaver().run(ws.artifact()).unwrap();
    assert_eq!(report.backup.as_deref(), Some(ws.backup().as_path()));
    assert_eq!(fs::read(ws.backup()).unwrap(), original);
    assert_eq!(report.input_hash, stampweave_ir::ContentHash::compute(&original));
    assert_eq!(report.output_hash, Some(stampweave_ir::ContentHash::compute(&ws.artifact_bytes())));
}

#[test]
fn collision_gets_counter_suffix_and_is_not_rescanned() {
    let ty = ModelBuilder::new("Models.Item")
        .timestamp("Foo", vec![marker(&[])])
        .property("Foo_Serialized", TypeSig::String, vec![])
        .build();
    let ws = Workspace::new(&models_module(vec![ty]));
    let report = weaver().run(ws.artifact()).unwrap();
    assert_eq!(report.properties[0].shadow, "Foo_Serialized_1000");

    let module = load(&ws);
    let ty = module.find_type(&name("Models.Item")).unwrap();
    assert!(ty.property("Foo_Serialized").unwrap().attributes.is_empty());
    assert_eq!(ty.property("Foo_Serialized_1000").unwrap().attributes, vec![column("Foo")]);
    assert!(weaver().inspect(ws.artifact()).unwrap().is_empty());
}

#[test]
fn marker_on_integer_fails_closed() {
    let bad = ModelBuilder::new("Models.Bad")
        .property("Count", TypeSig::Int32, vec![marker(&[])])
        .build();
    let ws = Workspace::new(&models_module(vec![test_item(), bad]));
    let original = ws.artifact_bytes();

    let err = weaver().run(ws.artifact()).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::TypeMismatch);
    assert_eq!(ws.artifact_bytes(), original);
    assert!(!ws.backup().exists());
    assert!(!weaver().execute(ws.artifact()));
}

#[test]
fn missing_persistence_library_is_unresolvable() {
    let ws = Workspace::with_libraries(&test_models(), &[RUNTIME_LIBRARY, MARKER_LIBRARY]);
    let original = ws.artifact_bytes();

    let err = weaver().run(ws.artifact()).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::UnresolvableDependency);
    assert_eq!(ws.artifact_bytes(), original);
    assert!(!ws.backup().exists());
}

#[test]
fn search_dirs_supply_libraries() {
    let libs = Workspace::new(&test_models());
    let ws = Workspace::with_libraries(&test_models(), &[]);
    let config = WeaverConfig::new().with_search_dir(libs.dir());
    let report = Weaver::new(config).unwrap().run(ws.artifact()).unwrap();
    assert!(report.changed);
}

#[test]
fn corrupt_artifact_is_a_load_error() {
    let ws = Workspace::new(&test_models());
    fs::write(ws.artifact(), b"SWMD\x01\x00garbage").unwrap();
    let err = weaver().run(ws.artifact()).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Load);
    assert!(!ws.backup().exists());
}

#[test]
fn constructor_sequence_points_move_with_insertions() {
    let ws = Workspace::new(&test_models());
    weaver().run(ws.artifact()).unwrap();
    let module = load(&ws);
    let ty = module.find_type(&name(TEST_ITEM)).unwrap();

    let ctor = ty.method(MethodDef::CONSTRUCTOR).unwrap().body.as_ref().unwrap();
    let offsets: Vec<u32> = ctor.sequence_points.iter().map(|p| p.offset).collect();
    assert_eq!(offsets, [0, 12, 24, 30, 42, 54]);
    assert_eq!(ctor.len(), 33 + 4 * 6);

    let getter = ty.method("get_Test").unwrap().body.as_ref().unwrap();
    assert!(getter.sequence_points.is_empty());
    let untouched = ty.method("get_Id").unwrap().body.as_ref().unwrap();
    assert_eq!(untouched.sequence_points.len(), 1);
}

#[test]
fn inspect_is_a_dry_run() {
    let ws = Workspace::new(&test_models());
    let original = ws.artifact_bytes();
    let flagged = weaver().inspect(ws.artifact()).unwrap();

    let summary: Vec<(&str, bool)> = flagged
        .iter()
        .map(|f| (f.property.as_str(), f.options.keep_original))
        .collect();
    assert_eq!(
        summary,
        [
            ("Test", false),
            ("Test_KeepOriginal_CustomFormat", true),
            ("Test_Columnname", false),
            ("Test_KeepOriginal_Columnname", true),
        ]
    );
    assert_eq!(ws.artifact_bytes(), original);
    assert!(!ws.backup().exists());
    let marked = load(&ws);
    let ty = marked.find_type(&name(TEST_ITEM)).unwrap();
    assert!(ty.property("Test").unwrap().attributes.has_attribute(&name(stampweave_test_utils::MARKER_ATTRIBUTE)));
}
