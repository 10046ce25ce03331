//! Shadow property synthesis
//!
//! For each flagged property the type gains a string-typed auto-property
//! (backing field, getter, setter) that persistence maps to a column, and
//! the original's persistence attributes are adjusted to match.

use crate::capability::PersistenceMetadata;
use crate::config::WeaveNames;
use crate::error::Result;
use crate::scan::FlaggedProperty;
use stampweave_ir::{
    backing_field_name, AttrArg, AttributeList, FieldDef, FieldRef, Instruction, IrError,
    MethodBody, MethodDef, MethodFlags, MethodRef, PropertyDef, TypeDef, TypeSig,
};

/// First suffix tried when the shadow name is taken
pub const COLLISION_START: u32 = 1000;
/// Exclusive upper bound of collision suffixes
pub const COLLISION_END: u32 = 9999;

/// Members added for one flagged property
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShadowMembers {
    pub property: String,
    pub field: FieldRef,
    pub getter: MethodRef,
    pub setter: MethodRef,
    /// Column the shadow persists to
    pub column: String,
}

/// Creates shadow properties and rewrites persistence attributes
pub struct MemberSynthesizer<'a> {
    names: &'a WeaveNames,
    metadata: &'a dyn PersistenceMetadata,
}

impl<'a> MemberSynthesizer<'a> {
    #[must_use]
    pub fn new(names: &'a WeaveNames, metadata: &'a dyn PersistenceMetadata) -> Self {
        Self { names, metadata }
    }

    /// Add the shadow of `flagged` to `ty`
    ///
    /// # Errors
    /// Returns [`crate::WeaveError::Structure`] if the property is gone or no free
    /// shadow name remains
    pub fn synthesize(&self, ty: &mut TypeDef, flagged: &FlaggedProperty) -> Result<ShadowMembers> {
        let original = ty
            .property(&flagged.property)
            .ok_or_else(|| IrError::MissingProperty {
                type_name: ty.name.clone(),
                property: flagged.property.clone(),
            })?;
        let existing_column = original
            .attributes
            .find_attribute(&self.names.column)
            .and_then(|attr| attr.args.first())
            .and_then(AttrArg::as_str)
            .map(ToOwned::to_owned);

        let shadow = self.shadow_name(ty, &flagged.property)?;
        let keep = flagged.options.keep_original;
        let column = match (existing_column, keep) {
            (Some(column), false) => column,
            (Some(column), true) => format!("{column}{}", self.names.shadow_suffix),
            (None, false) => flagged.property.clone(),
            (None, true) => shadow.clone(),
        };

        let field = ty.add_field(FieldDef::private(backing_field_name(&shadow), TypeSig::String))?;
        let get_name = format!("get_{shadow}");
        let set_name = format!("set_{shadow}");
        let getter = ty.add_method(
            MethodDef::new(&get_name, MethodFlags::accessor(), TypeSig::String).with_body(
                MethodBody::from_instructions(vec![
                    Instruction::ldarg(0),
                    Instruction::ldfld(field.clone()),
                    Instruction::ret(),
                ]),
            ),
        )?;
        let setter = ty.add_method(
            MethodDef::new(&set_name, MethodFlags::accessor(), TypeSig::Void)
                .with_param("value", TypeSig::String)
                .with_body(MethodBody::from_instructions(vec![
                    Instruction::ldarg(0),
                    Instruction::ldarg(1),
                    Instruction::stfld(field.clone()),
                    Instruction::ret(),
                ])),
        )?;
        ty.add_property(
            PropertyDef::new(&shadow, TypeSig::String)
                .with_accessors(Some(get_name), Some(set_name))
                .with_attribute(self.metadata.column(&column)),
        )?;

        if let Some(original) = ty.property_mut(&flagged.property) {
            original.remove_attributes(&self.names.marker);
            if !keep {
                original.remove_attributes(&self.names.column);
                original.attributes.push(self.metadata.exclusion());
            }
        }

        tracing::debug!(
            type_name = %ty.name,
            property = %flagged.property,
            shadow = %shadow,
            column = %column,
            keep_original = keep,
            "synthesized shadow property"
        );

        Ok(ShadowMembers {
            property: shadow,
            field,
            getter,
            setter,
            column,
        })
    }

    /// `<property><suffix>`, or `<property><suffix>_<n>` for the first free `n`
    fn shadow_name(&self, ty: &TypeDef, property: &str) -> Result<String> {
        let base = format!("{property}{}", self.names.shadow_suffix);
        if is_free(ty, &base) {
            return Ok(base);
        }
        let found = (COLLISION_START..COLLISION_END)
            .map(|n| format!("{base}_{n}"))
            .find(|candidate| is_free(ty, candidate));
        found.ok_or_else(|| {
            IrError::DuplicateMember {
                type_name: ty.name.clone(),
                member: base,
            }
            .into()
        })
    }
}

/// No member uses the name or any name derived from it
fn is_free(ty: &TypeDef, name: &str) -> bool {
    ![
        name.to_string(),
        format!("get_{name}"),
        format!("set_{name}"),
        backing_field_name(name),
    ]
    .iter()
    .any(|member| ty.has_member(member))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WeaverConfig;
    use crate::error::{ErrorCategory, WeaveError};
    use crate::extract::SerializeOptions;
    use pretty_assertions::assert_eq;
    use stampweave_test_utils::{column, ignore, name, marker, test_item, ModelBuilder, TEST_ITEM};

    struct Fixed {
        ignore: MethodRef,
        column: MethodRef,
    }

    impl Fixed {
        fn new() -> Self {
            Self {
                ignore: ignore().ctor,
                column: column("x").ctor,
            }
        }
    }

    impl PersistenceMetadata for Fixed {
        fn exclusion_ctor(&self) -> &MethodRef {
            &self.ignore
        }

        fn column_ctor(&self) -> &MethodRef {
            &self.column
        }
    }

    fn flagged(ty: &str, property: &str, keep: bool) -> FlaggedProperty {
        FlaggedProperty {
            type_name: name(ty),
            property: property.to_string(),
            options: SerializeOptions {
                format: "yyyy-MM-dd HH:mm:ss zzzz".to_string(),
                keep_original: keep,
            },
        }
    }

    fn run(ty: &mut TypeDef, property: &str, keep: bool) -> ShadowMembers {
        let names = WeaverConfig::new().names().unwrap();
        let metadata = Fixed::new();
        let flagged = flagged(&ty.name.to_string(), property, keep);
        MemberSynthesizer::new(&names, &metadata)
            .synthesize(ty, &flagged)
            .unwrap()
    }

    #[test]
    fn exclude_with_column_moves_column_to_shadow() {
        let mut ty = test_item();
        let shadow = run(&mut ty, "Test_Columnname", false);

        assert_eq!(shadow.property, "Test_Columnname_Serialized");
        assert_eq!(shadow.column, "Specialname1");
        let added = ty.property("Test_Columnname_Serialized").unwrap();
        assert_eq!(added.attributes, vec![column("Specialname1")]);

        let original = ty.property("Test_Columnname").unwrap();
        assert_eq!(original.attributes, vec![ignore()]);
    }

    #[test]
    fn keep_with_column_suffixes_column() {
        let mut ty = test_item();
        let shadow = run(&mut ty, "Test_KeepOriginal_Columnname", true);

        assert_eq!(shadow.column, "Specialname2_Serialized");
        let original = ty.property("Test_KeepOriginal_Columnname").unwrap();
        assert_eq!(original.attributes, vec![column("Specialname2")]);
    }

    #[test]
    fn keep_without_column_uses_shadow_name() {
        let mut ty = test_item();
        let shadow = run(&mut ty, "Test_KeepOriginal_CustomFormat", true);
        assert_eq!(shadow.column, "Test_KeepOriginal_CustomFormat_Serialized");
        assert!(ty.property("Test_KeepOriginal_CustomFormat").unwrap().attributes.is_empty());
    }

    #[test]
    fn exclude_without_column_takes_over_property_name() {
        let mut ty = test_item();
        let shadow = run(&mut ty, "Test", false);
        assert_eq!(shadow.column, "Test");
        assert_eq!(ty.property("Test").unwrap().attributes, vec![ignore()]);
    }

    #[test]
    fn shadow_accessors_store_and_load_backing_field() {
        let mut ty = test_item();
        let shadow = run(&mut ty, "Test", false);

        assert_eq!(shadow.field.name, "<Test_Serialized>k__BackingField");
        assert_eq!(shadow.field.field_type, TypeSig::String);
        let getter = ty.resolve_method(&shadow.getter).unwrap();
        assert_eq!(
            getter.body.as_ref().unwrap().instructions,
            vec![
                Instruction::ldarg(0),
                Instruction::ldfld(shadow.field.clone()),
                Instruction::ret()
            ]
        );
        let setter = ty.resolve_method(&shadow.setter).unwrap();
        assert_eq!(setter.params.len(), 1);
        assert!(setter.body.as_ref().unwrap().instructions.contains(&Instruction::stfld(shadow.field.clone())));
        assert!(ty.validate().is_ok());
    }

    #[test]
    fn collision_picks_counter_suffix() {
        let mut ty = ModelBuilder::new("Models.Item")
            .timestamp("Foo", vec![marker(&[])])
            .property("Foo_Serialized", TypeSig::String, vec![])
            .build();
        let shadow = run(&mut ty, "Foo", false);
        assert_eq!(shadow.property, "Foo_Serialized_1000");

        let mut ty = ModelBuilder::new("Models.Item")
            .timestamp("Foo", vec![marker(&[])])
            .field("<Foo_Serialized>k__BackingField", TypeSig::String)
            .field("<Foo_Serialized_1000>k__BackingField", TypeSig::String)
            .build();
        let shadow = run(&mut ty, "Foo", false);
        assert_eq!(shadow.property, "Foo_Serialized_1001");
    }

    #[test]
    fn missing_property_is_a_structure_error() {
        let names = WeaverConfig::new().names().unwrap();
        let metadata = Fixed::new();
        let mut ty = ModelBuilder::new("Models.Item").build();
        let err = MemberSynthesizer::new(&names, &metadata)
            .synthesize(&mut ty, &flagged("Models.Item", "Gone", false))
            .unwrap_err();
        assert!(matches!(
            err,
            WeaveError::Structure(IrError::MissingProperty { ref property, .. }) if property == "Gone"
        ));
        assert_eq!(err.category(), ErrorCategory::Load);
    }

    #[test]
    fn marker_is_removed_from_original() {
        let names = WeaverConfig::new().names().unwrap();
        let mut ty = test_item();
        run(&mut ty, "Test_KeepOriginal_CustomFormat", true);
        let original = ty.property("Test_KeepOriginal_CustomFormat").unwrap();
        assert!(!original.attributes.has_attribute(&names.marker));
        assert_eq!(ty.name.to_string(), TEST_ITEM);
    }
}
