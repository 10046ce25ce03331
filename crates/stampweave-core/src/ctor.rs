//! Constructor patching
//!
//! Field initializers run inside constructors and assign the original
//! backing field directly, bypassing the rewritten setter. Each constructor
//! therefore copies the formatted value into the shadow right after that
//! assignment.

use crate::capability::TimestampConversion;
use crate::error::Result;
use crate::scan::FlaggedProperty;
use crate::synth::ShadowMembers;
use stampweave_ir::{backing_field_name, FieldRef, Instruction, TypeDef};

/// Inserts shadow initialization into instance constructors
pub struct ConstructorPatcher<'a> {
    conversion: &'a dyn TimestampConversion,
}

impl<'a> ConstructorPatcher<'a> {
    #[must_use]
    pub fn new(conversion: &'a dyn TimestampConversion) -> Self {
        Self { conversion }
    }

    /// `this.<shadow> = this.<original>.ToString(format)`
    #[must_use]
    pub fn sequence(&self, original: &FieldRef, format: &str, shadow: &ShadowMembers) -> Vec<Instruction> {
        vec![
            Instruction::ldarg(0),
            Instruction::ldarg(0),
            Instruction::ldflda(original.clone()),
            Instruction::ldstr(format),
            Instruction::call(self.conversion.format().clone()),
            Instruction::stfld(shadow.field.clone()),
        ]
    }

    /// Patch every instance constructor of `ty`, returning how many were patched
    ///
    /// The sequence goes right after the first store to the original backing
    /// field, or at the start of the body when there is none. A property
    /// without a compiler-generated backing field is left alone.
    ///
    /// # Errors
    /// Returns [`crate::WeaveError::Structure`] if an insertion point is invalid
    pub fn patch(&self, ty: &mut TypeDef, flagged: &FlaggedProperty, shadow: &ShadowMembers) -> Result<usize> {
        let backing = backing_field_name(&flagged.property);
        let Some(original) = ty.field_ref(&backing) else {
            tracing::warn!(
                type_name = %ty.name,
                property = %flagged.property,
                field = %backing,
                "no backing field, constructors not patched"
            );
            return Ok(0);
        };
        let sequence = self.sequence(&original, &flagged.options.format, shadow);

        let mut patched = 0;
        for ctor in ty.constructors_mut() {
            let Some(body) = ctor.body.as_mut() else {
                continue;
            };
            let mut editor = body.editor();
            match editor.position(|instr| instr.stores(&original)) {
                Some(index) => {
                    editor.insert_after(index, sequence.iter().cloned())?;
                }
                None => {
                    editor.prepend(sequence.iter().cloned());
                }
            }
            patched += 1;
        }
        tracing::debug!(
            type_name = %ty.name,
            property = %flagged.property,
            constructors = patched,
            "patched constructors"
        );
        Ok(patched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::SerializeOptions;
    use pretty_assertions::assert_eq;
    use stampweave_ir::{
        FieldDef, MethodBody, MethodDef, MethodFlags, MethodRef, OpCode, TypeSig,
    };
    use stampweave_test_utils::{
        invariant_culture_ref, marker, name, parse_exact_ref, to_string_ref, ModelBuilder,
    };

    struct Runtime {
        parse: MethodRef,
        format: MethodRef,
        culture: MethodRef,
    }

    impl TimestampConversion for Runtime {
        fn parse_exact(&self) -> &MethodRef {
            &self.parse
        }

        fn format(&self) -> &MethodRef {
            &self.format
        }

        fn invariant_culture(&self) -> &MethodRef {
            &self.culture
        }
    }

    fn runtime() -> Runtime {
        Runtime {
            parse: parse_exact_ref(),
            format: to_string_ref(),
            culture: invariant_culture_ref(),
        }
    }

    fn shadow_for(ty: &mut TypeDef, property: &str) -> (FlaggedProperty, ShadowMembers) {
        let shadow_name = format!("{property}_Serialized");
        let field = ty
            .add_field(FieldDef::private(backing_field_name(&shadow_name), TypeSig::String))
            .unwrap();
        let flagged = FlaggedProperty {
            type_name: ty.name.clone(),
            property: property.to_string(),
            options: SerializeOptions {
                format: "HH:mm".to_string(),
                keep_original: false,
            },
        };
        let shadow = ShadowMembers {
            getter: MethodRef {
                declaring_type: ty.name.clone(),
                name: format!("get_{shadow_name}"),
                has_this: true,
                params: vec![],
                return_type: TypeSig::String,
                scope: None,
            },
            setter: MethodRef {
                declaring_type: ty.name.clone(),
                name: format!("set_{shadow_name}"),
                has_this: true,
                params: vec![TypeSig::String],
                return_type: TypeSig::Void,
                scope: None,
            },
            property: shadow_name,
            field,
            column: property.to_string(),
        };
        (flagged, shadow)
    }

    #[test]
    fn inserts_after_initializer() {
        let mut ty = ModelBuilder::new("Models.Item")
            .timestamp("Created", vec![marker(&[])])
            .timestamp("Updated", vec![marker(&[])])
            .build();
        let (flagged, shadow) = shadow_for(&mut ty, "Updated");
        let runtime = runtime();
        let patcher = ConstructorPatcher::new(&runtime);
        assert_eq!(patcher.patch(&mut ty, &flagged, &shadow).unwrap(), 1);

        let body = ty.method(MethodDef::CONSTRUCTOR).unwrap().body.as_ref().unwrap();
        // two six-instruction initializers, then the inserted copy
        assert_eq!(body.instructions[12].opcode(), OpCode::Ldarg0);
        assert_eq!(body.instructions[14].field().unwrap().name, "<Updated>k__BackingField");
        assert_eq!(body.instructions[17], Instruction::stfld(shadow.field.clone()));
        assert_eq!(body.len(), 6 + 6 + 6 + 3);
        // the base-call sequence point moved past the insertion
        assert_eq!(body.sequence_points.last().unwrap().offset, 18);
    }

    #[test]
    fn prepends_without_initializer() {
        let mut ty = ModelBuilder::new("Models.Item")
            .property("Stamp", stampweave_test_utils::timestamp_sig(), vec![marker(&[])])
            .build();
        let (flagged, shadow) = shadow_for(&mut ty, "Stamp");
        ConstructorPatcher::new(&runtime()).patch(&mut ty, &flagged, &shadow).unwrap();

        let body = ty.method(MethodDef::CONSTRUCTOR).unwrap().body.as_ref().unwrap();
        assert_eq!(body.instructions[..6], ConstructorPatcher::new(&runtime()).sequence(
            &ty.field_ref("<Stamp>k__BackingField").unwrap(),
            "HH:mm",
            &shadow
        )[..]);
    }

    #[test]
    fn every_instance_constructor_is_patched() {
        let mut ty = ModelBuilder::new("Models.Item")
            .timestamp("Created", vec![marker(&[])])
            .build();
        ty.add_method(
            MethodDef::new(MethodDef::CONSTRUCTOR, MethodFlags::accessor(), TypeSig::Void)
                .with_param("seed", TypeSig::Int32)
                .with_body(MethodBody::from_instructions(vec![Instruction::ret()])),
        )
        .unwrap();
        ty.add_method(MethodDef::new(
            ".cctor",
            MethodFlags {
                is_static: true,
                ..MethodFlags::accessor()
            },
            TypeSig::Void,
        ))
        .unwrap();

        let (flagged, shadow) = shadow_for(&mut ty, "Created");
        assert_eq!(ConstructorPatcher::new(&runtime()).patch(&mut ty, &flagged, &shadow).unwrap(), 2);
        assert!(ty.method(".cctor").unwrap().body.as_ref().unwrap().is_empty());
    }

    #[test]
    fn missing_backing_field_is_skipped() {
        let mut ty = ModelBuilder::new("Models.Item").build();
        let (flagged, shadow) = shadow_for(&mut ty, "Computed");
        let before = ty.clone();
        assert_eq!(ConstructorPatcher::new(&runtime()).patch(&mut ty, &flagged, &shadow).unwrap(), 0);
        assert_eq!(ty, before);
        assert_eq!(flagged.type_name, name("Models.Item"));
    }
}
