//! Accessor rewriting
//!
//! The original property keeps its accessors but no longer touches its own
//! backing field: the getter parses the shadow's string and the setter
//! formats into it.

use crate::capability::TimestampConversion;
use crate::scan::FlaggedProperty;
use crate::synth::ShadowMembers;
use stampweave_ir::{Instruction, MethodBody, TypeDef};

/// Replaces the original getter and setter bodies
pub struct AccessorRewriter<'a> {
    conversion: &'a dyn TimestampConversion,
}

impl<'a> AccessorRewriter<'a> {
    #[must_use]
    pub fn new(conversion: &'a dyn TimestampConversion) -> Self {
        Self { conversion }
    }

    /// `this.get_<shadow>()` parsed with the flagged format
    #[must_use]
    pub fn getter_body(&self, format: &str, shadow: &ShadowMembers) -> Vec<Instruction> {
        vec![
            Instruction::ldarg(0),
            Instruction::call(shadow.getter.clone()),
            Instruction::ldstr(format),
            Instruction::call(self.conversion.invariant_culture().clone()),
            Instruction::call(self.conversion.parse_exact().clone()),
            Instruction::ret(),
        ]
    }

    /// `this.set_<shadow>(value.ToString(format))`
    #[must_use]
    pub fn setter_body(&self, format: &str, shadow: &ShadowMembers) -> Vec<Instruction> {
        vec![
            Instruction::ldarg(0),
            Instruction::ldarga(1),
            Instruction::ldstr(format),
            Instruction::call(self.conversion.format().clone()),
            Instruction::call(shadow.setter.clone()),
            Instruction::ret(),
        ]
    }

    /// Rewrite whichever accessors the flagged property declares
    ///
    /// Returns the number of accessors rewritten.
    pub fn rewrite(&self, ty: &mut TypeDef, flagged: &FlaggedProperty, shadow: &ShadowMembers) -> usize {
        let Some(property) = ty.property(&flagged.property) else {
            return 0;
        };
        let format = flagged.options.format.as_str();
        let accessors = [
            (property.getter.clone(), self.getter_body(format, shadow)),
            (property.setter.clone(), self.setter_body(format, shadow)),
        ];

        let mut rewritten = 0;
        for (name, body) in accessors {
            let Some(name) = name else { continue };
            let Some(method) = ty.method_mut(&name) else {
                continue;
            };
            method
                .body
                .get_or_insert_with(MethodBody::default)
                .editor()
                .replace_all(body);
            rewritten += 1;
        }
        tracing::debug!(
            type_name = %ty.name,
            property = %flagged.property,
            rewritten,
            "rewrote accessors"
        );
        rewritten
    }
}
