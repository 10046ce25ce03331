//! Discovery of flagged properties

use crate::config::WeaveNames;
use crate::error::{Result, WeaveError};
use crate::extract::{extract_options, SerializeOptions};
use serde::Serialize;
use stampweave_ir::{AttributeList, FullName, TypeDef};

/// Property selected for rewriting, with its effective options
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlaggedProperty {
    pub type_name: FullName,
    pub property: String,
    #[serde(flatten)]
    pub options: SerializeOptions,
}

/// Selects properties carrying the marker and not the exclusion attribute
#[derive(Debug, Clone, Copy)]
pub struct PropertyScanner<'a> {
    names: &'a WeaveNames,
}

impl<'a> PropertyScanner<'a> {
    #[must_use]
    pub fn new(names: &'a WeaveNames) -> Self {
        Self { names }
    }

    /// Flagged properties of `ty`, in declaration order
    ///
    /// # Errors
    /// Returns [`WeaveError::TypeMismatch`] if any selected property is not of
    /// the timestamp type
    pub fn scan(&self, ty: &TypeDef) -> Result<Vec<FlaggedProperty>> {
        let mut flagged = Vec::new();
        for property in &ty.properties {
            let Some(marker) = property.attributes.find_attribute(&self.names.marker) else {
                continue;
            };
            if property.attributes.has_attribute(&self.names.exclusion) {
                tracing::debug!(
                    type_name = %ty.name,
                    property = %property.name,
                    "flagged property is excluded from persistence, skipping"
                );
                continue;
            }
            if !property.property_type.is(&self.names.timestamp) {
                return Err(WeaveError::TypeMismatch {
                    type_name: ty.name.clone(),
                    property: property.name.clone(),
                    actual: property.property_type.clone(),
                    expected: self.names.timestamp.clone(),
                });
            }
            flagged.push(FlaggedProperty {
                type_name: ty.name.clone(),
                property: property.name.clone(),
                options: extract_options(marker, &self.names.default_format),
            });
        }
        Ok(flagged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WeaverConfig;
    use stampweave_ir::TypeSig;
    use stampweave_test_utils::{ignore, marker, test_item, ModelBuilder};

    fn names() -> WeaveNames {
        WeaverConfig::new().names().unwrap()
    }

    #[test]
    fn selects_marked_properties_in_order() {
        let names = names();
        let flagged = PropertyScanner::new(&names).scan(&test_item()).unwrap();
        let props: Vec<&str> = flagged.iter().map(|f| f.property.as_str()).collect();
        assert_eq!(
            props,
            [
                "Test",
                "Test_KeepOriginal_CustomFormat",
                "Test_Columnname",
                "Test_KeepOriginal_Columnname"
            ]
        );
        assert_eq!(flagged[1].options.format, "yyyy-MM-dd, HH:mm:ss");
        assert!(flagged[3].options.keep_original);
    }

    #[test]
    fn unmarked_type_yields_nothing() {
        let names = names();
        let ty = ModelBuilder::new("Models.Plain").property("Name", TypeSig::String, vec![]).build();
        assert!(PropertyScanner::new(&names).scan(&ty).unwrap().is_empty());
    }

    #[test]
    fn wrong_type_is_a_mismatch() {
        let names = names();
        let ty = ModelBuilder::new("Models.Bad")
            .property("Count", TypeSig::Int32, vec![marker(&[])])
            .build();
        let err = PropertyScanner::new(&names).scan(&ty).unwrap_err();
        assert!(matches!(err, WeaveError::TypeMismatch { ref property, .. } if property == "Count"));
    }

    #[test]
    fn excluded_wrong_type_is_ignored() {
        let names = names();
        let ty = ModelBuilder::new("Models.Skipped")
            .property("Count", TypeSig::Int32, vec![marker(&[]), ignore()])
            .build();
        assert!(PropertyScanner::new(&names).scan(&ty).unwrap().is_empty());
    }
}
