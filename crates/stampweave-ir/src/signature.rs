//! Type signatures and member references
//!
//! Members are referenced by name and signature rather than by token, so a
//! reference stays valid while the owning type is being edited.

use crate::name::FullName;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// Type of a field, property, parameter or return value
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeSig {
    /// No value
    Void,
    /// `System.Boolean`
    Boolean,
    /// `System.Int32`
    Int32,
    /// `System.Int64`
    Int64,
    /// `System.String`
    String,
    /// `System.Object`
    Object,
    /// Any other type, by fully-qualified name
    Named {
        /// Fully-qualified type name
        name: FullName,
        /// Whether instances are stored inline (structs)
        value_type: bool,
    },
}

impl TypeSig {
    /// Reference type by name
    #[inline]
    #[must_use]
    pub fn class(name: FullName) -> Self {
        Self::Named {
            name,
            value_type: false,
        }
    }

    /// Value type by name
    #[inline]
    #[must_use]
    pub fn value(name: FullName) -> Self {
        Self::Named {
            name,
            value_type: true,
        }
    }

    /// Canonical fully-qualified name used for exact type matching
    #[must_use]
    pub fn full_name(&self) -> FullName {
        let system = |name: &str| FullName::new(vec!["System".to_string(), name.to_string()]);
        match self {
            Self::Void => system("Void"),
            Self::Boolean => system("Boolean"),
            Self::Int32 => system("Int32"),
            Self::Int64 => system("Int64"),
            Self::String => system("String"),
            Self::Object => system("Object"),
            Self::Named { name, .. } => name.clone(),
        }
    }

    /// Check whether this signature denotes exactly `name`
    #[inline]
    #[must_use]
    pub fn is(&self, name: &FullName) -> bool {
        self.full_name() == *name
    }

    /// Whether values of this type are stored inline
    #[inline]
    #[must_use]
    pub fn is_value_type(&self) -> bool {
        match self {
            Self::Boolean | Self::Int32 | Self::Int64 => true,
            Self::Named { value_type, .. } => *value_type,
            Self::Void | Self::String | Self::Object => false,
        }
    }
}

impl Display for TypeSig {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.full_name())
    }
}

/// Reference to a field of some type
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldRef {
    /// Type declaring the field
    pub declaring_type: FullName,
    /// Field name
    pub name: String,
    /// Field type
    pub field_type: TypeSig,
}

impl Display for FieldRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}::{}", self.field_type, self.declaring_type, self.name)
    }
}

/// Reference to a method, local or imported from another library
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MethodRef {
    /// Type declaring the method
    pub declaring_type: FullName,
    /// Method name
    pub name: String,
    /// Whether the method takes an implicit instance argument
    pub has_this: bool,
    /// Parameter types in order
    pub params: Vec<TypeSig>,
    /// Return type
    pub return_type: TypeSig,
    /// Library the method was imported from (`None` for module-local methods)
    pub scope: Option<String>,
}

impl MethodRef {
    /// `Type::Name` key, without signature
    #[must_use]
    pub fn key(&self) -> String {
        format!("{}::{}", self.declaring_type, self.name)
    }

    /// `Type::Name(P1,P2)` key, unique among overloads
    #[must_use]
    pub fn signature_key(&self) -> String {
        let params: Vec<String> = self.params.iter().map(ToString::to_string).collect();
        format!("{}::{}({})", self.declaring_type, self.name, params.join(","))
    }

    /// Number of stack slots consumed by a call (arguments plus instance)
    #[inline]
    #[must_use]
    pub fn arg_slots(&self) -> usize {
        self.params.len() + usize::from(self.has_this)
    }

    /// Whether a call leaves a value on the stack
    #[inline]
    #[must_use]
    pub fn returns_value(&self) -> bool {
        self.return_type != TypeSig::Void
    }

    /// Same reference, bound to a library scope
    #[inline]
    #[must_use]
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    /// Whether two references denote the same method, ignoring scope
    #[inline]
    #[must_use]
    pub fn same_method(&self, other: &Self) -> bool {
        self.declaring_type == other.declaring_type
            && self.name == other.name
            && self.has_this == other.has_this
            && self.params == other.params
    }
}

impl Display for MethodRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let params: Vec<String> = self.params.iter().map(ToString::to_string).collect();
        write!(
            f,
            "{} {}::{}({})",
            self.return_type,
            self.declaring_type,
            self.name,
            params.join(",")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timestamp() -> TypeSig {
        TypeSig::value("System.DateTimeOffset".parse().unwrap())
    }

    #[test]
    fn primitive_full_names() {
        assert_eq!(TypeSig::String.full_name().to_string(), "System.String");
        assert_eq!(TypeSig::Int32.full_name().to_string(), "System.Int32");
        assert!(TypeSig::String.is(&"System.String".parse().unwrap()));
    }

    #[test]
    fn named_type_matches_exactly() {
        let ts = timestamp();
        assert!(ts.is(&"System.DateTimeOffset".parse().unwrap()));
        assert!(!ts.is(&"System.DateTime".parse().unwrap()));
        assert!(ts.is_value_type());
    }

    #[test]
    fn method_ref_keys() {
        let parse = MethodRef {
            declaring_type: "System.DateTimeOffset".parse().unwrap(),
            name: "ParseExact".to_string(),
            has_this: false,
            params: vec![
                TypeSig::String,
                TypeSig::String,
                TypeSig::class("System.IFormatProvider".parse().unwrap()),
            ],
            return_type: timestamp(),
            scope: None,
        };
        assert_eq!(parse.key(), "System.DateTimeOffset::ParseExact");
        assert_eq!(
            parse.signature_key(),
            "System.DateTimeOffset::ParseExact(System.String,System.String,System.IFormatProvider)"
        );
        assert_eq!(parse.arg_slots(), 3);
        assert!(parse.returns_value());
    }

    #[test]
    fn scope_does_not_affect_identity() {
        let local = MethodRef {
            declaring_type: "Models.Item".parse().unwrap(),
            name: "get_When".to_string(),
            has_this: true,
            params: Vec::new(),
            return_type: timestamp(),
            scope: None,
        };
        let scoped = local.clone().with_scope("Models");
        assert_ne!(local, scoped);
        assert!(local.same_method(&scoped));
    }
}
