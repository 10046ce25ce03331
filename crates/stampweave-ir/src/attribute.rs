//! Custom attributes attached to types and members

use crate::name::FullName;
use crate::signature::{MethodRef, TypeSig};
use serde::{Deserialize, Serialize};

/// Positional constructor argument of a custom attribute
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttrArg {
    /// String literal
    String(String),
    /// Boolean literal
    Boolean(bool),
    /// 32-bit integer literal
    Int32(i32),
}

impl AttrArg {
    /// Declared value kind of the argument
    #[must_use]
    pub fn kind(&self) -> TypeSig {
        match self {
            Self::String(_) => TypeSig::String,
            Self::Boolean(_) => TypeSig::Boolean,
            Self::Int32(_) => TypeSig::Int32,
        }
    }

    /// String payload, if this is a string argument
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Boolean payload, if this is a boolean argument
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            _ => None,
        }
    }
}

/// Attribute instance: constructor plus positional arguments
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CustomAttribute {
    /// Attribute constructor
    pub ctor: MethodRef,
    /// Constructor arguments in declaration order
    pub args: Vec<AttrArg>,
}

impl CustomAttribute {
    /// Attribute with no arguments
    #[inline]
    #[must_use]
    pub fn new(ctor: MethodRef) -> Self {
        Self {
            ctor,
            args: Vec::new(),
        }
    }

    /// Append a constructor argument
    #[inline]
    #[must_use]
    pub fn with_arg(mut self, arg: AttrArg) -> Self {
        self.args.push(arg);
        self
    }

    /// Attribute type (the constructor's declaring type)
    #[inline]
    #[must_use]
    pub fn attribute_type(&self) -> &FullName {
        &self.ctor.declaring_type
    }

    /// Check the attribute type by fully-qualified name
    #[inline]
    #[must_use]
    pub fn is(&self, name: &FullName) -> bool {
        self.attribute_type() == name
    }
}

/// Lookup helpers over an attribute list
pub trait AttributeList {
    /// First attribute of the given type
    fn find_attribute(&self, name: &FullName) -> Option<&CustomAttribute>;

    /// Whether an attribute of the given type is present
    fn has_attribute(&self, name: &FullName) -> bool {
        self.find_attribute(name).is_some()
    }
}

impl AttributeList for [CustomAttribute] {
    fn find_attribute(&self, name: &FullName) -> Option<&CustomAttribute> {
        self.iter().find(|a| a.is(name))
    }
}

impl AttributeList for Vec<CustomAttribute> {
    fn find_attribute(&self, name: &FullName) -> Option<&CustomAttribute> {
        self.as_slice().find_attribute(name)
    }
}
