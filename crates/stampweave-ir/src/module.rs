//! Module, type and member definitions
//!
//! The ownership graph of a compiled module: a [`Module`] owns its types in
//! declaration order; a [`TypeDef`] owns fields, properties, methods and
//! attributes; a [`MethodDef`] owns its optional [`MethodBody`].

use crate::attribute::CustomAttribute;
use crate::body::MethodBody;
use crate::error::IrError;
use crate::name::FullName;
use crate::signature::{FieldRef, MethodRef, TypeSig};
use serde::{Deserialize, Serialize};

/// Member accessibility
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Access {
    #[default]
    Private,
    Assembly,
    Family,
    Public,
}

/// Name of the compiler-generated backing field of an auto-property
#[must_use]
pub fn backing_field_name(property: &str) -> String {
    format!("<{property}>k__BackingField")
}

/// Field definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    pub field_type: TypeSig,
    pub access: Access,
    pub is_static: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<CustomAttribute>,
}

impl FieldDef {
    /// Private instance field
    #[must_use]
    pub fn private(name: impl Into<String>, field_type: TypeSig) -> Self {
        Self {
            name: name.into(),
            field_type,
            access: Access::Private,
            is_static: false,
            attributes: Vec::new(),
        }
    }

    /// Reference to this field as declared by `owner`
    #[must_use]
    pub fn reference(&self, owner: &FullName) -> FieldRef {
        FieldRef {
            declaring_type: owner.clone(),
            name: self.name.clone(),
            field_type: self.field_type.clone(),
        }
    }
}

/// Method parameter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub param_type: TypeSig,
}

/// Method attribute flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MethodFlags {
    pub access: Access,
    pub is_static: bool,
    pub special_name: bool,
    pub hide_by_sig: bool,
}

impl MethodFlags {
    /// `public hidebysig specialname` instance method (property accessors)
    #[must_use]
    pub const fn accessor() -> Self {
        Self {
            access: Access::Public,
            is_static: false,
            special_name: true,
            hide_by_sig: true,
        }
    }
}

/// Method definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodDef {
    pub name: String,
    pub flags: MethodFlags,
    pub params: Vec<Param>,
    pub return_type: TypeSig,
    pub body: Option<MethodBody>,
}

impl MethodDef {
    /// Instance constructor name
    pub const CONSTRUCTOR: &'static str = ".ctor";

    /// Method with an empty body
    #[must_use]
    pub fn new(name: impl Into<String>, flags: MethodFlags, return_type: TypeSig) -> Self {
        Self {
            name: name.into(),
            flags,
            params: Vec::new(),
            return_type,
            body: Some(MethodBody::default()),
        }
    }

    /// Method without a body (declared in a library surface)
    #[must_use]
    pub fn external(name: impl Into<String>, flags: MethodFlags, return_type: TypeSig) -> Self {
        Self {
            body: None,
            ..Self::new(name, flags, return_type)
        }
    }

    /// Append a parameter
    #[must_use]
    pub fn with_param(mut self, name: impl Into<String>, param_type: TypeSig) -> Self {
        self.params.push(Param {
            name: name.into(),
            param_type,
        });
        self
    }

    /// Replace the body
    #[must_use]
    pub fn with_body(mut self, body: MethodBody) -> Self {
        self.body = Some(body);
        self
    }

    /// Whether this is an instance constructor
    #[inline]
    #[must_use]
    pub fn is_constructor(&self) -> bool {
        self.name == Self::CONSTRUCTOR && !self.flags.is_static
    }

    /// Parameter types in order
    #[must_use]
    pub fn param_types(&self) -> Vec<TypeSig> {
        self.params.iter().map(|p| p.param_type.clone()).collect()
    }

    /// Reference to this method as declared by `owner`
    #[must_use]
    pub fn reference(&self, owner: &FullName) -> MethodRef {
        MethodRef {
            declaring_type: owner.clone(),
            name: self.name.clone(),
            has_this: !self.flags.is_static,
            params: self.param_types(),
            return_type: self.return_type.clone(),
            scope: None,
        }
    }

    /// Whether `method` refers to this definition
    #[must_use]
    pub fn matches(&self, owner: &FullName, method: &MethodRef) -> bool {
        method.declaring_type == *owner
            && method.name == self.name
            && method.has_this != self.flags.is_static
            && method.params == self.param_types()
    }
}

/// Property definition; accessors are named methods of the same type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyDef {
    pub name: String,
    pub property_type: TypeSig,
    pub getter: Option<String>,
    pub setter: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<CustomAttribute>,
}

impl PropertyDef {
    /// Property with no accessors
    #[must_use]
    pub fn new(name: impl Into<String>, property_type: TypeSig) -> Self {
        Self {
            name: name.into(),
            property_type,
            getter: None,
            setter: None,
            attributes: Vec::new(),
        }
    }

    /// Set the accessor method names
    #[must_use]
    pub fn with_accessors(mut self, getter: Option<String>, setter: Option<String>) -> Self {
        self.getter = getter;
        self.setter = setter;
        self
    }

    /// Attach an attribute
    #[must_use]
    pub fn with_attribute(mut self, attribute: CustomAttribute) -> Self {
        self.attributes.push(attribute);
        self
    }

    /// Remove every attribute of the given type, returning how many were removed
    pub fn remove_attributes(&mut self, name: &FullName) -> usize {
        let before = self.attributes.len();
        self.attributes.retain(|a| !a.is(name));
        before - self.attributes.len()
    }
}

/// Type definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDef {
    pub name: FullName,
    pub is_value_type: bool,
    pub base_type: Option<TypeSig>,
    pub fields: Vec<FieldDef>,
    pub properties: Vec<PropertyDef>,
    pub methods: Vec<MethodDef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<CustomAttribute>,
}

impl TypeDef {
    /// Empty class deriving from `System.Object`
    #[must_use]
    pub fn class(name: FullName) -> Self {
        Self {
            name,
            is_value_type: false,
            base_type: Some(TypeSig::Object),
            fields: Vec::new(),
            properties: Vec::new(),
            methods: Vec::new(),
            attributes: Vec::new(),
        }
    }

    /// Empty value type
    #[must_use]
    pub fn value_type(name: FullName) -> Self {
        Self {
            is_value_type: true,
            base_type: None,
            ..Self::class(name)
        }
    }

    /// Signature denoting this type
    #[must_use]
    pub fn signature(&self) -> TypeSig {
        if self.is_value_type {
            TypeSig::value(self.name.clone())
        } else {
            TypeSig::class(self.name.clone())
        }
    }

    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    #[must_use]
    pub fn property(&self, name: &str) -> Option<&PropertyDef> {
        self.properties.iter().find(|p| p.name == name)
    }

    pub fn property_mut(&mut self, name: &str) -> Option<&mut PropertyDef> {
        self.properties.iter_mut().find(|p| p.name == name)
    }

    /// First method with the given name
    #[must_use]
    pub fn method(&self, name: &str) -> Option<&MethodDef> {
        self.methods.iter().find(|m| m.name == name)
    }

    pub fn method_mut(&mut self, name: &str) -> Option<&mut MethodDef> {
        self.methods.iter_mut().find(|m| m.name == name)
    }

    /// Method definition a reference points at, if declared here
    #[must_use]
    pub fn resolve_method(&self, method: &MethodRef) -> Option<&MethodDef> {
        self.methods.iter().find(|m| m.matches(&self.name, method))
    }

    /// Whether any field, property or method uses `name`
    #[must_use]
    pub fn has_member(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f.name == name)
            || self.properties.iter().any(|p| p.name == name)
            || self.methods.iter().any(|m| m.name == name)
    }

    /// Instance constructors
    pub fn constructors_mut(&mut self) -> impl Iterator<Item = &mut MethodDef> {
        self.methods.iter_mut().filter(|m| m.is_constructor())
    }

    /// Reference to a field declared by this type
    #[must_use]
    pub fn field_ref(&self, name: &str) -> Option<FieldRef> {
        self.field(name).map(|f| f.reference(&self.name))
    }

    /// Reference to the first method with the given name
    #[must_use]
    pub fn method_ref(&self, name: &str) -> Option<MethodRef> {
        self.method(name).map(|m| m.reference(&self.name))
    }

    /// Add a field
    ///
    /// # Errors
    /// Returns [`IrError::DuplicateMember`] if a field of that name exists
    pub fn add_field(&mut self, field: FieldDef) -> Result<FieldRef, IrError> {
        if self.field(&field.name).is_some() {
            return Err(self.duplicate(&field.name));
        }
        let reference = field.reference(&self.name);
        self.fields.push(field);
        Ok(reference)
    }

    /// Add a method
    ///
    /// # Errors
    /// Returns [`IrError::DuplicateMember`] if a method with the same name and
    /// parameters exists
    pub fn add_method(&mut self, method: MethodDef) -> Result<MethodRef, IrError> {
        let reference = method.reference(&self.name);
        if self.resolve_method(&reference).is_some() {
            return Err(self.duplicate(&method.name));
        }
        self.methods.push(method);
        Ok(reference)
    }

    /// Add a property whose accessors (if any) are already declared
    ///
    /// # Errors
    /// Returns [`IrError::DuplicateMember`] or [`IrError::MissingAccessor`]
    pub fn add_property(&mut self, property: PropertyDef) -> Result<(), IrError> {
        if self.property(&property.name).is_some() {
            return Err(self.duplicate(&property.name));
        }
        self.check_accessors(&property)?;
        self.properties.push(property);
        Ok(())
    }

    fn check_accessors(&self, property: &PropertyDef) -> Result<(), IrError> {
        for accessor in property.getter.iter().chain(property.setter.iter()) {
            if self.method(accessor).is_none() {
                return Err(IrError::MissingAccessor {
                    property: property.name.clone(),
                    accessor: accessor.clone(),
                });
            }
        }
        Ok(())
    }

    fn duplicate(&self, member: &str) -> IrError {
        IrError::DuplicateMember {
            type_name: self.name.clone(),
            member: member.to_string(),
        }
    }

    /// Structural checks run after decoding
    ///
    /// # Errors
    /// Returns the first invalid instruction or dangling accessor
    pub fn validate(&self) -> Result<(), IrError> {
        for property in &self.properties {
            self.check_accessors(property)?;
        }
        for body in self.methods.iter().filter_map(|m| m.body.as_ref()) {
            for instr in &body.instructions {
                instr.validate()?;
            }
        }
        Ok(())
    }
}

/// Compiled module
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Module {
    /// Module (library) name
    pub name: String,
    /// Names of referenced libraries, in reference order
    pub references: Vec<String>,
    /// Types in declaration order
    pub types: Vec<TypeDef>,
    /// Members imported from referenced libraries
    pub member_refs: Vec<MethodRef>,
}

impl Module {
    /// Empty module
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            references: Vec::new(),
            types: Vec::new(),
            member_refs: Vec::new(),
        }
    }

    /// Add a library reference (no-op if already present)
    pub fn add_reference(&mut self, library: impl Into<String>) {
        let library = library.into();
        if !self.references.contains(&library) {
            self.references.push(library);
        }
    }

    /// Add a type
    ///
    /// # Errors
    /// Returns [`IrError::DuplicateType`] if the name is taken
    pub fn add_type(&mut self, ty: TypeDef) -> Result<(), IrError> {
        if self.find_type(&ty.name).is_some() {
            return Err(IrError::DuplicateType(ty.name));
        }
        self.types.push(ty);
        Ok(())
    }

    #[must_use]
    pub fn find_type(&self, name: &FullName) -> Option<&TypeDef> {
        self.types.iter().find(|t| t.name == *name)
    }

    pub fn find_type_mut(&mut self, name: &FullName) -> Option<&mut TypeDef> {
        self.types.iter_mut().find(|t| t.name == *name)
    }

    /// Method definition a reference points at, if declared in this module
    #[must_use]
    pub fn resolve_method(&self, method: &MethodRef) -> Option<&MethodDef> {
        self.find_type(&method.declaring_type)
            .and_then(|t| t.resolve_method(method))
    }

    /// Record an imported member reference, returning the canonical copy
    pub fn import(&mut self, method: MethodRef) -> MethodRef {
        if let Some(existing) = self.member_refs.iter().find(|m| **m == method) {
            return existing.clone();
        }
        if let Some(scope) = &method.scope {
            self.add_reference(scope.clone());
        }
        self.member_refs.push(method.clone());
        method
    }

    /// Structural checks run after decoding
    ///
    /// # Errors
    /// Returns the first structural problem found
    pub fn validate(&self) -> Result<(), IrError> {
        for (i, ty) in self.types.iter().enumerate() {
            if self.types[..i].iter().any(|t| t.name == ty.name) {
                return Err(IrError::DuplicateType(ty.name.clone()));
            }
            ty.validate()?;
        }
        Ok(())
    }
}
