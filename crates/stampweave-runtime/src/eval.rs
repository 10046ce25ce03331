//! Evaluator for method bodies
//!
//! Executes the straight-line bodies found in property accessors and
//! constructors against a small object heap. Methods declared with a body in
//! a loaded module are interpreted; the timestamp conversion surface and the
//! root object constructor are implemented natively.

use crate::error::EvalError;
use crate::format::{format, parse_exact};
use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone, Utc};
use stampweave_ir::{
    FullName, MethodBody, MethodDef, MethodRef, Module, OpCode, Operand, TypeDef, TypeSig,
};
use std::collections::BTreeMap;

const MAX_DEPTH: usize = 64;

/// Handle to a heap object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjRef(usize);

/// Storage location an address value points at
#[derive(Debug, Clone, PartialEq)]
pub enum Location {
    /// Instance field of a heap object
    Field { object: ObjRef, field: String },
    /// Copy of an argument
    Value(Box<Value>),
}

/// Runtime value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int32(i32),
    Int64(i64),
    String(String),
    Timestamp(DateTime<FixedOffset>),
    /// The invariant culture (format provider)
    Culture,
    Object(ObjRef),
    /// Managed address (`ldflda` / `ldarga`)
    Ref(Location),
}

impl Value {
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_timestamp(&self) -> Option<DateTime<FixedOffset>> {
        match self {
            Self::Timestamp(t) => Some(*t),
            _ => None,
        }
    }

    fn kind(&self) -> String {
        match self {
            Self::Null => "null".into(),
            Self::Bool(_) => "bool".into(),
            Self::Int32(_) => "int32".into(),
            Self::Int64(_) => "int64".into(),
            Self::String(_) => "string".into(),
            Self::Timestamp(_) => "timestamp".into(),
            Self::Culture => "culture".into(),
            Self::Object(_) => "object".into(),
            Self::Ref(_) => "address".into(),
        }
    }
}

/// Names of the natively implemented runtime surface
#[derive(Debug, Clone)]
pub struct NativeSurface {
    pub timestamp_type: FullName,
    pub culture_type: FullName,
    pub culture_property: String,
}

impl Default for NativeSurface {
    fn default() -> Self {
        Self {
            timestamp_type: FullName::new(vec!["System".into(), "DateTimeOffset".into()]),
            culture_type: FullName::new(vec![
                "System".into(),
                "Globalization".into(),
                "CultureInfo".into(),
            ]),
            culture_property: "InvariantCulture".into(),
        }
    }
}

#[derive(Debug)]
struct Object {
    type_name: FullName,
    fields: BTreeMap<String, Value>,
}

/// Interpreter over a set of loaded modules
#[derive(Debug, Default)]
pub struct Evaluator {
    modules: Vec<Module>,
    heap: Vec<Object>,
    surface: NativeSurface,
}

fn default_timestamp() -> Value {
    NaiveDate::from_ymd_opt(1, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map_or(Value::Null, |naive| {
            Value::Timestamp(Utc.from_utc_datetime(&naive).fixed_offset())
        })
}

impl Evaluator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_surface(surface: NativeSurface) -> Self {
        Self {
            surface,
            ..Self::default()
        }
    }

    /// Make a module's types and method bodies available
    pub fn load(&mut self, module: Module) {
        self.modules.push(module);
    }

    fn find_type(&self, name: &FullName) -> Option<&TypeDef> {
        self.modules.iter().find_map(|m| m.find_type(name))
    }

    fn body_of(&self, method: &MethodRef) -> Option<MethodBody> {
        self.modules
            .iter()
            .find_map(|m| m.resolve_method(method))
            .and_then(|def| def.body.clone())
    }

    fn default_value(&self, sig: &TypeSig) -> Value {
        match sig {
            TypeSig::Boolean => Value::Bool(false),
            TypeSig::Int32 => Value::Int32(0),
            TypeSig::Int64 => Value::Int64(0),
            TypeSig::Named { name, .. } if *name == self.surface.timestamp_type => default_timestamp(),
            _ => Value::Null,
        }
    }

    fn allocate(&mut self, type_name: &FullName) -> Result<ObjRef, EvalError> {
        let ty = self
            .find_type(type_name)
            .ok_or_else(|| EvalError::UnknownType(type_name.clone()))?;
        let fields = ty
            .fields
            .iter()
            .filter(|f| !f.is_static)
            .map(|f| (f.name.clone(), self.default_value(&f.field_type)))
            .collect();
        self.heap.push(Object {
            type_name: type_name.clone(),
            fields,
        });
        Ok(ObjRef(self.heap.len() - 1))
    }

    /// Allocate an instance and run its parameterless constructor, if any
    ///
    /// # Errors
    /// Returns an error if the type is unknown or the constructor fails
    pub fn new_object(&mut self, type_name: &FullName) -> Result<ObjRef, EvalError> {
        let obj = self.allocate(type_name)?;
        let ctor = self.find_type(type_name).and_then(|ty| {
            ty.methods
                .iter()
                .find(|m| m.is_constructor() && m.params.is_empty())
                .map(|m| m.reference(&ty.name))
        });
        if let Some(ctor) = ctor {
            self.invoke(&ctor, vec![Value::Object(obj)])?;
        }
        Ok(obj)
    }

    /// Current value of an instance field
    #[must_use]
    pub fn field(&self, obj: ObjRef, name: &str) -> Option<&Value> {
        self.heap.get(obj.0).and_then(|o| o.fields.get(name))
    }

    fn accessor(&self, obj: ObjRef, property: &str, getter: bool) -> Result<MethodRef, EvalError> {
        let type_name = &self.heap.get(obj.0).ok_or(EvalError::NullReference)?.type_name;
        let ty = self
            .find_type(type_name)
            .ok_or_else(|| EvalError::UnknownType(type_name.clone()))?;
        let prop = ty.property(property).ok_or_else(|| EvalError::UnknownProperty {
            type_name: type_name.clone(),
            property: property.to_string(),
        })?;
        let (name, kind) = if getter {
            (prop.getter.as_ref(), "get")
        } else {
            (prop.setter.as_ref(), "set")
        };
        name.and_then(|n| ty.method(n))
            .map(|m: &MethodDef| m.reference(&ty.name))
            .ok_or_else(|| EvalError::NoAccessor(property.to_string(), kind))
    }

    /// Read a property through its getter
    ///
    /// # Errors
    /// Returns an error if the property or getter is missing or fails
    pub fn get_property(&mut self, obj: ObjRef, property: &str) -> Result<Value, EvalError> {
        let getter = self.accessor(obj, property, true)?;
        Ok(self
            .invoke(&getter, vec![Value::Object(obj)])?
            .unwrap_or(Value::Null))
    }

    /// Write a property through its setter
    ///
    /// # Errors
    /// Returns an error if the property or setter is missing or fails
    pub fn set_property(&mut self, obj: ObjRef, property: &str, value: Value) -> Result<(), EvalError> {
        let setter = self.accessor(obj, property, false)?;
        self.invoke(&setter, vec![Value::Object(obj), value])?;
        Ok(())
    }

    /// Call a method with its full argument list (instance first)
    ///
    /// # Errors
    /// Returns an error if the method cannot be found or execution fails
    pub fn invoke(&mut self, method: &MethodRef, args: Vec<Value>) -> Result<Option<Value>, EvalError> {
        self.invoke_at(method, args, 0)
    }

    fn invoke_at(
        &mut self,
        method: &MethodRef,
        args: Vec<Value>,
        depth: usize,
    ) -> Result<Option<Value>, EvalError> {
        if depth > MAX_DEPTH {
            return Err(EvalError::DepthExceeded(MAX_DEPTH));
        }
        if let Some(body) = self.body_of(method) {
            return self.run(method, &body, args, depth);
        }
        match self.native(method, &args) {
            Some(result) => result,
            None => Err(EvalError::UnknownMethod(method.signature_key())),
        }
    }

    fn deref(&self, value: Value) -> Value {
        match value {
            Value::Ref(Location::Field { object, field }) => {
                self.field(object, &field).cloned().unwrap_or(Value::Null)
            }
            Value::Ref(Location::Value(inner)) => *inner,
            other => other,
        }
    }

    fn object_of(&self, value: Value) -> Result<ObjRef, EvalError> {
        match self.deref(value) {
            Value::Object(obj) => Ok(obj),
            Value::Null => Err(EvalError::NullReference),
            other => Err(EvalError::TypeMismatch {
                expected: "object",
                found: other.kind(),
            }),
        }
    }

    fn string_arg(&self, value: &Value) -> Result<String, EvalError> {
        match self.deref(value.clone()) {
            Value::String(s) => Ok(s),
            Value::Null => Err(EvalError::NullReference),
            other => Err(EvalError::TypeMismatch {
                expected: "string",
                found: other.kind(),
            }),
        }
    }

    fn native_parse(&self, args: &[Value]) -> Result<Option<Value>, EvalError> {
        let text = self.string_arg(&args[0])?;
        let pattern = self.string_arg(&args[1])?;
        Ok(Some(Value::Timestamp(parse_exact(&text, &pattern)?)))
    }

    fn native_to_string(&self, args: &[Value]) -> Result<Option<Value>, EvalError> {
        let this = match self.deref(args[0].clone()) {
            Value::Timestamp(t) => t,
            other => {
                return Err(EvalError::TypeMismatch {
                    expected: "timestamp",
                    found: other.kind(),
                })
            }
        };
        let pattern = self.string_arg(&args[1])?;
        Ok(Some(Value::String(format(&this, &pattern)?)))
    }

    fn native(&self, method: &MethodRef, args: &[Value]) -> Option<Result<Option<Value>, EvalError>> {
        let surface = &self.surface;
        let on_timestamp = method.declaring_type == surface.timestamp_type;

        if on_timestamp && method.name == "ParseExact" && !method.has_this && args.len() == 3 {
            return Some(self.native_parse(args));
        }
        if on_timestamp
            && method.name == "ToString"
            && method.has_this
            && method.params == [TypeSig::String]
            && args.len() == 2
        {
            return Some(self.native_to_string(args));
        }
        if method.declaring_type == surface.culture_type
            && !method.has_this
            && method.name == format!("get_{}", surface.culture_property)
        {
            return Some(Ok(Some(Value::Culture)));
        }
        if method.declaring_type.to_string() == "System.Object" && method.name == MethodDef::CONSTRUCTOR {
            return Some(Ok(None));
        }
        None
    }

    fn run(
        &mut self,
        method: &MethodRef,
        body: &MethodBody,
        args: Vec<Value>,
        depth: usize,
    ) -> Result<Option<Value>, EvalError> {
        let name = method.key();
        let mut stack: Vec<Value> = Vec::with_capacity(usize::from(body.max_stack));
        let underflow = || EvalError::StackUnderflow(name.clone());
        let arg = |slot: u16| -> Result<Value, EvalError> {
            args.get(usize::from(slot))
                .cloned()
                .ok_or(EvalError::BadArgument(slot))
        };

        for instr in &body.instructions {
            tracing::trace!(method = %name, instr = %instr, depth = stack.len(), "step");
            match instr.opcode() {
                OpCode::Nop => {}
                OpCode::Ldarg0 => stack.push(arg(0)?),
                OpCode::Ldarg1 => stack.push(arg(1)?),
                OpCode::Ldarg2 => stack.push(arg(2)?),
                OpCode::Ldarg3 => stack.push(arg(3)?),
                OpCode::LdargS | OpCode::LdargaS => {
                    let Operand::Arg(slot) = instr.operand() else {
                        return Err(underflow());
                    };
                    let value = arg(*slot)?;
                    if instr.opcode() == OpCode::LdargaS {
                        stack.push(Value::Ref(Location::Value(Box::new(value))));
                    } else {
                        stack.push(value);
                    }
                }
                OpCode::Ldnull => stack.push(Value::Null),
                OpCode::LdcI4 => {
                    if let Operand::Int32(v) = instr.operand() {
                        stack.push(Value::Int32(*v));
                    }
                }
                OpCode::Ldstr => {
                    if let Operand::String(s) = instr.operand() {
                        stack.push(Value::String(s.clone()));
                    }
                }
                OpCode::Ldfld | OpCode::Ldflda => {
                    let field = instr.field().ok_or_else(underflow)?;
                    let obj = self.object_of(stack.pop().ok_or_else(underflow)?)?;
                    if instr.opcode() == OpCode::Ldflda {
                        stack.push(Value::Ref(Location::Field {
                            object: obj,
                            field: field.name.clone(),
                        }));
                    } else {
                        stack.push(self.field(obj, &field.name).cloned().unwrap_or(Value::Null));
                    }
                }
                OpCode::Stfld => {
                    let field = instr.field().ok_or_else(underflow)?;
                    let value = stack.pop().ok_or_else(underflow)?;
                    let obj = self.object_of(stack.pop().ok_or_else(underflow)?)?;
                    if let Some(target) = self.heap.get_mut(obj.0) {
                        target.fields.insert(field.name.clone(), value);
                    }
                }
                OpCode::Call | OpCode::Callvirt => {
                    let callee = instr.method().ok_or_else(underflow)?;
                    let n = callee.arg_slots();
                    if stack.len() < n {
                        return Err(underflow());
                    }
                    let call_args = stack.split_off(stack.len() - n);
                    let result = self.invoke_at(callee, call_args, depth + 1)?;
                    if callee.returns_value() {
                        stack.push(result.unwrap_or(Value::Null));
                    }
                }
                OpCode::Newobj => {
                    let ctor = instr.method().ok_or_else(underflow)?;
                    let n = ctor.params.len();
                    if stack.len() < n {
                        return Err(underflow());
                    }
                    let params = stack.split_off(stack.len() - n);
                    let obj = self.allocate(&ctor.declaring_type)?;
                    let mut call_args = Vec::with_capacity(n + 1);
                    call_args.push(Value::Object(obj));
                    call_args.extend(params);
                    self.invoke_at(ctor, call_args, depth + 1)?;
                    stack.push(Value::Object(obj));
                }
                OpCode::Dup => {
                    let top = stack.last().cloned().ok_or_else(underflow)?;
                    stack.push(top);
                }
                OpCode::Pop => {
                    stack.pop().ok_or_else(underflow)?;
                }
                OpCode::Ret => {
                    return Ok(if method.returns_value() { stack.pop() } else { None });
                }
            }
        }
        Ok(None)
    }
}
