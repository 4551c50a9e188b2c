//! Host-side values exchanged with bound native code.

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use crate::BindError;

/// Signature of a host function callable from native code.
pub type HostFnInner = dyn Fn(&[Value]) -> Result<Value, BindError>;

/// A reference-counted host function.
///
/// Cloning shares the underlying closure; two clones compare equal.
#[derive(Clone)]
pub struct HostFunction {
    inner: Rc<HostFnInner>,
}

impl HostFunction {
    /// Wrap a closure as a host function.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, BindError> + 'static,
    {
        Self { inner: Rc::new(f) }
    }

    /// Call the function with the given arguments.
    pub fn call(&self, args: &[Value]) -> Result<Value, BindError> {
        (self.inner)(args)
    }

    /// Whether both handles share one closure.
    pub fn ptr_eq(&self, other: &HostFunction) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for HostFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostFunction").finish_non_exhaustive()
    }
}

/// A host object wrapping a native pointer.
///
/// Implemented by the wrapped-instance type of each bound class. The
/// marshaling layer only needs the class name and the pointer; everything
/// else is reached through [`NativeObject::into_any`].
pub trait NativeObject: fmt::Debug {
    /// Name of the bound class this object is an instance of.
    fn class_name(&self) -> &str;

    /// The native pointer, or `None` once the instance was freed.
    fn native_ptr(&self) -> Option<u32>;

    /// Upcast for downcasting to the concrete wrapper.
    fn into_any(self: Rc<Self>) -> Rc<dyn Any>;
}

/// A by-value object built on the host side.
///
/// Value records cross the boundary through the value-object pool rather
/// than as pointers: native code receives a pool index and reads the
/// fields back exactly once.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueRecord {
    /// Name of the native class the record stands for.
    pub type_name: String,
    /// Constructor arguments, in declaration order.
    pub fields: Vec<Value>,
}

impl ValueRecord {
    pub fn new(type_name: impl Into<String>, fields: Vec<Value>) -> Self {
        Self {
            type_name: type_name.into(),
            fields,
        }
    }
}

/// A dynamic host value.
#[derive(Clone)]
pub enum Value {
    /// Absent value; also the result of `void` calls.
    Undefined,
    /// Explicit null (null pointers, empty callbacks).
    Null,
    Bool(bool),
    /// The host's native numeric type.
    Number(f64),
    /// 64-bit integer the host number type cannot hold losslessly.
    Int64(i64),
    String(String),
    Function(HostFunction),
    /// Wrapped native class instance.
    Instance(Rc<dyn NativeObject>),
    /// By-value object.
    Record(Rc<ValueRecord>),
}

impl Value {
    /// Get a human-readable name for this value's type.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::Int64(_) => "int64",
            Value::String(_) => "string",
            Value::Function(_) => "function",
            Value::Instance(_) => "instance",
            Value::Record(_) => "record",
        }
    }

    /// Check if this value is undefined.
    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    /// Check if this value is null or undefined.
    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Null | Value::Undefined)
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&HostFunction> {
        match self {
            Value::Function(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_instance(&self) -> Option<&Rc<dyn NativeObject>> {
        match self {
            Value::Instance(obj) => Some(obj),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&ValueRecord> {
        match self {
            Value::Record(rec) => Some(rec),
            _ => None,
        }
    }

    /// Host truthiness, used when coercing to `bool`.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Int64(v) => *v != 0,
            Value::String(s) => !s.is_empty(),
            Value::Function(_) | Value::Instance(_) | Value::Record(_) => true,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "Undefined"),
            Value::Null => write!(f, "Null"),
            Value::Bool(v) => write!(f, "Bool({})", v),
            Value::Number(v) => write!(f, "Number({})", v),
            Value::Int64(v) => write!(f, "Int64({})", v),
            Value::String(s) => write!(f, "String({:?})", s),
            Value::Function(_) => write!(f, "Function(...)"),
            Value::Instance(obj) => write!(f, "Instance({:?})", obj),
            Value::Record(rec) => write!(f, "Record({:?})", rec),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) => true,
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Int64(a), Value::Int64(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => a.ptr_eq(b),
            (Value::Instance(a), Value::Instance(b)) => Rc::ptr_eq(a, b),
            (Value::Record(a), Value::Record(b)) => a == b,
            _ => false,
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Number(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Number(v as f64)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<HostFunction> for Value {
    fn from(v: HostFunction) -> Self {
        Value::Function(v)
    }
}

impl From<ValueRecord> for Value {
    fn from(v: ValueRecord) -> Self {
        Value::Record(Rc::new(v))
    }
}
