//! JavaScript value representation.
//!
//! This module provides the core `Value` enum that represents every value that
//! can flow through the runtime: primitives inline, and reference types
//! (arrays, objects, functions, host objects) behind shared `Rc` handles.

use crate::{JsError, JsResult};
use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Represents any JavaScript value.
///
/// Primitive values are stored inline. Reference values are cheap to clone;
/// clones share the same underlying object, so identity is preserved.
///
/// # Examples
///
/// ```
/// use core_types::Value;
///
/// let items = Value::array(vec![Value::Smi(1), Value::Double(2.5)]);
/// let alias = items.clone();
///
/// assert!(alias.strict_equals(&items));
/// assert!(!Value::array(vec![]).strict_equals(&Value::array(vec![])));
/// assert_eq!(items.to_string(), "1,2.5");
/// ```
#[derive(Clone, Default)]
pub enum Value {
    /// JavaScript undefined value
    #[default]
    Undefined,
    /// JavaScript null value
    Null,
    /// JavaScript boolean (true or false)
    Boolean(bool),
    /// Small integer
    Smi(i32),
    /// IEEE 754 double-precision floating point
    Double(f64),
    /// JavaScript string value
    String(std::string::String),
    /// Array of values, shared by reference
    Array(Rc<RefCell<Vec<Value>>>),
    /// Plain object with named properties
    Object(Object),
    /// Callable function
    Function(Function),
    /// Error object (`new Error(...)`, `new TypeError(...)`)
    Error(JsError),
    /// Host object embedded by another component (promises, etc.)
    NativeObject(Rc<dyn Any>),
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "Undefined"),
            Value::Null => write!(f, "Null"),
            Value::Boolean(b) => f.debug_tuple("Boolean").field(b).finish(),
            Value::Smi(n) => f.debug_tuple("Smi").field(n).finish(),
            Value::Double(n) => f.debug_tuple("Double").field(n).finish(),
            Value::String(s) => f.debug_tuple("String").field(s).finish(),
            Value::Array(items) => f.debug_tuple("Array").field(&*items.borrow()).finish(),
            Value::Object(obj) => f.debug_tuple("Object").field(&obj.keys()).finish(),
            Value::Function(_) => write!(f, "Function(...)"),
            Value::Error(e) => f.debug_tuple("Error").field(e).finish(),
            Value::NativeObject(_) => write!(f, "NativeObject(...)"),
        }
    }
}

/// Arrays compare by contents, other reference types by identity.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) => true,
            (Value::Null, Value::Null) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Smi(a), Value::Smi(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow(),
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            (Value::Function(a), Value::Function(b)) => a.ptr_eq(b),
            (Value::Error(a), Value::Error(b)) => a == b,
            (Value::NativeObject(a), Value::NativeObject(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Value {
    /// Creates a new array value.
    pub fn array(items: Vec<Value>) -> Self {
        Value::Array(Rc::new(RefCell::new(items)))
    }

    /// Wraps a host object.
    pub fn native<T: Any>(object: Rc<T>) -> Self {
        Value::NativeObject(object)
    }

    /// Returns true for non-null objects and callables.
    pub fn is_object_like(&self) -> bool {
        matches!(
            self,
            Value::Array(_)
                | Value::Object(_)
                | Value::Function(_)
                | Value::Error(_)
                | Value::NativeObject(_)
        )
    }

    /// Returns the function if this value is callable.
    pub fn as_function(&self) -> Option<&Function> {
        match self {
            Value::Function(func) => Some(func),
            _ => None,
        }
    }

    /// Returns a snapshot of the array elements if this is an array.
    pub fn as_array(&self) -> Option<Vec<Value>> {
        match self {
            Value::Array(items) => Some(items.borrow().clone()),
            _ => None,
        }
    }

    /// Returns the embedded host object if it is a `T`.
    pub fn downcast_native<T: Any>(&self) -> Option<Rc<T>> {
        match self {
            Value::NativeObject(obj) => Rc::clone(obj).downcast::<T>().ok(),
            _ => None,
        }
    }

    /// Strict equality (`===`): every reference type compares by identity.
    pub fn strict_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b),
            _ => self == other,
        }
    }

    /// Returns whether a property named `key` exists on this value.
    ///
    /// Only objects and functions carry named properties.
    pub fn has_property(&self, key: &str) -> bool {
        match self {
            Value::Object(obj) => obj.has(key),
            Value::Function(func) => func.properties().has(key),
            _ => false,
        }
    }

    /// Reads a property, invoking a getter if one is defined.
    ///
    /// Missing properties read as `undefined`. A throwing getter yields the
    /// thrown value as `Err`.
    pub fn get_property(&self, key: &str) -> JsResult<Value> {
        match self {
            Value::Object(obj) => obj.get_with_receiver(key, self),
            Value::Function(func) => func.properties().get_with_receiver(key, self),
            _ => Ok(Value::Undefined),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Smi(n)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Double(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<std::string::String> for Value {
    fn from(s: std::string::String) -> Self {
        Value::String(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::array(items)
    }
}

impl From<Object> for Value {
    fn from(obj: Object) -> Self {
        Value::Object(obj)
    }
}

impl From<Function> for Value {
    fn from(func: Function) -> Self {
        Value::Function(func)
    }
}

/// Implementation of Display trait for JavaScript string conversion.
///
/// ```
/// use core_types::Value;
///
/// assert_eq!(Value::Undefined.to_string(), "undefined");
/// assert_eq!(Value::Smi(42).to_string(), "42");
/// assert_eq!(Value::array(vec![Value::Smi(1), Value::Smi(2)]).to_string(), "1,2");
/// ```
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "undefined"),
            Value::Null => write!(f, "null"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Smi(n) => write!(f, "{}", n),
            Value::Double(n) => {
                if n.is_nan() {
                    write!(f, "NaN")
                } else if n.is_infinite() {
                    if n.is_sign_positive() {
                        write!(f, "Infinity")
                    } else {
                        write!(f, "-Infinity")
                    }
                } else if n.fract() == 0.0 && n.abs() < 1e15 {
                    // Integer-valued doubles display without decimal point
                    write!(f, "{}", *n as i64)
                } else {
                    write!(f, "{}", n)
                }
            }
            Value::String(s) => write!(f, "{}", s),
            Value::Array(items) => {
                let items = items.borrow();
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    if !matches!(item, Value::Undefined | Value::Null) {
                        write!(f, "{}", item)?;
                    }
                }
                Ok(())
            }
            Value::Object(_) | Value::NativeObject(_) => write!(f, "[object Object]"),
            Value::Function(_) => write!(f, "function () {{ [native code] }}"),
            Value::Error(e) => write!(f, "{}", e),
        }
    }
}

/// A named property slot.
#[derive(Clone)]
pub enum Property {
    /// Plain stored value
    Data(Value),
    /// Getter invoked on every read, with the holder as receiver
    Accessor(Function),
}

/// A plain JavaScript object: an insertion-ordered bag of named properties.
///
/// # Examples
///
/// ```
/// use core_types::{Object, Value};
///
/// let obj = Object::new().with("answer", Value::Smi(42));
/// assert!(obj.has("answer"));
/// assert_eq!(obj.get("answer").unwrap(), Value::Smi(42));
/// assert_eq!(obj.get("missing").unwrap(), Value::Undefined);
/// ```
#[derive(Clone, Default)]
pub struct Object {
    properties: Rc<RefCell<Vec<(std::string::String, Property)>>>,
}

impl Object {
    /// Creates an empty object.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`Object::set`].
    pub fn with(self, key: &str, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    /// Builder form of [`Object::define_getter`].
    pub fn with_getter(self, key: &str, getter: Function) -> Self {
        self.define_getter(key, getter);
        self
    }

    /// Sets a data property, replacing any existing property of that name.
    pub fn set(&self, key: &str, value: impl Into<Value>) {
        self.define(key, Property::Data(value.into()));
    }

    /// Defines an accessor property.
    pub fn define_getter(&self, key: &str, getter: Function) {
        self.define(key, Property::Accessor(getter));
    }

    fn define(&self, key: &str, property: Property) {
        let mut properties = self.properties.borrow_mut();
        match properties.iter_mut().find(|(k, _)| k == key) {
            Some((_, slot)) => *slot = property,
            None => properties.push((key.to_string(), property)),
        }
    }

    /// Returns whether the property exists, without running getters.
    pub fn has(&self, key: &str) -> bool {
        self.properties.borrow().iter().any(|(k, _)| k == key)
    }

    /// Property names in insertion order.
    pub fn keys(&self) -> Vec<std::string::String> {
        self.properties
            .borrow()
            .iter()
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// Reads a property with this object as the getter receiver.
    pub fn get(&self, key: &str) -> JsResult<Value> {
        self.get_with_receiver(key, &Value::Object(self.clone()))
    }

    fn get_with_receiver(&self, key: &str, receiver: &Value) -> JsResult<Value> {
        // Clone the slot out so no borrow is held while the getter runs.
        let property = self
            .properties
            .borrow()
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, p)| p.clone());
        match property {
            Some(Property::Data(value)) => Ok(value),
            Some(Property::Accessor(getter)) => getter.call(receiver.clone(), vec![]),
            None => Ok(Value::Undefined),
        }
    }

    /// Returns true if both handles refer to the same object.
    pub fn ptr_eq(&self, other: &Object) -> bool {
        Rc::ptr_eq(&self.properties, &other.properties)
    }
}

type NativeFn = dyn Fn(Value, Vec<Value>) -> JsResult<Value>;

/// A callable value.
///
/// The callback receives the receiver (`this`) and the argument list, and
/// returns either a value or a thrown value. Missing arguments are simply
/// absent from the list; callers read them with [`Function::arg`].
///
/// ```
/// use core_types::{Function, Value};
///
/// let double = Function::new(|_this, args| match Function::arg(&args, 0) {
///     Value::Smi(n) => Ok(Value::Smi(n * 2)),
///     other => Err(other),
/// });
/// assert_eq!(double.call(Value::Undefined, vec![Value::Smi(21)]), Ok(Value::Smi(42)));
/// ```
#[derive(Clone)]
pub struct Function {
    callback: Rc<NativeFn>,
    properties: Object,
}

impl Function {
    /// Creates a new Function from a closure.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(Value, Vec<Value>) -> JsResult<Value> + 'static,
    {
        Self {
            callback: Rc::new(f),
            properties: Object::new(),
        }
    }

    /// Calls the function with the given receiver and arguments.
    pub fn call(&self, this: Value, args: Vec<Value>) -> JsResult<Value> {
        (self.callback)(this, args)
    }

    /// Returns argument `index`, or `undefined` when it was not passed.
    pub fn arg(args: &[Value], index: usize) -> Value {
        args.get(index).cloned().unwrap_or_default()
    }

    /// Properties attached to the function object itself.
    pub fn properties(&self) -> &Object {
        &self.properties
    }

    /// Returns true if both handles refer to the same function.
    pub fn ptr_eq(&self, other: &Function) -> bool {
        Rc::ptr_eq(&self.callback, &other.callback)
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Function {{ ... }}")
    }
}
