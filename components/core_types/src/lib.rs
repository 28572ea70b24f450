//! Core JavaScript value types and error handling.
//!
//! This crate provides the foundational types shared by the runtime
//! components: the dynamic value model and the error types.
//!
//! # Overview
//!
//! - [`Value`] - Representation of JavaScript values
//! - [`Object`] - Property bag with data and accessor properties
//! - [`Function`] - Callable value taking a receiver and arguments
//! - [`JsError`] - JavaScript errors
//! - [`ErrorKind`] - Types of JavaScript errors
//! - [`JsResult`] - Result whose error arm is a thrown value
//!
//! # Examples
//!
//! ```
//! use core_types::{JsError, Object, Value};
//!
//! let thrown: Value = JsError::type_error("undefined is not a function").into();
//! assert_eq!(thrown.to_string(), "TypeError: undefined is not a function");
//!
//! let obj = Value::Object(Object::new().with("then", Value::Null));
//! assert!(obj.has_property("then"));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

mod error;
mod value;

pub use error::{ErrorKind, JsError, JsResult};
pub use value::{Function, Object, Property, Value};
