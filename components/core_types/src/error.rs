//! JavaScript error types and error handling.
//!
//! This module provides error types that correspond to JavaScript's built-in
//! error types. Any [`Value`] can be thrown; a [`JsError`] is thrown by
//! wrapping it in [`Value::Error`].

use crate::Value;
use std::fmt;

/// Result of an operation that may throw.
///
/// The error arm carries the thrown value, which is not necessarily an
/// error object: `throw "x"` yields `Err(Value::String("x"))`.
pub type JsResult<T> = Result<T, Value>;

/// The kind of JavaScript error.
///
/// These correspond to JavaScript's built-in error constructors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Plain `Error`
    Error,
    /// Type error (e.g., calling a non-function)
    TypeError,
    /// Internal engine error
    InternalError,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Error => "Error",
            ErrorKind::TypeError => "TypeError",
            ErrorKind::InternalError => "InternalError",
        };
        f.write_str(name)
    }
}

/// A JavaScript error with a kind and message.
///
/// # Examples
///
/// ```
/// use core_types::{ErrorKind, JsError};
///
/// let error = JsError::type_error("undefined is not a function");
///
/// assert_eq!(error.kind, ErrorKind::TypeError);
/// assert_eq!(error.to_string(), "TypeError: undefined is not a function");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct JsError {
    /// The type of error
    pub kind: ErrorKind,
    /// Human-readable error message
    pub message: String,
}

impl JsError {
    /// Creates an error of the given kind.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Creates a plain `Error`, the equivalent of `new Error(message)`.
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Error, message)
    }

    /// Creates a `TypeError`.
    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TypeError, message)
    }

    /// Creates an engine-internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InternalError, message)
    }
}

impl From<JsError> for Value {
    fn from(error: JsError) -> Self {
        Value::Error(error)
    }
}
