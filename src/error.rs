//! Unified error types for the conversion and proxy engine.
//!
//! Two families exist:
//!
//! - [`ConvertError`] — typed failures seen by host call sites: a value
//!   could not become the requested target type, a member does not
//!   exist, an index is out of range, and so on.
//! - [`ScriptError`] — what crosses the host/script boundary: a
//!   script-level runtime error carrying a message (this is what a
//!   pcall-style protected call observes), plus the `Suspended` control
//!   signal consumed by the channel driver.
//!
//! A single failing element inside a composite conversion does not
//! abort the conversion; it is accumulated into a
//! [`ConversionStatus::Partial`] on the otherwise-usable result.

use thiserror::Error;

use crate::vm::task::PendingOp;

/// Typed conversion and proxy-operation failures.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConvertError {
    /// A value or kind cannot become the requested target type.
    #[error("cannot convert {from} to {to}")]
    Conversion { from: String, to: String },

    /// A numeric value does not fit the target's declared width or
    /// signedness, or is not integral where an integer is required.
    #[error("number {value} does not fit target type {target}")]
    Narrowing { value: f64, target: String },

    /// Field or method resolution failed on a handle.
    #[error("no member `{name}` on {on}")]
    NoSuchMember { name: String, on: String },

    /// Indexing was attempted on a handle that does not support it.
    #[error("{type_name} is not indexable")]
    NotIndexable { type_name: String },

    /// A call was attempted on a handle that is not callable.
    #[error("{type_name} is not callable")]
    NotCallable { type_name: String },

    /// An operator was applied to incompatible operand kinds.
    #[error("operator `{op}` not defined between {lhs} and {rhs}")]
    TypeMismatch {
        op: &'static str,
        lhs: String,
        rhs: String,
    },

    /// A 1-based sequence index fell outside the valid range.
    #[error("index {index} out of range (length {len})")]
    IndexOutOfRange { index: i64, len: usize },

    /// A wrapped callable was invoked with a bad argument.
    #[error("argument #{index}: expected {expected}, got {got}")]
    Argument {
        index: usize,
        expected: String,
        got: String,
    },

    /// A wrapped callable was invoked with too few arguments.
    ///
    /// Surplus arguments are discarded, the way the scripting language
    /// itself discards them, so this only fires on a shortfall.
    #[error("expected at least {expected} argument(s), got {got}")]
    Arity { expected: usize, got: usize },

    /// The reference-normalization pass exceeded its depth guard.
    #[error("reference chain deeper than {limit} levels")]
    ReferenceDepth { limit: usize },

    /// The handle was already finalized or belongs to another engine.
    #[error("stale foreign handle")]
    StaleHandle,
}

impl ConvertError {
    /// Shorthand for the common conversion-failure case.
    pub fn conversion(from: impl Into<String>, to: impl Into<String>) -> Self {
        ConvertError::Conversion {
            from: from.into(),
            to: to.into(),
        }
    }
}

/// Completion status of a script-to-host composite conversion.
#[derive(Debug, Clone, PartialEq)]
pub enum ConversionStatus {
    /// Every element converted.
    Complete,
    /// Some elements could not convert; the result is usable but the
    /// failed positions hold the target's zero value.
    Partial(Vec<ConvertError>),
}

impl ConversionStatus {
    pub fn is_partial(&self) -> bool {
        matches!(self, ConversionStatus::Partial(_))
    }
}

/// Errors and control signals crossing the script call boundary.
#[derive(Debug, Error)]
pub enum ScriptError {
    /// An ordinary script-level runtime error with a message.
    #[error("{message}")]
    Runtime { message: String },

    /// The running script task suspended on a channel operation.
    ///
    /// This is not a failure: the driver loop intercepts it, performs
    /// the blocking operation host-side and resumes the task. It only
    /// surfaces as an error if no driver owns the task.
    #[error("script task suspended on a channel operation with no driver")]
    Suspended(PendingOp),
}

impl ScriptError {
    /// Raise a script-level error, the way the interpreter would.
    pub fn runtime(message: impl Into<String>) -> Self {
        ScriptError::Runtime {
            message: message.into(),
        }
    }

    /// The script-visible message.
    pub fn message(&self) -> String {
        self.to_string()
    }
}

impl From<ConvertError> for ScriptError {
    fn from(err: ConvertError) -> Self {
        ScriptError::runtime(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversion_error_message() {
        let err = ConvertError::conversion("table", "channel");
        assert_eq!(err.to_string(), "cannot convert table to channel");
    }

    #[test]
    fn arity_message() {
        let err = ConvertError::Arity {
            expected: 2,
            got: 1,
        };
        assert_eq!(err.to_string(), "expected at least 2 argument(s), got 1");
    }

    #[test]
    fn convert_error_becomes_script_error() {
        let err: ScriptError = ConvertError::conversion("string", "bool").into();
        assert_eq!(err.message(), "cannot convert string to bool");
    }
}
