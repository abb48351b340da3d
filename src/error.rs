//! Error handling for the correlation core
//!
//! Only `init` can fail; every ingress path is infallible and signals a
//! rejected or uninteresting packet by returning `None` instead of an error.

use std::error::Error as StdError;
use std::fmt;

/// Errors surfaced by [`crate::Store::init`].
#[derive(Debug, Clone, PartialEq)]
pub enum CoreError {
    /// The configured match expression failed to compile.
    RegexCompile { expr: String, reason: String },

    /// A required container could not be allocated at startup.
    ResourceAllocation { what: String, reason: String },
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoreError::RegexCompile { expr, reason } => {
                write!(f, "match expression {:?} failed to compile: {}", expr, reason)
            }
            CoreError::ResourceAllocation { what, reason } => {
                write!(f, "failed to allocate {}: {}", what, reason)
            }
        }
    }
}

impl StdError for CoreError {}

impl CoreError {
    pub fn regex_compile(expr: impl Into<String>, reason: impl Into<String>) -> Self {
        CoreError::RegexCompile {
            expr: expr.into(),
            reason: reason.into(),
        }
    }

    pub fn resource_allocation(what: impl Into<String>, reason: impl Into<String>) -> Self {
        CoreError::ResourceAllocation {
            what: what.into(),
            reason: reason.into(),
        }
    }

    /// Short machine-readable category, useful for metrics labels.
    pub fn category(&self) -> &'static str {
        match self {
            CoreError::RegexCompile { .. } => "regex_compile",
            CoreError::ResourceAllocation { .. } => "resource_allocation",
        }
    }
}

/// Result type for fallible core operations (`init` only).
pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regex_compile_error_displays_expression() {
        let err = CoreError::regex_compile("(unclosed", "unclosed group");
        assert!(err.to_string().contains("(unclosed"));
        assert_eq!(err.category(), "regex_compile");
    }

    #[test]
    fn resource_allocation_error_displays_reason() {
        let err = CoreError::resource_allocation("call index", "out of memory");
        assert!(err.to_string().contains("out of memory"));
        assert_eq!(err.category(), "resource_allocation");
    }
}
