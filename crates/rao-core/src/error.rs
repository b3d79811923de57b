//! Unified error type for range action optimisation.
//!
//! [`RaoError`] covers the failures that abort a run: structural problems in
//! the optimisation perimeter (caller bugs), invalid configuration, broken
//! solver or sensitivity engine contracts. Degraded but recoverable outcomes
//! (infeasible ranges, solver infeasibility, timeouts) are not errors: they
//! are reported as statuses on the optimisation result.
//!
//! # Example
//!
//! ```
//! use rao_core::{RaoError, RaoResult};
//!
//! fn check_order(order: u32) -> RaoResult<u32> {
//!     if order == 0 {
//!         return Err(RaoError::Structural("order must be positive".into()));
//!     }
//!     Ok(order)
//! }
//!
//! assert!(check_order(0).is_err());
//! ```

use thiserror::Error;

/// Unified error type for all optimisation operations.
#[derive(Error, Debug)]
pub enum RaoError {
    /// Perimeter inconsistencies: unknown states, cyclic predecessor chains,
    /// cnecs or range actions referencing states outside the perimeter.
    #[error("Structural error: {0}")]
    Structural(String),

    /// Invalid input data (NaN bounds, empty tap tables, ...)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Invalid optimiser parameters
    #[error("Configuration error: {0}")]
    Config(String),

    /// Parsing/deserialization errors
    #[error("Parse error: {0}")]
    Parse(String),

    /// Linear solver back end misuse or failure
    #[error("Solver error: {0}")]
    Solver(String),

    /// The sensitivity engine broke its contract (missing values, ...)
    #[error("Sensitivity error: {0}")]
    Sensitivity(String),

    /// I/O errors (reading parameter files)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic errors (for wrapping external errors)
    #[error("{0}")]
    Other(String),
}

/// Convenience type alias for Results using RaoError.
pub type RaoResult<T> = Result<T, RaoError>;

impl From<anyhow::Error> for RaoError {
    fn from(err: anyhow::Error) -> Self {
        RaoError::Other(err.to_string())
    }
}

impl From<String> for RaoError {
    fn from(s: String) -> Self {
        RaoError::Other(s)
    }
}

impl From<&str> for RaoError {
    fn from(s: &str) -> Self {
        RaoError::Other(s.to_string())
    }
}

impl From<toml::de::Error> for RaoError {
    fn from(err: toml::de::Error) -> Self {
        RaoError::Parse(err.to_string())
    }
}

impl RaoError {
    /// Whether the error signals a caller bug rather than bad data.
    pub fn is_structural(&self) -> bool {
        matches!(self, RaoError::Structural(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RaoError::Structural("cyclic predecessor chain".into());
        assert!(err.to_string().contains("Structural error"));
        assert!(err.to_string().contains("cyclic"));
        assert!(err.is_structural());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: RaoError = io_err.into();
        assert!(matches!(err, RaoError::Io(_)));
        assert!(!err.is_structural());
    }

    #[test]
    fn test_toml_error_conversion() {
        let parsed: Result<toml::Value, _> = toml::from_str("max_iterations = [");
        let err: RaoError = parsed.unwrap_err().into();
        assert!(matches!(err, RaoError::Parse(_)));
    }

    #[test]
    fn test_question_mark_operator() {
        fn inner() -> RaoResult<()> {
            Err(RaoError::Validation("test".into()))
        }

        fn outer() -> RaoResult<()> {
            inner()?;
            Ok(())
        }

        assert!(outer().is_err());
    }
}
