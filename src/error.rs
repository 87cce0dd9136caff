// src/error.rs
//
// Typed failures surfaced to callers.
// - ConfigError: rejected at setup, before any trial runs.
// - PersistError: truncated or inconsistent saved state.
// - XcsError: umbrella for operations that touch both.
//
// Numerical edge cases (zero-support actions, degenerate spreads) are not
// errors; they are normalised in place where they occur.

use thiserror::Error;

/// Invalid run configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// A condition/action/prediction/selection name or code was not recognised.
    #[error("unknown {kind} type '{name}'; valid types are: {valid}")]
    UnknownRepresentation {
        kind: &'static str,
        name: String,
        valid: String,
    },
    /// A dimension or count that must be at least one was not.
    #[error("{field} must be positive (got {value})")]
    NonPositive { field: &'static str, value: i64 },
    /// Any other structurally invalid value.
    #[error("invalid {field}: {message}")]
    Invalid {
        field: &'static str,
        message: String,
    },
}

/// Failure while saving or loading run state.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    /// The stream ended before `field` could be read.
    #[error("saved state truncated while reading '{field}'")]
    Truncated { field: &'static str },
    /// A field was read but its value cannot describe a valid run.
    #[error("saved state inconsistent: '{field}' = {value}")]
    Inconsistent { field: &'static str, value: i64 },
    /// A payload variant tag did not match any known representation.
    #[error("saved state has unknown {kind} tag {tag}")]
    UnknownTag { kind: &'static str, tag: i32 },
}

/// Umbrella error for run-level operations.
#[derive(Debug, Error)]
pub enum XcsError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Persist(#[from] PersistError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_representation_message() {
        let err = ConfigError::UnknownRepresentation {
            kind: "condition",
            name: "ellipse".to_string(),
            valid: "ub_hyperrectangle, neural".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("ellipse"));
        assert!(msg.contains("ub_hyperrectangle"));
    }

    #[test]
    fn test_persist_error_wraps_into_xcs_error() {
        let err: XcsError = PersistError::Truncated { field: "x_dim" }.into();
        assert!(matches!(err, XcsError::Persist(_)));
        assert!(format!("{}", err).contains("x_dim"));
    }
}
