//! Domain errors

use thiserror::Error;

/// Domain errors for the relay fabric's pure types.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("invalid token '{token}': {reason}")]
    InvalidToken { token: String, reason: String },

    #[error("unknown enumerant '{value}' for {field}")]
    UnknownEnumerant { field: String, value: String },
}
