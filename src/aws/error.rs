//! CloudFormation error classification
//!
//! CloudFormation does not model "stack does not exist" as a typed error;
//! it surfaces as a `ValidationError` with a well-known message. Classify
//! using the error code and message rather than string matching on the
//! Debug format.

use thiserror::Error;

/// CloudFormation error categories
#[derive(Debug, Error)]
pub enum CfnError {
    /// The stack no longer exists. During a removal wait this means the
    /// delete finished and the stack record is already gone.
    #[error("Stack does not exist")]
    StackNotFound,

    /// Generic AWS SDK error with code and message
    #[error("AWS error: {message}")]
    Sdk {
        code: Option<String>,
        message: String,
    },
}

impl CfnError {
    /// Check if this is a "stack does not exist" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, CfnError::StackNotFound)
    }
}

/// Classify a CloudFormation SDK error using its code and message.
pub fn classify_cfn_error(code: Option<&str>, message: Option<&str>) -> CfnError {
    match (code, message) {
        (Some("ValidationError"), Some(m)) if m.contains("does not exist") => {
            CfnError::StackNotFound
        }
        (code, message) => CfnError::Sdk {
            code: code.map(str::to_string),
            message: message.unwrap_or("Unknown error").to_string(),
        },
    }
}
