//! Error types for the REST functions.
//!
//! # Design
//! Only failures that abort a call before (or instead of) producing a value
//! live here. Timeouts, rejected status codes and empty bodies are ordinary
//! outcomes resolved by the response interpreter, so they never show up as
//! errors. Every hard failure reaches the host wrapped in `EvaluationError`,
//! whose message embeds the call text twice, as the host's parser reports it.

use thiserror::Error;

use crate::credentials::CredentialError;

/// Why a call could not be evaluated.
#[derive(Debug, Error)]
pub enum FunctionError {
    /// Fewer positional arguments than the function requires.
    #[error("Expected at least {expected} argument(s), found {found}")]
    MissingArgument { expected: usize, found: usize },

    /// An argument is present but has the wrong shape.
    #[error("{0}")]
    InvalidArgument(String),

    /// The URI failed grammar validation. Holds the validator's message.
    #[error("{0}")]
    UriSyntax(String),

    /// A literal write body is not valid JSON while `enforce.json` is on.
    #[error(
        "POST data '{body}' must be properly formatted JSON.  \
         Set the 'enforce.json' property to false to disable this check."
    )]
    BodyFormat { body: String },

    /// A structured write body could not be serialized.
    #[error("Unable to serialize request body: {0}")]
    BodySerialization(String),

    #[error(transparent)]
    Credential(#[from] CredentialError),

    /// An allowed, non-empty response body is not valid JSON.
    #[error("Unable to decode response body as JSON: {0}")]
    ResponseDecode(#[source] serde_json::Error),
}

/// A hard failure as surfaced to the host evaluator.
#[derive(Debug, Error)]
#[error("Unable to parse {expression}: Unable to parse: {expression} due to: {source}")]
pub struct EvaluationError {
    expression: String,
    source: FunctionError,
}

impl EvaluationError {
    pub fn new(expression: impl Into<String>, source: FunctionError) -> Self {
        Self {
            expression: expression.into(),
            source,
        }
    }

    /// The call text the failure is reported against, e.g. `READ('x')`.
    pub fn expression(&self) -> &str {
        &self.expression
    }

    pub fn cause(&self) -> &FunctionError {
        &self.source
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evaluation_error_wraps_cause_twice() {
        let err = EvaluationError::new(
            "READ()",
            FunctionError::MissingArgument {
                expected: 1,
                found: 0,
            },
        );
        assert_eq!(
            err.to_string(),
            "Unable to parse READ(): Unable to parse: READ() due to: Expected at least 1 argument(s), found 0"
        );
        assert_eq!(err.expression(), "READ()");
    }

    #[test]
    fn body_format_names_the_input() {
        let err = FunctionError::BodyFormat {
            body: "not json".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "POST data 'not json' must be properly formatted JSON.  \
             Set the 'enforce.json' property to false to disable this check."
        );
    }
}
