//! Reduces an HTTP exchange to the value a call returns.
//!
//! The checks run in a fixed order and the first that applies decides:
//!
//! 1. the exchange did not complete (timeout, connection failure): no value,
//!    whatever `error.value.override` says;
//! 2. the status is not in `response.codes.allowed`, or `verify.content.length`
//!    is on and the body does not match `Content-Length`: the error value
//!    override, else no value;
//! 3. the body is empty: the empty content override, else no value;
//! 4. otherwise the body decoded as JSON.

use serde_json::Value;

use crate::config::RestSettings;
use crate::error::FunctionError;
use crate::http::{HttpResponse, TransportError};

pub fn interpret_response(
    settings: &RestSettings,
    outcome: Result<HttpResponse, TransportError>,
) -> Result<Option<Value>, FunctionError> {
    let response = match outcome {
        Ok(response) => response,
        Err(err) => {
            tracing::warn!(error = %err, "REST request did not complete");
            return Ok(None);
        }
    };

    if !settings.response_codes_allowed.contains(&response.status) {
        tracing::debug!(status = response.status, "REST response status not allowed");
        return Ok(settings.error_value_override.clone());
    }

    if settings.verify_content_length && !content_length_matches(&response) {
        tracing::debug!(
            content_length = response.header("Content-Length"),
            received = response.body.len(),
            "REST response content length mismatch"
        );
        return Ok(settings.error_value_override.clone());
    }

    if response.body.is_empty() {
        return Ok(settings.empty_content_override.clone());
    }

    serde_json::from_slice(&response.body)
        .map(Some)
        .map_err(FunctionError::ResponseDecode)
}

fn content_length_matches(response: &HttpResponse) -> bool {
    response
        .header("Content-Length")
        .and_then(|len| len.trim().parse::<usize>().ok())
        .is_some_and(|len| len == response.body.len())
}
