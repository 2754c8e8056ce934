//! `READ` and `WRITE` as the host evaluator calls them.
//!
//! # Design
//! `RestFunctions` takes positional arguments exactly as the host passes
//! them, so argument-count checks and error wrapping live with the rest of
//! the call logic. A call runs the whole pipeline synchronously: resolve
//! settings, build the request, execute it, interpret the response. It holds
//! no state besides the executor, which makes one instance safe to share
//! between concurrent evaluations.

use std::ops::RangeInclusive;

use serde_json::{Map, Value};

use crate::config::{CallKind, GlobalConfig, RestSettings};
use crate::error::{EvaluationError, FunctionError};
use crate::http::HttpExecutor;
use crate::request::RequestBuilder;
use crate::response::interpret_response;
use crate::transport::UreqExecutor;

pub const READ: &str = "READ";
pub const WRITE: &str = "WRITE";

/// Entry points for `READ(uri, config?, queryParameters?)` and
/// `WRITE(uri, body, config?, queryParameters?)`.
#[derive(Debug, Clone)]
pub struct RestFunctions<E = UreqExecutor> {
    executor: E,
}

impl RestFunctions<UreqExecutor> {
    pub fn new() -> Self {
        Self::with_executor(UreqExecutor::new())
    }
}

impl Default for RestFunctions<UreqExecutor> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: HttpExecutor> RestFunctions<E> {
    pub fn with_executor(executor: E) -> Self {
        Self { executor }
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    /// `READ(uri, config?, queryParameters?)`: issue a `GET`.
    ///
    /// `Ok(None)` means the call produced no value: the request timed out or
    /// failed in transit, the status was rejected without an error override,
    /// or the body was empty without an empty-content override.
    pub fn read(&self, args: &[Value], global: &GlobalConfig) -> Result<Option<Value>, EvaluationError> {
        self.call(READ, args, |args| {
            require(args, 1..=3)?;
            let uri = uri_arg(&args[0])?;
            let config = map_arg(args.get(1), "configuration")?;
            let query = map_arg(args.get(2), "query parameters")?;

            let settings = RestSettings::resolve(global, CallKind::Read, config);
            let request = RequestBuilder::new(&settings).build_read(uri, query)?;
            interpret_response(&settings, self.executor.execute(&request))
        })
    }

    /// `WRITE(uri, body, config?, queryParameters?)`: issue a `POST`.
    ///
    /// More than four arguments is an `InvalidArgument` failure, as is more
    /// than three for `read`.
    pub fn write(&self, args: &[Value], global: &GlobalConfig) -> Result<Option<Value>, EvaluationError> {
        self.call(WRITE, args, |args| {
            require(args, 2..=4)?;
            let uri = uri_arg(&args[0])?;
            let body = &args[1];
            let config = map_arg(args.get(2), "configuration")?;
            let query = map_arg(args.get(3), "query parameters")?;

            let settings = RestSettings::resolve(global, CallKind::Write, config);
            let request = RequestBuilder::new(&settings).build_write(uri, body, query)?;
            interpret_response(&settings, self.executor.execute(&request))
        })
    }

    fn call(
        &self,
        name: &str,
        args: &[Value],
        run: impl FnOnce(&[Value]) -> Result<Option<Value>, FunctionError>,
    ) -> Result<Option<Value>, EvaluationError> {
        tracing::debug!(function = name, args = args.len(), "evaluating REST function");
        run(args).map_err(|source| {
            let err = EvaluationError::new(call_text(name, args), source);
            tracing::debug!(error = %err, "REST function failed");
            err
        })
    }
}

/// Render a call the way it reads in an expression, e.g.
/// `WRITE('http://host/post', {'key' : 'value'})`.
pub fn call_text(name: &str, args: &[Value]) -> String {
    let args: Vec<String> = args.iter().map(render).collect();
    format!("{name}({})", args.join(", "))
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => format!("'{}'", s.replace('\'', "\\'")),
        Value::Array(items) => {
            let items: Vec<String> = items.iter().map(render).collect();
            format!("[{}]", items.join(", "))
        }
        Value::Object(map) if map.is_empty() => "{}".to_string(),
        Value::Object(map) => {
            let entries: Vec<String> = map
                .iter()
                .map(|(key, value)| format!("'{key}' : {}", render(value)))
                .collect();
            format!("{{{}}}", entries.join(", "))
        }
        other => other.to_string(),
    }
}

fn require(args: &[Value], arity: RangeInclusive<usize>) -> Result<(), FunctionError> {
    if args.len() < *arity.start() {
        return Err(FunctionError::MissingArgument {
            expected: *arity.start(),
            found: args.len(),
        });
    }
    if args.len() > *arity.end() {
        return Err(FunctionError::InvalidArgument(format!(
            "Expected at most {} argument(s), found {}",
            arity.end(),
            args.len()
        )));
    }
    Ok(())
}

fn uri_arg(value: &Value) -> Result<&str, FunctionError> {
    value
        .as_str()
        .ok_or_else(|| FunctionError::InvalidArgument(format!("Expected a string URI, found {value}")))
}

fn map_arg<'a>(value: Option<&'a Value>, what: &str) -> Result<Option<&'a Map<String, Value>>, FunctionError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(map)) => Ok(Some(map)),
        Some(other) => Err(FunctionError::InvalidArgument(format!(
            "Expected a map of {what}, found {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde_json::json;

    use super::*;
    use crate::http::{HttpMethod, HttpRequest, HttpResponse, TransportError};

    /// Replies with a canned outcome and records every request it sees.
    struct CannedExecutor {
        outcome: Result<HttpResponse, TransportError>,
        requests: Mutex<Vec<HttpRequest>>,
    }

    impl CannedExecutor {
        fn replying(status: u16, body: &str) -> Self {
            Self {
                outcome: Ok(HttpResponse {
                    status,
                    headers: Vec::new(),
                    body: body.as_bytes().to_vec(),
                }),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn failing(err: TransportError) -> Self {
            Self {
                outcome: Err(err),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn requests(&self) -> Vec<HttpRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    impl HttpExecutor for CannedExecutor {
        fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
            self.requests.lock().unwrap().push(request.clone());
            self.outcome.clone()
        }
    }

    fn global(value: Value) -> GlobalConfig {
        GlobalConfig::from_json_str(&value.to_string()).unwrap()
    }

    #[test]
    fn read_returns_decoded_body() {
        let functions = RestFunctions::with_executor(CannedExecutor::replying(200, r#"{"get":"success"}"#));
        let value = functions
            .read(&[json!("http://localhost/get")], &GlobalConfig::default())
            .unwrap();
        assert_eq!(value, Some(json!({ "get": "success" })));

        let requests = functions.executor().requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, HttpMethod::Get);
        assert_eq!(requests[0].url, "http://localhost/get");
    }

    #[test]
    fn read_without_arguments_fails_before_any_request() {
        let functions = RestFunctions::with_executor(CannedExecutor::replying(200, "{}"));
        let err = functions.read(&[], &GlobalConfig::default()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Unable to parse READ(): Unable to parse: READ() due to: Expected at least 1 argument(s), found 0"
        );
        assert!(functions.executor().requests().is_empty());
    }

    #[test]
    fn extra_arguments_are_rejected_before_any_request() {
        let functions = RestFunctions::with_executor(CannedExecutor::replying(200, "{}"));
        let err = functions
            .read(&[json!("http://localhost/get"), json!({}), json!({}), json!(1)], &GlobalConfig::default())
            .unwrap_err();
        assert!(matches!(err.cause(), FunctionError::InvalidArgument(_)));
        assert!(err.to_string().ends_with("due to: Expected at most 3 argument(s), found 4"));

        let err = functions
            .write(
                &[json!("http://localhost/post"), json!({}), json!({}), json!({}), json!(1)],
                &GlobalConfig::default(),
            )
            .unwrap_err();
        assert!(err.to_string().ends_with("due to: Expected at most 4 argument(s), found 5"));
        assert!(functions.executor().requests().is_empty());
    }

    #[test]
    fn write_requires_a_body() {
        let functions = RestFunctions::with_executor(CannedExecutor::replying(200, "{}"));
        let err = functions
            .write(&[json!("http://localhost/post")], &GlobalConfig::default())
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Unable to parse WRITE('http://localhost/post'): Unable to parse: WRITE('http://localhost/post') \
             due to: Expected at least 2 argument(s), found 1"
        );
    }

    #[test]
    fn invalid_uri_is_wrapped_with_call_text() {
        let functions = RestFunctions::with_executor(CannedExecutor::replying(200, "{}"));
        let err = functions
            .write(&[json!("some invalid uri"), json!({})], &GlobalConfig::default())
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Unable to parse WRITE('some invalid uri', {}): Unable to parse: WRITE('some invalid uri', {}) \
             due to: Illegal character in path at index 4: some invalid uri"
        );
        assert!(matches!(err.cause(), FunctionError::UriSyntax(_)));
        assert!(functions.executor().requests().is_empty());
    }

    #[test]
    fn non_string_uri_is_an_invalid_argument() {
        let functions = RestFunctions::with_executor(CannedExecutor::replying(200, "{}"));
        let err = functions.read(&[json!(42)], &GlobalConfig::default()).unwrap_err();
        assert!(matches!(err.cause(), FunctionError::InvalidArgument(_)));
        assert_eq!(err.expression(), "READ(42)");
    }

    #[test]
    fn non_map_config_is_an_invalid_argument() {
        let functions = RestFunctions::with_executor(CannedExecutor::replying(200, "{}"));
        let err = functions
            .read(&[json!("http://localhost/get"), json!("timeout")], &GlobalConfig::default())
            .unwrap_err();
        assert!(matches!(err.cause(), FunctionError::InvalidArgument(_)));
    }

    #[test]
    fn null_config_and_query_are_treated_as_absent() {
        let functions = RestFunctions::with_executor(CannedExecutor::replying(200, "true"));
        let value = functions
            .read(&[json!("http://localhost/get"), Value::Null, Value::Null], &GlobalConfig::default())
            .unwrap();
        assert_eq!(value, Some(json!(true)));
    }

    #[test]
    fn timeout_is_absent_despite_error_override() {
        let functions = RestFunctions::with_executor(CannedExecutor::failing(TransportError::Timeout));
        let value = functions
            .read(
                &[json!("http://localhost/get"), json!({ "error.value.override": "error message" })],
                &GlobalConfig::default(),
            )
            .unwrap();
        assert_eq!(value, None);
    }

    #[test]
    fn call_kind_settings_win_over_general_settings() {
        let functions = RestFunctions::with_executor(CannedExecutor::replying(404, ""));
        let global = global(json!({
            "rest.settings": { "response.codes.allowed": [200, 404], "empty.content.override": "G" },
            "rest.read.settings": { "empty.content.override": "K" },
            "rest.write.settings": { "empty.content.override": "W" }
        }));
        let read = functions.read(&[json!("http://localhost/get/empty")], &global).unwrap();
        assert_eq!(read, Some(json!("K")));

        let write = functions
            .write(&[json!("http://localhost/get/empty"), json!({})], &global)
            .unwrap();
        assert_eq!(write, Some(json!("W")));
    }

    #[test]
    fn write_sends_query_parameters_and_body() {
        let functions = RestFunctions::with_executor(CannedExecutor::replying(200, r#"{"post":"success"}"#));
        let value = functions
            .write(
                &[
                    json!("http://localhost/post"),
                    json!({ "key": "value" }),
                    json!({}),
                    json!({ "key": "value" }),
                ],
                &GlobalConfig::default(),
            )
            .unwrap();
        assert_eq!(value, Some(json!({ "post": "success" })));

        let requests = functions.executor().requests();
        assert_eq!(requests[0].method, HttpMethod::Post);
        assert_eq!(requests[0].url, "http://localhost/post?key=value");
        assert_eq!(requests[0].body.as_deref(), Some(r#"{"key":"value"}"#));
    }

    #[test]
    fn malformed_response_body_is_a_hard_failure() {
        let functions = RestFunctions::with_executor(CannedExecutor::replying(200, "<html>"));
        let err = functions
            .read(&[json!("http://localhost/get")], &GlobalConfig::default())
            .unwrap_err();
        assert!(matches!(err.cause(), FunctionError::ResponseDecode(_)));
    }

    #[test]
    fn call_text_renders_expression_literals() {
        assert_eq!(call_text(READ, &[]), "READ()");
        assert_eq!(
            call_text(WRITE, &[json!("http://h/post"), json!("it's")]),
            "WRITE('http://h/post', 'it\\'s')"
        );
        assert_eq!(
            call_text(READ, &[json!("u"), json!({ "timeout": 1, "response.codes.allowed": [200, 404] })]),
            "READ('u', {'response.codes.allowed' : [200, 404], 'timeout' : 1})"
        );
    }
}
