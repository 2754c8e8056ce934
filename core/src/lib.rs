//! REST functions for a rule/expression language.
//!
//! # Overview
//! `READ(uri, config?, queryParameters?)` issues a `GET` and
//! `WRITE(uri, body, config?, queryParameters?)` a `POST` on behalf of a
//! script, then reduce the response to a value the expression can use: the
//! decoded JSON body, a configured override, or no value at all.
//!
//! # Design
//! - `config` merges defaults, global settings, call-kind settings and
//!   per-call settings into an immutable `RestSettings`, key by key.
//! - `request` validates the URI and body and produces a plain-data
//!   `HttpRequest`; `credentials` supplies passwords from local files.
//! - `HttpExecutor` is the only piece that performs I/O. `UreqExecutor` is
//!   the blocking implementation; tests substitute their own.
//! - `response` decides between decoded body, override and absence.
//! - Hard failures (bad arguments, URI, body, credentials, undecodable
//!   response) are `Err(EvaluationError)`. Timeouts and rejected statuses are
//!   ordinary `Ok` outcomes.

pub mod config;
pub mod credentials;
pub mod error;
pub mod functions;
pub mod http;
pub mod request;
pub mod response;
pub mod transport;

pub use config::{CallKind, GlobalConfig, RestSettings};
pub use error::{EvaluationError, FunctionError};
pub use functions::RestFunctions;
pub use http::{BasicCredentials, HttpExecutor, HttpMethod, HttpRequest, HttpResponse, ProxyTarget, TransportError};
pub use request::RequestBuilder;
pub use response::interpret_response;
pub use transport::UreqExecutor;
