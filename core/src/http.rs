//! HTTP transport types shared by the request builder, the executor and the
//! response interpreter.
//!
//! # Design
//! Requests and responses are plain data. `RequestBuilder` produces an
//! `HttpRequest`, an `HttpExecutor` turns it into an `HttpResponse` (or a
//! `TransportError`), and `interpret_response` reduces that to a value. Only
//! the executor touches the network, so everything on either side of it can
//! be tested without a server.

use std::time::Duration;

use thiserror::Error;

/// HTTP method for a request. Read calls issue `GET`, write calls `POST`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
        }
    }
}

/// Credentials presented to a proxy or target host with basic authentication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicCredentials {
    pub user: String,
    pub password: String,
}

/// Forward proxy the request is routed through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyTarget {
    pub host: String,
    pub port: u16,
    pub credentials: Option<BasicCredentials>,
}

/// An HTTP request described as plain data.
///
/// `url` already contains the serialized query string. `timeout` bounds the
/// whole exchange, from connecting to reading the last body byte.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
    pub proxy: Option<ProxyTarget>,
    pub timeout: Duration,
}

impl HttpRequest {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

/// A completed HTTP exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

/// The exchange did not complete. Carries no status code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,

    #[error("transport failure: {0}")]
    Connection(String),
}

/// Performs the network call for an `HttpRequest`.
///
/// Implementations must return within the request's `timeout` and must be
/// safe to share between concurrent invocations.
pub trait HttpExecutor: Send + Sync {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError>;
}

fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}
