//! Turns effective settings and call arguments into an `HttpRequest`.
//!
//! # Design
//! All validation that can fail without touching the network happens here:
//! URI grammar, JSON bodies under `enforce.json`, and credential files. A
//! request that leaves the builder is fully specified, so the executor only
//! has to move bytes.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::de::IgnoredAny;
use serde_json::{Map, Value};
use url::Url;

use crate::config::{scalar_text, CallKind, RestSettings};
use crate::credentials::read_password;
use crate::error::FunctionError;
use crate::http::{BasicCredentials, HttpMethod, HttpRequest, ProxyTarget};

/// Bound applied when no `timeout` is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(1000);

const JSON: &str = "application/json";

/// Builds requests for one call from its resolved settings.
#[derive(Debug, Clone, Copy)]
pub struct RequestBuilder<'a> {
    settings: &'a RestSettings,
}

impl<'a> RequestBuilder<'a> {
    pub fn new(settings: &'a RestSettings) -> Self {
        Self { settings }
    }

    /// `GET uri` with the given query parameters.
    pub fn build_read(&self, uri: &str, query: Option<&Map<String, Value>>) -> Result<HttpRequest, FunctionError> {
        self.build(CallKind::Read, uri, query, None)
    }

    /// `POST uri` carrying `body`.
    ///
    /// A string body is sent as-is, after a JSON syntax check when
    /// `enforce.json` is on. Any other value is serialized to JSON.
    pub fn build_write(
        &self,
        uri: &str,
        body: &Value,
        query: Option<&Map<String, Value>>,
    ) -> Result<HttpRequest, FunctionError> {
        let body = self.write_body(body)?;
        self.build(CallKind::Write, uri, query, Some(body))
    }

    fn build(
        &self,
        kind: CallKind,
        uri: &str,
        query: Option<&Map<String, Value>>,
        body: Option<String>,
    ) -> Result<HttpRequest, FunctionError> {
        let mut url = validate_uri(uri)?;
        if let Some(params) = query {
            append_query(&mut url, params)?;
        }

        let method = match kind {
            CallKind::Read => HttpMethod::Get,
            CallKind::Write => HttpMethod::Post,
        };
        let request = HttpRequest {
            method,
            url: url.to_string(),
            headers: self.headers(kind)?,
            body,
            proxy: self.proxy()?,
            timeout: self.settings.timeout.unwrap_or(DEFAULT_TIMEOUT),
        };
        tracing::debug!(
            method = method.as_str(),
            url = %request.url,
            proxied = request.proxy.is_some(),
            timeout_ms = request.timeout.as_millis(),
            "built REST request"
        );
        Ok(request)
    }

    fn write_body(&self, body: &Value) -> Result<String, FunctionError> {
        match body {
            Value::String(literal) => {
                if self.settings.enforce_json && serde_json::from_str::<IgnoredAny>(literal).is_err() {
                    return Err(FunctionError::BodyFormat { body: literal.clone() });
                }
                Ok(literal.clone())
            }
            structured => {
                serde_json::to_string(structured).map_err(|e| FunctionError::BodySerialization(e.to_string()))
            }
        }
    }

    fn headers(&self, kind: CallKind) -> Result<Vec<(String, String)>, FunctionError> {
        let mut headers = vec![("Accept".to_string(), JSON.to_string())];
        if kind == CallKind::Write {
            headers.push(("Content-Type".to_string(), JSON.to_string()));
        }
        for (name, value) in &self.settings.headers {
            set_header(&mut headers, name, value.clone());
        }

        if let Some(path) = &self.settings.basic_auth_password_path {
            let user = self.settings.basic_auth_user.as_deref().unwrap_or_default();
            let password = read_password(path)?;
            let token = STANDARD.encode(format!("{user}:{password}"));
            set_header(&mut headers, "Authorization", format!("Basic {token}"));
        }
        Ok(headers)
    }

    fn proxy(&self) -> Result<Option<ProxyTarget>, FunctionError> {
        let Some((host, port)) = self.settings.proxy() else {
            return Ok(None);
        };
        let credentials = match &self.settings.proxy_basic_auth_password_path {
            Some(path) => Some(BasicCredentials {
                user: self.settings.proxy_basic_auth_user.clone().unwrap_or_default(),
                password: read_password(path)?,
            }),
            None => None,
        };
        Ok(Some(ProxyTarget {
            host: host.to_string(),
            port,
            credentials,
        }))
    }
}

/// Check `uri` against the URI grammar and parse it.
///
/// Characters that can never appear in a URI are reported with the
/// component they were found in and their character index. Brackets are
/// only legal in the authority (IPv6 hosts) and every `%` must start a
/// two-digit hex escape.
pub fn validate_uri(uri: &str) -> Result<Url, FunctionError> {
    let illegal = |index: usize, byte_index: usize| {
        let component = component_at(uri, byte_index);
        FunctionError::UriSyntax(format!("Illegal character in {component} at index {index}: {uri}"))
    };
    for (index, (byte_index, c)) in uri.char_indices().enumerate() {
        if is_illegal(c) {
            return Err(illegal(index, byte_index));
        }
        if matches!(c, '[' | ']') && component_at(uri, byte_index) != "authority" {
            return Err(illegal(index, byte_index));
        }
        if c == '%' && !is_escape(&uri.as_bytes()[byte_index + 1..]) {
            if component_at(uri, byte_index) == "scheme name" {
                return Err(illegal(index, byte_index));
            }
            return Err(FunctionError::UriSyntax(format!("Malformed escape pair at index {index}: {uri}")));
        }
    }
    Url::parse(uri).map_err(|e| FunctionError::UriSyntax(format!("{e}: {uri}")))
}

fn is_escape(rest: &[u8]) -> bool {
    matches!(rest, [high, low, ..] if high.is_ascii_hexdigit() && low.is_ascii_hexdigit())
}

fn is_illegal(c: char) -> bool {
    c.is_control() || c.is_whitespace() || matches!(c, '"' | '<' | '>' | '\\' | '^' | '`' | '{' | '|' | '}')
}

fn component_at(uri: &str, byte_index: usize) -> &'static str {
    let mut start = 0;
    let scheme_end = uri
        .find(|c| matches!(c, ':' | '/' | '?' | '#'))
        .filter(|&end| end > 0 && uri[end..].starts_with(':') && uri.starts_with(|c: char| c.is_ascii_alphabetic()));
    if let Some(end) = scheme_end {
        if byte_index < end {
            return "scheme name";
        }
        start = end + 1;
    }

    if uri[start..].starts_with("//") {
        let authority_start = start + 2;
        let authority_end = uri[authority_start..]
            .find(|c| matches!(c, '/' | '?' | '#'))
            .map_or(uri.len(), |offset| authority_start + offset);
        if byte_index < authority_end {
            return "authority";
        }
        start = authority_end;
    }

    let fragment_start = uri[start..].find('#').map(|offset| start + offset);
    if fragment_start.is_some_and(|f| byte_index > f) {
        return "fragment";
    }
    let path_end = fragment_start.unwrap_or(uri.len());
    let query_start = uri[start..path_end].find('?').map(|offset| start + offset);
    if query_start.is_some_and(|q| byte_index > q) {
        return "query";
    }
    "path"
}

fn append_query(url: &mut Url, params: &Map<String, Value>) -> Result<(), FunctionError> {
    let mut pairs = Vec::with_capacity(params.len());
    for (name, value) in params {
        if value.is_null() {
            continue;
        }
        let text = scalar_text(value).ok_or_else(|| {
            FunctionError::InvalidArgument(format!("Query parameter '{name}' must be a scalar value, found {value}"))
        })?;
        pairs.push((name.as_str(), text));
    }
    if !pairs.is_empty() {
        url.query_pairs_mut()
            .extend_pairs(pairs.iter().map(|(name, text)| (*name, text.as_str())));
    }
    Ok(())
}

fn set_header(headers: &mut Vec<(String, String)>, name: &str, value: String) {
    headers.retain(|(existing, _)| !existing.eq_ignore_ascii_case(name));
    headers.push((name.to_string(), value));
}
