//! `HttpExecutor` backed by a blocking `ureq` agent.
//!
//! # Design
//! One agent is shared by every direct request so its connection pool is
//! reused across calls; ureq agents are internally synchronized. Proxied
//! requests get a short-lived agent configured for their proxy, since the
//! proxy (and its credentials) may differ from call to call. The timeout is
//! applied per request and covers the whole exchange, body included.
//! Non-2xx statuses are returned as data, never as errors.

use std::io;

use ureq::{Agent, Proxy};
use url::Url;

use crate::http::{HttpExecutor, HttpMethod, HttpRequest, HttpResponse, ProxyTarget, TransportError};

#[derive(Debug, Clone)]
pub struct UreqExecutor {
    agent: Agent,
}

impl UreqExecutor {
    pub fn new() -> Self {
        Self { agent: agent(None) }
    }
}

impl Default for UreqExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpExecutor for UreqExecutor {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let proxied;
        let agent = match &request.proxy {
            Some(target) => {
                let proxy = Proxy::new(&proxy_uri(target)?)
                    .map_err(|e| TransportError::Connection(format!("invalid proxy: {e}")))?;
                proxied = agent(Some(proxy));
                &proxied
            }
            None => &self.agent,
        };

        tracing::debug!(method = request.method.as_str(), url = %request.url, "executing REST request");
        let result = match request.method {
            HttpMethod::Get => {
                let mut builder = agent.get(&request.url);
                for (name, value) in &request.headers {
                    builder = builder.header(name.as_str(), value.as_str());
                }
                builder.config().timeout_global(Some(request.timeout)).build().call()
            }
            HttpMethod::Post => {
                let mut builder = agent.post(&request.url);
                for (name, value) in &request.headers {
                    builder = builder.header(name.as_str(), value.as_str());
                }
                let builder = builder.config().timeout_global(Some(request.timeout)).build();
                match request.body.as_deref() {
                    Some(body) => builder.send(body.as_bytes()),
                    None => builder.send_empty(),
                }
            }
        };

        let mut response = result.map_err(transport_error)?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_string(), value.to_string()))
            })
            .collect();
        // ureq caps bodies at 10 MB by default; allowed responses are decoded whole.
        let body = response
            .body_mut()
            .with_config()
            .limit(u64::MAX)
            .read_to_vec()
            .map_err(transport_error)?;
        tracing::debug!(status, bytes = body.len(), "REST response received");

        Ok(HttpResponse { status, headers, body })
    }
}

fn agent(proxy: Option<Proxy>) -> Agent {
    Agent::config_builder()
        .http_status_as_error(false)
        .proxy(proxy)
        .build()
        .new_agent()
}

/// `http://[user:password@]host:port` with the credentials percent-encoded.
fn proxy_uri(target: &ProxyTarget) -> Result<String, TransportError> {
    let invalid = || TransportError::Connection(format!("invalid proxy address {}:{}", target.host, target.port));
    let mut uri = Url::parse(&format!("http://{}:{}", target.host, target.port)).map_err(|_| invalid())?;
    if let Some(credentials) = &target.credentials {
        uri.set_username(&credentials.user).map_err(|_| invalid())?;
        uri.set_password(Some(&credentials.password)).map_err(|_| invalid())?;
    }
    Ok(uri.as_str().trim_end_matches('/').to_string())
}

fn transport_error(err: ureq::Error) -> TransportError {
    match err {
        ureq::Error::Timeout(_) => TransportError::Timeout,
        ureq::Error::Io(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) => {
            TransportError::Timeout
        }
        other => TransportError::Connection(other.to_string()),
    }
}
