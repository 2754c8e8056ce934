//! HTTP endpoints and a forward proxy for exercising the REST functions.
//!
//! `app()` serves fixed JSON documents, empty 404s, status and delay
//! endpoints and a couple of echo routes. `run_proxy` is a minimal HTTP
//! proxy (CONNECT tunnels and absolute-form forwarding) that records what
//! passed through it, including the `Proxy-Authorization` header.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    extract::{Path, Query},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use http_body_util::{combinators::BoxBody, BodyExt, Empty};
use hyper::body::Incoming;
use hyper::header::{HOST, PROXY_AUTHORIZATION};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::upgrade::Upgraded;
use hyper::{Method, Request, Response, Uri};
use hyper_util::rt::TokioIo;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tokio::net::{TcpListener, TcpStream};

pub fn app() -> Router {
    Router::new()
        .route("/get", get(get_success))
        .route("/get/empty", get(not_found))
        .route("/get/with/query/parameters", get(get_with_query))
        .route("/post", post(post_success))
        .route("/post/empty", post(not_found))
        .route("/post/with/query/parameters", post(post_with_query))
        .route("/echo", post(echo))
        .route("/headers", get(headers))
        .route("/status/{code}", get(status).post(status))
        .route("/delay/{millis}", get(delay))
        .route("/large/{bytes}", get(large))
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

async fn get_success() -> Json<Value> {
    Json(json!({ "get": "success" }))
}

async fn not_found() -> StatusCode {
    StatusCode::NOT_FOUND
}

async fn get_with_query(Query(params): Query<HashMap<String, String>>) -> Result<Json<Value>, StatusCode> {
    match params.get("key").map(String::as_str) {
        Some("value") => Ok(Json(json!({ "get.with.query.parameters": "success" }))),
        _ => Err(StatusCode::NOT_FOUND),
    }
}

/// Succeeds only for the body `{"key":"value"}`, in any JSON formatting.
async fn post_success(body: String) -> Result<Json<Value>, StatusCode> {
    match serde_json::from_str::<Value>(&body) {
        Ok(value) if value == json!({ "key": "value" }) => Ok(Json(json!({ "post": "success" }))),
        _ => Err(StatusCode::NOT_FOUND),
    }
}

async fn post_with_query(Query(params): Query<HashMap<String, String>>) -> Result<Json<Value>, StatusCode> {
    match params.get("key").map(String::as_str) {
        Some("value") => Ok(Json(json!({ "post.with.query.parameters": "success" }))),
        _ => Err(StatusCode::NOT_FOUND),
    }
}

/// Returns the raw request body as a JSON string.
async fn echo(body: String) -> Json<Value> {
    Json(json!({ "body": body }))
}

/// Returns the request headers as a JSON map keyed by lowercase name.
async fn headers(headers: HeaderMap) -> Json<Map<String, Value>> {
    let map = headers
        .iter()
        .filter_map(|(name, value)| {
            let value = value.to_str().ok()?;
            Some((name.as_str().to_string(), Value::String(value.to_string())))
        })
        .collect();
    Json(map)
}

async fn status(Path(code): Path<u16>) -> StatusCode {
    StatusCode::from_u16(code).unwrap_or(StatusCode::BAD_REQUEST)
}

async fn delay(Path(millis): Path<u64>) -> Json<Value> {
    tokio::time::sleep(Duration::from_millis(millis)).await;
    Json(json!({ "delayed": millis }))
}

/// A JSON string document of exactly `bytes` bytes (at least 2).
async fn large(Path(bytes): Path<usize>) -> String {
    format!("\"{}\"", "a".repeat(bytes.saturating_sub(2)))
}

// ---------------------------------------------------------------------------
// Proxy
// ---------------------------------------------------------------------------

/// One request seen by the proxy.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxiedRequest {
    pub method: String,
    pub target: String,
    pub proxy_authorization: Option<String>,
}

/// Requests handled by a proxy, shared with the test that started it.
#[derive(Clone, Debug, Default)]
pub struct ProxyLog(Arc<Mutex<Vec<ProxiedRequest>>>);

impl ProxyLog {
    pub fn requests(&self) -> Vec<ProxiedRequest> {
        self.0.lock().map(|log| log.clone()).unwrap_or_default()
    }

    fn record(&self, req: &Request<Incoming>) {
        let entry = ProxiedRequest {
            method: req.method().to_string(),
            target: req.uri().to_string(),
            proxy_authorization: req
                .headers()
                .get(PROXY_AUTHORIZATION)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string),
        };
        tracing::debug!(method = %entry.method, target = %entry.target, "proxying request");
        if let Ok(mut log) = self.0.lock() {
            log.push(entry);
        }
    }
}

type ProxyBody = BoxBody<Bytes, hyper::Error>;

pub async fn run_proxy(listener: TcpListener, log: ProxyLog) -> Result<(), std::io::Error> {
    loop {
        let (stream, _) = listener.accept().await?;
        let log = log.clone();
        tokio::spawn(async move {
            let service = service_fn(move |req| proxy(req, log.clone()));
            if let Err(err) = http1::Builder::new()
                .preserve_header_case(true)
                .title_case_headers(true)
                .serve_connection(TokioIo::new(stream), service)
                .with_upgrades()
                .await
            {
                tracing::debug!(error = %err, "proxy connection closed");
            }
        });
    }
}

async fn proxy(req: Request<Incoming>, log: ProxyLog) -> Result<Response<ProxyBody>, hyper::Error> {
    log.record(&req);
    let authority = req
        .uri()
        .authority()
        .map(|authority| authority.to_string())
        .or_else(|| {
            req.headers()
                .get(HOST)
                .and_then(|host| host.to_str().ok())
                .map(str::to_string)
        });
    let Some(authority) = authority else {
        return Ok(status_response(StatusCode::BAD_REQUEST));
    };
    let addr = if authority.contains(':') {
        authority
    } else {
        format!("{authority}:80")
    };

    if req.method() == Method::CONNECT {
        tokio::spawn(async move {
            match hyper::upgrade::on(req).await {
                Ok(upgraded) => {
                    if let Err(err) = tunnel(upgraded, &addr).await {
                        tracing::debug!(error = %err, addr = %addr, "tunnel closed");
                    }
                }
                Err(err) => tracing::warn!(error = %err, "CONNECT upgrade failed"),
            }
        });
        return Ok(Response::new(empty()));
    }

    forward(req, &addr).await
}

async fn tunnel(upgraded: Upgraded, addr: &str) -> std::io::Result<()> {
    let mut server = TcpStream::connect(addr).await?;
    let mut upgraded = TokioIo::new(upgraded);
    tokio::io::copy_bidirectional(&mut upgraded, &mut server).await?;
    Ok(())
}

async fn forward(mut req: Request<Incoming>, addr: &str) -> Result<Response<ProxyBody>, hyper::Error> {
    let stream = match TcpStream::connect(addr).await {
        Ok(stream) => stream,
        Err(err) => {
            tracing::warn!(error = %err, addr = %addr, "upstream unreachable");
            return Ok(status_response(StatusCode::BAD_GATEWAY));
        }
    };
    let origin = req.uri().path_and_query().map_or("/", |pq| pq.as_str());
    let Ok(origin) = origin.parse::<Uri>() else {
        return Ok(status_response(StatusCode::BAD_REQUEST));
    };
    *req.uri_mut() = origin;
    req.headers_mut().remove(PROXY_AUTHORIZATION);

    let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream)).await?;
    tokio::spawn(async move {
        if let Err(err) = conn.await {
            tracing::debug!(error = %err, "upstream connection closed");
        }
    });
    let response = sender.send_request(req).await?;
    Ok(response.map(|body| body.boxed()))
}

fn empty() -> ProxyBody {
    Empty::<Bytes>::new().map_err(|never| match never {}).boxed()
}

fn status_response(status: StatusCode) -> Response<ProxyBody> {
    let mut response = Response::new(empty());
    *response.status_mut() = status;
    response
}
