//! Configuration layers and their resolution into `RestSettings`.
//!
//! # Design
//! Settings come from up to four layers, lowest precedence first: built-in
//! defaults, the general `rest.settings` map of the global configuration, the
//! call-kind map (`rest.read.settings` or `rest.write.settings`), and the map
//! passed to the call itself. Resolution is per key: each recognized key is
//! looked up from the per-call layer downwards and the first well-formed value
//! wins, so a layer that sets one key never hides the others.
//!
//! Values are extracted into typed fields during resolution. A value of the
//! wrong shape is logged and skipped, which lets a lower layer supply the key
//! instead. Resolution itself never fails.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const REST_SETTINGS: &str = "rest.settings";
pub const REST_READ_SETTINGS: &str = "rest.read.settings";
pub const REST_WRITE_SETTINGS: &str = "rest.write.settings";

pub const RESPONSE_CODES_ALLOWED: &str = "response.codes.allowed";
pub const EMPTY_CONTENT_OVERRIDE: &str = "empty.content.override";
pub const ERROR_VALUE_OVERRIDE: &str = "error.value.override";
pub const TIMEOUT: &str = "timeout";
pub const PROXY_HOST: &str = "proxy.host";
pub const PROXY_PORT: &str = "proxy.port";
pub const PROXY_BASIC_AUTH_USER: &str = "proxy.basic.auth.user";
pub const PROXY_BASIC_AUTH_PASSWORD_PATH: &str = "proxy.basic.auth.password.path";
pub const BASIC_AUTH_USER: &str = "basic.auth.user";
pub const BASIC_AUTH_PASSWORD_PATH: &str = "basic.auth.password.path";
pub const ENFORCE_JSON: &str = "enforce.json";
pub const VERIFY_CONTENT_LENGTH: &str = "verify.content.length";
pub const HEADERS: &str = "headers";

/// Whether a call reads (`GET`, no body) or writes (`POST`, with body).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    Read,
    Write,
}

impl CallKind {
    /// Key of this kind's settings map in the global configuration.
    pub fn settings_key(&self) -> &'static str {
        match self {
            CallKind::Read => REST_READ_SETTINGS,
            CallKind::Write => REST_WRITE_SETTINGS,
        }
    }
}

/// Process-wide configuration handed to every call. Read-only here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GlobalConfig(Map<String, Value>);

impl GlobalConfig {
    pub fn new(map: Map<String, Value>) -> Self {
        Self(map)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// The `rest.settings` map shared by all calls.
    pub fn general_settings(&self) -> Option<&Map<String, Value>> {
        self.section(REST_SETTINGS)
    }

    /// The settings map scoped to `kind`.
    pub fn kind_settings(&self, kind: CallKind) -> Option<&Map<String, Value>> {
        self.section(kind.settings_key())
    }

    fn section(&self, key: &str) -> Option<&Map<String, Value>> {
        match self.0.get(key)? {
            Value::Object(map) => Some(map),
            Value::Null => None,
            other => {
                tracing::warn!(key, value = %other, "ignoring global REST settings that are not a map");
                None
            }
        }
    }
}

impl From<Map<String, Value>> for GlobalConfig {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Effective settings for a single call.
#[derive(Debug, Clone, PartialEq)]
pub struct RestSettings {
    pub response_codes_allowed: BTreeSet<u16>,
    pub empty_content_override: Option<Value>,
    pub error_value_override: Option<Value>,
    pub timeout: Option<Duration>,
    pub proxy_host: Option<String>,
    pub proxy_port: Option<u16>,
    pub proxy_basic_auth_user: Option<String>,
    pub proxy_basic_auth_password_path: Option<String>,
    pub basic_auth_user: Option<String>,
    pub basic_auth_password_path: Option<String>,
    pub enforce_json: bool,
    pub verify_content_length: bool,
    pub headers: BTreeMap<String, String>,
}

impl Default for RestSettings {
    fn default() -> Self {
        Self {
            response_codes_allowed: BTreeSet::from([200]),
            empty_content_override: None,
            error_value_override: None,
            timeout: None,
            proxy_host: None,
            proxy_port: None,
            proxy_basic_auth_user: None,
            proxy_basic_auth_password_path: None,
            basic_auth_user: None,
            basic_auth_password_path: None,
            enforce_json: true,
            verify_content_length: false,
            headers: BTreeMap::new(),
        }
    }
}

impl RestSettings {
    /// Merge the global configuration and the per-call map for a call of
    /// `kind`. A write call never consults the read settings and vice versa.
    pub fn resolve(global: &GlobalConfig, kind: CallKind, call: Option<&Map<String, Value>>) -> Self {
        let layers: Vec<&Map<String, Value>> = [call, global.kind_settings(kind), global.general_settings()]
            .into_iter()
            .flatten()
            .collect();
        Self::from_layers(&layers)
    }

    /// Resolve from explicit layers, highest precedence first. Keys no layer
    /// defines keep their built-in default.
    pub fn from_layers(layers: &[&Map<String, Value>]) -> Self {
        let layers = Layers(layers);
        let defaults = Self::default();
        Self {
            response_codes_allowed: layers
                .get(RESPONSE_CODES_ALLOWED, status_codes)
                .unwrap_or(defaults.response_codes_allowed),
            empty_content_override: layers.get(EMPTY_CONTENT_OVERRIDE, |v| Some(v.clone())),
            error_value_override: layers.get(ERROR_VALUE_OVERRIDE, |v| Some(v.clone())),
            timeout: layers
                .get(TIMEOUT, Value::as_u64)
                .map(Duration::from_millis)
                .or(defaults.timeout),
            proxy_host: layers.get(PROXY_HOST, string),
            proxy_port: layers.get(PROXY_PORT, port),
            proxy_basic_auth_user: layers.get(PROXY_BASIC_AUTH_USER, string),
            proxy_basic_auth_password_path: layers.get(PROXY_BASIC_AUTH_PASSWORD_PATH, string),
            basic_auth_user: layers.get(BASIC_AUTH_USER, string),
            basic_auth_password_path: layers.get(BASIC_AUTH_PASSWORD_PATH, string),
            enforce_json: layers.get(ENFORCE_JSON, Value::as_bool).unwrap_or(defaults.enforce_json),
            verify_content_length: layers
                .get(VERIFY_CONTENT_LENGTH, Value::as_bool)
                .unwrap_or(defaults.verify_content_length),
            headers: layers.get(HEADERS, headers).unwrap_or(defaults.headers),
        }
    }

    /// Proxy address, present only when both host and port are configured.
    pub fn proxy(&self) -> Option<(&str, u16)> {
        Some((self.proxy_host.as_deref()?, self.proxy_port?))
    }
}

struct Layers<'a>(&'a [&'a Map<String, Value>]);

impl Layers<'_> {
    fn get<T>(&self, key: &str, extract: impl Fn(&Value) -> Option<T>) -> Option<T> {
        for layer in self.0 {
            match layer.get(key) {
                None | Some(Value::Null) => continue,
                Some(value) => match extract(value) {
                    Some(typed) => return Some(typed),
                    None => tracing::warn!(key, value = %value, "ignoring malformed REST setting"),
                },
            }
        }
        None
    }
}

fn status_codes(value: &Value) -> Option<BTreeSet<u16>> {
    value
        .as_array()?
        .iter()
        .map(|code| code.as_u64().and_then(|code| u16::try_from(code).ok()))
        .collect()
}

fn string(value: &Value) -> Option<String> {
    value.as_str().map(str::to_string)
}

fn port(value: &Value) -> Option<u16> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|p| u16::try_from(p).ok()),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn headers(value: &Value) -> Option<BTreeMap<String, String>> {
    value
        .as_object()?
        .iter()
        .map(|(name, v)| scalar_text(v).map(|text| (name.clone(), text)))
        .collect()
}

/// Text of a scalar the way it appears in a header or query string.
pub(crate) fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
