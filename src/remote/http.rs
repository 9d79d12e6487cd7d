//! Blocking HTTP plumbing shared by the Kubernetes and pipeline clients.

use std::fmt;
use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder};
use reqwest::{Certificate, Method};
use serde_json::Value;

use super::{RemoteError, RemoteReason};

/// Request credentials.
#[derive(Clone)]
pub enum Auth {
    None,
    Bearer(String),
    Basic { username: String, password: String },
}

impl fmt::Debug for Auth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Auth::None => f.write_str("None"),
            Auth::Bearer(_) => f.write_str("Bearer([REDACTED])"),
            Auth::Basic { username, .. } => write!(f, "Basic({username}, [REDACTED])"),
        }
    }
}

/// A base URL plus credentials and a configured client.
#[derive(Debug, Clone)]
pub struct HttpEndpoint {
    base_url: String,
    auth: Auth,
    client: Client,
}

impl HttpEndpoint {
    /// Build an endpoint. `ca_pem` adds a trusted root (the in-cluster CA).
    pub fn new(
        base_url: impl Into<String>,
        auth: Auth,
        ca_pem: Option<&[u8]>,
        timeout: Option<Duration>,
    ) -> Result<Self, RemoteError> {
        let mut builder = Client::builder();
        if let Some(pem) = ca_pem {
            let cert = Certificate::from_pem(pem)
                .map_err(|e| RemoteError::new(RemoteReason::Invalid, format!("invalid CA certificate: {}", e)))?;
            builder = builder.add_root_certificate(cert);
        }
        builder = builder.timeout(timeout);
        let client = builder
            .build()
            .map_err(|e| RemoteError::unavailable(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth,
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Start a request against `path` (relative to the base URL) with
    /// credentials applied.
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.client.request(method, format!("{}{}", self.base_url, path));
        match &self.auth {
            Auth::None => builder,
            Auth::Bearer(token) => builder.bearer_auth(token),
            Auth::Basic { username, password } => builder.basic_auth(username, Some(password)),
        }
    }

    /// Send a request and decode the JSON body. Empty bodies decode as null.
    pub fn send(&self, request: RequestBuilder) -> Result<Value, RemoteError> {
        let response = request
            .send()
            .map_err(|e| RemoteError::unavailable(format!("request failed: {}", e)))?;
        let status = response.status();
        let body = response
            .text()
            .map_err(|e| RemoteError::unavailable(format!("failed to read response: {}", e)))?;

        if !status.is_success() {
            return Err(error_from_body(status.as_u16(), &body));
        }
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body)
            .map_err(|e| RemoteError::new(RemoteReason::Invalid, format!("malformed response: {}", e)))
    }
}

/// Build an error from a failed response.
///
/// Kubernetes answers with a `Status` object carrying `reason`; the pipeline
/// service answers with a gRPC-style `{code, error}` body. Anything else falls
/// back to the HTTP status code.
pub fn error_from_body(status: u16, body: &str) -> RemoteError {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let message = parsed
        .as_ref()
        .and_then(|v| v.get("message").or_else(|| v.get("error")))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| body.trim().to_string());

    let reason = parsed
        .as_ref()
        .and_then(|v| {
            if let Some(reason) = v.get("reason").and_then(Value::as_str) {
                return Some(RemoteReason::from_k8s(reason));
            }
            v.get("code").and_then(Value::as_u64).and_then(grpc_reason)
        })
        .unwrap_or_else(|| RemoteReason::from_status(status));

    RemoteError::new(reason, message)
}

fn grpc_reason(code: u64) -> Option<RemoteReason> {
    match code {
        5 => Some(RemoteReason::NotFound),
        6 => Some(RemoteReason::AlreadyExists),
        9 | 10 => Some(RemoteReason::Conflict),
        16 | 7 => Some(RemoteReason::Unauthorized),
        3 => Some(RemoteReason::Invalid),
        _ => None,
    }
}
