//! Kubernetes REST client

use std::path::Path;
use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use reqwest::Method;
use serde_json::{json, Value};

use super::cluster::{ClusterApi, ObjectRef};
use super::http::{Auth, HttpEndpoint};
use super::{RemoteError, RemoteReason};

const SERVICE_ACCOUNT_DIR: &str = "/var/run/secrets/kubernetes.io/serviceaccount";
const MERGE_PATCH: &str = "application/merge-patch+json";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Blocking client for the Kubernetes API server.
#[derive(Debug, Clone)]
pub struct KubeClient {
    endpoint: HttpEndpoint,
}

impl KubeClient {
    /// Connect using the pod's service account.
    pub fn in_cluster() -> Result<Self, RemoteError> {
        let host = std::env::var("KUBERNETES_SERVICE_HOST").map_err(|_| {
            RemoteError::new(
                RemoteReason::Invalid,
                "KUBERNETES_SERVICE_HOST is not set; not running inside a cluster",
            )
        })?;
        let port = std::env::var("KUBERNETES_SERVICE_PORT").unwrap_or_else(|_| "443".to_string());

        let dir = Path::new(SERVICE_ACCOUNT_DIR);
        let token = read_credential(&dir.join("token"))?;
        let ca = std::fs::read(dir.join("ca.crt")).map_err(|e| {
            RemoteError::new(RemoteReason::Invalid, format!("cannot read cluster CA: {}", e))
        })?;

        let base = if host.contains(':') {
            format!("https://[{}]:{}", host, port)
        } else {
            format!("https://{}:{}", host, port)
        };
        let endpoint = HttpEndpoint::new(
            base,
            Auth::Bearer(token.trim().to_string()),
            Some(&ca),
            Some(REQUEST_TIMEOUT),
        )?;
        Ok(Self { endpoint })
    }

    /// Connect to an explicit API server URL.
    pub fn external(api_url: &str, token: Option<&str>) -> Result<Self, RemoteError> {
        let auth = match token {
            Some(token) => Auth::Bearer(token.to_string()),
            None => Auth::None,
        };
        let endpoint = HttpEndpoint::new(api_url, auth, None, Some(REQUEST_TIMEOUT))?;
        Ok(Self { endpoint })
    }

    pub fn base_url(&self) -> &str {
        self.endpoint.base_url()
    }
}

fn read_credential(path: &Path) -> Result<String, RemoteError> {
    std::fs::read_to_string(path).map_err(|e| {
        RemoteError::new(
            RemoteReason::Unauthorized,
            format!("cannot read {}: {}", path.display(), e),
        )
    })
}

fn delete_options(resource_version: Option<&str>) -> Value {
    match resource_version {
        Some(rv) => json!({
            "kind": "DeleteOptions",
            "apiVersion": "v1",
            "propagationPolicy": "Foreground",
            "preconditions": {"resourceVersion": rv}
        }),
        None => json!({
            "kind": "DeleteOptions",
            "apiVersion": "v1",
            "propagationPolicy": "Foreground"
        }),
    }
}

impl ClusterApi for KubeClient {
    fn create(&self, target: &ObjectRef, manifest: &Value) -> Result<Value, RemoteError> {
        let request = self
            .endpoint
            .request(Method::POST, &target.collection_path())
            .json(manifest);
        self.endpoint.send(request)
    }

    fn read(&self, target: &ObjectRef) -> Result<Value, RemoteError> {
        let request = self.endpoint.request(Method::GET, &target.path());
        self.endpoint.send(request)
    }

    fn patch(&self, target: &ObjectRef, patch: &Value) -> Result<Value, RemoteError> {
        let body = serde_json::to_vec(patch)
            .map_err(|e| RemoteError::new(RemoteReason::Invalid, e.to_string()))?;
        let request = self
            .endpoint
            .request(Method::PATCH, &target.path())
            .header(CONTENT_TYPE, MERGE_PATCH)
            .body(body);
        self.endpoint.send(request)
    }

    fn delete(&self, target: &ObjectRef, resource_version: Option<&str>) -> Result<(), RemoteError> {
        let request = self
            .endpoint
            .request(Method::DELETE, &target.path())
            .json(&delete_options(resource_version));
        self.endpoint.send(request).map(|_| ())
    }

    fn list_secrets(&self, label_selector: &str) -> Result<Vec<Value>, RemoteError> {
        let request = self
            .endpoint
            .request(Method::GET, "/api/v1/secrets")
            .query(&[("labelSelector", label_selector)]);
        let list = self.endpoint.send(request)?;
        Ok(list
            .get("items")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delete_options_precondition() {
        let opts = delete_options(Some("17"));
        assert_eq!(opts["preconditions"]["resourceVersion"], "17");
        assert!(delete_options(None).get("preconditions").is_none());
    }

    #[test]
    fn test_external_trims_trailing_slash() {
        let client = KubeClient::external("https://127.0.0.1:6443/", Some("t")).unwrap();
        assert_eq!(client.base_url(), "https://127.0.0.1:6443");
    }
}
