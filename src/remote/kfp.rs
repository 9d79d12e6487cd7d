//! Kubeflow Pipelines REST client (v1beta1 API)

use std::path::Path;
use std::time::Duration;

use reqwest::blocking::multipart::{Form, Part};
use reqwest::Method;
use serde::Deserialize;
use serde_json::json;

use super::http::{Auth, HttpEndpoint};
use super::pipelines::{Page, PipelineRef, PipelineService, RevisionRef, ServiceHealth};
use super::{RemoteError, RemoteReason};

/// In-cluster address of the pipeline API server.
pub const IN_CLUSTER_ENDPOINT: &str = "http://ml-pipeline.kubeflow.svc.cluster.local:8888";

/// Projected service-account token with audience `pipelines.kubeflow.org`.
pub const DEFAULT_TOKEN_PATH: &str = "/var/run/secrets/kubeflow/pipelines/token";

/// Environment override for [`DEFAULT_TOKEN_PATH`].
pub const TOKEN_PATH_ENV: &str = "KF_PIPELINES_SA_TOKEN_PATH";

const API: &str = "/apis/v1beta1";
const PACKAGE_FILE_NAME: &str = "pipeline.yaml";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Blocking client for the pipeline execution service.
#[derive(Debug, Clone)]
pub struct KfpClient {
    endpoint: HttpEndpoint,
}

#[derive(Debug, Deserialize)]
struct PipelineList {
    #[serde(default)]
    pipelines: Vec<PipelineRef>,
    #[serde(default, deserialize_with = "lenient_usize")]
    total_size: usize,
}

#[derive(Debug, Deserialize)]
struct VersionList {
    #[serde(default)]
    versions: Vec<RevisionRef>,
    #[serde(default, deserialize_with = "lenient_usize")]
    total_size: usize,
}

/// The gateway encodes int32 as a number and int64 as a string.
fn lenient_usize<'de, D>(deserializer: D) -> Result<usize, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Number(n) => n
            .as_u64()
            .map(|n| n as usize)
            .ok_or_else(|| D::Error::custom("negative size")),
        serde_json::Value::String(s) => s.parse().map_err(D::Error::custom),
        serde_json::Value::Null => Ok(0),
        other => Err(D::Error::custom(format!("unexpected size {}", other))),
    }
}

fn decode<T: for<'de> Deserialize<'de>>(value: serde_json::Value) -> Result<T, RemoteError> {
    serde_json::from_value(value)
        .map_err(|e| RemoteError::new(RemoteReason::Invalid, format!("unexpected response: {}", e)))
}

fn name_filter(name: &str) -> String {
    json!({
        "predicates": [
            {"key": "name", "op": "EQUALS", "string_value": name}
        ]
    })
    .to_string()
}

impl KfpClient {
    /// Connect from inside the cluster with the projected pipeline token.
    pub fn in_cluster() -> Result<Self, RemoteError> {
        let token_path =
            std::env::var(TOKEN_PATH_ENV).unwrap_or_else(|_| DEFAULT_TOKEN_PATH.to_string());
        let token = std::fs::read_to_string(Path::new(&token_path)).map_err(|e| {
            RemoteError::new(
                RemoteReason::Unauthorized,
                format!("cannot read pipeline token {}: {}", token_path, e),
            )
        })?;
        let endpoint = HttpEndpoint::new(
            IN_CLUSTER_ENDPOINT,
            Auth::Bearer(token.trim().to_string()),
            None,
            Some(REQUEST_TIMEOUT),
        )?;
        Ok(Self { endpoint })
    }

    /// Connect through the public gateway, which serves the API under `/pipeline`.
    pub fn external(endpoint: &str, username: &str, password: &str) -> Result<Self, RemoteError> {
        let base = format!("{}/pipeline", endpoint.trim_end_matches('/'));
        let endpoint = HttpEndpoint::new(
            base,
            Auth::Basic {
                username: username.to_string(),
                password: password.to_string(),
            },
            None,
            Some(REQUEST_TIMEOUT),
        )?;
        Ok(Self { endpoint })
    }

    pub fn base_url(&self) -> &str {
        self.endpoint.base_url()
    }

    fn package_form(package: &str) -> Result<Form, RemoteError> {
        let part = Part::text(package.to_string())
            .file_name(PACKAGE_FILE_NAME)
            .mime_str("application/x-yaml")
            .map_err(|e| RemoteError::new(RemoteReason::Invalid, e.to_string()))?;
        Ok(Form::new().part("uploadfile", part))
    }
}

impl PipelineService for KfpClient {
    fn healthz(&self) -> Result<ServiceHealth, RemoteError> {
        let request = self.endpoint.request(Method::GET, &format!("{}/healthz", API));
        decode(self.endpoint.send(request)?)
    }

    fn list_pipelines(
        &self,
        name_filter_value: Option<&str>,
        page_size: usize,
    ) -> Result<Page<PipelineRef>, RemoteError> {
        let mut query = vec![("page_size", page_size.to_string())];
        if let Some(name) = name_filter_value {
            query.push(("filter", name_filter(name)));
        }
        let request = self
            .endpoint
            .request(Method::GET, &format!("{}/pipelines", API))
            .query(&query);
        let list: PipelineList = decode(self.endpoint.send(request)?)?;
        let total_size = list.total_size.max(list.pipelines.len());
        Ok(Page {
            items: list.pipelines,
            total_size,
        })
    }

    fn upload(
        &self,
        package: &str,
        name: &str,
        description: Option<&str>,
    ) -> Result<PipelineRef, RemoteError> {
        let mut query = vec![("name", name)];
        if let Some(description) = description {
            query.push(("description", description));
        }
        let request = self
            .endpoint
            .request(Method::POST, &format!("{}/pipelines/upload", API))
            .query(&query)
            .multipart(Self::package_form(package)?);
        decode(self.endpoint.send(request)?)
    }

    fn upload_version(
        &self,
        package: &str,
        pipeline_id: &str,
        version: &str,
        description: Option<&str>,
    ) -> Result<RevisionRef, RemoteError> {
        let mut query = vec![("name", version), ("pipelineid", pipeline_id)];
        if let Some(description) = description {
            query.push(("description", description));
        }
        let request = self
            .endpoint
            .request(Method::POST, &format!("{}/pipelines/upload_version", API))
            .query(&query)
            .multipart(Self::package_form(package)?);
        decode(self.endpoint.send(request)?)
    }

    fn list_versions(
        &self,
        pipeline_id: &str,
        page_size: usize,
    ) -> Result<Page<RevisionRef>, RemoteError> {
        let request = self
            .endpoint
            .request(Method::GET, &format!("{}/pipeline_versions", API))
            .query(&[
                ("resource_key.type", "PIPELINE"),
                ("resource_key.id", pipeline_id),
                ("page_size", &page_size.to_string()),
            ]);
        let list: VersionList = decode(self.endpoint.send(request)?)?;
        let total_size = list.total_size.max(list.versions.len());
        Ok(Page {
            items: list.versions,
            total_size,
        })
    }

    fn delete_version(&self, version_id: &str) -> Result<(), RemoteError> {
        let request = self
            .endpoint
            .request(Method::DELETE, &format!("{}/pipeline_versions/{}", API, version_id));
        self.endpoint.send(request).map(|_| ())
    }

    fn delete(&self, pipeline_id: &str) -> Result<(), RemoteError> {
        let request = self
            .endpoint
            .request(Method::DELETE, &format!("{}/pipelines/{}", API, pipeline_id));
        self.endpoint.send(request).map(|_| ())
    }
}
