//! Kind Dispatcher
//!
//! Every artifact kind has a deploy and a rollback contract. The closed
//! [`ArtifactPayload`] enum is matched exhaustively here, so adding a kind is a
//! compile error until both contracts exist.
//!
//! Failures are returned as [`KindError`] values; the orchestrators log them,
//! count them and move on to the next artifact.

pub mod database;
pub mod pipeline;
pub mod wait;

pub use pipeline::PipelineCatalog;
pub use wait::DeletionPoll;

use std::fmt;
use std::time::Duration;

use baits_model::{Artifact, ArtifactKind, ArtifactPayload};
use tracing::warn;

use crate::remote::{ClusterApi, PipelineService, RemoteError};

/// Default page size bound for pipeline listings.
pub const DEFAULT_LIST_LIMIT: usize = 1000;

/// Default storage class for database volumes.
pub const DEFAULT_STORAGE_CLASS: &str = "microk8s-hostpath";

/// Per-artifact deploy or rollback failure.
#[derive(Debug, Clone, thiserror::Error)]
pub enum KindError {
    #[error("pipeline has no definition to upload")]
    MissingDefinition,

    #[error("failed to render pipeline package: {0}")]
    Render(String),

    #[error("{step} failed: {source}")]
    Remote {
        step: String,
        #[source]
        source: RemoteError,
    },

    #[error("{resource} still present after {waited:?}")]
    PropagationTimeout { resource: String, waited: Duration },

    #[error("pipeline '{pipeline}' has {count} revisions named '{version}'")]
    AmbiguousRevision {
        pipeline: String,
        version: String,
        count: usize,
    },

    #[error("{listing} listing reports {total} entries, above the limit of {limit}")]
    ListingLimitExceeded {
        listing: String,
        total: usize,
        limit: usize,
    },

    #[error("{}", StepList(.0))]
    Steps(Vec<KindError>),
}

struct StepList<'a>(&'a [KindError]);

impl fmt::Display for StepList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} step(s) failed", self.0.len())?;
        for (i, err) in self.0.iter().enumerate() {
            let sep = if i == 0 { ": " } else { "; " };
            write!(f, "{}{}", sep, err)?;
        }
        Ok(())
    }
}

impl KindError {
    pub(crate) fn remote(step: impl Into<String>, source: RemoteError) -> Self {
        KindError::Remote {
            step: step.into(),
            source,
        }
    }

    /// Collapse step failures: none is success, one is itself.
    pub(crate) fn from_steps(mut failures: Vec<KindError>) -> Result<(), KindError> {
        match failures.len() {
            0 => Ok(()),
            1 => Err(failures.remove(0)),
            _ => Err(KindError::Steps(failures)),
        }
    }

    /// Short machine-readable tag for summaries.
    pub fn code(&self) -> &'static str {
        match self {
            KindError::MissingDefinition => "MISSING_DEFINITION",
            KindError::Render(_) => "RENDER",
            KindError::Remote { .. } => "REMOTE",
            KindError::PropagationTimeout { .. } => "PROPAGATION_TIMEOUT",
            KindError::AmbiguousRevision { .. } => "AMBIGUOUS_REVISION",
            KindError::ListingLimitExceeded { .. } => "LISTING_LIMIT_EXCEEDED",
            KindError::Steps(_) => "MULTIPLE",
        }
    }
}

/// Knobs shared by every kind.
#[derive(Debug, Clone)]
pub struct DispatchOptions {
    /// Page size for listings; a larger server-side total is an error.
    pub list_limit: usize,
    pub default_storage_class: String,
    pub deletion_poll: DeletionPoll,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            list_limit: DEFAULT_LIST_LIMIT,
            default_storage_class: DEFAULT_STORAGE_CLASS.to_string(),
            deletion_poll: DeletionPoll::default(),
        }
    }
}

/// Routes artifacts to their kind's deploy and rollback contract.
///
/// One dispatcher lives for one run. It caches the pipeline listing so a
/// parent registered earlier in the run is not registered again.
pub struct Dispatcher<'a> {
    pipelines: &'a dyn PipelineService,
    cluster: &'a dyn ClusterApi,
    options: DispatchOptions,
    catalog: Option<PipelineCatalog>,
}

impl<'a> Dispatcher<'a> {
    pub fn new(
        pipelines: &'a dyn PipelineService,
        cluster: &'a dyn ClusterApi,
        options: DispatchOptions,
    ) -> Self {
        Self {
            pipelines,
            cluster,
            options,
            catalog: None,
        }
    }

    /// Fetch what the pending set needs before the first mutation.
    ///
    /// A listing above the limit is returned as an error so the caller can
    /// abort; any other listing failure is logged and retried lazily by each
    /// pipeline deploy.
    pub fn prepare(&mut self, pending: &[&Artifact]) -> Result<(), KindError> {
        if !pending.iter().any(|a| a.kind() == ArtifactKind::Pipeline) {
            return Ok(());
        }
        match self.catalog() {
            Ok(_) => Ok(()),
            Err(e @ KindError::ListingLimitExceeded { .. }) => Err(e),
            Err(e) => {
                warn!(error = %e, "Pipeline listing unavailable; will retry per artifact");
                Ok(())
            }
        }
    }

    fn catalog(&mut self) -> Result<&mut PipelineCatalog, KindError> {
        let catalog = match self.catalog.take() {
            Some(catalog) => catalog,
            None => PipelineCatalog::fetch(self.pipelines, self.options.list_limit)?,
        };
        Ok(self.catalog.insert(catalog))
    }

    pub fn deploy(&mut self, artifact: &Artifact) -> Result<(), KindError> {
        match artifact.payload() {
            ArtifactPayload::Pipeline(spec) => {
                let pipelines = self.pipelines;
                let limit = self.options.list_limit;
                let catalog = self.catalog()?;
                pipeline::deploy(pipelines, catalog, limit, artifact, spec)
            }
            ArtifactPayload::Database(spec) => {
                database::deploy(self.cluster, &self.options, artifact, spec)
            }
        }
    }

    pub fn rollback(&mut self, artifact: &Artifact) -> Result<(), KindError> {
        match artifact.payload() {
            ArtifactPayload::Pipeline(_) => {
                pipeline::rollback(self.pipelines, self.options.list_limit, artifact)
            }
            ArtifactPayload::Database(_) => database::rollback(
                self.cluster,
                &self.options.deletion_poll,
                artifact.resource_name().as_str(),
                artifact.namespace().as_str(),
            ),
        }
    }
}
