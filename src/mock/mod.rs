//! Mock Collaborators
//!
//! In-process stand-ins for the remote systems, used by unit and integration
//! tests to drive full reconciliation runs without a cluster.
//!
//! - [`MockCluster`]: Kubernetes resource API with resource versions and
//!   deletion lag
//! - [`MockPipelineService`]: pipeline service with parent/revision listings
//! - [`FailureInjector`]: per-operation (and per-target) failure injection
//!   shared by both, and by [`InMemoryRegistry`](crate::registry::InMemoryRegistry)

mod cluster;
mod failure;
mod pipelines;

pub use cluster::MockCluster;
pub use failure::{FailureConfig, FailureInjector, MockOp};
pub use pipelines::MockPipelineService;
