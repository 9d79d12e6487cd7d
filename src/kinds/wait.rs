//! Deletion propagation polling
//!
//! Cluster deletions are asynchronous: a delete call returns before the object
//! is gone. After each delete the dispatcher polls until a read reports
//! `NotFound`, failing with `PropagationTimeout` once the budget is spent.

use std::thread;
use std::time::{Duration, Instant};

use tracing::debug;

use super::KindError;
use crate::remote::{ClusterApi, ObjectRef};

/// Poll interval and overall budget for one deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeletionPoll {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for DeletionPoll {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(500),
            timeout: Duration::from_secs(60),
        }
    }
}

impl DeletionPoll {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }

    /// Build from configuration values.
    pub fn from_config(interval_ms: Option<u64>, timeout_seconds: Option<u64>) -> Self {
        let defaults = Self::default();
        Self {
            interval: interval_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.interval),
            timeout: timeout_seconds
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
        }
    }

    /// Block until `target` can no longer be read.
    ///
    /// Read errors other than `NotFound` are surfaced immediately.
    pub fn wait_until_absent(
        &self,
        cluster: &dyn ClusterApi,
        target: &ObjectRef,
    ) -> Result<Duration, KindError> {
        let start = Instant::now();
        let mut polls = 0u32;

        loop {
            polls += 1;
            match cluster.read(target) {
                Err(e) if e.is_not_found() => {
                    let waited = start.elapsed();
                    debug!(resource = %target, polls, ?waited, "Deletion propagated");
                    return Ok(waited);
                }
                Err(e) => {
                    return Err(KindError::Remote {
                        step: format!("await deletion of {}", target),
                        source: e,
                    })
                }
                Ok(_) => {}
            }

            let waited = start.elapsed();
            if waited >= self.timeout {
                return Err(KindError::PropagationTimeout {
                    resource: target.to_string(),
                    waited,
                });
            }
            thread::sleep(self.interval.min(self.timeout - waited));
        }
    }
}
