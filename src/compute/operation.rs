//! Zone Operation Poller
//!
//! Waits for a long-running compute operation by re-fetching it at a fixed
//! interval. There is no backoff; transport errors while polling are not
//! retried.

use crate::domain::ports::{ComputeApiRef, OperationHandle};
use crate::error::{Error, Result};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Configuration for the poller
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Delay between status fetches
    pub interval: Duration,
    /// Overall deadline; None waits indefinitely
    pub timeout: Option<Duration>,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            timeout: None,
        }
    }
}

/// Polls zone operations until they finish
#[derive(Clone)]
pub struct OperationPoller {
    compute: ComputeApiRef,
    config: PollerConfig,
}

impl OperationPoller {
    pub fn new(compute: ComputeApiRef, config: PollerConfig) -> Self {
        Self { compute, config }
    }

    /// Block until `operation` reports DONE.
    ///
    /// Fails as soon as a fetch errors, the operation carries an error
    /// block, or the optional deadline passes.
    pub async fn wait(&self, operation: &OperationHandle) -> Result<()> {
        let deadline = self.config.timeout.map(|t| Instant::now() + t);

        loop {
            let status = self
                .compute
                .get_zone_operation(operation)
                .await
                .map_err(|e| Error::OperationPoll {
                    operation: operation.name.clone(),
                    reason: e.to_string(),
                })?;

            if let Some(err) = status.error {
                return Err(Error::OperationFailed {
                    operation: operation.name.clone(),
                    reason: err.to_string(),
                });
            }
            if status.is_done() {
                debug!(operation = %operation.name, "operation done");
                return Ok(());
            }

            if let (Some(deadline), Some(timeout)) = (deadline, self.config.timeout) {
                if Instant::now() + self.config.interval > deadline {
                    return Err(Error::OperationTimeout {
                        operation: operation.name.clone(),
                        seconds: timeout.as_secs(),
                    });
                }
            }

            debug!(operation = %operation.name, status = %status.status, "operation pending");
            tokio::time::sleep(self.config.interval).await;
        }
    }
}
