//! Volume Provisioner
//!
//! Creates a batch of persistent disks one after another, then attaches
//! them to an instance in parallel.

use crate::compute::operation::OperationPoller;
use crate::domain::ports::{AttachRequest, ComputeApiRef, DiskInterface, DiskSpec, RunId, Volume};
use crate::error::{Error, Result};
use futures::future::join_all;
use tokio::task::JoinHandle;
use tracing::{error, info};

// =============================================================================
// Attach Batch
// =============================================================================

/// In-flight attach calls.
///
/// Dropping the batch detaches the tasks; each still logs its own outcome.
pub struct AttachBatch {
    handles: Vec<JoinHandle<Result<()>>>,
}

impl AttachBatch {
    /// Number of attach calls dispatched
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Wait for every attach call and collect the outcomes in dispatch order
    pub async fn join(self) -> Vec<Result<()>> {
        join_all(self.handles)
            .await
            .into_iter()
            .map(|joined| match joined {
                Ok(result) => result,
                Err(e) => Err(Error::Internal(format!("attach task failed: {}", e))),
            })
            .collect()
    }
}

// =============================================================================
// Volume Provisioner
// =============================================================================

/// Creates and attaches the disks for one run
pub struct VolumeProvisioner {
    compute: ComputeApiRef,
    poller: OperationPoller,
    run_id: RunId,
}

impl VolumeProvisioner {
    pub fn new(compute: ComputeApiRef, poller: OperationPoller, run_id: RunId) -> Self {
        Self {
            compute,
            poller,
            run_id,
        }
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    /// Create `count` disks sequentially, waiting on each insert operation
    /// before submitting the next.
    ///
    /// The first failure aborts the batch. Disks created before it are left
    /// in place.
    pub async fn create_volumes(
        &self,
        count: usize,
        disk_type: &str,
        size_gb: u64,
    ) -> Result<Vec<Volume>> {
        let mut volumes = Vec::with_capacity(count);

        for i in 0..count {
            let name = self.run_id.disk_name(i);
            info!(name = %name, disk_type = %disk_type, "Creating disk");

            let spec = DiskSpec {
                name: name.clone(),
                size_gb,
                disk_type: self.compute.disk_type_url(disk_type),
            };
            let op = self
                .compute
                .insert_disk(&spec)
                .await
                .map_err(|e| Error::DiskCreation {
                    name: name.clone(),
                    reason: e.to_string(),
                })?;

            self.poller
                .wait(&op.handle())
                .await
                .map_err(|e| Error::DiskCreation {
                    name: name.clone(),
                    reason: e.to_string(),
                })?;

            info!(name = %name, disk_type = %disk_type, url = %op.target_link, "Created disk");
            volumes.push(Volume {
                name,
                url: op.target_link,
            });
        }

        Ok(volumes)
    }

    /// Fire one attach call per volume without waiting for any of them.
    ///
    /// Each outcome is logged by its own task. The returned batch may be
    /// dropped or joined.
    pub fn attach_volumes(&self, instance: &str, volumes: &[Volume]) -> AttachBatch {
        let handles = volumes
            .iter()
            .cloned()
            .map(|volume| {
                let compute = self.compute.clone();
                let instance = instance.to_string();
                tokio::spawn(async move { attach_one(compute, instance, volume).await })
            })
            .collect();

        AttachBatch { handles }
    }
}

async fn attach_one(compute: ComputeApiRef, instance: String, volume: Volume) -> Result<()> {
    let request = AttachRequest {
        source: volume.url.clone(),
        device_name: volume.name.clone(),
        interface: DiskInterface::Scsi,
    };

    match compute.attach_disk(&instance, &request).await {
        Ok(_) => {
            info!(instance = %instance, url = %volume.url, name = %volume.name, "Attached disk");
            Ok(())
        }
        Err(e) => {
            error!(
                instance = %instance,
                url = %volume.url,
                name = %volume.name,
                error = %e,
                "Disk attachment failed"
            );
            Err(Error::DiskAttachment {
                name: volume.name,
                instance,
                reason: e.to_string(),
            })
        }
    }
}
