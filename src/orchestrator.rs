//! Agent Orchestrator
//!
//! Wires configuration into the watcher and provisioner and runs them in
//! the only safe order:
//! - start the device watcher (subscription active before any disk exists)
//! - create the disks, one operation at a time
//! - fire the attach calls without waiting on them
//! - idle until cancelled, then release the watcher

use crate::compute::client::{ComputeConfig, GceComputeClient};
use crate::compute::metadata::TokenSource;
use crate::compute::operation::{OperationPoller, PollerConfig};
use crate::compute::provisioner::VolumeProvisioner;
use crate::config::AgentConfig;
use crate::device::mounter::{DeviceMounter, MounterConfig};
use crate::device::watcher::{DeviceWatcher, WatcherHandle};
use crate::domain::ports::{CommandRunnerRef, ComputeApiRef, InstanceMetadataRef, RunId, Volume};
use crate::error::Result;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Drives one provisioning run
pub struct Orchestrator {
    config: AgentConfig,
    compute: ComputeApiRef,
    runner: CommandRunnerRef,
    instance: String,
    run_id: RunId,
}

impl Orchestrator {
    pub fn new(
        config: AgentConfig,
        compute: ComputeApiRef,
        runner: CommandRunnerRef,
        instance: impl Into<String>,
        run_id: RunId,
    ) -> Self {
        Self {
            config,
            compute,
            runner,
            instance: instance.into(),
            run_id,
        }
    }

    /// Resolve zone, project, and instance from the metadata server and
    /// build an authenticated compute client for them.
    pub async fn connect(
        config: AgentConfig,
        metadata: InstanceMetadataRef,
        tokens: Arc<dyn TokenSource>,
        runner: CommandRunnerRef,
        run_id: RunId,
    ) -> Result<Self> {
        let zone = metadata.zone().await?;
        let project = metadata.project_id().await?;
        let instance = metadata.instance_name().await?;
        info!(project = %project, zone = %zone, instance = %instance, "Resolved instance metadata");

        let compute = GceComputeClient::new(ComputeConfig::new(project, zone), tokens)?;
        Ok(Self::new(config, Arc::new(compute), runner, instance, run_id))
    }

    pub fn instance(&self) -> &str {
        &self.instance
    }

    pub fn compute(&self) -> &ComputeApiRef {
        &self.compute
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    fn provisioner(&self) -> VolumeProvisioner {
        let poller = OperationPoller::new(
            self.compute.clone(),
            PollerConfig {
                interval: self.config.poll_interval,
                timeout: self.config.operation_timeout,
            },
        );
        VolumeProvisioner::new(self.compute.clone(), poller, self.run_id.clone())
    }

    /// Subscribe to the configured device directory
    pub fn start_watcher(&self, cancel: CancellationToken) -> Result<WatcherHandle> {
        let mounter = DeviceMounter::new(
            MounterConfig {
                mount_root: self.config.mount_root.clone(),
                use_systemd: self.config.use_systemd,
            },
            self.runner.clone(),
        );
        DeviceWatcher::new(self.config.watch_path.clone(), mounter).start(cancel)
    }

    /// Create the configured disks and dispatch their attach calls.
    ///
    /// Returns as soon as the attach calls are in flight.
    pub async fn provision(&self) -> Result<Vec<Volume>> {
        let provisioner = self.provisioner();
        let volumes = provisioner
            .create_volumes(
                self.config.disk_count,
                &self.config.disk_type,
                self.config.disk_size_gb,
            )
            .await?;

        let batch = provisioner.attach_volumes(&self.instance, &volumes);
        info!(instance = %self.instance, count = batch.len(), "Dispatched disk attachments");
        drop(batch);

        Ok(volumes)
    }

    /// Full lifecycle: watch, provision, idle until `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        self.config.validate()?;
        info!(run = %self.run_id, disks = self.config.disk_count, "Starting run");

        let watcher = self.start_watcher(cancel.child_token())?;

        self.provision().await?;

        cancel.cancelled().await;
        info!("Shutting down");
        watcher.shutdown().await;
        Ok(())
    }
}
