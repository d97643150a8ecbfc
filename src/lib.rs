//! GCE Volume Agent
//!
//! Provisions a batch of persistent disks on the current Compute Engine
//! instance, attaches them, and formats/mounts each device node as it
//! appears, mirroring the disk handling of a node agent.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                           Orchestrator                               │
//! │        start watcher ──► create disks ──► attach ──► idle            │
//! ├───────────────────────────────┬──────────────────────────────────────┤
//! │          Compute              │               Device                 │
//! │  ┌─────────────────────────┐  │  ┌────────────────────────────────┐  │
//! │  │   VolumeProvisioner     │  │  │  DeviceWatcher (notify)        │  │
//! │  │   sequential create     │  │  │  resolve ─► SeenSet ─► spawn   │  │
//! │  │   parallel attach       │  │  └───────────────┬────────────────┘  │
//! │  └───────────┬─────────────┘  │                  │                   │
//! │  ┌───────────┴─────────────┐  │  ┌───────────────┴────────────────┐  │
//! │  │   OperationPoller       │  │  │  DeviceMounter                 │  │
//! │  │   (fixed interval)      │  │  │  mkdir ─► mkfs.ext4 ─► mount   │  │
//! │  └───────────┬─────────────┘  │  └────────────────────────────────┘  │
//! ├──────────────┴────────────────┴──────────────────────────────────────┤
//! │     Compute REST API    │    Metadata server    │   OS utilities     │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`compute`]: Compute API client, metadata, operation polling, provisioning
//! - [`device`]: Device watcher, seen set, format/mount
//! - [`domain`]: Value types and port traits
//! - [`config`]: Agent configuration
//! - [`orchestrator`]: Run lifecycle
//! - [`error`]: Error types and classification

pub mod compute;
pub mod config;
pub mod device;
pub mod domain;
pub mod error;
pub mod orchestrator;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types
pub use compute::{
    AttachBatch, ComputeConfig, GceComputeClient, MetadataClient, MetadataConfig,
    MetadataTokenSource, OperationPoller, PollerConfig, StaticToken, TokenSource,
    VolumeProvisioner,
};

pub use config::AgentConfig;

pub use device::{
    DeviceMounter, DeviceWatcher, MounterConfig, SeenSet, SystemCommandRunner, WatcherHandle,
};

pub use domain::ports::{
    AttachRequest, CommandRunner, ComputeApi, DiskInterface, DiskSpec, InstanceMetadata,
    OperationHandle, OperationStatus, RunId, Volume,
};

pub use error::{Error, ErrorClass, Result};

pub use orchestrator::Orchestrator;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
