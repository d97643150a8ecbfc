//! Agent configuration
//!
//! Typed configuration handed to the orchestrator. The binary builds it
//! from command line flags; tests build it directly.

use crate::error::{Error, Result};
use std::path::PathBuf;
use std::time::Duration;

// =============================================================================
// Defaults
// =============================================================================

pub const DEFAULT_DISK_TYPE: &str = "pd-standard";
pub const DEFAULT_DISK_SIZE_GB: u64 = 128;
pub const DEFAULT_WATCH_PATH: &str = "/dev/disk/by-id";
pub const DEFAULT_MOUNT_ROOT: &str = "/mnt";
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

// =============================================================================
// Agent Configuration
// =============================================================================

/// Configuration for one agent run
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Number of disks to create and attach
    pub disk_count: usize,
    /// Disk type name (pd-standard, pd-ssd, ...)
    pub disk_type: String,
    /// Size of each disk in GB
    pub disk_size_gb: u64,
    /// Directory under which new device nodes appear
    pub watch_path: PathBuf,
    /// Directory under which mountpoints are created
    pub mount_root: PathBuf,
    /// Wrap mount in `systemd-run --scope`
    pub use_systemd: bool,
    /// Interval between zone operation polls
    pub poll_interval: Duration,
    /// Give up on an operation after this long; None polls forever
    pub operation_timeout: Option<Duration>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            disk_count: 0,
            disk_type: DEFAULT_DISK_TYPE.to_string(),
            disk_size_gb: DEFAULT_DISK_SIZE_GB,
            watch_path: PathBuf::from(DEFAULT_WATCH_PATH),
            mount_root: PathBuf::from(DEFAULT_MOUNT_ROOT),
            use_systemd: false,
            poll_interval: DEFAULT_POLL_INTERVAL,
            operation_timeout: None,
        }
    }
}

impl AgentConfig {
    /// Reject configurations the compute API or the mounter cannot act on
    pub fn validate(&self) -> Result<()> {
        if self.disk_size_gb == 0 {
            return Err(Error::Configuration(
                "disk size must be greater than 0 GB".into(),
            ));
        }
        if self.disk_type.trim().is_empty() {
            return Err(Error::Configuration("disk type must not be empty".into()));
        }
        if !self.watch_path.is_absolute() {
            return Err(Error::Configuration(format!(
                "disk path must be absolute: {}",
                self.watch_path.display()
            )));
        }
        if !self.mount_root.is_absolute() {
            return Err(Error::Configuration(format!(
                "mount root must be absolute: {}",
                self.mount_root.display()
            )));
        }
        if self.poll_interval.is_zero() {
            return Err(Error::Configuration(
                "operation poll interval must be non-zero".into(),
            ));
        }
        Ok(())
    }
}
