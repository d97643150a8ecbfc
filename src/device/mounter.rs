//! Device Mounter
//!
//! Prepares a freshly attached block device the way a kubelet does:
//! create a mountpoint, format with ext4, mount.

use crate::domain::ports::{CommandRunner, CommandRunnerRef};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

// =============================================================================
// Constants
// =============================================================================

pub const FS_TYPE: &str = "ext4";
pub const FORMAT_COMMAND: &str = "mkfs.ext4";
pub const FORMAT_FLAGS: &[&str] = &["-F", "-m0"];
pub const MOUNT_COMMAND: &str = "mount";
pub const MOUNT_OPTIONS: &str = "rw,seclabel,relatime,data=ordered";
pub const SCOPE_WRAPPER: &[&str] = &["systemd-run", "--scope", "--"];

#[cfg(unix)]
const MOUNTPOINT_MODE: u32 = 0o700;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the mounter
#[derive(Debug, Clone)]
pub struct MounterConfig {
    /// Directory mountpoints are created in
    pub mount_root: PathBuf,
    /// Run mount inside a transient systemd scope
    pub use_systemd: bool,
}

impl Default for MounterConfig {
    fn default() -> Self {
        Self {
            mount_root: PathBuf::from("/mnt"),
            use_systemd: false,
        }
    }
}

// =============================================================================
// Mounter
// =============================================================================

/// Formats and mounts devices
#[derive(Clone)]
pub struct DeviceMounter {
    config: MounterConfig,
    runner: CommandRunnerRef,
}

impl DeviceMounter {
    pub fn new(config: MounterConfig, runner: CommandRunnerRef) -> Self {
        Self { config, runner }
    }

    /// Mountpoint for a device: `<mount_root>/<basename>`
    pub fn mountpoint_for(&self, device: &Path) -> PathBuf {
        match device.file_name() {
            Some(name) => self.config.mount_root.join(name),
            None => self.config.mount_root.clone(),
        }
    }

    /// Create the mountpoint directory. An existing directory is an error.
    pub async fn create_mountpoint(&self, mountpoint: &Path) -> Result<()> {
        let mut builder = tokio::fs::DirBuilder::new();
        #[cfg(unix)]
        builder.mode(MOUNTPOINT_MODE);

        builder
            .create(mountpoint)
            .await
            .map_err(|e| Error::Mountpoint {
                path: mountpoint.display().to_string(),
                reason: e.to_string(),
            })
    }

    /// `mkfs.ext4 -F -m0 <device>`
    pub fn format_command(&self, device: &Path) -> Vec<String> {
        let mut argv = vec![FORMAT_COMMAND.to_string()];
        argv.extend(FORMAT_FLAGS.iter().map(|f| f.to_string()));
        argv.push(device.display().to_string());
        argv
    }

    /// `[systemd-run --scope --] mount -t ext4 -o <opts> <device> <mountpoint>`
    pub fn mount_command(&self, device: &Path, mountpoint: &Path) -> Vec<String> {
        let mut argv: Vec<String> = Vec::new();
        if self.config.use_systemd {
            argv.extend(SCOPE_WRAPPER.iter().map(|s| s.to_string()));
        }
        argv.extend(
            [MOUNT_COMMAND, "-t", FS_TYPE, "-o", MOUNT_OPTIONS]
                .iter()
                .map(|s| s.to_string()),
        );
        argv.push(device.display().to_string());
        argv.push(mountpoint.display().to_string());
        argv
    }

    /// Create the mountpoint, format, then mount. Stops at the first failure.
    pub async fn prepare(&self, device: &Path) -> Result<PathBuf> {
        let mountpoint = self.mountpoint_for(device);
        let disk = device.display();
        let mp = mountpoint.display();

        if let Err(e) = self.create_mountpoint(&mountpoint).await {
            error!(disk = %disk, mountpoint = %mp, error = %e, "Error creating mountpath");
            return Err(e);
        }
        info!(disk = %disk, mountpoint = %mp, "Created mountpath");

        let format = self.format_command(device);
        if let Err(e) = self.runner.run(&format).await {
            error!(disk = %disk, mountpoint = %mp, error = %e, cmd = ?format, "Error formatting disk");
            return Err(e);
        }
        info!(disk = %disk, mountpoint = %mp, "Formatted disk");

        let mount = self.mount_command(device, &mountpoint);
        if let Err(e) = self.runner.run(&mount).await {
            error!(disk = %disk, mountpoint = %mp, error = %e, cmd = ?mount, "Error mounting disk");
            return Err(e);
        }

        Ok(mountpoint)
    }
}

// =============================================================================
// System Command Runner
// =============================================================================

/// Runs commands as child processes
pub struct SystemCommandRunner;

#[async_trait]
impl CommandRunner for SystemCommandRunner {
    async fn run(&self, argv: &[String]) -> Result<()> {
        let (program, args) = argv.split_first().ok_or_else(|| Error::Command {
            command: String::new(),
            reason: "empty command line".into(),
        })?;

        debug!(cmd = ?argv, "Running command");
        let output = tokio::process::Command::new(program)
            .args(args)
            .output()
            .await
            .map_err(|e| Error::Command {
                command: argv.join(" "),
                reason: e.to_string(),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Command {
                command: argv.join(" "),
                reason: format!("{}: {}", output.status, stderr.trim()),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingRunner;
    use assert_matches::assert_matches;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn mounter(root: &Path, use_systemd: bool, runner: Arc<RecordingRunner>) -> DeviceMounter {
        DeviceMounter::new(
            MounterConfig {
                mount_root: root.to_path_buf(),
                use_systemd,
            },
            runner,
        )
    }

    #[test]
    fn test_commands() {
        let m = mounter(Path::new("/mnt"), false, RecordingRunner::new());
        let device = Path::new("/dev/disk/by-id/google-gvb-ab12-0");

        assert_eq!(
            m.mountpoint_for(device),
            PathBuf::from("/mnt/google-gvb-ab12-0")
        );
        assert_eq!(
            m.format_command(device),
            vec!["mkfs.ext4", "-F", "-m0", "/dev/disk/by-id/google-gvb-ab12-0"]
        );
        assert_eq!(
            m.mount_command(device, Path::new("/mnt/google-gvb-ab12-0")),
            vec![
                "mount",
                "-t",
                "ext4",
                "-o",
                "rw,seclabel,relatime,data=ordered",
                "/dev/disk/by-id/google-gvb-ab12-0",
                "/mnt/google-gvb-ab12-0",
            ]
        );
    }

    #[test]
    fn test_systemd_wrapper() {
        let m = mounter(Path::new("/mnt"), true, RecordingRunner::new());
        let argv = m.mount_command(Path::new("/dev/sdb"), Path::new("/mnt/sdb"));
        assert_eq!(&argv[..4], &["systemd-run", "--scope", "--", "mount"]);
        assert_eq!(argv.last().unwrap(), "/mnt/sdb");
    }

    #[tokio::test]
    async fn test_prepare_runs_format_then_mount() {
        let tmp = TempDir::new().unwrap();
        let runner = RecordingRunner::new();
        let m = mounter(tmp.path(), false, runner.clone());

        let mp = m.prepare(Path::new("/dev/sdb")).await.unwrap();
        assert_eq!(mp, tmp.path().join("sdb"));
        assert!(mp.is_dir());

        let commands = runner.commands();
        assert_eq!(commands.len(), 2);
        assert_eq!(commands[0][0], "mkfs.ext4");
        assert_eq!(commands[1][0], "mount");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_mountpoint_mode() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        let m = mounter(tmp.path(), false, RecordingRunner::new());
        let mp = tmp.path().join("sdq");
        m.create_mountpoint(&mp).await.unwrap();

        let mode = std::fs::metadata(&mp).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o700);
    }

    #[tokio::test]
    async fn test_existing_mountpoint_stops_processing() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir(tmp.path().join("sdc")).unwrap();
        let runner = RecordingRunner::new();
        let m = mounter(tmp.path(), false, runner.clone());

        let result = m.prepare(Path::new("/dev/sdc")).await;
        assert_matches!(result, Err(Error::Mountpoint { .. }));
        assert!(runner.commands().is_empty());
    }

    #[tokio::test]
    async fn test_format_failure_skips_mount() {
        let tmp = TempDir::new().unwrap();
        let runner = RecordingRunner::failing(&["mkfs.ext4"]);
        let m = mounter(tmp.path(), false, runner.clone());

        let result = m.prepare(Path::new("/dev/sdd")).await;
        assert_matches!(result, Err(Error::Command { .. }));
        assert!(runner.invocations("mount").is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_system_runner_exit_status() {
        let runner = SystemCommandRunner;
        assert!(runner.run(&["true".to_string()]).await.is_ok());
        assert_matches!(
            runner.run(&["false".to_string()]).await,
            Err(Error::Command { .. })
        );
        assert_matches!(runner.run(&[]).await, Err(Error::Command { .. }));
    }
}
