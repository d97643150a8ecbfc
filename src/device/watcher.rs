//! Device Watcher
//!
//! Subscribes to a device directory (normally `/dev/disk/by-id`) and
//! formats/mounts every entry created or renamed into it exactly once.
//!
//! Events are consumed one at a time by a single loop. The loop resolves
//! the symlink target and claims it in the [`SeenSet`] before handing the
//! slow mkdir/mkfs/mount work to its own task, so a second event for the
//! same target is always rejected even while the first is still being
//! formatted.

use crate::device::mounter::DeviceMounter;
use crate::device::seen::SeenSet;
use crate::error::{Error, Result};
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

type WatchMessage = std::result::Result<Event, notify::Error>;

// =============================================================================
// Watcher Handle
// =============================================================================

/// Keeps the subscription alive; dropping it stops event delivery
pub struct WatcherHandle {
    _watcher: RecommendedWatcher,
    task: JoinHandle<()>,
    seen: SeenSet,
}

impl WatcherHandle {
    /// Targets processed so far
    pub fn seen(&self) -> &SeenSet {
        &self.seen
    }

    /// Wait for the event loop to exit after its token was cancelled
    pub async fn shutdown(self) {
        let WatcherHandle { _watcher: watcher, task, .. } = self;
        if let Err(e) = task.await {
            warn!(error = %e, "disk watcher task ended abnormally");
        }
        drop(watcher);
    }
}

// =============================================================================
// Device Watcher
// =============================================================================

/// Formats and mounts devices as they appear under a directory
#[derive(Clone)]
pub struct DeviceWatcher {
    path: PathBuf,
    mounter: DeviceMounter,
    seen: SeenSet,
}

impl DeviceWatcher {
    pub fn new(path: impl Into<PathBuf>, mounter: DeviceMounter) -> Self {
        Self {
            path: path.into(),
            mounter,
            seen: SeenSet::new(),
        }
    }

    pub fn seen(&self) -> &SeenSet {
        &self.seen
    }

    /// Subscribe to the directory and start the event loop.
    ///
    /// The subscription is active when this returns, so devices created
    /// afterwards are never missed. The loop runs until `cancel` fires.
    pub fn start(self, cancel: CancellationToken) -> Result<WatcherHandle> {
        let (tx, rx) = mpsc::unbounded_channel::<WatchMessage>();

        let mut watcher = RecommendedWatcher::new(
            move |result: WatchMessage| {
                // Receiver gone means the loop already exited.
                let _ = tx.send(result);
            },
            notify::Config::default(),
        )
        .map_err(|source| Error::Watch {
            path: self.path.display().to_string(),
            source,
        })?;

        watcher
            .watch(&self.path, RecursiveMode::NonRecursive)
            .map_err(|source| Error::Watch {
                path: self.path.display().to_string(),
                source,
            })?;

        info!(path = %self.path.display(), "Watching for new disks to mount");

        let seen = self.seen.clone();
        let task = tokio::spawn(self.run(rx, cancel));

        Ok(WatcherHandle {
            _watcher: watcher,
            task,
            seen,
        })
    }

    async fn run(self, mut rx: mpsc::UnboundedReceiver<WatchMessage>, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!(path = %self.path.display(), "disk watcher shutting down");
                    break;
                }
                message = rx.recv() => match message {
                    Some(Ok(event)) => {
                        for path in appeared_paths(event) {
                            // Detached: the loop never waits on mkfs/mount.
                            let _ = self.handle_created(path).await;
                        }
                    }
                    Some(Err(e)) => {
                        let e = Error::Subscription(e);
                        error!(error = %e, "Error watching disks");
                    }
                    None => break,
                },
            }
        }
    }

    /// React to one created path.
    ///
    /// Resolves and claims the target inline, then returns the task doing
    /// the mount work, or None when the target was already claimed.
    pub async fn handle_created(&self, disk: PathBuf) -> Option<JoinHandle<Option<PathBuf>>> {
        let target = resolve_target(&disk).await;
        let mountpoint = self.mounter.mountpoint_for(&disk);
        info!(
            disk = %disk.display(),
            mountpoint = %mountpoint.display(),
            target = %target.display(),
            "New disk detected"
        );

        if !self.seen.mark(&target) {
            info!(disk = %disk.display(), target = %target.display(), "Ignoring previously processed disk");
            return None;
        }

        let mounter = self.mounter.clone();
        Some(tokio::spawn(async move {
            // Operations act on the path the event named, not the resolved target.
            match mounter.prepare(&disk).await {
                Ok(mountpoint) => {
                    info!(disk = %disk.display(), mountpoint = %mountpoint.display(), "Mounted disk");
                    Some(mountpoint)
                }
                Err(e) => {
                    warn!(disk = %disk.display(), target = %target.display(), error = %e, "Abandoning disk");
                    None
                }
            }
        }))
    }
}

/// Paths an event brings into the directory.
///
/// udev builds by-id symlinks under a `.#` temporary name and renames them
/// into place, so a rename's destination counts as a new entry and hidden
/// entries are skipped until they get their final name.
fn appeared_paths(event: Event) -> Vec<PathBuf> {
    let paths = match event.kind {
        EventKind::Create(_) | EventKind::Modify(ModifyKind::Name(RenameMode::To)) => event.paths,
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            event.paths.into_iter().nth(1).into_iter().collect()
        }
        _ => Vec::new(),
    };
    paths.into_iter().filter(|p| !is_hidden(p)).collect()
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .map(|name| name.to_string_lossy().starts_with('.'))
        .unwrap_or(false)
}

/// Follow symlinks to the real device node; fall back to the raw path
async fn resolve_target(disk: &Path) -> PathBuf {
    match tokio::fs::canonicalize(disk).await {
        Ok(target) => target,
        Err(e) => {
            info!(disk = %disk.display(), error = %e, "Cannot determine symlink target");
            disk.to_path_buf()
        }
    }
}
