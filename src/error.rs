//! Error types for the GCE volume agent
//!
//! Provides structured error types for every agent component: startup
//! collaborators (metadata, credentials), disk provisioning, and the
//! device watcher.

use thiserror::Error;

/// Unified error type for the agent
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    // =========================================================================
    // Startup Collaborator Errors
    // =========================================================================
    #[error("Metadata server error: {0}")]
    Metadata(String),

    #[error("Credential error: {0}")]
    Credentials(String),

    // =========================================================================
    // Compute API Errors
    // =========================================================================
    #[error("Compute API connection error: {0}")]
    ComputeConnection(#[from] reqwest::Error),

    #[error("Compute API error: HTTP {status}: {message}")]
    ComputeApi { status: u16, message: String },

    #[error("Cannot create GCE disk {name}: {reason}")]
    DiskCreation { name: String, reason: String },

    #[error("Cannot attach GCE disk {name} to {instance}: {reason}")]
    DiskAttachment {
        name: String,
        instance: String,
        reason: String,
    },

    // =========================================================================
    // Remote Operation Errors
    // =========================================================================
    #[error("Cannot check operation {operation}: {reason}")]
    OperationPoll { operation: String, reason: String },

    #[error("Error waiting for operation {operation}: {reason}")]
    OperationFailed { operation: String, reason: String },

    #[error("Operation {operation} did not complete within {seconds}s")]
    OperationTimeout { operation: String, seconds: u64 },

    // =========================================================================
    // Device Errors
    // =========================================================================
    #[error("Cannot watch {path} for new disks: {source}")]
    Watch {
        path: String,
        #[source]
        source: notify::Error,
    },

    #[error("Disk watch subscription error: {0}")]
    Subscription(#[from] notify::Error),

    #[error("Cannot create mountpoint {path}: {reason}")]
    Mountpoint { path: String, reason: String },

    #[error("Command failed: {command} - {reason}")]
    Command { command: String, reason: String },

    // =========================================================================
    // Parse Errors
    // =========================================================================
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    // =========================================================================
    // IO Errors
    // =========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Where an error sits in the agent's failure taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Credentials, metadata, or client construction failed; abort the process
    Startup,
    /// Disk creation or its operation poll failed; abort the run
    Provisioning,
    /// A single device or attach failed; abandon it and keep going
    Device,
    /// The filesystem event subscription reported an error; keep watching
    Subscription,
}

impl Error {
    /// Classify this error
    pub fn class(&self) -> ErrorClass {
        match self {
            Error::Internal(_)
            | Error::Configuration(_)
            | Error::Metadata(_)
            | Error::Credentials(_)
            | Error::Watch { .. }
            | Error::JsonParse(_) => ErrorClass::Startup,

            Error::ComputeConnection(_)
            | Error::ComputeApi { .. }
            | Error::DiskCreation { .. }
            | Error::OperationPoll { .. }
            | Error::OperationFailed { .. }
            | Error::OperationTimeout { .. } => ErrorClass::Provisioning,

            Error::DiskAttachment { .. }
            | Error::Mountpoint { .. }
            | Error::Command { .. }
            | Error::Io(_) => ErrorClass::Device,

            Error::Subscription(_) => ErrorClass::Subscription,
        }
    }

    /// Check if this error aborts the process
    pub fn is_fatal(&self) -> bool {
        matches!(self.class(), ErrorClass::Startup | ErrorClass::Provisioning)
    }
}

/// Result type alias for the agent
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classes() {
        let err = Error::OperationFailed {
            operation: "op-1".into(),
            reason: "QUOTA_EXCEEDED".into(),
        };
        assert_eq!(err.class(), ErrorClass::Provisioning);

        let err = Error::Metadata("no zone".into());
        assert_eq!(err.class(), ErrorClass::Startup);

        let err = Error::Command {
            command: "mkfs.ext4".into(),
            reason: "exit status 1".into(),
        };
        assert_eq!(err.class(), ErrorClass::Device);

        let err = Error::Subscription(notify::Error::generic("queue overflow"));
        assert_eq!(err.class(), ErrorClass::Subscription);
    }

    #[test]
    fn test_error_fatal() {
        let fatal = Error::OperationTimeout {
            operation: "op-1".into(),
            seconds: 30,
        };
        assert!(fatal.is_fatal());

        let device = Error::Mountpoint {
            path: "/mnt/sdb".into(),
            reason: "exists".into(),
        };
        assert!(!device.is_fatal());

        let attach = Error::DiskAttachment {
            name: "gvb-abcd-0".into(),
            instance: "node-1".into(),
            reason: "HTTP 400".into(),
        };
        assert!(!attach.is_fatal());
    }
}
