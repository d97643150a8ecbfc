//! Compute Module
//!
//! Everything that talks to the cloud side: the metadata server, the
//! compute REST API, operation polling, and disk provisioning.

pub mod client;
pub mod metadata;
pub mod operation;
pub mod provisioner;

pub use client::*;
pub use metadata::*;
pub use operation::*;
pub use provisioner::*;
