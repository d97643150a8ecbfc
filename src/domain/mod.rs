//! Domain layer - value types and port definitions
//!
//! The compute API, metadata service, and command execution are reached
//! only through the traits defined here, so provisioning and mounting can
//! run against in-memory fakes.

pub mod ports;

pub use ports::*;
