//! Device Module
//!
//! Local side of the agent: watching the device directory and turning new
//! block devices into mounted ext4 filesystems.

pub mod mounter;
pub mod seen;
pub mod watcher;

pub use mounter::*;
pub use seen::*;
pub use watcher::*;
