//! Microphone permission tracking
//!
//! Caches the last platform-reported permission, notifies subscribers of
//! actual changes only, and performs explicit access requests.

mod monitor;

pub use monitor::PermissionMonitor;
