//! Backup Vault Library
//!
//! Scheduled point-in-time archives of mutable directory trees ("backup
//! units") with per-unit retention limits on age, aggregate size, and count.

pub mod archive;
pub mod config;
pub mod error;
pub mod logging;
pub mod orchestrator;
pub mod retention;
pub mod scheduler;
pub mod store;
pub mod unit;

// Re-export commonly used types
pub use config::Config;
pub use error::{Result, VaultError};
