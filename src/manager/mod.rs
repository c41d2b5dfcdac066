//! # Dynamic Configuration Manager
//!
//! A typed, path-addressed publish/subscribe engine for configuration
//! values. Subscribers register interest in sub-paths of a configuration
//! record; whenever a new value arrives, every subscriber whose
//! sub-value actually changed is notified, atomically, with automatic
//! rollback if any subscriber rejects the update.

mod error;
#[allow(clippy::module_inception)]
mod manager;
mod metrics;
mod subscription;

pub use error::{CallbackError, ManagerError, ManagerResult};
pub use manager::DynamicConfigManager;
pub use metrics::{ManagerErrorLabels, ManagerMetrics};
