//! # Configuration Listeners
//!
//! Producers of configuration updates. A listener materialises a full
//! configuration value from some source (a watched file merged over a
//! base document, or a remote configuration service) and delivers it
//! to a [`Configurable`] consumer such as the
//! [`DynamicConfigManager`](crate::manager::DynamicConfigManager).

mod configurable;
mod error;
mod file;
mod format;
mod metrics;
mod network;

pub use configurable::{Configurable, ConfigurableFn};
pub use error::{ListenerError, ListenerResult};
pub use file::{BaseConfiguration, EnvOverlayOptions, FileListener, FileListenerOptions};
pub use format::DocumentFormat;
pub use metrics::{FileListenerMetrics, ListenerErrorLabels, NetworkListenerMetrics};
pub use network::{
    IntervalOptions, NetworkListener, NetworkListenerOptions, NetworkOutput, RequestOptions,
};
