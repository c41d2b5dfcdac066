//! # dynconf
//!
//! Dynamic configuration delivery for running processes: a typed,
//! hierarchical configuration value is the single source of truth,
//! subscribers register interest in sub-paths of it, and whenever a new
//! value arrives every subscriber whose sub-value actually changed is
//! notified, atomically, with automatic rollback if any subscriber
//! rejects the update.
//!
//! ## Components
//!
//! - [`manager::DynamicConfigManager`]: the path-addressed
//!   publish/subscribe engine with transactional update semantics.
//! - [`getter::ConfigGetter`]: an immutable, prefix-accumulating
//!   handle for registering and reading sub-paths compositionally.
//! - [`listener::FileListener`]: watches a file on disk, merges it
//!   over a base document and delivers the decoded result.
//! - [`listener::NetworkListener`]: periodically fetches a remote
//!   configuration document, with jitter, interval and manual trigger.
//!
//! ## Example
//!
//! ```ignore
//! use dynconf::getter::ConfigGetter;
//! use dynconf::manager::DynamicConfigManager;
//! use std::sync::Arc;
//!
//! let manager = Arc::new(DynamicConfigManager::<AppConfig>::new("app")?);
//! ConfigGetter::new(Arc::clone(&manager))
//!     .select("server")
//!     .register(|server: ServerConfig| {
//!         apply(server);
//!         Ok(())
//!     })?;
//! manager.on_update(next_configuration)?;
//! ```
//!
//! Subscriber callbacks run while the manager lock is held; a callback
//! must not call back into the manager.

pub mod getter;
pub mod listener;
pub mod manager;
pub mod path;
mod tree;
