//! Prefix-accumulating access to a configuration backend.
//!
//! A [`ConfigGetter`] lets callers assemble paths compositionally
//! instead of spelling out path strings: each [`select`](ConfigGetter::select)
//! produces an independent handle with one more component appended, and
//! `register`/`get` forward to the backend with the accumulated prefix.

use crate::manager::{CallbackError, DynamicConfigManager, ManagerResult};
use crate::path::ConfigPath;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;

/// A backend the getter can forward to: something that can register
/// callbacks and read values at explicit paths.
pub trait Gettable {
    /// Register `callback` at `path`.
    ///
    /// # Errors
    ///
    /// Backend-defined; see [`DynamicConfigManager::register`].
    fn register_path<T, F>(&self, path: &ConfigPath, callback: F) -> ManagerResult<()>
    where
        T: DeserializeOwned + 'static,
        F: Fn(T) -> Result<(), CallbackError> + Send + Sync + 'static;

    /// Read the sub-value at `path` into `out`.
    ///
    /// # Errors
    ///
    /// Backend-defined; see [`DynamicConfigManager::get`].
    fn get_path<T>(&self, path: &ConfigPath, out: &mut T) -> ManagerResult<()>
    where
        T: DeserializeOwned;
}

impl<C> Gettable for DynamicConfigManager<C>
where
    C: Serialize + Default,
{
    fn register_path<T, F>(&self, path: &ConfigPath, callback: F) -> ManagerResult<()>
    where
        T: DeserializeOwned + 'static,
        F: Fn(T) -> Result<(), CallbackError> + Send + Sync + 'static,
    {
        self.register(path, callback)
    }

    fn get_path<T>(&self, path: &ConfigPath, out: &mut T) -> ManagerResult<()>
    where
        T: DeserializeOwned,
    {
        self.get(path, out)
    }
}

/// An immutable handle carrying a backend and a path prefix.
///
/// Handles have value semantics: `select` copies the prefix into a new
/// handle and never mutates the original, so sibling handles derived
/// from the same parent are independent.
pub struct ConfigGetter<G> {
    backend: Arc<G>,
    prefix: ConfigPath,
}

impl<G> Clone for ConfigGetter<G> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            prefix: self.prefix.clone(),
        }
    }
}

impl<G: Gettable> ConfigGetter<G> {
    /// A handle rooted at the whole configuration (empty prefix).
    #[must_use]
    pub fn new(backend: Arc<G>) -> Self {
        Self::with_prefix(backend, ConfigPath::root())
    }

    /// A handle rooted at an explicit prefix.
    #[must_use]
    pub fn with_prefix(backend: Arc<G>, prefix: ConfigPath) -> Self {
        Self { backend, prefix }
    }

    /// The accumulated prefix of this handle.
    #[must_use]
    pub fn path(&self) -> &ConfigPath {
        &self.prefix
    }

    /// A new handle addressing the named field under this one.
    #[must_use]
    pub fn select(&self, name: impl Into<String>) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            prefix: self.prefix.join(name),
        }
    }

    /// Register `callback` at the accumulated prefix.
    ///
    /// # Errors
    ///
    /// Whatever the backend's register reports.
    pub fn register<T, F>(&self, callback: F) -> ManagerResult<()>
    where
        T: DeserializeOwned + 'static,
        F: Fn(T) -> Result<(), CallbackError> + Send + Sync + 'static,
    {
        self.backend.register_path(&self.prefix, callback)
    }

    /// Read the sub-value at the accumulated prefix into `out`.
    ///
    /// # Errors
    ///
    /// Whatever the backend's get reports.
    pub fn get<T>(&self, out: &mut T) -> ManagerResult<()>
    where
        T: DeserializeOwned,
    {
        self.backend.get_path(&self.prefix, out)
    }
}
