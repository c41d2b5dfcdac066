//! The dynamic configuration manager.

use super::error::{CallbackError, ManagerError, ManagerResult};
use super::metrics::ManagerMetrics;
use super::subscription::Subscription;
use crate::path::{ConfigPath, PATH_SEPARATOR};
use crate::tree;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// State guarded by the manager lock: the current configuration, its
/// document-tree shadow, and the subscription table.
struct ManagerState<C> {
    current: C,
    tree: Value,
    subscriptions: HashMap<String, Vec<Subscription>>,
}

/// A typed, path-addressed publish/subscribe engine with transactional
/// update semantics.
///
/// The manager owns one instance of the configuration type `C` (starting
/// at `C::default()`), a table of subscriptions keyed by serialized path,
/// and replaces the current value atomically on each committed update.
/// An update is all-or-nothing: if any subscriber rejects its new
/// sub-value, every subscriber already notified during that update is
/// re-invoked with its previous sub-value and the update is reported as
/// failed.
///
/// # Locking
///
/// A single exclusive lock serializes [`on_update`](Self::on_update),
/// [`register`](Self::register) and [`get`](Self::get). Subscriber
/// callbacks run **while the lock is held**; a callback that calls back
/// into the manager deadlocks. This is a documented contract: holding
/// the lock through delivery is what makes the rollback guarantee
/// expressible.
pub struct DynamicConfigManager<C> {
    id: String,
    state: Mutex<ManagerState<C>>,
    metrics: ManagerMetrics,
}

impl<C> DynamicConfigManager<C>
where
    C: Serialize + Default,
{
    /// Create a manager whose current value is `C::default()`.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::WrongConfigurationType`] if `C` is not a
    /// record of named fields (it must serialize to a mapping), and
    /// [`ManagerError::Encode`] if the default value fails to serialize
    /// at all.
    pub fn new(id: impl Into<String>) -> ManagerResult<Self> {
        let id = id.into();
        let current = C::default();
        let tree = serde_json::to_value(&current)?;
        if !tree.is_object() {
            return Err(ManagerError::WrongConfigurationType);
        }

        Ok(Self {
            metrics: ManagerMetrics::new(&id),
            id,
            state: Mutex::new(ManagerState {
                current,
                tree,
                subscriptions: HashMap::new(),
            }),
        })
    }

    /// The identifier this manager was created with.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The manager's error counters.
    #[must_use]
    pub fn metrics(&self) -> &ManagerMetrics {
        &self.metrics
    }

    /// Deliver a new configuration value.
    ///
    /// Old and new sub-values are resolved for every registered path
    /// before the first callback runs, so a registered path that no
    /// longer resolves fails the update with no delivery and nothing to
    /// roll back. Sub-values that are deep-equal to their previous
    /// value do not trigger their callbacks. Within one path, callbacks
    /// fire in registration order; across paths, the order is
    /// unspecified but one path's callbacks fire contiguously.
    ///
    /// If a callback rejects, all callbacks already notified during this
    /// update are re-invoked with their previous sub-value, in reverse
    /// notification order; the stored configuration is left unchanged
    /// and the subscriber's error is returned wrapped in
    /// [`ManagerError::UpdateRejected`]. A restore invocation that
    /// itself fails is counted and suppressed.
    ///
    /// # Errors
    ///
    /// [`ManagerError::NewPathMissing`], [`ManagerError::OldPathMissing`],
    /// [`ManagerError::UpdateRejected`], or [`ManagerError::Encode`].
    pub fn on_update(&self, new_configuration: C) -> ManagerResult<()> {
        let new_tree = match serde_json::to_value(&new_configuration) {
            Ok(tree) => tree,
            Err(err) => {
                self.metrics.update_failed();
                return Err(err.into());
            }
        };

        let mut guard = self.lock();
        let state = &mut *guard;

        // Resolution pre-pass: a structural mismatch anywhere must fail
        // the update before any subscriber observes the new value.
        let mut changed: Vec<(ConfigPath, &Vec<Subscription>, &Value, &Value)> = Vec::new();
        for (path_string, subscriptions) in &state.subscriptions {
            let path = ConfigPath::from(path_string.as_str());

            let Some(new_sub) = tree::resolve(&new_tree, &path) else {
                self.metrics.new_path_missing();
                self.metrics.update_failed();
                return Err(ManagerError::NewPathMissing { path });
            };
            let Some(old_sub) = tree::resolve(&state.tree, &path) else {
                self.metrics.old_path_missing();
                self.metrics.update_failed();
                return Err(ManagerError::OldPathMissing { path });
            };

            // Only deliver when the relevant sub-value actually changed.
            if old_sub == new_sub {
                continue;
            }

            changed.push((path, subscriptions, new_sub, old_sub));
        }

        let mut notified: Vec<(&Subscription, &Value)> = Vec::new();
        for (path, subscriptions, new_sub, old_sub) in changed {
            for subscription in subscriptions {
                match subscription.invoke(new_sub) {
                    Ok(()) => notified.push((subscription, old_sub)),
                    Err(err) => {
                        self.metrics.module_rejected_new();
                        for (restored, previous) in notified.iter().rev() {
                            if restored.invoke(previous).is_err() {
                                self.metrics.failed_to_restore();
                            }
                        }
                        self.metrics.update_failed();
                        return Err(ManagerError::UpdateRejected {
                            path,
                            source: err.into_callback_error(),
                        });
                    }
                }
            }
        }

        state.tree = new_tree;
        state.current = new_configuration;

        Ok(())
    }

    /// Register `callback` to be invoked whenever the sub-value at
    /// `path` changes.
    ///
    /// The path is validated (no component may contain the separator)
    /// and resolved against the current value, which may still be the
    /// default. The callback's argument type must be assignable from
    /// the sub-value at that path; a mismatch is reported as
    /// [`ManagerError::BadCallback`] and nothing is registered.
    ///
    /// On success the subscription is appended to the path's list and
    /// the callback is immediately invoked once, synchronously and under
    /// the manager lock, with the current sub-value; that initial
    /// outcome is this function's return value. A rejecting initial
    /// invocation leaves the subscription registered: the subscriber has
    /// observed the value exactly once and will be driven on subsequent
    /// updates.
    ///
    /// # Errors
    ///
    /// [`ManagerError::InvalidPath`], [`ManagerError::NoMatchingField`],
    /// [`ManagerError::BadCallback`], or [`ManagerError::UpdateRejected`]
    /// when the initial invocation rejects the current value.
    pub fn register<T, F>(&self, path: &ConfigPath, callback: F) -> ManagerResult<()>
    where
        T: DeserializeOwned + 'static,
        F: Fn(T) -> Result<(), CallbackError> + Send + Sync + 'static,
    {
        validate_path(path)?;

        let mut guard = self.lock();
        let state = &mut *guard;

        let sub_value = tree::resolve(&state.tree, path)
            .ok_or_else(|| ManagerError::NoMatchingField { path: path.clone() })?
            .clone();

        // Assignability probe: the declared argument type must accept the
        // sub-value as it exists right now.
        if let Err(err) = serde_json::from_value::<T>(sub_value.clone()) {
            return Err(ManagerError::BadCallback {
                path: path.clone(),
                reason: err.to_string(),
            });
        }

        let subscriptions = state.subscriptions.entry(path.to_string()).or_default();
        subscriptions.push(Subscription::new(callback));

        // The subscription is recorded before the initial delivery; a
        // rejecting initial invocation leaves it in place.
        if let Some(subscription) = subscriptions.last() {
            if let Err(err) = subscription.invoke(&sub_value) {
                return Err(ManagerError::UpdateRejected {
                    path: path.clone(),
                    source: err.into_callback_error(),
                });
            }
        }

        Ok(())
    }

    /// Resolve the sub-value at `path` and write it into `out`.
    ///
    /// # Errors
    ///
    /// [`ManagerError::InvalidPath`], [`ManagerError::NoMatchingField`],
    /// or [`ManagerError::BadType`] when `out`'s type is not assignable
    /// from the resolved sub-value.
    pub fn get<T>(&self, path: &ConfigPath, out: &mut T) -> ManagerResult<()>
    where
        T: DeserializeOwned,
    {
        validate_path(path)?;

        let guard = self.lock();
        let sub_value = tree::resolve(&guard.tree, path)
            .ok_or_else(|| ManagerError::NoMatchingField { path: path.clone() })?;

        *out = serde_json::from_value(sub_value.clone()).map_err(|err| ManagerError::BadType {
            path: path.clone(),
            reason: err.to_string(),
        })?;

        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, ManagerState<C>> {
        // A callback that panicked must not wedge every later operation.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<C> DynamicConfigManager<C>
where
    C: Serialize + Default + Clone,
{
    /// The complete current configuration.
    #[must_use]
    pub fn configuration(&self) -> C {
        self.lock().current.clone()
    }
}

fn validate_path(path: &ConfigPath) -> ManagerResult<()> {
    for component in path.components() {
        if component.contains(PATH_SEPARATOR) {
            return Err(ManagerError::InvalidPath {
                component: component.clone(),
            });
        }
    }
    Ok(())
}
