//! The consumer interface listeners deliver configurations to.

use crate::manager::{CallbackError, DynamicConfigManager};
use serde::Serialize;

/// Something that accepts fully decoded configuration values.
///
/// Listeners hand every freshly produced configuration to a
/// `Configurable` and treat an error as "the consumer refused this
/// configuration". The dynamic configuration manager implements this
/// directly; bare closures can be wrapped with [`ConfigurableFn`].
pub trait Configurable<C>: Send + Sync {
    /// Deliver a new configuration value.
    ///
    /// The call may block for the duration of all subscriber callbacks;
    /// listeners must tolerate that.
    ///
    /// # Errors
    ///
    /// Implementation-defined rejection of the new configuration.
    fn on_update(&self, new_configuration: C) -> Result<(), CallbackError>;
}

impl<C> Configurable<C> for DynamicConfigManager<C>
where
    C: Serialize + Default + Send,
{
    fn on_update(&self, new_configuration: C) -> Result<(), CallbackError> {
        DynamicConfigManager::on_update(self, new_configuration).map_err(Into::into)
    }
}

/// Adapter turning a bare callback into a [`Configurable`].
pub struct ConfigurableFn<F> {
    callback: F,
}

impl<F> ConfigurableFn<F> {
    /// Wrap `callback`.
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<C, F> Configurable<C> for ConfigurableFn<F>
where
    F: Fn(C) -> Result<(), CallbackError> + Send + Sync,
{
    fn on_update(&self, new_configuration: C) -> Result<(), CallbackError> {
        (self.callback)(new_configuration)
    }
}
