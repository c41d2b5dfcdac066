//! Registered subscriber records.

use crate::manager::error::CallbackError;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Why a subscription invocation failed.
#[derive(Debug)]
pub(crate) enum InvokeError {
    /// The sub-value no longer decodes into the declared argument type.
    Decode(serde_json::Error),
    /// The subscriber refused the configuration.
    Rejected(CallbackError),
}

impl InvokeError {
    /// Collapse into the error handed back to callers of the manager.
    pub(crate) fn into_callback_error(self) -> CallbackError {
        match self {
            Self::Decode(err) => Box::new(err),
            Self::Rejected(err) => err,
        }
    }
}

/// A registered callback together with the argument type it declared.
///
/// The callback is type-erased behind a closure that decodes the
/// sub-tree into the declared type before delivery. Subscriptions are
/// never mutated once created; the manager only appends and scans them.
pub(crate) struct Subscription {
    type_name: &'static str,
    invoke: Box<dyn Fn(&Value) -> Result<(), InvokeError> + Send + Sync>,
}

impl Subscription {
    pub(crate) fn new<T, F>(callback: F) -> Self
    where
        T: DeserializeOwned + 'static,
        F: Fn(T) -> Result<(), CallbackError> + Send + Sync + 'static,
    {
        Self {
            type_name: std::any::type_name::<T>(),
            invoke: Box::new(move |value| {
                let typed: T =
                    serde_json::from_value(value.clone()).map_err(InvokeError::Decode)?;
                callback(typed).map_err(InvokeError::Rejected)
            }),
        }
    }

    /// Decode `value` into the declared type and deliver it.
    pub(crate) fn invoke(&self, value: &Value) -> Result<(), InvokeError> {
        (self.invoke)(value)
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("type_name", &self.type_name)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Leaf {
        value: String,
    }

    #[test]
    fn test_invoke_delivers_decoded_value() {
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = Arc::clone(&seen);
        let subscription = Subscription::new(move |leaf: Leaf| {
            assert_eq!(leaf.value, "x");
            seen_clone.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        subscription.invoke(&json!({"value": "x"})).unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_invoke_reports_decode_mismatch() {
        let subscription = Subscription::new(|_leaf: Leaf| Ok(()));
        let result = subscription.invoke(&json!({"value": true}));
        assert!(matches!(result, Err(InvokeError::Decode(_))));
    }

    #[test]
    fn test_invoke_propagates_rejection() {
        let subscription =
            Subscription::new(|_leaf: Leaf| Err("configuration refused".into()));
        let result = subscription.invoke(&json!({"value": "x"}));
        assert!(matches!(result, Err(InvokeError::Rejected(_))));
    }
}
