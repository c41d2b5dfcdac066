//! Manager error types and result aliases.

use crate::path::ConfigPath;
use thiserror::Error;

/// Boxed error returned by subscriber callbacks to reject a configuration.
pub type CallbackError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type alias for manager operations.
pub type ManagerResult<T> = Result<T, ManagerError>;

/// Errors reported by the dynamic configuration manager.
///
/// All errors surface to the caller of the offending operation; the
/// manager never logs or swallows them. The one exception is rollback:
/// a restore invocation that itself fails is counted in the manager's
/// metrics and suppressed so that the original [`ManagerError::UpdateRejected`]
/// is what the caller sees.
#[derive(Debug, Error)]
pub enum ManagerError {
    /// The configuration type is not a record of named fields.
    #[error("wrong configuration type: the configuration must serialize to a mapping of named fields")]
    WrongConfigurationType,

    /// A path component contains the separator character.
    #[error("invalid path: component '{component}' contains the path separator")]
    InvalidPath {
        /// The offending component.
        component: String,
    },

    /// The path does not resolve against the current configuration.
    #[error("no matching field at path '{path}'")]
    NoMatchingField {
        /// The path that failed to resolve.
        path: ConfigPath,
    },

    /// The callback's argument type is not assignable from the sub-value
    /// declared at the registration path.
    #[error("bad callback for path '{path}': {reason}")]
    BadCallback {
        /// The registration path.
        path: ConfigPath,
        /// Why the callback was rejected.
        reason: String,
    },

    /// The out-parameter of a `get` is not assignable from the resolved
    /// sub-value.
    #[error("wrong output type for path '{path}': {reason}")]
    BadType {
        /// The queried path.
        path: ConfigPath,
        /// Why the output type was rejected.
        reason: String,
    },

    /// A subscriber rejected the new sub-value; the update was rolled
    /// back and the previous configuration retained.
    #[error("subscriber rejected new configuration at path '{path}'")]
    UpdateRejected {
        /// The path whose subscriber rejected the update.
        path: ConfigPath,
        /// The subscriber's error.
        #[source]
        source: CallbackError,
    },

    /// A registered path no longer resolves in the new configuration.
    /// The update fails before any callback is invoked.
    #[error("new configuration does not resolve at registered path '{path}'")]
    NewPathMissing {
        /// The registered path.
        path: ConfigPath,
    },

    /// A registered path does not resolve in the current configuration.
    #[error("current configuration does not resolve at registered path '{path}'")]
    OldPathMissing {
        /// The registered path.
        path: ConfigPath,
    },

    /// The configuration value failed to encode into its document tree.
    #[error("failed to encode configuration tree: {0}")]
    Encode(#[from] serde_json::Error),
}
