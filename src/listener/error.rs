//! Listener error types.

use super::format::DocumentFormat;
use crate::manager::CallbackError;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for listener operations.
pub type ListenerResult<T> = Result<T, ListenerError>;

/// Errors reported by the file and network listeners.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// Listener options failed validation.
    #[error("invalid listener options: {0}")]
    InvalidOptions(String),

    /// Failed to read a configuration file.
    #[error("failed to read configuration file '{path}': {source}")]
    Read {
        /// Path that could not be read.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to write a configuration file.
    #[error("failed to write configuration file '{path}': {source}")]
    Write {
        /// Path that could not be written.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// A configuration document failed to decode.
    #[error("failed to decode {format} document: {message}")]
    Decode {
        /// The expected document format.
        format: DocumentFormat,
        /// Decoder error message.
        message: String,
    },

    /// The merged document tree does not deserialize into the
    /// configuration type.
    #[error("merged configuration does not deserialize: {0}")]
    Deserialize(#[from] serde_json::Error),

    /// A configuration fetch failed before producing a response.
    #[error("failed to fetch configuration from '{url}': {message}")]
    Fetch {
        /// The request URL.
        url: String,
        /// Client error message.
        message: String,
    },

    /// The remote configuration service answered with a non-success
    /// status.
    #[error("configuration fetch returned status {status}")]
    Status {
        /// The HTTP status code.
        status: u16,
    },

    /// The consumer refused the new configuration.
    #[error("configuration update rejected")]
    UpdateRejected(#[source] CallbackError),
}
