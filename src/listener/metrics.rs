//! Listener error counters and request timings.

use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::histogram::{exponential_buckets, Histogram};
use prometheus_client::registry::Registry;
use std::time::Duration;

const FILE_LISTENER_ERROR_METRIC: &str = "dynconf_listener_file_error";
const NETWORK_LISTENER_ERROR_METRIC: &str = "dynconf_listener_network_error";
const NETWORK_REQUEST_DURATION_METRIC: &str = "dynconf_listener_network_request_duration_seconds";

/// Labels attached to every listener error counter.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ListenerErrorLabels {
    /// Listener identifier.
    pub id: String,
    /// Error kind.
    pub error: String,
}

/// Error counters for one file listener.
#[derive(Debug, Clone)]
pub struct FileListenerMetrics {
    id: String,
    errors: Family<ListenerErrorLabels, Counter>,
}

impl FileListenerMetrics {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            errors: Family::default(),
        }
    }

    /// Register the counters into a Prometheus registry.
    pub fn register_into(&self, registry: &mut Registry) {
        registry.register(
            FILE_LISTENER_ERROR_METRIC,
            "Errors observed by the configuration file listener",
            self.errors.clone(),
        );
    }

    fn inc(&self, kind: &str) {
        self.errors
            .get_or_create(&ListenerErrorLabels {
                id: self.id.clone(),
                error: kind.to_string(),
            })
            .inc();
    }

    /// Read a counter value; used by tests and exporters.
    #[must_use]
    pub fn error_count(&self, kind: &str) -> u64 {
        self.errors
            .get_or_create(&ListenerErrorLabels {
                id: self.id.clone(),
                error: kind.to_string(),
            })
            .get()
    }

    pub(crate) fn failed_to_update(&self) {
        self.inc("failed_to_update_configuration");
    }
}

/// Error counters and request timings for one network listener.
#[derive(Debug, Clone)]
pub struct NetworkListenerMetrics {
    id: String,
    errors: Family<ListenerErrorLabels, Counter>,
    request_duration: Histogram,
}

impl NetworkListenerMetrics {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            errors: Family::default(),
            request_duration: Histogram::new(exponential_buckets(0.005, 2.0, 12)),
        }
    }

    /// Register the counters and the request histogram into a
    /// Prometheus registry.
    pub fn register_into(&self, registry: &mut Registry) {
        registry.register(
            NETWORK_LISTENER_ERROR_METRIC,
            "Errors observed by the configuration network listener",
            self.errors.clone(),
        );
        registry.register(
            NETWORK_REQUEST_DURATION_METRIC,
            "Duration of configuration fetch requests",
            self.request_duration.clone(),
        );
    }

    fn inc(&self, kind: &str) {
        self.errors
            .get_or_create(&ListenerErrorLabels {
                id: self.id.clone(),
                error: kind.to_string(),
            })
            .inc();
    }

    /// Read a counter value; used by tests and exporters.
    #[must_use]
    pub fn error_count(&self, kind: &str) -> u64 {
        self.errors
            .get_or_create(&ListenerErrorLabels {
                id: self.id.clone(),
                error: kind.to_string(),
            })
            .get()
    }

    pub(crate) fn observe_request_duration(&self, elapsed: Duration) {
        self.request_duration.observe(elapsed.as_secs_f64());
    }

    pub(crate) fn error_fetching(&self) {
        self.inc("error_fetching_configuration");
    }

    pub(crate) fn error_writing(&self) {
        self.inc("error_writing_configuration_to_file");
    }

    pub(crate) fn error_updating(&self) {
        self.inc("error_updating_configuration");
    }
}
