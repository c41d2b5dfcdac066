//! Manager error counters.
//!
//! Observability only: the transactional semantics of the manager do not
//! depend on these counters.

use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::registry::Registry;

const MANAGER_ERROR_METRIC: &str = "dynconf_manager_error";

/// Labels attached to every manager error counter.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ManagerErrorLabels {
    /// Manager identifier.
    pub id: String,
    /// Error kind.
    pub error: String,
}

/// Error counters for one manager instance, keyed by error kind.
#[derive(Debug, Clone)]
pub struct ManagerMetrics {
    id: String,
    errors: Family<ManagerErrorLabels, Counter>,
}

impl ManagerMetrics {
    /// Create the counter family for the manager with the given id.
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
            MANAGER_ERROR_METRIC,
            "Errors observed by the dynamic configuration manager",
            self.errors.clone(),
        );
    }

    fn inc(&self, kind: &str) {
        self.errors
            .get_or_create(&ManagerErrorLabels {
                id: self.id.clone(),
                error: kind.to_string(),
            })
            .inc();
    }

    /// Read a counter value; used by tests and exporters.
    #[must_use]
    pub fn error_count(&self, kind: &str) -> u64 {
        self.errors
            .get_or_create(&ManagerErrorLabels {
                id: self.id.clone(),
                error: kind.to_string(),
            })
            .get()
    }

    pub(crate) fn failed_to_restore(&self) {
        self.inc("failed_to_restore");
    }

    pub(crate) fn new_path_missing(&self) {
        self.inc("new_path_missing");
    }

    pub(crate) fn old_path_missing(&self) {
        self.inc("old_path_missing");
    }

    pub(crate) fn module_rejected_new(&self) {
        self.inc("module_rejected_new");
    }

    pub(crate) fn update_failed(&self) {
        self.inc("update_failed");
    }
}
