//! Configuration file listener with merge-over-base semantics.
//!
//! Watches a configuration file, merges it over a base (default)
//! document, overlays environment variables, decodes the merged tree
//! into the configuration type and delivers it to a [`Configurable`].
//! Reloads are driven by polling the file's modification time.

use super::configurable::Configurable;
use super::error::{ListenerError, ListenerResult};
use super::format::DocumentFormat;
use super::metrics::FileListenerMetrics;
use crate::path::ConfigPath;
use crate::tree;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime};
use tokio::sync::mpsc;
use tracing::warn;

/// Where the base (default) configuration document comes from.
#[derive(Debug, Clone)]
pub enum BaseConfiguration {
    /// An inline document string.
    Inline(String),
    /// A document file on disk, re-read on every reload.
    File(PathBuf),
}

impl Default for BaseConfiguration {
    fn default() -> Self {
        Self::Inline(String::new())
    }
}

/// Environment-variable overlay applied after the merge.
///
/// When `automatic` is set, every variable starting with
/// `<PREFIX>_` is mapped to a path (key lowercased, `key_separator`
/// replaced by the path separator) and inserted over the merged tree.
/// Values that parse as JSON scalars keep their type; everything else
/// is inserted as a string.
#[derive(Debug, Clone)]
pub struct EnvOverlayOptions {
    /// Environment-variable prefix, matched uppercased.
    pub prefix: String,
    /// Whether the overlay is applied at all.
    pub automatic: bool,
    /// Substring of the variable name that maps to the path separator.
    pub key_separator: String,
}

impl Default for EnvOverlayOptions {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            automatic: false,
            key_separator: "_".to_string(),
        }
    }
}

/// Options for the file listener.
pub struct FileListenerOptions {
    /// Document format of the base and the watched file.
    pub format: DocumentFormat,
    /// Base configuration merged under the watched file.
    pub base: BaseConfiguration,
    /// Environment overlay options.
    pub env: EnvOverlayOptions,
    /// Polling interval for file changes.
    pub poll_interval: Duration,
    /// Invoked after every successful watch-driven update.
    pub on_update_success: Option<Box<dyn Fn() + Send + Sync>>,
    /// Invoked after every failed watch-driven update.
    pub on_update_failure: Option<Box<dyn Fn(&ListenerError) + Send + Sync>>,
}

impl Default for FileListenerOptions {
    fn default() -> Self {
        Self {
            format: DocumentFormat::default(),
            base: BaseConfiguration::default(),
            env: EnvOverlayOptions::default(),
            poll_interval: Duration::from_secs(5),
            on_update_success: None,
            on_update_failure: None,
        }
    }
}

impl FileListenerOptions {
    /// Create options with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the document format.
    #[must_use]
    pub fn with_format(mut self, format: DocumentFormat) -> Self {
        self.format = format;
        self
    }

    /// Set the base configuration.
    #[must_use]
    pub fn with_base(mut self, base: BaseConfiguration) -> Self {
        self.base = base;
        self
    }

    /// Set the environment overlay options.
    #[must_use]
    pub fn with_env(mut self, env: EnvOverlayOptions) -> Self {
        self.env = env;
        self
    }

    /// Set the polling interval.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the success callback.
    #[must_use]
    pub fn with_on_update_success(mut self, callback: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_update_success = Some(Box::new(callback));
        self
    }

    /// Set the failure callback.
    #[must_use]
    pub fn with_on_update_failure(
        mut self,
        callback: impl Fn(&ListenerError) + Send + Sync + 'static,
    ) -> Self {
        self.on_update_failure = Some(Box::new(callback));
        self
    }
}

struct FileListenerInner<C> {
    path: PathBuf,
    format: DocumentFormat,
    base: BaseConfiguration,
    env: EnvOverlayOptions,
    target: Arc<dyn Configurable<C>>,
    current: Mutex<C>,
    last_modified: Mutex<Option<SystemTime>>,
    metrics: FileListenerMetrics,
    on_update_success: Option<Box<dyn Fn() + Send + Sync>>,
    on_update_failure: Option<Box<dyn Fn(&ListenerError) + Send + Sync>>,
}

impl<C> FileListenerInner<C>
where
    C: DeserializeOwned + Clone + Default + Send + Sync + 'static,
{
    /// Merge base, file and environment, decode and deliver. Serialized
    /// by the `current` lock so a forced reload cannot interleave with a
    /// watch-driven one.
    fn update(&self) -> ListenerResult<()> {
        let mut current = lock(&self.current);

        let mut merged_tree = self.base_tree()?;
        let raw = std::fs::read_to_string(&self.path).map_err(|err| ListenerError::Read {
            path: self.path.clone(),
            source: err,
        })?;
        tree::merge(&mut merged_tree, self.format.decode_tree(&raw)?);
        apply_env_overlay(&mut merged_tree, &self.env);

        let merged: C = serde_json::from_value(merged_tree)?;
        self.target
            .on_update(merged.clone())
            .map_err(ListenerError::UpdateRejected)?;

        *current = merged;
        Ok(())
    }

    fn update_and_notify(&self) {
        match self.update() {
            Ok(()) => {
                if let Some(callback) = &self.on_update_success {
                    callback();
                }
            }
            Err(err) => {
                self.metrics.failed_to_update();
                warn!(
                    error = %err,
                    path = %self.path.display(),
                    "failed to reload configuration file"
                );
                if let Some(callback) = &self.on_update_failure {
                    callback(&err);
                }
            }
        }
    }

    fn base_tree(&self) -> ListenerResult<Value> {
        match &self.base {
            BaseConfiguration::Inline(raw) => self.format.decode_tree(raw),
            BaseConfiguration::File(path) => {
                let raw = std::fs::read_to_string(path).map_err(|err| ListenerError::Read {
                    path: path.clone(),
                    source: err,
                })?;
                self.format.decode_tree(&raw)
            }
        }
    }
}

/// Watches a configuration file and delivers merged updates to a
/// [`Configurable`].
///
/// Construction performs the initial load and delivery; a failing
/// initial update fails construction. [`start`](Self::start) then spawns
/// a polling task that reloads whenever the file's modification time
/// advances.
pub struct FileListener<C> {
    inner: Arc<FileListenerInner<C>>,
    poll_interval: Duration,
    shutdown_tx: Option<mpsc::Sender<()>>,
}

impl<C> FileListener<C>
where
    C: DeserializeOwned + Clone + Default + Send + Sync + 'static,
{
    /// Create the listener and perform the initial load.
    ///
    /// If the watched file does not exist it is created empty, so a
    /// fresh deployment starts from the base configuration alone.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created or read, a
    /// document fails to decode, the merged tree does not deserialize
    /// into `C`, or the target rejects the initial configuration.
    pub fn new<P: AsRef<Path>>(
        id: impl Into<String>,
        path: P,
        target: Arc<dyn Configurable<C>>,
        options: FileListenerOptions,
    ) -> ListenerResult<Self> {
        let path = path.as_ref().to_path_buf();
        ensure_file_exists(&path)?;

        let inner = Arc::new(FileListenerInner {
            format: options.format,
            base: options.base,
            env: options.env,
            target,
            current: Mutex::new(C::default()),
            last_modified: Mutex::new(modified_time(&path)),
            metrics: FileListenerMetrics::new(id),
            on_update_success: options.on_update_success,
            on_update_failure: options.on_update_failure,
            path,
        });

        inner.update()?;

        Ok(Self {
            inner,
            poll_interval: options.poll_interval,
            shutdown_tx: None,
        })
    }

    /// The most recently delivered configuration.
    pub fn configuration(&self) -> C {
        lock(&self.inner.current).clone()
    }

    /// The listener's error counters.
    #[must_use]
    pub fn metrics(&self) -> &FileListenerMetrics {
        &self.inner.metrics
    }

    /// Force a reload outside the polling schedule.
    ///
    /// # Errors
    ///
    /// Same failure modes as construction.
    pub fn reload(&self) -> ListenerResult<()> {
        if let Some(mtime) = modified_time(&self.inner.path) {
            *lock(&self.inner.last_modified) = Some(mtime);
        }
        self.inner.update()
    }

    /// Start watching the file for changes.
    ///
    /// Must be called from within a tokio runtime. Calling `start` twice
    /// replaces the previous watch task.
    pub fn start(&mut self) {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        self.shutdown_tx = Some(shutdown_tx);

        let inner = Arc::clone(&self.inner);
        let poll_interval = self.poll_interval;

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(poll_interval);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let Some(mtime) = modified_time(&inner.path) else {
                            continue;
                        };
                        let changed = {
                            let mut last = lock(&inner.last_modified);
                            let changed = last.map_or(true, |old| mtime > old);
                            if changed {
                                *last = Some(mtime);
                            }
                            changed
                        };
                        if changed {
                            inner.update_and_notify();
                        }
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }
        });
    }

    /// Stop watching for changes.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(()).await;
        }
    }
}

fn ensure_file_exists(path: &Path) -> ListenerResult<()> {
    match std::fs::metadata(path) {
        Ok(_) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            std::fs::write(path, "").map_err(|err| ListenerError::Write {
                path: path.to_path_buf(),
                source: err,
            })
        }
        Err(err) => Err(ListenerError::Read {
            path: path.to_path_buf(),
            source: err,
        }),
    }
}

fn modified_time(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).ok().and_then(|m| m.modified().ok())
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn apply_env_overlay(tree: &mut Value, options: &EnvOverlayOptions) {
    if !options.automatic {
        return;
    }

    let prefix = if options.prefix.is_empty() {
        String::new()
    } else {
        format!("{}_", options.prefix.to_uppercase())
    };

    for (key, value) in std::env::vars() {
        let Some(stripped) = key.strip_prefix(&prefix) else {
            continue;
        };
        if stripped.is_empty() {
            continue;
        }

        let mut path_string = stripped.to_lowercase();
        if !options.key_separator.is_empty() {
            path_string = path_string.replace(&options.key_separator, ".");
        }

        let leaf = serde_json::from_str(&value).unwrap_or(Value::String(value.clone()));
        tree::insert(tree, &ConfigPath::from(path_string.as_str()), leaf);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listener::configurable::ConfigurableFn;
    use crate::manager::CallbackError;
    use serde::{Deserialize, Serialize};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    #[serde(default)]
    struct TestConfig {
        name: String,
        enabled: bool,
        retries: u32,
    }

    fn capturing_target() -> (Arc<dyn Configurable<TestConfig>>, Arc<Mutex<Vec<TestConfig>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        let target = Arc::new(ConfigurableFn::new(
            move |cfg: TestConfig| -> Result<(), CallbackError> {
                seen_clone.lock().unwrap().push(cfg);
                Ok(())
            },
        ));
        (target, seen)
    }

    #[test]
    fn test_missing_file_is_created_and_base_applies() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("dynamic.toml");
        let (target, seen) = capturing_target();

        let listener = FileListener::new(
            "test",
            &config_path,
            target,
            FileListenerOptions::new()
                .with_base(BaseConfiguration::Inline("name = \"base\"".to_string())),
        )
        .unwrap();

        assert!(config_path.exists());
        assert_eq!(listener.configuration().name, "base");
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_file_overrides_base() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("dynamic.toml");
        std::fs::write(&config_path, "enabled = true\n").unwrap();
        let (target, _seen) = capturing_target();

        let listener = FileListener::new(
            "test",
            &config_path,
            target,
            FileListenerOptions::new().with_base(BaseConfiguration::Inline(
                "name = \"base\"\nenabled = false\nretries = 3".to_string(),
            )),
        )
        .unwrap();

        let configuration = listener.configuration();
        assert_eq!(configuration.name, "base");
        assert!(configuration.enabled);
        assert_eq!(configuration.retries, 3);
    }

    #[test]
    fn test_base_from_file() {
        let dir = tempdir().unwrap();
        let base_path = dir.path().join("base.toml");
        std::fs::write(&base_path, "name = \"from-file\"").unwrap();
        let config_path = dir.path().join("dynamic.toml");
        let (target, _seen) = capturing_target();

        let listener = FileListener::new(
            "test",
            &config_path,
            target,
            FileListenerOptions::new().with_base(BaseConfiguration::File(base_path)),
        )
        .unwrap();

        assert_eq!(listener.configuration().name, "from-file");
    }

    #[test]
    fn test_reload_picks_up_changes() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("dynamic.toml");
        std::fs::write(&config_path, "retries = 1\n").unwrap();
        let (target, seen) = capturing_target();

        let listener =
            FileListener::new("test", &config_path, target, FileListenerOptions::new()).unwrap();
        assert_eq!(listener.configuration().retries, 1);

        std::fs::write(&config_path, "retries = 9\n").unwrap();
        listener.reload().unwrap();

        assert_eq!(listener.configuration().retries, 9);
        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_env_overlay_wins_over_file() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("dynamic.toml");
        std::fs::write(&config_path, "retries = 1\nname = \"file\"").unwrap();
        std::env::set_var("DYNCONF_FILE_TEST_RETRIES", "7");
        let (target, _seen) = capturing_target();

        let listener = FileListener::new(
            "test",
            &config_path,
            target,
            FileListenerOptions::new().with_env(EnvOverlayOptions {
                prefix: "dynconf_file_test".to_string(),
                automatic: true,
                key_separator: "__".to_string(),
            }),
        )
        .unwrap();

        let configuration = listener.configuration();
        assert_eq!(configuration.retries, 7);
        assert_eq!(configuration.name, "file");

        std::env::remove_var("DYNCONF_FILE_TEST_RETRIES");
    }

    #[test]
    fn test_malformed_document_fails_construction() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("dynamic.toml");
        std::fs::write(&config_path, "not toml at all [").unwrap();
        let (target, _seen) = capturing_target();

        let result = FileListener::new("test", &config_path, target, FileListenerOptions::new());
        assert!(matches!(result, Err(ListenerError::Decode { .. })));
    }

    #[test]
    fn test_rejecting_target_fails_reload() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("dynamic.toml");
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);
        let target: Arc<dyn Configurable<TestConfig>> = Arc::new(ConfigurableFn::new(
            move |_cfg: TestConfig| -> Result<(), CallbackError> {
                if calls_clone.fetch_add(1, Ordering::SeqCst) == 0 {
                    Ok(())
                } else {
                    Err("refused".into())
                }
            },
        ));

        let listener =
            FileListener::new("test", &config_path, target, FileListenerOptions::new()).unwrap();

        std::fs::write(&config_path, "retries = 2\n").unwrap();
        let result = listener.reload();
        assert!(matches!(result, Err(ListenerError::UpdateRejected(_))));

        // The last accepted configuration is retained.
        assert_eq!(listener.configuration().retries, 0);
    }

    #[tokio::test]
    async fn test_watch_driven_reload() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("dynamic.toml");
        std::fs::write(&config_path, "retries = 1\n").unwrap();
        let (target, _seen) = capturing_target();

        let (updated_tx, mut updated_rx) = mpsc::channel::<()>(1);
        let mut listener = FileListener::new(
            "test",
            &config_path,
            target,
            FileListenerOptions::new()
                .with_poll_interval(Duration::from_millis(20))
                .with_on_update_success(move || {
                    let _ = updated_tx.try_send(());
                }),
        )
        .unwrap();
        listener.start();

        std::fs::write(&config_path, "retries = 5\n").unwrap();

        tokio::time::timeout(Duration::from_secs(5), updated_rx.recv())
            .await
            .expect("timed out waiting for watch-driven update");
        assert_eq!(listener.configuration().retries, 5);

        listener.stop().await;
    }

    #[tokio::test]
    async fn test_watch_failure_invokes_failure_callback() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("dynamic.toml");
        std::fs::write(&config_path, "retries = 1\n").unwrap();
        let (target, _seen) = capturing_target();

        let (failed_tx, mut failed_rx) = mpsc::channel::<String>(1);
        let mut listener = FileListener::new(
            "test",
            &config_path,
            target,
            FileListenerOptions::new()
                .with_poll_interval(Duration::from_millis(20))
                .with_on_update_failure(move |err| {
                    let _ = failed_tx.try_send(err.to_string());
                }),
        )
        .unwrap();
        listener.start();

        std::fs::write(&config_path, "not toml at all [").unwrap();

        let reported = tokio::time::timeout(Duration::from_secs(5), failed_rx.recv())
            .await
            .expect("timed out waiting for the failure callback")
            .expect("failure channel closed");
        assert!(reported.contains("failed to decode toml document"));
        assert!(listener.metrics().error_count("failed_to_update_configuration") >= 1);

        // The last good configuration is retained.
        assert_eq!(listener.configuration().retries, 1);

        listener.stop().await;
    }
}
