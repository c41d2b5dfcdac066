//! Network listener fetching configuration from a remote service.
//!
//! Periodically issues an HTTP request describing this instance
//! (environment, cluster, instance, sections) and either writes the
//! response bytes to a file, leaving the merge to a file listener
//! watching that path, or decodes the body and delivers it to a
//! [`Configurable`] directly.

use super::configurable::Configurable;
use super::error::{ListenerError, ListenerResult};
use super::format::DocumentFormat;
use super::metrics::NetworkListenerMetrics;
use rand::Rng;
use serde::de::DeserializeOwned;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, Interval};
use tracing::warn;
use url::Url;

/// The request issued against the remote configuration service.
///
/// The query parameter names `environment`, `cluster`, `instance` and
/// `sections` (comma-joined) are part of the wire contract with the
/// service.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Base URL of the configuration service.
    pub url: String,
    /// Deployment environment identifier.
    pub environment: String,
    /// Cluster identifier.
    pub cluster: String,
    /// Instance identifier.
    pub instance: String,
    /// Configuration sections to request; at least one is required.
    pub sections: Vec<String>,
}

impl RequestOptions {
    fn validate(&self) -> ListenerResult<()> {
        if let Err(err) = Url::parse(&self.url) {
            return Err(ListenerError::InvalidOptions(format!(
                "invalid URL '{}': {err}",
                self.url
            )));
        }
        if self.sections.is_empty() {
            return Err(ListenerError::InvalidOptions(
                "at least one section required".to_string(),
            ));
        }
        Ok(())
    }

    fn build(&self) -> ListenerResult<Url> {
        let mut url = Url::parse(&self.url).map_err(|err| {
            ListenerError::InvalidOptions(format!("invalid URL '{}': {err}", self.url))
        })?;
        url.query_pairs_mut()
            .append_pair("environment", &self.environment)
            .append_pair("cluster", &self.cluster)
            .append_pair("instance", &self.instance)
            .append_pair("sections", &self.sections.join(","));
        Ok(url)
    }
}

/// Timing of periodic fetches.
#[derive(Debug, Clone, Copy, Default)]
pub struct IntervalOptions {
    /// Polling interval; `None` disables periodic fetching (only the
    /// initial fetch and manual triggers run).
    pub interval: Option<Duration>,
    /// Maximum initial jitter; the actual jitter is sampled uniformly
    /// in `[0, max)`. Zero disables jitter.
    pub max_initial_jitter: Duration,
}

impl IntervalOptions {
    fn validate(&self) -> ListenerResult<()> {
        if let Some(interval) = self.interval {
            if interval.is_zero() {
                return Err(ListenerError::InvalidOptions(
                    "request interval must be nonzero when enabled".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// What to do with a fetched configuration document.
pub enum NetworkOutput<C> {
    /// Write the response bytes to a file verbatim; merging is deferred
    /// to the file listener reading that same file.
    File(PathBuf),
    /// Decode the body and deliver the value to a consumer.
    Decoded {
        /// Document format of the response body.
        format: DocumentFormat,
        /// Consumer of the decoded value.
        target: Arc<dyn Configurable<C>>,
    },
}

/// Options for the network listener.
pub struct NetworkListenerOptions<C> {
    /// The request specification.
    pub request: RequestOptions,
    /// Fetch timing.
    pub interval: IntervalOptions,
    /// Output disposition.
    pub output: NetworkOutput<C>,
    /// Invoked whenever a fetch cycle fails; the loop keeps running.
    pub on_fetch_error: Option<Box<dyn Fn(&ListenerError) + Send + Sync>>,
}

impl<C> NetworkListenerOptions<C> {
    fn validate(&self) -> ListenerResult<()> {
        self.request.validate()?;
        self.interval.validate()?;
        if let NetworkOutput::File(path) = &self.output {
            if !path.is_file() {
                return Err(ListenerError::InvalidOptions(format!(
                    "output file '{}' does not exist",
                    path.display()
                )));
            }
        }
        Ok(())
    }
}

struct FetchTask<C> {
    url: Url,
    client: reqwest::Client,
    output: NetworkOutput<C>,
    metrics: NetworkListenerMetrics,
    on_fetch_error: Option<Box<dyn Fn(&ListenerError) + Send + Sync>>,
}

impl<C> FetchTask<C>
where
    C: DeserializeOwned + Send + Sync + 'static,
{
    async fn fetch(&self) -> ListenerResult<Vec<u8>> {
        let response = self
            .client
            .get(self.url.clone())
            .send()
            .await
            .map_err(|err| ListenerError::Fetch {
                url: self.url.to_string(),
                message: err.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ListenerError::Status {
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(|err| ListenerError::Fetch {
            url: self.url.to_string(),
            message: err.to_string(),
        })?;
        Ok(body.to_vec())
    }

    async fn deliver(&self, body: Vec<u8>) -> ListenerResult<()> {
        match &self.output {
            NetworkOutput::File(path) => {
                tokio::fs::write(path, &body)
                    .await
                    .map_err(|err| ListenerError::Write {
                        path: path.clone(),
                        source: err,
                    })
            }
            NetworkOutput::Decoded { format, target } => {
                let raw = String::from_utf8(body).map_err(|err| ListenerError::Decode {
                    format: *format,
                    message: err.to_string(),
                })?;
                let decoded: C = serde_json::from_value(format.decode_tree(&raw)?)?;
                target.on_update(decoded).map_err(ListenerError::UpdateRejected)
            }
        }
    }

    async fn fetch_cycle(&self) {
        let started = Instant::now();
        let fetched = self.fetch().await;
        self.metrics.observe_request_duration(started.elapsed());

        let result = match fetched {
            Ok(body) => match self.deliver(body).await {
                Ok(()) => return,
                Err(err) => {
                    match &err {
                        ListenerError::Write { .. } => self.metrics.error_writing(),
                        _ => self.metrics.error_updating(),
                    }
                    err
                }
            },
            Err(err) => {
                self.metrics.error_fetching();
                err
            }
        };

        warn!(url = %self.url, error = %result, "configuration fetch cycle failed");
        if let Some(callback) = &self.on_fetch_error {
            callback(&result);
        }
    }
}

/// Handle to a running network listener task.
///
/// The task stops when [`stop`](Self::stop) is called or the handle is
/// dropped.
pub struct NetworkListener {
    trigger_tx: mpsc::Sender<()>,
    shutdown_tx: mpsc::Sender<()>,
    metrics: NetworkListenerMetrics,
}

impl NetworkListener {
    /// Validate the options and start the fetch loop.
    ///
    /// Must be called from within a tokio runtime. The first fetch runs
    /// after the initial jitter (if any); periodic fetches follow when
    /// an interval is configured.
    ///
    /// # Errors
    ///
    /// Returns [`ListenerError::InvalidOptions`] when the request, the
    /// interval, or the output file fail validation.
    pub fn listen<C>(
        id: impl Into<String>,
        options: NetworkListenerOptions<C>,
    ) -> ListenerResult<Self>
    where
        C: DeserializeOwned + Send + Sync + 'static,
    {
        options.validate()?;
        let url = options.request.build()?;
        let metrics = NetworkListenerMetrics::new(id);

        let (trigger_tx, trigger_rx) = mpsc::channel::<()>(1);
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);

        let task = FetchTask {
            url,
            client: reqwest::Client::new(),
            output: options.output,
            metrics: metrics.clone(),
            on_fetch_error: options.on_fetch_error,
        };

        tokio::spawn(run(task, options.interval, trigger_rx, shutdown_rx));

        Ok(Self {
            trigger_tx,
            shutdown_tx,
            metrics,
        })
    }

    /// Request an immediate fetch.
    ///
    /// Also resets the periodic timer, so a fetch that was due
    /// momentarily will not be sent twice. A trigger after shutdown is
    /// a no-op.
    pub fn trigger(&self) {
        let _ = self.trigger_tx.try_send(());
    }

    /// Stop the fetch loop.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.try_send(());
    }

    /// The listener's error counters and request timings.
    #[must_use]
    pub fn metrics(&self) -> &NetworkListenerMetrics {
        &self.metrics
    }
}

async fn run<C>(
    task: FetchTask<C>,
    interval: IntervalOptions,
    mut trigger_rx: mpsc::Receiver<()>,
    mut shutdown_rx: mpsc::Receiver<()>,
) where
    C: DeserializeOwned + Send + Sync + 'static,
{
    if !interval.max_initial_jitter.is_zero() {
        let jitter = random_jitter(interval.max_initial_jitter);
        tokio::select! {
            () = tokio::time::sleep(jitter) => {}
            Some(()) = trigger_rx.recv() => {}
            _ = shutdown_rx.recv() => return,
        }
    }

    task.fetch_cycle().await;

    let mut ticker = interval
        .interval
        .map(|period| tokio::time::interval_at(Instant::now() + period, period));

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => return,
            () = next_tick(&mut ticker) => {
                task.fetch_cycle().await;
            }
            Some(()) = trigger_rx.recv() => {
                task.fetch_cycle().await;
                if let Some(ticker) = &mut ticker {
                    ticker.reset();
                }
            }
        }
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

fn random_jitter(max: Duration) -> Duration {
    let nanos = rand::rng().random_range(0..max.as_nanos().max(1));
    Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_url_carries_wire_parameters() {
        let request = RequestOptions {
            url: "http://config.internal/api/v1/config".to_string(),
            environment: "prod".to_string(),
            cluster: "eu-1".to_string(),
            instance: "node-7".to_string(),
            sections: vec!["first".to_string(), "second".to_string()],
        };

        let url = request.build().unwrap();
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        assert_eq!(
            pairs,
            [
                ("environment".to_string(), "prod".to_string()),
                ("cluster".to_string(), "eu-1".to_string()),
                ("instance".to_string(), "node-7".to_string()),
                ("sections".to_string(), "first,second".to_string()),
            ]
        );
    }

    #[test]
    fn test_request_requires_valid_url_and_sections() {
        let mut request = RequestOptions {
            url: "not a url".to_string(),
            sections: vec!["first".to_string()],
            ..RequestOptions::default()
        };
        assert!(matches!(
            request.validate(),
            Err(ListenerError::InvalidOptions(_))
        ));

        request.url = "http://localhost:1".to_string();
        request.sections.clear();
        assert!(matches!(
            request.validate(),
            Err(ListenerError::InvalidOptions(_))
        ));
    }

    #[test]
    fn test_interval_rejects_zero_when_enabled() {
        let options = IntervalOptions {
            interval: Some(Duration::ZERO),
            max_initial_jitter: Duration::ZERO,
        };
        assert!(matches!(
            options.validate(),
            Err(ListenerError::InvalidOptions(_))
        ));

        let options = IntervalOptions {
            interval: None,
            max_initial_jitter: Duration::from_secs(1),
        };
        options.validate().unwrap();
    }

    #[test]
    fn test_jitter_stays_below_maximum() {
        let max = Duration::from_millis(50);
        for _ in 0..100 {
            assert!(random_jitter(max) < max);
        }
    }
}
