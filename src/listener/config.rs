//! Configuration for [`MeteredListener`](super::MeteredListener).

use std::{fmt, sync::Arc, time::Duration};

use super::error::MeterError;

/// Default time between two flushes.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(10);
/// Default metric name prefix.
pub const DEFAULT_PREFIX: &str = "http";

/// Callback invoked for every failure the listener swallows.
pub type ErrorObserver = Arc<dyn Fn(&MeterError) + Send + Sync>;

/// Options accepted when wrapping a listener.
///
/// # Default Values
/// - `flush_interval`: 10 seconds
/// - `metric_prefix`: `"http"`
/// - `on_error`: none; failures are only logged
#[derive(Clone)]
pub struct ListenerOptions {
    /// How often accumulated metrics are sent to the client.
    pub flush_interval: Duration,
    /// Prefix placed in front of every metric name.
    pub metric_prefix: String,
    /// Observer notified of swallowed report and peak-update failures.
    pub on_error: Option<ErrorObserver>,
}

impl Default for ListenerOptions {
    fn default() -> Self {
        Self {
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            metric_prefix: DEFAULT_PREFIX.to_owned(),
            on_error: None,
        }
    }
}

impl fmt::Debug for ListenerOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerOptions")
            .field("flush_interval", &self.flush_interval)
            .field("metric_prefix", &self.metric_prefix)
            .field("on_error", &self.on_error.as_ref().map(|_| "Some(<observer>)"))
            .finish()
    }
}

impl ListenerOptions {
    /// Set the flush interval.
    #[must_use]
    pub fn flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }

    /// Set the metric name prefix.
    #[must_use]
    pub fn metric_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.metric_prefix = prefix.into();
        self
    }

    /// Install an observer for failures that are otherwise only logged.
    #[must_use]
    pub fn on_error<F>(mut self, observer: F) -> Self
    where
        F: Fn(&MeterError) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(observer));
        self
    }

    /// Replace unset values with their defaults.
    ///
    /// A zero interval would make the flush loop spin and an empty prefix
    /// would produce names starting with a dot, so both fall back to the
    /// defaults.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::time::Duration;
    ///
    /// use metered_listener::ListenerOptions;
    ///
    /// let opts = ListenerOptions::default()
    ///     .flush_interval(Duration::ZERO)
    ///     .metric_prefix("")
    ///     .normalized();
    /// assert_eq!(opts.flush_interval, Duration::from_secs(10));
    /// assert_eq!(opts.metric_prefix, "http");
    /// ```
    #[must_use]
    pub fn normalized(mut self) -> Self {
        if self.flush_interval.is_zero() {
            self.flush_interval = DEFAULT_FLUSH_INTERVAL;
        }
        if self.metric_prefix.is_empty() {
            self.metric_prefix = DEFAULT_PREFIX.to_owned();
        }
        self
    }
}

/// Metric names derived from the prefix, fixed for a listener's lifetime.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MetricNames {
    gauge: String,
    count: String,
}

impl MetricNames {
    /// Derive `<prefix>.open_connections` and `<prefix>.accept`.
    #[must_use]
    pub fn new(prefix: &str) -> Self {
        Self {
            gauge: format!("{prefix}.open_connections"),
            count: format!("{prefix}.accept"),
        }
    }

    /// Name of the peak open connections gauge.
    #[must_use]
    pub fn gauge(&self) -> &str { &self.gauge }

    /// Name of the accept outcome counter.
    #[must_use]
    pub fn count(&self) -> &str { &self.count }
}
