//! Reporting interface towards a metrics backend.
//!
//! [`MetricsClient`] mirrors the two calls a `StatsD`/DogStatsD client offers
//! for counters and gauges. The listener never retries a failed report.
//! Transport, batching and sampling are the client's business.

use std::{error::Error as StdError, fmt, sync::Arc};

use log::info;
use thiserror::Error;

/// Failure raised by a [`MetricsClient`].
#[derive(Debug, Error)]
#[error("metrics report failed: {source}")]
pub struct ReportError {
    #[source]
    source: Box<dyn StdError + Send + Sync + 'static>,
}

impl ReportError {
    /// Wrap any error produced by a metrics transport.
    pub fn new<E>(source: E) -> Self
    where
        E: Into<Box<dyn StdError + Send + Sync + 'static>>,
    {
        Self {
            source: source.into(),
        }
    }

    /// Borrow the underlying transport error.
    #[must_use]
    pub fn inner(&self) -> &(dyn StdError + Send + Sync + 'static) { &*self.source }
}

/// Client compatible with a DogStatsD-style metrics backend.
///
/// Tags are `key:value` strings. `rate` is the sample rate in `0.0..=1.0`;
/// the listener always passes `1.0`.
pub trait MetricsClient: Send + Sync {
    /// Add `value` occurrences to the counter `name`.
    ///
    /// # Errors
    ///
    /// Returns a [`ReportError`] if the backend rejected the report.
    fn count(&self, name: &str, value: i64, tags: &[&str], rate: f64) -> Result<(), ReportError>;

    /// Record `value` as the current reading of the gauge `name`.
    ///
    /// # Errors
    ///
    /// Returns a [`ReportError`] if the backend rejected the report.
    fn gauge(&self, name: &str, value: f64, tags: &[&str], rate: f64) -> Result<(), ReportError>;
}

impl<C: MetricsClient + ?Sized> MetricsClient for Arc<C> {
    fn count(&self, name: &str, value: i64, tags: &[&str], rate: f64) -> Result<(), ReportError> {
        (**self).count(name, value, tags, rate)
    }

    fn gauge(&self, name: &str, value: f64, tags: &[&str], rate: f64) -> Result<(), ReportError> {
        (**self).gauge(name, value, tags, rate)
    }
}

impl<C: MetricsClient + ?Sized> MetricsClient for Box<C> {
    fn count(&self, name: &str, value: i64, tags: &[&str], rate: f64) -> Result<(), ReportError> {
        (**self).count(name, value, tags, rate)
    }

    fn gauge(&self, name: &str, value: f64, tags: &[&str], rate: f64) -> Result<(), ReportError> {
        (**self).gauge(name, value, tags, rate)
    }
}

impl<C: MetricsClient + ?Sized> MetricsClient for &C {
    fn count(&self, name: &str, value: i64, tags: &[&str], rate: f64) -> Result<(), ReportError> {
        (**self).count(name, value, tags, rate)
    }

    fn gauge(&self, name: &str, value: f64, tags: &[&str], rate: f64) -> Result<(), ReportError> {
        (**self).gauge(name, value, tags, rate)
    }
}

/// Writes every report to the `log` facade at `info` level.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogClient;

impl MetricsClient for LogClient {
    fn count(&self, name: &str, value: i64, tags: &[&str], rate: f64) -> Result<(), ReportError> {
        info!("{name}:{value}|c|@{rate}{}", TagList(tags));
        Ok(())
    }

    fn gauge(&self, name: &str, value: f64, tags: &[&str], rate: f64) -> Result<(), ReportError> {
        info!("{name}:{value}|g|@{rate}{}", TagList(tags));
        Ok(())
    }
}

/// Forwards reports to the [`metrics`](https://docs.rs/metrics) facade.
///
/// Whatever recorder the application installed receives the values. `key:value`
/// tags become labels; a tag without a colon becomes a label with an empty
/// value. The sample rate is ignored since the facade records every event.
#[cfg(feature = "metrics")]
#[derive(Clone, Copy, Debug, Default)]
pub struct FacadeClient;

#[cfg(feature = "metrics")]
impl FacadeClient {
    fn labels(tags: &[&str]) -> Vec<metrics::Label> {
        tags.iter()
            .map(|tag| match tag.split_once(':') {
                Some((key, value)) => metrics::Label::new(key.to_owned(), value.to_owned()),
                None => metrics::Label::new((*tag).to_owned(), String::new()),
            })
            .collect()
    }
}

#[cfg(feature = "metrics")]
impl MetricsClient for FacadeClient {
    fn count(&self, name: &str, value: i64, tags: &[&str], _rate: f64) -> Result<(), ReportError> {
        let delta = u64::try_from(value).map_err(ReportError::new)?;
        metrics::counter!(name.to_owned(), Self::labels(tags)).increment(delta);
        Ok(())
    }

    fn gauge(&self, name: &str, value: f64, tags: &[&str], _rate: f64) -> Result<(), ReportError> {
        metrics::gauge!(name.to_owned(), Self::labels(tags)).set(value);
        Ok(())
    }
}

/// Debug helper printing a tag list the way `StatsD` encodes it.
pub(crate) struct TagList<'a>(pub &'a [&'a str]);

impl fmt::Display for TagList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return Ok(());
        }
        write!(f, "|#{}", self.0.join(","))
    }
}
