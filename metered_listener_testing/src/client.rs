//! In-memory metrics client.

use std::sync::{
    Mutex,
    atomic::{AtomicBool, Ordering},
};

use metered_listener::{MetricsClient, ReportError};

/// A single call received by [`RecordingClient`].
#[derive(Clone, Debug, PartialEq)]
pub enum Report {
    /// A counter increment.
    Count {
        name: String,
        value: i64,
        tags: Vec<String>,
        rate: f64,
    },
    /// A gauge reading.
    Gauge {
        name: String,
        value: f64,
        tags: Vec<String>,
        rate: f64,
    },
}

impl Report {
    /// Metric name of the report.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Report::Count { name, .. } | Report::Gauge { name, .. } => name,
        }
    }
}

/// Metrics client that keeps every report for later assertions.
///
/// Reports are recorded even while [`RecordingClient::set_failing`] makes the
/// client return errors.
#[derive(Debug, Default)]
pub struct RecordingClient {
    reports: Mutex<Vec<Report>>,
    failing: AtomicBool,
}

impl RecordingClient {
    /// Make every following report fail (or succeed again).
    pub fn set_failing(&self, failing: bool) { self.failing.store(failing, Ordering::SeqCst); }

    /// Copy of everything reported so far.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn reports(&self) -> Vec<Report> { self.reports.lock().expect("reports poisoned").clone() }

    /// Remove and return everything reported so far.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn take(&self) -> Vec<Report> {
        std::mem::take(&mut *self.reports.lock().expect("reports poisoned"))
    }

    /// Sum of every counter value reported with `tag`.
    #[must_use]
    pub fn count_total(&self, tag: &str) -> i64 {
        self.reports()
            .iter()
            .filter_map(|report| match report {
                Report::Count { value, tags, .. } if tags.iter().any(|t| t == tag) => Some(*value),
                _ => None,
            })
            .sum()
    }

    /// Gauge readings in the order they arrived.
    #[must_use]
    pub fn gauges(&self) -> Vec<f64> {
        self.reports()
            .iter()
            .filter_map(|report| match report {
                Report::Gauge { value, .. } => Some(*value),
                Report::Count { .. } => None,
            })
            .collect()
    }

    /// Largest gauge reading so far, or zero.
    #[must_use]
    pub fn gauge_max(&self) -> f64 { self.gauges().into_iter().fold(0.0, f64::max) }

    fn push(&self, report: Report) -> Result<(), ReportError> {
        self.reports.lock().expect("reports poisoned").push(report);
        if self.failing.load(Ordering::SeqCst) {
            return Err(ReportError::new("recording client set to fail"));
        }
        Ok(())
    }
}

fn owned(tags: &[&str]) -> Vec<String> { tags.iter().map(|t| (*t).to_owned()).collect() }

impl MetricsClient for RecordingClient {
    fn count(&self, name: &str, value: i64, tags: &[&str], rate: f64) -> Result<(), ReportError> {
        self.push(Report::Count {
            name: name.to_owned(),
            value,
            tags: owned(tags),
            rate,
        })
    }

    fn gauge(&self, name: &str, value: f64, tags: &[&str], rate: f64) -> Result<(), ReportError> {
        self.push(Report::Gauge {
            name: name.to_owned(),
            value,
            tags: owned(tags),
            rate,
        })
    }
}
