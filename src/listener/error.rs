//! Errors raised by [`MeteredListener`](super::MeteredListener).

use thiserror::Error;

use crate::{client::ReportError, peak::UpdateTimedOut};

/// Errors that prevent a listener from being wrapped.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// More than one [`ListenerOptions`](super::ListenerOptions) was supplied.
    #[error("too many configuration arguments: expected at most one, got {count}")]
    TooManyOptions { count: usize },
    /// The flush loop needs a Tokio runtime and none is running.
    #[error("no Tokio runtime available to run the flush loop")]
    NoRuntime,
}

/// Failures the listener absorbs so that serving is never affected.
#[derive(Debug, Error)]
pub enum MeterError {
    /// The metrics client rejected a report.
    #[error("failed to report {metric}: {source}")]
    Report {
        metric: String,
        #[source]
        source: ReportError,
    },
    /// The peak open connections value could not be raised.
    #[error("peak open connections not updated: {0}")]
    PeakUpdate(#[from] UpdateTimedOut),
}
