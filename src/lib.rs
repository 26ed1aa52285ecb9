#![doc(html_root_url = "https://docs.rs/metered_listener/latest")]
//! Connection metrics for network listeners.
//!
//! [`MeteredListener`] wraps a listener, counts how each accept ends and how
//! many connections are open, and periodically reports the numbers through a
//! [`MetricsClient`]. The open connection gauge reports the peak since the
//! previous flush, tracked with [`peak::PeakTracker`].

pub mod client;
pub mod listener;
pub mod peak;

#[cfg(feature = "metrics")]
pub use client::FacadeClient;
pub use client::{LogClient, MetricsClient, ReportError};
pub use listener::{
    AcceptError,
    AcceptOutcome,
    ErrorObserver,
    FlushReport,
    Listener,
    ListenerError,
    ListenerOptions,
    MeterError,
    MeteredConnection,
    MeteredListener,
    MetricNames,
};
pub use peak::{PeakTracker, UpdateTimedOut};
