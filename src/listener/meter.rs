//! Shared counters and the periodic flush loop.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use log::{debug, warn};
use tokio::{
    select,
    time::{self, Duration, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use super::{
    accept::AcceptOutcome,
    config::{ErrorObserver, MetricNames},
    error::MeterError,
};
use crate::{
    client::{MetricsClient, ReportError},
    peak::{PeakTracker, UpdateTimedOut},
};

/// Reports are never sampled.
const SAMPLE_RATE: f64 = 1.0;

/// Accept outcomes and open connection bookkeeping shared by a listener and
/// every connection it handed out.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    accepted: AtomicU64,
    timed_out: AtomicU64,
    errored: AtomicU64,
    open: AtomicU64,
    peak: PeakTracker,
}

impl Counters {
    /// Counters whose peak is kept by `peak`.
    #[cfg(test)]
    pub(crate) fn with_peak(peak: PeakTracker) -> Self {
        Self {
            peak,
            ..Self::default()
        }
    }

    fn cell(&self, outcome: AcceptOutcome) -> &AtomicU64 {
        match outcome {
            AcceptOutcome::Success => &self.accepted,
            AcceptOutcome::Timeout => &self.timed_out,
            AcceptOutcome::Error => &self.errored,
        }
    }

    pub(crate) fn record(&self, outcome: AcceptOutcome) {
        self.cell(outcome).fetch_add(1, Ordering::Relaxed);
    }

    /// Count a new open connection and feed it to the peak tracker.
    pub(crate) fn connection_opened(&self) -> Result<u64, UpdateTimedOut> {
        let open = self.open.fetch_add(1, Ordering::AcqRel) + 1;
        self.peak.observe(open)
    }

    pub(crate) fn connection_closed(&self) { self.open.fetch_sub(1, Ordering::AcqRel); }

    pub(crate) fn open(&self) -> u64 { self.open.load(Ordering::Acquire) }

    pub(crate) fn pending(&self, outcome: AcceptOutcome) -> u64 {
        self.cell(outcome).load(Ordering::Relaxed)
    }

    pub(crate) fn peak(&self) -> u64 { self.peak.get() }

    fn drain(&self, outcome: AcceptOutcome) -> u64 { self.cell(outcome).swap(0, Ordering::Relaxed) }

    fn drain_peak(&self) -> u64 { self.peak.take() }
}

/// Values sent to the metrics client by a single flush.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Peak open connections since the previous flush.
    pub open_connections: u64,
    /// Successful accepts since the previous flush.
    pub success: u64,
    /// Timed out accepts since the previous flush.
    pub timeout: u64,
    /// Failed accepts since the previous flush.
    pub error: u64,
}

impl FlushReport {
    /// Count recorded for `outcome`.
    #[must_use]
    pub fn outcome(&self, outcome: AcceptOutcome) -> u64 {
        match outcome {
            AcceptOutcome::Success => self.success,
            AcceptOutcome::Timeout => self.timeout,
            AcceptOutcome::Error => self.error,
        }
    }

    fn set(&mut self, outcome: AcceptOutcome, value: u64) {
        match outcome {
            AcceptOutcome::Success => self.success = value,
            AcceptOutcome::Timeout => self.timeout = value,
            AcceptOutcome::Error => self.error = value,
        }
    }
}

/// Everything the flush loop needs: counters, client, names and observer.
pub(crate) struct Meter<C> {
    pub(crate) counters: Arc<Counters>,
    client: C,
    names: MetricNames,
    on_error: Option<ErrorObserver>,
}

impl<C> Meter<C> {
    pub(crate) fn names(&self) -> &MetricNames { &self.names }
}

impl<C: MetricsClient> Meter<C> {
    pub(crate) fn new(
        client: C,
        names: MetricNames,
        on_error: Option<ErrorObserver>,
        counters: Counters,
    ) -> Self {
        Self {
            counters: Arc::new(counters),
            client,
            names,
            on_error,
        }
    }

    /// Drain every counter and send the non-empty ones to the client.
    ///
    /// The gauge is always reported, even when zero. Outcome counters with no
    /// events since the previous flush are skipped.
    pub(crate) fn flush(&self) -> FlushReport {
        let peak = self.counters.drain_peak();
        #[expect(
            clippy::cast_precision_loss,
            reason = "open connection counts stay far below 2^52"
        )]
        let gauge = peak as f64;
        let result = self
            .client
            .gauge(self.names.gauge(), gauge, &[], SAMPLE_RATE);
        self.check(self.names.gauge(), result);

        let mut report = FlushReport {
            open_connections: peak,
            ..FlushReport::default()
        };
        for outcome in AcceptOutcome::ALL {
            let delta = self.counters.drain(outcome);
            report.set(outcome, delta);
            if delta == 0 {
                continue;
            }
            let value = i64::try_from(delta).unwrap_or(i64::MAX);
            let result = self
                .client
                .count(self.names.count(), value, &[outcome.tag()], SAMPLE_RATE);
            self.check(self.names.count(), result);
        }
        report
    }

    fn check(&self, metric: &str, result: Result<(), ReportError>) {
        if let Err(source) = result {
            self.notify(&MeterError::Report {
                metric: metric.to_owned(),
                source,
            });
        }
    }

    /// Log a swallowed failure and hand it to the observer, if any.
    pub(crate) fn notify(&self, err: &MeterError) {
        warn!("metrics failure ignored: error={err}");
        if let Some(observer) = &self.on_error {
            observer(err);
        }
    }
}

/// Flush `meter` every `period` until `shutdown` is cancelled.
///
/// The first flush happens one full period after the loop starts.
pub(crate) async fn flush_loop<C: MetricsClient>(
    meter: Arc<Meter<C>>,
    period: Duration,
    shutdown: CancellationToken,
) {
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    debug!(
        "flush loop started: period={period:?}, gauge={}",
        meter.names().gauge()
    );
    loop {
        select! {
            biased;

            () = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                meter.flush();
            }
        }
    }
    debug!("flush loop stopped: gauge={}", meter.names().gauge());
}
