//! Listener decorator reporting accept outcomes and open connections.
//!
//! [`MeteredListener`] wraps any [`Listener`] and counts how each `accept()`
//! ends. A background task flushes the counters to a [`MetricsClient`] on a
//! fixed interval:
//!
//! | Metric                      | Kind    | Tags                              |
//! |-----------------------------|---------|-----------------------------------|
//! | `<prefix>.open_connections` | gauge   | none                              |
//! | `<prefix>.accept`           | counter | `status:success\|timeout\|error`  |
//!
//! The gauge carries the highest number of simultaneously open connections
//! seen since the previous flush, so short bursts are not lost between
//! ticks.

mod accept;
mod config;
mod connection;
mod error;
mod meter;
#[cfg(test)]
mod test_util;

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};

pub use accept::{AcceptError, AcceptOutcome, Listener};
use async_trait::async_trait;
pub use config::{DEFAULT_FLUSH_INTERVAL, DEFAULT_PREFIX, ErrorObserver, ListenerOptions, MetricNames};
pub use connection::MeteredConnection;
pub use error::{ListenerError, MeterError};
use log::debug;
pub use meter::FlushReport;
use meter::{Counters, Meter, flush_loop};
use tokio::{runtime::Handle, select};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use crate::client::MetricsClient;

/// A [`Listener`] that reports accept outcomes and open connections.
///
/// Accepting is safe from many tasks at once; wrap the listener in an
/// [`Arc`] to share it. Call [`MeteredListener::close`] to release the
/// wrapped listener, report what has accumulated since the last tick and stop
/// the flush task.
pub struct MeteredListener<L, C> {
    /// `None` once closed. Accepts are counted while holding the read lock,
    /// so nothing is counted after `close` has taken the listener.
    inner: RwLock<Option<Arc<L>>>,
    meter: Arc<Meter<C>>,
    accepting: CancellationToken,
    shutdown: CancellationToken,
    tracker: TaskTracker,
}

impl<L, C> MeteredListener<L, C>
where
    L: Listener,
    C: MetricsClient + 'static,
{
    /// Wrap `inner` using the default options.
    ///
    /// # Errors
    ///
    /// Returns [`ListenerError::NoRuntime`] when called outside a Tokio
    /// runtime.
    pub fn new(inner: L, client: C) -> Result<Self, ListenerError> {
        Self::with_options(inner, client, None)
    }

    /// Wrap `inner`, configured by at most one [`ListenerOptions`].
    ///
    /// The flush task starts immediately on the current Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`ListenerError::TooManyOptions`] if `options` yields more than
    /// one value and [`ListenerError::NoRuntime`] when called outside a Tokio
    /// runtime. No task is spawned in either case.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use std::time::Duration;
    ///
    /// use metered_listener::{ListenerOptions, LogClient, MeteredListener};
    /// use tokio::net::TcpListener;
    ///
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let tcp = TcpListener::bind("127.0.0.1:0").await?;
    /// let opts = ListenerOptions::default()
    ///     .flush_interval(Duration::from_secs(1))
    ///     .metric_prefix("echo");
    /// let listener = MeteredListener::with_options(tcp, LogClient, [opts])?;
    ///
    /// let (conn, peer) = listener.accept().await?;
    /// drop(conn);
    /// listener.close().await?;
    /// # let _ = peer;
    /// # Ok(())
    /// # }
    /// ```
    pub fn with_options<I>(inner: L, client: C, options: I) -> Result<Self, ListenerError>
    where
        I: IntoIterator<Item = ListenerOptions>,
    {
        let mut options: Vec<ListenerOptions> = options.into_iter().collect();
        if options.len() > 1 {
            return Err(ListenerError::TooManyOptions {
                count: options.len(),
            });
        }
        let options = options.pop().unwrap_or_default().normalized();
        Self::start(inner, client, options, Counters::default())
    }

    /// Spawn the flush task for normalized `options` around `counters`.
    fn start(
        inner: L,
        client: C,
        options: ListenerOptions,
        counters: Counters,
    ) -> Result<Self, ListenerError> {
        let ListenerOptions {
            flush_interval,
            metric_prefix,
            on_error,
        } = options;
        let handle = Handle::try_current().map_err(|_| ListenerError::NoRuntime)?;

        let meter = Arc::new(Meter::new(
            client,
            MetricNames::new(&metric_prefix),
            on_error,
            counters,
        ));
        let shutdown = CancellationToken::new();
        let tracker = TaskTracker::new();
        tracker.spawn_on(
            flush_loop(Arc::clone(&meter), flush_interval, shutdown.clone()),
            &handle,
        );

        Ok(Self {
            inner: RwLock::new(Some(Arc::new(inner))),
            meter,
            accepting: CancellationToken::new(),
            shutdown,
            tracker,
        })
    }

    /// Accept the next connection from the wrapped listener.
    ///
    /// Success bumps the accepted and open counts and wraps the connection so
    /// closing it gives the slot back. Failures are bucketed as timeout or
    /// error and returned unchanged. Once the listener is closed, accepts
    /// still waiting and new calls fail with [`AcceptError::listener_closed`];
    /// those failures are not counted.
    ///
    /// # Errors
    ///
    /// Returns whatever the wrapped listener returned.
    pub async fn accept(&self) -> Result<(MeteredConnection<L::Conn>, L::Addr), L::Error> {
        let inner = self.inner().ok_or_else(closed::<L>)?;
        let result = select! {
            biased;

            () = self.accepting.cancelled() => return Err(closed::<L>()),
            res = inner.accept() => res,
        };
        drop(inner);

        let slot = self.slot();
        if slot.is_none() {
            // Close won the race; the connection is dropped uncounted.
            return Err(closed::<L>());
        }
        let counters = &self.meter.counters;
        match result {
            Ok((conn, addr)) => {
                counters.record(AcceptOutcome::Success);
                if let Err(e) = counters.connection_opened() {
                    self.meter.notify(&MeterError::from(e));
                }
                Ok((MeteredConnection::new(conn, Arc::clone(counters)), addr))
            }
            Err(err) => {
                counters.record(AcceptOutcome::classify(&err));
                Err(err)
            }
        }
    }

    /// Close the wrapped listener, flush once more and stop the flush task.
    ///
    /// Accepting stops first, so the final flush covers every counted
    /// accept. The wrapped listener is closed and then dropped, which
    /// releases Tokio sockets. Waits for the flush task to finish before
    /// returning. Only the first call does any work; later calls return
    /// `Ok(())`.
    ///
    /// # Errors
    ///
    /// Returns the error raised while closing the wrapped listener. Flush
    /// failures are never returned.
    pub async fn close(&self) -> Result<(), L::Error> {
        self.accepting.cancel();
        let taken = self
            .inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(inner) = taken else {
            debug!("listener already closed: gauge={}", self.meter.names().gauge());
            return Ok(());
        };
        let result = inner.close().await;
        drop(inner);
        self.meter.flush();
        self.shutdown.cancel();
        self.tracker.close();
        self.tracker.wait().await;
        result
    }

    /// Report everything accumulated since the previous flush right away.
    pub fn flush(&self) -> FlushReport { self.meter.flush() }

    /// Address of the wrapped listener.
    ///
    /// # Errors
    ///
    /// Returns the wrapped listener's error, or
    /// [`AcceptError::listener_closed`] once closed.
    pub fn local_addr(&self) -> Result<L::Addr, L::Error> {
        self.inner().ok_or_else(closed::<L>)?.local_addr()
    }
}

fn closed<L: Listener>() -> L::Error { <L::Error as AcceptError>::listener_closed() }

impl<L, C> MeteredListener<L, C> {
    /// Connections accepted and not yet closed.
    #[must_use]
    pub fn open_connections(&self) -> u64 { self.meter.counters.open() }

    /// Highest open connection count since the previous flush.
    #[must_use]
    pub fn peak_connections(&self) -> u64 { self.meter.counters.peak() }

    /// Accepts with `outcome` waiting for the next flush.
    #[must_use]
    pub fn pending(&self, outcome: AcceptOutcome) -> u64 { self.meter.counters.pending(outcome) }

    /// Names of the emitted metrics.
    #[must_use]
    pub fn metric_names(&self) -> &MetricNames { self.meter.names() }

    /// Whether [`MeteredListener::close`] has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool { self.accepting.is_cancelled() }

    /// Shared handle to the wrapped listener, or `None` once closed.
    #[must_use]
    pub fn inner(&self) -> Option<Arc<L>> { self.slot().clone() }

    fn slot(&self) -> RwLockReadGuard<'_, Option<Arc<L>>> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<L, C> Drop for MeteredListener<L, C> {
    fn drop(&mut self) {
        // Stop the flush task of a listener that was never closed.
        self.accepting.cancel();
        self.shutdown.cancel();
    }
}

#[async_trait]
impl<L, C> Listener for MeteredListener<L, C>
where
    L: Listener,
    C: MetricsClient + 'static,
{
    type Conn = MeteredConnection<L::Conn>;
    type Addr = L::Addr;
    type Error = L::Error;

    async fn accept(&self) -> Result<(Self::Conn, Self::Addr), Self::Error> {
        MeteredListener::accept(self).await
    }

    fn local_addr(&self) -> Result<Self::Addr, Self::Error> { MeteredListener::local_addr(self) }

    async fn close(&self) -> Result<(), Self::Error> { MeteredListener::close(self).await }
}
