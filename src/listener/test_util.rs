//! Test doubles shared by the listener unit tests.

use std::{
    collections::VecDeque,
    sync::{
        Mutex,
        atomic::{AtomicU32, AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use thiserror::Error;

use super::{AcceptError, Listener};
use crate::client::{MetricsClient, ReportError};

/// One call received by [`Recorder`].
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Sent {
    Count(String, i64, Vec<String>),
    Gauge(String, f64),
}

/// Metrics client keeping every report in memory.
#[derive(Debug, Default)]
pub(crate) struct Recorder {
    sent: Mutex<Vec<Sent>>,
    fail: bool,
}

impl Recorder {
    /// A recorder that rejects every report after recording it.
    pub(crate) fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub(crate) fn take(&self) -> Vec<Sent> { std::mem::take(&mut *self.sent.lock().expect("lock")) }

    /// Sum of the counts reported with `tag`.
    pub(crate) fn count_total(&self, tag: &str) -> i64 {
        self.sent
            .lock()
            .expect("lock")
            .iter()
            .filter_map(|sent| match sent {
                Sent::Count(_, value, tags) if tags.iter().any(|t| t == tag) => Some(*value),
                _ => None,
            })
            .sum()
    }

    /// Gauge values in the order they were reported.
    pub(crate) fn gauges(&self) -> Vec<f64> {
        self.sent
            .lock()
            .expect("lock")
            .iter()
            .filter_map(|sent| match sent {
                Sent::Gauge(_, value) => Some(*value),
                Sent::Count(..) => None,
            })
            .collect()
    }

    fn result(&self) -> Result<(), ReportError> {
        if self.fail {
            return Err(ReportError::new("backend down"));
        }
        Ok(())
    }
}

impl MetricsClient for Recorder {
    fn count(&self, name: &str, value: i64, tags: &[&str], _rate: f64) -> Result<(), ReportError> {
        self.sent.lock().expect("lock").push(Sent::Count(
            name.to_owned(),
            value,
            tags.iter().map(|t| (*t).to_owned()).collect(),
        ));
        self.result()
    }

    fn gauge(&self, name: &str, value: f64, _tags: &[&str], _rate: f64) -> Result<(), ReportError> {
        self.sent
            .lock()
            .expect("lock")
            .push(Sent::Gauge(name.to_owned(), value));
        self.result()
    }
}

/// Failure produced by [`StubListener`].
#[derive(Debug, Error, Default, PartialEq, Eq)]
#[error("stub failure: timeout={timeout}, temporary={temporary}, closed={closed}")]
pub(crate) struct StubError {
    pub timeout: bool,
    pub temporary: bool,
    pub closed: bool,
}

impl StubError {
    pub(crate) fn timeout() -> Self {
        Self {
            timeout: true,
            ..Self::default()
        }
    }

    pub(crate) fn temporary_timeout() -> Self {
        Self {
            timeout: true,
            temporary: true,
            ..Self::default()
        }
    }

    pub(crate) fn other() -> Self { Self::default() }
}

impl AcceptError for StubError {
    fn is_timeout(&self) -> bool { self.timeout }

    fn is_temporary(&self) -> bool { self.temporary }

    fn listener_closed() -> Self {
        Self {
            closed: true,
            ..Self::default()
        }
    }
}

/// Listener replaying scripted accept results.
///
/// Once the script runs dry the listener either accepts forever or never
/// returns, depending on how it was built.
#[derive(Debug, Default)]
pub(crate) struct StubListener {
    script: Mutex<VecDeque<Result<(), StubError>>>,
    endless: bool,
    fail_close: bool,
    next_id: AtomicU32,
    pub closes: AtomicUsize,
}

impl StubListener {
    /// Accepts a connection on every call.
    pub(crate) fn endless() -> Self {
        Self {
            endless: true,
            ..Self::default()
        }
    }

    /// Replays `script`, then blocks forever.
    pub(crate) fn scripted(script: impl IntoIterator<Item = Result<(), StubError>>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            ..Self::default()
        }
    }

    /// Fails every close with [`StubError::other`].
    pub(crate) fn failing_close(mut self) -> Self {
        self.fail_close = true;
        self
    }
}

#[async_trait]
impl Listener for StubListener {
    type Conn = u32;
    type Addr = &'static str;
    type Error = StubError;

    async fn accept(&self) -> Result<(u32, &'static str), StubError> {
        let next = self.script.lock().expect("lock").pop_front();
        match next {
            Some(result) => result.map(|()| (self.next_id.fetch_add(1, Ordering::SeqCst), "stub")),
            None if self.endless => Ok((self.next_id.fetch_add(1, Ordering::SeqCst), "stub")),
            None => std::future::pending().await,
        }
    }

    fn local_addr(&self) -> Result<&'static str, StubError> { Ok("stub") }

    async fn close(&self) -> Result<(), StubError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        if self.fail_close {
            return Err(StubError::other());
        }
        Ok(())
    }
}
