//! Listener replaying scripted accept results.

use std::{
    collections::VecDeque,
    sync::{
        Mutex,
        atomic::{AtomicU32, AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use metered_listener::{AcceptError, Listener};
use thiserror::Error;

/// Failure returned by [`ScriptedListener`].
#[derive(Clone, Copy, Debug, Default, Error, PartialEq, Eq)]
#[error("scripted accept failure: timeout={timeout}, temporary={temporary}, closed={closed}")]
pub struct ScriptedError {
    pub timeout: bool,
    pub temporary: bool,
    pub closed: bool,
}

impl ScriptedError {
    /// A timeout that is not temporary.
    #[must_use]
    pub fn timeout() -> Self {
        Self {
            timeout: true,
            ..Self::default()
        }
    }

    /// A timeout also flagged as temporary.
    #[must_use]
    pub fn temporary_timeout() -> Self {
        Self {
            timeout: true,
            temporary: true,
            ..Self::default()
        }
    }

    /// Any failure that is not a timeout.
    #[must_use]
    pub fn other() -> Self { Self::default() }
}

impl AcceptError for ScriptedError {
    fn is_timeout(&self) -> bool { self.timeout }

    fn is_temporary(&self) -> bool { self.temporary }

    fn listener_closed() -> Self {
        Self {
            closed: true,
            ..Self::default()
        }
    }
}

/// What [`ScriptedListener`] does once its script is used up.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
enum WhenDry {
    /// Hand out a new connection on every call.
    Accept,
    /// Never return.
    #[default]
    Block,
}

/// Listener whose accept results are set up front.
///
/// Connections are plain sequence numbers starting at zero.
#[derive(Debug, Default)]
pub struct ScriptedListener {
    script: Mutex<VecDeque<Result<(), ScriptedError>>>,
    when_dry: WhenDry,
    delay: Option<Duration>,
    close_error: Option<ScriptedError>,
    next_id: AtomicU32,
    closes: AtomicUsize,
}

impl ScriptedListener {
    /// Accepts a connection on every call.
    #[must_use]
    pub fn endless() -> Self {
        Self {
            when_dry: WhenDry::Accept,
            ..Self::default()
        }
    }

    /// Replays `script`, then blocks forever.
    #[must_use]
    pub fn scripted(script: impl IntoIterator<Item = Result<(), ScriptedError>>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            ..Self::default()
        }
    }

    /// Sleep for `delay` before every accept result.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fail every close with `err`.
    #[must_use]
    pub fn with_close_error(mut self, err: ScriptedError) -> Self {
        self.close_error = Some(err);
        self
    }

    /// Number of `close()` calls received.
    #[must_use]
    pub fn closes(&self) -> usize { self.closes.load(Ordering::SeqCst) }

    fn next_conn(&self) -> (u32, &'static str) {
        (self.next_id.fetch_add(1, Ordering::SeqCst), "scripted")
    }
}

#[async_trait]
impl Listener for ScriptedListener {
    type Conn = u32;
    type Addr = &'static str;
    type Error = ScriptedError;

    async fn accept(&self) -> Result<(u32, &'static str), ScriptedError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.script.lock().expect("script poisoned").pop_front();
        match next {
            Some(result) => result.map(|()| self.next_conn()),
            None if self.when_dry == WhenDry::Accept => Ok(self.next_conn()),
            None => std::future::pending().await,
        }
    }

    fn local_addr(&self) -> Result<&'static str, ScriptedError> { Ok("scripted") }

    async fn close(&self) -> Result<(), ScriptedError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        match self.close_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
