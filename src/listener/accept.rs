//! Listener abstraction and accept outcome classification.

use std::{io, net::SocketAddr, sync::Arc};

use async_trait::async_trait;
use tokio::net::TcpListener;
#[cfg(unix)]
use tokio::net::{UnixListener, UnixStream, unix};

/// Error returned by a [`Listener`], with enough detail to bucket it.
pub trait AcceptError: std::error::Error + Send + Sync + 'static {
    /// The accept gave up waiting.
    fn is_timeout(&self) -> bool;

    /// The failure is expected to clear up if accepting is retried.
    fn is_temporary(&self) -> bool { false }

    /// Error handed to callers whose accept was interrupted by a close.
    fn listener_closed() -> Self
    where
        Self: Sized;
}

impl AcceptError for io::Error {
    fn is_timeout(&self) -> bool { self.kind() == io::ErrorKind::TimedOut }

    fn is_temporary(&self) -> bool {
        matches!(
            self.kind(),
            io::ErrorKind::Interrupted
                | io::ErrorKind::WouldBlock
                | io::ErrorKind::ConnectionAborted
                | io::ErrorKind::ConnectionReset
        )
    }

    fn listener_closed() -> Self { io::Error::new(io::ErrorKind::NotConnected, "listener closed") }
}

/// Source of incoming connections.
///
/// Implementations must be cancellation-safe: dropping a pending `accept()`
/// future must not lose a connection.
#[async_trait]
pub trait Listener: Send + Sync {
    /// Connection type yielded by a successful accept.
    type Conn: Send;
    /// Address type describing either end of a connection.
    type Addr: Send;
    /// Failure type for accept and close.
    type Error: AcceptError;

    /// Wait for the next incoming connection.
    async fn accept(&self) -> Result<(Self::Conn, Self::Addr), Self::Error>;

    /// Address the listener is bound to.
    fn local_addr(&self) -> Result<Self::Addr, Self::Error>;

    /// Stop accepting connections.
    ///
    /// Tokio listeners release their socket when dropped, which
    /// [`MeteredListener::close`](super::MeteredListener::close) does right
    /// after this call, so the default does nothing.
    async fn close(&self) -> Result<(), Self::Error> { Ok(()) }
}

#[async_trait]
impl<L: Listener + ?Sized> Listener for Arc<L> {
    type Conn = L::Conn;
    type Addr = L::Addr;
    type Error = L::Error;

    async fn accept(&self) -> Result<(Self::Conn, Self::Addr), Self::Error> {
        (**self).accept().await
    }

    fn local_addr(&self) -> Result<Self::Addr, Self::Error> { (**self).local_addr() }

    async fn close(&self) -> Result<(), Self::Error> { (**self).close().await }
}

#[async_trait]
impl Listener for TcpListener {
    type Conn = tokio::net::TcpStream;
    type Addr = SocketAddr;
    type Error = io::Error;

    async fn accept(&self) -> io::Result<(Self::Conn, SocketAddr)> {
        TcpListener::accept(self).await
    }

    fn local_addr(&self) -> io::Result<SocketAddr> { TcpListener::local_addr(self) }
}

#[cfg(unix)]
#[async_trait]
impl Listener for UnixListener {
    type Conn = UnixStream;
    type Addr = unix::SocketAddr;
    type Error = io::Error;

    async fn accept(&self) -> io::Result<(UnixStream, unix::SocketAddr)> {
        UnixListener::accept(self).await
    }

    fn local_addr(&self) -> io::Result<unix::SocketAddr> { UnixListener::local_addr(self) }
}

/// Result bucket of a single accept call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AcceptOutcome {
    /// A connection was handed out.
    Success,
    /// The accept timed out and the failure was not marked temporary.
    Timeout,
    /// Any other failure.
    Error,
}

impl AcceptOutcome {
    /// Every outcome in reporting order.
    pub const ALL: [AcceptOutcome; 3] = [
        AcceptOutcome::Success,
        AcceptOutcome::Timeout,
        AcceptOutcome::Error,
    ];

    /// Bucket a failed accept.
    ///
    /// Only timeouts that are not also temporary count as
    /// [`AcceptOutcome::Timeout`]; everything else is an
    /// [`AcceptOutcome::Error`].
    #[must_use]
    pub fn classify<E: AcceptError>(err: &E) -> Self {
        if err.is_timeout() && !err.is_temporary() {
            AcceptOutcome::Timeout
        } else {
            AcceptOutcome::Error
        }
    }

    /// Tag attached to the accept counter for this outcome.
    #[must_use]
    pub fn tag(self) -> &'static str {
        match self {
            AcceptOutcome::Success => "status:success",
            AcceptOutcome::Timeout => "status:timeout",
            AcceptOutcome::Error => "status:error",
        }
    }
}
