//! Connection wrapper that keeps the open connection count honest.
//!
//! `MeteredConnection` gives its slot in the open connection count back when
//! it is dropped or explicitly closed. Reads and writes go straight to the
//! wrapped connection.

use std::{
    io::{self, IoSlice},
    ops::{Deref, DerefMut},
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadBuf};

use super::meter::Counters;

/// Holds one unit of the open connection count.
#[derive(Debug)]
struct OpenSlot {
    counters: Arc<Counters>,
}

impl Drop for OpenSlot {
    fn drop(&mut self) { self.counters.connection_closed(); }
}

/// A connection accepted through a [`MeteredListener`](super::MeteredListener).
///
/// Closing the connection, by dropping it or calling
/// [`MeteredConnection::close`], decrements the listener's open connection
/// count exactly once. Everything else is delegated to the inner connection,
/// which is also reachable through `Deref`.
#[derive(Debug)]
pub struct MeteredConnection<S> {
    inner: S,
    slot: OpenSlot,
}

impl<S> MeteredConnection<S> {
    pub(crate) fn new(inner: S, counters: Arc<Counters>) -> Self {
        Self {
            inner,
            slot: OpenSlot { counters },
        }
    }

    /// Borrow the wrapped connection.
    pub fn get_ref(&self) -> &S { &self.inner }

    /// Mutably borrow the wrapped connection.
    pub fn get_mut(&mut self) -> &mut S { &mut self.inner }
}

impl<S: AsyncWrite + Unpin> MeteredConnection<S> {
    /// Release the open connection slot, then shut down and drop the inner
    /// connection.
    ///
    /// # Errors
    ///
    /// Returns the error raised while shutting down the inner connection.
    pub async fn close(self) -> io::Result<()> {
        let Self { mut inner, slot } = self;
        drop(slot);
        inner.shutdown().await
    }
}

impl<S> Deref for MeteredConnection<S> {
    type Target = S;

    fn deref(&self) -> &Self::Target { &self.inner }
}

impl<S> DerefMut for MeteredConnection<S> {
    fn deref_mut(&mut self) -> &mut Self::Target { &mut self.inner }
}

impl<S: AsyncRead + Unpin> AsyncRead for MeteredConnection<S> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for MeteredConnection<S> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_write_vectored(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write_vectored(cx, bufs)
    }

    fn is_write_vectored(&self) -> bool { self.inner.is_write_vectored() }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}
