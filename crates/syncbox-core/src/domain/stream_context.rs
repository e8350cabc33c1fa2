//! StreamContext - scoped ownership of a transfer byte stream
//!
//! A [`StreamContext`] owns the byte stream bound to one change for the
//! duration of its transfer attempts. Each attempt borrows the stream through
//! a [`StreamLease`]; dropping the lease hands the stream back so the next
//! retry reads from the same source. Every lease after the first seeks back
//! to the start before its first read, so a retried attempt sees the whole
//! body again.
//!
//! The stream is released exactly once: either by an explicit
//! [`dispose`](StreamContext::dispose), by dropping the context, or (if a
//! lease is still out at that moment) by dropping the lease afterwards.

use std::fmt;
use std::io::{self, SeekFrom};
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{ready, Context, Poll};

use tokio::io::{AsyncRead, AsyncSeek, ReadBuf};
use tracing::debug;

use super::newtypes::ChangeId;

/// Source a transfer body can be read from, and re-read on retry
pub trait TransferSource: AsyncRead + AsyncSeek + Send + Unpin {}

impl<T: AsyncRead + AsyncSeek + Send + Unpin> TransferSource for T {}

/// Byte stream carried by a transfer
pub type TransferStream = Box<dyn TransferSource>;

#[derive(Default)]
struct Shared {
    stream: Option<TransferStream>,
    leased: bool,
    disposed: bool,
    leases: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rewind {
    NotNeeded,
    Pending,
    Seeking,
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

// ============================================================================
// StreamContext
// ============================================================================

/// Owns the byte stream of a single change
pub struct StreamContext {
    change_id: ChangeId,
    shared: Arc<Mutex<Shared>>,
}

impl StreamContext {
    /// Binds `stream` to the change identified by `change_id`
    pub fn new<S>(change_id: ChangeId, stream: S) -> Self
    where
        S: AsyncRead + AsyncSeek + Send + Unpin + 'static,
    {
        Self {
            change_id,
            shared: Arc::new(Mutex::new(Shared {
                stream: Some(Box::new(stream)),
                ..Shared::default()
            })),
        }
    }

    /// Returns the change this stream belongs to
    pub fn change_id(&self) -> &ChangeId {
        &self.change_id
    }

    /// Borrows the stream for one transfer attempt
    ///
    /// Returns `None` if the stream was disposed or is already leased.
    /// A lease handed out after an earlier one rewinds to the start on its
    /// first read.
    pub fn lease(&self) -> Option<StreamLease> {
        let mut shared = lock(&self.shared);
        if shared.disposed || shared.leased {
            return None;
        }
        let stream = shared.stream.take()?;
        shared.leased = true;
        let rewind = if shared.leases == 0 {
            Rewind::NotNeeded
        } else {
            Rewind::Pending
        };
        shared.leases += 1;
        Some(StreamLease {
            stream: Some(stream),
            shared: Arc::clone(&self.shared),
            rewind,
        })
    }

    /// Number of leases handed out so far
    pub fn lease_count(&self) -> u32 {
        lock(&self.shared).leases
    }

    /// Returns true if a lease is currently outstanding
    pub fn is_leased(&self) -> bool {
        lock(&self.shared).leased
    }

    /// Returns true once the stream has been released
    pub fn is_disposed(&self) -> bool {
        lock(&self.shared).disposed
    }

    /// Releases the stream
    ///
    /// Returns `true` on the call that performed the release and `false`
    /// on every later call. If a lease is outstanding the stream is dropped
    /// when that lease is dropped.
    pub fn dispose(&self) -> bool {
        let stream = {
            let mut shared = lock(&self.shared);
            if shared.disposed {
                return false;
            }
            shared.disposed = true;
            shared.stream.take()
        };
        debug!(
            change_id = %self.change_id,
            deferred = stream.is_none(),
            "Disposing transfer stream"
        );
        drop(stream);
        true
    }
}

impl Drop for StreamContext {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for StreamContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shared = lock(&self.shared);
        f.debug_struct("StreamContext")
            .field("change_id", &self.change_id)
            .field("leased", &shared.leased)
            .field("disposed", &shared.disposed)
            .finish()
    }
}

// ============================================================================
// StreamLease
// ============================================================================

/// Exclusive access to a [`StreamContext`]'s stream for one attempt
pub struct StreamLease {
    stream: Option<TransferStream>,
    shared: Arc<Mutex<Shared>>,
    rewind: Rewind,
}

impl AsyncRead for StreamLease {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let Some(stream) = this.stream.as_mut() else {
            return Poll::Ready(Ok(()));
        };

        if this.rewind == Rewind::Pending {
            Pin::new(&mut *stream).start_seek(SeekFrom::Start(0))?;
            this.rewind = Rewind::Seeking;
        }
        if this.rewind == Rewind::Seeking {
            ready!(Pin::new(&mut *stream).poll_complete(cx))?;
            this.rewind = Rewind::NotNeeded;
        }

        Pin::new(stream).poll_read(cx, buf)
    }
}

impl Drop for StreamLease {
    fn drop(&mut self) {
        let Some(stream) = self.stream.take() else {
            return;
        };
        let mut shared = lock(&self.shared);
        shared.leased = false;
        if !shared.disposed {
            shared.stream = Some(stream);
        }
    }
}

impl fmt::Debug for StreamLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamLease")
            .field("rewind", &self.rewind)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
pub(crate) mod tests {
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio::io::AsyncReadExt;

    use super::*;

    /// Stream that counts how many times it was dropped
    pub(crate) struct CountingStream {
        inner: Cursor<Vec<u8>>,
        drops: Arc<AtomicUsize>,
    }

    impl CountingStream {
        pub(crate) fn new(data: &[u8], drops: Arc<AtomicUsize>) -> Self {
            Self {
                inner: Cursor::new(data.to_vec()),
                drops,
            }
        }
    }

    impl AsyncRead for CountingStream {
        fn poll_read(
            mut self: Pin<&mut Self>,
            cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            Pin::new(&mut self.inner).poll_read(cx, buf)
        }
    }

    impl AsyncSeek for CountingStream {
        fn start_seek(mut self: Pin<&mut Self>, position: SeekFrom) -> io::Result<()> {
            Pin::new(&mut self.inner).start_seek(position)
        }

        fn poll_complete(
            mut self: Pin<&mut Self>,
            cx: &mut Context<'_>,
        ) -> Poll<io::Result<u64>> {
            Pin::new(&mut self.inner).poll_complete(cx)
        }
    }

    impl Drop for CountingStream {
        fn drop(&mut self) {
            self.drops.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_lease_reads_stream_content() {
        let drops = Arc::new(AtomicUsize::new(0));
        let ctx = StreamContext::new(ChangeId::new(), CountingStream::new(b"payload", drops));

        let mut lease = ctx.lease().unwrap();
        let mut content = Vec::new();
        lease.read_to_end(&mut content).await.unwrap();
        assert_eq!(content, b"payload");
    }

    #[tokio::test]
    async fn test_each_lease_reads_the_whole_body() {
        let drops = Arc::new(AtomicUsize::new(0));
        let ctx = StreamContext::new(ChangeId::new(), CountingStream::new(b"payload", drops));

        let mut read_per_lease = Vec::new();
        for _ in 0..3 {
            let mut lease = ctx.lease().unwrap();
            let mut content = Vec::new();
            lease.read_to_end(&mut content).await.unwrap();
            read_per_lease.push(content.len());
        }

        assert_eq!(read_per_lease, vec![7, 7, 7]);
        assert_eq!(ctx.lease_count(), 3);
    }

    #[tokio::test]
    async fn test_partially_read_lease_restarts_from_the_beginning() {
        let drops = Arc::new(AtomicUsize::new(0));
        let ctx = StreamContext::new(ChangeId::new(), CountingStream::new(b"payload", drops));

        let mut first = ctx.lease().unwrap();
        let mut head = [0u8; 3];
        first.read_exact(&mut head).await.unwrap();
        drop(first);

        let mut second = ctx.lease().unwrap();
        let mut content = Vec::new();
        second.read_to_end(&mut content).await.unwrap();
        assert_eq!(content, b"payload");
    }

    #[test]
    fn test_only_one_lease_at_a_time() {
        let drops = Arc::new(AtomicUsize::new(0));
        let ctx = StreamContext::new(ChangeId::new(), CountingStream::new(b"x", drops));

        let lease = ctx.lease().unwrap();
        assert!(ctx.is_leased());
        assert!(ctx.lease().is_none());

        drop(lease);
        assert!(!ctx.is_leased());
        assert!(ctx.lease().is_some());
    }

    #[test]
    fn test_dispose_releases_exactly_once() {
        let drops = Arc::new(AtomicUsize::new(0));
        let ctx = StreamContext::new(ChangeId::new(), CountingStream::new(b"x", drops.clone()));

        assert!(ctx.dispose());
        assert!(!ctx.dispose());
        drop(ctx);

        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_disposes() {
        let drops = Arc::new(AtomicUsize::new(0));
        let ctx = StreamContext::new(ChangeId::new(), CountingStream::new(b"x", drops.clone()));
        drop(ctx);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_dispose_while_leased_defers_to_lease_drop() {
        let drops = Arc::new(AtomicUsize::new(0));
        let ctx = StreamContext::new(ChangeId::new(), CountingStream::new(b"x", drops.clone()));

        let lease = ctx.lease().unwrap();
        assert!(ctx.dispose());
        assert_eq!(drops.load(Ordering::SeqCst), 0);

        drop(lease);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
        assert!(ctx.lease().is_none());

        drop(ctx);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_lease_after_dispose_is_none() {
        let drops = Arc::new(AtomicUsize::new(0));
        let ctx = StreamContext::new(ChangeId::new(), CountingStream::new(b"x", drops));
        ctx.dispose();
        assert!(ctx.is_disposed());
        assert!(ctx.lease().is_none());
    }
}
