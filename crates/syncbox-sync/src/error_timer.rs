//! Shared download-error timer
//!
//! Download failures across many queue entries are folded into a single
//! delayed re-drive. The first [`trigger`](DownloadErrorTimer::trigger) arms
//! the timer; further triggers while it is armed are absorbed. When the delay
//! elapses the timer fires once, bumps its fire counter, and re-arms on the
//! next trigger.
//!
//! ```text
//!  trigger ──► armed ──(delay)──► fired (count += 1) ──► idle
//!                 ▲      │
//!   trigger ──────┘      └── cancel ──► cancelled (terminal)
//! ```
//!
//! Listeners observe fires through a `tokio::sync::watch` channel.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

struct TimerInner {
    delay: Duration,
    armed: AtomicBool,
    cancel: CancellationToken,
    fired: watch::Sender<u64>,
}

/// Coalescing timer shared by every download entry of a processing queue
///
/// Cloning yields another handle to the same timer.
#[derive(Clone)]
pub struct DownloadErrorTimer {
    inner: Arc<TimerInner>,
}

impl DownloadErrorTimer {
    /// Creates an idle timer with the given delay
    pub fn new(delay: Duration) -> Self {
        let (fired, _) = watch::channel(0);
        Self {
            inner: Arc::new(TimerInner {
                delay,
                armed: AtomicBool::new(false),
                cancel: CancellationToken::new(),
                fired,
            }),
        }
    }

    /// Returns the configured delay
    pub fn delay(&self) -> Duration {
        self.inner.delay
    }

    /// Records a download failure
    ///
    /// Returns `true` if this call armed the timer, `false` if it was folded
    /// into an already pending fire (or the timer is cancelled, or no Tokio
    /// runtime is available).
    pub fn trigger(&self) -> bool {
        if self.inner.cancel.is_cancelled() {
            return false;
        }
        if self.inner.armed.swap(true, Ordering::AcqRel) {
            debug!("Download error coalesced into pending re-drive");
            return false;
        }

        let Ok(runtime) = Handle::try_current() else {
            self.inner.armed.store(false, Ordering::Release);
            warn!("No async runtime; download error timer not armed");
            return false;
        };

        debug!(
            delay_ms = self.inner.delay.as_millis() as u64,
            "Arming download error timer"
        );

        let inner = Arc::clone(&self.inner);
        runtime.spawn(async move {
            tokio::select! {
                _ = inner.cancel.cancelled() => {
                    inner.armed.store(false, Ordering::Release);
                    debug!("Download error timer cancelled before firing");
                }
                _ = tokio::time::sleep(inner.delay) => {
                    inner.armed.store(false, Ordering::Release);
                    inner.fired.send_modify(|count| *count += 1);
                    info!(fires = *inner.fired.borrow(), "Download error timer fired");
                }
            }
        });
        true
    }

    /// Subscribes to fire notifications
    ///
    /// The channel value is the total number of fires so far.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.inner.fired.subscribe()
    }

    /// Number of times the timer has fired
    pub fn fire_count(&self) -> u64 {
        *self.inner.fired.borrow()
    }

    /// Returns true while a fire is pending
    pub fn is_armed(&self) -> bool {
        self.inner.armed.load(Ordering::Acquire)
    }

    /// Stops the timer for good: a pending fire is dropped and later
    /// triggers are ignored
    pub fn cancel(&self) {
        self.inner.cancel.cancel();
    }

    /// Returns true once [`cancel`](Self::cancel) was called
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }
}

impl std::fmt::Debug for DownloadErrorTimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadErrorTimer")
            .field("delay", &self.inner.delay)
            .field("armed", &self.is_armed())
            .field("fires", &self.fire_count())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
