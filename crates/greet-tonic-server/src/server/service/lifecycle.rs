//! Drain/cancel coordination for in-flight calls.
//!
//! [`ServiceState`] is the one piece of state shared across calls: a
//! service-wide [`CancellationToken`] that per-call tokens derive from, an
//! in-flight stream counter, and a draining flag. Shutdown proceeds in
//! phases: stop accepting new calls, wait (bounded) for in-flight streams to
//! drain, then cancel whatever remains.

use core::time::Duration;
use portable_atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

/// Shared lifecycle state for a running service instance.
pub struct ServiceState {
    shutdown_token: CancellationToken,
    draining: AtomicBool,
    streams_inflight: AtomicUsize,
}

impl ServiceState {
    pub fn new() -> Self {
        Self {
            shutdown_token: CancellationToken::new(),
            draining: AtomicBool::new(false),
            streams_inflight: AtomicUsize::new(0),
        }
    }

    /// Derives the cancellation token for a single call.
    ///
    /// Child tokens fire when the service-wide token is cancelled, so every
    /// suspension point selecting on one observes shutdown promptly.
    pub fn call_token(&self) -> CancellationToken {
        self.shutdown_token.child_token()
    }

    /// Whether the service has stopped accepting new calls.
    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::SeqCst)
    }

    pub fn streams_inflight(&self) -> usize {
        self.streams_inflight.load(Ordering::Relaxed)
    }

    /// Registers a streaming call as in-flight until the returned guard is
    /// dropped. Guard-based so a handler future dropped mid-call cannot leak
    /// the count.
    pub fn begin_stream(self: &Arc<Self>) -> StreamGuard {
        self.streams_inflight.fetch_add(1, Ordering::Relaxed);
        StreamGuard(Arc::clone(self))
    }

    /// Gracefully winds the service down.
    ///
    /// - Flips the draining flag so new calls are refused.
    /// - Waits up to `drain_timeout` for in-flight streams to finish.
    /// - Cancels the service-wide token; calls still running observe it at
    ///   their next suspension point and end with a `Cancelled` status.
    pub async fn shutdown(&self, drain_timeout: Duration) {
        // === Phase 0: Stop accepting new requests ===
        #[cfg(feature = "tracing")]
        tracing::info!("Refusing new requests");
        self.draining.store(true, Ordering::SeqCst);

        // === Phase 1: Wait for in-flight streams to drain ===
        #[cfg(feature = "tracing")]
        tracing::info!(
            "Draining in-flight streams ({} active)",
            self.streams_inflight()
        );
        let drain_result = timeout(drain_timeout, async {
            while self.streams_inflight() > 0 {
                sleep(Duration::from_millis(100)).await;
            }
        })
        .await;

        match drain_result {
            Ok(()) => {
                #[cfg(feature = "tracing")]
                tracing::debug!("All in-flight streams drained successfully");
            }
            Err(_) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(
                    "Graceful drain timed out ({} streams still active)",
                    self.streams_inflight()
                );
            }
        }

        // === Phase 2: Cancel any remaining work ===
        #[cfg(feature = "tracing")]
        tracing::debug!("Cancelling remaining calls via shutdown token");
        self.shutdown_token.cancel();
    }
}

impl Default for ServiceState {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII in-flight marker for one streaming call.
pub struct StreamGuard(Arc<ServiceState>);

impl Drop for StreamGuard {
    fn drop(&mut self) {
        self.0.streams_inflight.fetch_sub(1, Ordering::Relaxed);
    }
}
