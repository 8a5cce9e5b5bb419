//! Send serialization.
//!
//! The gateway accepts one in-flight application request at a time and
//! needs a settle time after each one. [`SendGate`] models that with a
//! single permit:
//!
//! ```text
//! disconnected ──mark_connected──> connected (1 permit)
//!      ^                               │
//!      └──────mark_disconnected────────┘  (takes the permit back,
//!                                          waiting for an in-flight send)
//! ```
//!
//! [`SendGate::run_exclusive`] holds the permit while its closure runs and
//! gives it back `settle` later on a background task, so the caller does not
//! wait for the settle delay.

use crate::error::{KnxError, Result};
use core::future::Future;
use core::time::Duration;
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};

/// One-permit gate with a connected/disconnected state.
#[derive(Debug)]
pub struct SendGate {
    permit: Arc<Semaphore>,
    connected: Mutex<bool>,
    settle: Duration,
}

impl SendGate {
    /// A disconnected gate releasing its permit `settle` after each send.
    pub fn new(settle: Duration) -> Self {
        Self {
            permit: Arc::new(Semaphore::new(0)),
            connected: Mutex::new(false),
            settle,
        }
    }

    /// Open the gate. No-op when already connected.
    pub async fn mark_connected(&self) {
        let mut connected = self.connected.lock().await;
        if !*connected {
            *connected = true;
            self.permit.add_permits(1);
        }
    }

    /// Close the gate, waiting for any in-flight send (and its settle delay)
    /// to finish. No-op when already disconnected.
    pub async fn mark_disconnected(&self) {
        let mut connected = self.connected.lock().await;
        if *connected {
            if let Ok(permit) = self.permit.acquire().await {
                permit.forget();
            }
            *connected = false;
        }
    }

    /// Check the connected flag
    pub async fn is_connected(&self) -> bool {
        *self.connected.lock().await
    }

    /// Run `send` while holding the permit.
    ///
    /// Callers queue in order while the permit is taken; the gate itself
    /// never drops a request. Fails only once [`SendGate::close`] was called.
    pub async fn run_exclusive<F, Fut, R>(&self, send: F) -> Result<R>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = R>,
    {
        let permit = Arc::clone(&self.permit)
            .acquire_owned()
            .await
            .map_err(|_| KnxError::connection_closed())?;

        let result = send().await;

        if self.settle.is_zero() {
            drop(permit);
        } else {
            let settle = self.settle;
            tokio::spawn(async move {
                tokio::time::sleep(settle).await;
                drop(permit);
            });
        }

        Ok(result)
    }

    /// Fail every pending and future [`SendGate::run_exclusive`].
    pub fn close(&self) {
        self.permit.close();
    }
}

impl Drop for SendGate {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::{timeout, Instant};

    #[tokio::test(start_paused = true)]
    async fn test_blocks_until_connected() {
        let gate = Arc::new(SendGate::new(Duration::ZERO));

        let pending = {
            let gate = Arc::clone(&gate);
            tokio::spawn(async move { gate.run_exclusive(|| async { 7 }).await })
        };
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(!pending.is_finished());

        gate.mark_connected().await;
        assert_eq!(pending.await.unwrap().unwrap(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mark_connected_is_idempotent() {
        let gate = SendGate::new(Duration::ZERO);
        gate.mark_connected().await;
        gate.mark_connected().await;
        assert_eq!(gate.permit.available_permits(), 1);

        gate.mark_disconnected().await;
        gate.mark_disconnected().await;
        assert_eq!(gate.permit.available_permits(), 0);
        assert!(!gate.is_connected().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_settle_delays_next_send() {
        let gate = SendGate::new(Duration::from_millis(200));
        gate.mark_connected().await;

        let start = Instant::now();
        gate.run_exclusive(|| async {}).await.unwrap();
        // caller does not wait for the settle delay
        assert_eq!(start.elapsed(), Duration::ZERO);

        gate.run_exclusive(|| async {}).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_settle_releases_immediately() {
        let gate = SendGate::new(Duration::ZERO);
        gate.mark_connected().await;
        gate.run_exclusive(|| async {}).await.unwrap();
        assert_eq!(gate.permit.available_permits(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sends_never_overlap() {
        let gate = Arc::new(SendGate::new(Duration::from_millis(10)));
        gate.mark_connected().await;
        let active = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..5)
            .map(|_| {
                let gate = Arc::clone(&gate);
                let active = Arc::clone(&active);
                tokio::spawn(async move {
                    gate.run_exclusive(move || async move {
                        assert_eq!(active.fetch_add(1, Ordering::SeqCst), 0);
                        tokio::time::sleep(Duration::from_millis(5)).await;
                        active.fetch_sub(1, Ordering::SeqCst);
                    })
                    .await
                })
            })
            .collect();

        for task in tasks {
            task.await.unwrap().unwrap();
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_send_after_mark_disconnected() {
        let gate = Arc::new(SendGate::new(Duration::ZERO));
        gate.mark_connected().await;
        gate.mark_disconnected().await;

        let ran = Arc::new(AtomicUsize::new(0));
        let attempt = {
            let ran = Arc::clone(&ran);
            gate.run_exclusive(|| async move {
                ran.fetch_add(1, Ordering::SeqCst);
            })
        };
        assert!(timeout(Duration::from_secs(60), attempt).await.is_err());
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mark_disconnected_waits_for_in_flight_send() {
        let gate = Arc::new(SendGate::new(Duration::from_millis(200)));
        gate.mark_connected().await;

        let sending = {
            let gate = Arc::clone(&gate);
            tokio::spawn(async move {
                gate.run_exclusive(|| tokio::time::sleep(Duration::from_millis(50)))
                    .await
            })
        };
        tokio::task::yield_now().await;

        let start = Instant::now();
        gate.mark_disconnected().await;
        // send (50ms) plus settle (200ms)
        assert!(start.elapsed() >= Duration::from_millis(250));
        sending.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_close_fails_waiters() {
        let gate = SendGate::new(Duration::ZERO);
        gate.close();
        let err = gate.run_exclusive(|| async {}).await.unwrap_err();
        assert!(matches!(err, KnxError::Connection(_)));
    }
}
