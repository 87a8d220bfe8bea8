//! # engine::lifecycle
//!
//! [`LifecycleToken`], the cancellation token shared between a scheduler /
//! probe handle and the tasks it spawned.
//!
//! Every state-mutating callback runs through [`LifecycleToken::run_if_live`].
//! The callback holds a read guard for its whole duration; [`LifecycleToken::cancel`]
//! takes the write guard, so once `cancel().await` returns no callback is
//! running and none will start.  The synchronous [`LifecycleToken::cancel_now`]
//! (used from `Drop`) cannot wait, but still flips the flag that every new
//! callback checks first.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::RwLock;

#[derive(Debug, Clone)]
pub struct LifecycleToken {
    cancelled: Arc<AtomicBool>,
    live:      Arc<RwLock<bool>>,
}

impl LifecycleToken {
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            live:      Arc::new(RwLock::new(true)),
        }
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Runs `callback` unless the token has been cancelled.
    ///
    /// Returns `None` when the callback was discarded.
    pub async fn run_if_live<F: Future>(&self, callback: F) -> Option<F::Output> {
        if self.is_cancelled() {
            return None;
        }
        let live = self.live.read().await;
        if !*live || self.is_cancelled() {
            return None;
        }
        Some(callback.await)
    }

    /// Cancels and waits until any callback currently running has returned.
    pub async fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        *self.live.write().await = false;
    }

    /// Non-blocking cancel for `Drop` paths.
    pub fn cancel_now(&self) {
        self.cancelled.store(true, Ordering::Release);
        if let Ok(mut live) = self.live.try_write() {
            *live = false;
        }
    }
}

impl Default for LifecycleToken {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[tokio::test]
    async fn test_callback_runs_while_live() {
        let token = LifecycleToken::new();
        assert_eq!(token.run_if_live(async { 7 }).await, Some(7));
    }

    #[tokio::test]
    async fn test_callback_discarded_after_cancel() {
        let token = LifecycleToken::new();
        token.cancel().await;
        assert!(token.is_cancelled());
        assert_eq!(token.run_if_live(async { 7 }).await, None);

        let other = LifecycleToken::new();
        other.cancel_now();
        assert_eq!(other.run_if_live(async { 7 }).await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_waits_for_running_callback() {
        let token = LifecycleToken::new();
        let done = Arc::new(AtomicUsize::new(0));

        let running = {
            let token = token.clone();
            let done = done.clone();
            tokio::spawn(async move {
                token
                    .run_if_live(async {
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        done.fetch_add(1, Ordering::SeqCst);
                    })
                    .await
            })
        };

        // Let the callback acquire its guard before cancelling.
        tokio::time::sleep(Duration::from_millis(10)).await;
        token.cancel().await;
        assert_eq!(done.load(Ordering::SeqCst), 1);
        assert_eq!(running.await.unwrap(), Some(()));
    }
}
