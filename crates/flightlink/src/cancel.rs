use std::future::Future;

use async_channel::{Receiver, Sender, bounded};
use futures_lite::future;

/// Cooperative cancellation shared by the loops of one session.
///
/// Cancelling closes an internal channel that is never written to, which wakes
/// every task parked in [`StopToken::cancelled`]. Clones observe the same
/// cancellation.
#[derive(Clone, Debug)]
pub struct StopToken {
    sender: Sender<()>,
    receiver: Receiver<()>,
}

impl Default for StopToken {
    fn default() -> Self {
        Self::new()
    }
}

impl StopToken {
    /// Creates a token that is not cancelled.
    pub fn new() -> Self {
        let (sender, receiver) = bounded(1);
        Self { sender, receiver }
    }

    /// Cancels the token. Returns `true` if this call did the cancelling.
    pub fn cancel(&self) -> bool {
        self.sender.close()
    }

    /// Returns true once [`StopToken::cancel`] has been called on any clone.
    pub fn is_cancelled(&self) -> bool {
        self.sender.is_closed()
    }

    /// Completes once the token is cancelled.
    pub async fn cancelled(&self) {
        // Nothing is ever sent, so this only returns when the channel closes.
        let _ = self.receiver.recv().await;
    }

    /// Runs `task` to completion unless the token is cancelled first.
    ///
    /// Cancellation wins if both are ready.
    pub async fn run_until_cancelled<F: Future>(&self, task: F) -> Option<F::Output> {
        future::or(
            async {
                self.cancelled().await;
                None
            },
            async { Some(task.await) },
        )
        .await
    }

    /// Sleeps for `duration`. Returns `false` if cancelled before it elapsed.
    pub async fn sleep(&self, duration: std::time::Duration) -> bool {
        self.run_until_cancelled(async_std::task::sleep(duration))
            .await
            .is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    #[test]
    fn clones_share_cancellation() {
        let token = StopToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());

        assert!(token.cancel());
        assert!(clone.is_cancelled());
        // Second cancel is a no-op
        assert!(!clone.cancel());
    }

    #[test]
    fn cancellation_interrupts_pending_work() {
        let token = StopToken::new();
        token.cancel();

        let outcome = future::block_on(token.run_until_cancelled(future::pending::<()>()));
        assert_eq!(outcome, None);
    }

    #[test]
    fn sleep_returns_early_when_cancelled() {
        let token = StopToken::new();
        let canceller = token.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            canceller.cancel();
        });

        let started = Instant::now();
        let completed = future::block_on(token.sleep(Duration::from_secs(30)));
        assert!(!completed);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn uncancelled_work_completes() {
        let token = StopToken::new();
        let outcome = future::block_on(token.run_until_cancelled(async { 7 }));
        assert_eq!(outcome, Some(7));
        assert!(future::block_on(token.sleep(Duration::from_millis(1))));
    }
}
