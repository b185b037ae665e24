//! Caller-supplied cancellation and deadline for one fetch or request.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Why a suspension point returned early.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Interrupted {
    #[error("context canceled")]
    Cancelled,
    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

/// Cancellation token plus optional deadline.
///
/// Clones share the same token, so cancelling any clone cancels them all.
/// Use [`FetchContext::child`] for a context that can be cancelled on its own.
#[derive(Debug, Clone, Default)]
pub struct FetchContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl FetchContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keeps the earlier of the existing and the new deadline.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(current) => current.min(deadline),
            None => deadline,
        });
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn with_token(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Fails if the context is already cancelled or past its deadline.
    pub fn check(&self) -> Result<(), Interrupted> {
        if self.token.is_cancelled() {
            return Err(Interrupted::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(Interrupted::DeadlineExceeded),
            _ => Ok(()),
        }
    }

    /// Drives `future` until it completes, the token fires, or the deadline passes.
    pub async fn run<F>(&self, future: F) -> Result<F::Output, Interrupted>
    where
        F: Future,
    {
        self.check()?;

        let deadline = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(Interrupted::Cancelled),
            _ = deadline => Err(Interrupted::DeadlineExceeded),
            output = future => Ok(output),
        }
    }

    /// Cancellable sleep used for retry backoff.
    pub async fn sleep(&self, duration: Duration) -> Result<(), Interrupted> {
        self.run(tokio::time::sleep(duration)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn run_returns_output_when_future_finishes_first() {
        let ctx = FetchContext::new();
        let value = ctx.run(async { 7 }).await;
        assert_eq!(value, Ok(7));
    }

    #[tokio::test]
    async fn cancelled_context_interrupts_sleep() {
        let ctx = FetchContext::new();
        let canceller = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            canceller.cancel();
        });

        let started = std::time::Instant::now();
        let result = ctx.sleep(Duration::from_secs(5)).await;

        assert_eq!(result, Err(Interrupted::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn deadline_interrupts_pending_future() {
        let ctx = FetchContext::new().with_timeout(Duration::from_millis(20));
        let result = ctx.run(std::future::pending::<()>()).await;
        assert_eq!(result, Err(Interrupted::DeadlineExceeded));
    }

    #[test]
    fn earlier_deadline_wins() {
        let now = Instant::now();
        let ctx = FetchContext::new()
            .with_deadline(now + Duration::from_secs(1))
            .with_deadline(now + Duration::from_secs(10));
        assert_eq!(ctx.deadline(), Some(now + Duration::from_secs(1)));
    }

    #[test]
    fn child_cancellation_does_not_reach_parent() {
        let parent = FetchContext::new();
        let child = parent.child();

        child.cancel();
        assert_eq!(child.check(), Err(Interrupted::Cancelled));
        assert_eq!(parent.check(), Ok(()));

        parent.cancel();
        assert!(parent.child().is_cancelled());
    }
}
