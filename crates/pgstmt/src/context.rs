//! Cancellation and deadlines for statement execution.
//!
//! Every context-carrying operation runs its I/O under a [`Context`]. When the context's
//! deadline passes the operation fails with [`StmtError::DeadlineExceeded`]; when one of
//! its cancel handles fires it fails with [`StmtError::Cancelled`]. The in-flight driver
//! future is dropped in both cases.
//!
//! Context-free convenience methods use [`Context::background`], which never expires.
//!
//! # Example
//!
//! ```ignore
//! use pgstmt::Context;
//! use std::time::Duration;
//!
//! let (ctx, cancel) = Context::background().with_timeout(Duration::from_secs(5)).with_cancel();
//! tokio::spawn(async move { shutdown_signal().await; cancel.cancel(); });
//! let n = stmt.load_context(&ctx, &mut users).await?;
//! ```

use crate::error::{StmtError, StmtResult};
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

/// Deadline plus cancellation signals, cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct Context {
    deadline: Option<Instant>,
    cancels: Vec<watch::Receiver<bool>>,
}

/// Cancels every context derived from the one that created it.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: std::sync::Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

impl Context {
    /// A context with no deadline that is never cancelled.
    pub fn background() -> Self {
        Self::default()
    }

    /// Derive a context whose deadline is at most `timeout` from now.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Derive a context with an extra timeout when one is configured.
    pub fn with_optional_timeout(&self, timeout: Option<Duration>) -> Self {
        match timeout {
            Some(t) => self.with_timeout(t),
            None => self.clone(),
        }
    }

    /// Derive a context whose deadline is the earlier of its own and `at`.
    pub fn with_deadline(&self, at: Instant) -> Self {
        let deadline = match self.deadline {
            Some(current) if current <= at => current,
            _ => at,
        };
        Self {
            deadline: Some(deadline),
            cancels: self.cancels.clone(),
        }
    }

    /// Derive a cancellable context. Cancelling the handle does not affect `self`.
    pub fn with_cancel(&self) -> (Self, CancelHandle) {
        let (tx, rx) = watch::channel(false);
        let mut cancels = self.cancels.clone();
        cancels.push(rx);
        (
            Self {
                deadline: self.deadline,
                cancels,
            },
            CancelHandle {
                tx: std::sync::Arc::new(tx),
            },
        )
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancels.iter().any(|rx| *rx.borrow())
    }

    /// Fail fast if the context is already done.
    pub fn check(&self) -> StmtResult<()> {
        if self.is_cancelled() {
            return Err(StmtError::Cancelled);
        }
        if matches!(self.deadline, Some(at) if at <= Instant::now()) {
            return Err(StmtError::DeadlineExceeded);
        }
        Ok(())
    }

    /// Run `fut` under this context.
    pub async fn run<T, F>(&self, fut: F) -> StmtResult<T>
    where
        F: Future<Output = StmtResult<T>>,
    {
        self.check()?;

        let work = async {
            match self.deadline {
                Some(at) => tokio::time::timeout_at(at, fut)
                    .await
                    .map_err(|_| StmtError::DeadlineExceeded)?,
                None => fut.await,
            }
        };

        tokio::select! {
            biased;
            _ = self.cancelled() => Err(StmtError::Cancelled),
            result = work => result,
        }
    }

    /// Resolves once any cancel handle fires; never resolves otherwise.
    async fn cancelled(&self) {
        if self.cancels.is_empty() {
            return std::future::pending().await;
        }
        let waits = self.cancels.iter().cloned().map(|mut rx| {
            Box::pin(async move {
                if rx.wait_for(|cancelled| *cancelled).await.is_err() {
                    // Handle dropped without cancelling: this signal can never fire.
                    std::future::pending::<()>().await;
                }
            })
        });
        futures_util::future::select_all(waits).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn background_runs_to_completion() {
        let ctx = Context::background();
        let v = ctx.run(async { Ok::<_, StmtError>(7) }).await.unwrap();
        assert_eq!(v, 7);
        assert!(ctx.deadline().is_none());
    }

    #[tokio::test]
    async fn deadline_aborts_slow_work() {
        let ctx = Context::background().with_timeout(Duration::from_millis(20));
        let err = ctx
            .run(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, StmtError>(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StmtError::DeadlineExceeded));
    }

    #[tokio::test]
    async fn cancel_aborts_in_flight_work() {
        let (ctx, handle) = Context::background().with_cancel();
        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            handle.cancel();
        });
        let err = ctx
            .run(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, StmtError>(())
            })
            .await
            .unwrap_err();
        canceller.await.unwrap();
        assert!(matches!(err, StmtError::Cancelled));
    }

    #[tokio::test]
    async fn already_cancelled_fails_before_running() {
        let (ctx, handle) = Context::background().with_cancel();
        handle.cancel();
        let mut ran = false;
        let err = ctx
            .run(async {
                ran = true;
                Ok::<_, StmtError>(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StmtError::Cancelled));
        assert!(!ran);
    }

    #[test]
    fn earlier_deadline_wins() {
        let base = Context::background().with_timeout(Duration::from_millis(10));
        let derived = base.with_timeout(Duration::from_secs(60));
        assert_eq!(derived.deadline(), base.deadline());
        assert_eq!(base.with_optional_timeout(None).deadline(), base.deadline());
    }

    #[test]
    fn cancelling_a_child_leaves_the_parent_alone() {
        let (parent, _parent_handle) = Context::background().with_cancel();
        let (child, child_handle) = parent.with_cancel();
        child_handle.cancel();
        assert!(child.is_cancelled());
        assert!(!parent.is_cancelled());
    }

    #[tokio::test]
    async fn dropped_handle_never_cancels() {
        let (ctx, handle) = Context::background().with_cancel();
        drop(handle);
        let v = ctx.run(async { Ok::<_, StmtError>(1) }).await.unwrap();
        assert_eq!(v, 1);
    }
}
