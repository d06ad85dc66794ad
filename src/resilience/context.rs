//! Request cancellation and deadline context.
//!
//! # Responsibilities
//! - Carry a cancellation signal with every request
//! - Derive children bound to a deadline
//! - Report *why* a context finished (deadline vs. cancellation)
//!
//! # Design Decisions
//! - Built on `tokio_util::sync::CancellationToken`; children use child tokens
//! - Deadlines are observed lazily, no timer task is spawned per context
//! - The first recorded cause wins; children fall back to the parent's cause

use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Reason a [`Context`] is done.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ContextError {
    /// Cancelled explicitly, or its parent was.
    #[error("context canceled")]
    Canceled,
    /// The deadline passed.
    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

/// Cancellation/deadline context attached to a request.
///
/// Cloning is cheap; every clone observes and controls the same context.
#[derive(Debug, Clone)]
pub struct Context {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    token: CancellationToken,
    cause: OnceLock<ContextError>,
    deadline: Option<Instant>,
    parent: Option<Context>,
}

impl Inner {
    fn finish(&self, cause: ContextError) {
        let _ = self.cause.set(cause);
        self.token.cancel();
    }
}

impl Context {
    /// Create a root context that is only done once cancelled.
    pub fn new() -> Self {
        Self::from_parts(CancellationToken::new(), None, None)
    }

    fn from_parts(token: CancellationToken, deadline: Option<Instant>, parent: Option<Context>) -> Self {
        Self {
            inner: Arc::new(Inner {
                token,
                cause: OnceLock::new(),
                deadline,
                parent,
            }),
        }
    }

    /// Derive a child that is cancelled together with `self`.
    pub fn child(&self) -> Self {
        Self::from_parts(
            self.inner.token.child_token(),
            self.inner.deadline,
            Some(self.clone()),
        )
    }

    /// Derive a child whose deadline is `dt` from now.
    ///
    /// A `dt` past the range of `Instant` sets no deadline of its own; the
    /// child then ends only with its parent.
    pub fn with_timeout(&self, dt: Duration) -> Self {
        match Instant::now().checked_add(dt) {
            Some(at) => self.with_deadline(at),
            None => self.child(),
        }
    }

    /// Derive a child with the given deadline.
    ///
    /// An earlier deadline inherited from `self` is kept.
    pub fn with_deadline(&self, at: Instant) -> Self {
        let deadline = match self.inner.deadline {
            Some(parent) if parent <= at => parent,
            _ => at,
        };
        Self::from_parts(self.inner.token.child_token(), Some(deadline), Some(self.clone()))
    }

    /// The point in time at which this context expires, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.inner.deadline
    }

    /// Cancel this context and all of its children.
    pub fn cancel(&self) {
        self.inner.finish(ContextError::Canceled);
    }

    /// Finish this context as if its deadline had passed.
    pub fn expire(&self) {
        self.inner.finish(ContextError::DeadlineExceeded);
    }

    /// Why the context is done, or `None` while it is still live.
    pub fn err(&self) -> Option<ContextError> {
        if let Some(cause) = self.inner.cause.get() {
            return Some(*cause);
        }
        if self.inner.token.is_cancelled() {
            let inherited = self.inner.parent.as_ref().and_then(Context::err);
            return Some(inherited.unwrap_or(ContextError::Canceled));
        }
        match self.inner.deadline {
            Some(at) if Instant::now() >= at => {
                self.inner.finish(ContextError::DeadlineExceeded);
                self.err()
            }
            _ => None,
        }
    }

    /// Returns true once the context is cancelled or expired.
    pub fn is_done(&self) -> bool {
        self.err().is_some()
    }

    /// Wait until the context is done.
    ///
    /// When the deadline is what ends the wait, the context's token is
    /// cancelled before this returns.
    pub async fn done(&self) {
        match self.inner.deadline {
            Some(at) => {
                tokio::select! {
                    _ = self.inner.token.cancelled() => {}
                    _ = tokio::time::sleep_until(at) => {
                        self.inner.finish(ContextError::DeadlineExceeded);
                    }
                }
            }
            None => self.inner.token.cancelled().await,
        }
    }

    /// Token cancelled when this context is done, for downstream I/O.
    pub fn token(&self) -> CancellationToken {
        self.inner.token.clone()
    }

    /// Guard that cancels the context when dropped.
    pub fn cancel_on_drop(&self) -> CancelGuard {
        CancelGuard { ctx: self.clone() }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

/// Cancels its context on drop.
#[derive(Debug)]
pub struct CancelGuard {
    ctx: Context,
}

impl Drop for CancelGuard {
    fn drop(&mut self) {
        self.ctx.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_context_is_live_until_cancelled() {
        let ctx = Context::new();
        assert_eq!(ctx.err(), None);
        assert!(ctx.deadline().is_none());

        ctx.cancel();
        assert_eq!(ctx.err(), Some(ContextError::Canceled));
        assert!(ctx.token().is_cancelled());
    }

    #[test]
    fn first_cause_wins() {
        let ctx = Context::new();
        ctx.expire();
        ctx.cancel();
        assert_eq!(ctx.err(), Some(ContextError::DeadlineExceeded));
    }

    #[test]
    fn child_reports_parent_cause() {
        let parent = Context::new();
        let child = parent.child();
        let grandchild = child.with_timeout(Duration::from_secs(60));

        parent.expire();
        assert_eq!(child.err(), Some(ContextError::DeadlineExceeded));
        assert_eq!(grandchild.err(), Some(ContextError::DeadlineExceeded));
    }

    #[test]
    fn cancelling_a_child_leaves_the_parent_alone() {
        let parent = Context::new();
        let child = parent.child();
        child.cancel();
        assert_eq!(child.err(), Some(ContextError::Canceled));
        assert_eq!(parent.err(), None);
    }

    #[test]
    fn earlier_parent_deadline_is_kept() {
        let parent = Context::new().with_timeout(Duration::from_millis(10));
        let child = parent.with_timeout(Duration::from_secs(10));
        assert_eq!(child.deadline(), parent.deadline());
    }

    #[test]
    fn unrepresentable_timeout_sets_no_deadline() {
        let ctx = Context::new().with_timeout(Duration::MAX);
        assert!(ctx.deadline().is_none());
        assert_eq!(ctx.err(), None);

        let bounded = Context::new().with_timeout(Duration::from_secs(1));
        let child = bounded.with_timeout(Duration::MAX);
        assert_eq!(child.deadline(), bounded.deadline());

        bounded.cancel();
        assert_eq!(child.err(), Some(ContextError::Canceled));
    }

    #[tokio::test]
    async fn done_fires_at_deadline() {
        let ctx = Context::new().with_timeout(Duration::from_millis(20));
        let start = std::time::Instant::now();
        ctx.done().await;
        assert!(start.elapsed() >= Duration::from_millis(20));
        assert_eq!(ctx.err(), Some(ContextError::DeadlineExceeded));
        assert!(ctx.token().is_cancelled());
    }

    #[tokio::test]
    async fn err_observes_passed_deadline_without_waiting() {
        let ctx = Context::new().with_timeout(Duration::from_millis(5));
        tokio::time::sleep(Duration::from_millis(15)).await;
        assert_eq!(ctx.err(), Some(ContextError::DeadlineExceeded));
        assert!(ctx.token().is_cancelled());
    }

    #[tokio::test]
    async fn cancel_guard_cancels_on_drop() {
        let ctx = Context::new();
        {
            let _guard = ctx.cancel_on_drop();
        }
        ctx.done().await;
        assert_eq!(ctx.err(), Some(ContextError::Canceled));
    }
}
