//! Execution scopes bounding each store round-trip.
//!
//! Every repository operation opens one [`ExecutionContext`] and runs its store calls
//! through [`ExecutionContext::run`]. A context derived from a [`Configuration`] carries a
//! deadline and owns its cancellation; dropping it releases the scope, so every exit
//! path of an operation releases it too. A transactional context wraps a session owned
//! by the caller. It has no deadline of its own, and cancelling it does nothing.

use std::{
    any::Any,
    fmt::Debug,
    future::Future,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use tokio::{sync::Notify, time::Instant};
use tracing::debug;

use crate::{
    config::Configuration,
    error::{DocumentStoreError, DocumentStoreResult},
};

/// A store session supplied by the caller for transactional work.
///
/// Backends downcast the session through [`TransactionSession::as_any`] to reach their
/// native handle.
pub trait TransactionSession: Send + Sync + Debug {
    fn as_any(&self) -> &dyn Any;
}

pub type SessionHandle = Arc<dyn TransactionSession>;

#[derive(Debug, Default)]
struct CancelState {
    cancelled: AtomicBool,
    notify: Notify,
}

/// Cancels the context it was taken from, from any task.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    state: Arc<CancelState>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        if !self.state.cancelled.swap(true, Ordering::AcqRel) {
            self.state.notify.notify_waiters();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::Acquire)
    }

    async fn cancelled(&self) {
        loop {
            let notified = self.state.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

#[derive(Debug)]
pub struct ExecutionContext {
    timeout: Option<Duration>,
    deadline: Option<Instant>,
    cancel: Option<CancelHandle>,
    session: Option<SessionHandle>,
}

impl ExecutionContext {
    /// Derives a scope from `configuration`.
    ///
    /// Without a configuration, or with a zero timeout, the scope has no deadline but can
    /// still be cancelled. Otherwise it expires `query_timeout` after this call.
    pub fn from_configuration(configuration: Option<&Configuration>) -> Self {
        match configuration.map(Configuration::query_timeout) {
            Some(timeout) if !timeout.is_zero() => Self::with_timeout(timeout),
            _ => Self::background(),
        }
    }

    /// A cancellable scope without a deadline.
    pub fn background() -> Self {
        Self {
            timeout: None,
            deadline: None,
            cancel: Some(CancelHandle::default()),
            session: None,
        }
    }

    /// A cancellable scope expiring `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            deadline: Some(Instant::now() + timeout),
            cancel: Some(CancelHandle::default()),
            session: None,
        }
    }

    /// Adapts a caller-owned session. Cancellation is a no-op.
    pub fn transactional(session: SessionHandle) -> Self {
        Self {
            timeout: None,
            deadline: None,
            cancel: None,
            session: Some(session),
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn session(&self) -> Option<&SessionHandle> {
        self.session.as_ref()
    }

    pub fn is_transactional(&self) -> bool {
        self.session.is_some()
    }

    /// A handle able to cancel this scope, or `None` for a transactional scope.
    pub fn cancel_handle(&self) -> Option<CancelHandle> {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        if let Some(handle) = &self.cancel {
            handle.cancel();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancelHandle::is_cancelled)
    }

    /// Runs `operation` within this scope.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::Cancelled`] if the scope is or becomes cancelled and
    /// [`DocumentStoreError::DeadlineExceeded`] once the deadline passes; otherwise the
    /// result of `operation`.
    pub async fn run<F, T>(&self, operation: F) -> DocumentStoreResult<T>
    where
        F: Future<Output = DocumentStoreResult<T>>,
    {
        if self.is_cancelled() {
            return Err(DocumentStoreError::Cancelled);
        }

        let guarded = async {
            match &self.cancel {
                Some(handle) => tokio::select! {
                    result = operation => result,
                    _ = handle.cancelled() => {
                        debug!("execution context cancelled");
                        Err(DocumentStoreError::Cancelled)
                    }
                },
                None => operation.await,
            }
        };

        match (self.deadline, self.timeout) {
            (Some(deadline), Some(timeout)) => match tokio::time::timeout_at(deadline, guarded).await {
                Ok(result) => result,
                Err(_) => {
                    debug!(?timeout, "execution context deadline exceeded");
                    Err(DocumentStoreError::DeadlineExceeded(timeout))
                }
            },
            _ => guarded.await,
        }
    }
}

impl Drop for ExecutionContext {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct FakeSession;

    impl TransactionSession for FakeSession {
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[test]
    fn zero_timeout_has_no_deadline() {
        let configuration = Configuration::builder().with_timeout(Duration::ZERO).build();

        assert!(ExecutionContext::from_configuration(Some(&configuration)).deadline().is_none());
        assert!(ExecutionContext::from_configuration(None).deadline().is_none());
    }

    #[test]
    fn configured_timeout_sets_a_deadline() {
        let configuration = Configuration::builder().with_timeout(Duration::from_secs(5)).build();
        let context = ExecutionContext::from_configuration(Some(&configuration));

        assert!(context.deadline().is_some_and(|deadline| deadline > Instant::now()));
    }

    #[tokio::test]
    async fn slow_operation_exceeds_deadline() {
        let context = ExecutionContext::with_timeout(Duration::from_millis(10));

        let result = context
            .run(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;

        assert_eq!(result, Err(DocumentStoreError::DeadlineExceeded(Duration::from_millis(10))));
    }

    #[tokio::test]
    async fn cancel_handle_aborts_in_flight_operation() {
        let context = ExecutionContext::background();
        let handle = context.cancel_handle().unwrap();

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            handle.cancel();
        });

        let result = context
            .run(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(1)
            })
            .await;

        canceller.await.unwrap();
        assert_eq!(result, Err(DocumentStoreError::Cancelled));
    }

    #[tokio::test]
    async fn dropping_the_context_releases_it() {
        let context = ExecutionContext::background();
        let handle = context.cancel_handle().unwrap();

        drop(context);

        assert!(handle.is_cancelled());
    }

    #[tokio::test]
    async fn transactional_cancel_is_a_no_op() {
        let context = ExecutionContext::transactional(Arc::new(FakeSession));
        context.cancel();

        assert!(context.cancel_handle().is_none());
        assert!(!context.is_cancelled());
        assert!(context.session().unwrap().as_any().is::<FakeSession>());
        assert_eq!(context.run(async { Ok(7) }).await, Ok(7));
    }
}
