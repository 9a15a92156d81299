//! Admission gate: bounds how many API operations are in flight at once.
//!
//! `ApiLock` is a scoped handle over one admission slot:
//! - `acquire()` waits for a free slot; no-op if the handle already holds one
//! - `release()` gives the slot back and wakes one waiter; no-op if not held
//! - dropping the handle releases, so `?`, panics and dropped futures all
//!   return the slot
//!
//! Waiters are woken one permit at a time by the semaphore. No ordering is
//! promised to callers beyond "every waiter proceeds once slots free up".

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, TryAcquireError};

use crate::coordination::Coordination;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum GateError {
    #[error("admission gate closed")]
    Closed,
}

/// Handle on one admission slot of a `Coordination`.
#[must_use = "dropping an ApiLock releases its slot immediately"]
pub struct ApiLock {
    coordination: Arc<Coordination>,
    permit: Option<OwnedSemaphorePermit>,
}

impl ApiLock {
    /// Create a handle that does not hold a slot yet.
    pub fn new(coordination: Arc<Coordination>) -> Self {
        Self {
            coordination,
            permit: None,
        }
    }

    pub fn is_held(&self) -> bool {
        self.permit.is_some()
    }

    /// Wait for a free slot and take it.
    ///
    /// Cancel-safe: if the returned future is dropped before completing, the
    /// handle stays unheld and can still be released or dropped.
    pub async fn acquire(&mut self) -> Result<(), GateError> {
        if self.permit.is_some() {
            return Ok(());
        }

        let permit = Arc::clone(&self.coordination.slots)
            .acquire_owned()
            .await
            .map_err(|_| GateError::Closed)?;
        self.permit = Some(permit);

        tracing::trace!(
            in_flight = self.coordination.in_flight(),
            max_parallel = self.coordination.max_parallel(),
            "API slot acquired"
        );
        Ok(())
    }

    /// Take a slot only if one is free right now.
    pub fn try_acquire(&mut self) -> Result<bool, GateError> {
        if self.permit.is_some() {
            return Ok(true);
        }

        match Arc::clone(&self.coordination.slots).try_acquire_owned() {
            Ok(permit) => {
                self.permit = Some(permit);
                Ok(true)
            }
            Err(TryAcquireError::NoPermits) => Ok(false),
            Err(TryAcquireError::Closed) => Err(GateError::Closed),
        }
    }

    pub fn release(&mut self) {
        if let Some(permit) = self.permit.take() {
            drop(permit);
            tracing::trace!(
                in_flight = self.coordination.in_flight(),
                max_parallel = self.coordination.max_parallel(),
                "API slot released"
            );
        }
    }
}

impl Drop for ApiLock {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for ApiLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiLock")
            .field("held", &self.is_held())
            .finish_non_exhaustive()
    }
}

impl Coordination {
    /// Create a handle and wait for it to be admitted.
    pub async fn begin(self: &Arc<Self>) -> Result<ApiLock, GateError> {
        let mut lock = ApiLock::new(Arc::clone(self));
        lock.acquire().await?;
        Ok(lock)
    }

    /// Run `op` inside an admission slot, releasing it however `op` ends.
    pub async fn with_slot<F, Fut, T>(self: &Arc<Self>, op: F) -> Result<T, GateError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let _lock = self.begin().await?;
        Ok(op().await)
    }
}
