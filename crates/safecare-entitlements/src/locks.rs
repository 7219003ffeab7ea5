//! Per-principal critical sections
//!
//! Every mutating operation (transition, reserve, release) for one principal
//! runs inside the same exclusive section, which is what makes the
//! read-check-increment protocol atomic and keeps transitions from landing
//! in the middle of a reservation. Distinct principals never contend.

use dashmap::DashMap;
use safecare_common::PrincipalId;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

pub(crate) struct PrincipalLocks {
    locks: DashMap<PrincipalId, Arc<Mutex<()>>>,
}

impl PrincipalLocks {
    pub(crate) fn new() -> Self {
        Self {
            locks: DashMap::new(),
        }
    }

    /// Acquire the exclusive section for a principal
    ///
    /// The guard is owned so the apply step of a transition can carry it
    /// into a spawned task and run to completion even if the caller goes
    /// away. Cancellation while still waiting here has no effect on state.
    pub(crate) async fn acquire(&self, principal: PrincipalId) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .entry(principal)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }
}
