//! Plan Transitions
//!
//! Validates and applies plan changes. Payment authorization happens
//! upstream; by the time a transition reaches this coordinator it is assumed
//! pre-authorized. A transition is all-or-nothing: validation failures and
//! persistence failures both leave the prior tier active.

use crate::catalog::{PlanCatalog, PlanTier};
use crate::locks::PrincipalLocks;
use crate::store::EntitlementStore;
use chrono::Utc;
use safecare_common::{EngineError, EngineResult, PrincipalId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Result of a requested plan change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransitionOutcome {
    /// The new tier is durably active
    Applied {
        /// Tier before the change
        previous_tier: PlanTier,
        /// Tier now active
        new_tier: PlanTier,
        /// Whether the change moved up in capability
        is_upgrade: bool,
    },
    /// Target equals the current tier; nothing was touched
    Unchanged {
        /// The tier that stays active
        tier: PlanTier,
    },
}

/// Serialized apply path for plan changes
pub struct TransitionCoordinator {
    catalog: Arc<PlanCatalog>,
    store: Arc<EntitlementStore>,
    locks: Arc<PrincipalLocks>,
}

impl TransitionCoordinator {
    pub(crate) fn new(
        catalog: Arc<PlanCatalog>,
        store: Arc<EntitlementStore>,
        locks: Arc<PrincipalLocks>,
    ) -> Self {
        Self {
            catalog,
            store,
            locks,
        }
    }

    /// Move a principal to `target`
    ///
    /// Runs inside the principal's exclusive section, so a concurrent
    /// reservation either fully precedes or fully follows the change and
    /// never observes the new ceiling against a torn usage baseline. No
    /// quota re-check or eviction happens on downgrade; existing overage is
    /// tolerated and further growth stays blocked until usage drains.
    pub async fn transition(
        &self,
        principal: PrincipalId,
        target: PlanTier,
    ) -> EngineResult<TransitionOutcome> {
        // Validating
        self.catalog.definition_of(target)?;

        let section = self.locks.acquire(principal).await;
        let record = self.store.get(principal);

        if record.tier == target {
            tracing::debug!(%principal, tier = %target, "transition target equals active tier");
            return Ok(TransitionOutcome::Unchanged { tier: target });
        }

        let previous = record.tier;
        let is_upgrade = self.catalog.ordering(previous, target) == std::cmp::Ordering::Less;

        // Applying. The task owns the exclusive section, so once the durable
        // write starts it runs to completion; a caller cancelling mid-flight
        // detaches without rolling anything back.
        let store = self.store.clone();
        let apply = tokio::spawn(async move {
            let _held = section;
            store.set(principal, target, Some(previous), Utc::now()).await
        });
        apply
            .await
            .map_err(|e| EngineError::PersistenceUnavailable(format!("apply aborted: {e}")))??;

        tracing::info!(%principal, from = %previous, to = %target, is_upgrade, "plan transition applied");
        Ok(TransitionOutcome::Applied {
            previous_tier: previous,
            new_tier: target,
            is_upgrade,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ResourceKind;
    use crate::quota::QuotaUsage;
    use crate::store::{EntitlementBackend, EntitlementRecord, MemoryBackend};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use uuid::Uuid;

    struct UnavailableBackend;

    #[async_trait]
    impl EntitlementBackend for UnavailableBackend {
        async fn persist(
            &self,
            _principal: PrincipalId,
            _record: &EntitlementRecord,
        ) -> EngineResult<()> {
            Err(EngineError::PersistenceUnavailable("backend down".into()))
        }

        async fn load(&self, _principal: PrincipalId) -> EngineResult<Option<EntitlementRecord>> {
            Ok(None)
        }

        async fn persist_usage(
            &self,
            _principal: PrincipalId,
            _counters: &HashMap<ResourceKind, QuotaUsage>,
        ) -> EngineResult<()> {
            Err(EngineError::PersistenceUnavailable("backend down".into()))
        }

        async fn load_usage(
            &self,
            _principal: PrincipalId,
        ) -> EngineResult<Option<HashMap<ResourceKind, QuotaUsage>>> {
            Ok(None)
        }
    }

    fn coordinator(backend: Arc<dyn EntitlementBackend>) -> (TransitionCoordinator, Arc<EntitlementStore>) {
        let store = Arc::new(EntitlementStore::new(backend));
        let coordinator = TransitionCoordinator::new(
            Arc::new(PlanCatalog::new()),
            store.clone(),
            Arc::new(PrincipalLocks::new()),
        );
        (coordinator, store)
    }

    #[tokio::test]
    async fn test_round_trip() {
        let (coordinator, store) = coordinator(Arc::new(MemoryBackend::new()));
        let principal = Uuid::new_v4();

        let outcome = coordinator
            .transition(principal, PlanTier::Professional)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            TransitionOutcome::Applied {
                previous_tier: PlanTier::Free,
                new_tier: PlanTier::Professional,
                is_upgrade: true,
            }
        );
        assert_eq!(store.get(principal).tier, PlanTier::Professional);
        assert_eq!(store.get(principal).previous_tier, Some(PlanTier::Free));
    }

    #[tokio::test]
    async fn test_same_tier_is_a_no_op() {
        let (coordinator, store) = coordinator(Arc::new(MemoryBackend::new()));
        let principal = Uuid::new_v4();

        coordinator
            .transition(principal, PlanTier::Basic)
            .await
            .unwrap();
        let stamped = store.get(principal).last_transition;
        assert!(stamped.is_some());

        let outcome = coordinator
            .transition(principal, PlanTier::Basic)
            .await
            .unwrap();
        assert_eq!(outcome, TransitionOutcome::Unchanged { tier: PlanTier::Basic });

        // The no-op did not touch the store: timestamp unmodified
        assert_eq!(store.get(principal).last_transition, stamped);
    }

    #[tokio::test]
    async fn test_downgrade_classified() {
        let (coordinator, _store) = coordinator(Arc::new(MemoryBackend::new()));
        let principal = Uuid::new_v4();

        coordinator
            .transition(principal, PlanTier::Enterprise)
            .await
            .unwrap();
        let outcome = coordinator
            .transition(principal, PlanTier::Basic)
            .await
            .unwrap();

        assert_eq!(
            outcome,
            TransitionOutcome::Applied {
                previous_tier: PlanTier::Enterprise,
                new_tier: PlanTier::Basic,
                is_upgrade: false,
            }
        );
    }

    #[tokio::test]
    async fn test_persistence_failure_keeps_prior_tier() {
        let (coordinator, store) = coordinator(Arc::new(UnavailableBackend));
        let principal = Uuid::new_v4();

        let result = coordinator.transition(principal, PlanTier::Professional).await;
        assert!(matches!(result, Err(EngineError::PersistenceUnavailable(_))));
        assert_eq!(store.get(principal).tier, PlanTier::Free);
    }
}
