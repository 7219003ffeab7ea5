//! SafeCare Plan Entitlement & Quota Enforcement Engine
//!
//! Authoritative source for "what plan is active", "what does that plan
//! unlock" and "has a countable resource hit its ceiling".
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                      ENTITLEMENT ENGINE                             │
//! │                                                                     │
//! │  ┌──────────────┐      ┌──────────────────────────────────────┐    │
//! │  │ PlanCatalog  │────► │ EntitlementStore (per-principal tier) │    │
//! │  │ (immutable)  │      └──────────┬───────────────▲───────────┘    │
//! │  └──────┬───────┘                 │               │                │
//! │         │               reads only│        writes only             │
//! │  ┌──────▼───────┐  ┌──────────────▼─┐  ┌──────────┴────────────┐   │
//! │  │ FeatureGate  │  │ QuotaEnforcer  │  │ TransitionCoordinator │   │
//! │  │ locked? y/n  │  │ check+reserve  │  │ upgrade / downgrade   │   │
//! │  └──────────────┘  └────────────────┘  └───────────────────────┘   │
//! │                           │                      │                 │
//! │                  ┌────────▼──────────────────────▼───────┐         │
//! │                  │   per-principal exclusive sections    │         │
//! │                  └───────────────────────────────────────┘         │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Resource-management collaborators call `check_and_reserve` before
//! creating a countable resource and `release` after deleting one. The
//! billing collaborator calls `transition` after confirming payment. UI
//! surfaces read `is_locked` and `usage_snapshot` and never mutate state.

#![warn(missing_docs)]
#![allow(dead_code)]

pub mod catalog;
pub mod gate;
pub mod quota;
pub mod store;
pub mod transition;

mod locks;

use std::sync::Arc;

pub use catalog::{FeatureKey, PlanCatalog, PlanTier, QuotaLimit, ResourceKind, TierDefinition};
pub use gate::FeatureGate;
pub use quota::{QuotaDecision, QuotaEnforcer, QuotaUsage, UsageSnapshot};
pub use store::{
    EntitlementBackend, EntitlementRecord, EntitlementStore, JsonFileBackend, MemoryBackend,
};
pub use transition::{TransitionCoordinator, TransitionOutcome};

use safecare_common::{EngineResult, PrincipalId};

/// Entitlement engine facade
///
/// Wires the catalog, store, gate, enforcer and coordinator over one shared
/// set of per-principal exclusive sections.
pub struct EntitlementEngine {
    /// Immutable tier definitions
    pub catalog: Arc<PlanCatalog>,
    /// Per-principal entitlement records
    pub store: Arc<EntitlementStore>,
    /// Feature gating
    pub gate: FeatureGate,
    /// Quota enforcement
    pub quotas: Arc<QuotaEnforcer>,
    /// Plan changes
    pub transitions: Arc<TransitionCoordinator>,
}

impl EntitlementEngine {
    /// Create engine over the given durable backend
    pub fn with_backend(backend: Arc<dyn EntitlementBackend>) -> Self {
        let catalog = Arc::new(PlanCatalog::new());
        let store = Arc::new(EntitlementStore::new(backend.clone()));
        let locks = Arc::new(locks::PrincipalLocks::new());

        Self {
            gate: FeatureGate::new(catalog.clone(), store.clone()),
            quotas: Arc::new(QuotaEnforcer::new(
                catalog.clone(),
                store.clone(),
                locks.clone(),
                backend,
            )),
            transitions: Arc::new(TransitionCoordinator::new(
                catalog.clone(),
                store.clone(),
                locks,
            )),
            catalog,
            store,
        }
    }

    /// Create engine with in-memory persistence (tests, development)
    pub fn in_memory() -> Self {
        Self::with_backend(Arc::new(MemoryBackend::new()))
    }

    // --- query API (never mutates) ---

    /// The principal's active tier
    pub fn current_tier(&self, principal: PrincipalId) -> PlanTier {
        self.gate.current_tier(principal)
    }

    /// Whether a feature is unavailable at the principal's active tier
    pub fn is_locked(&self, principal: PrincipalId, key: FeatureKey) -> EngineResult<bool> {
        self.gate.is_locked(principal, key)
    }

    /// Read-only usage view for quota warning surfaces
    pub fn usage_snapshot(
        &self,
        principal: PrincipalId,
        kind: ResourceKind,
    ) -> EngineResult<UsageSnapshot> {
        self.quotas.usage_snapshot(principal, kind)
    }

    /// All tier definitions in ascending capability order
    pub fn plans(&self) -> Vec<&TierDefinition> {
        self.catalog.plans()
    }

    // --- command API ---

    /// Move a principal to a new tier (pre-authorized by billing)
    pub async fn transition(
        &self,
        principal: PrincipalId,
        target: PlanTier,
    ) -> EngineResult<TransitionOutcome> {
        self.transitions.transition(principal, target).await
    }

    /// Atomically reserve headroom before creating a countable resource
    pub async fn check_and_reserve(
        &self,
        principal: PrincipalId,
        kind: ResourceKind,
        delta: u64,
    ) -> EngineResult<QuotaDecision> {
        self.quotas.check_and_reserve(principal, kind, delta).await
    }

    /// Return headroom after deleting a countable resource
    pub async fn release(&self, principal: PrincipalId, kind: ResourceKind, delta: u64) -> u64 {
        self.quotas.release(principal, kind, delta).await
    }

    /// Warm-start a principal from the durable medium (record and counters)
    pub async fn hydrate(&self, principal: PrincipalId) -> EngineResult<()> {
        self.store.hydrate(principal).await?;
        self.quotas.hydrate(principal).await
    }

    /// Checkpoint a principal's quota counters to the durable medium
    ///
    /// Reservation decisions are served from memory; callers schedule this
    /// periodically and at shutdown.
    pub async fn flush_usage(&self, principal: PrincipalId) -> EngineResult<()> {
        self.quotas.flush(principal).await
    }
}
