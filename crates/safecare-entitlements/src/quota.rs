//! Quota Enforcement
//!
//! Atomic check-and-increment against the ceiling of the principal's active
//! tier. This is the one place real interleavings can violate a tier limit,
//! so every mutation runs inside the per-principal exclusive section shared
//! with the transition coordinator.

use crate::catalog::{PlanCatalog, QuotaLimit, ResourceKind};
use crate::locks::PrincipalLocks;
use crate::store::{EntitlementBackend, EntitlementStore};
use dashmap::DashMap;
use safecare_common::{AtomicCounter, EngineResult, PrincipalId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Counter state per (principal, resource kind)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaUsage {
    /// Current live count
    pub current: u64,
    /// Highest count ever observed
    pub high_water: u64,
}

/// Outcome of a reservation attempt
///
/// `Exceeded` is normal control flow for the caller (show the limit, offer
/// an upgrade), not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuotaDecision {
    /// Reservation accepted; usage was incremented
    Accepted {
        /// Headroom left under the ceiling; `None` when unlimited
        remaining: Option<u64>,
    },
    /// Ceiling would be crossed; usage was not mutated
    Exceeded {
        /// Ceiling at the active tier
        limit: u64,
        /// Usage at the moment of the check
        current: u64,
    },
}

/// Read-only usage view for warning surfaces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageSnapshot {
    /// Current live count
    pub current: u64,
    /// Highest count ever observed
    pub high_water: u64,
    /// Ceiling at the active tier; `None` when unlimited
    pub limit: Option<u64>,
    /// Current count is at or past 80% of a finite ceiling
    pub near_limit: bool,
    /// Current count is above the ceiling (downgrade overage)
    pub at_limit: bool,
}

/// Concurrency-safe counter/ceiling check per (principal, resource kind)
///
/// Counters live in memory so decisions never block on I/O; they reach the
/// durable medium through [`flush`] checkpoints and come back at startup
/// through [`hydrate`].
///
/// [`flush`]: QuotaEnforcer::flush
/// [`hydrate`]: QuotaEnforcer::hydrate
pub struct QuotaEnforcer {
    catalog: Arc<PlanCatalog>,
    store: Arc<EntitlementStore>,
    locks: Arc<PrincipalLocks>,
    backend: Arc<dyn EntitlementBackend>,
    usage: DashMap<(PrincipalId, ResourceKind), QuotaUsage>,
    underflows: AtomicCounter,
}

impl QuotaEnforcer {
    pub(crate) fn new(
        catalog: Arc<PlanCatalog>,
        store: Arc<EntitlementStore>,
        locks: Arc<PrincipalLocks>,
        backend: Arc<dyn EntitlementBackend>,
    ) -> Self {
        Self {
            catalog,
            store,
            locks,
            backend,
            usage: DashMap::new(),
            underflows: AtomicCounter::new(0),
        }
    }

    /// Atomically check the ceiling and reserve `delta` units
    ///
    /// Under a finite ceiling C, concurrent unit reservations accept at most
    /// C in total, regardless of interleaving. A rejection leaves usage
    /// untouched.
    pub async fn check_and_reserve(
        &self,
        principal: PrincipalId,
        kind: ResourceKind,
        delta: u64,
    ) -> EngineResult<QuotaDecision> {
        let _section = self.locks.acquire(principal).await;

        let tier = self.store.get(principal).tier;
        let limit = self.catalog.definition_of(tier)?.quota(kind)?;

        let mut usage = self.usage.entry((principal, kind)).or_default();
        match limit {
            QuotaLimit::Unlimited => {
                usage.current += delta;
                usage.high_water = usage.high_water.max(usage.current);
                Ok(QuotaDecision::Accepted { remaining: None })
            }
            QuotaLimit::Limited(ceiling) => {
                if usage.current + delta > ceiling {
                    tracing::debug!(
                        %principal,
                        kind = kind.as_str(),
                        limit = ceiling,
                        current = usage.current,
                        "reservation rejected at ceiling"
                    );
                    Ok(QuotaDecision::Exceeded {
                        limit: ceiling,
                        current: usage.current,
                    })
                } else {
                    usage.current += delta;
                    usage.high_water = usage.high_water.max(usage.current);
                    Ok(QuotaDecision::Accepted {
                        remaining: Some(ceiling - usage.current),
                    })
                }
            }
        }
    }

    /// Return `delta` units after a resource was deleted
    ///
    /// Floored at zero: an underflow is clamped and counted, the operation
    /// still completes. Returns the new count.
    pub async fn release(&self, principal: PrincipalId, kind: ResourceKind, delta: u64) -> u64 {
        let _section = self.locks.acquire(principal).await;

        let mut usage = self.usage.entry((principal, kind)).or_default();
        if delta > usage.current {
            self.underflows.inc();
            tracing::warn!(
                %principal,
                kind = kind.as_str(),
                current = usage.current,
                delta,
                "release underflow clamped to zero"
            );
            usage.current = 0;
        } else {
            usage.current -= delta;
        }
        usage.current
    }

    /// Read-only view of usage against the active tier's ceiling
    ///
    /// Lock-free; used to render warnings before the hard block.
    pub fn usage_snapshot(
        &self,
        principal: PrincipalId,
        kind: ResourceKind,
    ) -> EngineResult<UsageSnapshot> {
        let tier = self.store.get(principal).tier;
        let limit = self.catalog.definition_of(tier)?.quota(kind)?;

        let usage = self
            .usage
            .get(&(principal, kind))
            .map(|entry| *entry)
            .unwrap_or_default();

        Ok(match limit {
            QuotaLimit::Unlimited => UsageSnapshot {
                current: usage.current,
                high_water: usage.high_water,
                limit: None,
                near_limit: false,
                at_limit: false,
            },
            QuotaLimit::Limited(ceiling) => UsageSnapshot {
                current: usage.current,
                high_water: usage.high_water,
                limit: Some(ceiling),
                // current >= 0.8 * ceiling, kept in integers
                near_limit: usage.current * 5 >= ceiling * 4,
                at_limit: usage.current > ceiling,
            },
        })
    }

    /// Checkpoint a principal's counter set to the durable medium
    ///
    /// Taken inside the exclusive section so the snapshot is consistent;
    /// callers schedule this periodically and at shutdown.
    pub async fn flush(&self, principal: PrincipalId) -> EngineResult<()> {
        let _section = self.locks.acquire(principal).await;

        let counters: HashMap<ResourceKind, QuotaUsage> = self
            .usage
            .iter()
            .filter(|entry| entry.key().0 == principal)
            .map(|entry| (entry.key().1, *entry.value()))
            .collect();

        self.backend.persist_usage(principal, &counters).await
    }

    /// Warm-start: pull the persisted counter set into memory, if one exists
    pub async fn hydrate(&self, principal: PrincipalId) -> EngineResult<()> {
        let Some(counters) = self.backend.load_usage(principal).await? else {
            return Ok(());
        };

        let _section = self.locks.acquire(principal).await;
        for (kind, usage) in counters {
            self.usage.insert((principal, kind), usage);
        }
        Ok(())
    }

    /// Number of clamped release underflows observed since startup
    pub fn underflow_count(&self) -> u64 {
        self.underflows.get()
    }
}
