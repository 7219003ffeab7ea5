//! Feature Gate
//!
//! Stateless yes/no decision: is a capability available at the principal's
//! active tier? A locked feature means the caller must present an upgrade
//! path instead of the feature.

use crate::catalog::{FeatureKey, PlanCatalog, PlanTier};
use crate::store::EntitlementStore;
use safecare_common::{EngineResult, PrincipalId};
use std::sync::Arc;

/// Stateless feature gating over the catalog and the entitlement store
pub struct FeatureGate {
    catalog: Arc<PlanCatalog>,
    store: Arc<EntitlementStore>,
}

impl FeatureGate {
    /// Create gate over shared catalog and store
    pub fn new(catalog: Arc<PlanCatalog>, store: Arc<EntitlementStore>) -> Self {
        Self { catalog, store }
    }

    /// Whether a feature is unavailable at the principal's active tier
    ///
    /// `UnknownFeatureKey` is a programming error in the caller and is
    /// surfaced loudly, never treated as locked or unlocked.
    pub fn is_locked(&self, principal: PrincipalId, key: FeatureKey) -> EngineResult<bool> {
        let tier = self.store.get(principal).tier;
        let definition = self.catalog.definition_of(tier)?;
        Ok(!definition.feature(key)?)
    }

    /// The principal's active tier
    pub fn current_tier(&self, principal: PrincipalId) -> PlanTier {
        self.store.get(principal).tier
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryBackend;
    use chrono::Utc;
    use uuid::Uuid;

    fn gate() -> (FeatureGate, Arc<EntitlementStore>) {
        let catalog = Arc::new(PlanCatalog::new());
        let store = Arc::new(EntitlementStore::new(Arc::new(MemoryBackend::new())));
        (FeatureGate::new(catalog, store.clone()), store)
    }

    #[test]
    fn test_free_tier_locks_premium_features() {
        let (gate, _store) = gate();
        let principal = Uuid::new_v4();

        assert!(gate.is_locked(principal, FeatureKey::Messaging).unwrap());
        assert!(gate.is_locked(principal, FeatureKey::Reports).unwrap());
        assert!(gate.is_locked(principal, FeatureKey::AdvancedDashboard).unwrap());
        assert_eq!(gate.current_tier(principal), PlanTier::Free);
    }

    #[tokio::test]
    async fn test_unlocks_follow_the_active_tier() {
        let (gate, store) = gate();
        let principal = Uuid::new_v4();

        store
            .set(principal, PlanTier::Professional, Some(PlanTier::Free), Utc::now())
            .await
            .unwrap();

        assert!(!gate.is_locked(principal, FeatureKey::Messaging).unwrap());
        assert!(!gate.is_locked(principal, FeatureKey::Reports).unwrap());
        // Integrations stays enterprise-only
        assert!(gate.is_locked(principal, FeatureKey::Integrations).unwrap());
    }

    #[test]
    fn test_never_errors_for_defined_keys() {
        let (gate, _store) = gate();
        let principal = Uuid::new_v4();

        for key in FeatureKey::all() {
            assert!(gate.is_locked(principal, key).is_ok());
        }
    }
}
