//! Plan Catalog
//!
//! Immutable, process-wide registry of tier definitions. Loaded once at
//! startup; every gating and quota decision in the engine is resolved
//! against it.

use safecare_common::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Subscription tier, totally ordered by capability (not merely by price)
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum PlanTier {
    /// Entry tier, assigned to every principal on first access
    #[default]
    Free,
    /// Paid tier for small practices
    Basic,
    /// Paid tier for established practices
    Professional,
    /// Top tier, no patient ceiling
    Enterprise,
}

impl PlanTier {
    /// All tiers in ascending capability order
    pub fn all() -> [PlanTier; 4] {
        [Self::Free, Self::Basic, Self::Professional, Self::Enterprise]
    }

    /// Wire spelling of the tier id
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Basic => "basic",
            Self::Professional => "professional",
            Self::Enterprise => "enterprise",
        }
    }
}

impl FromStr for PlanTier {
    type Err = EngineError;

    fn from_str(s: &str) -> EngineResult<Self> {
        match s {
            "free" => Ok(Self::Free),
            "basic" => Ok(Self::Basic),
            "professional" => Ok(Self::Professional),
            "enterprise" => Ok(Self::Enterprise),
            other => Err(EngineError::UnknownTier(other.into())),
        }
    }
}

impl std::fmt::Display for PlanTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Gateable capability keys
///
/// Closed set: a key outside this enum is a caller programming error, not a
/// runtime condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FeatureKey {
    /// Charts, statistics and activity feed on the dashboard
    AdvancedDashboard,
    /// Interaction checking and prescription history
    AdvancedMedications,
    /// Recurring appointments and calendar integrations
    AdvancedAppointments,
    /// Secure patient messaging
    Messaging,
    /// Exportable clinical and financial reports
    Reports,
    /// Third-party system integrations
    Integrations,
}

impl FeatureKey {
    /// All feature keys in the closed set
    pub fn all() -> [FeatureKey; 6] {
        [
            Self::AdvancedDashboard,
            Self::AdvancedMedications,
            Self::AdvancedAppointments,
            Self::Messaging,
            Self::Reports,
            Self::Integrations,
        ]
    }

    /// Wire spelling of the key
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AdvancedDashboard => "advancedDashboard",
            Self::AdvancedMedications => "advancedMedications",
            Self::AdvancedAppointments => "advancedAppointments",
            Self::Messaging => "messaging",
            Self::Reports => "reports",
            Self::Integrations => "integrations",
        }
    }
}

impl FromStr for FeatureKey {
    type Err = EngineError;

    fn from_str(s: &str) -> EngineResult<Self> {
        match s {
            "advancedDashboard" => Ok(Self::AdvancedDashboard),
            "advancedMedications" => Ok(Self::AdvancedMedications),
            "advancedAppointments" => Ok(Self::AdvancedAppointments),
            "messaging" => Ok(Self::Messaging),
            "reports" => Ok(Self::Reports),
            "integrations" => Ok(Self::Integrations),
            other => Err(EngineError::UnknownFeatureKey(other.into())),
        }
    }
}

/// Countable resource kinds subject to tier ceilings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    /// Managed patient records
    Patients,
}

impl ResourceKind {
    /// All resource kinds in the closed set
    pub fn all() -> [ResourceKind; 1] {
        [Self::Patients]
    }

    /// Wire spelling of the kind
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Patients => "patients",
        }
    }
}

impl FromStr for ResourceKind {
    type Err = EngineError;

    fn from_str(s: &str) -> EngineResult<Self> {
        match s {
            "patients" => Ok(Self::Patients),
            other => Err(EngineError::UnknownResourceKind(other.into())),
        }
    }
}

/// Ceiling for a countable resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuotaLimit {
    /// Hard ceiling on the resource count
    Limited(u64),
    /// No ceiling at this tier
    Unlimited,
}

/// Full definition of one tier: price, quota map, feature map
///
/// Invariant: the maps are complete: every known feature key and every
/// known resource kind has an entry. A gap is a configuration error and is
/// surfaced loudly by the accessors, never defaulted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierDefinition {
    /// Tier id
    pub tier: PlanTier,
    /// Display name
    pub name: String,
    /// Monthly price
    pub monthly_price: Decimal,
    /// Ceiling per countable resource kind
    pub quotas: HashMap<ResourceKind, QuotaLimit>,
    /// Enabled/disabled per feature key
    pub features: HashMap<FeatureKey, bool>,
}

impl TierDefinition {
    /// Whether a feature is enabled at this tier
    pub fn feature(&self, key: FeatureKey) -> EngineResult<bool> {
        self.features
            .get(&key)
            .copied()
            .ok_or_else(|| EngineError::UnknownFeatureKey(key.as_str().into()))
    }

    /// Ceiling for a resource kind at this tier
    pub fn quota(&self, kind: ResourceKind) -> EngineResult<QuotaLimit> {
        self.quotas
            .get(&kind)
            .copied()
            .ok_or_else(|| EngineError::UnknownResourceKind(kind.as_str().into()))
    }
}

/// Immutable registry of tier definitions
pub struct PlanCatalog {
    tiers: BTreeMap<PlanTier, TierDefinition>,
}

impl PlanCatalog {
    /// Create the catalog with the built-in plans
    pub fn new() -> Self {
        let mut tiers = BTreeMap::new();

        tiers.insert(
            PlanTier::Free,
            TierDefinition {
                tier: PlanTier::Free,
                name: "Free".into(),
                monthly_price: dec!(0),
                quotas: HashMap::from([(ResourceKind::Patients, QuotaLimit::Limited(5))]),
                features: HashMap::from([
                    (FeatureKey::AdvancedDashboard, false),
                    (FeatureKey::AdvancedMedications, false),
                    (FeatureKey::AdvancedAppointments, false),
                    (FeatureKey::Messaging, false),
                    (FeatureKey::Reports, false),
                    (FeatureKey::Integrations, false),
                ]),
            },
        );

        tiers.insert(
            PlanTier::Basic,
            TierDefinition {
                tier: PlanTier::Basic,
                name: "Basic".into(),
                monthly_price: dec!(39.90),
                quotas: HashMap::from([(ResourceKind::Patients, QuotaLimit::Limited(20))]),
                features: HashMap::from([
                    (FeatureKey::AdvancedDashboard, false),
                    (FeatureKey::AdvancedMedications, true),
                    (FeatureKey::AdvancedAppointments, false),
                    (FeatureKey::Messaging, false),
                    (FeatureKey::Reports, false),
                    (FeatureKey::Integrations, false),
                ]),
            },
        );

        tiers.insert(
            PlanTier::Professional,
            TierDefinition {
                tier: PlanTier::Professional,
                name: "Professional".into(),
                monthly_price: dec!(99.90),
                quotas: HashMap::from([(ResourceKind::Patients, QuotaLimit::Limited(50))]),
                features: HashMap::from([
                    (FeatureKey::AdvancedDashboard, true),
                    (FeatureKey::AdvancedMedications, true),
                    (FeatureKey::AdvancedAppointments, true),
                    (FeatureKey::Messaging, true),
                    (FeatureKey::Reports, true),
                    (FeatureKey::Integrations, false),
                ]),
            },
        );

        tiers.insert(
            PlanTier::Enterprise,
            TierDefinition {
                tier: PlanTier::Enterprise,
                name: "Enterprise".into(),
                monthly_price: dec!(299.90),
                quotas: HashMap::from([(ResourceKind::Patients, QuotaLimit::Unlimited)]),
                features: HashMap::from([
                    (FeatureKey::AdvancedDashboard, true),
                    (FeatureKey::AdvancedMedications, true),
                    (FeatureKey::AdvancedAppointments, true),
                    (FeatureKey::Messaging, true),
                    (FeatureKey::Reports, true),
                    (FeatureKey::Integrations, true),
                ]),
            },
        );

        Self { tiers }
    }

    /// Build a catalog from explicit definitions
    ///
    /// For deployments that load the plan grid from configuration instead of
    /// the built-ins. Completeness is still on the caller; run [`validate`]
    /// after loading.
    ///
    /// [`validate`]: PlanCatalog::validate
    pub fn with_tiers(definitions: Vec<TierDefinition>) -> Self {
        Self {
            tiers: definitions.into_iter().map(|d| (d.tier, d)).collect(),
        }
    }

    /// Get the definition for a tier
    pub fn definition_of(&self, tier: PlanTier) -> EngineResult<&TierDefinition> {
        self.tiers
            .get(&tier)
            .ok_or_else(|| EngineError::UnknownTier(tier.as_str().into()))
    }

    /// Capability comparison between two tiers
    ///
    /// Used to classify a transition as upgrade or downgrade.
    pub fn ordering(&self, a: PlanTier, b: PlanTier) -> std::cmp::Ordering {
        a.cmp(&b)
    }

    /// All tier definitions in ascending capability order
    pub fn plans(&self) -> Vec<&TierDefinition> {
        self.tiers.values().collect()
    }

    /// Check the completeness invariant: every tier defines every known
    /// feature key and every known quota kind
    pub fn validate(&self) -> EngineResult<()> {
        for tier in PlanTier::all() {
            let def = self.definition_of(tier)?;
            for key in FeatureKey::all() {
                def.feature(key)?;
            }
            for kind in ResourceKind::all() {
                def.quota(kind)?;
            }
        }
        Ok(())
    }
}

impl Default for PlanCatalog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_completeness() {
        let catalog = PlanCatalog::new();
        assert!(catalog.validate().is_ok());

        // Every (tier, key) pair resolves without error
        for tier in PlanTier::all() {
            let def = catalog.definition_of(tier).unwrap();
            for key in FeatureKey::all() {
                def.feature(key).unwrap();
            }
        }
    }

    #[test]
    fn test_feature_grid() {
        let catalog = PlanCatalog::new();

        let free = catalog.definition_of(PlanTier::Free).unwrap();
        assert!(!free.feature(FeatureKey::Messaging).unwrap());
        assert!(!free.feature(FeatureKey::AdvancedMedications).unwrap());

        let basic = catalog.definition_of(PlanTier::Basic).unwrap();
        assert!(basic.feature(FeatureKey::AdvancedMedications).unwrap());
        assert!(!basic.feature(FeatureKey::Messaging).unwrap());

        let pro = catalog.definition_of(PlanTier::Professional).unwrap();
        assert!(pro.feature(FeatureKey::Messaging).unwrap());
        assert!(pro.feature(FeatureKey::Reports).unwrap());
        assert!(!pro.feature(FeatureKey::Integrations).unwrap());

        let enterprise = catalog.definition_of(PlanTier::Enterprise).unwrap();
        assert!(enterprise.feature(FeatureKey::Integrations).unwrap());
    }

    #[test]
    fn test_patient_ceilings() {
        let catalog = PlanCatalog::new();

        assert_eq!(
            catalog
                .definition_of(PlanTier::Free)
                .unwrap()
                .quota(ResourceKind::Patients)
                .unwrap(),
            QuotaLimit::Limited(5)
        );
        assert_eq!(
            catalog
                .definition_of(PlanTier::Professional)
                .unwrap()
                .quota(ResourceKind::Patients)
                .unwrap(),
            QuotaLimit::Limited(50)
        );
        assert_eq!(
            catalog
                .definition_of(PlanTier::Enterprise)
                .unwrap()
                .quota(ResourceKind::Patients)
                .unwrap(),
            QuotaLimit::Unlimited
        );
    }

    #[test]
    fn test_capability_ordering() {
        let catalog = PlanCatalog::new();

        assert_eq!(
            catalog.ordering(PlanTier::Free, PlanTier::Enterprise),
            std::cmp::Ordering::Less
        );
        assert_eq!(
            catalog.ordering(PlanTier::Professional, PlanTier::Basic),
            std::cmp::Ordering::Greater
        );
        assert_eq!(
            catalog.ordering(PlanTier::Basic, PlanTier::Basic),
            std::cmp::Ordering::Equal
        );
    }

    #[test]
    fn test_plans_listing_sorted_by_capability() {
        let catalog = PlanCatalog::new();
        let plans = catalog.plans();

        let order: Vec<PlanTier> = plans.iter().map(|p| p.tier).collect();
        assert_eq!(
            order,
            vec![
                PlanTier::Free,
                PlanTier::Basic,
                PlanTier::Professional,
                PlanTier::Enterprise
            ]
        );
        assert!(plans[0].monthly_price < plans[3].monthly_price);
    }

    #[test]
    fn test_unknown_keys_rejected() {
        assert!(matches!(
            "premium".parse::<PlanTier>(),
            Err(EngineError::UnknownTier(_))
        ));
        assert!(matches!(
            "telemedicine".parse::<FeatureKey>(),
            Err(EngineError::UnknownFeatureKey(_))
        ));
        assert!(matches!(
            "devices".parse::<ResourceKind>(),
            Err(EngineError::UnknownResourceKind(_))
        ));

        assert_eq!("professional".parse::<PlanTier>().unwrap(), PlanTier::Professional);
        assert_eq!(
            "advancedDashboard".parse::<FeatureKey>().unwrap(),
            FeatureKey::AdvancedDashboard
        );
    }
}
