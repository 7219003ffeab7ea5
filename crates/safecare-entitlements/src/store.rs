//! Entitlement Store
//!
//! Durable record of the active tier per principal. Reads are served from an
//! in-memory cache; the only external I/O in the engine is the durable write
//! behind [`EntitlementBackend::persist`].

use crate::catalog::{PlanTier, ResourceKind};
use crate::quota::QuotaUsage;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use safecare_common::{EngineError, EngineResult, PrincipalId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Durable fact of which tier a principal is on
///
/// Created lazily on first access with the lowest tier; mutated only by the
/// transition coordinator; never deleted while the principal exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitlementRecord {
    /// Owning principal
    pub principal: PrincipalId,
    /// Active tier
    pub tier: PlanTier,
    /// Tier before the last transition, for audit and rollback
    pub previous_tier: Option<PlanTier>,
    /// When the last transition was applied
    pub last_transition: Option<DateTime<Utc>>,
    /// When the record was first materialized
    pub created_at: DateTime<Utc>,
}

impl EntitlementRecord {
    fn materialize(principal: PrincipalId) -> Self {
        Self {
            principal,
            tier: PlanTier::default(),
            previous_tier: None,
            last_transition: None,
            created_at: Utc::now(),
        }
    }
}

/// Persistence abstraction for entitlement records and quota counter sets
///
/// Quota decisions are served from memory; the counter set reaches the
/// durable medium through periodic [`persist_usage`] checkpoints, never on
/// the reservation path.
///
/// [`persist_usage`]: EntitlementBackend::persist_usage
#[async_trait]
pub trait EntitlementBackend: Send + Sync {
    /// Durably write one record; all-or-nothing
    async fn persist(&self, principal: PrincipalId, record: &EntitlementRecord)
        -> EngineResult<()>;

    /// Load one record, if it was ever persisted
    async fn load(&self, principal: PrincipalId) -> EngineResult<Option<EntitlementRecord>>;

    /// Durably write the counter set for one principal
    async fn persist_usage(
        &self,
        principal: PrincipalId,
        counters: &HashMap<ResourceKind, QuotaUsage>,
    ) -> EngineResult<()>;

    /// Load the counter set for one principal, if one was ever persisted
    async fn load_usage(
        &self,
        principal: PrincipalId,
    ) -> EngineResult<Option<HashMap<ResourceKind, QuotaUsage>>>;
}

/// In-memory backend (for testing and development)
pub struct MemoryBackend {
    records: RwLock<HashMap<PrincipalId, EntitlementRecord>>,
    usage: RwLock<HashMap<PrincipalId, HashMap<ResourceKind, QuotaUsage>>>,
}

impl MemoryBackend {
    /// Create empty backend
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            usage: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EntitlementBackend for MemoryBackend {
    async fn persist(
        &self,
        principal: PrincipalId,
        record: &EntitlementRecord,
    ) -> EngineResult<()> {
        self.records.write().insert(principal, record.clone());
        Ok(())
    }

    async fn load(&self, principal: PrincipalId) -> EngineResult<Option<EntitlementRecord>> {
        Ok(self.records.read().get(&principal).cloned())
    }

    async fn persist_usage(
        &self,
        principal: PrincipalId,
        counters: &HashMap<ResourceKind, QuotaUsage>,
    ) -> EngineResult<()> {
        self.usage.write().insert(principal, counters.clone());
        Ok(())
    }

    async fn load_usage(
        &self,
        principal: PrincipalId,
    ) -> EngineResult<Option<HashMap<ResourceKind, QuotaUsage>>> {
        Ok(self.usage.read().get(&principal).cloned())
    }
}

/// JSON-file backend: one document per principal
///
/// Writes go to a temp file first and are moved into place with `rename`, so
/// a crash mid-write never leaves a torn record behind.
pub struct JsonFileBackend {
    dir: PathBuf,
}

impl JsonFileBackend {
    /// Create backend rooted at `dir`, creating the directory if needed
    pub fn new(dir: impl Into<PathBuf>) -> EngineResult<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .map_err(|e| EngineError::PersistenceUnavailable(e.to_string()))?;
        Ok(Self { dir })
    }

    fn path_for(&self, principal: PrincipalId) -> PathBuf {
        self.dir.join(format!("{principal}.json"))
    }

    fn usage_path_for(&self, principal: PrincipalId) -> PathBuf {
        self.dir.join(format!("{principal}.usage.json"))
    }

    async fn write_atomic(&self, path: PathBuf, body: Vec<u8>) -> EngineResult<()> {
        let tmp = path.with_extension("json.tmp");

        tokio::fs::write(&tmp, &body)
            .await
            .map_err(|e| EngineError::PersistenceUnavailable(e.to_string()))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| EngineError::PersistenceUnavailable(e.to_string()))?;

        Ok(())
    }
}

#[async_trait]
impl EntitlementBackend for JsonFileBackend {
    async fn persist(
        &self,
        principal: PrincipalId,
        record: &EntitlementRecord,
    ) -> EngineResult<()> {
        let body = serde_json::to_vec_pretty(record)
            .map_err(|e| EngineError::PersistenceUnavailable(e.to_string()))?;
        self.write_atomic(self.path_for(principal), body).await
    }

    async fn load(&self, principal: PrincipalId) -> EngineResult<Option<EntitlementRecord>> {
        let path = self.path_for(principal);
        let body = match tokio::fs::read(&path).await {
            Ok(body) => body,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(EngineError::PersistenceUnavailable(e.to_string())),
        };

        let record = serde_json::from_slice(&body)
            .map_err(|e| EngineError::PersistenceUnavailable(e.to_string()))?;
        Ok(Some(record))
    }

    async fn persist_usage(
        &self,
        principal: PrincipalId,
        counters: &HashMap<ResourceKind, QuotaUsage>,
    ) -> EngineResult<()> {
        let body = serde_json::to_vec_pretty(counters)
            .map_err(|e| EngineError::PersistenceUnavailable(e.to_string()))?;
        self.write_atomic(self.usage_path_for(principal), body).await
    }

    async fn load_usage(
        &self,
        principal: PrincipalId,
    ) -> EngineResult<Option<HashMap<ResourceKind, QuotaUsage>>> {
        let path = self.usage_path_for(principal);
        let body = match tokio::fs::read(&path).await {
            Ok(body) => body,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(EngineError::PersistenceUnavailable(e.to_string())),
        };

        let counters = serde_json::from_slice(&body)
            .map_err(|e| EngineError::PersistenceUnavailable(e.to_string()))?;
        Ok(Some(counters))
    }
}

/// Cached entitlement store over a durable backend
pub struct EntitlementStore {
    records: DashMap<PrincipalId, EntitlementRecord>,
    backend: Arc<dyn EntitlementBackend>,
}

impl EntitlementStore {
    /// Create store over the given backend
    pub fn new(backend: Arc<dyn EntitlementBackend>) -> Self {
        Self {
            records: DashMap::new(),
            backend,
        }
    }

    /// Get the record for a principal, materializing a default Free record
    /// on first access. Never fails; creation is cache-only and nothing
    /// durable happens until the first transition.
    pub fn get(&self, principal: PrincipalId) -> EntitlementRecord {
        self.records
            .entry(principal)
            .or_insert_with(|| EntitlementRecord::materialize(principal))
            .clone()
    }

    /// Durable, atomic tier write
    ///
    /// The backend write happens first; the cache only changes once it
    /// succeeded, so a `PersistenceUnavailable` leaves in-memory state
    /// untouched. Callers serialize per principal, which makes reads
    /// linearizable with writes for that principal.
    pub async fn set(
        &self,
        principal: PrincipalId,
        new_tier: PlanTier,
        previous_tier: Option<PlanTier>,
        at: DateTime<Utc>,
    ) -> EngineResult<()> {
        let mut record = self.get(principal);
        record.tier = new_tier;
        record.previous_tier = previous_tier;
        record.last_transition = Some(at);

        if let Err(e) = self.backend.persist(principal, &record).await {
            tracing::warn!(%principal, error = %e, "entitlement write failed, prior tier stays active");
            return Err(e);
        }

        self.records.insert(principal, record);
        Ok(())
    }

    /// Warm-start: pull the persisted record into the cache, if one exists
    pub async fn hydrate(&self, principal: PrincipalId) -> EngineResult<()> {
        if let Some(record) = self.backend.load(principal).await? {
            self.records.insert(principal, record);
        }
        Ok(())
    }
}
