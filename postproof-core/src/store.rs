//! Record persistence.
//!
//! Stores must make [`RecordStore::apply_update`] atomic with respect to the
//! lease: an update lands only while the caller still holds the record's
//! lease and the record is still pending. That is what keeps two concurrent
//! maturation attempts from both writing.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

use crate::chain::Backend;
use crate::error::{ProofError, Result};
use crate::record::{RecordUpdate, TimestampRecord, TimestampStatus};

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn insert(&self, record: &TimestampRecord) -> Result<()>;

    async fn get(&self, id: Uuid) -> Result<Option<TimestampRecord>>;

    /// Most recently created record for a content reference.
    async fn latest_for_content_ref(&self, content_ref: &str) -> Result<Option<TimestampRecord>>;

    /// Pending records on the given backends, oldest first.
    async fn list_pending(&self, backends: &[Backend]) -> Result<Vec<Uuid>>;

    /// Take the record's lease unless someone else holds an unexpired one.
    async fn try_acquire_lease(&self, id: Uuid, holder: Uuid, ttl: Duration) -> Result<bool>;

    async fn release_lease(&self, id: Uuid, holder: Uuid) -> Result<()>;

    /// Apply `update` and release the lease, if `holder` still holds it and
    /// the record is pending. Returns whether the update landed.
    async fn apply_update(&self, id: Uuid, holder: Uuid, update: &RecordUpdate) -> Result<bool>;
}

struct Lease {
    holder: Uuid,
    expires_at: Instant,
}

struct Entry {
    record: TimestampRecord,
    lease: Option<Lease>,
}

impl Entry {
    fn leased_by_other(&self, holder: Uuid, now: Instant) -> bool {
        self.lease
            .as_ref()
            .is_some_and(|l| l.holder != holder && l.expires_at > now)
    }

    fn leased_by(&self, holder: Uuid, now: Instant) -> bool {
        self.lease
            .as_ref()
            .is_some_and(|l| l.holder == holder && l.expires_at > now)
    }
}

/// In-memory store for tests, the CLI and single-process deployments.
#[derive(Default)]
pub struct MemoryRecordStore {
    records: DashMap<Uuid, Entry>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn insert(&self, record: &TimestampRecord) -> Result<()> {
        record.check_invariants()?;
        match self.records.entry(record.id) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(ProofError::Store(format!(
                "record {} already exists",
                record.id
            ))),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(Entry {
                    record: record.clone(),
                    lease: None,
                });
                Ok(())
            }
        }
    }

    async fn get(&self, id: Uuid) -> Result<Option<TimestampRecord>> {
        Ok(self.records.get(&id).map(|e| e.record.clone()))
    }

    async fn latest_for_content_ref(&self, content_ref: &str) -> Result<Option<TimestampRecord>> {
        Ok(self
            .records
            .iter()
            .filter(|e| e.record.content_ref == content_ref)
            .max_by_key(|e| e.record.created_at)
            .map(|e| e.record.clone()))
    }

    async fn list_pending(&self, backends: &[Backend]) -> Result<Vec<Uuid>> {
        let mut pending: Vec<_> = self
            .records
            .iter()
            .filter(|e| {
                e.record.status == TimestampStatus::Pending && backends.contains(&e.record.backend)
            })
            .map(|e| (e.record.created_at, e.record.id))
            .collect();
        pending.sort();
        Ok(pending.into_iter().map(|(_, id)| id).collect())
    }

    async fn try_acquire_lease(&self, id: Uuid, holder: Uuid, ttl: Duration) -> Result<bool> {
        let Some(mut entry) = self.records.get_mut(&id) else {
            return Err(ProofError::NotFound(id.to_string()));
        };
        let now = Instant::now();
        if entry.leased_by_other(holder, now) {
            return Ok(false);
        }
        entry.lease = Some(Lease {
            holder,
            expires_at: now + ttl,
        });
        Ok(true)
    }

    async fn release_lease(&self, id: Uuid, holder: Uuid) -> Result<()> {
        if let Some(mut entry) = self.records.get_mut(&id) {
            if entry.lease.as_ref().is_some_and(|l| l.holder == holder) {
                entry.lease = None;
            }
        }
        Ok(())
    }

    async fn apply_update(&self, id: Uuid, holder: Uuid, update: &RecordUpdate) -> Result<bool> {
        let Some(mut entry) = self.records.get_mut(&id) else {
            return Err(ProofError::NotFound(id.to_string()));
        };
        if !entry.leased_by(holder, Instant::now())
            || entry.record.status != TimestampStatus::Pending
        {
            return Ok(false);
        }

        let mut updated = entry.record.clone();
        updated.apply(update)?;
        updated.check_invariants()?;
        entry.record = updated;
        entry.lease = None;
        Ok(true)
    }
}
