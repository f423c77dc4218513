//! In-memory record store.

use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{Mutation, RecordStore, ScopedQuery};
use crate::error::{StoreError, StoreResult};
use crate::tenant::TenantScoped;

/// A [`RecordStore`] backed by an ordered map keyed by record id.
///
/// Results come back in id order, which keeps paging deterministic.
#[derive(Debug)]
pub struct InMemoryStore<R> {
    records: RwLock<BTreeMap<String, R>>,
}

impl<R> Default for InMemoryStore<R> {
    fn default() -> Self {
        Self {
            records: RwLock::new(BTreeMap::new()),
        }
    }
}

impl<R: TenantScoped> InMemoryStore<R> {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with `records`, bypassing the guard.
    ///
    /// Intended for fixtures and migrations.
    pub fn with_records(records: impl IntoIterator<Item = R>) -> Self {
        let map = records
            .into_iter()
            .map(|r| (r.record_id().to_string(), r))
            .collect();
        Self {
            records: RwLock::new(map),
        }
    }

    /// Returns every stored record regardless of owner.
    pub fn snapshot(&self) -> Vec<R> {
        self.records.read().values().cloned().collect()
    }

    /// Returns the number of stored records regardless of owner.
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Returns `true` if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[async_trait]
impl<R: TenantScoped> RecordStore<R> for InMemoryStore<R> {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn fetch(&self, query: &ScopedQuery<R>) -> StoreResult<Vec<R>> {
        let records = self.records.read();
        let matching = records.values().filter(|r| query.matches(r)).skip(query.offset());
        Ok(match query.limit() {
            Some(limit) => matching.take(limit).cloned().collect(),
            None => matching.cloned().collect(),
        })
    }

    async fn count(&self, query: &ScopedQuery<R>) -> StoreResult<usize> {
        Ok(self.records.read().values().filter(|r| query.matches(r)).count())
    }

    async fn load(&self, id: &str) -> StoreResult<Option<R>> {
        Ok(self.records.read().get(id).cloned())
    }

    async fn insert(&self, record: R) -> StoreResult<R> {
        let mut records = self.records.write();
        let id = record.record_id().to_string();
        if records.contains_key(&id) {
            return Err(StoreError::AlreadyExists {
                entity_type: R::ENTITY_TYPE.to_string(),
                id,
            });
        }
        records.insert(id, record.clone());
        Ok(record)
    }

    async fn replace(&self, record: R) -> StoreResult<Option<R>> {
        let mut records = self.records.write();
        match records.get_mut(record.record_id()) {
            Some(existing) => {
                *existing = record.clone();
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    async fn remove(&self, id: &str) -> StoreResult<bool> {
        Ok(self.records.write().remove(id).is_some())
    }

    async fn update_where(
        &self,
        query: &ScopedQuery<R>,
        mutation: &Mutation<R>,
    ) -> StoreResult<usize> {
        let mut records = self.records.write();
        let mut updated = 0;
        for record in records.values_mut().filter(|r| query.matches(r)) {
            mutation.apply(record);
            updated += 1;
        }
        Ok(updated)
    }

    async fn delete_where(&self, query: &ScopedQuery<R>) -> StoreResult<usize> {
        let mut records = self.records.write();
        let before = records.len();
        records.retain(|_, r| !query.matches(r));
        Ok(before - records.len())
    }
}
