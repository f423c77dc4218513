//! Record store interface.
//!
//! The store is the external collaborator that actually persists records.
//! Palisade only requires predicate-based reads and predicate-based bulk
//! mutation; every read-side call receives a [`ScopedQuery`] whose tenant
//! scope the store must apply together with the caller's predicate.
//!
//! [`InMemoryStore`] is a complete implementation backed by a map, and
//! [`SharedSchemaPushdown`] renders the tenant scope for SQL-backed stores.

mod memory;
mod pushdown;
mod query;

pub use memory::InMemoryStore;
pub use pushdown::{SharedSchemaConfig, SharedSchemaPushdown};
pub use query::{Mutation, Predicate, QueryOptions, ScopedQuery, TenantScope};

use async_trait::async_trait;

use crate::error::StoreResult;
use crate::tenant::TenantScoped;

/// Storage backend for one tenant-isolated record type.
///
/// Implementations must treat the [`TenantScope`] of every [`ScopedQuery`] as
/// part of the filter: `fetch`, `count`, `update_where` and `delete_where`
/// only ever touch records the scope admits.
///
/// `load` and `remove` are by-id primitives without a scope. The isolation
/// guard uses them after it has checked ownership itself.
#[async_trait]
pub trait RecordStore<R: TenantScoped>: Send + Sync {
    /// Returns a human-readable name for this backend.
    fn backend_name(&self) -> &'static str;

    /// Returns the records matching `query`, honoring offset and limit.
    async fn fetch(&self, query: &ScopedQuery<R>) -> StoreResult<Vec<R>>;

    /// Counts the records matching `query`, ignoring offset and limit.
    async fn count(&self, query: &ScopedQuery<R>) -> StoreResult<usize>;

    /// Loads a record by id regardless of owner.
    async fn load(&self, id: &str) -> StoreResult<Option<R>>;

    /// Persists a new record.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::AlreadyExists` if the id is taken.
    async fn insert(&self, record: R) -> StoreResult<R>;

    /// Replaces an existing record; returns `None` if it does not exist.
    async fn replace(&self, record: R) -> StoreResult<Option<R>>;

    /// Removes a record by id; returns whether anything was removed.
    async fn remove(&self, id: &str) -> StoreResult<bool>;

    /// Applies `mutation` to every record matching `query`.
    async fn update_where(&self, query: &ScopedQuery<R>, mutation: &Mutation<R>)
    -> StoreResult<usize>;

    /// Removes every record matching `query`.
    async fn delete_where(&self, query: &ScopedQuery<R>) -> StoreResult<usize>;
}
