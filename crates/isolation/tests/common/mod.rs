//! Shared fixtures for isolation integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use palisade_isolation::observe::MemorySink;
use palisade_isolation::prelude::*;

/// A minimal tenant-owned record.
#[derive(Clone, Debug, PartialEq)]
pub struct Invoice {
    pub id: String,
    pub tenant_id: TenantId,
    pub amount_cents: i64,
    pub paid: bool,
}

impl TenantScoped for Invoice {
    const ENTITY_TYPE: &'static str = "Invoice";

    fn record_id(&self) -> &str {
        &self.id
    }

    fn tenant_id(&self) -> Option<&TenantId> {
        self.tenant_id.non_empty()
    }

    fn assign_tenant(&mut self, tenant_id: TenantId) {
        self.tenant_id = tenant_id;
    }
}

pub fn invoice(id: &str, tenant: &str, amount_cents: i64) -> Invoice {
    Invoice {
        id: id.to_string(),
        tenant_id: TenantId::new(tenant),
        amount_cents,
        paid: false,
    }
}

pub fn tenant_context(id: &str) -> TenantContext {
    TenantContext::for_tenant(TenantId::new(id), format!("header:{id}")).unwrap()
}

/// Everything one simulated request needs.
pub struct Fixture {
    pub store: Arc<InMemoryStore<Invoice>>,
    pub holder: Arc<ContextHolder>,
    pub sink: Arc<MemorySink>,
    pub guard: IsolationGuard<Invoice, InMemoryStore<Invoice>>,
    pub manager: CrossTenantManager,
}

impl Fixture {
    /// Seeds two invoices for `acme` and one for `globex`.
    pub fn new(context: TenantContext) -> Self {
        let store = Arc::new(InMemoryStore::with_records([
            invoice("inv-1", "acme", 1_000),
            invoice("inv-2", "acme", 2_500),
            invoice("inv-3", "globex", 9_900),
        ]));
        Self::with_store(store, context)
    }

    pub fn with_store(store: Arc<InMemoryStore<Invoice>>, context: TenantContext) -> Self {
        let holder = Arc::new(ContextHolder::with_context(context));
        let sink = Arc::new(MemorySink::new());
        let observer = Observer::with_sink(sink.clone());
        let guard = IsolationGuard::new(store.clone(), holder.clone(), observer.clone());
        let manager = CrossTenantManager::new(holder.clone(), observer);
        Self {
            store,
            holder,
            sink,
            guard,
            manager,
        }
    }
}
