//! Tenant lookup contract.

use dashmap::DashMap;
use weft_core::{Tenant, TenantId, WorkflowResult};

/// Resolves tenant records for admission. Implemented by the store.
#[async_trait::async_trait]
pub trait TenantDirectory: Send + Sync {
    /// Fetch a tenant; `None` if unknown.
    async fn get_tenant(&self, id: TenantId) -> WorkflowResult<Option<Tenant>>;
}

/// Process-local tenant table, for tests and development.
#[derive(Debug, Default)]
pub struct InMemoryTenants {
    tenants: DashMap<TenantId, Tenant>,
}

impl InMemoryTenants {
    /// An empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a tenant.
    pub fn insert(&self, tenant: Tenant) {
        self.tenants.insert(tenant.id, tenant);
    }
}

#[async_trait::async_trait]
impl TenantDirectory for InMemoryTenants {
    async fn get_tenant(&self, id: TenantId) -> WorkflowResult<Option<Tenant>> {
        Ok(self.tenants.get(&id).map(|t| t.clone()))
    }
}
