//! Tenant lookup for admission.

use weft_admission::TenantDirectory;
use weft_core::{Tenant, TenantId, WorkflowError, WorkflowResult};

use crate::db::Store;
use crate::error::StoreResult;
use crate::models::TenantRow;

impl Store {
    pub(crate) async fn fetch_tenant(&self, id: TenantId) -> StoreResult<Option<Tenant>> {
        let row = sqlx::query_as::<_, TenantRow>(
            "SELECT id, name, status, daily_workflow_limit, monthly_workflow_limit, \
             daily_step_limit FROM tenants WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        row.map(Tenant::try_from).transpose()
    }
}

#[async_trait::async_trait]
impl TenantDirectory for Store {
    async fn get_tenant(&self, id: TenantId) -> WorkflowResult<Option<Tenant>> {
        self.fetch_tenant(id)
            .await
            .map_err(|e| WorkflowError::PersistenceFailed(e.to_string()))
    }
}
