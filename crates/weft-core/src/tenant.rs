//! Tenant records, as consumed by admission.

use serde::{Deserialize, Serialize};

use crate::types::TenantId;

/// Account standing of a tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TenantStatus {
    /// Requests are admitted subject to quota.
    Active,
    /// Every request is rejected with `tenant_suspended`.
    Suspended,
}

/// Per-tenant execution quotas. `-1` means unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantQuotas {
    /// Workflow executions allowed per UTC day.
    pub daily_workflow_limit: i64,
    /// Workflow executions allowed per UTC month.
    pub monthly_workflow_limit: i64,
    /// Steps allowed per UTC day.
    pub daily_step_limit: i64,
}

impl Default for TenantQuotas {
    fn default() -> Self {
        Self {
            daily_workflow_limit: -1,
            monthly_workflow_limit: -1,
            daily_step_limit: -1,
        }
    }
}

/// A tenant as seen by the execution core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tenant {
    /// Tenant id.
    pub id: TenantId,
    /// Display name.
    pub name: String,
    /// Account standing.
    pub status: TenantStatus,
    /// Execution quotas.
    pub quotas: TenantQuotas,
}

impl Tenant {
    /// Whether admission may accept requests for this tenant.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self.status, TenantStatus::Active)
    }
}
