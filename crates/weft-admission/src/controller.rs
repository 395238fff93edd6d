//! The admission controller.

use std::sync::Arc;

use tracing::{debug, warn};
use weft_core::{ExecutionRequest, TenantId, TenantQuotas, WorkflowError, WorkflowResult};
use weft_engine::{AdmissionGate, StepMeter};
use weft_quota::{CounterKind, QuotaPeriod, QuotaService};

/// Gates execution requests on tenant standing and workflow quotas, and
/// meters step completions.
pub struct AdmissionController {
    tenants: Arc<dyn crate::TenantDirectory>,
    quota: Arc<dyn QuotaService>,
}

impl std::fmt::Debug for AdmissionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdmissionController").finish_non_exhaustive()
    }
}

impl AdmissionController {
    /// Wire the controller to its directory and counter service.
    #[must_use]
    pub fn new(tenants: Arc<dyn crate::TenantDirectory>, quota: Arc<dyn QuotaService>) -> Self {
        Self { tenants, quota }
    }

    async fn check_workflow_quota(
        &self,
        tenant: TenantId,
        quotas: &TenantQuotas,
    ) -> WorkflowResult<()> {
        let checks = [
            (QuotaPeriod::Daily, quotas.daily_workflow_limit),
            (QuotaPeriod::Monthly, quotas.monthly_workflow_limit),
        ];
        for (period, limit) in checks {
            let check = self
                .quota
                .check_quota(tenant, period, CounterKind::Workflow, limit)
                .await
                .map_err(|e| WorkflowError::PersistenceFailed(format!("quota store: {e}")))?;
            if check.exceeded {
                debug!(%tenant, %period, limit, "workflow quota exceeded");
                return Err(WorkflowError::QuotaExceeded {
                    period: period.as_str().to_owned(),
                    limit,
                    remaining: check.remaining,
                });
            }
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl AdmissionGate for AdmissionController {
    async fn admit(&self, request: &ExecutionRequest) -> WorkflowResult<()> {
        let tenant = self
            .tenants
            .get_tenant(request.tenant_id)
            .await?
            // An unknown tenant cannot run anything; surface it the same
            // way as a suspension.
            .ok_or(WorkflowError::TenantSuspended {
                tenant: request.tenant_id,
            })?;
        if !tenant.is_active() {
            return Err(WorkflowError::TenantSuspended { tenant: tenant.id });
        }

        self.check_workflow_quota(tenant.id, &tenant.quotas).await?;

        for period in [QuotaPeriod::Daily, QuotaPeriod::Monthly] {
            self.quota
                .increment(tenant.id, period, CounterKind::Workflow)
                .await
                .map_err(|e| WorkflowError::PersistenceFailed(format!("quota store: {e}")))?;
        }
        debug!(tenant = %tenant.id, workflow = %request.workflow_id, "request admitted");
        Ok(())
    }

    async fn release(&self, tenant: TenantId) {
        for period in [QuotaPeriod::Daily, QuotaPeriod::Monthly] {
            if let Err(e) = self
                .quota
                .decrement(tenant, period, CounterKind::Workflow)
                .await
            {
                warn!(%tenant, %period, error = %e, "failed to roll back workflow counter");
            }
        }
    }
}

#[async_trait::async_trait]
impl StepMeter for AdmissionController {
    async fn step_completed(&self, tenant: TenantId) {
        for period in [QuotaPeriod::Daily, QuotaPeriod::Monthly] {
            if let Err(e) = self
                .quota
                .increment(tenant, period, CounterKind::Step)
                .await
            {
                warn!(%tenant, %period, error = %e, "failed to meter step");
            }
        }
    }
}
