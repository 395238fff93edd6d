//! Append-only workflow version history.
//!
//! Every saved edit becomes an immutable version numbered from 1. Restoring
//! version N creates version N+1 with equal content, so history never
//! rewrites.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use tracing::info;
use weft_core::{WorkflowDefinition, WorkflowError, WorkflowId, WorkflowResult};
use weft_engine::DefinitionSource;

use crate::db::Store;
use crate::error::{StoreError, StoreResult};

/// One saved definition version.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowVersion {
    /// The workflow.
    pub workflow_id: WorkflowId,
    /// 1-based version number.
    pub version: i32,
    /// The immutable definition content.
    pub definition: WorkflowDefinition,
    /// When the version was saved.
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct VersionRow {
    workflow_id: uuid::Uuid,
    version: i32,
    definition: serde_json::Value,
    created_at: DateTime<Utc>,
}

impl TryFrom<VersionRow> for WorkflowVersion {
    type Error = StoreError;

    fn try_from(row: VersionRow) -> Result<Self, StoreError> {
        let definition: WorkflowDefinition = serde_json::from_value(row.definition)
            .map_err(|e| StoreError::Corrupt(format!("definition json: {e}")))?;
        Ok(WorkflowVersion {
            workflow_id: WorkflowId::from_uuid(row.workflow_id),
            version: row.version,
            definition,
            created_at: row.created_at,
        })
    }
}

impl Store {
    /// Save a definition as the workflow's next version. The definition is
    /// validated before anything is written. Returns the new version number.
    ///
    /// # Errors
    ///
    /// [`StoreError::Corrupt`] for invalid definitions, otherwise
    /// [`StoreError::Database`].
    pub async fn save_version(
        &self,
        workflow: WorkflowId,
        definition: &WorkflowDefinition,
    ) -> StoreResult<i32> {
        definition
            .validate()
            .map_err(|e| StoreError::Corrupt(format!("invalid definition: {e}")))?;
        let content = serde_json::to_value(definition)
            .map_err(|e| StoreError::Corrupt(format!("definition json: {e}")))?;

        let mut tx = self.pool.begin().await?;
        // The (workflow_id, version) primary key turns a racing save into a
        // unique violation instead of a silent overwrite.
        let version: i32 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(version), 0) + 1 FROM workflow_versions \
             WHERE workflow_id = $1",
        )
        .bind(workflow.as_uuid())
        .fetch_one(&mut *tx)
        .await?;
        sqlx::query(
            "INSERT INTO workflow_versions (workflow_id, version, definition, created_at) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(workflow.as_uuid())
        .bind(version)
        .bind(&content)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        info!(%workflow, version, "saved workflow version");
        Ok(version)
    }

    /// Load one version.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] if the version does not exist.
    pub async fn load_version(
        &self,
        workflow: WorkflowId,
        version: i32,
    ) -> StoreResult<WorkflowVersion> {
        let row = sqlx::query_as::<_, VersionRow>(
            "SELECT workflow_id, version, definition, created_at \
             FROM workflow_versions WHERE workflow_id = $1 AND version = $2",
        )
        .bind(workflow.as_uuid())
        .bind(version)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("workflow {workflow} version {version}")))?;
        row.try_into()
    }

    /// Load the latest version.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] if the workflow has no versions.
    pub async fn latest_version(&self, workflow: WorkflowId) -> StoreResult<WorkflowVersion> {
        let row = sqlx::query_as::<_, VersionRow>(
            "SELECT workflow_id, version, definition, created_at \
             FROM workflow_versions WHERE workflow_id = $1 \
             ORDER BY version DESC LIMIT 1",
        )
        .bind(workflow.as_uuid())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("workflow {workflow}")))?;
        row.try_into()
    }

    /// Restore version N by saving its content as a new version N+1.
    /// Returns the new version number.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] if version N does not exist.
    pub async fn restore_version(
        &self,
        workflow: WorkflowId,
        version: i32,
    ) -> StoreResult<i32> {
        let restored = self.load_version(workflow, version).await?;
        self.save_version(workflow, &restored.definition).await
    }

    /// All versions of a workflow, oldest first, without definitions.
    ///
    /// # Errors
    ///
    /// [`StoreError::Database`] on query failure.
    pub async fn list_versions(&self, workflow: WorkflowId) -> StoreResult<Vec<(i32, DateTime<Utc>)>> {
        let rows: Vec<(i32, DateTime<Utc>)> = sqlx::query_as(
            "SELECT version, created_at FROM workflow_versions \
             WHERE workflow_id = $1 ORDER BY version",
        )
        .bind(workflow.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

#[async_trait::async_trait]
impl DefinitionSource for Store {
    async fn load_definition(
        &self,
        workflow: WorkflowId,
        version: Option<i32>,
    ) -> WorkflowResult<(i32, WorkflowDefinition)> {
        let loaded = match version {
            Some(v) => self.load_version(workflow, v).await,
            None => self.latest_version(workflow).await,
        };
        match loaded {
            Ok(v) => Ok((v.version, v.definition)),
            Err(StoreError::NotFound(what)) => {
                Err(WorkflowError::InvalidDefinition(format!("unknown {what}")))
            }
            Err(e) => Err(WorkflowError::PersistenceFailed(e.to_string())),
        }
    }
}
