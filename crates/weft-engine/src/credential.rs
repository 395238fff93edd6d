//! The credential contract.
//!
//! Secrets live behind the platform's envelope-crypto service; the engine
//! only ever sees resolved bytes through this trait.

use std::collections::HashMap;

use weft_core::{TenantId, WorkflowError, WorkflowResult};

/// Resolves tenant-scoped secrets referenced as `{{secrets.<name>}}`.
#[async_trait::async_trait]
pub trait CredentialResolver: Send + Sync {
    /// Resolve a credential to its plaintext bytes.
    ///
    /// # Errors
    ///
    /// [`WorkflowError::UnknownCredential`] if the tenant has no such
    /// credential; [`WorkflowError::CredentialDecryptFailed`] if decryption
    /// fails.
    async fn resolve(&self, tenant: TenantId, name: &str) -> WorkflowResult<Vec<u8>>;
}

/// A resolver for deployments without a credential service. Every lookup
/// fails with `unknown_credential`.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCredentials;

#[async_trait::async_trait]
impl CredentialResolver for NoCredentials {
    async fn resolve(&self, _tenant: TenantId, name: &str) -> WorkflowResult<Vec<u8>> {
        Err(WorkflowError::UnknownCredential {
            name: name.to_owned(),
        })
    }
}

/// A fixed in-memory credential table, for tests and local development.
#[derive(Debug, Default)]
pub struct StaticCredentials {
    entries: HashMap<(TenantId, String), Vec<u8>>,
}

impl StaticCredentials {
    /// An empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a credential for a tenant.
    pub fn insert(&mut self, tenant: TenantId, name: impl Into<String>, value: impl Into<Vec<u8>>) {
        self.entries.insert((tenant, name.into()), value.into());
    }
}

#[async_trait::async_trait]
impl CredentialResolver for StaticCredentials {
    async fn resolve(&self, tenant: TenantId, name: &str) -> WorkflowResult<Vec<u8>> {
        self.entries
            .get(&(tenant, name.to_owned()))
            .cloned()
            .ok_or_else(|| WorkflowError::UnknownCredential {
                name: name.to_owned(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_table_resolves_per_tenant() {
        let mut creds = StaticCredentials::new();
        let tenant = TenantId::new();
        creds.insert(tenant, "api_key", b"s3cret".to_vec());

        assert_eq!(
            creds.resolve(tenant, "api_key").await.unwrap(),
            b"s3cret".to_vec()
        );
        let err = creds.resolve(TenantId::new(), "api_key").await.unwrap_err();
        assert_eq!(err.kind(), "unknown_credential");
    }
}
