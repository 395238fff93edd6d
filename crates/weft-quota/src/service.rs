//! The narrow counter interface consumed by admission and the executor.

use chrono::Utc;
use dashmap::DashMap;
use weft_core::TenantId;

use crate::error::QuotaResult;
use crate::keys::{self, CounterKind, QuotaPeriod};

/// Result of a quota check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaCheck {
    /// Whether the limit is already reached.
    pub exceeded: bool,
    /// Remaining budget; `-1` when the limit is unlimited.
    pub remaining: i64,
}

/// Period counters, as seen by admission and step metering.
#[async_trait::async_trait]
pub trait QuotaService: Send + Sync {
    /// Check a limit without mutating. `limit = -1` means unlimited.
    async fn check_quota(
        &self,
        tenant: TenantId,
        period: QuotaPeriod,
        kind: CounterKind,
        limit: i64,
    ) -> QuotaResult<QuotaCheck>;

    /// Bump a counter; returns the new count.
    async fn increment(
        &self,
        tenant: TenantId,
        period: QuotaPeriod,
        kind: CounterKind,
    ) -> QuotaResult<i64>;

    /// Lower a counter, never below zero; returns the new count.
    async fn decrement(
        &self,
        tenant: TenantId,
        period: QuotaPeriod,
        kind: CounterKind,
    ) -> QuotaResult<i64>;

    /// Current count; `0` if absent.
    async fn get(
        &self,
        tenant: TenantId,
        period: QuotaPeriod,
        kind: CounterKind,
    ) -> QuotaResult<i64>;
}

/// Process-local counters with the same key layout as the Redis tracker.
///
/// Used by tests and single-node development setups; TTLs are not enforced.
#[derive(Debug, Default)]
pub struct InMemoryQuota {
    counters: DashMap<String, i64>,
}

impl InMemoryQuota {
    /// Create an empty counter table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl QuotaService for InMemoryQuota {
    async fn check_quota(
        &self,
        tenant: TenantId,
        period: QuotaPeriod,
        kind: CounterKind,
        limit: i64,
    ) -> QuotaResult<QuotaCheck> {
        if limit < 0 {
            return Ok(QuotaCheck {
                exceeded: false,
                remaining: -1,
            });
        }
        let current = self.get(tenant, period, kind).await?;
        Ok(QuotaCheck {
            exceeded: current >= limit,
            remaining: (limit - current).max(0),
        })
    }

    async fn increment(
        &self,
        tenant: TenantId,
        period: QuotaPeriod,
        kind: CounterKind,
    ) -> QuotaResult<i64> {
        let key = keys::counter_key(tenant, period, kind, Utc::now());
        let mut entry = self.counters.entry(key).or_insert(0);
        *entry += 1;
        Ok(*entry)
    }

    async fn decrement(
        &self,
        tenant: TenantId,
        period: QuotaPeriod,
        kind: CounterKind,
    ) -> QuotaResult<i64> {
        let key = keys::counter_key(tenant, period, kind, Utc::now());
        let mut entry = self.counters.entry(key).or_insert(0);
        if *entry > 0 {
            *entry -= 1;
        }
        Ok(*entry)
    }

    async fn get(
        &self,
        tenant: TenantId,
        period: QuotaPeriod,
        kind: CounterKind,
    ) -> QuotaResult<i64> {
        let key = keys::counter_key(tenant, period, kind, Utc::now());
        Ok(self.counters.get(&key).map_or(0, |v| *v))
    }
}
