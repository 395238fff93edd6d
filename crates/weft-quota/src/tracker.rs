//! Redis-backed quota tracker.
//!
//! The store's atomic `INCR` is the correctness substrate: increments are
//! safe under unbounded parallelism and the final count is exact. `INCR` and
//! `EXPIRE` are issued as one atomic pipeline so the TTL is re-applied on
//! every bump.

use chrono::{NaiveDate, Utc};
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tracing::{debug, instrument};
use weft_core::TenantId;

use crate::error::{QuotaError, QuotaResult};
use crate::keys::{self, CounterKind, QuotaPeriod};
use crate::service::{QuotaCheck, QuotaService};

/// Guarded decrement: never take a counter below zero.
const DECREMENT_SCRIPT: &str = r"
local current = tonumber(redis.call('GET', KEYS[1]) or '0')
if current > 0 then
  return redis.call('DECR', KEYS[1])
end
return 0
";

/// Per-day usage counts returned by [`QuotaTracker::usage_by_date_range`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct DailyUsage {
    /// The UTC day.
    pub date: NaiveDate,
    /// Workflow executions counted that day.
    pub workflows: i64,
    /// Steps counted that day.
    pub steps: i64,
}

/// Atomic period counters in Redis.
#[derive(Clone)]
pub struct QuotaTracker {
    conn: ConnectionManager,
}

impl std::fmt::Debug for QuotaTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuotaTracker").finish_non_exhaustive()
    }
}

impl QuotaTracker {
    /// Connect to the counter store.
    ///
    /// # Errors
    ///
    /// Returns [`QuotaError::Redis`] if the URL is invalid or the initial
    /// connection fails.
    pub async fn connect(url: &str) -> QuotaResult<Self> {
        let client = redis::Client::open(url)?;
        let conn = client.get_connection_manager().await?;
        Ok(Self { conn })
    }

    /// Wrap an existing managed connection.
    #[must_use]
    pub fn from_connection(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    /// Atomically bump a counter and refresh its TTL. Returns the new count.
    #[instrument(skip(self), level = "debug")]
    pub async fn increment(
        &self,
        tenant: TenantId,
        period: QuotaPeriod,
        kind: CounterKind,
    ) -> QuotaResult<i64> {
        let key = keys::counter_key(tenant, period, kind, Utc::now());
        let ttl = i64::try_from(period.ttl().as_secs()).unwrap_or(i64::MAX);
        let mut conn = self.conn.clone();
        let (count,): (i64,) = redis::pipe()
            .atomic()
            .incr(&key, 1)
            .expire(&key, ttl)
            .ignore()
            .query_async(&mut conn)
            .await?;
        debug!(%key, count, "incremented counter");
        Ok(count)
    }

    /// Decrement a counter, but never below zero. Returns the new count.
    pub async fn decrement(
        &self,
        tenant: TenantId,
        period: QuotaPeriod,
        kind: CounterKind,
    ) -> QuotaResult<i64> {
        let key = keys::counter_key(tenant, period, kind, Utc::now());
        let mut conn = self.conn.clone();
        let count: i64 = redis::Script::new(DECREMENT_SCRIPT)
            .key(&key)
            .invoke_async(&mut conn)
            .await?;
        Ok(count)
    }

    /// Current counter value; `0` if the key is missing.
    pub async fn get(
        &self,
        tenant: TenantId,
        period: QuotaPeriod,
        kind: CounterKind,
    ) -> QuotaResult<i64> {
        let key = keys::counter_key(tenant, period, kind, Utc::now());
        let mut conn = self.conn.clone();
        let count: Option<i64> = conn.get(&key).await?;
        Ok(count.unwrap_or(0))
    }

    /// Check a limit without mutating. `limit = -1` means unlimited.
    pub async fn check_quota(
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

    /// Per-day workflow and step counts over `[from, to]`, inclusive.
    ///
    /// # Errors
    ///
    /// Returns [`QuotaError::ReversedRange`] if `from > to`.
    pub async fn usage_by_date_range(
        &self,
        tenant: TenantId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> QuotaResult<Vec<DailyUsage>> {
        if from > to {
            return Err(QuotaError::ReversedRange { from, to });
        }

        let days: Vec<NaiveDate> = from.iter_days().take_while(|d| *d <= to).collect();
        let workflow_keys: Vec<String> = days
            .iter()
            .map(|d| keys::daily_key(tenant, *d, CounterKind::Workflow))
            .collect();
        let step_keys: Vec<String> = days
            .iter()
            .map(|d| keys::daily_key(tenant, *d, CounterKind::Step))
            .collect();

        let mut conn = self.conn.clone();
        let (workflows, steps): (Vec<Option<i64>>, Vec<Option<i64>>) = redis::pipe()
            .mget(&workflow_keys)
            .mget(&step_keys)
            .query_async(&mut conn)
            .await?;

        Ok(days
            .into_iter()
            .enumerate()
            .map(|(i, date)| DailyUsage {
                date,
                workflows: workflows.get(i).copied().flatten().unwrap_or(0),
                steps: steps.get(i).copied().flatten().unwrap_or(0),
            })
            .collect())
    }

    /// Delete every counter of a tenant.
    ///
    /// Returns the number of keys removed. Uses cursored `SCAN` so a tenant
    /// with many buckets never blocks the store.
    pub async fn reset(&self, tenant: TenantId) -> QuotaResult<u64> {
        let pattern = keys::tenant_pattern(tenant);
        let mut conn = self.conn.clone();
        let mut matched: Vec<String> = Vec::new();
        let mut cursor: u64 = 0;
        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut conn)
                .await?;
            matched.extend(keys);
            if next == 0 {
                break;
            }
            cursor = next;
        }

        if matched.is_empty() {
            return Ok(0);
        }
        let removed: u64 = conn.del(&matched).await?;
        debug!(%tenant, removed, "reset tenant counters");
        Ok(removed)
    }
}

#[async_trait::async_trait]
impl QuotaService for QuotaTracker {
    async fn check_quota(
        &self,
        tenant: TenantId,
        period: QuotaPeriod,
        kind: CounterKind,
        limit: i64,
    ) -> QuotaResult<QuotaCheck> {
        Self::check_quota(self, tenant, period, kind, limit).await
    }

    async fn increment(
        &self,
        tenant: TenantId,
        period: QuotaPeriod,
        kind: CounterKind,
    ) -> QuotaResult<i64> {
        Self::increment(self, tenant, period, kind).await
    }

    async fn decrement(
        &self,
        tenant: TenantId,
        period: QuotaPeriod,
        kind: CounterKind,
    ) -> QuotaResult<i64> {
        Self::decrement(self, tenant, period, kind).await
    }

    async fn get(
        &self,
        tenant: TenantId,
        period: QuotaPeriod,
        kind: CounterKind,
    ) -> QuotaResult<i64> {
        Self::get(self, tenant, period, kind).await
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    // Tracker behaviour against a live store is covered by the in-memory
    // service tests; here we pin the pure parts.

    #[test]
    fn reversed_range_is_detected_before_touching_the_store() {
        let from = NaiveDate::from_ymd_opt(2024, 3, 8).unwrap();
        let to = NaiveDate::from_ymd_opt(2024, 3, 7).unwrap();
        assert!(from > to);
    }

    #[test]
    fn decrement_script_guards_zero() {
        assert!(DECREMENT_SCRIPT.contains("current > 0"));
        assert!(DECREMENT_SCRIPT.contains("DECR"));
    }
}
