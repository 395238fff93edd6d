//! Counter key namespace.
//!
//! Keys are `quota:<tenant>:<period>:<bucket>:<kind>` where the bucket is the
//! UTC day (`YYYY-MM-DD`) or month (`YYYY-MM`). TTLs run slightly longer than
//! the period to absorb clock skew.

use std::time::Duration;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use weft_core::TenantId;

/// Counter period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuotaPeriod {
    /// One UTC day.
    Daily,
    /// One UTC month.
    Monthly,
}

impl QuotaPeriod {
    /// Stable string code used in keys and errors.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Monthly => "monthly",
        }
    }

    /// Counter TTL: 48 h for daily buckets, 62 d for monthly.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        match self {
            Self::Daily => Duration::from_secs(48 * 60 * 60),
            Self::Monthly => Duration::from_secs(62 * 24 * 60 * 60),
        }
    }
}

impl std::fmt::Display for QuotaPeriod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the counter counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CounterKind {
    /// Workflow executions.
    Workflow,
    /// Individual steps.
    Step,
}

impl CounterKind {
    /// Stable string code used in keys.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Workflow => "workflow",
            Self::Step => "step",
        }
    }
}

impl std::fmt::Display for CounterKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The bucket string for `period` at instant `at`.
#[must_use]
pub fn bucket(period: QuotaPeriod, at: DateTime<Utc>) -> String {
    match period {
        QuotaPeriod::Daily => at.format("%Y-%m-%d").to_string(),
        QuotaPeriod::Monthly => at.format("%Y-%m").to_string(),
    }
}

/// The bucket string for a daily counter on a specific date.
#[must_use]
pub(crate) fn daily_bucket(date: NaiveDate) -> String {
    format!("{:04}-{:02}-{:02}", date.year(), date.month(), date.day())
}

/// The full counter key for `tenant` at instant `at`.
#[must_use]
pub fn counter_key(
    tenant: TenantId,
    period: QuotaPeriod,
    kind: CounterKind,
    at: DateTime<Utc>,
) -> String {
    format!(
        "quota:{tenant}:{period}:{bucket}:{kind}",
        bucket = bucket(period, at)
    )
}

/// Key for a daily counter on a specific date, for range queries.
#[must_use]
pub(crate) fn daily_key(tenant: TenantId, date: NaiveDate, kind: CounterKind) -> String {
    format!(
        "quota:{tenant}:daily:{bucket}:{kind}",
        bucket = daily_bucket(date)
    )
}

/// Match-all pattern for one tenant's counters, for reset.
#[must_use]
pub(crate) fn tenant_pattern(tenant: TenantId) -> String {
    format!("quota:{tenant}:*")
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn buckets_are_utc_calendar_units() {
        let at = Utc.with_ymd_and_hms(2024, 3, 7, 23, 59, 59).unwrap();
        assert_eq!(bucket(QuotaPeriod::Daily, at), "2024-03-07");
        assert_eq!(bucket(QuotaPeriod::Monthly, at), "2024-03");
    }

    #[test]
    fn keys_are_namespaced() {
        let tenant = TenantId::new();
        let at = Utc.with_ymd_and_hms(2024, 3, 7, 12, 0, 0).unwrap();
        assert_eq!(
            counter_key(tenant, QuotaPeriod::Daily, CounterKind::Workflow, at),
            format!("quota:{tenant}:daily:2024-03-07:workflow")
        );
        assert_eq!(
            counter_key(tenant, QuotaPeriod::Monthly, CounterKind::Step, at),
            format!("quota:{tenant}:monthly:2024-03:step")
        );
    }

    #[test]
    fn ttls_outlive_their_period() {
        assert!(QuotaPeriod::Daily.ttl() > Duration::from_secs(24 * 60 * 60));
        assert!(QuotaPeriod::Monthly.ttl() > Duration::from_secs(31 * 24 * 60 * 60));
    }
}
