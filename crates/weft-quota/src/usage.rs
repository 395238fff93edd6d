//! AI usage accounting: per-call records, cost estimation, buffered logging.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, warn};
use weft_core::TenantId;

use crate::error::QuotaResult;

/// One AI provider call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiUsageRecord {
    /// Billed tenant.
    pub tenant_id: TenantId,
    /// Provider name, e.g. `openai` or `anthropic`.
    pub provider: String,
    /// Model identifier as reported by the provider.
    pub model: String,
    /// What the call was for, e.g. `generate_workflow`.
    pub action: String,
    /// Prompt tokens.
    pub tokens_in: i64,
    /// Completion tokens.
    pub tokens_out: i64,
    /// Whether the call succeeded.
    pub success: bool,
    /// Provider error code on failure.
    pub error_code: Option<String>,
    /// Wall-clock latency of the call.
    pub latency_ms: i64,
    /// Estimated cost in cents.
    pub estimated_cost_cents: i64,
    /// When the call was made.
    pub created_at: DateTime<Utc>,
}

/// Aggregated usage for one model, as returned by usage reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelUsage {
    /// Provider name.
    pub provider: String,
    /// Model identifier.
    pub model: String,
    /// Number of calls.
    pub calls: i64,
    /// Total prompt tokens.
    pub tokens_in: i64,
    /// Total completion tokens.
    pub tokens_out: i64,
    /// Total estimated cost in cents.
    pub cost_cents: i64,
}

/// Per-model usage totals over a date range.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AiUsageReport {
    /// One entry per (provider, model) pair.
    pub per_model: Vec<ModelUsage>,
}

/// Durable append target for usage records. Implemented by the store.
#[async_trait::async_trait]
pub trait AiUsageSink: Send + Sync {
    /// Append a batch of records.
    async fn append(&self, records: &[AiUsageRecord]) -> QuotaResult<()>;
}

/// Pricing per million tokens, in cents. Matched by provider and a model
/// substring; first match wins, so more specific rows come first.
struct PricingEntry {
    provider: &'static str,
    model_contains: &'static str,
    input_cents_per_million: i64,
    output_cents_per_million: i64,
}

const PRICING: &[PricingEntry] = &[
    PricingEntry {
        provider: "openai",
        model_contains: "gpt-4o-mini",
        input_cents_per_million: 15,
        output_cents_per_million: 60,
    },
    PricingEntry {
        provider: "openai",
        model_contains: "gpt-4o",
        input_cents_per_million: 250,
        output_cents_per_million: 1000,
    },
    PricingEntry {
        provider: "openai",
        model_contains: "gpt-4",
        input_cents_per_million: 3000,
        output_cents_per_million: 6000,
    },
    PricingEntry {
        provider: "openai",
        model_contains: "gpt-3.5",
        input_cents_per_million: 50,
        output_cents_per_million: 150,
    },
    PricingEntry {
        provider: "anthropic",
        model_contains: "haiku",
        input_cents_per_million: 80,
        output_cents_per_million: 400,
    },
    PricingEntry {
        provider: "anthropic",
        model_contains: "sonnet",
        input_cents_per_million: 300,
        output_cents_per_million: 1500,
    },
    PricingEntry {
        provider: "anthropic",
        model_contains: "opus",
        input_cents_per_million: 1500,
        output_cents_per_million: 7500,
    },
];

/// Conservative fallback for models missing from the table.
const DEFAULT_INPUT_CENTS_PER_MILLION: i64 = 3000;
const DEFAULT_OUTPUT_CENTS_PER_MILLION: i64 = 6000;

/// Estimate the cost of a call in cents, rounded up.
///
/// Unknown (provider, model) pairs are priced at the conservative default so
/// usage reports overstate rather than understate spend.
#[must_use]
pub fn estimate_cost_cents(provider: &str, model: &str, tokens_in: i64, tokens_out: i64) -> i64 {
    let (input_rate, output_rate) = PRICING
        .iter()
        .find(|entry| {
            entry.provider.eq_ignore_ascii_case(provider) && model.contains(entry.model_contains)
        })
        .map_or(
            (
                DEFAULT_INPUT_CENTS_PER_MILLION,
                DEFAULT_OUTPUT_CENTS_PER_MILLION,
            ),
            |entry| (entry.input_cents_per_million, entry.output_cents_per_million),
        );

    let cost = tokens_in.max(0) * input_rate + tokens_out.max(0) * output_rate;
    let divisor = 1_000_000;
    (cost + divisor - 1) / divisor
}

/// Buffered usage logger.
///
/// Records are accepted without blocking the caller and flushed to the sink
/// when the buffer fills or the flush interval elapses, whichever comes
/// first. Flush failures are logged and the batch is dropped; usage
/// accounting is best-effort by design.
#[derive(Debug)]
pub struct AiUsageLogger {
    tx: mpsc::Sender<AiUsageRecord>,
}

impl AiUsageLogger {
    /// Spawn the logger task.
    #[must_use]
    pub fn spawn(
        sink: Arc<dyn AiUsageSink>,
        buffer_size: usize,
        flush_interval: Duration,
    ) -> Self {
        let capacity = buffer_size.max(1);
        let (tx, mut rx) = mpsc::channel::<AiUsageRecord>(capacity * 2);
        tokio::spawn(async move {
            let mut buffer: Vec<AiUsageRecord> = Vec::with_capacity(capacity);
            let mut ticker = tokio::time::interval(flush_interval.max(Duration::from_millis(10)));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    record = rx.recv() => match record {
                        Some(record) => {
                            buffer.push(record);
                            if buffer.len() >= capacity {
                                Self::flush(&sink, &mut buffer).await;
                            }
                        }
                        None => {
                            Self::flush(&sink, &mut buffer).await;
                            break;
                        }
                    },
                    _ = ticker.tick() => Self::flush(&sink, &mut buffer).await,
                }
            }
            debug!("usage logger stopping");
        });
        Self { tx }
    }

    /// Record one call. Never blocks; drops the record if the logger is
    /// saturated or gone.
    pub fn record(&self, record: AiUsageRecord) {
        if let Err(e) = self.tx.try_send(record) {
            warn!(error = %e, "dropping usage record");
        }
    }

    async fn flush(sink: &Arc<dyn AiUsageSink>, buffer: &mut Vec<AiUsageRecord>) {
        if buffer.is_empty() {
            return;
        }
        let batch = std::mem::take(buffer);
        if let Err(e) = sink.append(&batch).await {
            warn!(records = batch.len(), error = %e, "usage flush failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[test]
    fn known_models_use_table_rates() {
        // 1M in + 1M out of gpt-4o-mini: 15 + 60 cents.
        assert_eq!(
            estimate_cost_cents("openai", "gpt-4o-mini-2024", 1_000_000, 1_000_000),
            75
        );
    }

    #[test]
    fn specific_rows_win_over_generic_ones() {
        let mini = estimate_cost_cents("openai", "gpt-4o-mini", 1_000_000, 0);
        let full = estimate_cost_cents("openai", "gpt-4o", 1_000_000, 0);
        assert!(mini < full);
    }

    #[test]
    fn unknown_models_fall_back_conservatively() {
        let unknown = estimate_cost_cents("acme", "frontier-1", 1_000_000, 0);
        assert_eq!(unknown, DEFAULT_INPUT_CENTS_PER_MILLION);
    }

    #[test]
    fn tiny_calls_round_up_to_one_cent() {
        assert_eq!(estimate_cost_cents("openai", "gpt-3.5-turbo", 10, 10), 1);
    }

    #[derive(Default)]
    struct RecordingSink {
        batches: Mutex<Vec<usize>>,
    }

    #[async_trait::async_trait]
    impl AiUsageSink for RecordingSink {
        async fn append(&self, records: &[AiUsageRecord]) -> QuotaResult<()> {
            self.batches.lock().unwrap().push(records.len());
            Ok(())
        }
    }

    fn record() -> AiUsageRecord {
        AiUsageRecord {
            tenant_id: TenantId::new(),
            provider: "openai".to_owned(),
            model: "gpt-4o".to_owned(),
            action: "generate_workflow".to_owned(),
            tokens_in: 100,
            tokens_out: 50,
            success: true,
            error_code: None,
            latency_ms: 420,
            estimated_cost_cents: estimate_cost_cents("openai", "gpt-4o", 100, 50),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn logger_flushes_when_the_buffer_fills() {
        let sink = Arc::new(RecordingSink::default());
        let logger = AiUsageLogger::spawn(
            Arc::clone(&sink) as Arc<dyn AiUsageSink>,
            2,
            Duration::from_secs(3600),
        );
        logger.record(record());
        logger.record(record());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(sink.batches.lock().unwrap().as_slice(), &[2]);
    }

    #[tokio::test]
    async fn logger_flushes_on_shutdown() {
        let sink = Arc::new(RecordingSink::default());
        let logger = AiUsageLogger::spawn(
            Arc::clone(&sink) as Arc<dyn AiUsageSink>,
            16,
            Duration::from_secs(3600),
        );
        logger.record(record());
        drop(logger);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(sink.batches.lock().unwrap().as_slice(), &[1]);
    }
}
