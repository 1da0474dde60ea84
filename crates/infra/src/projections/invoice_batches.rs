use std::collections::HashMap;
use std::sync::{Mutex, RwLock};

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use thiserror::Error;

use scdp_billing::{
    AdjustmentId, AllocationMethod, BatchEvent, BatchId, LineAllocation, LineId, LineType,
    exceeds_variance_threshold,
};
use scdp_core::{AggregateId, Money, TenantId, UserId};
use scdp_events::EventEnvelope;

use crate::read_model::TenantStore;

/// Aggregate type tag batch events are appended under.
pub const BATCH_AGGREGATE_TYPE: &str = "billing.invoice_batch";

/// Queryable line state (live billed amount + cumulative variance).
#[derive(Debug, Clone, PartialEq)]
pub struct LineReadModel {
    pub line_id: LineId,
    pub line_type: LineType,
    pub description: String,
    pub quantity: Option<f64>,
    pub rate: Option<Money>,
    pub original_amount: Money,
    pub billed_amount: Money,
    /// `billed_amount - original_amount`.
    pub variance: Money,
}

/// One stored adjustment application; never mutated except for the reversal
/// marks, which supersede rather than erase it.
#[derive(Debug, Clone, PartialEq)]
pub struct AdjustmentRecord {
    pub adjustment_id: AdjustmentId,
    pub target_amount: Money,
    pub method: AllocationMethod,
    pub reason: String,
    pub sow_id: Option<String>,
    pub applied_by: UserId,
    pub applied_at: DateTime<Utc>,
    pub current_total_before: Money,
    pub variance_percent: Option<f64>,
    pub degenerate_split: bool,
    pub line_details: Vec<LineAllocation>,
    pub reversed_at: Option<DateTime<Utc>>,
    pub reversed_by: Option<UserId>,
}

impl AdjustmentRecord {
    pub fn is_reversed(&self) -> bool {
        self.reversed_at.is_some()
    }
}

/// Queryable invoice batch read model (header + lines + audit history).
#[derive(Debug, Clone, PartialEq)]
pub struct InvoiceBatchReadModel {
    pub batch_id: BatchId,
    pub period: Option<String>,
    pub lines: Vec<LineReadModel>,
    pub current_total: Money,
    pub adjustments: Vec<AdjustmentRecord>,
}

/// Aggregated view over a batch's adjustment history.
#[derive(Debug, Clone, PartialEq)]
pub struct AdjustmentSummary {
    pub batch_id: BatchId,
    pub adjustment_count: usize,
    pub reversed_count: usize,
    /// Applications above `LARGE_VARIANCE_THRESHOLD` (for auditors).
    pub large_variance_count: usize,
    pub original_total: Money,
    pub current_total: Money,
    /// `current_total - original_total`.
    pub net_variance: Money,
    pub last_applied_at: Option<DateTime<Utc>>,
    pub last_method: Option<AllocationMethod>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct CursorKey {
    tenant_id: TenantId,
    aggregate_id: AggregateId,
}

#[derive(Debug, Error)]
pub enum BatchProjectionError {
    #[error("failed to deserialize batch event: {0}")]
    Deserialize(String),
    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),
    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },
    #[error("adjustment event for unknown batch {0}")]
    UnknownBatch(String),
}

/// Projection of batch events into [`InvoiceBatchReadModel`]s.
#[derive(Debug)]
pub struct InvoiceBatchesProjection<S>
where
    S: TenantStore<BatchId, InvoiceBatchReadModel>,
{
    store: S,
    cursors: RwLock<HashMap<CursorKey, u64>>,
    /// Serializes `apply_envelope`: the cursor check and the read-model
    /// upsert must be atomic for duplicate delivery to stay a no-op.
    apply_guard: Mutex<()>,
}

impl<S> InvoiceBatchesProjection<S>
where
    S: TenantStore<BatchId, InvoiceBatchReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: RwLock::new(HashMap::new()),
            apply_guard: Mutex::new(()),
        }
    }

    fn cursor(&self, tenant_id: TenantId, aggregate_id: AggregateId) -> u64 {
        match self.cursors.read() {
            Ok(cursors) => *cursors
                .get(&CursorKey {
                    tenant_id,
                    aggregate_id,
                })
                .unwrap_or(&0),
            Err(_) => 0,
        }
    }

    fn update_cursor(&self, tenant_id: TenantId, aggregate_id: AggregateId, seq: u64) {
        if let Ok(mut cursors) = self.cursors.write() {
            cursors.insert(
                CursorKey {
                    tenant_id,
                    aggregate_id,
                },
                seq,
            );
        }
    }

    fn clear_cursors(&self, tenant_id: TenantId) {
        if let Ok(mut cursors) = self.cursors.write() {
            cursors.retain(|k, _| k.tenant_id != tenant_id);
        }
    }

    pub fn get(&self, tenant_id: TenantId, batch_id: &BatchId) -> Option<InvoiceBatchReadModel> {
        self.store.get(tenant_id, batch_id)
    }

    pub fn list(&self, tenant_id: TenantId) -> Vec<InvoiceBatchReadModel> {
        self.store.list(tenant_id)
    }

    /// Stored adjustment records, oldest first.
    pub fn history(&self, tenant_id: TenantId, batch_id: &BatchId) -> Option<Vec<AdjustmentRecord>> {
        self.get(tenant_id, batch_id).map(|rm| rm.adjustments)
    }

    pub fn summary(&self, tenant_id: TenantId, batch_id: &BatchId) -> Option<AdjustmentSummary> {
        self.get(tenant_id, batch_id).map(|rm| {
            let reversed_count = rm.adjustments.iter().filter(|a| a.is_reversed()).count();
            let large_variance_count = rm
                .adjustments
                .iter()
                .filter(|a| exceeds_variance_threshold(a.variance_percent))
                .count();
            let original_total = sum_cents(rm.lines.iter().map(|l| l.original_amount));
            let last = rm.adjustments.last();

            AdjustmentSummary {
                batch_id: rm.batch_id,
                adjustment_count: rm.adjustments.len(),
                reversed_count,
                large_variance_count,
                original_total,
                current_total: rm.current_total,
                net_variance: Money::from_cents(
                    rm.current_total.cents().saturating_sub(original_total.cents()),
                ),
                last_applied_at: last.map(|a| a.applied_at),
                last_method: last.map(|a| a.method),
            }
        })
    }

    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), BatchProjectionError> {
        if envelope.aggregate_type() != BATCH_AGGREGATE_TYPE {
            return Ok(());
        }

        let _guard = self
            .apply_guard
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let tenant_id = envelope.tenant_id();
        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();

        let last = self.cursor(tenant_id, aggregate_id);
        if seq == 0 {
            return Err(BatchProjectionError::NonMonotonicSequence { last, found: seq });
        }
        if seq <= last {
            // Duplicate delivery: at-least-once is fine, skip.
            return Ok(());
        }
        if seq != last + 1 && last != 0 {
            return Err(BatchProjectionError::NonMonotonicSequence { last, found: seq });
        }

        let ev: BatchEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| BatchProjectionError::Deserialize(e.to_string()))?;

        let (event_tenant, batch_id) = match &ev {
            BatchEvent::BatchOpened(e) => (e.tenant_id, e.batch_id),
            BatchEvent::AdjustmentApplied(e) => (e.tenant_id, e.batch_id),
            BatchEvent::AdjustmentReversed(e) => (e.tenant_id, e.batch_id),
        };

        if event_tenant != tenant_id {
            return Err(BatchProjectionError::TenantIsolation(
                "event tenant_id does not match envelope tenant_id".to_string(),
            ));
        }
        if batch_id.0 != aggregate_id {
            return Err(BatchProjectionError::TenantIsolation(
                "event batch_id does not match envelope aggregate_id".to_string(),
            ));
        }

        match ev {
            BatchEvent::BatchOpened(e) => {
                let lines: Vec<LineReadModel> = e
                    .lines
                    .iter()
                    .map(|spec| LineReadModel {
                        line_id: spec.line_id,
                        line_type: spec.line_type,
                        description: spec.description.clone(),
                        quantity: spec.quantity,
                        rate: spec.rate,
                        original_amount: spec.amount,
                        billed_amount: spec.amount,
                        variance: Money::ZERO,
                    })
                    .collect();

                self.store.upsert(
                    tenant_id,
                    e.batch_id,
                    InvoiceBatchReadModel {
                        batch_id: e.batch_id,
                        period: e.period,
                        lines,
                        current_total: e.total_amount,
                        adjustments: Vec::new(),
                    },
                );
            }
            BatchEvent::AdjustmentApplied(e) => {
                let mut rm = self
                    .store
                    .get(tenant_id, &e.batch_id)
                    .ok_or_else(|| BatchProjectionError::UnknownBatch(e.batch_id.to_string()))?;

                for detail in &e.line_details {
                    if let Some(line) = rm.lines.iter_mut().find(|l| l.line_id == detail.line_id) {
                        line.billed_amount = detail.new_amount;
                        line.variance = Money::from_cents(
                            line.billed_amount
                                .cents()
                                .saturating_sub(line.original_amount.cents()),
                        );
                    }
                }
                rm.current_total = sum_cents(rm.lines.iter().map(|l| l.billed_amount));
                rm.adjustments.push(AdjustmentRecord {
                    adjustment_id: e.adjustment_id,
                    target_amount: e.target_amount,
                    method: e.method,
                    reason: e.reason,
                    sow_id: e.sow_id,
                    applied_by: e.applied_by,
                    applied_at: e.occurred_at,
                    current_total_before: e.current_total_before,
                    variance_percent: e.variance_percent,
                    degenerate_split: e.degenerate_split,
                    line_details: e.line_details,
                    reversed_at: None,
                    reversed_by: None,
                });

                self.store.upsert(tenant_id, e.batch_id, rm);
            }
            BatchEvent::AdjustmentReversed(e) => {
                let mut rm = self
                    .store
                    .get(tenant_id, &e.batch_id)
                    .ok_or_else(|| BatchProjectionError::UnknownBatch(e.batch_id.to_string()))?;

                for restored in &e.restored_lines {
                    if let Some(line) = rm.lines.iter_mut().find(|l| l.line_id == restored.line_id)
                    {
                        line.billed_amount = restored.billed_amount;
                        line.variance = Money::from_cents(
                            line.billed_amount
                                .cents()
                                .saturating_sub(line.original_amount.cents()),
                        );
                    }
                }
                rm.current_total = sum_cents(rm.lines.iter().map(|l| l.billed_amount));
                if let Some(record) = rm
                    .adjustments
                    .iter_mut()
                    .find(|a| a.adjustment_id == e.adjustment_id)
                {
                    record.reversed_at = Some(e.occurred_at);
                    record.reversed_by = Some(e.reversed_by);
                }

                self.store.upsert(tenant_id, e.batch_id, rm);
            }
        }

        self.update_cursor(tenant_id, aggregate_id, seq);
        Ok(())
    }

    /// Rebuild the read models for every tenant present in `envelopes`.
    pub fn rebuild_from_scratch(
        &self,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<(), BatchProjectionError> {
        let mut envs: Vec<_> = envelopes.into_iter().collect();

        {
            let mut tenants = envs.iter().map(|e| e.tenant_id()).collect::<Vec<_>>();
            tenants.sort_by_key(|t| *t.as_uuid().as_bytes());
            tenants.dedup();
            for t in tenants {
                self.store.clear_tenant(t);
                self.clear_cursors(t);
            }
        }

        envs.sort_by_key(|e| {
            (
                *e.tenant_id().as_uuid().as_bytes(),
                *e.aggregate_id().as_uuid().as_bytes(),
                e.sequence_number(),
            )
        });

        for env in &envs {
            self.apply_envelope(env)?;
        }
        Ok(())
    }
}

fn sum_cents(amounts: impl Iterator<Item = Money>) -> Money {
    Money::from_cents(amounts.fold(0i64, |acc, m| acc.saturating_add(m.cents())))
}
