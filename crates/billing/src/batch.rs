use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use scdp_core::{Aggregate, AggregateId, AggregateRoot, Money, TenantId, UserId};
use scdp_events::Event;

use crate::allocation::{
    AllocationMethod, LineAllocation, LineId, LineInput, allocate, variance_percent,
};
use crate::error::AdjustmentError;

/// Invoice batch identifier (tenant-scoped via `tenant_id` fields in events/commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchId(pub AggregateId);

impl BatchId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for BatchId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Adjustment identifier (unique per applied adjustment, referenced by reversal).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AdjustmentId(uuid::Uuid);

impl AdjustmentId {
    pub fn new() -> Self {
        Self(uuid::Uuid::now_v7())
    }

    pub fn from_uuid(uuid: uuid::Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }
}

impl Default for AdjustmentId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for AdjustmentId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl core::str::FromStr for AdjustmentId {
    type Err = scdp_core::DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let uuid = s
            .parse::<uuid::Uuid>()
            .map_err(|e| scdp_core::DomainError::invalid_id(format!("AdjustmentId: {e}")))?;
        Ok(Self(uuid))
    }
}

/// Billable unit kind.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineType {
    Time,
    Expense,
    Milestone,
    Discount,
}

/// Pre-adjustment provenance captured the first time a line is adjusted.
/// Never overwritten by subsequent adjustments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineBaseline {
    pub original_amount: Money,
    pub original_rate: Option<Money>,
    pub original_quantity: Option<f64>,
}

/// Invoice line within a batch.
///
/// `original_amount` is immutable once set; `billed_amount` is overwritten by
/// each applied adjustment and is never negative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchLine {
    pub line_id: LineId,
    pub line_type: LineType,
    pub description: String,
    pub quantity: Option<f64>,
    pub rate: Option<Money>,
    pub original_amount: Money,
    pub billed_amount: Money,
    pub baseline: Option<LineBaseline>,
}

/// Line description used when opening a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineSpec {
    pub line_id: LineId,
    pub line_type: LineType,
    pub description: String,
    pub quantity: Option<f64>,
    pub rate: Option<Money>,
    pub amount: Money,
}

/// Applied adjustment as tracked in aggregate state (reversal bookkeeping).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustmentEntry {
    pub adjustment_id: AdjustmentId,
    pub line_details: Vec<LineAllocation>,
    pub reversed: bool,
}

/// Aggregate root: InvoiceBatch.
#[derive(Debug, Clone, PartialEq)]
pub struct InvoiceBatch {
    id: BatchId,
    tenant_id: Option<TenantId>,
    period: Option<String>,
    lines: Vec<BatchLine>,
    adjustments: Vec<AdjustmentEntry>,
    version: u64,
    created: bool,
}

impl InvoiceBatch {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: BatchId) -> Self {
        Self {
            id,
            tenant_id: None,
            period: None,
            lines: Vec::new(),
            adjustments: Vec::new(),
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> BatchId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn period(&self) -> Option<&str> {
        self.period.as_deref()
    }

    pub fn lines(&self) -> &[BatchLine] {
        &self.lines
    }

    pub fn adjustments(&self) -> &[AdjustmentEntry] {
        &self.adjustments
    }

    /// Sum of line `billed_amount`s.
    pub fn current_total(&self) -> Money {
        self.lines.iter().fold(Money::ZERO, |acc, l| {
            Money::from_cents(acc.cents().saturating_add(l.billed_amount.cents()))
        })
    }
}

impl AggregateRoot for InvoiceBatch {
    type Id = BatchId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: OpenBatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenBatch {
    pub tenant_id: TenantId,
    pub batch_id: BatchId,
    /// Billing period label (e.g. "2026-07").
    pub period: Option<String>,
    pub lines: Vec<LineSpec>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ApplyAdjustment.
///
/// Carries the allocation *inputs*; the aggregate recomputes the allocation
/// deterministically so a preview always matches its commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplyAdjustment {
    pub tenant_id: TenantId,
    pub batch_id: BatchId,
    pub adjustment_id: AdjustmentId,
    pub target_amount: Money,
    pub method: AllocationMethod,
    pub manual_amounts: Option<BTreeMap<LineId, Money>>,
    pub reason: String,
    /// Statement-of-work reference, when the adjustment reconciles to one.
    pub sow_id: Option<String>,
    pub applied_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReverseAdjustment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReverseAdjustment {
    pub tenant_id: TenantId,
    pub batch_id: BatchId,
    pub adjustment_id: AdjustmentId,
    pub reversed_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BatchCommand {
    OpenBatch(OpenBatch),
    ApplyAdjustment(ApplyAdjustment),
    ReverseAdjustment(ReverseAdjustment),
}

/// Event: BatchOpened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchOpened {
    pub tenant_id: TenantId,
    pub batch_id: BatchId,
    pub period: Option<String>,
    pub lines: Vec<LineSpec>,
    pub total_amount: Money,
    pub occurred_at: DateTime<Utc>,
}

/// Event: AdjustmentApplied. The full audit payload for one application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdjustmentApplied {
    pub tenant_id: TenantId,
    pub batch_id: BatchId,
    pub adjustment_id: AdjustmentId,
    pub target_amount: Money,
    pub method: AllocationMethod,
    pub reason: String,
    pub sow_id: Option<String>,
    pub applied_by: UserId,
    pub current_total_before: Money,
    /// `|target - current_total| / current_total`; `None` for zero-total batches.
    pub variance_percent: Option<f64>,
    pub degenerate_split: bool,
    pub line_details: Vec<LineAllocation>,
    pub occurred_at: DateTime<Utc>,
}

/// Line restoration carried by a reversal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoredLine {
    pub line_id: LineId,
    pub billed_amount: Money,
}

/// Event: AdjustmentReversed. Appended alongside the original record,
/// which is retained untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustmentReversed {
    pub tenant_id: TenantId,
    pub batch_id: BatchId,
    pub adjustment_id: AdjustmentId,
    pub restored_lines: Vec<RestoredLine>,
    pub reversed_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BatchEvent {
    BatchOpened(BatchOpened),
    AdjustmentApplied(AdjustmentApplied),
    AdjustmentReversed(AdjustmentReversed),
}

impl Event for BatchEvent {
    fn event_type(&self) -> &'static str {
        match self {
            BatchEvent::BatchOpened(_) => "billing.invoice_batch.opened",
            BatchEvent::AdjustmentApplied(_) => "billing.invoice_batch.adjustment_applied",
            BatchEvent::AdjustmentReversed(_) => "billing.invoice_batch.adjustment_reversed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            BatchEvent::BatchOpened(e) => e.occurred_at,
            BatchEvent::AdjustmentApplied(e) => e.occurred_at,
            BatchEvent::AdjustmentReversed(e) => e.occurred_at,
        }
    }
}

impl Aggregate for InvoiceBatch {
    type Command = BatchCommand;
    type Event = BatchEvent;
    type Error = AdjustmentError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            BatchEvent::BatchOpened(e) => {
                self.id = e.batch_id;
                self.tenant_id = Some(e.tenant_id);
                self.period = e.period.clone();
                self.lines = e
                    .lines
                    .iter()
                    .map(|spec| BatchLine {
                        line_id: spec.line_id,
                        line_type: spec.line_type,
                        description: spec.description.clone(),
                        quantity: spec.quantity,
                        rate: spec.rate,
                        original_amount: spec.amount,
                        billed_amount: spec.amount,
                        baseline: None,
                    })
                    .collect();
                self.adjustments = Vec::new();
                self.created = true;
            }
            BatchEvent::AdjustmentApplied(e) => {
                for detail in &e.line_details {
                    if let Some(line) =
                        self.lines.iter_mut().find(|l| l.line_id == detail.line_id)
                    {
                        if line.baseline.is_none() {
                            line.baseline = Some(LineBaseline {
                                original_amount: line.original_amount,
                                original_rate: line.rate,
                                original_quantity: line.quantity,
                            });
                        }
                        line.billed_amount = detail.new_amount;
                    }
                }
                self.adjustments.push(AdjustmentEntry {
                    adjustment_id: e.adjustment_id,
                    line_details: e.line_details.clone(),
                    reversed: false,
                });
            }
            BatchEvent::AdjustmentReversed(e) => {
                for restored in &e.restored_lines {
                    if let Some(line) =
                        self.lines.iter_mut().find(|l| l.line_id == restored.line_id)
                    {
                        line.billed_amount = restored.billed_amount;
                    }
                }
                if let Some(entry) = self
                    .adjustments
                    .iter_mut()
                    .find(|a| a.adjustment_id == e.adjustment_id)
                {
                    entry.reversed = true;
                }
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            BatchCommand::OpenBatch(cmd) => self.handle_open(cmd),
            BatchCommand::ApplyAdjustment(cmd) => self.handle_apply(cmd),
            BatchCommand::ReverseAdjustment(cmd) => self.handle_reverse(cmd),
        }
    }
}

impl InvoiceBatch {
    fn ensure_tenant(&self, tenant_id: TenantId) -> Result<(), AdjustmentError> {
        if !self.created {
            return Ok(());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(AdjustmentError::invariant("tenant mismatch"));
        }
        Ok(())
    }

    fn ensure_batch_id(&self, batch_id: BatchId) -> Result<(), AdjustmentError> {
        if self.id != batch_id {
            return Err(AdjustmentError::invariant("batch_id mismatch"));
        }
        Ok(())
    }

    fn handle_open(&self, cmd: &OpenBatch) -> Result<Vec<BatchEvent>, AdjustmentError> {
        if self.created {
            return Err(AdjustmentError::conflict("invoice batch already exists"));
        }

        if cmd.lines.is_empty() {
            return Err(AdjustmentError::validation(
                "cannot open an invoice batch without lines",
            ));
        }

        for (idx, spec) in cmd.lines.iter().enumerate() {
            if spec.amount.is_negative() {
                return Err(AdjustmentError::validation(format!(
                    "line {idx} amount must be non-negative"
                )));
            }
            if let Some(q) = spec.quantity {
                if !q.is_finite() || q < 0.0 {
                    return Err(AdjustmentError::validation(format!(
                        "line {idx} quantity must be a non-negative number"
                    )));
                }
            }
            if cmd.lines[..idx].iter().any(|l| l.line_id == spec.line_id) {
                return Err(AdjustmentError::validation(format!(
                    "duplicate line id {}",
                    spec.line_id
                )));
            }
        }

        let total_amount = Money::sum(cmd.lines.iter().map(|l| l.amount))?;

        Ok(vec![BatchEvent::BatchOpened(BatchOpened {
            tenant_id: cmd.tenant_id,
            batch_id: cmd.batch_id,
            period: cmd.period.clone(),
            lines: cmd.lines.clone(),
            total_amount,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_apply(&self, cmd: &ApplyAdjustment) -> Result<Vec<BatchEvent>, AdjustmentError> {
        if !self.created {
            return Err(AdjustmentError::NotFound);
        }
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_batch_id(cmd.batch_id)?;

        if cmd.reason.trim().is_empty() {
            return Err(AdjustmentError::MissingReason);
        }

        if self
            .adjustments
            .iter()
            .any(|a| a.adjustment_id == cmd.adjustment_id)
        {
            return Err(AdjustmentError::conflict(format!(
                "adjustment {} was already applied",
                cmd.adjustment_id
            )));
        }

        // Distribute over the *current* billed amounts: stacked adjustments
        // rebase on the previous one's result.
        let inputs: Vec<LineInput> = self
            .lines
            .iter()
            .map(|l| LineInput {
                line_id: l.line_id,
                original_amount: l.billed_amount,
                quantity: l.quantity,
            })
            .collect();

        let current_total_before = Money::sum(self.lines.iter().map(|l| l.billed_amount))?;

        let outcome = allocate(
            &inputs,
            cmd.target_amount,
            cmd.method,
            cmd.manual_amounts.as_ref(),
        )?;

        Ok(vec![BatchEvent::AdjustmentApplied(AdjustmentApplied {
            tenant_id: cmd.tenant_id,
            batch_id: cmd.batch_id,
            adjustment_id: cmd.adjustment_id,
            target_amount: cmd.target_amount,
            method: cmd.method,
            reason: cmd.reason.clone(),
            sow_id: cmd.sow_id.clone(),
            applied_by: cmd.applied_by,
            current_total_before,
            variance_percent: variance_percent(cmd.target_amount, current_total_before),
            degenerate_split: outcome.degenerate_split,
            line_details: outcome.allocations,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reverse(&self, cmd: &ReverseAdjustment) -> Result<Vec<BatchEvent>, AdjustmentError> {
        if !self.created {
            return Err(AdjustmentError::NotFound);
        }
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_batch_id(cmd.batch_id)?;

        let entry = self
            .adjustments
            .iter()
            .find(|a| a.adjustment_id == cmd.adjustment_id)
            .ok_or(AdjustmentError::NotFound)?;

        if entry.reversed {
            return Err(AdjustmentError::AlreadyReversed);
        }

        // Restore each affected line to the amount recorded as its base when
        // the adjustment was applied.
        let restored_lines = entry
            .line_details
            .iter()
            .map(|d| RestoredLine {
                line_id: d.line_id,
                billed_amount: d.original_amount,
            })
            .collect();

        Ok(vec![BatchEvent::AdjustmentReversed(AdjustmentReversed {
            tenant_id: cmd.tenant_id,
            batch_id: cmd.batch_id,
            adjustment_id: cmd.adjustment_id,
            restored_lines,
            reversed_by: cmd.reversed_by,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scdp_core::AggregateId;

    fn test_tenant_id() -> TenantId {
        TenantId::new()
    }

    fn test_batch_id() -> BatchId {
        BatchId::new(AggregateId::new())
    }

    fn test_user_id() -> UserId {
        UserId::new()
    }

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn time_line(amount_cents: i64, hours: f64) -> LineSpec {
        LineSpec {
            line_id: LineId::new(),
            line_type: LineType::Time,
            description: "Consulting hours".to_string(),
            quantity: Some(hours),
            rate: Some(Money::from_cents(20_000)),
            amount: Money::from_cents(amount_cents),
        }
    }

    fn opened_batch(lines: Vec<LineSpec>) -> (InvoiceBatch, TenantId, BatchId) {
        let tenant_id = test_tenant_id();
        let batch_id = test_batch_id();
        let mut batch = InvoiceBatch::empty(batch_id);
        let events = batch
            .handle(&BatchCommand::OpenBatch(OpenBatch {
                tenant_id,
                batch_id,
                period: Some("2026-07".to_string()),
                lines,
                occurred_at: test_time(),
            }))
            .unwrap();
        batch.apply(&events[0]);
        (batch, tenant_id, batch_id)
    }

    fn apply_cmd(
        tenant_id: TenantId,
        batch_id: BatchId,
        target_cents: i64,
        method: AllocationMethod,
        reason: &str,
    ) -> ApplyAdjustment {
        ApplyAdjustment {
            tenant_id,
            batch_id,
            adjustment_id: AdjustmentId::new(),
            target_amount: Money::from_cents(target_cents),
            method,
            manual_amounts: None,
            reason: reason.to_string(),
            sow_id: None,
            applied_by: test_user_id(),
            occurred_at: test_time(),
        }
    }

    #[test]
    fn open_batch_seeds_billed_from_original() {
        let (batch, _, _) = opened_batch(vec![time_line(10_000, 5.0), time_line(30_000, 15.0)]);
        assert_eq!(batch.current_total(), Money::from_cents(40_000));
        for line in batch.lines() {
            assert_eq!(line.billed_amount, line.original_amount);
            assert!(line.baseline.is_none());
        }
    }

    #[test]
    fn apply_adjustment_overwrites_billed_amounts_and_records_audit() {
        let (mut batch, tenant_id, batch_id) =
            opened_batch(vec![time_line(10_000, 5.0), time_line(30_000, 15.0)]);

        let cmd = apply_cmd(
            tenant_id,
            batch_id,
            20_000,
            AllocationMethod::ProRataAmount,
            "Contract cap per SOW-14",
        );
        let events = batch
            .handle(&BatchCommand::ApplyAdjustment(cmd))
            .unwrap();
        assert_eq!(events.len(), 1);

        match &events[0] {
            BatchEvent::AdjustmentApplied(e) => {
                assert_eq!(e.current_total_before, Money::from_cents(40_000));
                assert_eq!(e.line_details.len(), 2);
                assert_eq!(e.line_details[0].new_amount, Money::from_cents(5_000));
                assert_eq!(e.line_details[1].new_amount, Money::from_cents(15_000));
                // 40_000 -> 20_000 is a 50% variance; past the advisory threshold.
                assert!((e.variance_percent.unwrap() - 0.5).abs() < 1e-12);
                assert!(!e.degenerate_split);
            }
            other => panic!("expected AdjustmentApplied, got {other:?}"),
        }

        batch.apply(&events[0]);
        assert_eq!(batch.current_total(), Money::from_cents(20_000));
        assert_eq!(batch.adjustments().len(), 1);
        // First adjustment captures the provenance baseline.
        for line in batch.lines() {
            let baseline = line.baseline.as_ref().unwrap();
            assert_eq!(baseline.original_amount, line.original_amount);
        }
    }

    #[test]
    fn empty_reason_fails_without_mutating_lines() {
        let (batch, tenant_id, batch_id) = opened_batch(vec![time_line(10_000, 5.0)]);
        let before = batch.lines().to_vec();

        let cmd = apply_cmd(tenant_id, batch_id, 5_000, AllocationMethod::Flat, "   ");
        let err = batch
            .handle(&BatchCommand::ApplyAdjustment(cmd))
            .unwrap_err();
        assert_eq!(err, AdjustmentError::MissingReason);
        assert_eq!(batch.lines(), &before[..]);
    }

    #[test]
    fn invalid_target_fails_commit() {
        let (batch, tenant_id, batch_id) = opened_batch(vec![time_line(10_000, 5.0)]);
        let cmd = apply_cmd(
            tenant_id,
            batch_id,
            -500,
            AllocationMethod::ProRataAmount,
            "negative target",
        );
        let err = batch
            .handle(&BatchCommand::ApplyAdjustment(cmd))
            .unwrap_err();
        assert!(matches!(err, AdjustmentError::InvalidTargetAmount(_)));
    }

    #[test]
    fn reversal_restores_pre_adjustment_amounts() {
        let (mut batch, tenant_id, batch_id) =
            opened_batch(vec![time_line(10_000, 5.0), time_line(30_000, 15.0)]);

        let cmd = apply_cmd(
            tenant_id,
            batch_id,
            20_000,
            AllocationMethod::ProRataAmount,
            "Cap",
        );
        let adjustment_id = cmd.adjustment_id;
        let events = batch.handle(&BatchCommand::ApplyAdjustment(cmd)).unwrap();
        batch.apply(&events[0]);
        assert_eq!(batch.current_total(), Money::from_cents(20_000));

        let events = batch
            .handle(&BatchCommand::ReverseAdjustment(ReverseAdjustment {
                tenant_id,
                batch_id,
                adjustment_id,
                reversed_by: test_user_id(),
                occurred_at: test_time(),
            }))
            .unwrap();
        batch.apply(&events[0]);

        assert_eq!(batch.current_total(), Money::from_cents(40_000));
        assert_eq!(batch.lines()[0].billed_amount, Money::from_cents(10_000));
        assert_eq!(batch.lines()[1].billed_amount, Money::from_cents(30_000));
        assert!(batch.adjustments()[0].reversed);
    }

    #[test]
    fn reversal_of_stacked_adjustment_restores_previous_adjustment_result() {
        let (mut batch, tenant_id, batch_id) =
            opened_batch(vec![time_line(10_000, 5.0), time_line(30_000, 15.0)]);

        // First adjustment: 40_000 -> 20_000.
        let first = apply_cmd(
            tenant_id,
            batch_id,
            20_000,
            AllocationMethod::ProRataAmount,
            "Cap",
        );
        let events = batch.handle(&BatchCommand::ApplyAdjustment(first)).unwrap();
        batch.apply(&events[0]);

        // Second adjustment rebases on the first one's result.
        let second = apply_cmd(
            tenant_id,
            batch_id,
            10_000,
            AllocationMethod::Flat,
            "Further discount",
        );
        let second_id = second.adjustment_id;
        let events = batch.handle(&BatchCommand::ApplyAdjustment(second)).unwrap();
        batch.apply(&events[0]);
        assert_eq!(batch.current_total(), Money::from_cents(10_000));

        // Reversing the second lands back on the first one's amounts,
        // not the batch originals.
        let events = batch
            .handle(&BatchCommand::ReverseAdjustment(ReverseAdjustment {
                tenant_id,
                batch_id,
                adjustment_id: second_id,
                reversed_by: test_user_id(),
                occurred_at: test_time(),
            }))
            .unwrap();
        batch.apply(&events[0]);

        assert_eq!(batch.lines()[0].billed_amount, Money::from_cents(5_000));
        assert_eq!(batch.lines()[1].billed_amount, Money::from_cents(15_000));
    }

    #[test]
    fn second_reversal_fails_with_already_reversed() {
        let (mut batch, tenant_id, batch_id) = opened_batch(vec![time_line(10_000, 5.0)]);

        let cmd = apply_cmd(tenant_id, batch_id, 5_000, AllocationMethod::Flat, "Cap");
        let adjustment_id = cmd.adjustment_id;
        let events = batch.handle(&BatchCommand::ApplyAdjustment(cmd)).unwrap();
        batch.apply(&events[0]);

        let reverse = ReverseAdjustment {
            tenant_id,
            batch_id,
            adjustment_id,
            reversed_by: test_user_id(),
            occurred_at: test_time(),
        };
        let events = batch
            .handle(&BatchCommand::ReverseAdjustment(reverse.clone()))
            .unwrap();
        batch.apply(&events[0]);

        let err = batch
            .handle(&BatchCommand::ReverseAdjustment(reverse))
            .unwrap_err();
        assert_eq!(err, AdjustmentError::AlreadyReversed);
    }

    #[test]
    fn reversing_unknown_adjustment_fails_with_not_found() {
        let (batch, tenant_id, batch_id) = opened_batch(vec![time_line(10_000, 5.0)]);
        let err = batch
            .handle(&BatchCommand::ReverseAdjustment(ReverseAdjustment {
                tenant_id,
                batch_id,
                adjustment_id: AdjustmentId::new(),
                reversed_by: test_user_id(),
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert_eq!(err, AdjustmentError::NotFound);
    }

    #[test]
    fn baseline_is_not_overwritten_by_second_adjustment() {
        let (mut batch, tenant_id, batch_id) =
            opened_batch(vec![time_line(10_000, 5.0), time_line(30_000, 15.0)]);

        for target in [20_000i64, 8_000] {
            let cmd = apply_cmd(
                tenant_id,
                batch_id,
                target,
                AllocationMethod::ProRataAmount,
                "Cap",
            );
            let events = batch.handle(&BatchCommand::ApplyAdjustment(cmd)).unwrap();
            batch.apply(&events[0]);
        }

        // Baseline still points at the batch originals.
        assert_eq!(
            batch.lines()[0].baseline.as_ref().unwrap().original_amount,
            Money::from_cents(10_000)
        );
        assert_eq!(
            batch.lines()[1].baseline.as_ref().unwrap().original_amount,
            Money::from_cents(30_000)
        );
    }

    #[test]
    fn adjustment_on_unopened_batch_fails_with_not_found() {
        let batch = InvoiceBatch::empty(test_batch_id());
        let cmd = apply_cmd(
            test_tenant_id(),
            batch.id_typed(),
            5_000,
            AllocationMethod::Flat,
            "Cap",
        );
        let err = batch
            .handle(&BatchCommand::ApplyAdjustment(cmd))
            .unwrap_err();
        assert_eq!(err, AdjustmentError::NotFound);
    }

    #[test]
    fn tenant_mismatch_is_rejected() {
        let (batch, _tenant, batch_id) = opened_batch(vec![time_line(10_000, 5.0)]);
        let cmd = apply_cmd(
            test_tenant_id(),
            batch_id,
            5_000,
            AllocationMethod::Flat,
            "Cap",
        );
        let err = batch
            .handle(&BatchCommand::ApplyAdjustment(cmd))
            .unwrap_err();
        assert!(matches!(err, AdjustmentError::InvariantViolation(_)));
    }
}
