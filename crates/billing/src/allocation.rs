//! Allocation engine: distribute a target amount across invoice lines.
//!
//! `allocate` is a pure function over already-fetched line data, callable
//! repeatedly for live preview. Commit/reversal live on the `InvoiceBatch`
//! aggregate in [`crate::batch`], which calls back into this module so a
//! preview always matches its commit.
//!
//! Rounding policy: every computed amount is rounded half-up to the cent and
//! clamped at zero; per-line variance is computed from the *rounded* amount.
//! The sum of rounded amounts therefore never drifts from the target by more
//! than half a cent per line.

use core::str::FromStr;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use scdp_core::{DomainError, Money};

use crate::error::AdjustmentError;

/// Identifier of a single invoice line within a batch.
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct LineId(Uuid);

impl LineId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for LineId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for LineId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for LineId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let uuid =
            Uuid::from_str(s).map_err(|e| DomainError::invalid_id(format!("LineId: {e}")))?;
        Ok(Self(uuid))
    }
}

/// Distribution policy for an adjustment.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationMethod {
    /// Weighted by each line's current amount.
    ProRataAmount,
    /// Weighted by each line's quantity (hours/units), defaulting to 1.
    ProRataHours,
    /// Equal share per line regardless of current amounts.
    Flat,
    /// Caller-supplied per-line amounts; absent lines keep their amount.
    Manual,
}

impl AllocationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            AllocationMethod::ProRataAmount => "pro_rata_amount",
            AllocationMethod::ProRataHours => "pro_rata_hours",
            AllocationMethod::Flat => "flat",
            AllocationMethod::Manual => "manual",
        }
    }
}

impl FromStr for AllocationMethod {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pro_rata_amount" => Ok(AllocationMethod::ProRataAmount),
            "pro_rata_hours" => Ok(AllocationMethod::ProRataHours),
            "flat" => Ok(AllocationMethod::Flat),
            "manual" => Ok(AllocationMethod::Manual),
            other => Err(DomainError::validation(format!(
                "allocation method must be one of: pro_rata_amount, pro_rata_hours, flat, manual (got '{other}')"
            ))),
        }
    }
}

/// Per-line input to the allocator.
///
/// `original_amount` is the base the distribution works from: for a first
/// adjustment that is the line's original amount, for stacked adjustments the
/// current billed amount.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineInput {
    pub line_id: LineId,
    pub original_amount: Money,
    pub quantity: Option<f64>,
}

/// Per-line result of an allocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineAllocation {
    pub line_id: LineId,
    pub original_amount: Money,
    pub new_amount: Money,
    /// `new_amount - original_amount`, computed from the rounded amount.
    pub variance: Money,
}

/// Result of a single allocation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationOutcome {
    pub allocations: Vec<LineAllocation>,
    /// A zero-weight denominator forced an equal split. Degenerate input,
    /// not an error.
    pub degenerate_split: bool,
}

/// Compute per-line amounts for `target_amount` under `method`.
///
/// Pure: no side effects, identical inputs yield identical output. This is
/// the preview mode; commit re-runs the same computation inside the
/// aggregate.
pub fn allocate(
    lines: &[LineInput],
    target_amount: Money,
    method: AllocationMethod,
    manual_amounts: Option<&BTreeMap<LineId, Money>>,
) -> Result<AllocationOutcome, AdjustmentError> {
    if lines.is_empty() {
        return Err(AdjustmentError::validation(
            "cannot allocate over an empty line set",
        ));
    }
    if target_amount.cents() <= 0 {
        return Err(AdjustmentError::InvalidTargetAmount(format!(
            "must be positive, got {target_amount}"
        )));
    }
    for line in lines {
        if line.original_amount.is_negative() {
            return Err(AdjustmentError::validation(format!(
                "line {} has a negative amount",
                line.line_id
            )));
        }
        if let Some(q) = line.quantity {
            if !q.is_finite() || q < 0.0 {
                return Err(AdjustmentError::validation(format!(
                    "line {} has an invalid quantity {q}",
                    line.line_id
                )));
            }
        }
    }

    let target = target_amount.cents() as f64;
    let count = lines.len() as f64;
    let mut degenerate_split = false;

    let raw_cents: Vec<f64> = match method {
        AllocationMethod::ProRataAmount => {
            let current_total = Money::sum(lines.iter().map(|l| l.original_amount))?;
            if current_total.cents() == 0 {
                degenerate_split = true;
                vec![target / count; lines.len()]
            } else {
                let total = current_total.cents() as f64;
                lines
                    .iter()
                    .map(|l| target * l.original_amount.cents() as f64 / total)
                    .collect()
            }
        }
        AllocationMethod::ProRataHours => {
            let weights: Vec<f64> = lines.iter().map(|l| l.quantity.unwrap_or(1.0)).collect();
            let total_quantity: f64 = weights.iter().sum();
            if total_quantity == 0.0 {
                degenerate_split = true;
                vec![target / count; lines.len()]
            } else {
                weights.iter().map(|w| target * w / total_quantity).collect()
            }
        }
        AllocationMethod::Flat => {
            vec![target / count; lines.len()]
        }
        AllocationMethod::Manual => {
            if let Some(map) = manual_amounts {
                for line_id in map.keys() {
                    if !lines.iter().any(|l| l.line_id == *line_id) {
                        return Err(AdjustmentError::validation(format!(
                            "manual amount references unknown line {line_id}"
                        )));
                    }
                }
            }
            let mut raw = Vec::with_capacity(lines.len());
            for line in lines {
                match manual_amounts.and_then(|m| m.get(&line.line_id)) {
                    Some(amount) if amount.is_negative() => {
                        return Err(AdjustmentError::validation(format!(
                            "manual amount for line {} must be non-negative, got {amount}",
                            line.line_id
                        )));
                    }
                    Some(amount) => raw.push(amount.cents() as f64),
                    None => raw.push(line.original_amount.cents() as f64),
                }
            }
            raw
        }
    };

    let mut allocations = Vec::with_capacity(lines.len());
    for (line, raw) in lines.iter().zip(raw_cents) {
        let new_amount = Money::round_cents(raw).clamp_non_negative();
        let variance = new_amount
            .checked_sub(line.original_amount)
            .ok_or_else(|| AdjustmentError::invariant("variance overflow"))?;
        allocations.push(LineAllocation {
            line_id: line.line_id,
            original_amount: line.original_amount,
            new_amount,
            variance,
        });
    }

    Ok(AllocationOutcome {
        allocations,
        degenerate_split,
    })
}

/// Advisory reconciliation of a manual allocation against the target.
///
/// The engine never enforces that manual amounts sum to the target; this
/// check is surfaced to the caller/UI instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualReconciliation {
    pub allocated_total: Money,
    pub target_amount: Money,
    /// `allocated_total - target_amount`.
    pub difference: Money,
    pub reconciled: bool,
}

pub fn reconcile_manual(
    allocations: &[LineAllocation],
    target_amount: Money,
) -> Result<ManualReconciliation, AdjustmentError> {
    let allocated_total = Money::sum(allocations.iter().map(|a| a.new_amount))?;
    let difference = allocated_total
        .checked_sub(target_amount)
        .ok_or_else(|| AdjustmentError::invariant("reconciliation overflow"))?;
    Ok(ManualReconciliation {
        allocated_total,
        target_amount,
        difference,
        reconciled: difference == Money::ZERO,
    })
}

/// Relative size of an adjustment: `|target - current_total| / current_total`.
///
/// `None` for a zero-total batch (the ratio is undefined there).
pub fn variance_percent(target_amount: Money, current_total: Money) -> Option<f64> {
    if current_total.cents() == 0 {
        return None;
    }
    let delta = (target_amount.cents() - current_total.cents()).abs() as f64;
    Some(delta / current_total.cents() as f64)
}

/// Above this relative variance the UI is expected to have obtained explicit
/// user confirmation before committing. Advisory: commit never blocks on it,
/// but the audit record carries the number so it is detectable after the fact.
pub const LARGE_VARIANCE_THRESHOLD: f64 = 0.40;

pub fn exceeds_variance_threshold(variance_percent: Option<f64>) -> bool {
    variance_percent.is_some_and(|v| v > LARGE_VARIANCE_THRESHOLD)
}
