//! Request DTOs and JSON mapping helpers.
//!
//! Monetary values cross the wire as fractional major units (e.g. `150.0`
//! dollars); internally everything is integer cents. Conversion happens at
//! this boundary only.

use std::collections::{BTreeMap, HashMap};

use serde::Deserialize;

use scdp_billing::{
    AllocationMethod, AllocationOutcome, LineAllocation, LineId, ManualReconciliation,
};
use scdp_core::Money;
use scdp_directory::{
    Client, Project, RateCard, RateResolution, ResolvedVocabulary, TermResolution,
    VocabularyOverrides,
};
use scdp_infra::projections::invoice_batches::{
    AdjustmentRecord, AdjustmentSummary, InvoiceBatchReadModel,
};

use crate::app::errors;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct BatchLineRequest {
    pub line_type: String,
    pub description: String,
    pub quantity: Option<f64>,
    pub rate: Option<f64>,
    pub amount: f64,
}

#[derive(Debug, Deserialize)]
pub struct OpenBatchRequest {
    pub period: Option<String>,
    pub lines: Vec<BatchLineRequest>,
}

#[derive(Debug, Deserialize)]
pub struct PreviewAdjustmentRequest {
    pub target_amount: f64,
    pub method: String,
    /// line id -> amount, for `manual`.
    pub manual_amounts: Option<HashMap<String, f64>>,
}

#[derive(Debug, Deserialize)]
pub struct ApplyAdjustmentRequest {
    pub target_amount: f64,
    pub method: String,
    pub reason: String,
    pub sow_id: Option<String>,
    pub manual_amounts: Option<HashMap<String, f64>>,
}

#[derive(Debug, Deserialize)]
pub struct CreateClientRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateProjectRequest {
    pub name: String,
    pub client_id: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct VocabularyOverridesRequest {
    pub epic: Option<String>,
    pub stage: Option<String>,
    pub activity: Option<String>,
    pub workstream: Option<String>,
    pub milestone: Option<String>,
}

impl VocabularyOverridesRequest {
    pub fn into_overrides(self) -> VocabularyOverrides {
        VocabularyOverrides {
            epic: self.epic,
            stage: self.stage,
            activity: self.activity,
            workstream: self.workstream,
            milestone: self.milestone,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RateCardRequest {
    /// role -> hourly rate in major units.
    pub rates: HashMap<String, f64>,
}

#[derive(Debug, Deserialize)]
pub struct OrganizationRatesRequest {
    pub rates: HashMap<String, f64>,
    pub default_rate: Option<f64>,
}

// -------------------------
// Request parsing helpers
// -------------------------

pub fn parse_money(value: f64, field: &str) -> Result<Money, axum::response::Response> {
    Money::from_major(value).map_err(|e| {
        errors::json_error(
            axum::http::StatusCode::BAD_REQUEST,
            "invalid_amount",
            format!("{field}: {e}"),
        )
    })
}

pub fn parse_method(s: &str) -> Result<AllocationMethod, axum::response::Response> {
    s.parse::<AllocationMethod>().map_err(|e| {
        errors::json_error(
            axum::http::StatusCode::BAD_REQUEST,
            "invalid_allocation_method",
            e.to_string(),
        )
    })
}

pub fn parse_manual_amounts(
    raw: Option<HashMap<String, f64>>,
) -> Result<Option<BTreeMap<LineId, Money>>, axum::response::Response> {
    let Some(raw) = raw else {
        return Ok(None);
    };

    let mut parsed = BTreeMap::new();
    for (line_id, amount) in raw {
        let line_id = line_id.parse::<LineId>().map_err(|e| {
            errors::json_error(
                axum::http::StatusCode::BAD_REQUEST,
                "invalid_id",
                e.to_string(),
            )
        })?;
        parsed.insert(line_id, parse_money(amount, "manual_amounts")?);
    }
    Ok(Some(parsed))
}

pub fn to_rate_card(raw: HashMap<String, f64>) -> Result<RateCard, axum::response::Response> {
    let mut card = RateCard::new();
    for (role, rate) in raw {
        card.rates.insert(role, parse_money(rate, "rates")?);
    }
    Ok(card)
}

// -------------------------
// JSON mapping helpers
// -------------------------

pub fn batch_to_json(rm: InvoiceBatchReadModel) -> serde_json::Value {
    serde_json::json!({
        "id": rm.batch_id.to_string(),
        "period": rm.period,
        "current_total": rm.current_total.to_major(),
        "adjustment_count": rm.adjustments.len(),
        "lines": rm.lines.into_iter().map(|l| serde_json::json!({
            "id": l.line_id.to_string(),
            "line_type": format!("{:?}", l.line_type).to_lowercase(),
            "description": l.description,
            "quantity": l.quantity,
            "rate": l.rate.map(Money::to_major),
            "original_amount": l.original_amount.to_major(),
            "billed_amount": l.billed_amount.to_major(),
            "variance": l.variance.to_major(),
        })).collect::<Vec<_>>(),
    })
}

pub fn line_allocation_to_json(a: &LineAllocation) -> serde_json::Value {
    serde_json::json!({
        "line_id": a.line_id.to_string(),
        "original_amount": a.original_amount.to_major(),
        "new_amount": a.new_amount.to_major(),
        "variance": a.variance.to_major(),
    })
}

pub fn preview_to_json(
    outcome: &AllocationOutcome,
    variance_percent: Option<f64>,
    large_variance: bool,
    reconciliation: &ManualReconciliation,
) -> serde_json::Value {
    serde_json::json!({
        "allocations": outcome.allocations.iter().map(line_allocation_to_json).collect::<Vec<_>>(),
        "degenerate_split": outcome.degenerate_split,
        "variance_percent": variance_percent,
        "large_variance": large_variance,
        "reconciliation": {
            "allocated_total": reconciliation.allocated_total.to_major(),
            "target_amount": reconciliation.target_amount.to_major(),
            "difference": reconciliation.difference.to_major(),
            "reconciled": reconciliation.reconciled,
        },
    })
}

pub fn adjustment_record_to_json(record: &AdjustmentRecord) -> serde_json::Value {
    serde_json::json!({
        "adjustment_id": record.adjustment_id.to_string(),
        "target_amount": record.target_amount.to_major(),
        "method": record.method.as_str(),
        "reason": record.reason,
        "sow_id": record.sow_id,
        "applied_by": record.applied_by.to_string(),
        "applied_at": record.applied_at.to_rfc3339(),
        "current_total_before": record.current_total_before.to_major(),
        "variance_percent": record.variance_percent,
        "degenerate_split": record.degenerate_split,
        "lines": record.line_details.iter().map(line_allocation_to_json).collect::<Vec<_>>(),
        "reversed_at": record.reversed_at.map(|t| t.to_rfc3339()),
        "reversed_by": record.reversed_by.map(|u| u.to_string()),
    })
}

pub fn summary_to_json(summary: &AdjustmentSummary) -> serde_json::Value {
    serde_json::json!({
        "batch_id": summary.batch_id.to_string(),
        "adjustment_count": summary.adjustment_count,
        "reversed_count": summary.reversed_count,
        "large_variance_count": summary.large_variance_count,
        "original_total": summary.original_total.to_major(),
        "current_total": summary.current_total.to_major(),
        "net_variance": summary.net_variance.to_major(),
        "last_applied_at": summary.last_applied_at.map(|t| t.to_rfc3339()),
        "last_method": summary.last_method.map(|m| m.as_str()),
    })
}

pub fn client_to_json(client: &Client) -> serde_json::Value {
    serde_json::json!({
        "id": client.client_id.to_string(),
        "name": client.name,
        "vocabulary": vocabulary_overrides_to_json(&client.vocabulary),
    })
}

pub fn project_to_json(project: &Project) -> serde_json::Value {
    serde_json::json!({
        "id": project.project_id.to_string(),
        "client_id": project.client_id.to_string(),
        "name": project.name,
        "vocabulary": vocabulary_overrides_to_json(&project.vocabulary),
    })
}

pub fn vocabulary_overrides_to_json(overrides: &VocabularyOverrides) -> serde_json::Value {
    serde_json::json!({
        "epic": overrides.epic,
        "stage": overrides.stage,
        "activity": overrides.activity,
        "workstream": overrides.workstream,
        "milestone": overrides.milestone,
    })
}

fn term_to_json(term: &TermResolution) -> serde_json::Value {
    serde_json::json!({
        "term": term.term,
        "source": source_str(term),
    })
}

fn source_str(term: &TermResolution) -> &'static str {
    use scdp_directory::TermSource;
    match term.source {
        TermSource::Project => "project",
        TermSource::Client => "client",
        TermSource::Organization => "organization",
        TermSource::SystemDefault => "system_default",
    }
}

pub fn resolved_vocabulary_to_json(resolved: &ResolvedVocabulary) -> serde_json::Value {
    serde_json::json!({
        "epic": term_to_json(&resolved.epic),
        "stage": term_to_json(&resolved.stage),
        "activity": term_to_json(&resolved.activity),
        "workstream": term_to_json(&resolved.workstream),
        "milestone": term_to_json(&resolved.milestone),
    })
}

pub fn rate_resolution_to_json(role: &str, resolution: &RateResolution) -> serde_json::Value {
    use scdp_directory::RateSource;
    serde_json::json!({
        "role": role,
        "rate": resolution.rate.to_major(),
        "source": match resolution.source {
            RateSource::Project => "project",
            RateSource::Client => "client",
            RateSource::Organization => "organization",
            RateSource::SystemDefault => "system_default",
        },
    })
}
