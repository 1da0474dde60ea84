use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use chrono::Utc;

use scdp_billing::{
    AdjustmentId, ApplyAdjustment, BatchCommand, BatchId, LineId, LineInput, LineSpec, OpenBatch,
    ReverseAdjustment, allocate, exceeds_variance_threshold, reconcile_manual, variance_percent,
};
use scdp_core::AggregateId;

use crate::app::routes::not_found_response;
use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::{ActorContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/", post(open_batch).get(list_batches))
        .route("/:id", get(get_batch))
        .route(
            "/:id/adjustments",
            post(apply_adjustment),
        )
        .route("/:id/adjustments/preview", post(preview_adjustment))
        .route("/:id/adjustments/history", get(adjustment_history))
        .route("/:id/adjustments/summary", get(adjustment_summary))
        .route(
            "/:id/adjustments/:adjustment_id/reverse",
            post(reverse_adjustment),
        )
}

pub async fn open_batch(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Json(body): Json<dto::OpenBatchRequest>,
) -> axum::response::Response {
    let mut lines: Vec<LineSpec> = Vec::with_capacity(body.lines.len());
    for l in body.lines {
        let line_type = match errors::parse_line_type(&l.line_type) {
            Ok(t) => t,
            Err(resp) => return resp,
        };
        let amount = match dto::parse_money(l.amount, "amount") {
            Ok(m) => m,
            Err(resp) => return resp,
        };
        let rate = match l.rate.map(|r| dto::parse_money(r, "rate")).transpose() {
            Ok(r) => r,
            Err(resp) => return resp,
        };
        lines.push(LineSpec {
            line_id: LineId::new(),
            line_type,
            description: l.description,
            quantity: l.quantity,
            rate,
            amount,
        });
    }

    let batch_id = BatchId::new(AggregateId::new());
    let cmd = BatchCommand::OpenBatch(OpenBatch {
        tenant_id: tenant.tenant_id(),
        batch_id,
        period: body.period,
        lines,
        occurred_at: Utc::now(),
    });

    let committed = match services.dispatch_batch(tenant.tenant_id(), batch_id, cmd) {
        Ok(c) => c,
        Err(e) => return errors::dispatch_error_to_response(e),
    };

    (
        StatusCode::CREATED,
        Json(serde_json::json!({
            "id": batch_id.to_string(),
            "events_committed": committed.len(),
        })),
    )
        .into_response()
}

pub async fn list_batches(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
) -> axum::response::Response {
    let items = services
        .batches()
        .list(tenant.tenant_id())
        .into_iter()
        .map(dto::batch_to_json)
        .collect::<Vec<_>>();
    (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
}

pub async fn get_batch(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let batch_id = match parse_batch_id(&id) {
        Ok(b) => b,
        Err(resp) => return resp,
    };
    match services.batches().get(tenant.tenant_id(), &batch_id) {
        Some(rm) => (StatusCode::OK, Json(dto::batch_to_json(rm))).into_response(),
        None => not_found_response("invoice batch not found"),
    }
}

/// Pure allocation preview: no side effects, callable repeatedly while the
/// caller tweaks target/method.
pub async fn preview_adjustment(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::PreviewAdjustmentRequest>,
) -> axum::response::Response {
    let batch_id = match parse_batch_id(&id) {
        Ok(b) => b,
        Err(resp) => return resp,
    };
    let Some(rm) = services.batches().get(tenant.tenant_id(), &batch_id) else {
        return not_found_response("invoice batch not found");
    };

    let target_amount = match dto::parse_money(body.target_amount, "target_amount") {
        Ok(m) => m,
        Err(resp) => return resp,
    };
    let method = match dto::parse_method(&body.method) {
        Ok(m) => m,
        Err(resp) => return resp,
    };
    let manual_amounts = match dto::parse_manual_amounts(body.manual_amounts) {
        Ok(m) => m,
        Err(resp) => return resp,
    };

    let inputs: Vec<LineInput> = rm
        .lines
        .iter()
        .map(|l| LineInput {
            line_id: l.line_id,
            original_amount: l.billed_amount,
            quantity: l.quantity,
        })
        .collect();

    let outcome = match allocate(&inputs, target_amount, method, manual_amounts.as_ref()) {
        Ok(o) => o,
        Err(e) => return errors::adjustment_error_to_response(e),
    };

    let vp = variance_percent(target_amount, rm.current_total);
    let reconciliation = match reconcile_manual(&outcome.allocations, target_amount) {
        Ok(r) => r,
        Err(e) => return errors::adjustment_error_to_response(e),
    };

    (
        StatusCode::OK,
        Json(dto::preview_to_json(
            &outcome,
            vp,
            exceeds_variance_threshold(vp),
            &reconciliation,
        )),
    )
        .into_response()
}

pub async fn apply_adjustment(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::ApplyAdjustmentRequest>,
) -> axum::response::Response {
    let batch_id = match parse_batch_id(&id) {
        Ok(b) => b,
        Err(resp) => return resp,
    };
    let applied_by = match errors::require_actor(&actor) {
        Ok(u) => u,
        Err(resp) => return resp,
    };
    let target_amount = match dto::parse_money(body.target_amount, "target_amount") {
        Ok(m) => m,
        Err(resp) => return resp,
    };
    let method = match dto::parse_method(&body.method) {
        Ok(m) => m,
        Err(resp) => return resp,
    };
    let manual_amounts = match dto::parse_manual_amounts(body.manual_amounts) {
        Ok(m) => m,
        Err(resp) => return resp,
    };

    let adjustment_id = AdjustmentId::new();
    let cmd = BatchCommand::ApplyAdjustment(ApplyAdjustment {
        tenant_id: tenant.tenant_id(),
        batch_id,
        adjustment_id,
        target_amount,
        method,
        manual_amounts,
        reason: body.reason,
        sow_id: body.sow_id,
        applied_by,
        occurred_at: Utc::now(),
    });

    if let Err(e) = services.dispatch_batch(tenant.tenant_id(), batch_id, cmd) {
        return errors::dispatch_error_to_response(e);
    }

    // Updated batch summary, per the commit contract.
    match services.batches().summary(tenant.tenant_id(), &batch_id) {
        Some(summary) => {
            let mut json = dto::summary_to_json(&summary);
            if let Some(obj) = json.as_object_mut() {
                obj.insert(
                    "adjustment_id".to_string(),
                    serde_json::json!(adjustment_id.to_string()),
                );
            }
            (StatusCode::CREATED, Json(json)).into_response()
        }
        None => not_found_response("invoice batch not found"),
    }
}

pub async fn adjustment_history(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let batch_id = match parse_batch_id(&id) {
        Ok(b) => b,
        Err(resp) => return resp,
    };
    match services.batches().history(tenant.tenant_id(), &batch_id) {
        Some(history) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "items": history.iter().map(dto::adjustment_record_to_json).collect::<Vec<_>>(),
            })),
        )
            .into_response(),
        None => not_found_response("invoice batch not found"),
    }
}

pub async fn adjustment_summary(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let batch_id = match parse_batch_id(&id) {
        Ok(b) => b,
        Err(resp) => return resp,
    };
    match services.batches().summary(tenant.tenant_id(), &batch_id) {
        Some(summary) => (StatusCode::OK, Json(dto::summary_to_json(&summary))).into_response(),
        None => not_found_response("invoice batch not found"),
    }
}

pub async fn reverse_adjustment(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(actor): Extension<ActorContext>,
    Path((id, adjustment_id)): Path<(String, String)>,
) -> axum::response::Response {
    let batch_id = match parse_batch_id(&id) {
        Ok(b) => b,
        Err(resp) => return resp,
    };
    let reversed_by = match errors::require_actor(&actor) {
        Ok(u) => u,
        Err(resp) => return resp,
    };
    let adjustment_id = match adjustment_id.parse::<AdjustmentId>() {
        Ok(a) => a,
        Err(_) => {
            return errors::json_error(
                StatusCode::BAD_REQUEST,
                "invalid_id",
                "invalid adjustment id",
            );
        }
    };

    let cmd = BatchCommand::ReverseAdjustment(ReverseAdjustment {
        tenant_id: tenant.tenant_id(),
        batch_id,
        adjustment_id,
        reversed_by,
        occurred_at: Utc::now(),
    });

    if let Err(e) = services.dispatch_batch(tenant.tenant_id(), batch_id, cmd) {
        return errors::dispatch_error_to_response(e);
    }

    match services.batches().summary(tenant.tenant_id(), &batch_id) {
        Some(summary) => (StatusCode::OK, Json(dto::summary_to_json(&summary))).into_response(),
        None => not_found_response("invoice batch not found"),
    }
}

fn parse_batch_id(id: &str) -> Result<BatchId, axum::response::Response> {
    id.parse::<AggregateId>().map(BatchId::new).map_err(|_| {
        errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid batch id")
    })
}
