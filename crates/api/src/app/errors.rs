use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use scdp_billing::{AdjustmentError, LineType};
use scdp_core::{DomainError, UserId};
use scdp_infra::command_dispatcher::DispatchError;

use crate::context::ActorContext;

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

pub fn dispatch_error_to_response(err: DispatchError) -> axum::response::Response {
    match err {
        DispatchError::Concurrency(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        DispatchError::Validation(msg) => {
            json_error(StatusCode::BAD_REQUEST, "validation_error", msg)
        }
        DispatchError::InvariantViolation(msg) => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "invariant_violation", msg)
        }
        DispatchError::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", "not found"),
        DispatchError::TenantIsolation(msg) => {
            json_error(StatusCode::FORBIDDEN, "tenant_isolation", msg)
        }
        DispatchError::Deserialize(msg) => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "deserialize_error", msg)
        }
        DispatchError::Store(e) => json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "store_error",
            format!("{e:?}"),
        ),
        DispatchError::Publish(msg) => json_error(StatusCode::BAD_GATEWAY, "publish_error", msg),
    }
}

/// Typed mapping for the preview path, where the allocator is invoked
/// directly and the full taxonomy is still in hand.
pub fn adjustment_error_to_response(err: AdjustmentError) -> axum::response::Response {
    let message = err.to_string();
    match err {
        AdjustmentError::InvalidTargetAmount(_) => {
            json_error(StatusCode::BAD_REQUEST, "invalid_target_amount", message)
        }
        AdjustmentError::MissingReason => {
            json_error(StatusCode::BAD_REQUEST, "missing_reason", message)
        }
        AdjustmentError::AlreadyReversed => {
            json_error(StatusCode::CONFLICT, "already_reversed", message)
        }
        AdjustmentError::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", message),
        AdjustmentError::Validation(_) => {
            json_error(StatusCode::BAD_REQUEST, "validation_error", message)
        }
        AdjustmentError::InvariantViolation(_) => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "invariant_violation", message)
        }
        AdjustmentError::Conflict(_) => json_error(StatusCode::CONFLICT, "conflict", message),
    }
}

pub fn domain_error_to_response(err: DomainError) -> axum::response::Response {
    match err {
        DomainError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
        DomainError::InvariantViolation(msg) => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "invariant_violation", msg)
        }
        DomainError::InvalidId(msg) => json_error(StatusCode::BAD_REQUEST, "invalid_id", msg),
        DomainError::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", "not found"),
        DomainError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
    }
}

pub fn parse_line_type(s: &str) -> Result<LineType, axum::response::Response> {
    match s.to_lowercase().as_str() {
        "time" => Ok(LineType::Time),
        "expense" => Ok(LineType::Expense),
        "milestone" => Ok(LineType::Milestone),
        "discount" => Ok(LineType::Discount),
        _ => Err(json_error(
            StatusCode::BAD_REQUEST,
            "invalid_line_type",
            "line_type must be one of: time, expense, milestone, discount",
        )),
    }
}

/// Routes that write the audit trail need an acting user.
pub fn require_actor(actor: &ActorContext) -> Result<UserId, axum::response::Response> {
    actor.user_id().ok_or_else(|| {
        json_error(
            StatusCode::UNAUTHORIZED,
            "missing_actor",
            "X-User-Id header is required for this operation",
        )
    })
}
