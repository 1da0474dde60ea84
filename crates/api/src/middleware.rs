use axum::{
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};

use scdp_core::{TenantId, UserId};

use crate::context::{ActorContext, TenantContext};

/// Derive the tenant (and optional actor) context from request headers.
///
/// Authentication/SSO is an external collaborator of this service; the
/// gateway in front of it is expected to have validated the caller and to
/// forward `X-Tenant-Id` (required) and `X-User-Id` (required for routes
/// that record an actor).
pub async fn tenant_middleware(
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let tenant_id = extract_id::<TenantId>(req.headers(), "x-tenant-id")?
        .ok_or(StatusCode::UNAUTHORIZED)?;
    let user_id = extract_id::<UserId>(req.headers(), "x-user-id")?;

    req.extensions_mut().insert(TenantContext::new(tenant_id));
    req.extensions_mut().insert(ActorContext::new(user_id));

    Ok(next.run(req).await)
}

fn extract_id<T: core::str::FromStr>(
    headers: &HeaderMap,
    name: &str,
) -> Result<Option<T>, StatusCode> {
    let Some(header) = headers.get(name) else {
        return Ok(None);
    };

    let value = header.to_str().map_err(|_| StatusCode::BAD_REQUEST)?.trim();
    if value.is_empty() {
        return Ok(None);
    }

    value
        .parse::<T>()
        .map(Some)
        .map_err(|_| StatusCode::BAD_REQUEST)
}
