use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
};

use scdp_directory::{Client, ClientId, Project, ProjectId};

use crate::app::routes::not_found_response;
use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::TenantContext;

pub fn router() -> Router {
    Router::new()
        .route("/clients", post(create_client).get(list_clients))
        .route("/clients/:id/vocabulary", put(put_client_vocabulary))
        .route("/clients/:id/rates", put(put_client_rates))
        .route("/projects", post(create_project).get(list_projects))
        .route("/projects/:id/vocabulary", put(put_project_vocabulary).get(get_project_vocabulary))
        .route("/projects/:id/rates", put(put_project_rates))
        .route("/projects/:id/rates/:role", get(get_project_rate))
        .route("/organization/vocabulary", put(put_organization_vocabulary))
        .route("/organization/rates", put(put_organization_rates))
}

pub async fn create_client(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Json(body): Json<dto::CreateClientRequest>,
) -> axum::response::Response {
    if body.name.trim().is_empty() {
        return errors::json_error(
            StatusCode::BAD_REQUEST,
            "validation_error",
            "client name must not be empty",
        );
    }

    let client = Client::new(ClientId::new(), body.name);
    let json = dto::client_to_json(&client);
    services.directory().upsert_client(tenant.tenant_id(), client);
    (StatusCode::CREATED, Json(json)).into_response()
}

pub async fn list_clients(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
) -> axum::response::Response {
    let items = services
        .directory()
        .list_clients(tenant.tenant_id())
        .iter()
        .map(dto::client_to_json)
        .collect::<Vec<_>>();
    (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
}

pub async fn put_client_vocabulary(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::VocabularyOverridesRequest>,
) -> axum::response::Response {
    let client_id = match parse_client_id(&id) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    match services.directory().update_client_vocabulary(
        tenant.tenant_id(),
        &client_id,
        body.into_overrides(),
    ) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::domain_error_to_response(e),
    }
}

pub async fn put_client_rates(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::RateCardRequest>,
) -> axum::response::Response {
    let client_id = match parse_client_id(&id) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let rates = match dto::to_rate_card(body.rates) {
        Ok(r) => r,
        Err(resp) => return resp,
    };
    match services
        .directory()
        .update_client_rates(tenant.tenant_id(), &client_id, rates)
    {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::domain_error_to_response(e),
    }
}

pub async fn create_project(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Json(body): Json<dto::CreateProjectRequest>,
) -> axum::response::Response {
    if body.name.trim().is_empty() {
        return errors::json_error(
            StatusCode::BAD_REQUEST,
            "validation_error",
            "project name must not be empty",
        );
    }
    let client_id = match parse_client_id(&body.client_id) {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    let project = Project::new(ProjectId::new(), client_id, body.name);
    let json = dto::project_to_json(&project);
    match services.directory().create_project(tenant.tenant_id(), project) {
        Ok(()) => (StatusCode::CREATED, Json(json)).into_response(),
        Err(e) => errors::domain_error_to_response(e),
    }
}

pub async fn list_projects(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
) -> axum::response::Response {
    let items = services
        .directory()
        .list_projects(tenant.tenant_id())
        .iter()
        .map(dto::project_to_json)
        .collect::<Vec<_>>();
    (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
}

pub async fn put_project_vocabulary(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::VocabularyOverridesRequest>,
) -> axum::response::Response {
    let project_id = match parse_project_id(&id) {
        Ok(p) => p,
        Err(resp) => return resp,
    };
    match services.directory().update_project_vocabulary(
        tenant.tenant_id(),
        &project_id,
        body.into_overrides(),
    ) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::domain_error_to_response(e),
    }
}

/// Resolved terms for a project: each slot independently walks
/// project → client → organization → system default.
pub async fn get_project_vocabulary(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let project_id = match parse_project_id(&id) {
        Ok(p) => p,
        Err(resp) => return resp,
    };
    match services
        .directory()
        .resolve_project_vocabulary(tenant.tenant_id(), &project_id)
    {
        Ok(resolved) => (
            StatusCode::OK,
            Json(dto::resolved_vocabulary_to_json(&resolved)),
        )
            .into_response(),
        Err(e) => errors::domain_error_to_response(e),
    }
}

pub async fn put_project_rates(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::RateCardRequest>,
) -> axum::response::Response {
    let project_id = match parse_project_id(&id) {
        Ok(p) => p,
        Err(resp) => return resp,
    };
    let rates = match dto::to_rate_card(body.rates) {
        Ok(r) => r,
        Err(resp) => return resp,
    };
    match services
        .directory()
        .update_project_rates(tenant.tenant_id(), &project_id, rates)
    {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::domain_error_to_response(e),
    }
}

pub async fn get_project_rate(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path((id, role)): Path<(String, String)>,
) -> axum::response::Response {
    let project_id = match parse_project_id(&id) {
        Ok(p) => p,
        Err(resp) => return resp,
    };
    match services
        .directory()
        .resolve_project_rate(tenant.tenant_id(), &project_id, &role)
    {
        Ok(Some(resolution)) => (
            StatusCode::OK,
            Json(dto::rate_resolution_to_json(&role, &resolution)),
        )
            .into_response(),
        Ok(None) => not_found_response("no rate configured for this role"),
        Err(e) => errors::domain_error_to_response(e),
    }
}

pub async fn put_organization_vocabulary(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Json(body): Json<dto::VocabularyOverridesRequest>,
) -> axum::response::Response {
    let mut settings = services.directory().organization(tenant.tenant_id());
    settings.vocabulary = body.into_overrides();
    services
        .directory()
        .upsert_organization(tenant.tenant_id(), settings);
    StatusCode::NO_CONTENT.into_response()
}

pub async fn put_organization_rates(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Json(body): Json<dto::OrganizationRatesRequest>,
) -> axum::response::Response {
    let rates = match dto::to_rate_card(body.rates) {
        Ok(r) => r,
        Err(resp) => return resp,
    };
    let default_rate = match body
        .default_rate
        .map(|r| dto::parse_money(r, "default_rate"))
        .transpose()
    {
        Ok(d) => d,
        Err(resp) => return resp,
    };

    let mut settings = services.directory().organization(tenant.tenant_id());
    settings.rates = rates;
    settings.default_rate = default_rate;
    services
        .directory()
        .upsert_organization(tenant.tenant_id(), settings);
    StatusCode::NO_CONTENT.into_response()
}

fn parse_client_id(id: &str) -> Result<ClientId, axum::response::Response> {
    id.parse::<ClientId>().map_err(|_| {
        errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid client id")
    })
}

fn parse_project_id(id: &str) -> Result<ProjectId, axum::response::Response> {
    id.parse::<ProjectId>().map_err(|_| {
        errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid project id")
    })
}
