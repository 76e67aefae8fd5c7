use axum::{
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;
use utoipa::ToSchema;

use crate::api::{ActiveSession, ErrorBody, SecurityState, SessionUpdate, respond};

#[derive(ToSchema, Serialize, Deserialize, Debug, PartialEq)]
pub struct Tenant {
    /// Tenant selected for the session; `null` when none was chosen.
    pub tenant: Option<Value>,
}

#[utoipa::path(
    get,
    path = "/api/v1/multitenancy/tenant",
    responses (
        (status = 200, description = "Tenant stored in the session", body = Tenant)
    ),
    tag = "session",
)]
pub async fn tenant(Extension(ActiveSession(record)): Extension<ActiveSession>) -> Response {
    Json(Tenant {
        tenant: record.tenant,
    })
    .into_response()
}

#[utoipa::path(
    post,
    path = "/api/v1/multitenancy/tenant",
    request_body = Tenant,
    responses (
        (status = 200, description = "Tenant stored", body = Tenant),
        (status = 400, description = "Multitenancy is disabled", body = ErrorBody),
        (status = 401, description = "No authenticated identity", body = ErrorBody)
    ),
    tag = "session",
)]
/// Store the selected tenant in the session cookie.
pub async fn select_tenant(
    Extension(state): Extension<Arc<SecurityState>>,
    Extension(ActiveSession(record)): Extension<ActiveSession>,
    Json(selection): Json<Tenant>,
) -> Response {
    if !state.config.multitenancy.enabled {
        return respond::error(StatusCode::BAD_REQUEST, "Multitenancy is disabled");
    }
    let tenant = selection.tenant.unwrap_or(Value::Null);
    let Some(updated) = state.controller.select_tenant(&record, tenant.clone()) else {
        return respond::error(StatusCode::UNAUTHORIZED, respond::AUTHENTICATION_REQUIRED);
    };
    debug!("Tenant of {} set to {tenant}", updated.username().unwrap_or_default());

    let mut response = Json(Tenant {
        tenant: Some(tenant),
    })
    .into_response();
    response.extensions_mut().insert(SessionUpdate(updated));
    response
}
