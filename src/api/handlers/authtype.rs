use axum::{
    extract::Extension,
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

use crate::api::SecurityState;

#[derive(ToSchema, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AuthTypeInfo {
    pub auth_type: String,
    pub anonymous_auth_enabled: bool,
    pub multitenancy_enabled: bool,
}

#[utoipa::path(
    get,
    path = "/api/authtype",
    responses (
        (status = 200, description = "Active authentication scheme", body = AuthTypeInfo)
    ),
    tag = "auth",
)]
/// Tell the login page which scheme is active.
pub async fn authtype(Extension(state): Extension<Arc<SecurityState>>) -> impl IntoResponse {
    Json(AuthTypeInfo {
        auth_type: state.config.auth.auth_type.to_string(),
        anonymous_auth_enabled: state.config.auth.anonymous_auth_enabled,
        multitenancy_enabled: state.config.multitenancy.enabled,
    })
}
