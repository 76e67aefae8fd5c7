use axum::{
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use std::sync::Arc;
use tracing::error;

use crate::{
    api::{ActiveSession, ErrorBody, SecurityState, respond},
    backend::{AuthInfo, BackendError},
};

#[utoipa::path(
    get,
    path = "/api/v1/auth/authinfo",
    responses (
        (status = 200, description = "Identity as seen by the security backend", body = AuthInfo),
        (status = 401, description = "Session credentials are no longer accepted", body = ErrorBody),
        (status = 502, description = "Security backend unavailable", body = ErrorBody)
    ),
    tag = "session",
)]
/// Replay the session credentials to the backend and return what it knows
/// about the user.
pub async fn authinfo(
    Extension(state): Extension<Arc<SecurityState>>,
    Extension(ActiveSession(record)): Extension<ActiveSession>,
) -> Response {
    let Some(identity) = record.identity() else {
        return respond::error(StatusCode::UNAUTHORIZED, respond::AUTHENTICATION_REQUIRED);
    };
    let headers = identity.replay_headers(state.controller.flow().auth_header_name());

    match state.backend.authenticate(&headers).await {
        Ok(info) => Json(info).into_response(),
        Err(BackendError::Unauthorized) => {
            respond::error(StatusCode::UNAUTHORIZED, respond::AUTHENTICATION_REQUIRED)
        }
        Err(err) => {
            error!("authinfo failed: {err}");
            respond::error(StatusCode::BAD_GATEWAY, respond::TRY_AGAIN)
        }
    }
}
