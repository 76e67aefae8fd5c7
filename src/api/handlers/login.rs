//! Password login and logout.

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use utoipa::ToSchema;

use crate::{
    api::{ErrorBody, SecurityState, respond},
    auth::{FlowRequest, Outcome, redirect::LOGIN_PAGE},
    now_millis,
};

#[derive(ToSchema, Deserialize)]
pub struct LoginRequest {
    username: String,
    #[schema(format = Password)]
    password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, PartialEq)]
pub struct LoginResponse {
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant: Option<Value>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct LogoutResponse {
    #[serde(rename = "redirectURL", skip_serializing_if = "Option::is_none")]
    pub redirect_url: Option<String>,
}

#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses (
        (status = 200, description = "Session established", body = LoginResponse),
        (status = 400, description = "Password login is not enabled", body = ErrorBody),
        (status = 401, description = "Credentials rejected", body = ErrorBody),
        (status = 503, description = "Security backend unavailable", body = ErrorBody)
    ),
    tag = "auth",
)]
/// Exchange a user name and password for a session cookie.
pub async fn login(
    Extension(state): Extension<Arc<SecurityState>>,
    headers: HeaderMap,
    Json(request): Json<LoginRequest>,
) -> Response {
    let cookie = state.cookies.read(&headers);
    let transition = state
        .controller
        .handle(
            cookie,
            FlowRequest::PasswordLogin {
                username: request.username,
                password: SecretString::from(request.password),
            },
            now_millis(),
        )
        .await;

    if let Outcome::Authenticated { .. } = transition.outcome {
        let body = LoginResponse {
            username: transition.record.username().unwrap_or_default().to_string(),
            tenant: transition.record.tenant.clone(),
        };
        return respond::with_cookie(
            &state,
            &transition.record,
            &transition.cookie,
            (StatusCode::OK, Json(body)).into_response(),
        );
    }
    respond::transition(&state, transition, false)
}

#[utoipa::path(
    post,
    path = "/auth/logout",
    responses (
        (status = 200, description = "Session ended", body = LogoutResponse)
    ),
    tag = "auth",
)]
/// End the session and report where the browser should go next.
pub async fn logout(
    Extension(state): Extension<Arc<SecurityState>>,
    headers: HeaderMap,
) -> Response {
    let logout = state.controller.logout(state.cookies.read(&headers)).await;
    let body = LogoutResponse {
        redirect_url: logout.redirect.clone(),
    };
    respond::with_cookie(&state, &logout.record, &logout.cookie, Json(body).into_response())
}

#[utoipa::path(
    get,
    path = "/auth/logout",
    responses (
        (status = 302, description = "Session ended, redirect to the IdP logout or the login page")
    ),
    tag = "auth",
)]
/// End the session and redirect.
pub async fn logout_redirect(
    Extension(state): Extension<Arc<SecurityState>>,
    headers: HeaderMap,
) -> Response {
    let logout = state.controller.logout(state.cookies.read(&headers)).await;
    let location = logout.redirect.as_deref().unwrap_or(LOGIN_PAGE);
    respond::with_cookie(
        &state,
        &logout.record,
        &logout.cookie,
        respond::redirect(location),
    )
}
