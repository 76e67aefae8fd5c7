use axum::{
    extract::{Extension, Query},
    http::HeaderMap,
    response::Response,
};
use serde::Deserialize;
use std::sync::Arc;
use utoipa::IntoParams;

use crate::{
    api::{ErrorBody, SecurityState, respond},
    auth::FlowRequest,
    now_millis,
};

#[derive(Deserialize, IntoParams, Debug, Default)]
#[into_params(parameter_in = Query)]
pub struct OpenIdLoginQuery {
    /// Authorization code returned by the provider.
    code: Option<String>,
    /// Correlation value echoed by the provider.
    state: Option<String>,
    /// Where to land after login.
    #[serde(rename = "nextUrl")]
    next_url: Option<String>,
}

impl OpenIdLoginQuery {
    fn into_request(self) -> FlowRequest {
        match self.code.filter(|code| !code.is_empty()) {
            Some(code) => FlowRequest::OidcCallback {
                code,
                state: self.state.unwrap_or_default(),
            },
            None => FlowRequest::StartLogin {
                next_url: self.next_url,
            },
        }
    }
}

#[utoipa::path(
    get,
    path = "/auth/openid/login",
    params(OpenIdLoginQuery),
    responses (
        (status = 302, description = "Redirect to the provider, or back to the app after the callback"),
        (status = 401, description = "Callback did not match the pending login", body = ErrorBody),
        (status = 503, description = "Provider or backend unavailable", body = ErrorBody)
    ),
    tag = "auth",
)]
/// Start an OpenID Connect login, or complete it when the provider calls back.
pub async fn login(
    Extension(state): Extension<Arc<SecurityState>>,
    headers: HeaderMap,
    Query(query): Query<OpenIdLoginQuery>,
) -> Response {
    let cookie = state.cookies.read(&headers);
    let transition = state
        .controller
        .handle(cookie, query.into_request(), now_millis())
        .await;
    respond::transition(&state, transition, true)
}
