//! Session guard for protected routes.

use axum::{
    extract::{Extension, Request},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::debug;

use super::{SecurityState, respond};
use crate::{
    auth::{AccessRequest, CookieAction, FlowRequest, Outcome},
    now_millis,
    session::SessionRecord,
};

/// The established session, inserted into request extensions by the guard.
#[derive(Clone, Debug)]
pub struct ActiveSession(pub SessionRecord);

/// Response extension a handler sets to replace the session record.
///
/// The guard writes it instead of its own cookie update.
#[derive(Clone, Debug)]
pub struct SessionUpdate(pub SessionRecord);

/// Run the auth flow for a protected request.
///
/// Routes listed in `auth.unauthenticated_routes` are passed through untouched.
pub async fn require_session(
    Extension(state): Extension<Arc<SecurityState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path();
    if state
        .config
        .auth
        .unauthenticated_routes
        .iter()
        .any(|route| route == path)
    {
        return next.run(request).await;
    }

    let browser = respond::wants_html(request.headers());
    let cookie = state.cookies.read(request.headers());
    let access = AccessRequest::new(request.uri(), request.headers().clone());
    let transition = state
        .controller
        .handle(cookie, FlowRequest::Access(access), now_millis())
        .await;

    match transition.outcome {
        // Credentials came in the URL; send the browser to the clean URL.
        Outcome::Authenticated {
            next_url: Some(next_url),
        } => respond::with_cookie(
            &state,
            &transition.record,
            &transition.cookie,
            respond::redirect(&next_url),
        ),
        Outcome::PassThrough | Outcome::Authenticated { next_url: None } => {
            request
                .extensions_mut()
                .insert(ActiveSession(transition.record.clone()));
            let mut response = next.run(request).await;

            match response.extensions_mut().remove::<SessionUpdate>() {
                Some(SessionUpdate(record)) => {
                    debug!("Handler replaced the session record");
                    let action = CookieAction::Save {
                        max_age: state.controller.max_age(&record),
                    };
                    respond::with_cookie(&state, &record, &action, response)
                }
                None => respond::with_cookie(
                    &state,
                    &transition.record,
                    &transition.cookie,
                    response,
                ),
            }
        }
        Outcome::Continue(challenge) => respond::with_cookie(
            &state,
            &transition.record,
            &transition.cookie,
            respond::challenge(&challenge, browser),
        ),
        Outcome::Rejected(reason) => respond::with_cookie(
            &state,
            &transition.record,
            &transition.cookie,
            respond::rejection(reason, browser),
        ),
        Outcome::Failed => respond::with_cookie(
            &state,
            &transition.record,
            &transition.cookie,
            respond::error(
                axum::http::StatusCode::SERVICE_UNAVAILABLE,
                respond::TRY_AGAIN,
            ),
        ),
    }
}
