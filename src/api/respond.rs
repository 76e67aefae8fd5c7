//! Rendering controller outcomes as HTTP responses.

use axum::{
    http::{
        HeaderMap, HeaderValue, StatusCode,
        header::{ACCEPT, LOCATION, SET_COOKIE, WWW_AUTHENTICATE},
    },
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use tracing::error;
use utoipa::ToSchema;

use super::SecurityState;
use crate::{
    auth::{
        Challenge, CookieAction, Outcome, Rejection, Transition,
        redirect::{DEFAULT_NEXT_URL, LOGIN_PAGE, login_page},
    },
    session::SessionRecord,
};

pub const INVALID_CREDENTIALS: &str = "Invalid username or password, please try again";
pub const LOGIN_FAILED: &str = "Login failed, please try again";
pub const AUTHENTICATION_REQUIRED: &str = "Authentication required";
pub const TRY_AGAIN: &str = "Authentication is temporarily unavailable, please try again later";

#[derive(ToSchema, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub status_code: u16,
    pub error: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub login_failed: bool,
}

/// Browsers get redirects, everything else gets status codes.
pub fn wants_html(headers: &HeaderMap) -> bool {
    headers
        .get_all(ACCEPT)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .any(|value| value.contains("text/html"))
}

pub fn error(status: StatusCode, message: &str) -> Response {
    body(status, message, false)
}

fn login_failed(status: StatusCode, message: &str) -> Response {
    body(status, message, true)
}

fn body(status: StatusCode, message: &str, login_failed: bool) -> Response {
    let body = ErrorBody {
        status_code: status.as_u16(),
        error: status.canonical_reason().unwrap_or_default().to_string(),
        message: message.to_string(),
        login_failed,
    };
    (status, Json(body)).into_response()
}

pub fn redirect(location: &str) -> Response {
    match HeaderValue::from_str(location) {
        Ok(value) => (StatusCode::FOUND, [(LOCATION, value)]).into_response(),
        Err(err) => {
            error!("Cannot redirect to {location:?}: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Ask the client to authenticate.
pub fn challenge(challenge: &Challenge, browser: bool) -> Response {
    match challenge {
        Challenge::LoginPage { next_url } if browser => redirect(&login_page(next_url)),
        Challenge::Redirect(location) if browser => redirect(location),
        Challenge::Negotiate => (
            StatusCode::UNAUTHORIZED,
            [(WWW_AUTHENTICATE, HeaderValue::from_static("Negotiate"))],
            Json(ErrorBody {
                status_code: StatusCode::UNAUTHORIZED.as_u16(),
                error: "Unauthorized".to_string(),
                message: AUTHENTICATION_REQUIRED.to_string(),
                login_failed: false,
            }),
        )
            .into_response(),
        Challenge::LoginPage { .. } | Challenge::Redirect(_) | Challenge::Unauthorized => {
            error(StatusCode::UNAUTHORIZED, AUTHENTICATION_REQUIRED)
        }
    }
}

pub fn rejection(rejection: Rejection, browser: bool) -> Response {
    match rejection {
        Rejection::InvalidCredentials | Rejection::CorrelationMismatch if browser => {
            redirect(&format!("{LOGIN_PAGE}?loginFailed=true"))
        }
        Rejection::InvalidCredentials => login_failed(StatusCode::UNAUTHORIZED, INVALID_CREDENTIALS),
        Rejection::CorrelationMismatch => login_failed(StatusCode::UNAUTHORIZED, LOGIN_FAILED),
        Rejection::Unsupported => error(
            StatusCode::BAD_REQUEST,
            "This login method is not enabled for the configured auth type",
        ),
    }
}

/// Render a transition produced by one of the login endpoints.
///
/// `browser` is true for endpoints navigated to by the browser (IdP start and
/// callback), where every challenge is a redirect.
pub fn transition(state: &SecurityState, transition: Transition, browser: bool) -> Response {
    let Transition {
        record,
        outcome,
        cookie,
    } = transition;
    let response = match outcome {
        Outcome::Authenticated { next_url } => {
            redirect(next_url.as_deref().unwrap_or(DEFAULT_NEXT_URL))
        }
        Outcome::PassThrough => redirect(DEFAULT_NEXT_URL),
        Outcome::Continue(next) => challenge(&next, browser),
        Outcome::Rejected(reason) => rejection(reason, browser),
        Outcome::Failed => error(StatusCode::SERVICE_UNAVAILABLE, TRY_AGAIN),
    };
    with_cookie(state, &record, &cookie, response)
}

/// Attach the `Set-Cookie` header for `action`.
pub fn with_cookie(
    state: &SecurityState,
    record: &SessionRecord,
    action: &CookieAction,
    mut response: Response,
) -> Response {
    let header = match action {
        CookieAction::Keep => return response,
        CookieAction::Save { max_age } => state.cookies.set_cookie(&record.to_cookie(), *max_age),
        CookieAction::Clear => state.cookies.clear_cookie().map_err(anyhow::Error::from),
    };
    match header {
        Ok(value) => {
            response.headers_mut().append(SET_COOKIE, value);
            response
        }
        Err(err) => {
            error!("Cannot write session cookie: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
