//! HTTP surface of the security layer.
//!
//! Flow Overview:
//! - Public routes (`/health`, `/api/authtype`, the login, logout and IdP
//!   callback endpoints) drive [`FlowController`] directly.
//! - Protected routes sit behind [`guard::require_session`], which runs the
//!   controller for every request and only lets established sessions through.
//! - Every response that changes the session carries a fresh `Set-Cookie`;
//!   there is no server-side session store.

use crate::{
    auth::{self, AuthFlow, FlowController, RedirectPolicy},
    backend::SecurityBackend,
    cli::telemetry,
    config::SecurityConfig,
    session::{PrivateCookieCodec, SessionCookies},
};
use anyhow::{Context, Result};
use axum::{
    Extension, Router,
    body::Body,
    http::{HeaderName, HeaderValue, Request},
    middleware,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::PropagateRequestIdLayer, set_header::SetRequestHeaderLayer, trace::TraceLayer,
};
use tracing::{Span, debug_span, info};
use ulid::Ulid;
use utoipa::openapi::{Contact, InfoBuilder, License, OpenApiBuilder, Tag};
use utoipa_axum::{router::OpenApiRouter, routes};

pub mod guard;
mod handlers;
mod respond;

pub use guard::{ActiveSession, SessionUpdate};
pub use respond::ErrorBody;

/// Everything a handler needs, shared behind an `Arc`.
pub struct SecurityState {
    pub config: SecurityConfig,
    pub cookies: SessionCookies,
    pub controller: FlowController,
    pub backend: Arc<dyn SecurityBackend>,
}

impl SecurityState {
    /// Wire an already built scheme to the cookie codec and controller.
    ///
    /// # Errors
    /// Returns an error if the cookie password is too short or a redirect
    /// pattern does not compile.
    pub fn new(
        config: SecurityConfig,
        flow: Arc<dyn AuthFlow>,
        backend: Arc<dyn SecurityBackend>,
    ) -> Result<Self> {
        let codec = PrivateCookieCodec::new(config.cookie.name.clone(), &config.cookie.password)?;
        let cookies = SessionCookies::new(config.cookie.name.clone(), Box::new(codec))
            .with_secure(config.cookie.secure)
            .with_same_site(config.cookie.same_site)
            .with_domain(config.cookie.domain.clone());
        let controller =
            FlowController::new(flow, RedirectPolicy::new(config.redirect_patterns()?), &config);

        Ok(Self {
            config,
            cookies,
            controller,
            backend,
        })
    }

    /// Build the scheme selected by `auth.type` against the real backend.
    ///
    /// # Errors
    /// Returns an error if the HTTP clients or the cookie codec cannot be built.
    pub fn from_config(config: SecurityConfig) -> Result<Self> {
        let (flow, backend) = auth::build_flow(&config)?;
        Self::new(config, flow, backend)
    }
}

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    let (_router, mut openapi) = api_router().split_for_parts();
    openapi.tags = Some(tags());
    openapi
}

/// Routes reachable without a session.
fn public_router() -> OpenApiRouter {
    OpenApiRouter::new()
        .routes(routes!(handlers::health::health))
        .routes(routes!(handlers::authtype::authtype))
        .routes(routes!(handlers::login::login))
        .routes(routes!(handlers::login::logout, handlers::login::logout_redirect))
        .routes(routes!(handlers::openid::login))
        .routes(routes!(handlers::saml::login))
        .routes(routes!(handlers::saml::acs))
}

/// Routes behind the session guard.
fn protected_router() -> OpenApiRouter {
    OpenApiRouter::new()
        .routes(routes!(handlers::status::status))
        .routes(routes!(handlers::authinfo::authinfo))
        .routes(routes!(handlers::tenant::tenant, handlers::tenant::select_tenant))
}

/// Router that drives the `OpenAPI` document.
fn api_router() -> OpenApiRouter {
    OpenApiRouter::with_openapi(cargo_openapi())
        .merge(public_router())
        .merge(protected_router())
}

fn tags() -> Vec<Tag> {
    let mut health_tag = Tag::new("health");
    health_tag.description = Some("Build and liveness information".to_string());
    let mut auth_tag = Tag::new("auth");
    auth_tag.description = Some("Login, logout and identity provider callbacks".to_string());
    let mut session_tag = Tag::new("session");
    session_tag.description = Some("APIs that require an authenticated session".to_string());
    vec![health_tag, auth_tag, session_tag]
}

/// The complete application with tracing and request ids.
#[must_use]
pub fn app(state: Arc<SecurityState>) -> Router {
    let (public, _) = public_router().split_for_parts();
    let (protected, _) = protected_router().split_for_parts();

    public
        .merge(protected.route_layer(middleware::from_fn(guard::require_session)))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(Extension(state)),
        )
}

fn cargo_openapi() -> utoipa::openapi::OpenApi {
    let mut info = InfoBuilder::new()
        .title(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .description(optional_str(env!("CARGO_PKG_DESCRIPTION")))
        .build();

    info.contact = cargo_contact();
    info.license = cargo_license();

    OpenApiBuilder::new().info(info).build()
}

fn cargo_contact() -> Option<Contact> {
    // Cargo authors are `;` separated and may include "Name <email>".
    let authors = env!("CARGO_PKG_AUTHORS");
    let primary = authors.split(';').next().map(str::trim)?;
    if primary.is_empty() {
        return None;
    }

    let (name, email) = parse_author(primary);
    if name.is_none() && email.is_none() {
        return None;
    }

    let mut contact = Contact::new();
    contact.name = name.map(str::to_string);
    contact.email = email.map(str::to_string);
    Some(contact)
}

fn cargo_license() -> Option<License> {
    let identifier = optional_str(env!("CARGO_PKG_LICENSE"))?;
    let mut license = License::new(identifier);
    license.identifier = Some(identifier.to_string());
    Some(license)
}

fn optional_str(value: &'static str) -> Option<&'static str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

fn parse_author(author: &str) -> (Option<&str>, Option<&str>) {
    if let Some(start) = author.find('<') {
        let name = author[..start].trim();
        let email = author[start + 1..].trim_end_matches('>').trim();
        let name = if name.is_empty() { None } else { Some(name) };
        let email = if email.is_empty() { None } else { Some(email) };
        (name, email)
    } else {
        let name = author.trim();
        (if name.is_empty() { None } else { Some(name) }, None)
    }
}

/// Serve the application until ctrl-c.
/// # Errors
/// Returns an error if the state cannot be built or the server fails to start
pub async fn new(port: u16, config: SecurityConfig) -> Result<()> {
    let state = Arc::new(SecurityState::from_config(config).context("Failed to build security state")?);
    let app = app(state);

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!("Cannot listen for shutdown signal: {err}");
            }
            info!("Gracefully shutdown");
        })
        .await?;

    telemetry::shutdown_tracer();

    Ok(())
}

// span
fn make_span(request: &Request<Body>) -> Span {
    let headers = request.headers();
    let path = request.uri().path();
    let request_id = headers
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");

    debug_span!("http-request", path, ?headers, request_id)
}
