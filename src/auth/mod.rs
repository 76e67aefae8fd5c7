//! Authentication schemes and the controller that drives them.
//!
//! Flow Overview:
//! - [`FlowController::handle`] decodes and validates the cookie, classifies the
//!   request into a [`FlowState`] and dispatches to the configured [`AuthFlow`].
//! - Single-step schemes (`basicauth`, `jwt`, `proxy`, `proxycache`,
//!   `kerberos`) go straight from unauthenticated to authenticated.
//! - Redirect schemes (`openid`, `saml`) park a handshake in the cookie and
//!   complete it in [`AuthFlow::resume`] when the IdP calls back.

pub mod basic;
pub mod controller;
pub mod correlation;
pub mod error;
pub mod flow;
pub mod jwt;
pub mod kerberos;
pub mod openid;
pub mod proxy;
pub mod redirect;
pub mod saml;

#[cfg(test)]
pub(crate) mod testing;

pub use controller::{
    CookieAction, FlowController, FlowState, Logout, Outcome, Rejection, Transition,
};
pub use error::FlowError;
pub use flow::{AccessRequest, AuthFlow, Challenge, FlowRequest, LogoutPolicy, Step};
pub use redirect::RedirectPolicy;

use anyhow::Result;
use std::sync::Arc;
use url::Url;

use crate::{
    backend::{HttpSecurityBackend, SecurityBackend, http_client, openid::HttpOpenIdProvider},
    config::SecurityConfig,
    session::AuthType,
};

/// Scheme selected by `auth.type`, wired to the HTTP clients.
///
/// # Errors
/// Returns an error if a client cannot be built or a URL is invalid.
pub fn build_flow(
    config: &SecurityConfig,
) -> Result<(Arc<dyn AuthFlow>, Arc<dyn SecurityBackend>)> {
    let timeout = config.auth.idp_timeout;
    let http_backend = Arc::new(HttpSecurityBackend::new(
        http_client(timeout)?,
        Url::parse(&config.backend.url)?,
    ));
    let backend: Arc<dyn SecurityBackend> = http_backend.clone();
    let redirects = RedirectPolicy::new(config.redirect_patterns()?);

    let flow: Arc<dyn AuthFlow> = match config.auth.auth_type {
        AuthType::BasicAuth => {
            Arc::new(basic::BasicAuthFlow::new(config, backend.clone(), redirects))
        }
        AuthType::Jwt => Arc::new(jwt::JwtFlow::new(&config.jwt, backend.clone())),
        AuthType::Proxy => Arc::new(proxy::ProxyFlow::proxy(config, backend.clone())),
        AuthType::ProxyCache => Arc::new(proxy::ProxyFlow::proxy_cache(config, backend.clone())),
        AuthType::Kerberos => Arc::new(kerberos::KerberosFlow::new(backend.clone())),
        AuthType::OpenId => Arc::new(openid::OpenIdFlow::new(
            config,
            backend.clone(),
            Arc::new(HttpOpenIdProvider::new(&config.openid, timeout)?),
            redirects,
        )),
        AuthType::Saml => Arc::new(saml::SamlFlow::new(backend.clone(), http_backend, redirects)),
    };

    Ok((flow, backend))
}
