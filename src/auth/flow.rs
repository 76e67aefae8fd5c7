//! Contract between the flow controller and the individual schemes.

use async_trait::async_trait;
use axum::http::{HeaderMap, Uri};
use secrecy::SecretString;
use std::collections::BTreeMap;

use super::error::FlowError;
use crate::session::{AuthSession, AuthType, Identity};

/// A request for a protected resource.
#[derive(Clone, Debug, Default)]
pub struct AccessRequest {
    path_and_query: String,
    path: String,
    query: BTreeMap<String, String>,
    headers: HeaderMap,
}

impl AccessRequest {
    #[must_use]
    pub fn new(uri: &Uri, headers: HeaderMap) -> Self {
        let query = uri
            .query()
            .map(|query| {
                url::form_urlencoded::parse(query.as_bytes())
                    .into_owned()
                    .collect()
            })
            .unwrap_or_default();
        Self {
            path_and_query: uri
                .path_and_query()
                .map_or_else(|| uri.path().to_string(), ToString::to_string),
            path: uri.path().to_string(),
            query,
            headers,
        }
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[must_use]
    pub fn path_and_query(&self) -> &str {
        &self.path_and_query
    }

    #[must_use]
    pub fn query(&self, name: &str) -> Option<&str> {
        self.query
            .get(name)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Non-empty header value; names are case-insensitive.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }

    /// Path and query with one query parameter removed.
    #[must_use]
    pub fn without_query_param(&self, name: &str) -> String {
        let remaining: Vec<(&String, &String)> = self
            .query
            .iter()
            .filter(|(key, _)| key.as_str() != name)
            .collect();
        if remaining.is_empty() {
            return self.path.clone();
        }
        let query: String = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(remaining)
            .finish();
        format!("{}?{query}", self.path)
    }
}

/// Everything a scheme can be asked to act on.
#[derive(Debug)]
pub enum FlowRequest {
    Access(AccessRequest),
    PasswordLogin {
        username: String,
        password: SecretString,
    },
    StartLogin {
        next_url: Option<String>,
    },
    OidcCallback {
        code: String,
        state: String,
    },
    SamlCallback {
        saml_response: String,
        in_response_to: Option<String>,
    },
}

/// What the browser has to do next when no session could be produced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Challenge {
    /// Show the login form, returning to `next_url` afterwards.
    LoginPage { next_url: String },
    /// Follow a redirect, typically to an identity provider.
    Redirect(String),
    /// `WWW-Authenticate: Negotiate`.
    Negotiate,
    Unauthorized,
}

/// Result of one scheme step.
#[derive(Clone, Debug, PartialEq)]
pub enum Step {
    Challenge(Challenge),
    /// Park `pending` in the cookie and send the browser to `redirect`.
    Handshake {
        pending: AuthSession,
        redirect: String,
    },
    /// Identity resolved. The controller stamps the expiry.
    Established {
        session: AuthSession,
        next_url: Option<String>,
    },
}

/// What logout keeps in the cookie.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogoutPolicy {
    /// Drop the whole record.
    ClearAll,
    /// Drop authentication state, keep the selected tenant.
    PreserveTenant,
}

/// One authentication scheme.
///
/// Implementations are stateless with respect to sessions: everything they
/// need arrives in the request or in the parked handshake.
#[async_trait]
pub trait AuthFlow: Send + Sync {
    fn auth_type(&self) -> AuthType;

    /// Header name under which stored credentials are replayed.
    fn auth_header_name(&self) -> &str {
        "authorization"
    }

    /// Handle a request that has no established session, or one whose
    /// credentials override the session.
    ///
    /// # Errors
    /// Returns a [`FlowError`] describing why no step could be produced.
    async fn authenticate(&self, request: &FlowRequest, now: i64) -> Result<Step, FlowError>;

    /// Handle a request while a handshake of this scheme is parked.
    ///
    /// # Errors
    /// Schemes without handshakes never park one; they report a mismatch.
    async fn resume(
        &self,
        _pending: &AuthSession,
        _request: &FlowRequest,
        _now: i64,
    ) -> Result<Step, FlowError> {
        Err(FlowError::CorrelationMismatch)
    }

    /// Whether credentials on `request` replace the established session.
    fn overrides_session(&self, _identity: &Identity, _request: &AccessRequest) -> bool {
        false
    }

    fn logout_policy(&self) -> LogoutPolicy {
        LogoutPolicy::PreserveTenant
    }

    /// Where to send the browser after logout.
    async fn logout_redirect(&self, _identity: Option<&Identity>) -> Option<String> {
        None
    }
}
