//! Typed view of the session cookie.
//!
//! The wire shape keeps every attribute optional and lets the presence of the
//! `oidc`/`saml` blocks encode the handshake stage. Here that is folded into
//! [`AuthSession`], a sum type in which "pending for two schemes" or "pending
//! and identified" cannot be expressed. Conversion from the wire shape is
//! strict: anything that does not fit is a [`RecordError`] and the cookie is
//! treated as absent.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::{collections::BTreeMap, fmt, str::FromStr};
use thiserror::Error;
use utoipa::ToSchema;

use super::cookie::{SamlCookieState, SecuritySessionCookie};

/// Key inside `credentials` holding a replayable `Authorization` value.
pub const AUTH_HEADER_VALUE: &str = "authHeaderValue";

/// Supported authentication schemes, spelled as in `auth.type`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum AuthType {
    BasicAuth,
    Jwt,
    OpenId,
    Saml,
    Proxy,
    Kerberos,
    ProxyCache,
}

impl AuthType {
    pub const ALL: [Self; 7] = [
        Self::BasicAuth,
        Self::Jwt,
        Self::OpenId,
        Self::Saml,
        Self::Proxy,
        Self::Kerberos,
        Self::ProxyCache,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BasicAuth => "basicauth",
            Self::Jwt => "jwt",
            Self::OpenId => "openid",
            Self::Saml => "saml",
            Self::Proxy => "proxy",
            Self::Kerberos => "kerberos",
            Self::ProxyCache => "proxycache",
        }
    }

    /// Schemes that bounce the browser through an external identity provider.
    #[must_use]
    pub const fn is_redirect(self) -> bool {
        matches!(self, Self::OpenId | Self::Saml)
    }
}

impl fmt::Display for AuthType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuthType {
    type Err = RecordError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|auth_type| auth_type.as_str() == value)
            .ok_or_else(|| RecordError::UnknownAuthType(value.to_string()))
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecordError {
    #[error("session carries both an oidc and a saml handshake")]
    ConflictingHandshakes,
    #[error("unknown auth type: {0}")]
    UnknownAuthType(String),
    #[error("identified session without auth type")]
    MissingAuthType,
    #[error("unreadable oidc handshake block")]
    MalformedOidcBlock,
}

/// Identity fields of an established session.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Identity {
    pub username: String,
    pub credentials: Option<Value>,
    pub assign_auth_header: bool,
    pub is_anonymous_auth: bool,
    pub expiry_time: Option<i64>,
    pub additional_auth_headers: BTreeMap<String, String>,
}

impl Identity {
    #[must_use]
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            ..Self::default()
        }
    }

    /// Keep `value` as the `Authorization` header replayed to the backend.
    #[must_use]
    pub fn with_auth_header(mut self, value: impl Into<String>) -> Self {
        self.credentials = Some(json!({ "authHeaderValue": value.into() }));
        self.assign_auth_header = true;
        self
    }

    #[must_use]
    pub fn with_additional_headers(mut self, headers: BTreeMap<String, String>) -> Self {
        self.additional_auth_headers = headers;
        self
    }

    #[must_use]
    pub fn anonymous(mut self) -> Self {
        self.is_anonymous_auth = true;
        self
    }

    /// Stored `Authorization` value, if the scheme keeps one.
    #[must_use]
    pub fn auth_header_value(&self) -> Option<&str> {
        self.credentials
            .as_ref()
            .and_then(|credentials| credentials.get(AUTH_HEADER_VALUE))
            .and_then(Value::as_str)
    }

    /// Headers to send to the backend on behalf of this session.
    #[must_use]
    pub fn replay_headers(&self, auth_header_name: &str) -> BTreeMap<String, String> {
        let mut headers = self.additional_auth_headers.clone();
        if self.assign_auth_header {
            if let Some(value) = self.auth_header_value() {
                headers.insert(auth_header_name.to_ascii_lowercase(), value.to_string());
            }
        }
        headers
    }
}

/// OIDC correlation state parked in the cookie between redirect and callback.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OidcHandshake {
    pub state: String,
    pub nonce: String,
    pub next_url: String,
    #[serde(default)]
    pub issued_at: i64,
}

/// SAML correlation state parked in the cookie between redirect and callback.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SamlHandshake {
    pub request_id: String,
    pub next_url: String,
}

/// Authentication state of a session.
#[derive(Clone, Debug, PartialEq)]
pub enum AuthSession {
    Basic(Identity),
    Jwt(Identity),
    Proxy(Identity),
    Kerberos(Identity),
    ProxyCache(Identity),
    OidcPending(OidcHandshake),
    OidcComplete(Identity),
    SamlPending(SamlHandshake),
    SamlComplete(Identity),
}

impl AuthSession {
    /// Wrap an identity in the completed variant for `auth_type`.
    #[must_use]
    pub fn established(auth_type: AuthType, identity: Identity) -> Self {
        match auth_type {
            AuthType::BasicAuth => Self::Basic(identity),
            AuthType::Jwt => Self::Jwt(identity),
            AuthType::Proxy => Self::Proxy(identity),
            AuthType::Kerberos => Self::Kerberos(identity),
            AuthType::ProxyCache => Self::ProxyCache(identity),
            AuthType::OpenId => Self::OidcComplete(identity),
            AuthType::Saml => Self::SamlComplete(identity),
        }
    }

    #[must_use]
    pub fn auth_type(&self) -> AuthType {
        match self {
            Self::Basic(_) => AuthType::BasicAuth,
            Self::Jwt(_) => AuthType::Jwt,
            Self::Proxy(_) => AuthType::Proxy,
            Self::Kerberos(_) => AuthType::Kerberos,
            Self::ProxyCache(_) => AuthType::ProxyCache,
            Self::OidcPending(_) | Self::OidcComplete(_) => AuthType::OpenId,
            Self::SamlPending(_) | Self::SamlComplete(_) => AuthType::Saml,
        }
    }

    #[must_use]
    pub fn identity(&self) -> Option<&Identity> {
        match self {
            Self::Basic(identity)
            | Self::Jwt(identity)
            | Self::Proxy(identity)
            | Self::Kerberos(identity)
            | Self::ProxyCache(identity)
            | Self::OidcComplete(identity)
            | Self::SamlComplete(identity) => Some(identity),
            Self::OidcPending(_) | Self::SamlPending(_) => None,
        }
    }

    pub fn identity_mut(&mut self) -> Option<&mut Identity> {
        match self {
            Self::Basic(identity)
            | Self::Jwt(identity)
            | Self::Proxy(identity)
            | Self::Kerberos(identity)
            | Self::ProxyCache(identity)
            | Self::OidcComplete(identity)
            | Self::SamlComplete(identity) => Some(identity),
            Self::OidcPending(_) | Self::SamlPending(_) => None,
        }
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::OidcPending(_) | Self::SamlPending(_))
    }
}

/// Typed session record: authentication state plus the independent tenant.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SessionRecord {
    pub auth: Option<AuthSession>,
    pub tenant: Option<Value>,
}

impl SessionRecord {
    /// Build the typed record from a decoded cookie.
    ///
    /// # Errors
    /// Returns a [`RecordError`] when the cookie carries an impossible
    /// combination of fields.
    pub fn from_cookie(cookie: SecuritySessionCookie) -> Result<Self, RecordError> {
        let oidc_pending = cookie.has_oidc_handshake();
        let saml_pending = cookie.has_saml_handshake();

        let auth = match (oidc_pending, saml_pending) {
            (true, true) => return Err(RecordError::ConflictingHandshakes),
            (true, false) => {
                let block = cookie.oidc.unwrap_or(Value::Null);
                let handshake: OidcHandshake =
                    serde_json::from_value(block).map_err(|_| RecordError::MalformedOidcBlock)?;
                Some(AuthSession::OidcPending(handshake))
            }
            (false, true) => {
                let saml = cookie.saml.unwrap_or_default();
                Some(AuthSession::SamlPending(SamlHandshake {
                    request_id: saml.request_id.unwrap_or_default(),
                    next_url: saml.next_url.unwrap_or_default(),
                }))
            }
            (false, false) => match cookie.username.filter(|name| !name.is_empty()) {
                Some(username) => {
                    let auth_type: AuthType = cookie
                        .auth_type
                        .as_deref()
                        .ok_or(RecordError::MissingAuthType)?
                        .parse()?;
                    let identity = Identity {
                        username,
                        credentials: cookie.credentials,
                        assign_auth_header: cookie.assign_auth_header.unwrap_or(false),
                        is_anonymous_auth: cookie.is_anonymous_auth.unwrap_or(false),
                        expiry_time: cookie.expiry_time,
                        additional_auth_headers: cookie.additional_auth_headers.unwrap_or_default(),
                    };
                    Some(AuthSession::established(auth_type, identity))
                }
                None => None,
            },
        };

        Ok(Self {
            auth,
            tenant: cookie.tenant,
        })
    }

    /// Render the record in its wire shape.
    #[must_use]
    pub fn to_cookie(&self) -> SecuritySessionCookie {
        let mut cookie = SecuritySessionCookie {
            tenant: self.tenant.clone(),
            ..SecuritySessionCookie::default()
        };

        match &self.auth {
            None => {}
            Some(AuthSession::OidcPending(handshake)) => {
                cookie.oidc = serde_json::to_value(handshake).ok();
            }
            Some(AuthSession::SamlPending(handshake)) => {
                cookie.saml = Some(SamlCookieState {
                    request_id: Some(handshake.request_id.clone()),
                    next_url: Some(handshake.next_url.clone()),
                });
            }
            Some(session) => {
                if let Some(identity) = session.identity() {
                    cookie.username = Some(identity.username.clone());
                    cookie.credentials = identity.credentials.clone();
                    cookie.auth_type = Some(session.auth_type().as_str().to_string());
                    cookie.assign_auth_header = Some(identity.assign_auth_header);
                    cookie.is_anonymous_auth = Some(identity.is_anonymous_auth);
                    cookie.expiry_time = identity.expiry_time;
                    if !identity.additional_auth_headers.is_empty() {
                        cookie.additional_auth_headers =
                            Some(identity.additional_auth_headers.clone());
                    }
                }
            }
        }

        cookie
    }

    #[must_use]
    pub fn identity(&self) -> Option<&Identity> {
        self.auth.as_ref().and_then(AuthSession::identity)
    }

    #[must_use]
    pub fn username(&self) -> Option<&str> {
        self.identity().map(|identity| identity.username.as_str())
    }

    /// Same record with authentication state dropped and the tenant kept.
    #[must_use]
    pub fn without_auth(&self) -> Self {
        Self {
            auth: None,
            tenant: self.tenant.clone(),
        }
    }
}
