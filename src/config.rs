//! Security configuration consumed by the flow controller and the server.
//!
//! Values come from the CLI (see `cli::commands`), are assembled into a
//! [`SecurityConfig`] and validated once with [`SecurityConfig::validate`]
//! before the server binds. Nothing here is read from ambient state at
//! request time.

use regex::Regex;
use secrecy::{ExposeSecret, SecretString};
use std::{path::PathBuf, time::Duration};
use thiserror::Error;
use url::Url;

use crate::session::{AuthType, SameSitePolicy, codec::MIN_PASSWORD_LENGTH};

pub const DEFAULT_COOKIE_NAME: &str = "security_authentication";
pub const DEFAULT_SESSION_TTL_SECONDS: u64 = 60 * 60;
pub const DEFAULT_COOKIE_TTL_SECONDS: u64 = 60 * 60;
pub const DEFAULT_HANDSHAKE_TTL_SECONDS: u64 = 10 * 60;
pub const DEFAULT_IDP_TIMEOUT_SECONDS: u64 = 10;
pub const DEFAULT_OPENID_SCOPE: &str = "openid profile email address phone";
pub const DEFAULT_BACKEND_URL: &str = "http://localhost:9200";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cookie.password must be at least {MIN_PASSWORD_LENGTH} characters")]
    CookiePassword,
    #[error("unknown auth.type '{0}', allowed are ['', 'basicauth', 'jwt', 'openid', 'saml', 'proxy', 'kerberos', 'proxycache']")]
    UnknownAuthType(String),
    #[error("{setting} is required when auth.type is {auth_type}")]
    Missing {
        setting: &'static str,
        auth_type: AuthType,
    },
    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),
    #[error("invalid URL in {setting}: {source}")]
    Url {
        setting: &'static str,
        source: url::ParseError,
    },
    #[error("invalid redirect pattern '{pattern}': {source}")]
    RedirectPattern {
        pattern: String,
        source: regex::Error,
    },
}

#[derive(Clone, Debug)]
pub struct CookieConfig {
    pub name: String,
    pub password: SecretString,
    pub secure: bool,
    pub domain: Option<String>,
    /// `Max-Age` of established sessions; `None` issues a browser-session cookie.
    pub ttl: Option<Duration>,
    /// `Max-Age` of cookies parked mid-handshake.
    pub handshake_ttl: Duration,
    pub same_site: SameSitePolicy,
}

impl Default for CookieConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_COOKIE_NAME.to_string(),
            password: SecretString::from(String::new()),
            secure: true,
            domain: None,
            ttl: Some(Duration::from_secs(DEFAULT_COOKIE_TTL_SECONDS)),
            handshake_ttl: Duration::from_secs(DEFAULT_HANDSHAKE_TTL_SECONDS),
            same_site: SameSitePolicy::Enabled,
        }
    }
}

#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub ttl: Duration,
    pub keepalive: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(DEFAULT_SESSION_TTL_SECONDS),
            keepalive: true,
        }
    }
}

#[derive(Clone, Debug)]
pub struct AuthConfig {
    pub auth_type: AuthType,
    pub anonymous_auth_enabled: bool,
    pub unauthenticated_routes: Vec<String>,
    pub forbidden_usernames: Vec<String>,
    pub logout_url: Option<String>,
    pub idp_timeout: Duration,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            auth_type: AuthType::BasicAuth,
            anonymous_auth_enabled: false,
            unauthenticated_routes: vec!["/api/status".to_string()],
            forbidden_usernames: Vec::new(),
            logout_url: None,
            idp_timeout: Duration::from_secs(DEFAULT_IDP_TIMEOUT_SECONDS),
        }
    }
}

impl AuthConfig {
    /// Parse `auth.type`; the empty string selects `basicauth`.
    ///
    /// # Errors
    /// Returns [`ConfigError::UnknownAuthType`] for anything else.
    pub fn parse_auth_type(value: &str) -> Result<AuthType, ConfigError> {
        if value.is_empty() {
            return Ok(AuthType::BasicAuth);
        }
        value
            .parse()
            .map_err(|_| ConfigError::UnknownAuthType(value.to_string()))
    }
}

#[derive(Clone, Debug, Default)]
pub struct BasicAuthConfig {
    pub header_trumps_session: bool,
    /// Regexes for absolute `nextUrl` values that may be redirected to.
    pub valid_redirects: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct OpenIdConfig {
    pub connect_url: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: SecretString,
    pub scope: String,
    pub base_redirect_url: Option<String>,
    pub logout_url: Option<String>,
    pub header: String,
    pub root_ca: Option<PathBuf>,
    pub verify_hostnames: bool,
}

impl Default for OpenIdConfig {
    fn default() -> Self {
        Self {
            connect_url: None,
            client_id: None,
            client_secret: SecretString::from(String::new()),
            scope: DEFAULT_OPENID_SCOPE.to_string(),
            base_redirect_url: None,
            logout_url: None,
            header: "Authorization".to_string(),
            root_ca: None,
            verify_hostnames: true,
        }
    }
}

#[derive(Clone, Debug)]
pub struct JwtConfig {
    pub header: String,
    pub url_param: String,
    pub login_endpoint: Option<String>,
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            header: "Authorization".to_string(),
            url_param: "authorization".to_string(),
            login_endpoint: None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ProxyConfig {
    pub user_header: String,
    pub roles_header: String,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            user_header: "x-proxy-user".to_string(),
            roles_header: "x-proxy-roles".to_string(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ProxyCacheConfig {
    pub user_header: Option<String>,
    pub roles_header: Option<String>,
    pub proxy_header: String,
    pub proxy_header_ip: Option<String>,
    pub login_endpoint: Option<String>,
}

impl Default for ProxyCacheConfig {
    fn default() -> Self {
        Self {
            user_header: None,
            roles_header: None,
            proxy_header: "x-forwarded-for".to_string(),
            proxy_header_ip: None,
            login_endpoint: None,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct MultitenancyConfig {
    pub enabled: bool,
}

#[derive(Clone, Debug)]
pub struct BackendConfig {
    pub url: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_BACKEND_URL.to_string(),
        }
    }
}

/// Complete configuration handed to the controller and the server.
#[derive(Clone, Debug, Default)]
pub struct SecurityConfig {
    pub cookie: CookieConfig,
    pub session: SessionConfig,
    pub auth: AuthConfig,
    pub basicauth: BasicAuthConfig,
    pub openid: OpenIdConfig,
    pub jwt: JwtConfig,
    pub proxy: ProxyConfig,
    pub proxycache: ProxyCacheConfig,
    pub multitenancy: MultitenancyConfig,
    pub backend: BackendConfig,
}

impl SecurityConfig {
    /// Defaults for everything except the cookie password.
    #[must_use]
    pub fn new(cookie_password: SecretString) -> Self {
        let mut config = Self::default();
        config.cookie.password = cookie_password;
        config
    }

    #[must_use]
    pub fn with_auth_type(mut self, auth_type: AuthType) -> Self {
        self.auth.auth_type = auth_type;
        self
    }

    /// Check every cross-field requirement.
    ///
    /// # Errors
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cookie.password.expose_secret().chars().count() < MIN_PASSWORD_LENGTH {
            return Err(ConfigError::CookiePassword);
        }
        if self.session.ttl.is_zero() {
            return Err(ConfigError::ZeroDuration("session.ttl"));
        }
        if self.cookie.handshake_ttl.is_zero() {
            return Err(ConfigError::ZeroDuration("cookie.handshake_ttl"));
        }
        if self.auth.idp_timeout.is_zero() {
            return Err(ConfigError::ZeroDuration("auth.idp_timeout"));
        }

        parse_url("backend.url", &self.backend.url)?;
        self.redirect_patterns()?;

        let auth_type = self.auth.auth_type;
        match auth_type {
            AuthType::OpenId => {
                let connect_url = required(&self.openid.connect_url, "openid.connect_url", auth_type)?;
                parse_url("openid.connect_url", connect_url)?;
                required(&self.openid.client_id, "openid.client_id", auth_type)?;
                let base = required(
                    &self.openid.base_redirect_url,
                    "openid.base_redirect_url",
                    auth_type,
                )?;
                parse_url("openid.base_redirect_url", base)?;
            }
            AuthType::ProxyCache => {
                required(&self.proxycache.user_header, "proxycache.user_header", auth_type)?;
                required(&self.proxycache.roles_header, "proxycache.roles_header", auth_type)?;
                required(
                    &self.proxycache.proxy_header_ip,
                    "proxycache.proxy_header_ip",
                    auth_type,
                )?;
            }
            AuthType::BasicAuth
            | AuthType::Jwt
            | AuthType::Saml
            | AuthType::Proxy
            | AuthType::Kerberos => {}
        }

        Ok(())
    }

    /// Compiled `basicauth.alternative_login.valid_redirects`.
    ///
    /// # Errors
    /// Returns [`ConfigError::RedirectPattern`] for a pattern that does not compile.
    pub fn redirect_patterns(&self) -> Result<Vec<Regex>, ConfigError> {
        self.basicauth
            .valid_redirects
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|source| ConfigError::RedirectPattern {
                    pattern: pattern.clone(),
                    source,
                })
            })
            .collect()
    }
}

fn required<'a>(
    value: &'a Option<String>,
    setting: &'static str,
    auth_type: AuthType,
) -> Result<&'a str, ConfigError> {
    value
        .as_deref()
        .filter(|v| !v.trim().is_empty())
        .ok_or(ConfigError::Missing { setting, auth_type })
}

fn parse_url(setting: &'static str, value: &str) -> Result<Url, ConfigError> {
    Url::parse(value).map_err(|source| ConfigError::Url { setting, source })
}
