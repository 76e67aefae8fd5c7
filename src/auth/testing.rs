//! In-memory stand-ins for the backend and identity providers.

use async_trait::async_trait;
use base64ct::{Base64UrlUnpadded, Encoding};
use secrecy::SecretString;
use serde_json::{Value, json};
use std::{
    collections::BTreeMap,
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use crate::{
    backend::{
        AuthInfo, BackendError, SecurityBackend,
        openid::{OpenIdProvider, ProviderMetadata, TokenResponse},
        saml::{SamlChallenge, SamlServiceProvider},
    },
    config::SecurityConfig,
};

pub fn config() -> SecurityConfig {
    SecurityConfig::new(SecretString::from("0123456789abcdef0123456789abcdef"))
}

/// Unsigned compact JWS carrying `claims`.
pub fn id_token(claims: &Value) -> String {
    let header = Base64UrlUnpadded::encode_string(br#"{"alg":"none"}"#);
    let payload = Base64UrlUnpadded::encode_string(claims.to_string().as_bytes());
    format!("{header}.{payload}.sig")
}

enum Rule {
    Exact {
        header: String,
        value: String,
        username: String,
    },
    Prefix {
        header: String,
        prefix: String,
        username: String,
    },
    Anonymous(String),
}

/// Backend that knows a fixed set of credentials.
#[derive(Default)]
pub struct StaticBackend {
    rules: Vec<Rule>,
    calls: AtomicUsize,
}

impl StaticBackend {
    pub fn with_header(header: &str, value: &str, username: &str) -> Self {
        Self {
            rules: vec![Rule::Exact {
                header: header.to_string(),
                value: value.to_string(),
                username: username.to_string(),
            }],
            calls: AtomicUsize::new(0),
        }
    }

    pub fn accepting(authorization: &str, username: &str) -> Self {
        Self::with_header("authorization", authorization, username)
    }

    pub fn accepting_prefix(prefix: &str, username: &str) -> Self {
        Self {
            rules: vec![Rule::Prefix {
                header: "authorization".to_string(),
                prefix: prefix.to_string(),
                username: username.to_string(),
            }],
            calls: AtomicUsize::new(0),
        }
    }

    pub fn anonymous(username: &str) -> Self {
        Self {
            rules: vec![Rule::Anonymous(username.to_string())],
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SecurityBackend for StaticBackend {
    async fn authenticate(
        &self,
        headers: &BTreeMap<String, String>,
    ) -> Result<AuthInfo, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let found = self.rules.iter().find_map(|rule| match rule {
            Rule::Exact {
                header,
                value,
                username,
            } => (headers.get(header) == Some(value)).then_some(username),
            Rule::Prefix {
                header,
                prefix,
                username,
            } => headers
                .get(header)
                .is_some_and(|value| value.starts_with(prefix.as_str()))
                .then_some(username),
            Rule::Anonymous(username) => headers.is_empty().then_some(username),
        });
        found
            .map(|username| AuthInfo {
                user_name: username.clone(),
                roles: vec!["all_access".to_string()],
                ..AuthInfo::default()
            })
            .ok_or(BackendError::Unauthorized)
    }
}

/// OpenID provider whose tokens carry a configurable nonce.
pub struct StaticProvider {
    nonce: Mutex<String>,
    exchanges: AtomicUsize,
}

impl StaticProvider {
    pub fn new(nonce: &str) -> Self {
        Self {
            nonce: Mutex::new(nonce.to_string()),
            exchanges: AtomicUsize::new(0),
        }
    }

    pub fn set_nonce(&self, nonce: &str) {
        if let Ok(mut current) = self.nonce.lock() {
            *current = nonce.to_string();
        }
    }

    pub fn exchanges(&self) -> usize {
        self.exchanges.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OpenIdProvider for StaticProvider {
    async fn metadata(&self) -> Result<ProviderMetadata, BackendError> {
        Ok(ProviderMetadata {
            issuer: Some("https://idp.example.com".to_string()),
            authorization_endpoint: "https://idp.example.com/auth".to_string(),
            token_endpoint: "https://idp.example.com/token".to_string(),
            end_session_endpoint: Some("https://idp.example.com/logout".to_string()),
        })
    }

    async fn exchange_code(
        &self,
        _code: &str,
        _redirect_uri: &str,
    ) -> Result<TokenResponse, BackendError> {
        self.exchanges.fetch_add(1, Ordering::SeqCst);
        let nonce = self
            .nonce
            .lock()
            .map(|nonce| nonce.clone())
            .unwrap_or_default();
        Ok(TokenResponse {
            id_token: id_token(&json!({ "sub": "alice", "nonce": nonce })),
            access_token: None,
            refresh_token: None,
            expires_in: None,
        })
    }
}

/// SAML SP that always issues the same request id.
pub struct StaticSamlProvider {
    request_id: String,
    authorization: String,
    exchanges: AtomicUsize,
}

impl StaticSamlProvider {
    pub fn new(request_id: &str, authorization: &str) -> Self {
        Self {
            request_id: request_id.to_string(),
            authorization: authorization.to_string(),
            exchanges: AtomicUsize::new(0),
        }
    }

    pub fn exchanges(&self) -> usize {
        self.exchanges.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SamlServiceProvider for StaticSamlProvider {
    async fn challenge(&self) -> Result<SamlChallenge, BackendError> {
        Ok(SamlChallenge {
            location: "https://idp.example.com/sso?SAMLRequest=abc".to_string(),
            request_id: self.request_id.clone(),
        })
    }

    async fn exchange(&self, request_id: &str, _saml_response: &str) -> Result<String, BackendError> {
        self.exchanges.fetch_add(1, Ordering::SeqCst);
        if request_id == self.request_id {
            Ok(self.authorization.clone())
        } else {
            Err(BackendError::Unauthorized)
        }
    }
}
