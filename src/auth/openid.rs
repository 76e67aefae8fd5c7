//! OpenID Connect authorization code flow.
//!
//! Starting a login parks `{state, nonce, nextUrl, issuedAt}` in the cookie
//! and redirects to the provider. The callback must present the same `state`,
//! within the handshake lifetime, and the returned `id_token` must carry the
//! same `nonce`. The `id_token` then becomes the replayed bearer credential.

use async_trait::async_trait;
use base64ct::{Base64UrlUnpadded, Encoding};
use serde_json::Value;
use std::{collections::BTreeMap, sync::Arc, time::Duration};
use tracing::{debug, warn};
use url::Url;

use super::{
    correlation,
    error::FlowError,
    flow::{AccessRequest, AuthFlow, Challenge, FlowRequest, LogoutPolicy, Step},
    redirect::{LOGIN_PAGE, RedirectPolicy},
};
use crate::{
    backend::{
        SecurityBackend,
        openid::{OpenIdProvider, ProviderMetadata},
    },
    config::SecurityConfig,
    session::{AuthSession, AuthType, Identity, OidcHandshake},
};

pub const LOGIN_PATH: &str = "/auth/openid/login";

pub struct OpenIdFlow {
    backend: Arc<dyn SecurityBackend>,
    provider: Arc<dyn OpenIdProvider>,
    redirects: RedirectPolicy,
    client_id: String,
    scope: String,
    base_redirect_url: String,
    header: String,
    logout_url: Option<String>,
    handshake_ttl: Duration,
}

impl OpenIdFlow {
    #[must_use]
    pub fn new(
        config: &SecurityConfig,
        backend: Arc<dyn SecurityBackend>,
        provider: Arc<dyn OpenIdProvider>,
        redirects: RedirectPolicy,
    ) -> Self {
        let openid = &config.openid;
        Self {
            backend,
            provider,
            redirects,
            client_id: openid.client_id.clone().unwrap_or_default(),
            scope: openid.scope.clone(),
            base_redirect_url: openid
                .base_redirect_url
                .clone()
                .unwrap_or_default()
                .trim_end_matches('/')
                .to_string(),
            header: openid.header.to_ascii_lowercase(),
            logout_url: openid.logout_url.clone(),
            handshake_ttl: config.cookie.handshake_ttl,
        }
    }

    fn redirect_uri(&self) -> String {
        format!("{}{LOGIN_PATH}", self.base_redirect_url)
    }

    fn authorization_url(
        &self,
        metadata: &ProviderMetadata,
        handshake: &OidcHandshake,
    ) -> Result<String, FlowError> {
        let mut url = Url::parse(&metadata.authorization_endpoint)
            .map_err(|err| FlowError::IdentityProvider(format!("bad authorization_endpoint: {err}")))?;
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", &self.redirect_uri())
            .append_pair("scope", &self.scope)
            .append_pair("state", &handshake.state)
            .append_pair("nonce", &handshake.nonce);
        Ok(url.into())
    }

    async fn start(&self, next_url: Option<&str>, now: i64) -> Result<Step, FlowError> {
        let metadata = self.provider.metadata().await?;
        let handshake = OidcHandshake {
            state: correlation::random_token(),
            nonce: correlation::random_token(),
            next_url: self.redirects.sanitize(next_url),
            issued_at: now,
        };
        let redirect = self.authorization_url(&metadata, &handshake)?;
        Ok(Step::Handshake {
            pending: AuthSession::OidcPending(handshake),
            redirect,
        })
    }

    async fn complete(
        &self,
        handshake: &OidcHandshake,
        code: &str,
        state: &str,
        now: i64,
    ) -> Result<Step, FlowError> {
        let ttl = i64::try_from(self.handshake_ttl.as_millis()).unwrap_or(i64::MAX);
        if handshake.issued_at > 0 && now.saturating_sub(handshake.issued_at) > ttl {
            debug!("OpenID handshake expired");
            return Err(FlowError::CorrelationMismatch);
        }
        if !correlation::matches(&handshake.state, state) {
            return Err(FlowError::CorrelationMismatch);
        }

        let tokens = self.provider.exchange_code(code, &self.redirect_uri()).await?;
        let nonce = id_token_claim(&tokens.id_token, "nonce");
        if !nonce.is_some_and(|nonce| correlation::matches(&handshake.nonce, &nonce)) {
            warn!("id_token nonce does not match the login request");
            return Err(FlowError::CorrelationMismatch);
        }

        let value = format!("Bearer {}", tokens.id_token);
        let info = self.verify(&value).await?;
        Ok(Step::Established {
            session: AuthSession::OidcComplete(Identity::new(info).with_auth_header(value)),
            next_url: Some(handshake.next_url.clone()),
        })
    }

    async fn verify(&self, value: &str) -> Result<String, FlowError> {
        let headers = BTreeMap::from([(self.header.clone(), value.to_string())]);
        Ok(self.backend.authenticate(&headers).await?.user_name)
    }
}

/// String claim from the payload of a compact JWS, without verifying it.
///
/// The backend verifies the signature when the token is replayed.
fn id_token_claim(id_token: &str, claim: &str) -> Option<String> {
    let payload = id_token.split('.').nth(1)?;
    let bytes = Base64UrlUnpadded::decode_vec(payload.trim_end_matches('=')).ok()?;
    let claims: Value = serde_json::from_slice(&bytes).ok()?;
    claims.get(claim)?.as_str().map(ToString::to_string)
}

/// `/auth/openid/login?nextUrl=..`
#[must_use]
pub fn login_path(next_url: &str) -> String {
    let query: String = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("nextUrl", next_url)
        .finish();
    format!("{LOGIN_PATH}?{query}")
}

#[async_trait]
impl AuthFlow for OpenIdFlow {
    fn auth_type(&self) -> AuthType {
        AuthType::OpenId
    }

    fn auth_header_name(&self) -> &str {
        &self.header
    }

    async fn authenticate(&self, request: &FlowRequest, now: i64) -> Result<Step, FlowError> {
        match request {
            FlowRequest::Access(access) => match access.header(&self.header) {
                Some(value) => {
                    let value = value.to_string();
                    let info = self.verify(&value).await?;
                    Ok(Step::Established {
                        session: AuthSession::OidcComplete(
                            Identity::new(info).with_auth_header(value),
                        ),
                        next_url: None,
                    })
                }
                None => Ok(Step::Challenge(Challenge::Redirect(login_path(
                    &self.redirects.sanitize(Some(access.path_and_query())),
                )))),
            },
            FlowRequest::StartLogin { next_url } => self.start(next_url.as_deref(), now).await,
            FlowRequest::OidcCallback { .. } | FlowRequest::SamlCallback { .. } => {
                Err(FlowError::CorrelationMismatch)
            }
            FlowRequest::PasswordLogin { .. } => Err(FlowError::Unsupported(AuthType::OpenId)),
        }
    }

    async fn resume(
        &self,
        pending: &AuthSession,
        request: &FlowRequest,
        now: i64,
    ) -> Result<Step, FlowError> {
        match (pending, request) {
            (AuthSession::OidcPending(handshake), FlowRequest::OidcCallback { code, state }) => {
                self.complete(handshake, code, state, now).await
            }
            _ => Err(FlowError::CorrelationMismatch),
        }
    }

    fn overrides_session(&self, identity: &Identity, request: &AccessRequest) -> bool {
        request
            .header(&self.header)
            .is_some_and(|value| identity.auth_header_value() != Some(value))
    }

    fn logout_policy(&self) -> LogoutPolicy {
        LogoutPolicy::ClearAll
    }

    async fn logout_redirect(&self, identity: Option<&Identity>) -> Option<String> {
        if let Some(url) = &self.logout_url {
            return Some(url.clone());
        }
        let metadata = match self.provider.metadata().await {
            Ok(metadata) => metadata,
            Err(err) => {
                warn!("Cannot resolve end_session_endpoint: {err}");
                return None;
            }
        };
        let mut url = Url::parse(metadata.end_session_endpoint.as_deref()?).ok()?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair(
                "post_logout_redirect_uri",
                &format!("{}{LOGIN_PAGE}", self.base_redirect_url),
            );
            if let Some(token) = identity
                .and_then(Identity::auth_header_value)
                .and_then(|value| value.strip_prefix("Bearer "))
            {
                query.append_pair("id_token_hint", token);
            }
        }
        Some(url.into())
    }
}
