//! Identity asserted by a trusted reverse proxy.
//!
//! `proxy` re-reads the proxy headers whenever they change; `proxycache`
//! keeps what it saw on the login endpoint and replays it, adding the
//! configured proxy address so the backend trusts the replay.

use async_trait::async_trait;
use std::{collections::BTreeMap, sync::Arc};
use tracing::debug;

use super::{
    error::FlowError,
    flow::{AccessRequest, AuthFlow, Challenge, FlowRequest, Step},
};
use crate::{
    backend::SecurityBackend,
    config::SecurityConfig,
    session::{AuthSession, AuthType, Identity},
};

pub struct ProxyFlow {
    auth_type: AuthType,
    backend: Arc<dyn SecurityBackend>,
    user_header: String,
    roles_header: String,
    /// `(proxy_header, proxy_header_ip)`, set for `proxycache`.
    forwarded_for: Option<(String, String)>,
    login_endpoint: Option<String>,
}

impl ProxyFlow {
    #[must_use]
    pub fn proxy(config: &SecurityConfig, backend: Arc<dyn SecurityBackend>) -> Self {
        Self {
            auth_type: AuthType::Proxy,
            backend,
            user_header: config.proxy.user_header.to_ascii_lowercase(),
            roles_header: config.proxy.roles_header.to_ascii_lowercase(),
            forwarded_for: None,
            login_endpoint: None,
        }
    }

    #[must_use]
    pub fn proxy_cache(config: &SecurityConfig, backend: Arc<dyn SecurityBackend>) -> Self {
        let cache = &config.proxycache;
        Self {
            auth_type: AuthType::ProxyCache,
            backend,
            user_header: cache.user_header.clone().unwrap_or_default().to_ascii_lowercase(),
            roles_header: cache.roles_header.clone().unwrap_or_default().to_ascii_lowercase(),
            forwarded_for: cache.proxy_header_ip.clone().map(|ip| {
                (cache.proxy_header.to_ascii_lowercase(), ip)
            }),
            login_endpoint: cache.login_endpoint.clone(),
        }
    }

    fn asserted_headers(&self, request: &AccessRequest) -> Option<BTreeMap<String, String>> {
        let user = request.header(&self.user_header)?;
        let mut headers = BTreeMap::from([(self.user_header.clone(), user.to_string())]);
        if let Some(roles) = request.header(&self.roles_header) {
            headers.insert(self.roles_header.clone(), roles.to_string());
        }
        if let Some((name, ip)) = &self.forwarded_for {
            headers.insert(name.clone(), ip.clone());
        }
        Some(headers)
    }

    fn challenge(&self) -> Step {
        match &self.login_endpoint {
            Some(endpoint) => Step::Challenge(Challenge::Redirect(endpoint.clone())),
            None => Step::Challenge(Challenge::Unauthorized),
        }
    }
}

#[async_trait]
impl AuthFlow for ProxyFlow {
    fn auth_type(&self) -> AuthType {
        self.auth_type
    }

    async fn authenticate(&self, request: &FlowRequest, _now: i64) -> Result<Step, FlowError> {
        match request {
            FlowRequest::Access(access) => {
                let Some(headers) = self.asserted_headers(access) else {
                    debug!("No {} header on request", self.user_header);
                    return Ok(self.challenge());
                };
                let info = self.backend.authenticate(&headers).await?;
                let identity = Identity::new(info.user_name).with_additional_headers(headers);
                Ok(Step::Established {
                    session: AuthSession::established(self.auth_type, identity),
                    next_url: None,
                })
            }
            FlowRequest::StartLogin { .. } => Ok(self.challenge()),
            FlowRequest::PasswordLogin { .. }
            | FlowRequest::OidcCallback { .. }
            | FlowRequest::SamlCallback { .. } => Err(FlowError::Unsupported(self.auth_type)),
        }
    }

    fn overrides_session(&self, identity: &Identity, request: &AccessRequest) -> bool {
        let Some(headers) = self.asserted_headers(request) else {
            return false;
        };
        match self.auth_type {
            AuthType::ProxyCache => {
                headers.get(&self.user_header) != identity.additional_auth_headers.get(&self.user_header)
            }
            _ => headers != identity.additional_auth_headers,
        }
    }
}
