//! SAML 2.0 web browser SSO through the security plugin.

use async_trait::async_trait;
use std::{collections::BTreeMap, sync::Arc};
use tracing::warn;

use super::{
    correlation,
    error::FlowError,
    flow::{AuthFlow, Challenge, FlowRequest, LogoutPolicy, Step},
    redirect::RedirectPolicy,
};
use crate::{
    backend::{SecurityBackend, saml::SamlServiceProvider},
    session::{AuthSession, AuthType, Identity, SamlHandshake},
};

pub const LOGIN_PATH: &str = "/auth/saml/login";
pub const ACS_PATH: &str = "/_opendistro/_security/saml/acs";

pub struct SamlFlow {
    backend: Arc<dyn SecurityBackend>,
    provider: Arc<dyn SamlServiceProvider>,
    redirects: RedirectPolicy,
}

impl SamlFlow {
    #[must_use]
    pub fn new(
        backend: Arc<dyn SecurityBackend>,
        provider: Arc<dyn SamlServiceProvider>,
        redirects: RedirectPolicy,
    ) -> Self {
        Self {
            backend,
            provider,
            redirects,
        }
    }

    async fn complete(
        &self,
        handshake: &SamlHandshake,
        saml_response: &str,
        in_response_to: Option<&str>,
    ) -> Result<Step, FlowError> {
        // IdP-initiated responses carry no InResponseTo and are refused.
        if !in_response_to.is_some_and(|id| correlation::matches(&handshake.request_id, id)) {
            return Err(FlowError::CorrelationMismatch);
        }

        let authorization = self
            .provider
            .exchange(&handshake.request_id, saml_response)
            .await?;
        let headers = BTreeMap::from([("authorization".to_string(), authorization.clone())]);
        let info = self.backend.authenticate(&headers).await?;

        Ok(Step::Established {
            session: AuthSession::SamlComplete(
                Identity::new(info.user_name).with_auth_header(authorization),
            ),
            next_url: Some(handshake.next_url.clone()),
        })
    }
}

/// `/auth/saml/login?nextUrl=..`
#[must_use]
pub fn login_path(next_url: &str) -> String {
    let query: String = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("nextUrl", next_url)
        .finish();
    format!("{LOGIN_PATH}?{query}")
}

#[async_trait]
impl AuthFlow for SamlFlow {
    fn auth_type(&self) -> AuthType {
        AuthType::Saml
    }

    async fn authenticate(&self, request: &FlowRequest, _now: i64) -> Result<Step, FlowError> {
        match request {
            FlowRequest::Access(access) => Ok(Step::Challenge(Challenge::Redirect(login_path(
                &self.redirects.sanitize(Some(access.path_and_query())),
            )))),
            FlowRequest::StartLogin { next_url } => {
                let challenge = self.provider.challenge().await?;
                Ok(Step::Handshake {
                    pending: AuthSession::SamlPending(SamlHandshake {
                        request_id: challenge.request_id,
                        next_url: self.redirects.sanitize(next_url.as_deref()),
                    }),
                    redirect: challenge.location,
                })
            }
            FlowRequest::OidcCallback { .. } | FlowRequest::SamlCallback { .. } => {
                Err(FlowError::CorrelationMismatch)
            }
            FlowRequest::PasswordLogin { .. } => Err(FlowError::Unsupported(AuthType::Saml)),
        }
    }

    async fn resume(
        &self,
        pending: &AuthSession,
        request: &FlowRequest,
        _now: i64,
    ) -> Result<Step, FlowError> {
        match (pending, request) {
            (
                AuthSession::SamlPending(handshake),
                FlowRequest::SamlCallback {
                    saml_response,
                    in_response_to,
                },
            ) => {
                self.complete(handshake, saml_response, in_response_to.as_deref())
                    .await
            }
            _ => Err(FlowError::CorrelationMismatch),
        }
    }

    fn logout_policy(&self) -> LogoutPolicy {
        LogoutPolicy::ClearAll
    }

    async fn logout_redirect(&self, identity: Option<&Identity>) -> Option<String> {
        let headers = identity?.replay_headers(self.auth_header_name());
        match self.backend.authenticate(&headers).await {
            Ok(info) => info.sso_logout_url,
            Err(err) => {
                warn!("Cannot resolve SAML logout URL: {err}");
                None
            }
        }
    }
}
