//! Username/password login through the dashboard's own login form.

use async_trait::async_trait;
use base64ct::{Base64, Encoding};
use secrecy::ExposeSecret;
use std::{collections::BTreeMap, sync::Arc};
use tracing::debug;

use super::{
    error::FlowError,
    flow::{AccessRequest, AuthFlow, Challenge, FlowRequest, Step},
    redirect::RedirectPolicy,
};
use crate::{
    backend::SecurityBackend,
    config::SecurityConfig,
    session::{AuthSession, AuthType, Identity},
};

pub struct BasicAuthFlow {
    backend: Arc<dyn SecurityBackend>,
    redirects: RedirectPolicy,
    forbidden_usernames: Vec<String>,
    anonymous_auth_enabled: bool,
    header_trumps_session: bool,
}

impl BasicAuthFlow {
    #[must_use]
    pub fn new(
        config: &SecurityConfig,
        backend: Arc<dyn SecurityBackend>,
        redirects: RedirectPolicy,
    ) -> Self {
        Self {
            backend,
            redirects,
            forbidden_usernames: config.auth.forbidden_usernames.clone(),
            anonymous_auth_enabled: config.auth.anonymous_auth_enabled,
            header_trumps_session: config.basicauth.header_trumps_session,
        }
    }

    async fn verify(&self, auth_header: String) -> Result<Step, FlowError> {
        let headers = BTreeMap::from([("authorization".to_string(), auth_header.clone())]);
        let info = self.backend.authenticate(&headers).await?;
        Ok(Step::Established {
            session: AuthSession::Basic(Identity::new(info.user_name).with_auth_header(auth_header)),
            next_url: None,
        })
    }

    async fn anonymous(&self) -> Result<Step, FlowError> {
        let info = self.backend.authenticate(&BTreeMap::new()).await?;
        Ok(Step::Established {
            session: AuthSession::Basic(Identity::new(info.user_name).anonymous()),
            next_url: None,
        })
    }
}

/// `Basic base64(username:password)`.
#[must_use]
pub fn basic_header(username: &str, password: &str) -> String {
    format!(
        "Basic {}",
        Base64::encode_string(format!("{username}:{password}").as_bytes())
    )
}

fn request_basic_header(request: &AccessRequest) -> Option<&str> {
    request
        .header("authorization")
        .filter(|value| value.starts_with("Basic "))
}

#[async_trait]
impl AuthFlow for BasicAuthFlow {
    fn auth_type(&self) -> AuthType {
        AuthType::BasicAuth
    }

    async fn authenticate(&self, request: &FlowRequest, _now: i64) -> Result<Step, FlowError> {
        match request {
            FlowRequest::PasswordLogin { username, password } => {
                let password = password.expose_secret();
                if username.is_empty() || password.is_empty() {
                    return Err(FlowError::CredentialRejected);
                }
                if self.forbidden_usernames.iter().any(|name| name == username) {
                    debug!("Login refused for forbidden username {username}");
                    return Err(FlowError::CredentialRejected);
                }
                self.verify(basic_header(username, password)).await
            }
            FlowRequest::Access(access) => {
                if let Some(header) = request_basic_header(access) {
                    return self.verify(header.to_string()).await;
                }
                if self.anonymous_auth_enabled {
                    return self.anonymous().await;
                }
                Ok(Step::Challenge(Challenge::LoginPage {
                    next_url: self.redirects.sanitize(Some(access.path_and_query())),
                }))
            }
            FlowRequest::StartLogin { next_url } => Ok(Step::Challenge(Challenge::LoginPage {
                next_url: self.redirects.sanitize(next_url.as_deref()),
            })),
            FlowRequest::OidcCallback { .. } | FlowRequest::SamlCallback { .. } => {
                Err(FlowError::Unsupported(AuthType::BasicAuth))
            }
        }
    }

    fn overrides_session(&self, identity: &Identity, request: &AccessRequest) -> bool {
        self.header_trumps_session
            && request_basic_header(request)
                .is_some_and(|header| identity.auth_header_value() != Some(header))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::testing::{StaticBackend, config};
    use anyhow::Result;
    use axum::http::{HeaderMap, HeaderValue};
    use secrecy::SecretString;

    fn flow(config: &SecurityConfig, backend: Arc<StaticBackend>) -> BasicAuthFlow {
        BasicAuthFlow::new(config, backend, RedirectPolicy::default())
    }

    fn login(username: &str, password: &str) -> FlowRequest {
        FlowRequest::PasswordLogin {
            username: username.to_string(),
            password: SecretString::from(password),
        }
    }

    #[test]
    fn basic_header_encodes_credentials() {
        assert_eq!(basic_header("admin", "admin"), "Basic YWRtaW46YWRtaW4=");
    }

    #[tokio::test]
    async fn valid_password_establishes_session() -> Result<()> {
        let backend = Arc::new(StaticBackend::accepting(&basic_header("admin", "admin"), "admin"));
        let step = flow(&config(), backend).authenticate(&login("admin", "admin"), 0).await?;
        let Step::Established { session, .. } = step else {
            anyhow::bail!("expected an established session");
        };
        assert_eq!(session.auth_type(), AuthType::BasicAuth);
        let identity = session.identity().cloned().unwrap_or_default();
        assert_eq!(identity.username, "admin");
        assert!(identity.assign_auth_header);
        assert_eq!(identity.auth_header_value(), Some("Basic YWRtaW46YWRtaW4="));
        Ok(())
    }

    #[tokio::test]
    async fn wrong_password_is_rejected() {
        let backend = Arc::new(StaticBackend::accepting(&basic_header("admin", "admin"), "admin"));
        let result = flow(&config(), backend).authenticate(&login("admin", "wrong"), 0).await;
        assert!(matches!(result, Err(FlowError::CredentialRejected)));
    }

    #[tokio::test]
    async fn forbidden_and_empty_usernames_never_reach_backend() {
        let mut config = config();
        config.auth.forbidden_usernames = vec!["kibanaserver".to_string()];
        let backend = Arc::new(StaticBackend::accepting(
            &basic_header("kibanaserver", "kibanaserver"),
            "kibanaserver",
        ));
        let flow = flow(&config, backend.clone());

        for request in [login("kibanaserver", "kibanaserver"), login("", "x"), login("x", "")] {
            let result = flow.authenticate(&request, 0).await;
            assert!(matches!(result, Err(FlowError::CredentialRejected)));
        }
        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test]
    async fn unauthenticated_access_goes_to_login_page() -> Result<()> {
        let backend = Arc::new(StaticBackend::default());
        let access = AccessRequest::new(&"/app/discover?x=1".parse()?, HeaderMap::new());
        let step = flow(&config(), backend)
            .authenticate(&FlowRequest::Access(access), 0)
            .await?;
        assert_eq!(
            step,
            Step::Challenge(Challenge::LoginPage {
                next_url: "/app/discover?x=1".to_string()
            })
        );
        Ok(())
    }

    #[tokio::test]
    async fn anonymous_access_when_enabled() -> Result<()> {
        let mut config = config();
        config.auth.anonymous_auth_enabled = true;
        let backend = Arc::new(StaticBackend::anonymous("opendistro_security_anonymous"));
        let access = AccessRequest::new(&"/app/home".parse()?, HeaderMap::new());
        let step = flow(&config, backend)
            .authenticate(&FlowRequest::Access(access), 0)
            .await?;
        let Step::Established { session, .. } = step else {
            anyhow::bail!("expected an established session");
        };
        let identity = session.identity().cloned().unwrap_or_default();
        assert!(identity.is_anonymous_auth);
        assert!(!identity.assign_auth_header);
        Ok(())
    }

    #[test]
    fn header_trumps_session_only_when_enabled() -> Result<()> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "authorization",
            HeaderValue::from_str(&basic_header("bob", "bob"))?,
        );
        let access = AccessRequest::new(&"/app/home".parse()?, headers);
        let identity = Identity::new("admin").with_auth_header(basic_header("admin", "admin"));

        let backend = Arc::new(StaticBackend::default());
        assert!(!flow(&config(), backend.clone()).overrides_session(&identity, &access));

        let mut config = config();
        config.basicauth.header_trumps_session = true;
        assert!(flow(&config, backend).overrides_session(&identity, &access));
        Ok(())
    }
}
