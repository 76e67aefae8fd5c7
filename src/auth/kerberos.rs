//! SPNEGO: the browser answers a `Negotiate` challenge with a ticket that
//! the backend verifies.

use async_trait::async_trait;
use std::{collections::BTreeMap, sync::Arc};

use super::{
    error::FlowError,
    flow::{AccessRequest, AuthFlow, Challenge, FlowRequest, Step},
};
use crate::{
    backend::SecurityBackend,
    session::{AuthSession, AuthType, Identity},
};

pub struct KerberosFlow {
    backend: Arc<dyn SecurityBackend>,
}

impl KerberosFlow {
    #[must_use]
    pub fn new(backend: Arc<dyn SecurityBackend>) -> Self {
        Self { backend }
    }
}

fn negotiate_header(request: &AccessRequest) -> Option<&str> {
    request
        .header("authorization")
        .filter(|value| value.starts_with("Negotiate "))
}

#[async_trait]
impl AuthFlow for KerberosFlow {
    fn auth_type(&self) -> AuthType {
        AuthType::Kerberos
    }

    async fn authenticate(&self, request: &FlowRequest, _now: i64) -> Result<Step, FlowError> {
        match request {
            FlowRequest::Access(access) => {
                let Some(ticket) = negotiate_header(access) else {
                    return Ok(Step::Challenge(Challenge::Negotiate));
                };
                let headers = BTreeMap::from([("authorization".to_string(), ticket.to_string())]);
                let info = self.backend.authenticate(&headers).await?;
                Ok(Step::Established {
                    session: AuthSession::Kerberos(
                        Identity::new(info.user_name).with_auth_header(ticket),
                    ),
                    next_url: None,
                })
            }
            FlowRequest::StartLogin { .. } => Ok(Step::Challenge(Challenge::Negotiate)),
            FlowRequest::PasswordLogin { .. }
            | FlowRequest::OidcCallback { .. }
            | FlowRequest::SamlCallback { .. } => Err(FlowError::Unsupported(AuthType::Kerberos)),
        }
    }

    fn overrides_session(&self, identity: &Identity, request: &AccessRequest) -> bool {
        negotiate_header(request).is_some_and(|ticket| identity.auth_header_value() != Some(ticket))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::testing::StaticBackend;
    use anyhow::Result;
    use axum::http::{HeaderMap, HeaderValue};

    #[tokio::test]
    async fn missing_ticket_is_challenged() -> Result<()> {
        let flow = KerberosFlow::new(Arc::new(StaticBackend::default()));
        let access = AccessRequest::new(&"/app/home".parse()?, HeaderMap::new());
        let step = flow.authenticate(&FlowRequest::Access(access), 0).await?;
        assert_eq!(step, Step::Challenge(Challenge::Negotiate));
        Ok(())
    }

    #[tokio::test]
    async fn ticket_establishes_session() -> Result<()> {
        let flow = KerberosFlow::new(Arc::new(StaticBackend::accepting(
            "Negotiate YIIC",
            "alice@EXAMPLE.COM",
        )));
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Negotiate YIIC"));
        let access = AccessRequest::new(&"/app/home".parse()?, headers);
        let step = flow.authenticate(&FlowRequest::Access(access), 0).await?;
        let Step::Established { session, .. } = step else {
            anyhow::bail!("expected an established session");
        };
        assert_eq!(
            session.identity().map(|identity| identity.username.as_str()),
            Some("alice@EXAMPLE.COM")
        );
        Ok(())
    }

    #[tokio::test]
    async fn password_login_is_unsupported() {
        let flow = KerberosFlow::new(Arc::new(StaticBackend::default()));
        let request = FlowRequest::PasswordLogin {
            username: "alice".to_string(),
            password: secrecy::SecretString::from("pw"),
        };
        assert!(matches!(
            flow.authenticate(&request, 0).await,
            Err(FlowError::Unsupported(AuthType::Kerberos))
        ));
    }
}
