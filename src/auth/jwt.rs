//! Bearer tokens minted by an external system, presented in a header or in
//! a URL parameter on the first request.

use async_trait::async_trait;
use std::{collections::BTreeMap, sync::Arc};

use super::{
    error::FlowError,
    flow::{AccessRequest, AuthFlow, Challenge, FlowRequest, Step},
};
use crate::{
    backend::SecurityBackend,
    config::JwtConfig,
    session::{AuthSession, AuthType, Identity},
};

pub struct JwtFlow {
    backend: Arc<dyn SecurityBackend>,
    header: String,
    url_param: String,
    login_endpoint: Option<String>,
}

/// Where the token was found.
enum Token<'a> {
    Header(&'a str),
    UrlParam(&'a str),
}

impl JwtFlow {
    #[must_use]
    pub fn new(config: &JwtConfig, backend: Arc<dyn SecurityBackend>) -> Self {
        Self {
            backend,
            header: config.header.to_ascii_lowercase(),
            url_param: config.url_param.clone(),
            login_endpoint: config.login_endpoint.clone(),
        }
    }

    fn token<'a>(&self, request: &'a AccessRequest) -> Option<Token<'a>> {
        request
            .query(&self.url_param)
            .map(Token::UrlParam)
            .or_else(|| request.header(&self.header).map(Token::Header))
    }

    fn challenge(&self) -> Step {
        match &self.login_endpoint {
            Some(endpoint) => Step::Challenge(Challenge::Redirect(endpoint.clone())),
            None => Step::Challenge(Challenge::Unauthorized),
        }
    }
}

fn header_value(token: &Token<'_>) -> String {
    match token {
        Token::Header(value) => (*value).to_string(),
        Token::UrlParam(value) if value.starts_with("Bearer ") => (*value).to_string(),
        Token::UrlParam(value) => format!("Bearer {value}"),
    }
}

#[async_trait]
impl AuthFlow for JwtFlow {
    fn auth_type(&self) -> AuthType {
        AuthType::Jwt
    }

    fn auth_header_name(&self) -> &str {
        &self.header
    }

    async fn authenticate(&self, request: &FlowRequest, _now: i64) -> Result<Step, FlowError> {
        match request {
            FlowRequest::Access(access) => {
                let Some(token) = self.token(access) else {
                    return Ok(self.challenge());
                };
                let value = header_value(&token);
                let headers = BTreeMap::from([(self.header.clone(), value.clone())]);
                let info = self.backend.authenticate(&headers).await?;

                // The token must not linger in the address bar or in history.
                let next_url = match token {
                    Token::UrlParam(_) => Some(access.without_query_param(&self.url_param)),
                    Token::Header(_) => None,
                };
                Ok(Step::Established {
                    session: AuthSession::Jwt(Identity::new(info.user_name).with_auth_header(value)),
                    next_url,
                })
            }
            FlowRequest::StartLogin { .. } => Ok(self.challenge()),
            FlowRequest::PasswordLogin { .. }
            | FlowRequest::OidcCallback { .. }
            | FlowRequest::SamlCallback { .. } => Err(FlowError::Unsupported(AuthType::Jwt)),
        }
    }

    fn overrides_session(&self, identity: &Identity, request: &AccessRequest) -> bool {
        self.token(request)
            .is_some_and(|token| identity.auth_header_value() != Some(header_value(&token).as_str()))
    }
}
