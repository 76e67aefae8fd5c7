//! Clients for services the flows delegate to.
//!
//! The search cluster's security plugin is the authority on every credential:
//! flows only ever ask it "who is this?" via [`SecurityBackend`]. The
//! [`openid`] and [`saml`] submodules talk to the external IdP side of the
//! redirect schemes.

pub mod openid;
pub mod saml;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, time::Duration};
use thiserror::Error;
use tracing::{debug, instrument};
use url::Url;
use utoipa::ToSchema;

use crate::APP_USER_AGENT;

pub const AUTHINFO_PATH: &str = "/_opendistro/_security/authinfo";

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("credentials rejected by backend")]
    Unauthorized,
    #[error("backend request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unexpected backend response: {0}")]
    Unexpected(String),
}

/// Identity as reported by the security plugin.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct AuthInfo {
    pub user_name: String,
    pub user_requested_tenant: Option<String>,
    pub backend_roles: Vec<String>,
    pub roles: Vec<String>,
    pub tenants: BTreeMap<String, bool>,
    pub sso_logout_url: Option<String>,
}

/// Who-am-I lookup against the search cluster.
#[async_trait]
pub trait SecurityBackend: Send + Sync {
    /// Resolve the identity for a set of request headers.
    ///
    /// # Errors
    /// [`BackendError::Unauthorized`] when the headers do not identify anyone,
    /// other variants when the backend cannot be reached.
    async fn authenticate(&self, headers: &BTreeMap<String, String>)
    -> Result<AuthInfo, BackendError>;
}

/// Builds the shared HTTP client, honouring the IdP timeout.
///
/// # Errors
/// Returns an error if the TLS backend cannot be initialised.
pub fn http_client(timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(APP_USER_AGENT)
        .timeout(timeout)
        .build()
}

#[derive(Debug, Clone)]
pub struct HttpSecurityBackend {
    client: Client,
    base_url: Url,
}

impl HttpSecurityBackend {
    #[must_use]
    pub fn new(client: Client, base_url: Url) -> Self {
        Self { client, base_url }
    }

    #[must_use]
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// # Errors
    /// Returns an error if `path` cannot be joined to the backend URL.
    pub fn endpoint(&self, path: &str) -> Result<Url, BackendError> {
        self.base_url
            .join(path)
            .map_err(|err| BackendError::Unexpected(format!("invalid backend path {path}: {err}")))
    }
}

#[async_trait]
impl SecurityBackend for HttpSecurityBackend {
    #[instrument(skip_all)]
    async fn authenticate(
        &self,
        headers: &BTreeMap<String, String>,
    ) -> Result<AuthInfo, BackendError> {
        let mut request = self.client.get(self.endpoint(AUTHINFO_PATH)?);
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request.send().await?;
        match response.status() {
            status if status.is_success() => Ok(response.json::<AuthInfo>().await?),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                debug!("Backend rejected credentials");
                Err(BackendError::Unauthorized)
            }
            status => Err(BackendError::Unexpected(format!(
                "authinfo returned {status}"
            ))),
        }
    }
}
