//! OpenID Connect provider client: discovery and code exchange.

use async_trait::async_trait;
use reqwest::{Certificate, Client};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, instrument};

use super::BackendError;
use crate::{APP_USER_AGENT, config::OpenIdConfig};

/// Subset of the discovery document the login flow needs.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct ProviderMetadata {
    pub issuer: Option<String>,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub end_session_endpoint: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct TokenResponse {
    pub id_token: String,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

#[async_trait]
pub trait OpenIdProvider: Send + Sync {
    /// # Errors
    /// Returns an error when the discovery document cannot be fetched.
    async fn metadata(&self) -> Result<ProviderMetadata, BackendError>;

    /// Redeem an authorization code.
    ///
    /// # Errors
    /// [`BackendError::Unauthorized`] when the provider refuses the code.
    async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<TokenResponse, BackendError>;
}

pub struct HttpOpenIdProvider {
    client: Client,
    connect_url: String,
    client_id: String,
    client_secret: SecretString,
    metadata: OnceCell<ProviderMetadata>,
}

impl HttpOpenIdProvider {
    /// Build a client honouring `root_ca` and `verify_hostnames`.
    ///
    /// # Errors
    /// Returns an error if the CA bundle cannot be read or the client cannot
    /// be built.
    pub fn new(config: &OpenIdConfig, timeout: Duration) -> anyhow::Result<Self> {
        let mut builder = Client::builder()
            .user_agent(APP_USER_AGENT)
            .timeout(timeout)
            .danger_accept_invalid_hostnames(!config.verify_hostnames);

        if let Some(path) = &config.root_ca {
            let pem = std::fs::read(path)?;
            builder = builder.add_root_certificate(Certificate::from_pem(&pem)?);
        }

        Ok(Self {
            client: builder.build()?,
            connect_url: config.connect_url.clone().unwrap_or_default(),
            client_id: config.client_id.clone().unwrap_or_default(),
            client_secret: config.client_secret.clone(),
            metadata: OnceCell::new(),
        })
    }

    async fn discover(&self) -> Result<ProviderMetadata, BackendError> {
        debug!("Fetching OpenID discovery document from {}", self.connect_url);
        let response = self.client.get(&self.connect_url).send().await?;
        if !response.status().is_success() {
            return Err(BackendError::Unexpected(format!(
                "discovery returned {}",
                response.status()
            )));
        }
        Ok(response.json::<ProviderMetadata>().await?)
    }
}

#[async_trait]
impl OpenIdProvider for HttpOpenIdProvider {
    async fn metadata(&self) -> Result<ProviderMetadata, BackendError> {
        self.metadata
            .get_or_try_init(|| self.discover())
            .await
            .cloned()
    }

    #[instrument(skip_all)]
    async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<TokenResponse, BackendError> {
        let metadata = self.metadata().await?;
        let form = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.expose_secret()),
        ];

        let response = self
            .client
            .post(&metadata.token_endpoint)
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        if status.is_client_error() {
            debug!("Token endpoint refused the authorization code: {status}");
            return Err(BackendError::Unauthorized);
        }
        if !status.is_success() {
            return Err(BackendError::Unexpected(format!(
                "token endpoint returned {status}"
            )));
        }
        Ok(response.json::<TokenResponse>().await?)
    }
}
