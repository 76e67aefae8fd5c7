//! SAML service-provider calls, delegated to the security plugin.
//!
//! The plugin owns the SP metadata and assertion validation. Starting a login
//! means asking it for a challenge, which it returns as a `401` carrying
//! `WWW-Authenticate: X-Security-IdP realm=".." location=".." requestId=".."`.
//! Finishing one means posting the `SAMLResponse` to its `authtoken` API.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::{StatusCode, header::WWW_AUTHENTICATE};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::{AUTHINFO_PATH, BackendError, HttpSecurityBackend};

pub const AUTHTOKEN_PATH: &str = "/_opendistro/_security/api/authtoken";

static LOCATION: Lazy<Result<Regex, regex::Error>> =
    Lazy::new(|| Regex::new(r#"location="([^"]+)""#));
static REQUEST_ID: Lazy<Result<Regex, regex::Error>> =
    Lazy::new(|| Regex::new(r#"requestId="([^"]+)""#));

/// Where to send the browser and the id to correlate the response with.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SamlChallenge {
    pub location: String,
    pub request_id: String,
}

#[derive(Serialize)]
struct AuthTokenRequest<'a> {
    #[serde(rename = "RequestId")]
    request_id: &'a str,
    #[serde(rename = "SAMLResponse")]
    saml_response: &'a str,
}

#[derive(Deserialize)]
struct AuthTokenResponse {
    authorization: String,
}

#[async_trait]
pub trait SamlServiceProvider: Send + Sync {
    /// # Errors
    /// Returns an error when no challenge can be obtained.
    async fn challenge(&self) -> Result<SamlChallenge, BackendError>;

    /// Trade a `SAMLResponse` for the `Authorization` value to replay.
    ///
    /// # Errors
    /// [`BackendError::Unauthorized`] when the assertion is refused.
    async fn exchange(&self, request_id: &str, saml_response: &str)
    -> Result<String, BackendError>;
}

/// Extract the challenge from a `WWW-Authenticate` value.
#[must_use]
pub fn parse_challenge(header: &str) -> Option<SamlChallenge> {
    if !header.trim_start().starts_with("X-Security-IdP") {
        return None;
    }
    let capture = |pattern: &Lazy<Result<Regex, regex::Error>>| {
        pattern
            .as_ref()
            .ok()
            .and_then(|regex| regex.captures(header))
            .and_then(|captures| captures.get(1))
            .map(|value| value.as_str().to_string())
    };
    Some(SamlChallenge {
        location: capture(&LOCATION)?,
        request_id: capture(&REQUEST_ID)?,
    })
}

#[async_trait]
impl SamlServiceProvider for HttpSecurityBackend {
    #[instrument(skip_all)]
    async fn challenge(&self) -> Result<SamlChallenge, BackendError> {
        let response = self.client().get(self.endpoint(AUTHINFO_PATH)?).send().await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Err(BackendError::Unexpected(format!(
                "expected SAML challenge, got {}",
                response.status()
            )));
        }
        response
            .headers()
            .get(WWW_AUTHENTICATE)
            .and_then(|value| value.to_str().ok())
            .and_then(parse_challenge)
            .ok_or_else(|| BackendError::Unexpected("missing X-Security-IdP challenge".to_string()))
    }

    #[instrument(skip_all)]
    async fn exchange(
        &self,
        request_id: &str,
        saml_response: &str,
    ) -> Result<String, BackendError> {
        let body = AuthTokenRequest {
            request_id,
            saml_response,
        };
        let response = self
            .client()
            .post(self.endpoint(AUTHTOKEN_PATH)?)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status.is_client_error() {
            debug!("SAML assertion refused: {status}");
            return Err(BackendError::Unauthorized);
        }
        if !status.is_success() {
            return Err(BackendError::Unexpected(format!(
                "authtoken returned {status}"
            )));
        }
        Ok(response.json::<AuthTokenResponse>().await?.authorization)
    }
}
