//! Sealing the session record into the browser cookie.
//!
//! Encryption and tamper detection come from the `cookie` crate's private jar
//! (AES-256-GCM with a key derived from `cookie.password`). This module only
//! moves JSON in and out of it and renders `Set-Cookie` headers.

use axum::http::{
    HeaderMap, HeaderValue,
    header::{COOKIE, InvalidHeaderValue},
};
use cookie::{Cookie, CookieJar, Key, SameSite, time};
use secrecy::{ExposeSecret, SecretString};
use std::{fmt, str::FromStr, time::Duration};
use thiserror::Error;
use tracing::debug;

use super::cookie::SecuritySessionCookie;

/// Minimum length of the cookie password, in characters.
pub const MIN_PASSWORD_LENGTH: usize = 32;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("cookie could not be decrypted")]
    Tampered,
    #[error("cookie payload is not a session record: {0}")]
    Payload(#[from] serde_json::Error),
    #[error("cookie password must be at least {MIN_PASSWORD_LENGTH} characters")]
    WeakPassword,
}

/// Seals and unseals session records.
pub trait CookieCodec: Send + Sync {
    /// # Errors
    /// Returns an error if the record cannot be serialized.
    fn seal(&self, record: &SecuritySessionCookie) -> Result<String, CodecError>;

    /// # Errors
    /// Returns an error for values that fail authentication or do not hold a
    /// session record.
    fn unseal(&self, sealed: &str) -> Result<SecuritySessionCookie, CodecError>;
}

/// [`CookieCodec`] backed by the `cookie` crate's private (encrypted) jar.
pub struct PrivateCookieCodec {
    name: String,
    key: Key,
}

impl PrivateCookieCodec {
    /// # Errors
    /// Returns [`CodecError::WeakPassword`] for passwords shorter than
    /// [`MIN_PASSWORD_LENGTH`].
    pub fn new(name: impl Into<String>, password: &SecretString) -> Result<Self, CodecError> {
        let password = password.expose_secret();
        if password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(CodecError::WeakPassword);
        }
        Ok(Self {
            name: name.into(),
            key: Key::derive_from(password.as_bytes()),
        })
    }
}

impl fmt::Debug for PrivateCookieCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateCookieCodec")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl CookieCodec for PrivateCookieCodec {
    fn seal(&self, record: &SecuritySessionCookie) -> Result<String, CodecError> {
        let payload = serde_json::to_string(record)?;
        let mut jar = CookieJar::new();
        jar.private_mut(&self.key)
            .add(Cookie::new(self.name.clone(), payload));
        jar.get(&self.name)
            .map(|sealed| sealed.value().to_string())
            .ok_or(CodecError::Tampered)
    }

    fn unseal(&self, sealed: &str) -> Result<SecuritySessionCookie, CodecError> {
        let mut jar = CookieJar::new();
        jar.add_original(Cookie::new(self.name.clone(), sealed.to_string()));
        let cookie = jar
            .private(&self.key)
            .get(&self.name)
            .ok_or(CodecError::Tampered)?;
        Ok(serde_json::from_str(cookie.value())?)
    }
}

/// `isSameSite` setting: `Strict`, `Lax`, `true` or `false`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SameSitePolicy {
    Strict,
    Lax,
    /// `true`: the attribute is set, with `Lax` semantics so IdP redirects
    /// still carry the cookie.
    Enabled,
    /// `false`: the attribute is omitted.
    Disabled,
}

impl SameSitePolicy {
    fn attribute(self) -> Option<SameSite> {
        match self {
            Self::Strict => Some(SameSite::Strict),
            Self::Lax | Self::Enabled => Some(SameSite::Lax),
            Self::Disabled => None,
        }
    }
}

impl FromStr for SameSitePolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "Strict" => Ok(Self::Strict),
            "Lax" => Ok(Self::Lax),
            "true" => Ok(Self::Enabled),
            "false" => Ok(Self::Disabled),
            other => Err(format!(
                "allowed values of 'isSameSite' are ['Strict', 'Lax', true, false], got '{other}'"
            )),
        }
    }
}

/// Cookie attributes plus the codec, shared by every handler.
pub struct SessionCookies {
    name: String,
    codec: Box<dyn CookieCodec>,
    secure: bool,
    same_site: SameSitePolicy,
    domain: Option<String>,
}

impl SessionCookies {
    #[must_use]
    pub fn new(name: impl Into<String>, codec: Box<dyn CookieCodec>) -> Self {
        Self {
            name: name.into(),
            codec,
            secure: true,
            same_site: SameSitePolicy::Enabled,
            domain: None,
        }
    }

    #[must_use]
    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    #[must_use]
    pub fn with_same_site(mut self, same_site: SameSitePolicy) -> Self {
        self.same_site = same_site;
        self
    }

    #[must_use]
    pub fn with_domain(mut self, domain: Option<String>) -> Self {
        self.domain = domain;
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Decode the session cookie carried by a request.
    ///
    /// Missing, tampered and unparseable cookies all read as `None`.
    #[must_use]
    pub fn read(&self, headers: &HeaderMap) -> Option<SecuritySessionCookie> {
        let sealed = extract_cookie(headers, &self.name)?;
        match self.codec.unseal(&sealed) {
            Ok(record) => Some(record),
            Err(err) => {
                debug!("Discarding unreadable session cookie: {err}");
                None
            }
        }
    }

    /// Seal `record` into a `Set-Cookie` header.
    ///
    /// `max_age` of `None` issues a browser-session cookie.
    ///
    /// # Errors
    /// Returns an error if sealing fails or the cookie is not a valid header.
    pub fn set_cookie(
        &self,
        record: &SecuritySessionCookie,
        max_age: Option<Duration>,
    ) -> anyhow::Result<HeaderValue> {
        let sealed = self.codec.seal(record)?;
        Ok(self.render(sealed, max_age)?)
    }

    /// `Set-Cookie` header that removes the session cookie.
    ///
    /// # Errors
    /// Returns an error if the cookie is not a valid header.
    pub fn clear_cookie(&self) -> Result<HeaderValue, InvalidHeaderValue> {
        self.render(String::new(), Some(Duration::ZERO))
    }

    fn render(
        &self,
        value: String,
        max_age: Option<Duration>,
    ) -> Result<HeaderValue, InvalidHeaderValue> {
        let mut builder = Cookie::build((self.name.clone(), value))
            .path("/")
            .http_only(true)
            .secure(self.secure);
        if let Some(same_site) = self.same_site.attribute() {
            builder = builder.same_site(same_site);
        }
        if let Some(domain) = &self.domain {
            builder = builder.domain(domain.clone());
        }
        if let Some(max_age) = max_age {
            let seconds = i64::try_from(max_age.as_secs()).unwrap_or(i64::MAX);
            builder = builder.max_age(time::Duration::seconds(seconds));
        }
        HeaderValue::from_str(&builder.build().to_string())
    }
}

fn extract_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    for header in headers.get_all(COOKIE) {
        let Ok(value) = header.to_str() else {
            continue;
        };
        for cookie in Cookie::split_parse(value) {
            match cookie {
                Ok(cookie) if cookie.name() == name => return Some(cookie.value().to_string()),
                Ok(_) => {}
                Err(err) => debug!("Skipping malformed cookie pair: {err}"),
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Context, Result};
    use serde_json::json;

    const PASSWORD: &str = "a-very-long-cookie-password-for-tests";

    fn codec() -> Result<PrivateCookieCodec> {
        Ok(PrivateCookieCodec::new(
            "security_authentication",
            &SecretString::from(PASSWORD),
        )?)
    }

    fn record() -> SecuritySessionCookie {
        SecuritySessionCookie {
            username: Some("admin".to_string()),
            auth_type: Some("basicauth".to_string()),
            expiry_time: Some(1_700_000_000_000),
            tenant: Some(json!("__user__")),
            ..SecuritySessionCookie::default()
        }
    }

    #[test]
    fn short_password_is_rejected() {
        let result = PrivateCookieCodec::new("c", &SecretString::from("too-short"));
        assert!(matches!(result, Err(CodecError::WeakPassword)));
    }

    #[test]
    fn sealed_value_hides_payload() -> Result<()> {
        let codec = codec()?;
        let sealed = codec.seal(&record())?;
        assert!(!sealed.contains("admin"));
        assert_eq!(codec.unseal(&sealed)?, record());
        Ok(())
    }

    #[test]
    fn tampered_value_is_rejected() -> Result<()> {
        let codec = codec()?;
        let mut sealed = codec.seal(&record())?;
        let last = sealed.pop().context("empty sealed value")?;
        sealed.push(if last == 'A' { 'B' } else { 'A' });
        assert!(matches!(codec.unseal(&sealed), Err(CodecError::Tampered)));
        assert!(matches!(codec.unseal("garbage"), Err(CodecError::Tampered)));
        Ok(())
    }

    #[test]
    fn other_password_cannot_read_cookie() -> Result<()> {
        let sealed = codec()?.seal(&record())?;
        let other = PrivateCookieCodec::new(
            "security_authentication",
            &SecretString::from("another-very-long-cookie-password!!"),
        )?;
        assert!(other.unseal(&sealed).is_err());
        Ok(())
    }

    #[test]
    fn read_treats_garbage_as_absent() -> Result<()> {
        let cookies = SessionCookies::new("security_authentication", Box::new(codec()?));
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_static("other=1; security_authentication=not-sealed"),
        );
        assert_eq!(cookies.read(&headers), None);
        Ok(())
    }

    #[test]
    fn read_finds_cookie_among_others() -> Result<()> {
        let cookies = SessionCookies::new("security_authentication", Box::new(codec()?));
        let header = cookies.set_cookie(&record(), None)?;
        let pair = header
            .to_str()?
            .split(';')
            .next()
            .context("missing cookie pair")?
            .to_string();
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_str(&format!("theme=dark; {pair}"))?);
        assert_eq!(cookies.read(&headers), Some(record()));
        Ok(())
    }

    #[test]
    fn read_skips_malformed_pairs_and_later_headers() -> Result<()> {
        let cookies = SessionCookies::new("security_authentication", Box::new(codec()?));
        let header = cookies.set_cookie(&record(), None)?;
        let pair = header
            .to_str()?
            .split(';')
            .next()
            .context("missing cookie pair")?
            .to_string();
        let mut headers = HeaderMap::new();
        headers.append(COOKIE, HeaderValue::from_static("garbage; =orphan; theme=dark"));
        headers.append(COOKIE, HeaderValue::from_str(&format!("lang=en;{pair}"))?);
        assert_eq!(cookies.read(&headers), Some(record()));
        Ok(())
    }

    #[test]
    fn set_cookie_carries_attributes() -> Result<()> {
        let cookies = SessionCookies::new("security_authentication", Box::new(codec()?))
            .with_secure(true)
            .with_same_site(SameSitePolicy::Strict)
            .with_domain(Some("dashboards.example.com".to_string()));
        let header = cookies.set_cookie(&record(), Some(Duration::from_secs(600)))?;
        let text = header.to_str()?;
        assert!(text.starts_with("security_authentication="));
        assert!(text.contains("HttpOnly"));
        assert!(text.contains("Secure"));
        assert!(text.contains("SameSite=Strict"));
        assert!(text.contains("Max-Age=600"));
        assert!(text.contains("Domain=dashboards.example.com"));
        Ok(())
    }

    #[test]
    fn disabled_same_site_omits_attribute() -> Result<()> {
        let cookies = SessionCookies::new("security_authentication", Box::new(codec()?))
            .with_same_site(SameSitePolicy::Disabled);
        let header = cookies.clear_cookie()?;
        let text = header.to_str()?;
        assert!(!text.contains("SameSite"));
        assert!(text.contains("Max-Age=0"));
        Ok(())
    }

    #[test]
    fn same_site_policy_parses_allowed_values() {
        assert_eq!("Strict".parse(), Ok(SameSitePolicy::Strict));
        assert_eq!("Lax".parse(), Ok(SameSitePolicy::Lax));
        assert_eq!("true".parse(), Ok(SameSitePolicy::Enabled));
        assert_eq!("false".parse(), Ok(SameSitePolicy::Disabled));
        assert!("None".parse::<SameSitePolicy>().is_err());
    }
}
