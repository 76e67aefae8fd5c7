//! JSON wire shape of the session cookie.
//!
//! Field names are part of the contract with cookies already issued to
//! browsers, so they are spelled out here and never derived from Rust names.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Session record exactly as it is sealed into the cookie.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SecuritySessionCookie {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<Value>,
    #[serde(rename = "authType", default, skip_serializing_if = "Option::is_none")]
    pub auth_type: Option<String>,
    #[serde(
        rename = "assignAuthHeader",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub assign_auth_header: Option<bool>,
    #[serde(
        rename = "isAnonymousAuth",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub is_anonymous_auth: Option<bool>,
    #[serde(rename = "expiryTime", default, skip_serializing_if = "Option::is_none")]
    pub expiry_time: Option<i64>,
    #[serde(
        rename = "additionalAuthHeaders",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub additional_auth_headers: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oidc: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saml: Option<SamlCookieState>,
}

/// Transient SAML block: `{ requestId, nextUrl }`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SamlCookieState {
    #[serde(rename = "requestId", default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(rename = "nextUrl", default, skip_serializing_if = "Option::is_none")]
    pub next_url: Option<String>,
}

impl SamlCookieState {
    /// Both correlation fields are present and non-empty.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        non_empty(self.request_id.as_deref()) && non_empty(self.next_url.as_deref())
    }
}

impl SecuritySessionCookie {
    /// A SAML handshake is parked in this cookie.
    #[must_use]
    pub fn has_saml_handshake(&self) -> bool {
        self.saml.as_ref().is_some_and(SamlCookieState::is_complete)
    }

    /// An OIDC handshake is parked in this cookie.
    ///
    /// Any shape counts, but JSON values that are falsy (`null`, `false`, `0`,
    /// `""`) are treated as absent.
    #[must_use]
    pub fn has_oidc_handshake(&self) -> bool {
        self.oidc.as_ref().is_some_and(truthy)
    }
}

fn non_empty(value: Option<&str>) -> bool {
    value.is_some_and(|v| !v.is_empty())
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Context, Result};
    use serde_json::json;

    #[test]
    fn field_names_match_wire_contract() -> Result<()> {
        let cookie = SecuritySessionCookie {
            username: Some("admin".to_string()),
            credentials: Some(json!({ "authHeaderValue": "Basic YWRtaW46YWRtaW4=" })),
            auth_type: Some("basicauth".to_string()),
            assign_auth_header: Some(true),
            is_anonymous_auth: Some(false),
            expiry_time: Some(1_700_000_000_000),
            additional_auth_headers: Some(BTreeMap::from([(
                "x-proxy-user".to_string(),
                "admin".to_string(),
            )])),
            tenant: Some(json!("__user__")),
            oidc: None,
            saml: None,
        };
        let value = serde_json::to_value(&cookie)?;
        let object = value.as_object().context("cookie is not an object")?;
        for key in [
            "username",
            "credentials",
            "authType",
            "assignAuthHeader",
            "isAnonymousAuth",
            "expiryTime",
            "additionalAuthHeaders",
            "tenant",
        ] {
            assert!(object.contains_key(key), "missing {key}");
        }
        assert!(!object.contains_key("oidc"));
        assert!(!object.contains_key("saml"));
        Ok(())
    }

    #[test]
    fn parses_cookie_written_by_existing_deployments() -> Result<()> {
        let raw = r#"{"saml":{"requestId":"ONELOGIN_4fee3b04","nextUrl":"/app/home"},"tenant":"global"}"#;
        let cookie: SecuritySessionCookie = serde_json::from_str(raw)?;
        assert!(cookie.has_saml_handshake());
        assert_eq!(cookie.tenant, Some(json!("global")));
        assert_eq!(cookie.username, None);
        Ok(())
    }

    #[test]
    fn saml_block_needs_both_fields() {
        let partial = SamlCookieState {
            request_id: Some("id".to_string()),
            next_url: Some(String::new()),
        };
        assert!(!partial.is_complete());
    }

    #[test]
    fn oidc_block_uses_truthiness() {
        let mut cookie = SecuritySessionCookie {
            oidc: Some(json!({})),
            ..SecuritySessionCookie::default()
        };
        assert!(cookie.has_oidc_handshake());
        cookie.oidc = Some(json!(""));
        assert!(!cookie.has_oidc_handshake());
        cookie.oidc = Some(Value::Null);
        assert!(!cookie.has_oidc_handshake());
    }
}
