//! Per-request validity predicate for decoded session cookies.

use super::cookie::SecuritySessionCookie;

/// Decide whether a decoded session cookie is currently usable.
///
/// Rules, first match wins:
/// 1. no cookie: invalid
/// 2. SAML handshake parked (`requestId` and `nextUrl` set): valid
/// 3. OIDC handshake parked: valid
/// 4. `expiryTime` missing or before `now_ms`: invalid
/// 5. otherwise valid
///
/// A live session is not necessarily an identified one; callers that need a
/// user must still check `username`. The handshake exemption has no time bound
/// here, the cookie `Max-Age` written by the flow controller provides it.
#[must_use]
pub fn is_valid(cookie: Option<&SecuritySessionCookie>, now_ms: i64) -> bool {
    let Some(cookie) = cookie else {
        return false;
    };

    if cookie.has_saml_handshake() {
        return true;
    }

    if cookie.has_oidc_handshake() {
        return true;
    }

    match cookie.expiry_time {
        Some(expiry) => expiry >= now_ms,
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::is_valid;
    use crate::session::cookie::{SamlCookieState, SecuritySessionCookie};
    use serde_json::json;

    const NOW: i64 = 1_700_000_000_000;

    fn with_expiry(expiry: Option<i64>) -> SecuritySessionCookie {
        SecuritySessionCookie {
            username: Some("admin".to_string()),
            auth_type: Some("basicauth".to_string()),
            expiry_time: expiry,
            ..SecuritySessionCookie::default()
        }
    }

    fn saml_pending(expiry: Option<i64>) -> SecuritySessionCookie {
        SecuritySessionCookie {
            expiry_time: expiry,
            saml: Some(SamlCookieState {
                request_id: Some("ONELOGIN_1".to_string()),
                next_url: Some("/app/home".to_string()),
            }),
            ..SecuritySessionCookie::default()
        }
    }

    #[test]
    fn missing_cookie_is_invalid() {
        assert!(!is_valid(None, NOW));
    }

    #[test]
    fn past_expiry_is_invalid() {
        for offset in [1, 1_000, 3_600_000, NOW] {
            assert!(!is_valid(Some(&with_expiry(Some(NOW - offset))), NOW));
        }
    }

    #[test]
    fn missing_expiry_is_invalid() {
        assert!(!is_valid(Some(&with_expiry(None)), NOW));
        assert!(!is_valid(Some(&SecuritySessionCookie::default()), NOW));
    }

    #[test]
    fn future_expiry_is_valid() {
        assert!(is_valid(Some(&with_expiry(Some(NOW + 1))), NOW));
        assert!(is_valid(Some(&with_expiry(Some(NOW))), NOW));
    }

    #[test]
    fn saml_handshake_ignores_expiry() {
        for expiry in [None, Some(0), Some(NOW - 1), Some(NOW + 60_000)] {
            assert!(is_valid(Some(&saml_pending(expiry)), NOW));
        }
    }

    #[test]
    fn partial_saml_block_falls_through_to_expiry() {
        let mut cookie = saml_pending(Some(NOW - 1));
        if let Some(saml) = cookie.saml.as_mut() {
            saml.next_url = None;
        }
        assert!(!is_valid(Some(&cookie), NOW));
    }

    #[test]
    fn oidc_handshake_ignores_expiry() {
        for block in [json!({}), json!({ "state": "abc" }), json!("pending")] {
            for expiry in [None, Some(NOW - 1)] {
                let cookie = SecuritySessionCookie {
                    oidc: Some(block.clone()),
                    expiry_time: expiry,
                    ..SecuritySessionCookie::default()
                };
                assert!(is_valid(Some(&cookie), NOW));
            }
        }
    }

    #[test]
    fn live_but_unidentified_record_is_valid() {
        let cookie = SecuritySessionCookie {
            expiry_time: Some(NOW + 10_000),
            ..SecuritySessionCookie::default()
        };
        assert!(is_valid(Some(&cookie), NOW));
    }

    #[test]
    fn validation_is_repeatable() {
        let samples = [
            with_expiry(Some(NOW - 5)),
            with_expiry(Some(NOW + 5)),
            with_expiry(None),
            saml_pending(None),
        ];
        for cookie in &samples {
            assert_eq!(is_valid(Some(cookie), NOW), is_valid(Some(cookie), NOW));
        }
    }
}
