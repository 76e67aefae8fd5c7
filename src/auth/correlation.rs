//! Correlation values for redirect handshakes.

use base64ct::{Base64UrlUnpadded, Encoding};
use rand::{RngCore, rngs::OsRng};
use subtle::ConstantTimeEq;

const TOKEN_BYTES: usize = 32;

/// Fresh unguessable token, base64url without padding.
#[must_use]
pub fn random_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    Base64UrlUnpadded::encode_string(&bytes)
}

/// Constant-time equality; an empty expected value never matches.
#[must_use]
pub fn matches(expected: &str, presented: &str) -> bool {
    if expected.is_empty() {
        return false;
    }
    expected.as_bytes().ct_eq(presented.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_unique_and_url_safe() {
        let first = random_token();
        let second = random_token();
        assert_ne!(first, second);
        assert_eq!(first.len(), 43);
        assert!(
            first
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
    }

    #[test]
    fn matches_requires_exact_value() {
        assert!(matches("abc", "abc"));
        assert!(!matches("abc", "abd"));
        assert!(!matches("abc", "abcd"));
        assert!(!matches("", ""));
    }

    #[test]
    fn matches_rejects_prefixes_and_empty_presented() {
        let token = random_token();
        assert!(matches(&token, &token));
        assert!(!matches(&token, &token[..token.len() - 1]));
        assert!(!matches(&token, ""));
        assert!(!matches("", &token));
    }
}
