//! Where a browser may be sent after login.

use regex::Regex;
use url::Url;

pub const LOGIN_PAGE: &str = "/app/login";
pub const DEFAULT_NEXT_URL: &str = "/app/home";

// Placeholder origin for resolving relative redirects.
const LOCAL_ORIGIN: &str = "http://custodia.invalid/";

/// Allow-list for `nextUrl`.
///
/// Relative paths on this host are always accepted. Absolute URLs must match
/// one of the configured patterns, anything else falls back to
/// [`DEFAULT_NEXT_URL`].
#[derive(Clone, Debug, Default)]
pub struct RedirectPolicy {
    valid_redirects: Vec<Regex>,
}

impl RedirectPolicy {
    #[must_use]
    pub fn new(valid_redirects: Vec<Regex>) -> Self {
        Self { valid_redirects }
    }

    #[must_use]
    pub fn sanitize(&self, next_url: Option<&str>) -> String {
        let Some(next_url) = next_url.map(str::trim).filter(|url| !url.is_empty()) else {
            return DEFAULT_NEXT_URL.to_string();
        };

        if is_local_path(next_url)
            || self
                .valid_redirects
                .iter()
                .any(|pattern| pattern.is_match(next_url))
        {
            next_url.to_string()
        } else {
            DEFAULT_NEXT_URL.to_string()
        }
    }
}

/// A path on this host, after the normalisation a browser applies.
///
/// Browsers drop tab and newline characters while parsing, so `/\t/host`
/// would turn into the protocol-relative `//host`. Control characters are
/// refused raw and percent-encoded.
fn is_local_path(url: &str) -> bool {
    if !url.starts_with('/') || url.starts_with("//") {
        return false;
    }
    let Ok(decoded) = urlencoding::decode(url) else {
        return false;
    };
    if decoded.starts_with("//") || decoded.chars().any(|c| c == '\\' || c.is_control()) {
        return false;
    }
    let Ok(base) = Url::parse(LOCAL_ORIGIN) else {
        return false;
    };
    base.join(url)
        .is_ok_and(|resolved| resolved.origin() == base.origin())
}

/// Login page URL that returns to `next_url` afterwards.
#[must_use]
pub fn login_page(next_url: &str) -> String {
    let query: String = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("nextUrl", next_url)
        .finish();
    format!("{LOGIN_PAGE}?{query}")
}
