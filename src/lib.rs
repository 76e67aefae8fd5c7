//! # Custodia (dashboard session security)
//!
//! `custodia` authenticates dashboard users through one of seven pluggable
//! schemes and keeps the resulting authentication state in a single encrypted
//! cookie. There is no server-side session store: every request carries its own
//! copy of the session record.
//!
//! ## Session Model
//!
//! - **Wire shape:** [`session::SecuritySessionCookie`] is the JSON sealed into the
//!   cookie. Field names are fixed for compatibility with deployed cookies.
//! - **Typed view:** [`session::SessionRecord`] turns the optional fields into the
//!   [`session::AuthSession`] sum type, so a record can never be mid-handshake for
//!   two schemes at once.
//! - **Validity:** [`session::is_valid`] decides whether a decoded record is live.
//!
//! ## Flows
//!
//! [`auth::FlowController`] classifies each request into a [`auth::FlowState`] and
//! hands it to the active [`auth::AuthFlow`]. Redirect schemes (`openid`, `saml`)
//! park correlation state in the cookie between the redirect and the IdP
//! callback; the remaining schemes authenticate in a single step.

pub mod api;
pub mod auth;
pub mod backend;
pub mod cli;
pub mod config;
pub mod session;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

/// Current wall-clock time in epoch milliseconds, the unit of `expiryTime`.
#[must_use]
pub fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_or(0, |elapsed| {
            i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX)
        })
}
