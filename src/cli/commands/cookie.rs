use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;
use std::time::Duration;

use super::{bool_arg, flag, non_empty, seconds, string_or};
use crate::{
    config::{
        CookieConfig, DEFAULT_COOKIE_NAME, DEFAULT_COOKIE_TTL_SECONDS,
        DEFAULT_HANDSHAKE_TTL_SECONDS,
    },
    session::SameSitePolicy,
};

pub const ARG_COOKIE_NAME: &str = "cookie-name";
pub const ARG_COOKIE_PASSWORD: &str = "cookie-password";
pub const ARG_COOKIE_SECURE: &str = "cookie-secure";
pub const ARG_COOKIE_DOMAIN: &str = "cookie-domain";
pub const ARG_COOKIE_TTL: &str = "cookie-ttl-seconds";
pub const ARG_COOKIE_HANDSHAKE_TTL: &str = "cookie-handshake-ttl-seconds";
pub const ARG_COOKIE_SAME_SITE: &str = "cookie-same-site";

/// Parse the cookie arguments.
///
/// A `--cookie-ttl-seconds` of `0` issues browser-session cookies.
///
/// # Errors
/// Returns an error if the password is missing or `--cookie-same-site` is not
/// one of `Strict`, `Lax`, `true`, `false`.
pub fn parse(matches: &ArgMatches) -> Result<CookieConfig> {
    let password = non_empty(matches, ARG_COOKIE_PASSWORD)
        .with_context(|| format!("missing required argument: --{ARG_COOKIE_PASSWORD}"))?;
    let same_site = string_or(matches, ARG_COOKIE_SAME_SITE, "true")
        .parse::<SameSitePolicy>()
        .map_err(anyhow::Error::msg)?;
    let ttl = seconds(matches, ARG_COOKIE_TTL, DEFAULT_COOKIE_TTL_SECONDS);

    Ok(CookieConfig {
        name: string_or(matches, ARG_COOKIE_NAME, DEFAULT_COOKIE_NAME),
        password: SecretString::from(password),
        secure: flag(matches, ARG_COOKIE_SECURE, true),
        domain: non_empty(matches, ARG_COOKIE_DOMAIN),
        ttl: (ttl != Duration::ZERO).then_some(ttl),
        handshake_ttl: seconds(matches, ARG_COOKIE_HANDSHAKE_TTL, DEFAULT_HANDSHAKE_TTL_SECONDS),
        same_site,
    })
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_COOKIE_NAME)
                .long(ARG_COOKIE_NAME)
                .help("Name of the session cookie")
                .env("CUSTODIA_COOKIE_NAME")
                .default_value(DEFAULT_COOKIE_NAME),
        )
        .arg(
            Arg::new(ARG_COOKIE_PASSWORD)
                .long(ARG_COOKIE_PASSWORD)
                .help("Password the cookie encryption key is derived from (at least 32 characters)")
                .env("CUSTODIA_COOKIE_PASSWORD")
                .hide_env_values(true),
        )
        .arg(
            bool_arg(ARG_COOKIE_SECURE, "true")
                .help("Send the cookie over HTTPS only")
                .env("CUSTODIA_COOKIE_SECURE"),
        )
        .arg(
            Arg::new(ARG_COOKIE_DOMAIN)
                .long(ARG_COOKIE_DOMAIN)
                .help("Domain attribute of the cookie")
                .env("CUSTODIA_COOKIE_DOMAIN"),
        )
        .arg(
            Arg::new(ARG_COOKIE_TTL)
                .long(ARG_COOKIE_TTL)
                .help("Max-Age of established session cookies, 0 for browser-session cookies")
                .env("CUSTODIA_COOKIE_TTL_SECONDS")
                .default_value("3600")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_COOKIE_HANDSHAKE_TTL)
                .long(ARG_COOKIE_HANDSHAKE_TTL)
                .help("Max-Age of cookies holding a pending OpenID or SAML login")
                .env("CUSTODIA_COOKIE_HANDSHAKE_TTL_SECONDS")
                .default_value("600")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_COOKIE_SAME_SITE)
                .long(ARG_COOKIE_SAME_SITE)
                .help("SameSite attribute: Strict, Lax, true (Lax) or false (omitted)")
                .env("CUSTODIA_COOKIE_SAME_SITE")
                .default_value("true"),
        )
}
