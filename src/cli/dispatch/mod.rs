//! Command-line argument dispatch.
//!
//! Assembles the per-concern options into a [`SecurityConfig`], validates it
//! once and maps it to the server action. Nothing is bound before validation
//! passes.

use crate::cli::actions::{Action, server::Args};
use crate::cli::commands::{ARG_PORT, auth, backend, cookie, jwt, openid, proxy, session};
use crate::config::SecurityConfig;
use anyhow::{Context, Result};

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>(ARG_PORT).copied().unwrap_or(8080);

    let auth_opts = auth::Options::parse(matches)?;
    let (proxy, proxycache) = proxy::parse(matches);

    let config = SecurityConfig {
        cookie: cookie::parse(matches)?,
        session: session::parse(matches),
        auth: auth_opts.auth,
        basicauth: auth_opts.basicauth,
        openid: openid::parse(matches),
        jwt: jwt::parse(matches),
        proxy,
        proxycache,
        multitenancy: auth_opts.multitenancy,
        backend: backend::parse(matches),
    };
    config.validate().context("invalid configuration")?;

    Ok(Action::Server(Args { port, config }))
}
