use anyhow::Result;
use clap::{Arg, ArgMatches, Command};

use super::{bool_arg, flag, list, non_empty, seconds, string_or};
use crate::config::{
    AuthConfig, BasicAuthConfig, DEFAULT_IDP_TIMEOUT_SECONDS, MultitenancyConfig,
};

pub const ARG_AUTH_TYPE: &str = "auth-type";
pub const ARG_ANONYMOUS_AUTH_ENABLED: &str = "auth-anonymous-enabled";
pub const ARG_UNAUTHENTICATED_ROUTES: &str = "auth-unauthenticated-routes";
pub const ARG_FORBIDDEN_USERNAMES: &str = "auth-forbidden-usernames";
pub const ARG_LOGOUT_URL: &str = "auth-logout-url";
pub const ARG_IDP_TIMEOUT: &str = "auth-idp-timeout-seconds";
pub const ARG_HEADER_TRUMPS_SESSION: &str = "basicauth-header-trumps-session";
pub const ARG_VALID_REDIRECTS: &str = "basicauth-valid-redirects";
pub const ARG_MULTITENANCY_ENABLED: &str = "multitenancy-enabled";

#[derive(Debug, Clone)]
pub struct Options {
    pub auth: AuthConfig,
    pub basicauth: BasicAuthConfig,
    pub multitenancy: MultitenancyConfig,
}

impl Options {
    /// Parse scheme selection plus the basic-auth and tenant settings.
    ///
    /// # Errors
    /// Returns an error if `--auth-type` names an unknown scheme.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let auth_type = AuthConfig::parse_auth_type(&string_or(matches, ARG_AUTH_TYPE, ""))?;

        Ok(Self {
            auth: AuthConfig {
                auth_type,
                anonymous_auth_enabled: flag(matches, ARG_ANONYMOUS_AUTH_ENABLED, false),
                unauthenticated_routes: list(matches, ARG_UNAUTHENTICATED_ROUTES),
                forbidden_usernames: list(matches, ARG_FORBIDDEN_USERNAMES),
                logout_url: non_empty(matches, ARG_LOGOUT_URL),
                idp_timeout: seconds(matches, ARG_IDP_TIMEOUT, DEFAULT_IDP_TIMEOUT_SECONDS),
            },
            basicauth: BasicAuthConfig {
                header_trumps_session: flag(matches, ARG_HEADER_TRUMPS_SESSION, false),
                valid_redirects: list(matches, ARG_VALID_REDIRECTS),
            },
            multitenancy: MultitenancyConfig {
                enabled: flag(matches, ARG_MULTITENANCY_ENABLED, false),
            },
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    let command = with_auth_args(command);
    let command = with_basicauth_args(command);
    command.arg(
        bool_arg(ARG_MULTITENANCY_ENABLED, "false")
            .help("Let users pick a tenant stored in the session")
            .env("CUSTODIA_MULTITENANCY_ENABLED"),
    )
}

fn with_auth_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_AUTH_TYPE)
                .long(ARG_AUTH_TYPE)
                .help("Authentication scheme: basicauth, jwt, openid, saml, proxy, kerberos or proxycache")
                .env("CUSTODIA_AUTH_TYPE"),
        )
        .arg(
            bool_arg(ARG_ANONYMOUS_AUTH_ENABLED, "false")
                .help("Try anonymous authentication when a request has no credentials")
                .env("CUSTODIA_AUTH_ANONYMOUS_ENABLED"),
        )
        .arg(
            Arg::new(ARG_UNAUTHENTICATED_ROUTES)
                .long(ARG_UNAUTHENTICATED_ROUTES)
                .help("Comma separated routes served without a session")
                .env("CUSTODIA_AUTH_UNAUTHENTICATED_ROUTES")
                .value_delimiter(',')
                .default_value("/api/status"),
        )
        .arg(
            Arg::new(ARG_FORBIDDEN_USERNAMES)
                .long(ARG_FORBIDDEN_USERNAMES)
                .help("Comma separated user names refused at login")
                .env("CUSTODIA_AUTH_FORBIDDEN_USERNAMES")
                .value_delimiter(','),
        )
        .arg(
            Arg::new(ARG_LOGOUT_URL)
                .long(ARG_LOGOUT_URL)
                .help("Where to send users after logout when the scheme has no IdP logout")
                .env("CUSTODIA_AUTH_LOGOUT_URL"),
        )
        .arg(
            Arg::new(ARG_IDP_TIMEOUT)
                .long(ARG_IDP_TIMEOUT)
                .help("Timeout for calls to the backend and identity providers")
                .env("CUSTODIA_AUTH_IDP_TIMEOUT_SECONDS")
                .default_value("10")
                .value_parser(clap::value_parser!(u64)),
        )
}

fn with_basicauth_args(command: Command) -> Command {
    command
        .arg(
            bool_arg(ARG_HEADER_TRUMPS_SESSION, "false")
                .help("Let an Authorization header replace an existing session")
                .env("CUSTODIA_BASICAUTH_HEADER_TRUMPS_SESSION"),
        )
        .arg(
            Arg::new(ARG_VALID_REDIRECTS)
                .long(ARG_VALID_REDIRECTS)
                .help("Comma separated regexes of absolute URLs allowed as nextUrl")
                .env("CUSTODIA_BASICAUTH_VALID_REDIRECTS")
                .value_delimiter(','),
        )
}
