use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;
use std::path::PathBuf;

use super::{bool_arg, flag, non_empty, string_or};
use crate::config::{DEFAULT_OPENID_SCOPE, OpenIdConfig};

pub const ARG_OPENID_CONNECT_URL: &str = "openid-connect-url";
pub const ARG_OPENID_CLIENT_ID: &str = "openid-client-id";
pub const ARG_OPENID_CLIENT_SECRET: &str = "openid-client-secret";
pub const ARG_OPENID_SCOPE: &str = "openid-scope";
pub const ARG_OPENID_BASE_REDIRECT_URL: &str = "openid-base-redirect-url";
pub const ARG_OPENID_LOGOUT_URL: &str = "openid-logout-url";
pub const ARG_OPENID_HEADER: &str = "openid-header";
pub const ARG_OPENID_ROOT_CA: &str = "openid-root-ca";
pub const ARG_OPENID_VERIFY_HOSTNAMES: &str = "openid-verify-hostnames";

#[must_use]
pub fn parse(matches: &ArgMatches) -> OpenIdConfig {
    OpenIdConfig {
        connect_url: non_empty(matches, ARG_OPENID_CONNECT_URL),
        client_id: non_empty(matches, ARG_OPENID_CLIENT_ID),
        client_secret: SecretString::from(
            non_empty(matches, ARG_OPENID_CLIENT_SECRET).unwrap_or_default(),
        ),
        scope: string_or(matches, ARG_OPENID_SCOPE, DEFAULT_OPENID_SCOPE),
        base_redirect_url: non_empty(matches, ARG_OPENID_BASE_REDIRECT_URL),
        logout_url: non_empty(matches, ARG_OPENID_LOGOUT_URL),
        header: string_or(matches, ARG_OPENID_HEADER, "Authorization"),
        root_ca: non_empty(matches, ARG_OPENID_ROOT_CA).map(PathBuf::from),
        verify_hostnames: flag(matches, ARG_OPENID_VERIFY_HOSTNAMES, true),
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_OPENID_CONNECT_URL)
                .long(ARG_OPENID_CONNECT_URL)
                .help("Provider discovery document (.well-known/openid-configuration)")
                .env("CUSTODIA_OPENID_CONNECT_URL"),
        )
        .arg(
            Arg::new(ARG_OPENID_CLIENT_ID)
                .long(ARG_OPENID_CLIENT_ID)
                .help("Client id registered with the provider")
                .env("CUSTODIA_OPENID_CLIENT_ID"),
        )
        .arg(
            Arg::new(ARG_OPENID_CLIENT_SECRET)
                .long(ARG_OPENID_CLIENT_SECRET)
                .help("Client secret registered with the provider")
                .env("CUSTODIA_OPENID_CLIENT_SECRET")
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_OPENID_SCOPE)
                .long(ARG_OPENID_SCOPE)
                .help("Scopes requested from the provider")
                .env("CUSTODIA_OPENID_SCOPE")
                .default_value(DEFAULT_OPENID_SCOPE),
        )
        .arg(
            Arg::new(ARG_OPENID_BASE_REDIRECT_URL)
                .long(ARG_OPENID_BASE_REDIRECT_URL)
                .help("Public base URL the provider redirects back to")
                .env("CUSTODIA_OPENID_BASE_REDIRECT_URL"),
        )
        .arg(
            Arg::new(ARG_OPENID_LOGOUT_URL)
                .long(ARG_OPENID_LOGOUT_URL)
                .help("Logout URL overriding the provider's end_session_endpoint")
                .env("CUSTODIA_OPENID_LOGOUT_URL"),
        )
        .arg(
            Arg::new(ARG_OPENID_HEADER)
                .long(ARG_OPENID_HEADER)
                .help("Header the id_token is replayed in")
                .env("CUSTODIA_OPENID_HEADER")
                .default_value("Authorization"),
        )
        .arg(
            Arg::new(ARG_OPENID_ROOT_CA)
                .long(ARG_OPENID_ROOT_CA)
                .help("PEM bundle trusted for provider connections")
                .env("CUSTODIA_OPENID_ROOT_CA"),
        )
        .arg(
            bool_arg(ARG_OPENID_VERIFY_HOSTNAMES, "true")
                .help("Verify provider certificate host names")
                .env("CUSTODIA_OPENID_VERIFY_HOSTNAMES"),
        )
}
