use clap::{Arg, ArgMatches, Command};

use super::{non_empty, string_or};
use crate::config::JwtConfig;

pub const ARG_JWT_HEADER: &str = "jwt-header";
pub const ARG_JWT_URL_PARAM: &str = "jwt-url-param";
pub const ARG_JWT_LOGIN_ENDPOINT: &str = "jwt-login-endpoint";

#[must_use]
pub fn parse(matches: &ArgMatches) -> JwtConfig {
    let defaults = JwtConfig::default();
    JwtConfig {
        header: string_or(matches, ARG_JWT_HEADER, &defaults.header),
        url_param: string_or(matches, ARG_JWT_URL_PARAM, &defaults.url_param),
        login_endpoint: non_empty(matches, ARG_JWT_LOGIN_ENDPOINT),
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_JWT_HEADER)
                .long(ARG_JWT_HEADER)
                .help("Header carrying the JWT")
                .env("CUSTODIA_JWT_HEADER")
                .default_value("Authorization"),
        )
        .arg(
            Arg::new(ARG_JWT_URL_PARAM)
                .long(ARG_JWT_URL_PARAM)
                .help("Query parameter carrying the JWT")
                .env("CUSTODIA_JWT_URL_PARAM")
                .default_value("authorization"),
        )
        .arg(
            Arg::new(ARG_JWT_LOGIN_ENDPOINT)
                .long(ARG_JWT_LOGIN_ENDPOINT)
                .help("Where to send browsers that arrive without a token")
                .env("CUSTODIA_JWT_LOGIN_ENDPOINT"),
        )
}
