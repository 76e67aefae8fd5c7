use clap::{Arg, ArgMatches, Command};

use super::{non_empty, string_or};
use crate::config::{ProxyCacheConfig, ProxyConfig};

pub const ARG_PROXY_USER_HEADER: &str = "proxy-user-header";
pub const ARG_PROXY_ROLES_HEADER: &str = "proxy-roles-header";
pub const ARG_PROXYCACHE_USER_HEADER: &str = "proxycache-user-header";
pub const ARG_PROXYCACHE_ROLES_HEADER: &str = "proxycache-roles-header";
pub const ARG_PROXYCACHE_PROXY_HEADER: &str = "proxycache-proxy-header";
pub const ARG_PROXYCACHE_PROXY_HEADER_IP: &str = "proxycache-proxy-header-ip";
pub const ARG_PROXYCACHE_LOGIN_ENDPOINT: &str = "proxycache-login-endpoint";

#[must_use]
pub fn parse(matches: &ArgMatches) -> (ProxyConfig, ProxyCacheConfig) {
    let proxy = ProxyConfig::default();
    let proxycache = ProxyCacheConfig::default();
    (
        ProxyConfig {
            user_header: string_or(matches, ARG_PROXY_USER_HEADER, &proxy.user_header),
            roles_header: string_or(matches, ARG_PROXY_ROLES_HEADER, &proxy.roles_header),
        },
        ProxyCacheConfig {
            user_header: non_empty(matches, ARG_PROXYCACHE_USER_HEADER),
            roles_header: non_empty(matches, ARG_PROXYCACHE_ROLES_HEADER),
            proxy_header: string_or(
                matches,
                ARG_PROXYCACHE_PROXY_HEADER,
                &proxycache.proxy_header,
            ),
            proxy_header_ip: non_empty(matches, ARG_PROXYCACHE_PROXY_HEADER_IP),
            login_endpoint: non_empty(matches, ARG_PROXYCACHE_LOGIN_ENDPOINT),
        },
    )
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_PROXY_USER_HEADER)
                .long(ARG_PROXY_USER_HEADER)
                .help("Header the authenticating proxy puts the user name in")
                .env("CUSTODIA_PROXY_USER_HEADER")
                .default_value("x-proxy-user"),
        )
        .arg(
            Arg::new(ARG_PROXY_ROLES_HEADER)
                .long(ARG_PROXY_ROLES_HEADER)
                .help("Header the authenticating proxy puts the roles in")
                .env("CUSTODIA_PROXY_ROLES_HEADER")
                .default_value("x-proxy-roles"),
        )
        .arg(
            Arg::new(ARG_PROXYCACHE_USER_HEADER)
                .long(ARG_PROXYCACHE_USER_HEADER)
                .help("User header cached in the session (required for proxycache)")
                .env("CUSTODIA_PROXYCACHE_USER_HEADER"),
        )
        .arg(
            Arg::new(ARG_PROXYCACHE_ROLES_HEADER)
                .long(ARG_PROXYCACHE_ROLES_HEADER)
                .help("Roles header cached in the session (required for proxycache)")
                .env("CUSTODIA_PROXYCACHE_ROLES_HEADER"),
        )
        .arg(
            Arg::new(ARG_PROXYCACHE_PROXY_HEADER)
                .long(ARG_PROXYCACHE_PROXY_HEADER)
                .help("Header carrying the proxy address")
                .env("CUSTODIA_PROXYCACHE_PROXY_HEADER")
                .default_value("x-forwarded-for"),
        )
        .arg(
            Arg::new(ARG_PROXYCACHE_PROXY_HEADER_IP)
                .long(ARG_PROXYCACHE_PROXY_HEADER_IP)
                .help("Address sent in the proxy header (required for proxycache)")
                .env("CUSTODIA_PROXYCACHE_PROXY_HEADER_IP"),
        )
        .arg(
            Arg::new(ARG_PROXYCACHE_LOGIN_ENDPOINT)
                .long(ARG_PROXYCACHE_LOGIN_ENDPOINT)
                .help("Where to send browsers that arrive without proxy headers")
                .env("CUSTODIA_PROXYCACHE_LOGIN_ENDPOINT"),
        )
}
