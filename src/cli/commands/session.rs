use clap::{Arg, ArgMatches, Command};

use super::{bool_arg, flag, seconds};
use crate::config::{DEFAULT_SESSION_TTL_SECONDS, SessionConfig};

pub const ARG_SESSION_TTL: &str = "session-ttl-seconds";
pub const ARG_SESSION_KEEPALIVE: &str = "session-keepalive";

#[must_use]
pub fn parse(matches: &ArgMatches) -> SessionConfig {
    SessionConfig {
        ttl: seconds(matches, ARG_SESSION_TTL, DEFAULT_SESSION_TTL_SECONDS),
        keepalive: flag(matches, ARG_SESSION_KEEPALIVE, true),
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_SESSION_TTL)
                .long(ARG_SESSION_TTL)
                .help("Lifetime of an authenticated session in seconds")
                .env("CUSTODIA_SESSION_TTL_SECONDS")
                .default_value("3600")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            bool_arg(ARG_SESSION_KEEPALIVE, "true")
                .help("Extend the session expiry on every authenticated request")
                .env("CUSTODIA_SESSION_KEEPALIVE"),
        )
}
