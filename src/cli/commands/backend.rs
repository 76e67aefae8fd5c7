use clap::{Arg, ArgMatches, Command};

use super::string_or;
use crate::config::{BackendConfig, DEFAULT_BACKEND_URL};

pub const ARG_BACKEND_URL: &str = "backend-url";

#[must_use]
pub fn parse(matches: &ArgMatches) -> BackendConfig {
    BackendConfig {
        url: string_or(matches, ARG_BACKEND_URL, DEFAULT_BACKEND_URL),
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command.arg(
        Arg::new(ARG_BACKEND_URL)
            .long(ARG_BACKEND_URL)
            .help("Base URL of the cluster running the security plugin")
            .env("CUSTODIA_BACKEND_URL")
            .default_value(DEFAULT_BACKEND_URL),
    )
}
