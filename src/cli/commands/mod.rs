pub mod auth;
pub mod backend;
pub mod cookie;
pub mod jwt;
pub mod logging;
pub mod openid;
pub mod proxy;
pub mod session;

use clap::{
    Arg, ArgMatches, ColorChoice, Command,
    builder::styling::{AnsiColor, Effects, Styles},
};
use std::time::Duration;

pub const ARG_PORT: &str = "port";

#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    let long_version: &'static str = Box::leak(
        format!("{} - {}", env!("CARGO_PKG_VERSION"), crate::GIT_COMMIT_HASH).into_boxed_str(),
    );

    let command = Command::new("custodia")
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(long_version)
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new(ARG_PORT)
                .short('p')
                .long(ARG_PORT)
                .help("Port to listen on")
                .default_value("8080")
                .env("CUSTODIA_PORT")
                .value_parser(clap::value_parser!(u16)),
        );

    let command = cookie::with_args(command);
    let command = session::with_args(command);
    let command = auth::with_args(command);
    let command = openid::with_args(command);
    let command = jwt::with_args(command);
    let command = proxy::with_args(command);
    let command = backend::with_args(command);
    logging::with_args(command)
}

// Env vars set to "" reach clap as empty values.
pub(crate) fn non_empty(matches: &ArgMatches, id: &str) -> Option<String> {
    matches
        .get_one::<String>(id)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub(crate) fn string_or(matches: &ArgMatches, id: &str, default: &str) -> String {
    non_empty(matches, id).unwrap_or_else(|| default.to_string())
}

pub(crate) fn list(matches: &ArgMatches, id: &str) -> Vec<String> {
    matches
        .get_many::<String>(id)
        .map(|values| {
            values
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

pub(crate) fn flag(matches: &ArgMatches, id: &str, default: bool) -> bool {
    matches.get_one::<bool>(id).copied().unwrap_or(default)
}

pub(crate) fn seconds(matches: &ArgMatches, id: &str, default: u64) -> Duration {
    Duration::from_secs(matches.get_one::<u64>(id).copied().unwrap_or(default))
}

/// A boolean option that also accepts a bare `--flag`.
pub(crate) fn bool_arg(id: &'static str, default: &'static str) -> Arg {
    Arg::new(id)
        .long(id)
        .num_args(0..=1)
        .default_value(default)
        .default_missing_value("true")
        .value_parser(clap::value_parser!(bool))
}
