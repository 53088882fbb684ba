//! `-v` / `CUSTOS_LOG_LEVEL`.
//!
//! Repeating `-v` and naming a level in the environment land on the same
//! count: 0 keeps the default (errors only), 4 or more traces everything.

use clap::{builder::ValueParser, Arg, ArgAction, Command};
use tracing::Level;

pub const ARG_VERBOSITY: &str = "verbosity";

/// Level names in verbosity order; the index is the `-v` count.
const LEVELS: [(&str, Level); 5] = [
    ("error", Level::ERROR),
    ("warn", Level::WARN),
    ("info", Level::INFO),
    ("debug", Level::DEBUG),
    ("trace", Level::TRACE),
];

fn parse_verbosity(value: &str) -> Result<u8, String> {
    let value = value.trim();
    let position = match value.parse::<usize>() {
        Ok(count) if count < LEVELS.len() => Some(count),
        Ok(_) => None,
        Err(_) => LEVELS
            .iter()
            .position(|(name, _)| name.eq_ignore_ascii_case(value)),
    };

    position
        .and_then(|index| u8::try_from(index).ok())
        .ok_or_else(|| {
            let names: Vec<&str> = LEVELS.iter().map(|(name, _)| *name).collect();
            format!("expected 0-4 or one of: {}", names.join(", "))
        })
}

/// Tracing level for a verbosity count; `None` leaves the subscriber default.
#[must_use]
pub fn level(verbosity: u8) -> Option<Level> {
    if verbosity == 0 {
        return None;
    }
    let index = usize::from(verbosity).min(LEVELS.len() - 1);
    LEVELS.get(index).map(|(_, level)| *level)
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command.arg(
        Arg::new(ARG_VERBOSITY)
            .short('v')
            .long("verbose")
            .help("Log more: -v warn, -vv info, -vvv debug, -vvvv trace (default: error)")
            .env("CUSTOS_LOG_LEVEL")
            .global(true)
            .action(ArgAction::Count)
            .value_parser(ValueParser::from(parse_verbosity)),
    )
}
