//! Token, hashing and seeding options.

use anyhow::{Context, Result};
use clap::{builder::ValueParser, Arg, ArgAction, Command};

use crate::cipher::IvMode;

pub const ARG_TOKEN_SECRET: &str = "token-secret";
pub const ARG_TOKEN_TTL_SECONDS: &str = "token-ttl-seconds";
pub const ARG_TOKEN_IV_MODE: &str = "token-iv-mode";
pub const ARG_PASSWORD_COST: &str = "password-cost";
pub const ARG_SEED_DEFAULT_ACCOUNTS: &str = "seed-default-accounts";

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_TOKEN_SECRET)
                .long(ARG_TOKEN_SECRET)
                .help("Secret used to encrypt session tokens (exactly 32 bytes)")
                .env("CUSTOS_TOKEN_SECRET")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new(ARG_TOKEN_TTL_SECONDS)
                .long(ARG_TOKEN_TTL_SECONDS)
                .help("Session token lifetime in seconds")
                .env("CUSTOS_TOKEN_TTL_SECONDS")
                .default_value("360")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new(ARG_TOKEN_IV_MODE)
                .long(ARG_TOKEN_IV_MODE)
                .help("How token IVs are chosen: random, or derived (legacy, deterministic)")
                .env("CUSTOS_TOKEN_IV_MODE")
                .default_value("random")
                .value_parser(ValueParser::from(|mode: &str| mode.parse::<IvMode>())),
        )
        .arg(
            Arg::new(ARG_PASSWORD_COST)
                .long(ARG_PASSWORD_COST)
                .help("bcrypt cost for password hashes")
                .env("CUSTOS_PASSWORD_COST")
                .default_value("12")
                .value_parser(clap::value_parser!(u32).range(4..=31)),
        )
        .arg(
            Arg::new(ARG_SEED_DEFAULT_ACCOUNTS)
                .long(ARG_SEED_DEFAULT_ACCOUNTS)
                .help("Create the admin, johndoe and janedoe accounts if missing")
                .env("CUSTOS_SEED_DEFAULT_ACCOUNTS")
                .action(ArgAction::SetTrue),
        )
}

#[derive(Debug)]
pub struct Options {
    pub token_ttl_seconds: i64,
    pub token_iv_mode: IvMode,
    pub password_cost: u32,
    pub seed_default_accounts: bool,
}

impl Options {
    /// # Errors
    /// Returns an error if a defaulted argument is missing.
    pub fn parse(matches: &clap::ArgMatches) -> Result<Self> {
        Ok(Self {
            token_ttl_seconds: matches
                .get_one::<i64>(ARG_TOKEN_TTL_SECONDS)
                .copied()
                .context("missing required argument: --token-ttl-seconds")?,
            token_iv_mode: matches
                .get_one::<IvMode>(ARG_TOKEN_IV_MODE)
                .copied()
                .unwrap_or_default(),
            password_cost: matches
                .get_one::<u32>(ARG_PASSWORD_COST)
                .copied()
                .context("missing required argument: --password-cost")?,
            seed_default_accounts: matches.get_flag(ARG_SEED_DEFAULT_ACCOUNTS),
        })
    }
}
