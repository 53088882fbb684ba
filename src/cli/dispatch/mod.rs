//! Maps parsed arguments to the action to run.

use crate::cipher::KEY_LEN;
use crate::cli::actions::{server::Args, Action};
use crate::cli::commands::auth;
use anyhow::{bail, Context, Result};
use secrecy::{ExposeSecret, SecretString};

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or the token secret is
/// not 32 bytes long.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>("dsn")
        .cloned()
        .context("missing required argument: --dsn")?;

    let token_secret = matches
        .get_one::<String>(auth::ARG_TOKEN_SECRET)
        .cloned()
        .map(SecretString::from)
        .context("missing required argument: --token-secret")?;
    if token_secret.expose_secret().len() != KEY_LEN {
        bail!(
            "--token-secret must be exactly {KEY_LEN} bytes, got {}",
            token_secret.expose_secret().len()
        );
    }

    let auth_opts = auth::Options::parse(matches)?;

    Ok(Action::Server(Args {
        port,
        dsn,
        token_secret,
        token_ttl_seconds: auth_opts.token_ttl_seconds,
        token_iv_mode: auth_opts.token_iv_mode,
        password_cost: auth_opts.password_cost,
        seed_default_accounts: auth_opts.seed_default_accounts,
        cors_origin: matches.get_one::<String>("cors-origin").cloned(),
    }))
}
