use crate::{api, auth::AuthConfig, cipher::IvMode, cli::telemetry};
use anyhow::Result;
use secrecy::SecretString;
use tracing::debug;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub token_secret: SecretString,
    pub token_ttl_seconds: i64,
    pub token_iv_mode: IvMode,
    pub password_cost: u32,
    pub seed_default_accounts: bool,
    pub cors_origin: Option<String>,
}

impl Args {
    #[must_use]
    pub fn auth_config(&self) -> AuthConfig {
        AuthConfig::new()
            .with_token_ttl_seconds(self.token_ttl_seconds)
            .with_token_iv_mode(self.token_iv_mode)
            .with_password_cost(self.password_cost)
            .with_seed_default_accounts(self.seed_default_accounts)
    }
}

/// Execute the server action.
/// # Errors
/// Returns an error if the database is unreachable or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let auth_config = args.auth_config();
    debug!("Auth config: {:?}", auth_config);

    let result = api::new(
        args.port,
        args.dsn,
        args.token_secret,
        auth_config,
        args.cors_origin,
    )
    .await;

    telemetry::shutdown_tracer();

    result
}
