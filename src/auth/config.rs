//! Runtime knobs for token issuing, hashing cost, and startup seeding.

use crate::cipher::IvMode;
use crate::password::DEFAULT_COST;
use crate::token::DEFAULT_TTL_SECONDS;

#[derive(Clone, Debug)]
pub struct AuthConfig {
    token_ttl_seconds: i64,
    token_iv_mode: IvMode,
    password_cost: u32,
    seed_default_accounts: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            token_ttl_seconds: DEFAULT_TTL_SECONDS,
            token_iv_mode: IvMode::Random,
            password_cost: DEFAULT_COST,
            seed_default_accounts: false,
        }
    }

    #[must_use]
    pub fn with_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.token_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_token_iv_mode(mut self, mode: IvMode) -> Self {
        self.token_iv_mode = mode;
        self
    }

    #[must_use]
    pub fn with_password_cost(mut self, cost: u32) -> Self {
        self.password_cost = cost;
        self
    }

    #[must_use]
    pub fn with_seed_default_accounts(mut self, seed: bool) -> Self {
        self.seed_default_accounts = seed;
        self
    }

    #[must_use]
    pub fn token_ttl_seconds(&self) -> i64 {
        self.token_ttl_seconds
    }

    #[must_use]
    pub fn token_iv_mode(&self) -> IvMode {
        self.token_iv_mode
    }

    #[must_use]
    pub fn password_cost(&self) -> u32 {
        self.password_cost
    }

    #[must_use]
    pub fn seed_default_accounts(&self) -> bool {
        self.seed_default_accounts
    }
}
