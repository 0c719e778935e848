use anyhow::Result;

mod auth;
mod logging;
mod rate_limit;

pub use auth::{AuthConfig, DEFAULT_TOKEN_TTL_MS, MAX_TOKEN_TTL_MS, MIN_SECRET_BYTES};
pub use logging::LoggingConfig;
pub use rate_limit::RateLimitConfig;

// ============================================================================
// Configuration Constants
// ============================================================================

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_VERIFIER_TIMEOUT_SECS: u64 = 5;

/// External credential check used by the login endpoint.
#[derive(Clone, Debug)]
pub struct CredentialVerifierConfig {
    /// e.g. `http://user-service:8081/internal/credentials/verify`
    pub url: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub rate_limit: RateLimitConfig,
    pub auth: AuthConfig,
    pub logging: LoggingConfig,
    /// `None` leaves the login route unmounted.
    pub credential_verifier: Option<CredentialVerifierConfig>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(DEFAULT_PORT),
            rate_limit: RateLimitConfig::from_env()?,
            auth: AuthConfig::from_env()?,
            logging: LoggingConfig::from_env()?,
            credential_verifier: std::env::var("CREDENTIAL_VERIFIER_URL")
                .ok()
                .filter(|url| !url.trim().is_empty())
                .map(|url| CredentialVerifierConfig {
                    url,
                    timeout_secs: std::env::var("CREDENTIAL_VERIFIER_TIMEOUT_SECS")
                        .ok()
                        .and_then(|s| s.parse().ok())
                        .unwrap_or(DEFAULT_VERIFIER_TIMEOUT_SECS),
                }),
        })
    }
}
