// ============================================================================
// Token Configuration
// ============================================================================

use std::fmt;

/// 24 hours.
pub const DEFAULT_TOKEN_TTL_MS: u64 = 86_400_000;
/// HMAC-SHA-256 needs a key of at least 256 bits.
pub const MIN_SECRET_BYTES: usize = 32;
/// 365 days.
pub const MAX_TOKEN_TTL_MS: u64 = 31_536_000_000;
const MIN_TOKEN_TTL_MS: u64 = 1_000;

#[derive(Clone)]
pub struct AuthConfig {
    /// Shared HS256 signing secret. Every service that verifies tokens holds
    /// the same value.
    pub jwt_secret: String,
    pub token_ttl_ms: u64,
    /// When set, issued tokens carry `iss` and validation requires it.
    pub issuer: Option<String>,
}

// Hand-written so the secret never reaches a log line.
impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &"<redacted>")
            .field("token_ttl_ms", &self.token_ttl_ms)
            .field("issuer", &self.issuer)
            .finish()
    }
}

impl AuthConfig {
    pub(crate) fn from_env() -> anyhow::Result<Self> {
        let config = Self {
            jwt_secret: std::env::var("JWT_SECRET")
                .map_err(|_| anyhow::anyhow!("JWT_SECRET must be set"))?,
            token_ttl_ms: std::env::var("JWT_TTL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_TOKEN_TTL_MS),
            issuer: std::env::var("JWT_ISSUER")
                .ok()
                .filter(|iss| !iss.trim().is_empty()),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.jwt_secret.len() < MIN_SECRET_BYTES {
            anyhow::bail!(
                "JWT_SECRET must be at least {} bytes long (256 bits)",
                MIN_SECRET_BYTES
            );
        }
        if let Err(e) = crate::utils::validate_secret_strength(&self.jwt_secret, MIN_SECRET_BYTES) {
            anyhow::bail!(
                "JWT_SECRET is too weak: {}. Generate one with: openssl rand -base64 32",
                e
            );
        }
        if self.token_ttl_ms < MIN_TOKEN_TTL_MS {
            anyhow::bail!("JWT_TTL_MS must be at least {} ms", MIN_TOKEN_TTL_MS);
        }
        if self.token_ttl_ms > MAX_TOKEN_TTL_MS {
            anyhow::bail!("JWT_TTL_MS must be at most {} ms", MAX_TOKEN_TTL_MS);
        }
        Ok(())
    }
}
