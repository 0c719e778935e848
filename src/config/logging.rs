// ============================================================================
// Logging Configuration
// ============================================================================

const DEFAULT_SALT: &str = "default-salt-please-change";

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. `info` or `edge_gateway=debug,tower_http=info`.
    pub rust_log: String,
    /// Salt for `log_safe_id`; subjects are only ever logged hashed.
    pub hash_salt: String,
}

impl LoggingConfig {
    pub(crate) fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            hash_salt: {
                let salt = std::env::var("LOG_HASH_SALT").unwrap_or_else(|_| DEFAULT_SALT.to_string());
                if salt.is_empty() || salt == DEFAULT_SALT {
                    anyhow::bail!("LOG_HASH_SALT must be set to a unique, secret value");
                }
                salt
            },
        })
    }
}
