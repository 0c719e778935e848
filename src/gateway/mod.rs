// ============================================================================
// Edge Gateway
// ============================================================================
//
// Every inbound request passes the same ordered pipeline before any handler
// sees it:
//
//   admission (429) -> authentication (never rejects) -> authorization (401/403)
//
// Handlers read the caller through the `AuthContext` extractor or the trusted
// `x-auth-subject` / `x-auth-role` headers; they never parse tokens again.
//
// ============================================================================

pub mod extractors;
pub mod middleware;
pub mod policy;
pub mod router;

use anyhow::Result;
use std::sync::Arc;

use crate::auth::TokenService;
use crate::config::Config;
use crate::credentials::{CredentialVerifier, HttpCredentialVerifier};
use crate::rate_limit::BucketRegistry;

pub use policy::{Access, AccessDecision, AuthorizationPolicy, RoutePattern, RouteRule};
pub use router::{build_router, build_router_with};

/// Shared state for the pipeline middlewares and the built-in handlers.
pub struct GatewayState {
    pub buckets: Arc<BucketRegistry>,
    pub tokens: Arc<TokenService>,
    pub policy: AuthorizationPolicy,
    /// `None` when no credential verifier is configured; login is then unmounted.
    pub verifier: Option<Arc<dyn CredentialVerifier>>,
    pub retry_after_secs: u64,
    pub log_salt: String,
}

impl GatewayState {
    /// Wires the default route table and, if configured, the HTTP verifier.
    pub fn from_config(config: &Config) -> Result<Self> {
        let verifier = match &config.credential_verifier {
            Some(verifier_config) => {
                tracing::info!(url = %verifier_config.url, "Credential verifier enabled");
                Some(Arc::new(HttpCredentialVerifier::new(verifier_config)?)
                    as Arc<dyn CredentialVerifier>)
            }
            None => {
                tracing::warn!("CREDENTIAL_VERIFIER_URL not set, login endpoint disabled");
                None
            }
        };

        Self::new(config, verifier)
    }

    pub fn new(config: &Config, verifier: Option<Arc<dyn CredentialVerifier>>) -> Result<Self> {
        config.rate_limit.validate()?;

        Ok(Self {
            buckets: Arc::new(BucketRegistry::new(&config.rate_limit)),
            tokens: Arc::new(TokenService::new(&config.auth)?),
            policy: AuthorizationPolicy::default_table(),
            verifier,
            retry_after_secs: config.rate_limit.retry_after_secs,
            log_salt: config.logging.hash_salt.clone(),
        })
    }
}
