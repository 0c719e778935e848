// ============================================================================
// Credential Verification
// ============================================================================
//
// The gateway never stores or compares passwords. The login handler hands the
// submitted credentials to a `CredentialVerifier` and, on success, issues a
// token for the subject and role it returns.
//
// ============================================================================

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::CredentialVerifierConfig;
use crate::error::AppError;

#[derive(Clone, Deserialize)]
pub struct LoginCredentials {
    pub email: String,
    pub password: String,
}

// Manual impl keeps the password out of logs.
impl std::fmt::Debug for LoginCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginCredentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Account confirmed by the verifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifiedAccount {
    pub subject: String,
    pub role: String,
}

#[derive(Error, Debug)]
pub enum CredentialError {
    /// Unknown account or wrong password. Deliberately not distinguished.
    #[error("credentials rejected")]
    Rejected,

    #[error("credential verifier unavailable: {0}")]
    Unavailable(String),
}

impl From<CredentialError> for AppError {
    fn from(err: CredentialError) -> Self {
        match err {
            CredentialError::Rejected => AppError::InvalidCredentials,
            CredentialError::Unavailable(msg) => AppError::Upstream(msg),
        }
    }
}

#[async_trait::async_trait]
pub trait CredentialVerifier: Send + Sync {
    async fn verify(
        &self,
        credentials: &LoginCredentials,
    ) -> Result<VerifiedAccount, CredentialError>;
}

/// Verifies credentials against the user service over HTTP.
///
/// `POST {url}` with `{ "email", "password" }`; expects `200` with
/// `{ "subject", "role" }`, or `401`/`404` for bad credentials.
pub struct HttpCredentialVerifier {
    client: reqwest::Client,
    url: String,
}

#[derive(Serialize)]
struct VerifyRequest<'a> {
    email: &'a str,
    password: &'a str,
}

impl HttpCredentialVerifier {
    pub fn new(config: &CredentialVerifierConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .tcp_keepalive(Duration::from_secs(30))
            .pool_max_idle_per_host(10)
            .build()
            .context("Failed to create credential verifier HTTP client")?;

        Ok(Self {
            client,
            url: config.url.clone(),
        })
    }
}

#[async_trait::async_trait]
impl CredentialVerifier for HttpCredentialVerifier {
    async fn verify(
        &self,
        credentials: &LoginCredentials,
    ) -> Result<VerifiedAccount, CredentialError> {
        let response = self
            .client
            .post(&self.url)
            .json(&VerifyRequest {
                email: &credentials.email,
                password: &credentials.password,
            })
            .send()
            .await
            .map_err(|e| CredentialError::Unavailable(e.to_string()))?;

        match response.status() {
            StatusCode::OK => response
                .json::<VerifiedAccount>()
                .await
                .map_err(|e| CredentialError::Unavailable(format!("invalid response body: {}", e))),
            StatusCode::UNAUTHORIZED | StatusCode::NOT_FOUND => Err(CredentialError::Rejected),
            status => {
                tracing::error!(
                    status = %status,
                    url = %self.url,
                    "Credential verifier returned unexpected status"
                );
                Err(CredentialError::Unavailable(format!(
                    "unexpected status {}",
                    status
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode as HttpStatus;

    #[test]
    fn test_rejection_maps_to_invalid_credentials() {
        let err: AppError = CredentialError::Rejected.into();
        assert_eq!(err.status_code(), HttpStatus::UNAUTHORIZED);
        assert_eq!(err.error_code(), "INVALID_CREDENTIALS");
    }

    #[test]
    fn test_unavailable_maps_to_bad_gateway() {
        let err: AppError = CredentialError::Unavailable("connection refused".into()).into();
        assert_eq!(err.status_code(), HttpStatus::BAD_GATEWAY);
    }

    #[test]
    fn test_debug_hides_password() {
        let creds = LoginCredentials {
            email: "a@example.com".into(),
            password: "hunter2".into(),
        };
        assert!(!format!("{:?}", creds).contains("hunter2"));
    }
}
