use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::AuthConfig;

/// Payload of a signed token.
///
/// `iat`/`exp` are the registered JWT claims in whole Unix seconds (`exp`
/// rounded up) for consumers that only read those. `iat_ms`/`exp_ms` carry
/// the exact instants and are what `validate` checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: String,
    pub iat: i64,
    pub exp: i64,
    pub iat_ms: i64,
    pub exp_ms: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("malformed token: {0}")]
    Malformed(String),

    #[error("token signature does not verify")]
    InvalidSignature,

    #[error("token expired")]
    Expired,

    #[error("failed to encode token: {0}")]
    Encoding(String),
}

impl TokenError {
    /// Short label for log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            TokenError::Malformed(_) => "malformed",
            TokenError::InvalidSignature => "invalid_signature",
            TokenError::Expired => "expired",
            TokenError::Encoding(_) => "encoding",
        }
    }
}

/// A freshly issued bearer token together with the claims it carries.
#[derive(Debug, Clone, Serialize)]
pub struct IssuedToken {
    pub token: String,
    pub subject: String,
    pub role: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Identity attached to a request once its bearer token has validated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthContext {
    pub subject: String,
    pub role: String,
}

impl From<Claims> for AuthContext {
    fn from(claims: Claims) -> Self {
        Self {
            subject: claims.sub,
            role: claims.role,
        }
    }
}

/// Issues and validates HS256 tokens with one shared secret.
///
/// Holds only immutable key material, so a single instance is shared by
/// every request without synchronization.
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    ttl: Duration,
    issuer: Option<String>,
}

impl TokenService {
    pub fn new(config: &AuthConfig) -> Result<Self> {
        config.validate()?;

        let ttl_ms = i64::try_from(config.token_ttl_ms)
            .map_err(|_| anyhow::anyhow!("JWT_TTL_MS is out of range"))?;

        // Expiry is compared against the caller's clock in `validate`, so the
        // library's own wall-clock check stays off.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.leeway = 0;

        let mut required = vec!["sub", "exp"];
        if let Some(issuer) = &config.issuer {
            validation.set_issuer(&[issuer]);
            required.push("iss");
        }
        validation.set_required_spec_claims(&required);

        tracing::info!(
            ttl_ms = config.token_ttl_ms,
            issuer = ?config.issuer,
            "Token service initialized (HS256)"
        );

        Ok(Self {
            encoding_key: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            validation,
            ttl: Duration::milliseconds(ttl_ms),
            issuer: config.issuer.clone(),
        })
    }

    /// Signs a token for `subject` with `role`, valid from `now` for the
    /// configured ttl, to the millisecond.
    pub fn issue(
        &self,
        subject: &str,
        role: &str,
        now: DateTime<Utc>,
    ) -> Result<IssuedToken, TokenError> {
        if subject.trim().is_empty() {
            return Err(TokenError::Encoding("subject must not be empty".to_string()));
        }

        let expires_at = now
            .checked_add_signed(self.ttl)
            .ok_or_else(|| TokenError::Encoding("expiry out of range".to_string()))?;

        let iat_ms = now.timestamp_millis();
        let exp_ms = expires_at.timestamp_millis();

        let claims = Claims {
            sub: subject.to_string(),
            role: role.to_string(),
            iat: iat_ms.div_euclid(1000),
            exp: exp_ms.div_euclid(1000) + i64::from(exp_ms.rem_euclid(1000) != 0),
            iat_ms,
            exp_ms,
            iss: self.issuer.clone(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| TokenError::Encoding(e.to_string()))?;

        Ok(IssuedToken {
            token,
            subject: claims.sub,
            role: claims.role,
            issued_at: now,
            expires_at,
        })
    }

    /// Verifies the signature first, then the claims, then expiry against `now`.
    pub fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<Claims, TokenError> {
        let claims = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => {
                    TokenError::InvalidSignature
                }
                _ => TokenError::Malformed(e.to_string()),
            })?
            .claims;

        if claims.sub.trim().is_empty() {
            return Err(TokenError::Malformed("empty subject".to_string()));
        }
        if claims.exp_ms <= claims.iat_ms {
            return Err(TokenError::Malformed("expiry not after issue time".to_string()));
        }

        if now.timestamp_millis() >= claims.exp_ms {
            return Err(TokenError::Expired);
        }

        Ok(claims)
    }
}
