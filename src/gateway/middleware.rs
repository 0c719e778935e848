// ============================================================================
// Gateway Middleware
// ============================================================================
//
// The three pipeline stages, each an `axum::middleware::from_fn_with_state`
// function over `Arc<GatewayState>`:
// - admission: token bucket per (client, sensitivity class)
// - authentication: bearer token -> AuthContext + trusted headers
// - authorization: route table decision
//
// ============================================================================

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use super::GatewayState;
use super::policy::AccessDecision;
use crate::auth::AuthContext;
use crate::error::AppError;
use crate::rate_limit::{ClientKey, SensitivityClass};
use crate::utils::{bearer_token, extract_client_ip, log_safe_id};

// Identity propagation (trust boundary): only the gateway may set these.
pub const HEADER_AUTH_SUBJECT: HeaderName = HeaderName::from_static("x-auth-subject");
pub const HEADER_AUTH_ROLE: HeaderName = HeaderName::from_static("x-auth-role");
pub const HEADER_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Admission filter: one token per request from the caller's bucket.
pub async fn admission(
    State(state): State<Arc<GatewayState>>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let class = SensitivityClass::classify(request.uri().path());
    let peer_ip = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());
    let client_ip = extract_client_ip(request.headers(), peer_ip);

    let key = ClientKey::new(client_ip, class);
    let admission = state.buckets.try_acquire(&key, Instant::now());

    if !admission.allowed {
        tracing::warn!(
            ip = %key.identity,
            class = %key.class,
            path = %request.uri().path(),
            limit = admission.limit,
            "Rate limit exceeded"
        );
        return Err(AppError::RateLimitExceeded {
            limit: admission.limit,
            retry_after_secs: state.retry_after_secs,
        });
    }

    Ok(next.run(request).await)
}

/// Authentication filter. Never rejects: a missing or invalid token leaves
/// the request anonymous and the route table decides.
pub async fn authentication(
    State(state): State<Arc<GatewayState>>,
    mut request: Request,
    next: Next,
) -> Response {
    // ALWAYS drop client-supplied identity headers to prevent injection.
    let headers = request.headers_mut();
    headers.remove(&HEADER_AUTH_SUBJECT);
    headers.remove(&HEADER_AUTH_ROLE);
    if !headers.contains_key(&HEADER_REQUEST_ID)
        && let Ok(value) = HeaderValue::from_str(&Uuid::new_v4().to_string())
    {
        headers.insert(HEADER_REQUEST_ID, value);
    }

    let outcome = bearer_token(request.headers()).map(|token| state.tokens.validate(token, Utc::now()));

    match outcome {
        None => {}
        Some(Ok(claims)) => {
            let context = AuthContext::from(claims);

            match (
                HeaderValue::from_str(&context.subject),
                HeaderValue::from_str(&context.role),
            ) {
                (Ok(subject), Ok(role)) => {
                    let headers = request.headers_mut();
                    headers.insert(HEADER_AUTH_SUBJECT, subject);
                    headers.insert(HEADER_AUTH_ROLE, role);
                }
                _ => tracing::debug!("Identity not representable as header values, skipping propagation"),
            }

            tracing::debug!(
                subject = %log_safe_id(&context.subject, &state.log_salt),
                role = %context.role,
                path = %request.uri().path(),
                "Token verified"
            );
            request.extensions_mut().insert(context);
        }
        Some(Err(e)) => {
            tracing::warn!(
                path = %request.uri().path(),
                reason = e.kind(),
                "Token validation failed, continuing unauthenticated"
            );
        }
    }

    next.run(request).await
}

/// Authorization: evaluates the route table against the attached identity.
pub async fn authorization(
    State(state): State<Arc<GatewayState>>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let decision = state
        .policy
        .evaluate(request.uri().path(), request.extensions().get::<AuthContext>());

    match decision {
        AccessDecision::Allow => Ok(next.run(request).await),
        AccessDecision::Unauthenticated => {
            tracing::debug!(path = %request.uri().path(), "Authentication required");
            Err(AppError::unauthorized("Authentication required"))
        }
        AccessDecision::Forbidden => {
            if let Some(context) = request.extensions().get::<AuthContext>() {
                let path = request.uri().path();
                let rule = state
                    .policy
                    .rule_for(path)
                    .map(|rule| rule.pattern.to_string())
                    .unwrap_or_default();
                tracing::warn!(
                    subject = %log_safe_id(&context.subject, &state.log_salt),
                    role = %context.role,
                    path = %path,
                    rule = %rule,
                    "Role not permitted for route"
                );
            }
            Err(AppError::forbidden("Insufficient role for this resource"))
        }
    }
}
