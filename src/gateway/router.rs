// ============================================================================
// Gateway Router
// ============================================================================
//
// Built-in routes:
// - GET  /health          -> "ok"
// - POST /api/auth/login  -> token for verified credentials (only when a
//                            credential verifier is configured)
// - GET  /api/auth/me     -> caller identity
// - anything else         -> business routes passed in, else 404
//
// The admission/authentication/authorization pipeline wraps all of them,
// including the fallback.
//
// ============================================================================

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    middleware,
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use super::GatewayState;
use super::middleware::{admission, authentication, authorization};
use crate::auth::AuthContext;
use crate::credentials::LoginCredentials;
use crate::error::{AppError, AppResult};
use crate::utils::log_safe_id;

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub token_type: &'static str,
    pub expires_at: DateTime<Utc>,
    pub subject: String,
    pub role: String,
}

/// Gateway with only the built-in routes.
pub fn build_router(state: Arc<GatewayState>) -> Router {
    build_router_with(state, Router::new())
}

/// Gateway serving `business` routes behind the pipeline.
pub fn build_router_with(
    state: Arc<GatewayState>,
    business: Router<Arc<GatewayState>>,
) -> Router {
    let mut routes = Router::new()
        .route("/health", get(health_check))
        .route("/api/auth/me", get(current_identity));

    if state.verifier.is_some() {
        routes = routes.route("/api/auth/login", post(login));
    }

    // Layers listed outermost first.
    routes
        .merge(business)
        .fallback(not_found)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(middleware::from_fn_with_state(state.clone(), admission))
                .layer(middleware::from_fn_with_state(state.clone(), authentication))
                .layer(middleware::from_fn_with_state(state.clone(), authorization)),
        )
        .with_state(state)
}

async fn health_check() -> &'static str {
    "ok"
}

async fn current_identity(auth: AuthContext) -> Json<AuthContext> {
    Json(auth)
}

async fn login(
    State(state): State<Arc<GatewayState>>,
    payload: Result<Json<LoginCredentials>, JsonRejection>,
) -> AppResult<Json<LoginResponse>> {
    let Json(credentials) = payload.map_err(|e| AppError::validation(e.body_text()))?;

    if credentials.email.trim().is_empty() || credentials.password.is_empty() {
        return Err(AppError::validation("email and password are required"));
    }

    let verifier = state
        .verifier
        .as_ref()
        .ok_or_else(|| AppError::Config("credential verifier not configured".to_string()))?;

    let account = verifier.verify(&credentials).await?;

    let issued = state
        .tokens
        .issue(&account.subject, &account.role, Utc::now())
        .map_err(|e| AppError::internal(e.to_string()))?;

    tracing::info!(
        subject = %log_safe_id(&issued.subject, &state.log_salt),
        role = %issued.role,
        expires_at = %issued.expires_at,
        "Token issued"
    );

    Ok(Json(LoginResponse {
        token: issued.token,
        token_type: "Bearer",
        expires_at: issued.expires_at,
        subject: issued.subject,
        role: issued.role,
    }))
}

async fn not_found() -> AppError {
    AppError::NotFound("No route for this path".to_string())
}
