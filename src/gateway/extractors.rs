// ============================================================================
// Axum Extractors
// ============================================================================
//
// - AuthContext: identity attached by the authentication middleware; rejects
//   with 401 when the request is anonymous
// - Option<AuthContext>: anonymous-tolerant variant (axum's blanket impl)
//
// ============================================================================

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

use crate::auth::AuthContext;
use crate::error::AppError;

/// Usage:
/// ```rust,ignore
/// async fn handler(auth: AuthContext) -> String {
///     auth.subject
/// }
/// ```
#[async_trait]
impl<S> FromRequestParts<S> for AuthContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthContext>()
            .cloned()
            .ok_or_else(|| AppError::unauthorized("Authentication required"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    #[tokio::test]
    async fn test_extracts_attached_context() {
        let (mut parts, _) = Request::builder().uri("/").body(()).unwrap().into_parts();
        parts.extensions.insert(AuthContext {
            subject: "u1".into(),
            role: "ADMIN".into(),
        });

        let ctx = AuthContext::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(ctx.subject, "u1");
    }

    #[tokio::test]
    async fn test_anonymous_request_rejected() {
        let (mut parts, _) = Request::builder().uri("/").body(()).unwrap().into_parts();

        let err = AuthContext::from_request_parts(&mut parts, &()).await.unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::UNAUTHORIZED);

        let optional = Option::<AuthContext>::from_request_parts(&mut parts, &())
            .await
            .unwrap();
        assert!(optional.is_none());
    }
}
