use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use inkra_core::auth::TokenVerifier;
use inkra_core::DocError;
use std::sync::Arc;

use super::ApiError;

/// Auth context that will be available in handlers
#[derive(Clone, Debug)]
pub struct AuthContext {
    pub admin: String,
}

/// Extract auth context from the bearer token
pub async fn extract_auth_context(
    headers: &HeaderMap,
    verifier: &dyn TokenVerifier,
) -> Result<AuthContext, DocError> {
    let header = headers
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .filter(|h| !h.is_empty())
        .ok_or_else(|| DocError::Auth("Authorization header is missing".into()))?;

    let token = header.strip_prefix("Bearer ").unwrap_or(header).trim();
    match verifier.verify(token).await {
        Some(claims) => Ok(AuthContext { admin: claims.sub }),
        None => Err(DocError::Auth("Invalid token".into())),
    }
}

/// Middleware to require authentication
pub async fn require_auth(
    State(verifier): State<Arc<dyn TokenVerifier>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let auth_context = extract_auth_context(request.headers(), verifier.as_ref()).await?;

    request.extensions_mut().insert(auth_context);

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use inkra_core::auth::Hs256Verifier;

    #[tokio::test]
    async fn header_handling() {
        let verifier = Hs256Verifier::new("secret");
        let token = verifier.issue("admin@example.com").unwrap();

        let err = extract_auth_context(&HeaderMap::new(), &verifier)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Authorization header is missing");

        let mut headers = HeaderMap::new();
        headers.insert(
            "Authorization",
            HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
        );
        let ctx = extract_auth_context(&headers, &verifier).await.unwrap();
        assert_eq!(ctx.admin, "admin@example.com");

        headers.insert("Authorization", HeaderValue::from_static("Bearer nope"));
        let err = extract_auth_context(&headers, &verifier).await.unwrap_err();
        assert_eq!(err.to_string(), "Invalid token");
    }
}
