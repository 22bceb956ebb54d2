use std::sync::Arc;

use axum::{
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
    body::Body,
};
use subtle::ConstantTimeEq;
use tracing::warn;

use shared_config::AppConfig;
use shared_models::error::AppError;

/// Guards back-office routes with the static admin bearer token.
///
/// An empty configured token rejects every request.
pub async fn admin_auth_middleware(
    State(config): State<Arc<AppConfig>>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let auth_header = request
        .headers()
        .get("Authorization")
        .ok_or_else(|| AppError::Auth("Missing authorization header".to_string()))?;

    let auth_value = auth_header
        .to_str()
        .map_err(|_| AppError::Auth("Invalid authorization header format".to_string()))?;

    let token = auth_value
        .strip_prefix("Bearer ")
        .ok_or_else(|| AppError::Auth("Invalid authorization header format".to_string()))?;

    if config.admin_api_token.is_empty() {
        warn!("Rejecting admin request: ADMIN_API_TOKEN is not configured");
        return Err(AppError::Auth("Admin access is disabled".to_string()));
    }

    if !tokens_match(token.as_bytes(), config.admin_api_token.as_bytes()) {
        return Err(AppError::Auth("Invalid admin token".to_string()));
    }

    Ok(next.run(request).await)
}

// Length leaks, contents do not.
fn tokens_match(presented: &[u8], expected: &[u8]) -> bool {
    presented.ct_eq(expected).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_match() {
        assert!(tokens_match(b"secret", b"secret"));
        assert!(!tokens_match(b"secret", b"secreT"));
        assert!(!tokens_match(b"secret", b"secret-longer"));
        assert!(!tokens_match(b"", b"secret"));
    }
}
