use axum::http::HeaderMap;
use domain::AppError;

use crate::error::ApiError;

/// Fixed bearer-token gate in front of trash and lifecycle endpoints.
pub fn require_admin(headers: &HeaderMap, admin_token: &str) -> Result<(), ApiError> {
    let auth_header = headers
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| AppError::PermissionDenied("missing Authorization header".into()))?;
    let expected_token = format!("Bearer {}", admin_token);
    if auth_header != expected_token {
        return Err(AppError::PermissionDenied("invalid admin token".into()).into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_bearer_token_must_match() {
        let mut headers = HeaderMap::new();
        assert!(require_admin(&headers, "s3cret").is_err());

        headers.insert("Authorization", HeaderValue::from_static("Bearer wrong"));
        assert!(require_admin(&headers, "s3cret").is_err());

        headers.insert("Authorization", HeaderValue::from_static("Bearer s3cret"));
        assert!(require_admin(&headers, "s3cret").is_ok());
    }
}
