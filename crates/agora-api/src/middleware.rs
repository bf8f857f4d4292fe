use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{DecodingKey, Validation, decode};
use thiserror::Error;
use tracing::debug;

use agora_types::api::Claims;

use crate::auth::AppState;
use crate::error::ApiError;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("expected authorization header format: Bearer <token>")]
    ExpectedCredentialFormat,

    #[error("invalid or expired token")]
    InvalidCredential,
}

/// Turns an `Authorization` header value into validated claims.
pub fn validate_credential(header_value: &str, secret: &str) -> Result<Claims, AuthError> {
    let token = header_value
        .strip_prefix("Bearer ")
        .ok_or(AuthError::ExpectedCredentialFormat)?;

    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| {
        debug!("Rejected token: {}", e);
        AuthError::InvalidCredential
    })?;

    Ok(token_data.claims)
}

/// Extract and validate JWT from Authorization header.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(AuthError::ExpectedCredentialFormat)?;

    let claims = validate_credential(auth_header, &state.jwt_secret)?;

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::create_token;
    use uuid::Uuid;

    #[test]
    fn valid_token_yields_claims() {
        let user_id = Uuid::new_v4();
        let token = create_token("secret", user_id, "alice", chrono::Duration::hours(1)).unwrap();

        let claims = validate_credential(&format!("Bearer {token}"), "secret").unwrap();
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.username, "alice");
    }

    #[test]
    fn missing_bearer_prefix_is_a_format_error() {
        let token = create_token("secret", Uuid::new_v4(), "alice", chrono::Duration::hours(1)).unwrap();
        assert_eq!(
            validate_credential(&token, "secret"),
            Err(AuthError::ExpectedCredentialFormat)
        );
    }

    #[test]
    fn wrong_secret_or_expired_token_is_invalid() {
        let token = create_token("secret", Uuid::new_v4(), "alice", chrono::Duration::hours(1)).unwrap();
        assert_eq!(
            validate_credential(&format!("Bearer {token}"), "other"),
            Err(AuthError::InvalidCredential)
        );

        let expired = create_token("secret", Uuid::new_v4(), "alice", chrono::Duration::hours(-2)).unwrap();
        assert_eq!(
            validate_credential(&format!("Bearer {expired}"), "secret"),
            Err(AuthError::InvalidCredential)
        );
    }
}
