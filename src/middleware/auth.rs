//! Bearer token authentication middleware.
//!
//! This middleware intercepts every protected request to:
//! 1. Extract the token from the Authorization header
//! 2. Verify its HS256 signature and expiry against `JWT_SECRET`
//! 3. Inject the caller's user id into the request
//! 4. Reject unauthorized requests with HTTP 401

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{error::AppError, state::AppState};

/// Claims carried by an access token. Tokens are issued by the wider
/// property-management application; this service only verifies them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id of the property manager.
    pub sub: Uuid,

    /// Expiry as a Unix timestamp.
    pub exp: usize,
}

/// Authentication context attached to authenticated requests.
///
/// Handlers extract it with `Extension<AuthContext>` and pass `user_id`
/// down so every query is scoped to the caller's properties.
#[derive(Debug, Clone, Copy)]
pub struct AuthContext {
    pub user_id: Uuid,
}

/// Verify a token and return its claims.
pub fn verify_token(token: &str, secret: &str) -> Result<Claims, AppError> {
    let validation = Validation::new(Algorithm::HS256);

    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|e| {
        tracing::debug!(error = %e, "Rejected bearer token");
        AppError::Unauthorized
    })
}

/// Bearer token authentication middleware function.
///
/// # Headers
///
/// ```text
/// Authorization: Bearer <jwt>
/// ```
///
/// # Returns
///
/// - `Ok(Response)` if the token verifies (calls next handler)
/// - `Err(AppError::Unauthorized)` otherwise (returns 401)
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = request
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or(AppError::Unauthorized)?;

    let claims = verify_token(token, &state.config.jwt_secret)?;

    request.extensions_mut().insert(AuthContext {
        user_id: claims.sub,
    });

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{EncodingKey, Header, encode};

    fn token(secret: &str, sub: Uuid, exp: i64) -> String {
        let claims = Claims {
            sub,
            exp: exp as usize,
        };
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn accepts_valid_token() {
        let user_id = Uuid::new_v4();
        let exp = chrono::Utc::now().timestamp() + 3600;

        let claims = verify_token(&token("secret", user_id, exp), "secret").unwrap();

        assert_eq!(claims.sub, user_id);
    }

    #[test]
    fn rejects_wrong_secret_and_expired_tokens() {
        let user_id = Uuid::new_v4();
        let now = chrono::Utc::now().timestamp();

        assert!(matches!(
            verify_token(&token("other", user_id, now + 3600), "secret"),
            Err(AppError::Unauthorized)
        ));
        assert!(matches!(
            verify_token(&token("secret", user_id, now - 3600), "secret"),
            Err(AppError::Unauthorized)
        ));
        assert!(matches!(
            verify_token("not-a-jwt", "secret"),
            Err(AppError::Unauthorized)
        ));
    }
}
