//! Bearer token authentication middleware.
//!
//! Tokens are issued by the platform's login service; this middleware only
//! resolves them. It intercepts every protected request to:
//! 1. Extract the token from the Authorization header
//! 2. Hash it and look up the active token and its user
//! 3. Inject `AuthContext { user_id, role }` into the request
//! 4. Reject unknown or revoked tokens with HTTP 401

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::{db::DbPool, error::AppError, models::user::Role};

/// Authentication context attached to authenticated requests.
///
/// Core operations trust this identity; they never trust client-supplied
/// prices or balances.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user_id: Uuid,
    pub role: Role,
}

/// SHA-256 of the raw token, hex encoded, as stored in `access_tokens.token_hash`.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

#[derive(sqlx::FromRow)]
struct TokenOwner {
    user_id: Uuid,
    #[sqlx(try_from = "String")]
    role: Role,
}

/// Bearer token authentication middleware function.
///
/// # Headers
///
/// Expected header format:
/// ```text
/// Authorization: Bearer abc123xyz
/// ```
///
/// # Returns
///
/// - `Ok(Response)` if authenticated successfully (calls next handler)
/// - `Err(AppError::Unauthorized)` if authentication fails (returns 401)
pub async fn auth_middleware(
    State(pool): State<DbPool>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = request
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or(AppError::Unauthorized)?;

    let token_hash = hash_token(token);

    let owner = sqlx::query_as::<_, TokenOwner>(
        r#"
        SELECT u.id AS user_id, u.role
        FROM access_tokens t
        JOIN users u ON u.id = t.user_id
        WHERE t.token_hash = $1 AND t.is_active = true
        "#,
    )
    .bind(&token_hash)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::Unauthorized)?;

    // Route handlers extract this using Extension<AuthContext>
    request.extensions_mut().insert(AuthContext {
        user_id: owner.user_id,
        role: owner.role,
    });

    Ok(next.run(request).await)
}
