//! Admin bearer-key authentication middleware.
//!
//! This middleware intercepts every admin request to:
//! 1. Extract the key from the Authorization header
//! 2. Hash it and look it up among active admin keys
//! 3. Require the `admin` role
//! 4. Inject authentication context into the request

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::app::AppState;
use crate::error::AppError;

/// Role required for every admin route.
pub const ADMIN_ROLE: &str = "admin";

/// Authentication context attached to authenticated requests.
///
/// Handlers extract it with `Extension<AuthContext>` to know which admin acted.
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// User the key belongs to; recorded as the actor on status changes and settings
    pub admin_id: Uuid,

    pub display_name: String,
}

/// Hex SHA-256 of a plaintext key, as stored in `admin_api_keys.key_hash`.
pub fn hash_key(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hex::encode(hasher.finalize())
}

/// Admin authentication middleware function.
///
/// # Flow
///
/// 1. Extract `Authorization: Bearer <key>`
/// 2. Hash `<key>` with SHA-256 and look up an active key with that hash
/// 3. Unknown or inactive key: 401; key without the `admin` role: 403
/// 4. Inject `AuthContext` and call the next handler
pub async fn admin_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let key = request
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .ok_or(AppError::Unauthorized)?;

    let record = state
        .admin_keys
        .find_active_key(&hash_key(key))
        .await?
        .ok_or(AppError::Unauthorized)?;

    if record.role != ADMIN_ROLE {
        tracing::warn!(admin_id = %record.admin_id, role = %record.role, "Non-admin key used on admin route");
        return Err(AppError::Forbidden);
    }

    request.extensions_mut().insert(AuthContext {
        admin_id: record.admin_id,
        display_name: record.display_name,
    });

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashes_are_lowercase_hex_sha256() {
        assert_eq!(
            hash_key("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
