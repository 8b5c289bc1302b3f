use serde::Serialize;
use sqlx::FromRow;

/// Single-use password-reset token. Only the SHA-256 digest of the token
/// is persisted; the plaintext goes out once in the reset email.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct PasswordReset {
    pub id: String,
    pub user_id: String,
    #[serde(skip)]
    pub token_hash: String,
    pub expires_at: String,
    pub created_at: String,
}
