//! Authentication: signup, login, password-reset lifecycle and the
//! access-control middleware.
//!
//! Sessions are stateless JWTs (see `session`); reset tokens are random
//! 32-byte values stored as SHA-256 digests and consumed transactionally.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Extension, Json,
};
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::db::{PasswordReset, Role, User};
use crate::AppState;

use super::error::{ApiError, SERVER_ERROR_MESSAGE};
use super::session::{self, Claims, SessionError};
use super::validation;

/// Identity attached to the request by `auth_middleware`.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
    pub email: String,
    pub role: Role,
}

impl From<Claims> for AuthUser {
    fn from(claims: Claims) -> Self {
        Self {
            user_id: claims.user_id,
            email: claims.email,
            role: claims.role,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct SignupRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    #[serde(rename = "confirmPassword")]
    pub confirm_password: Option<String>,
    pub role: Option<String>,
    #[serde(rename = "adminPassword")]
    pub admin_password: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
    pub role: Option<String>,
    #[serde(rename = "adminPassword")]
    pub admin_password: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ResetPasswordRequest {
    pub token: Option<String>,
    #[serde(rename = "newPassword")]
    pub new_password: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ValidatePasswordRequest {
    pub password: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SignupUser {
    pub user_id: String,
    pub name: String,
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct SignupResponse {
    pub message: String,
    pub token: String,
    pub user: SignupUser,
}

#[derive(Debug, Serialize)]
pub struct LoginUser {
    pub user_id: String,
    pub name: String,
    pub email: String,
    pub role: Role,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub message: String,
    pub token: String,
    pub user: LoginUser,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

/// Hash a password using Argon2
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2.hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// Verify a password against a hash
pub fn verify_password(password: &str, hash: &str) -> bool {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return false,
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

/// Hash on a blocking thread so the CPU-bound work does not stall the
/// I/O workers.
async fn hash_password_async(password: String) -> Result<String, ApiError> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| {
            tracing::error!("Password hashing task failed: {}", e);
            ApiError::internal(SERVER_ERROR_MESSAGE)
        })?
        .map_err(|e| {
            tracing::error!("Password hashing failed: {}", e);
            ApiError::internal(SERVER_ERROR_MESSAGE)
        })
}

async fn verify_password_async(password: String, hash: String) -> Result<bool, ApiError> {
    tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .map_err(|e| {
            tracing::error!("Password verification task failed: {}", e);
            ApiError::internal(SERVER_ERROR_MESSAGE)
        })
}

/// Generate a random password-reset token (32 bytes, hex encoded)
fn generate_reset_token() -> String {
    let mut rng = rand::rng();
    let bytes: [u8; 32] = rng.random();
    hex::encode(bytes)
}

/// Hash a token for storage
fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Compare the supplied admin gate-code against the configured secret.
/// Both sides are trimmed; the comparison itself is constant-time.
fn gate_code_matches(configured: &str, provided: Option<&str>) -> bool {
    let provided = match provided {
        Some(p) => p.trim(),
        None => return false,
    };
    if provided.is_empty() {
        return false;
    }
    let configured = configured.trim();

    configured.len() == provided.len()
        && configured.as_bytes().ct_eq(provided.as_bytes()).into()
}

/// Register a new user
///
/// POST /api/auth/signup
pub async fn signup(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SignupRequest>,
) -> Result<(StatusCode, Json<SignupResponse>), ApiError> {
    let name = req.name.unwrap_or_default();
    let email = req.email.unwrap_or_default();
    let password = req.password.unwrap_or_default();
    let confirm_password = req.confirm_password.unwrap_or_default();
    let role_raw = req.role.unwrap_or_default();

    if name.is_empty()
        || email.is_empty()
        || password.is_empty()
        || confirm_password.is_empty()
        || role_raw.is_empty()
    {
        return Err(ApiError::validation("Todos los campos son obligatorios."));
    }
    if password != confirm_password {
        return Err(ApiError::validation("Las contraseñas no coinciden."));
    }
    validation::validate_password(&password).map_err(ApiError::validation)?;
    validation::validate_name(&name).map_err(ApiError::validation)?;
    validation::validate_email(&email).map_err(ApiError::validation)?;

    let role: Role = role_raw
        .parse()
        .map_err(|_| ApiError::validation("Rol inválido."))?;

    if role.is_admin() && !gate_code_matches(&state.config.auth.admin_code, req.admin_password.as_deref()) {
        return Err(
            ApiError::authorization("Contraseña de Admin incorrecta.")
                .with_status(StatusCode::BAD_REQUEST),
        );
    }

    let existing: Option<(String,)> = sqlx::query_as("SELECT user_id FROM users WHERE email = ?")
        .bind(&email)
        .fetch_optional(&state.db)
        .await?;
    if existing.is_some() {
        return Err(ApiError::conflict("El correo ya está registrado."));
    }

    let password_hash = hash_password_async(password).await?;
    let admin_password_hash = if role.is_admin() {
        Some(hash_password_async(req.admin_password.unwrap_or_default()).await?)
    } else {
        None
    };

    let user_id = Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();
    sqlx::query(
        "INSERT INTO users (user_id, name, email, password_hash, role, admin_password_hash, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&user_id)
    .bind(&name)
    .bind(&email)
    .bind(&password_hash)
    .bind(role)
    .bind(&admin_password_hash)
    .bind(&now)
    .bind(&now)
    .execute(&state.db)
    .await?;

    let token = session::issue(
        &state.config.auth.session_secret,
        &user_id,
        &email,
        role,
        Duration::hours(24),
    )
    .map_err(|e| {
        tracing::error!("Failed to issue session token: {}", e);
        ApiError::internal(SERVER_ERROR_MESSAGE)
    })?;

    tracing::info!(email = %email, role = %role, "User registered");

    Ok((
        StatusCode::CREATED,
        Json(SignupResponse {
            message: "Usuario registrado exitosamente.".to_string(),
            token,
            user: SignupUser {
                user_id,
                name,
                email,
            },
        }),
    ))
}

/// Log in with email, password and the expected role
///
/// POST /api/auth/login
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let email = req.email.unwrap_or_default();
    let password = req.password.unwrap_or_default();
    let role_raw = req.role.unwrap_or_default();

    if email.is_empty() || password.is_empty() || role_raw.is_empty() {
        return Err(ApiError::validation("Todos los campos son obligatorios."));
    }
    let role: Role = role_raw
        .parse()
        .map_err(|_| ApiError::validation("Rol inválido."))?;

    let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE email = ?")
        .bind(&email)
        .fetch_optional(&state.db)
        .await?;
    let user = user.ok_or_else(|| {
        ApiError::not_found("Usuario no encontrado.").with_status(StatusCode::BAD_REQUEST)
    })?;

    if user.role != role {
        return Err(ApiError::authorization(format!(
            "Rol incorrecto. Tu cuenta está registrada como {}",
            user.role
        )));
    }
    if role.is_admin() && !gate_code_matches(&state.config.auth.admin_code, req.admin_password.as_deref()) {
        return Err(
            ApiError::authorization("Contraseña de Admin incorrecta.")
                .with_status(StatusCode::BAD_REQUEST),
        );
    }

    if !verify_password_async(password, user.password_hash.clone()).await? {
        return Err(ApiError::invalid_credentials("Contraseña incorrecta."));
    }

    let token = session::issue(
        &state.config.auth.session_secret,
        &user.user_id,
        &user.email,
        user.role,
        Duration::days(30),
    )
    .map_err(|e| {
        tracing::error!("Failed to issue session token: {}", e);
        ApiError::internal(SERVER_ERROR_MESSAGE)
    })?;

    Ok(Json(LoginResponse {
        message: "Login exitoso".to_string(),
        token,
        user: LoginUser {
            user_id: user.user_id,
            name: user.name,
            email: user.email,
            role: user.role,
        },
    }))
}

/// Request a password-reset email
///
/// POST /api/auth/forgot-password
pub async fn forgot_password(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ForgotPasswordRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let email = req.email.unwrap_or_default();
    if email.is_empty() {
        return Err(ApiError::validation("El correo es obligatorio."));
    }

    let user: Option<(String, String)> =
        sqlx::query_as("SELECT user_id, email FROM users WHERE email = ?")
            .bind(&email)
            .fetch_optional(&state.db)
            .await?;
    let (user_id, email) =
        user.ok_or_else(|| ApiError::not_found("No existe un usuario con ese correo."))?;

    let token = generate_reset_token();
    let now = Utc::now();
    sqlx::query(
        "INSERT INTO password_resets (id, user_id, token_hash, expires_at, created_at)
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(&user_id)
    .bind(hash_token(&token))
    .bind((now + Duration::hours(1)).to_rfc3339())
    .bind(now.to_rfc3339())
    .execute(&state.db)
    .await?;

    let reset_link = format!(
        "{}/reset-password?token={}",
        state.config.server.frontend_url.trim_end_matches('/'),
        token
    );
    state
        .mailer
        .send_password_reset(&email, &reset_link)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, to = %email, "Failed to send password reset email");
            ApiError::internal(SERVER_ERROR_MESSAGE)
        })?;

    tracing::info!(to = %email, "Password reset email sent");

    Ok(Json(MessageResponse {
        message: "Se ha enviado un correo con instrucciones para restablecer tu contraseña."
            .to_string(),
    }))
}

/// Consume a reset token and set a new password
///
/// POST /api/auth/reset-password
pub async fn reset_password(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ResetPasswordRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let token = req.token.unwrap_or_default();
    let new_password = req.new_password.unwrap_or_default();

    if token.is_empty() || new_password.is_empty() {
        return Err(ApiError::validation(
            "Token y nueva contraseña son obligatorios.",
        ));
    }
    if new_password.len() < 6 {
        return Err(ApiError::validation(
            "La nueva contraseña debe tener al menos 6 caracteres.",
        ));
    }

    let reset: Option<PasswordReset> =
        sqlx::query_as("SELECT * FROM password_resets WHERE token_hash = ?")
            .bind(hash_token(&token))
            .fetch_optional(&state.db)
            .await?;
    let reset = reset.ok_or_else(|| ApiError::invalid_token("Token inválido o inexistente."))?;

    let expires_at = DateTime::parse_from_rfc3339(&reset.expires_at).map_err(|e| {
        tracing::error!("Corrupt expiry on reset token {}: {}", reset.id, e);
        ApiError::internal(SERVER_ERROR_MESSAGE)
    })?;
    if Utc::now() > expires_at.with_timezone(&Utc) {
        return Err(ApiError::expired_token("El token ha expirado."));
    }

    let password_hash = hash_password_async(new_password).await?;

    // Rewrite the password and burn the token in one transaction, so a
    // crash between the two statements cannot leave the token reusable.
    let mut tx = state.db.begin().await?;
    sqlx::query("UPDATE users SET password_hash = ?, updated_at = ? WHERE user_id = ?")
        .bind(&password_hash)
        .bind(Utc::now().to_rfc3339())
        .bind(&reset.user_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM password_resets WHERE id = ?")
        .bind(&reset.id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    tracing::info!(user_id = %reset.user_id, "Password reset completed");

    Ok(Json(MessageResponse {
        message: "Contraseña restablecida con éxito.".to_string(),
    }))
}

/// Check the authenticated user's password without mutating anything
///
/// POST /api/auth/validate-password
pub async fn validate_password(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Json(req): Json<ValidatePasswordRequest>,
) -> Result<Response, ApiError> {
    let password = req.password.unwrap_or_default();
    if password.is_empty() {
        return Err(ApiError::validation("La contraseña es obligatoria."));
    }

    let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE user_id = ?")
        .bind(&auth.user_id)
        .fetch_optional(&state.db)
        .await?;
    let user = user.ok_or_else(|| ApiError::not_found("Usuario no encontrado."))?;

    if verify_password_async(password, user.password_hash).await? {
        Ok(Json(json!({ "valid": true })).into_response())
    } else {
        Ok((
            StatusCode::UNAUTHORIZED,
            Json(json!({ "valid": false, "message": "Contraseña incorrecta." })),
        )
            .into_response())
    }
}

/// Extract the bearer token from the Authorization header, falling back
/// to a `?token=` query parameter.
fn extract_token(request: &Request) -> Option<String> {
    if let Some(header) = request
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
    {
        let token = header.strip_prefix("Bearer ").unwrap_or(header).trim();
        if !token.is_empty() {
            return Some(token.to_string());
        }
    }

    request.uri().query().and_then(|q| {
        q.split('&').find_map(|pair| {
            let mut parts = pair.splitn(2, '=');
            let key = parts.next()?;
            let value = parts.next()?;
            if key == "token" && !value.is_empty() {
                Some(value.to_string())
            } else {
                None
            }
        })
    })
}

/// Auth middleware: verifies the session token and attaches the decoded
/// identity to the request for downstream handlers.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_token(&request)
        .ok_or_else(|| ApiError::unauthenticated("Acceso denegado, token requerido."))?;

    let claims = session::verify(&state.config.auth.session_secret, &token).map_err(|e| {
        let err = match e {
            SessionError::Expired => ApiError::expired_token("Token inválido o expirado."),
            _ => ApiError::invalid_token("Token inválido o expirado."),
        };
        err.with_status(StatusCode::FORBIDDEN)
    })?;

    request.extensions_mut().insert(AuthUser::from(claims));
    Ok(next.run(request).await)
}

/// Role gate: only admins get past. Must run inside `auth_middleware`.
pub async fn admin_middleware(request: Request, next: Next) -> Result<Response, ApiError> {
    let is_admin = request
        .extensions()
        .get::<AuthUser>()
        .map(|u| u.role.is_admin())
        .unwrap_or(false);

    if !is_admin {
        return Err(ApiError::authorization(
            "Acceso denegado: Solo administradores pueden acceder a este recurso.",
        ));
    }
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::error::ErrorCode;
    use crate::api::testing;
    use axum::body::Body;
    use axum::http;

    fn signup_request(name: &str, email: &str, password: &str, role: &str) -> SignupRequest {
        SignupRequest {
            name: Some(name.to_string()),
            email: Some(email.to_string()),
            password: Some(password.to_string()),
            confirm_password: Some(password.to_string()),
            role: Some(role.to_string()),
            admin_password: None,
        }
    }

    fn login_request(email: &str, password: &str, role: &str) -> LoginRequest {
        LoginRequest {
            email: Some(email.to_string()),
            password: Some(password.to_string()),
            role: Some(role.to_string()),
            admin_password: None,
        }
    }

    async fn insert_reset_row(state: &Arc<AppState>, user_id: &str, token: &str, expires_in: Duration) {
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO password_resets (id, user_id, token_hash, expires_at, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(user_id)
        .bind(hash_token(token))
        .bind((now + expires_in).to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(&state.db)
        .await
        .unwrap();
    }

    #[test]
    fn test_hash_and_verify_password() {
        let hash = hash_password("secret1").unwrap();
        assert_ne!(hash, "secret1");
        assert!(verify_password("secret1", &hash));
        assert!(!verify_password("secret2", &hash));
        assert!(!verify_password("secret1", "not-a-hash"));
    }

    #[test]
    fn test_gate_code_matches_trims_whitespace() {
        assert!(gate_code_matches("Codigo01", Some("Codigo01")));
        assert!(gate_code_matches("Codigo01", Some("  Codigo01  ")));
        assert!(gate_code_matches(" Codigo01 ", Some("Codigo01")));

        assert!(!gate_code_matches("Codigo01", Some("codigo01")));
        assert!(!gate_code_matches("Codigo01", Some("")));
        assert!(!gate_code_matches("Codigo01", None));
    }

    #[test]
    fn test_extract_token_variants() {
        let req = http::Request::builder()
            .uri("/api/profile")
            .header("Authorization", "Bearer abc123")
            .body(Body::empty())
            .unwrap();
        assert_eq!(extract_token(&req), Some("abc123".to_string()));

        // Raw header without the Bearer prefix is accepted as-is
        let req = http::Request::builder()
            .uri("/api/profile")
            .header("Authorization", "abc123")
            .body(Body::empty())
            .unwrap();
        assert_eq!(extract_token(&req), Some("abc123".to_string()));

        let req = http::Request::builder()
            .uri("/api/profile?token=qrs789&x=1")
            .body(Body::empty())
            .unwrap();
        assert_eq!(extract_token(&req), Some("qrs789".to_string()));

        let req = http::Request::builder()
            .uri("/api/profile")
            .body(Body::empty())
            .unwrap();
        assert_eq!(extract_token(&req), None);
    }

    #[tokio::test]
    async fn test_signup_then_login_roundtrip() {
        let state = testing::state().await;

        let (status, body) = signup(
            State(state.clone()),
            Json(signup_request("Ana", "a@x.com", "secret1", "user")),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body.user.email, "a@x.com");

        let signup_claims =
            session::verify(&state.config.auth.session_secret, &body.token).unwrap();
        assert_eq!(signup_claims.email, "a@x.com");
        assert_eq!(signup_claims.role, Role::User);

        let login_body = login(
            State(state.clone()),
            Json(login_request("a@x.com", "secret1", "user")),
        )
        .await
        .unwrap();
        assert_eq!(login_body.user.role, Role::User);

        let login_claims =
            session::verify(&state.config.auth.session_secret, &login_body.token).unwrap();
        assert_eq!(login_claims.user_id, signup_claims.user_id);
    }

    #[tokio::test]
    async fn test_signup_rejects_password_mismatch() {
        let state = testing::state().await;
        let mut req = signup_request("Ana", "a@x.com", "secret1", "user");
        req.confirm_password = Some("secret2".to_string());

        let err = signup(State(state), Json(req)).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::Validation);
        assert_eq!(err.message(), "Las contraseñas no coinciden.");
    }

    #[tokio::test]
    async fn test_signup_rejects_short_password() {
        let state = testing::state().await;
        let err = signup(
            State(state),
            Json(signup_request("Ana", "a@x.com", "corta", "user")),
        )
        .await
        .unwrap_err();
        assert_eq!(err.code(), ErrorCode::Validation);
    }

    #[tokio::test]
    async fn test_signup_rejects_missing_fields() {
        let state = testing::state().await;
        let err = signup(State(state), Json(SignupRequest::default()))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::Validation);
        assert_eq!(err.message(), "Todos los campos son obligatorios.");
    }

    #[tokio::test]
    async fn test_signup_admin_wrong_gate_code() {
        let state = testing::state().await;
        let mut req = signup_request("Eva", "e@x.com", "secret1", "admin");
        req.admin_password = Some("wrong".to_string());

        let err = signup(State(state.clone()), Json(req)).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::Authorization);
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.message(), "Contraseña de Admin incorrecta.");

        // Missing gate-code is just as wrong
        let err = signup(
            State(state),
            Json(signup_request("Eva", "e@x.com", "secret1", "admin")),
        )
        .await
        .unwrap_err();
        assert_eq!(err.code(), ErrorCode::Authorization);
    }

    #[tokio::test]
    async fn test_signup_admin_with_gate_code_stores_sub_password() {
        let state = testing::state().await;
        let mut req = signup_request("Eva", "e@x.com", "secret1", "admin");
        req.admin_password = Some(format!("  {}  ", state.config.auth.admin_code));

        let (status, _) = signup(State(state.clone()), Json(req)).await.unwrap();
        assert_eq!(status, StatusCode::CREATED);

        let (admin_hash,): (Option<String>,) =
            sqlx::query_as("SELECT admin_password_hash FROM users WHERE email = ?")
                .bind("e@x.com")
                .fetch_one(&state.db)
                .await
                .unwrap();
        assert!(admin_hash.is_some());
    }

    #[tokio::test]
    async fn test_signup_duplicate_email_conflicts() {
        let state = testing::state().await;
        signup(
            State(state.clone()),
            Json(signup_request("Ana", "a@x.com", "secret1", "user")),
        )
        .await
        .unwrap();

        let err = signup(
            State(state),
            Json(signup_request("Otra", "a@x.com", "secret2", "user")),
        )
        .await
        .unwrap_err();
        assert_eq!(err.code(), ErrorCode::Conflict);
        assert_eq!(err.message(), "El correo ya está registrado.");
    }

    #[tokio::test]
    async fn test_login_unknown_email() {
        let state = testing::state().await;
        let err = login(
            State(state),
            Json(login_request("nadie@x.com", "secret1", "user")),
        )
        .await
        .unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotFound);
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.message(), "Usuario no encontrado.");
    }

    #[tokio::test]
    async fn test_login_role_mismatch() {
        let state = testing::state().await;
        signup(
            State(state.clone()),
            Json(signup_request("Ana", "a@x.com", "secret1", "user")),
        )
        .await
        .unwrap();

        let err = login(
            State(state),
            Json(login_request("a@x.com", "secret1", "admin")),
        )
        .await
        .unwrap_err();
        assert_eq!(err.code(), ErrorCode::Authorization);
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_login_wrong_password() {
        let state = testing::state().await;
        signup(
            State(state.clone()),
            Json(signup_request("Ana", "a@x.com", "secret1", "user")),
        )
        .await
        .unwrap();

        let err = login(
            State(state),
            Json(login_request("a@x.com", "equivocada", "user")),
        )
        .await
        .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidCredentials);
        assert_eq!(err.message(), "Contraseña incorrecta.");
    }

    #[tokio::test]
    async fn test_forgot_password_unknown_email_leaves_no_row() {
        let state = testing::state().await;
        let err = forgot_password(
            State(state.clone()),
            Json(ForgotPasswordRequest {
                email: Some("nadie@x.com".to_string()),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotFound);

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM password_resets")
            .fetch_one(&state.db)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_reset_password_expired_token() {
        let state = testing::state().await;
        let (_, body) = signup(
            State(state.clone()),
            Json(signup_request("Ana", "a@x.com", "secret1", "user")),
        )
        .await
        .unwrap();
        insert_reset_row(&state, &body.user.user_id, "tok-viejo", Duration::hours(-2)).await;

        let err = reset_password(
            State(state),
            Json(ResetPasswordRequest {
                token: Some("tok-viejo".to_string()),
                new_password: Some("nueva123".to_string()),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ExpiredToken);
        assert_eq!(err.message(), "El token ha expirado.");
    }

    #[tokio::test]
    async fn test_reset_password_consumes_token() {
        let state = testing::state().await;
        let (_, body) = signup(
            State(state.clone()),
            Json(signup_request("Ana", "a@x.com", "secret1", "user")),
        )
        .await
        .unwrap();
        insert_reset_row(&state, &body.user.user_id, "tok-bueno", Duration::hours(1)).await;

        let req = || ResetPasswordRequest {
            token: Some("tok-bueno".to_string()),
            new_password: Some("nueva123".to_string()),
        };

        reset_password(State(state.clone()), Json(req())).await.unwrap();

        // Second use of the same token must be rejected
        let err = reset_password(State(state.clone()), Json(req()))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidToken);
        assert_eq!(err.message(), "Token inválido o inexistente.");

        // And the new password is live
        login(
            State(state.clone()),
            Json(login_request("a@x.com", "nueva123", "user")),
        )
        .await
        .unwrap();
        let err = login(
            State(state),
            Json(login_request("a@x.com", "secret1", "user")),
        )
        .await
        .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidCredentials);
    }

    #[tokio::test]
    async fn test_reset_password_short_password() {
        let state = testing::state().await;
        let err = reset_password(
            State(state),
            Json(ResetPasswordRequest {
                token: Some("tok".to_string()),
                new_password: Some("corta".to_string()),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.code(), ErrorCode::Validation);
        assert_eq!(
            err.message(),
            "La nueva contraseña debe tener al menos 6 caracteres."
        );
    }

    #[tokio::test]
    async fn test_reset_password_unknown_token() {
        let state = testing::state().await;
        let err = reset_password(
            State(state),
            Json(ResetPasswordRequest {
                token: Some("desconocido".to_string()),
                new_password: Some("nueva123".to_string()),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidToken);
    }

    #[tokio::test]
    async fn test_validate_password_roundtrip() {
        let state = testing::state().await;
        let (_, body) = signup(
            State(state.clone()),
            Json(signup_request("Ana", "a@x.com", "secret1", "user")),
        )
        .await
        .unwrap();
        let auth = AuthUser {
            user_id: body.user.user_id.clone(),
            email: body.user.email.clone(),
            role: Role::User,
        };

        let ok = validate_password(
            State(state.clone()),
            Extension(auth.clone()),
            Json(ValidatePasswordRequest {
                password: Some("secret1".to_string()),
            }),
        )
        .await
        .unwrap();
        assert_eq!(ok.status(), StatusCode::OK);

        let bad = validate_password(
            State(state),
            Extension(auth),
            Json(ValidatePasswordRequest {
                password: Some("equivocada".to_string()),
            }),
        )
        .await
        .unwrap();
        assert_eq!(bad.status(), StatusCode::UNAUTHORIZED);
    }
}
