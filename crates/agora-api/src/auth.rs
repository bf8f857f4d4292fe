use std::sync::Arc;

use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::{SaltString, rand_core::OsRng}};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use jsonwebtoken::{EncodingKey, Header, encode};
use tracing::{error, info};
use uuid::Uuid;

use agora_core::Forum;
use agora_db::models::UserRow;
use agora_db::{Database, DbError};
use agora_types::api::{Claims, LoginRequest, LoginResponse, RegisterRequest, RegisterResponse};

use crate::error::ApiError;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub forum: Forum,
    pub db: Arc<Database>,
    pub jwt_secret: String,
    pub token_ttl: chrono::Duration,
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    // Validate input
    if req.username.len() < 3 || req.username.len() > 32 {
        return Err(ApiError::BadRequest("username must be 3 to 32 characters"));
    }
    if req.password.len() < 8 {
        return Err(ApiError::BadRequest("password must be at least 8 characters"));
    }

    let db = state.db.clone();
    let username = req.username.clone();
    let user_id = tokio::task::spawn_blocking(move || -> Result<Uuid, ApiError> {
        // Check if username is taken
        if db
            .get_user_by_name(&username)
            .map_err(|e| ApiError::Internal(format!("looking up user {username}: {e}")))?
            .is_some()
        {
            return Err(ApiError::Conflict("username already taken"));
        }

        // Hash password with Argon2id
        let salt = SaltString::generate(&mut OsRng);
        let password_hash = Argon2::default()
            .hash_password(req.password.as_bytes(), &salt)
            .map_err(|e| ApiError::Internal(format!("hashing password: {e}")))?
            .to_string();

        let user = UserRow {
            id: Uuid::new_v4(),
            username,
            password: password_hash,
            created_at: chrono::Utc::now(),
        };

        match db.create_user(&user) {
            Ok(()) => Ok(user.id),
            Err(DbError::DuplicateKey) => Err(ApiError::Conflict("username already taken")),
            Err(e) => Err(ApiError::Internal(format!("creating user {}: {e}", user.username))),
        }
    })
    .await
    .map_err(|e| ApiError::Internal(format!("spawn_blocking join error: {e}")))??;

    let token = create_token(&state.jwt_secret, user_id, &req.username, state.token_ttl)
        .map_err(|e| ApiError::Internal(format!("signing token: {e}")))?;

    info!("Registered user {} ({})", req.username, user_id);
    Ok((StatusCode::CREATED, Json(RegisterResponse { user_id, token })))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let user = tokio::task::spawn_blocking(move || -> Result<UserRow, ApiError> {
        let user = db
            .get_user_by_name(&req.username)
            .map_err(|e| ApiError::Internal(format!("looking up user {}: {e}", req.username)))?
            .ok_or(ApiError::InvalidLogin)?;

        // Verify password
        let parsed_hash = PasswordHash::new(&user.password).map_err(|e| {
            error!("Stored hash for {} is unreadable: {}", user.id, e);
            ApiError::Internal("unreadable password hash".into())
        })?;

        Argon2::default()
            .verify_password(req.password.as_bytes(), &parsed_hash)
            .map_err(|_| ApiError::InvalidLogin)?;

        Ok(user)
    })
    .await
    .map_err(|e| ApiError::Internal(format!("spawn_blocking join error: {e}")))??;

    let token = create_token(&state.jwt_secret, user.id, &user.username, state.token_ttl)
        .map_err(|e| ApiError::Internal(format!("signing token: {e}")))?;

    Ok(Json(LoginResponse {
        user_id: user.id,
        username: user.username,
        token,
    }))
}

pub fn create_token(
    secret: &str,
    user_id: Uuid,
    username: &str,
    ttl: chrono::Duration,
) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id,
        username: username.to_string(),
        exp: (chrono::Utc::now() + ttl).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}
