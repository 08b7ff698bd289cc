use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{extract::State, routing::post, Json, Router};
use chrono::Utc;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    db::models::User,
    domain::actor::Role,
    error::{ok, AppError, Envelope, Result},
    middleware::auth::AuthUser,
    routes::MessageResponse,
    AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub name: String,
    pub password: String,
    pub role: Role,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserResponse,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: String,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub verified: bool,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            name: user.name,
            role: user.role,
            verified: user.verified,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user id
    pub email: String,
    pub name: String,
    pub role: Role,
    pub exp: usize,
}

pub(crate) fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|_| AppError::Internal("Failed to hash password".to_string()))
}

fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|_| AppError::Internal("Invalid password hash".to_string()))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

fn create_token(user: &User, secret: &str) -> Result<String> {
    let expiration = Utc::now()
        .checked_add_signed(chrono::Duration::days(7))
        .ok_or_else(|| AppError::Internal("Failed to compute token expiry".to_string()))?
        .timestamp() as usize;

    let claims = Claims {
        sub: user.id.clone(),
        email: user.email.clone(),
        name: user.name.clone(),
        role: user.role,
        exp: expiration,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|_| AppError::Internal("Failed to create token".to_string()))
}

fn validate_password(password: &str) -> Result<()> {
    if password.len() < 8 {
        return Err(AppError::Validation(
            "Password must be at least 8 characters".to_string(),
        ));
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        return Err(AppError::Validation(
            "Password must contain an uppercase letter".to_string(),
        ));
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        return Err(AppError::Validation(
            "Password must contain a lowercase letter".to_string(),
        ));
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(AppError::Validation(
            "Password must contain a digit".to_string(),
        ));
    }
    Ok(())
}

async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> Result<Json<Envelope<AuthResponse>>> {
    // Validate input
    if body.email.is_empty() || !body.email.contains('@') {
        return Err(AppError::Validation("Invalid email address".to_string()));
    }
    if body.name.trim().is_empty() {
        return Err(AppError::Validation("Name is required".to_string()));
    }
    validate_password(&body.password)?;
    if body.role == Role::Admin {
        return Err(AppError::Validation(
            "Admin accounts cannot be self-registered".to_string(),
        ));
    }

    // Check if user already exists
    let existing = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE email = ?")
        .bind(&body.email)
        .fetch_one(&state.db.pool)
        .await?;

    if existing > 0 {
        return Err(AppError::Validation("Email already registered".to_string()));
    }

    let password_hash = hash_password(&body.password)?;

    let user = User {
        id: Uuid::new_v4().to_string(),
        email: body.email,
        name: body.name,
        password_hash,
        role: body.role,
        verified: false,
        blocked: false,
        created_at: Utc::now(),
    };

    sqlx::query(
        "INSERT INTO users (id, email, name, password_hash, role, verified, blocked, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&user.id)
    .bind(&user.email)
    .bind(&user.name)
    .bind(&user.password_hash)
    .bind(user.role)
    .bind(user.verified)
    .bind(user.blocked)
    .bind(user.created_at)
    .execute(&state.db.pool)
    .await?;

    tracing::info!("registered {} account {}", user.role.as_str(), user.id);

    let token = create_token(&user, &state.config.jwt_secret)?;

    Ok(ok(AuthResponse {
        token,
        user: user.into(),
    }))
}

async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<Envelope<AuthResponse>>> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ?")
        .bind(&body.email)
        .fetch_optional(&state.db.pool)
        .await?
        .ok_or(AppError::Unauthorized)?;

    if !verify_password(&body.password, &user.password_hash)? {
        return Err(AppError::Unauthorized);
    }

    if user.blocked {
        return Err(AppError::Forbidden("Account is blocked".to_string()));
    }

    let token = create_token(&user, &state.config.jwt_secret)?;

    Ok(ok(AuthResponse {
        token,
        user: user.into(),
    }))
}

pub async fn me(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Envelope<UserResponse>>> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
        .bind(&user.id)
        .fetch_optional(&state.db.pool)
        .await?
        .ok_or(AppError::Unauthorized)?;

    Ok(ok(user.into()))
}

/// The session lives in the bearer token, so logout is a client-side act;
/// the endpoint exists so the app has something idempotent to call.
pub async fn logout(user: AuthUser) -> Result<Json<Envelope<MessageResponse>>> {
    tracing::debug!("logout for {}", user.id);
    Ok(ok(MessageResponse::new("Logged out successfully")))
}

/// Creates the administrator account from the environment on first boot.
pub async fn bootstrap_admin(state: &AppState) -> Result<()> {
    let (email, password) = match (&state.config.admin_email, &state.config.admin_password) {
        (Some(email), Some(password)) => (email, password),
        _ => return Ok(()),
    };

    let existing = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE email = ?")
        .bind(email)
        .fetch_one(&state.db.pool)
        .await?;
    if existing > 0 {
        return Ok(());
    }

    let password_hash = hash_password(password)?;
    let admin_id = Uuid::new_v4().to_string();

    sqlx::query(
        "INSERT INTO users (id, email, name, password_hash, role, verified, blocked, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&admin_id)
    .bind(email)
    .bind("Administrator")
    .bind(&password_hash)
    .bind(Role::Admin)
    .bind(true)
    .bind(false)
    .bind(Utc::now())
    .execute(&state.db.pool)
    .await?;

    tracing::info!("bootstrapped admin account {admin_id}");
    Ok(())
}
