use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{
    async_trait,
    extract::{FromRequestParts, Path, State},
    http::request::Parts,
};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;

use super::error::{ApiError, ValidationErrorBuilder};
use super::response::ApiResponse;
use super::validation::{validate_email, validate_name, validate_password, JsonBody};
use crate::commerce::cart::load_cart;
use crate::config::AuthConfig;
use crate::db::{
    self, CartLineResponse, ChangePasswordRequest, DbPool, EmailRequest, LoginRequest, Product,
    ProductResponse, RegisterRequest, ResetPasswordRequest, UpdateProfileRequest, User,
    UserResponse, UserRole,
};
use crate::notifications::email::{password_reset_email, verification_email, VerificationKind};
use crate::AppState;

/// JWT payload: subject is the user id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: String,
    pub exp: usize,
    pub iat: usize,
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

/// Generate a random token for email links
fn generate_token() -> String {
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

fn expires_in(duration: chrono::Duration) -> String {
    (chrono::Utc::now() + duration).to_rfc3339()
}

/// Sign a session token for `user`
pub fn issue_token(config: &AuthConfig, user: &User) -> Result<String, ApiError> {
    let now = chrono::Utc::now();
    let claims = Claims {
        sub: user.id.clone(),
        role: user.role.clone(),
        iat: now.timestamp() as usize,
        exp: (now + chrono::Duration::hours(config.jwt_expiry_hours)).timestamp() as usize,
    };

    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )
    .map_err(|e| {
        tracing::error!("Failed to sign token: {}", e);
        ApiError::internal("Failed to create session")
    })
}

/// Check signature and expiry, returning the claims
pub fn decode_token(config: &AuthConfig, token: &str) -> Result<Claims, ApiError> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.jwt_secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .map(|data| data.claims)
    .map_err(|_| ApiError::unauthorized("Not authorized, token failed"))
}

/// Extract the bearer token from request headers
fn extract_token(headers: &axum::http::HeaderMap) -> Option<String> {
    headers
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

pub async fn find_user(db: &DbPool, user_id: &str) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_optional(db)
        .await
}

pub async fn find_user_by_email(db: &DbPool, email: &str) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM users WHERE email = ?")
        .bind(email.trim().to_lowercase())
        .fetch_optional(db)
        .await
}

/// Insert an account; the email is stored lowercased
pub async fn create_user(
    db: &DbPool,
    first_name: &str,
    last_name: &str,
    email: &str,
    password: &str,
    role: UserRole,
    verified: bool,
) -> Result<User, ApiError> {
    let id = uuid::Uuid::new_v4().to_string();
    let password_hash = hash_password(password).map_err(|e| {
        tracing::error!("Failed to hash password: {}", e);
        ApiError::internal("Failed to create user")
    })?;
    let now = db::now();

    sqlx::query(
        r#"
        INSERT INTO users (id, first_name, last_name, email, password_hash, role, is_verified, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(first_name.trim())
    .bind(last_name.trim())
    .bind(email.trim().to_lowercase())
    .bind(&password_hash)
    .bind(role.to_string())
    .bind(verified)
    .bind(&now)
    .bind(&now)
    .execute(db)
    .await?;

    find_user(db, &id)
        .await?
        .ok_or_else(|| ApiError::internal("Failed to create user"))
}

/// Extractor for the authenticated caller
pub struct AuthUser(pub User);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_token(&parts.headers)
            .ok_or_else(|| ApiError::unauthorized("Not authorized, no token"))?;
        let claims = decode_token(&state.config.auth, &token)?;

        let user = find_user(&state.db, &claims.sub)
            .await?
            .ok_or_else(|| ApiError::unauthorized("Not authorized, user not found"))?;
        Ok(AuthUser(user))
    }
}

/// Extractor that additionally requires the admin role
pub struct AdminUser(pub User);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AdminUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let AuthUser(user) = AuthUser::from_request_parts(parts, state).await?;
        if !user.is_admin() {
            return Err(ApiError::forbidden(
                "User role user is not authorized to access this route",
            ));
        }
        Ok(AdminUser(user))
    }
}

/// Store a fresh verification token and return the raw value for the link
async fn refresh_verification_token(
    state: &AppState,
    user_id: &str,
) -> Result<String, sqlx::Error> {
    let token = generate_token();
    sqlx::query(
        "UPDATE users SET verification_token = ?, verification_token_expires = ?, updated_at = ? WHERE id = ?",
    )
    .bind(hash_token(&token))
    .bind(expires_in(chrono::Duration::hours(
        state.config.auth.verification_ttl_hours,
    )))
    .bind(db::now())
    .bind(user_id)
    .execute(&state.db)
    .await?;
    Ok(token)
}

async fn send_verification(
    state: &AppState,
    user: &User,
    kind: VerificationKind,
) -> Result<anyhow::Result<()>, ApiError> {
    let token = refresh_verification_token(state, &user.id).await?;
    let url = format!(
        "{}/verify/{}",
        state.config.frontend.url.trim_end_matches('/'),
        token
    );
    let message = verification_email(
        &user.email,
        &url,
        state.config.auth.verification_ttl_hours,
        kind,
    );
    Ok(state.mailer.send(message).await)
}

pub async fn register(
    State(state): State<Arc<AppState>>,
    JsonBody(request): JsonBody<RegisterRequest>,
) -> Result<ApiResponse, ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    errors
        .check("firstName", validate_name(&request.first_name, "First name"))
        .check("lastName", validate_name(&request.last_name, "Last name"))
        .check("email", validate_email(&request.email))
        .check("password", validate_password(&request.password));
    errors.finish()?;

    if let Some(existing) = find_user_by_email(&state.db, &request.email).await? {
        if existing.is_verified {
            return Err(ApiError::bad_request("User with this email already exists"));
        }

        return match send_verification(&state, &existing, VerificationKind::Reregistration).await? {
            Ok(()) => Ok(ApiResponse::ok().message(
                "User already exists but is unverified. A new verification email has been sent.",
            )),
            Err(e) => {
                tracing::error!(email = %existing.email, "Verification email failed: {}", e);
                Err(ApiError::dependency(
                    "User already exists but is unverified. We tried to resend the email but failed. Please check your SMTP settings.",
                ))
            }
        };
    }

    let user = create_user(
        &state.db,
        &request.first_name,
        &request.last_name,
        &request.email,
        &request.password,
        UserRole::User,
        false,
    )
    .await?;

    tracing::info!(user_id = %user.id, "User registered");

    let message = match send_verification(&state, &user, VerificationKind::Welcome).await? {
        Ok(()) => "User registered successfully. Please check your email to verify your account.",
        Err(e) => {
            tracing::error!(email = %user.email, "Verification email failed: {}", e);
            "User registered, but verification email could not be sent. Please contact support or try logging in later."
        }
    };

    Ok(ApiResponse::created()
        .message(message)
        .with("user", UserResponse::from(user)))
}

pub(crate) fn validate_credentials(request: &LoginRequest) -> Result<(), ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    errors.check("email", validate_email(&request.email));
    if request.password.is_empty() {
        errors.add("password", "Password is required");
    }
    errors.finish()
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    JsonBody(request): JsonBody<LoginRequest>,
) -> Result<ApiResponse, ApiError> {
    validate_credentials(&request)?;

    let user = find_user_by_email(&state.db, &request.email)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Invalid credentials"))?;

    if !verify_password(&request.password, &user.password_hash) {
        return Err(ApiError::unauthorized("Invalid credentials"));
    }

    if !user.is_verified && !user.is_admin() {
        return Err(ApiError::unauthorized(
            "Please verify your email to access your account.",
        ));
    }

    let token = issue_token(&state.config.auth, &user)?;
    tracing::info!(user_id = %user.id, "User logged in");

    Ok(ApiResponse::ok()
        .message("Login successful")
        .with("token", token)
        .with("user", UserResponse::from(user)))
}

pub async fn verify_email(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Result<ApiResponse, ApiError> {
    let result = sqlx::query(
        r#"
        UPDATE users
        SET is_verified = 1, verification_token = NULL, verification_token_expires = NULL, updated_at = ?
        WHERE verification_token = ? AND verification_token_expires > ?
        "#,
    )
    .bind(db::now())
    .bind(hash_token(&token))
    .bind(db::now())
    .execute(&state.db)
    .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::bad_request("Invalid or expired verification token"));
    }

    Ok(ApiResponse::ok().message("Email verified successfully"))
}

pub async fn resend_verification(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
) -> Result<ApiResponse, ApiError> {
    if user.is_verified {
        return Err(ApiError::bad_request("User is already verified"));
    }

    match send_verification(&state, &user, VerificationKind::Reminder).await? {
        Ok(()) => Ok(ApiResponse::ok().message("Verification email sent successfully")),
        Err(e) => {
            tracing::error!(email = %user.email, "Verification email failed: {}", e);
            Err(ApiError::dependency("Failed to send verification email"))
        }
    }
}

pub async fn public_resend_verification(
    State(state): State<Arc<AppState>>,
    JsonBody(request): JsonBody<EmailRequest>,
) -> Result<ApiResponse, ApiError> {
    validate_email(&request.email).map_err(|e| ApiError::validation_field("email", e))?;

    let user = find_user_by_email(&state.db, &request.email)
        .await?
        .ok_or_else(|| ApiError::not_found("No user found with this email"))?;

    if user.is_verified {
        return Err(ApiError::bad_request("User is already verified"));
    }

    match send_verification(&state, &user, VerificationKind::Reminder).await? {
        Ok(()) => Ok(ApiResponse::ok().message("Verification email resent successfully")),
        Err(e) => {
            tracing::error!(email = %user.email, "Verification email failed: {}", e);
            Err(ApiError::dependency(
                "Failed to send verification email. Please check your SMTP settings.",
            ))
        }
    }
}

const RESET_LINK_SENT: &str =
    "If an account with that email exists, a password reset link has been sent.";

pub async fn forgot_password(
    State(state): State<Arc<AppState>>,
    JsonBody(request): JsonBody<EmailRequest>,
) -> Result<ApiResponse, ApiError> {
    validate_email(&request.email).map_err(|e| ApiError::validation_field("email", e))?;

    let Some(user) = find_user_by_email(&state.db, &request.email).await? else {
        return Ok(ApiResponse::ok().message(RESET_LINK_SENT));
    };

    let token = generate_token();
    let ttl = state.config.auth.password_reset_ttl_minutes;
    sqlx::query(
        "UPDATE users SET password_reset_token = ?, password_reset_expires = ?, updated_at = ? WHERE id = ?",
    )
    .bind(hash_token(&token))
    .bind(expires_in(chrono::Duration::minutes(ttl)))
    .bind(db::now())
    .bind(&user.id)
    .execute(&state.db)
    .await?;

    let url = format!(
        "{}/reset-password/{}",
        state.config.frontend.url.trim_end_matches('/'),
        token
    );

    if let Err(e) = state
        .mailer
        .send(password_reset_email(&user.email, &url, ttl))
        .await
    {
        tracing::error!(email = %user.email, "Password reset email failed: {}", e);
        sqlx::query(
            "UPDATE users SET password_reset_token = NULL, password_reset_expires = NULL WHERE id = ?",
        )
        .bind(&user.id)
        .execute(&state.db)
        .await?;
        return Err(ApiError::dependency("Failed to send password reset email"));
    }

    Ok(ApiResponse::ok().message(RESET_LINK_SENT))
}

pub async fn reset_password(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
    JsonBody(request): JsonBody<ResetPasswordRequest>,
) -> Result<ApiResponse, ApiError> {
    validate_password(&request.password).map_err(|e| ApiError::validation_field("password", e))?;

    let user: Option<User> = sqlx::query_as(
        "SELECT * FROM users WHERE password_reset_token = ? AND password_reset_expires > ?",
    )
    .bind(hash_token(&token))
    .bind(db::now())
    .fetch_optional(&state.db)
    .await?;

    let user = user.ok_or_else(|| ApiError::bad_request("Invalid or expired reset token"))?;

    let password_hash = hash_password(&request.password)
        .map_err(|_| ApiError::internal("Failed to hash password"))?;
    sqlx::query(
        r#"
        UPDATE users
        SET password_hash = ?, password_reset_token = NULL, password_reset_expires = NULL, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&password_hash)
    .bind(db::now())
    .bind(&user.id)
    .execute(&state.db)
    .await?;

    tracing::info!(user_id = %user.id, "Password reset");
    Ok(ApiResponse::ok().message("Password reset successfully"))
}

/// Account view returned by `/me`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountResponse {
    #[serde(flatten)]
    pub user: UserResponse,
    pub cart: Vec<CartLineResponse>,
    pub wishlist: Vec<ProductResponse>,
    pub orders: Vec<String>,
}

async fn wishlist_products(db: &DbPool, user_id: &str) -> Result<Vec<ProductResponse>, sqlx::Error> {
    let products: Vec<Product> = sqlx::query_as(
        r#"
        SELECT p.* FROM wishlist_items w
        JOIN products p ON p.id = w.product_id
        WHERE w.user_id = ?
        ORDER BY w.created_at, p.id
        "#,
    )
    .bind(user_id)
    .fetch_all(db)
    .await?;

    Ok(products.into_iter().map(ProductResponse::from).collect())
}

pub async fn me(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
) -> Result<ApiResponse, ApiError> {
    let cart = load_cart(&state.db, &user.id)
        .await?
        .into_iter()
        .map(CartLineResponse::from)
        .collect();
    let wishlist = wishlist_products(&state.db, &user.id).await?;
    let orders: Vec<(String,)> =
        sqlx::query_as("SELECT id FROM orders WHERE user_id = ? ORDER BY created_at")
            .bind(&user.id)
            .fetch_all(&state.db)
            .await?;

    Ok(ApiResponse::ok().with(
        "user",
        AccountResponse {
            user: UserResponse::from(user),
            cart,
            wishlist,
            orders: orders.into_iter().map(|(id,)| id).collect(),
        },
    ))
}

pub async fn update_profile(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    JsonBody(request): JsonBody<UpdateProfileRequest>,
) -> Result<ApiResponse, ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    if let Some(name) = &request.first_name {
        errors.check("firstName", validate_name(name, "First name"));
    }
    if let Some(name) = &request.last_name {
        errors.check("lastName", validate_name(name, "Last name"));
    }
    if let Some(email) = &request.email {
        errors.check("email", validate_email(email));
    }
    errors.finish()?;

    let email = match &request.email {
        Some(email) => {
            let email = email.trim().to_lowercase();
            if email != user.email {
                if find_user_by_email(&state.db, &email).await?.is_some() {
                    return Err(ApiError::bad_request("Email is already in use"));
                }
            }
            email
        }
        None => user.email.clone(),
    };

    let mut profile = user.profile();
    if let Some(nested) = request.profile {
        profile.merge(nested);
    }
    if request.phone.is_some() {
        profile.phone = request.phone;
    }
    if request.address.is_some() {
        profile.address = request.address;
    }

    sqlx::query(
        "UPDATE users SET first_name = ?, last_name = ?, email = ?, profile = ?, updated_at = ? WHERE id = ?",
    )
    .bind(request.first_name.as_deref().map(str::trim).unwrap_or(&user.first_name))
    .bind(request.last_name.as_deref().map(str::trim).unwrap_or(&user.last_name))
    .bind(&email)
    .bind(db::to_json_column(&profile))
    .bind(db::now())
    .bind(&user.id)
    .execute(&state.db)
    .await?;

    let updated = find_user(&state.db, &user.id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    Ok(ApiResponse::ok()
        .message("Profile updated successfully")
        .with("user", UserResponse::from(updated)))
}

pub async fn change_password(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    JsonBody(request): JsonBody<ChangePasswordRequest>,
) -> Result<ApiResponse, ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    if request.current_password.is_none() {
        errors.add("currentPassword", "Current password is required");
    }
    errors.check(
        "newPassword",
        validate_password(&request.new_password)
            .map_err(|e| format!("New {}", e.to_lowercase())),
    );
    errors.finish()?;

    let current = request.current_password.unwrap_or_default();
    if !verify_password(&current, &user.password_hash) {
        return Err(ApiError::bad_request("Current password is incorrect"));
    }

    let password_hash = hash_password(&request.new_password)
        .map_err(|_| ApiError::internal("Failed to hash password"))?;
    sqlx::query("UPDATE users SET password_hash = ?, updated_at = ? WHERE id = ?")
        .bind(&password_hash)
        .bind(db::now())
        .bind(&user.id)
        .execute(&state.db)
        .await?;

    Ok(ApiResponse::ok().message("Password changed successfully"))
}

pub async fn get_wishlist(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
) -> Result<ApiResponse, ApiError> {
    let wishlist = wishlist_products(&state.db, &user.id).await?;
    Ok(ApiResponse::ok().with("wishlist", wishlist))
}

pub async fn add_to_wishlist(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(product_id): Path<String>,
) -> Result<ApiResponse, ApiError> {
    sqlx::query(
        "INSERT OR IGNORE INTO wishlist_items (user_id, product_id, created_at) VALUES (?, ?, ?)",
    )
    .bind(&user.id)
    .bind(&product_id)
    .bind(db::now())
    .execute(&state.db)
    .await?;

    let wishlist = wishlist_products(&state.db, &user.id).await?;
    Ok(ApiResponse::ok().with("wishlist", wishlist))
}

pub async fn remove_from_wishlist(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(product_id): Path<String>,
) -> Result<ApiResponse, ApiError> {
    sqlx::query("DELETE FROM wishlist_items WHERE user_id = ? AND product_id = ?")
        .bind(&user.id)
        .bind(&product_id)
        .execute(&state.db)
        .await?;

    let wishlist = wishlist_products(&state.db, &user.id).await?;
    Ok(ApiResponse::ok().with("wishlist", wishlist))
}

/// Create the configured admin account on startup if no admin exists.
///
/// An existing account with the same email is promoted instead.
pub async fn ensure_admin_user(db: &DbPool, email: &str, password: &str) -> anyhow::Result<()> {
    let admins: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users WHERE role = 'admin'")
        .fetch_one(db)
        .await?;
    if admins.0 > 0 {
        return Ok(());
    }

    if let Some(user) = find_user_by_email(db, email).await? {
        sqlx::query("UPDATE users SET role = 'admin', is_verified = 1, updated_at = ? WHERE id = ?")
            .bind(db::now())
            .bind(&user.id)
            .execute(db)
            .await?;
        tracing::info!(email = %user.email, "Promoted existing user to admin");
        return Ok(());
    }

    create_user(db, "Admin", "User", email, password, UserRole::Admin, true)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create admin user: {}", e))?;
    tracing::info!(email = %email, "Created bootstrap admin user");
    Ok(())
}
