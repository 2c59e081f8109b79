use axum::{extract::State, http::StatusCode, Extension, Json};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::{
    auth::{password, AccountKeyService},
    errors::{AppError, Result},
    handlers::AppState,
    models::{User, UserStatusResponse, DEFAULT_PLAN},
};

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    pub user: UserSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forge_api_key: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UserSummary {
    pub id: uuid::Uuid,
    pub email: String,
    pub bytes_used: i64,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            bytes_used: user.bytes_used,
        }
    }
}

fn is_valid_name(name: &str) -> bool {
    (3..=100).contains(&name.len())
}

fn is_valid_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.is_empty()
                && domain.contains('.')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    }
}

fn validate_password(password: &str) -> std::result::Result<(), &'static str> {
    if password.len() < 8 {
        return Err("Password must be at least 8 characters long.");
    }
    if !password.chars().any(|c| c.is_uppercase()) {
        return Err("Password must contain at least one uppercase letter.");
    }
    if !password.chars().any(|c| c.is_lowercase()) {
        return Err("Password must contain at least one lowercase letter.");
    }
    if !password.chars().any(|c| c.is_numeric()) {
        return Err("Password must contain at least one number.");
    }
    if !password
        .chars()
        .any(|c| !c.is_alphanumeric() && !c.is_whitespace())
    {
        return Err("Password must contain at least one special character.");
    }
    Ok(())
}

/// Creates an identity bound to the default plan. The plaintext account key
/// appears in this response and nowhere else, ever.
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>)> {
    if !is_valid_name(&req.name) {
        return Err(AppError::Validation(
            "Name must be between 3 and 100 characters.".to_string(),
        ));
    }
    if !is_valid_email(&req.email) {
        return Err(AppError::Validation("Invalid email format.".to_string()));
    }
    if let Err(msg) = validate_password(&req.password) {
        return Err(AppError::Validation(msg.to_string()));
    }

    let plan = state
        .store
        .find_plan_by_name(DEFAULT_PLAN)
        .await?
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("default plan is not seeded")))?;

    if state.store.find_user_by_email(&req.email).await?.is_some() {
        return Err(AppError::Validation("Email already registered.".to_string()));
    }

    let api_key = AccountKeyService::generate();
    let password_hash = password::hash_password(&req.password)?;
    let user = state
        .store
        .create_user(
            &req.email,
            &password_hash,
            &AccountKeyService::hash(&api_key),
            plan.id,
        )
        .await?;

    tracing::info!(user_id = %user.id, "registered new identity");

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            message: "User created successfully".to_string(),
            token: None,
            user: UserSummary::from(&user),
            forge_api_key: Some(api_key),
        }),
    ))
}

/// Email + password exchange for a 24h session token. Unknown email and
/// wrong password produce the same rejection.
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<AuthResponse>> {
    let user = state
        .store
        .find_user_by_email(&req.email)
        .await?
        .ok_or(AppError::Unauthenticated)?;

    if !password::verify_password(&req.password, &user.password_hash) {
        return Err(AppError::Unauthenticated);
    }

    let token = state.tokens.issue(user.id, &user.email)?;

    Ok(Json(AuthResponse {
        message: "Logged in successfully".to_string(),
        token: Some(token),
        user: UserSummary::from(&user),
        forge_api_key: None,
    }))
}

pub async fn rotate_api_key(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>> {
    let new_key = state.resolver.rotate_key(user.id).await?;

    tracing::info!(user_id = %user.id, "rotated account key");

    Ok(Json(json!({
        "message": "API key rotated successfully",
        "new_api_key": new_key,
    })))
}

pub async fn user_status(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
) -> Result<Json<UserStatusResponse>> {
    // Re-read rather than trusting the resolved snapshot: the counter may
    // have moved since the middleware ran.
    let user = state
        .store
        .find_user_by_id(user.id)
        .await?
        .ok_or(AppError::NotFound("User"))?;
    let plan = state
        .store
        .find_plan_by_id(user.plan_id)
        .await?
        .ok_or(AppError::NotFound("Plan"))?;

    Ok(Json(UserStatusResponse {
        id: user.id,
        email: user.email,
        plan: plan.name,
        byte_ceiling: plan.byte_ceiling,
        bytes_used: user.bytes_used,
        remaining_bytes: (plan.byte_ceiling - user.bytes_used).max(0),
    }))
}
