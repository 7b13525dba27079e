use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::{info, instrument, warn};
use validator::Validate;

use crate::{
    auth::{
        dto::{
            LoginRequest, LoginResponse, ProfileResponse, PublicUser, RegisterRequest,
            RegisterResponse,
        },
        extractors::AuthUser,
        password::{hash_password, verify_password},
    },
    error::ApiError,
    state::AppState,
    users::User,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
}

pub fn profile_routes() -> Router<AppState> {
    Router::new().route("/profile", get(profile))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(mut payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), ApiError> {
    payload.validate()?;
    payload.email = payload.email.trim().to_lowercase();

    // Friendly pre-check; the unique index on email is the race-safe guard
    // and maps to the same conflict via the sqlx error conversion.
    if User::find_by_email(&state.db, &payload.email).await?.is_some() {
        warn!(email = %payload.email, "email already in use");
        return Err(ApiError::EmailInUse);
    }

    let hash = hash_password(&payload.password)?;
    let user = User::create(&state.db, &payload.name, &payload.email, &hash).await?;

    info!(user_id = %user.id, email = %user.email, "user registered");
    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            success: true,
            user: PublicUser {
                name: user.name,
                email: user.email,
            },
        }),
    ))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(mut payload): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    payload.validate()?;
    payload.email = payload.email.trim().to_lowercase();

    // Unknown email and wrong password share one rejection so responses
    // carry no enumeration signal.
    let user = User::find_by_email(&state.db, &payload.email)
        .await?
        .ok_or_else(|| {
            warn!(email = %payload.email, "login unknown email");
            ApiError::InvalidCredentials
        })?;

    if !verify_password(&payload.password, &user.password_hash)? {
        warn!(user_id = %user.id, "login invalid password");
        return Err(ApiError::InvalidCredentials);
    }

    let token = state.jwt.sign(user.id, &user.email)?;

    info!(user_id = %user.id, "user logged in");
    Ok(Json(LoginResponse { token }))
}

#[instrument(skip(state, auth), fields(user_id = %auth.user_id))]
pub async fn profile(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<ProfileResponse>, ApiError> {
    let user = User::find_by_id(&state.db, auth.user_id)
        .await?
        .ok_or_else(|| {
            warn!(user_id = %auth.user_id, "profile for missing user");
            ApiError::UserNotFound
        })?;

    Ok(Json(ProfileResponse {
        user: PublicUser {
            name: user.name,
            email: user.email,
        },
    }))
}
