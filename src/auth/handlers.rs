use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use tracing::instrument;

use crate::{
    auth::{
        dto::{AuthResponse, LoginRequest, PublicUser, RegisterRequest, UpdateProfileRequest},
        jwt::AuthUser,
    },
    error::AppError,
    images::{handlers::UPLOAD_BODY_LIMIT, intake::ImageUpload},
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
}

pub fn profile_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/profile", get(get_profile).put(update_profile))
        .route(
            "/auth/profile/photo",
            put(update_profile_photo).layer(DefaultBodyLimit::max(UPLOAD_BODY_LIMIT)),
        )
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<AuthResponse>), AppError> {
    let Json(payload) = payload?;
    let res = state.auth.register(payload).await?;
    Ok((StatusCode::CREATED, Json(res)))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<AuthResponse>, AppError> {
    let Json(payload) = payload?;
    Ok(Json(state.auth.login(payload).await?))
}

#[instrument(skip(state))]
pub async fn get_profile(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<PublicUser>, AppError> {
    Ok(Json(state.auth.profile(user_id).await?))
}

#[instrument(skip(state, payload))]
pub async fn update_profile(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    payload: Result<Json<UpdateProfileRequest>, JsonRejection>,
) -> Result<Json<AuthResponse>, AppError> {
    let Json(payload) = payload?;
    Ok(Json(state.auth.update_profile(user_id, payload).await?))
}

/// PUT /auth/profile/photo (multipart, field `image`)
#[instrument(skip(state, upload))]
pub async fn update_profile_photo(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    ImageUpload(upload): ImageUpload,
) -> Result<Json<AuthResponse>, AppError> {
    // the upload finishes before any user state is touched
    let hosted = match upload {
        Some(image) => Some(state.images.upload(image).await.map_err(AppError::Upload)?),
        None => None,
    };
    Ok(Json(state.auth.replace_photo(user_id, hosted).await?))
}
