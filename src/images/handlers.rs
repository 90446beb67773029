use axum::{
    extract::{DefaultBodyLimit, State},
    routing::post,
    Json, Router,
};
use serde::Serialize;
use tracing::{info, instrument};

use super::intake::{ImageUpload, MAX_IMAGE_BYTES};
use crate::{error::AppError, state::AppState};

/// Leaves room above the image limit so the intake reports oversize files itself.
pub const UPLOAD_BODY_LIMIT: usize = 2 * MAX_IMAGE_BYTES;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub success: bool,
    pub url: String,
    pub public_id: String,
}

pub fn upload_routes() -> Router<AppState> {
    Router::new()
        .route("/upload", post(upload_image))
        .layer(DefaultBodyLimit::max(UPLOAD_BODY_LIMIT))
}

/// POST /upload (multipart, field `image`)
#[instrument(skip(state, upload))]
pub async fn upload_image(
    State(state): State<AppState>,
    ImageUpload(upload): ImageUpload,
) -> Result<Json<UploadResponse>, AppError> {
    let image = upload.ok_or_else(|| AppError::validation("No file uploaded"))?;
    let hosted = state.images.upload(image).await.map_err(AppError::Upload)?;

    info!(public_id = %hosted.public_id, "standalone image uploaded");
    Ok(Json(UploadResponse {
        success: true,
        url: hosted.url,
        public_id: hosted.public_id,
    }))
}
