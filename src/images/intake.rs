use axum::extract::{multipart::MultipartError, FromRequest, Multipart, Request};
use bytes::{Bytes, BytesMut};
use tracing::debug;

use crate::error::AppError;

pub const IMAGE_FIELD: &str = "image";
pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;
pub const ALLOWED_IMAGE_TYPES: &[&str] = &["image/jpeg", "image/jpg", "image/png", "image/webp"];

/// Image bytes held in memory for the duration of one request.
#[derive(Debug, Clone)]
pub struct UploadedImage {
    pub bytes: Bytes,
    pub content_type: String,
    pub file_name: String,
}

/// The single `image` file of a multipart request, if one was sent.
pub struct ImageUpload(pub Option<UploadedImage>);

#[axum::async_trait]
impl<S> FromRequest<S> for ImageUpload
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let mut mp = match Multipart::from_request(req, state).await {
            Ok(mp) => mp,
            Err(rejection) => {
                debug!(reason = %rejection.body_text(), "request is not multipart, no image");
                return Ok(ImageUpload(None));
            }
        };
        read_single_image(&mut mp).await.map(ImageUpload)
    }
}

pub fn check_content_type(content_type: &str) -> Result<(), AppError> {
    if ALLOWED_IMAGE_TYPES.contains(&content_type) {
        Ok(())
    } else {
        Err(AppError::validation(
            "Invalid file type. Only JPEG, PNG, and WebP images are allowed.",
        ))
    }
}

pub fn check_size(size: usize) -> Result<(), AppError> {
    if size > MAX_IMAGE_BYTES {
        Err(AppError::validation("File too large. Maximum size is 5MB."))
    } else {
        Ok(())
    }
}

fn multipart_error(e: MultipartError) -> AppError {
    AppError::validation(e.body_text())
}

async fn read_single_image(mp: &mut Multipart) -> Result<Option<UploadedImage>, AppError> {
    let mut image = None;

    while let Some(mut field) = mp.next_field().await.map_err(multipart_error)? {
        // plain text fields are not files
        let Some(file_name) = field.file_name().map(str::to_owned) else {
            continue;
        };
        if field.name() != Some(IMAGE_FIELD) {
            return Err(AppError::validation("Unexpected field"));
        }
        if image.is_some() {
            return Err(AppError::validation("Too many files"));
        }

        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_ascii_lowercase();
        check_content_type(&content_type)?;

        let mut buf = BytesMut::new();
        while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
            check_size(buf.len() + chunk.len())?;
            buf.extend_from_slice(&chunk);
        }

        debug!(%content_type, size = buf.len(), "image accepted");
        image = Some(UploadedImage {
            bytes: buf.freeze(),
            content_type,
            file_name,
        });
    }

    Ok(image)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_supported_types() {
        for ct in ["image/jpeg", "image/jpg", "image/png", "image/webp"] {
            assert!(check_content_type(ct).is_ok(), "{ct}");
        }
    }

    #[test]
    fn rejects_other_types() {
        let err = check_content_type("application/pdf").unwrap_err();
        assert!(err.to_string().starts_with("Invalid file type"));
        assert!(check_content_type("image/gif").is_err());
        assert!(check_content_type("").is_err());
    }

    #[test]
    fn size_limit_is_inclusive() {
        assert!(check_size(MAX_IMAGE_BYTES).is_ok());
        assert!(check_size(MAX_IMAGE_BYTES + 1).is_err());
        assert!(check_size(6 * 1024 * 1024).is_err());
    }
}
