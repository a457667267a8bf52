use std::io::ErrorKind;

use axum::{
    extract::{multipart::MultipartRejection, Multipart, State},
    http::StatusCode,
    Json,
};
use image::{codecs::jpeg::JpegEncoder, imageops::FilterType, ImageFormat};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::error::ApiError;
use crate::AppState;

const ACCEPTED_TYPES: [&str; 4] = ["image/jpeg", "image/png", "image/webp", "image/gif"];

pub fn routes() -> axum::Router<AppState> {
    axum::Router::new().route("/", axum::routing::post(upload_image))
}

/// Result of storing an uploaded image
#[derive(Debug, Clone, Serialize)]
pub struct StoredImage {
    pub url: String,
    pub width: u32,
    pub height: u32,
    pub bytes: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("Unsupported media type {0}")]
    Unsupported(String),
    #[error("Could not decode image: {0}")]
    Decode(image::ImageError),
    #[error("Could not encode image: {0}")]
    Encode(image::ImageError),
    #[error("Could not store image: {0}")]
    Io(#[from] std::io::Error),
    #[error("Image worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

impl From<ImageError> for ApiError {
    fn from(e: ImageError) -> Self {
        match e {
            ImageError::Unsupported(_) => ApiError::new(
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                "unsupported_media_type",
                e.to_string(),
            ),
            ImageError::Decode(_) => {
                ApiError::new(StatusCode::BAD_REQUEST, "invalid_image", e.to_string())
            }
            ImageError::Encode(_) | ImageError::Io(_) | ImageError::Worker(_) => {
                tracing::error!("Image processing failed: {}", e);
                ApiError::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "image_processing_failed",
                    e.to_string(),
                )
            }
        }
    }
}

/// POST /api/uploads
/// Compress and store a single image from the `image` form field
async fn upload_image(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<(StatusCode, Json<StoredImage>), ApiError> {
    let mut multipart = multipart?;
    while let Some(field) = multipart.next_field().await? {
        let is_image_field = field.name() == Some("image") || field.file_name().is_some();
        if !is_image_field {
            continue;
        }

        let content_type = field.content_type().map(str::to_string);
        let data = field.bytes().await?;
        if data.is_empty() {
            return Err(ApiError::validation("image file is empty"));
        }

        let stored = store_image(&state.config, data.to_vec(), content_type.as_deref()).await?;
        return Ok((StatusCode::CREATED, Json(stored)));
    }

    Err(ApiError::validation("multipart field 'image' is required"))
}

/// Compress an upload and write it to the upload directory as `<uuid>.jpg`
pub async fn store_image(
    config: &Config,
    data: Vec<u8>,
    content_type: Option<&str>,
) -> Result<StoredImage, ImageError> {
    detect_format(&data, content_type)?;

    let max_width = config.image_max_width;
    let quality = config.image_quality;
    let original_len = data.len();
    let (encoded, width, height) =
        tokio::task::spawn_blocking(move || compress(&data, max_width, quality)).await??;

    let file_name = format!("{}.jpg", Uuid::new_v4());
    let path = config.upload_dir.join(&file_name);
    tokio::fs::write(&path, &encoded).await?;

    info!(
        "Stored image {} ({}x{}, {} -> {} bytes)",
        file_name,
        width,
        height,
        original_len,
        encoded.len()
    );

    Ok(StoredImage {
        url: format!("/uploads/{}", file_name),
        width,
        height,
        bytes: encoded.len(),
    })
}

/// Delete a previously stored image. URLs outside the upload dir are ignored.
pub async fn remove_image(config: &Config, url: &str) {
    let Some(path) = config.upload_path(url) else {
        return;
    };
    match tokio::fs::remove_file(&path).await {
        Ok(()) => info!("Removed image {}", path.display()),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove image {}: {}", path.display(), e),
    }
}

/// Work out the real format, trusting the bytes over the declared type
fn detect_format(data: &[u8], content_type: Option<&str>) -> Result<ImageFormat, ImageError> {
    let declared = content_type
        .map(|ct| ct.split(';').next().unwrap_or("").trim().to_lowercase())
        .filter(|ct| !ct.is_empty());

    match image::guess_format(data) {
        Ok(format @ (ImageFormat::Jpeg | ImageFormat::Png | ImageFormat::WebP | ImageFormat::Gif)) => {
            Ok(format)
        }
        Ok(other) => Err(ImageError::Unsupported(
            other.to_mime_type().to_string(),
        )),
        Err(e) => match declared {
            Some(ct) if !ACCEPTED_TYPES.contains(&ct.as_str()) => Err(ImageError::Unsupported(ct)),
            _ => Err(ImageError::Decode(e)),
        },
    }
}

/// Decode, shrink to `max_width` if wider, and re-encode as JPEG.
/// Returns the encoded bytes and final dimensions.
pub fn compress(data: &[u8], max_width: u32, quality: u8) -> Result<(Vec<u8>, u32, u32), ImageError> {
    let mut img = image::load_from_memory(data).map_err(ImageError::Decode)?;

    if img.width() > max_width {
        let height = ((img.height() as u64 * max_width as u64) / img.width() as u64).max(1) as u32;
        img = img.resize_exact(max_width, height, FilterType::Lanczos3);
    }

    let rgb = img.to_rgb8();
    let mut out = Vec::new();
    {
        let mut encoder = JpegEncoder::new_with_quality(&mut out, quality);
        encoder.encode_image(&rgb).map_err(ImageError::Encode)?;
    }

    Ok((out, rgb.width(), rgb.height()))
}
