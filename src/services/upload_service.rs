use axum::extract::Multipart;
use uuid::Uuid;

use crate::{
    dto::uploads::UploadedImage,
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    response::{ApiResponse, Meta},
    state::AppState,
};

pub const MEDIA_PREFIX: &str = "/media";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Jpeg,
    Png,
    Gif,
    Webp,
}

impl ImageKind {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Some(ImageKind::Jpeg),
            "png" => Some(ImageKind::Png),
            "gif" => Some(ImageKind::Gif),
            "webp" => Some(ImageKind::Webp),
            _ => None,
        }
    }

    /// Identifies the format from the leading bytes.
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
            Some(ImageKind::Jpeg)
        } else if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
            Some(ImageKind::Png)
        } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
            Some(ImageKind::Gif)
        } else if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
            Some(ImageKind::Webp)
        } else {
            None
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ImageKind::Jpeg => "jpg",
            ImageKind::Png => "png",
            ImageKind::Gif => "gif",
            ImageKind::Webp => "webp",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            ImageKind::Jpeg => "image/jpeg",
            ImageKind::Png => "image/png",
            ImageKind::Gif => "image/gif",
            ImageKind::Webp => "image/webp",
        }
    }
}

/// Checks name, size and content agree on an allowed image format.
pub fn validate_image(file_name: &str, bytes: &[u8], max_bytes: usize) -> AppResult<ImageKind> {
    if bytes.is_empty() {
        return Err(AppError::invalid("empty_file", "Uploaded file is empty"));
    }
    if bytes.len() > max_bytes {
        return Err(AppError::invalid(
            "file_too_large",
            format!("Uploaded file exceeds {max_bytes} bytes"),
        ));
    }

    let declared = file_name
        .rsplit_once('.')
        .and_then(|(_, ext)| ImageKind::from_extension(ext))
        .ok_or_else(|| {
            AppError::invalid("unsupported_type", "Allowed types: jpg, jpeg, png, gif, webp")
        })?;

    match ImageKind::sniff(bytes) {
        Some(actual) if actual == declared => Ok(actual),
        _ => Err(AppError::invalid(
            "content_mismatch",
            "File content does not match its extension",
        )),
    }
}

pub async fn upload_image(
    state: &AppState,
    user: &AuthUser,
    mut multipart: Multipart,
) -> AppResult<ApiResponse<UploadedImage>> {
    let mut upload: Option<(String, Vec<u8>)> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.body_text()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::BadRequest(e.body_text()))?;
        upload = Some((file_name, bytes.to_vec()));
        break;
    }

    let (file_name, bytes) =
        upload.ok_or_else(|| AppError::BadRequest("multipart field `file` is required".into()))?;
    let kind = validate_image(&file_name, &bytes, state.config.max_upload_bytes)?;

    let stored_name = format!("{}.{}", Uuid::new_v4().simple(), kind.extension());
    tokio::fs::create_dir_all(&state.config.upload_root)
        .await
        .map_err(|e| AppError::Internal(e.into()))?;
    tokio::fs::write(state.config.upload_root.join(&stored_name), &bytes)
        .await
        .map_err(|e| AppError::Internal(e.into()))?;

    tracing::info!(
        user_id = %user.user_id,
        file = %stored_name,
        size = bytes.len(),
        "image uploaded"
    );

    Ok(ApiResponse::success(
        "Image uploaded",
        UploadedImage {
            url: format!("{MEDIA_PREFIX}/{stored_name}"),
            content_type: kind.content_type().to_string(),
            size: bytes.len(),
        },
        Some(Meta::empty()),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";
    const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10];

    #[test]
    fn sniffs_common_formats() {
        assert_eq!(ImageKind::sniff(PNG), Some(ImageKind::Png));
        assert_eq!(ImageKind::sniff(JPEG), Some(ImageKind::Jpeg));
        assert_eq!(ImageKind::sniff(b"GIF89a...."), Some(ImageKind::Gif));
        assert_eq!(ImageKind::sniff(b"RIFF\0\0\0\0WEBPVP8 "), Some(ImageKind::Webp));
        assert_eq!(ImageKind::sniff(b"<svg xmlns="), None);
    }

    #[test]
    fn accepts_matching_name_and_content() {
        assert_eq!(validate_image("photo.PNG", PNG, 1024).unwrap(), ImageKind::Png);
        assert_eq!(validate_image("a.jpeg", JPEG, 1024).unwrap(), ImageKind::Jpeg);
    }

    #[test]
    fn rejects_disguised_files() {
        let err = validate_image("evil.png", b"<script>alert(1)</script>", 1024).unwrap_err();
        assert_eq!(err.code(), "content_mismatch");

        let err = validate_image("photo.png", JPEG, 1024).unwrap_err();
        assert_eq!(err.code(), "content_mismatch");
    }

    #[test]
    fn rejects_bad_extensions_and_sizes() {
        assert_eq!(validate_image("x.svg", PNG, 1024).unwrap_err().code(), "unsupported_type");
        assert_eq!(validate_image("noext", PNG, 1024).unwrap_err().code(), "unsupported_type");
        assert_eq!(validate_image("x.png", PNG, 4).unwrap_err().code(), "file_too_large");
        assert_eq!(validate_image("x.png", b"", 1024).unwrap_err().code(), "empty_file");
    }
}
