use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
pub struct UploadedImage {
    /// Public path under `/media`.
    pub url: String,
    pub content_type: String,
    pub size: usize,
}
