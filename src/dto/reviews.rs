use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::{Review, ReviewFlag};

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateReviewRequest {
    pub rating: i16,
    #[serde(alias = "body")]
    pub body_md: String,
    #[serde(default)]
    pub images: Vec<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateReviewRequest {
    pub rating: Option<i16>,
    #[serde(alias = "body")]
    pub body_md: Option<String>,
    pub images: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct FlagReviewRequest {
    pub reason: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ReviewList {
    pub items: Vec<Review>,
    /// Whether the caller could post a review right now.
    pub can_review: bool,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(transparent)]
pub struct ReviewFlagList {
    #[schema(value_type = Vec<ReviewFlag>)]
    pub items: Vec<ReviewFlag>,
}
