use serde::Deserialize;
use utoipa::ToSchema;

#[derive(Debug, Deserialize, ToSchema)]
pub struct SellerApplicationRequest {
    /// Free text shown to the reviewing admin.
    pub note: Option<String>,
}
