use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    entity::{seller_applications::ApplicationStatus, users::Role},
    models::{AuditLog, SellerApplication, User},
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateRoleRequest {
    pub role: Role,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationDecision {
    Approve,
    Reject,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct DecideApplicationRequest {
    pub decision: ApplicationDecision,
    pub note: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ApplicationQuery {
    pub status: Option<ApplicationStatus>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(transparent)]
pub struct UserList {
    #[schema(value_type = Vec<User>)]
    pub items: Vec<User>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(transparent)]
pub struct SellerApplicationList {
    #[schema(value_type = Vec<SellerApplication>)]
    pub items: Vec<SellerApplication>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(transparent)]
pub struct AuditLogList {
    #[schema(value_type = Vec<AuditLog>)]
    pub items: Vec<AuditLog>,
}
