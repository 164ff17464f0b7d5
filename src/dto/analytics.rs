use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::models::{InteractionEvent, ViewEvent};

#[derive(Debug, Deserialize, ToSchema)]
pub struct TrackViewRequest {
    pub session_id: String,
    pub path: String,
    pub product_id: Option<Uuid>,
    pub referrer: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct TrackInteractionRequest {
    pub session_id: String,
    pub event_type: String,
    pub event_data: Option<Value>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct Tracked {
    pub accepted: bool,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct EventQuery {
    /// 1..=300, default 100.
    pub limit: Option<u64>,
}

impl EventQuery {
    pub const DEFAULT_LIMIT: u64 = 100;
    pub const MAX_LIMIT: u64 = 300;

    pub fn limit(&self) -> u64 {
        self.limit
            .unwrap_or(Self::DEFAULT_LIMIT)
            .clamp(1, Self::MAX_LIMIT)
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(transparent)]
pub struct ViewEventList {
    #[schema(value_type = Vec<ViewEvent>)]
    pub items: Vec<ViewEvent>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(transparent)]
pub struct InteractionEventList {
    #[schema(value_type = Vec<InteractionEvent>)]
    pub items: Vec<InteractionEvent>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AnalyticsSummary {
    pub users: u64,
    pub products: u64,
    pub orders: u64,
    pub paid_orders: u64,
    pub revenue_cents: i64,
    pub views: u64,
    pub interactions: u64,
}

/// Everything the tracking endpoints hold about the caller.
#[derive(Debug, Serialize, ToSchema)]
pub struct PrivacyExport {
    pub views: Vec<ViewEvent>,
    pub interactions: Vec<InteractionEvent>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PrivacyDeleted {
    pub status: String,
    pub views_deleted: u64,
    pub interactions_deleted: u64,
}

#[cfg(test)]
mod tests {
    use super::EventQuery;

    #[test]
    fn limit_is_clamped() {
        assert_eq!(EventQuery { limit: None }.limit(), 100);
        assert_eq!(EventQuery { limit: Some(0) }.limit(), 1);
        assert_eq!(EventQuery { limit: Some(10_000) }.limit(), 300);
        assert_eq!(EventQuery { limit: Some(42) }.limit(), 42);
    }
}
