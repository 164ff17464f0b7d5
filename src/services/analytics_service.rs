use axum::http::{HeaderMap, header};
use sea_orm::{
    ColumnTrait, ConnectionTrait, DbErr, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect,
};
use serde_json::Value;
use uuid::Uuid;

use crate::{
    dto::analytics::{
        AnalyticsSummary, EventQuery, InteractionEventList, PrivacyDeleted, PrivacyExport,
        TrackInteractionRequest, TrackViewRequest, Tracked, ViewEventList,
    },
    entity::{
        InteractionEvents, Orders, Products, Users, ViewEvents,
        events_interaction::Column as InteractionCol,
        events_view::Column as ViewCol,
        orders::{Column as OrderCol, OrderStatus},
        users::Column as UserCol,
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, MaybeAuthUser, ensure_admin},
    models::{InteractionEvent, ViewEvent},
    response::{ApiResponse, Meta},
    state::AppState,
};

pub const SESSION_HEADER: &str = "x-session-id";
const MAX_FIELD_LEN: usize = 512;

/// Request metadata attached to a view event.
#[derive(Debug, Clone, Default)]
pub struct ViewContext {
    pub user_id: Option<Uuid>,
    pub session_id: String,
    pub user_agent: Option<String>,
    pub referrer: Option<String>,
}

impl ViewContext {
    pub fn from_headers(headers: &HeaderMap, user: &MaybeAuthUser) -> Self {
        let text = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(|v| truncate(v, MAX_FIELD_LEN))
        };
        Self {
            user_id: user.user_id(),
            session_id: text(SESSION_HEADER).unwrap_or_else(|| "anonymous".to_string()),
            user_agent: text(header::USER_AGENT.as_str()),
            referrer: text(header::REFERER.as_str()),
        }
    }
}

fn truncate(value: &str, max: usize) -> String {
    value.chars().take(max).collect()
}

async fn insert_view(
    state: &AppState,
    ctx: &ViewContext,
    path: &str,
    product_id: Option<Uuid>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO events_view (id, user_id, session_id, path, product_id, referrer, user_agent)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(ctx.user_id)
    .bind(&ctx.session_id)
    .bind(path)
    .bind(product_id)
    .bind(ctx.referrer.as_deref())
    .bind(ctx.user_agent.as_deref())
    .execute(state.pool())
    .await?;
    Ok(())
}

async fn insert_interaction(
    state: &AppState,
    user_id: Option<Uuid>,
    session_id: &str,
    event_type: &str,
    event_data: Option<Value>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO events_interaction (id, user_id, session_id, event_type, event_data)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(session_id)
    .bind(event_type)
    .bind(event_data)
    .execute(state.pool())
    .await?;
    Ok(())
}

/// Best-effort view event for a page the API itself serves. A failed insert
/// is logged and never fails the request.
pub async fn record_view(
    state: &AppState,
    ctx: &ViewContext,
    path: &str,
    product_id: Option<Uuid>,
) {
    if let Err(err) = insert_view(state, ctx, path, product_id).await {
        tracing::warn!(error = %err, path = %path, "view event dropped");
    }
}

/// Removes every analytics row linked to `user_id`, returning the number of
/// view and interaction rows deleted.
pub async fn delete_user_events<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
) -> Result<(u64, u64), DbErr> {
    let views = ViewEvents::delete_many()
        .filter(ViewCol::UserId.eq(user_id))
        .exec(conn)
        .await?
        .rows_affected;
    let interactions = InteractionEvents::delete_many()
        .filter(InteractionCol::UserId.eq(user_id))
        .exec(conn)
        .await?
        .rows_affected;
    Ok((views, interactions))
}

pub async fn export_own_events(
    state: &AppState,
    user: &AuthUser,
) -> AppResult<ApiResponse<PrivacyExport>> {
    let views = ViewEvents::find()
        .filter(ViewCol::UserId.eq(user.user_id))
        .order_by_asc(ViewCol::OccurredAt)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(ViewEvent::from)
        .collect();
    let interactions = InteractionEvents::find()
        .filter(InteractionCol::UserId.eq(user.user_id))
        .order_by_asc(InteractionCol::OccurredAt)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(InteractionEvent::from)
        .collect();

    Ok(ApiResponse::success(
        "Tracking data export",
        PrivacyExport {
            views,
            interactions,
        },
        None,
    ))
}

pub async fn delete_own_events(
    state: &AppState,
    user: &AuthUser,
) -> AppResult<ApiResponse<PrivacyDeleted>> {
    let (views_deleted, interactions_deleted) =
        delete_user_events(&state.orm, user.user_id).await?;
    tracing::info!(
        user_id = %user.user_id,
        views_deleted,
        interactions_deleted,
        "tracking data erased"
    );

    Ok(ApiResponse::success(
        "Tracking data deleted",
        PrivacyDeleted {
            status: "deleted".to_string(),
            views_deleted,
            interactions_deleted,
        },
        None,
    ))
}

pub async fn track_view(
    state: &AppState,
    mut ctx: ViewContext,
    payload: TrackViewRequest,
) -> AppResult<ApiResponse<Tracked>> {
    if payload.session_id.trim().is_empty() || payload.path.trim().is_empty() {
        return Err(AppError::BadRequest("session_id and path are required".into()));
    }
    ctx.session_id = truncate(payload.session_id.trim(), MAX_FIELD_LEN);
    if payload.referrer.is_some() {
        ctx.referrer = payload.referrer.map(|r| truncate(&r, MAX_FIELD_LEN));
    }
    let path = truncate(&payload.path, MAX_FIELD_LEN);

    let accepted = match insert_view(state, &ctx, &path, payload.product_id).await {
        Ok(()) => true,
        Err(err) => {
            tracing::warn!(error = %err, "view event dropped");
            false
        }
    };
    Ok(ApiResponse::success("Tracked", Tracked { accepted }, None))
}

pub async fn track_interaction(
    state: &AppState,
    user: &MaybeAuthUser,
    payload: TrackInteractionRequest,
) -> AppResult<ApiResponse<Tracked>> {
    if payload.session_id.trim().is_empty() || payload.event_type.trim().is_empty() {
        return Err(AppError::BadRequest(
            "session_id and event_type are required".into(),
        ));
    }

    let accepted = match insert_interaction(
        state,
        user.user_id(),
        &truncate(payload.session_id.trim(), MAX_FIELD_LEN),
        &truncate(payload.event_type.trim(), 64),
        payload.event_data,
    )
    .await
    {
        Ok(()) => true,
        Err(err) => {
            tracing::warn!(error = %err, "interaction event dropped");
            false
        }
    };
    Ok(ApiResponse::success("Tracked", Tracked { accepted }, None))
}

pub async fn list_views(
    state: &AppState,
    user: &AuthUser,
    query: EventQuery,
) -> AppResult<ApiResponse<ViewEventList>> {
    ensure_admin(user)?;
    let items = ViewEvents::find()
        .order_by_desc(ViewCol::OccurredAt)
        .limit(query.limit())
        .all(&state.orm)
        .await?
        .into_iter()
        .map(ViewEvent::from)
        .collect();
    Ok(ApiResponse::success("View events", ViewEventList { items }, None))
}

pub async fn list_interactions(
    state: &AppState,
    user: &AuthUser,
    query: EventQuery,
) -> AppResult<ApiResponse<InteractionEventList>> {
    ensure_admin(user)?;
    let items = InteractionEvents::find()
        .order_by_desc(InteractionCol::OccurredAt)
        .limit(query.limit())
        .all(&state.orm)
        .await?
        .into_iter()
        .map(InteractionEvent::from)
        .collect();
    Ok(ApiResponse::success(
        "Interaction events",
        InteractionEventList { items },
        None,
    ))
}

pub async fn summary(
    state: &AppState,
    user: &AuthUser,
) -> AppResult<ApiResponse<AnalyticsSummary>> {
    ensure_admin(user)?;

    let users = Users::find()
        .filter(UserCol::DeletedAt.is_null())
        .count(&state.orm)
        .await?;
    let products = Products::find().count(&state.orm).await?;
    let orders = Orders::find().count(&state.orm).await?;
    let paid_orders = Orders::find()
        .filter(OrderCol::Status.is_in(OrderStatus::PURCHASED))
        .count(&state.orm)
        .await?;

    // SUM(bigint) is numeric in Postgres; cast back for decoding.
    let revenue_cents: i64 = sqlx::query_scalar(
        "SELECT COALESCE(SUM(total_cents), 0)::BIGINT FROM orders WHERE status IN ('paid', 'fulfilled')",
    )
    .fetch_one(state.pool())
    .await?;

    let views = ViewEvents::find().count(&state.orm).await?;
    let interactions = InteractionEvents::find().count(&state.orm).await?;

    Ok(ApiResponse::success(
        "Analytics summary",
        AnalyticsSummary {
            users,
            products,
            orders,
            paid_orders,
            revenue_cents,
            views,
            interactions,
        },
        Some(Meta::empty()),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn view_context_reads_session_and_agent() {
        let mut headers = HeaderMap::new();
        headers.insert(SESSION_HEADER, HeaderValue::from_static("sess-1"));
        headers.insert(header::USER_AGENT, HeaderValue::from_static("curl/8"));
        let ctx = ViewContext::from_headers(&headers, &MaybeAuthUser(None));
        assert_eq!(ctx.session_id, "sess-1");
        assert_eq!(ctx.user_agent.as_deref(), Some("curl/8"));
        assert_eq!(ctx.user_id, None);
    }

    #[test]
    fn missing_session_is_anonymous() {
        let ctx = ViewContext::from_headers(&HeaderMap::new(), &MaybeAuthUser(None));
        assert_eq!(ctx.session_id, "anonymous");
    }

    #[test]
    fn long_values_are_truncated_on_char_boundaries() {
        let long = "é".repeat(600);
        assert_eq!(truncate(&long, MAX_FIELD_LEN).chars().count(), MAX_FIELD_LEN);
    }
}
