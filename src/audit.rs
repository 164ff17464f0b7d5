use serde_json::Value;
use uuid::Uuid;

use crate::{error::AppResult, state::AppState};

pub async fn log_audit(
    state: &AppState,
    actor_id: Option<Uuid>,
    action: &str,
    entity_type: &str,
    entity_id: impl ToString,
    metadata: Option<Value>,
) -> AppResult<()> {
    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO audit_logs (id, actor_id, action, entity_type, entity_id, metadata)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(id)
    .bind(actor_id)
    .bind(action)
    .bind(entity_type)
    .bind(entity_id.to_string())
    .bind(metadata)
    .execute(state.pool())
    .await?;

    Ok(())
}

/// Writes an audit row and only logs when that fails.
pub async fn record(
    state: &AppState,
    actor_id: Option<Uuid>,
    action: &str,
    entity_type: &str,
    entity_id: impl ToString,
    metadata: Option<Value>,
) {
    if let Err(err) = log_audit(state, actor_id, action, entity_type, entity_id, metadata).await {
        tracing::warn!(error = %err, action, "audit log failed");
    }
}
