use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use uuid::Uuid;

use crate::{
    audit,
    dto::account::SellerApplicationRequest,
    entity::{
        CartItems, SellerApplications, Users,
        cart_items::Column as CartCol,
        seller_applications::{
            ActiveModel as ApplicationActive, ApplicationStatus, Column as ApplicationCol,
        },
        users::{ActiveModel as UserActive, Role},
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::SellerApplication,
    response::{ApiResponse, Meta},
    services::analytics_service,
    state::AppState,
};

/// Placeholder that no Argon2 hash can equal, so the account cannot log in.
const DISABLED_PASSWORD_HASH: &str = "!";

pub fn anonymised_email(user_id: Uuid) -> String {
    format!("deleted-{}@deleted.invalid", user_id.simple())
}

/// Self-deletion. The row stays (orders and reviews reference it) but is
/// stripped of personal data and can no longer authenticate. Cart lines and
/// tracking events go with it.
pub async fn delete_account(
    state: &AppState,
    user: &AuthUser,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let existing = Users::find_by_id(user.user_id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let txn = state.orm.begin().await?;

    let mut active: UserActive = existing.into();
    active.email = Set(anonymised_email(user.user_id));
    active.password_hash = Set(DISABLED_PASSWORD_HASH.to_string());
    active.display_name = Set("Deleted user".to_string());
    active.deleted_at = Set(Some(Utc::now().into()));
    active.update(&txn).await?;

    CartItems::delete_many()
        .filter(CartCol::UserId.eq(user.user_id))
        .exec(&txn)
        .await?;
    analytics_service::delete_user_events(&txn, user.user_id).await?;

    txn.commit().await?;

    tracing::info!(user_id = %user.user_id, "account anonymised");
    audit::record(state, Some(user.user_id), "account_delete", "user", user.user_id, None).await;

    Ok(ApiResponse::success(
        "Account deleted",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

pub async fn apply_for_seller(
    state: &AppState,
    user: &AuthUser,
    payload: SellerApplicationRequest,
) -> AppResult<ApiResponse<SellerApplication>> {
    if user.role != Role::Customer {
        return Err(AppError::conflict(
            "already_seller",
            "Account can already sell",
        ));
    }

    let pending = SellerApplications::find()
        .filter(ApplicationCol::UserId.eq(user.user_id))
        .filter(ApplicationCol::Status.eq(ApplicationStatus::Pending))
        .one(&state.orm)
        .await?;
    if pending.is_some() {
        return Err(AppError::conflict(
            "application_pending",
            "A seller application is already pending",
        ));
    }

    let application = ApplicationActive {
        id: Set(Uuid::new_v4()),
        user_id: Set(user.user_id),
        status: Set(ApplicationStatus::Pending),
        note: Set(payload.note.map(|n| n.trim().to_string()).filter(|n| !n.is_empty())),
        decided_by: Set(None),
        created_at: Set(Utc::now().into()),
        decided_at: Set(None),
    }
    .insert(&state.orm)
    .await?;

    audit::record(
        state,
        Some(user.user_id),
        "seller_application_submit",
        "seller_application",
        application.id,
        None,
    )
    .await;

    Ok(ApiResponse::success(
        "Application submitted",
        SellerApplication::from(application),
        Some(Meta::empty()),
    ))
}

/// The caller's most recent application.
pub async fn get_seller_application(
    state: &AppState,
    user: &AuthUser,
) -> AppResult<ApiResponse<SellerApplication>> {
    let application = SellerApplications::find()
        .filter(ApplicationCol::UserId.eq(user.user_id))
        .order_by_desc(ApplicationCol::CreatedAt)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    Ok(ApiResponse::success(
        "Seller application",
        SellerApplication::from(application),
        Some(Meta::empty()),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anonymised_email_is_unique_per_user_and_undeliverable() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        assert_ne!(anonymised_email(a), anonymised_email(b));
        assert!(anonymised_email(a).ends_with(".invalid"));
    }
}
