use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, Set, TransactionTrait, sea_query::Expr,
};
use uuid::Uuid;

use crate::{
    audit,
    dto::{
        admin::{
            ApplicationDecision, ApplicationQuery, AuditLogList, DecideApplicationRequest,
            SellerApplicationList, UpdateRoleRequest, UserList,
        },
        orders::{OrderList, OrderWithItems, UpdateOrderStatusRequest},
        products::CreateProductRequest,
        reviews::ReviewFlagList,
    },
    entity::{
        AuditLogs, Orders, ReviewFlags, SellerApplications, Users,
        audit_logs::Column as AuditCol,
        orders::Column as OrderCol,
        review_flags::Column as FlagCol,
        seller_applications::{
            ActiveModel as ApplicationActive, ApplicationStatus, Column as ApplicationCol,
        },
        users::{ActiveModel as UserActive, Column as UserCol, Role},
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::{AuditLog, Order, Product, ReviewFlag, SellerApplication, User},
    response::{ApiResponse, Meta},
    routes::params::{OrderListQuery, Pagination},
    services::{order_service, seller_service},
    state::AppState,
};

pub async fn list_users(
    state: &AppState,
    user: &AuthUser,
    pagination: Pagination,
) -> AppResult<ApiResponse<UserList>> {
    ensure_admin(user)?;
    let (page, limit, offset) = pagination.normalize();

    let finder = Users::find()
        .filter(UserCol::DeletedAt.is_null())
        .order_by_desc(UserCol::CreatedAt);
    let total = finder.clone().count(&state.orm).await? as i64;
    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(User::from)
        .collect();

    Ok(ApiResponse::success(
        "Users",
        UserList { items },
        Some(Meta::new(page, limit, total)),
    ))
}

pub async fn change_role(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateRoleRequest,
) -> AppResult<ApiResponse<User>> {
    ensure_admin(user)?;
    if id == user.user_id && payload.role != Role::Admin {
        return Err(AppError::invalid(
            "cannot_demote_self",
            "Admins cannot remove their own admin role",
        ));
    }

    let existing = Users::find_by_id(id)
        .filter(UserCol::DeletedAt.is_null())
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;
    let previous = existing.role;

    let mut active: UserActive = existing.into();
    active.role = Set(payload.role);
    let updated = active.update(&state.orm).await?;

    audit::record(
        state,
        Some(user.user_id),
        "user_role_change",
        "user",
        updated.id,
        Some(serde_json::json!({ "from": previous, "to": updated.role })),
    )
    .await;

    Ok(ApiResponse::success(
        "Role updated",
        User::from(updated),
        Some(Meta::empty()),
    ))
}

pub async fn list_seller_applications(
    state: &AppState,
    user: &AuthUser,
    pagination: Pagination,
    query: ApplicationQuery,
) -> AppResult<ApiResponse<SellerApplicationList>> {
    ensure_admin(user)?;
    let (page, limit, offset) = pagination.normalize();

    let mut condition = Condition::all();
    if let Some(status) = query.status {
        condition = condition.add(ApplicationCol::Status.eq(status));
    }

    let finder = SellerApplications::find()
        .filter(condition)
        .order_by_asc(ApplicationCol::CreatedAt);
    let total = finder.clone().count(&state.orm).await? as i64;
    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(SellerApplication::from)
        .collect();

    Ok(ApiResponse::success(
        "Seller applications",
        SellerApplicationList { items },
        Some(Meta::new(page, limit, total)),
    ))
}

/// Approving promotes a customer to seller in the same transaction.
pub async fn decide_seller_application(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: DecideApplicationRequest,
) -> AppResult<ApiResponse<SellerApplication>> {
    ensure_admin(user)?;

    let txn = state.orm.begin().await?;
    let application = SellerApplications::find_by_id(id)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;
    if application.status != ApplicationStatus::Pending {
        return Err(AppError::conflict(
            "already_decided",
            "Application has already been decided",
        ));
    }
    let applicant_id = application.user_id;

    let status = match payload.decision {
        ApplicationDecision::Approve => ApplicationStatus::Approved,
        ApplicationDecision::Reject => ApplicationStatus::Rejected,
    };

    let mut active: ApplicationActive = application.into();
    active.status = Set(status);
    active.decided_by = Set(Some(user.user_id));
    active.decided_at = Set(Some(Utc::now().into()));
    if let Some(note) = payload.note.filter(|n| !n.trim().is_empty()) {
        active.note = Set(Some(note));
    }
    let decided = active.update(&txn).await?;

    if status == ApplicationStatus::Approved {
        // Only customers are promoted; an admin applicant keeps admin.
        Users::update_many()
            .col_expr(UserCol::Role, Expr::value(Role::Seller))
            .filter(UserCol::Id.eq(applicant_id))
            .filter(UserCol::Role.eq(Role::Customer))
            .exec(&txn)
            .await?;
    }

    txn.commit().await?;

    audit::record(
        state,
        Some(user.user_id),
        "seller_application_decide",
        "seller_application",
        decided.id,
        Some(serde_json::json!({ "status": decided.status, "user_id": applicant_id })),
    )
    .await;

    Ok(ApiResponse::success(
        "Application decided",
        SellerApplication::from(decided),
        Some(Meta::empty()),
    ))
}

pub async fn list_all_orders(
    state: &AppState,
    user: &AuthUser,
    pagination: Pagination,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    ensure_admin(user)?;
    order_service::find_orders(state, None, &pagination, query).await
}

pub async fn get_order_admin(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderWithItems>> {
    ensure_admin(user)?;
    let data = order_service::load_order_with_items(&state.orm, id).await?;
    Ok(ApiResponse::success(
        "Order found",
        data,
        Some(Meta::empty()),
    ))
}

/// Manual transitions only; `paid` is set by payment reconciliation.
pub async fn update_order_status(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateOrderStatusRequest,
) -> AppResult<ApiResponse<Order>> {
    ensure_admin(user)?;

    let existing = Orders::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    if !existing.status.can_transition_to(payload.status) {
        return Err(AppError::invalid(
            "invalid_transition",
            format!(
                "Cannot move an order from {:?} to {:?}",
                existing.status, payload.status
            )
            .to_lowercase(),
        ));
    }

    // Conditional on the status we validated against.
    let result = Orders::update_many()
        .col_expr(OrderCol::Status, Expr::value(payload.status))
        .filter(OrderCol::Id.eq(id))
        .filter(OrderCol::Status.eq(existing.status))
        .exec(&state.orm)
        .await?;
    if result.rows_affected == 0 {
        return Err(AppError::conflict(
            "status_changed",
            "Order status changed concurrently, reload and retry",
        ));
    }

    let order = Orders::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    audit::record(
        state,
        Some(user.user_id),
        "order_status_update",
        "order",
        order.id,
        Some(serde_json::json!({ "from": existing.status, "to": order.status })),
    )
    .await;

    Ok(ApiResponse::success(
        "Order updated",
        Order::from(order),
        Some(Meta::empty()),
    ))
}

pub async fn create_platform_product(
    state: &AppState,
    user: &AuthUser,
    payload: CreateProductRequest,
) -> AppResult<ApiResponse<Product>> {
    ensure_admin(user)?;
    let product = seller_service::insert_product(state, user, None, payload).await?;
    Ok(ApiResponse::success(
        "Product created",
        product,
        Some(Meta::empty()),
    ))
}

pub async fn list_audit_logs(
    state: &AppState,
    user: &AuthUser,
    pagination: Pagination,
) -> AppResult<ApiResponse<AuditLogList>> {
    ensure_admin(user)?;
    let (page, limit, offset) = pagination.normalize();

    let finder = AuditLogs::find().order_by_desc(AuditCol::OccurredAt);
    let total = finder.clone().count(&state.orm).await? as i64;
    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(AuditLog::from)
        .collect();

    Ok(ApiResponse::success(
        "Audit logs",
        AuditLogList { items },
        Some(Meta::new(page, limit, total)),
    ))
}

pub async fn list_review_flags(
    state: &AppState,
    user: &AuthUser,
    pagination: Pagination,
) -> AppResult<ApiResponse<ReviewFlagList>> {
    ensure_admin(user)?;
    let (page, limit, offset) = pagination.normalize();

    let finder = ReviewFlags::find().order_by_desc(FlagCol::CreatedAt);
    let total = finder.clone().count(&state.orm).await? as i64;
    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(ReviewFlag::from)
        .collect();

    Ok(ApiResponse::success(
        "Review flags",
        ReviewFlagList { items },
        Some(Meta::new(page, limit, total)),
    ))
}

#[cfg(test)]
mod tests {
    use crate::entity::orders::OrderStatus;

    #[test]
    fn cancelled_and_refunded_are_terminal() {
        for next in [
            OrderStatus::Created,
            OrderStatus::Paid,
            OrderStatus::Fulfilled,
            OrderStatus::Refunded,
            OrderStatus::Cancelled,
        ] {
            assert!(!OrderStatus::Cancelled.can_transition_to(next));
            assert!(!OrderStatus::Refunded.can_transition_to(next));
        }
    }
}
