use utoipa::{
    Modify, OpenApi,
    openapi::{
        self,
        OpenApi as OpenApiSpec,
        security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    },
};
use utoipa_scalar::{Scalar, Servable};

use crate::{
    dto::{
        account::SellerApplicationRequest,
        admin::{
            ApplicationDecision, AuditLogList, DecideApplicationRequest, SellerApplicationList,
            UpdateRoleRequest, UserList,
        },
        analytics::{
            AnalyticsSummary, InteractionEventList, PrivacyDeleted, PrivacyExport,
            TrackInteractionRequest, TrackViewRequest, Tracked, ViewEventList,
        },
        auth::{LoginRequest, LoginResponse, RefreshRequest, RegisterRequest, TokenPair},
        cart::{AddToCartRequest, CartLine, CartView},
        orders::{
            CartCheckoutRequest, CheckoutItem, CheckoutRequest, CheckoutResponse, OrderList,
            OrderWithItems, PayPalOrderResponse, ProviderCheckoutRequest, StripeIntentResponse,
            UpdateOrderStatusRequest, WebhookAck,
        },
        products::{
            CreateProductRequest, NewImage, NewVariant, ProductDetail, ProductList,
            ProductRemoval, ReviewSummary, SellerTransaction, UpdateProductRequest,
        },
        reviews::{
            CreateReviewRequest, FlagReviewRequest, ReviewFlagList, ReviewList,
            UpdateReviewRequest,
        },
        uploads::UploadedImage,
    },
    entity::{
        orders::{OrderStatus, PaymentProvider},
        seller_applications::ApplicationStatus,
        users::Role,
    },
    error::ErrorData,
    models::{
        AuditLog, CartItem, InteractionEvent, Order, OrderItem, Product, ProductImage, Review,
        ReviewFlag, SellerApplication, User, Variant, ViewEvent,
    },
    response::{ApiResponse, Meta},
    routes::{
        account, admin, auth, cart, checkout, health, orders, params, products, reviews, seller,
        track, uploads,
    },
};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        auth::register,
        auth::login,
        auth::refresh,
        auth::current_user,
        account::delete_account,
        account::apply_for_seller,
        account::get_seller_application,
        products::list_products,
        products::get_product,
        products::get_product_by_slug,
        products::list_reviews,
        products::create_review,
        reviews::update_review,
        reviews::delete_review,
        reviews::flag_review,
        cart::cart_list,
        cart::add_to_cart,
        cart::remove_from_cart,
        cart::clear_cart,
        cart::checkout_cart,
        checkout::checkout,
        checkout::create_stripe_intent,
        checkout::create_paypal_order,
        checkout::stripe_webhook,
        checkout::paypal_webhook,
        orders::list_order,
        orders::get_order,
        seller::list_own_products,
        seller::create_product,
        seller::update_product,
        seller::delete_product,
        seller::add_variant,
        seller::remove_variant,
        seller::add_image,
        seller::list_transactions,
        uploads::upload_image,
        track::track_view,
        track::track_interaction,
        track::export_tracking_data,
        track::delete_tracking_data,
        admin::list_users,
        admin::change_role,
        admin::list_seller_applications,
        admin::decide_seller_application,
        admin::list_all_orders,
        admin::get_order_admin,
        admin::update_order_status,
        admin::create_platform_product,
        admin::list_audit_logs,
        admin::list_review_flags,
        admin::list_views,
        admin::list_interactions,
        admin::analytics_summary
    ),
    components(
        schemas(
            User,
            Role,
            SellerApplication,
            ApplicationStatus,
            Product,
            ProductImage,
            Variant,
            CartItem,
            Order,
            OrderItem,
            OrderStatus,
            PaymentProvider,
            Review,
            ReviewFlag,
            ViewEvent,
            InteractionEvent,
            AuditLog,
            ErrorData,
            RegisterRequest,
            LoginRequest,
            RefreshRequest,
            TokenPair,
            LoginResponse,
            SellerApplicationRequest,
            AddToCartRequest,
            CartLine,
            CartView,
            CheckoutItem,
            CheckoutRequest,
            CartCheckoutRequest,
            ProviderCheckoutRequest,
            CheckoutResponse,
            StripeIntentResponse,
            PayPalOrderResponse,
            OrderList,
            OrderWithItems,
            UpdateOrderStatusRequest,
            WebhookAck,
            CreateProductRequest,
            UpdateProductRequest,
            NewVariant,
            NewImage,
            ProductList,
            ProductDetail,
            ProductRemoval,
            ReviewSummary,
            SellerTransaction,
            CreateReviewRequest,
            UpdateReviewRequest,
            FlagReviewRequest,
            ReviewList,
            ReviewFlagList,
            UploadedImage,
            TrackViewRequest,
            TrackInteractionRequest,
            Tracked,
            ViewEventList,
            InteractionEventList,
            AnalyticsSummary,
            PrivacyExport,
            PrivacyDeleted,
            UpdateRoleRequest,
            ApplicationDecision,
            DecideApplicationRequest,
            UserList,
            SellerApplicationList,
            AuditLogList,
            params::Pagination,
            params::ProductQuery,
            params::ProductSort,
            params::OrderListQuery,
            params::SortOrder,
            Meta,
            ApiResponse<Product>,
            ApiResponse<ProductList>,
            ApiResponse<OrderWithItems>,
            ApiResponse<OrderList>,
            ApiResponse<ErrorData>
        )
    ),
    security(
        ("bearer_auth" = [])
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoint"),
        (name = "Auth", description = "Authentication endpoints"),
        (name = "Account", description = "Account and seller onboarding"),
        (name = "Products", description = "Public catalogue"),
        (name = "Reviews", description = "Verified-purchase reviews"),
        (name = "Cart", description = "Cart endpoints"),
        (name = "Checkout", description = "Checkout and payment intents"),
        (name = "Webhooks", description = "Payment provider callbacks"),
        (name = "Orders", description = "Order endpoints"),
        (name = "Seller", description = "Seller catalogue management"),
        (name = "Uploads", description = "Image uploads"),
        (name = "Tracking", description = "Behavioural analytics ingestion"),
        (name = "Admin", description = "Admin endpoints"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_marketplace_paths() {
        let doc = ApiDoc::openapi();
        for path in [
            "/api/checkout",
            "/api/webhooks/stripe",
            "/api/products/{id}/reviews",
            "/api/seller/products/{id}",
            "/api/admin/analytics/summary",
            "/api/privacy/export",
            "/api/privacy/delete",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
