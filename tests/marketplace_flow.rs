use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{HeaderMap, HeaderValue, Request, StatusCode},
};
use hmac::{Hmac, Mac};
use marketplace_api::{
    config::{AppConfig, JwtConfig, StripeConfig},
    db::{create_orm_conn, run_migrations},
    dto::{
        auth::TokenType,
        orders::CheckoutItem,
        reviews::CreateReviewRequest,
    },
    entity::{
        InteractionEvents, Orders, ViewEvents,
        events_interaction::Column as InteractionCol,
        events_view::Column as ViewCol,
        orders::{ActiveModel as OrderActive, Column as OrderCol, OrderStatus, PaymentProvider},
        products::ActiveModel as ProductActive,
        users::{ActiveModel as UserActive, Role},
    },
    error::AppError,
    middleware::auth::{AuthUser, issue_token},
    payments::{
        IntentRequest, PaymentError, PaymentGateway, PaymentIntent, PaymentRegistry,
        StripeGateway, StubGateway, WebhookEvent,
    },
    routes::create_app,
    services::{
        checkout_service, review_service,
        webhook_service::{self, Reconciliation},
    },
    state::AppState,
};
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, Set};
use serde_json::{Value, json};
use sha2::Sha256;
use tower::ServiceExt;
use uuid::Uuid;

const SIGNATURE_HEADER: &str = "x-test-signature";
const STRIPE_WEBHOOK_SECRET: &str = "whsec_integration";

/// Provider double: unsettled intents, a shared-secret header as the
/// signature and `{"ref": ...}` as the event body.
struct TestGateway {
    provider: PaymentProvider,
    fail: bool,
}

#[async_trait]
impl PaymentGateway for TestGateway {
    fn provider(&self) -> PaymentProvider {
        self.provider
    }

    async fn create_intent(&self, request: &IntentRequest<'_>) -> Result<PaymentIntent, PaymentError> {
        if self.fail {
            return Err(PaymentError::Api {
                status: 500,
                message: "provider down".into(),
            });
        }
        Ok(PaymentIntent {
            provider_ref: format!("test_{}", request.order_id.simple()),
            client_secret: Some(format!("secret_{}", request.order_id.simple())),
            approve_url: None,
            settled: false,
        })
    }

    async fn verify_webhook(&self, _payload: &[u8], headers: &HeaderMap) -> Result<(), PaymentError> {
        match headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok()) {
            Some("valid") => Ok(()),
            _ => Err(PaymentError::InvalidSignature("bad test signature".into())),
        }
    }

    fn parse_event(&self, payload: &[u8]) -> Result<WebhookEvent, PaymentError> {
        let value: serde_json::Value = serde_json::from_slice(payload)
            .map_err(|e| PaymentError::InvalidPayload(e.to_string()))?;
        let provider_ref = value["ref"]
            .as_str()
            .ok_or_else(|| PaymentError::InvalidPayload("missing ref".into()))?;
        Ok(WebhookEvent::PaymentSucceeded {
            provider_ref: provider_ref.to_string(),
        })
    }
}

fn database_url() -> Option<String> {
    match std::env::var("TEST_DATABASE_URL").or_else(|_| std::env::var("DATABASE_URL")) {
        Ok(url) => Some(url),
        Err(_) => {
            eprintln!("Skipping test: set TEST_DATABASE_URL or DATABASE_URL to run integration tests.");
            None
        }
    }
}

fn test_config(database_url: &str) -> AppConfig {
    AppConfig {
        database_url: database_url.to_string(),
        host: "127.0.0.1".into(),
        port: 0,
        jwt: JwtConfig {
            secret: "integration-test-secret".into(),
            access_ttl_minutes: 15,
            refresh_ttl_hours: 24,
        },
        default_currency: "GBP".into(),
        upload_root: std::env::temp_dir().join("marketplace-api-tests"),
        max_upload_bytes: 1024 * 1024,
        payment_timeout_secs: 5,
        stripe: None,
        paypal: None,
    }
}

// Tests share one database and run concurrently, so every row they create
// carries fresh ids instead of truncating tables.
async fn setup_state(database_url: &str) -> anyhow::Result<AppState> {
    let payments = PaymentRegistry::new()
        .with(Arc::new(StubGateway))
        .with(Arc::new(TestGateway {
            provider: PaymentProvider::Stripe,
            fail: false,
        }))
        .with(Arc::new(TestGateway {
            provider: PaymentProvider::PayPal,
            fail: true,
        }));
    setup_state_with(database_url, payments).await
}

async fn setup_state_with(
    database_url: &str,
    payments: PaymentRegistry,
) -> anyhow::Result<AppState> {
    let orm = create_orm_conn(database_url).await?;
    run_migrations(&orm).await?;
    Ok(AppState::new(orm, test_config(database_url), payments))
}

fn bearer(state: &AppState, user: &AuthUser) -> anyhow::Result<String> {
    let token = issue_token(&state.config.jwt, user.user_id, user.role, TokenType::Access)?;
    Ok(format!("Bearer {token}"))
}

async fn call(app: &Router, request: Request<Body>) -> anyhow::Result<(StatusCode, Value)> {
    let response = app.clone().oneshot(request).await?;
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), 256 * 1024).await?;
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body)?
    };
    Ok((status, json))
}

fn stripe_signature(payload: &[u8], timestamp: i64) -> anyhow::Result<String> {
    let mut mac = Hmac::<Sha256>::new_from_slice(STRIPE_WEBHOOK_SECRET.as_bytes())
        .map_err(|e| anyhow::anyhow!("hmac key: {e}"))?;
    mac.update(format!("{timestamp}.").as_bytes());
    mac.update(payload);
    Ok(format!(
        "t={timestamp},v1={}",
        hex::encode(mac.finalize().into_bytes())
    ))
}

async fn create_user(state: &AppState, role: Role) -> anyhow::Result<AuthUser> {
    let id = Uuid::new_v4();
    let email = format!("{}@example.com", id.simple());
    UserActive {
        id: Set(id),
        email: Set(email.clone()),
        password_hash: Set("!".into()),
        display_name: Set("Test".into()),
        role: Set(role),
        created_at: Set(chrono::Utc::now().into()),
        deleted_at: Set(None),
    }
    .insert(&state.orm)
    .await?;

    Ok(AuthUser {
        user_id: id,
        email,
        role,
    })
}

async fn create_product(
    state: &AppState,
    owner: &AuthUser,
    price_cents: i64,
    active: bool,
) -> anyhow::Result<Uuid> {
    let id = Uuid::new_v4();
    let tag = id.simple().to_string();
    ProductActive {
        id: Set(id),
        owner_id: Set(Some(owner.user_id)),
        sku: Set(format!("SKU-{tag}")),
        name: Set(format!("Product {tag}")),
        brand: Set("Acme".into()),
        category: Set("tops".into()),
        description_md: Set("Soft *cotton*".into()),
        price_cents: Set(price_cents),
        currency: Set("GBP".into()),
        active: Set(active),
        seo_slug: Set(format!("product-{tag}")),
        hero_image_url: Set(None),
        created_at: Set(chrono::Utc::now().into()),
    }
    .insert(&state.orm)
    .await?;
    Ok(id)
}

fn item(product_id: Uuid, qty: i32) -> CheckoutItem {
    CheckoutItem {
        product_id,
        variant_id: None,
        qty,
    }
}

async fn order_count(state: &AppState, user: &AuthUser) -> anyhow::Result<u64> {
    Ok(Orders::find()
        .filter(OrderCol::UserId.eq(user.user_id))
        .count(&state.orm)
        .await?)
}

#[tokio::test]
async fn checkout_prices_from_catalogue() -> anyhow::Result<()> {
    let Some(url) = database_url() else {
        return Ok(());
    };
    let state = setup_state(&url).await?;

    let seller = create_user(&state, Role::Seller).await?;
    let customer = create_user(&state, Role::Customer).await?;
    let tee = create_product(&state, &seller, 1999, true).await?;
    let cap = create_product(&state, &seller, 500, true).await?;

    let resp = checkout_service::checkout(
        &state,
        &customer,
        vec![item(tee, 2), item(cap, 1)],
        None,
    )
    .await?;
    let placed = resp.data.expect("checkout data");

    assert_eq!(placed.order.order.total_cents, 2 * 1999 + 500);
    assert_eq!(placed.order.order.currency, "GBP");
    // The stub provider settles immediately.
    assert_eq!(placed.order.order.status, OrderStatus::Paid);
    assert!(placed.order.order.paid_at.is_some());
    assert_eq!(placed.order.items.len(), 2);

    let hidden = create_product(&state, &seller, 100, false).await?;
    let err = checkout_service::checkout(&state, &customer, vec![item(hidden, 1)], None)
        .await
        .err()
        .expect("inactive products cannot be bought");
    assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    assert_eq!(order_count(&state, &customer).await?, 1);

    Ok(())
}

#[tokio::test]
async fn provider_failure_writes_no_order() -> anyhow::Result<()> {
    let Some(url) = database_url() else {
        return Ok(());
    };
    let state = setup_state(&url).await?;

    let seller = create_user(&state, Role::Seller).await?;
    let customer = create_user(&state, Role::Customer).await?;
    let product = create_product(&state, &seller, 2500, true).await?;

    let err = checkout_service::create_paypal_order(&state, &customer, vec![item(product, 1)])
        .await
        .err()
        .expect("failing provider");
    assert!(matches!(err, AppError::Upstream(_)));
    assert_eq!(order_count(&state, &customer).await?, 0);

    Ok(())
}

#[tokio::test]
async fn webhooks_are_verified_and_applied_once() -> anyhow::Result<()> {
    let Some(url) = database_url() else {
        return Ok(());
    };
    let state = setup_state(&url).await?;

    let seller = create_user(&state, Role::Seller).await?;
    let customer = create_user(&state, Role::Customer).await?;
    let product = create_product(&state, &seller, 4200, true).await?;

    let resp = checkout_service::create_stripe_intent(&state, &customer, vec![item(product, 1)])
        .await?;
    let intent = resp.data.expect("intent data");
    assert!(intent.client_secret.is_some());

    let order = Orders::find_by_id(intent.order_id)
        .one(&state.orm)
        .await?
        .expect("order stored");
    assert_eq!(order.status, OrderStatus::Created);

    let body = serde_json::to_vec(&serde_json::json!({ "ref": order.provider_ref }))?;

    let mut forged = HeaderMap::new();
    forged.insert(SIGNATURE_HEADER, HeaderValue::from_static("forged"));
    let err = webhook_service::handle_webhook(&state, PaymentProvider::Stripe, &forged, &body)
        .await
        .err()
        .expect("bad signature");
    assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    let unchanged = Orders::find_by_id(order.id).one(&state.orm).await?.expect("order");
    assert_eq!(unchanged.status, OrderStatus::Created);

    let mut signed = HeaderMap::new();
    signed.insert(SIGNATURE_HEADER, HeaderValue::from_static("valid"));
    let first =
        webhook_service::handle_webhook(&state, PaymentProvider::Stripe, &signed, &body).await?;
    assert_eq!(first, Reconciliation::Paid);
    let second =
        webhook_service::handle_webhook(&state, PaymentProvider::Stripe, &signed, &body).await?;
    assert_eq!(second, Reconciliation::AlreadyProcessed);

    let paid = Orders::find_by_id(order.id).one(&state.orm).await?.expect("order");
    assert_eq!(paid.status, OrderStatus::Paid);
    assert!(paid.paid_at.is_some());

    let unknown = serde_json::to_vec(&serde_json::json!({ "ref": "test_does_not_exist" }))?;
    let outcome =
        webhook_service::handle_webhook(&state, PaymentProvider::Stripe, &signed, &unknown).await?;
    assert_eq!(outcome, Reconciliation::UnknownOrder);

    Ok(())
}

#[tokio::test]
async fn reviews_require_a_purchase_and_are_unique() -> anyhow::Result<()> {
    let Some(url) = database_url() else {
        return Ok(());
    };
    let state = setup_state(&url).await?;

    let seller = create_user(&state, Role::Seller).await?;
    let customer = create_user(&state, Role::Customer).await?;
    let product = create_product(&state, &seller, 1500, true).await?;

    let review = || CreateReviewRequest {
        rating: 5,
        body_md: "Great fit, **love** it".into(),
        images: vec![],
    };

    let err = review_service::create_review(&state, &customer, product, review())
        .await
        .err()
        .expect("not purchased yet");
    assert_eq!(err.status(), StatusCode::FORBIDDEN);
    assert_eq!(err.code(), "purchase_required");

    checkout_service::checkout(&state, &customer, vec![item(product, 1)], None).await?;

    let created = review_service::create_review(&state, &customer, product, review())
        .await?
        .data
        .expect("review");
    assert_eq!(created.rating, 5);
    assert!(created.body_html.contains("<strong>love</strong>"));

    let err = review_service::create_review(&state, &customer, product, review())
        .await
        .err()
        .expect("second review");
    assert_eq!(err.status(), StatusCode::CONFLICT);
    assert_eq!(err.code(), "already_reviewed");

    Ok(())
}

#[tokio::test]
async fn admin_routes_reject_customers() -> anyhow::Result<()> {
    let Some(url) = database_url() else {
        return Ok(());
    };
    let state = setup_state(&url).await?;
    let customer = create_user(&state, Role::Customer).await?;
    let token = issue_token(
        &state.config.jwt,
        customer.user_id,
        customer.role,
        TokenType::Access,
    )?;

    let app = create_app(state);

    let response = app
        .clone()
        .oneshot(
            Request::get("/api/admin/users")
                .header("authorization", format!("Bearer {token}"))
                .body(Body::empty())?,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024).await?;
    let json: serde_json::Value = serde_json::from_slice(&body)?;
    assert_eq!(json["ok"], false);
    assert_eq!(json["data"]["error"], "forbidden");

    let response = app
        .oneshot(Request::get("/api/orders/my").body(Body::empty())?)
        .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    Ok(())
}

#[tokio::test]
async fn malformed_checkout_bodies_get_a_json_400() -> anyhow::Result<()> {
    let Some(url) = database_url() else {
        return Ok(());
    };
    let state = setup_state(&url).await?;
    let customer = create_user(&state, Role::Customer).await?;
    let auth = bearer(&state, &customer)?;
    let app = create_app(state.clone());

    for body in ["{}", r#"{"items":"nope"}"#, "not json"] {
        let (status, json) = call(
            &app,
            Request::post("/api/checkout")
                .header("authorization", &auth)
                .header("content-type", "application/json")
                .body(Body::from(body))?,
        )
        .await?;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
        assert_eq!(json["ok"], false);
        assert_eq!(json["data"]["error"], "bad_request");
    }

    let (status, json) = call(
        &app,
        Request::post("/api/auth/register")
            .header("content-type", "application/json")
            .body(Body::from("{}"))?,
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["data"]["error"], "bad_request");

    let (status, json) = call(
        &app,
        Request::get("/api/orders/not-a-uuid")
            .header("authorization", &auth)
            .body(Body::empty())?,
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["data"]["error"], "bad_request");

    assert_eq!(order_count(&state, &customer).await?, 0);
    Ok(())
}

#[tokio::test]
async fn stripe_webhooks_over_http() -> anyhow::Result<()> {
    let Some(url) = database_url() else {
        return Ok(());
    };
    let stripe = StripeGateway::new(
        reqwest::Client::new(),
        &StripeConfig {
            secret_key: "sk_test_unused".into(),
            webhook_secret: STRIPE_WEBHOOK_SECRET.into(),
            api_base: "http://127.0.0.1:9".into(),
        },
    );
    let payments = PaymentRegistry::new()
        .with(Arc::new(StubGateway))
        .with(Arc::new(stripe));
    let state = setup_state_with(&url, payments).await?;

    let customer = create_user(&state, Role::Customer).await?;
    let order_id = Uuid::new_v4();
    let provider_ref = format!("pi_{}", order_id.simple());
    OrderActive {
        id: Set(order_id),
        user_id: Set(customer.user_id),
        total_cents: Set(4200),
        currency: Set("GBP".into()),
        status: Set(OrderStatus::Created),
        payment_provider: Set(PaymentProvider::Stripe),
        provider_ref: Set(provider_ref.clone()),
        paid_at: Set(None),
        created_at: Set(chrono::Utc::now().into()),
    }
    .insert(&state.orm)
    .await?;

    let app = create_app(state.clone());
    let event = |id: &str| {
        serde_json::to_vec(&json!({
            "type": "payment_intent.succeeded",
            "data": { "object": { "id": id } }
        }))
    };
    let deliver = |body: Vec<u8>, signature: String| {
        Request::post("/api/webhooks/stripe")
            .header("content-type", "application/json")
            .header("stripe-signature", signature)
            .body(Body::from(body))
    };
    let now = chrono::Utc::now().timestamp();
    let body = event(&provider_ref)?;

    // Signed for a different payload.
    let forged = stripe_signature(b"{}", now)?;
    let (status, json) = call(&app, deliver(body.clone(), forged)?).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["ok"], false);
    assert_eq!(json["data"]["error"], "invalid_signature");

    let (status, json) = call(
        &app,
        deliver(body.clone(), "t=-9223372036854775808,v1=00".into())?,
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["data"]["error"], "invalid_signature");

    let order = Orders::find_by_id(order_id).one(&state.orm).await?.expect("order");
    assert_eq!(order.status, OrderStatus::Created);

    let signed = stripe_signature(&body, now)?;
    let (status, json) = call(&app, deliver(body.clone(), signed.clone())?).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, json!({ "received": true, "status": "paid" }));

    let (status, json) = call(&app, deliver(body.clone(), signed)?).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "already_processed");

    let order = Orders::find_by_id(order_id).one(&state.orm).await?.expect("order");
    assert_eq!(order.status, OrderStatus::Paid);
    assert!(order.paid_at.is_some());

    let unknown = event(&format!("pi_{}", Uuid::new_v4().simple()))?;
    let signature = stripe_signature(&unknown, now)?;
    let (status, json) = call(&app, deliver(unknown, signature)?).await?;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(json, json!({ "received": true, "status": "unknown_order" }));

    Ok(())
}

async fn event_counts(state: &AppState, user: &AuthUser) -> anyhow::Result<(u64, u64)> {
    let views = ViewEvents::find()
        .filter(ViewCol::UserId.eq(user.user_id))
        .count(&state.orm)
        .await?;
    let interactions = InteractionEvents::find()
        .filter(InteractionCol::UserId.eq(user.user_id))
        .count(&state.orm)
        .await?;
    Ok((views, interactions))
}

async fn generate_events(app: &Router, auth: &str, product: Uuid) -> anyhow::Result<()> {
    let (status, _) = call(
        app,
        Request::get(format!("/api/products/{product}"))
            .header("authorization", auth)
            .body(Body::empty())?,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);

    let (status, json) = call(
        app,
        Request::post("/api/track/interaction")
            .header("authorization", auth)
            .header("content-type", "application/json")
            .body(Body::from(
                json!({
                    "session_id": "sess-privacy",
                    "event_type": "add_to_cart",
                    "event_data": { "product_id": product }
                })
                .to_string(),
            ))?,
    )
    .await?;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(json["data"]["accepted"], true);
    Ok(())
}

#[tokio::test]
async fn tracking_data_can_be_exported_and_erased() -> anyhow::Result<()> {
    let Some(url) = database_url() else {
        return Ok(());
    };
    let state = setup_state(&url).await?;
    let seller = create_user(&state, Role::Seller).await?;
    let customer = create_user(&state, Role::Customer).await?;
    let product = create_product(&state, &seller, 900, true).await?;
    let auth = bearer(&state, &customer)?;
    let app = create_app(state.clone());

    generate_events(&app, &auth, product).await?;
    assert_eq!(event_counts(&state, &customer).await?, (1, 1));

    let (status, json) = call(
        &app,
        Request::get("/api/privacy/export")
            .header("authorization", &auth)
            .body(Body::empty())?,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["views"].as_array().map(Vec::len), Some(1));
    assert_eq!(json["data"]["interactions"].as_array().map(Vec::len), Some(1));
    assert_eq!(json["data"]["interactions"][0]["event_type"], "add_to_cart");

    let (status, json) = call(
        &app,
        Request::post("/api/privacy/delete")
            .header("authorization", &auth)
            .body(Body::empty())?,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["status"], "deleted");
    assert_eq!(json["data"]["views_deleted"], 1);
    assert_eq!(json["data"]["interactions_deleted"], 1);
    assert_eq!(event_counts(&state, &customer).await?, (0, 0));

    let (status, _) = call(&app, Request::get("/api/privacy/export").body(Body::empty())?).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    Ok(())
}

#[tokio::test]
async fn account_deletion_erases_tracking_data() -> anyhow::Result<()> {
    let Some(url) = database_url() else {
        return Ok(());
    };
    let state = setup_state(&url).await?;
    let seller = create_user(&state, Role::Seller).await?;
    let customer = create_user(&state, Role::Customer).await?;
    let product = create_product(&state, &seller, 900, true).await?;
    let auth = bearer(&state, &customer)?;
    let app = create_app(state.clone());

    generate_events(&app, &auth, product).await?;
    assert_eq!(event_counts(&state, &customer).await?, (1, 1));

    let (status, json) = call(
        &app,
        Request::delete("/api/account")
            .header("authorization", &auth)
            .body(Body::empty())?,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["ok"], true);
    assert_eq!(event_counts(&state, &customer).await?, (0, 0));

    Ok(())
}
