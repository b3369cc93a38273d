use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use jsonwebtoken::{encode, EncodingKey, Header};
use mercato_api::{app, middleware::{Claims, JwtVerifier}, AppState};
use mercato_catalog::{InventoryManager, Product};
use mercato_core::LogMailer;
use mercato_order::{FanoutRouter, InMemoryOrderRepository, OrderService, ServiceSettings, StockLedger, TopicHub};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;
use uuid::Uuid;

const JWT_SECRET: &str = "test-secret";
const WEBHOOK_SECRET: &str = "whsec_test";

struct TestApp {
    router: Router,
    inventory: Arc<InventoryManager>,
    product: Uuid,
}

fn setup() -> TestApp {
    let inventory = Arc::new(InventoryManager::new());
    let lamp = Product::new("LAMP-01", "Desk lamp", 2500, 10);
    let product = lamp.id;
    inventory.register(lamp);

    let repo = Arc::new(InMemoryOrderRepository::new());
    let verifier = Arc::new(JwtVerifier::new(JWT_SECRET));
    let fanout = Arc::new(FanoutRouter::new(
        Arc::new(TopicHub::default()),
        verifier.clone(),
        repo.clone(),
        Duration::from_secs(1),
    ));
    let service = Arc::new(OrderService::new(
        repo,
        StockLedger::new(inventory.clone()),
        fanout.clone(),
        Arc::new(LogMailer),
        ServiceSettings::default(),
    ));

    let state = AppState {
        orders: service,
        fanout,
        verifier,
        db: None,
        redis: None,
        webhook_secret: Arc::from(WEBHOOK_SECRET),
        shutdown: CancellationToken::new(),
    };

    TestApp {
        router: app(state),
        inventory,
        product,
    }
}

fn token(sub: &str, role: &str) -> String {
    let claims = Claims {
        sub: sub.to_string(),
        role: role.to_string(),
        exp: (chrono::Utc::now().timestamp() + 3600) as usize,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(JWT_SECRET.as_bytes())).unwrap()
}

async fn send(app: &TestApp, method: Method, uri: &str, bearer: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(bearer) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", bearer));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, json)
}

async fn place_order(app: &TestApp, customer: &str, quantity: i32) -> (StatusCode, Value) {
    let body = json!({
        "items": [{ "product_id": app.product, "quantity": quantity }],
        "currency": "EUR"
    });
    send(app, Method::POST, "/v1/orders", Some(customer), Some(body)).await
}

async fn pay(app: &TestApp, order_id: &str, secret: &str) -> StatusCode {
    let request = Request::builder()
        .method(Method::POST)
        .uri("/v1/webhooks/payments")
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-webhook-secret", secret)
        .body(Body::from(
            json!({ "order_id": order_id, "status": "succeeded", "reference": "pi_1" }).to_string(),
        ))
        .unwrap();
    app.router.clone().oneshot(request).await.unwrap().status()
}

fn stock(app: &TestApp) -> i32 {
    app.inventory.get(&app.product).unwrap().available_quantity
}

#[tokio::test]
async fn test_health() {
    let app = setup();
    let (status, body) = send(&app, Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_requests_without_token_rejected() {
    let app = setup();
    let (status, body) = send(&app, Method::GET, "/v1/orders", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].is_string());

    let (status, _) = send(&app, Method::GET, "/v1/orders", Some("not-a-jwt"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_order_visibility() {
    let app = setup();
    let alice = token("alice", "CUSTOMER");
    let (status, order) = place_order(&app, &alice, 2).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(order["order_status"], "Processing");
    assert_eq!(order["total"], 5000);
    assert_eq!(order["items"][0]["unit_price"], 2500);

    let uri = format!("/v1/orders/{}", order["id"].as_str().unwrap());
    let (status, _) = send(&app, Method::GET, &uri, Some(&alice), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, Method::GET, &uri, Some(&token("mallory", "CUSTOMER")), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(body.get("owner_id").is_none());

    let (status, _) = send(&app, Method::GET, &uri, Some(&token("root", "ADMIN")), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, list) = send(&app, Method::GET, "/v1/orders", Some(&alice), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_admin_routes_require_admin() {
    let app = setup();
    let (status, _) = send(&app, Method::GET, "/v1/admin/orders", Some(&token("alice", "CUSTOMER")), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, list) = send(&app, Method::GET, "/v1/admin/orders?sort=oldest", Some(&token("root", "ADMIN")), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(list.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_lifecycle_from_payment_to_return() {
    let app = setup();
    let alice = token("alice", "CUSTOMER");
    let admin = token("root", "ADMIN");

    let (_, order) = place_order(&app, &alice, 3).await;
    let id = order["id"].as_str().unwrap().to_string();
    assert_eq!(stock(&app), 10);

    assert_eq!(pay(&app, &id, "wrong").await, StatusCode::UNAUTHORIZED);
    assert_eq!(pay(&app, &id, WEBHOOK_SECRET).await, StatusCode::OK);
    assert_eq!(stock(&app), 7);

    let uri = format!("/v1/admin/orders/{}", id);
    for status in ["Confirmed", "Shipped", "OutForDelivery", "Delivered"] {
        let (code, body) = send(&app, Method::PATCH, &uri, Some(&admin), Some(json!({ "order_status": status }))).await;
        assert_eq!(code, StatusCode::OK, "{status}: {body}");
    }
    assert_eq!(stock(&app), 7);

    let (status, delivered) = send(
        &app,
        Method::PATCH,
        &uri,
        Some(&admin),
        Some(json!({ "tracking": "TRK-42", "delivery_notes": "  " })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(delivered["tracking"], "TRK-42");
    assert!(delivered["delivered_at"].is_string());

    let (status, _) = send(&app, Method::PATCH, &uri, Some(&admin), Some(json!({ "order_status": "Delivered" }))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, returned) = send(
        &app,
        Method::POST,
        &format!("/v1/orders/{}/return", id),
        Some(&alice),
        Some(json!({ "reason": "Wrong colour" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(returned["order_status"], "ReturnRequested");
    assert_eq!(returned["order_locked"], true);

    let (status, _) = send(&app, Method::POST, &format!("/v1/orders/{}/cancel", id), Some(&alice), None).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_owner_cancels_processing_order() {
    let app = setup();
    let alice = token("alice", "CUSTOMER");
    let (_, order) = place_order(&app, &alice, 1).await;
    let uri = format!("/v1/orders/{}/cancel", order["id"].as_str().unwrap());

    let (status, _) = send(&app, Method::POST, &uri, Some(&token("mallory", "CUSTOMER")), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, cancelled) = send(&app, Method::POST, &uri, Some(&alice), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cancelled["order_status"], "Cancelled");
}

#[tokio::test]
async fn test_validation_and_stock_errors() {
    let app = setup();
    let alice = token("alice", "CUSTOMER");
    let admin = token("root", "ADMIN");

    let (status, _) = place_order(&app, &alice, 11).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = place_order(&app, &alice, 0).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let overflowing = json!({
        "items": [
            { "product_id": app.product, "quantity": i32::MAX },
            { "product_id": app.product, "quantity": 1 }
        ]
    });
    let (status, _) = send(&app, Method::POST, "/v1/orders", Some(&alice), Some(overflowing)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, order) = place_order(&app, &alice, 1).await;
    let uri = format!("/v1/admin/orders/{}", order["id"].as_str().unwrap());
    let (status, body) = send(&app, Method::PATCH, &uri, Some(&admin), Some(json!({ "order_status": "Teleported" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("Teleported"));

    let (status, _) = send(&app, Method::PATCH, &uri, Some(&admin), Some(json!({ "order_status": "Delivered" }))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_admin_delete() {
    let app = setup();
    let alice = token("alice", "CUSTOMER");
    let admin = token("root", "ADMIN");
    let (_, order) = place_order(&app, &alice, 1).await;
    let id = order["id"].as_str().unwrap();

    let uri = format!("/v1/admin/orders/{}", id);
    let (status, _) = send(&app, Method::DELETE, &uri, Some(&admin), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&app, Method::DELETE, &uri, Some(&admin), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, Method::GET, &format!("/v1/orders/{}", id), Some(&alice), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
