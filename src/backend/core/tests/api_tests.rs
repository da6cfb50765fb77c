//! HTTP tests driving the full router with signed tokens.
//!
//! Tests cover:
//! - Public endpoints and anonymous access
//! - Token and identity rejection
//! - Owner stamping and tenant isolation through the REST surface
//! - Soft delete and role reassignment
//! - Error envelope shape

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use bizdash_core::api::{build_router, AppState};
use bizdash_core::authz::{Authorizer, Identity, ResourceKind, Role, Row, RowId, RowLoader};
use bizdash_core::middleware::{AuthConfig, Authenticator, Claims};
use bizdash_core::store::MemoryStore;
use serde_json::{json, Value};
use tower::ServiceExt;

const SECRET: &str = "api-test-secret";

// ============================================================================
// Harness
// ============================================================================

struct Harness {
    app: Router,
    store: MemoryStore,
    authenticator: Authenticator,
}

fn authenticator() -> Authenticator {
    Authenticator::new(AuthConfig::builder().jwt_secret(SECRET).build()).unwrap()
}

fn user(id: &str, role: Role) -> Row {
    Row::new(
        ResourceKind::User,
        json!({ "email": format!("{id}@bizdash.test"), "role": role.as_str() }),
    )
    .with_id(id)
}

fn harness() -> Harness {
    let store = MemoryStore::new();
    store.put(user("1", Role::SuperAdmin));
    store.put(user("10", Role::Entrepreneur));
    store.put(user("11", Role::Entrepreneur));
    store.put(user("20", Role::Collaborator).with_entrepreneur("10"));
    store.put(user("30", Role::Customer).with_entrepreneur("10"));

    store.put(
        Row::new(
            ResourceKind::WhatsappInstance,
            json!({ "name": "Support", "phone_number": "+5511999990000" }),
        )
        .with_id("w-11")
        .with_entrepreneur("11"),
    );
    store.put(
        Row::new(
            ResourceKind::PriceTable,
            json!({ "name": "Pro", "price_cents": 4990, "billing_period": "monthly" }),
        )
        .with_id("pt-active"),
    );
    store.put(
        Row::new(
            ResourceKind::PriceTable,
            json!({ "name": "Legacy", "price_cents": 990, "billing_period": "monthly" }),
        )
        .with_id("pt-retired")
        .with_active(false),
    );

    let state = AppState::new(Authorizer::default(), Arc::new(store.clone()), authenticator());
    Harness {
        app: build_router(state),
        store,
        authenticator: authenticator(),
    }
}

impl Harness {
    fn token(&self, identity: &Identity) -> String {
        let claims = Claims::for_identity(identity, chrono::Duration::minutes(5));
        self.authenticator.generate_token(&claims).unwrap()
    }

    async fn call(
        &self,
        method: Method,
        uri: &str,
        identity: Option<&Identity>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(identity) = identity {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", self.token(identity)));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }
}

// ============================================================================
// Public endpoints
// ============================================================================

#[tokio::test]
async fn test_health_is_public() {
    let h = harness();
    let (status, body) = h.call(Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_public_price_tables_only_active() {
    let h = harness();
    let (status, body) = h
        .call(Method::GET, "/api/v1/public/price-tables", None, None)
        .await;
    assert_eq!(status, StatusCode::OK);

    let rows = body["data"].as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["id"], "pt-active");
}

// ============================================================================
// Authentication
// ============================================================================

#[tokio::test]
async fn test_missing_token_is_unauthenticated() {
    let h = harness();
    let (status, body) = h.call(Method::GET, "/api/v1/me", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_role_claim_must_match_record() {
    let h = harness();
    // Collaborator 20 claiming to be an entrepreneur
    let forged = Identity::entrepreneur("20");
    let (status, body) = h.call(Method::GET, "/api/v1/me", Some(&forged), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "UNAUTHENTICATED");
}

#[tokio::test]
async fn test_me_returns_identity_and_capabilities() {
    let h = harness();
    let e1 = Identity::entrepreneur("10");
    let (status, body) = h.call(Method::GET, "/api/v1/me", Some(&e1), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["identity"]["role"], "entrepreneur");

    let capabilities = body["data"]["capabilities"].as_array().unwrap();
    assert!(capabilities.contains(&json!("payment_gateways")));
    assert!(!capabilities.contains(&json!("businesses")));
}

// ============================================================================
// Resources
// ============================================================================

#[tokio::test]
async fn test_create_stamps_owner_and_redacts_secret() {
    let h = harness();
    let e1 = Identity::entrepreneur("10");
    let (status, body) = h
        .call(
            Method::POST,
            "/api/v1/payment-gateways",
            Some(&e1),
            Some(json!({
                "entrepreneur_id": "99",
                "data": { "name": "Main", "provider": "stripe", "secret_key": "sk_live_123" }
            })),
        )
        .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["entrepreneur_id"], "10");
    assert_eq!(body["data"]["data"]["secret_key"], "********");

    let id = body["data"]["id"].as_str().unwrap();
    let stored = h
        .store
        .load_row(ResourceKind::PaymentGateway, &RowId::new(id))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.data["secret_key"], "sk_live_123");
}

#[tokio::test]
async fn test_create_does_not_reveal_foreign_row_ids() {
    let h = harness();
    h.store.put(
        Row::new(
            ResourceKind::PaymentGateway,
            json!({ "name": "Main", "provider": "stripe" }),
        )
        .with_id("gw-10")
        .with_entrepreneur("10"),
    );

    let e2 = Identity::entrepreneur("11");
    let body = json!({ "id": "gw-10", "data": { "name": "Mine", "provider": "asaas" } });
    let (status, created) = h
        .call(Method::POST, "/api/v1/payment-gateways", Some(&e2), Some(body))
        .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_ne!(created["data"]["id"], "gw-10");
    assert_eq!(created["data"]["entrepreneur_id"], "11");
}

#[tokio::test]
async fn test_invalid_payload_rejected() {
    let h = harness();
    let e1 = Identity::entrepreneur("10");
    let (status, body) = h
        .call(
            Method::POST,
            "/api/v1/collaborators",
            Some(&e1),
            Some(json!({ "data": { "name": "Ana", "email": "not-an-email" } })),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "INVALID_ARGUMENT");
}

#[tokio::test]
async fn test_customer_cannot_create_collaborator() {
    let h = harness();
    let customer = Identity::customer("30", "10");
    let (status, _) = h
        .call(
            Method::POST,
            "/api/v1/collaborators",
            Some(&customer),
            Some(json!({ "data": { "name": "Ana", "email": "ana@shop.com" } })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_cross_tenant_row_is_not_found() {
    let h = harness();
    let collaborator = Identity::collaborator("20", "10");
    let (status, body) = h
        .call(Method::GET, "/api/v1/whatsapp-instances/w-11", Some(&collaborator), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");

    let (missing_status, missing_body) = h
        .call(Method::GET, "/api/v1/whatsapp-instances/nope", Some(&collaborator), None)
        .await;
    assert_eq!(missing_status, status);
    assert_eq!(missing_body["error"]["message"], body["error"]["message"]);
}

#[tokio::test]
async fn test_list_is_scoped_to_tenant() {
    let h = harness();
    let e2 = Identity::entrepreneur("11");
    let (status, body) = h
        .call(Method::GET, "/api/v1/whatsapp-instances", Some(&e2), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let e1 = Identity::entrepreneur("10");
    let (_, body) = h
        .call(Method::GET, "/api/v1/whatsapp-instances?limit=10", Some(&e1), None)
        .await;
    assert!(body["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_update_cannot_reparent() {
    let h = harness();
    let admin = Identity::super_admin("1");
    let (status, _) = h
        .call(
            Method::PUT,
            "/api/v1/whatsapp-instances/w-11",
            Some(&admin),
            Some(json!({ "entrepreneur_id": "10" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_update_merges_omitted_fields() {
    let h = harness();
    let e2 = Identity::entrepreneur("11");
    let (status, body) = h
        .call(
            Method::PUT,
            "/api/v1/whatsapp-instances/w-11",
            Some(&e2),
            Some(json!({ "data": { "name": "Sales", "phone_number": "+5511988887777" } })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["data"]["name"], "Sales");
    assert_eq!(body["data"]["entrepreneur_id"], "11");
    assert_eq!(body["data"]["active"], true);
}

#[tokio::test]
async fn test_soft_delete_marks_inactive() {
    let h = harness();
    let e2 = Identity::entrepreneur("11");
    let (status, body) = h
        .call(Method::DELETE, "/api/v1/whatsapp-instances/w-11", Some(&e2), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["mode"], "soft");

    let stored = h
        .store
        .load_row(ResourceKind::WhatsappInstance, &RowId::new("w-11"))
        .await
        .unwrap()
        .unwrap();
    assert!(!stored.active);
}

#[tokio::test]
async fn test_hard_delete_of_busy_entrepreneur_rejected() {
    let h = harness();
    let admin = Identity::super_admin("1");
    let (status, _) = h
        .call(Method::DELETE, "/api/v1/users/10?hard=true", Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

// ============================================================================
// Role reassignment
// ============================================================================

#[tokio::test]
async fn test_reassign_role() {
    let h = harness();
    let admin = Identity::super_admin("1");
    let (status, body) = h
        .call(
            Method::POST,
            "/api/v1/users/30/role",
            Some(&admin),
            Some(json!({ "role": "collaborator" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["data"]["role"], "collaborator");
    assert_eq!(body["data"]["entrepreneur_id"], "10");

    let e1 = Identity::entrepreneur("10");
    let (status, _) = h
        .call(
            Method::POST,
            "/api/v1/users/20/role",
            Some(&e1),
            Some(json!({ "role": "customer" })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}
