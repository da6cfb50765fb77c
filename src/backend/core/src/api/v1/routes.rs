//! V1 API routes for Bizdash.
//!
//! This module defines all V1 API routes and their handlers.

use axum::{
    routing::{get, post},
    Extension, Router,
};

use crate::api::{handlers, AppState};
use crate::authz::ResourceKind;

/// V1 API prefix.
pub const V1_PREFIX: &str = "/api/v1";

/// Build the V1 API router.
///
/// All routes are mounted under `/api/v1/`.
///
/// # Endpoints
///
/// ## Resources
/// For each of `payment-gateways`, `collaborators`, `whatsapp-instances`,
/// `price-tables` and `users`:
/// - `GET /` - List rows visible to the caller
/// - `POST /` - Create a row
/// - `GET /:id` - Get a visible row
/// - `PUT /:id` - Update a visible row
/// - `DELETE /:id?hard=true|false` - Soft or hard delete
///
/// ## Users
/// - `POST /api/v1/users/:id/role` - Reassign a user's role
///
/// ## Session
/// - `GET /api/v1/me` - Current identity and dashboard sections
///
/// ## Public
/// - `GET /api/v1/public/price-tables` - Active price tables, no credentials
pub fn v1_router() -> Router<AppState> {
    Router::new()
        .route("/me", get(handlers::me))
        .nest(
            "/payment-gateways",
            resource_router(ResourceKind::PaymentGateway),
        )
        .nest("/collaborators", resource_router(ResourceKind::Collaborator))
        .nest(
            "/whatsapp-instances",
            resource_router(ResourceKind::WhatsappInstance),
        )
        .nest("/price-tables", resource_router(ResourceKind::PriceTable))
        .nest(
            "/users",
            resource_router(ResourceKind::User).route("/:id/role", post(handlers::reassign_role)),
        )
        .route("/public/price-tables", get(handlers::public_price_tables))
}

/// CRUD routes for one resource kind; handlers read the kind from an extension.
fn resource_router(kind: ResourceKind) -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_rows).post(handlers::create_row))
        .route(
            "/:id",
            get(handlers::get_row)
                .put(handlers::update_row)
                .delete(handlers::delete_row),
        )
        .layer(Extension(kind))
}

/// V1 API route constants for use in clients and documentation.
pub mod paths {
    pub const ME: &str = "/api/v1/me";

    pub const PAYMENT_GATEWAYS: &str = "/api/v1/payment-gateways";
    pub const COLLABORATORS: &str = "/api/v1/collaborators";
    pub const WHATSAPP_INSTANCES: &str = "/api/v1/whatsapp-instances";
    pub const PRICE_TABLES: &str = "/api/v1/price-tables";
    pub const USERS: &str = "/api/v1/users";
    pub const USER_ROLE: &str = "/api/v1/users/:id/role";

    pub const PUBLIC_PRICE_TABLES: &str = "/api/v1/public/price-tables";
}
