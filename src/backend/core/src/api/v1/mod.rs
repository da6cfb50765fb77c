//! V1 API module for Bizdash.
//!
//! This module contains the stable V1 API endpoints for:
//! - Tenant resources (payment gateways, collaborators, WhatsApp instances)
//! - Price tables
//! - Users and role reassignment
//! - The public price catalogue

pub mod routes;

pub use routes::{v1_router, V1_PREFIX};
