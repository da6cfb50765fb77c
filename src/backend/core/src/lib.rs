#![allow(clippy::result_large_err)]
//! # Bizdash Core
//!
//! Tenant scoping and authorization for the Bizdash multi-tenant admin dashboard.
//!
//! ## Architecture
//!
//! - **Authz**: Role policy table, scope resolver, mutation guard and the `authorize` facade
//! - **Store**: Row persistence with write-time re-checks (in-memory and PostgreSQL)
//! - **Domain**: Typed payloads for each resource kind
//! - **Navigation**: Dashboard sections per role
//! - **Middleware**: JWT authentication feeding identity resolution
//! - **API**: Thin REST wrappers over the facade
//! - **Observability**: Structured logging, tracing and Prometheus metrics

pub mod api;
pub mod authz;
pub mod config;
pub mod domain;
pub mod error;
pub mod middleware;
pub mod navigation;
pub mod observability;
pub mod store;

pub use error::{BizdashError, ErrorCode, ErrorContext, ErrorDetails, ErrorSeverity, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::authz::{
        Authorizer, Decision, DenyReason, Grant, Identity, Operation, OwnerStamp, ResourceKind,
        Role, RoleChange, RolePolicyTable, Row, RowId, RowLoader, TenantScope, UserId, Visibility,
    };
    pub use crate::error::{BizdashError, ErrorCode, ErrorContext, ErrorDetails, ErrorSeverity, Result};
    pub use crate::middleware::{AuthConfig, AuthContext, AuthError, AuthLayer, Authenticator, Claims};
    pub use crate::navigation::{capabilities, Capability};
    pub use crate::store::{DeleteMode, DeleteOutcome, MemoryStore, Page, PostgresStore, RowStore};
}
