//! Tenant scoping and authorization.
//!
//! This module provides:
//! - **Models**: identities, roles, resource kinds, operations and rows
//! - **Policy Table**: static `(role, kind) -> operations` grants
//! - **Scope Resolver**: the rows an identity sees and the owner it stamps
//! - **Mutation Guard**: the single choke point for create, update and delete
//! - **Facade**: `authorize(identity, kind, operation, candidate)`
//! - **Identity Resolution**: claims to identity, checked against stored users
//!
//! # Usage
//!
//! ```rust,ignore
//! use bizdash_core::authz::{Authorizer, Identity, Operation, ResourceKind, Row};
//!
//! let authorizer = Authorizer::default();
//! let decision = authorizer
//!     .authorize(&identity, ResourceKind::PaymentGateway, Operation::Create, Some(row), &store)
//!     .await?;
//! let row = decision.into_row()?;
//! ```

pub mod facade;
pub mod guard;
pub mod identity;
pub mod middleware;
pub mod models;
pub mod policy;
pub mod scope;

pub use facade::{Authorizer, Decision, DenyReason, Grant};
pub use guard::{MutationGuard, RoleChange, RowLoader, Verdict};
pub use identity::{resolve, Credential};
pub use middleware::{CurrentIdentity, IdentityLayer, IdentityService};
pub use models::{
    Identity, IdentityShapeError, Operation, Ownership, ParseEnumError, ResourceKind, Role, Row,
    RowId, UserId,
};
pub use policy::{OperationSet, PolicyError, PolicyRule, RolePolicyTable};
pub use scope::{public_visibility, scope_for, OwnerStamp, TenantScope, Visibility};
