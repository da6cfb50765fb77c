//! Tenant scope resolver.
//!
//! Maps an identity and a resource kind to the rows it can see and the
//! owner stamped onto rows it creates.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::models::{Identity, Ownership, ResourceKind, Role, Row, RowId, UserId};

/// Row visibility predicate.
///
/// Evaluated in memory with [`Visibility::matches`] and translated into a SQL
/// condition by the Postgres store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Visibility {
    /// Every row of the kind.
    All,
    /// Rows whose `entrepreneur_id` equals the tenant.
    Tenant(UserId),
    /// Only the identity's own user record.
    OwnRecord(UserId),
    /// Rows still marked active.
    Active,
    /// Matches nothing.
    Nothing,
}

impl Visibility {
    pub fn matches(&self, row: &Row) -> bool {
        match self {
            Self::All => true,
            Self::Tenant(tenant) => row.entrepreneur_id.as_ref() == Some(tenant),
            Self::OwnRecord(user) => row.id.as_ref() == Some(&RowId::from(user)),
            Self::Active => row.active,
            Self::Nothing => false,
        }
    }

    pub fn is_nothing(&self) -> bool {
        matches!(self, Self::Nothing)
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("all"),
            Self::Tenant(tenant) => write!(f, "tenant={tenant}"),
            Self::OwnRecord(user) => write!(f, "self={user}"),
            Self::Active => f.write_str("active"),
            Self::Nothing => f.write_str("nothing"),
        }
    }
}

/// What `entrepreneur_id` a newly created row receives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OwnerStamp {
    /// Forced to this tenant; caller input is ignored.
    Derived(UserId),
    /// The caller names the owner; it must be an active entrepreneur.
    CallerSupplied,
    /// The kind has no owner and any supplied value is cleared.
    Unowned,
    /// The identity has no tenant to stamp.
    NotApplicable,
}

/// Visibility plus creation owner for one `(identity, kind)` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantScope {
    pub visibility: Visibility,
    pub owner: OwnerStamp,
}

/// Resolve the scope of `identity` over rows of `kind`. Never fails; an
/// identity with no derivable tenant gets [`Visibility::Nothing`].
pub fn scope_for(identity: &Identity, kind: ResourceKind) -> TenantScope {
    let (visibility, owner) = match (kind.ownership(), identity.role()) {
        (Ownership::Tenant, Role::SuperAdmin) => (Visibility::All, OwnerStamp::CallerSupplied),
        (Ownership::Tenant, Role::Entrepreneur) => (
            Visibility::Tenant(identity.id().clone()),
            OwnerStamp::Derived(identity.id().clone()),
        ),
        (Ownership::Tenant, Role::Collaborator | Role::Customer) => (
            identity
                .tenant_id()
                .cloned()
                .map(Visibility::Tenant)
                .unwrap_or(Visibility::Nothing),
            OwnerStamp::NotApplicable,
        ),

        (Ownership::Global, Role::SuperAdmin) => (Visibility::All, OwnerStamp::Unowned),
        (Ownership::Global, _) => (Visibility::Active, OwnerStamp::Unowned),

        (Ownership::Identity, Role::SuperAdmin) => (Visibility::All, OwnerStamp::CallerSupplied),
        (Ownership::Identity, _) => (
            Visibility::OwnRecord(identity.id().clone()),
            OwnerStamp::NotApplicable,
        ),
    };

    TenantScope { visibility, owner }
}

/// Scope for unauthenticated visitors: active price tables, nothing else.
pub fn public_visibility(kind: ResourceKind) -> Visibility {
    match kind {
        ResourceKind::PriceTable => Visibility::Active,
        _ => Visibility::Nothing,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn gateway_of(tenant: &str) -> Row {
        Row::new(ResourceKind::PaymentGateway, json!({}))
            .with_id("g1")
            .with_entrepreneur(tenant)
    }

    #[test]
    fn test_entrepreneur_sees_own_tenant_only() {
        let scope = scope_for(&Identity::entrepreneur("10"), ResourceKind::PaymentGateway);
        assert!(scope.visibility.matches(&gateway_of("10")));
        assert!(!scope.visibility.matches(&gateway_of("11")));
        assert_eq!(scope.owner, OwnerStamp::Derived(UserId::new("10")));
    }

    #[test]
    fn test_member_scoped_to_parent() {
        let scope = scope_for(
            &Identity::collaborator("20", "10"),
            ResourceKind::WhatsappInstance,
        );
        assert_eq!(scope.visibility, Visibility::Tenant(UserId::new("10")));
        assert_eq!(scope.owner, OwnerStamp::NotApplicable);
    }

    #[test]
    fn test_super_admin_supplies_owner() {
        let scope = scope_for(&Identity::super_admin("1"), ResourceKind::Collaborator);
        assert_eq!(scope.visibility, Visibility::All);
        assert_eq!(scope.owner, OwnerStamp::CallerSupplied);
    }

    #[test]
    fn test_unowned_row_invisible_to_tenants() {
        let row = Row::new(ResourceKind::PaymentGateway, json!({})).with_id("g2");
        let scope = scope_for(&Identity::entrepreneur("10"), ResourceKind::PaymentGateway);
        assert!(!scope.visibility.matches(&row));
    }

    #[test]
    fn test_price_tables_active_for_non_admins() {
        let inactive = Row::new(ResourceKind::PriceTable, json!({})).with_active(false);
        let customer = scope_for(&Identity::customer("30", "10"), ResourceKind::PriceTable);
        let admin = scope_for(&Identity::super_admin("1"), ResourceKind::PriceTable);

        assert_eq!(customer.visibility, Visibility::Active);
        assert!(!customer.visibility.matches(&inactive));
        assert!(admin.visibility.matches(&inactive));
        assert_eq!(admin.owner, OwnerStamp::Unowned);
    }

    #[test]
    fn test_users_see_own_record() {
        let scope = scope_for(&Identity::customer("30", "10"), ResourceKind::User);
        let me = Row::new(ResourceKind::User, json!({})).with_id("30");
        let parent = Row::new(ResourceKind::User, json!({})).with_id("10");
        assert!(scope.visibility.matches(&me));
        assert!(!scope.visibility.matches(&parent));
    }

    #[test]
    fn test_public_visibility() {
        assert_eq!(public_visibility(ResourceKind::PriceTable), Visibility::Active);
        assert!(public_visibility(ResourceKind::User).is_nothing());
    }

    #[test]
    fn test_visibility_serde_shape() {
        let value = serde_json::to_value(Visibility::Tenant(UserId::new("10"))).unwrap();
        assert_eq!(value, json!({ "type": "tenant", "value": "10" }));
        assert_eq!(serde_json::to_value(Visibility::All).unwrap(), json!({ "type": "all" }));
    }
}
