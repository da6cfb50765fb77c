//! Resource mutation guard.
//!
//! Every create, update and delete passes through [`MutationGuard::guard`]
//! before anything is persisted. The guard only reads from storage; it returns
//! the finalized row and leaves the write to the caller.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use super::facade::DenyReason;
use super::models::{Identity, Operation, Ownership, ResourceKind, Role, Row, RowId, UserId};
use super::policy::RolePolicyTable;
use super::scope::{scope_for, OwnerStamp, TenantScope};
use crate::error::Result;

/// Outcome of a guard step: the value, or the reason it was denied.
pub type Verdict<T> = std::result::Result<T, DenyReason>;

/// Point-in-time reads the guard needs from storage.
#[async_trait]
pub trait RowLoader: Send + Sync {
    /// Load a row by kind and id, regardless of visibility.
    async fn load_row(&self, kind: ResourceKind, id: &RowId) -> Result<Option<Row>>;

    /// Whether any row or member still names `tenant` as its entrepreneur.
    async fn tenant_has_rows(&self, tenant: &UserId) -> Result<bool>;
}

/// Role change requested through the administrative reassignment operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleChange {
    pub user_id: UserId,
    pub new_role: Role,
    pub entrepreneur_id: Option<UserId>,
}

/// Choke point for mutations.
#[derive(Debug, Clone)]
pub struct MutationGuard {
    policy: Arc<RolePolicyTable>,
}

impl MutationGuard {
    pub fn new(policy: Arc<RolePolicyTable>) -> Self {
        Self { policy }
    }

    /// Check a create, update or delete and return the row to persist.
    ///
    /// Denial order: `Forbidden` from the policy table, then `NotFound` for
    /// rows outside scope, then `InvalidArgument` for bad owners.
    pub async fn guard<L>(
        &self,
        identity: &Identity,
        kind: ResourceKind,
        operation: Operation,
        candidate: Row,
        loader: &L,
    ) -> Result<Verdict<Row>>
    where
        L: RowLoader + ?Sized,
    {
        if !self.policy.permits(identity.role(), kind, operation) {
            return Ok(Err(DenyReason::Forbidden));
        }
        if candidate.kind != kind {
            return Ok(Err(DenyReason::invalid(format!(
                "row of kind {} submitted as {}",
                candidate.kind, kind
            ))));
        }

        let scope = scope_for(identity, kind);
        match operation {
            Operation::Read => Ok(Err(DenyReason::invalid("read is not a mutation"))),
            Operation::Create => self.stamp_create(identity, &scope, candidate, loader).await,
            Operation::Update => {
                let existing = match load_visible(&scope, &candidate, loader).await? {
                    Ok(row) => row,
                    Err(reason) => return Ok(Err(reason)),
                };
                Ok(finalize_update(identity, existing, candidate))
            }
            Operation::Delete => load_visible(&scope, &candidate, loader).await,
        }
    }

    /// Validate a role reassignment and return the updated user row.
    pub async fn reassign_role<L>(
        &self,
        identity: &Identity,
        change: &RoleChange,
        loader: &L,
    ) -> Result<Verdict<Row>>
    where
        L: RowLoader + ?Sized,
    {
        if !identity.is_super_admin()
            || !self
                .policy
                .permits(identity.role(), ResourceKind::User, Operation::Update)
        {
            return Ok(Err(DenyReason::Forbidden));
        }

        let Some(existing) = loader
            .load_row(ResourceKind::User, &RowId::from(&change.user_id))
            .await?
        else {
            return Ok(Err(DenyReason::NotFound));
        };
        let Some(current_role) = existing.user_role() else {
            return Ok(Err(DenyReason::invalid("stored user has no recognised role")));
        };

        if current_role == Role::Entrepreneur
            && change.new_role != Role::Entrepreneur
            && loader.tenant_has_rows(&change.user_id).await?
        {
            return Ok(Err(DenyReason::invalid(
                "entrepreneur still owns tenant rows or members",
            )));
        }

        // A promoted member keeps its former parent, so demoting it later
        // cannot land it in a different tenant.
        let origin = existing
            .entrepreneur_id
            .clone()
            .or_else(|| existing.former_entrepreneur());

        let parent = if change.new_role.is_tenant_member() {
            let Some(parent) = change.entrepreneur_id.clone().or_else(|| origin.clone()) else {
                return Ok(Err(DenyReason::invalid(format!(
                    "{} users must belong to an entrepreneur",
                    change.new_role
                ))));
            };
            if origin.as_ref().is_some_and(|origin| origin != &parent) {
                return Ok(Err(DenyReason::invalid(
                    "members cannot be moved to another entrepreneur",
                )));
            }
            if parent == change.user_id || !is_active_entrepreneur(&parent, loader).await? {
                return Ok(Err(DenyReason::invalid(
                    "entrepreneur_id must reference an active entrepreneur",
                )));
            }
            Some(parent)
        } else {
            None
        };

        let mut row = existing;
        row.set_user_role(change.new_role);
        row.set_former_entrepreneur(if parent.is_none() { origin.as_ref() } else { None });
        row.entrepreneur_id = parent;

        debug!(
            user_id = %change.user_id,
            from = %current_role,
            to = %change.new_role,
            "Role reassignment validated"
        );
        Ok(Ok(row))
    }

    async fn stamp_create<L>(
        &self,
        identity: &Identity,
        scope: &TenantScope,
        candidate: Row,
        loader: &L,
    ) -> Result<Verdict<Row>>
    where
        L: RowLoader + ?Sized,
    {
        let mut row = candidate;
        row.created_by = Some(identity.id().clone());
        row.created_at = None;
        row.updated_at = None;

        // Only user ids are chosen by the caller. Anything else would let a
        // create probe for ids held by other tenants.
        if row.kind.ownership() != Ownership::Identity {
            row.id = None;
        }

        match row.kind.ownership() {
            Ownership::Tenant => match &scope.owner {
                OwnerStamp::Derived(owner) => {
                    if row.entrepreneur_id.as_ref().is_some_and(|s| s != owner) {
                        debug!(
                            identity = %identity,
                            kind = %row.kind,
                            "Ignoring caller-supplied owner on create"
                        );
                    }
                    row.entrepreneur_id = Some(owner.clone());
                }
                OwnerStamp::CallerSupplied => {
                    let Some(owner) = row.entrepreneur_id.clone() else {
                        return Ok(Err(DenyReason::invalid(
                            "entrepreneur_id is required when creating for a tenant",
                        )));
                    };
                    if !is_active_entrepreneur(&owner, loader).await? {
                        return Ok(Err(DenyReason::invalid(
                            "entrepreneur_id must reference an active entrepreneur",
                        )));
                    }
                }
                OwnerStamp::Unowned | OwnerStamp::NotApplicable => {
                    return Ok(Err(DenyReason::invalid("identity has no tenant to own new rows")));
                }
            },
            Ownership::Global => row.entrepreneur_id = None,
            Ownership::Identity => {
                if scope.owner != OwnerStamp::CallerSupplied {
                    return Ok(Err(DenyReason::invalid("identity cannot register users")));
                }
                if let Err(reason) = check_user_shape(&row, loader).await? {
                    return Ok(Err(reason));
                }
                row.set_former_entrepreneur(None);
            }
        }

        Ok(Ok(row))
    }
}

/// Load the row named by the candidate and keep it only if it is in scope.
async fn load_visible<L>(scope: &TenantScope, candidate: &Row, loader: &L) -> Result<Verdict<Row>>
where
    L: RowLoader + ?Sized,
{
    let Some(id) = candidate.id.as_ref() else {
        return Ok(Err(DenyReason::invalid("row id is required")));
    };

    match loader.load_row(candidate.kind, id).await? {
        Some(existing) if scope.visibility.matches(&existing) => Ok(Ok(existing)),
        _ => Ok(Err(DenyReason::NotFound)),
    }
}

/// Merge a candidate update onto the stored row.
///
/// Owner, identity and audit columns always come from storage. An absent
/// `entrepreneur_id` means "unchanged"; a different one is rejected for every
/// role, super-admin included.
fn finalize_update(identity: &Identity, existing: Row, candidate: Row) -> Verdict<Row> {
    if let Some(requested) = &candidate.entrepreneur_id {
        if existing.entrepreneur_id.as_ref() != Some(requested) {
            return Err(DenyReason::invalid("entrepreneur_id cannot be changed"));
        }
    }

    let mut row = candidate;
    row.id = existing.id.clone();
    row.entrepreneur_id = existing.entrepreneur_id.clone();
    row.created_by = existing.created_by.clone();
    row.created_at = existing.created_at;
    row.updated_at = existing.updated_at;

    if row.kind == ResourceKind::User {
        let stored = existing.user_role();
        match row.user_role() {
            Some(requested) if Some(requested) != stored => {
                return Err(DenyReason::invalid(
                    "role changes go through role reassignment",
                ));
            }
            Some(_) => {}
            None if row.data.get("role").is_some() => {
                return Err(DenyReason::invalid("unknown role"));
            }
            None => {
                if let Some(role) = stored {
                    row.set_user_role(role);
                }
            }
        }
        row.set_former_entrepreneur(existing.former_entrepreneur().as_ref());
        if !identity.is_super_admin() {
            row.active = existing.active;
        }
    }

    Ok(row)
}

/// Collaborator and customer users need an active entrepreneur parent; other
/// roles must have none.
async fn check_user_shape<L>(row: &Row, loader: &L) -> Result<Verdict<()>>
where
    L: RowLoader + ?Sized,
{
    let Some(role) = row.user_role() else {
        return Ok(Err(DenyReason::invalid("user role is missing or unknown")));
    };

    match (role.is_tenant_member(), &row.entrepreneur_id) {
        (false, None) => Ok(Ok(())),
        (false, Some(_)) => Ok(Err(DenyReason::invalid(format!(
            "{role} users cannot belong to an entrepreneur"
        )))),
        (true, None) => Ok(Err(DenyReason::invalid(format!(
            "{role} users must belong to an entrepreneur"
        )))),
        (true, Some(parent)) => {
            if row.id.as_ref() == Some(&RowId::from(parent)) {
                return Ok(Err(DenyReason::invalid("user cannot be its own entrepreneur")));
            }
            if is_active_entrepreneur(parent, loader).await? {
                Ok(Ok(()))
            } else {
                Ok(Err(DenyReason::invalid(
                    "entrepreneur_id must reference an active entrepreneur",
                )))
            }
        }
    }
}

pub(crate) async fn is_active_entrepreneur<L>(id: &UserId, loader: &L) -> Result<bool>
where
    L: RowLoader + ?Sized,
{
    let row = loader.load_row(ResourceKind::User, &RowId::from(id)).await?;
    Ok(row.is_some_and(|r| r.active && r.user_role() == Some(Role::Entrepreneur)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    #[derive(Default)]
    struct Fixture {
        rows: HashMap<(ResourceKind, RowId), Row>,
    }

    impl Fixture {
        fn with(mut self, row: Row) -> Self {
            let id = row.id.clone().unwrap();
            self.rows.insert((row.kind, id), row);
            self
        }
    }

    #[async_trait]
    impl RowLoader for Fixture {
        async fn load_row(&self, kind: ResourceKind, id: &RowId) -> Result<Option<Row>> {
            Ok(self.rows.get(&(kind, id.clone())).cloned())
        }

        async fn tenant_has_rows(&self, tenant: &UserId) -> Result<bool> {
            Ok(self
                .rows
                .values()
                .any(|r| r.entrepreneur_id.as_ref() == Some(tenant)))
        }
    }

    fn user(id: &str, role: Role) -> Row {
        Row::new(ResourceKind::User, json!({ "role": role.as_str() })).with_id(id)
    }

    fn fixture() -> Fixture {
        Fixture::default()
            .with(user("10", Role::Entrepreneur))
            .with(user("11", Role::Entrepreneur))
            .with(user("20", Role::Collaborator).with_entrepreneur("10"))
            .with(
                Row::new(ResourceKind::PaymentGateway, json!({ "name": "Stripe" }))
                    .with_id("g1")
                    .with_entrepreneur("10")
                    .with_created_by("10"),
            )
    }

    fn guard() -> MutationGuard {
        MutationGuard::new(Arc::new(RolePolicyTable::standard()))
    }

    #[tokio::test]
    async fn test_create_stamps_creator_tenant() {
        let candidate = Row::new(ResourceKind::PaymentGateway, json!({})).with_entrepreneur("99");
        let row = guard()
            .guard(&Identity::entrepreneur("10"), ResourceKind::PaymentGateway, Operation::Create, candidate, &fixture())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.entrepreneur_id, Some(UserId::new("10")));
        assert_eq!(row.created_by, Some(UserId::new("10")));
    }

    #[tokio::test]
    async fn test_super_admin_create_requires_entrepreneur_owner() {
        let admin = Identity::super_admin("1");
        let missing = Row::new(ResourceKind::Collaborator, json!({}));
        let not_entrepreneur = Row::new(ResourceKind::Collaborator, json!({})).with_entrepreneur("20");
        let valid = Row::new(ResourceKind::Collaborator, json!({})).with_entrepreneur("11");

        for (candidate, ok) in [(missing, false), (not_entrepreneur, false), (valid, true)] {
            let verdict = guard()
                .guard(&admin, ResourceKind::Collaborator, Operation::Create, candidate, &fixture())
                .await
                .unwrap();
            assert_eq!(verdict.is_ok(), ok);
        }
    }

    #[tokio::test]
    async fn test_update_cross_tenant_is_not_found() {
        let candidate = Row::new(ResourceKind::PaymentGateway, json!({})).with_id("g1");
        let verdict = guard()
            .guard(&Identity::entrepreneur("11"), ResourceKind::PaymentGateway, Operation::Update, candidate, &fixture())
            .await
            .unwrap();
        assert_eq!(verdict, Err(DenyReason::NotFound));
    }

    #[tokio::test]
    async fn test_update_preserves_audit_columns() {
        let candidate = Row::new(ResourceKind::PaymentGateway, json!({ "name": "Asaas" }))
            .with_id("g1")
            .with_created_by("666");
        let row = guard()
            .guard(&Identity::entrepreneur("10"), ResourceKind::PaymentGateway, Operation::Update, candidate, &fixture())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.created_by, Some(UserId::new("10")));
        assert_eq!(row.entrepreneur_id, Some(UserId::new("10")));
        assert_eq!(row.data["name"], "Asaas");
    }

    #[tokio::test]
    async fn test_self_update_cannot_change_role() {
        let candidate = Row::new(ResourceKind::User, json!({ "role": "entrepreneur" })).with_id("20");
        let verdict = guard()
            .guard(&Identity::collaborator("20", "10"), ResourceKind::User, Operation::Update, candidate, &fixture())
            .await
            .unwrap();
        assert!(matches!(verdict, Err(DenyReason::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_self_update_keeps_role_when_omitted() {
        let candidate = Row::new(ResourceKind::User, json!({ "name": "Ana" }))
            .with_id("20")
            .with_active(false);
        let row = guard()
            .guard(&Identity::collaborator("20", "10"), ResourceKind::User, Operation::Update, candidate, &fixture())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.user_role(), Some(Role::Collaborator));
        assert!(row.active);
    }

    #[tokio::test]
    async fn test_user_create_shape() {
        let admin = Identity::super_admin("1");
        let orphan = user("30", Role::Customer);
        let adopted = user("31", Role::Customer).with_entrepreneur("10");
        let parented_entrepreneur = user("32", Role::Entrepreneur).with_entrepreneur("10");

        for (candidate, ok) in [(orphan, false), (adopted, true), (parented_entrepreneur, false)] {
            let verdict = guard()
                .guard(&admin, ResourceKind::User, Operation::Create, candidate, &fixture())
                .await
                .unwrap();
            assert_eq!(verdict.is_ok(), ok);
        }
    }

    #[tokio::test]
    async fn test_reassign_blocks_demoting_owner() {
        let change = RoleChange {
            user_id: UserId::new("10"),
            new_role: Role::Customer,
            entrepreneur_id: Some(UserId::new("11")),
        };
        let verdict = guard()
            .reassign_role(&Identity::super_admin("1"), &change, &fixture())
            .await
            .unwrap();
        assert!(matches!(verdict, Err(DenyReason::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_reassign_member_keeps_parent() {
        let admin = Identity::super_admin("1");
        let same_parent = RoleChange {
            user_id: UserId::new("20"),
            new_role: Role::Customer,
            entrepreneur_id: None,
        };
        let row = guard()
            .reassign_role(&admin, &same_parent, &fixture())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.user_role(), Some(Role::Customer));
        assert_eq!(row.entrepreneur_id, Some(UserId::new("10")));

        let moved = RoleChange {
            entrepreneur_id: Some(UserId::new("11")),
            ..same_parent
        };
        let verdict = guard().reassign_role(&admin, &moved, &fixture()).await.unwrap();
        assert!(matches!(verdict, Err(DenyReason::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_reassign_requires_super_admin() {
        let change = RoleChange {
            user_id: UserId::new("20"),
            new_role: Role::Entrepreneur,
            entrepreneur_id: None,
        };
        let verdict = guard()
            .reassign_role(&Identity::entrepreneur("10"), &change, &fixture())
            .await
            .unwrap();
        assert_eq!(verdict, Err(DenyReason::Forbidden));
    }
}
