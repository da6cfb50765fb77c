//! Authorization facade: the single entry point the application calls.

use metrics::counter;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use super::guard::{MutationGuard, RoleChange, RowLoader};
use super::models::{Identity, Operation, ResourceKind, Row};
use super::policy::RolePolicyTable;
use super::scope::{public_visibility, scope_for, TenantScope, Visibility};
use crate::error::{BizdashError, Result};

// ═══════════════════════════════════════════════════════════════════════════════
// Decision
// ═══════════════════════════════════════════════════════════════════════════════

/// Why a request was refused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "message", rename_all = "snake_case")]
pub enum DenyReason {
    /// No usable identity.
    Unauthenticated,
    /// The role may not perform the operation on this kind at all.
    Forbidden,
    /// Absent or outside the caller's scope. The two are never distinguished.
    NotFound,
    /// Malformed request, e.g. a missing or changed owner.
    InvalidArgument(String),
}

impl DenyReason {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "unauthenticated",
            Self::Forbidden => "forbidden",
            Self::NotFound => "not_found",
            Self::InvalidArgument(_) => "invalid_argument",
        }
    }

    pub fn into_error(self) -> BizdashError {
        match self {
            Self::Unauthenticated => BizdashError::unauthenticated("request carries no identity"),
            Self::Forbidden => BizdashError::forbidden("Operation not permitted for this role"),
            Self::NotFound => BizdashError::not_found(),
            Self::InvalidArgument(message) => BizdashError::invalid_argument(message),
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArgument(message) => write!(f, "invalid_argument: {message}"),
            other => f.write_str(other.as_str()),
        }
    }
}

/// What an allow carries.
#[derive(Debug, Clone, PartialEq)]
pub enum Grant {
    /// Finalized row, ready to persist or return.
    Row(Row),
    /// Predicate the caller applies to its own query.
    Scope(Visibility),
}

/// Result of an authorization check.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Allow(Grant),
    Deny(DenyReason),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow(_))
    }

    pub fn is_denied(&self) -> bool {
        matches!(self, Self::Deny(_))
    }

    pub fn deny_reason(&self) -> Option<&DenyReason> {
        match self {
            Self::Deny(reason) => Some(reason),
            Self::Allow(_) => None,
        }
    }

    fn outcome(&self) -> &'static str {
        match self {
            Self::Allow(_) => "allow",
            Self::Deny(reason) => reason.as_str(),
        }
    }

    pub fn into_result(self) -> Result<Grant> {
        match self {
            Self::Allow(grant) => Ok(grant),
            Self::Deny(reason) => Err(reason.into_error()),
        }
    }

    /// Expect a finalized row.
    pub fn into_row(self) -> Result<Row> {
        match self.into_result()? {
            Grant::Row(row) => Ok(row),
            Grant::Scope(_) => Err(BizdashError::internal("expected a row grant, got a scope")),
        }
    }

    /// Expect a visibility predicate.
    pub fn into_scope(self) -> Result<Visibility> {
        match self.into_result()? {
            Grant::Scope(visibility) => Ok(visibility),
            Grant::Row(_) => Err(BizdashError::internal("expected a scope grant, got a row")),
        }
    }
}

impl From<super::guard::Verdict<Row>> for Decision {
    fn from(verdict: super::guard::Verdict<Row>) -> Self {
        match verdict {
            Ok(row) => Self::Allow(Grant::Row(row)),
            Err(reason) => Self::Deny(reason),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Authorizer
// ═══════════════════════════════════════════════════════════════════════════════

/// Stateless authorization facade.
///
/// Cheap to clone and safe to share; every decision depends only on its
/// arguments and the explicit reads made through the supplied loader.
#[derive(Debug, Clone)]
pub struct Authorizer {
    policy: Arc<RolePolicyTable>,
    guard: MutationGuard,
}

impl Authorizer {
    pub fn new(policy: RolePolicyTable) -> Self {
        let policy = Arc::new(policy);
        Self {
            guard: MutationGuard::new(policy.clone()),
            policy,
        }
    }

    pub fn policy(&self) -> &RolePolicyTable {
        &self.policy
    }

    /// Scope of `identity` over `kind`, for building write conditions.
    pub fn scope(&self, identity: &Identity, kind: ResourceKind) -> TenantScope {
        scope_for(identity, kind)
    }

    /// Decide whether `identity` may perform `operation` on `kind`.
    ///
    /// Reads without a candidate yield the visibility predicate; reads with
    /// one check that row. Mutations run through the guard and yield the row
    /// to persist. `Err` is reserved for storage failures.
    #[instrument(skip_all, fields(role = %identity.role(), kind = %kind, operation = %operation))]
    pub async fn authorize<L>(
        &self,
        identity: &Identity,
        kind: ResourceKind,
        operation: Operation,
        candidate: Option<Row>,
        loader: &L,
    ) -> Result<Decision>
    where
        L: RowLoader + ?Sized,
    {
        let decision = match (operation, candidate) {
            (Operation::Read, candidate) => self.decide_read(identity, kind, candidate.as_ref()),
            (_, _) if !self.policy.permits(identity.role(), kind, operation) => {
                Decision::Deny(DenyReason::Forbidden)
            }
            (_, None) => Decision::Deny(DenyReason::invalid(format!(
                "{operation} requires a candidate row"
            ))),
            (_, Some(row)) => self
                .guard
                .guard(identity, kind, operation, row, loader)
                .await?
                .into(),
        };

        record(identity, kind, operation, &decision);
        Ok(decision)
    }

    /// Read check without storage access.
    pub fn authorize_read(
        &self,
        identity: &Identity,
        kind: ResourceKind,
        candidate: Option<&Row>,
    ) -> Decision {
        let decision = self.decide_read(identity, kind, candidate);
        record(identity, kind, Operation::Read, &decision);
        decision
    }

    /// Decision for visitors without credentials: only active price tables
    /// can be listed.
    pub fn authorize_public(&self, kind: ResourceKind, operation: Operation) -> Decision {
        let visibility = public_visibility(kind);
        let decision = if operation == Operation::Read && !visibility.is_nothing() {
            Decision::Allow(Grant::Scope(visibility))
        } else {
            Decision::Deny(DenyReason::Unauthenticated)
        };

        counter!(
            "bizdash_authz_decisions_total",
            "kind" => kind.as_str(),
            "operation" => operation.as_str(),
            "outcome" => decision.outcome(),
            "role" => "anonymous",
        )
        .increment(1);
        decision
    }

    /// Administrative role change, super-admin only.
    #[instrument(skip_all, fields(role = %identity.role(), target = %change.user_id, new_role = %change.new_role))]
    pub async fn reassign_role<L>(
        &self,
        identity: &Identity,
        change: &RoleChange,
        loader: &L,
    ) -> Result<Decision>
    where
        L: RowLoader + ?Sized,
    {
        let decision: Decision = self.guard.reassign_role(identity, change, loader).await?.into();
        record(identity, ResourceKind::User, Operation::Update, &decision);
        Ok(decision)
    }

    fn decide_read(
        &self,
        identity: &Identity,
        kind: ResourceKind,
        candidate: Option<&Row>,
    ) -> Decision {
        if !self.policy.permits(identity.role(), kind, Operation::Read) {
            return Decision::Deny(DenyReason::Forbidden);
        }

        let visibility = scope_for(identity, kind).visibility;
        match candidate {
            None => Decision::Allow(Grant::Scope(visibility)),
            Some(row) if row.kind == kind && visibility.matches(row) => {
                Decision::Allow(Grant::Row(row.clone()))
            }
            Some(_) => Decision::Deny(DenyReason::NotFound),
        }
    }
}

impl Default for Authorizer {
    fn default() -> Self {
        Self::new(RolePolicyTable::standard())
    }
}

fn record(identity: &Identity, kind: ResourceKind, operation: Operation, decision: &Decision) {
    counter!(
        "bizdash_authz_decisions_total",
        "kind" => kind.as_str(),
        "operation" => operation.as_str(),
        "outcome" => decision.outcome(),
        "role" => identity.role().as_str(),
    )
    .increment(1);

    match decision {
        Decision::Allow(_) => debug!(
            identity = %identity,
            kind = %kind,
            operation = %operation,
            "Authorization granted"
        ),
        Decision::Deny(reason) => warn!(
            identity = %identity,
            kind = %kind,
            operation = %operation,
            reason = %reason,
            "Authorization denied"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authz::models::{RowId, UserId};
    use async_trait::async_trait;
    use serde_json::json;

    struct Empty;

    #[async_trait]
    impl RowLoader for Empty {
        async fn load_row(&self, _kind: ResourceKind, _id: &RowId) -> Result<Option<Row>> {
            Ok(None)
        }

        async fn tenant_has_rows(&self, _tenant: &UserId) -> Result<bool> {
            Ok(false)
        }
    }

    #[tokio::test]
    async fn test_read_without_candidate_returns_scope() {
        let decision = Authorizer::default()
            .authorize(&Identity::entrepreneur("10"), ResourceKind::Collaborator, Operation::Read, None, &Empty)
            .await
            .unwrap();
        assert_eq!(
            decision,
            Decision::Allow(Grant::Scope(Visibility::Tenant(UserId::new("10"))))
        );
    }

    #[tokio::test]
    async fn test_forbidden_precedes_missing_candidate() {
        let decision = Authorizer::default()
            .authorize(&Identity::customer("30", "10"), ResourceKind::Collaborator, Operation::Delete, None, &Empty)
            .await
            .unwrap();
        assert_eq!(decision, Decision::Deny(DenyReason::Forbidden));
    }

    #[tokio::test]
    async fn test_mutation_without_candidate_is_invalid() {
        let decision = Authorizer::default()
            .authorize(&Identity::entrepreneur("10"), ResourceKind::Collaborator, Operation::Update, None, &Empty)
            .await
            .unwrap();
        assert!(matches!(decision, Decision::Deny(DenyReason::InvalidArgument(_))));
    }

    #[test]
    fn test_read_candidate_out_of_scope() {
        let row = Row::new(ResourceKind::WhatsappInstance, json!({}))
            .with_id("w1")
            .with_entrepreneur("11");
        let decision = Authorizer::default().authorize_read(
            &Identity::collaborator("20", "10"),
            ResourceKind::WhatsappInstance,
            Some(&row),
        );
        assert_eq!(decision, Decision::Deny(DenyReason::NotFound));
    }

    #[test]
    fn test_public_access() {
        let authorizer = Authorizer::default();
        assert_eq!(
            authorizer.authorize_public(ResourceKind::PriceTable, Operation::Read),
            Decision::Allow(Grant::Scope(Visibility::Active))
        );
        assert_eq!(
            authorizer.authorize_public(ResourceKind::PriceTable, Operation::Create),
            Decision::Deny(DenyReason::Unauthenticated)
        );
        assert_eq!(
            authorizer.authorize_public(ResourceKind::PaymentGateway, Operation::Read),
            Decision::Deny(DenyReason::Unauthenticated)
        );
    }

    #[test]
    fn test_deny_reason_maps_to_error_codes() {
        use crate::error::ErrorCode;
        assert_eq!(DenyReason::Unauthenticated.into_error().code(), ErrorCode::Unauthenticated);
        assert_eq!(DenyReason::Forbidden.into_error().code(), ErrorCode::Forbidden);
        assert_eq!(DenyReason::NotFound.into_error().code(), ErrorCode::NotFound);
        assert_eq!(DenyReason::invalid("x").into_error().code(), ErrorCode::InvalidArgument);
    }
}
