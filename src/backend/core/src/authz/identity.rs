//! Identity resolution.
//!
//! Turns the claims a transport extracted from a credential into an
//! [`Identity`], using the stored user record as the source of truth. Every
//! inconsistency fails closed with `Unauthenticated`.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::guard::{is_active_entrepreneur, RowLoader};
use super::models::{Identity, ResourceKind, Role, RowId, UserId};
use crate::error::{BizdashError, Result};

/// Claims as presented by the caller, before any check.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub subject: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub tenant_id: Option<String>,
}

/// Resolve a credential against the user directory.
pub async fn resolve<L>(credential: &Credential, directory: &L) -> Result<Identity>
where
    L: RowLoader + ?Sized,
{
    let subject = credential.subject.trim();
    if subject.is_empty() {
        return Err(BizdashError::unauthenticated("credential has no subject"));
    }

    let claimed_role: Role = credential
        .role
        .as_deref()
        .ok_or_else(|| BizdashError::unauthenticated("credential carries no role"))?
        .parse()
        .map_err(|e| BizdashError::unauthenticated(format!("{e}")))?;

    let record = directory
        .load_row(ResourceKind::User, &RowId::new(subject))
        .await?
        .ok_or_else(|| BizdashError::unauthenticated(format!("unknown subject {subject}")))?;

    if !record.active {
        return Err(BizdashError::unauthenticated(format!("user {subject} is disabled")));
    }

    let stored_role = record
        .user_role()
        .ok_or_else(|| BizdashError::unauthenticated(format!("user {subject} has no valid role")))?;
    if stored_role != claimed_role {
        return Err(BizdashError::unauthenticated(format!(
            "role claim {claimed_role} does not match stored role {stored_role}"
        )));
    }

    let identity = Identity::from_parts(
        UserId::new(subject),
        stored_role,
        record.entrepreneur_id.clone(),
    )
    .map_err(|e| BizdashError::unauthenticated(e.to_string()))?;

    if identity.role().is_tenant_member() {
        if let Some(parent) = identity.tenant_id() {
            if !is_active_entrepreneur(parent, directory).await? {
                return Err(BizdashError::unauthenticated(format!(
                    "tenant {parent} of user {subject} is not an active entrepreneur"
                )));
            }
        }
    }

    if let Some(claimed) = credential.tenant_id.as_deref() {
        if identity.tenant_id().map(UserId::as_str) != Some(claimed) {
            return Err(BizdashError::unauthenticated(format!(
                "tenant claim {claimed} does not match user {subject}"
            )));
        }
    }

    debug!(identity = %identity, "Resolved identity");
    Ok(identity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authz::models::Row;
    use crate::error::ErrorCode;
    use crate::store::MemoryStore;
    use serde_json::json;

    async fn directory() -> MemoryStore {
        let store = MemoryStore::new();
        store.put(Row::new(ResourceKind::User, json!({ "role": "super-admin" })).with_id("1"));
        store.put(Row::new(ResourceKind::User, json!({ "role": "entrepreneur" })).with_id("10"));
        store.put(
            Row::new(ResourceKind::User, json!({ "role": "entrepreneur" }))
                .with_id("11")
                .with_active(false),
        );
        store.put(
            Row::new(ResourceKind::User, json!({ "role": "collaborator" }))
                .with_id("20")
                .with_entrepreneur("10"),
        );
        store.put(
            Row::new(ResourceKind::User, json!({ "role": "customer" }))
                .with_id("31")
                .with_entrepreneur("11"),
        );
        store
    }

    fn credential(subject: &str, role: Option<&str>, tenant: Option<&str>) -> Credential {
        Credential {
            subject: subject.to_string(),
            role: role.map(str::to_string),
            tenant_id: tenant.map(str::to_string),
        }
    }

    async fn code_of(credential: Credential) -> ErrorCode {
        resolve(&credential, &directory().await).await.unwrap_err().code()
    }

    #[tokio::test]
    async fn test_resolves_member_with_tenant() {
        let identity = resolve(&credential("20", Some("collaborator"), Some("10")), &directory().await)
            .await
            .unwrap();
        assert_eq!(identity, Identity::collaborator("20", "10"));
    }

    #[tokio::test]
    async fn test_resolves_entrepreneur_as_own_tenant() {
        let identity = resolve(&credential("10", Some("entrepreneur"), None), &directory().await)
            .await
            .unwrap();
        assert_eq!(identity.tenant_id(), Some(&UserId::new("10")));
    }

    #[tokio::test]
    async fn test_fails_closed() {
        for bad in [
            credential("", Some("collaborator"), None),
            credential("20", None, None),
            credential("20", Some("owner"), None),
            credential("20", Some("entrepreneur"), None),
            credential("20", Some("collaborator"), Some("11")),
            credential("99", Some("customer"), None),
            credential("11", Some("entrepreneur"), None),
            credential("31", Some("customer"), None),
        ] {
            assert_eq!(code_of(bad).await, ErrorCode::Unauthenticated);
        }
    }
}
