//! Row storage.
//!
//! The authorization core only reads through [`RowLoader`]; everything that
//! writes goes through [`RowStore`], whose update and delete re-check the
//! caller's visibility and the row's owner in the same operation as the
//! write. A row that moved out of scope between the check and the write is
//! left untouched and reported as not affected.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::authz::{ResourceKind, Role, Row, RowId, RowLoader, UserId, Visibility};
use crate::error::Result;

/// Default page size for listings.
pub const DEFAULT_PAGE_LIMIT: u32 = 50;
/// Largest page a caller may request.
pub const MAX_PAGE_LIMIT: u32 = 200;

/// Limit/offset paging, clamped to `1..=MAX_PAGE_LIMIT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub limit: u32,
    pub offset: u32,
}

impl Page {
    pub fn new(limit: Option<u32>, offset: Option<u32>) -> Self {
        Self {
            limit: limit.unwrap_or(DEFAULT_PAGE_LIMIT).clamp(1, MAX_PAGE_LIMIT),
            offset: offset.unwrap_or(0),
        }
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(None, None)
    }
}

/// How a delete is carried out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteMode {
    /// Keep the row and mark it inactive.
    #[default]
    Soft,
    /// Remove the row.
    Hard,
}

/// Condition every write must still satisfy when it is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteCondition {
    /// The caller's visibility predicate.
    pub visibility: Visibility,
    /// The owner the row had when it was checked.
    pub expected_owner: Option<UserId>,
}

impl WriteCondition {
    pub fn new(visibility: Visibility, expected_owner: Option<UserId>) -> Self {
        Self {
            visibility,
            expected_owner,
        }
    }

    /// Whether a stored row still satisfies the condition.
    pub fn holds_for(&self, row: &Row) -> bool {
        self.visibility.matches(row) && row.entrepreneur_id == self.expected_owner
    }
}

/// Result of a delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    /// No row matched the condition.
    NotFound,
    /// Removing the row would orphan rows or members of its tenant.
    Restricted,
}

/// Persistence for resource rows.
#[async_trait]
pub trait RowStore: RowLoader {
    /// Rows of `kind` matching `visibility`, oldest first.
    async fn list(&self, kind: ResourceKind, visibility: &Visibility, page: Page) -> Result<Vec<Row>>;

    /// Insert a finalized row; assigns an id when missing and sets timestamps.
    async fn insert(&self, row: Row) -> Result<Row>;

    /// Replace a row if `condition` still holds for the stored version.
    /// Returns `None` when nothing matched.
    async fn update(&self, row: Row, condition: &WriteCondition) -> Result<Option<Row>>;

    /// Delete a row if `condition` still holds for the stored version.
    async fn delete(
        &self,
        kind: ResourceKind,
        id: &RowId,
        condition: &WriteCondition,
        mode: DeleteMode,
    ) -> Result<DeleteOutcome>;
}

/// Make sure a super-admin user exists so a fresh deployment can be managed.
pub async fn bootstrap_super_admin<S>(store: &S, id: &UserId, email: &str) -> Result<()>
where
    S: RowStore + ?Sized,
{
    if store
        .load_row(ResourceKind::User, &RowId::from(id))
        .await?
        .is_some()
    {
        return Ok(());
    }

    let row = Row::new(
        ResourceKind::User,
        json!({ "email": email, "role": Role::SuperAdmin.as_str() }),
    )
    .with_id(RowId::from(id))
    .with_created_by(id.clone());
    store.insert(row).await?;

    info!(user_id = %id, "Bootstrapped super-admin user");
    Ok(())
}
