//! In-memory row store backed by `DashMap`.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

use super::{DeleteMode, DeleteOutcome, Page, RowStore, WriteCondition};
use crate::authz::{ResourceKind, Row, RowId, RowLoader, UserId, Visibility};
use crate::error::{BizdashError, ErrorCode, Result};

/// Thread-safe store for tests and single-node development.
///
/// Conditional writes run while holding the entry's shard lock, so the check
/// and the write are one step.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    rows: Arc<DashMap<(ResourceKind, RowId), Row>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a row as-is, bypassing the guard. For seeding and tests.
    ///
    /// Rows without an id get a generated one.
    pub fn put(&self, mut row: Row) -> RowId {
        let id = row.id.get_or_insert_with(RowId::generate).clone();
        let now = Utc::now();
        row.created_at.get_or_insert(now);
        row.updated_at.get_or_insert(now);
        self.rows.insert((row.kind, id.clone()), row);
        id
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[async_trait]
impl RowLoader for MemoryStore {
    async fn load_row(&self, kind: ResourceKind, id: &RowId) -> Result<Option<Row>> {
        Ok(self.rows.get(&(kind, id.clone())).map(|r| r.value().clone()))
    }

    async fn tenant_has_rows(&self, tenant: &UserId) -> Result<bool> {
        Ok(self
            .rows
            .iter()
            .any(|r| r.value().entrepreneur_id.as_ref() == Some(tenant)))
    }
}

#[async_trait]
impl RowStore for MemoryStore {
    async fn list(&self, kind: ResourceKind, visibility: &Visibility, page: Page) -> Result<Vec<Row>> {
        let mut rows: Vec<Row> = self
            .rows
            .iter()
            .filter(|r| r.key().0 == kind && visibility.matches(r.value()))
            .map(|r| r.value().clone())
            .collect();

        rows.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));

        Ok(rows
            .into_iter()
            .skip(page.offset as usize)
            .take(page.limit as usize)
            .collect())
    }

    async fn insert(&self, mut row: Row) -> Result<Row> {
        let id = row.id.get_or_insert_with(RowId::generate).clone();
        let now = Utc::now();
        row.created_at = Some(now);
        row.updated_at = Some(now);

        match self.rows.entry((row.kind, id.clone())) {
            Entry::Occupied(_) => Err(BizdashError::with_internal(
                ErrorCode::DuplicateRecord,
                "A record with this identifier already exists",
                format!("{} {} already exists", row.kind, id),
            )),
            Entry::Vacant(slot) => {
                slot.insert(row.clone());
                debug!(kind = %row.kind, id = %id, "Inserted row");
                Ok(row)
            }
        }
    }

    async fn update(&self, mut row: Row, condition: &WriteCondition) -> Result<Option<Row>> {
        let Some(id) = row.id.clone() else {
            return Err(BizdashError::invalid_argument("row id is required"));
        };

        let Some(mut stored) = self.rows.get_mut(&(row.kind, id)) else {
            return Ok(None);
        };
        if !condition.holds_for(stored.value()) {
            return Ok(None);
        }

        row.created_at = stored.created_at;
        row.updated_at = Some(Utc::now());
        *stored = row.clone();
        Ok(Some(row))
    }

    async fn delete(
        &self,
        kind: ResourceKind,
        id: &RowId,
        condition: &WriteCondition,
        mode: DeleteMode,
    ) -> Result<DeleteOutcome> {
        let key = (kind, id.clone());

        match mode {
            DeleteMode::Soft => {
                let Some(mut stored) = self.rows.get_mut(&key) else {
                    return Ok(DeleteOutcome::NotFound);
                };
                if !condition.holds_for(stored.value()) {
                    return Ok(DeleteOutcome::NotFound);
                }
                stored.active = false;
                stored.updated_at = Some(Utc::now());
                Ok(DeleteOutcome::Deleted)
            }
            DeleteMode::Hard => {
                if kind == ResourceKind::User && self.tenant_has_rows(&UserId::from(id)).await? {
                    return Ok(DeleteOutcome::Restricted);
                }
                let removed = self.rows.remove_if(&key, |_, stored| condition.holds_for(stored));
                Ok(if removed.is_some() {
                    DeleteOutcome::Deleted
                } else {
                    DeleteOutcome::NotFound
                })
            }
        }
    }
}
