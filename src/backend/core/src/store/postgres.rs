//! PostgreSQL row store.
//!
//! All kinds share one `resource_rows` table; the kind-specific payload is a
//! JSONB column. Visibility predicates become SQL conditions, so update and
//! delete re-check scope inside the same statement as the write.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, PgPool, Postgres, QueryBuilder};
use std::time::Duration;
use tracing::{debug, info};

use super::{DeleteMode, DeleteOutcome, Page, RowStore, WriteCondition};
use crate::authz::{ResourceKind, Row, RowId, RowLoader, UserId, Visibility};
use crate::config::StorageConfig;
use crate::error::{BizdashError, Result};

const COLUMNS: &str =
    "id, kind, entrepreneur_id, created_by, active, data, created_at, updated_at";

#[derive(Debug, sqlx::FromRow)]
struct ResourceRecord {
    id: String,
    kind: String,
    entrepreneur_id: Option<String>,
    created_by: Option<String>,
    active: bool,
    data: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ResourceRecord> for Row {
    type Error = BizdashError;

    fn try_from(record: ResourceRecord) -> Result<Self> {
        let kind = record.kind.parse::<ResourceKind>().map_err(|e| {
            BizdashError::internal(format!("corrupt row {}: {}", record.id, e))
        })?;

        Ok(Row {
            id: Some(RowId(record.id)),
            kind,
            entrepreneur_id: record.entrepreneur_id.map(UserId),
            created_by: record.created_by.map(UserId),
            active: record.active,
            data: record.data,
            created_at: Some(record.created_at),
            updated_at: Some(record.updated_at),
        })
    }
}

/// Append ` AND <predicate>` for a visibility.
fn push_visibility(query: &mut QueryBuilder<'_, Postgres>, visibility: &Visibility) {
    match visibility {
        Visibility::All => {}
        Visibility::Tenant(tenant) => {
            query.push(" AND entrepreneur_id = ").push_bind(tenant.0.clone());
        }
        Visibility::OwnRecord(user) => {
            query.push(" AND id = ").push_bind(user.0.clone());
        }
        Visibility::Active => {
            query.push(" AND active");
        }
        Visibility::Nothing => {
            query.push(" AND FALSE");
        }
    }
}

/// Append the full write condition: visibility plus unchanged owner.
fn push_condition(query: &mut QueryBuilder<'_, Postgres>, condition: &WriteCondition) {
    push_visibility(query, &condition.visibility);
    query
        .push(" AND entrepreneur_id IS NOT DISTINCT FROM ")
        .push_bind(condition.expected_owner.as_ref().map(|o| o.0.clone()));
}

/// Row store over a PostgreSQL pool.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Open a connection pool.
    pub async fn connect(config: &StorageConfig) -> Result<Self> {
        let url = config
            .url
            .as_deref()
            .ok_or_else(|| BizdashError::configuration("storage.url is required for postgres"))?;

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect(url)
            .await?;

        info!(
            max_connections = config.max_connections,
            "Connected to PostgreSQL"
        );
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run embedded migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl RowLoader for PostgresStore {
    async fn load_row(&self, kind: ResourceKind, id: &RowId) -> Result<Option<Row>> {
        let record: Option<ResourceRecord> = sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM resource_rows WHERE kind = $1 AND id = $2"
        ))
        .bind(kind.as_str())
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        record.map(Row::try_from).transpose()
    }

    async fn tenant_has_rows(&self, tenant: &UserId) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (SELECT 1 FROM resource_rows WHERE entrepreneur_id = $1)
            "#,
        )
        .bind(tenant.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }
}

#[async_trait]
impl RowStore for PostgresStore {
    async fn list(&self, kind: ResourceKind, visibility: &Visibility, page: Page) -> Result<Vec<Row>> {
        let mut query = QueryBuilder::<Postgres>::new(format!(
            "SELECT {COLUMNS} FROM resource_rows WHERE kind = "
        ));
        query.push_bind(kind.as_str());
        push_visibility(&mut query, visibility);
        query
            .push(" ORDER BY created_at, id LIMIT ")
            .push_bind(i64::from(page.limit))
            .push(" OFFSET ")
            .push_bind(i64::from(page.offset));

        let records: Vec<ResourceRecord> = query.build_query_as().fetch_all(&self.pool).await?;
        records.into_iter().map(Row::try_from).collect()
    }

    async fn insert(&self, mut row: Row) -> Result<Row> {
        let id = row.id.get_or_insert_with(RowId::generate).clone();

        let record: ResourceRecord = sqlx::query_as(&format!(
            r#"
            INSERT INTO resource_rows (id, kind, entrepreneur_id, created_by, active, data)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {COLUMNS}
            "#
        ))
        .bind(id.as_str())
        .bind(row.kind.as_str())
        .bind(row.entrepreneur_id.as_ref().map(UserId::as_str))
        .bind(row.created_by.as_ref().map(UserId::as_str))
        .bind(row.active)
        .bind(&row.data)
        .fetch_one(&self.pool)
        .await?;

        debug!(kind = %row.kind, id = %id, "Inserted row");
        record.try_into()
    }

    async fn update(&self, row: Row, condition: &WriteCondition) -> Result<Option<Row>> {
        let Some(id) = row.id.as_ref() else {
            return Err(BizdashError::invalid_argument("row id is required"));
        };

        let mut query = QueryBuilder::<Postgres>::new("UPDATE resource_rows SET entrepreneur_id = ");
        query
            .push_bind(row.entrepreneur_id.as_ref().map(|o| o.0.clone()))
            .push(", active = ")
            .push_bind(row.active)
            .push(", data = ")
            .push_bind(row.data.clone())
            .push(", updated_at = NOW() WHERE kind = ")
            .push_bind(row.kind.as_str())
            .push(" AND id = ")
            .push_bind(id.0.clone());
        push_condition(&mut query, condition);
        query.push(format!(" RETURNING {COLUMNS}"));

        let record: Option<ResourceRecord> =
            query.build_query_as().fetch_optional(&self.pool).await?;
        record.map(Row::try_from).transpose()
    }

    async fn delete(
        &self,
        kind: ResourceKind,
        id: &RowId,
        condition: &WriteCondition,
        mode: DeleteMode,
    ) -> Result<DeleteOutcome> {
        let mut query = match mode {
            DeleteMode::Soft => QueryBuilder::<Postgres>::new(
                "UPDATE resource_rows SET active = FALSE, updated_at = NOW() WHERE kind = ",
            ),
            DeleteMode::Hard => QueryBuilder::<Postgres>::new("DELETE FROM resource_rows WHERE kind = "),
        };
        query
            .push_bind(kind.as_str())
            .push(" AND id = ")
            .push_bind(id.0.clone());
        push_condition(&mut query, condition);

        if mode == DeleteMode::Hard && kind == ResourceKind::User {
            query
                .push(" AND NOT EXISTS (SELECT 1 FROM resource_rows r WHERE r.entrepreneur_id = ")
                .push_bind(id.0.clone())
                .push(")");
        }

        let affected = query.build().execute(&self.pool).await?.rows_affected();
        if affected > 0 {
            return Ok(DeleteOutcome::Deleted);
        }

        if mode == DeleteMode::Hard
            && kind == ResourceKind::User
            && self.tenant_has_rows(&UserId::from(id)).await?
        {
            return Ok(DeleteOutcome::Restricted);
        }
        Ok(DeleteOutcome::NotFound)
    }
}
