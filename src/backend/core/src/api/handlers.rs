//! API request handlers with proper error propagation.
//!
//! All handlers return `Result<impl IntoResponse, BizdashError>`. Denials
//! from the authorizer become errors through [`Decision::into_row`] and
//! [`Decision::into_scope`], so a handler never touches the store with a
//! row the guard has not finalized.
//!
//! [`Decision::into_row`]: crate::authz::Decision::into_row
//! [`Decision::into_scope`]: crate::authz::Decision::into_scope

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::{ApiResponse, AppState};
use crate::authz::{
    CurrentIdentity, Identity, Operation, ResourceKind, Role, RoleChange, Row, RowId, UserId,
    Visibility,
};
use crate::domain::{redact, validate_payload};
use crate::error::{BizdashError, ErrorContext, Result};
use crate::navigation::{capabilities, Capability};
use crate::store::{DeleteMode, DeleteOutcome, Page, WriteCondition};

// ═══════════════════════════════════════════════════════════════════════════════
// Health Check
// ═══════════════════════════════════════════════════════════════════════════════

pub async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// Prometheus text exposition.
pub async fn prometheus_metrics(State(state): State<AppState>) -> impl IntoResponse {
    let body = state
        .metrics
        .as_ref()
        .map(|handle| handle.render())
        .unwrap_or_default();

    (
        [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}

// ═══════════════════════════════════════════════════════════════════════════════
// Current User
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Serialize)]
pub struct MeResponse {
    pub identity: Identity,
    pub capabilities: BTreeSet<Capability>,
}

pub async fn me(CurrentIdentity(identity): CurrentIdentity) -> impl IntoResponse {
    let capabilities = capabilities(identity.role());
    Json(ApiResponse::success(MeResponse {
        identity,
        capabilities,
    }))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Resource Handlers
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl From<PageQuery> for Page {
    fn from(query: PageQuery) -> Self {
        Page::new(query.limit, query.offset)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct DeleteQuery {
    #[serde(default)]
    pub hard: bool,
}

/// Body of create and update requests.
///
/// On update, omitted fields keep their stored values.
#[derive(Debug, Default, Deserialize)]
pub struct ResourceInput {
    pub id: Option<RowId>,
    pub entrepreneur_id: Option<UserId>,
    pub active: Option<bool>,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl ResourceInput {
    fn into_candidate(self, kind: ResourceKind) -> Row {
        let mut row = Row::new(kind, self.data);
        row.id = self.id;
        row.entrepreneur_id = self.entrepreneur_id;
        row.active = self.active.unwrap_or(true);
        row
    }

    fn merge_into(self, mut row: Row) -> Row {
        if let Some(owner) = self.entrepreneur_id {
            row.entrepreneur_id = Some(owner);
        }
        if let Some(active) = self.active {
            row.active = active;
        }
        if !self.data.is_null() {
            row.data = self.data;
        }
        row
    }
}

pub async fn list_rows(
    State(state): State<AppState>,
    Extension(kind): Extension<ResourceKind>,
    CurrentIdentity(identity): CurrentIdentity,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse> {
    let visibility = state
        .authorizer
        .authorize_read(&identity, kind, None)
        .into_scope()?;

    let rows = list_visible(&state, kind, &visibility, query.into()).await?;
    Ok(Json(ApiResponse::success(rows)))
}

pub async fn get_row(
    State(state): State<AppState>,
    Extension(kind): Extension<ResourceKind>,
    CurrentIdentity(identity): CurrentIdentity,
    Path(id): Path<RowId>,
) -> Result<impl IntoResponse> {
    let visibility = state
        .authorizer
        .authorize_read(&identity, kind, None)
        .into_scope()?;

    let row = state
        .store
        .load_row(kind, &id)
        .await?
        .filter(|row| visibility.matches(row))
        .ok_or_else(BizdashError::not_found)?;

    Ok(Json(ApiResponse::success(redact(row))))
}

pub async fn create_row(
    State(state): State<AppState>,
    Extension(kind): Extension<ResourceKind>,
    CurrentIdentity(identity): CurrentIdentity,
    Json(input): Json<ResourceInput>,
) -> Result<impl IntoResponse> {
    let row = state
        .authorizer
        .authorize(
            &identity,
            kind,
            Operation::Create,
            Some(input.into_candidate(kind)),
            state.store.as_ref(),
        )
        .await?
        .into_row()?;
    validate_payload(kind, &row.data)?;

    let row = state.store.insert(row).await?;
    tracing::info!(kind = %kind, row_id = ?row.id, identity = %identity, "Row created");

    Ok((StatusCode::CREATED, Json(ApiResponse::success(redact(row)))))
}

pub async fn update_row(
    State(state): State<AppState>,
    Extension(kind): Extension<ResourceKind>,
    CurrentIdentity(identity): CurrentIdentity,
    Path(id): Path<RowId>,
    Json(input): Json<ResourceInput>,
) -> Result<impl IntoResponse> {
    let base = state
        .store
        .load_row(kind, &id)
        .await?
        .unwrap_or_else(|| Row::reference(kind, id.clone()));
    let candidate = input.merge_into(base).with_id(id);

    let row = state
        .authorizer
        .authorize(
            &identity,
            kind,
            Operation::Update,
            Some(candidate),
            state.store.as_ref(),
        )
        .await?
        .into_row()?;
    validate_payload(kind, &row.data)?;

    let condition = write_condition(&state, &identity, kind, row.entrepreneur_id.clone());
    let moved = format!("{kind} {:?} left the caller's scope before the write", row.id);
    let row = state.store.update(row, &condition).await?.context(moved)?;

    Ok(Json(ApiResponse::success(redact(row))))
}

pub async fn delete_row(
    State(state): State<AppState>,
    Extension(kind): Extension<ResourceKind>,
    CurrentIdentity(identity): CurrentIdentity,
    Path(id): Path<RowId>,
    Query(query): Query<DeleteQuery>,
) -> Result<impl IntoResponse> {
    let existing = state
        .authorizer
        .authorize(
            &identity,
            kind,
            Operation::Delete,
            Some(Row::reference(kind, id.clone())),
            state.store.as_ref(),
        )
        .await?
        .into_row()?;

    let mode = if query.hard { DeleteMode::Hard } else { DeleteMode::Soft };
    let condition = write_condition(&state, &identity, kind, existing.entrepreneur_id);

    match state.store.delete(kind, &id, &condition, mode).await? {
        DeleteOutcome::Deleted => {
            tracing::info!(kind = %kind, row_id = %id, mode = ?mode, identity = %identity, "Row deleted");
            Ok(Json(ApiResponse::success(serde_json::json!({
                "id": id,
                "mode": mode,
            }))))
        }
        DeleteOutcome::NotFound => Err(BizdashError::not_found()),
        DeleteOutcome::Restricted => Err(BizdashError::invalid_argument(
            "user still owns tenant rows or members",
        )),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Role Reassignment
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Deserialize)]
pub struct RoleChangeRequest {
    pub role: Role,
    pub entrepreneur_id: Option<UserId>,
}

pub async fn reassign_role(
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
    Path(user_id): Path<UserId>,
    Json(req): Json<RoleChangeRequest>,
) -> Result<impl IntoResponse> {
    let previous_owner = state
        .store
        .load_row(ResourceKind::User, &RowId::from(&user_id))
        .await?
        .and_then(|row| row.entrepreneur_id);

    let change = RoleChange {
        user_id,
        new_role: req.role,
        entrepreneur_id: req.entrepreneur_id,
    };
    let row = state
        .authorizer
        .reassign_role(&identity, &change, state.store.as_ref())
        .await?
        .into_row()?;

    let condition = write_condition(&state, &identity, ResourceKind::User, previous_owner);
    let row = state
        .store
        .update(row, &condition)
        .await?
        .context(format!("user {} changed during role reassignment", change.user_id))?;

    tracing::info!(
        target_user = %change.user_id,
        new_role = %change.new_role,
        identity = %identity,
        "User role reassigned"
    );
    Ok(Json(ApiResponse::success(row)))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Public Catalogue
// ═══════════════════════════════════════════════════════════════════════════════

/// Active price tables for visitors without an account.
pub async fn public_price_tables(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse> {
    let visibility = state
        .authorizer
        .authorize_public(ResourceKind::PriceTable, Operation::Read)
        .into_scope()?;

    let rows = list_visible(&state, ResourceKind::PriceTable, &visibility, query.into()).await?;
    Ok(Json(ApiResponse::success(rows)))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Helpers
// ═══════════════════════════════════════════════════════════════════════════════

async fn list_visible(
    state: &AppState,
    kind: ResourceKind,
    visibility: &Visibility,
    page: Page,
) -> Result<Vec<Row>> {
    if visibility.is_nothing() {
        return Ok(Vec::new());
    }
    let rows = state.store.list(kind, visibility, page).await?;
    Ok(rows.into_iter().map(redact).collect())
}

/// Condition re-checked by the store at write time.
fn write_condition(
    state: &AppState,
    identity: &Identity,
    kind: ResourceKind,
    expected_owner: Option<UserId>,
) -> WriteCondition {
    let scope = state.authorizer.scope(identity, kind);
    WriteCondition::new(scope.visibility, expected_owner)
}
