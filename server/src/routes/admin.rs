//! Administrative endpoints.

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use curator_engine::{Allocation, JobId, Policy, RecordId};
use serde::{Deserialize, Serialize};

use crate::auth::AdminUser;
use crate::error::{AppError, Result};
use crate::handlers::{
    allocator, backup::SnapshotScope, ids, reorder, restore, AttachmentPage, AttachmentTarget,
    BackupEntry, BackupInfo, IdStatus, PolicyView, ReorderReport, RestoreStarted, SnapshotRef,
    StepReport,
};
use crate::AppState;

/// Successful reply: `{"success": true, ...fields}`.
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(flatten)]
    pub data: T,
}

fn ok<T>(data: T) -> Json<Envelope<T>> {
    Json(Envelope {
        success: true,
        data,
    })
}

/// Create admin routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/admin/reorder", post(reorder_handler))
        .route("/admin/restore", post(restore_init_handler))
        .route("/admin/restore/{job_id}/step", post(restore_step_handler))
        .route("/admin/backups", get(list_backups_handler).post(create_backup_handler))
        .route("/admin/policy", get(get_policy_handler).put(set_policy_handler))
        .route("/admin/ids", get(id_status_handler))
        .route("/admin/ids/allocate", post(allocate_handler))
        .route(
            "/admin/attachments",
            get(list_attachments_handler).delete(delete_attachments_handler),
        )
}

/// POST /admin/reorder - Compact ids into `1..=N`.
async fn reorder_handler(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> Result<Json<Envelope<ReorderReport>>> {
    let settings = state.policy.load().await?;
    let report = reorder::reorder(state.driver.as_ref(), &state.tables, settings.enabled).await?;
    Ok(ok(report))
}

#[derive(Debug, Default, Deserialize)]
pub struct RestoreRequest {
    #[serde(default)]
    pub snapshot: Option<String>,
}

/// POST /admin/restore - Start a restore job.
async fn restore_init_handler(
    State(state): State<AppState>,
    _admin: AdminUser,
    Json(request): Json<RestoreRequest>,
) -> Result<Json<Envelope<RestoreStarted>>> {
    let reference = SnapshotRef::parse(request.snapshot.as_deref())?;
    let started = restore::init(&state.backups, &state.jobs, &reference).await?;
    Ok(ok(started))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepRequest {
    #[serde(default)]
    pub batch_size: Option<usize>,
}

/// POST /admin/restore/{job_id}/step - Apply the next batch.
async fn restore_step_handler(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(job_id): Path<String>,
    Json(request): Json<StepRequest>,
) -> Result<Json<Envelope<StepReport>>> {
    let job_id = JobId::parse(&job_id)?;
    let batch_size = request
        .batch_size
        .unwrap_or(state.config.restore_batch_size);
    let report = restore::step(
        state.driver.as_ref(),
        &state.tables,
        &state.backups,
        &state.jobs,
        &job_id,
        batch_size,
    )
    .await?;
    Ok(ok(report))
}

#[derive(Debug, Serialize)]
pub struct BackupList {
    pub backups: Vec<BackupEntry>,
}

/// GET /admin/backups - Snapshot files, newest first.
async fn list_backups_handler(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> Result<Json<Envelope<BackupList>>> {
    let backups = state.backups.list().await?;
    Ok(ok(BackupList { backups }))
}

#[derive(Debug, Default, Deserialize)]
pub struct BackupRequest {
    #[serde(default)]
    pub ids: Option<Vec<RecordId>>,
}

/// POST /admin/backups - Write a snapshot of all or selected records.
async fn create_backup_handler(
    State(state): State<AppState>,
    _admin: AdminUser,
    Json(request): Json<BackupRequest>,
) -> Result<Json<Envelope<BackupInfo>>> {
    let scope = match request.ids {
        Some(ids) => SnapshotScope::Selected(ids),
        None => SnapshotScope::All,
    };
    let info = state
        .backups
        .snapshot(state.driver.as_ref(), &state.tables, scope)
        .await?;
    Ok(ok(info))
}

/// GET /admin/policy
async fn get_policy_handler(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> Result<Json<Envelope<PolicyView>>> {
    let settings = state.policy.load().await?;
    Ok(ok(settings.into()))
}

#[derive(Debug, Default, Deserialize)]
pub struct PolicyRequest {
    #[serde(default)]
    pub strategy: Option<String>,
    #[serde(default)]
    pub enabled: Option<bool>,
}

/// PUT /admin/policy - Change strategy and/or opt-in.
async fn set_policy_handler(
    State(state): State<AppState>,
    _admin: AdminUser,
    Json(request): Json<PolicyRequest>,
) -> Result<Json<Envelope<PolicyView>>> {
    let policy = request
        .strategy
        .as_deref()
        .map(str::parse::<Policy>)
        .transpose()?;
    let settings = state.policy.update(policy, request.enabled).await?;
    Ok(ok(settings.into()))
}

/// GET /admin/ids - Id usage and the recommended next id.
async fn id_status_handler(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> Result<Json<Envelope<IdStatus>>> {
    let settings = state.policy.load().await?;
    let status = ids::status(state.driver.as_ref(), &state.tables, settings).await?;
    Ok(ok(status))
}

/// POST /admin/ids/allocate - Claim the next id under the stored policy.
async fn allocate_handler(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> Result<Json<Envelope<Allocation>>> {
    let settings = state.policy.load().await?;
    let allocation =
        allocator::allocate(state.driver.as_ref(), &state.tables, settings.policy).await?;
    Ok(ok(allocation))
}

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    #[serde(default)]
    pub page: Option<i64>,
}

/// GET /admin/attachments?page=N
async fn list_attachments_handler(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(query): Query<PageQuery>,
) -> Result<Json<Envelope<AttachmentPage>>> {
    let page = query.page.unwrap_or(1).max(1) as u64;
    let page = ids::list_attachments(state.driver.as_ref(), &state.tables, page).await?;
    Ok(ok(page))
}

#[derive(Debug, Default, Deserialize)]
pub struct DeleteAttachmentsRequest {
    #[serde(default)]
    pub ids: Option<Vec<RecordId>>,
    #[serde(default)]
    pub all: bool,
}

#[derive(Debug, Serialize)]
pub struct Deleted {
    pub deleted: u64,
}

/// DELETE /admin/attachments - Delete selected or all attachments.
async fn delete_attachments_handler(
    State(state): State<AppState>,
    _admin: AdminUser,
    Json(request): Json<DeleteAttachmentsRequest>,
) -> Result<Json<Envelope<Deleted>>> {
    let target = match (request.all, request.ids) {
        (true, _) => AttachmentTarget::All,
        (false, Some(ids)) => AttachmentTarget::Ids(ids),
        (false, None) => {
            return Err(AppError::Validation(
                "either ids or all must be given".into(),
            ))
        }
    };
    let deleted = ids::delete_attachments(state.driver.as_ref(), &state.tables, target).await?;
    Ok(ok(Deleted { deleted }))
}
