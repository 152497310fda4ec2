use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    errors::{ApiError, ApiResult},
    models::ocr_job::{
        CreateOcrBatchData, CreateOcrBatchRequest, CreateOcrBatchResponse, DeleteOcrBatchRequest, OcrJobResponse,
        MAX_BATCH_SIZE,
    },
    store::NewOcrJob,
    AppState,
};

#[utoipa::path(
    post,
    path = "/ocrdata/batch/{workspace_id}",
    tag = "ocr-data",
    params(("workspace_id" = Uuid, Path)),
    request_body = CreateOcrBatchRequest,
    responses(
        (status = 201, description = "Batch inserted", body = CreateOcrBatchResponse),
        (status = 403, description = "Workspace not owned by caller"),
    )
)]
pub async fn create_batch(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(workspace_id): Path<Uuid>,
    Json(body): Json<CreateOcrBatchRequest>,
) -> ApiResult<(StatusCode, Json<CreateOcrBatchResponse>)> {
    if !state.deps.workspaces.is_owned_by(workspace_id, auth.user.id).await? {
        return Err(ApiError::Forbidden("workspace not owned by caller".to_string()));
    }
    if body.ocr_data_array.len() > MAX_BATCH_SIZE {
        return Err(ApiError::Validation(format!("batch exceeds max size of {}", MAX_BATCH_SIZE)));
    }
    for entry in &body.ocr_data_array {
        crate::models::ocr_job::validate_ocr_entry(entry).map_err(ApiError::Validation)?;
    }

    let entries = body
        .ocr_data_array
        .into_iter()
        .map(|e| NewOcrJob { image: e.report_image, ocr: e.ocr_primitive })
        .collect();

    let jobs = state.deps.jobs.insert_batch(workspace_id, entries).await?;
    let created_count = jobs.len();
    let ocr_data: Vec<OcrJobResponse> = jobs.into_iter().map(OcrJobResponse::from).collect();

    Ok((
        StatusCode::CREATED,
        Json(CreateOcrBatchResponse {
            success: true,
            data: CreateOcrBatchData { created_count, workspace_id, ocr_data },
        }),
    ))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default = "default_limit")]
    limit: i64,
    #[serde(default)]
    offset: i64,
}

fn default_limit() -> i64 {
    50
}

#[utoipa::path(
    get,
    path = "/ocrdata/workspace/{workspace_id}",
    tag = "ocr-data",
    params(("workspace_id" = Uuid, Path), ("limit" = Option<i64>, Query), ("offset" = Option<i64>, Query)),
    responses((status = 200, description = "Pending jobs (excludes reserved)", body = [OcrJobResponse])),
)]
pub async fn list_for_workspace(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(workspace_id): Path<Uuid>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Vec<OcrJobResponse>>> {
    if !state.deps.workspaces.is_owned_by(workspace_id, auth.user.id).await? {
        return Err(ApiError::Forbidden("workspace not owned by caller".to_string()));
    }

    let jobs = state.deps.jobs.find_by_workspace(workspace_id, query.limit, query.offset).await?;
    Ok(Json(jobs.into_iter().map(OcrJobResponse::from).collect()))
}

#[utoipa::path(
    get,
    path = "/ocrdata/{id}",
    tag = "ocr-data",
    params(("id" = Uuid, Path)),
    responses(
        (status = 200, description = "Job found", body = OcrJobResponse),
        (status = 404, description = "No such job"),
        (status = 403, description = "Not owned by caller"),
    )
)]
pub async fn get_one(State(state): State<Arc<AppState>>, auth: AuthUser, Path(id): Path<Uuid>) -> ApiResult<Json<OcrJobResponse>> {
    let job = state.deps.jobs.find_by_id(id).await?.ok_or_else(|| ApiError::NotFound("ocr job not found".to_string()))?;
    if !state.deps.workspaces.is_owned_by(job.workspace_id, auth.user.id).await? {
        return Err(ApiError::Forbidden("job not owned by caller".to_string()));
    }
    Ok(Json(job.into()))
}

#[utoipa::path(
    delete,
    path = "/ocrdata/batch",
    tag = "ocr-data",
    request_body = DeleteOcrBatchRequest,
    responses(
        (status = 200, description = "Jobs hard-deleted"),
        (status = 404, description = "At least one id does not exist"),
        (status = 403, description = "At least one id is not owned by the caller"),
    )
)]
pub async fn delete_batch(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<DeleteOcrBatchRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    if body.id_array.is_empty() {
        return Err(ApiError::Validation("idArray must not be empty".to_string()));
    }
    if body.id_array.len() > MAX_BATCH_SIZE {
        return Err(ApiError::Validation(format!("batch exceeds max size of {}", MAX_BATCH_SIZE)));
    }

    for id in &body.id_array {
        let job = state.deps.jobs.find_by_id(*id).await?.ok_or_else(|| ApiError::NotFound(format!("ocr job {id} not found")))?;
        if !state.deps.workspaces.is_owned_by(job.workspace_id, auth.user.id).await? {
            return Err(ApiError::Forbidden(format!("job {id} not owned by caller")));
        }
    }

    let deleted = state.deps.jobs.hard_delete(&body.id_array).await?;
    Ok(Json(serde_json::json!({ "success": true, "deletedCount": deleted })))
}
