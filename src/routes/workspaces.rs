use axum::{extract::Path, extract::State, Json};
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    errors::{ApiError, ApiResult},
    models::workspace::{CreateWorkspaceRequest, Workspace},
    AppState,
};

#[derive(Debug, Serialize, ToSchema)]
pub struct WorkspaceListResponse {
    pub workspaces: Vec<Workspace>,
}

#[utoipa::path(
    post,
    path = "/workspace/create",
    tag = "workspaces",
    request_body = CreateWorkspaceRequest,
    responses(
        (status = 200, description = "Workspace created", body = Workspace),
        (status = 409, description = "Workspace name already in use for this owner"),
    )
)]
pub async fn create(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<CreateWorkspaceRequest>,
) -> ApiResult<Json<Workspace>> {
    if body.name.trim().is_empty() {
        return Err(ApiError::Validation("name must not be empty".to_string()));
    }
    let workspace = state.deps.workspaces.create(&body.name, auth.user.id).await?;
    Ok(Json(workspace))
}

#[utoipa::path(
    get,
    path = "/workspace",
    tag = "workspaces",
    responses((status = 200, description = "Workspaces owned by the caller", body = WorkspaceListResponse)),
)]
pub async fn list(State(state): State<Arc<AppState>>, auth: AuthUser) -> ApiResult<Json<WorkspaceListResponse>> {
    let workspaces = state.deps.workspaces.find_by_owner(auth.user.id).await?;
    Ok(Json(WorkspaceListResponse { workspaces }))
}

#[utoipa::path(
    post,
    path = "/workspace/delete/{id}",
    tag = "workspaces",
    params(("id" = Uuid, Path, description = "Workspace id")),
    responses(
        (status = 200, description = "Workspace deleted, cascading to its jobs and reports"),
        (status = 404, description = "No such workspace owned by the caller"),
    )
)]
pub async fn delete(State(state): State<Arc<AppState>>, auth: AuthUser, Path(id): Path<Uuid>) -> ApiResult<Json<serde_json::Value>> {
    let deleted = state.deps.workspaces.delete(id, auth.user.id).await?;
    if !deleted {
        return Err(ApiError::NotFound("workspace not found".to_string()));
    }
    Ok(Json(serde_json::json!({ "success": true })))
}
