use axum::{extract::Path, extract::State, Json};
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    errors::{ApiError, ApiResult},
    models::lab_report::{
        LabReportItem, LabReportSearchRequest, LabReportSearchResponse, LabReportWithItems, UpdateLabReportItemRequest,
    },
    store::ReportSearch,
    AppState,
};

#[utoipa::path(
    get,
    path = "/labreport/{id}",
    tag = "lab-reports",
    params(("id" = Uuid, Path)),
    responses(
        (status = 200, description = "Report with items", body = LabReportWithItems),
        (status = 404, description = "No such report"),
        (status = 403, description = "Not owned by caller"),
    )
)]
pub async fn get_one(State(state): State<Arc<AppState>>, auth: AuthUser, Path(id): Path<Uuid>) -> ApiResult<Json<LabReportWithItems>> {
    let report = state.deps.reports.find_with_items(id).await?.ok_or_else(|| ApiError::NotFound("report not found".to_string()))?;
    if !state.deps.workspaces.is_owned_by(report.report.workspace_id, auth.user.id).await? {
        return Err(ApiError::Forbidden("report not owned by caller".to_string()));
    }
    Ok(Json(report))
}

/// `"all"` sentinel in `patients`/`itemNames` selects everything in scope
/// `itemNames` omitted or empty drops the items collection entirely.
#[utoipa::path(
    post,
    path = "/labreport/search",
    tag = "lab-reports",
    request_body = LabReportSearchRequest,
    responses(
        (status = 200, description = "Matching reports, paginated", body = LabReportSearchResponse),
        (status = 403, description = "workspaceId not owned by caller"),
    )
)]
pub async fn search(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<LabReportSearchRequest>,
) -> ApiResult<Json<LabReportSearchResponse>> {
    if let Some(workspace_id) = body.workspace_id {
        if !state.deps.workspaces.is_owned_by(workspace_id, auth.user.id).await? {
            return Err(ApiError::Forbidden("workspaceId not owned by caller".to_string()));
        }
    }

    let (reports, pagination) = state
        .deps
        .reports
        .search(ReportSearch {
            workspace_id: body.workspace_id,
            patients: body.patients,
            item_names: body.item_names,
            from: body.from,
            to: body.to,
            page: body.page,
            page_size: body.page_size,
        })
        .await?;

    Ok(Json(LabReportSearchResponse { reports, pagination }))
}

#[utoipa::path(
    put,
    path = "/labreportitem/{id}",
    tag = "lab-reports",
    params(("id" = Uuid, Path)),
    request_body = UpdateLabReportItemRequest,
    responses(
        (status = 200, description = "Item updated", body = LabReportItem),
        (status = 400, description = "No fields present, or a field violates length rules"),
        (status = 404, description = "No such item"),
    )
)]
pub async fn update_item(
    State(state): State<Arc<AppState>>,
    _auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateLabReportItemRequest>,
) -> ApiResult<Json<LabReportItem>> {
    let item = state.deps.reports.update_item(id, &body).await?;
    Ok(Json(item))
}
