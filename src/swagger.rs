use axum::Router;
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    models::{
        lab_report::{
            LabReportItem, LabReportSearchRequest, LabReportSearchResponse, LabReportWithItems, UpdateLabReportItemRequest,
        },
        ocr_job::{CreateOcrBatchRequest, CreateOcrBatchResponse, DeleteOcrBatchRequest, OcrJobResponse},
        responses::{ApiErrorBody, ApiErrorDetail, PaginationInfo},
        user::{LoginRequest, LoginResponse, UserResponse},
        workspace::{CreateWorkspaceRequest, Workspace},
    },
    AppState,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::auth::login,
        crate::routes::workspaces::create,
        crate::routes::workspaces::list,
        crate::routes::workspaces::delete,
        crate::routes::ocr_data::create_batch,
        crate::routes::ocr_data::list_for_workspace,
        crate::routes::ocr_data::get_one,
        crate::routes::ocr_data::delete_batch,
        crate::routes::lab_reports::get_one,
        crate::routes::lab_reports::search,
        crate::routes::lab_reports::update_item,
    ),
    components(
        schemas(
            LoginRequest, LoginResponse, UserResponse,
            CreateWorkspaceRequest, Workspace,
            CreateOcrBatchRequest, CreateOcrBatchResponse, DeleteOcrBatchRequest, OcrJobResponse,
            LabReportSearchRequest, LabReportSearchResponse, LabReportWithItems, LabReportItem,
            UpdateLabReportItemRequest, PaginationInfo,
            ApiErrorBody, ApiErrorDetail,
        )
    ),
    tags(
        (name = "auth", description = "Login and token issuance"),
        (name = "workspaces", description = "Workspace ownership and lifecycle"),
        (name = "ocr-data", description = "OCR job intake and cancellation"),
        (name = "lab-reports", description = "Extracted lab report retrieval and search"),
    ),
    info(
        title = "LabScribe API",
        version = "0.1.0",
        description = "OCR-to-LabReport extraction pipeline and push notification service",
    ),
)]
pub struct ApiDoc;

pub fn router() -> Router<Arc<AppState>> {
    SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi())
}
