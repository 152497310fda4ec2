pub mod lab_reports;
pub mod ocr_jobs;
pub mod users;
pub mod workspaces;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::errors::ApiError;
use crate::models::lab_report::{LabReportDraft, LabReportItem, LabReportWithItems, UpdateLabReportItemRequest};
use crate::models::ocr_job::{JobStoreStats, OcrJob};
use crate::models::responses::PaginationInfo;

/// Internal error taxonomy for the store layer. Converts to `ApiError`
/// only at the HTTP boundary; the orchestrator matches on this directly.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store contention, retry")]
    Contention,
    #[error("not found")]
    NotFound,
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Conflict(String),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Contention => ApiError::Internal("store contention exceeded retry budget".to_string()),
            StoreError::NotFound => ApiError::NotFound("not found".to_string()),
            StoreError::Validation(m) => ApiError::Validation(m),
            StoreError::Conflict(m) => ApiError::Conflict(m),
            StoreError::Database(e) => ApiError::Internal(e.to_string()),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// One validated `{image, ocr}` pair, ready for insertion.
pub struct NewOcrJob {
    pub image: String,
    pub ocr: String,
}

#[async_trait]
pub trait JobStore: Send + Sync {
    async fn insert_batch(&self, workspace_id: Uuid, entries: Vec<NewOcrJob>) -> StoreResult<Vec<OcrJob>>;
    async fn reserve_and_take(&self, n: i64) -> StoreResult<Vec<OcrJob>>;
    async fn exists(&self, id: Uuid) -> StoreResult<bool>;
    async fn restore(&self, id: Uuid) -> StoreResult<()>;
    async fn hard_delete(&self, ids: &[Uuid]) -> StoreResult<u64>;
    async fn stats(&self) -> StoreResult<JobStoreStats>;
    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<OcrJob>>;
    async fn find_by_workspace(&self, workspace_id: Uuid, limit: i64, offset: i64) -> StoreResult<Vec<OcrJob>>;
}

pub struct ReportSearch {
    pub workspace_id: Option<Uuid>,
    pub patients: Vec<String>,
    pub item_names: Option<Vec<String>>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub page: i64,
    pub page_size: i64,
}

#[async_trait]
pub trait ReportStore: Send + Sync {
    async fn create(&self, draft: &LabReportDraft) -> StoreResult<LabReportWithItems>;
    async fn find_with_items(&self, id: Uuid) -> StoreResult<Option<LabReportWithItems>>;
    async fn find_by_workspace(&self, workspace_id: Uuid, page: i64, page_size: i64) -> StoreResult<(Vec<LabReportWithItems>, PaginationInfo)>;
    async fn search(&self, search: ReportSearch) -> StoreResult<(Vec<LabReportWithItems>, PaginationInfo)>;
    async fn update_item(&self, id: Uuid, patch: &UpdateLabReportItemRequest) -> StoreResult<LabReportItem>;
}

/// Narrow seam the orchestrator needs to turn a workspace into the user id
/// to notify -- kept separate from the richer `PgWorkspaceStore` API so it
/// can be faked in orchestrator unit tests without a database.
#[async_trait]
pub trait WorkspaceLookup: Send + Sync {
    async fn find_owner(&self, workspace_id: Uuid) -> StoreResult<Option<Uuid>>;
}
