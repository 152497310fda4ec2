use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use utoipa::ToSchema;

/// A unit of work in the Job Store. `reserved_at = None` means available;
/// `Some(_)` means in flight. There is no update path -- only insert,
/// reserve, restore, and hard-delete.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct OcrJob {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub image: String,
    pub ocr: String,
    pub created_at: DateTime<Utc>,
    pub reserved_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OcrDataEntry {
    pub report_image: String,
    pub ocr_primitive: String,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateOcrBatchRequest {
    pub ocr_data_array: Vec<OcrDataEntry>,
}

pub const MAX_BATCH_SIZE: usize = 100;

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OcrJobResponse {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub image: String,
    pub ocr: String,
    pub created_at: DateTime<Utc>,
}

impl From<OcrJob> for OcrJobResponse {
    fn from(job: OcrJob) -> Self {
        Self {
            id: job.id,
            workspace_id: job.workspace_id,
            image: job.image,
            ocr: job.ocr,
            created_at: job.created_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateOcrBatchData {
    pub created_count: usize,
    pub workspace_id: Uuid,
    pub ocr_data: Vec<OcrJobResponse>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CreateOcrBatchResponse {
    pub success: bool,
    pub data: CreateOcrBatchData,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeleteOcrBatchRequest {
    pub id_array: Vec<Uuid>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct JobStoreStats {
    pub available: i64,
    pub in_flight: i64,
}

/// Validates one entry of an `insertBatch` request: non-empty image and ocr text.
pub fn validate_ocr_entry(entry: &OcrDataEntry) -> Result<(), String> {
    if entry.report_image.trim().is_empty() {
        return Err("reportImage must not be empty".to_string());
    }
    if entry.ocr_primitive.trim().is_empty() {
        return Err("ocrPrimitive must not be empty".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_fields() {
        let entry = OcrDataEntry { report_image: "".to_string(), ocr_primitive: "text".to_string() };
        assert!(validate_ocr_entry(&entry).is_err());

        let entry = OcrDataEntry { report_image: "img".to_string(), ocr_primitive: "  ".to_string() };
        assert!(validate_ocr_entry(&entry).is_err());
    }

    #[test]
    fn accepts_populated_entry() {
        let entry = OcrDataEntry { report_image: "img.png".to_string(), ocr_primitive: "raw text".to_string() };
        assert!(validate_ocr_entry(&entry).is_ok());
    }
}
