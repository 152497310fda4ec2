use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LabReport {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub patient: String,
    pub report_time: DateTime<Utc>,
    pub doctor: Option<String>,
    pub hospital: Option<String>,
    pub report_image: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LabReportItem {
    pub id: Uuid,
    pub parent_report_id: Uuid,
    pub item_name: String,
    pub result: String,
    pub unit: Option<String>,
    pub reference_value: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LabReportWithItems {
    #[serde(flatten)]
    pub report: LabReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<LabReportItem>>,
}

/// Extractor-produced candidate, matched back to its originating `OcrJob`
/// by id. Unvalidated until `validate_draft` accepts it.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LabReportDraft {
    pub ocr_job_id: Uuid,
    pub patient: String,
    pub report_time: Option<String>,
    pub doctor: Option<String>,
    pub hospital: Option<String>,
    pub report_image: String,
    pub items: Vec<LabReportItemDraft>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LabReportItemDraft {
    pub item_name: String,
    pub result: String,
    pub unit: Option<String>,
    pub reference_value: Option<String>,
}

/// `patient` non-empty, `items` non-empty, every item has non-empty
/// `itemName`/`result`. Field-length limits are enforced at store
/// time; this is the extractor-facing acceptance gate.
pub fn validate_draft(draft: &LabReportDraft) -> Result<(), String> {
    if draft.patient.trim().is_empty() {
        return Err("patient must not be empty".to_string());
    }
    if draft.items.is_empty() {
        return Err("items must not be empty".to_string());
    }
    for item in &draft.items {
        if item.item_name.trim().is_empty() {
            return Err("itemName must not be empty".to_string());
        }
        if item.result.trim().is_empty() {
            return Err("result must not be empty".to_string());
        }
    }
    Ok(())
}

/// Field-length checks enforced by the Report Store at commit time.
pub fn validate_item_lengths(item_name: &str, result: &str, unit: Option<&str>, reference_value: Option<&str>) -> Result<(), String> {
    if item_name.is_empty() || item_name.len() > 200 {
        return Err("itemName must be 1-200 characters".to_string());
    }
    if result.is_empty() || result.len() > 500 {
        return Err("result must be 1-500 characters".to_string());
    }
    if let Some(u) = unit {
        if u.len() > 50 {
            return Err("unit must be at most 50 characters".to_string());
        }
    }
    if let Some(r) = reference_value {
        if r.len() > 200 {
            return Err("referenceValue must be at most 200 characters".to_string());
        }
    }
    Ok(())
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LabReportSearchRequest {
    pub workspace_id: Option<Uuid>,
    pub patients: Vec<String>,
    #[serde(default)]
    pub item_names: Option<Vec<String>>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_page_size")]
    pub page_size: i64,
}

fn default_page() -> i64 {
    1
}
fn default_page_size() -> i64 {
    20
}

pub const ALL_SENTINEL: &str = "all";

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LabReportSearchResponse {
    pub reports: Vec<LabReportWithItems>,
    pub pagination: crate::models::responses::PaginationInfo,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateLabReportItemRequest {
    pub item_name: Option<String>,
    pub result: Option<String>,
    pub unit: Option<String>,
    pub reference_value: Option<String>,
}

impl UpdateLabReportItemRequest {
    pub fn is_empty(&self) -> bool {
        self.item_name.is_none() && self.result.is_none() && self.unit.is_none() && self.reference_value.is_none()
    }
}
