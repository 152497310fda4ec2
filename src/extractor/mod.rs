use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::models::lab_report::{validate_draft, LabReportDraft};
use crate::models::ocr_job::OcrJob;

/// Internal error taxonomy for the extractor client. A batch-level
/// failure means no drafts were produced at all; the orchestrator restores
/// every reserved job in that case.
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("extractor transport error: {0}")]
    Transport(String),
    #[error("extractor response was not valid JSON: {0}")]
    Malformed(String),
}

#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(&self, jobs: &[OcrJob]) -> Result<Vec<LabReportDraft>, ExtractError>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ExtractRequestItem<'a> {
    ocr_job_id: Uuid,
    image: &'a str,
    ocr: &'a str,
}

#[derive(Debug, Serialize)]
struct ExtractRequest<'a> {
    jobs: Vec<ExtractRequestItem<'a>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDraft {
    ocr_job_id: Option<Uuid>,
    patient: Option<String>,
    report_time: Option<String>,
    doctor: Option<String>,
    hospital: Option<String>,
    report_image: Option<String>,
    #[serde(default)]
    items: Vec<RawDraftItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDraftItem {
    item_name: Option<String>,
    result: Option<String>,
    unit: Option<String>,
    reference_value: Option<String>,
}

/// HTTP client against a configured LLM endpoint. Serializes the reserved
/// batch, applies `AI_TIMEOUT` as the request deadline, and parses a JSON
/// array response into drafts -- well-formed entries survive, the rest are
/// dropped and counted as failures for their originating job.
pub struct HttpExtractor {
    client: reqwest::Client,
    endpoint_url: String,
    api_key: String,
}

impl HttpExtractor {
    pub fn new(endpoint_url: String, api_key: String, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client should build with a valid timeout");
        Self { client, endpoint_url, api_key }
    }
}

#[async_trait]
impl Extractor for HttpExtractor {
    async fn extract(&self, jobs: &[OcrJob]) -> Result<Vec<LabReportDraft>, ExtractError> {
        if jobs.is_empty() {
            return Ok(Vec::new());
        }

        let request = ExtractRequest {
            jobs: jobs
                .iter()
                .map(|job| ExtractRequestItem { ocr_job_id: job.id, image: &job.image, ocr: &job.ocr })
                .collect(),
        };

        let response = self
            .client
            .post(&self.endpoint_url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| ExtractError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ExtractError::Transport(format!("extractor returned status {}", response.status())));
        }

        let raw: Vec<RawDraft> = response.json().await.map_err(|e| ExtractError::Malformed(e.to_string()))?;

        let drafts = raw
            .into_iter()
            .filter_map(|raw| {
                let ocr_job_id = raw.ocr_job_id?;
                let patient = raw.patient?;
                let report_image = raw.report_image?;
                let items = raw
                    .items
                    .into_iter()
                    .filter_map(|item| {
                        Some(crate::models::lab_report::LabReportItemDraft {
                            item_name: item.item_name?,
                            result: item.result?,
                            unit: item.unit,
                            reference_value: item.reference_value,
                        })
                    })
                    .collect();

                let draft = LabReportDraft {
                    ocr_job_id,
                    patient,
                    report_time: raw.report_time,
                    doctor: raw.doctor,
                    hospital: raw.hospital,
                    report_image,
                    items,
                };

                validate_draft(&draft).ok()?;
                Some(draft)
            })
            .collect();

        Ok(drafts)
    }
}
