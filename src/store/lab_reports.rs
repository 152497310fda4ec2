use async_trait::async_trait;
use sqlx::{Postgres, QueryBuilder, Row};
use sqlx::PgPool;
use std::collections::HashMap;
use uuid::Uuid;

use super::{ReportSearch, ReportStore, StoreError, StoreResult};
use crate::models::lab_report::{
    validate_draft, validate_item_lengths, LabReport, LabReportDraft, LabReportItem, LabReportWithItems,
    UpdateLabReportItemRequest, ALL_SENTINEL,
};
use crate::models::responses::{normalize_pagination, PaginationInfo};

#[derive(Clone)]
pub struct PgReportStore {
    pool: PgPool,
}

impl PgReportStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn items_for_reports(&self, report_ids: &[Uuid], item_names: Option<&[String]>) -> StoreResult<HashMap<Uuid, Vec<LabReportItem>>> {
        let mut map: HashMap<Uuid, Vec<LabReportItem>> = HashMap::new();
        if report_ids.is_empty() {
            return Ok(map);
        }

        let mut query = QueryBuilder::<Postgres>::new(
            "SELECT id, parent_report_id, item_name, result, unit, reference_value FROM lab_report_items WHERE parent_report_id = ANY(",
        );
        query.push_bind(report_ids);
        query.push(")");

        if let Some(names) = item_names {
            if !names.iter().any(|n| n == ALL_SENTINEL) {
                query.push(" AND item_name = ANY(");
                query.push_bind(names.to_vec());
                query.push(")");
            }
        }

        let items = query.build_query_as::<LabReportItem>().fetch_all(&self.pool).await?;
        for item in items {
            map.entry(item.parent_report_id).or_default().push(item);
        }
        Ok(map)
    }

    fn attach_items(report: LabReport, items_by_report: &mut HashMap<Uuid, Vec<LabReportItem>>, include_items: bool) -> LabReportWithItems {
        let items = if include_items {
            Some(items_by_report.remove(&report.id).unwrap_or_default())
        } else {
            None
        };
        LabReportWithItems { report, items }
    }
}

#[async_trait]
impl ReportStore for PgReportStore {
    async fn create(&self, draft: &LabReportDraft) -> StoreResult<LabReportWithItems> {
        validate_draft(draft).map_err(StoreError::Validation)?;
        for item in &draft.items {
            validate_item_lengths(&item.item_name, &item.result, item.unit.as_deref(), item.reference_value.as_deref())
                .map_err(StoreError::Validation)?;
        }

        let report_time = match &draft.report_time {
            Some(ts) => chrono::DateTime::parse_from_rfc3339(ts)
                .map(|dt| dt.with_timezone(&chrono::Utc))
                .map_err(|_| StoreError::Validation("reportTime is not a valid timestamp".to_string()))?,
            None => chrono::Utc::now(),
        };

        let mut tx = self.pool.begin().await?;

        let workspace_id: Uuid = sqlx::query("SELECT workspace_id FROM ocr_jobs WHERE id = $1")
            .bind(draft.ocr_job_id)
            .fetch_optional(&mut *tx)
            .await?
            .map(|row| row.get("workspace_id"))
            .ok_or(StoreError::NotFound)?;

        let report = sqlx::query_as::<_, LabReport>(
            r#"
            INSERT INTO lab_reports (workspace_id, patient, report_time, doctor, hospital, report_image)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, workspace_id, patient, report_time, doctor, hospital, report_image, created_at
            "#,
        )
        .bind(workspace_id)
        .bind(&draft.patient)
        .bind(report_time)
        .bind(&draft.doctor)
        .bind(&draft.hospital)
        .bind(&draft.report_image)
        .fetch_one(&mut *tx)
        .await?;

        let mut items = Vec::with_capacity(draft.items.len());
        for item in &draft.items {
            let row = sqlx::query_as::<_, LabReportItem>(
                r#"
                INSERT INTO lab_report_items (parent_report_id, item_name, result, unit, reference_value)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING id, parent_report_id, item_name, result, unit, reference_value
                "#,
            )
            .bind(report.id)
            .bind(&item.item_name)
            .bind(&item.result)
            .bind(&item.unit)
            .bind(&item.reference_value)
            .fetch_one(&mut *tx)
            .await?;
            items.push(row);
        }

        tx.commit().await?;

        Ok(LabReportWithItems { report, items: Some(items) })
    }

    async fn find_with_items(&self, id: Uuid) -> StoreResult<Option<LabReportWithItems>> {
        let report = sqlx::query_as::<_, LabReport>(
            "SELECT id, workspace_id, patient, report_time, doctor, hospital, report_image, created_at FROM lab_reports WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(report) = report else {
            return Ok(None);
        };

        let items = sqlx::query_as::<_, LabReportItem>(
            "SELECT id, parent_report_id, item_name, result, unit, reference_value FROM lab_report_items WHERE parent_report_id = $1",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(LabReportWithItems { report, items: Some(items) }))
    }

    async fn find_by_workspace(&self, workspace_id: Uuid, page: i64, page_size: i64) -> StoreResult<(Vec<LabReportWithItems>, PaginationInfo)> {
        self.search(ReportSearch {
            workspace_id: Some(workspace_id),
            patients: vec![ALL_SENTINEL.to_string()],
            item_names: Some(vec![ALL_SENTINEL.to_string()]),
            from: None,
            to: None,
            page,
            page_size,
        })
        .await
    }

    /// `"all"` sentinel selects everything in scope for `patients`/`items`; otherwise
    /// an exact-match set filter. `items=None`/`Some([])` omits the items collection.
    async fn search(&self, search: ReportSearch) -> StoreResult<(Vec<LabReportWithItems>, PaginationInfo)> {
        let (page, page_size) = normalize_pagination(search.page, search.page_size);
        let patients_all = search.patients.iter().any(|p| p == ALL_SENTINEL);

        let mut count_query = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM lab_reports WHERE 1=1");
        let mut select_query = QueryBuilder::<Postgres>::new(
            "SELECT id, workspace_id, patient, report_time, doctor, hospital, report_image, created_at FROM lab_reports WHERE 1=1",
        );

        for query in [&mut count_query, &mut select_query] {
            if let Some(workspace_id) = search.workspace_id {
                query.push(" AND workspace_id = ");
                query.push_bind(workspace_id);
            }
            if !patients_all {
                query.push(" AND patient = ANY(");
                query.push_bind(search.patients.clone());
                query.push(")");
            }
            if let Some(from) = search.from {
                query.push(" AND report_time >= ");
                query.push_bind(from);
            }
            if let Some(to) = search.to {
                query.push(" AND report_time <= ");
                query.push_bind(to);
            }
        }

        let total_count: i64 = count_query.build_query_scalar().fetch_one(&self.pool).await?;

        select_query.push(" ORDER BY created_at ASC");
        select_query.push(" LIMIT ");
        select_query.push_bind(page_size);
        select_query.push(" OFFSET ");
        select_query.push_bind((page - 1) * page_size);

        let reports = select_query.build_query_as::<LabReport>().fetch_all(&self.pool).await?;
        let report_ids: Vec<Uuid> = reports.iter().map(|r| r.id).collect();

        let include_items = !matches!(&search.item_names, None | Some(v) if v.is_empty());
        let mut items_by_report = if include_items {
            self.items_for_reports(&report_ids, search.item_names.as_deref()).await?
        } else {
            HashMap::new()
        };

        let with_items = reports
            .into_iter()
            .map(|report| Self::attach_items(report, &mut items_by_report, include_items))
            .collect();

        Ok((with_items, PaginationInfo::new(page, page_size, total_count)))
    }

    async fn update_item(&self, id: Uuid, patch: &UpdateLabReportItemRequest) -> StoreResult<LabReportItem> {
        if patch.is_empty() {
            return Err(StoreError::Validation("at least one field must be present".to_string()));
        }

        let current = sqlx::query_as::<_, LabReportItem>(
            "SELECT id, parent_report_id, item_name, result, unit, reference_value FROM lab_report_items WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound)?;

        let item_name = patch.item_name.clone().unwrap_or(current.item_name);
        let result = patch.result.clone().unwrap_or(current.result);
        let unit = if patch.unit.is_some() { patch.unit.clone() } else { current.unit };
        let reference_value = if patch.reference_value.is_some() { patch.reference_value.clone() } else { current.reference_value };

        validate_item_lengths(&item_name, &result, unit.as_deref(), reference_value.as_deref()).map_err(StoreError::Validation)?;

        let updated = sqlx::query_as::<_, LabReportItem>(
            r#"
            UPDATE lab_report_items
            SET item_name = $1, result = $2, unit = $3, reference_value = $4
            WHERE id = $5
            RETURNING id, parent_report_id, item_name, result, unit, reference_value
            "#,
        )
        .bind(item_name)
        .bind(result)
        .bind(unit)
        .bind(reference_value)
        .bind(id)
        .fetch_one(&self.pool)
        .await?;

        Ok(updated)
    }
}
