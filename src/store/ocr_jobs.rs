use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use super::{JobStore, NewOcrJob, StoreError, StoreResult};
use crate::db::Database;
use crate::models::ocr_job::{JobStoreStats, OcrJob, MAX_BATCH_SIZE};

#[derive(Clone)]
pub struct PgJobStore {
    db: Database,
}

impl PgJobStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    fn pool(&self) -> &PgPool {
        self.db.get_pool()
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn insert_batch(&self, workspace_id: Uuid, entries: Vec<NewOcrJob>) -> StoreResult<Vec<OcrJob>> {
        if entries.is_empty() {
            return Err(StoreError::Validation("ocrDataArray must not be empty".to_string()));
        }
        if entries.len() > MAX_BATCH_SIZE {
            return Err(StoreError::Validation(format!("batch exceeds max size of {}", MAX_BATCH_SIZE)));
        }

        let mut tx = self.pool().begin().await?;
        let mut jobs = Vec::with_capacity(entries.len());
        for entry in entries {
            let job = sqlx::query_as::<_, OcrJob>(
                r#"
                INSERT INTO ocr_jobs (workspace_id, image, ocr)
                VALUES ($1, $2, $3)
                RETURNING id, workspace_id, image, ocr, created_at, reserved_at
                "#,
            )
            .bind(workspace_id)
            .bind(entry.image)
            .bind(entry.ocr)
            .fetch_one(&mut *tx)
            .await?;
            jobs.push(job);
        }
        tx.commit().await?;
        Ok(jobs)
    }

    /// Transactional "select-then-update-where-still-available" reservation.
    /// A lost race (rows marked != rows selected) is reported as a transient
    /// failure so `Database::with_retry` retries the whole attempt with
    /// backoff, the same way the teacher uses it for contention-prone ops.
    async fn reserve_and_take(&self, n: i64) -> StoreResult<Vec<OcrJob>> {
        if n <= 0 {
            return Ok(Vec::new());
        }

        let pool = self.pool().clone();
        let result = self
            .db
            .with_retry(|| {
                let pool = pool.clone();
                async move {
                    let mut tx = pool.begin().await?;

                    let candidate_ids: Vec<Uuid> = sqlx::query(
                        r#"
                        SELECT id FROM ocr_jobs
                        WHERE reserved_at IS NULL
                        ORDER BY created_at ASC
                        FOR UPDATE SKIP LOCKED
                        LIMIT $1
                        "#,
                    )
                    .bind(n)
                    .fetch_all(&mut *tx)
                    .await?
                    .into_iter()
                    .map(|row| row.get::<Uuid, _>("id"))
                    .collect();

                    if candidate_ids.is_empty() {
                        tx.rollback().await?;
                        return Ok(Vec::new());
                    }

                    let now = Utc::now();
                    let updated = sqlx::query(
                        r#"
                        UPDATE ocr_jobs
                        SET reserved_at = $1
                        WHERE id = ANY($2) AND reserved_at IS NULL
                        "#,
                    )
                    .bind(now)
                    .bind(&candidate_ids)
                    .execute(&mut *tx)
                    .await?;

                    if updated.rows_affected() != candidate_ids.len() as u64 {
                        tx.rollback().await?;
                        anyhow::bail!("reserveAndTake lost a race");
                    }

                    let jobs = sqlx::query_as::<_, OcrJob>(
                        r#"
                        SELECT id, workspace_id, image, ocr, created_at, reserved_at
                        FROM ocr_jobs
                        WHERE id = ANY($1)
                        ORDER BY created_at ASC
                        "#,
                    )
                    .bind(&candidate_ids)
                    .fetch_all(&mut *tx)
                    .await?;

                    tx.commit().await?;
                    Ok(jobs)
                }
            })
            .await;

        result.map_err(|e| match e.downcast::<sqlx::Error>() {
            Ok(sqlx_err) => StoreError::Database(sqlx_err),
            Err(_) => StoreError::Contention,
        })
    }

    async fn exists(&self, id: Uuid) -> StoreResult<bool> {
        let row = sqlx::query("SELECT 1 FROM ocr_jobs WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool())
            .await?;
        Ok(row.is_some())
    }

    async fn restore(&self, id: Uuid) -> StoreResult<()> {
        sqlx::query("UPDATE ocr_jobs SET reserved_at = NULL WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    async fn hard_delete(&self, ids: &[Uuid]) -> StoreResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let deduped: Vec<Uuid> = {
            let mut seen = std::collections::HashSet::new();
            ids.iter().copied().filter(|id| seen.insert(*id)).collect()
        };
        let result = sqlx::query("DELETE FROM ocr_jobs WHERE id = ANY($1)")
            .bind(&deduped)
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected())
    }

    async fn stats(&self) -> StoreResult<JobStoreStats> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) FILTER (WHERE reserved_at IS NULL) AS available,
                COUNT(*) FILTER (WHERE reserved_at IS NOT NULL) AS in_flight
            FROM ocr_jobs
            "#,
        )
        .fetch_one(self.pool())
        .await?;

        Ok(JobStoreStats {
            available: row.get("available"),
            in_flight: row.get("in_flight"),
        })
    }

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<OcrJob>> {
        let job = sqlx::query_as::<_, OcrJob>(
            "SELECT id, workspace_id, image, ocr, created_at, reserved_at FROM ocr_jobs WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await?;
        Ok(job)
    }

    /// Excludes reserved rows -- clients must not see jobs mid-extraction.
    async fn find_by_workspace(&self, workspace_id: Uuid, limit: i64, offset: i64) -> StoreResult<Vec<OcrJob>> {
        let jobs = sqlx::query_as::<_, OcrJob>(
            r#"
            SELECT id, workspace_id, image, ocr, created_at, reserved_at
            FROM ocr_jobs
            WHERE workspace_id = $1 AND reserved_at IS NULL
            ORDER BY created_at ASC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(workspace_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool())
        .await?;
        Ok(jobs)
    }
}
