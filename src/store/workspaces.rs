use async_trait::async_trait;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use super::{StoreError, StoreResult, WorkspaceLookup};
use crate::models::workspace::Workspace;

#[derive(Clone)]
pub struct PgWorkspaceStore {
    pool: PgPool,
}

impl PgWorkspaceStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Relies on the `(name, owner_id)` unique constraint rather than a
    /// check-then-insert: a racing duplicate insert surfaces as SQLSTATE
    /// 23505, which is mapped to `StoreError::Conflict` here instead of
    /// falling through to the generic `sqlx::Error` conversion.
    pub async fn create(&self, name: &str, owner_id: Uuid) -> StoreResult<Workspace> {
        let result = sqlx::query_as::<_, Workspace>(
            r#"
            INSERT INTO workspaces (name, owner_id)
            VALUES ($1, $2)
            RETURNING id, name, owner_id, created_at
            "#,
        )
        .bind(name)
        .bind(owner_id)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(workspace) => Ok(workspace),
            Err(sqlx::Error::Database(db_err)) if db_err.code().as_deref() == Some("23505") => {
                Err(StoreError::Conflict(format!("workspace '{name}' already exists")))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn find_by_owner(&self, owner_id: Uuid) -> StoreResult<Vec<Workspace>> {
        let workspaces = sqlx::query_as::<_, Workspace>(
            "SELECT id, name, owner_id, created_at FROM workspaces WHERE owner_id = $1 ORDER BY created_at ASC",
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(workspaces)
    }

    pub async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<Workspace>> {
        let workspace = sqlx::query_as::<_, Workspace>(
            "SELECT id, name, owner_id, created_at FROM workspaces WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(workspace)
    }

    /// `true` iff the workspace exists and is owned by `owner_id`.
    pub async fn is_owned_by(&self, id: Uuid, owner_id: Uuid) -> StoreResult<bool> {
        let row = sqlx::query("SELECT 1 FROM workspaces WHERE id = $1 AND owner_id = $2")
            .bind(id)
            .bind(owner_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    /// Cascade-deletes owned `ocr_jobs` and `lab_reports` via FK constraints.
    pub async fn delete(&self, id: Uuid, owner_id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM workspaces WHERE id = $1 AND owner_id = $2")
            .bind(id)
            .bind(owner_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl WorkspaceLookup for PgWorkspaceStore {
    async fn find_owner(&self, workspace_id: Uuid) -> StoreResult<Option<Uuid>> {
        Ok(self.find_by_id(workspace_id).await?.map(|w| w.owner_id))
    }
}
