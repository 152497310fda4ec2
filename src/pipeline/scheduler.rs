use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::RwLock;

use super::orchestrator::BatchOrchestrator;

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("scheduler is already running")]
    AlreadyRunning,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct SchedulerStatus {
    pub running: bool,
    pub task_count: u64,
    pub started_at: Option<DateTime<Utc>>,
    pub last_ran_at: Option<DateTime<Utc>>,
    pub total_runtime_ms: u64,
}

/// Long-lived driver re-invoking the orchestrator with the delay it returns
/// States: Idle -> Running -> Stopping. A second `start` while
/// Running fails with `AlreadyRunning`; `stop` cancels the pending wakeup
/// and lets any in-flight iteration finish unobserved.
pub struct AdaptiveScheduler {
    orchestrator: Arc<BatchOrchestrator>,
    running: AtomicBool,
    stopping: AtomicBool,
    task_count: AtomicU64,
    total_runtime_ms: AtomicU64,
    started_at: RwLock<Option<DateTime<Utc>>>,
    last_ran_at: RwLock<Option<DateTime<Utc>>>,
}

impl AdaptiveScheduler {
    pub fn new(orchestrator: Arc<BatchOrchestrator>) -> Arc<Self> {
        Arc::new(Self {
            orchestrator,
            running: AtomicBool::new(false),
            stopping: AtomicBool::new(false),
            task_count: AtomicU64::new(0),
            total_runtime_ms: AtomicU64::new(0),
            started_at: RwLock::new(None),
            last_ran_at: RwLock::new(None),
        })
    }

    pub async fn start(self: &Arc<Self>) -> Result<(), SchedulerError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(SchedulerError::AlreadyRunning);
        }
        self.stopping.store(false, Ordering::SeqCst);
        *self.started_at.write().await = Some(Utc::now());

        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.run_loop().await;
        });

        Ok(())
    }

    pub fn stop(&self) {
        self.stopping.store(true, Ordering::SeqCst);
    }

    async fn run_loop(self: Arc<Self>) {
        // 0ms is honored as a single asynchronous hop, never a tight loop --
        // `tokio::time::sleep(Duration::ZERO)` still yields once.
        let mut delay_ms: u64 = 0;

        loop {
            if self.stopping.load(Ordering::SeqCst) {
                break;
            }

            tokio::time::sleep(Duration::from_millis(delay_ms)).await;

            if self.stopping.load(Ordering::SeqCst) {
                break;
            }

            let iteration_start = std::time::Instant::now();
            delay_ms = self.orchestrator.run_once().await;
            let elapsed = iteration_start.elapsed();

            self.task_count.fetch_add(1, Ordering::SeqCst);
            self.total_runtime_ms.fetch_add(elapsed.as_millis() as u64, Ordering::SeqCst);
            *self.last_ran_at.write().await = Some(Utc::now());
        }

        self.running.store(false, Ordering::SeqCst);
    }

    pub async fn status(&self) -> SchedulerStatus {
        SchedulerStatus {
            running: self.running.load(Ordering::SeqCst),
            task_count: self.task_count.load(Ordering::SeqCst),
            started_at: *self.started_at.read().await,
            last_ran_at: *self.last_ran_at.read().await,
            total_runtime_ms: self.total_runtime_ms.load(Ordering::SeqCst),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::{ExtractError, Extractor};
    use crate::models::lab_report::LabReportDraft;
    use crate::models::lab_report::{LabReportItem, UpdateLabReportItemRequest};
    use crate::models::ocr_job::{JobStoreStats, OcrJob};
    use crate::models::responses::PaginationInfo;
    use crate::notify::Hub;
    use crate::store::{JobStore, NewOcrJob, ReportSearch, ReportStore, StoreResult, WorkspaceLookup};
    use async_trait::async_trait;
    use uuid::Uuid;

    /// Always reports an empty queue, so the orchestrator takes the long-delay
    /// path on every iteration without needing a real report store or extractor.
    struct EmptyJobStore;

    #[async_trait]
    impl JobStore for EmptyJobStore {
        async fn insert_batch(&self, _workspace_id: Uuid, _entries: Vec<NewOcrJob>) -> StoreResult<Vec<OcrJob>> {
            unimplemented!()
        }
        async fn reserve_and_take(&self, _n: i64) -> StoreResult<Vec<OcrJob>> {
            Ok(Vec::new())
        }
        async fn exists(&self, _id: Uuid) -> StoreResult<bool> {
            unimplemented!()
        }
        async fn restore(&self, _id: Uuid) -> StoreResult<()> {
            unimplemented!()
        }
        async fn hard_delete(&self, _ids: &[Uuid]) -> StoreResult<u64> {
            unimplemented!()
        }
        async fn stats(&self) -> StoreResult<JobStoreStats> {
            unimplemented!()
        }
        async fn find_by_id(&self, _id: Uuid) -> StoreResult<Option<OcrJob>> {
            unimplemented!()
        }
        async fn find_by_workspace(&self, _workspace_id: Uuid, _limit: i64, _offset: i64) -> StoreResult<Vec<OcrJob>> {
            unimplemented!()
        }
    }

    struct UnusedReportStore;

    #[async_trait]
    impl ReportStore for UnusedReportStore {
        async fn create(&self, _draft: &LabReportDraft) -> StoreResult<crate::models::lab_report::LabReportWithItems> {
            unimplemented!()
        }
        async fn find_with_items(&self, _id: Uuid) -> StoreResult<Option<crate::models::lab_report::LabReportWithItems>> {
            unimplemented!()
        }
        async fn find_by_workspace(
            &self,
            _workspace_id: Uuid,
            _page: i64,
            _page_size: i64,
        ) -> StoreResult<(Vec<crate::models::lab_report::LabReportWithItems>, PaginationInfo)> {
            unimplemented!()
        }
        async fn search(&self, _search: ReportSearch) -> StoreResult<(Vec<crate::models::lab_report::LabReportWithItems>, PaginationInfo)> {
            unimplemented!()
        }
        async fn update_item(&self, _id: Uuid, _patch: &UpdateLabReportItemRequest) -> StoreResult<LabReportItem> {
            unimplemented!()
        }
    }

    struct UnusedExtractor;

    #[async_trait]
    impl Extractor for UnusedExtractor {
        async fn extract(&self, _jobs: &[OcrJob]) -> Result<Vec<LabReportDraft>, ExtractError> {
            unimplemented!()
        }
    }

    struct UnusedWorkspaceLookup;

    #[async_trait]
    impl WorkspaceLookup for UnusedWorkspaceLookup {
        async fn find_owner(&self, _workspace_id: Uuid) -> StoreResult<Option<Uuid>> {
            unimplemented!()
        }
    }

    fn idle_orchestrator() -> Arc<BatchOrchestrator> {
        Arc::new(BatchOrchestrator::new(
            Arc::new(EmptyJobStore),
            Arc::new(UnusedReportStore),
            Arc::new(UnusedExtractor),
            Arc::new(Hub::new(Duration::from_secs(3600))),
            Arc::new(UnusedWorkspaceLookup),
            5,
            5,
            10,
            5,
        ))
    }

    #[tokio::test]
    async fn start_twice_fails_with_already_running() {
        let scheduler = AdaptiveScheduler::new(idle_orchestrator());
        assert!(scheduler.start().await.is_ok());
        assert!(matches!(scheduler.start().await, Err(SchedulerError::AlreadyRunning)));
        scheduler.stop();
    }

    #[tokio::test]
    async fn status_reflects_running_and_records_iterations() {
        let scheduler = AdaptiveScheduler::new(idle_orchestrator());
        scheduler.start().await.unwrap();

        let status = scheduler.status().await;
        assert!(status.running);
        assert!(status.started_at.is_some());

        tokio::time::sleep(Duration::from_millis(60)).await;
        scheduler.stop();
        tokio::time::sleep(Duration::from_millis(30)).await;

        let status = scheduler.status().await;
        assert!(status.task_count >= 1, "the long-delay loop should have run at least once in 60ms at a 10ms delay");
    }

    #[tokio::test]
    async fn stop_eventually_clears_running() {
        let scheduler = AdaptiveScheduler::new(idle_orchestrator());
        scheduler.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        scheduler.stop();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(!scheduler.status().await.running, "run_loop must clear `running` once it observes `stopping`");
    }
}
