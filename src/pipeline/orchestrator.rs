use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use uuid::Uuid;

use crate::extractor::Extractor;
use crate::models::lab_report::LabReportDraft;
use crate::notify::Hub;
use crate::store::{JobStore, ReportStore, WorkspaceLookup};

/// One orchestrator run: reserve -> extract -> reconcile -> commit/restore,
/// producing the scheduler's next delay. Only one iteration per
/// instance runs at a time; a concurrent entry short-circuits with
/// `long_delay_ms` rather than waiting.
pub struct BatchOrchestrator {
    jobs: Arc<dyn JobStore>,
    reports: Arc<dyn ReportStore>,
    extractor: Arc<dyn Extractor>,
    hub: Arc<Hub>,
    workspaces: Arc<dyn WorkspaceLookup>,
    running: AtomicBool,
    batch_size: i64,
    immediate_delay_ms: u64,
    long_delay_ms: u64,
    error_delay_ms: u64,
}

impl BatchOrchestrator {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        reports: Arc<dyn ReportStore>,
        extractor: Arc<dyn Extractor>,
        hub: Arc<Hub>,
        workspaces: Arc<dyn WorkspaceLookup>,
        batch_size: i64,
        immediate_delay_ms: u64,
        long_delay_ms: u64,
        error_delay_ms: u64,
    ) -> Self {
        Self {
            jobs,
            reports,
            extractor,
            hub,
            workspaces,
            running: AtomicBool::new(false),
            batch_size,
            immediate_delay_ms,
            long_delay_ms,
            error_delay_ms,
        }
    }

    /// Runs one iteration. Never returns an error -- failures are logged
    /// and folded into the returned delay -- the orchestrator never raises.
    pub async fn run_once(&self) -> u64 {
        if self.running.swap(true, Ordering::SeqCst) {
            tracing::debug!("orchestrator iteration already in flight, short-circuiting");
            return self.long_delay_ms;
        }

        let delay = self.run_once_inner().await;
        self.running.store(false, Ordering::SeqCst);
        delay
    }

    async fn run_once_inner(&self) -> u64 {
        if self.batch_size <= 0 {
            return self.long_delay_ms;
        }

        let reserved = match self.jobs.reserve_and_take(self.batch_size).await {
            Ok(jobs) => jobs,
            Err(e) => {
                tracing::error!(error = %e, "reserveAndTake failed");
                return self.error_delay_ms;
            }
        };

        if reserved.is_empty() {
            return self.long_delay_ms;
        }

        let reserved_ids: HashSet<Uuid> = reserved.iter().map(|j| j.id).collect();
        let batch_was_full = reserved.len() as i64 == self.batch_size;

        let drafts = match self.extractor.extract(&reserved).await {
            Ok(drafts) => drafts,
            Err(e) => {
                tracing::warn!(error = %e, "extractor batch failed, restoring all reserved jobs");
                for job in &reserved {
                    if let Err(e) = self.restore_if_exists(job.id).await {
                        tracing::error!(job_id = %job.id, error = %e, "failed to restore job after extractor error");
                    }
                }
                return self.error_delay_ms;
            }
        };

        let mut drafts_by_job: HashMap<Uuid, LabReportDraft> = HashMap::new();
        for draft in drafts {
            if reserved_ids.contains(&draft.ocr_job_id) {
                drafts_by_job.insert(draft.ocr_job_id, draft);
            }
        }

        let mut processed = 0usize;
        let mut failed = 0usize;
        let mut skipped = 0usize;

        for job in &reserved {
            match drafts_by_job.remove(&job.id) {
                Some(draft) => match self.commit_draft(job.id, job.workspace_id, &draft).await {
                    Ok(true) => processed += 1,
                    Ok(false) => skipped += 1,
                    Err(e) => {
                        tracing::error!(job_id = %job.id, error = %e, "failed to commit draft");
                        failed += 1;
                    }
                },
                None => match self.jobs.exists(job.id).await {
                    Ok(true) => {
                        if let Err(e) = self.jobs.restore(job.id).await {
                            tracing::error!(job_id = %job.id, error = %e, "failed to restore job without draft");
                        }
                        failed += 1;
                    }
                    Ok(false) => skipped += 1,
                    Err(e) => {
                        tracing::error!(job_id = %job.id, error = %e, "failed to check job existence");
                        failed += 1;
                    }
                },
            }
        }

        tracing::info!(processed, failed, skipped, reserved = reserved.len(), "orchestrator iteration complete");

        if failed > 0 || batch_was_full {
            self.immediate_delay_ms
        } else {
            self.long_delay_ms
        }
    }

    async fn restore_if_exists(&self, job_id: Uuid) -> Result<(), crate::store::StoreError> {
        if self.jobs.exists(job_id).await? {
            self.jobs.restore(job_id).await?;
        }
        Ok(())
    }

    /// Returns `Ok(true)` on a committed report, `Ok(false)` if the job was
    /// cancelled out from under the draft (client hard-delete).
    async fn commit_draft(&self, job_id: Uuid, workspace_id: Uuid, draft: &LabReportDraft) -> anyhow::Result<bool> {
        if !self.jobs.exists(job_id).await? {
            return Ok(false);
        }

        let report = self.reports.create(draft).await?;
        self.jobs.hard_delete(&[job_id]).await?;

        match self.workspaces.find_owner(workspace_id).await {
            Ok(Some(owner_id)) => {
                let pushed = self.hub.send(owner_id, report.report.id, job_id).await;
                if !pushed {
                    tracing::debug!(job_id = %job_id, "no live session to notify of committed report");
                }
            }
            Ok(None) => tracing::debug!(job_id = %job_id, "workspace gone by commit time, skipping notify"),
            Err(e) => tracing::error!(job_id = %job_id, error = %e, "failed to resolve workspace owner for notify"),
        }

        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::lab_report::{LabReportItem, LabReportItemDraft, LabReportWithItems};
    use crate::models::ocr_job::{JobStoreStats, OcrJob};
    use crate::models::responses::PaginationInfo;
    use crate::store::StoreResult;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::Mutex as StdMutex;

    struct FakeJobStore {
        jobs: StdMutex<Vec<OcrJob>>,
    }

    impl FakeJobStore {
        fn seeded(n: usize, workspace_id: Uuid) -> Self {
            let jobs = (0..n)
                .map(|i| OcrJob {
                    id: Uuid::new_v4(),
                    workspace_id,
                    image: format!("img-{i}"),
                    ocr: format!("ocr-{i}"),
                    created_at: Utc::now(),
                    reserved_at: None,
                })
                .collect();
            Self { jobs: StdMutex::new(jobs) }
        }
    }

    #[async_trait]
    impl JobStore for FakeJobStore {
        async fn insert_batch(&self, _workspace_id: Uuid, _entries: Vec<crate::store::NewOcrJob>) -> StoreResult<Vec<OcrJob>> {
            unimplemented!("not exercised by orchestrator tests")
        }

        async fn reserve_and_take(&self, n: i64) -> StoreResult<Vec<OcrJob>> {
            let mut jobs = self.jobs.lock().unwrap();
            let mut taken = Vec::new();
            for job in jobs.iter_mut() {
                if job.reserved_at.is_none() && (taken.len() as i64) < n {
                    job.reserved_at = Some(Utc::now());
                    taken.push(job.clone());
                }
            }
            Ok(taken)
        }

        async fn exists(&self, id: Uuid) -> StoreResult<bool> {
            Ok(self.jobs.lock().unwrap().iter().any(|j| j.id == id))
        }

        async fn restore(&self, id: Uuid) -> StoreResult<()> {
            let mut jobs = self.jobs.lock().unwrap();
            if let Some(job) = jobs.iter_mut().find(|j| j.id == id) {
                job.reserved_at = None;
            }
            Ok(())
        }

        async fn hard_delete(&self, ids: &[Uuid]) -> StoreResult<u64> {
            let mut jobs = self.jobs.lock().unwrap();
            let before = jobs.len();
            jobs.retain(|j| !ids.contains(&j.id));
            Ok((before - jobs.len()) as u64)
        }

        async fn stats(&self) -> StoreResult<JobStoreStats> {
            let jobs = self.jobs.lock().unwrap();
            let in_flight = jobs.iter().filter(|j| j.reserved_at.is_some()).count() as i64;
            Ok(JobStoreStats { available: jobs.len() as i64 - in_flight, in_flight })
        }

        async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<OcrJob>> {
            Ok(self.jobs.lock().unwrap().iter().find(|j| j.id == id).cloned())
        }

        async fn find_by_workspace(&self, _workspace_id: Uuid, _limit: i64, _offset: i64) -> StoreResult<Vec<OcrJob>> {
            Ok(self.jobs.lock().unwrap().clone())
        }
    }

    struct FakeReportStore {
        fail_create: bool,
    }

    #[async_trait]
    impl ReportStore for FakeReportStore {
        async fn create(&self, draft: &LabReportDraft) -> StoreResult<LabReportWithItems> {
            if self.fail_create {
                return Err(crate::store::StoreError::Validation("forced failure".to_string()));
            }
            let report_id = Uuid::new_v4();
            Ok(LabReportWithItems {
                report: crate::models::lab_report::LabReport {
                    id: report_id,
                    workspace_id: Uuid::new_v4(),
                    patient: draft.patient.clone(),
                    report_time: Utc::now(),
                    doctor: draft.doctor.clone(),
                    hospital: draft.hospital.clone(),
                    report_image: draft.report_image.clone(),
                    created_at: Utc::now(),
                },
                items: Some(
                    draft
                        .items
                        .iter()
                        .map(|i: &LabReportItemDraft| LabReportItem {
                            id: Uuid::new_v4(),
                            parent_report_id: report_id,
                            item_name: i.item_name.clone(),
                            result: i.result.clone(),
                            unit: i.unit.clone(),
                            reference_value: i.reference_value.clone(),
                        })
                        .collect(),
                ),
            })
        }

        async fn find_with_items(&self, _id: Uuid) -> StoreResult<Option<LabReportWithItems>> {
            unimplemented!()
        }

        async fn find_by_workspace(&self, _workspace_id: Uuid, _page: i64, _page_size: i64) -> StoreResult<(Vec<LabReportWithItems>, PaginationInfo)> {
            unimplemented!()
        }

        async fn search(&self, _search: crate::store::ReportSearch) -> StoreResult<(Vec<LabReportWithItems>, PaginationInfo)> {
            unimplemented!()
        }

        async fn update_item(
            &self,
            _id: Uuid,
            _patch: &crate::models::lab_report::UpdateLabReportItemRequest,
        ) -> StoreResult<LabReportItem> {
            unimplemented!()
        }
    }

    struct FakeExtractor {
        fail: bool,
        drafts_for: Box<dyn Fn(&[OcrJob]) -> Vec<LabReportDraft> + Send + Sync>,
    }

    #[async_trait]
    impl Extractor for FakeExtractor {
        async fn extract(&self, jobs: &[OcrJob]) -> Result<Vec<LabReportDraft>, crate::extractor::ExtractError> {
            if self.fail {
                return Err(crate::extractor::ExtractError::Transport("forced failure".to_string()));
            }
            Ok((self.drafts_for)(jobs))
        }
    }

    struct FakeWorkspaceLookup {
        owner_id: Uuid,
    }

    #[async_trait]
    impl WorkspaceLookup for FakeWorkspaceLookup {
        async fn find_owner(&self, _workspace_id: Uuid) -> StoreResult<Option<Uuid>> {
            Ok(Some(self.owner_id))
        }
    }

    fn draft_for(job: &OcrJob) -> LabReportDraft {
        LabReportDraft {
            ocr_job_id: job.id,
            patient: "Jane Doe".to_string(),
            report_time: None,
            doctor: None,
            hospital: None,
            report_image: job.image.clone(),
            items: vec![LabReportItemDraft {
                item_name: "Hemoglobin".to_string(),
                result: "13.5".to_string(),
                unit: None,
                reference_value: None,
            }],
        }
    }

    fn build(
        jobs: FakeJobStore,
        reports: FakeReportStore,
        extractor: FakeExtractor,
        batch_size: i64,
    ) -> BatchOrchestrator {
        BatchOrchestrator::new(
            Arc::new(jobs),
            Arc::new(reports),
            Arc::new(extractor),
            Arc::new(Hub::new(std::time::Duration::from_secs(3600))),
            Arc::new(FakeWorkspaceLookup { owner_id: Uuid::new_v4() }),
            batch_size,
            10,
            60_000,
            5_000,
        )
    }

    #[tokio::test]
    async fn happy_path_commits_the_only_reserved_job_and_returns_long_delay() {
        let workspace_id = Uuid::new_v4();
        let jobs = FakeJobStore::seeded(1, workspace_id);
        let job_id = jobs.jobs.lock().unwrap()[0].id;

        let orchestrator = build(
            jobs,
            FakeReportStore { fail_create: false },
            FakeExtractor { fail: false, drafts_for: Box::new(move |js| js.iter().map(draft_for).collect()) },
            5,
        );

        let delay = orchestrator.run_once().await;
        assert_eq!(delay, 60_000, "batch wasn't full and nothing failed");
        assert!(!orchestrator.jobs.exists(job_id).await.unwrap(), "committed job must be hard-deleted");
    }

    #[tokio::test]
    async fn job_cancelled_during_extraction_is_skipped_without_a_commit() {
        let workspace_id = Uuid::new_v4();
        let jobs = FakeJobStore::seeded(1, workspace_id);
        let job_id = jobs.jobs.lock().unwrap()[0].id;
        let jobs = Arc::new(jobs);
        let jobs_for_extractor = Arc::clone(&jobs);

        let orchestrator = BatchOrchestrator::new(
            Arc::clone(&jobs) as Arc<dyn JobStore>,
            Arc::new(FakeReportStore { fail_create: false }),
            Arc::new(FakeExtractor {
                fail: false,
                drafts_for: Box::new(move |js| {
                    // Simulate the client hard-deleting the job while the batch was out for extraction:
                    // mutate the backing store directly rather than re-entering the async trait method.
                    jobs_for_extractor.jobs.lock().unwrap().retain(|j| j.id != job_id);
                    js.iter().map(draft_for).collect()
                }),
            }),
            Arc::new(Hub::new(std::time::Duration::from_secs(3600))),
            Arc::new(FakeWorkspaceLookup { owner_id: Uuid::new_v4() }),
            5,
            10,
            60_000,
            5_000,
        );

        let delay = orchestrator.run_once().await;
        assert_eq!(delay, 60_000, "a skip is not a failure");
    }

    #[tokio::test]
    async fn missing_draft_restores_the_job_and_counts_as_failed() {
        let workspace_id = Uuid::new_v4();
        let jobs = FakeJobStore::seeded(2, workspace_id);
        let ids: Vec<Uuid> = jobs.jobs.lock().unwrap().iter().map(|j| j.id).collect();
        let kept_id = ids[0];

        let orchestrator = build(
            jobs,
            FakeReportStore { fail_create: false },
            FakeExtractor {
                fail: false,
                drafts_for: Box::new(move |js| js.iter().filter(|j| j.id == kept_id).map(draft_for).collect()),
            },
            5,
        );

        let delay = orchestrator.run_once().await;
        assert_eq!(delay, 10, "a restored job counts as a failure, forcing the immediate retry delay");
        assert!(orchestrator.jobs.exists(kept_id).await.unwrap());
        let restored = orchestrator.jobs.find_by_id(kept_id).await.unwrap().unwrap();
        assert!(restored.reserved_at.is_none(), "job without a matching draft must be restored");
    }

    #[tokio::test]
    async fn extractor_failure_restores_every_reserved_job() {
        let workspace_id = Uuid::new_v4();
        let jobs = FakeJobStore::seeded(3, workspace_id);
        let ids: Vec<Uuid> = jobs.jobs.lock().unwrap().iter().map(|j| j.id).collect();

        let orchestrator = build(
            jobs,
            FakeReportStore { fail_create: false },
            FakeExtractor { fail: true, drafts_for: Box::new(|_| Vec::new()) },
            5,
        );

        let delay = orchestrator.run_once().await;
        assert_eq!(delay, 5_000);
        for id in ids {
            let job = orchestrator.jobs.find_by_id(id).await.unwrap().unwrap();
            assert!(job.reserved_at.is_none(), "every reserved job must be restored after a batch-level extractor failure");
        }
    }

    #[tokio::test]
    async fn non_positive_batch_size_returns_long_delay_without_touching_the_store() {
        let workspace_id = Uuid::new_v4();
        let jobs = FakeJobStore::seeded(1, workspace_id);

        let orchestrator = build(jobs, FakeReportStore { fail_create: false }, FakeExtractor { fail: true, drafts_for: Box::new(|_| Vec::new()) }, 0);

        let delay = orchestrator.run_once().await;
        assert_eq!(delay, 60_000);
    }

    #[tokio::test]
    async fn full_batch_returns_immediate_delay_even_with_no_failures() {
        let workspace_id = Uuid::new_v4();
        let jobs = FakeJobStore::seeded(2, workspace_id);

        let orchestrator = build(
            jobs,
            FakeReportStore { fail_create: false },
            FakeExtractor { fail: false, drafts_for: Box::new(move |js| js.iter().map(draft_for).collect()) },
            2,
        );

        let delay = orchestrator.run_once().await;
        assert_eq!(delay, 10, "batch was full, so another run should be scheduled immediately");
    }

    #[tokio::test]
    async fn concurrent_run_once_short_circuits_instead_of_blocking() {
        let workspace_id = Uuid::new_v4();
        let jobs = FakeJobStore::seeded(1, workspace_id);

        let orchestrator = Arc::new(build(
            jobs,
            FakeReportStore { fail_create: false },
            FakeExtractor { fail: false, drafts_for: Box::new(move |js| js.iter().map(draft_for).collect()) },
            5,
        ));

        orchestrator.running.store(true, Ordering::SeqCst);
        let delay = orchestrator.run_once().await;
        assert_eq!(delay, 60_000, "an in-flight iteration short-circuits with the long delay");
    }
}
