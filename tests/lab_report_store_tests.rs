mod helpers;

use labscribe::models::lab_report::{LabReportDraft, LabReportItemDraft};
use labscribe::store::ocr_jobs::PgJobStore;
use labscribe::store::users::PgUserStore;
use labscribe::store::workspaces::PgWorkspaceStore;
use labscribe::store::{JobStore, NewOcrJob, ReportSearch, ReportStore};
use labscribe::store::lab_reports::PgReportStore;

fn draft(ocr_job_id: uuid::Uuid, patient: &str, item_name: &str) -> LabReportDraft {
    LabReportDraft {
        ocr_job_id,
        patient: patient.to_string(),
        report_time: None,
        doctor: None,
        hospital: None,
        report_image: "img.png".to_string(),
        items: vec![LabReportItemDraft {
            item_name: item_name.to_string(),
            result: "13.5".to_string(),
            unit: Some("g/dL".to_string()),
            reference_value: None,
        }],
    }
}

#[tokio::test]
async fn create_looks_up_workspace_from_ocr_job_and_commits_items_atomically() {
    let test_db = helpers::setup_test_db().await;
    let users = PgUserStore::new(test_db.db.pool.clone());
    let workspaces = PgWorkspaceStore::new(test_db.db.pool.clone());
    let jobs = PgJobStore::new(test_db.db.clone());
    let reports = PgReportStore::new(test_db.db.pool.clone());

    let user = users.create("carol", "hash").await.unwrap();
    let workspace = workspaces.create("ws", user.id).await.unwrap();
    let job = jobs
        .insert_batch(workspace.id, vec![NewOcrJob { image: "a.png".into(), ocr: "text".into() }])
        .await
        .unwrap()
        .remove(0);

    let created = reports.create(&draft(job.id, "Jane Doe", "Hemoglobin")).await.unwrap();
    assert_eq!(created.report.workspace_id, workspace.id);
    assert_eq!(created.items.as_ref().unwrap().len(), 1);
}

#[tokio::test]
async fn create_fails_not_found_once_originating_job_is_gone() {
    let test_db = helpers::setup_test_db().await;
    let users = PgUserStore::new(test_db.db.pool.clone());
    let workspaces = PgWorkspaceStore::new(test_db.db.pool.clone());
    let jobs = PgJobStore::new(test_db.db.clone());
    let reports = PgReportStore::new(test_db.db.pool.clone());

    let user = users.create("dave", "hash").await.unwrap();
    let workspace = workspaces.create("ws", user.id).await.unwrap();
    let job = jobs
        .insert_batch(workspace.id, vec![NewOcrJob { image: "a.png".into(), ocr: "text".into() }])
        .await
        .unwrap()
        .remove(0);

    jobs.hard_delete(&[job.id]).await.unwrap();

    let result = reports.create(&draft(job.id, "Jane Doe", "Hemoglobin")).await;
    assert!(matches!(result, Err(labscribe::store::StoreError::NotFound)));
}

#[tokio::test]
async fn search_applies_all_sentinel_and_item_name_filter() {
    let test_db = helpers::setup_test_db().await;
    let users = PgUserStore::new(test_db.db.pool.clone());
    let workspaces = PgWorkspaceStore::new(test_db.db.pool.clone());
    let jobs = PgJobStore::new(test_db.db.clone());
    let reports = PgReportStore::new(test_db.db.pool.clone());

    let user = users.create("erin", "hash").await.unwrap();
    let workspace = workspaces.create("ws", user.id).await.unwrap();

    let job_a = jobs.insert_batch(workspace.id, vec![NewOcrJob { image: "a".into(), ocr: "a".into() }]).await.unwrap().remove(0);
    let job_b = jobs.insert_batch(workspace.id, vec![NewOcrJob { image: "b".into(), ocr: "b".into() }]).await.unwrap().remove(0);

    reports.create(&draft(job_a.id, "Jane Doe", "Hemoglobin")).await.unwrap();
    reports.create(&draft(job_b.id, "John Roe", "Glucose")).await.unwrap();

    let (all_reports, pagination) = reports
        .search(ReportSearch {
            workspace_id: Some(workspace.id),
            patients: vec!["all".to_string()],
            item_names: Some(vec!["Hemoglobin".to_string()]),
            from: None,
            to: None,
            page: 1,
            page_size: 20,
        })
        .await
        .unwrap();

    assert_eq!(pagination.total_count, 2, "both reports match patients=all regardless of item filter");
    for report in &all_reports {
        let items = report.items.as_ref().unwrap();
        if report.report.patient == "Jane Doe" {
            assert_eq!(items.len(), 1);
        } else {
            assert!(items.is_empty(), "John Roe's Glucose item should be filtered out");
        }
    }

    let (no_items, _) = reports
        .search(ReportSearch {
            workspace_id: Some(workspace.id),
            patients: vec!["all".to_string()],
            item_names: None,
            from: None,
            to: None,
            page: 1,
            page_size: 20,
        })
        .await
        .unwrap();
    assert!(no_items.iter().all(|r| r.items.is_none()));
}
