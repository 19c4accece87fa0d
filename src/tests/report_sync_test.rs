//! Report builder and file-sync integration tests.

use std::path::Path;

use super::common::{create_test_db, sample_payload};
use crate::config::{EmbeddingConfig, ExtractionConfig};
use crate::services::report_service::ReportService;
use crate::services::store::Store;
use crate::utils::fingerprint;

fn extraction_config(base: &Path) -> ExtractionConfig {
    ExtractionConfig {
        base_folder: base.display().to_string(),
        ..Default::default()
    }
}

#[tokio::test]
async fn update_company_log_writes_the_report() {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::new(create_test_db().await);
    let company = store.upsert_company("Vitrolife").await.unwrap();

    store
        .save_period_atomic(&company.id, &sample_payload(3, 2024), "a1b2c3d4e5f6", "q3.pdf")
        .await
        .unwrap();

    let service = ReportService::new(
        store,
        extraction_config(dir.path()),
        EmbeddingConfig::default(),
    );

    let periods = service.update_company_log("vitrolife").await.unwrap();
    assert_eq!(periods, 1);

    let log_path = dir
        .path()
        .join("vitrolife")
        .join("persisted")
        .join("extraction_log.txt");
    let log = std::fs::read_to_string(log_path).unwrap();
    assert!(log.contains("EXTRAKTIONSLOGG: VITROLIFE"));
    assert!(log.contains("Q3 2024"));
    // log totals agree with store totals
    assert!(log.contains("[OK] Tabeller: 2 | Sektioner: 2 | Grafer: 1"));
}

#[tokio::test]
async fn unknown_company_reports_zero_periods() {
    let dir = tempfile::tempdir().unwrap();
    let service = ReportService::new(
        Store::new(create_test_db().await),
        extraction_config(dir.path()),
        EmbeddingConfig::default(),
    );
    assert_eq!(service.update_company_log("nobody").await.unwrap(), 0);
}

#[tokio::test]
async fn sync_moves_persisted_files_out_of_pending() {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::new(create_test_db().await);
    let company = store.upsert_company("Acme").await.unwrap();

    let pending = dir.path().join("acme").join("pending");
    std::fs::create_dir_all(&pending).unwrap();

    // one file whose bytes the store knows, one it does not
    let known_bytes = b"%PDF-1.7 extracted".to_vec();
    std::fs::write(pending.join("acme-2024-q3-sv.pdf"), &known_bytes).unwrap();
    std::fs::write(pending.join("acme-2024-q4-sv.pdf"), b"%PDF-1.7 new").unwrap();

    store
        .save_period_atomic(
            &company.id,
            &sample_payload(3, 2024),
            &fingerprint(&known_bytes),
            "acme-2024-q3-sv.pdf",
        )
        .await
        .unwrap();

    let service = ReportService::new(
        store,
        extraction_config(dir.path()),
        EmbeddingConfig::default(),
    );
    let result = service.sync_files(&company).await.unwrap();

    assert_eq!(result.moved_to_persisted, 1);
    assert_eq!(result.not_in_store, 1);
    assert!(dir
        .path()
        .join("acme/persisted/acme-2024-q3-sv.pdf")
        .exists());
    assert!(pending.join("acme-2024-q4-sv.pdf").exists());
}

#[tokio::test]
async fn sync_moves_superseded_files_back_to_pending() {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::new(create_test_db().await);
    let company = store.upsert_company("Acme").await.unwrap();

    let persisted = dir.path().join("acme").join("persisted");
    std::fs::create_dir_all(&persisted).unwrap();
    // sits in persisted/ but its hash is no longer in the store
    std::fs::write(persisted.join("old-2023-q1.pdf"), b"%PDF-1.7 stale").unwrap();

    let service = ReportService::new(
        store,
        extraction_config(dir.path()),
        EmbeddingConfig::default(),
    );
    let result = service.sync_files(&company).await.unwrap();

    assert_eq!(result.moved_to_pending, 1);
    assert!(dir.path().join("acme/pending/old-2023-q1.pdf").exists());
    assert!(!persisted.join("old-2023-q1.pdf").exists());
}

#[tokio::test]
async fn summary_log_covers_all_companies() {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::new(create_test_db().await);

    let acme = store.upsert_company("Acme").await.unwrap();
    let orkla = store.upsert_company("Orkla").await.unwrap();
    store
        .save_period_atomic(&acme.id, &sample_payload(3, 2024), "aaaaaaaaaaaa", "a.pdf")
        .await
        .unwrap();
    store
        .save_period_atomic(&orkla.id, &sample_payload(2, 2024), "bbbbbbbbbbbb", "b.pdf")
        .await
        .unwrap();

    let service = ReportService::new(
        store,
        extraction_config(dir.path()),
        EmbeddingConfig::default(),
    );
    let path = service.write_summary_log().await.unwrap();
    let log = std::fs::read_to_string(path).unwrap();

    assert!(log.contains("SUMMERINGSLOGG"));
    assert!(log.contains("Acme"));
    assert!(log.contains("Orkla"));
    assert!(log.contains("Rapporter: 2"));
}
