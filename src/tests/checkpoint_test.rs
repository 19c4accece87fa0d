//! Checkpoint store tests: atomic writes, disjoint progress sets, resume.

use crate::services::checkpoint_service::CheckpointService;

fn service_in(dir: &tempfile::TempDir) -> CheckpointService {
    CheckpointService::new(dir.path().join("extraction_checkpoint.json"))
}

#[test]
fn batch_id_is_deterministic_per_company_and_day() {
    let a = CheckpointService::batch_id("batch", "vitrolife");
    let b = CheckpointService::batch_id("batch", "vitrolife");
    assert_eq!(a, b);
    assert!(a.starts_with("batch_vitrolife_"));
    // trailing date component: yyyy-mm-dd
    let date = a.rsplit('_').next().unwrap();
    assert_eq!(date.len(), 10);
}

#[test]
fn records_completed_and_failed_files() {
    let dir = tempfile::tempdir().unwrap();
    let service = service_in(&dir);

    service.start_batch("batch_acme_2024-10-01", 5).unwrap();
    service
        .add_completed("batch_acme_2024-10-01", "pending/q1.pdf")
        .unwrap();
    service
        .add_failed("batch_acme_2024-10-01", "pending/q2.pdf", "deadline exceeded")
        .unwrap();

    let data = service.load("batch_acme_2024-10-01").unwrap();
    assert_eq!(data.completed, vec!["pending/q1.pdf"]);
    assert_eq!(data.failed.len(), 1);
    assert_eq!(data.failed[0].error, "deadline exceeded");
    assert_eq!(data.last_file, "pending/q2.pdf");
    assert_eq!(data.total_files, 5);
    assert!(data.is_resumable());
    assert_eq!(data.remaining(), 3);
}

#[test]
fn completed_and_failed_stay_disjoint() {
    let dir = tempfile::tempdir().unwrap();
    let service = service_in(&dir);
    let batch = "batch_acme_2024-10-01";

    service.start_batch(batch, 2).unwrap();
    // a file that failed once and then succeeded on retry
    service.add_failed(batch, "q1.pdf", "timeout").unwrap();
    service.add_completed(batch, "q1.pdf").unwrap();
    // a completed file cannot be failed afterwards
    service.add_failed(batch, "q1.pdf", "late error").unwrap();

    let data = service.load(batch).unwrap();
    assert_eq!(data.completed, vec!["q1.pdf"]);
    assert!(data.failed.is_empty());
}

#[test]
fn duplicate_entries_are_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let service = service_in(&dir);
    let batch = "batch_acme_2024-10-01";

    service.add_completed(batch, "q1.pdf").unwrap();
    service.add_completed(batch, "q1.pdf").unwrap();
    service.add_failed(batch, "q2.pdf", "a").unwrap();
    service.add_failed(batch, "q2.pdf", "b").unwrap();

    let data = service.load(batch).unwrap();
    assert_eq!(data.completed.len(), 1);
    assert_eq!(data.failed.len(), 1);
    assert_eq!(data.failed[0].error, "a");
}

#[test]
fn writes_are_atomic_and_multi_batch() {
    let dir = tempfile::tempdir().unwrap();
    let service = service_in(&dir);

    service.add_completed("batch_acme_2024-10-01", "a.pdf").unwrap();
    service.add_completed("batch_orkla_2024-10-01", "b.pdf").unwrap();

    // no temp file left behind after the rename
    assert!(!dir.path().join("extraction_checkpoint.tmp").exists());

    let all = service.load_all();
    assert_eq!(all.len(), 2);
    assert!(all.contains_key("batch_acme_2024-10-01"));
    assert!(all.contains_key("batch_orkla_2024-10-01"));
}

#[test]
fn resumable_batches_excludes_finished_ones() {
    let dir = tempfile::tempdir().unwrap();
    let service = service_in(&dir);

    service.start_batch("done_batch", 1).unwrap();
    service.add_completed("done_batch", "a.pdf").unwrap();

    service.start_batch("half_batch", 5).unwrap();
    service.add_completed("half_batch", "a.pdf").unwrap();
    service.add_completed("half_batch", "b.pdf").unwrap();
    service.add_completed("half_batch", "c.pdf").unwrap();

    let resumable = service.resumable_batches();
    assert_eq!(resumable.len(), 1);
    assert_eq!(resumable[0].batch_id, "half_batch");
    assert_eq!(resumable[0].completed, 3);
    assert_eq!(resumable[0].remaining, 2);
}

#[test]
fn completed_files_drive_resume_filtering() {
    let dir = tempfile::tempdir().unwrap();
    let service = service_in(&dir);
    let batch = "batch_acme_2024-10-01";

    service.start_batch(batch, 5).unwrap();
    for f in ["a.pdf", "b.pdf", "c.pdf"] {
        service.add_completed(batch, f).unwrap();
    }

    // crash and restart: only the two remaining files get dispatched
    let done = service.completed_files(batch);
    let all = ["a.pdf", "b.pdf", "c.pdf", "d.pdf", "e.pdf"];
    let remaining: Vec<&str> = all
        .iter()
        .filter(|f| !done.contains(**f))
        .copied()
        .collect();
    assert_eq!(remaining, vec!["d.pdf", "e.pdf"]);
}

#[test]
fn corrupt_checkpoint_reads_as_empty() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("extraction_checkpoint.json");
    std::fs::write(&path, "{not valid json").unwrap();

    let service = CheckpointService::new(path.clone());
    assert!(service.load_all().is_empty());

    // and the next write recovers the file
    service.add_completed("batch_x", "a.pdf").unwrap();
    assert_eq!(service.load_all().len(), 1);
}

#[test]
fn clear_removes_only_the_given_batch() {
    let dir = tempfile::tempdir().unwrap();
    let service = service_in(&dir);

    service.add_completed("batch_a", "1.pdf").unwrap();
    service.add_completed("batch_b", "2.pdf").unwrap();
    service.clear("batch_a").unwrap();

    let all = service.load_all();
    assert_eq!(all.len(), 1);
    assert!(all.contains_key("batch_b"));
}
