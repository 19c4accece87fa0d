//! Store integration tests against an in-memory database.

use super::common::{create_test_db, sample_payload, sample_table_kinds};
use crate::services::store::Store;

#[tokio::test]
async fn upsert_company_is_idempotent_on_slug() {
    let store = Store::new(create_test_db().await);

    let first = store.upsert_company("Vitrolife AB (publ)").await.unwrap();
    let second = store.upsert_company("Vitrolife AB (publ)").await.unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(first.slug, "vitrolife-ab-publ");

    let companies = store.list_companies().await.unwrap();
    assert_eq!(companies.len(), 1);
}

#[tokio::test]
async fn save_and_load_period_round_trip() {
    let store = Store::new(create_test_db().await);
    let company = store.upsert_company("Acme").await.unwrap();

    let payload = sample_payload(3, 2024);
    store
        .save_period_atomic(&company.id, &payload, "a1b2c3d4e5f6", "acme-2024-q3-sv.pdf")
        .await
        .unwrap();

    let loaded = store
        .load_period(&company.id, 3, 2024)
        .await
        .unwrap()
        .expect("period should exist");

    assert_eq!(loaded.quarter, 3);
    assert_eq!(loaded.year, 2024);
    assert_eq!(loaded.tables.len(), 2);
    assert_eq!(loaded.sections.len(), 2);
    assert_eq!(loaded.charts.len(), 1);
    assert_eq!(loaded.tables[0].rows[0].label, "Nettoomsättning");
    assert_eq!(loaded.tables[0].columns.len(), 3);
    assert_eq!(
        loaded.tables.iter().map(|t| t.kind).collect::<Vec<_>>(),
        sample_table_kinds()
    );
    assert_eq!(loaded.extraction_meta.pass1_counts.tables, 2);
}

#[tokio::test]
async fn find_period_matches_on_hash() {
    let store = Store::new(create_test_db().await);
    let company = store.upsert_company("Acme").await.unwrap();

    let payload = sample_payload(3, 2024);
    store
        .save_period_atomic(&company.id, &payload, "a1b2c3d4e5f6", "acme-2024-q3-sv.pdf")
        .await
        .unwrap();

    // exact hit
    assert!(store
        .find_period(&company.id, 3, 2024, "a1b2c3d4e5f6")
        .await
        .unwrap()
        .is_some());
    // same period, different bytes: no cache hit
    assert!(store
        .find_period(&company.id, 3, 2024, "ffffffffffff")
        .await
        .unwrap()
        .is_none());
    // different period
    assert!(store
        .find_period(&company.id, 2, 2024, "a1b2c3d4e5f6")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn atomic_replace_leaves_no_orphans() {
    let pool = create_test_db().await;
    let store = Store::new(pool.clone());
    let company = store.upsert_company("Acme").await.unwrap();

    let payload = sample_payload(3, 2024);
    let first_id = store
        .save_period_atomic(&company.id, &payload, "a1b2c3d4e5f6", "v1.pdf")
        .await
        .unwrap();

    // re-extraction with modified bytes replaces the period wholesale
    let mut second = sample_payload(3, 2024);
    second.tables.truncate(1);
    let second_id = store
        .save_period_atomic(&company.id, &second, "ffffffffffff", "v2.pdf")
        .await
        .unwrap();
    assert_ne!(first_id, second_id);

    let periods = store.list_periods(&company.id).await.unwrap();
    assert_eq!(periods.len(), 1);
    assert_eq!(periods[0].pdf_hash, "ffffffffffff");

    // no rows from the previous version remain reachable
    let (orphans,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM report_tables WHERE period_id NOT IN (SELECT id FROM periods)",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(orphans, 0);

    let loaded = store
        .load_period(&company.id, 3, 2024)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(loaded.tables.len(), 1);
}

#[tokio::test]
async fn count_children_batch_uses_one_result_per_period() {
    let store = Store::new(create_test_db().await);
    let company = store.upsert_company("Acme").await.unwrap();

    store
        .save_period_atomic(&company.id, &sample_payload(1, 2024), "aaaaaaaaaaaa", "q1.pdf")
        .await
        .unwrap();
    store
        .save_period_atomic(&company.id, &sample_payload(2, 2024), "bbbbbbbbbbbb", "q2.pdf")
        .await
        .unwrap();

    let periods = store.list_periods(&company.id).await.unwrap();
    let ids: Vec<String> = periods.iter().map(|p| p.id.clone()).collect();
    let counts = store.count_children_batch(&ids).await.unwrap();

    assert_eq!(counts.len(), 2);
    for id in &ids {
        let c = counts[id];
        assert_eq!(c.tables, 2);
        assert_eq!(c.sections, 2);
        assert_eq!(c.charts, 1);
    }

    let totals = store.total_counts(&company.id).await.unwrap();
    assert_eq!(totals.tables, 4);
    assert_eq!(totals.sections, 4);
    assert_eq!(totals.charts, 2);
}

#[tokio::test]
async fn embedding_stats_track_backfill_progress() {
    let store = Store::new(create_test_db().await);
    let company = store.upsert_company("Acme").await.unwrap();

    store
        .save_period_atomic(&company.id, &sample_payload(3, 2024), "a1b2c3d4e5f6", "q3.pdf")
        .await
        .unwrap();

    let stats = store.embedding_stats(&company.id).await.unwrap();
    assert_eq!(stats.total_sections, 2);
    assert_eq!(stats.with_embedding, 0);

    let pending = store.sections_without_embedding(&company.id).await.unwrap();
    assert_eq!(pending.len(), 2);

    let vector = vec![0.1f32; 1024];
    store
        .set_section_embedding(pending[0].row_id, &vector)
        .await
        .unwrap();

    let stats = store.embedding_stats(&company.id).await.unwrap();
    assert_eq!(stats.with_embedding, 1);
    // already-embedded sections are not offered again
    let pending = store.sections_without_embedding(&company.id).await.unwrap();
    assert_eq!(pending.len(), 1);

    // the stored vector round-trips at full width
    let loaded = store
        .load_period(&company.id, 3, 2024)
        .await
        .unwrap()
        .unwrap();
    let embedded: Vec<_> = loaded
        .sections
        .iter()
        .filter_map(|s| s.embedding.as_ref())
        .collect();
    assert_eq!(embedded.len(), 1);
    assert_eq!(embedded[0].len(), 1024);
}

#[tokio::test]
async fn company_pdf_hashes_feed_file_sync() {
    let store = Store::new(create_test_db().await);
    let company = store.upsert_company("Acme").await.unwrap();

    store
        .save_period_atomic(&company.id, &sample_payload(1, 2024), "aaaaaaaaaaaa", "q1.pdf")
        .await
        .unwrap();
    store
        .save_period_atomic(&company.id, &sample_payload(2, 2024), "bbbbbbbbbbbb", "q2.pdf")
        .await
        .unwrap();

    let hashes = store.company_pdf_hashes(&company.id).await.unwrap();
    assert!(hashes.contains("aaaaaaaaaaaa"));
    assert!(hashes.contains("bbbbbbbbbbbb"));
    assert_eq!(hashes.len(), 2);
}
