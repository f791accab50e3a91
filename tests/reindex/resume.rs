//! Failed reindex jobs keep serving the old schema and resume from their checkpoint.

use crate::common::*;
use tessera::ReindexState;

fn small_checkpoints() -> EngineConfig {
    EngineConfig::default().with_checkpoint_interval(10)
}

#[tokio::test]
async fn failed_reindex_resumes_from_checkpoint() {
    let (service, _) = title_sort_service_with(small_checkpoints());
    service.cluster().fail_rewrites_after(50);

    let err = service
        .reindex(TITLE_SORT, reindexed_title_sort_schema())
        .await
        .unwrap_err();
    let saved = match err {
        Error::ReindexFailed { rewritten, .. } => rewritten,
        other => panic!("expected ReindexFailed, got {:?}", other),
    };
    assert!(saved <= 50);
    assert!(saved > 0);

    let failed = service.reindex_status(TITLE_SORT).unwrap();
    assert_eq!(failed.state, ReindexState::Failed);
    assert_eq!(failed.rewritten, saved);

    // Still on the old schema
    assert_eq!(service.schema(TITLE_SORT).unwrap().version, 0);
    let result = sorted(&service, vec![SortRequest::new("stars").missing_last()], 1).await;
    assert!(!result.partial);
    assert_eq!(result.documents[0].schema_version, 0);

    service.cluster().allow_rewrites();
    let before = service.cluster().rewrite_count();
    let report = service
        .reindex(TITLE_SORT, reindexed_title_sort_schema())
        .await
        .unwrap();
    assert_eq!(report.state, ReindexState::Done);
    assert!(report.resumed);
    assert_eq!(report.job_id, failed.job_id);
    assert_eq!(report.rewritten, CORPUS_SIZE as u64);
    assert_eq!(
        service.cluster().rewrite_count() - before,
        CORPUS_SIZE as u64 - saved
    );
    assert_eq!(service.schema(TITLE_SORT).unwrap().version, 1);
}

#[tokio::test]
async fn new_target_starts_over() {
    let (service, _) = title_sort_service_with(small_checkpoints());
    service.cluster().fail_rewrites_after(50);
    service
        .reindex(TITLE_SORT, reindexed_title_sort_schema())
        .await
        .unwrap_err();
    let failed = service.reindex_status(TITLE_SORT).unwrap();

    service.cluster().allow_rewrites();
    let before = service.cluster().rewrite_count();
    let other = reindexed_title_sort_schema()
        .with_field(FieldConfig::new("stars", FieldType::NumericInt).sort());
    let report = service.reindex(TITLE_SORT, other).await.unwrap();
    assert!(!report.resumed);
    assert_ne!(report.job_id, failed.job_id);
    assert_eq!(
        service.cluster().rewrite_count() - before,
        CORPUS_SIZE as u64
    );
}

#[tokio::test]
async fn documents_written_mid_reindex_are_still_sortable() {
    let (service, corpus) = title_sort_service_with(small_checkpoints());
    service.cluster().fail_rewrites_after(20);
    service
        .reindex(TITLE_SORT, reindexed_title_sort_schema())
        .await
        .unwrap_err();

    // Written under version 0 while the job is parked
    let mut late = corpus["7"].clone();
    late.insert("starsLong".into(), FieldValue::Long(i64::MAX));
    service.index_document(TITLE_SORT, "late", late).unwrap();

    service.cluster().allow_rewrites();
    service
        .reindex(TITLE_SORT, reindexed_title_sort_schema())
        .await
        .unwrap();

    let result = sorted(
        &service,
        vec![SortRequest::new("starsLong").descending().missing_last()],
        1,
    )
    .await;
    assert_eq!(ids(&result), vec!["late"]);
    assert_eq!(result.total_hits, CORPUS_SIZE as u64 + 1);
}
