//! Shard failures, timeouts and deadlines under both failure policies.

use crate::common::*;
use std::time::Duration;
use tessera::{FailurePolicy, ShardFault, ShardId, ShardStatus};

fn degrade() -> EngineConfig {
    EngineConfig::default().with_failure_policy(FailurePolicy::Degrade)
}

#[tokio::test]
async fn fail_fast_names_the_failed_shard() {
    let (service, _) = title_sort_service();
    service
        .cluster()
        .inject_fault(ShardId::new(TITLE_SORT, 1), ShardFault::Unavailable);

    let err = service
        .search(SearchRequest::new([TITLE_SORT]).sort(SortRequest::new("stars")))
        .await
        .unwrap_err();
    match err {
        Error::PartialShardFailure { failures } => {
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].shard, ShardId::new(TITLE_SORT, 1));
        }
        other => panic!("expected PartialShardFailure, got {:?}", other),
    }
}

#[tokio::test]
async fn degrade_merges_the_remaining_shards() {
    let (service, _) = title_sort_service_with(degrade());
    let broken = ShardId::new(TITLE_SORT, 1);
    service
        .cluster()
        .inject_fault(broken.clone(), ShardFault::Unavailable);

    let result = sorted(&service, vec![SortRequest::new("id")], CORPUS_SIZE).await;
    assert!(result.partial);
    let failed: Vec<&ShardId> = result.failed_shards().map(|d| &d.shard).collect();
    assert_eq!(failed, vec![&broken]);

    let ok_hits: u64 = result
        .shards
        .iter()
        .filter(|d| d.is_ok())
        .map(|d| d.hit_count)
        .sum();
    assert_eq!(result.total_hits, ok_hits);
    assert!(result.total_hits < CORPUS_SIZE as u64);
    assert_eq!(result.documents.len() as u64, result.total_hits);
    assert!(result.documents.iter().all(|d| d.source_shard != 1));

    service.cluster().clear_fault(&broken);
    let result = sorted(&service, vec![SortRequest::new("id")], CORPUS_SIZE).await;
    assert!(!result.partial);
    assert_eq!(result.total_hits, CORPUS_SIZE as u64);
}

#[tokio::test]
async fn broken_stream_drops_its_shard() {
    let (service, _) = title_sort_service_with(degrade());
    let broken = ShardId::new(TITLE_SORT, 0);
    service
        .cluster()
        .inject_fault(broken.clone(), ShardFault::BreakStreamAfter(2));

    let result = sorted(&service, vec![SortRequest::new("id")], CORPUS_SIZE).await;
    assert!(result.partial);
    let diag = result
        .shards
        .iter()
        .find(|d| d.shard == broken)
        .expect("diagnostics for every shard");
    assert!(matches!(diag.status, ShardStatus::Failed(_)));
    assert_eq!(diag.docs_consumed, 2);
    // The shard answered before its stream broke, so its hits still count
    assert_eq!(result.total_hits, CORPUS_SIZE as u64);
    assert!(result.documents.len() as u64 <= result.total_hits);
    assert_eq!(
        result
            .documents
            .iter()
            .filter(|d| d.source_shard == 0)
            .count(),
        2
    );
}

#[tokio::test]
async fn slow_shard_times_out() {
    let config = degrade().with_shard_timeout(Duration::from_millis(50));
    let (service, _) = title_sort_service_with(config);
    let slow = ShardId::new(TITLE_SORT, 2);
    service
        .cluster()
        .inject_fault(slow.clone(), ShardFault::Delay(Duration::from_millis(500)));

    let result = sorted(&service, vec![SortRequest::new("id")], 10).await;
    assert!(result.partial);
    let diag = result.shards.iter().find(|d| d.shard == slow).unwrap();
    assert_eq!(diag.status, ShardStatus::TimedOut);
}

#[tokio::test]
async fn deadline_wins_over_degrade() {
    let (service, _) = title_sort_service_with(degrade());
    service.cluster().inject_fault(
        ShardId::new(TITLE_SORT, 0),
        ShardFault::Delay(Duration::from_secs(2)),
    );

    let err = service
        .search(
            SearchRequest::new([TITLE_SORT])
                .sort(SortRequest::new("id"))
                .timeout(Duration::from_millis(50)),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::DeadlineExceeded { timeout_ms: 50 }));
}
