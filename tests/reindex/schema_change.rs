//! Changing sort mappings of a populated index.

use crate::common::*;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tessera::{ReindexState, ShardId};

fn names(list: &[&str]) -> BTreeSet<String> {
    list.iter().map(|s| s.to_string()).collect()
}

async fn first_id(service: &SearchService, sort: Vec<SortRequest>) -> String {
    let result = sorted(service, sort, 1).await;
    result.documents[0].unique_id.clone()
}

#[tokio::test]
async fn reindex_swaps_sort_mappings() {
    let (service, corpus) = title_sort_service();

    let report = service
        .reindex(TITLE_SORT, reindexed_title_sort_schema())
        .await
        .unwrap();
    assert_eq!(report.state, ReindexState::Done);
    assert_eq!((report.from_version, report.to_version), (0, 1));
    assert_eq!(report.rewritten, CORPUS_SIZE as u64);
    assert!(!report.resumed);
    assert_eq!(
        report.diff.added_sort_fields,
        names(&["otherTitle", "otherTitleFolding", "theId"])
    );
    assert_eq!(report.diff.removed_sort_fields, names(&["id", "rating", "stars"]));
    assert!(report.diff.changed_sort_fields.is_empty());
    assert_eq!(service.schema(TITLE_SORT).unwrap().version, 1);

    // Case-sensitive: "Blah" < "blah"
    let result = sorted(&service, vec![SortRequest::new("otherTitle").missing_last()], 1).await;
    assert_eq!(
        first_value(&corpus, &result, "otherTitle"),
        Some(&FieldValue::from("Blah"))
    );

    // Folded: Blah, Blāh and blah tie, so the id decides
    let result = sorted(
        &service,
        vec![
            SortRequest::new("otherTitleFolding").missing_last(),
            SortRequest::new("starts").missing_last(),
        ],
        1,
    )
    .await;
    assert_eq!(
        first_value(&corpus, &result, "otherTitle"),
        Some(&FieldValue::from("blah"))
    );

    let result = sorted(&service, vec![SortRequest::new("otherTitle").descending()], 1).await;
    assert_eq!(
        first_value(&corpus, &result, "otherTitle"),
        Some(&FieldValue::from("still more blah"))
    );

    // Sorted as strings, so 99 beats 199
    assert_eq!(
        first_id(&service, vec![SortRequest::new("theId").descending()]).await,
        "99"
    );
    assert_eq!(
        first_id(&service, vec![SortRequest::new("id").descending()]).await,
        "99"
    );
}

#[tokio::test]
async fn folding_alias_groups_variants() {
    let (service, corpus) = title_sort_service();
    service
        .reindex(TITLE_SORT, reindexed_title_sort_schema())
        .await
        .unwrap();

    let result = sorted(
        &service,
        vec![SortRequest::new("otherTitle").alias("otherTitleFolding")],
        CORPUS_SIZE,
    )
    .await;
    let folded: Vec<String> = page_values(&corpus, &result, "otherTitle")
        .into_iter()
        .map(|v| {
            let raw = v.and_then(FieldValue::as_str).unwrap_or_default();
            StringHandling::LowercaseFolding.apply(raw)
        })
        .collect();
    assert!(folded.windows(2).all(|w| w[0] <= w[1]));
    let order = ids(&result);
    let pos = |id: &str| order.iter().position(|x| x == id).unwrap();
    // Every "blah" variant sits before "out of ideas"
    assert!(pos("5") < pos("10"));
    assert!(pos("6") < pos("10"));

    let err = service
        .search(
            SearchRequest::new([TITLE_SORT])
                .sort(SortRequest::new("title").alias("titleFolding")),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::UnknownSortAlias { .. }));
}

#[tokio::test]
async fn dropped_sort_fields_after_reindex() {
    let (service, _) = title_sort_service();
    service
        .reindex(TITLE_SORT, reindexed_title_sort_schema())
        .await
        .unwrap();

    // Index-only now
    let err = service
        .search(SearchRequest::new([TITLE_SORT]).sort(SortRequest::new("stars")))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::UnsortableField { .. }));

    // Unmapped now: every document is missing it
    let result = sorted(&service, vec![SortRequest::new("rating").descending()], 3).await;
    assert_eq!(ids(&result), vec!["0", "1", "10"]);
}

#[tokio::test]
async fn old_material_is_reclaimed() {
    let (service, _) = title_sort_service();
    for shard in 0..SHARDS {
        assert_eq!(
            service
                .cluster()
                .material_versions(&ShardId::new(TITLE_SORT, shard)),
            vec![0]
        );
    }
    service
        .reindex(TITLE_SORT, reindexed_title_sort_schema())
        .await
        .unwrap();
    for shard in 0..SHARDS {
        assert_eq!(
            service
                .cluster()
                .material_versions(&ShardId::new(TITLE_SORT, shard)),
            vec![1]
        );
    }
}

#[tokio::test]
async fn shard_count_cannot_change() {
    let (service, _) = title_sort_service();
    let mut schema = reindexed_title_sort_schema();
    schema.number_of_shards = SHARDS + 1;
    let err = service.reindex(TITLE_SORT, schema).await.unwrap_err();
    assert!(matches!(err, Error::InvalidSchema(_)));
    assert!(service.reindex_status(TITLE_SORT).is_none());
    assert_eq!(service.schema(TITLE_SORT).unwrap().version, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn queries_keep_the_old_schema_until_the_swap() {
    let (service, _) = title_sort_service();
    let service = Arc::new(service);
    service.cluster().hold_rewrites();

    let job = {
        let service = Arc::clone(&service);
        tokio::spawn(async move {
            service
                .reindex(TITLE_SORT, reindexed_title_sort_schema())
                .await
        })
    };
    while service.reindex_status(TITLE_SORT).map(|r| r.state) != Some(ReindexState::Rewriting) {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    for _ in 0..10 {
        let result = sorted(&service, vec![SortRequest::new("stars").descending()], 20).await;
        assert!(!result.partial);
        assert!(result.documents.iter().all(|d| d.schema_version == 0));
        // Not a sort name before the swap: every document is missing it
        assert_eq!(
            first_id(&service, vec![SortRequest::new("theId").descending()]).await,
            "0"
        );
        tokio::task::yield_now().await;
    }
    assert_eq!(
        service.reindex_status(TITLE_SORT).unwrap().state,
        ReindexState::Rewriting
    );
    assert_eq!(service.schema(TITLE_SORT).unwrap().version, 0);

    service.cluster().release_rewrites();
    let report = job.await.unwrap().unwrap();
    assert_eq!(report.state, ReindexState::Done);

    assert_eq!(
        first_id(&service, vec![SortRequest::new("theId").descending()]).await,
        "99"
    );
    let err = service
        .search(SearchRequest::new([TITLE_SORT]).sort(SortRequest::new("stars")))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::UnsortableField { .. }));
    let result = sorted(&service, vec![SortRequest::new("starsLong")], 1).await;
    assert_eq!(result.documents[0].schema_version, 1);
}
