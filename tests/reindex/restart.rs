//! Coordinator restarts against shards that keep their data.

use crate::common::*;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tessera::{MemoryCluster, MemoryNodeRegistry, ReindexState, CONFIG_FILE_NAME};

struct Cluster {
    nodes: Arc<MemoryNodeRegistry>,
    shards: Arc<MemoryCluster>,
}

impl Cluster {
    fn new() -> Self {
        init_tracing();
        Cluster {
            nodes: Arc::new(MemoryNodeRegistry::single_node()),
            shards: Arc::new(MemoryCluster::default()),
        }
    }

    fn open(&self, dir: &Path) -> SearchService {
        SearchService::open_with(dir, Arc::clone(&self.nodes), Arc::clone(&self.shards)).unwrap()
    }
}

fn write_config(dir: &Path) {
    EngineConfig::default()
        .with_checkpoint_interval(10)
        .write_to_file(&dir.join(CONFIG_FILE_NAME))
        .unwrap();
}

async fn assert_sorts(service: &SearchService, corpus: &BTreeMap<String, Document>) {
    let result = sorted(
        service,
        vec![SortRequest::new("special").descending().missing_last()],
        1,
    )
    .await;
    assert_eq!(
        first_value(corpus, &result, "special"),
        Some(&FieldValue::Bool(true))
    );

    let result = sorted(service, vec![SortRequest::new("added").missing_last()], 1).await;
    assert_eq!(first_value(corpus, &result, "added"), Some(&date(1951, 12, 20)));

    let result = sorted(
        service,
        vec![
            SortRequest::new("starsLong").descending().missing_last(),
            SortRequest::new("ratingDouble"),
        ],
        1,
    )
    .await;
    assert_eq!(ids(&result), vec!["40"]);

    let result = sorted(service, vec![SortRequest::new("title")], 1).await;
    assert_eq!(first_value(corpus, &result, "title"), None);
}

#[tokio::test]
async fn sorts_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let cluster = Cluster::new();
    let corpus = title_sort_corpus();

    let service = cluster.open(dir.path());
    service.create_index(title_sort_schema()).unwrap();
    load(&service, TITLE_SORT, &corpus);
    assert_sorts(&service, &corpus).await;
    drop(service);

    let service = cluster.open(dir.path());
    assert_eq!(service.schema(TITLE_SORT).unwrap().version, 0);
    assert_sorts(&service, &corpus).await;

    let report = service
        .reindex(TITLE_SORT, reindexed_title_sort_schema())
        .await
        .unwrap();
    assert_eq!(report.state, ReindexState::Done);
    drop(service);

    let service = cluster.open(dir.path());
    assert_eq!(service.schema(TITLE_SORT).unwrap().version, 1);
    assert_sorts(&service, &corpus).await;
    let result = sorted(&service, vec![SortRequest::new("theId").descending()], 1).await;
    assert_eq!(ids(&result), vec!["99"]);
}

#[tokio::test]
async fn checkpoint_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    write_config(dir.path());
    let cluster = Cluster::new();

    let service = cluster.open(dir.path());
    assert_eq!(service.config().checkpoint_interval, 10);
    service.create_index(title_sort_schema()).unwrap();
    load(&service, TITLE_SORT, &title_sort_corpus());

    cluster.shards.fail_rewrites_after(35);
    let err = service
        .reindex(TITLE_SORT, reindexed_title_sort_schema())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ReindexFailed { .. }));
    let failed_job = service.reindex_status(TITLE_SORT).unwrap().job_id;
    drop(service);

    // Job reports are per process; the checkpoint is on disk
    cluster.shards.allow_rewrites();
    let service = cluster.open(dir.path());
    assert!(service.reindex_status(TITLE_SORT).is_none());
    let report = service
        .reindex(TITLE_SORT, reindexed_title_sort_schema())
        .await
        .unwrap();
    assert!(report.resumed);
    assert_eq!(report.job_id, failed_job);
    assert_eq!(report.state, ReindexState::Done);
}
