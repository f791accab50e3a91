//! Queries spanning indices with different schemas.

use crate::common::*;

const ANOTHER: &str = "anotherIndex";
const ANOTHER2: &str = "anotherIndex2";

fn magic(id: i32, magic_number: i32) -> Document {
    Document::from([
        ("id".to_string(), FieldValue::Int(id)),
        ("magicNumber".to_string(), FieldValue::Int(magic_number)),
    ])
}

fn magic_service() -> SearchService {
    let service = SearchService::in_memory(EngineConfig::default()).unwrap();
    service.create_index(magic_number_schema(ANOTHER)).unwrap();
    service.create_index(magic_number_schema(ANOTHER2)).unwrap();
    for id in 0..200 {
        let magic_number = if id > 10 { -1 } else { 7 };
        service
            .index_document(ANOTHER, &id.to_string(), magic(id, magic_number))
            .unwrap();
    }
    for id in 0..100 {
        service
            .index_document(ANOTHER2, &id.to_string(), magic(id, (id % 10) + 5))
            .unwrap();
    }
    service
}

fn magic_of(result: &MergeResult) -> Option<i64> {
    let first = result.documents.first()?;
    // `magicNumber` is the only sort key
    match first.sort_keys[0].value() {
        Some(tessera::KeyValue::Int(n)) => Some(*n),
        _ => None,
    }
}

#[tokio::test]
async fn magic_number_across_two_indices() {
    let service = magic_service();

    let result = service
        .search(
            SearchRequest::new([ANOTHER, ANOTHER2])
                .sort(SortRequest::new("magicNumber"))
                .amount(1),
        )
        .await
        .unwrap();
    assert_eq!(result.total_hits, 300);
    assert_eq!(result.documents[0].source_index, ANOTHER);
    assert_eq!(magic_of(&result), Some(-1));

    let result = service
        .search(
            SearchRequest::new([ANOTHER, ANOTHER2])
                .sort(SortRequest::new("magicNumber").descending())
                .amount(1),
        )
        .await
        .unwrap();
    assert_eq!(result.documents[0].source_index, ANOTHER2);
    assert_eq!(magic_of(&result), Some(14));
    assert_eq!(result.shards.len(), 2 * SHARDS as usize);
}

#[tokio::test]
async fn index_without_the_field_sorts_as_missing() {
    let service = magic_service();
    service.create_index(title_sort_schema()).unwrap();
    load(&service, TITLE_SORT, &title_sort_corpus());

    let result = service
        .search(
            SearchRequest::new([TITLE_SORT, ANOTHER])
                .sort(SortRequest::new("magicNumber"))
                .amount(CORPUS_SIZE + 1),
        )
        .await
        .unwrap();
    assert_eq!(result.total_hits, 400);
    assert!(result.documents[..CORPUS_SIZE]
        .iter()
        .all(|d| d.source_index == TITLE_SORT));
    assert_eq!(result.documents[CORPUS_SIZE].source_index, ANOTHER);

    let result = service
        .search(
            SearchRequest::new([TITLE_SORT, ANOTHER])
                .sort(SortRequest::new("magicNumber").missing_last())
                .amount(1),
        )
        .await
        .unwrap();
    assert_eq!(result.documents[0].source_index, ANOTHER);
}

#[tokio::test]
async fn conflicting_types_fail_before_dispatch() {
    let service = magic_service();
    service.create_index(title_sort_schema()).unwrap();

    // `id` is a string in titleSort and an int in anotherIndex
    let err = service
        .search(SearchRequest::new([TITLE_SORT, ANOTHER]).sort(SortRequest::new("id")))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::UnsortableField { .. }));
}

#[tokio::test]
async fn field_present_in_one_index_only() {
    let service = magic_service();
    service.create_index(title_sort_schema()).unwrap();
    load(&service, TITLE_SORT, &title_sort_corpus());

    // anotherIndex has no stars at all
    let result = service
        .search(
            SearchRequest::new([TITLE_SORT, ANOTHER])
                .sort(SortRequest::new("stars").descending().missing_last())
                .amount(4),
        )
        .await
        .unwrap();
    assert!(result
        .documents
        .iter()
        .all(|d| d.source_index == TITLE_SORT));
    assert_eq!(ids(&result)[..3], ["10", "5", "6"]);
}
