//! Relevance ordering.

use crate::common::*;

fn special_or_secret() -> SearchRequest {
    SearchRequest::new([TITLE_SORT]).query(Query::any_term("title", ["special", "secret"]))
}

#[tokio::test]
async fn default_order_is_score_descending() {
    let (service, _) = title_sort_service();
    let result = service.search(special_or_secret()).await.unwrap();
    assert_eq!(ids(&result), vec!["40", "30"]);
    assert_eq!(result.total_hits, 2);
    assert!(!result.partial);
}

#[tokio::test]
async fn explicit_score_sort() {
    let (service, _) = title_sort_service();

    let result = service
        .search(special_or_secret().sort(SortRequest::score()))
        .await
        .unwrap();
    assert_eq!(ids(&result), vec!["30", "40"]);

    let result = service
        .search(special_or_secret().sort(SortRequest::score().descending()))
        .await
        .unwrap();
    assert_eq!(ids(&result), vec!["40", "30"]);
}

#[tokio::test]
async fn score_breaks_field_ties() {
    let (service, _) = title_sort_service();
    // Both have rating 4.7
    let result = service
        .search(
            special_or_secret()
                .sort(SortRequest::new("rating"))
                .sort(SortRequest::score().descending()),
        )
        .await
        .unwrap();
    assert_eq!(ids(&result), vec!["40", "30"]);
}
