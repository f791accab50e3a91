//! Compound sorts.

use crate::common::*;

#[tokio::test]
async fn stars_descending_then_rating() {
    let (service, corpus) = title_sort_service();
    let result = sorted(
        &service,
        vec![
            SortRequest::new("stars").descending().missing_last(),
            SortRequest::new("rating").ascending(),
        ],
        10,
    )
    .await;
    assert_eq!(first_value(&corpus, &result, "stars"), Some(&FieldValue::Int(4)));
    assert_eq!(
        first_value(&corpus, &result, "rating"),
        Some(&FieldValue::Float(1.1))
    );
    assert_eq!(&ids(&result)[..4], &["10", "5", "6", "20"]);
}

#[tokio::test]
async fn missing_first_holds_under_descending() {
    let (service, _) = title_sort_service();
    let result = sorted(
        &service,
        vec![
            SortRequest::new("stars").descending(),
            SortRequest::new("rating").ascending(),
        ],
        3,
    )
    .await;
    assert_eq!(ids(&result), vec!["30", "10", "5"]);
}

#[tokio::test]
async fn second_key_applies_only_within_ties() {
    let (service, corpus) = title_sort_service();
    let result = sorted(
        &service,
        vec![
            SortRequest::new("special").descending().missing_last(),
            SortRequest::new("added").descending().missing_last(),
        ],
        CORPUS_SIZE,
    )
    .await;
    // 30 and 40 are the only specials; 30 was added later
    assert_eq!(&ids(&result)[..2], &["30", "40"]);
    assert_eq!(
        page_values(&corpus, &result, "special").last().copied().flatten(),
        None
    );
}
