//! Every sortable field type under every direction / missing-placement pair.
//!
//! Missing values go first unless missing-last is requested, whichever the
//! direction.

use crate::common::*;
use std::collections::BTreeMap;

async fn check_field(
    service: &SearchService,
    corpus: &BTreeMap<String, Document>,
    field: &str,
    min: FieldValue,
    max: FieldValue,
) {
    let cases = [
        (SortRequest::new(field), None),
        (SortRequest::new(field).ascending(), None),
        (SortRequest::new(field).ascending().missing_first(), None),
        (SortRequest::new(field).ascending().missing_last(), Some(&min)),
        (SortRequest::new(field).descending(), None),
        (SortRequest::new(field).descending().missing_first(), None),
        (SortRequest::new(field).descending().missing_last(), Some(&max)),
    ];
    for (sort, expected) in cases {
        let result = sorted(service, vec![sort.clone()], 10).await;
        assert_eq!(
            first_value(corpus, &result, field),
            expected,
            "first document for {:?}",
            sort
        );
    }
}

#[tokio::test]
async fn title_sort() {
    let (service, corpus) = title_sort_service();
    check_field(
        &service,
        &corpus,
        "title",
        FieldValue::from("a special title"),
        FieldValue::from("some title"),
    )
    .await;
}

#[tokio::test]
async fn stars_sort() {
    let (service, corpus) = title_sort_service();
    check_field(&service, &corpus, "stars", FieldValue::Int(1), FieldValue::Int(4)).await;
}

#[tokio::test]
async fn stars_long_sort() {
    let (service, corpus) = title_sort_service();
    check_field(
        &service,
        &corpus,
        "starsLong",
        FieldValue::Long(1),
        FieldValue::Long(BIG_STARS_LONG),
    )
    .await;
}

#[tokio::test]
async fn rating_sort() {
    let (service, corpus) = title_sort_service();
    check_field(
        &service,
        &corpus,
        "rating",
        FieldValue::Float(1.1),
        FieldValue::Float(5.0),
    )
    .await;
}

#[tokio::test]
async fn rating_double_sort() {
    let (service, corpus) = title_sort_service();
    check_field(
        &service,
        &corpus,
        "ratingDouble",
        FieldValue::Double(1.1),
        FieldValue::Double(BIG_RATING_DOUBLE),
    )
    .await;
}

#[tokio::test]
async fn bool_sort() {
    let (service, corpus) = title_sort_service();
    check_field(
        &service,
        &corpus,
        "special",
        FieldValue::Bool(false),
        FieldValue::Bool(true),
    )
    .await;
}

#[tokio::test]
async fn date_sort() {
    let (service, corpus) = title_sort_service();
    check_field(&service, &corpus, "added", date(1951, 12, 20), date(2020, 1, 31)).await;
}

#[tokio::test]
async fn missing_stars_sorts_before_every_value() {
    let (service, corpus) = title_sort_service();

    let result = sorted(&service, vec![SortRequest::new("stars")], CORPUS_SIZE).await;
    assert_eq!(result.documents.len(), CORPUS_SIZE);
    assert_eq!(result.documents[0].unique_id, "30");
    assert!(page_values(&corpus, &result, "stars")[1..]
        .iter()
        .all(Option::is_some));

    let result = sorted(
        &service,
        vec![SortRequest::new("stars").missing_last()],
        CORPUS_SIZE,
    )
    .await;
    assert_eq!(result.documents.last().map(|d| d.unique_id.as_str()), Some("30"));
}

#[tokio::test]
async fn present_values_are_globally_ordered() {
    let (service, corpus) = title_sort_service();
    let result = sorted(
        &service,
        vec![SortRequest::new("starsLong").descending().missing_last()],
        CORPUS_SIZE,
    )
    .await;

    let values: Vec<i64> = page_values(&corpus, &result, "starsLong")
        .into_iter()
        .flatten()
        .map(|v| match v {
            FieldValue::Long(n) => *n,
            other => panic!("unexpected {:?}", other),
        })
        .collect();
    assert_eq!(values.len(), CORPUS_SIZE - 1);
    assert!(values.windows(2).all(|w| w[0] >= w[1]));
    assert_eq!(values[0], BIG_STARS_LONG);
}

#[tokio::test]
async fn ties_break_on_unique_id() {
    let (service, _) = title_sort_service();
    let first = sorted(&service, vec![SortRequest::new("special")], 50).await;
    let again = sorted(&service, vec![SortRequest::new("special")], 50).await;
    assert_eq!(ids(&first), ids(&again));

    // "20" is the only document without `special`; the falses follow by id
    let page = ids(&first);
    assert_eq!(page[0], "20");
    assert_eq!(&page[1..4], &["0", "1", "10"]);
}

#[tokio::test]
async fn unmapped_field_is_missing_everywhere() {
    let (service, _) = title_sort_service();
    let result = sorted(&service, vec![SortRequest::new("otherTitle")], 5).await;
    assert_eq!(result.total_hits, CORPUS_SIZE as u64);
    assert_eq!(ids(&result), vec!["0", "1", "10", "100", "101"]);
}
