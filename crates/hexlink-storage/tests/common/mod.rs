//! Behaviour every record store backend must share.
#![allow(dead_code)]

use hexlink_core::{Record, RecordStore, ShortCode, StorageError};
use std::sync::Arc;

pub fn code(value: &str) -> ShortCode {
    ShortCode::new_unchecked(value)
}

pub fn record(url: &str, short_code: &str) -> Record {
    Record::new(url, code(short_code))
}

pub async fn finds_saved_record_both_ways<S: RecordStore>(store: S) {
    let saved = record("https://example.com/a", "aaaa1111").with_correlation_id("batch-1");
    store.save(saved.clone()).await.unwrap();

    let by_url = store
        .find_by_original_url("https://example.com/a")
        .await
        .unwrap();
    let by_code = store.find_by_short_code(&code("aaaa1111")).await.unwrap();

    assert_eq!(by_url, Some(saved.clone()));
    assert_eq!(by_code, Some(saved));
}

pub async fn misses_return_none<S: RecordStore>(store: S) {
    assert!(store
        .find_by_original_url("https://missing.example")
        .await
        .unwrap()
        .is_none());
    assert!(store
        .find_by_short_code(&code("doesnotexist"))
        .await
        .unwrap()
        .is_none());
}

pub async fn rejects_code_taken_by_other_url<S: RecordStore>(store: S) {
    store
        .save(record("https://one.example", "abc123"))
        .await
        .unwrap();

    let err = store
        .save(record("https://two.example", "abc123"))
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::DuplicateShortCode(_)));

    let kept = store
        .find_by_short_code(&code("abc123"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(kept.original_url, "https://one.example");
    assert!(store
        .find_by_original_url("https://two.example")
        .await
        .unwrap()
        .is_none());
}

pub async fn rejects_second_code_for_same_url<S: RecordStore>(store: S) {
    store
        .save(record("https://one.example", "abc123"))
        .await
        .unwrap();

    let err = store
        .save(record("https://one.example", "def456"))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        StorageError::DuplicateOriginalUrl {
            short_code: "abc123".to_string()
        }
    );
}

pub async fn replaying_a_record_is_a_no_op<S: RecordStore>(store: S) {
    let saved = record("https://one.example", "abc123");
    store.save(saved.clone()).await.unwrap();
    store.save(saved).await.unwrap();
}

pub async fn batch_reports_each_record<S: RecordStore>(store: S) {
    store
        .save(record("https://existing.example", "eeee0000"))
        .await
        .unwrap();

    let results = store
        .save_batch(vec![
            record("https://a.example", "aaaa0000"),
            record("https://b.example", "eeee0000"),
            record("https://c.example", "aaaa0000"),
            record("https://existing.example", "ffff0000"),
            record("https://d.example", "dddd0000"),
        ])
        .await
        .unwrap();

    assert_eq!(results.len(), 5);
    assert!(results[0].is_ok());
    assert!(matches!(results[1], Err(StorageError::DuplicateShortCode(_))));
    assert!(matches!(results[2], Err(StorageError::DuplicateShortCode(_))));
    assert!(matches!(
        results[3],
        Err(StorageError::DuplicateOriginalUrl { .. })
    ));
    assert!(results[4].is_ok());

    assert!(store
        .find_by_short_code(&code("dddd0000"))
        .await
        .unwrap()
        .is_some());
}

pub async fn soft_delete_hides_record<S: RecordStore>(store: S) {
    store
        .save(record("https://one.example", "abc123").with_user_id(Some(5)))
        .await
        .unwrap();

    assert!(!store.delete(&code("abc123"), Some(6)).await.unwrap());
    assert!(store.delete(&code("abc123"), Some(5)).await.unwrap());
    assert!(!store.delete(&code("abc123"), Some(5)).await.unwrap());

    assert!(store
        .find_by_short_code(&code("abc123"))
        .await
        .unwrap()
        .is_none());
    assert!(store.list_by_user(5).await.unwrap().is_empty());

    let err = store
        .save(record("https://two.example", "abc123"))
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::DuplicateShortCode(_)));
}

pub async fn deleted_code_is_not_revived_by_its_url<S: RecordStore>(store: S) {
    store
        .save(record("https://one.example", "abc123"))
        .await
        .unwrap();
    assert!(store.delete(&code("abc123"), None).await.unwrap());

    let err = store
        .save(record("https://one.example", "abc123"))
        .await
        .unwrap_err();
    assert_eq!(err, StorageError::DuplicateShortCode("abc123".to_string()));

    assert!(store
        .find_by_short_code(&code("abc123"))
        .await
        .unwrap()
        .is_none());
    assert!(store
        .find_by_original_url("https://one.example")
        .await
        .unwrap()
        .is_none());

    store
        .save(record("https://one.example", "def456"))
        .await
        .unwrap();
    let found = store
        .find_by_original_url("https://one.example")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.short_code, code("def456"));
}

pub async fn lists_records_by_owner<S: RecordStore>(store: S) {
    store
        .save(record("https://a.example", "aaaa0000").with_user_id(Some(1)))
        .await
        .unwrap();
    store
        .save(record("https://b.example", "bbbb0000").with_user_id(Some(2)))
        .await
        .unwrap();
    store
        .save(record("https://c.example", "cccc0000").with_user_id(Some(1)))
        .await
        .unwrap();

    let codes: Vec<String> = store
        .list_by_user(1)
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.short_code.into_inner())
        .collect();
    assert_eq!(codes, vec!["aaaa0000", "cccc0000"]);
}

pub async fn concurrent_saves_of_one_url_keep_one_record<S: RecordStore>(store: S) {
    let store = Arc::new(store);
    let mut handles = Vec::new();

    for i in 0..16 {
        let store = Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            store
                .save(record("https://same.example", &format!("code{:04}", i)))
                .await
        }));
    }

    let mut stored = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(()) => stored += 1,
            Err(StorageError::DuplicateOriginalUrl { .. }) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(stored, 1);
}
