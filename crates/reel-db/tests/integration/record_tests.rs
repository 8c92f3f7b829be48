use reel_core::models::{Record, compute_hash};
use reel_core::traits::Sink;
use reel_db::{Database, RecordRepository};
use uuid::Uuid;

use crate::integration::common::setup_test_db;

fn record(id: &str, title: &str) -> Record {
    let mut record = Record::new(format!("https://youtube.com/watch?v={id}"));
    record.title = Some(title.into());
    record.link = Some(format!("https://www.youtube.com/watch?v={id}&t=5s"));
    record.view_count_text = Some("1.2K views".into());
    record
}

#[tokio::test]
async fn append_and_read_back_record() {
    let (pool, _container) = setup_test_db().await;
    let repo = RecordRepository::new(pool);

    let original = record("abc", "First upload");
    repo.append(&original).await.unwrap();

    let latest = repo.latest(10).await.unwrap();
    assert_eq!(latest.len(), 1);

    let stored = &latest[0];
    assert_eq!(stored.run_id, repo.run_id());
    assert_eq!(stored.canonical_url, "https://youtube.com/watch?v=abc");
    assert_eq!(stored.record, original);
    assert_eq!(stored.data_hash.len(), 64);
}

#[tokio::test]
async fn data_hash_covers_serialized_record() {
    let (pool, _container) = setup_test_db().await;
    let repo = RecordRepository::new(pool);

    let original = record("abc", "First upload");
    repo.insert(&original).await.unwrap();

    let expected = compute_hash(&serde_json::to_value(&original).unwrap().to_string());
    let stored = repo.latest(1).await.unwrap();
    assert_eq!(stored[0].data_hash, expected);
}

#[tokio::test]
async fn history_keeps_every_version_of_a_url() {
    let (pool, _container) = setup_test_db().await;
    let repo = RecordRepository::new(pool);

    repo.insert(&record("abc", "Old title")).await.unwrap();
    repo.insert(&record("abc", "New title")).await.unwrap();
    repo.insert(&record("other", "Unrelated")).await.unwrap();

    let history = repo
        .history("https://youtube.com/watch?v=abc", 10)
        .await
        .unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].record.title.as_deref(), Some("New title"));
    assert_eq!(history[1].record.title.as_deref(), Some("Old title"));
    assert_ne!(history[0].data_hash, history[1].data_hash);
}

#[tokio::test]
async fn history_respects_limit() {
    let (pool, _container) = setup_test_db().await;
    let repo = RecordRepository::new(pool);

    for n in 0..5 {
        repo.insert(&record("abc", &format!("Take {n}"))).await.unwrap();
    }

    let history = repo
        .history("https://youtube.com/watch?v=abc", 3)
        .await
        .unwrap();
    assert_eq!(history.len(), 3);
}

#[tokio::test]
async fn history_of_unknown_url_is_empty() {
    let (pool, _container) = setup_test_db().await;
    let repo = RecordRepository::new(pool);

    let history = repo
        .history("https://youtube.com/watch?v=missing", 10)
        .await
        .unwrap();
    assert!(history.is_empty());
}

#[tokio::test]
async fn run_records_are_scoped_to_the_run() {
    let (pool, _container) = setup_test_db().await;
    let db = Database::from_pool(pool);

    let first = db.record_repo();
    let second = db.record_repo();
    assert_ne!(first.run_id(), second.run_id());

    first.append(&record("a", "A")).await.unwrap();
    first.append(&record("b", "B")).await.unwrap();
    second.append(&record("c", "C")).await.unwrap();

    let mut urls: Vec<String> = first
        .run_records()
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.canonical_url)
        .collect();
    urls.sort();
    assert_eq!(
        urls,
        vec![
            "https://youtube.com/watch?v=a".to_string(),
            "https://youtube.com/watch?v=b".to_string(),
        ]
    );
    assert_eq!(second.run_records().await.unwrap().len(), 1);
}

#[tokio::test]
async fn with_run_id_tags_inserts() {
    let (pool, _container) = setup_test_db().await;
    let run_id = Uuid::new_v4();
    let repo = RecordRepository::new(pool).with_run_id(run_id);

    repo.append(&record("abc", "Tagged")).await.unwrap();

    let stored = repo.run_records().await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].run_id, run_id);
}

#[tokio::test]
async fn put_blob_overwrites_existing_key() {
    let (pool, _container) = setup_test_db().await;
    let repo = RecordRepository::new(pool);

    repo.put_blob("video_information.json", b"[]", "application/json")
        .await
        .unwrap();
    repo.put_blob("video_information.json", b"[{\"title\":\"x\"}]", "application/json")
        .await
        .unwrap();

    let blob = repo
        .get_blob("video_information.json")
        .await
        .unwrap()
        .expect("blob should exist");
    assert_eq!(blob.key, "video_information.json");
    assert_eq!(blob.content_type, "application/json");
    assert_eq!(blob.body, b"[{\"title\":\"x\"}]".to_vec());
}

#[tokio::test]
async fn missing_blob_is_none() {
    let (pool, _container) = setup_test_db().await;
    let repo = RecordRepository::new(pool);

    assert!(repo.get_blob("nope").await.unwrap().is_none());
}

#[tokio::test]
async fn health_check_succeeds() {
    let (pool, _container) = setup_test_db().await;
    let repo = RecordRepository::new(pool);

    repo.health_check().await.unwrap();
}
