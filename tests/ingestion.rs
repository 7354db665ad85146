//! End-to-end scenarios across ingestion, lifecycle, deletion, and sweep.

use pretty_assertions::assert_eq;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

use tidings::ingest::{ingest_source, IngestStats};
use tidings::storage::{Database, EntryFilter, EntryStatus, NewSource, Source};

const TWO_ITEMS: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>Feed</title>
    <item><title>Alpha</title><link>https://feed.example/alpha</link></item>
    <item><title>Beta</title><link>https://feed.example/beta</link></item>
</channel></rss>"#;

const THREE_ITEMS: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>Feed</title>
    <item><title>Alpha</title><link>https://feed.example/alpha</link></item>
    <item><title>Beta</title><link>https://feed.example/beta</link></item>
    <item><title>Gamma</title><link>https://feed.example/gamma</link></item>
</channel></rss>"#;

async fn serve(body: &str) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(&server)
        .await;
    server
}

async fn register(db: &Database, server: &MockServer, name: &str) -> Source {
    db.create_source(&NewSource::new(name, format!("{}/feed", server.uri())))
        .await
        .unwrap()
}

/// Counters must equal a direct recount after any sequence of fetches,
/// status changes, and deletions.
async fn assert_counters_consistent(db: &Database, source_id: i64) {
    let source = db.get_source(source_id).await.unwrap().unwrap();
    let (entries, unread) = db.recount_source(source_id).await.unwrap();
    assert_eq!(source.entry_count, entries, "entry_count drifted");
    assert_eq!(source.unread_count, unread, "unread_count drifted");
}

#[tokio::test]
async fn repeated_fetches_are_idempotent() {
    let server = serve(TWO_ITEMS).await;
    let db = Database::open(":memory:").await.unwrap();
    let source = register(&db, &server, "Feed").await;
    let client = reqwest::Client::new();

    for round in 1..=3u32 {
        let stats = ingest_source(&db, &client, &source).await.unwrap();
        let expected_new = if round == 1 { 2 } else { 0 };
        assert_eq!(
            stats,
            IngestStats {
                fetched: 2,
                new: expected_new,
                reassociated: 0
            }
        );
    }

    let entries = db.list_entries(&EntryFilter::default()).await.unwrap();
    assert_eq!(entries.len(), 2);
    assert_counters_consistent(&db, source.id).await;
}

#[tokio::test]
async fn growing_feed_only_adds_the_new_item() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(TWO_ITEMS))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(THREE_ITEMS))
        .mount(&server)
        .await;

    let db = Database::open(":memory:").await.unwrap();
    let source = register(&db, &server, "Feed").await;
    let client = reqwest::Client::new();

    let first = ingest_source(&db, &client, &source).await.unwrap();
    assert_eq!(first.new, 2);
    let second = ingest_source(&db, &client, &source).await.unwrap();
    assert_eq!(second.fetched, 3);
    assert_eq!(second.new, 1);

    let source = db.get_source(source.id).await.unwrap().unwrap();
    assert_eq!(source.entry_count, 3);
    assert_eq!(source.unread_count, 3);
    assert_eq!(source.fetch_count, 2);
}

#[tokio::test]
async fn full_lifecycle_through_deletion_and_readdition() {
    let server = serve(TWO_ITEMS).await;
    let db = Database::open(":memory:").await.unwrap();
    let source = register(&db, &server, "Feed").await;
    let client = reqwest::Client::new();

    ingest_source(&db, &client, &source).await.unwrap();
    let entries = db.list_entries(&EntryFilter::default()).await.unwrap();
    let alpha = entries.iter().find(|e| e.title == "Alpha").unwrap().id;
    let beta = entries.iter().find(|e| e.title == "Beta").unwrap().id;

    // Curate: one favorite, one trashed.
    let favorite = db.set_status(alpha, EntryStatus::Favorite).await.unwrap();
    assert!(favorite.is_read, "leaving UNREAD forces the read flag");
    assert!(favorite.marked_at.is_some());
    db.set_status(beta, EntryStatus::Trash).await.unwrap();
    assert_counters_consistent(&db, source.id).await;

    // Deleting the source keeps the favorite as an orphan, drops the trash.
    let report = db.delete_source(source.id).await.unwrap();
    assert_eq!(report.preserved_entries, 1);
    assert_eq!(report.deleted_entries, 1);

    let orphan = db.get_entry(alpha).await.unwrap().unwrap();
    assert_eq!(orphan.source_id, None);
    assert_eq!(orphan.source_name, "Feed");
    assert!(db.get_entry(beta).await.unwrap().is_none());

    // Re-adding the same URL adopts the orphan instead of duplicating it.
    let source = db
        .create_source(&NewSource::new("Feed v2", format!("{}/feed", server.uri())))
        .await
        .unwrap();
    let stats = ingest_source(&db, &client, &source).await.unwrap();
    assert_eq!(stats.reassociated, 1);
    assert_eq!(stats.new, 1, "only the trashed item comes back fresh");

    let adopted = db.get_entry(alpha).await.unwrap().unwrap();
    assert_eq!(adopted.source_id, Some(source.id));
    assert_eq!(adopted.source_name, "Feed v2");
    assert_eq!(adopted.status, EntryStatus::Favorite);
    assert_counters_consistent(&db, source.id).await;
}

#[tokio::test]
async fn status_round_trips_keep_counters_consistent() {
    let server = serve(TWO_ITEMS).await;
    let db = Database::open(":memory:").await.unwrap();
    let source = register(&db, &server, "Feed").await;
    let client = reqwest::Client::new();

    ingest_source(&db, &client, &source).await.unwrap();
    let entries = db.list_entries(&EntryFilter::default()).await.unwrap();
    let id = entries[0].id;

    for status in [
        EntryStatus::Interested,
        EntryStatus::Unread,
        EntryStatus::Trash,
        EntryStatus::Unread,
        EntryStatus::Archived,
    ] {
        db.set_status(id, status).await.unwrap();
        assert_counters_consistent(&db, source.id).await;
    }
}

#[tokio::test]
async fn filters_select_by_status_and_source() {
    let server_a = serve(TWO_ITEMS).await;
    let server_b = serve(THREE_ITEMS).await;
    let db = Database::open(":memory:").await.unwrap();
    let a = register(&db, &server_a, "A").await;
    let b = register(&db, &server_b, "B").await;
    let client = reqwest::Client::new();

    ingest_source(&db, &client, &a).await.unwrap();
    ingest_source(&db, &client, &b).await.unwrap();

    let from_b = db
        .list_entries(&EntryFilter {
            source_id: Some(b.id),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(from_b.len(), 3);

    let first = from_b[0].id;
    db.set_status(first, EntryStatus::Interested).await.unwrap();
    let interested = db
        .list_entries(&EntryFilter {
            status: Some(EntryStatus::Interested),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(interested.len(), 1);
    assert_eq!(interested[0].id, first);

    // Interested sorts ahead of everything else.
    let all = db.list_entries(&EntryFilter::default()).await.unwrap();
    assert_eq!(all[0].id, first);
}

#[tokio::test]
async fn share_codes_resolve_back_to_entries() {
    let server = serve(TWO_ITEMS).await;
    let db = Database::open(":memory:").await.unwrap();
    let source = register(&db, &server, "Feed").await;
    let client = reqwest::Client::new();

    ingest_source(&db, &client, &source).await.unwrap();
    let ids: Vec<i64> = db
        .list_entries(&EntryFilter::default())
        .await
        .unwrap()
        .iter()
        .map(|e| e.id)
        .collect();

    let share = db.create_share(&ids, Some("picks"), None).await.unwrap();
    let found = db.get_share_by_code(&share.code).await.unwrap().unwrap();
    assert_eq!(db.share_entry_ids(&found), ids);
}
