mod common;

use article_ingest::config::SchedulerConfig;
use article_ingest::{
    AutoFetchPreference, AutoFetchScheduler, MockLlmAdapter, PreferenceStore, SchedulerState, Source, SourceKind,
};
use chrono::{Duration as ChronoDuration, Utc};
use common::*;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

fn scheduler(pages: Arc<StaticPages>) -> (AutoFetchScheduler, Arc<interfaces::memory::InMemoryStore>) {
    let ai = MockLlmAdapter::new("scheduler");
    let (orchestrator, store) = pipeline(pages, &ai);
    (
        AutoFetchScheduler::new(Arc::new(orchestrator), SchedulerConfig::default()),
        store,
    )
}

#[tokio::test]
async fn test_interval_below_floor_is_rejected() {
    init_tracing();
    let (_scheduler, store) = scheduler(Arc::new(StaticPages::new()));
    store
        .upsert(&AutoFetchPreference::new("alice", true, 30).unwrap())
        .await
        .unwrap();

    assert!(store.set_interval("alice", 5).await.is_err());
    let stored = PreferenceStore::get(store.as_ref(), "alice").await.unwrap().unwrap();
    assert_eq!(stored.interval_seconds(), 30);

    let updated = store.set_interval("alice", 10).await.unwrap();
    assert_eq!(updated.interval_seconds(), 10);
}

#[tokio::test]
async fn test_shortest_interval_drives_polling() {
    init_tracing();
    let (scheduler, store) = scheduler(Arc::new(StaticPages::new()));
    store.upsert(&AutoFetchPreference::new("alice", true, 90).unwrap()).await.unwrap();
    store.upsert(&AutoFetchPreference::new("bob", true, 30).unwrap()).await.unwrap();

    assert_eq!(
        scheduler.current_state().await,
        SchedulerState::Polling {
            interval: Duration::from_secs(30)
        }
    );
}

#[tokio::test]
async fn test_idle_when_nobody_enabled_auto_fetch() {
    init_tracing();
    let pages = Arc::new(site_with_feed(&english_items()));
    let (scheduler, store) = scheduler(pages.clone());
    store.add_source(Source::new("Example News", SITE, SourceKind::Feed)).await;
    store.upsert(&AutoFetchPreference::new("alice", false, 60).unwrap()).await.unwrap();

    assert_eq!(scheduler.tick().await, SchedulerState::Idle);
    assert_eq!(pages.total_hits(), 0);
    assert_eq!(store.article_count().await, 0);
}

#[tokio::test]
async fn test_cycle_skips_sources_not_due() {
    init_tracing();
    let pages = Arc::new(site_with_feed(&english_items()));
    let (scheduler, store) = scheduler(pages.clone());

    let due = Source::new("Example News", SITE, SourceKind::Feed).with_crawl_frequency(60);
    let mut recent = Source::new("Recently crawled", "https://recent.example.com/rss", SourceKind::Feed)
        .with_crawl_frequency(60);
    recent.last_crawled_at = Some(Utc::now() - ChronoDuration::minutes(5));
    store.add_source(due.clone()).await;
    store.add_source(recent.clone()).await;

    let report = scheduler.run_cycle().await.unwrap();
    info!("Cycle crawled {} sources", report.sources.len());

    assert_eq!(report.sources.len(), 1);
    assert_eq!(report.sources[0].source_id, due.id);
    assert_eq!(report.total_inserted(), 3);
    assert_eq!(pages.hits("https://recent.example.com/rss"), 0);
    assert!(store.source(due.id).await.unwrap().last_crawled_at.is_some());
    assert_eq!(store.metrics().await.len(), 1);

    // the system user's history now covers every stored URL
    assert_eq!(store.history_len().await, 3);
}

#[tokio::test]
async fn test_failing_source_does_not_stop_cycle() {
    init_tracing();
    let pages = Arc::new(site_with_feed(&english_items()));
    let (scheduler, store) = scheduler(pages);
    store.add_source(Source::new("A broken", "https://down.example.org/rss", SourceKind::Feed)).await;
    store.add_source(Source::new("B working", SITE, SourceKind::Feed)).await;

    let report = scheduler.run_cycle().await.unwrap();
    assert_eq!(report.sources.len(), 2);
    assert_eq!(report.failed_sources(), 1);
    assert_eq!(report.total_inserted(), 3);
}

#[tokio::test]
async fn test_cancellation_stops_the_loop() {
    init_tracing();
    let pages = Arc::new(site_with_feed(&english_items()));
    let (scheduler, store) = scheduler(pages.clone());
    store.add_source(Source::new("Example News", SITE, SourceKind::Feed)).await;
    store.upsert(&AutoFetchPreference::new("alice", true, 3600).unwrap()).await.unwrap();

    let shutdown = CancellationToken::new();
    let handle = tokio::spawn({
        let shutdown = shutdown.clone();
        async move { scheduler.run(shutdown).await }
    });

    tokio::time::sleep(Duration::from_millis(300)).await;
    shutdown.cancel();

    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("scheduler should stop promptly")
        .unwrap();
    assert_eq!(store.article_count().await, 3);
}

#[tokio::test]
async fn test_cancelled_before_start_does_nothing() {
    init_tracing();
    let pages = Arc::new(site_with_feed(&english_items()));
    let (scheduler, store) = scheduler(pages.clone());
    store.add_source(Source::new("Example News", SITE, SourceKind::Feed)).await;
    store.upsert(&AutoFetchPreference::new("alice", true, 10).unwrap()).await.unwrap();

    let shutdown = CancellationToken::new();
    shutdown.cancel();
    scheduler.run(shutdown).await;

    assert_eq!(pages.total_hits(), 0);
}
