//! Integration tests for a pagination session driven like a UI loop.

use std::future::IntoFuture;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use batch_pager::config::PaginationConfig;
use batch_pager::pager::{
    Column, DataSource, Direction, FetchRequest, PaginationSession, SessionError, SessionState,
};
use batch_pager::source::synthetic::{DemoRecord, SyntheticSource};

fn config() -> PaginationConfig {
    PaginationConfig {
        page_size: 10,
        batch_size: 100,
        max_resident_batches: 2,
        ..Default::default()
    }
}

fn columns() -> Vec<Column> {
    vec![Column::new("Id", "id"), Column::new("Name", "name")]
}

fn session(total: usize) -> PaginationSession<DemoRecord> {
    let mut cfg = config();
    cfg.sort.key = "id".to_string();
    cfg.sort.ascending = true;
    let source = Arc::new(SyntheticSource::new(total, Duration::ZERO));
    PaginationSession::new(&cfg, source, columns()).unwrap()
}

async fn opened(total: usize) -> PaginationSession<DemoRecord> {
    let mut s = session(total);
    let cmd = s.open().unwrap();
    assert!(s.apply_completion(cmd.await).unwrap().is_none());
    s
}

/// Counts upstream fetches.
struct CountingSource {
    inner: SyntheticSource,
    calls: AtomicUsize,
}

#[async_trait]
impl DataSource<DemoRecord> for CountingSource {
    async fn fetch(&self, request: FetchRequest) -> anyhow::Result<Vec<DemoRecord>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.fetch(request).await
    }
}

#[tokio::test]
async fn test_forward_scenario_slides_window() {
    let mut s = opened(1000).await;
    assert_eq!(s.total_pages(), 10);

    assert!(s.navigate(8).is_none());
    let cmd = s.navigate(9).expect("page 9 should prefetch batch 1");
    assert_eq!(cmd.batch_index(), 1);
    assert_eq!(cmd.direction(), Direction::Forward);
    assert!(s.apply_completion(cmd.await).unwrap().is_none());
    assert_eq!(s.total_pages(), 20);
    assert_eq!(s.window().resident_batches(), 2);

    let cmd = s.navigate(19).expect("page 19 should prefetch batch 2");
    assert_eq!(cmd.batch_index(), 2);
    s.apply_completion(cmd.await).unwrap();

    assert_eq!(s.window().first_batch(), Some(1));
    assert_eq!(s.window().last_batch(), Some(2));
    assert_eq!(s.total_pages(), 30);
    assert!(s.render(19).unwrap().contains("execution-00199"));
}

#[tokio::test]
async fn test_short_final_batch() {
    let mut s = opened(237).await;
    for page in [9, 19] {
        let cmd = s.navigate(page).unwrap();
        s.apply_completion(cmd.await).unwrap();
    }

    assert_eq!(s.total_pages(), 24);
    assert!(s.navigate(23).is_none());

    let table = s.render(23).unwrap();
    let rows: Vec<&str> = table.lines().filter(|l| l.contains("execution-")).collect();
    assert_eq!(rows.len(), 7);
    assert!(rows[6].contains("execution-00236"));

    // End of data: no further forward fetch.
    assert!(s.next_page().is_none());
    assert_eq!(s.current_page(), 23);
}

#[tokio::test]
async fn test_backward_navigation_refetches_evicted_batch() {
    let mut s = opened(1000).await;
    for page in [9, 19] {
        let cmd = s.navigate(page).unwrap();
        s.apply_completion(cmd.await).unwrap();
    }
    assert_eq!(s.window().first_batch(), Some(1));

    assert!(s.navigate(11).is_none());
    let cmd = s.navigate(10).expect("first page of window should prefetch backward");
    assert_eq!(cmd.batch_index(), 0);
    assert_eq!(cmd.direction(), Direction::Backward);
    s.apply_completion(cmd.await).unwrap();

    assert_eq!(s.window().first_batch(), Some(0));
    assert_eq!(s.window().last_batch(), Some(1));
    // Length of the evicted batch is still recorded.
    assert_eq!(s.window().batch_len(2), Some(100));
    assert!(s.render(3).unwrap().contains("execution-00030"));
}

#[tokio::test]
async fn test_second_fetch_rejected_while_in_flight() {
    let source = Arc::new(CountingSource {
        inner: SyntheticSource::new(1000, Duration::from_millis(20)),
        calls: AtomicUsize::new(0),
    });
    let mut s: PaginationSession<DemoRecord> =
        PaginationSession::new(&config(), source.clone(), columns()).unwrap();
    let cmd = s.open().unwrap();
    s.apply_completion(cmd.await).unwrap();

    let cmd = s.navigate(9).unwrap();
    assert!(s.is_loading());

    // Repeated triggers while batch 1 is outstanding.
    assert!(s.navigate(9).is_none());
    assert!(s.navigate(9).is_none());
    assert!(matches!(s.fetch_command(1, Direction::Forward), Err(SessionError::FetchInFlight)));

    let completion = tokio::spawn(cmd.into_future()).await.unwrap();
    assert!(s.apply_completion(completion).unwrap().is_none());
    assert!(!s.is_loading());

    assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    assert_eq!(s.window().resident_batches(), 2);
    assert_eq!(s.window().items().len(), 200);
}

#[tokio::test]
async fn test_deferred_prefetch_issued_after_completion() {
    let mut s = opened(1000).await;

    let cmd = s.navigate(9).unwrap();
    // User keeps moving while batch 1 is in flight.
    assert!(s.navigate(19).is_none());
    assert!(matches!(s.state(), SessionState::Fetching { batch_index: 1, .. }));

    let follow_up = s
        .apply_completion(cmd.await)
        .unwrap()
        .expect("deferred prefetch should be issued on completion");
    assert_eq!(follow_up.batch_index(), 2);
    assert!(s.is_loading());

    s.apply_completion(follow_up.await).unwrap();
    assert_eq!(s.window().last_batch(), Some(2));
    assert!(s.render(19).is_ok());
}

#[tokio::test]
async fn test_page_outside_window_not_rendered() {
    let s = opened(1000).await;
    assert!(s.render(10).is_err());
}
