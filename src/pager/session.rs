//! Pagination session: one table view's pager state, driven by a UI event loop.
//!
//! The session is only ever touched from the loop task. Fetches leave it as
//! [`FetchCommand`]s the loop spawns; results come back as
//! [`FetchCompletion`] messages passed to [`PaginationSession::apply_completion`],
//! the only place the window is mutated.
//!
//! A navigation event that would start a fetch while another is outstanding
//! is deferred, not queued: the trigger is dropped and the session re-plans
//! for the current page after every successful completion.
//!
//! A command dropped before it completes abandons its fetch; the session
//! notices and goes back to `Idle`.

use std::future::IntoFuture;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{ConfigError, PaginationConfig};
use crate::pager::gateway::{DataSource, FetchError, FetchGateway};
use crate::pager::scheduler::PrefetchScheduler;
use crate::pager::view::{Column, JsonRecordSerializer, PageView, RecordSerializer, RenderError, TableRenderer, TextTableRenderer};
use crate::pager::window::{BatchWindow, Direction, WindowError};

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("A fetch is already in flight")]
    FetchInFlight,

    #[error("Completion for batch {batch_index} ({direction}) does not match the outstanding fetch")]
    UnexpectedCompletion { batch_index: usize, direction: Direction },

    #[error("Failed to marshal record {index} of batch {batch_index}: {source}")]
    Marshal {
        batch_index: usize,
        index: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Window(#[from] WindowError),
}

/// Whether the session is waiting on a fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Fetching { direction: Direction, batch_index: usize },
}

/// Message delivered back to the loop when a fetch finishes.
#[derive(Debug)]
pub struct FetchCompletion<R> {
    pub items: Result<Vec<R>, FetchError>,
    pub batch_index: usize,
    pub direction: Direction,
}

/// Flags the fetch as abandoned if the command is dropped before it
/// produces a completion.
struct AbandonGuard {
    flag: Arc<AtomicBool>,
    armed: bool,
}

impl AbandonGuard {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for AbandonGuard {
    fn drop(&mut self) {
        if self.armed {
            self.flag.store(true, Ordering::Release);
        }
    }
}

/// An issued batch fetch. Await it (or spawn its future) to get the
/// completion message.
pub struct FetchCommand<R> {
    batch_index: usize,
    direction: Direction,
    future: BoxFuture<'static, FetchCompletion<R>>,
}

impl<R> FetchCommand<R> {
    pub fn batch_index(&self) -> usize {
        self.batch_index
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }
}

impl<R> std::fmt::Debug for FetchCommand<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchCommand")
            .field("batch_index", &self.batch_index)
            .field("direction", &self.direction)
            .finish_non_exhaustive()
    }
}

impl<R> IntoFuture for FetchCommand<R> {
    type Output = FetchCompletion<R>;
    type IntoFuture = BoxFuture<'static, FetchCompletion<R>>;

    fn into_future(self) -> Self::IntoFuture {
        self.future
    }
}

/// Pager state for a single paginated table view.
pub struct PaginationSession<R> {
    id: Uuid,
    gateway: FetchGateway<R>,
    window: BatchWindow<R>,
    scheduler: PrefetchScheduler,
    view: PageView<R>,
    state: SessionState,
    /// Set when the outstanding command was dropped unfinished.
    abandoned: Arc<AtomicBool>,
    current_page: usize,
}

impl<R: Serialize + Send + 'static> PaginationSession<R> {
    /// Create a session rendering records through serde with the plain-text table.
    pub fn new(
        config: &PaginationConfig,
        source: Arc<dyn DataSource<R>>,
        columns: Vec<Column>,
    ) -> Result<Self, ConfigError> {
        Self::with_collaborators(
            config,
            source,
            columns,
            Box::new(JsonRecordSerializer),
            Box::new(TextTableRenderer),
        )
    }
}

impl<R: Send + 'static> PaginationSession<R> {
    /// Create a session with explicit serializer and renderer.
    pub fn with_collaborators(
        config: &PaginationConfig,
        source: Arc<dyn DataSource<R>>,
        columns: Vec<Column>,
        serializer: Box<dyn RecordSerializer<R>>,
        renderer: Box<dyn TableRenderer>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let id = Uuid::new_v4();
        debug!(
            session = %id,
            page_size = config.page_size,
            batch_size = config.batch_size,
            max_resident = config.max_resident_batches,
            "Pagination session created"
        );

        Ok(Self {
            id,
            gateway: FetchGateway::new(source, config),
            window: BatchWindow::new(config),
            scheduler: PrefetchScheduler::new(config),
            view: PageView::new(config, columns, serializer, renderer),
            state: SessionState::Idle,
            abandoned: Arc::new(AtomicBool::new(false)),
            current_page: 0,
        })
    }

    /// Command loading the first batch.
    pub fn open(&mut self) -> Result<FetchCommand<R>, SessionError> {
        self.fetch_command(0, Direction::Forward)
    }

    /// Issue a fetch for `batch_index`, moving the session to `Fetching`.
    pub fn fetch_command(&mut self, batch_index: usize, direction: Direction) -> Result<FetchCommand<R>, SessionError> {
        self.recover_abandoned();
        if matches!(self.state, SessionState::Fetching { .. }) {
            return Err(SessionError::FetchInFlight);
        }
        if self.window.is_resident(batch_index) {
            return Err(WindowError::AlreadyResident(batch_index).into());
        }

        let pending = self.gateway.begin(batch_index).map_err(|e| match e {
            FetchError::InFlight => SessionError::FetchInFlight,
            other => other.into(),
        })?;
        self.state = SessionState::Fetching { direction, batch_index };
        self.abandoned = Arc::new(AtomicBool::new(false));
        let guard = AbandonGuard {
            flag: self.abandoned.clone(),
            armed: true,
        };

        debug!(session = %self.id, batch_index, direction = %direction, "Fetch scheduled");

        let future = async move {
            let items = pending.run().await;
            guard.disarm();
            FetchCompletion {
                items,
                batch_index,
                direction,
            }
        }
        .boxed();

        Ok(FetchCommand {
            batch_index,
            direction,
            future,
        })
    }

    /// Move to `page` and return the prefetch it calls for, if any.
    pub fn navigate(&mut self, page: usize) -> Option<FetchCommand<R>> {
        self.current_page = page;
        self.replan()
    }

    /// Advance one page, staying on the last known page.
    pub fn next_page(&mut self) -> Option<FetchCommand<R>> {
        let last = self.total_pages().saturating_sub(1);
        self.navigate((self.current_page + 1).min(last))
    }

    /// Go back one page, staying on page 0.
    pub fn prev_page(&mut self) -> Option<FetchCommand<R>> {
        self.navigate(self.current_page.saturating_sub(1))
    }

    /// Apply a fetch result: install the batch, evict if over capacity, and
    /// return any fetch that was deferred while this one was outstanding.
    ///
    /// A failed fetch leaves the window unchanged and is not retried.
    pub fn apply_completion(&mut self, completion: FetchCompletion<R>) -> Result<Option<FetchCommand<R>>, SessionError> {
        let FetchCompletion {
            items,
            batch_index,
            direction,
        } = completion;

        let expected = SessionState::Fetching { direction, batch_index };
        if self.state != expected {
            warn!(
                session = %self.id,
                batch_index,
                direction = %direction,
                state = ?self.state,
                "Discarding unexpected fetch completion"
            );
            return Err(SessionError::UnexpectedCompletion { batch_index, direction });
        }
        self.state = SessionState::Idle;

        let items = items.inspect_err(|e| {
            warn!(session = %self.id, batch_index, error = %e, "Batch fetch failed");
        })?;
        let len = items.len();

        // A batch that cannot be rendered is never installed.
        for (index, record) in items.iter().enumerate() {
            self.view.serializer().to_row(record).map_err(|source| {
                warn!(session = %self.id, batch_index, index, error = %source, "Batch rejected, record not serializable");
                SessionError::Marshal {
                    batch_index,
                    index,
                    source,
                }
            })?;
        }

        let grown = self.window.install_batch(batch_index, items)?;
        let evicted = if self.scheduler.should_evict(&self.window) {
            self.window.evict_if_full(grown)
        } else {
            None
        };

        info!(
            session = %self.id,
            batch_index,
            len,
            evicted = ?evicted,
            total_pages = self.total_pages(),
            "Batch installed"
        );

        Ok(self.replan())
    }

    /// Render `page` from the resident window.
    pub fn render(&self, page: usize) -> Result<String, RenderError> {
        self.view.render_page(page, &self.window)
    }

    /// Render the page the user is on.
    pub fn render_current(&self) -> Result<String, RenderError> {
        self.render(self.current_page)
    }

    /// Display pages known so far.
    pub fn total_pages(&self) -> usize {
        self.window.total_pages()
    }

    /// Whether a fetch is outstanding.
    pub fn is_loading(&self) -> bool {
        self.gateway.is_loading()
    }

    /// Shared loading flag, readable from outside the loop.
    pub fn loading_flag(&self) -> Arc<AtomicBool> {
        self.gateway.loading_flag()
    }

    pub fn state(&self) -> SessionState {
        match self.state {
            SessionState::Fetching { .. } if self.abandoned.load(Ordering::Acquire) => SessionState::Idle,
            state => state,
        }
    }

    pub fn current_page(&self) -> usize {
        self.current_page
    }

    pub fn window(&self) -> &BatchWindow<R> {
        &self.window
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    fn recover_abandoned(&mut self) {
        if let SessionState::Fetching { batch_index, direction } = self.state {
            if self.abandoned.load(Ordering::Acquire) {
                warn!(session = %self.id, batch_index, direction = %direction, "Fetch command dropped before completing");
                self.state = SessionState::Idle;
            }
        }
    }

    fn replan(&mut self) -> Option<FetchCommand<R>> {
        self.recover_abandoned();
        let plan = self.scheduler.plan(self.current_page, &self.window)?;

        if let SessionState::Fetching { batch_index, .. } = self.state {
            debug!(
                session = %self.id,
                page = self.current_page,
                wanted = plan.batch_index,
                in_flight = batch_index,
                "Prefetch deferred"
            );
            return None;
        }

        match self.fetch_command(plan.batch_index, plan.direction) {
            Ok(command) => Some(command),
            Err(e) => {
                warn!(session = %self.id, batch_index = plan.batch_index, error = %e, "Prefetch not issued");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::pager::gateway::FetchRequest;

    #[derive(Debug, Clone, Serialize)]
    struct Item {
        id: usize,
    }

    /// Serves `total` items in order.
    struct Numbers {
        total: usize,
    }

    #[async_trait]
    impl DataSource<Item> for Numbers {
        async fn fetch(&self, request: FetchRequest) -> anyhow::Result<Vec<Item>> {
            let start = (request.page - 1) * request.limit;
            let end = (start + request.limit).min(self.total);
            Ok((start..end.max(start)).map(|id| Item { id }).collect())
        }
    }

    fn session(total: usize) -> PaginationSession<Item> {
        let config = PaginationConfig {
            page_size: 10,
            batch_size: 100,
            max_resident_batches: 2,
            ..Default::default()
        };
        PaginationSession::new(&config, Arc::new(Numbers { total }), vec![Column::new("ID", "id")]).unwrap()
    }

    #[test]
    fn test_rejects_invalid_config() {
        let config = PaginationConfig {
            batch_size: 15,
            ..Default::default()
        };
        let result = PaginationSession::<Item>::new(&config, Arc::new(Numbers { total: 0 }), vec![]);
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_open_and_render() {
        let mut s = session(1000);
        let cmd = s.open().unwrap();
        assert!(s.is_loading());
        assert_eq!(
            s.state(),
            SessionState::Fetching {
                direction: Direction::Forward,
                batch_index: 0
            }
        );

        let follow_up = s.apply_completion(cmd.await).unwrap();
        assert!(follow_up.is_none());
        assert!(!s.is_loading());
        assert_eq!(s.state(), SessionState::Idle);
        assert_eq!(s.total_pages(), 10);
        assert!(s.render_current().unwrap().contains("| 0  |"));
    }

    #[tokio::test]
    async fn test_stale_completion_discarded() {
        let mut s = session(1000);
        let cmd = s.open().unwrap();
        let mut completion = cmd.await;
        completion.batch_index = 4;

        assert!(matches!(
            s.apply_completion(completion),
            Err(SessionError::UnexpectedCompletion { batch_index: 4, .. })
        ));
        assert!(s.window().is_empty());
    }

    #[tokio::test]
    async fn test_failed_fetch_leaves_window_unchanged() {
        let mut s = session(1000);
        let cmd = s.open().unwrap();
        s.apply_completion(cmd.await).unwrap();

        let cmd = s.navigate(9).unwrap();
        let completion = FetchCompletion {
            items: Err(FetchError::Source {
                batch_index: 1,
                source: "timeout".into(),
            }),
            batch_index: cmd.batch_index(),
            direction: cmd.direction(),
        };
        drop(cmd);

        assert!(matches!(s.apply_completion(completion), Err(SessionError::Fetch(_))));
        assert_eq!(s.state(), SessionState::Idle);
        assert_eq!(s.window().resident_batches(), 1);
        assert_eq!(s.total_pages(), 10);
    }

    #[tokio::test]
    async fn test_dropped_command_returns_to_idle() {
        let mut s = session(1000);
        let flag = s.loading_flag();
        let cmd = s.open().unwrap();
        assert!(flag.load(Ordering::Acquire));

        drop(cmd);
        assert_eq!(s.state(), SessionState::Idle);
        assert!(!s.is_loading());
        assert!(!flag.load(Ordering::Acquire));

        // The batch can be requested again and installs normally.
        let cmd = s.open().unwrap();
        assert_eq!(cmd.batch_index(), 0);
        assert!(s.apply_completion(cmd.await).unwrap().is_none());
        assert_eq!(s.state(), SessionState::Idle);
        assert_eq!(s.total_pages(), 10);
    }

    #[tokio::test]
    async fn test_dropped_prefetch_is_replanned_on_navigation() {
        let mut s = session(1000);
        let cmd = s.open().unwrap();
        s.apply_completion(cmd.await).unwrap();

        let cmd = s.navigate(9).unwrap();
        drop(cmd);

        let cmd = s.navigate(9).expect("abandoned prefetch should be issued again");
        assert_eq!(cmd.batch_index(), 1);
        s.apply_completion(cmd.await).unwrap();
        assert_eq!(s.window().resident_batches(), 2);
    }

    struct Opaque;

    impl Serialize for Opaque {
        fn serialize<S: serde::Serializer>(&self, _serializer: S) -> Result<S::Ok, S::Error> {
            Err(serde::ser::Error::custom("opaque record"))
        }
    }

    struct OpaqueSource;

    #[async_trait]
    impl DataSource<Opaque> for OpaqueSource {
        async fn fetch(&self, request: FetchRequest) -> anyhow::Result<Vec<Opaque>> {
            Ok((0..request.limit).map(|_| Opaque).collect())
        }
    }

    #[tokio::test]
    async fn test_unserializable_batch_not_installed() {
        let mut s: PaginationSession<Opaque> =
            PaginationSession::new(&PaginationConfig::default(), Arc::new(OpaqueSource), vec![Column::new("ID", "id")])
                .unwrap();
        let cmd = s.open().unwrap();

        let err = s.apply_completion(cmd.await).unwrap_err();
        assert!(matches!(err, SessionError::Marshal { batch_index: 0, index: 0, .. }));
        assert!(s.window().is_empty());
        assert_eq!(s.window().batch_len(0), None);
        assert_eq!(s.total_pages(), 0);
        assert_eq!(s.state(), SessionState::Idle);
        assert!(!s.is_loading());
    }

    #[test]
    fn test_sessions_have_distinct_ids() {
        assert_ne!(session(10).id(), session(10).id());
    }
}
