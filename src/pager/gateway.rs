//! Fetch gateway: the single path from the pager to the remote data source.
//!
//! Every batch is fetched with the same limit and sort; only the upstream
//! page number changes (`batch_index + 1`, the source is 1-based). At most one
//! fetch is outstanding at a time. The guard is taken when a fetch is issued
//! and released, together with the loading flag, when the fetch future
//! finishes or is dropped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};

use crate::config::PaginationConfig;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Data source failed for batch {batch_index}: {source}")]
    Source {
        batch_index: usize,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("A fetch is already in flight")]
    InFlight,

    #[error("Data source returned {returned} records for batch {batch_index}, limit is {limit}")]
    Oversized {
        batch_index: usize,
        returned: usize,
        limit: usize,
    },
}

/// Query parameters handed to the data source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchRequest {
    /// Maximum records to return (always the batch size).
    pub limit: usize,
    /// 1-based upstream page number.
    pub page: usize,
    pub sort_key: String,
    pub ascending: bool,
}

/// A remote, page-oriented source of records.
#[async_trait]
pub trait DataSource<R>: Send + Sync {
    async fn fetch(&self, request: FetchRequest) -> anyhow::Result<Vec<R>>;
}

/// Clears the loading flag when dropped.
struct LoadingGuard(Arc<AtomicBool>);

impl LoadingGuard {
    fn set(flag: Arc<AtomicBool>) -> Self {
        flag.store(true, Ordering::Release);
        Self(flag)
    }
}

impl Drop for LoadingGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Wraps the data source behind a uniform batch fetch.
pub struct FetchGateway<R> {
    source: Arc<dyn DataSource<R>>,
    limit: usize,
    sort_key: String,
    ascending: bool,
    loading: Arc<AtomicBool>,
    guard: Arc<Mutex<()>>,
}

impl<R: Send + 'static> FetchGateway<R> {
    pub fn new(source: Arc<dyn DataSource<R>>, config: &PaginationConfig) -> Self {
        Self {
            source,
            limit: config.batch_size,
            sort_key: config.sort.key.clone(),
            ascending: config.sort.ascending,
            loading: Arc::new(AtomicBool::new(false)),
            guard: Arc::new(Mutex::new(())),
        }
    }

    /// The request sent upstream for a batch.
    pub fn request_for(&self, batch_index: usize) -> FetchRequest {
        FetchRequest {
            limit: self.limit,
            page: batch_index + 1,
            sort_key: self.sort_key.clone(),
            ascending: self.ascending,
        }
    }

    /// Issue a fetch for `batch_index`.
    ///
    /// Takes the in-flight guard and sets the loading flag immediately; the
    /// returned handle does the actual I/O when run. Fails with
    /// [`FetchError::InFlight`] while another fetch holds the guard.
    pub fn begin(&self, batch_index: usize) -> Result<PendingFetch<R>, FetchError> {
        let permit = self
            .guard
            .clone()
            .try_lock_owned()
            .map_err(|_| FetchError::InFlight)?;
        let loading = LoadingGuard::set(self.loading.clone());

        debug!(batch_index, "Fetch issued");

        Ok(PendingFetch {
            source: self.source.clone(),
            request: self.request_for(batch_index),
            batch_index,
            _permit: permit,
            _loading: loading,
        })
    }

    /// Issue and await a fetch in one step.
    pub async fn fetch_batch(&self, batch_index: usize) -> Result<Vec<R>, FetchError> {
        self.begin(batch_index)?.run().await
    }

    /// Whether a fetch is outstanding.
    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::Acquire)
    }

    /// Shared handle on the loading flag, for UI spinners.
    pub fn loading_flag(&self) -> Arc<AtomicBool> {
        self.loading.clone()
    }
}

/// An issued fetch holding the in-flight guard until it completes.
pub struct PendingFetch<R> {
    source: Arc<dyn DataSource<R>>,
    request: FetchRequest,
    batch_index: usize,
    _permit: OwnedMutexGuard<()>,
    _loading: LoadingGuard,
}

impl<R> PendingFetch<R> {
    pub fn batch_index(&self) -> usize {
        self.batch_index
    }

    /// Run the fetch against the data source.
    pub async fn run(self) -> Result<Vec<R>, FetchError> {
        let batch_index = self.batch_index;
        let limit = self.request.limit;

        let items = self
            .source
            .fetch(self.request.clone())
            .await
            .map_err(|e| {
                warn!(batch_index, error = %e, "Data source fetch failed");
                FetchError::Source {
                    batch_index,
                    source: e.into(),
                }
            })?;

        if items.len() > limit {
            return Err(FetchError::Oversized {
                batch_index,
                returned: items.len(),
                limit,
            });
        }

        debug!(batch_index, len = items.len(), "Fetch finished");
        Ok(items)
    }
}
