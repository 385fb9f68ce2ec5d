//! Prefetch scheduling: decides when the neighbouring batch must be fetched.
//!
//! Navigation is assumed to move one page at a time. When the current page
//! gets within the threshold of the window's last (or first) batch edge, the
//! next batch beyond that edge is requested so it is resident before the user
//! reaches it.

use serde::{Deserialize, Serialize};

use crate::config::PaginationConfig;
use crate::pager::window::{BatchWindow, Direction};

/// A fetch the scheduler wants issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchPlan {
    pub batch_index: usize,
    pub direction: Direction,
}

/// Decides prefetches and evictions from the current page and window state.
#[derive(Debug, Clone)]
pub struct PrefetchScheduler {
    pages_per_batch: usize,
    threshold: usize,
}

impl PrefetchScheduler {
    pub fn new(config: &PaginationConfig) -> Self {
        Self {
            pages_per_batch: config.pages_per_batch(),
            threshold: config.prefetch_threshold_pages(),
        }
    }

    /// Page offset of `page` relative to the first resident page.
    pub fn position_in_window<R>(&self, page: usize, window: &BatchWindow<R>) -> Option<usize> {
        let first = window.first_batch()?;
        page.checked_sub(first * self.pages_per_batch)
    }

    /// Compute the fetch needed for `page`, if any.
    ///
    /// Forward: the page lies in the last resident batch at or past the
    /// threshold (or beyond the window altogether), and that batch was full;
    /// a short batch marks the end of data.
    /// Backward: the page lies in the first resident batch within the mirrored
    /// threshold (or before the window), and the first batch is not batch 0.
    pub fn plan<R>(&self, page: usize, window: &BatchWindow<R>) -> Option<FetchPlan> {
        let (first, last) = (window.first_batch()?, window.last_batch()?);
        let Some(position) = self.position_in_window(page, window) else {
            return Some(FetchPlan {
                batch_index: first - 1,
                direction: Direction::Backward,
            });
        };
        let batch_offset = position / self.pages_per_batch;
        let page_in_batch = position % self.pages_per_batch;
        let last_offset = last - first;

        if batch_offset > last_offset || (batch_offset == last_offset && page_in_batch >= self.threshold) {
            if window.reaches_end() {
                return None;
            }
            return Some(FetchPlan {
                batch_index: last + 1,
                direction: Direction::Forward,
            });
        }

        if batch_offset == 0 && first > 0 && page_in_batch + self.threshold < self.pages_per_batch {
            return Some(FetchPlan {
                batch_index: first - 1,
                direction: Direction::Backward,
            });
        }

        None
    }

    /// Whether the window holds more batches than it may.
    pub fn should_evict<R>(&self, window: &BatchWindow<R>) -> bool {
        window.resident_batches() > window.max_resident()
    }
}
