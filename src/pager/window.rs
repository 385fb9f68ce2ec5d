//! Batch window: the contiguous range of batches currently held in memory.
//!
//! Items of all resident batches are kept in one ordered buffer so a display
//! page is always a plain slice. Per-batch lengths are recorded separately and
//! are never dropped on eviction: the total page count is accumulated over
//! every batch ever fetched, not just the resident ones.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::config::PaginationConfig;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum WindowError {
    #[error("Batch {0} is already resident")]
    AlreadyResident(usize),

    #[error("Batch {batch_index} is not adjacent to resident range {first}..={last}")]
    NotAdjacent {
        batch_index: usize,
        first: usize,
        last: usize,
    },
}

/// Which edge of the window a fetch or eviction applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Forward,
    Backward,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Forward => write!(f, "forward"),
            Direction::Backward => write!(f, "backward"),
        }
    }
}

/// Sliding window of loaded batches.
#[derive(Debug)]
pub struct BatchWindow<R> {
    /// Length of every batch ever installed, keyed by batch index.
    batch_len: BTreeMap<usize, usize>,

    /// Resident range as `(first_batch, last_batch)`, `None` until the first install.
    range: Option<(usize, usize)>,

    /// Items of all resident batches, in batch order.
    items: Vec<R>,

    page_size: usize,
    batch_size: usize,
    max_resident: usize,
}

impl<R> BatchWindow<R> {
    /// Create an empty window sized from the pagination config.
    pub fn new(config: &PaginationConfig) -> Self {
        Self {
            batch_len: BTreeMap::new(),
            range: None,
            items: Vec::new(),
            page_size: config.page_size,
            batch_size: config.batch_size,
            max_resident: config.max_resident_batches,
        }
    }

    /// Install a freshly fetched batch at the edge it extends.
    ///
    /// Returns the direction the window grew in. The first install into an
    /// empty window accepts any index and reports `Forward`.
    pub fn install_batch(&mut self, batch_index: usize, items: Vec<R>) -> Result<Direction, WindowError> {
        let len = items.len();
        let direction = match self.range {
            None => {
                self.range = Some((batch_index, batch_index));
                self.items = items;
                Direction::Forward
            }
            Some((first, last)) => {
                if (first..=last).contains(&batch_index) {
                    return Err(WindowError::AlreadyResident(batch_index));
                }
                if batch_index == last + 1 {
                    self.items.extend(items);
                    self.range = Some((first, batch_index));
                    Direction::Forward
                } else if first > 0 && batch_index == first - 1 {
                    let mut items = items;
                    items.append(&mut self.items);
                    self.items = items;
                    self.range = Some((batch_index, last));
                    Direction::Backward
                } else {
                    return Err(WindowError::NotAdjacent { batch_index, first, last });
                }
            }
        };

        self.batch_len.insert(batch_index, len);

        debug!(
            batch_index,
            len,
            direction = %direction,
            resident = self.resident_batches(),
            "Installed batch"
        );

        Ok(direction)
    }

    /// Drop the batch farthest from the edge just extended if the window is
    /// over capacity. Returns the evicted batch index.
    pub fn evict_if_full(&mut self, direction: Direction) -> Option<usize> {
        if self.resident_batches() <= self.max_resident {
            return None;
        }
        let (first, last) = self.range?;

        let evicted = match direction {
            Direction::Forward => {
                let len = self.resident_len(first);
                self.items.drain(..len);
                self.range = Some((first + 1, last));
                first
            }
            Direction::Backward => {
                let len = self.resident_len(last);
                self.items.truncate(self.items.len() - len);
                self.range = Some((first, last - 1));
                last
            }
        };

        debug!(
            evicted,
            direction = %direction,
            resident = self.resident_batches(),
            "Evicted batch"
        );

        Some(evicted)
    }

    /// Display pages known so far: every batch fetched up to `last_batch`,
    /// resident or not, divided by the page size and rounded up.
    pub fn total_pages(&self) -> usize {
        self.total_items().div_ceil(self.page_size)
    }

    /// Records known so far over batches `0..=last_batch`.
    pub fn total_items(&self) -> usize {
        match self.range {
            Some((_, last)) => self.batch_len.range(..=last).map(|(_, len)| len).sum(),
            None => 0,
        }
    }

    /// First resident batch index.
    pub fn first_batch(&self) -> Option<usize> {
        self.range.map(|(first, _)| first)
    }

    /// Last resident batch index.
    pub fn last_batch(&self) -> Option<usize> {
        self.range.map(|(_, last)| last)
    }

    /// Number of resident batches.
    pub fn resident_batches(&self) -> usize {
        self.range.map_or(0, |(first, last)| last - first + 1)
    }

    pub fn is_resident(&self, batch_index: usize) -> bool {
        self.range
            .is_some_and(|(first, last)| (first..=last).contains(&batch_index))
    }

    pub fn is_empty(&self) -> bool {
        self.range.is_none()
    }

    /// Recorded length of a batch, including evicted ones.
    pub fn batch_len(&self, batch_index: usize) -> Option<usize> {
        self.batch_len.get(&batch_index).copied()
    }

    /// Whether the last resident batch came back short, i.e. the source has
    /// no records beyond it.
    pub fn reaches_end(&self) -> bool {
        self.last_batch()
            .and_then(|last| self.batch_len(last))
            .is_some_and(|len| len < self.batch_size)
    }

    /// The resident item buffer.
    pub fn items(&self) -> &[R] {
        &self.items
    }

    pub fn max_resident(&self) -> usize {
        self.max_resident
    }

    fn resident_len(&self, batch_index: usize) -> usize {
        self.batch_len.get(&batch_index).copied().unwrap_or(0)
    }
}
