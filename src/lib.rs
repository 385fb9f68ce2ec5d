//! batch-pager: batched pagination cache for terminal table views.
//!
//! The table shows small display pages while the backing source is queried
//! in large batches. A bounded window of batches stays in memory and the
//! neighbouring batch is prefetched before navigation reaches it:
//!   display page (10 rows) → batch (100 rows) → data source (1-based pages)

pub mod config;
pub mod pager;
pub mod source;
