//! Batched pagination cache.
//!
//! This module contains the pager components, leaves first:
//! - [`gateway`]: FetchGateway, the single path to the data source
//! - [`window`]: BatchWindow, the bounded range of resident batches
//! - [`scheduler`]: PrefetchScheduler, forward/backward prefetch decisions
//! - [`view`]: PageView, page slicing and table rendering
//! - [`session`]: PaginationSession, which owns all of the above

pub mod gateway;
pub mod scheduler;
pub mod session;
pub mod view;
pub mod window;

pub use gateway::{DataSource, FetchError, FetchGateway, FetchRequest};
pub use scheduler::{FetchPlan, PrefetchScheduler};
pub use session::{FetchCommand, FetchCompletion, PaginationSession, SessionError, SessionState};
pub use view::{Column, JsonRecordSerializer, PageView, RecordSerializer, RenderError, TableRenderer, TextTableRenderer};
pub use window::{BatchWindow, Direction, WindowError};
