//! Page rendering infrastructure: backends, page cache and prefetch

pub mod backend;
mod cache;
mod document;
mod error;
mod request;
mod scheduler;
mod state;
mod timing;
mod types;
mod viewer;
mod worker;

pub use backend::{Backend, BackendKind, PageSource};
pub use cache::{CacheEntry, CacheKey, Claim, PageCache, RenderOutcome, RenderTicket, Waiter};
pub use document::{DocumentModel, Opened};
pub use error::{OpenError, RenderError, ViewerError};
pub use request::{PrefetchRequest, PrefetchState, WorkerRequest};
pub use scheduler::{PrefetchConfig, PrefetchScheduler, lookahead};
pub use state::{Command, DisplayState, Effect};
pub use timing::{LogTiming, NoTiming, Stopwatch, TimingObserver};
pub use types::*;
pub use viewer::{NullObserver, PageStatus, Side, Step, Viewer, ViewerConfig, ViewerObserver};

/// Cached pages kept before distance-based eviction kicks in
pub const DEFAULT_CACHE_SIZE: usize = 16;
/// Pages on either side of the current one that are never evicted
pub const DEFAULT_EVICTION_WINDOW: usize = 4;
pub const DEFAULT_PREFETCH_WINDOW: usize = 2;
pub const DEFAULT_WORKERS: usize = 2;
/// Pixels per PDF point
pub const DEFAULT_RENDER_SCALE: f32 = 2.0;
