//! Prefetch request types

use super::types::{Direction, DocumentId};

/// A page the scheduler wants rendered ahead of need
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PrefetchRequest {
    pub document: DocumentId,
    /// Backend page number
    pub page: usize,
    pub direction: Direction,
}

/// Message sent to prefetch workers
#[derive(Debug)]
pub enum WorkerRequest {
    /// Render a page in the background (low priority)
    Prefetch(PrefetchRequest),

    /// Shutdown the worker
    Shutdown,
}

/// Lifecycle of a page tracked by the scheduler
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PrefetchState {
    #[default]
    Idle,
    Queued,
    Rendering,
    Cached,
    Discarded,
}

impl PrefetchState {
    /// Whether the page is already on its way into the cache
    #[must_use]
    pub fn is_active(self) -> bool {
        matches!(self, PrefetchState::Queued | PrefetchState::Rendering)
    }
}
