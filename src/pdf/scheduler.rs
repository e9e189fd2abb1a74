//! Prefetch scheduler - renders pages ahead of the view in the background

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError};

use flume::{Receiver, Sender};
use log::{debug, warn};

use super::backend::Backend;
use super::cache::{CacheKey, PageCache};
use super::request::{PrefetchRequest, PrefetchState, WorkerRequest};
use super::timing::TimingObserver;
use super::types::{Direction, DocumentHandle, DocumentId, PageLayout};
use super::worker::{TrackedPages, WorkerContext, prefetch_worker};

/// Tunables for one scheduler
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PrefetchConfig {
    /// Background render threads
    pub workers: usize,
    /// Pages to render ahead of the current one (at least 1)
    pub window: usize,
    /// Render scale for the session
    pub scale: f32,
}

/// Background prefetch for one open document.
///
/// Dropping the scheduler cancels it.
pub struct PrefetchScheduler {
    document: DocumentId,
    request_tx: Sender<WorkerRequest>,
    request_rx: Receiver<WorkerRequest>,
    tracked: TrackedPages,
    cancelled: Arc<AtomicBool>,
    cache: Arc<PageCache>,
    num_workers: usize,
    window: usize,
}

impl PrefetchScheduler {
    /// Start the worker pool for `handle`
    pub fn spawn(
        backend: Arc<dyn Backend>,
        handle: &DocumentHandle,
        cache: Arc<PageCache>,
        timing: Arc<dyn TimingObserver>,
        config: PrefetchConfig,
    ) -> Self {
        // flume gives an MPMC queue: every worker pulls from the same receiver
        let (request_tx, request_rx) = flume::unbounded();
        let tracked = TrackedPages::default();
        let cancelled = Arc::new(AtomicBool::new(false));

        let ctx = WorkerContext {
            backend,
            path: handle.path.clone(),
            document: handle.id,
            scale: config.scale,
            cache: Arc::clone(&cache),
            tracked: Arc::clone(&tracked),
            cancelled: Arc::clone(&cancelled),
            timing,
        };

        let mut num_workers = 0;
        for i in 0..config.workers.max(1) {
            let ctx = ctx.clone();
            let rx = request_rx.clone();
            let spawned = std::thread::Builder::new()
                .name(format!("prefetch-{i}"))
                .spawn(move || prefetch_worker(ctx, rx));
            match spawned {
                Ok(_) => num_workers += 1,
                Err(e) => warn!("Failed to spawn prefetch worker {i}: {e}"),
            }
        }

        debug!(
            "Prefetch for {} started with {num_workers} workers, window {}",
            handle.id, config.window
        );

        Self {
            document: handle.id,
            request_tx,
            request_rx,
            tracked,
            cancelled,
            cache,
            num_workers,
            window: config.window.max(1),
        }
    }

    /// Queue the pages that follow `current` in `direction`.
    ///
    /// Returns the backend pages that were queued.
    pub fn on_navigate(&mut self, current: usize, direction: Direction, layout: PageLayout) -> Vec<usize> {
        if self.is_cancelled() {
            return Vec::new();
        }

        let mut queued = Vec::new();
        for index in lookahead(current, direction, layout.page_count(), self.window) {
            let Some(page) = layout.to_backend(index) else {
                continue;
            };
            if self.cache.contains_ready(&CacheKey::new(self.document, page)) {
                continue;
            }

            {
                let mut tracked = self.tracked.lock().unwrap_or_else(PoisonError::into_inner);
                if tracked.get(&page).is_some_and(|state| state.is_active()) {
                    continue;
                }
                tracked.insert(page, PrefetchState::Queued);
            }

            let request = PrefetchRequest {
                document: self.document,
                page,
                direction,
            };
            if self.request_tx.send(WorkerRequest::Prefetch(request)).is_err() {
                self.set_state(page, PrefetchState::Discarded);
                continue;
            }
            queued.push(page);
        }

        if !queued.is_empty() {
            debug!("Queued prefetch of pages {queued:?} ({direction:?}) for {}", self.document);
        }
        queued
    }

    /// Tracked state of a backend page
    #[must_use]
    pub fn status(&self, page: usize) -> PrefetchState {
        self.tracked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&page)
            .copied()
            .unwrap_or_default()
    }

    /// Pages queued and not yet picked up by a worker
    #[must_use]
    pub fn queued_len(&self) -> usize {
        self.tracked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|state| **state == PrefetchState::Queued)
            .count()
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Stop honoring work for this document: drop the queue and shut the
    /// workers down. Renders already running finish and are discarded.
    pub fn cancel(&mut self) {
        if self.cancelled.swap(true, Ordering::AcqRel) {
            return;
        }

        let drained = self
            .request_rx
            .try_iter()
            .filter(|request| matches!(request, WorkerRequest::Prefetch(_)))
            .count();
        {
            // Includes pages a worker took off the queue but has not started
            let mut tracked = self.tracked.lock().unwrap_or_else(PoisonError::into_inner);
            for state in tracked.values_mut() {
                if *state == PrefetchState::Queued {
                    *state = PrefetchState::Discarded;
                }
            }
        }

        for _ in 0..self.num_workers {
            let _ = self.request_tx.send(WorkerRequest::Shutdown);
        }

        debug!(
            "Cancelled prefetch for {} ({} queued pages dropped)",
            self.document, drained
        );
    }

    fn set_state(&self, page: usize, state: PrefetchState) {
        self.tracked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(page, state);
    }
}

impl Drop for PrefetchScheduler {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Effective indices following `current` in `direction`, clamped to the
/// document, nearest first
#[must_use]
pub fn lookahead(current: usize, direction: Direction, page_count: usize, window: usize) -> Vec<usize> {
    let window = window.max(1);
    match direction {
        Direction::Forward => (current.saturating_add(1)..page_count).take(window).collect(),
        Direction::Backward => (0..current.min(page_count)).rev().take(window).collect(),
    }
}
