//! Prefetch worker - runs in separate thread(s)

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use flume::Receiver;
use log::{debug, warn};

use super::backend::{Backend, PageSource};
use super::cache::{CacheEntry, CacheKey, Claim, PageCache};
use super::request::{PrefetchRequest, PrefetchState, WorkerRequest};
use super::timing::{Stopwatch, TimingObserver};
use super::types::DocumentId;

pub(crate) type TrackedPages = Arc<Mutex<HashMap<usize, PrefetchState>>>;

/// Everything a worker shares with its scheduler
#[derive(Clone)]
pub(crate) struct WorkerContext {
    pub backend: Arc<dyn Backend>,
    pub path: PathBuf,
    pub document: DocumentId,
    pub scale: f32,
    pub cache: Arc<PageCache>,
    pub tracked: TrackedPages,
    pub cancelled: Arc<AtomicBool>,
    pub timing: Arc<dyn TimingObserver>,
}

impl WorkerContext {
    fn set_state(&self, page: usize, state: PrefetchState) {
        self.tracked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(page, state);
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Main worker function - runs in a dedicated thread
#[expect(
    clippy::needless_pass_by_value,
    reason = "Values moved into thread, need ownership"
)]
pub(crate) fn prefetch_worker(ctx: WorkerContext, requests: Receiver<WorkerRequest>) {
    let source = match ctx.backend.open(&ctx.path) {
        Ok(source) => source,
        Err(e) => {
            warn!(
                "Prefetch worker could not open {}: {e}",
                ctx.path.display()
            );
            // Keep draining so queued pages do not look active forever
            for request in requests {
                match request {
                    WorkerRequest::Prefetch(req) => ctx.set_state(req.page, PrefetchState::Discarded),
                    WorkerRequest::Shutdown => break,
                }
            }
            return;
        }
    };

    for request in requests {
        match request {
            WorkerRequest::Prefetch(req) => handle_prefetch(&ctx, source.as_ref(), req),
            WorkerRequest::Shutdown => break,
        }
    }
}

fn handle_prefetch(ctx: &WorkerContext, source: &dyn PageSource, req: PrefetchRequest) {
    if ctx.is_cancelled() || req.document != ctx.document {
        ctx.set_state(req.page, PrefetchState::Discarded);
        return;
    }

    let key = CacheKey::new(req.document, req.page);

    // A page that failed before is left to the foreground retry
    if matches!(ctx.cache.get(&key), Some(CacheEntry::Failed(_))) {
        ctx.set_state(req.page, PrefetchState::Discarded);
        return;
    }

    match ctx.cache.claim(key) {
        Claim::Ready(_) => ctx.set_state(req.page, PrefetchState::Cached),
        Claim::InFlight(_) | Claim::Retired => ctx.set_state(req.page, PrefetchState::Discarded),
        Claim::Owner(ticket) => {
            ctx.set_state(req.page, PrefetchState::Rendering);
            debug!("Prefetching page {} ({:?})", req.page, req.direction);

            let watch = Stopwatch::start(ctx.timing.as_ref(), format!("prefetch page {}", req.page));
            let result = source.render_page(req.page, ctx.scale);
            watch.stop();

            let state = match ticket.complete(result) {
                Ok(_) if !ctx.is_cancelled() => PrefetchState::Cached,
                Ok(_) => PrefetchState::Discarded,
                Err(e) => {
                    debug!("Prefetch of page {} failed: {e}", req.page);
                    PrefetchState::Discarded
                }
            };
            ctx.set_state(req.page, state);
        }
    }
}
