//! Page cache for rendered pages
//!
//! Every key holds at most one slot: `Pending` while a render is in flight,
//! then `Ready` or `Failed`. Callers that find a `Pending` slot block on that
//! render's condvar instead of starting a second one.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use log::debug;
use lru::LruCache;

use super::error::RenderError;
use super::types::{DocumentId, RenderedBitmap};

/// Cache key for rendered pages
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub document: DocumentId,
    /// Backend page number
    pub page: usize,
}

impl CacheKey {
    #[must_use]
    pub const fn new(document: DocumentId, page: usize) -> Self {
        Self { document, page }
    }
}

/// Result of a render as shared between the owner and its waiters
pub type RenderOutcome = Result<Arc<RenderedBitmap>, RenderError>;

/// Snapshot of a cache slot
#[derive(Clone, Debug)]
pub enum CacheEntry {
    Pending,
    Ready(Arc<RenderedBitmap>),
    Failed(RenderError),
}

impl CacheEntry {
    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(self, CacheEntry::Ready(_))
    }

    #[must_use]
    pub fn image(&self) -> Option<&Arc<RenderedBitmap>> {
        match self {
            CacheEntry::Ready(image) => Some(image),
            _ => None,
        }
    }
}

struct InFlight {
    outcome: Mutex<Option<RenderOutcome>>,
    done: Condvar,
    waiters: AtomicUsize,
}

impl InFlight {
    fn new() -> Self {
        Self {
            outcome: Mutex::new(None),
            done: Condvar::new(),
            waiters: AtomicUsize::new(0),
        }
    }

    /// Publish the outcome. Only the first call wins.
    fn set(&self, outcome: RenderOutcome) {
        let mut slot = self
            .outcome
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if slot.is_none() {
            *slot = Some(outcome);
        }
        self.done.notify_all();
    }

    fn wait(&self) -> RenderOutcome {
        let mut guard = self
            .outcome
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        loop {
            if let Some(outcome) = guard.as_ref() {
                return outcome.clone();
            }
            guard = self
                .done
                .wait(guard)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

enum Slot {
    Pending(Arc<InFlight>),
    Ready(Arc<RenderedBitmap>),
    Failed(RenderError),
}

impl Slot {
    fn snapshot(&self) -> CacheEntry {
        match self {
            Slot::Pending(_) => CacheEntry::Pending,
            Slot::Ready(image) => CacheEntry::Ready(Arc::clone(image)),
            Slot::Failed(err) => CacheEntry::Failed(err.clone()),
        }
    }
}

struct Inner {
    entries: LruCache<CacheKey, Slot>,
    /// Identities below this value are closed. Ids are minted in
    /// increasing order, so retiring one retires every older one.
    retired_below: u64,
    last_requested: Option<CacheKey>,
}

impl Inner {
    fn is_retired(&self, document: DocumentId) -> bool {
        document.0 < self.retired_below
    }
}

/// Decision taken by [`PageCache::claim`]
pub enum Claim<'a> {
    /// Already rendered
    Ready(Arc<RenderedBitmap>),
    /// Someone else is rendering; wait for their result
    InFlight(Waiter),
    /// The caller must render and complete the ticket
    Owner(RenderTicket<'a>),
    /// The document was closed
    Retired,
}

/// Handle on another caller's in-flight render
pub struct Waiter {
    flight: Arc<InFlight>,
}

impl Waiter {
    /// Block until the owner publishes its outcome
    pub fn wait(self) -> RenderOutcome {
        self.flight.wait()
    }
}

impl Drop for Waiter {
    fn drop(&mut self) {
        self.flight.waiters.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Exclusive right to render one key.
///
/// Dropping the ticket without completing it publishes
/// [`RenderError::Abandoned`], so waiters never hang on a dead render.
pub struct RenderTicket<'a> {
    cache: &'a PageCache,
    key: CacheKey,
    flight: Arc<InFlight>,
    completed: bool,
}

impl RenderTicket<'_> {
    #[must_use]
    pub fn key(&self) -> CacheKey {
        self.key
    }

    /// Publish the render result and return what every waiter observes
    pub fn complete(mut self, result: Result<RenderedBitmap, RenderError>) -> RenderOutcome {
        self.completed = true;
        self.cache.publish(self.key, &self.flight, result.map(Arc::new));
        self.flight.wait()
    }
}

impl Drop for RenderTicket<'_> {
    fn drop(&mut self) {
        if !self.completed {
            let page = self.key.page;
            self.cache
                .publish(self.key, &self.flight, Err(RenderError::Abandoned { page }));
        }
    }
}

/// Bounded store of rendered pages, shared between the view and the
/// prefetch workers
pub struct PageCache {
    inner: Mutex<Inner>,
    capacity: usize,
    eviction_window: usize,
}

impl PageCache {
    /// Create a cache holding about `capacity` pages. Pages within
    /// `eviction_window` of the last requested page are kept even over
    /// capacity.
    #[must_use]
    pub fn new(capacity: usize, eviction_window: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: LruCache::unbounded(),
                retired_below: 0,
                last_requested: None,
            }),
            capacity: capacity.max(1),
            eviction_window,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Non-blocking lookup
    #[must_use]
    pub fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.lock().entries.peek(key).map(Slot::snapshot)
    }

    /// Check if a key holds a finished image
    #[must_use]
    pub fn contains_ready(&self, key: &CacheKey) -> bool {
        matches!(self.lock().entries.peek(key), Some(Slot::Ready(_)))
    }

    /// Decide who renders `key`. A `Failed` slot is treated as absent so
    /// the caller retries.
    pub fn claim(&self, key: CacheKey) -> Claim<'_> {
        let mut inner = self.lock();
        if inner.is_retired(key.document) {
            return Claim::Retired;
        }

        match inner.entries.get(&key) {
            Some(Slot::Ready(image)) => return Claim::Ready(Arc::clone(image)),
            Some(Slot::Pending(flight)) => {
                flight.waiters.fetch_add(1, Ordering::AcqRel);
                return Claim::InFlight(Waiter {
                    flight: Arc::clone(flight),
                });
            }
            Some(Slot::Failed(_)) | None => {}
        }

        let flight = Arc::new(InFlight::new());
        inner.entries.put(key, Slot::Pending(Arc::clone(&flight)));
        self.evict(&mut inner);

        Claim::Owner(RenderTicket {
            cache: self,
            key,
            flight,
            completed: false,
        })
    }

    /// Return the cached page, wait for an in-flight render of it, or
    /// render it on the calling thread with `render`.
    pub fn fetch_or_render<F>(&self, key: CacheKey, render: F) -> RenderOutcome
    where
        F: FnOnce() -> Result<RenderedBitmap, RenderError>,
    {
        match self.claim(key) {
            Claim::Ready(image) => Ok(image),
            Claim::InFlight(waiter) => waiter.wait(),
            Claim::Owner(ticket) => {
                let result = render();
                ticket.complete(result)
            }
            Claim::Retired => Err(RenderError::DocumentClosed { page: key.page }),
        }
    }

    /// Publish a page rendered outside [`claim`](Self::claim).
    ///
    /// Returns `false` when the image was discarded: the document was closed,
    /// or a ready image already exists (ready images are never replaced).
    pub fn insert(&self, key: CacheKey, image: RenderedBitmap) -> bool {
        let image = Arc::new(image);
        let pending = {
            let mut inner = self.lock();
            if inner.is_retired(key.document) {
                debug!("Discarding page {} for closed {}", key.page, key.document);
                return false;
            }

            let pending = match inner.entries.peek(&key) {
                Some(Slot::Ready(_)) => return false,
                Some(Slot::Pending(flight)) => Some(Arc::clone(flight)),
                Some(Slot::Failed(_)) | None => None,
            };

            inner.entries.put(key, Slot::Ready(Arc::clone(&image)));
            self.evict(&mut inner);
            pending
        };

        if let Some(flight) = pending {
            flight.set(Ok(image));
        }
        true
    }

    /// Store `outcome` if the slot is still ours and wake every waiter
    fn publish(&self, key: CacheKey, flight: &Arc<InFlight>, outcome: RenderOutcome) {
        {
            let mut inner = self.lock();
            let ours = matches!(
                inner.entries.peek(&key),
                Some(Slot::Pending(current)) if Arc::ptr_eq(current, flight)
            );

            if inner.is_retired(key.document) {
                if ours {
                    inner.entries.pop(&key);
                }
                debug!("Discarding page {} for closed {}", key.page, key.document);
            } else if ours {
                let slot = match &outcome {
                    Ok(image) => Slot::Ready(Arc::clone(image)),
                    Err(err) => Slot::Failed(err.clone()),
                };
                inner.entries.put(key, slot);
                self.evict(&mut inner);
            }
        }

        flight.set(outcome);
    }

    /// Drop every page of `document`, and of any older identity, and discard
    /// their late completions
    pub fn invalidate(&self, document: DocumentId) -> usize {
        let mut inner = self.lock();
        inner.retired_below = inner.retired_below.max(document.0.saturating_add(1));

        let stale: Vec<CacheKey> = inner
            .entries
            .iter()
            .filter(|(key, _)| inner.is_retired(key.document))
            .map(|(key, _)| *key)
            .collect();
        for key in &stale {
            inner.entries.pop(key);
        }

        if inner
            .last_requested
            .is_some_and(|key| inner.is_retired(key.document))
        {
            inner.last_requested = None;
        }

        debug!("Invalidated {} pages of {document}", stale.len());
        stale.len()
    }

    /// Record the page the view just asked for, whether or not it renders;
    /// eviction distance is measured from it.
    pub fn mark_requested(&self, key: CacheKey) {
        let mut inner = self.lock();
        inner.last_requested = Some(key);
        self.evict(&mut inner);
    }

    fn evict(&self, inner: &mut Inner) {
        let anchor = inner.last_requested;
        let window = self.eviction_window;

        while inner.entries.len() > self.capacity {
            // Iteration runs most- to least-recently used; `max_by_key` keeps
            // the last maximum, so ties go to the least recently used page.
            let victim = inner
                .entries
                .iter()
                .filter(|(_, slot)| !matches!(slot, Slot::Pending(_)))
                .map(|(key, _)| (*key, distance(anchor, key)))
                .filter(|(_, d)| *d > window)
                .max_by_key(|(_, d)| *d);

            let Some((key, _)) = victim else {
                break;
            };
            inner.entries.pop(&key);
            debug!("Evicted page {} of {}", key.page, key.document);
        }
    }

    /// Number of callers blocked on the in-flight render of `key`
    #[must_use]
    pub fn waiters(&self, key: &CacheKey) -> usize {
        match self.lock().entries.peek(key) {
            Some(Slot::Pending(flight)) => flight.waiters.load(Ordering::Acquire),
            _ => 0,
        }
    }

    /// Number of cached slots, pending ones included
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

fn distance(anchor: Option<CacheKey>, key: &CacheKey) -> usize {
    match anchor {
        Some(anchor) if anchor.document == key.document => anchor.page.abs_diff(key.page),
        _ => usize::MAX,
    }
}
