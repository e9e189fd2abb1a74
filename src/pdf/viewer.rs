//! Viewer facade: the operations the view calls and the signals it receives

use std::path::Path;
use std::sync::Arc;

use log::{debug, warn};

use super::backend::{Backend, BackendKind};
use super::cache::{CacheEntry, CacheKey, PageCache};
use super::document::{DocumentModel, Opened};
use super::error::{OpenError, RenderError, ViewerError};
use super::request::PrefetchState;
use super::scheduler::{PrefetchConfig, PrefetchScheduler};
use super::state::{Command, Effect};
use super::timing::{NoTiming, Stopwatch, TimingObserver};
use super::types::{
    Direction, DisplayParameters, DocumentHandle, PageGeometry, ReadingDirection, RenderedBitmap,
};
use super::{
    DEFAULT_CACHE_SIZE, DEFAULT_EVICTION_WINDOW, DEFAULT_PREFETCH_WINDOW, DEFAULT_RENDER_SCALE,
    DEFAULT_WORKERS,
};

/// Tunables for a [`Viewer`]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ViewerConfig {
    pub backend: BackendKind,
    /// Pixels per PDF point
    pub render_scale: f32,
    pub prefetch_window: usize,
    pub cache_capacity: usize,
    pub eviction_window: usize,
    pub workers: usize,
    pub display: DisplayParameters,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            render_scale: DEFAULT_RENDER_SCALE,
            prefetch_window: DEFAULT_PREFETCH_WINDOW,
            cache_capacity: DEFAULT_CACHE_SIZE,
            eviction_window: DEFAULT_EVICTION_WINDOW,
            workers: DEFAULT_WORKERS,
            display: DisplayParameters::default(),
        }
    }
}

/// Signals sent to the view. All methods default to doing nothing.
pub trait ViewerObserver {
    /// A requested page is ready to paint
    fn page_ready(&self, _index: usize, _image: &Arc<RenderedBitmap>) {}

    /// A requested page could not be rendered; show a placeholder
    fn page_failed(&self, _index: usize, _error: &RenderError) {}

    /// A foreground render started (`true`) or finished (`false`)
    fn busy(&self, _busy: bool) {}

    /// Page sizes, page count or navigation order changed
    fn layout_changed(&self) {}
}

/// Observer that ignores every signal
#[derive(Clone, Copy, Debug, Default)]
pub struct NullObserver;

impl ViewerObserver for NullObserver {}

/// Cache status of a page as seen by the view
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PageStatus {
    Absent,
    Pending,
    Ready,
    Failed,
}

/// Step in reading order
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    Next,
    Previous,
}

/// Screen side the user turned towards
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    /// Reading-order step for this side under `direction`
    #[must_use]
    pub fn step(self, direction: ReadingDirection) -> Step {
        match (self, direction) {
            (Side::Right, ReadingDirection::LeftToRight) | (Side::Left, ReadingDirection::RightToLeft) => {
                Step::Next
            }
            (Side::Left, ReadingDirection::LeftToRight) | (Side::Right, ReadingDirection::RightToLeft) => {
                Step::Previous
            }
        }
    }
}

/// Page cache and prefetch engine behind a single view
pub struct Viewer {
    model: DocumentModel,
    cache: Arc<PageCache>,
    scheduler: Option<PrefetchScheduler>,
    config: ViewerConfig,
    observer: Box<dyn ViewerObserver>,
    timing: Arc<dyn TimingObserver>,
    last_request: Option<usize>,
    direction: Direction,
}

impl Viewer {
    /// Create a viewer with the backend named in `config`
    pub fn new(config: ViewerConfig) -> Result<Self, OpenError> {
        Ok(Self::with_backend(config.backend.create()?, config))
    }

    /// Create a viewer over an already constructed backend
    #[must_use]
    pub fn with_backend(backend: Arc<dyn Backend>, config: ViewerConfig) -> Self {
        Self {
            model: DocumentModel::new(backend, config.display),
            cache: Arc::new(PageCache::new(config.cache_capacity, config.eviction_window)),
            scheduler: None,
            config,
            observer: Box::new(NullObserver),
            timing: Arc::new(NoTiming),
            last_request: None,
            direction: Direction::Forward,
        }
    }

    #[must_use]
    pub fn with_observer(mut self, observer: Box<dyn ViewerObserver>) -> Self {
        self.observer = observer;
        self
    }

    #[must_use]
    pub fn with_timing(mut self, timing: Arc<dyn TimingObserver>) -> Self {
        self.timing = timing;
        self
    }

    /// Open a document. On failure the current document stays open.
    pub fn open_document(&mut self, path: impl AsRef<Path>) -> Result<DocumentHandle, ViewerError> {
        let opened = self.model.open_document(path.as_ref())?;
        Ok(self.start_session(opened))
    }

    /// Reopen the current file from disk as a new identity
    pub fn reload(&mut self) -> Result<Option<DocumentHandle>, ViewerError> {
        let current_page = self.model.current_page();
        let Some(opened) = self.model.reload()? else {
            return Ok(None);
        };
        let handle = self.start_session(opened);
        self.last_request = Some(current_page.min(self.page_count().saturating_sub(1)));
        Ok(Some(handle))
    }

    fn start_session(&mut self, opened: Opened) -> DocumentHandle {
        // Old identity is gone before the new document serves anything
        self.stop_prefetch();
        if let Some(previous) = opened.previous {
            self.cache.invalidate(previous);
        }

        self.scheduler = Some(PrefetchScheduler::spawn(
            Arc::clone(self.model.backend()),
            &opened.handle,
            Arc::clone(&self.cache),
            Arc::clone(&self.timing),
            PrefetchConfig {
                workers: self.config.workers,
                window: self.config.prefetch_window,
                scale: self.config.render_scale,
            },
        ));
        self.last_request = None;
        self.direction = Direction::Forward;
        self.observer.layout_changed();

        opened.handle
    }

    /// Close the document, dropping its pages and its prefetch work
    pub fn close_document(&mut self) -> Option<DocumentHandle> {
        self.stop_prefetch();
        let closed = self.model.close()?;
        self.cache.invalidate(closed.id);
        self.last_request = None;
        self.observer.layout_changed();
        Some(closed)
    }

    fn stop_prefetch(&mut self) {
        if let Some(mut scheduler) = self.scheduler.take() {
            scheduler.cancel();
        }
    }

    #[must_use]
    pub fn document(&self) -> Option<&DocumentHandle> {
        self.model.handle()
    }

    /// Effective page count; 0 with no document open
    #[must_use]
    pub fn page_count(&self) -> usize {
        self.model.page_count()
    }

    /// Page count behind `handle`, failing for a closed or replaced handle
    pub fn page_count_for(&self, handle: &DocumentHandle) -> Result<usize, ViewerError> {
        self.model.page_count_for(handle)
    }

    pub fn page_size(&self, index: usize) -> Result<PageGeometry, ViewerError> {
        self.model.page_size(index)
    }

    /// Return page `index`, rendering it on this thread on a miss.
    ///
    /// The scheduler is told about the move first so the next pages render
    /// in the background while this one is produced.
    pub fn request_page(&mut self, index: usize) -> Result<Arc<RenderedBitmap>, ViewerError> {
        let (document, page) = self.model.locate(index)?;

        let direction = match self.last_request {
            Some(last) if index > last => Direction::Forward,
            Some(last) if index < last => Direction::Backward,
            _ => self.direction,
        };
        self.direction = direction;
        self.last_request = Some(index);
        self.model.set_current_page(index);

        // Anchor eviction here so pages queued below are measured from this one
        let key = CacheKey::new(document, page);
        self.cache.mark_requested(key);

        let layout = self.model.layout();
        if let Some(scheduler) = self.scheduler.as_mut() {
            scheduler.on_navigate(index, direction, layout);
        }

        let miss = !self.cache.contains_ready(&key);
        if miss {
            debug!("Page {index} (backend {page}) not cached, rendering in foreground");
            self.observer.busy(true);
        }

        let model = &self.model;
        let scale = self.config.render_scale;
        let watch = Stopwatch::start(self.timing.as_ref(), format!("page {index}"));
        let outcome = self.cache.fetch_or_render(key, || model.render(page, scale));
        watch.stop();

        if miss {
            self.observer.busy(false);
        }

        match outcome {
            Ok(image) => {
                self.observer.page_ready(index, &image);
                Ok(image)
            }
            Err(err) => {
                warn!("Page {index} failed to render: {err}");
                self.observer.page_failed(index, &err);
                Err(err.into())
            }
        }
    }

    /// Move one page in reading order, staying put at either end
    pub fn advance(&mut self, step: Step) -> Result<Arc<RenderedBitmap>, ViewerError> {
        let current = self.model.current_page();
        let target = match step {
            Step::Next => (current + 1).min(self.page_count().saturating_sub(1)),
            Step::Previous => current.saturating_sub(1),
        };
        if self.last_request.is_some() && target == current {
            // At an end: keep the lookahead pointing the way the user tried to go
            self.direction = match step {
                Step::Next => Direction::Forward,
                Step::Previous => Direction::Backward,
            };
        }
        self.request_page(target)
    }

    /// Turn towards a screen side, mapped through the reading direction
    pub fn turn(&mut self, side: Side) -> Result<Arc<RenderedBitmap>, ViewerError> {
        self.advance(side.step(self.model.parameters().reading_direction))
    }

    /// Non-blocking cache status of effective page `index`
    #[must_use]
    pub fn page_status(&self, index: usize) -> PageStatus {
        let Ok((document, page)) = self.model.locate(index) else {
            return PageStatus::Absent;
        };
        match self.cache.get(&CacheKey::new(document, page)) {
            None => PageStatus::Absent,
            Some(CacheEntry::Pending) => PageStatus::Pending,
            Some(CacheEntry::Ready(_)) => PageStatus::Ready,
            Some(CacheEntry::Failed(_)) => PageStatus::Failed,
        }
    }

    /// Prefetch state of effective page `index`
    #[must_use]
    pub fn prefetch_state(&self, index: usize) -> PrefetchState {
        match (self.model.locate(index), &self.scheduler) {
            (Ok((_, page)), Some(scheduler)) => scheduler.status(page),
            _ => PrefetchState::Idle,
        }
    }

    /// Last requested effective page
    #[must_use]
    pub fn current_page(&self) -> usize {
        self.model.current_page()
    }

    #[must_use]
    pub fn parameters(&self) -> DisplayParameters {
        self.model.parameters()
    }

    pub fn set_display_parameters(&mut self, params: DisplayParameters) {
        self.apply(Command::SetParameters(params));
    }

    pub fn set_cover_offset(&mut self, cover_offset: bool) {
        self.apply(Command::SetCoverOffset(cover_offset));
    }

    pub fn toggle_cover_offset(&mut self) {
        self.apply(Command::ToggleCoverOffset);
    }

    pub fn set_reading_direction(&mut self, direction: ReadingDirection) {
        self.apply(Command::SetReadingDirection(direction));
    }

    pub fn toggle_reading_direction(&mut self) {
        self.apply(Command::ToggleReadingDirection);
    }

    pub fn set_aspect_ratio(&mut self, aspect: f32) {
        self.apply(Command::SetAspectRatio(aspect));
    }

    fn apply(&mut self, cmd: Command) {
        let effects = self.model.apply(cmd);
        if effects.is_empty() {
            return;
        }
        if effects.contains(&Effect::GeometryChanged) && self.last_request.is_some() {
            // Effective indices shifted; direction inference restarts here
            self.last_request = Some(self.model.current_page());
        }
        self.observer.layout_changed();
    }

    /// The shared page cache
    #[must_use]
    pub fn cache(&self) -> &Arc<PageCache> {
        &self.cache
    }
}

impl Drop for Viewer {
    fn drop(&mut self) {
        self.stop_prefetch();
    }
}
