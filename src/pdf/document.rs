//! Document model: the open document, its display parameters and the
//! geometry derived from them

use std::path::Path;
use std::sync::Arc;

use log::info;

use super::backend::{Backend, PageSource};
use super::error::{OpenError, RenderError, ViewerError};
use super::state::{Command, DisplayState, Effect};
use super::types::{
    DisplayParameters, DocumentHandle, DocumentId, PageGeometry, PageLayout, RenderedBitmap,
};

struct OpenDocument {
    handle: DocumentHandle,
    source: Box<dyn PageSource>,
}

/// Result of a successful open
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Opened {
    pub handle: DocumentHandle,
    /// Identity that was replaced, whose pages must be invalidated
    pub previous: Option<DocumentId>,
}

/// Holds the one open document and answers geometry queries.
///
/// The page source lives on the thread that owns the model; background
/// renderers open their own.
pub struct DocumentModel {
    backend: Arc<dyn Backend>,
    current: Option<OpenDocument>,
    display: DisplayState,
    current_page: usize,
    next_id: u64,
}

impl DocumentModel {
    #[must_use]
    pub fn new(backend: Arc<dyn Backend>, params: DisplayParameters) -> Self {
        Self {
            backend,
            current: None,
            display: DisplayState::new(params),
            current_page: 0,
            next_id: 1,
        }
    }

    #[must_use]
    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    /// Open `path`, replacing the current document only on success
    pub fn open_document(&mut self, path: &Path) -> Result<Opened, OpenError> {
        let source = self.backend.open(path)?;

        let id = DocumentId(self.next_id);
        self.next_id += 1;

        let handle = DocumentHandle {
            id,
            path: path.to_path_buf(),
            page_count: source.page_count(),
        };
        info!(
            "Opened {} as {id} ({} pages, {} backend)",
            path.display(),
            handle.page_count,
            self.backend.name()
        );

        let previous = self
            .current
            .replace(OpenDocument {
                handle: handle.clone(),
                source,
            })
            .map(|doc| doc.handle.id);
        self.current_page = 0;

        Ok(Opened { handle, previous })
    }

    /// Reopen the current file as a new identity, keeping the current page
    pub fn reload(&mut self) -> Result<Option<Opened>, OpenError> {
        let Some(path) = self.current.as_ref().map(|doc| doc.handle.path.clone()) else {
            return Ok(None);
        };
        let page = self.current_page;

        let opened = self.open_document(&path)?;
        self.current_page = page.min(self.page_count().saturating_sub(1));
        Ok(Some(opened))
    }

    /// Release the document and return its handle
    pub fn close(&mut self) -> Option<DocumentHandle> {
        let closed = self.current.take().map(|doc| doc.handle);
        if let Some(handle) = &closed {
            info!("Closed {} ({})", handle.path.display(), handle.id);
        }
        self.current_page = 0;
        closed
    }

    #[must_use]
    pub fn handle(&self) -> Option<&DocumentHandle> {
        self.current.as_ref().map(|doc| &doc.handle)
    }

    /// Fail with `InvalidHandle` unless `handle` is the open document
    pub fn require(&self, handle: &DocumentHandle) -> Result<&DocumentHandle, ViewerError> {
        match self.handle() {
            Some(current) if current.id == handle.id => Ok(current),
            _ => Err(ViewerError::InvalidHandle(handle.id)),
        }
    }

    /// Effective page count behind a specific handle
    pub fn page_count_for(&self, handle: &DocumentHandle) -> Result<usize, ViewerError> {
        self.require(handle)?;
        Ok(self.layout().page_count())
    }

    #[must_use]
    pub fn layout(&self) -> PageLayout {
        PageLayout {
            backend_count: self.handle().map_or(0, |h| h.page_count),
            cover_offset: self.display.params.cover_offset,
        }
    }

    /// Effective page count; 0 with no document open
    #[must_use]
    pub fn page_count(&self) -> usize {
        self.layout().page_count()
    }

    /// Backend page and identity for effective `index`
    pub fn locate(&self, index: usize) -> Result<(DocumentId, usize), ViewerError> {
        let layout = self.layout();
        let out_of_range = ViewerError::IndexOutOfRange {
            index,
            page_count: layout.page_count(),
        };
        let (Some(handle), Some(page)) = (self.handle(), layout.to_backend(index)) else {
            return Err(out_of_range);
        };
        Ok((handle.id, page))
    }

    /// Size of effective page `index`, aspect corrected
    pub fn page_size(&self, index: usize) -> Result<PageGeometry, ViewerError> {
        let (_, page) = self.locate(index)?;
        let source = self.source()?;
        let raw = source.page_size(page)?;
        Ok(PageGeometry::new(
            raw.width * self.display.params.aspect_ratio,
            raw.height,
        ))
    }

    /// Render backend `page` on the calling thread
    pub fn render(&self, page: usize, scale: f32) -> Result<RenderedBitmap, RenderError> {
        match &self.current {
            Some(doc) => doc.source.render_page(page, scale),
            None => Err(RenderError::DocumentClosed { page }),
        }
    }

    fn source(&self) -> Result<&dyn PageSource, ViewerError> {
        match &self.current {
            Some(doc) => Ok(doc.source.as_ref()),
            None => Err(ViewerError::IndexOutOfRange {
                index: 0,
                page_count: 0,
            }),
        }
    }

    #[must_use]
    pub fn parameters(&self) -> DisplayParameters {
        self.display.params
    }

    /// Update display parameters. Never re-renders.
    pub fn apply(&mut self, cmd: Command) -> Vec<Effect> {
        let effects = self.display.apply(cmd);
        if effects.contains(&Effect::GeometryChanged) {
            self.current_page = self.current_page.min(self.page_count().saturating_sub(1));
        }
        effects
    }

    /// Last requested effective page
    #[must_use]
    pub fn current_page(&self) -> usize {
        self.current_page
    }

    pub fn set_current_page(&mut self, page: usize) {
        self.current_page = page.min(self.page_count().saturating_sub(1));
    }
}
