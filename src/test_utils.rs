//! In-memory backend for tests: controllable page sizes, render latency
//! and failures, with a log of every render the backend performed.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crate::pdf::{
    Backend, OpenError, PageGeometry, PageSource, RenderError, RenderedBitmap, scale_to_millionths,
};

/// Contents of one synthetic document
#[derive(Clone, Debug)]
pub struct SyntheticDocument {
    pub pages: Vec<PageGeometry>,
    pub failing_pages: HashSet<usize>,
    pub render_delay: Duration,
}

impl SyntheticDocument {
    /// `count` pages of the same size
    pub fn uniform(count: usize, width: f32, height: f32) -> Self {
        Self::with_sizes(vec![PageGeometry::new(width, height); count])
    }

    pub fn with_sizes(pages: Vec<PageGeometry>) -> Self {
        Self {
            pages,
            failing_pages: HashSet::new(),
            render_delay: Duration::ZERO,
        }
    }

    /// Make rendering of `page` fail
    pub fn failing(mut self, page: usize) -> Self {
        self.failing_pages.insert(page);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.render_delay = delay;
        self
    }
}

/// Record of the work a [`SyntheticBackend`] did
#[derive(Default)]
pub struct RenderLog {
    renders: Mutex<Vec<(PathBuf, usize)>>,
    active: Mutex<HashMap<(PathBuf, usize), usize>>,
    overlaps: AtomicUsize,
}

impl RenderLog {
    /// Total renders started
    pub fn render_count(&self) -> usize {
        self.renders.lock().unwrap().len()
    }

    /// Renders started for backend page `page` of any document
    pub fn renders_of(&self, page: usize) -> usize {
        self.renders
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, p)| *p == page)
            .count()
    }

    /// Times a render started while another render of the same page of the
    /// same file was still running
    pub fn overlaps(&self) -> usize {
        self.overlaps.load(Ordering::SeqCst)
    }

    fn enter(&self, path: &Path, page: usize) {
        self.renders.lock().unwrap().push((path.to_path_buf(), page));
        let mut active = self.active.lock().unwrap();
        let count = active.entry((path.to_path_buf(), page)).or_insert(0);
        *count += 1;
        if *count > 1 {
            self.overlaps.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn exit(&self, path: &Path, page: usize) {
        let mut active = self.active.lock().unwrap();
        if let Some(count) = active.get_mut(&(path.to_path_buf(), page)) {
            *count = count.saturating_sub(1);
        }
    }
}

/// Backend serving documents registered by path
#[derive(Clone, Default)]
pub struct SyntheticBackend {
    documents: Arc<Mutex<HashMap<PathBuf, SyntheticDocument>>>,
    log: Arc<RenderLog>,
}

impl SyntheticBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(self, path: impl Into<PathBuf>, document: SyntheticDocument) -> Self {
        self.add_document(path, document);
        self
    }

    /// Register or replace the document served at `path`
    pub fn add_document(&self, path: impl Into<PathBuf>, document: SyntheticDocument) {
        self.documents.lock().unwrap().insert(path.into(), document);
    }

    pub fn log(&self) -> Arc<RenderLog> {
        Arc::clone(&self.log)
    }
}

impl Backend for SyntheticBackend {
    fn name(&self) -> &'static str {
        "synthetic"
    }

    fn open(&self, path: &Path) -> Result<Box<dyn PageSource>, OpenError> {
        let document = self
            .documents
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| OpenError::NotFound(path.to_path_buf()))?;
        if document.pages.is_empty() {
            return Err(OpenError::Corrupt {
                path: path.to_path_buf(),
                detail: "document has no pages".to_string(),
            });
        }

        Ok(Box::new(SyntheticSource {
            path: path.to_path_buf(),
            document,
            log: Arc::clone(&self.log),
        }))
    }
}

struct SyntheticSource {
    path: PathBuf,
    document: SyntheticDocument,
    log: Arc<RenderLog>,
}

impl PageSource for SyntheticSource {
    fn page_count(&self) -> usize {
        self.document.pages.len()
    }

    fn page_size(&self, index: usize) -> Result<PageGeometry, RenderError> {
        self.check_index(index)?;
        Ok(self.document.pages[index])
    }

    fn render_page(&self, index: usize, scale: f32) -> Result<RenderedBitmap, RenderError> {
        let size = self.page_size(index)?;

        self.log.enter(&self.path, index);
        if !self.document.render_delay.is_zero() {
            thread::sleep(self.document.render_delay);
        }
        self.log.exit(&self.path, index);

        if self.document.failing_pages.contains(&index) {
            return Err(RenderError::backend(index, "synthetic decode failure"));
        }

        let width_px = (size.width * scale).ceil().max(1.0) as u32;
        let height_px = (size.height * scale).ceil().max(1.0) as u32;
        let len = width_px as usize * height_px as usize * 3;
        let pixels = (0..len).map(|i| ((index * 31 + i) % 251) as u8).collect();

        Ok(RenderedBitmap {
            page: index,
            width_px,
            height_px,
            scale_millionths: scale_to_millionths(scale),
            pixels,
        })
    }
}
