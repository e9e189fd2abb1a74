//! Backend adapter: one contract over the document engines
//!
//! A [`Backend`] is a shareable factory. Each thread that renders opens its
//! own [`PageSource`] from it, since engines such as MuPDF hand out
//! documents that must stay on the thread that opened them.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::error::{OpenError, RenderError};
use super::types::{PageGeometry, RenderedBitmap};

#[cfg(feature = "mupdf")]
mod mupdf_backend;
#[cfg(feature = "pdfium")]
mod pdfium_backend;

#[cfg(feature = "mupdf")]
pub use self::mupdf_backend::MupdfBackend;
#[cfg(feature = "pdfium")]
pub use self::pdfium_backend::PdfiumBackend;

/// Document engine factory
pub trait Backend: Send + Sync {
    /// Short engine name for logs
    fn name(&self) -> &'static str;

    /// Open `path` for use on the calling thread
    fn open(&self, path: &Path) -> Result<Box<dyn PageSource>, OpenError>;
}

/// An open document as seen by one rendering thread
pub trait PageSource {
    /// Page count, fixed for the lifetime of the source
    fn page_count(&self) -> usize;

    /// Raw page size in PDF points
    fn page_size(&self, index: usize) -> Result<PageGeometry, RenderError>;

    /// Rasterize a page at `scale` pixels per point
    fn render_page(&self, index: usize, scale: f32) -> Result<RenderedBitmap, RenderError>;

    fn check_index(&self, index: usize) -> Result<(), RenderError> {
        let page_count = self.page_count();
        if index < page_count {
            Ok(())
        } else {
            Err(RenderError::IndexOutOfRange { index, page_count })
        }
    }
}

/// Which engine renders pages. Chosen once at startup.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    #[default]
    Mupdf,
    Pdfium,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Mupdf => "mupdf",
            BackendKind::Pdfium => "pdfium",
        }
    }

    /// Instantiate the backend, failing if it was not compiled in
    pub fn create(self) -> Result<Arc<dyn Backend>, OpenError> {
        match self {
            #[cfg(feature = "mupdf")]
            BackendKind::Mupdf => Ok(Arc::new(MupdfBackend)),
            #[cfg(feature = "pdfium")]
            BackendKind::Pdfium => Ok(Arc::new(PdfiumBackend::bind()?)),
            #[allow(unreachable_patterns)]
            other => Err(OpenError::BackendUnavailable {
                backend: other.as_str(),
                detail: format!("built without the `{}` feature", other.as_str()),
            }),
        }
    }
}

impl std::str::FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mupdf" => Ok(BackendKind::Mupdf),
            "pdfium" => Ok(BackendKind::Pdfium),
            other => Err(format!("unknown backend '{other}' (expected mupdf or pdfium)")),
        }
    }
}

/// Map the I/O failures every engine reports poorly before handing the
/// path to the engine itself.
pub(crate) fn probe_file(path: &Path) -> Result<(), OpenError> {
    std::fs::File::open(path)
        .map(|_| ())
        .map_err(|e| OpenError::from_io(path, &e))
}
