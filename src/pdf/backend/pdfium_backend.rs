//! PDFium backend
//!
//! The PDFium bindings are loaded once per process; documents borrow them
//! for `'static` and, like MuPDF documents, stay on the thread that opened
//! them.

use std::path::Path;
use std::sync::OnceLock;

use pdfium_render::prelude::{PdfBitmapFormat, PdfDocument, PdfRenderConfig, Pdfium};

use super::{Backend, BackendKind, PageSource, probe_file};
use crate::pdf::error::{OpenError, RenderError};
use crate::pdf::types::{PageGeometry, RenderedBitmap, scale_to_millionths};

static PDFIUM: OnceLock<Result<Pdfium, String>> = OnceLock::new();

fn bind_pdfium() -> Result<&'static Pdfium, OpenError> {
    let bound = PDFIUM.get_or_init(|| {
        Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library())
            .map(Pdfium::new)
            .map_err(|e| e.to_string())
    });

    bound.as_ref().map_err(|detail| OpenError::BackendUnavailable {
        backend: BackendKind::Pdfium.as_str(),
        detail: detail.clone(),
    })
}

/// Renders through PDFium
#[derive(Clone, Copy)]
pub struct PdfiumBackend {
    pdfium: &'static Pdfium,
}

impl PdfiumBackend {
    /// Bind the PDFium shared library, from the working directory first and
    /// then from the system library path
    pub fn bind() -> Result<Self, OpenError> {
        Ok(Self {
            pdfium: bind_pdfium()?,
        })
    }
}

impl std::fmt::Debug for PdfiumBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PdfiumBackend").finish_non_exhaustive()
    }
}

impl Backend for PdfiumBackend {
    fn name(&self) -> &'static str {
        BackendKind::Pdfium.as_str()
    }

    fn open(&self, path: &Path) -> Result<Box<dyn PageSource>, OpenError> {
        probe_file(path)?;

        let doc = self
            .pdfium
            .load_pdf_from_file(path, None)
            .map_err(|e| OpenError::Unsupported {
                path: path.to_path_buf(),
                detail: e.to_string(),
            })?;

        let page_count = usize::from(doc.pages().len());
        if page_count == 0 {
            return Err(OpenError::Corrupt {
                path: path.to_path_buf(),
                detail: "document has no pages".to_string(),
            });
        }

        Ok(Box::new(PdfiumSource { doc, page_count }))
    }
}

struct PdfiumSource {
    doc: PdfDocument<'static>,
    page_count: usize,
}

impl PdfiumSource {
    fn page(&self, index: usize) -> Result<pdfium_render::prelude::PdfPage<'_>, RenderError> {
        self.check_index(index)?;
        let page_index = u16::try_from(index)
            .map_err(|_| RenderError::backend(index, "page index exceeds PDFium range"))?;
        self.doc
            .pages()
            .get(page_index.into())
            .map_err(|e| RenderError::backend(index, e.to_string()))
    }
}

impl PageSource for PdfiumSource {
    fn page_count(&self) -> usize {
        self.page_count
    }

    fn page_size(&self, index: usize) -> Result<PageGeometry, RenderError> {
        let page = self.page(index)?;
        Ok(PageGeometry::new(page.width().value, page.height().value))
    }

    fn render_page(&self, index: usize, scale: f32) -> Result<RenderedBitmap, RenderError> {
        let page = self.page(index)?;
        let target_width = (page.width().value * scale).round().max(1.0) as i32;
        let target_height = (page.height().value * scale).round().max(1.0) as i32;

        let config = PdfRenderConfig::new()
            .set_target_width(target_width)
            .set_maximum_height(target_height)
            .render_form_data(false)
            .set_reverse_byte_order(false)
            .set_format(PdfBitmapFormat::BGRA);

        let bitmap = page
            .render_with_config(&config)
            .map_err(|e| RenderError::backend(index, e.to_string()))?;

        let width = bitmap.width().max(0) as usize;
        let height = bitmap.height().max(0) as usize;
        let raw = bitmap.as_raw_bytes();
        let stride = if height == 0 { 0 } else { raw.len() / height };

        let mut pixels = Vec::with_capacity(width * height * 3);
        for y in 0..height {
            let base = y * stride;
            for x in 0..width {
                let idx = base + x * 4;
                let b = raw.get(idx).copied().unwrap_or(255);
                let g = raw.get(idx + 1).copied().unwrap_or(255);
                let r = raw.get(idx + 2).copied().unwrap_or(255);
                pixels.extend_from_slice(&[r, g, b]);
            }
        }

        Ok(RenderedBitmap {
            page: index,
            width_px: width as u32,
            height_px: height as u32,
            scale_millionths: scale_to_millionths(scale),
            pixels,
        })
    }
}
