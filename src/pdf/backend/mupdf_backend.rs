//! MuPDF backend

use std::path::Path;

use mupdf::{Colorspace, Document, Matrix, Pixmap};

use super::{Backend, BackendKind, PageSource, probe_file};
use crate::pdf::error::{OpenError, RenderError};
use crate::pdf::types::{PageGeometry, RenderedBitmap, scale_to_millionths};

/// Renders through MuPDF. Documents are opened per thread.
#[derive(Clone, Copy, Debug, Default)]
pub struct MupdfBackend;

impl Backend for MupdfBackend {
    fn name(&self) -> &'static str {
        BackendKind::Mupdf.as_str()
    }

    fn open(&self, path: &Path) -> Result<Box<dyn PageSource>, OpenError> {
        probe_file(path)?;

        let doc = Document::open(path.to_string_lossy().as_ref()).map_err(|e| {
            OpenError::Unsupported {
                path: path.to_path_buf(),
                detail: e.to_string(),
            }
        })?;

        let page_count = doc.page_count().map_err(|e| OpenError::Corrupt {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
        if page_count <= 0 {
            return Err(OpenError::Corrupt {
                path: path.to_path_buf(),
                detail: "document has no pages".to_string(),
            });
        }

        Ok(Box::new(MupdfSource {
            doc,
            page_count: page_count as usize,
        }))
    }
}

struct MupdfSource {
    doc: Document,
    page_count: usize,
}

impl MupdfSource {
    fn load(&self, index: usize) -> Result<mupdf::Page, RenderError> {
        self.check_index(index)?;
        self.doc
            .load_page(index as i32)
            .map_err(|e| RenderError::backend(index, e.to_string()))
    }
}

impl PageSource for MupdfSource {
    fn page_count(&self) -> usize {
        self.page_count
    }

    fn page_size(&self, index: usize) -> Result<PageGeometry, RenderError> {
        let page = self.load(index)?;
        let bounds = page
            .bounds()
            .map_err(|e| RenderError::backend(index, e.to_string()))?;
        Ok(PageGeometry::new(bounds.x1 - bounds.x0, bounds.y1 - bounds.y0))
    }

    fn render_page(&self, index: usize, scale: f32) -> Result<RenderedBitmap, RenderError> {
        let page = self.load(index)?;
        let rgb = Colorspace::device_rgb();
        let pixmap = page
            .to_pixmap(&Matrix::new_scale(scale, scale), &rgb, false, false)
            .map_err(|e| RenderError::backend(index, e.to_string()))?;

        let pixels = pixmap_to_rgb(&pixmap).map_err(|detail| RenderError::backend(index, detail))?;

        Ok(RenderedBitmap {
            page: index,
            width_px: pixmap.width(),
            height_px: pixmap.height(),
            scale_millionths: scale_to_millionths(scale),
            pixels,
        })
    }
}

fn pixmap_to_rgb(pixmap: &Pixmap) -> Result<Vec<u8>, String> {
    let n = pixmap.n() as usize;
    if n < 3 {
        return Err(format!("unsupported pixmap format: {n} channels"));
    }

    let width = pixmap.width() as usize;
    let height = pixmap.height() as usize;
    let stride = pixmap.stride() as usize;
    let samples = pixmap.samples();
    let row_bytes = width * n;
    if samples.len() < stride.saturating_mul(height) || row_bytes > stride {
        return Err("pixmap buffer size mismatch".to_string());
    }

    let mut out = Vec::with_capacity(width * height * 3);
    for row in samples.chunks(stride).take(height) {
        let row = &row[..row_bytes];
        if n == 3 {
            out.extend_from_slice(row);
        } else {
            for px in row.chunks_exact(n) {
                out.extend_from_slice(&px[..3]);
            }
        }
    }

    Ok(out)
}
