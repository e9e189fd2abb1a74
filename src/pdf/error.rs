//! Error taxonomy shared by the backends, the cache and the viewer

use std::path::PathBuf;

use super::types::DocumentId;

/// Failure to open a document. The previously open document stays current.
#[derive(Debug, Clone, thiserror::Error)]
pub enum OpenError {
    #[error("file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("permission denied: {}", .0.display())]
    PermissionDenied(PathBuf),

    #[error("unsupported document {}: {detail}", path.display())]
    Unsupported { path: PathBuf, detail: String },

    #[error("corrupt document {}: {detail}", path.display())]
    Corrupt { path: PathBuf, detail: String },

    #[error("{backend} backend unavailable: {detail}")]
    BackendUnavailable {
        backend: &'static str,
        detail: String,
    },
}

impl OpenError {
    /// Classify an I/O error raised while probing `path`
    pub fn from_io(path: &std::path::Path, err: &std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(path.to_path_buf()),
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_path_buf()),
            _ => Self::Unsupported {
                path: path.to_path_buf(),
                detail: err.to_string(),
            },
        }
    }
}

/// Failure to produce a page. `Clone` so every waiter on a page observes
/// the same outcome.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RenderError {
    #[error("page {page}: {detail}")]
    Backend { page: usize, detail: String },

    #[error("page {index} out of range (page count {page_count})")]
    IndexOutOfRange { index: usize, page_count: usize },

    #[error("page {page}: document was closed")]
    DocumentClosed { page: usize },

    #[error("page {page}: render abandoned")]
    Abandoned { page: usize },
}

impl RenderError {
    pub fn backend(page: usize, detail: impl Into<String>) -> Self {
        Self::Backend {
            page,
            detail: detail.into(),
        }
    }
}

/// Errors surfaced to the view
#[derive(Debug, Clone, thiserror::Error)]
pub enum ViewerError {
    #[error(transparent)]
    Open(#[from] OpenError),

    #[error("page {index} out of range (page count {page_count})")]
    IndexOutOfRange { index: usize, page_count: usize },

    #[error(transparent)]
    Render(RenderError),

    #[error("stale document handle {0}")]
    InvalidHandle(DocumentId),
}

impl From<RenderError> for ViewerError {
    fn from(err: RenderError) -> Self {
        match err {
            RenderError::IndexOutOfRange { index, page_count } => {
                Self::IndexOutOfRange { index, page_count }
            }
            other => Self::Render(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_are_classified() {
        let path = std::path::Path::new("missing.pdf");
        let err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert!(matches!(OpenError::from_io(path, &err), OpenError::NotFound(_)));

        let err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope");
        assert!(matches!(
            OpenError::from_io(path, &err),
            OpenError::PermissionDenied(_)
        ));
    }

    #[test]
    fn out_of_range_render_error_maps_to_viewer_index_error() {
        let err: ViewerError = RenderError::IndexOutOfRange {
            index: 10,
            page_count: 10,
        }
        .into();
        assert!(matches!(
            err,
            ViewerError::IndexOutOfRange {
                index: 10,
                page_count: 10
            }
        ));
    }
}
