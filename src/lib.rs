//! Page cache and prefetch engine for a fixed-layout document viewer.
//!
//! The [`pdf::Viewer`] facade opens a document through a pluggable
//! [`pdf::Backend`], serves rendered pages from a shared [`pdf::PageCache`]
//! and keeps a small pool of threads rendering the pages the reader is
//! heading towards.

pub mod panic_handler;
pub mod pdf;
pub mod settings;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use pdf::{Viewer, ViewerConfig, ViewerError, ViewerObserver};
