//! Core types for the page cache

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Identity of one open document session.
///
/// Reopening the same file yields a new identity, so every cached page of
/// the previous session becomes unreachable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentId(pub u64);

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "doc#{}", self.0)
    }
}

/// Handle to the currently open document
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DocumentHandle {
    pub id: DocumentId,
    pub path: PathBuf,
    /// Backend page count, fixed for the lifetime of the handle
    pub page_count: usize,
}

/// Order in which pages follow each other on screen
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadingDirection {
    #[default]
    LeftToRight,
    RightToLeft,
}

impl ReadingDirection {
    #[must_use]
    pub fn flipped(self) -> Self {
        match self {
            Self::LeftToRight => Self::RightToLeft,
            Self::RightToLeft => Self::LeftToRight,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LeftToRight => "ltr",
            Self::RightToLeft => "rtl",
        }
    }
}

/// Navigation direction in reading order
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    Forward,
    Backward,
}

/// Display parameters that affect geometry and navigation order
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DisplayParameters {
    /// Horizontal display-aspect correction applied to page widths
    pub aspect_ratio: f32,
    /// Present backend page 0 as a detached cover
    pub cover_offset: bool,
    pub reading_direction: ReadingDirection,
}

impl DisplayParameters {
    /// Replace a non-finite or non-positive aspect ratio with 1.0
    pub fn sanitized_aspect(aspect: f32) -> f32 {
        if aspect.is_finite() && aspect > 0.0 {
            aspect
        } else {
            1.0
        }
    }
}

impl Default for DisplayParameters {
    fn default() -> Self {
        Self {
            aspect_ratio: 1.0,
            cover_offset: false,
            reading_direction: ReadingDirection::LeftToRight,
        }
    }
}

/// Page size in PDF points
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PageGeometry {
    pub width: f32,
    pub height: f32,
}

impl PageGeometry {
    #[must_use]
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

/// Mapping between the effective (display) index space and backend pages
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageLayout {
    /// Backend page count
    pub backend_count: usize,
    pub cover_offset: bool,
}

impl PageLayout {
    /// Number of pages in the effective index space
    #[must_use]
    pub fn page_count(&self) -> usize {
        if self.cover_offset {
            self.backend_count.saturating_sub(1)
        } else {
            self.backend_count
        }
    }

    /// Backend page shown at effective `index`, if in range
    #[must_use]
    pub fn to_backend(&self, index: usize) -> Option<usize> {
        if index >= self.page_count() {
            return None;
        }
        Some(if self.cover_offset { index + 1 } else { index })
    }
}

/// Raw rendered page image.
///
/// RGB pixel data, 3 bytes per pixel, rows packed without padding.
#[derive(Clone, PartialEq, Eq)]
pub struct RenderedBitmap {
    /// Backend page number (0-indexed)
    pub page: usize,
    pub width_px: u32,
    pub height_px: u32,
    /// Scale stored as millionths so the bitmap stays `Eq`
    pub scale_millionths: u32,
    pub pixels: Vec<u8>,
}

impl RenderedBitmap {
    #[must_use]
    pub fn scale(&self) -> f32 {
        self.scale_millionths as f32 / 1_000_000.0
    }
}

impl std::fmt::Debug for RenderedBitmap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderedBitmap")
            .field("page", &self.page)
            .field("width_px", &self.width_px)
            .field("height_px", &self.height_px)
            .field("scale", &self.scale())
            .field("bytes", &self.pixels.len())
            .finish_non_exhaustive()
    }
}

/// Convert a scale factor to millionths for stable hashing and equality
#[must_use]
pub fn scale_to_millionths(scale: f32) -> u32 {
    (scale * 1_000_000.0) as u32
}
