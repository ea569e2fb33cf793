// error.rs -- Error taxonomy for image access, views and the algorithm seams.
//
// Every failure here is a caller contract violation. Nothing is retried and
// nothing is clamped: the error is handed straight back with `?`.

use thiserror::Error;

/// Errors produced by image buffers and the algorithms built on them.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ImageError {
    #[error("pixel ({x},{y}) out of bounds for image {width}x{height}")]
    OutOfBounds {
        x: isize,
        y: isize,
        width: usize,
        height: usize,
    },
    #[error("band {band} is invalid for an image with {num_bands} band(s)")]
    InvalidBand { band: isize, num_bands: usize },
    #[error("expected {expected} value(s), got {found}")]
    ShapeMismatch { expected: usize, found: usize },
    #[error("storage holds {capacity} element(s) but {required} are required")]
    Capacity { required: usize, capacity: usize },
    #[error("invalid image shape {width}x{height}x{num_bands}")]
    InvalidShape {
        width: usize,
        height: usize,
        num_bands: usize,
    },
    #[error("image size {found:?} does not match expected {expected:?}")]
    SizeMismatch {
        expected: (usize, usize),
        found: (usize, usize),
    },
    #[error("view refers to storage released by a reshape")]
    StaleView,
    #[error("storage is already borrowed through an aliasing view")]
    AliasConflict,
    #[error("missing required input: {0}")]
    MissingInput(&'static str),
    #[error("{0} band(s) cannot be represented as a raster")]
    UnsupportedBands(usize),
    #[error("layer {layer} has scale {scale}, which must be positive and larger than the previous layer's")]
    InvalidScale { layer: usize, scale: f64 },
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, ImageError>;
