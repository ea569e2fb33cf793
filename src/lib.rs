// bandview: generic multi-band strided image buffers
//
// `Image<T>` stores interleaved bands row by row with an arbitrary stride,
// so sub-image views alias their parent with no copy. Derivative filters,
// corner-intensity detectors and pyramid renderers are built on top of it
// through the raw strided layout and the bounds-checked accessors.

pub mod error;
pub mod image;
pub mod interpolate;
pub mod convert;
pub mod derivative;
pub mod intensity;
pub mod pyramid;
pub mod render;

pub use crate::error::{ImageError, Result};
pub use crate::image::{
    Image, ImageF32, ImageS16, ImageS8, ImageU8, Pixel, PixelKind, RawLayout, RawRead,
};
