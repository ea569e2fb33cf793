// image.rs -- Strided, multi-band image buffer with aliasing sub-image views.
//
// Pixels are interleaved: all bands of one pixel sit next to each other, and
// rows are `stride` elements apart. A view never owns pixels; it is a window
// `{storage, start_index, stride, width, height, num_bands}` onto a buffer
// that other images may also reference.
//
// Memory layout of a 2×2 view at (1, 1) inside a 4×3 parent, 2 bands:
//
//   parent stride = 4 * 2 = 8
//
//   data index:  0  1  2  3  4  5  6  7 | 8  9 10 11 12 13 14 15 | 16 ...
//   pixel:       (0,0) (1,0) (2,0) (3,0)| (0,1) (1,1) (2,1) (3,1) | (0,2) ...
//   view:                               |       [v(0,0)][v(1,0)]  |  ...
//
//   view.start_index = 8 + 1 * 2 = 10, view.stride = 8
//
// Ownership: storage is `Rc<Storage<T>>`. Every view holds a strong count,
// so the buffer lives until the last view referencing it is dropped. Writes
// go through a `RefCell`, which means two aliases may both mutate the same
// buffer in sequence, and a conflicting overlapping borrow is reported as
// `ImageError::AliasConflict` instead of a panic.
//
// Reshape always reallocates. The image that allocated a buffer retires it
// on reshape, and any view still pointing at it fails with `StaleView`.

use std::cell::{Cell, Ref, RefCell, RefMut};
use std::fmt;
use std::mem::size_of;
use std::ops::Range;
use std::rc::Rc;

use log::{debug, trace};

use crate::error::{ImageError, Result};

// ---------------------------------------------------------------------------
// Pixel element family
// ---------------------------------------------------------------------------

/// Tag naming the concrete element type stored in each band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelKind {
    U8,
    S8,
    U16,
    S16,
    S32,
    F32,
    F64,
}

impl PixelKind {
    /// Short lowercase name, e.g. `"u8"` or `"f32"`.
    pub fn name(self) -> &'static str {
        match self {
            PixelKind::U8 => "u8",
            PixelKind::S8 => "i8",
            PixelKind::U16 => "u16",
            PixelKind::S16 => "i16",
            PixelKind::S32 => "i32",
            PixelKind::F32 => "f32",
            PixelKind::F64 => "f64",
        }
    }

    pub fn is_float(self) -> bool {
        matches!(self, PixelKind::F32 | PixelKind::F64)
    }
}

impl fmt::Display for PixelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Element types that can fill one band of a pixel.
///
/// The type is picked statically by the generic parameter of [`Image`], so
/// generic algorithms never inspect it at runtime. `Pod` lets any image be
/// exported as raw bytes.
pub trait Pixel: bytemuck::Pod + Default + PartialOrd + Send + Sync + 'static {
    /// Tag for this element type.
    const KIND: PixelKind;

    /// Raw conversion to f32 (42u8 becomes 42.0, not 42/255).
    fn to_f32(self) -> f32;

    /// Raw conversion from f32. Integer kinds round and clamp to their range.
    fn from_f32(v: f32) -> Self;
}

macro_rules! impl_int_pixel {
    ($($t:ty => $kind:ident),* $(,)?) => {
        $(
            impl Pixel for $t {
                const KIND: PixelKind = PixelKind::$kind;

                #[inline]
                fn to_f32(self) -> f32 {
                    self as f32
                }

                #[inline]
                fn from_f32(v: f32) -> Self {
                    // NaN passes through clamp; the `as` cast maps it to 0.
                    v.round().clamp(<$t>::MIN as f32, <$t>::MAX as f32) as $t
                }
            }
        )*
    };
}

impl_int_pixel! {
    u8 => U8,
    i8 => S8,
    u16 => U16,
    i16 => S16,
    i32 => S32,
}

impl Pixel for f32 {
    const KIND: PixelKind = PixelKind::F32;

    #[inline]
    fn to_f32(self) -> f32 {
        self
    }

    #[inline]
    fn from_f32(v: f32) -> Self {
        v
    }
}

impl Pixel for f64 {
    const KIND: PixelKind = PixelKind::F64;

    #[inline]
    fn to_f32(self) -> f32 {
        self as f32
    }

    #[inline]
    fn from_f32(v: f32) -> Self {
        v as f64
    }
}

// ---------------------------------------------------------------------------
// Shared storage
// ---------------------------------------------------------------------------

struct Storage<T> {
    data: RefCell<Vec<T>>,
    /// Set when the owning image reshapes onto a new buffer.
    retired: Cell<bool>,
}

impl<T> Storage<T> {
    fn new(data: Vec<T>) -> Rc<Self> {
        Rc::new(Storage {
            data: RefCell::new(data),
            retired: Cell::new(false),
        })
    }

    fn check_live(&self) -> Result<()> {
        if self.retired.get() {
            Err(ImageError::StaleView)
        } else {
            Ok(())
        }
    }

    fn read(&self) -> Result<Ref<'_, Vec<T>>> {
        self.check_live()?;
        self.data.try_borrow().map_err(|_| ImageError::AliasConflict)
    }

    fn write(&self) -> Result<RefMut<'_, Vec<T>>> {
        self.check_live()?;
        self.data.try_borrow_mut().map_err(|_| ImageError::AliasConflict)
    }
}

/// Row length and total element count for a `width × height × num_bands`
/// buffer, or `InvalidShape` when either cannot be represented.
fn element_count<T>(width: usize, height: usize, num_bands: usize) -> Result<(usize, usize)> {
    let invalid = ImageError::InvalidShape {
        width,
        height,
        num_bands,
    };
    let row_len = width.checked_mul(num_bands).ok_or(invalid.clone())?;
    row_len
        .checked_mul(height)
        .filter(|&n| {
            n.checked_mul(size_of::<T>().max(1))
                .map_or(false, |bytes| bytes <= isize::MAX as usize)
        })
        .map(|len| (row_len, len))
        .ok_or(invalid)
}

#[inline]
fn signed(v: usize) -> isize {
    isize::try_from(v).unwrap_or(isize::MAX)
}

// ---------------------------------------------------------------------------
// RawLayout
// ---------------------------------------------------------------------------

/// Addressing metadata handed to bulk algorithms with the raw backing slice.
///
/// Row `y` of the image occupies `data[row_range(y)]`. Elements between the
/// end of one row and the start of the next belong to padding or to pixels
/// outside a view and must not be touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawLayout {
    pub start_index: usize,
    pub stride: usize,
    /// `width * num_bands`: elements per row that belong to the image.
    pub row_len: usize,
    pub num_bands: usize,
    pub width: usize,
    pub height: usize,
}

impl RawLayout {
    #[inline]
    pub fn index(&self, x: usize, y: usize, band: usize) -> usize {
        self.start_index + y * self.stride + x * self.num_bands + band
    }

    #[inline]
    pub fn row_start(&self, y: usize) -> usize {
        self.start_index + y * self.stride
    }

    #[inline]
    pub fn row_range(&self, y: usize) -> Range<usize> {
        let start = self.row_start(y);
        start..start + self.row_len
    }
}

/// Shared borrow of an image's backing buffer, paired with its layout.
///
/// Several guards over the same or different buffers may be alive at once,
/// which lets kernels with many inputs read them all without nesting
/// closures. Derefs to the whole backing slice.
pub struct RawRead<'a, T> {
    data: Ref<'a, Vec<T>>,
    layout: RawLayout,
}

impl<'a, T: Copy> RawRead<'a, T> {
    #[inline]
    pub fn layout(&self) -> RawLayout {
        self.layout
    }

    /// The `row_len` elements of row `y`.
    #[inline]
    pub fn row(&self, y: usize) -> &[T] {
        &self.data[self.layout.row_range(y)]
    }

    /// Value at `(x, y, band)`. Panics only if the layout is violated.
    #[inline]
    pub fn at(&self, x: usize, y: usize, band: usize) -> T {
        self.data[self.layout.index(x, y, band)]
    }
}

impl<'a, T> std::ops::Deref for RawRead<'a, T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        &self.data
    }
}

// ---------------------------------------------------------------------------
// Image<T>
// ---------------------------------------------------------------------------

/// A 2-D grid of pixels with `num_bands` interleaved values of type `T`.
///
/// Either owns a freshly allocated buffer or is a view aliasing a parent's
/// buffer. See the module comment for the layout.
pub struct Image<T: Pixel> {
    storage: Rc<Storage<T>>,
    width: usize,
    height: usize,
    num_bands: usize,
    /// Elements between the starts of consecutive rows.
    stride: usize,
    /// Offset of pixel (0, 0), band 0 in the backing buffer.
    start_index: usize,
    /// True for the image that allocated `storage` (not for views of it).
    owns_storage: bool,
}

pub type ImageU8 = Image<u8>;
pub type ImageS8 = Image<i8>;
pub type ImageS16 = Image<i16>;
pub type ImageF32 = Image<f32>;

impl<T: Pixel> Image<T> {
    // --- Construction ---

    /// Allocate a zero-initialized image with `stride = width * num_bands`.
    pub fn new(width: usize, height: usize, num_bands: usize) -> Result<Self> {
        let (stride, len) = element_count::<T>(width, height, num_bands)?;
        Ok(Self::owned(vec![T::default(); len], width, height, num_bands, stride))
    }

    /// Wrap packed row-major pixel data (no padding).
    pub fn from_vec(width: usize, height: usize, num_bands: usize, data: Vec<T>) -> Result<Self> {
        let (stride, len) = element_count::<T>(width, height, num_bands)?;
        if data.len() != len {
            return Err(ImageError::ShapeMismatch {
                expected: len,
                found: data.len(),
            });
        }
        Ok(Self::owned(data, width, height, num_bands, stride))
    }

    /// Zero-sized placeholder with no storage and no bands.
    pub fn empty() -> Self {
        Self::empty_with_bands(0)
    }

    /// Zero-sized placeholder that keeps its band count for a later reshape.
    pub fn empty_with_bands(num_bands: usize) -> Self {
        Self::owned(Vec::new(), 0, 0, num_bands, 0)
    }

    fn owned(data: Vec<T>, width: usize, height: usize, num_bands: usize, stride: usize) -> Self {
        Image {
            storage: Storage::new(data),
            width,
            height,
            num_bands,
            stride,
            start_index: 0,
            owns_storage: true,
        }
    }

    // --- Metadata ---

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn num_bands(&self) -> usize {
        self.num_bands
    }

    #[inline]
    pub fn stride(&self) -> usize {
        self.stride
    }

    #[inline]
    pub fn start_index(&self) -> usize {
        self.start_index
    }

    #[inline]
    pub fn kind(&self) -> PixelKind {
        T::KIND
    }

    pub fn layout(&self) -> RawLayout {
        RawLayout {
            start_index: self.start_index,
            stride: self.stride,
            row_len: self.width * self.num_bands,
            num_bands: self.num_bands,
            width: self.width,
            height: self.height,
        }
    }

    /// True unless the image is one contiguous block starting at offset 0
    /// with no row padding.
    pub fn is_subimage(&self) -> bool {
        self.start_index != 0 || self.stride != self.width * self.num_bands
    }

    /// True once the storage this image refers to has been retired by a
    /// reshape of its owner.
    pub fn is_stale(&self) -> bool {
        self.storage.retired.get()
    }

    /// True when both images read and write the same backing buffer.
    pub fn shares_storage_with<U: Pixel>(&self, other: &Image<U>) -> bool {
        Rc::as_ptr(&self.storage) as *const u8 == Rc::as_ptr(&other.storage) as *const u8
    }

    #[inline]
    pub fn is_in_bounds(&self, x: isize, y: isize) -> bool {
        x >= 0 && y >= 0 && (x as usize) < self.width && (y as usize) < self.height
    }

    /// Offset of `(x, y, band)` in the backing buffer.
    ///
    /// Pure arithmetic: no bounds checks. Only meaningful for in-range
    /// arguments; use the accessors for checked access.
    #[inline]
    pub fn index(&self, x: usize, y: usize, band: usize) -> usize {
        self.start_index + y * self.stride + x * self.num_bands + band
    }

    // --- Reshape ---

    /// Change the logical size, always onto fresh zeroed storage.
    ///
    /// `stride` and `start_index` are reset. If this image allocated its old
    /// buffer, that buffer is retired and every view of it becomes stale.
    /// Reshaping a view just detaches the view; the parent is unaffected.
    pub fn reshape(&mut self, width: usize, height: usize) -> Result<()> {
        let (stride, len) = element_count::<T>(width, height, self.num_bands)?;
        if self.owns_storage {
            self.storage.retired.set(true);
        }
        debug!(
            "reshape Image<{}> {}x{} -> {}x{} ({} band(s), view={})",
            T::KIND,
            self.width,
            self.height,
            width,
            height,
            self.num_bands,
            !self.owns_storage,
        );
        self.storage = Storage::new(vec![T::default(); len]);
        self.width = width;
        self.height = height;
        self.stride = stride;
        self.start_index = 0;
        self.owns_storage = true;
        Ok(())
    }

    // --- Bounds-checked accessors ---

    fn check_pixel(&self, x: isize, y: isize) -> Result<(usize, usize)> {
        if self.is_in_bounds(x, y) {
            Ok((x as usize, y as usize))
        } else {
            Err(ImageError::OutOfBounds {
                x,
                y,
                width: self.width,
                height: self.height,
            })
        }
    }

    fn check_band(&self, band: isize) -> Result<usize> {
        if band >= 0 && (band as usize) < self.num_bands {
            Ok(band as usize)
        } else {
            Err(ImageError::InvalidBand {
                band,
                num_bands: self.num_bands,
            })
        }
    }

    /// All bands of pixel `(x, y)` as a new vector of length `num_bands`.
    pub fn get(&self, x: isize, y: isize) -> Result<Vec<T>> {
        let mut out = vec![T::default(); self.num_bands];
        self.get_into(x, y, &mut out)?;
        Ok(out)
    }

    /// Write all bands of pixel `(x, y)` into the first `num_bands` slots
    /// of `out`.
    pub fn get_into(&self, x: isize, y: isize, out: &mut [T]) -> Result<()> {
        self.storage.check_live()?;
        let (x, y) = self.check_pixel(x, y)?;
        if out.len() < self.num_bands {
            return Err(ImageError::Capacity {
                required: self.num_bands,
                capacity: out.len(),
            });
        }
        let data = self.storage.read()?;
        let start = self.index(x, y, 0);
        out[..self.num_bands].copy_from_slice(&data[start..start + self.num_bands]);
        Ok(())
    }

    /// Set all bands of pixel `(x, y)`. `values.len()` must equal `num_bands`.
    pub fn set(&mut self, x: isize, y: isize, values: &[T]) -> Result<()> {
        self.storage.check_live()?;
        let (x, y) = self.check_pixel(x, y)?;
        if values.len() != self.num_bands {
            return Err(ImageError::ShapeMismatch {
                expected: self.num_bands,
                found: values.len(),
            });
        }
        let mut data = self.storage.write()?;
        let start = self.index(x, y, 0);
        data[start..start + self.num_bands].copy_from_slice(values);
        Ok(())
    }

    pub fn get_band(&self, x: isize, y: isize, band: isize) -> Result<T> {
        self.storage.check_live()?;
        let (x, y) = self.check_pixel(x, y)?;
        let band = self.check_band(band)?;
        let data = self.storage.read()?;
        Ok(data[self.index(x, y, band)])
    }

    pub fn set_band(&mut self, x: isize, y: isize, band: isize, value: T) -> Result<()> {
        self.storage.check_live()?;
        let (x, y) = self.check_pixel(x, y)?;
        let band = self.check_band(band)?;
        let mut data = self.storage.write()?;
        let i = self.index(x, y, band);
        data[i] = value;
        Ok(())
    }

    /// Set every band of every pixel in this image's extent to `value`.
    ///
    /// Row padding and parent pixels outside a view are left alone.
    pub fn fill(&mut self, value: T) -> Result<()> {
        self.with_raw_mut(|data, layout| {
            for y in 0..layout.height {
                data[layout.row_range(y)].fill(value);
            }
        })
    }

    // --- Raw strided access ---

    /// Run `f` over the whole backing buffer plus this image's layout.
    ///
    /// For interior fast paths: no per-element contract checks are made
    /// inside `f`, the layout tells which elements belong to the image.
    pub fn with_raw<R>(&self, f: impl FnOnce(&[T], RawLayout) -> R) -> Result<R> {
        let raw = self.read_raw()?;
        Ok(f(&raw[..], raw.layout()))
    }

    /// Borrow the backing buffer for reading until the guard is dropped.
    pub fn read_raw(&self) -> Result<RawRead<'_, T>> {
        Ok(RawRead {
            data: self.storage.read()?,
            layout: self.layout(),
        })
    }

    /// Mutable variant of [`Image::with_raw`]. Any alias of the same buffer
    /// touched inside `f` fails with `AliasConflict`.
    pub fn with_raw_mut<R>(&mut self, f: impl FnOnce(&mut [T], RawLayout) -> R) -> Result<R> {
        let layout = self.layout();
        let mut data = self.storage.write()?;
        Ok(f(&mut data[..], layout))
    }

    /// Copy this image's pixels into a packed row-major vector
    /// (`width * height * num_bands` elements, no padding).
    pub fn to_packed_vec(&self) -> Result<Vec<T>> {
        self.with_raw(|data, layout| {
            let mut out = Vec::with_capacity(layout.row_len * layout.height);
            for y in 0..layout.height {
                out.extend_from_slice(&data[layout.row_range(y)]);
            }
            out
        })
    }

    /// Overwrite this image's pixels from packed row-major data.
    pub fn copy_from_slice(&mut self, packed: &[T]) -> Result<()> {
        let expected = self.width * self.height * self.num_bands;
        if packed.len() != expected {
            return Err(ImageError::ShapeMismatch {
                expected,
                found: packed.len(),
            });
        }
        self.with_raw_mut(|data, layout| {
            if layout.row_len == 0 {
                return;
            }
            for (y, src_row) in packed.chunks_exact(layout.row_len).enumerate() {
                data[layout.row_range(y)].copy_from_slice(src_row);
            }
        })
    }

    // --- Views and factory ---

    /// A `w × h` view whose (0, 0) is this image's `(x0, y0)`.
    ///
    /// The view shares storage: writes through either image are visible
    /// through the other. Fails with `OutOfBounds` unless the rectangle
    /// lies inside this image.
    pub fn sub_image(&self, x0: isize, y0: isize, w: usize, h: usize) -> Result<Self> {
        self.storage.check_live()?;
        if x0 < 0 || y0 < 0 {
            return Err(ImageError::OutOfBounds {
                x: x0,
                y: y0,
                width: self.width,
                height: self.height,
            });
        }
        let (x0u, y0u) = (x0 as usize, y0 as usize);
        let x_end = x0u.saturating_add(w);
        let y_end = y0u.saturating_add(h);
        if x_end > self.width || y_end > self.height {
            return Err(ImageError::OutOfBounds {
                x: signed(x_end),
                y: signed(y_end),
                width: self.width,
                height: self.height,
            });
        }
        trace!(
            "sub_image ({x0},{y0}) {w}x{h} of Image<{}> {}x{}",
            T::KIND,
            self.width,
            self.height
        );
        Ok(Image {
            storage: Rc::clone(&self.storage),
            width: w,
            height: h,
            num_bands: self.num_bands,
            stride: self.stride,
            start_index: self.index(x0u, y0u, 0),
            owns_storage: false,
        })
    }

    /// A new, independent, zeroed image of the same element type and band
    /// count.
    pub fn create_like(&self, width: usize, height: usize) -> Result<Self> {
        Self::new(width, height, self.num_bands)
    }

    /// An independent, contiguous copy of exactly this image's pixels.
    pub fn deep_copy(&self) -> Result<Self> {
        let packed = self.to_packed_vec()?;
        Self::from_vec(self.width, self.height, self.num_bands, packed)
    }

    /// Copy pixel values from `src`, which must match in size and bands.
    ///
    /// `src` may alias `self`: values are read out before anything is
    /// written.
    pub fn copy_from(&mut self, src: &Image<T>) -> Result<()> {
        if (src.width, src.height) != (self.width, self.height) {
            return Err(ImageError::SizeMismatch {
                expected: (self.width, self.height),
                found: (src.width, src.height),
            });
        }
        if src.num_bands != self.num_bands {
            return Err(ImageError::ShapeMismatch {
                expected: self.num_bands,
                found: src.num_bands,
            });
        }
        let packed = src.to_packed_vec()?;
        self.copy_from_slice(&packed)
    }

    /// Fail with `SizeMismatch` unless `other` has this image's width and
    /// height.
    pub fn check_same_size<U: Pixel>(&self, other: &Image<U>) -> Result<()> {
        if (self.width, self.height) == (other.width, other.height) {
            Ok(())
        } else {
            Err(ImageError::SizeMismatch {
                expected: (self.width, self.height),
                found: (other.width, other.height),
            })
        }
    }
}

impl<T: Pixel> Default for Image<T> {
    fn default() -> Self {
        Self::empty()
    }
}

// Small images print their values; useful in test failures.
impl<T: Pixel + fmt::Debug> fmt::Debug for Image<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Image<{}> {{ {}x{}x{}, stride={}, start={}, subimage={} }}",
            T::KIND,
            self.width,
            self.height,
            self.num_bands,
            self.stride,
            self.start_index,
            self.is_subimage(),
        )?;
        let data = match self.storage.read() {
            Ok(data) => data,
            Err(e) => return writeln!(f, "  <{e}>"),
        };
        let layout = self.layout();
        for y in 0..self.height.min(8) {
            let row = &data[layout.row_range(y)];
            write!(f, "  row {y}: {:?}", &row[..row.len().min(16)])?;
            if row.len() > 16 {
                write!(f, " ...")?;
            }
            writeln!(f)?;
        }
        if self.height > 8 {
            writeln!(f, "  ...")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(width: usize, height: usize, num_bands: usize) -> Image<u8> {
        let data = (0..width * height * num_bands).map(|v| v as u8).collect();
        Image::from_vec(width, height, num_bands, data).unwrap()
    }

    #[test]
    fn test_new_zero_initialized() {
        let img: Image<u8> = Image::new(10, 5, 3).unwrap();
        assert_eq!(img.width(), 10);
        assert_eq!(img.height(), 5);
        assert_eq!(img.num_bands(), 3);
        assert_eq!(img.stride(), 30);
        assert_eq!(img.start_index(), 0);
        assert!(img.to_packed_vec().unwrap().iter().all(|&v| v == 0));
    }

    #[test]
    fn test_new_overflow_is_invalid_shape() {
        let err = Image::<f32>::new(usize::MAX, 2, 1).unwrap_err();
        assert!(matches!(err, ImageError::InvalidShape { .. }));
    }

    #[test]
    fn test_zero_height_with_overflowing_row_is_invalid_shape() {
        assert!(matches!(
            Image::<u8>::new(usize::MAX, 0, 2),
            Err(ImageError::InvalidShape { .. })
        ));
        let mut img: Image<u8> = Image::new(3, 3, 2).unwrap();
        assert!(matches!(
            img.reshape(usize::MAX, 0),
            Err(ImageError::InvalidShape { .. })
        ));
        // A failed reshape leaves the image as it was.
        assert_eq!((img.width(), img.height(), img.stride()), (3, 3, 6));
        assert!(!img.is_stale());
    }

    #[test]
    fn test_from_vec_length_checked() {
        let err = Image::<u8>::from_vec(2, 2, 2, vec![0; 7]).unwrap_err();
        assert_eq!(err, ImageError::ShapeMismatch { expected: 8, found: 7 });
    }

    #[test]
    fn test_index_formula() {
        let img = ramp(4, 3, 2);
        assert_eq!(img.index(0, 0, 0), 0);
        assert_eq!(img.index(1, 0, 1), 3);
        assert_eq!(img.index(0, 1, 0), 8);
        assert_eq!(img.index(3, 2, 1), 23);
        assert_eq!(img.get_band(3, 2, 1).unwrap(), 23);
    }

    #[test]
    fn test_empty_then_reshape() {
        let mut img: Image<i16> = Image::empty_with_bands(2);
        assert_eq!(img.width(), 0);
        assert!(!img.is_subimage());
        img.reshape(3, 2).unwrap();
        assert_eq!(img.stride(), 6);
        assert_eq!(img.get(2, 1).unwrap(), vec![0, 0]);
    }

    #[test]
    fn test_reshape_zeroes_and_resets_layout() {
        let parent = ramp(6, 6, 1);
        let mut view = parent.sub_image(1, 1, 3, 3).unwrap();
        assert!(view.is_subimage());
        view.reshape(2, 2).unwrap();
        assert!(!view.is_subimage());
        assert_eq!(view.get_band(1, 1, 0).unwrap(), 0);
        // The parent's buffer is untouched by a view detaching.
        assert!(!parent.is_stale());
        assert_eq!(parent.get_band(1, 1, 0).unwrap(), 7);
    }

    #[test]
    fn test_reshape_retires_views() {
        let mut parent = ramp(4, 4, 1);
        let view = parent.sub_image(0, 0, 2, 2).unwrap();
        parent.reshape(8, 8).unwrap();
        assert!(view.is_stale());
        assert_eq!(view.get_band(0, 0, 0), Err(ImageError::StaleView));
        assert_eq!(view.sub_image(0, 0, 1, 1).unwrap_err(), ImageError::StaleView);
        assert!(!parent.is_stale());
    }

    #[test]
    fn test_get_into_capacity() {
        let img = ramp(2, 2, 3);
        let mut small = [0u8; 2];
        assert_eq!(
            img.get_into(0, 0, &mut small),
            Err(ImageError::Capacity { required: 3, capacity: 2 })
        );
        let mut big = [9u8; 5];
        img.get_into(1, 0, &mut big).unwrap();
        assert_eq!(big, [3, 4, 5, 9, 9]);
    }

    #[test]
    fn test_fill_respects_view_extent() {
        let mut parent: Image<u8> = Image::new(4, 4, 1).unwrap();
        let mut view = parent.sub_image(1, 1, 2, 2).unwrap();
        view.fill(7).unwrap();
        assert_eq!(parent.get_band(0, 0, 0).unwrap(), 0);
        assert_eq!(parent.get_band(1, 1, 0).unwrap(), 7);
        assert_eq!(parent.get_band(2, 2, 0).unwrap(), 7);
        assert_eq!(parent.get_band(3, 2, 0).unwrap(), 0);
        parent.fill(1).unwrap();
        assert_eq!(view.get_band(0, 0, 0).unwrap(), 1);
    }

    #[test]
    fn test_nested_views_compose() {
        let img = ramp(8, 8, 1);
        let outer = img.sub_image(2, 1, 5, 5).unwrap();
        let inner = outer.sub_image(1, 2, 2, 2).unwrap();
        assert_eq!(inner.start_index(), img.index(3, 3, 0));
        assert_eq!(inner.stride(), 8);
        assert_eq!(inner.get_band(0, 0, 0).unwrap(), 27);
        assert_eq!(inner.get_band(1, 1, 0).unwrap(), 36);
    }

    #[test]
    fn test_packed_vec_skips_padding() {
        let img = ramp(4, 4, 1);
        let view = img.sub_image(1, 2, 2, 2).unwrap();
        assert_eq!(view.to_packed_vec().unwrap(), vec![9, 10, 13, 14]);
    }

    #[test]
    fn test_copy_from_overlapping_alias() {
        let mut img = ramp(4, 1, 1);
        let src = img.sub_image(0, 0, 3, 1).unwrap();
        let mut dst = img.sub_image(1, 0, 3, 1).unwrap();
        dst.copy_from(&src).unwrap();
        assert_eq!(img.to_packed_vec().unwrap(), vec![0, 0, 1, 2]);
        img.set(0, 0, &[5]).unwrap();
        assert_eq!(src.get_band(0, 0, 0).unwrap(), 5);
    }

    #[test]
    fn test_alias_conflict_inside_raw_closure() {
        let mut img = ramp(3, 3, 1);
        let view = img.sub_image(0, 0, 1, 1).unwrap();
        let inner = img
            .with_raw_mut(|_, _| view.get_band(0, 0, 0))
            .unwrap();
        assert_eq!(inner, Err(ImageError::AliasConflict));
    }

    #[test]
    fn test_bounds_reported_before_alias_conflict() {
        let mut img = ramp(3, 3, 1);
        let mut view = img.sub_image(0, 0, 2, 2).unwrap();
        let errs = img
            .with_raw_mut(|_, _| {
                (
                    view.get_band(5, 0, 0),
                    view.get_band(0, 0, 1),
                    view.set(0, -1, &[1]),
                    view.set_band(0, 0, 0, 1),
                )
            })
            .unwrap();
        assert!(matches!(errs.0, Err(ImageError::OutOfBounds { x: 5, .. })));
        assert!(matches!(errs.1, Err(ImageError::InvalidBand { band: 1, .. })));
        assert!(matches!(errs.2, Err(ImageError::OutOfBounds { y: -1, .. })));
        assert_eq!(errs.3, Err(ImageError::AliasConflict));
    }

    #[test]
    fn test_read_raw_guards_coexist() {
        let img = ramp(4, 4, 1);
        let view = img.sub_image(1, 1, 2, 2).unwrap();
        let a = img.read_raw().unwrap();
        let b = view.read_raw().unwrap();
        assert_eq!(a.at(1, 1, 0), b.at(0, 0, 0));
        assert_eq!(b.row(1), &[9, 10]);
        assert_eq!(a.len(), 16);
    }

    #[test]
    fn test_shares_storage() {
        let img = ramp(3, 3, 1);
        let view = img.sub_image(1, 1, 1, 1).unwrap();
        let copy = view.deep_copy().unwrap();
        assert!(img.shares_storage_with(&view));
        assert!(!img.shares_storage_with(&copy));
        assert!(!copy.is_subimage());
    }

    #[test]
    fn test_pixel_from_f32_clamps() {
        assert_eq!(u8::from_f32(-3.0), 0);
        assert_eq!(u8::from_f32(300.0), 255);
        assert_eq!(u8::from_f32(127.6), 128);
        assert_eq!(i8::from_f32(-200.0), -128);
        assert_eq!(i16::from_f32(-1.4), -1);
        assert_eq!(i16::from_f32(f32::NAN), 0);
        assert_eq!(f32::from_f32(-0.25), -0.25);
        assert_eq!(<i16 as Pixel>::KIND, PixelKind::S16);
    }

    #[test]
    fn test_debug_mentions_kind() {
        let img = ramp(2, 2, 1);
        let s = format!("{img:?}");
        assert!(s.contains("Image<u8>"));
        assert!(s.contains("row 1: [2, 3]"));
    }
}
