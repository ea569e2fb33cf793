// interpolate.rs -- Resampling an image into another image of the same kind.
//
// Used by the pyramid renderer to bring every layer up to a common display
// size. Destination pixel (x, y) samples the source at its center:
//
//   sx = (x + 0.5) * src_w / dst_w - 0.5
//
// Nearest-neighbor rounds that back to a source pixel; bilinear blends the
// four surrounding pixels and replicates edge pixels past the border.

use crate::error::{ImageError, Result};
use crate::image::{Image, Pixel, RawLayout};

/// Sampling method for [`scale`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Interpolation {
    #[default]
    NearestNeighbor,
    Bilinear,
}

/// Bilinear sample of one band at real-valued coordinates.
///
/// Coordinates outside the image are clamped to the edge, so querying
/// `x = width - 1` or beyond returns the edge pixel.
pub fn interpolate_bilinear<T: Pixel>(img: &Image<T>, x: f32, y: f32, band: usize) -> Result<f32> {
    if img.width() == 0 || img.height() == 0 {
        return Err(ImageError::InvalidShape {
            width: img.width(),
            height: img.height(),
            num_bands: img.num_bands(),
        });
    }
    if band >= img.num_bands() {
        return Err(ImageError::InvalidBand {
            band: isize::try_from(band).unwrap_or(isize::MAX),
            num_bands: img.num_bands(),
        });
    }
    img.with_raw(|data, layout| bilinear_raw(data, &layout, x, y, band))
}

#[inline]
fn bilinear_raw<T: Pixel>(data: &[T], layout: &RawLayout, x: f32, y: f32, band: usize) -> f32 {
    let max_x = (layout.width - 1) as f32;
    let max_y = (layout.height - 1) as f32;
    let x = x.clamp(0.0, max_x);
    let y = y.clamp(0.0, max_y);

    let x0 = x.floor() as usize;
    let y0 = y.floor() as usize;
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;
    let x1 = (x0 + 1).min(layout.width - 1);
    let y1 = (y0 + 1).min(layout.height - 1);

    let p00 = data[layout.index(x0, y0, band)].to_f32();
    let p10 = data[layout.index(x1, y0, band)].to_f32();
    let p01 = data[layout.index(x0, y1, band)].to_f32();
    let p11 = data[layout.index(x1, y1, band)].to_f32();

    (1.0 - fx) * (1.0 - fy) * p00 + fx * (1.0 - fy) * p10 + (1.0 - fx) * fy * p01 + fx * fy * p11
}

/// Resample all of `src` into all of `dst`.
///
/// Both images must have the same band count. A zero-sized `dst` is a
/// no-op; a zero-sized `src` with a non-empty `dst` has nothing to sample
/// and fails with `InvalidShape`. `src` may alias `dst`.
pub fn scale<T: Pixel>(src: &Image<T>, dst: &mut Image<T>, method: Interpolation) -> Result<()> {
    if src.num_bands() != dst.num_bands() {
        return Err(ImageError::ShapeMismatch {
            expected: dst.num_bands(),
            found: src.num_bands(),
        });
    }
    if dst.width() == 0 || dst.height() == 0 {
        return Ok(());
    }
    if src.width() == 0 || src.height() == 0 {
        return Err(ImageError::InvalidShape {
            width: src.width(),
            height: src.height(),
            num_bands: src.num_bands(),
        });
    }
    if src.shares_storage_with(dst) {
        let detached = src.deep_copy()?;
        return scale(&detached, dst, method);
    }

    let ratio_x = src.width() as f32 / dst.width() as f32;
    let ratio_y = src.height() as f32 / dst.height() as f32;
    let input = src.read_raw()?;
    let sl = input.layout();

    dst.with_raw_mut(|out, dl| {
        for y in 0..dl.height {
            let sy = (y as f32 + 0.5) * ratio_y - 0.5;
            for x in 0..dl.width {
                let sx = (x as f32 + 0.5) * ratio_x - 0.5;
                let d = dl.index(x, y, 0);
                match method {
                    Interpolation::NearestNeighbor => {
                        let px = (sx.round().max(0.0) as usize).min(sl.width - 1);
                        let py = (sy.round().max(0.0) as usize).min(sl.height - 1);
                        let s = sl.index(px, py, 0);
                        out[d..d + dl.num_bands].copy_from_slice(&input[s..s + sl.num_bands]);
                    }
                    Interpolation::Bilinear => {
                        for band in 0..dl.num_bands {
                            out[d + band] = T::from_f32(bilinear_raw(&input[..], &sl, sx, sy, band));
                        }
                    }
                }
            }
        }
    })
}
