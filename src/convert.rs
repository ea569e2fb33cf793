// convert.rs -- Conversions between pixel kinds, packed bytes and rasters.
//
// Pixel-kind conversion goes through the raw `to_f32` / `from_f32` path on
// each Pixel impl (i16 -12 becomes f32 -12.0, not a normalized value).
// Raster output is for display: every band is clamped into u8, so negative
// derivative values show as black.

use image::{DynamicImage, GrayAlphaImage, GrayImage, RgbImage, RgbaImage};

use crate::error::{ImageError, Result};
use crate::image::{Image, Pixel};

/// Convert between any two pixel kinds, keeping the band count.
///
/// The result is a fresh contiguous image even when `src` is a view.
pub fn convert_image<S: Pixel, D: Pixel>(src: &Image<S>) -> Result<Image<D>> {
    let packed: Vec<D> = src
        .to_packed_vec()?
        .into_iter()
        .map(|v| D::from_f32(v.to_f32()))
        .collect();
    Image::from_vec(src.width(), src.height(), src.num_bands(), packed)
}

/// The image's pixels as packed row-major native-endian bytes.
pub fn to_bytes<T: Pixel>(img: &Image<T>) -> Result<Vec<u8>> {
    let packed = img.to_packed_vec()?;
    Ok(bytemuck::cast_slice(&packed).to_vec())
}

fn raster_dims<T: Pixel>(img: &Image<T>) -> Result<(u32, u32)> {
    match (u32::try_from(img.width()), u32::try_from(img.height())) {
        (Ok(w), Ok(h)) => Ok((w, h)),
        _ => Err(ImageError::InvalidShape {
            width: img.width(),
            height: img.height(),
            num_bands: img.num_bands(),
        }),
    }
}

/// Render an image as an 8-bit raster.
///
/// 1 band → luma, 2 → luma+alpha, 3 → RGB, 4 → RGBA. Other band counts
/// fail with `UnsupportedBands`.
pub fn to_raster<T: Pixel>(img: &Image<T>) -> Result<DynamicImage> {
    let (w, h) = raster_dims(img)?;
    let bytes: Vec<u8> = img
        .to_packed_vec()?
        .into_iter()
        .map(|v| u8::from_f32(v.to_f32()))
        .collect();
    let found = bytes.len();
    let raster = match img.num_bands() {
        1 => GrayImage::from_raw(w, h, bytes).map(DynamicImage::ImageLuma8),
        2 => GrayAlphaImage::from_raw(w, h, bytes).map(DynamicImage::ImageLumaA8),
        3 => RgbImage::from_raw(w, h, bytes).map(DynamicImage::ImageRgb8),
        4 => RgbaImage::from_raw(w, h, bytes).map(DynamicImage::ImageRgba8),
        n => return Err(ImageError::UnsupportedBands(n)),
    };
    raster.ok_or(ImageError::ShapeMismatch {
        expected: w as usize * h as usize * img.num_bands(),
        found,
    })
}

/// Build an 8-bit image from a raster.
///
/// 8-bit luma, luma+alpha, RGB and RGBA keep their channel count; every
/// other color type is converted to RGBA first.
pub fn from_raster(raster: &DynamicImage) -> Result<Image<u8>> {
    let (w, h) = (raster.width() as usize, raster.height() as usize);
    let (bands, data) = match raster {
        DynamicImage::ImageLuma8(buf) => (1, buf.as_raw().clone()),
        DynamicImage::ImageLumaA8(buf) => (2, buf.as_raw().clone()),
        DynamicImage::ImageRgb8(buf) => (3, buf.as_raw().clone()),
        DynamicImage::ImageRgba8(buf) => (4, buf.as_raw().clone()),
        other => (4, other.to_rgba8().into_raw()),
    };
    Image::from_vec(w, h, bands, data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generic_convert() {
        let img = Image::from_vec(2, 2, 1, vec![0u8, 128, 255, 42]).unwrap();
        let f: Image<f32> = convert_image(&img).unwrap();
        assert!((f.get_band(1, 0, 0).unwrap() - 128.0).abs() < 1e-6);

        let back: Image<u8> = convert_image(&f).unwrap();
        assert_eq!(back.to_packed_vec().unwrap(), vec![0, 128, 255, 42]);
    }

    #[test]
    fn test_convert_clamps_into_narrow_kind() {
        let img = Image::from_vec(4, 1, 1, vec![-10i16, 0, 300, 127]).unwrap();
        let out: Image<u8> = convert_image(&img).unwrap();
        assert_eq!(out.to_packed_vec().unwrap(), vec![0, 0, 255, 127]);
    }

    #[test]
    fn test_convert_view_is_contiguous() {
        let img = Image::from_vec(3, 3, 1, (0u8..9).collect()).unwrap();
        let view = img.sub_image(1, 1, 2, 2).unwrap();
        let out: Image<i16> = convert_image(&view).unwrap();
        assert!(!out.is_subimage());
        assert_eq!(out.to_packed_vec().unwrap(), vec![4, 5, 7, 8]);
    }

    #[test]
    fn test_to_bytes_native_endian() {
        let img = Image::from_vec(2, 1, 1, vec![1u16, 0x0203]).unwrap();
        let bytes = to_bytes(&img).unwrap();
        let mut expect = Vec::new();
        expect.extend_from_slice(&1u16.to_ne_bytes());
        expect.extend_from_slice(&0x0203u16.to_ne_bytes());
        assert_eq!(bytes, expect);
    }

    #[test]
    fn test_raster_band_layouts() {
        let gray = Image::from_vec(2, 1, 1, vec![3u8, 4]).unwrap();
        assert!(matches!(to_raster(&gray).unwrap(), DynamicImage::ImageLuma8(_)));

        let rgb = Image::from_vec(1, 1, 3, vec![1u8, 2, 3]).unwrap();
        let raster = to_raster(&rgb).unwrap();
        assert_eq!(raster.to_rgb8().get_pixel(0, 0).0, [1, 2, 3]);

        let rgba: Image<u8> = Image::new(1, 1, 4).unwrap();
        assert!(matches!(to_raster(&rgba).unwrap(), DynamicImage::ImageRgba8(_)));

        let five: Image<u8> = Image::new(1, 1, 5).unwrap();
        assert_eq!(to_raster(&five).unwrap_err(), ImageError::UnsupportedBands(5));
    }

    #[test]
    fn test_raster_roundtrip_keeps_bands() {
        let img = Image::from_vec(2, 2, 3, (0u8..12).collect()).unwrap();
        let back = from_raster(&to_raster(&img).unwrap()).unwrap();
        assert_eq!(back.num_bands(), 3);
        assert_eq!(back.to_packed_vec().unwrap(), img.to_packed_vec().unwrap());
    }

    #[test]
    fn test_from_raster_converts_wide_types() {
        let raster = DynamicImage::ImageRgb16(image::ImageBuffer::new(2, 2));
        let img = from_raster(&raster).unwrap();
        assert_eq!(img.num_bands(), 4);
        assert_eq!(img.get(0, 0).unwrap(), vec![0, 0, 0, 255]);
    }
}
