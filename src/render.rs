// render.rs -- Turning pyramid layers into labelled 8-bit rasters.
//
// The renderer walks any sequence of `(layer, scale)` pairs once and emits
// one raster per layer. It never draws to a window; the caller decides
// whether the rasters get saved, composited or shown.
//
// With `scale_up` set, every layer is resampled to the size of the first
// layer in the sequence so the rasters can be compared side by side. The
// resampling target is a scratch image kept between calls: it is created
// with `create_like` from the first layer ever rendered and `reshape`d when
// a later sequence needs a different size.

use image::DynamicImage;
use log::debug;

use crate::convert::to_raster;
use crate::error::Result;
use crate::image::{Image, Pixel};
use crate::interpolate::{scale, Interpolation};

/// How layers are turned into rasters.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RenderOptions {
    /// Resample every layer to the first layer's size.
    pub scale_up: bool,
    /// Sampling used when `scale_up` is set.
    pub interpolation: Interpolation,
}

impl RenderOptions {
    pub fn new(scale_up: bool, interpolation: Interpolation) -> Self {
        RenderOptions {
            scale_up,
            interpolation,
        }
    }
}

/// One rendered layer.
#[derive(Debug, Clone)]
pub struct RenderedLayer {
    pub raster: DynamicImage,
    /// The scale formatted for display, e.g. `" 2.00"`.
    pub label: String,
    pub scale: f64,
}

pub struct PyramidRenderer<T: Pixel> {
    pub options: RenderOptions,
    upscale: Option<Image<T>>,
}

impl<T: Pixel> PyramidRenderer<T> {
    pub fn new(options: RenderOptions) -> Self {
        PyramidRenderer {
            options,
            upscale: None,
        }
    }

    /// Render each `(layer, scale)` pair in order.
    pub fn render<'a, L>(&mut self, layers: L) -> Result<Vec<RenderedLayer>>
    where
        L: IntoIterator<Item = (&'a Image<T>, f64)>,
    {
        let options = self.options;
        let mut rendered = Vec::new();
        let mut target: Option<(usize, usize)> = None;

        for (layer, layer_scale) in layers {
            let raster = if options.scale_up {
                let (tw, th) = *target.get_or_insert((layer.width(), layer.height()));
                if (layer.width(), layer.height()) == (tw, th) {
                    to_raster(layer)?
                } else {
                    let scratch = self.scratch_for(layer, tw, th)?;
                    scale(layer, &mut *scratch, options.interpolation)?;
                    to_raster(&*scratch)?
                }
            } else {
                to_raster(layer)?
            };

            let label = format!("{layer_scale:5.2}");
            debug!(
                "rendered layer {} ({}x{} {}) as {}x{}, label '{}'",
                rendered.len(),
                layer.width(),
                layer.height(),
                layer.kind(),
                raster.width(),
                raster.height(),
                label
            );
            rendered.push(RenderedLayer {
                raster,
                label,
                scale: layer_scale,
            });
        }
        Ok(rendered)
    }

    /// The scratch image, sized `width`×`height` with `like`'s band count.
    fn scratch_for(&mut self, like: &Image<T>, width: usize, height: usize) -> Result<&mut Image<T>> {
        let scratch = match self.upscale.take() {
            Some(s) if s.num_bands() == like.num_bands() => s,
            _ => {
                debug!("allocating {width}x{height} upscale buffer");
                like.create_like(width, height)?
            }
        };
        let scratch = self.upscale.insert(scratch);
        if (scratch.width(), scratch.height()) != (width, height) {
            scratch.reshape(width, height)?;
        }
        Ok(scratch)
    }
}

impl<T: Pixel> Default for PyramidRenderer<T> {
    fn default() -> Self {
        Self::new(RenderOptions::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ImageError;
    use crate::pyramid::ImagePyramid;

    #[test]
    fn test_labels_and_native_sizes() {
        let img: Image<u8> = Image::new(16, 8, 1).unwrap();
        let pyr = ImagePyramid::subsampled(&img, &[1, 2, 4]).unwrap();
        let mut renderer = PyramidRenderer::default();
        let out = renderer.render(pyr.iter()).unwrap();

        let labels: Vec<_> = out.iter().map(|r| r.label.as_str()).collect();
        assert_eq!(labels, vec![" 1.00", " 2.00", " 4.00"]);
        let dims: Vec<_> = out.iter().map(|r| (r.raster.width(), r.raster.height())).collect();
        assert_eq!(dims, vec![(16, 8), (8, 4), (4, 2)]);
    }

    #[test]
    fn test_scale_up_matches_first_layer() {
        let img = Image::from_vec(8, 8, 3, vec![40u8; 8 * 8 * 3]).unwrap();
        let pyr = ImagePyramid::subsampled(&img, &[1, 2, 4]).unwrap();
        let mut renderer = PyramidRenderer::new(RenderOptions::new(true, Interpolation::Bilinear));
        let out = renderer.render(pyr.iter()).unwrap();

        for r in &out {
            assert_eq!((r.raster.width(), r.raster.height()), (8, 8));
            assert!(r.raster.to_rgb8().as_raw().iter().all(|&v| v == 40));
        }
    }

    #[test]
    fn test_scratch_reshaped_between_renders() {
        let mut renderer = PyramidRenderer::new(RenderOptions::new(true, Interpolation::NearestNeighbor));
        let big: Image<f32> = Image::new(12, 6, 1).unwrap();
        let small: Image<f32> = Image::new(3, 3, 1).unwrap();

        renderer.render([(&big, 1.0), (&small, 4.0)]).unwrap();
        assert_eq!(renderer.upscale.as_ref().map(|s| (s.width(), s.height())), Some((12, 6)));

        let out = renderer.render([(&small, 1.0), (&big, 0.5)]).unwrap();
        assert_eq!((out[1].raster.width(), out[1].raster.height()), (3, 3));
        assert_eq!(renderer.upscale.as_ref().map(|s| (s.width(), s.height())), Some((3, 3)));
    }

    #[test]
    fn test_values_clamped_for_display() {
        let img = Image::from_vec(2, 1, 1, vec![-40i16, 900]).unwrap();
        let mut renderer = PyramidRenderer::default();
        let out = renderer.render([(&img, 1.0)]).unwrap();
        assert_eq!(out[0].raster.to_luma8().as_raw(), &vec![0u8, 255]);
    }

    #[test]
    fn test_unsupported_band_count() {
        let img: Image<u8> = Image::new(2, 2, 5).unwrap();
        let mut renderer = PyramidRenderer::default();
        assert!(matches!(
            renderer.render([(&img, 1.0)]),
            Err(ImageError::UnsupportedBands(5))
        ));
    }
}
