// pyramid.rs -- Ordered layers of one image at increasing scale factors.
//
// A layer's scale is the factor by which it was reduced from the base
// resolution, so layer 0 is usually 1.0 and every later layer's scale is
// strictly larger. All layers share the pixel type and band count of the
// first layer; their sizes are unconstrained.
//
// `subsampled` builds the simplest such pyramid: layer k takes every
// `factors[k]`-th pixel of the source in both dimensions.
//
//   dst(x, y) = src(x * f, y * f),   dst size = (w / f, h / f)
//
// Odd dimensions drop the last row/column, as integer division does.
// There is no anti-alias blur; callers wanting a Gaussian pyramid blur the
// source first and push the layers themselves.

use crate::error::{ImageError, Result};
use crate::image::{Image, Pixel};

/// Layers of the same pixel kind with strictly increasing scale factors.
pub struct ImagePyramid<T: Pixel> {
    layers: Vec<Image<T>>,
    scales: Vec<f64>,
}

impl<T: Pixel> ImagePyramid<T> {
    pub fn new() -> Self {
        ImagePyramid {
            layers: Vec::new(),
            scales: Vec::new(),
        }
    }

    /// Append a layer at `scale`.
    ///
    /// The scale must be finite, positive and larger than the previous
    /// layer's. The band count must match the first layer's.
    pub fn push_layer(&mut self, layer: Image<T>, scale: f64) -> Result<()> {
        let index = self.layers.len();
        let increasing = self.scales.last().map_or(true, |&prev| scale > prev);
        if !scale.is_finite() || scale <= 0.0 || !increasing {
            return Err(ImageError::InvalidScale { layer: index, scale });
        }
        if let Some(first) = self.layers.first() {
            if first.num_bands() != layer.num_bands() {
                return Err(ImageError::ShapeMismatch {
                    expected: first.num_bands(),
                    found: layer.num_bands(),
                });
            }
        }
        self.layers.push(layer);
        self.scales.push(scale);
        Ok(())
    }

    /// Build one layer per subsampling factor. A factor of 1 is a full-size
    /// copy of `src`; a factor of 0 fails with `InvalidScale`.
    pub fn subsampled(src: &Image<T>, factors: &[usize]) -> Result<Self> {
        let mut pyramid = ImagePyramid::new();
        for (layer, &factor) in factors.iter().enumerate() {
            if factor == 0 {
                return Err(ImageError::InvalidScale { layer, scale: 0.0 });
            }
            let down = subsample(src, factor)?;
            pyramid.push_layer(down, factor as f64)?;
        }
        Ok(pyramid)
    }

    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Layer `index`, finest first.
    pub fn layer(&self, index: usize) -> Option<&Image<T>> {
        self.layers.get(index)
    }

    pub fn scale(&self, index: usize) -> Option<f64> {
        self.scales.get(index).copied()
    }

    /// `(layer, scale)` pairs, finest first.
    pub fn iter(&self) -> impl Iterator<Item = (&Image<T>, f64)> + '_ {
        self.layers.iter().zip(self.scales.iter().copied())
    }
}

impl<T: Pixel> Default for ImagePyramid<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Take every `factor`-th pixel of `src`, all bands together.
fn subsample<T: Pixel>(src: &Image<T>, factor: usize) -> Result<Image<T>> {
    let new_w = src.width() / factor;
    let new_h = src.height() / factor;
    let mut dst = src.create_like(new_w, new_h)?;

    let input = src.read_raw()?;
    let sl = input.layout();
    dst.with_raw_mut(|out, dl| {
        for y in 0..new_h {
            for x in 0..new_w {
                let s = sl.index(x * factor, y * factor, 0);
                let d = dl.index(x, y, 0);
                out[d..d + dl.num_bands].copy_from_slice(&input[s..s + sl.num_bands]);
            }
        }
    })?;
    Ok(dst)
}
