// intensity.rs -- Corner-intensity images computed from derivative images.
//
// A `CornerIntensity` turns up to five derivative images (x, y, xx, yy, xy)
// into one f32 intensity image of the input's size. The intensity image is
// owned by the detector and reused across calls: it is reshaped, and so
// zero-filled, when the input size changes, and zero-filled again when the
// ignore border grows past the one it was last written with. Pixels inside
// the ignore border therefore always read zero.
//
// Which derivative kind a detector accepts is a generic parameter bound at
// compile time; there is no lookup of a processing routine by type.
//
//   KitRosIntensity:  Kitchen-Rosenfeld curvature, needs gradient + hessian.
//   HarrisIntensity:  det(M) - k·trace(M)², needs gradient only. M is the
//                     structure tensor summed over a (2r+1)² box window.

use log::debug;

use crate::error::{ImageError, Result};
use crate::image::{Image, Pixel};

/// A pixel that passed a detector's candidate threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub x: usize,
    pub y: usize,
    pub score: f32,
}

/// Optional derivative inputs for a corner-intensity detector.
///
/// Detectors check that the images they require are present.
pub struct DerivativeSet<'a, D: Pixel> {
    pub x: Option<&'a Image<D>>,
    pub y: Option<&'a Image<D>>,
    pub xx: Option<&'a Image<D>>,
    pub yy: Option<&'a Image<D>>,
    pub xy: Option<&'a Image<D>>,
}

impl<'a, D: Pixel> DerivativeSet<'a, D> {
    pub fn gradient(x: &'a Image<D>, y: &'a Image<D>) -> Self {
        DerivativeSet {
            x: Some(x),
            y: Some(y),
            xx: None,
            yy: None,
            xy: None,
        }
    }

    pub fn with_hessian(mut self, xx: &'a Image<D>, yy: &'a Image<D>, xy: &'a Image<D>) -> Self {
        self.xx = Some(xx);
        self.yy = Some(yy);
        self.xy = Some(xy);
        self
    }
}

impl<'a, D: Pixel> Default for DerivativeSet<'a, D> {
    fn default() -> Self {
        DerivativeSet {
            x: None,
            y: None,
            xx: None,
            yy: None,
            xy: None,
        }
    }
}

/// Computes a per-pixel corner intensity from derivative images.
pub trait CornerIntensity<I: Pixel, D: Pixel> {
    fn process(&mut self, image: &Image<I>, derivs: &DerivativeSet<'_, D>) -> Result<()>;

    /// Intensity from the last `process` call, same size as its input.
    fn intensity(&self) -> &Image<f32>;

    /// Pre-filtered candidate corners, if this detector produces them.
    fn candidates(&self) -> Option<&[Candidate]>;

    fn requires_gradient(&self) -> bool;

    fn requires_hessian(&self) -> bool;

    fn has_candidates(&self) -> bool;

    /// Pixels within this many of an edge hold no valid intensity.
    fn ignore_border(&self) -> usize;
}

/// Look up a required derivative and check it against the input image.
fn require<'a, I: Pixel, D: Pixel>(
    image: &Image<I>,
    slot: Option<&'a Image<D>>,
    name: &'static str,
) -> Result<&'a Image<D>> {
    let deriv = slot.ok_or(ImageError::MissingInput(name))?;
    image.check_same_size(deriv)?;
    if deriv.num_bands() != 1 {
        return Err(ImageError::ShapeMismatch {
            expected: 1,
            found: deriv.num_bands(),
        });
    }
    Ok(deriv)
}

/// Match `intensity` to the input size. Reshape hands back zeroed storage.
///
/// `written_border` is the border of the previous write. If `border` is
/// wider, the ring between them still holds old values and is cleared.
fn fit_intensity<I: Pixel>(
    intensity: &mut Image<f32>,
    image: &Image<I>,
    border: usize,
    written_border: &mut usize,
) -> Result<()> {
    if intensity.width() != image.width() || intensity.height() != image.height() {
        debug!(
            "resizing intensity {}x{} -> {}x{}",
            intensity.width(),
            intensity.height(),
            image.width(),
            image.height()
        );
        intensity.reshape(image.width(), image.height())?;
    } else if border > *written_border {
        debug!("ignore border grew {} -> {border}, clearing intensity", *written_border);
        intensity.fill(0.0)?;
    }
    *written_border = border;
    Ok(())
}

// ---------------------------------------------------------------------------
// Kitchen-Rosenfeld
// ---------------------------------------------------------------------------

/// Kitchen-Rosenfeld corner intensity:
///
/// ```text
///   (dxx·dy² - 2·dxy·dx·dy + dyy·dx²) / (dx² + dy²)
/// ```
///
/// Zero where the gradient vanishes. No ignore border of its own; set one
/// with [`KitRosIntensity::with_ignore_border`] to inherit the margin of the
/// derivatives it is fed.
#[derive(Debug)]
pub struct KitRosIntensity {
    intensity: Image<f32>,
    ignore_border: usize,
    written_border: usize,
}

impl KitRosIntensity {
    pub fn new() -> Self {
        KitRosIntensity {
            intensity: Image::empty_with_bands(1),
            ignore_border: 0,
            written_border: 0,
        }
    }

    pub fn with_ignore_border(mut self, border: usize) -> Self {
        self.ignore_border = border;
        self
    }
}

impl Default for KitRosIntensity {
    fn default() -> Self {
        Self::new()
    }
}

impl<I: Pixel, D: Pixel> CornerIntensity<I, D> for KitRosIntensity {
    fn process(&mut self, image: &Image<I>, derivs: &DerivativeSet<'_, D>) -> Result<()> {
        let dx = require(image, derivs.x, "deriv_x")?.read_raw()?;
        let dy = require(image, derivs.y, "deriv_y")?.read_raw()?;
        let dxx = require(image, derivs.xx, "deriv_xx")?.read_raw()?;
        let dyy = require(image, derivs.yy, "deriv_yy")?.read_raw()?;
        let dxy = require(image, derivs.xy, "deriv_xy")?.read_raw()?;
        let b = self.ignore_border;
        fit_intensity(&mut self.intensity, image, b, &mut self.written_border)?;

        let (w, h) = (image.width(), image.height());
        if w <= 2 * b || h <= 2 * b {
            return Ok(());
        }
        self.intensity.with_raw_mut(|out, ol| {
            for y in b..h - b {
                for x in b..w - b {
                    let gx = dx.at(x, y, 0).to_f32();
                    let gy = dy.at(x, y, 0).to_f32();
                    let gxx = dxx.at(x, y, 0).to_f32();
                    let gyy = dyy.at(x, y, 0).to_f32();
                    let gxy = dxy.at(x, y, 0).to_f32();

                    let gx2 = gx * gx;
                    let gy2 = gy * gy;
                    let bottom = gx2 + gy2;
                    out[ol.index(x, y, 0)] = if bottom == 0.0 {
                        0.0
                    } else {
                        (gxx * gy2 - 2.0 * gxy * gx * gy + gyy * gx2) / bottom
                    };
                }
            }
        })
    }

    fn intensity(&self) -> &Image<f32> {
        &self.intensity
    }

    fn candidates(&self) -> Option<&[Candidate]> {
        None
    }

    fn requires_gradient(&self) -> bool {
        true
    }

    fn requires_hessian(&self) -> bool {
        true
    }

    fn has_candidates(&self) -> bool {
        false
    }

    fn ignore_border(&self) -> usize {
        self.ignore_border
    }
}

// ---------------------------------------------------------------------------
// Harris
// ---------------------------------------------------------------------------

/// Harris corner intensity over a square window.
///
/// Positive → corner, negative → edge, near zero → flat.
#[derive(Debug)]
pub struct HarrisIntensity {
    /// Sensitivity to corner vs. edge. Typical range: 0.04–0.06.
    pub k: f32,
    /// Window half-size: radius 1 → 3×3 window, radius 2 → 5×5.
    pub radius: usize,
    /// Margin inherited from the derivative that feeds this detector.
    inherited_border: usize,
    candidate_threshold: Option<f32>,
    intensity: Image<f32>,
    written_border: usize,
    candidates: Vec<Candidate>,
}

impl HarrisIntensity {
    pub fn new(k: f32, radius: usize) -> Self {
        HarrisIntensity {
            k,
            radius,
            inherited_border: 0,
            candidate_threshold: None,
            intensity: Image::empty_with_bands(1),
            written_border: 0,
            candidates: Vec::new(),
        }
    }

    pub fn with_ignore_border(mut self, border: usize) -> Self {
        self.inherited_border = border;
        self
    }

    /// Also list every pixel whose intensity exceeds `threshold`.
    pub fn with_candidate_threshold(mut self, threshold: f32) -> Self {
        self.candidate_threshold = Some(threshold);
        self
    }
}

impl<I: Pixel, D: Pixel> CornerIntensity<I, D> for HarrisIntensity {
    fn process(&mut self, image: &Image<I>, derivs: &DerivativeSet<'_, D>) -> Result<()> {
        let dx = require(image, derivs.x, "deriv_x")?.read_raw()?;
        let dy = require(image, derivs.y, "deriv_y")?.read_raw()?;
        let b = CornerIntensity::<I, D>::ignore_border(self);
        fit_intensity(&mut self.intensity, image, b, &mut self.written_border)?;
        self.candidates.clear();

        let (w, h) = (image.width(), image.height());
        if w <= 2 * b || h <= 2 * b {
            return Ok(());
        }

        // Gradient products over the region the windows can reach.
        let lo = self.inherited_border;
        let (rw, rh) = (w - 2 * lo, h - 2 * lo);
        let mut ixx = vec![0.0f32; rw * rh];
        let mut iyy = vec![0.0f32; rw * rh];
        let mut ixy = vec![0.0f32; rw * rh];
        for y in 0..rh {
            for x in 0..rw {
                let gx = dx.at(x + lo, y + lo, 0).to_f32();
                let gy = dy.at(x + lo, y + lo, 0).to_f32();
                let i = y * rw + x;
                ixx[i] = gx * gx;
                iyy[i] = gy * gy;
                ixy[i] = gx * gy;
            }
        }

        let (k, r) = (self.k, self.radius);
        let threshold = self.candidate_threshold;
        let candidates = &mut self.candidates;
        self.intensity.with_raw_mut(|out, ol| {
            for y in b..h - b {
                for x in b..w - b {
                    // Window in product coordinates (shifted by `lo`).
                    let (cx, cy) = (x - lo, y - lo);
                    let (mut a, mut c, mut bb) = (0.0f32, 0.0f32, 0.0f32);
                    for wy in cy - r..=cy + r {
                        let row = wy * rw;
                        for wx in cx - r..=cx + r {
                            a += ixx[row + wx];
                            c += iyy[row + wx];
                            bb += ixy[row + wx];
                        }
                    }
                    let det = a * c - bb * bb;
                    let trace = a + c;
                    let score = det - k * trace * trace;
                    out[ol.index(x, y, 0)] = score;
                    if threshold.map_or(false, |t| score > t) {
                        candidates.push(Candidate { x, y, score });
                    }
                }
            }
        })?;

        // Strongest corners first.
        self.candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
        Ok(())
    }

    fn intensity(&self) -> &Image<f32> {
        &self.intensity
    }

    fn candidates(&self) -> Option<&[Candidate]> {
        self.candidate_threshold.map(|_| self.candidates.as_slice())
    }

    fn requires_gradient(&self) -> bool {
        true
    }

    fn requires_hessian(&self) -> bool {
        false
    }

    fn has_candidates(&self) -> bool {
        self.candidate_threshold.is_some()
    }

    fn ignore_border(&self) -> usize {
        self.radius + self.inherited_border
    }
}
