// derivative.rs -- First-order image derivatives behind the `DerivativeXY` seam.
//
// Both filters here are separable 3×3 kernels:
//
//   ThreeDerivative:  row [-1, 0, 1] along x, col [0, 1, 0]  (no smoothing)
//   SobelDerivative:  row [-1, 0, 1] along x, col [1, 2, 1]  (smoothing)
//
// and the transposed pair for y. Neither pads or clamps at the border.
// Every pixel within `border()` of an edge is left exactly as the caller
// had it, so the kernel runs over the interior only and reads the raw
// strided buffer with no per-pixel contract checks.
//
// Each band is differentiated on its own; the output images must have the
// input's size and band count.

use crate::error::{ImageError, Result};
use crate::image::{Image, Pixel};

const CENTRAL_DIFF: [f32; 3] = [-1.0, 0.0, 1.0];
const IDENTITY: [f32; 3] = [0.0, 1.0, 0.0];
const SOBEL_SMOOTH: [f32; 3] = [1.0, 2.0, 1.0];

/// Computes the x and y derivatives of an image.
///
/// Implementations declare a border margin: rows and columns within
/// `border()` of any edge are never written.
pub trait DerivativeXY<I: Pixel, D: Pixel> {
    fn process(&self, input: &Image<I>, deriv_x: &mut Image<D>, deriv_y: &mut Image<D>) -> Result<()>;

    fn border(&self) -> usize;
}

/// Central difference: `dx = I(x+1, y) - I(x-1, y)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreeDerivative;

/// Sobel operator, unnormalized (roughly ±1020 for u8 input).
#[derive(Debug, Clone, Copy, Default)]
pub struct SobelDerivative;

impl<I: Pixel, D: Pixel> DerivativeXY<I, D> for ThreeDerivative {
    fn process(&self, input: &Image<I>, deriv_x: &mut Image<D>, deriv_y: &mut Image<D>) -> Result<()> {
        convolve_interior(input, deriv_x, &CENTRAL_DIFF, &IDENTITY)?;
        convolve_interior(input, deriv_y, &IDENTITY, &CENTRAL_DIFF)
    }

    fn border(&self) -> usize {
        1
    }
}

impl<I: Pixel, D: Pixel> DerivativeXY<I, D> for SobelDerivative {
    fn process(&self, input: &Image<I>, deriv_x: &mut Image<D>, deriv_y: &mut Image<D>) -> Result<()> {
        // Sobel_x: derivative along rows, smooth along columns.
        convolve_interior(input, deriv_x, &CENTRAL_DIFF, &SOBEL_SMOOTH)?;
        convolve_interior(input, deriv_y, &SOBEL_SMOOTH, &CENTRAL_DIFF)
    }

    fn border(&self) -> usize {
        1
    }
}

/// Second-order derivatives from first-order ones.
///
/// `dxx` and `dxy` are the x and y derivatives of `deriv_x`; `dyy` is the y
/// derivative of `deriv_y`. Each pass adds `deriv.border()`, so the valid
/// hessian interior is `2 * deriv.border()` away from the edges.
pub fn hessian<D, F>(
    deriv: &F,
    deriv_x: &Image<D>,
    deriv_y: &Image<D>,
    dxx: &mut Image<D>,
    dyy: &mut Image<D>,
    dxy: &mut Image<D>,
) -> Result<()>
where
    D: Pixel,
    F: DerivativeXY<D, D>,
{
    deriv_x.check_same_size(deriv_y)?;
    deriv.process(deriv_x, dxx, dxy)?;
    // d/dx of deriv_y duplicates dxy; it goes to scratch.
    let mut scratch = deriv_y.create_like(deriv_y.width(), deriv_y.height())?;
    deriv.process(deriv_y, &mut scratch, dyy)
}

/// Apply the separable 3×3 kernel `col ⊗ row` to the interior of `input`.
fn convolve_interior<I: Pixel, D: Pixel>(
    input: &Image<I>,
    output: &mut Image<D>,
    row: &[f32; 3],
    col: &[f32; 3],
) -> Result<()> {
    input.check_same_size(output)?;
    if input.num_bands() != output.num_bands() {
        return Err(ImageError::ShapeMismatch {
            expected: input.num_bands(),
            found: output.num_bands(),
        });
    }
    let (w, h) = (input.width(), input.height());
    if w < 3 || h < 3 {
        return Ok(());
    }

    let src = input.read_raw()?;
    let sl = src.layout();
    output.with_raw_mut(|dst, dl| {
        for y in 1..h - 1 {
            for x in 1..w - 1 {
                for band in 0..sl.num_bands {
                    let mut acc = 0.0f32;
                    for (j, &cv) in col.iter().enumerate() {
                        if cv == 0.0 {
                            continue;
                        }
                        let sy = y + j - 1;
                        let mut row_acc = 0.0f32;
                        for (i, &rv) in row.iter().enumerate() {
                            row_acc += rv * src.at(x + i - 1, sy, band).to_f32();
                        }
                        acc += cv * row_acc;
                    }
                    dst[dl.index(x, y, band)] = D::from_f32(acc);
                }
            }
        }
    })
}
