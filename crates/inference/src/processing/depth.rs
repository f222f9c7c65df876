use super::colormap::magma;
use super::segmentation::Mask;
use common::span;
use image::RgbImage;
use ndarray::{Array2, ArrayView2};

/// Cubic convolution coefficient used by PyTorch's bicubic interpolation.
const CUBIC_A: f32 = -0.75;

/// Per-pixel relative depth at source-image resolution.
#[derive(Debug, Clone)]
pub struct DepthMap {
    /// `[height, width]`
    pub values: Array2<f32>,
}

impl DepthMap {
    pub fn new(values: Array2<f32>) -> Self {
        Self { values }
    }

    /// Upsample a raw model prediction to `height x width`.
    pub fn from_prediction(pred: ArrayView2<f32>, height: usize, width: usize) -> Self {
        let _s = span!("upsample_depth");
        Self {
            values: upsample_bicubic(pred, height, width),
        }
    }

    pub fn width(&self) -> usize {
        self.values.ncols()
    }

    pub fn height(&self) -> usize {
        self.values.nrows()
    }

    /// Mean depth under the mask's set pixels, `None` for an empty overlap.
    pub fn mean_over(&self, mask: &Mask) -> Option<f32> {
        let (h, w) = self.values.dim();
        let mut sum = 0.0f64;
        let mut count = 0usize;

        for (x, y) in mask.pixels() {
            if x < w && y < h {
                sum += self.values[[y, x]] as f64;
                count += 1;
            }
        }

        (count > 0).then(|| (sum / count as f64) as f32)
    }

    /// Min-max normalise to 0..=255 and render with the magma colormap.
    pub fn colorize(&self) -> RgbImage {
        let _s = span!("colorize_depth");

        let (min, max) = self
            .values
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), v| {
                (lo.min(*v), hi.max(*v))
            });
        let range = max - min;

        let (h, w) = self.values.dim();
        let mut image = RgbImage::new(w as u32, h as u32);

        for ((y, x), v) in self.values.indexed_iter() {
            let level = if range > f32::EPSILON {
                (((v - min) / range) * 255.0) as u8
            } else {
                0
            };
            image.put_pixel(x as u32, y as u32, image::Rgb(magma(level)));
        }

        image
    }
}

#[inline]
fn cubic_inner(x: f32) -> f32 {
    ((CUBIC_A + 2.0) * x - (CUBIC_A + 3.0)) * x * x + 1.0
}

#[inline]
fn cubic_outer(x: f32) -> f32 {
    ((CUBIC_A * x - 5.0 * CUBIC_A) * x + 8.0 * CUBIC_A) * x - 4.0 * CUBIC_A
}

/// Source taps and weights for each output position along one axis.
fn axis_taps(in_len: usize, out_len: usize) -> Vec<([usize; 4], [f32; 4])> {
    let ratio = in_len as f32 / out_len as f32;
    let last = in_len as isize - 1;

    (0..out_len)
        .map(|i| {
            let src = (i as f32 + 0.5) * ratio - 0.5;
            let base = src.floor();
            let t = src - base;
            let base = base as isize;

            let idx = [-1isize, 0, 1, 2].map(|o| (base + o).clamp(0, last) as usize);
            let weights = [
                cubic_outer(t + 1.0),
                cubic_inner(t),
                cubic_inner(1.0 - t),
                cubic_outer(2.0 - t),
            ];
            (idx, weights)
        })
        .collect()
}

/// Separable bicubic resize (align_corners = false, borders clamped).
pub fn upsample_bicubic(src: ArrayView2<f32>, out_h: usize, out_w: usize) -> Array2<f32> {
    let (in_h, in_w) = src.dim();
    if in_h == 0 || in_w == 0 || out_h == 0 || out_w == 0 {
        return Array2::zeros((out_h, out_w));
    }

    let x_taps = axis_taps(in_w, out_w);
    let y_taps = axis_taps(in_h, out_h);

    let mut horizontal = Array2::<f32>::zeros((in_h, out_w));
    for y in 0..in_h {
        let row = src.row(y);
        for (x, (idx, w)) in x_taps.iter().enumerate() {
            horizontal[[y, x]] =
                row[idx[0]] * w[0] + row[idx[1]] * w[1] + row[idx[2]] * w[2] + row[idx[3]] * w[3];
        }
    }

    let mut out = Array2::<f32>::zeros((out_h, out_w));
    for (y, (idx, w)) in y_taps.iter().enumerate() {
        let r0 = horizontal.row(idx[0]);
        let r1 = horizontal.row(idx[1]);
        let r2 = horizontal.row(idx[2]);
        let r3 = horizontal.row(idx[3]);
        let mut out_row = out.row_mut(y);
        for x in 0..out_w {
            out_row[x] = r0[x] * w[0] + r1[x] * w[1] + r2[x] * w[2] + r3[x] * w[3];
        }
    }

    out
}
