//! Windowed structural similarity.
//!
//! Uniform `window x window` filter, `K1 = 0.01`, `K2 = 0.03` and
//! sample-covariance normalisation. The score is the mean over every window
//! lying fully inside the image. Window sums come from summed-area tables so
//! the cost is independent of the window size.

use crate::error::MetricError;

const K1: f64 = 0.01;
const K2: f64 = 0.03;

/// Default window edge length
pub const DEFAULT_WINDOW: usize = 7;

/// Summed-area table with a zero top row and left column
struct Integral {
    stride: usize,
    sums: Vec<f64>,
}

impl Integral {
    fn build(width: usize, height: usize, value: impl Fn(usize) -> f64) -> Self {
        let stride = width + 1;
        let mut sums = vec![0.0; stride * (height + 1)];

        for y in 0..height {
            let mut row_sum = 0.0;
            for x in 0..width {
                row_sum += value(y * width + x);
                sums[(y + 1) * stride + x + 1] = sums[y * stride + x + 1] + row_sum;
            }
        }

        Self { stride, sums }
    }

    /// Sum over `[x, x + size) x [y, y + size)`
    fn window(&self, x: usize, y: usize, size: usize) -> f64 {
        let s = self.stride;
        self.sums[(y + size) * s + x + size] - self.sums[y * s + x + size] - self.sums[(y + size) * s + x]
            + self.sums[y * s + x]
    }
}

/// Mean SSIM of two equally sized row-major images
pub fn mean_ssim(
    a: &[f64],
    b: &[f64],
    width: usize,
    height: usize,
    window: usize,
    data_range: f64,
) -> Result<f64, MetricError> {
    if window < 2 || window > width || window > height {
        return Err(MetricError::TooSmall {
            height,
            width,
            window,
        });
    }
    if !(data_range > 0.0) {
        return Err(MetricError::ZeroRange);
    }

    let c1 = (K1 * data_range).powi(2);
    let c2 = (K2 * data_range).powi(2);
    let np = (window * window) as f64;
    let cov_norm = np / (np - 1.0);

    let sum_a = Integral::build(width, height, |i| a[i]);
    let sum_b = Integral::build(width, height, |i| b[i]);
    let sum_aa = Integral::build(width, height, |i| a[i] * a[i]);
    let sum_bb = Integral::build(width, height, |i| b[i] * b[i]);
    let sum_ab = Integral::build(width, height, |i| a[i] * b[i]);

    let mut total = 0.0;
    let mut count = 0usize;

    for y in 0..=height - window {
        for x in 0..=width - window {
            let ux = sum_a.window(x, y, window) / np;
            let uy = sum_b.window(x, y, window) / np;
            let uxx = sum_aa.window(x, y, window) / np;
            let uyy = sum_bb.window(x, y, window) / np;
            let uxy = sum_ab.window(x, y, window) / np;

            let vx = cov_norm * (uxx - ux * ux);
            let vy = cov_norm * (uyy - uy * uy);
            let vxy = cov_norm * (uxy - ux * uy);

            let numerator = (2.0 * ux * uy + c1) * (2.0 * vxy + c2);
            let denominator = (ux * ux + uy * uy + c1) * (vx + vy + c2);

            total += numerator / denominator;
            count += 1;
        }
    }

    let mean = total / count as f64;
    if !mean.is_finite() {
        return Err(MetricError::NonFinite { metric: "ssim" });
    }
    Ok(mean)
}
