use ndarray::{Array2, ArrayView1, ArrayViewMut1, Zip};

use crate::foundation::{
    core::Plane,
    error::{MosculpError, MosculpResult},
};

/// Kernel support in standard deviations.
const TRUNCATE: f32 = 4.0;

/// Separable Gaussian blur of a weight plane with mirror-reflected borders.
///
/// The kernel radius is `floor(4 * sigma + 0.5)`; a zero radius returns the input unchanged.
pub fn gaussian_blur(src: &Plane, sigma: f32) -> MosculpResult<Plane> {
    let kernel = gaussian_kernel(sigma)?;
    if kernel.len() == 1 {
        return Ok(src.clone());
    }

    let mut tmp = Array2::<f32>::zeros(src.raw_dim());
    Zip::from(tmp.rows_mut())
        .and(src.rows())
        .par_for_each(|dst, row| convolve_lane(row, dst, &kernel));

    let mut out = Array2::<f32>::zeros(src.raw_dim());
    Zip::from(out.columns_mut())
        .and(tmp.columns())
        .par_for_each(|dst, col| convolve_lane(col, dst, &kernel));
    Ok(out)
}

/// Normalized kernel of odd length `2 * radius + 1`.
pub fn gaussian_kernel(sigma: f32) -> MosculpResult<Vec<f32>> {
    if !sigma.is_finite() || sigma <= 0.0 {
        return Err(MosculpError::invalid_request("blur sigma must be finite and > 0"));
    }
    let radius = (TRUNCATE * sigma + 0.5) as i32;
    let denom = 2.0 * f64::from(sigma) * f64::from(sigma);
    let weights: Vec<f64> = (-radius..=radius)
        .map(|i| {
            let x = f64::from(i);
            (-x * x / denom).exp()
        })
        .collect();
    let sum: f64 = weights.iter().sum();
    Ok(weights.into_iter().map(|w| (w / sum) as f32).collect())
}

fn convolve_lane(src: ArrayView1<'_, f32>, mut dst: ArrayViewMut1<'_, f32>, kernel: &[f32]) {
    let n = src.len();
    let radius = (kernel.len() / 2) as isize;
    for (x, out) in dst.iter_mut().enumerate() {
        let mut acc = 0.0f32;
        for (ki, &kw) in kernel.iter().enumerate() {
            let sx = reflect(x as isize + ki as isize - radius, n);
            acc += kw * src[sx];
        }
        *out = acc;
    }
}

/// Half-sample symmetric reflection (`d c b a | a b c d | d c b a`).
fn reflect(i: isize, n: usize) -> usize {
    let period = 2 * n as isize;
    let m = i.rem_euclid(period);
    if m < n as isize {
        m as usize
    } else {
        (period - 1 - m) as usize
    }
}

#[cfg(test)]
#[path = "../../tests/unit/composite/blur.rs"]
mod tests;
