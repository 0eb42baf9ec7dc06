use crate::data::peak::Peak;

/// Pairwise similarity between two peak sets, higher is more similar.
///
/// Implementations must be `Sync`: candidate samples are scored concurrently.
pub trait OverlapScorer: Sync {
    fn cumulative_overlap(&self, peaks_a: &[&Peak], peaks_b: &[&Peak]) -> f64;
}

impl<F> OverlapScorer for F
where
    F: Fn(&[&Peak], &[&Peak]) -> f64 + Sync,
{
    fn cumulative_overlap(&self, peaks_a: &[&Peak], peaks_b: &[&Peak]) -> f64 {
        self(peaks_a, peaks_b)
    }
}

/// Overlap integral of two 1D Gaussians with unit amplitude, up to a constant factor.
///
/// # Arguments
///
/// * `x_a`, `x_b` - centers
/// * `sigma_a`, `sigma_b` - standard deviations
///
/// # Returns
///
/// * `f64` - `exp(-0.5 * (x_a - x_b)^2 / (var_a + var_b)) / sqrt(var_a + var_b)`
///
#[inline]
pub fn gaussian_contribution(x_a: f64, x_b: f64, sigma_a: f64, sigma_b: f64) -> f64 {
    let var = sigma_a * sigma_a + sigma_b * sigma_b;
    if var <= 0.0 || !var.is_finite() {
        return 0.0;
    }
    let d = x_a - x_b;
    (-0.5 * d * d / var).exp() / var.sqrt()
}

#[inline]
fn disjoint(center_a: f64, sigma_a: f64, center_b: f64, sigma_b: f64, k: f64) -> bool {
    center_a + k * sigma_a < center_b - k * sigma_b || center_b + k * sigma_b < center_a - k * sigma_a
}

/// Gaussian overlap of two fitted peaks in the (corrected rt, mz) plane, scaled by both heights.
/// Peaks whose ±3σ boxes do not intersect score 0.
pub fn peak_overlap(peak_a: &Peak, peak_b: &Peak) -> f64 {
    let (rt_a, rt_b) = (peak_a.corrected_rt(), peak_b.corrected_rt());

    if disjoint(rt_a, peak_a.fitted_sigma_rt, rt_b, peak_b.fitted_sigma_rt, 3.0)
        || disjoint(peak_a.fitted_mz, peak_a.fitted_sigma_mz, peak_b.fitted_mz, peak_b.fitted_sigma_mz, 3.0)
    {
        return 0.0;
    }

    let rt_contrib = gaussian_contribution(rt_a, rt_b, peak_a.fitted_sigma_rt, peak_b.fitted_sigma_rt);
    let mz_contrib = gaussian_contribution(
        peak_a.fitted_mz,
        peak_b.fitted_mz,
        peak_a.fitted_sigma_mz,
        peak_b.fitted_sigma_mz,
    );

    rt_contrib * mz_contrib * peak_a.fitted_height * peak_b.fitted_height
}

/// Sum of `peak_overlap` over all pairs of the two peak sets.
#[derive(Clone, Copy, Debug, Default)]
pub struct GaussianOverlap;

impl OverlapScorer for GaussianOverlap {
    fn cumulative_overlap(&self, peaks_a: &[&Peak], peaks_b: &[&Peak]) -> f64 {
        let mut cumulative = 0.0;
        for peak_a in peaks_a {
            for peak_b in peaks_b {
                cumulative += peak_overlap(peak_a, peak_b);
            }
        }
        cumulative
    }
}
