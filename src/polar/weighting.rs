//! Confidence weighting of a polar representation along the radius.
//!
//! Every depth layer is multiplied by a smooth window around the radius of
//! its averaged activity peak. Layers whose peak is implausibly wide, or far
//! from the activity-weighted consensus radius of all layers, use the
//! consensus radius and median width instead. This suppresses extra-cardiac
//! maxima (liver, gut) and poorly perfused layers picking up noise.

use ndarray::{Array1, Array3, Axis};

/// Weighted copy of `polar_rep` (`[depth, radius, azimuth]`).
///
/// `pixel_size_mm` is the size of one radius step, `sigma` the window edge
/// width in mm. An all-zero representation is returned unchanged.
pub fn weight_polar_rep(polar_rep: &Array3<f64>, pixel_size_mm: f64, sigma: f64) -> Array3<f64> {
    let mut weighted = polar_rep.clone();
    let (depth, n_radii, n_azimuth) = polar_rep.dim();
    if depth == 0 || n_radii == 0 || n_azimuth == 0 {
        return weighted;
    }
    let overall_max = polar_rep.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if overall_max == 0.0 || overall_max.is_nan() {
        return weighted;
    }

    // [depth, radius]
    let profiles = polar_rep.map_axis(Axis(2), |lane| lane.sum() / n_azimuth as f64);
    let peaks: Vec<(usize, f64)> = profiles.outer_iter().map(|p| argmax(&p.to_owned())).collect();
    let max_vals: Vec<f64> = peaks.iter().map(|&(_, v)| v).collect();
    let max_positions: Vec<f64> = peaks.iter().map(|&(p, _)| p as f64).collect();

    let total: f64 = max_vals.iter().sum();
    if total <= 0.0 {
        return weighted;
    }
    let consensus = (max_vals
        .iter()
        .zip(&max_positions)
        .map(|(v, p)| v * p)
        .sum::<f64>()
        / total)
        .round_ties_even();

    let hwhm: Vec<f64> = profiles
        .outer_iter()
        .zip(&peaks)
        .map(|(profile, &(peak, _))| half_width(&profile.to_owned(), peak) as f64)
        .collect();
    let median_hwhm = median(&hwhm);
    let std_hwhm = std_dev(&hwhm);
    let value_mean = total / depth as f64;
    let s = sigma * pixel_size_mm;

    for (layer, mut slab) in weighted.outer_iter_mut().enumerate() {
        let outlier = hwhm[layer] > median_hwhm + 1.5 * std_hwhm
            || (max_positions[layer] - consensus).abs() > median_hwhm;
        let (center, width) = if outlier {
            (consensus, median_hwhm)
        } else {
            (max_positions[layer], hwhm[layer])
        };

        let lo = (center - 1.5 * width).round_ties_even().max(0.0) as usize;
        let hi = ((center + 1.5 * width).round_ties_even().max(0.0) as usize).min(n_radii);
        if lo >= hi {
            continue;
        }
        let band = slab.slice(ndarray::s![lo..hi, ..]);
        let band_max = band.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if band_max == 0.0 {
            continue;
        }
        let band_avg = band.mean().unwrap_or(0.0);

        let offset = width * (band_avg / value_mean).max(0.0).sqrt();
        let (mu_min, mu_max) = (center - offset, center + offset);
        let window = Array1::from_shape_fn(n_radii, |r| {
            let r = r as f64;
            sigmoid((r - mu_min) / s) + sigmoid((mu_max - r) / s) - 1.0
        });

        for (mut row, w) in slab.outer_iter_mut().zip(window.iter()) {
            row *= *w;
        }
    }
    weighted
}

fn sigmoid(v: f64) -> f64 {
    1.0 / (1.0 + (-v).exp())
}

/// First position of the maximum and the maximum.
fn argmax(values: &Array1<f64>) -> (usize, f64) {
    values
        .iter()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |best, (i, &v)| if v > best.1 { (i, v) } else { best })
}

/// Half the length of the run of above-mean values containing `peak`.
fn half_width(profile: &Array1<f64>, peak: usize) -> usize {
    let mean = profile.mean().unwrap_or(0.0);
    let above = |i: usize| profile[i] - mean > 0.0;

    let mut lo = peak;
    while lo > 0 && above(lo - 1) {
        lo -= 1;
    }
    let mut hi = peak;
    while hi + 1 < profile.len() && above(hi + 1) {
        hi += 1;
    }
    (hi - lo) / 2
}

fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let n = sorted.len();
    match n {
        0 => 0.0,
        _ if n % 2 == 1 => sorted[n / 2],
        _ => 0.5 * (sorted[n / 2 - 1] + sorted[n / 2]),
    }
}

fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    /// Ring of activity at `radius` in every layer.
    fn ring(depth: usize, n_radii: usize, radius: usize) -> Array3<f64> {
        Array3::from_shape_fn((depth, n_radii, 8), |(_, r, _)| {
            let d = r as f64 - radius as f64;
            (-d * d / 4.0).exp()
        })
    }

    #[test]
    fn zero_representation_is_untouched() {
        let zeros = Array3::zeros((3, 10, 4));
        assert_eq!(weight_polar_rep(&zeros, 1.0, 3.0), zeros);
    }

    #[test]
    fn peak_survives_and_far_radii_are_suppressed() {
        let rep = ring(4, 40, 12);
        let weighted = weight_polar_rep(&rep, 1.0, 1.0);
        for layer in 0..4 {
            assert!(weighted[[layer, 12, 0]] > 0.5 * rep[[layer, 12, 0]]);
            assert!(weighted[[layer, 35, 0]].abs() < 1e-3);
        }
        assert_eq!(weighted.dim(), rep.dim());
    }

    #[test]
    fn misplaced_layer_falls_back_to_consensus() {
        let mut rep = ring(9, 40, 12);
        // last layer peaks far outside
        for r in 0..40 {
            for a in 0..8 {
                let d = r as f64 - 32.0;
                rep[[8, r, a]] = (-d * d / 4.0).exp();
            }
        }
        let weighted = weight_polar_rep(&rep, 1.0, 1.0);
        assert!(weighted[[8, 32, 0]] < 0.1);
        assert!(weighted[[0, 12, 0]] > 0.5);
        assert_abs_diff_eq!(weighted[[0, 30, 0]], 0.0, epsilon = 1e-3);
    }

    #[test]
    fn helpers() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&[4.0, 1.0, 2.0, 3.0]), 2.5);
        assert_abs_diff_eq!(std_dev(&[1.0, 3.0]), 1.0);
        let profile = Array1::from_vec(vec![0.0, 1.0, 3.0, 4.0, 3.0, 0.0, 0.0, 0.0]);
        assert_eq!(half_width(&profile, 3), 1);
        assert_eq!(argmax(&profile), (3, 4.0));
    }
}
