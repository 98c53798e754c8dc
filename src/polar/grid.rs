use std::f64::consts::{FRAC_PI_2, PI, TAU};

use ndarray::{Array2, Array3};
use serde::{Deserialize, Serialize};

/// Placement of the apex/wall boundary and the extent of the cylindrical
/// wall region in a short-axis volume.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolarGridParams {
    /// First slice of the cylindrical region; slices above it hold the apex.
    pub center_z: usize,
    /// Cylindrical layers on the septal side (azimuth 180°).
    pub n_septal: usize,
    /// Cylindrical layers on the lateral side (azimuth 0°).
    pub n_lateral: usize,
}

impl PolarGridParams {
    /// Boundary at half depth, wall sampled down to the last slice on both
    /// sides.
    pub fn for_depth(depth: usize) -> Self {
        let center_z = depth / 2;
        let n_lateral = depth - center_z;
        Self {
            center_z,
            n_septal: n_lateral,
            n_lateral,
        }
    }
}

/// Fractional `(z, y, x)` sample positions, each `[depth, radius, azimuth]`.
#[derive(Clone, Debug, PartialEq)]
pub struct PolarGrid {
    pub z: Array3<f64>,
    pub y: Array3<f64>,
    pub x: Array3<f64>,
}

impl PolarGrid {
    pub fn dim(&self) -> (usize, usize, usize) {
        self.z.dim()
    }
}

/// `start, start + step, ...` below `stop`.
pub fn arange(start: f64, stop: f64, step: f64) -> Vec<f64> {
    if step <= 0.0 || stop <= start {
        return Vec::new();
    }
    let count = ((stop - start) / step).ceil() as usize;
    (0..count).map(|i| start + i as f64 * step).collect()
}

/// Sampling grid over a short-axis volume of `shape` (`[z, y, x]`).
///
/// The first `polar_angles.len()` layers sample a spherical cap around
/// `(center_z, shape.y / 2, shape.x / 2)`: polar angle `θ` (measured from the
/// transverse plane) moves the layer up by `cos θ · r` and shrinks its radius
/// to `sin θ · r`. The remaining `n_lateral` layers are cylindrical shells
/// below `center_z`; the z step of every shell is scaled per azimuth between
/// `(n_septal - 1) / (n_lateral - 1)` at 180° and 1 at 0°.
///
/// Azimuth angles are rotated by -90° so that index 0 samples 12 o'clock.
pub fn build_polar_grid(
    shape: (usize, usize, usize),
    radii: &[f64],
    azimuth_angles: &[f64],
    polar_angles: &[f64],
    params: &PolarGridParams,
) -> PolarGrid {
    let (_, height, width) = shape;
    let center_z = params.center_z as f64;
    let center_y = (height / 2) as f64;
    let center_x = (width / 2) as f64;

    let azimuth: Vec<f64> = azimuth_angles
        .iter()
        .map(|a| (a - FRAC_PI_2).rem_euclid(TAU))
        .collect();
    let (sin_az, cos_az): (Vec<f64>, Vec<f64>) = azimuth.iter().map(|a| a.sin_cos()).unzip();

    let w_min = if params.n_lateral > 1 {
        (params.n_septal as f64 - 1.0) / (params.n_lateral as f64 - 1.0)
    } else {
        1.0
    };
    let z_weights: Vec<f64> = azimuth
        .iter()
        .map(|a| (PI - a).abs() / PI * (1.0 - w_min) + w_min)
        .collect();

    let n_apex = polar_angles.len();
    let grid_shape = (n_apex + params.n_lateral, radii.len(), azimuth.len());

    let z = Array3::from_shape_fn(grid_shape, |(k, r, a)| match polar_angles.get(k) {
        Some(theta) => center_z - theta.cos() * radii[r],
        None => center_z + (k - n_apex) as f64 * z_weights[a],
    });
    let in_plane = |k: usize, r: usize| match polar_angles.get(k) {
        Some(theta) => radii[r] * theta.sin(),
        None => radii[r],
    };
    let y = Array3::from_shape_fn(grid_shape, |(k, r, a)| center_y + in_plane(k, r) * sin_az[a]);
    let x = Array3::from_shape_fn(grid_shape, |(k, r, a)| center_x + in_plane(k, r) * cos_az[a]);

    PolarGrid { z, y, x }
}

/// `(y, x)` positions in a `[radius, azimuth]` image for an
/// `n_samples x n_samples` bullseye.
///
/// Distance from the image center maps linearly onto `[0, rows - 1]`, the
/// angle (clockwise from 12 o'clock) onto `[0, cols - 1]`.
pub fn build_cartesian_grid(
    polar_shape: (usize, usize),
    n_samples: usize,
) -> (Array2<f64>, Array2<f64>) {
    let max_radius = polar_shape.0.saturating_sub(1) as f64;
    let max_angle = polar_shape.1.saturating_sub(1) as f64;
    let center = (n_samples as f64 - 1.0) / 2.0;

    let grid_y = Array2::from_shape_fn((n_samples, n_samples), |(row, col)| {
        let (dy, dx) = (col as f64 - center, row as f64 - center);
        max_radius * dy.hypot(dx) / center
    });
    let grid_x = Array2::from_shape_fn((n_samples, n_samples), |(row, col)| {
        let (dy, dx) = (col as f64 - center, row as f64 - center);
        max_angle * (PI - dy.atan2(dx)) / TAU
    });
    (grid_y, grid_x)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn arange_matches_half_open_range() {
        assert_eq!(arange(0.0, 2.0, 0.5), vec![0.0, 0.5, 1.0, 1.5]);
        assert_eq!(arange(0.0, 90.0, 15.0).len(), 6);
        assert_eq!(arange(0.0, 90.0, 9.0 - 0.001).len(), 11);
        assert!(arange(1.0, 1.0, 0.1).is_empty());
    }

    #[test]
    fn depth_is_apex_plus_lateral() {
        let radii = arange(0.0, 16.0, 1.0);
        let azimuth: Vec<f64> = arange(0.0, 360.0, 10.0).iter().map(|d| d.to_radians()).collect();
        for (k, n_lateral) in [(1, 1), (6, 12), (10, 3)] {
            let polar: Vec<f64> = (0..k).map(|i| (i as f64 * 8.0).to_radians()).collect();
            let params = PolarGridParams {
                center_z: 16,
                n_septal: n_lateral,
                n_lateral,
            };
            let grid = build_polar_grid((32, 32, 32), &radii, &azimuth, &polar, &params);
            assert_eq!(grid.dim(), (k + n_lateral, 16, 36));
            assert_eq!(grid.y.dim(), grid.dim());
            assert_eq!(grid.x.dim(), grid.dim());
        }
    }

    #[test]
    fn first_azimuth_samples_twelve_o_clock() {
        let params = PolarGridParams::for_depth(32);
        let grid = build_polar_grid((32, 32, 32), &[0.0, 10.0], &[0.0], &[0.0], &params);
        // cylindrical layer, radius 10, azimuth 0 points to -y
        assert_abs_diff_eq!(grid.y[[1, 1, 0]], 6.0, epsilon = 1e-9);
        assert_abs_diff_eq!(grid.x[[1, 1, 0]], 16.0, epsilon = 1e-9);
        // apex layer at polar angle 0 collapses onto the long axis
        assert_abs_diff_eq!(grid.z[[0, 1, 0]], 6.0, epsilon = 1e-9);
        assert_abs_diff_eq!(grid.x[[0, 1, 0]], 16.0, epsilon = 1e-9);
    }

    #[test]
    fn septal_side_is_compressed() {
        let params = PolarGridParams {
            center_z: 10,
            n_septal: 5,
            n_lateral: 9,
        };
        let azimuth = [90f64.to_radians(), 270f64.to_radians()];
        let grid = build_polar_grid((32, 32, 32), &[1.0], &azimuth, &[], &params);
        // rotated azimuth 0 (lateral) keeps unit steps, 180 (septal) is halved
        assert_abs_diff_eq!(grid.z[[8, 0, 0]], 18.0, epsilon = 1e-9);
        assert_abs_diff_eq!(grid.z[[8, 0, 1]], 14.0, epsilon = 1e-9);
    }

    #[test]
    fn cartesian_grid_geometry() {
        let (y, x) = build_cartesian_grid((11, 37), 5);
        assert_eq!(y.dim(), (5, 5));
        assert_abs_diff_eq!(y[[2, 2]], 0.0);
        assert_abs_diff_eq!(y[[2, 0]], 10.0, epsilon = 1e-12);
        // straight up is angle 0, straight right is a quarter turn
        assert_abs_diff_eq!(x[[0, 2]], 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(x[[2, 4]], 9.0, epsilon = 1e-12);
        assert_abs_diff_eq!(x[[4, 2]], 18.0, epsilon = 1e-12);
    }
}
