use crate::interpolator::Interpolator;
use crate::volume::Volume;

use super::grid::PolarGrid;

use ndarray::{Array2, Array3, Axis, concatenate, s};

/// Cubic resampling of `volume` at the grid positions, 0 outside.
pub fn sample_polar(volume: &Volume, grid: &PolarGrid) -> Array3<f64> {
    Interpolator::map_coordinates_3d(&volume.data.view(), &grid.z.view(), &grid.y.view(), &grid.x.view())
}

/// Maximum along the radius, the wall part stretched to three times the
/// `n_apex` apex layers, normalized to a maximum of 1.
///
/// The result has `4 * n_apex` rows, apex first.
pub fn collapse_radial(polar_rep: &Array3<f64>, n_apex: usize) -> Array2<f64> {
    let (_, _, n_azimuth) = polar_rep.dim();
    let maxima = polar_rep.map_axis(Axis(1), |lane| {
        lane.iter().copied().fold(f64::NEG_INFINITY, f64::max)
    });

    let n_apex = n_apex.min(maxima.nrows());
    let apex = maxima.slice(s![..n_apex, ..]);
    let wall = Interpolator::resize_rows(&maxima.slice(s![n_apex.., ..]), 3 * n_apex);

    let mut activities = concatenate(Axis(0), &[apex, wall.view()])
        .unwrap_or_else(|_| Array2::zeros((4 * n_apex, n_azimuth)));

    let max = activities.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if max > 0.0 {
        activities.mapv_inplace(|v| v / max);
    }
    activities
}
