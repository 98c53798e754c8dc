//! Polar sampling of a short-axis volume and the 17-segment polar map.
//!
//! The pipeline runs in four steps:
//!
//!  1. [`build_polar_grid`] places sample positions on a spherical cap around
//!     the apex and on cylindrical shells along the wall
//!  2. [`sample_polar`] resamples the volume there (cubic spline, zero
//!     outside), giving a `[depth, radius, azimuth]` representation
//!  3. [`weight_polar_rep`] optionally attenuates radii far from the
//!     myocardial peak, then [`collapse_radial`] keeps the maximum along the
//!     radius and fixes the apex:wall ratio to 1:3
//!  4. [`polar_map_image`] projects the `[depth, azimuth]` activities onto a
//!     bullseye and [`SegmentScores`] summarizes them per segment
//!
//! Steps 1 to 3 are bundled as [`compute_radial_activities`], a pure function
//! over owned data that can run on a worker thread.

mod activity;
mod grid;
mod map;
mod segment;
mod settings;
mod state;
mod weighting;
mod worker;

pub use activity::{collapse_radial, sample_polar};
pub use grid::{PolarGrid, PolarGridParams, arange, build_cartesian_grid, build_polar_grid};
pub use map::{PolarMapOptions, draw_segments_grid, polar_map_image};
pub use segment::{
    Location, SEGMENTS, Segment, SegmentScores, polar_to_cartesian, segment_center, segment_mask,
    segment_score, segment_vertices,
};
pub use settings::{SamplingSettings, SamplingState};
pub use state::{PolarMapState, ScoreLabel};
pub use weighting::weight_polar_rep;
pub use worker::{PolarJob, PolarWorker};

use crate::volume::Volume;

use log::debug;
use ndarray::Array2;
use web_time::Instant;

/// Parameters of the confidence weighting.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Weighting {
    /// Size of one radius step in mm.
    pub pixel_size_mm: f64,
    /// Window edge width in mm.
    pub sigma: f64,
}

/// Sample positions in grid-index units and radians.
#[derive(Clone, Debug, PartialEq)]
pub struct PolarSampling {
    pub radii: Vec<f64>,
    pub azimuth_angles: Vec<f64>,
    pub polar_angles: Vec<f64>,
    pub weighting: Option<Weighting>,
}

/// `[4k, azimuth]` activities in `[0, 1]` of a short-axis volume, `k` being
/// the number of polar angles.
pub fn compute_radial_activities(
    short_axis: &Volume,
    sampling: &PolarSampling,
    params: &PolarGridParams,
) -> Array2<f64> {
    let n_apex = sampling.polar_angles.len();
    if short_axis.is_blank() {
        return Array2::zeros((4 * n_apex, sampling.azimuth_angles.len()));
    }
    let started = Instant::now();

    let grid = build_polar_grid(
        short_axis.dim(),
        &sampling.radii,
        &sampling.azimuth_angles,
        &sampling.polar_angles,
        params,
    );
    let mut polar_rep = sample_polar(short_axis, &grid);
    if let Some(weighting) = sampling.weighting {
        polar_rep = weight_polar_rep(&polar_rep, weighting.pixel_size_mm, weighting.sigma);
    }
    let activities = collapse_radial(&polar_rep, n_apex);

    debug!(
        "sampled {:?} polar representation in {:.1}ms",
        polar_rep.dim(),
        started.elapsed().as_secs_f64() * 1e3
    );
    activities
}
