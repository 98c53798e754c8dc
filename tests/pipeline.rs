mod common;

use approx::assert_abs_diff_eq;
use ndarray::Array2;
use spect_reorient::colormap::ColorMap;
use spect_reorient::polar::{
    PolarGridParams, PolarMapOptions, PolarSampling, SEGMENTS, SegmentScores, arange,
    build_polar_grid, compute_radial_activities, polar_map_image, sample_polar, segment_mask,
};
use spect_reorient::reorientation::{EulerAngles, reorient, short_axis};

fn sampling() -> PolarSampling {
    PolarSampling {
        radii: arange(0.0, 32.0, 1.0),
        azimuth_angles: arange(0.0, 360.0, 10.0).iter().map(|d| d.to_radians()).collect(),
        polar_angles: arange(0.0, 90.0, 15.0).iter().map(|d| d.to_radians()).collect(),
        weighting: None,
    }
}

#[test]
fn zero_parameters_keep_the_volume() {
    common::init_logging();
    let volume = common::shell(24, [11.0, 12.0, 13.0], 5.0);
    let center = volume.geometric_center().map(|c| c as f64);
    let reoriented = reorient(&volume, &EulerAngles::default(), &center);
    for (a, b) in reoriented.data.iter().zip(volume.data.iter()) {
        assert_abs_diff_eq!(*a, *b, epsilon = 1e-6);
    }
}

#[test]
fn zero_volume_gives_black_map_and_zero_scores() {
    common::init_logging();
    let volume = common::zeros(64, 4.0);
    let reoriented = reorient(&volume, &EulerAngles::default(), &[32.0; 3]);
    assert_eq!(reoriented.size(), [64; 3]);
    assert_eq!(reoriented.spacing, volume.spacing);
    assert!(reoriented.is_blank());

    let short_axis = short_axis(&reoriented);
    let sampling = sampling();
    assert_eq!(sampling.polar_angles.len(), 6);

    let activities =
        compute_radial_activities(&short_axis, &sampling, &PolarGridParams::for_depth(64));
    assert_eq!(activities.dim(), (24, 36));
    assert!(activities.iter().all(|&v| v == 0.0));

    let options = PolarMapOptions {
        n_samples: 64,
        output_size: 128,
        draw_segments: false,
    };
    let image = polar_map_image(&activities.view(), &options, &ColorMap::inferno());
    assert_eq!(image.dimensions(), (128, 128));
    assert!(image.pixels().all(|p| p.0 == [0, 0, 0]));
    assert_eq!(SegmentScores::compute(&activities.view()), SegmentScores::default());
}

#[test]
fn shell_lights_up_apex_but_not_base() {
    common::init_logging();
    let short_axis = common::shell(64, [32.0, 32.0, 32.0], 10.0);
    let activities =
        compute_radial_activities(&short_axis, &sampling(), &PolarGridParams::for_depth(64));
    assert_eq!(activities.dim(), (24, 36));

    let max = activities.iter().copied().fold(f64::MIN, f64::max);
    assert_abs_diff_eq!(max, 1.0, epsilon = 1e-12);
    assert!(activities.iter().all(|&v| v <= 1.0));

    // the first polar angle samples the axis for every azimuth
    let top = activities.row(0);
    assert!(top.iter().all(|&v| (v - top[0]).abs() < 1e-9));
    assert!(top[0] > 0.8);

    let scores = SegmentScores::compute(&activities.view());
    assert!(scores.get(17).unwrap() > 50);
    for id in 1..=6 {
        assert_eq!(scores.get(id), Some(0), "basal segment {id}");
    }
}

#[test]
fn solid_sphere_scores_are_rotationally_even() {
    common::init_logging();
    let short_axis = short_axis(&common::sphere(64, 10.0));
    let sampling = sampling();
    let params = PolarGridParams::for_depth(64);

    // every apex ray leaves the ball near radius bin 10 / step, whatever the azimuth
    let grid = build_polar_grid(
        short_axis.dim(),
        &sampling.radii,
        &sampling.azimuth_angles,
        &sampling.polar_angles,
        &params,
    );
    let polar_rep = sample_polar(&short_axis, &grid);
    for layer in 0..sampling.polar_angles.len() {
        for azimuth in 0..sampling.azimuth_angles.len() {
            let ray = polar_rep.slice(ndarray::s![layer, .., azimuth]);
            let edge = ray.iter().rposition(|&v| v > 0.5).unwrap();
            assert!((9..=11).contains(&edge), "layer {layer}, azimuth {azimuth}: {edge}");
            assert!(ray.iter().take(8).all(|&v| v > 0.9));
            assert!(ray.iter().skip(13).all(|&v| v.abs() < 0.1));
        }
    }

    let activities = compute_radial_activities(&short_axis, &sampling, &params);

    // the apex layers all pass through the center of the ball
    for row in activities.rows().into_iter().take(6) {
        assert!(row.iter().all(|&v| v > 0.8));
    }

    let scores = SegmentScores::compute(&activities.view());
    assert!(scores.get(17).unwrap() >= 80);
    for tier in [1..=6, 7..=12, 13..=16] {
        let tier: Vec<u8> = tier.filter_map(|id| scores.get(id)).collect();
        let spread = tier.iter().max().unwrap() - tier.iter().min().unwrap();
        assert!(spread <= 5, "scores {tier:?}");
    }
    assert_eq!(scores.get(1), Some(0));
}

#[test]
fn segments_cover_every_pixel_once() {
    let activity = Array2::<f64>::zeros((24, 36));
    let mut covered = Array2::<u8>::zeros((24, 36));
    for segment in &SEGMENTS {
        let mask = segment_mask(&activity.view(), segment, None);
        covered.zip_mut_with(&mask, |count, &inside| *count += u8::from(inside));
    }
    assert!(covered.iter().all(|&c| c == 1));
}

#[test]
fn scores_stay_in_percent_range() {
    let activity = Array2::from_shape_fn((40, 120), |(r, a)| {
        ((r * 7 + a * 13) % 101) as f64 / 100.0
    });
    let scores = SegmentScores::compute(&activity.view());
    assert!(scores.iter().all(|(_, score)| score <= 100));
    assert!(scores.iter().any(|(_, score)| score > 0));

    let mut saturated = activity.clone();
    saturated.fill(1.0);
    assert!(SegmentScores::compute(&saturated.view()).0.iter().all(|&s| s == 100));
}
