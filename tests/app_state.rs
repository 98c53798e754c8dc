mod common;

use std::cell::{Cell as StdCell, RefCell};
use std::rc::Rc;

use common::Synthetic;
use spect_reorient::app::AppState;
use spect_reorient::enums::{PolarExecution, View};
use spect_reorient::persist::{load_snapshot, save_snapshot};
use spect_reorient::polar::PolarMapOptions;
use spect_reorient::reactive::Reactive;
use spect_reorient::reorientation::EulerAngles;
use spect_reorient::volume::Volume;

fn source() -> Box<Synthetic> {
    Box::new(Synthetic::default().with("heart.dcm", common::shell(32, [16.0, 14.0, 17.0], 6.0)))
}

#[tokio::test(flavor = "current_thread")]
async fn background_results_arrive_after_settling() {
    common::init_logging();
    let state = AppState::new(source(), PolarExecution::Background).unwrap();
    assert!(state.polar_pending());
    state.settled().await;
    assert!(!state.polar_pending());
    assert_eq!(state.radial_activities.with(|a| a.dim()), (44, 120));

    state.open("data/heart.dcm").unwrap();
    assert!(state.polar_pending());
    state.settled().await;
    let max = state
        .radial_activities
        .with(|a| a.iter().copied().fold(f64::MIN, f64::max));
    assert!((max - 1.0).abs() < 1e-12);
    assert!(!state.poll());
}

#[test]
fn views_follow_the_reorientation() {
    common::init_logging();
    let state = AppState::new(source(), PolarExecution::Inline).unwrap();
    state.open("heart.dcm").unwrap();
    assert!(!state.short_axis.with(Volume::is_blank));
    assert_eq!(state.view(View::ShortAxis).image.with(|i| i.dimensions()), (32, 32));

    let before = state.polar_map.scores.get();
    let recomputes = state.short_axis.recompute_count();
    state.reorientation.angles.set(EulerAngles::new(0.3, 0.0, -0.2));
    // three angles, one batch
    assert_eq!(state.short_axis.recompute_count(), recomputes + 1);
    assert_ne!(state.polar_map.scores.get(), before);
}

#[test]
fn snapshot_restores_a_session() {
    common::init_logging();
    let state = AppState::new(source(), PolarExecution::Inline).unwrap();
    state.open("heart.dcm").unwrap();
    state.reorientation.center.set([15.0, 14.0, 17.0]);
    state.reorientation.angles.y.set(0.25);
    state.clip_percentage.set(0.8);
    state.sampling.move_septal(20);
    state.polar_map.set_options(&PolarMapOptions {
        n_samples: 128,
        output_size: 256,
        draw_segments: false,
    });
    let snapshot = state.serialize();
    assert_eq!(snapshot.grid.n_septal, 20 - snapshot.grid.center_z + 1);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    save_snapshot(&path, &snapshot).unwrap();

    let restored = AppState::new(source(), PolarExecution::Inline).unwrap();
    restored.deserialize(&load_snapshot(&path).unwrap()).unwrap();
    assert_eq!(restored.serialize(), snapshot);
    assert_eq!(restored.polar_map.image.with(|i| i.dimensions()), (256, 256));
    assert_eq!(restored.polar_map.scores.get(), state.polar_map.scores.get());
}

#[test]
fn opening_reorients_once_around_the_new_center() {
    common::init_logging();
    let state = AppState::new(source(), PolarExecution::Inline).unwrap();
    let centers = Rc::new(RefCell::new(Vec::new()));
    {
        let (centers, reorientation) = (centers.clone(), state.reorientation.clone());
        state
            .reoriented
            .on_change(move |_| centers.borrow_mut().push(reorientation.center.get()));
    }
    let reorients = state.reoriented.recompute_count();
    let scores = state.polar_map.scores.recompute_count();

    state.open("heart.dcm").unwrap();
    assert_eq!(*centers.borrow(), [[16.0; 3]]);
    assert_eq!(state.reoriented.recompute_count(), reorients + 1);
    assert_eq!(state.polar_map.scores.recompute_count(), scores + 1);
}

#[test]
fn dragging_the_center_reorients_once() {
    common::init_logging();
    let state = AppState::new(source(), PolarExecution::Inline).unwrap();
    state.open("heart.dcm").unwrap();
    let reorients = state.reoriented.recompute_count();
    let scores = state.polar_map.scores.recompute_count();

    state.transversal_handles.drag_center(14.0, 13.0);
    assert_eq!(state.reorientation.center.get(), [14.0, 13.0, 16.0]);
    assert_eq!(state.reoriented.recompute_count(), reorients + 1);
    assert_eq!(state.polar_map.scores.recompute_count(), scores + 1);
}

#[test]
fn restoring_computes_the_polar_map_once() {
    common::init_logging();
    let state = AppState::new(source(), PolarExecution::Inline).unwrap();
    state.open("heart.dcm").unwrap();
    let mut snapshot = state.serialize();
    snapshot.reorientation.angles = EulerAngles::new(0.1, 0.2, 0.0);
    snapshot.sampling.weighting = false;
    snapshot.polar_map.output_size = 128;

    let updates = Rc::new(StdCell::new(0));
    {
        let updates = updates.clone();
        state
            .radial_activities
            .subscribe(Rc::new(move || updates.set(updates.get() + 1)));
    }
    let images = state.polar_map.image.recompute_count();

    state.deserialize(&snapshot).unwrap();
    assert_eq!(updates.get(), 1);
    assert_eq!(state.polar_map.image.recompute_count(), images + 1);
    assert_eq!(state.serialize(), snapshot);
}
