//! Application state: the reactive graph from an input file to the polar map.
//!
//! ```text
//! filename ─> input ─┬─> sagittal
//!                    └─> reoriented (HLA) ─┬─> short_axis ─> radial_activities ─> polar_map
//! reorientation ─────────┘                 └─> vertical_long_axis
//! ```
//!
//! Every volume has a [`SliceViewState`]. A new input resets the
//! reorientation within the same propagation, so the views are computed once
//! per file. The sampling positions are reset for every new input and
//! whenever the short-axis depth changes. The radial activities are
//! recomputed once per change of the short axis or the sampling, either
//! inline or on a [`PolarWorker`].

use std::cell::Cell as StdCell;
use std::path::{Path, PathBuf};
use std::rc::{Rc, Weak};

use crate::colormap::ColorMap;
use crate::display::SliceViewState;
use crate::enums::{PolarExecution, View};
use crate::handles::RotationHandles;
use crate::persist::ReorientationRecord;
use crate::polar::{
    PolarGridParams, PolarJob, PolarMapOptions, PolarMapState, PolarWorker, SamplingSettings,
    SamplingState,
};
use crate::reactive::{Cell, Composite, ConfigError, Derived, Reactive, WeakDerived, impl_reactive_via};
use crate::reorientation::{
    EulerAngles, ReorientationParameters, ReorientationState, reorient, sagittal, short_axis,
    vertical_long_axis,
};
use crate::volume::Volume;
use crate::volume_loader::VolumeSource;

use log::warn;
use nalgebra::Point3;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Editable state of a session, without any volume data.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AppSnapshot {
    pub filename: Option<PathBuf>,
    pub reorientation: ReorientationParameters,
    pub clip_percentage: f64,
    pub sampling: SamplingSettings,
    pub grid: PolarGridParams,
    pub polar_map: PolarMapOptions,
}

/// Recomputes the radial activities from the short axis and the sampling.
struct PolarPipeline {
    short_axis: WeakDerived<Volume>,
    sampling: SamplingState,
    radial_activities: Cell<Array2<f64>>,
    worker: Option<PolarWorker>,
    /// Set by a new input, consumed by the next short axis.
    fresh_input: StdCell<bool>,
}

impl PolarPipeline {
    fn job(&self) -> Option<PolarJob> {
        let short_axis = self.short_axis.upgrade()?.get();
        let height = short_axis.size()[1];
        let sampling = self.sampling.sampling(height, short_axis.spacing.x);
        Some(PolarJob {
            short_axis,
            sampling,
            params: self.sampling.grid_params(),
        })
    }

    fn refresh(&self) {
        let Some(job) = self.job() else {
            return;
        };
        match &self.worker {
            Some(worker) => {
                worker.submit(job);
            }
            None => self.radial_activities.set(job.run()),
        }
    }
}

pub struct AppState {
    pub filename: Cell<Option<PathBuf>>,
    /// Why the current file could not be loaded.
    pub load_error: Cell<Option<String>>,
    pub clip_percentage: Cell<f64>,
    pub colormap: Cell<ColorMap>,
    pub reorientation: ReorientationState,
    pub input: Derived<Volume>,
    pub sagittal: Derived<Volume>,
    /// Horizontal long axis.
    pub reoriented: Derived<Volume>,
    pub short_axis: Derived<Volume>,
    pub vertical_long_axis: Derived<Volume>,
    pub transversal_handles: RotationHandles,
    pub sagittal_handles: RotationHandles,
    pub sampling: SamplingState,
    pub radial_activities: Cell<Array2<f64>>,
    pub polar_map: PolarMapState,
    views: [SliceViewState; 5],
    pipeline: Rc<PolarPipeline>,
    _polar_refresh: Derived<()>,
    node: Composite,
}

impl AppState {
    pub fn new(source: Box<dyn VolumeSource>, execution: PolarExecution) -> Result<Self, ConfigError> {
        let source: Rc<dyn VolumeSource> = Rc::from(source);
        let filename = Cell::new(None::<PathBuf>);
        let load_error = Cell::new(None::<String>);
        let clip_percentage = Cell::new(1.0);
        let colormap = Cell::new(ColorMap::gray());

        let input = {
            let (filename, load_error) = (filename.clone(), load_error.clone());
            Derived::object(&[&filename.clone()], move || {
                filename.with(|path| load_input(&*source, path.as_deref(), &load_error))
            })
        };

        let reorientation = ReorientationState::new(ReorientationParameters {
            angles: EulerAngles::default(),
            center: input.with(|v| v.geometric_center().map(|c| c as f64)),
        })?;

        let sagittal_volume = {
            let input = input.clone();
            Derived::object(&[&input.clone()], move || input.with(sagittal))
        };
        let reoriented = {
            let (input, reorientation) = (input.clone(), reorientation.clone());
            Derived::object(&[&input.clone(), &reorientation.clone()], move || {
                let parameters = reorientation.parameters();
                input.with(|v| reorient(v, &parameters.angles, &parameters.center))
            })
        };
        let short_axis_volume = {
            let reoriented = reoriented.clone();
            Derived::object(&[&reoriented.clone()], move || reoriented.with(short_axis))
        };
        let vertical_long_axis_volume = {
            let reoriented = reoriented.clone();
            Derived::object(&[&reoriented.clone()], move || reoriented.with(vertical_long_axis))
        };

        let views = [
            &input,
            &sagittal_volume,
            &reoriented,
            &short_axis_volume,
            &vertical_long_axis_volume,
        ]
        .map(|volume| SliceViewState::new(volume, &clip_percentage, &colormap));
        follow_center(&reorientation.center.z, &views[0]);
        follow_center(&reorientation.center.x, &views[1]);

        let sampling = SamplingState::new(&SamplingSettings::default())?;
        let radial_activities = Cell::object(Array2::zeros((0, 0)));
        let worker = match execution {
            PolarExecution::Inline => None,
            PolarExecution::Background => Some(PolarWorker::new()),
        };
        let pipeline = Rc::new(PolarPipeline {
            short_axis: short_axis_volume.downgrade(),
            sampling: sampling.clone(),
            radial_activities: radial_activities.clone(),
            worker,
            fresh_input: StdCell::new(false),
        });
        {
            // runs before the queued reoriented volume is recomputed
            let (reorientation, pipeline) = (reorientation.clone(), Rc::downgrade(&pipeline));
            input.on_change(move |input| {
                reorientation.reset(input.with(Volume::geometric_center));
                if let Some(pipeline) = pipeline.upgrade() {
                    pipeline.fresh_input.set(true);
                }
            });
        }
        {
            let pipeline = Rc::downgrade(&pipeline);
            short_axis_volume.on_change(move |short_axis| on_short_axis(&pipeline, short_axis));
        }
        sampling.init_from_depth(short_axis_volume.with(|v| v.size()[2]));
        let polar_refresh = {
            let pipeline = Rc::downgrade(&pipeline);
            Derived::new(&[&short_axis_volume, &sampling], move || {
                if let Some(pipeline) = pipeline.upgrade() {
                    pipeline.refresh();
                }
            })
        };

        let polar_map =
            PolarMapState::new(&radial_activities, &PolarMapOptions::default(), ColorMap::inferno())?;

        let node = Composite::builder("app")
            .field("reorientation", &reorientation)?
            .field("clip_percentage", &clip_percentage)?
            .field("colormap", &colormap)?
            .field("sampling", &sampling)?
            .field("polar_map", &polar_map)?
            .build();

        Ok(Self {
            transversal_handles: RotationHandles::transversal(&reorientation),
            sagittal_handles: RotationHandles::sagittal(&reorientation),
            filename,
            load_error,
            clip_percentage,
            colormap,
            reorientation,
            input,
            sagittal: sagittal_volume,
            reoriented,
            short_axis: short_axis_volume,
            vertical_long_axis: vertical_long_axis_volume,
            sampling,
            radial_activities,
            polar_map,
            views,
            pipeline,
            _polar_refresh: polar_refresh,
            node,
        })
    }

    /// Load `path` as the new input.
    ///
    /// # Errors
    ///
    /// Returns the user-facing reason if the file could not be loaded; the
    /// state then shows the empty placeholder volume.
    pub fn open(&self, path: impl Into<PathBuf>) -> Result<(), String> {
        self.filename.set(Some(path.into()));
        match self.load_error.get() {
            Some(reason) => Err(reason),
            None => Ok(()),
        }
    }

    pub fn view(&self, view: View) -> &SliceViewState {
        let index = View::ALL.iter().position(|v| *v == view).unwrap_or(0);
        &self.views[index]
    }

    /// Whether a background computation has not reported yet.
    pub fn polar_pending(&self) -> bool {
        self.pipeline.worker.as_ref().is_some_and(PolarWorker::pending)
    }

    /// Apply a finished background computation. Returns whether the radial
    /// activities changed.
    pub fn poll(&self) -> bool {
        let Some(activities) = self.pipeline.worker.as_ref().and_then(PolarWorker::drain) else {
            return false;
        };
        self.radial_activities.set(activities);
        true
    }

    /// Wait until the radial activities match the current inputs.
    pub async fn settled(&self) {
        if let Some(worker) = &self.pipeline.worker {
            if let Some(activities) = worker.settled().await {
                self.radial_activities.set(activities);
            }
        }
    }

    pub fn serialize(&self) -> AppSnapshot {
        AppSnapshot {
            filename: self.filename.get(),
            reorientation: self.reorientation.parameters(),
            clip_percentage: self.clip_percentage.get(),
            sampling: self.sampling.settings(),
            grid: self.sampling.grid_params(),
            polar_map: self.polar_map.options(),
        }
    }

    /// Reload the snapshot's file, then apply everything else in one batch.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] for unusable sampling settings;
    /// nothing but the file is applied then.
    pub fn deserialize(&self, snapshot: &AppSnapshot) -> Result<(), ConfigError> {
        snapshot.sampling.validate().map_err(ConfigError::InvalidValue)?;
        self.filename.set(snapshot.filename.clone());

        let _batch = self.batch();
        self.clip_percentage.set(snapshot.clip_percentage);
        self.sampling.apply(&snapshot.sampling)?;
        let grid = &snapshot.grid;
        self.sampling.center_z.set(grid.center_z);
        self.sampling
            .pos_septal
            .set(grid.center_z + grid.n_septal.saturating_sub(1));
        self.sampling
            .pos_lateral
            .set(grid.center_z + grid.n_lateral.saturating_sub(1));
        self.polar_map.set_options(&snapshot.polar_map);
        self.reorientation.set_parameters(&snapshot.reorientation);
        Ok(())
    }

    /// Current reorientation with the center as a physical point.
    pub fn reorientation_record(&self) -> Option<ReorientationRecord> {
        let filename = self.filename.with(|path| record_name(path.as_deref()?))?;
        let parameters = self.reorientation.parameters();
        let center = self.input.with(|v| v.index_to_physical(parameters.center));
        Some(ReorientationRecord {
            filename,
            angle_x: parameters.angles.x,
            angle_y: parameters.angles.y,
            angle_z: parameters.angles.z,
            center_x: center.x,
            center_y: center.y,
            center_z: center.z,
        })
    }

    pub fn import_reorientation(&self, record: &ReorientationRecord) {
        let point = Point3::new(record.center_x, record.center_y, record.center_z);
        let center = self.input.with(|v| v.physical_to_index(&point));
        self.reorientation.set_parameters(&ReorientationParameters {
            angles: EulerAngles::new(record.angle_x, record.angle_y, record.angle_z),
            center,
        });
    }
}

impl_reactive_via!(AppState, node);

/// Name under which `path` is stored in the reorientation and score tables.
pub fn record_name(path: &Path) -> Option<String> {
    Some(path.file_name()?.to_string_lossy().into_owned())
}

fn load_input(source: &dyn VolumeSource, path: Option<&Path>, load_error: &Cell<Option<String>>) -> Volume {
    let Some(path) = path else {
        load_error.set(None);
        return Volume::default();
    };
    match source.load(path) {
        Ok(volume) => {
            load_error.set(None);
            volume
        }
        Err(e) => {
            warn!("could not load {}: {e}", path.display());
            load_error.set(Some(e.to_string()));
            Volume::default()
        }
    }
}

/// Keep the slice of `view` at the rounded rotation-center coordinate.
fn follow_center(coordinate: &Cell<f64>, view: &SliceViewState) {
    let (slice, volume) = (view.slice.downgrade(), view.volume.downgrade());
    let update = move |coordinate: &Cell<f64>| {
        let (Some(slice), Some(volume)) = (slice.upgrade(), volume.upgrade()) else {
            return;
        };
        let depth = volume.with(|v| v.size()[2]);
        let index = coordinate.get().round().max(0.0) as usize;
        slice.set(index.min(depth.saturating_sub(1)));
    };
    update(coordinate);
    coordinate.on_change(update);
}

/// New positions for a new input or a different number of slices.
fn on_short_axis(pipeline: &Weak<PolarPipeline>, short_axis: &Cell<Volume>) {
    let Some(pipeline) = pipeline.upgrade() else {
        return;
    };
    let depth = short_axis.with(|v| v.size()[2]);
    if pipeline.fresh_input.replace(false) || pipeline.sampling.depth.get() != depth {
        pipeline.sampling.init_from_depth(depth);
    }
}
