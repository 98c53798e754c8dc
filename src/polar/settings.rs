use crate::reactive::{Cell, Composite, ConfigError, Reactive, impl_reactive_via};

use super::grid::{PolarGridParams, arange};
use super::{PolarSampling, Weighting};

use serde::{Deserialize, Serialize};

/// Sampling resolution and weighting, as read from configuration.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingSettings {
    /// Radius step in voxels.
    pub radii_step: f64,
    pub azimuth_step_deg: f64,
    /// Number of spherical apex layers.
    pub polar_angle_count: usize,
    pub weighting: bool,
    /// Weighting window edge width, in radius steps.
    pub sigma: f64,
}

impl Default for SamplingSettings {
    fn default() -> Self {
        Self {
            radii_step: 0.25,
            azimuth_step_deg: 3.0,
            polar_angle_count: 10,
            weighting: true,
            sigma: 3.0,
        }
    }
}

impl SamplingSettings {
    /// Sample positions for a short-axis volume with `height` rows and
    /// in-plane spacing `spacing_mm`.
    pub fn sampling(&self, height: usize, spacing_mm: f64) -> PolarSampling {
        let to_radians =
            |degrees: Vec<f64>| -> Vec<f64> { degrees.into_iter().map(f64::to_radians).collect() };
        let polar_step = 90.0 / self.polar_angle_count.max(1) as f64 - 0.001;

        PolarSampling {
            radii: arange(0.0, height as f64 / 2.0, self.radii_step),
            azimuth_angles: to_radians(arange(0.0, 360.0, self.azimuth_step_deg)),
            polar_angles: to_radians(arange(0.0, 90.0, polar_step)),
            weighting: self.weighting.then_some(Weighting {
                pixel_size_mm: spacing_mm * self.radii_step,
                sigma: self.sigma,
            }),
        }
    }
}

impl SamplingSettings {
    /// # Errors
    ///
    /// Names the first step that is not a positive number.
    pub fn validate(&self) -> Result<(), String> {
        positive(&self.radii_step).map_err(|e| format!("radii_step: {e}"))?;
        positive(&self.azimuth_step_deg).map_err(|e| format!("azimuth_step_deg: {e}"))
    }
}

fn positive(value: &f64) -> Result<(), String> {
    if value.is_finite() && *value > 0.0 {
        Ok(())
    } else {
        Err(format!("expected a positive step, got {value}"))
    }
}

/// Editable sampling state of the short-axis volume.
///
/// Positions are short-axis slice indices and keep
/// `center_z < pos_septal <= pos_lateral <= depth` when moved through the
/// `move_*` setters.
#[derive(Clone)]
pub struct SamplingState {
    pub depth: Cell<usize>,
    pub center_z: Cell<usize>,
    pub pos_septal: Cell<usize>,
    pub pos_lateral: Cell<usize>,
    pub weighting: Cell<bool>,
    pub sigma: Cell<f64>,
    pub radii_step: Cell<f64>,
    pub azimuth_step_deg: Cell<f64>,
    pub polar_angle_count: Cell<usize>,
    node: Composite,
}

impl SamplingState {
    pub fn new(settings: &SamplingSettings) -> Result<Self, ConfigError> {
        let depth = Cell::new(0);
        let center_z = Cell::new(0);
        let pos_septal = Cell::new(0);
        let pos_lateral = Cell::new(0);
        let weighting = Cell::new(settings.weighting);
        let sigma = Cell::new(settings.sigma);
        let radii_step = Cell::validated(settings.radii_step, positive)?;
        let azimuth_step_deg = Cell::validated(settings.azimuth_step_deg, positive)?;
        let polar_angle_count = Cell::new(settings.polar_angle_count);

        let node = Composite::builder("sampling")
            .field("depth", &depth)?
            .field("center_z", &center_z)?
            .field("pos_septal", &pos_septal)?
            .field("pos_lateral", &pos_lateral)?
            .field("weighting", &weighting)?
            .field("sigma", &sigma)?
            .field("radii_step", &radii_step)?
            .field("azimuth_step_deg", &azimuth_step_deg)?
            .field("polar_angle_count", &polar_angle_count)?
            .build();

        Ok(Self {
            depth,
            center_z,
            pos_septal,
            pos_lateral,
            weighting,
            sigma,
            radii_step,
            azimuth_step_deg,
            polar_angle_count,
            node,
        })
    }

    pub fn settings(&self) -> SamplingSettings {
        SamplingSettings {
            radii_step: self.radii_step.get(),
            azimuth_step_deg: self.azimuth_step_deg.get(),
            polar_angle_count: self.polar_angle_count.get(),
            weighting: self.weighting.get(),
            sigma: self.sigma.get(),
        }
    }

    /// Apply all settings with a single notification.
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvalidValue`] if a step is not positive; the state is
    /// left untouched.
    pub fn apply(&self, settings: &SamplingSettings) -> Result<(), ConfigError> {
        settings.validate().map_err(ConfigError::InvalidValue)?;
        let _batch = self.batch();
        self.radii_step.set(settings.radii_step);
        self.azimuth_step_deg.set(settings.azimuth_step_deg);
        self.polar_angle_count.set(settings.polar_angle_count);
        self.weighting.set(settings.weighting);
        self.sigma.set(settings.sigma);
        Ok(())
    }

    /// Default positions for a short-axis volume with `depth` slices.
    pub fn init_from_depth(&self, depth: usize) {
        let center_z = depth / 2;
        let lateral = (center_z + (2.0 * center_z as f64 / 3.0).round() as usize).min(depth);

        let _batch = self.batch();
        self.depth.set(depth);
        self.center_z.set(center_z);
        self.pos_lateral.set(lateral);
        self.pos_septal.set(lateral);
    }

    pub fn move_center_z(&self, z: usize) {
        let z = z.min(self.pos_septal.get().saturating_sub(1));
        self.center_z.set(z);
    }

    pub fn move_septal(&self, pos: usize) {
        let pos = pos.max(self.center_z.get() + 1).min(self.depth.get());
        let _batch = self.batch();
        if pos > self.pos_lateral.get() {
            self.pos_lateral.set(pos);
        }
        self.pos_septal.set(pos);
    }

    pub fn move_lateral(&self, pos: usize) {
        let pos = pos.min(self.depth.get()).max(self.center_z.get() + 1);
        let _batch = self.batch();
        if pos < self.pos_septal.get() {
            self.pos_septal.set(pos);
        }
        self.pos_lateral.set(pos);
    }

    /// Layers on both sides counted inclusively from `center_z`.
    pub fn grid_params(&self) -> PolarGridParams {
        let center_z = self.center_z.get();
        PolarGridParams {
            center_z,
            n_septal: self.pos_septal.get().saturating_sub(center_z) + 1,
            n_lateral: self.pos_lateral.get().saturating_sub(center_z) + 1,
        }
    }

    pub fn sampling(&self, height: usize, spacing_mm: f64) -> PolarSampling {
        self.settings().sampling(height, spacing_mm)
    }
}

impl_reactive_via!(SamplingState, node);
