//! Rotation and translation of a volume around its geometric center, and the
//! fixed re-projections into the cardiac views.

use crate::interpolator::Interpolator;
use crate::reactive::{Cell, Composite, ConfigError, Reactive, impl_reactive_via};
use crate::volume::Volume;

use log::debug;
use nalgebra::{Matrix3, Point3, Rotation3, Vector3};
use ndarray::{Array3, Zip};
use serde::{Deserialize, Serialize};
use web_time::Instant;

/// Rotation angles in radians about the x, y and z axes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EulerAngles {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl EulerAngles {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// `Rz * Ry * Rx`, so the x rotation is applied first.
    pub fn rotation(&self) -> Rotation3<f64> {
        Rotation3::from_euler_angles(self.x, self.y, self.z)
    }
}

/// Angles plus the heart center as a continuous `(x, y, z)` index into the
/// input volume.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ReorientationParameters {
    pub angles: EulerAngles,
    pub center: [f64; 3],
}

/// Resample `volume` so that `center` moves to the geometric center and the
/// image is rotated by `angles` around it.
///
/// Uses trilinear interpolation on the input grid, zero outside. Zero angles
/// with `center == volume.geometric_center()` reproduce the input.
pub fn reorient(volume: &Volume, angles: &EulerAngles, center: &[f64; 3]) -> Volume {
    let started = Instant::now();

    let image_center = volume.index_to_physical(volume.geometric_center().map(|c| c as f64));
    let heart_center = volume.index_to_physical(*center);
    let offset = heart_center - image_center;

    let (matrix, shift) = index_affine(volume, &angles.rotation(), &image_center, &offset);

    let input = volume.data.view();
    let mut data = Array3::<f32>::zeros(volume.data.raw_dim());
    Zip::indexed(&mut data).par_for_each(|(z, y, x), voxel| {
        let source = matrix * Vector3::new(x as f64, y as f64, z as f64) + shift;
        *voxel = Interpolator::trilinear(&input, source.z, source.y, source.x);
    });

    debug!(
        "reoriented {:?} volume in {:.1}ms",
        volume.size(),
        started.elapsed().as_secs_f64() * 1e3
    );

    Volume {
        data,
        spacing: volume.spacing,
        origin: volume.origin,
        direction: volume.direction,
    }
}

/// Map from an output index to the input index it samples.
///
/// The physical transform is `p -> R (p - c) + c + offset`, both ends go
/// through the volume's index/physical mapping.
fn index_affine(
    volume: &Volume,
    rotation: &Rotation3<f64>,
    center: &Point3<f64>,
    offset: &Vector3<f64>,
) -> (Matrix3<f64>, Vector3<f64>) {
    let scale = Matrix3::from_diagonal(&volume.spacing);
    let inv_scale = Matrix3::from_diagonal(&volume.spacing.map(|s| 1.0 / s));
    let to_index = inv_scale * volume.direction.transpose();
    let r = rotation.matrix();

    let matrix = to_index * r * volume.direction * scale;
    let origin = volume.origin.coords;
    let shift = to_index * (r * (origin - center.coords) + center.coords + offset - origin);
    (matrix, shift)
}

/// Short-axis view of a reoriented volume.
pub fn short_axis(volume: &Volume) -> Volume {
    volume.permute_axes([2, 0, 1])
}

/// Vertical-long-axis view of a reoriented volume.
pub fn vertical_long_axis(volume: &Volume) -> Volume {
    volume.permute_axes([1, 2, 0]).flip([true, true, false])
}

/// Sagittal view of an input volume.
pub fn sagittal(volume: &Volume) -> Volume {
    volume.permute_axes([1, 2, 0])
}

/// Reactive rotation angles.
#[derive(Clone)]
pub struct Angles {
    pub x: Cell<f64>,
    pub y: Cell<f64>,
    pub z: Cell<f64>,
    node: Composite,
}

impl Angles {
    pub fn new(angles: EulerAngles) -> Result<Self, ConfigError> {
        let (x, y, z) = (Cell::new(angles.x), Cell::new(angles.y), Cell::new(angles.z));
        let node = Composite::builder("angles")
            .field("x", &x)?
            .field("y", &y)?
            .field("z", &z)?
            .build();
        Ok(Self { x, y, z, node })
    }

    pub fn get(&self) -> EulerAngles {
        EulerAngles::new(self.x.get(), self.y.get(), self.z.get())
    }

    pub fn set(&self, angles: EulerAngles) {
        let _batch = self.batch();
        self.x.set(angles.x);
        self.y.set(angles.y);
        self.z.set(angles.z);
    }
}

impl_reactive_via!(Angles, node);

/// Reactive rotation center, continuous `(x, y, z)` input index.
#[derive(Clone)]
pub struct Center {
    pub x: Cell<f64>,
    pub y: Cell<f64>,
    pub z: Cell<f64>,
    node: Composite,
}

impl Center {
    pub fn new(center: [f64; 3]) -> Result<Self, ConfigError> {
        let [x, y, z] = center.map(Cell::new);
        let node = Composite::builder("center")
            .field("x", &x)?
            .field("y", &y)?
            .field("z", &z)?
            .build();
        Ok(Self { x, y, z, node })
    }

    pub fn get(&self) -> [f64; 3] {
        [self.x.get(), self.y.get(), self.z.get()]
    }

    pub fn set(&self, center: [f64; 3]) {
        let _batch = self.batch();
        self.x.set(center[0]);
        self.y.set(center[1]);
        self.z.set(center[2]);
    }
}

impl_reactive_via!(Center, node);

/// Source of truth for the reorientation of the current input.
#[derive(Clone)]
pub struct ReorientationState {
    pub angles: Angles,
    pub center: Center,
    node: Composite,
}

impl ReorientationState {
    pub fn new(parameters: ReorientationParameters) -> Result<Self, ConfigError> {
        let angles = Angles::new(parameters.angles)?;
        let center = Center::new(parameters.center)?;
        let node = Composite::builder("reorientation")
            .field("angles", &angles)?
            .field("center", &center)?
            .build();
        Ok(Self {
            angles,
            center,
            node,
        })
    }

    pub fn parameters(&self) -> ReorientationParameters {
        ReorientationParameters {
            angles: self.angles.get(),
            center: self.center.get(),
        }
    }

    /// Apply all six values with a single notification.
    pub fn set_parameters(&self, parameters: &ReorientationParameters) {
        let _batch = self.batch();
        self.angles.set(parameters.angles);
        self.center.set(parameters.center);
    }

    /// No rotation, center at `center` (a geometric center).
    pub fn reset(&self, center: [usize; 3]) {
        self.set_parameters(&ReorientationParameters {
            angles: EulerAngles::default(),
            center: center.map(|c| c as f64),
        });
    }
}

impl_reactive_via!(ReorientationState, node);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Derived;
    use approx::assert_abs_diff_eq;
    use std::f64::consts::FRAC_PI_2;

    fn blob() -> Volume {
        let data = Array3::from_shape_fn((16, 16, 16), |(z, y, x)| {
            let d = [z as f32 - 8.0, y as f32 - 5.0, x as f32 - 10.0];
            (-(d[0] * d[0] + d[1] * d[1] + d[2] * d[2]) / 8.0).exp()
        });
        Volume::with_geometry(data, [2.0, 2.0, 3.0], [-5.0, 7.0, 1.0], Matrix3::identity())
    }

    #[test]
    fn zero_parameters_are_identity() {
        let volume = blob();
        let center = volume.geometric_center().map(|c| c as f64);
        let out = reorient(&volume, &EulerAngles::default(), &center);
        for (a, b) in out.data.iter().zip(volume.data.iter()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-6);
        }
        assert_eq!(out.spacing, volume.spacing);
        assert_eq!(out.origin, volume.origin);
    }

    #[test]
    fn translation_moves_center_to_image_center() {
        let volume = blob();
        // blob peak at x=10, y=5, z=8
        let out = reorient(&volume, &EulerAngles::default(), &[10.0, 5.0, 8.0]);
        assert_abs_diff_eq!(out.data[[8, 8, 8]], 1.0, epsilon = 1e-6);
    }

    #[test]
    fn quarter_turn_about_z_moves_voxels() {
        let data = Array3::from_shape_fn((9, 9, 9), |(z, y, x)| {
            if z == 4 && y == 4 && x == 7 { 1.0 } else { 0.0 }
        });
        let volume = Volume::new(data, [1.0, 1.0, 1.0]);
        let out = reorient(&volume, &EulerAngles::new(0.0, 0.0, FRAC_PI_2), &[4.0, 4.0, 4.0]);
        // output (x, y) samples input R (x - c, y - c) + c, so (4, 1) reads (7, 4)
        assert_abs_diff_eq!(out.data[[4, 1, 4]], 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(out.data.sum(), 1.0, epsilon = 1e-5);
    }

    #[test]
    fn views_have_expected_shapes() {
        let volume = Volume::empty([10, 20, 30], [1.0, 2.0, 3.0]);
        assert_eq!(short_axis(&volume).size(), [30, 10, 20]);
        assert_eq!(vertical_long_axis(&volume).size(), [20, 30, 10]);
        assert_eq!(sagittal(&volume).size(), [20, 30, 10]);
    }

    #[test]
    fn parameter_update_is_one_notification() {
        let state = ReorientationState::new(ReorientationParameters::default()).unwrap();
        let snapshot = {
            let state = state.clone();
            Derived::new(&[&state.clone()], move || state.parameters())
        };
        let parameters = ReorientationParameters {
            angles: EulerAngles::new(0.1, 0.2, 0.3),
            center: [1.0, 2.0, 3.0],
        };
        state.set_parameters(&parameters);
        assert_eq!(snapshot.recompute_count(), 1);
        assert_eq!(snapshot.get(), parameters);

        state.reset([5, 6, 7]);
        assert_eq!(snapshot.recompute_count(), 2);
        assert_eq!(snapshot.get().center, [5.0, 6.0, 7.0]);
        assert_eq!(snapshot.get().angles, EulerAngles::default());
    }
}
