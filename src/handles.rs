//! Drag handles of the reorientation views.
//!
//! A view shows the rotation center and two angle handles on opposite sides
//! of it. The handles are never stored: both positions are derived from the
//! center, the view's angle and a distance, and dragging a handle writes
//! angle and distance only.

use std::f64::consts::{PI, TAU};

use crate::reactive::{Batch, Cell, Derived, Reactive};
use crate::reorientation::ReorientationState;

/// Default handle distance from the center, in voxels.
pub const DEFAULT_DISTANCE: f64 = 30.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Handle {
    First,
    Second,
}

/// Handles of one reorientation view.
#[derive(Clone)]
pub struct RotationHandles {
    pub center_x: Cell<f64>,
    pub center_y: Cell<f64>,
    pub angle: Cell<f64>,
    pub distance: Cell<f64>,
    start_angle: f64,
    first: Derived<[f64; 2]>,
    second: Derived<[f64; 2]>,
}

impl RotationHandles {
    pub fn new(
        center_x: Cell<f64>,
        center_y: Cell<f64>,
        angle: Cell<f64>,
        distance: Cell<f64>,
        start_angle: f64,
    ) -> Self {
        let position = |sign: f64| {
            let (cx, cy, angle, distance) =
                (center_x.clone(), center_y.clone(), angle.clone(), distance.clone());
            move || {
                let (dx, dy) = pol2cart(distance.get(), angle.get() + start_angle);
                [cx.get() + sign * dx, cy.get() + sign * dy]
            }
        };
        let inputs: [&dyn Reactive; 4] = [&center_x, &center_y, &angle, &distance];
        let first = Derived::new(&inputs, position(1.0));
        let second = Derived::new(&inputs, position(-1.0));

        Self {
            center_x,
            center_y,
            angle,
            distance,
            start_angle,
            first,
            second,
        }
    }

    /// Transversal view: center `(x, y)`, rotation about z, first handle at
    /// 12 o'clock.
    pub fn transversal(reorientation: &ReorientationState) -> Self {
        Self::new(
            reorientation.center.x.clone(),
            reorientation.center.y.clone(),
            reorientation.angles.z.clone(),
            Cell::new(DEFAULT_DISTANCE),
            270f64.to_radians(),
        )
    }

    /// Sagittal view: center `(y, z)`, rotation about x, first handle at
    /// 9 o'clock.
    pub fn sagittal(reorientation: &ReorientationState) -> Self {
        Self::new(
            reorientation.center.y.clone(),
            reorientation.center.z.clone(),
            reorientation.angles.x.clone(),
            Cell::new(DEFAULT_DISTANCE),
            180f64.to_radians(),
        )
    }

    pub fn start_angle(&self) -> f64 {
        self.start_angle
    }

    pub fn position(&self, handle: Handle) -> &Derived<[f64; 2]> {
        match handle {
            Handle::First => &self.first,
            Handle::Second => &self.second,
        }
    }

    /// Move the center; both coordinates publish together.
    pub fn drag_center(&self, x: f64, y: f64) {
        let _batch = batch_of(&[&self.center_x, &self.center_y]);
        self.center_x.set(x);
        self.center_y.set(y);
    }

    /// Point `handle` at image position `(x, y)`.
    pub fn drag_handle(&self, handle: Handle, x: f64, y: f64) {
        let dx = x - self.center_x.get();
        let dy = y - self.center_y.get();
        let distance = dx.hypot(dy);
        let mut angle = (dy.atan2(dx) - self.start_angle).rem_euclid(TAU);
        if handle == Handle::Second {
            angle = (angle + PI).rem_euclid(TAU);
        }

        let _batch = batch_of(&[&self.distance, &self.angle]);
        self.distance.set(distance);
        self.angle.set(angle);
    }
}

fn batch_of(cells: &[&Cell<f64>]) -> Batch {
    let mut batch = Batch::default();
    for cell in cells {
        cell.enter_batch(&mut batch);
    }
    batch
}

/// Polar to Cartesian offset, rounded to whole pixels.
fn pol2cart(distance: f64, angle: f64) -> (f64, f64) {
    (
        (distance * angle.cos()).round(),
        (distance * angle.sin()).round(),
    )
}
