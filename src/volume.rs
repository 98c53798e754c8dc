use nalgebra::{Matrix3, Point3, Vector3};
use ndarray::{Array3, Axis, s};
use ndarray::parallel::prelude::*;

/// Size of the placeholder volume shown when no input is loaded.
pub const EMPTY_SIZE: [usize; 3] = [96, 96, 96];
/// Spacing of the placeholder volume in mm.
pub const EMPTY_SPACING: [f64; 3] = [4.0, 4.0, 4.0];

/// A scalar 3D image with physical geometry.
///
/// Voxels are stored `[z, y, x]`. All geometric quantities (`spacing`,
/// `origin`, the columns of `direction`, sizes and continuous indices) use
/// `(x, y, z)` order, so a continuous index `i` maps to the physical point
/// `origin + direction * (spacing ∘ i)`.
///
/// Transforms never mutate `self`; they return a new volume.
#[derive(Clone, Debug, PartialEq)]
pub struct Volume {
    pub data: Array3<f32>,
    pub spacing: Vector3<f64>,
    pub origin: Point3<f64>,
    pub direction: Matrix3<f64>,
}

impl Default for Volume {
    fn default() -> Self {
        Self::empty(EMPTY_SIZE, EMPTY_SPACING)
    }
}

impl Volume {
    /// Volume with unit origin-free geometry: origin 0, identity direction.
    pub fn new(data: Array3<f32>, spacing: [f64; 3]) -> Self {
        Self::with_geometry(data, spacing, [0.0; 3], Matrix3::identity())
    }

    pub fn with_geometry(
        data: Array3<f32>,
        spacing: [f64; 3],
        origin: [f64; 3],
        direction: Matrix3<f64>,
    ) -> Self {
        Self {
            data,
            spacing: Vector3::from(spacing),
            origin: Point3::from(origin),
            direction,
        }
    }

    /// All-zero volume, `size` in `(x, y, z)` order.
    pub fn empty(size: [usize; 3], spacing: [f64; 3]) -> Self {
        Self::new(Array3::zeros((size[2], size[1], size[0])), spacing)
    }

    /// Get the dimensions of the volume (depth, height, width)
    pub fn dim(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    /// Number of voxels along `(x, y, z)`.
    pub fn size(&self) -> [usize; 3] {
        let (z, y, x) = self.data.dim();
        [x, y, z]
    }

    /// Index-space center, `size / 2` per axis (integer division).
    pub fn geometric_center(&self) -> [usize; 3] {
        self.size().map(|n| n / 2)
    }

    pub fn index_to_physical(&self, index: [f64; 3]) -> Point3<f64> {
        let scaled = self.spacing.component_mul(&Vector3::from(index));
        self.origin + self.direction * scaled
    }

    pub fn physical_to_index(&self, point: &Point3<f64>) -> [f64; 3] {
        let rotated = self.direction.transpose() * (point - self.origin);
        let index = rotated.component_div(&self.spacing);
        [index.x, index.y, index.z]
    }

    pub fn max(&self) -> f32 {
        if self.data.is_empty() {
            return 0.0;
        }
        self.data
            .par_iter()
            .copied()
            .reduce(|| f32::NEG_INFINITY, f32::max)
    }

    pub fn min(&self) -> f32 {
        if self.data.is_empty() {
            return 0.0;
        }
        self.data.par_iter().copied().reduce(|| f32::INFINITY, f32::min)
    }

    /// True if every voxel is zero.
    pub fn is_blank(&self) -> bool {
        self.data.iter().all(|&v| v == 0.0)
    }

    /// Reorder axes, `order` given in `(x, y, z)` terms: output axis `i` is
    /// input axis `order[i]`. Geometry is permuted along with the data.
    pub fn permute_axes(&self, order: [usize; 3]) -> Volume {
        // (x, y, z) axis a lives at array axis 2 - a
        let data = self
            .data
            .view()
            .permuted_axes([2 - order[2], 2 - order[1], 2 - order[0]])
            .as_standard_layout()
            .into_owned();

        let spacing = Vector3::from_fn(|i, _| self.spacing[order[i]]);
        let origin = Point3::from(Vector3::from_fn(|i, _| self.origin[order[i]]));
        let direction = Matrix3::from_fn(|r, c| self.direction[(r, order[c])]);

        Volume {
            data,
            spacing,
            origin,
            direction,
        }
    }

    /// Reverse the voxel order along the flagged `(x, y, z)` axes while keeping
    /// every voxel at its physical position.
    pub fn flip(&self, axes: [bool; 3]) -> Volume {
        let mut data = self.data.clone();
        let mut direction = self.direction;
        let mut far_corner = [0.0; 3];
        let size = self.size();

        for (axis, _) in axes.iter().enumerate().filter(|(_, flip)| **flip) {
            data.invert_axis(Axis(2 - axis));
            let column = -self.direction.column(axis).into_owned();
            direction.set_column(axis, &column);
            far_corner[axis] = size[axis].saturating_sub(1) as f64;
        }

        Volume {
            data: data.as_standard_layout().into_owned(),
            spacing: self.spacing,
            origin: self.index_to_physical(far_corner),
            direction,
        }
    }

    /// Constant-pad by `lower`/`upper` voxels per `(x, y, z)` axis.
    pub fn pad(&self, lower: [usize; 3], upper: [usize; 3], value: f32) -> Volume {
        let [x, y, z] = self.size();
        let shape = (
            z + lower[2] + upper[2],
            y + lower[1] + upper[1],
            x + lower[0] + upper[0],
        );
        let mut data = Array3::from_elem(shape, value);
        data.slice_mut(s![
            lower[2]..lower[2] + z,
            lower[1]..lower[1] + y,
            lower[0]..lower[0] + x
        ])
        .assign(&self.data);

        Volume {
            data,
            spacing: self.spacing,
            origin: self.index_to_physical(lower.map(|l| -(l as f64))),
            direction: self.direction,
        }
    }

    /// Remove `lower`/`upper` voxels per `(x, y, z)` axis.
    pub fn crop(&self, lower: [usize; 3], upper: [usize; 3]) -> Volume {
        let [x, y, z] = self.size();
        let end = |n: usize, l: usize, u: usize| n.saturating_sub(u).max(l.min(n));
        let data = self
            .data
            .slice(s![
                lower[2].min(z)..end(z, lower[2], upper[2]),
                lower[1].min(y)..end(y, lower[1], upper[1]),
                lower[0].min(x)..end(x, lower[0], upper[0])
            ])
            .to_owned();

        Volume {
            data,
            spacing: self.spacing,
            origin: self.index_to_physical(lower.map(|l| l as f64)),
            direction: self.direction,
        }
    }

    /// Pad symmetrically to at least `target` voxels per `(x, y, z)` axis,
    /// the odd voxel goes to the lower side.
    pub fn center_pad(&self, target: [usize; 3], value: f32) -> Volume {
        let size = self.size();
        let diff: [usize; 3] = std::array::from_fn(|i| target[i].saturating_sub(size[i]));
        self.pad(diff.map(|d| d.div_ceil(2)), diff.map(|d| d / 2), value)
    }

    /// Crop symmetrically to at most `target` voxels per `(x, y, z)` axis,
    /// the odd voxel is taken from the lower side.
    pub fn center_crop(&self, target: [usize; 3]) -> Volume {
        let size = self.size();
        let diff: [usize; 3] = std::array::from_fn(|i| size[i].saturating_sub(target[i]));
        self.crop(diff.map(|d| d.div_ceil(2)), diff.map(|d| d / 2))
    }

    /// `center_pad` followed by `center_crop`, so the result is exactly `target`.
    pub fn pad_crop(&self, target: [usize; 3], value: f32) -> Volume {
        self.center_pad(target, value).center_crop(target)
    }

    /// Pad every axis to the longest one.
    pub fn square_pad(&self, value: f32) -> Volume {
        let longest = self.size().into_iter().max().unwrap_or(0);
        self.center_pad([longest; 3], value)
    }
}
