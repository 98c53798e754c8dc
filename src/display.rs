//! Conversion of volumes and activity maps into RGB display buffers.

use crate::colormap::ColorMap;
use crate::reactive::{Cell, Derived};
use crate::volume::Volume;

use image::RgbImage;
use image::imageops::{self, FilterType};
use log::warn;
use ndarray::{Array2, Array3, ArrayView2, ArrayView3, Axis, Zip};

/// Width of the rendered radial-activity image.
pub const RADIAL_ACTIVITY_WIDTH: u32 = 512;

/// Clip to `[min, clip_percentage * max]` and rescale to `[0, 255]`.
///
/// A volume without dynamic range becomes all zero.
pub fn normalize_volume(volume: &Volume, clip_percentage: f64) -> Array3<u8> {
    let lo = volume.min();
    let hi = (clip_percentage as f32 * volume.max()).min(volume.max());
    if hi <= lo || !(hi - lo).is_finite() {
        if volume.max() != volume.min() {
            warn!("clip at {clip_percentage} leaves no dynamic range, showing a blank image");
        }
        return Array3::zeros(volume.data.raw_dim());
    }

    let range = hi - lo;
    let mut out = Array3::zeros(volume.data.raw_dim());
    Zip::from(&mut out).and(&volume.data).par_for_each(|dst, &v| {
        *dst = ((v.clamp(lo, hi) - lo) / range * 255.0) as u8;
    });
    out
}

/// Colorized slice `index` along the first axis, black if out of range.
pub fn slice_image(normalized: &ArrayView3<u8>, index: usize, colormap: &ColorMap) -> RgbImage {
    let (depth, height, width) = normalized.dim();
    if index >= depth {
        return RgbImage::new(width as u32, height as u32);
    }
    colormap.colorize(&normalized.index_axis(Axis(0), index))
}

/// Colorize a `[depth, azimuth]` activity map in `[0, 1]` and scale it to a
/// fixed width.
pub fn radial_activity_image(activities: &ArrayView2<f64>, colormap: &ColorMap) -> RgbImage {
    let (height, width) = activities.dim();
    if width == 0 || height == 0 {
        return RgbImage::new(0, 0);
    }
    let bytes: Array2<u8> = activities.mapv(|v| (255.0 * v.clamp(0.0, 1.0)) as u8);
    let image = colormap.colorize(&bytes.view());

    let scale = f64::from(RADIAL_ACTIVITY_WIDTH) / width as f64;
    let new_height = ((height as f64 * scale).round() as u32).max(1);
    imageops::resize(&image, RADIAL_ACTIVITY_WIDTH, new_height, FilterType::Triangle)
}

/// Slice viewer of one reactive volume.
#[derive(Clone)]
pub struct SliceViewState {
    pub volume: Derived<Volume>,
    pub slice: Cell<usize>,
    pub clip_percentage: Cell<f64>,
    pub colormap: Cell<ColorMap>,
    pub normalized: Derived<Array3<u8>>,
    pub image: Derived<RgbImage>,
}

impl SliceViewState {
    pub fn new(volume: &Derived<Volume>, clip_percentage: &Cell<f64>, colormap: &Cell<ColorMap>) -> Self {
        let slice = Cell::new(volume.with(center_slice));
        {
            let slice = slice.downgrade();
            volume.on_change(move |volume| {
                if let Some(slice) = slice.upgrade() {
                    slice.set(volume.with(center_slice));
                }
            });
        }

        let normalized = {
            let (volume, clip) = (volume.clone(), clip_percentage.clone());
            Derived::object(&[&volume.clone(), &clip.clone()], move || {
                volume.with(|v| normalize_volume(v, clip.get()))
            })
        };

        let image = {
            let (normalized, slice, colormap) = (normalized.clone(), slice.clone(), colormap.clone());
            Derived::object(&[&normalized.clone(), &slice.clone(), &colormap.clone()], move || {
                normalized.with(|n| colormap.with(|c| slice_image(&n.view(), slice.get(), c)))
            })
        };

        Self {
            volume: volume.clone(),
            slice,
            clip_percentage: clip_percentage.clone(),
            colormap: colormap.clone(),
            normalized,
            image,
        }
    }

    /// Number of selectable slices.
    pub fn depth(&self) -> usize {
        self.volume.with(|v| v.size()[2])
    }
}

fn center_slice(volume: &Volume) -> usize {
    volume.size()[2] / 2
}
