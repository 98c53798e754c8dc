use crate::colormap::ColorMap;
use crate::interpolator::Interpolator;

use super::grid::build_cartesian_grid;
use super::segment::{SEGMENTS, segment_vertices};

use image::imageops::{self, FilterType};
use image::{GrayImage, Luma, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_hollow_circle_mut, draw_line_segment_mut};
use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};

const BLACK: Rgb<u8> = Rgb([0, 0, 0]);

/// Rendering options of the bullseye image.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolarMapOptions {
    /// Side length of the bullseye before resizing.
    pub n_samples: usize,
    /// Side length of the final image.
    pub output_size: u32,
    /// Overlay the segment boundaries.
    pub draw_segments: bool,
}

impl Default for PolarMapOptions {
    fn default() -> Self {
        Self {
            n_samples: 256,
            output_size: 512,
            draw_segments: true,
        }
    }
}

/// Bullseye rendering of `[depth, azimuth]` activities: apex in the
/// center, basal wall outside, 12 o'clock anterior.
///
/// All-zero or undefined activity yields a black image.
pub fn polar_map_image(
    activities: &ArrayView2<f64>,
    options: &PolarMapOptions,
    colormap: &ColorMap,
) -> RgbImage {
    let size = options.output_size;
    let n = options.n_samples;
    if activities.is_empty() || n == 0 {
        return RgbImage::new(size, size);
    }

    let (grid_y, grid_x) = build_cartesian_grid(activities.dim(), n);
    let bullseye = Interpolator::map_coordinates_2d(activities, &grid_y.view(), &grid_x.view());
    let max = bullseye.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if max.is_nan() || max <= 0.0 {
        return RgbImage::new(size, size);
    }

    let bytes: Array2<u8> = bullseye.mapv(|v| (255.0 * (v / max).clamp(0.0, 1.0)).round() as u8);
    let mut image = colormap.colorize(&bytes.view());
    apply_disk_mask(&mut image);

    let mut image = imageops::resize(&image, size, size, FilterType::Triangle);
    if options.draw_segments {
        draw_segments_grid(&mut image);
    }
    image
}

/// Black out everything outside the inscribed disk, for palettes that are
/// not black at zero.
fn apply_disk_mask(image: &mut RgbImage) {
    let (width, height) = image.dimensions();
    let mut mask = GrayImage::new(width, height);
    let center = ((width / 2) as i32, (height / 2) as i32);
    draw_filled_circle_mut(&mut mask, center, (height / 2) as i32, Luma([255]));

    for (pixel, inside) in image.pixels_mut().zip(mask.pixels()) {
        if inside.0[0] == 0 {
            *pixel = BLACK;
        }
    }
}

/// Draw the ring boundaries and the angular dividers of segments 1 to 16.
pub fn draw_segments_grid(image: &mut RgbImage) {
    let (width, height) = image.dimensions();
    let center = ((width / 2) as i32, (height / 2) as i32);
    for fraction in [0.25, 0.5, 0.75] {
        let radius = (fraction * f64::from(height) / 2.0).floor() as i32;
        draw_hollow_circle_mut(image, center, radius, BLACK);
    }
    // outermost ring one pixel inside the border
    draw_hollow_circle_mut(image, center, (height / 2) as i32 - 1, BLACK);

    let radius = f64::from(height / 2);
    for segment in SEGMENTS.iter().filter(|s| s.id != 17) {
        let [inner, outer, ..] = segment_vertices(segment, radius);
        draw_line_segment_mut(
            image,
            (inner.0 as f32, inner.1 as f32),
            (outer.0 as f32, outer.1 as f32),
            BLACK,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(draw_segments: bool) -> PolarMapOptions {
        PolarMapOptions {
            n_samples: 64,
            output_size: 128,
            draw_segments,
        }
    }

    #[test]
    fn zero_activity_is_black() {
        let zeros = Array2::zeros((40, 120));
        let image = polar_map_image(&zeros.view(), &options(true), &ColorMap::gray());
        assert_eq!(image.dimensions(), (128, 128));
        assert!(image.pixels().all(|p| *p == BLACK));
    }

    #[test]
    fn uniform_activity_fills_disk() {
        let ones = Array2::from_elem((40, 120), 1.0);
        let image = polar_map_image(&ones.view(), &options(false), &ColorMap::gray());
        assert!(image.get_pixel(64, 64).0[0] >= 250);
        assert!(image.get_pixel(64, 20).0[0] >= 250);
        assert_eq!(*image.get_pixel(0, 0), BLACK);
        assert_eq!(*image.get_pixel(127, 127), BLACK);
    }

    #[test]
    fn grid_overlay_is_drawn() {
        let ones = Array2::from_elem((40, 120), 1.0);
        let image = polar_map_image(&ones.view(), &options(true), &ColorMap::gray());
        // 25% ring straight above the center
        assert_eq!(*image.get_pixel(64, 64 - 16), BLACK);
        // 50% ring to the right
        assert_eq!(*image.get_pixel(64 + 32, 64), BLACK);
        assert!(image.get_pixel(64, 64).0[0] >= 250);
    }
}
