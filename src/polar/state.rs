use crate::colormap::ColorMap;
use crate::display::radial_activity_image;
use crate::reactive::{Cell, Composite, ConfigError, Derived, Reactive, impl_reactive_via};

use super::map::{PolarMapOptions, polar_map_image};
use super::segment::{SegmentScores, segment_center};

use image::RgbImage;
use ndarray::Array2;

/// Score text anchored at a pixel of the polar map image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScoreLabel {
    pub segment: u8,
    pub position: (i32, i32),
    pub score: u8,
}

/// Bullseye image and segment scores of a radial-activity map.
#[derive(Clone)]
pub struct PolarMapState {
    pub radial_activities: Cell<Array2<f64>>,
    pub n_samples: Cell<usize>,
    pub output_size: Cell<u32>,
    pub draw_segments: Cell<bool>,
    pub colormap: Cell<ColorMap>,
    pub image: Derived<RgbImage>,
    pub activity_image: Derived<RgbImage>,
    pub scores: Derived<SegmentScores>,
    node: Composite,
}

impl PolarMapState {
    pub fn new(
        radial_activities: &Cell<Array2<f64>>,
        options: &PolarMapOptions,
        colormap: ColorMap,
    ) -> Result<Self, ConfigError> {
        let n_samples = Cell::new(options.n_samples);
        let output_size = Cell::new(options.output_size);
        let draw_segments = Cell::new(options.draw_segments);
        let colormap = Cell::new(colormap);
        let node = Composite::builder("polar_map")
            .field("n_samples", &n_samples)?
            .field("output_size", &output_size)?
            .field("draw_segments", &draw_segments)?
            .field("colormap", &colormap)?
            .build();

        let image = {
            let activities = radial_activities.clone();
            let (n_samples, output_size, draw_segments, colormap) = (
                n_samples.clone(),
                output_size.clone(),
                draw_segments.clone(),
                colormap.clone(),
            );
            Derived::object(&[&activities.clone(), &node], move || {
                let options = PolarMapOptions {
                    n_samples: n_samples.get(),
                    output_size: output_size.get(),
                    draw_segments: draw_segments.get(),
                };
                activities.with(|a| colormap.with(|c| polar_map_image(&a.view(), &options, c)))
            })
        };

        let activity_image = {
            let (activities, colormap) = (radial_activities.clone(), colormap.clone());
            Derived::object(&[&activities.clone(), &colormap.clone()], move || {
                activities.with(|a| colormap.with(|c| radial_activity_image(&a.view(), c)))
            })
        };

        let scores = {
            let activities = radial_activities.clone();
            Derived::new(&[&activities.clone()], move || {
                activities.with(|a| SegmentScores::compute(&a.view()))
            })
        };

        Ok(Self {
            radial_activities: radial_activities.clone(),
            n_samples,
            output_size,
            draw_segments,
            colormap,
            image,
            activity_image,
            scores,
            node,
        })
    }

    pub fn options(&self) -> PolarMapOptions {
        PolarMapOptions {
            n_samples: self.n_samples.get(),
            output_size: self.output_size.get(),
            draw_segments: self.draw_segments.get(),
        }
    }

    pub fn set_options(&self, options: &PolarMapOptions) {
        let _batch = self.batch();
        self.n_samples.set(options.n_samples);
        self.output_size.set(options.output_size);
        self.draw_segments.set(options.draw_segments);
    }

    /// Score labels at the segment centers of the current image, empty
    /// unless segments are drawn.
    pub fn score_labels(&self) -> Vec<ScoreLabel> {
        if !self.draw_segments.get() {
            return Vec::new();
        }
        let radius = f64::from(self.image.with(|image| image.height()) / 2);
        self.scores.with(|scores| {
            scores
                .iter()
                .map(|(segment, score)| ScoreLabel {
                    segment: segment.id,
                    position: segment_center(segment, radius),
                    score,
                })
                .collect()
        })
    }
}

impl_reactive_via!(PolarMapState, node);
