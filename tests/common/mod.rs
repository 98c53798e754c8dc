#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;

use ndarray::Array3;
use spect_reorient::volume::Volume;
use spect_reorient::volume_loader::{VolumeLoaderError, VolumeSource};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Cube of zeros with `n` voxels per side.
pub fn zeros(n: usize, spacing: f64) -> Volume {
    Volume::empty([n; 3], [spacing; 3])
}

/// Solid ball of ones with `radius` voxels, centered in an `n` cube.
pub fn sphere(n: usize, radius: f64) -> Volume {
    let c = n as f64 / 2.0;
    let data = Array3::from_shape_fn((n, n, n), |(z, y, x)| {
        let d = [z as f64 - c, y as f64 - c, x as f64 - c];
        let inside = d[0] * d[0] + d[1] * d[1] + d[2] * d[2] <= radius * radius;
        if inside { 1.0 } else { 0.0 }
    });
    Volume::new(data, [4.0; 3])
}

/// Gaussian shell of `radius` voxels around `center` (`[z, y, x]`).
pub fn shell(n: usize, center: [f64; 3], radius: f64) -> Volume {
    let data = Array3::from_shape_fn((n, n, n), |(z, y, x)| {
        let d = [z as f64 - center[0], y as f64 - center[1], x as f64 - center[2]];
        let distance = (d[0] * d[0] + d[1] * d[1] + d[2] * d[2]).sqrt();
        (-(distance - radius).powi(2) / 4.0).exp() as f32
    });
    Volume::new(data, [4.0; 3])
}

/// Volumes keyed by file name, everything else fails to load.
#[derive(Default)]
pub struct Synthetic {
    volumes: HashMap<String, Volume>,
}

impl Synthetic {
    pub fn with(mut self, name: &str, volume: Volume) -> Self {
        self.volumes.insert(name.to_owned(), volume);
        self
    }
}

impl VolumeSource for Synthetic {
    fn load(&self, path: &Path) -> Result<Volume, VolumeLoaderError> {
        path.file_name()
            .and_then(|name| self.volumes.get(name.to_str()?))
            .cloned()
            .ok_or(VolumeLoaderError::NoValidImages)
    }
}
