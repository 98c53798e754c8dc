use std::path::Path;

use image::{Rgb, RgbImage};
use ndarray::ArrayView2;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ColorMapError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Color map needs 256 entries, found {0}")]
    WrongLength(usize),
}

/// Byte to RGB lookup table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColorMap {
    lut: [[u8; 3]; 256],
}

#[derive(Deserialize)]
struct Entry {
    r: u8,
    g: u8,
    b: u8,
}

const INFERNO_STOPS: [(u8, [u8; 3]); 9] = [
    (0, [0, 0, 4]),
    (32, [40, 11, 84]),
    (64, [101, 21, 110]),
    (96, [159, 42, 99]),
    (128, [212, 72, 66]),
    (160, [245, 125, 21]),
    (192, [250, 193, 39]),
    (224, [241, 237, 113]),
    (255, [252, 255, 164]),
];

impl Default for ColorMap {
    fn default() -> Self {
        Self::inferno()
    }
}

impl ColorMap {
    pub fn gray() -> Self {
        Self {
            lut: std::array::from_fn(|i| [i as u8; 3]),
        }
    }

    /// Piecewise-linear rendition of the inferno palette.
    pub fn inferno() -> Self {
        Self::from_stops(&INFERNO_STOPS)
    }

    /// Linear interpolation between `(index, color)` stops sorted by index.
    pub fn from_stops(stops: &[(u8, [u8; 3])]) -> Self {
        let lut = std::array::from_fn(|i| {
            let upper = stops
                .iter()
                .position(|(at, _)| usize::from(*at) >= i)
                .unwrap_or(stops.len() - 1);
            if upper == 0 {
                return stops[0].1;
            }
            let (a, ca) = stops[upper - 1];
            let (b, cb) = stops[upper];
            let span = f32::from(b) - f32::from(a);
            let t = if span > 0.0 {
                ((i as f32 - f32::from(a)) / span).clamp(0.0, 1.0)
            } else {
                1.0
            };
            std::array::from_fn(|c| {
                (f32::from(ca[c]) + t * (f32::from(cb[c]) - f32::from(ca[c]))).round() as u8
            })
        });
        Self { lut }
    }

    /// Load a palette table with `r`, `g` and `b` columns and 256 rows.
    pub fn from_csv(path: impl AsRef<Path>) -> Result<Self, ColorMapError> {
        let mut reader = csv::Reader::from_path(path)?;
        let entries = reader
            .deserialize::<Entry>()
            .collect::<Result<Vec<_>, _>>()?;
        if entries.len() != 256 {
            return Err(ColorMapError::WrongLength(entries.len()));
        }

        let mut lut = [[0; 3]; 256];
        for (slot, entry) in lut.iter_mut().zip(entries) {
            *slot = [entry.r, entry.g, entry.b];
        }
        Ok(Self { lut })
    }

    #[inline]
    pub fn color(&self, value: u8) -> [u8; 3] {
        self.lut[usize::from(value)]
    }

    /// Colorize a `[row, column]` byte image.
    pub fn colorize(&self, image: &ArrayView2<u8>) -> RgbImage {
        let (height, width) = image.dim();
        RgbImage::from_fn(width as u32, height as u32, |x, y| {
            Rgb(self.color(image[[y as usize, x as usize]]))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use std::io::Write;

    #[test]
    fn inferno_hits_its_stops() {
        let map = ColorMap::inferno();
        for (at, color) in INFERNO_STOPS {
            assert_eq!(map.color(at), color);
        }
        assert_eq!(map.color(16), [20, 6, 44]);
    }

    #[test]
    fn colorize_keeps_layout() {
        let image = ColorMap::gray().colorize(&array![[0u8, 10, 20], [30, 40, 50]].view());
        assert_eq!(image.dimensions(), (3, 2));
        assert_eq!(image.get_pixel(2, 1), &Rgb([50, 50, 50]));
    }

    #[test]
    fn palette_from_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("red.cm");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "r,g,b").unwrap();
        for i in 0..256 {
            writeln!(file, "{i},0,0").unwrap();
        }
        drop(file);

        let map = ColorMap::from_csv(&path).unwrap();
        assert_eq!(map.color(200), [200, 0, 0]);
    }

    #[test]
    fn short_palette_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.cm");
        std::fs::write(&path, "r,g,b\n1,2,3\n").unwrap();
        assert!(matches!(
            ColorMap::from_csv(&path),
            Err(ColorMapError::WrongLength(1))
        ));
    }
}
