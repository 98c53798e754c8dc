use std::fs;
use std::path::{Path, PathBuf};

use crate::enums::PolarExecution;
use crate::polar::{PolarMapOptions, SamplingSettings};
use crate::reorientation::ReorientationParameters;

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigFileError {
    #[error("Failed to read config {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Invalid sampling in config {}: {reason}", .path.display())]
    Sampling { path: PathBuf, reason: String },
}

/// Settings of a headless run.
#[derive(Debug, Deserialize)]
pub struct RuntimeConfig {
    /// DICOM file or directory of slices.
    #[serde(rename = "input")]
    pub input_path: PathBuf,
    pub output: OutputConfig,
    /// Start from these parameters instead of the geometric center.
    #[serde(default)]
    pub reorientation: Option<ReorientationParameters>,
    /// Reorientation table to look the input file name up in.
    #[serde(default)]
    pub reorientation_table: Option<PathBuf>,
    #[serde(default = "default_clip_percentage")]
    pub clip_percentage: f64,
    #[serde(default)]
    pub sampling: SamplingSettings,
    #[serde(default)]
    pub polar_map: PolarMapOptions,
    /// `r,g,b` palette table, inferno if unset.
    #[serde(default)]
    pub colormap: Option<PathBuf>,
    #[serde(default = "default_target_range_mm")]
    pub target_range_mm: f64,
    #[serde(default)]
    pub execution: PolarExecution,
}

#[derive(Debug, Deserialize)]
pub struct OutputConfig {
    pub directory: PathBuf,
    /// Also write the center slice of every view.
    #[serde(default)]
    pub view_images: bool,
}

fn default_clip_percentage() -> f64 {
    1.0
}

fn default_target_range_mm() -> f64 {
    300.0
}

pub fn load_config(path: &Path) -> Result<RuntimeConfig, ConfigFileError> {
    let data = fs::read_to_string(path).map_err(|source| ConfigFileError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let config: RuntimeConfig =
        serde_json::from_str(&data).map_err(|source| ConfigFileError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    config
        .sampling
        .validate()
        .map_err(|reason| ConfigFileError::Sampling {
            path: path.to_path_buf(),
            reason,
        })?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.json");
        fs::write(
            &path,
            r#"{
                "input": "scan.dcm",
                "output": { "directory": "out" },
                "sampling": { "weighting": false },
                "execution": "background"
            }"#,
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.input_path, PathBuf::from("scan.dcm"));
        assert!(!config.output.view_images);
        assert_eq!(config.clip_percentage, 1.0);
        assert_eq!(config.target_range_mm, 300.0);
        assert!(!config.sampling.weighting);
        assert_eq!(config.sampling.polar_angle_count, 10);
        assert_eq!(config.polar_map, PolarMapOptions::default());
        assert_eq!(config.execution, PolarExecution::Background);
        assert!(config.reorientation.is_none());
    }

    #[test]
    fn errors_name_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.json");
        let err = load_config(&missing).unwrap_err();
        assert!(matches!(err, ConfigFileError::Read { .. }));
        assert!(err.to_string().contains("missing.json"));

        let broken = dir.path().join("broken.json");
        fs::write(&broken, "{ \"input\": 3 }").unwrap();
        assert!(matches!(load_config(&broken), Err(ConfigFileError::Parse { .. })));
    }

    #[test]
    fn zero_radius_step_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.json");
        fs::write(
            &path,
            r#"{
                "input": "scan.dcm",
                "output": { "directory": "out" },
                "sampling": { "radii_step": 0 }
            }"#,
        )
        .unwrap();

        let err = load_config(&path).unwrap_err();
        assert!(matches!(err, ConfigFileError::Sampling { .. }));
        assert!(err.to_string().contains("radii_step"));
    }
}
