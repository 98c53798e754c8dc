//! # SPECT reorientation library
//!
//! This crate reorients myocardial perfusion SPECT volumes into the cardiac
//! views and summarizes the short axis as a 17-segment polar map.
//!
//! Reconstructions are read with dicom-rs, either from one multi-frame file
//! or from a directory of single-frame `.dcm` slices. The application state
//! is a small reactive graph ([`reactive`]) in which the editable
//! primitives (file name, rotation angles and center, sampling positions)
//! drive everything derived from them:
//!  - Transversal and sagittal input views
//!  - Horizontal long axis (HLA), short axis (SA) and vertical long axis (VLA)
//!  - Radial activities of the short axis and the bullseye image
//!  - Per-segment scores
//!
//! Resampling and polar sampling run on rayon. The radial-activity
//! computation can also be moved to a background job whose result is applied
//! when it arrives, see [`enums::PolarExecution`].
//!
//! # Examples
//!
//! ## Reorienting a reconstruction and scoring the polar map
//!
//! ```no_run
//! # use spect_reorient::app::AppState;
//! # use spect_reorient::enums::PolarExecution;
//! # use spect_reorient::reorientation::EulerAngles;
//! # use spect_reorient::volume_loader::DicomSource;
//! let state = AppState::new(Box::new(DicomSource::default()), PolarExecution::Inline)
//!     .expect("state graph should be wired");
//! state.open("rest.dcm").expect("should have loaded the reconstruction");
//! state.reorientation.angles.set(EulerAngles::new(0.0, 0.3, -0.5));
//! println!("{}", state.polar_map.scores.get());
//! state.polar_map.image.with(|image| image.save("polar_map.png"))
//!     .expect("should have written the polar map");
//! ```

pub mod app;
pub mod colormap;
pub mod config;
pub mod display;
pub mod enums;
pub mod handles;
mod interpolator;
pub mod persist;
pub mod polar;
pub mod reactive;
pub mod reorientation;
pub mod volume;
pub mod volume_loader;
