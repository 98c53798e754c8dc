use crate::{enums::SortBy, volume::Volume};

use dicom::{
    core::Tag,
    object::{FileDicomObject, InMemDicomObject, open_file},
    pixeldata::{ConvertOptions, PixelDecoder, VoiLutOption},
};
use dicom_dictionary_std::tags;
use log::info;
use nalgebra::{Matrix3, Vector3};
use ndarray::{Array2, Array3, Axis, s};
use std::{fs, path::Path};
use thiserror::Error;

/// Private Siemens tag holding a factor the stored values are scaled by.
pub const PIXEL_SCALE_FACTOR: Tag = Tag(0x0033, 0x1038);

#[derive(Debug, Error)]
pub enum VolumeLoaderError {
    #[error("no decodable image in the series")]
    NoValidImages,

    #[error("slices differ in size: {expected:?} vs {found:?}")]
    InconsistentDimensions {
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error("neither pixel spacing nor slice spacing could be read")]
    MissingSpacing,

    #[error("cannot decode pixel data: {0}")]
    PixelData(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("cannot read DICOM file: {0}")]
    Dicom(#[from] dicom::object::ReadError),
}

/// Something that turns a path into a volume.
pub trait VolumeSource {
    fn load(&self, path: &Path) -> Result<Volume, VolumeLoaderError>;
}

/// DICOM files on disk, see [`VolumeLoader::load`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DicomSource {
    pub sort_by: SortBy,
    pub target_range_mm: f64,
}

impl Default for DicomSource {
    fn default() -> Self {
        Self {
            sort_by: SortBy::default(),
            target_range_mm: 300.0,
        }
    }
}

impl VolumeSource for DicomSource {
    fn load(&self, path: &Path) -> Result<Volume, VolumeLoaderError> {
        VolumeLoader::load(path, self.sort_by, self.target_range_mm)
    }
}

/// Numeric value of `tag`, `None` if the element is absent or not numeric.
pub fn try_get(dicom_object: &InMemDicomObject, tag: Tag) -> Option<f64> {
    dicom_object.element(tag).ok()?.to_float64().ok()
}

/// All numeric values of `tag`.
pub fn try_get_multi(dicom_object: &InMemDicomObject, tag: Tag) -> Option<Vec<f64>> {
    dicom_object.element(tag).ok()?.to_multi_float64().ok()
}

/// Optional tags that adjust a loaded SPECT volume.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SeriesTags {
    pub spacing_between_slices: Option<f64>,
    pub slice_thickness: Option<f64>,
    pub pixel_scale_factor: Option<f64>,
}

impl SeriesTags {
    pub fn read(dicom_object: &InMemDicomObject) -> Self {
        Self {
            spacing_between_slices: try_get(dicom_object, tags::SPACING_BETWEEN_SLICES),
            slice_thickness: try_get(dicom_object, tags::SLICE_THICKNESS),
            pixel_scale_factor: try_get(dicom_object, PIXEL_SCALE_FACTOR),
        }
    }

    /// Apply the tags to a freshly assembled volume:
    ///
    ///  - a negative spacing between slices reverses the slice order
    ///  - values are divided by the pixel scale factor
    ///  - when both spacing and thickness are present the thickness is the
    ///    z spacing (some cameras store twice the thickness as spacing)
    pub fn apply(&self, mut volume: Volume) -> Volume {
        if self.spacing_between_slices.is_some_and(|s| s < 0.0) {
            volume = volume.flip([false, false, true]);
        }
        if let Some(scale) = self.pixel_scale_factor.filter(|s| *s != 0.0) {
            let scale = scale as f32;
            volume.data.mapv_inplace(|v| v / scale);
        }
        if let (Some(_), Some(thickness)) = (self.spacing_between_slices, self.slice_thickness) {
            volume.spacing.z = thickness;
        }
        volume
    }
}

/// Square-pad and cut or pad to `target_range_mm` along every axis.
pub fn fit_to_range(volume: &Volume, target_range_mm: f64) -> Volume {
    let padded = volume.square_pad(0.0);
    let target = (target_range_mm / padded.spacing.x).round().max(1.0) as usize;
    padded.pad_crop([target; 3], 0.0)
}

pub struct VolumeLoader;

impl VolumeLoader {
    /// Load a multi-frame file or a directory of single-frame slices and
    /// bring it into the working geometry.
    ///
    /// # Errors
    ///
    /// Returns an error if the path cannot be read or contains no usable
    /// image.
    pub fn load(
        path: impl AsRef<Path>,
        sort_by: SortBy,
        target_range_mm: f64,
    ) -> Result<Volume, VolumeLoaderError> {
        let path = path.as_ref();
        let (volume, series_tags) = if path.is_dir() {
            Self::load_from_directory(path, sort_by)?
        } else {
            Self::load_multi_frame(path)?
        };

        let volume = fit_to_range(&series_tags.apply(volume), target_range_mm);
        info!(
            "loaded {} as {:?} volume, spacing {:?}",
            path.display(),
            volume.size(),
            volume.spacing.as_slice()
        );
        Ok(volume)
    }

    /// Load a reconstruction stored as one multi-frame file, frames along z.
    pub fn load_multi_frame(
        path: impl AsRef<Path>,
    ) -> Result<(Volume, SeriesTags), VolumeLoaderError> {
        let dicom_object = open_file(path.as_ref())?;
        let pixel_data = dicom_object
            .decode_pixel_data()
            .map_err(|e| VolumeLoaderError::PixelData(e.to_string()))?;
        let options = ConvertOptions::new().with_voi_lut(VoiLutOption::Identity);
        let frames = pixel_data
            .to_ndarray_with_options::<f32>(&options)
            .map_err(|e| VolumeLoaderError::PixelData(e.to_string()))?;
        if frames.is_empty() {
            return Err(VolumeLoaderError::NoValidImages);
        }
        let data = frames.slice_move(s![.., .., .., 0]);

        let spacing =
            Self::get_spacing(std::slice::from_ref(&dicom_object)).ok_or(VolumeLoaderError::MissingSpacing)?;
        let (origin, direction) = Self::get_geometry(&dicom_object);
        let volume = Volume::with_geometry(data, spacing, origin, direction);
        Ok((volume, SeriesTags::read(&dicom_object)))
    }

    /// Stack single-frame objects into a volume.
    ///
    /// Objects without a sort key or without decodable pixels are skipped.
    /// Geometry and series tags are taken from the first object.
    pub fn load_from_dicom_objects(
        dicom_objects: &[FileDicomObject<InMemDicomObject>],
        sort_by: SortBy,
    ) -> Result<(Volume, SeriesTags), VolumeLoaderError> {
        let first = dicom_objects.first().ok_or(VolumeLoaderError::NoValidImages)?;

        let mut slices: Vec<Slice> = dicom_objects
            .iter()
            .filter_map(|dicom_object| Slice::read(dicom_object, sort_by))
            .collect();
        if slices.is_empty() {
            return Err(VolumeLoaderError::NoValidImages);
        }
        order_slices(&mut slices, sort_by);

        let data = stack_slices(&slices)?;
        let spacing = Self::get_spacing(dicom_objects).ok_or(VolumeLoaderError::MissingSpacing)?;
        let (origin, direction) = Self::get_geometry(first);

        Ok((
            Volume::with_geometry(data, spacing, origin, direction),
            SeriesTags::read(first),
        ))
    }

    /// Open every path and stack the objects, see [`Self::load_from_dicom_objects`].
    pub fn load_from_file_paths(
        paths: &[impl AsRef<Path>],
        sort_by: SortBy,
    ) -> Result<(Volume, SeriesTags), VolumeLoaderError> {
        let mut dicom_objects = Vec::with_capacity(paths.len());
        for path in paths {
            dicom_objects.push(open_file(path.as_ref())?);
        }
        Self::load_from_dicom_objects(&dicom_objects, sort_by)
    }

    /// Every `*.dcm` file directly inside `path` is one slice.
    pub fn load_from_directory(
        path: impl AsRef<Path>,
        sort_by: SortBy,
    ) -> Result<(Volume, SeriesTags), VolumeLoaderError> {
        let is_dcm = |p: &Path| {
            p.extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("dcm"))
        };
        let mut paths = Vec::new();
        for entry in fs::read_dir(path.as_ref())? {
            let entry_path = entry?.path();
            if is_dcm(&entry_path) {
                paths.push(entry_path);
            }
        }
        if paths.is_empty() {
            return Err(VolumeLoaderError::NoValidImages);
        }
        // read_dir order is unspecified; keep SortBy::None deterministic
        paths.sort();

        Self::load_from_file_paths(&paths, sort_by)
    }

    /// `(x, y, z)` spacing. Pixel spacing is stored as (row, column)
    /// distance; z comes from the slice spacing, falling back to the
    /// thickness.
    fn get_spacing(dicom_objects: &[FileDicomObject<InMemDicomObject>]) -> Option<[f64; 3]> {
        dicom_objects.iter().find_map(|dicom_object| {
            let pixel_spacing = try_get_multi(dicom_object, tags::PIXEL_SPACING)?;
            let (row, column) = (*pixel_spacing.first()?, *pixel_spacing.get(1)?);
            let z = try_get(dicom_object, tags::SPACING_BETWEEN_SLICES)
                .map(f64::abs)
                .filter(|s| *s > 0.0)
                .or_else(|| try_get(dicom_object, tags::SLICE_THICKNESS))?;
            Some([column, row, z])
        })
    }

    /// Origin and direction cosines, identity and zero if absent.
    fn get_geometry(dicom_object: &InMemDicomObject) -> ([f64; 3], Matrix3<f64>) {
        let origin = try_get_multi(dicom_object, tags::IMAGE_POSITION_PATIENT)
            .and_then(|p| <[f64; 3]>::try_from(p.get(..3)?).ok())
            .unwrap_or([0.0; 3]);

        let direction = try_get_multi(dicom_object, tags::IMAGE_ORIENTATION_PATIENT)
            .filter(|cosines| cosines.len() == 6)
            .map(|c| {
                let row = Vector3::new(c[0], c[1], c[2]);
                let column = Vector3::new(c[3], c[4], c[5]);
                Matrix3::from_columns(&[row, column, row.cross(&column)])
            })
            .unwrap_or_else(Matrix3::identity);

        (origin, direction)
    }
}

/// One decoded frame with the key it is ordered by.
struct Slice {
    key: Option<f64>,
    pixels: Array2<f32>,
}

impl Slice {
    fn read(dicom_object: &FileDicomObject<InMemDicomObject>, sort_by: SortBy) -> Option<Self> {
        let key = match sort_by {
            // slices without a position cannot be placed
            SortBy::ImagePositionPatient => {
                try_get_multi(dicom_object, tags::IMAGE_POSITION_PATIENT)?
                    .get(2)
                    .copied()
            }
            SortBy::TablePosition => try_get(dicom_object, tags::TABLE_POSITION),
            SortBy::InstanceNumber => try_get(dicom_object, tags::INSTANCE_NUMBER),
            SortBy::None => None,
        };

        let options = ConvertOptions::new().with_voi_lut(VoiLutOption::Identity);
        let frames = dicom_object
            .decode_pixel_data()
            .ok()?
            .to_ndarray_with_options::<f32>(&options)
            .ok()?;
        Some(Self {
            key,
            pixels: frames.slice_move(s![0, .., .., 0]),
        })
    }
}

/// Ascending by key, patient positions descending (head first).
/// Missing keys sort first; the sort is stable.
fn order_slices(slices: &mut [Slice], sort_by: SortBy) {
    if sort_by == SortBy::None {
        return;
    }
    slices.sort_by(|a, b| match (a.key, b.key) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        (x, y) => x.is_some().cmp(&y.is_some()),
    });
    if sort_by == SortBy::ImagePositionPatient {
        slices.reverse();
    }
}

fn stack_slices(slices: &[Slice]) -> Result<Array3<f32>, VolumeLoaderError> {
    let expected = slices[0].pixels.dim();
    if let Some(odd) = slices.iter().find(|slice| slice.pixels.dim() != expected) {
        return Err(VolumeLoaderError::InconsistentDimensions {
            expected,
            found: odd.pixels.dim(),
        });
    }
    let views: Vec<_> = slices.iter().map(|slice| slice.pixels.view()).collect();
    ndarray::stack(Axis(0), &views).map_err(|e| VolumeLoaderError::PixelData(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use dicom::core::{DataElement, PrimitiveValue, VR};

    fn object(elements: &[(Tag, &str)]) -> InMemDicomObject {
        InMemDicomObject::from_element_iter(
            elements
                .iter()
                .map(|(tag, value)| DataElement::new(*tag, VR::DS, PrimitiveValue::from(*value))),
        )
    }

    #[test]
    fn absent_tags_are_none() {
        let dicom_object = object(&[(tags::SLICE_THICKNESS, "3.5")]);
        assert_eq!(try_get(&dicom_object, tags::SLICE_THICKNESS), Some(3.5));
        assert_eq!(try_get(&dicom_object, PIXEL_SCALE_FACTOR), None);
        assert_eq!(
            SeriesTags::read(&dicom_object),
            SeriesTags {
                slice_thickness: Some(3.5),
                ..Default::default()
            }
        );
    }

    #[test]
    fn series_tags_adjust_the_volume() {
        let dicom_object = object(&[
            (tags::SPACING_BETWEEN_SLICES, "-8.0"),
            (tags::SLICE_THICKNESS, "4.0"),
            (PIXEL_SCALE_FACTOR, "2.0"),
        ]);
        let series_tags = SeriesTags::read(&dicom_object);
        let data = Array3::from_shape_fn((3, 2, 2), |(z, _, _)| z as f32 * 2.0);
        let volume = series_tags.apply(Volume::new(data, [4.0, 4.0, 8.0]));

        assert_eq!(volume.spacing.z, 4.0);
        // reversed and scaled
        assert_eq!(volume.data[[0, 0, 0]], 2.0);
        assert_eq!(volume.data[[2, 1, 1]], 0.0);
    }

    #[test]
    fn fitting_yields_target_cube() {
        let volume = Volume::new(Array3::from_elem((10, 20, 30), 1.0), [4.0, 4.0, 4.0]);
        let fitted = fit_to_range(&volume, 100.0);
        assert_eq!(fitted.size(), [25, 25, 25]);
        // the original center stays in the middle
        assert_eq!(fitted.data[[12, 12, 12]], 1.0);
        assert_eq!(fitted.data[[0, 0, 0]], 0.0);
    }

    fn slice(key: Option<f64>, value: f32) -> Slice {
        Slice {
            key,
            pixels: Array2::from_elem((2, 3), value),
        }
    }

    #[test]
    fn slices_are_ordered_head_first() {
        let mut slices = vec![slice(Some(-4.0), 1.0), slice(Some(8.0), 2.0), slice(Some(0.0), 3.0)];
        order_slices(&mut slices, SortBy::ImagePositionPatient);
        let values: Vec<f32> = slices.iter().map(|s| s.pixels[[0, 0]]).collect();
        assert_eq!(values, [2.0, 3.0, 1.0]);

        order_slices(&mut slices, SortBy::InstanceNumber);
        let data = stack_slices(&slices).unwrap();
        assert_eq!(data.dim(), (3, 2, 3));
        assert_eq!(data[[0, 1, 2]], 1.0);
    }

    #[test]
    fn mismatched_slices_are_rejected() {
        let mut slices = vec![slice(None, 0.0), slice(None, 0.0)];
        slices[1].pixels = Array2::zeros((4, 4));
        let err = stack_slices(&slices).unwrap_err();
        assert!(matches!(
            err,
            VolumeLoaderError::InconsistentDimensions {
                expected: (2, 3),
                found: (4, 4)
            }
        ));
    }
}
