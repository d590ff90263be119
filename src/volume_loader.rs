use crate::{
    enums::SortBy,
    volume::Volume,
    volume_assembler::{Assembly, AssemblyError, DecodedSlice, SliceOrdering, VolumeAssembler},
};

use dicom::{
    object::{
        FileDicomObject, InMemDicomObject, OpenFileOptions, ReadError, file::ReadPreamble,
        open_file,
    },
    pixeldata::{ConvertOptions, PixelDecoder, VoiLutOption},
};
use dicom_dictionary_std::tags;
use ndarray::{ArrayD, Axis, Ix2};
use std::{
    fs,
    io::Read,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::{debug, warn};
use web_time::Instant;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum VolumeLoaderError {
    #[error("No DICOM files found")]
    NoValidImages,

    #[error("Failed to decode {name}: {source}")]
    DecodeFailure {
        name: String,
        #[source]
        source: BoxError,
    },

    #[error(transparent)]
    Assembly(#[from] AssemblyError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl VolumeLoaderError {
    fn decode(name: &str, source: impl Into<BoxError>) -> Self {
        VolumeLoaderError::DecodeFailure {
            name: name.to_string(),
            source: source.into(),
        }
    }
}

/// Pixel data and ordering key of one decoded DICOM object
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub name: String,
    pub pixels: ArrayD<f32>,
    pub instance_number: Option<String>,
}

pub struct VolumeLoader;

impl VolumeLoader {
    /// Load a volume from named DICOM objects
    ///
    /// A single object must hold a multi-frame volume. Several objects are
    /// stacked as 2D slices.
    ///
    /// # Errors
    ///
    /// Returns error if any object fails to decode or the decoded images
    /// cannot be assembled into a volume
    pub fn load_from_dicom_objects(
        dicom_objects: &[(String, FileDicomObject<InMemDicomObject>)],
        sort_by: SortBy,
    ) -> Result<Assembly, VolumeLoaderError> {
        let started = Instant::now();
        let images = dicom_objects
            .iter()
            .map(|(name, dicom_object)| Self::decode_image(name, dicom_object))
            .collect::<Result<Vec<_>, _>>()?;

        let assembly = Self::assemble(images, sort_by)?;
        debug!(
            files = dicom_objects.len(),
            shape = ?assembly.volume.dim(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "loaded volume"
        );
        Ok(assembly)
    }

    /// Load a volume from file paths
    pub fn load_from_file_paths(
        paths: &[impl AsRef<Path>],
        sort_by: SortBy,
    ) -> Result<Assembly, VolumeLoaderError> {
        let objects = paths
            .iter()
            .map(|path| {
                let path = path.as_ref();
                let name = path.display().to_string();
                let object = open_file(path).map_err(|e| VolumeLoaderError::decode(&name, e))?;
                Ok((name, object))
            })
            .collect::<Result<Vec<_>, VolumeLoaderError>>()?;

        Self::load_from_dicom_objects(&objects, sort_by)
    }

    /// Load a volume from a directory containing .dcm files
    ///
    /// Files are taken in file name order, which stands in for upload order.
    pub fn load_from_directory(
        path: impl AsRef<Path>,
        sort_by: SortBy,
    ) -> Result<Assembly, VolumeLoaderError> {
        let mut paths: Vec<PathBuf> = fs::read_dir(path.as_ref())?
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| Self::is_dicom_path(path))
            .collect();

        if paths.is_empty() {
            return Err(VolumeLoaderError::NoValidImages);
        }
        paths.sort();

        Self::load_from_file_paths(&paths, sort_by)
    }

    /// Load a volume from byte streams of complete DICOM files, preamble included
    pub fn load_from_readers<R: Read>(
        sources: impl IntoIterator<Item = (String, R)>,
        sort_by: SortBy,
    ) -> Result<Assembly, VolumeLoaderError> {
        let objects = sources
            .into_iter()
            .map(|(name, source)| {
                let object =
                    Self::read_object(source).map_err(|e| VolumeLoaderError::decode(&name, e))?;
                Ok((name, object))
            })
            .collect::<Result<Vec<_>, VolumeLoaderError>>()?;

        if objects.is_empty() {
            return Err(VolumeLoaderError::NoValidImages);
        }

        Self::load_from_dicom_objects(&objects, sort_by)
    }

    /// Accepts the `.dcm` extension in any case
    pub fn is_dicom_path(path: &Path) -> bool {
        path.extension()
            .and_then(|s| s.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("dcm"))
    }

    fn read_object<R: Read>(source: R) -> Result<FileDicomObject<InMemDicomObject>, ReadError> {
        OpenFileOptions::new()
            .read_preamble(ReadPreamble::Always)
            .from_reader(source)
    }

    /// Decode pixel data into an array without unit sample and frame axes.
    ///
    /// The first VOI LUT or window of the object is applied. Objects without
    /// one keep their rescaled values, so intensities stay comparable across
    /// slices. Objects whose VOI LUT cannot be applied are converted without it.
    pub fn decode_image(
        name: &str,
        dicom_object: &FileDicomObject<InMemDicomObject>,
    ) -> Result<DecodedImage, VolumeLoaderError> {
        let pixel_data = dicom_object
            .decode_pixel_data()
            .map_err(|e| VolumeLoaderError::decode(name, e))?;

        let options = ConvertOptions::new().with_voi_lut(Self::voi_lut_option(dicom_object));
        let array = match pixel_data.to_ndarray_with_options::<f32>(&options) {
            Ok(array) => array,
            Err(e) => {
                warn!("{name}: VOI LUT not applied ({e})");
                pixel_data
                    .to_ndarray::<f32>()
                    .map_err(|e| VolumeLoaderError::decode(name, e))?
            }
        };

        // (frames, rows, columns, samples)
        let mut pixels = array.into_dyn();
        if pixels.len_of(Axis(3)) == 1 {
            pixels = pixels.index_axis_move(Axis(3), 0);
        }
        if pixels.len_of(Axis(0)) == 1 {
            pixels = pixels.index_axis_move(Axis(0), 0);
        }

        Ok(DecodedImage {
            name: name.to_string(),
            pixels,
            instance_number: Self::get_instance_number(dicom_object),
        })
    }

    /// Without a window or VOI LUT, `First` falls back to per-frame normalization
    fn voi_lut_option(dicom_object: &FileDicomObject<InMemDicomObject>) -> VoiLutOption {
        let has_voi = [tags::WINDOW_CENTER, tags::VOILUT_SEQUENCE]
            .into_iter()
            .any(|tag| dicom_object.get(tag).is_some());
        if has_voi {
            VoiLutOption::First
        } else {
            VoiLutOption::Identity
        }
    }

    fn get_instance_number(dicom_object: &FileDicomObject<InMemDicomObject>) -> Option<String> {
        dicom_object
            .element(tags::INSTANCE_NUMBER)
            .ok()?
            .to_str()
            .ok()
            .map(|number| number.trim().to_string())
    }

    /// Route decoded images to the matching assembler entry point
    pub fn assemble(
        mut images: Vec<DecodedImage>,
        sort_by: SortBy,
    ) -> Result<Assembly, VolumeLoaderError> {
        if images.len() == 1 {
            let image = images.remove(0);
            let volume: Volume = VolumeAssembler::assemble_array(image.pixels)?;
            return Ok(Assembly {
                volume,
                ordering: SliceOrdering::Unsorted,
            });
        }

        let slices = images
            .into_iter()
            .map(|image| {
                let shape = image.pixels.shape().to_vec();
                let pixels = image
                    .pixels
                    .into_dimensionality::<Ix2>()
                    .map_err(|_| AssemblyError::UnsupportedShape { shape })?;
                Ok(DecodedSlice {
                    pixels,
                    instance_number: image.instance_number,
                })
            })
            .collect::<Result<Vec<_>, AssemblyError>>()?;

        Ok(VolumeAssembler::assemble_slices(slices, sort_by)?)
    }
}
