use crate::{enums::SortBy, volume::Volume};

use ndarray::{Array2, Array3, ArrayD, Ix3, Zip, s};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error, PartialEq)]
pub enum AssemblyError {
    #[error("No slices to assemble")]
    NoSlices,

    #[error("Slice {index} has dimensions {found:?}, expected {expected:?}")]
    DimensionMismatch {
        index: usize,
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error("Image of shape {shape:?} is a single 2D image, no 3D series available")]
    NotVolumetric { shape: (usize, usize) },

    #[error("Unsupported pixel data shape {shape:?}")]
    UnsupportedShape { shape: Vec<usize> },
}

/// A decoded 2D image together with its raw instance number, if any
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedSlice {
    pub pixels: Array2<f32>,
    pub instance_number: Option<String>,
}

impl DecodedSlice {
    pub fn new(pixels: Array2<f32>) -> Self {
        Self {
            pixels,
            instance_number: None,
        }
    }

    pub fn with_instance_number(mut self, instance_number: impl Into<String>) -> Self {
        self.instance_number = Some(instance_number.into());
        self
    }

    fn sort_key(&self) -> Option<i32> {
        self.instance_number.as_deref()?.trim().parse().ok()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Slice {slice} has no integer instance number, slices kept in upload order")]
pub struct SortKeyMissing {
    /// Upload position of the first slice without a usable key
    pub slice: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SliceOrdering {
    /// Sorted by ascending instance number
    Sorted,
    /// Sorting was not requested
    Unsorted,
    /// Sorting was requested but skipped, the order may be anatomically wrong
    UploadOrder(SortKeyMissing),
}

impl SliceOrdering {
    pub fn warning(&self) -> Option<&SortKeyMissing> {
        match self {
            SliceOrdering::UploadOrder(warning) => Some(warning),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub struct Assembly {
    pub volume: Volume,
    pub ordering: SliceOrdering,
}

pub struct VolumeAssembler;

impl VolumeAssembler {
    /// Assemble a volume from 2D slices
    ///
    /// # Arguments
    ///
    /// * `slices` - Decoded slices in upload order
    /// * `sort_by` - Method to sort the slices
    ///
    /// # Errors
    ///
    /// Returns error if there are no slices or their dimensions are inconsistent
    pub fn assemble_slices(
        mut slices: Vec<DecodedSlice>,
        sort_by: SortBy,
    ) -> Result<Assembly, AssemblyError> {
        if slices.is_empty() {
            return Err(AssemblyError::NoSlices);
        }

        let ordering = Self::sort_slices(&mut slices, sort_by);

        let images: Vec<_> = slices.into_iter().map(|slice| slice.pixels).collect();

        Self::validate_dimensions(&images)?;

        let volume_array = Self::build_volume_array(&images);
        debug!(shape = ?volume_array.dim(), ?ordering, "stacked slices");

        Ok(Assembly {
            volume: Self::normalize(&volume_array),
            ordering,
        })
    }

    /// Assemble a volume from a single decoded array, e.g. a multi-frame object
    ///
    /// # Errors
    ///
    /// Returns [`AssemblyError::NotVolumetric`] for 2D arrays and
    /// [`AssemblyError::UnsupportedShape`] for any rank other than 2 or 3
    pub fn assemble_array(array: ArrayD<f32>) -> Result<Volume, AssemblyError> {
        let shape = array.shape().to_vec();
        match shape.len() {
            3 => {
                let volume_array = array
                    .into_dimensionality::<Ix3>()
                    .map_err(|_| AssemblyError::UnsupportedShape { shape })?;
                Ok(Self::normalize(&volume_array))
            }
            2 => Err(AssemblyError::NotVolumetric {
                shape: (shape[0], shape[1]),
            }),
            _ => Err(AssemblyError::UnsupportedShape { shape }),
        }
    }

    /// Global min-max normalization to the full 8-bit range.
    ///
    /// A constant volume maps to all zeros. Non-finite samples are left out of
    /// the min/max and map to zero.
    pub fn normalize(data: &Array3<f32>) -> Volume {
        let (min, max) = data
            .iter()
            .filter(|v| v.is_finite())
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            });
        let range = max - min;

        let normalized = if range.is_finite() && range > 0.0 {
            Zip::from(data).par_map_collect(|&v| {
                if v.is_finite() {
                    (((v - min) / range) * 255.0) as u8
                } else {
                    0
                }
            })
        } else {
            Array3::zeros(data.raw_dim())
        };

        Volume::new(normalized)
    }

    fn sort_slices(slices: &mut [DecodedSlice], sort_by: SortBy) -> SliceOrdering {
        if matches!(sort_by, SortBy::None) {
            return SliceOrdering::Unsorted;
        }

        if let Some(slice) = slices.iter().position(|slice| slice.sort_key().is_none()) {
            let warning = SortKeyMissing { slice };
            warn!("{warning}");
            return SliceOrdering::UploadOrder(warning);
        }

        slices.sort_by_cached_key(DecodedSlice::sort_key);
        SliceOrdering::Sorted
    }

    fn validate_dimensions(images: &[Array2<f32>]) -> Result<(), AssemblyError> {
        let expected = images[0].dim();
        match images.iter().position(|img| img.dim() != expected) {
            Some(index) => Err(AssemblyError::DimensionMismatch {
                index,
                expected,
                found: images[index].dim(),
            }),
            None => Ok(()),
        }
    }

    fn build_volume_array(images: &[Array2<f32>]) -> Array3<f32> {
        let (height, width) = images[0].dim();
        let depth = images.len();
        let mut volume = Array3::<f32>::zeros((depth, height, width));

        for (i, image) in images.iter().enumerate() {
            volume.slice_mut(s![i, .., ..]).assign(image);
        }

        volume
    }
}
