use crate::enums::Orientation;

use image::{GrayImage, ImageBuffer};
use ndarray::{Array3, ArrayView2, Axis, s};

/// Normalized 8-bit volume with axes (slice, row, column)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Volume {
    data: Array3<u8>,
}

/// Axial, coronal and sagittal slice indices
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SliceIndices {
    pub axial: usize,
    pub coronal: usize,
    pub sagittal: usize,
}

impl SliceIndices {
    pub fn new(axial: usize, coronal: usize, sagittal: usize) -> Self {
        Self {
            axial,
            coronal,
            sagittal,
        }
    }

    /// Mid-point of each axis
    pub fn center(dim: (usize, usize, usize)) -> Self {
        Self::new(dim.0 / 2, dim.1 / 2, dim.2 / 2)
    }

    pub fn get(&self, orientation: Orientation) -> usize {
        match orientation {
            Orientation::Axial => self.axial,
            Orientation::Coronal => self.coronal,
            Orientation::Sagittal => self.sagittal,
        }
    }

    pub fn set(&mut self, orientation: Orientation, index: usize) {
        match orientation {
            Orientation::Axial => self.axial = index,
            Orientation::Coronal => self.coronal = index,
            Orientation::Sagittal => self.sagittal = index,
        }
    }

    /// Clamp every index to `[0, size - 1]` of its axis
    pub fn clamped(self, dim: (usize, usize, usize)) -> Self {
        let clamp = |index: usize, size: usize| index.min(size.saturating_sub(1));
        Self::new(
            clamp(self.axial, dim.0),
            clamp(self.coronal, dim.1),
            clamp(self.sagittal, dim.2),
        )
    }
}

/// The three orthogonal views through a volume
#[derive(Debug, Clone, PartialEq)]
pub struct MprViews<'a> {
    pub indices: SliceIndices,
    pub axial: ArrayView2<'a, u8>,
    pub coronal: ArrayView2<'a, u8>,
    pub sagittal: ArrayView2<'a, u8>,
}

impl<'a> MprViews<'a> {
    pub fn get(&self, orientation: Orientation) -> &ArrayView2<'a, u8> {
        match orientation {
            Orientation::Axial => &self.axial,
            Orientation::Coronal => &self.coronal,
            Orientation::Sagittal => &self.sagittal,
        }
    }
}

impl Volume {
    pub fn new(data: Array3<u8>) -> Self {
        Self { data }
    }

    /// Get the dimensions of the volume (depth, height, width)
    pub fn dim(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    /// Get a reference to the underlying data
    pub fn data(&self) -> &Array3<u8> {
        &self.data
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Number of valid indices along the axis fixed by `orientation`
    pub fn axis_len(&self, orientation: Orientation) -> usize {
        self.data.len_of(Axis(orientation.axis()))
    }

    /// Slice the volume along one axis. Out of range indices are clamped to
    /// the last valid index; `None` for an empty axis.
    pub fn get_slice_from_axis(
        &self,
        index: usize,
        orientation: Orientation,
    ) -> Option<ArrayView2<'_, u8>> {
        let index = index.min(self.axis_len(orientation).checked_sub(1)?);
        let slice = match orientation {
            Orientation::Axial => self.data.slice(s![index, .., ..]),
            Orientation::Coronal => self.data.slice(s![.., index, ..]),
            Orientation::Sagittal => self.data.slice(s![.., .., index]),
        };
        Some(slice)
    }

    /// Extract the axial, coronal and sagittal views for an index triple.
    ///
    /// Returns `None` if the volume is empty.
    pub fn reslice(&self, indices: SliceIndices) -> Option<MprViews<'_>> {
        let indices = indices.clamped(self.dim());
        Some(MprViews {
            indices,
            axial: self.get_slice_from_axis(indices.axial, Orientation::Axial)?,
            coronal: self.get_slice_from_axis(indices.coronal, Orientation::Coronal)?,
            sagittal: self.get_slice_from_axis(indices.sagittal, Orientation::Sagittal)?,
        })
    }

    pub fn get_image_from_axis(&self, index: usize, orientation: Orientation) -> Option<GrayImage> {
        let slice = self.get_slice_from_axis(index, orientation)?;
        Self::slice_to_image(&slice)
    }

    /// Rows of the view become image rows
    pub fn slice_to_image(slice: &ArrayView2<'_, u8>) -> Option<GrayImage> {
        let (height, width) = slice.dim();
        let pixel_data: Vec<u8> = slice.iter().copied().collect();
        ImageBuffer::from_raw(width as u32, height as u32, pixel_data)
    }
}
