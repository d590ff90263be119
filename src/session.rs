use crate::{
    enums::{Orientation, SortBy},
    render::{DisplayArtifact, RenderError, VolumeRenderer},
    volume::{MprViews, SliceIndices, Volume},
    volume_assembler::{Assembly, SliceOrdering, SortKeyMissing},
    volume_loader::{VolumeLoader, VolumeLoaderError},
};

use image::GrayImage;
use std::path::Path;
use tracing::info;

/// State of one viewer: the volume of the current file set and the slice
/// indices chosen for it. Loading a new file set replaces the session.
#[derive(Debug, Clone)]
pub struct ViewerSession {
    volume: Volume,
    ordering: SliceOrdering,
    indices: SliceIndices,
}

impl ViewerSession {
    /// Start at the mid-point of every axis
    pub fn from_assembly(assembly: Assembly) -> Self {
        let Assembly { volume, ordering } = assembly;
        let indices = SliceIndices::center(volume.dim());
        info!(shape = ?volume.dim(), "volume loaded");
        Self {
            volume,
            ordering,
            indices,
        }
    }

    pub fn load_files(
        paths: &[impl AsRef<Path>],
        sort_by: SortBy,
    ) -> Result<Self, VolumeLoaderError> {
        VolumeLoader::load_from_file_paths(paths, sort_by).map(Self::from_assembly)
    }

    pub fn load_directory(path: impl AsRef<Path>, sort_by: SortBy) -> Result<Self, VolumeLoaderError> {
        VolumeLoader::load_from_directory(path, sort_by).map(Self::from_assembly)
    }

    pub fn volume(&self) -> &Volume {
        &self.volume
    }

    pub fn ordering(&self) -> &SliceOrdering {
        &self.ordering
    }

    /// Set when the slices could not be sorted by instance number
    pub fn warning(&self) -> Option<&SortKeyMissing> {
        self.ordering.warning()
    }

    pub fn indices(&self) -> SliceIndices {
        self.indices
    }

    /// Move one slider; the index is clamped to the axis and returned
    pub fn set_index(&mut self, orientation: Orientation, index: usize) -> usize {
        let mut indices = self.indices;
        indices.set(orientation, index);
        self.indices = indices.clamped(self.volume.dim());
        self.indices.get(orientation)
    }

    pub fn set_indices(&mut self, indices: SliceIndices) -> SliceIndices {
        self.indices = indices.clamped(self.volume.dim());
        self.indices
    }

    pub fn views(&self) -> Option<MprViews<'_>> {
        self.volume.reslice(self.indices)
    }

    pub fn slice_image(&self, orientation: Orientation) -> Option<GrayImage> {
        self.volume
            .get_image_from_axis(self.indices.get(orientation), orientation)
    }

    pub fn render(&self, renderer: &dyn VolumeRenderer) -> Result<DisplayArtifact, RenderError> {
        info!(renderer = renderer.name(), "rendering volume");
        renderer.render(&self.volume)
    }
}
