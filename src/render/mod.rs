//! Interchangeable 3D rendering backends.
//!
//! Every backend consumes a normalized [`Volume`] and produces a
//! [`DisplayArtifact`]: either a rasterized image or a serialized scene that
//! a web client renders interactively.

mod gpu;
mod raycast;
mod trace;

pub use gpu::{GpuContext, GpuRenderer};
pub use raycast::{RaycastOptions, RaycastRenderer};
pub use trace::{TraceOptions, TraceRenderer, VolumeTrace};

use crate::volume::Volume;

use image::GrayImage;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Cannot render an empty volume")]
    EmptyVolume,

    #[error("Volume data is not contiguous")]
    NonContiguous,

    #[error("GPU error: {0}")]
    Gpu(String),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone)]
pub enum DisplayArtifact {
    /// Rasterized screenshot of the volume
    Image(GrayImage),
    /// Interactive scene description for a web renderer
    Scene(VolumeTrace),
}

pub trait VolumeRenderer {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    fn render(&self, volume: &Volume) -> Result<DisplayArtifact, RenderError>;
}
