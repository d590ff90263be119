//! # DICOM-MPR library
//!
//! This crate assembles DICOM series into volumes, reslices them into
//! multi-planar reconstruction (MPR) views and renders them in 3D.
//!
//! It builds on the dicom-rs ecosystem for parsing and pixel decoding.
//! A volume is loaded from multiple [`FileDicomObject<InMemDicomObject>`],
//! from file paths, from byte streams or from a folder where each ".dcm" file
//! is read. A single multi-frame object is taken as a volume on its own.
//!
//! Slices are sorted by InstanceNumber when every slice carries one that
//! parses as an integer. Otherwise upload order is kept and a
//! [`SortKeyMissing`] warning is returned with the volume. Intensities are
//! min-max normalized over the whole volume into 8 bits.
//!
//! The volume can be sliced in the three medical axes:
//!  - Axial
//!  - Coronal
//!  - Sagittal
//!
//! and rendered by any [`VolumeRenderer`]:
//!  - [`RaycastRenderer`]: CPU ray casting from an isometric camera
//!  - [`GpuRenderer`]: maximum intensity projection with WGPU compute shaders
//!  - [`TraceRenderer`]: flattened volume trace for an interactive web view
//!
//! # Examples
//!
//! ## Reading multiple DICOM files into a volume
//!
//! To read all DICOM files from the dicom/ directory, sort them by
//! InstanceNumber. Then get the image at the center of the volume in the
//! Sagittal axis.
//!
//! ```no_run
//! # use dicom_mpr::{Orientation, SortBy, ViewerSession};
//! let session = ViewerSession::load_directory("dicom", SortBy::InstanceNumber)
//!     .expect("should have loaded files from directory");
//! if let Some(warning) = session.warning() {
//!     eprintln!("{warning}");
//! }
//! let image = session
//!     .slice_image(Orientation::Sagittal)
//!     .expect("should have returned image at center of volume");
//! image.save("result.png").expect("should have saved image");
//! ```
//!
//! [`FileDicomObject<InMemDicomObject>`]: https://docs.rs/dicom-object/latest/dicom_object/struct.FileDicomObject.html

pub mod enums;
mod interpolator;
pub mod render;
pub mod session;
pub mod volume;
pub mod volume_assembler;
pub mod volume_loader;

pub use enums::{Orientation, RendererKind, SortBy};
pub use render::{
    DisplayArtifact, GpuContext, GpuRenderer, RaycastOptions, RaycastRenderer, RenderError,
    TraceOptions, TraceRenderer, VolumeRenderer, VolumeTrace,
};
pub use session::ViewerSession;
pub use volume::{MprViews, SliceIndices, Volume};
pub use volume_assembler::{
    Assembly, AssemblyError, DecodedSlice, SliceOrdering, SortKeyMissing, VolumeAssembler,
};
pub use volume_loader::{DecodedImage, VolumeLoader, VolumeLoaderError};
