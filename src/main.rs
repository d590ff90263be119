use std::{
    fs,
    path::{Path, PathBuf},
    process::ExitCode,
};

use clap::Parser;
use dicom_mpr::{
    DisplayArtifact, GpuContext, GpuRenderer, Orientation, RaycastOptions, RaycastRenderer,
    RenderError, RendererKind, SortBy, TraceOptions, TraceRenderer, ViewerSession, Volume,
    VolumeLoaderError, VolumeRenderer,
};
use thiserror::Error;
use tracing::{error, info, warn};

/// Show axial, coronal and sagittal slices of a DICOM series and render it in 3D
#[derive(Parser, Debug)]
#[command(name = "dicom-mpr", version)]
struct Args {
    /// DICOM files (.dcm), or a single directory containing them
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Axial slice index (defaults to the middle slice)
    #[arg(long)]
    axial: Option<usize>,

    /// Coronal slice index (defaults to the middle slice)
    #[arg(long)]
    coronal: Option<usize>,

    /// Sagittal slice index (defaults to the middle slice)
    #[arg(long)]
    sagittal: Option<usize>,

    /// 3D rendering backend
    #[arg(short, long, value_enum, default_value_t = RendererKind::Raycast)]
    renderer: RendererKind,

    /// Projection axis of the GPU renderer
    #[arg(long, value_enum, default_value_t = Orientation::Axial)]
    projection: Orientation,

    /// Width and height of the ray cast image
    #[arg(long, default_value_t = 512)]
    size: u32,

    /// Keep every n-th voxel in the volume trace
    #[arg(long, default_value_t = 1)]
    stride: usize,

    /// Keep the given file order instead of sorting by instance number
    #[arg(long)]
    no_sort: bool,

    /// Directory for the slice images and the rendering
    #[arg(short, long, default_value = "out")]
    output: PathBuf,

    /// Log filter
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[derive(Debug, Error)]
enum AppError {
    #[error(transparent)]
    Load(#[from] VolumeLoaderError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error("Failed to save image: {0}")]
    Image(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(&args.log_level)
        .init();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<(), AppError> {
    let sort_by = if args.no_sort {
        SortBy::None
    } else {
        SortBy::InstanceNumber
    };

    let mut session = match args.inputs.as_slice() {
        [dir] if dir.is_dir() => ViewerSession::load_directory(dir, sort_by)?,
        paths => ViewerSession::load_files(paths, sort_by)?,
    };
    if let Some(warning) = session.warning() {
        warn!("{warning}; make sure the files are in the right order");
    }
    info!(shape = ?session.volume().dim(), "data loaded");

    for (orientation, index) in [
        (Orientation::Axial, args.axial),
        (Orientation::Coronal, args.coronal),
        (Orientation::Sagittal, args.sagittal),
    ] {
        if let Some(index) = index {
            session.set_index(orientation, index);
        }
    }

    fs::create_dir_all(&args.output)?;
    save_slices(&session, &args.output)?;

    let renderer: Box<dyn VolumeRenderer> = match args.renderer {
        RendererKind::Raycast => Box::new(RaycastRenderer::new(RaycastOptions {
            width: args.size,
            height: args.size,
            ..RaycastOptions::default()
        })),
        RendererKind::Gpu => Box::new(GpuRenderer::new(
            GpuContext::request().await?,
            args.projection,
        )),
        RendererKind::Trace => Box::new(TraceRenderer::new(TraceOptions {
            stride: args.stride,
            ..TraceOptions::default()
        })),
    };

    match session.render(renderer.as_ref())? {
        DisplayArtifact::Image(image) => {
            let path = args.output.join("render.png");
            image.save(&path)?;
            info!(path = %path.display(), "saved 3D rendering");
        }
        DisplayArtifact::Scene(trace) => {
            let json_path = args.output.join("render.json");
            fs::write(&json_path, trace.to_json()?)?;
            let html_path = args.output.join("render.html");
            fs::write(&html_path, trace.to_html("3D Volume Rendering")?)?;
            info!(path = %html_path.display(), voxels = trace.len(), "saved volume trace");
        }
    }

    Ok(())
}

fn save_slices(session: &ViewerSession, output: &Path) -> Result<(), AppError> {
    let views = session.views().ok_or(RenderError::EmptyVolume)?;
    for orientation in Orientation::ALL {
        let image = Volume::slice_to_image(views.get(orientation)).ok_or(RenderError::EmptyVolume)?;
        let path = output.join(format!("{}.png", orientation.name()));
        image.save(&path)?;
        info!(
            index = views.indices.get(orientation),
            path = %path.display(),
            "saved {} slice",
            orientation.name()
        );
    }
    Ok(())
}
