use super::{DisplayArtifact, RenderError, VolumeRenderer};
use crate::volume::Volume;

use ndarray::s;
use serde::Serialize;
use tracing::debug;

const PLOTLY_CDN: &str = "https://cdn.plot.ly/plotly-2.35.2.min.js";

#[derive(Debug, Clone, Copy)]
pub struct TraceOptions {
    /// Keep every `stride`-th voxel along each axis
    pub stride: usize,
    pub opacity: f32,
    pub surface_count: u32,
}

impl Default for TraceOptions {
    fn default() -> Self {
        Self {
            stride: 1,
            opacity: 0.1,
            surface_count: 17,
        }
    }
}

/// Flattened voxel coordinates and values of a volume, in the layout of a
/// Plotly `volume` trace. `x`, `y` and `z` are column, row and slice indices.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VolumeTrace {
    #[serde(rename = "type")]
    pub kind: String,
    pub x: Vec<f32>,
    pub y: Vec<f32>,
    pub z: Vec<f32>,
    pub value: Vec<u8>,
    pub isomin: u8,
    pub isomax: u8,
    pub opacity: f32,
    pub surface_count: u32,
    pub colorscale: String,
}

impl VolumeTrace {
    pub fn len(&self) -> usize {
        self.value.len()
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    pub fn to_json(&self) -> Result<String, RenderError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Standalone page that renders the trace with Plotly
    pub fn to_html(&self, title: &str) -> Result<String, RenderError> {
        let trace = self.to_json()?;
        let title = serde_json::to_string(title)?;
        Ok(format!(
            r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<script src="{PLOTLY_CDN}"></script>
</head>
<body>
<div id="volume" style="width:100%;height:100vh;"></div>
<script>
Plotly.newPlot("volume", [{trace}], {{ title: {{ text: {title} }} }});
</script>
</body>
</html>
"#
        ))
    }
}

#[derive(Debug, Clone, Default)]
pub struct TraceRenderer {
    options: TraceOptions,
}

impl TraceRenderer {
    pub fn new(options: TraceOptions) -> Self {
        Self { options }
    }

    pub fn build_trace(&self, volume: &Volume) -> Result<VolumeTrace, RenderError> {
        if volume.is_empty() {
            return Err(RenderError::EmptyVolume);
        }
        let stride = self.options.stride.max(1);
        let step = stride as isize;
        let sampled = volume.data().slice(s![..;step, ..;step, ..;step]);

        let len = sampled.len();
        let mut x = Vec::with_capacity(len);
        let mut y = Vec::with_capacity(len);
        let mut z = Vec::with_capacity(len);
        let mut value = Vec::with_capacity(len);
        for ((k, j, i), &v) in sampled.indexed_iter() {
            x.push((i * stride) as f32);
            y.push((j * stride) as f32);
            z.push((k * stride) as f32);
            value.push(v);
        }

        let isomin = value.iter().copied().min().unwrap_or(0);
        let isomax = value.iter().copied().max().unwrap_or(u8::MAX);
        debug!(renderer = self.name(), voxels = len, "flattened volume trace");

        Ok(VolumeTrace {
            kind: "volume".to_string(),
            x,
            y,
            z,
            value,
            isomin,
            isomax,
            opacity: self.options.opacity,
            surface_count: self.options.surface_count,
            colorscale: "Greys".to_string(),
        })
    }
}

impl VolumeRenderer for TraceRenderer {
    fn name(&self) -> &'static str {
        "trace"
    }

    fn render(&self, volume: &Volume) -> Result<DisplayArtifact, RenderError> {
        self.build_trace(volume).map(DisplayArtifact::Scene)
    }
}
