use super::{DisplayArtifact, RenderError, VolumeRenderer};
use crate::{enums::Orientation, volume::Volume};

use image::{GrayImage, ImageBuffer};
use std::borrow::Cow;
use tracing::debug;
use web_time::Instant;
use wgpu::{PollType, util::DeviceExt};

const WORKGROUP_SIZE: u32 = 8;

pub struct GpuContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
}

impl GpuContext {
    /// Request a device from the default adapter
    pub async fn request() -> Result<Self, RenderError> {
        let instance = wgpu::Instance::default();
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions::default())
            .await
            .map_err(|e| RenderError::Gpu(e.to_string()))?;
        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor::default())
            .await
            .map_err(|e| RenderError::Gpu(e.to_string()))?;
        Ok(Self { device, queue })
    }
}

/// Maximum intensity projection along one volume axis, computed in a
/// compute shader
pub struct GpuRenderer {
    context: GpuContext,
    pipeline: wgpu::ComputePipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    orientation: Orientation,
}

#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct Uniforms {
    orientation: u32,
    output_width: u32,
    output_height: u32,
    volume_width: u32,
    volume_height: u32,
    volume_depth: u32,
    _padding: [u32; 2],
}

impl GpuRenderer {
    pub fn new(context: GpuContext, orientation: Orientation) -> Self {
        let device = &context.device;

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Volume Projection Shader"),
            source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(include_str!(
                "../shaders/volume_projection.wgsl"
            ))),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Volume Projection Bind Group Layout"),
            entries: &[
                // 3D texture
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: false },
                        view_dimension: wgpu::TextureViewDimension::D3,
                        multisampled: false,
                    },
                    count: None,
                },
                // Output buffer
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: false },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                // Uniforms
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Volume Projection Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("Volume Projection Pipeline"),
            layout: Some(&pipeline_layout),
            module: &shader,
            entry_point: Some("main"),
            compilation_options: Default::default(),
            cache: None,
        });

        Self {
            context,
            pipeline,
            bind_group_layout,
            orientation,
        }
    }

    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    /// Always (width, height) of the projected image
    fn output_dimensions(dim: (usize, usize, usize), orientation: Orientation) -> (u32, u32) {
        let (depth, height, width) = (dim.0 as u32, dim.1 as u32, dim.2 as u32);
        match orientation {
            Orientation::Axial => (width, height),
            Orientation::Coronal => (width, depth),
            Orientation::Sagittal => (height, depth),
        }
    }

    fn upload_volume(&self, volume: &Volume) -> Result<wgpu::Texture, RenderError> {
        let (depth, height, width) = volume.dim();
        let (depth, height, width) = (depth as u32, height as u32, width as u32);
        let GpuContext { device, queue } = &self.context;

        let texture_size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: depth,
        };

        let volume_texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Volume 3D Texture"),
            size: texture_size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D3,
            format: wgpu::TextureFormat::R8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        let data_slice = volume
            .data()
            .as_slice()
            .ok_or(RenderError::NonContiguous)?;
        queue.write_texture(
            wgpu::TexelCopyTextureInfoBase {
                texture: &volume_texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            data_slice,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(width),
                rows_per_image: Some(height),
            },
            texture_size,
        );

        Ok(volume_texture)
    }

    pub async fn render_image(&self, volume: &Volume) -> Result<GrayImage, RenderError> {
        if volume.is_empty() {
            return Err(RenderError::EmptyVolume);
        }
        let started = Instant::now();
        let GpuContext { device, queue } = &self.context;
        let (depth, height, width) = volume.dim();
        let (target_width, target_height) = Self::output_dimensions(volume.dim(), self.orientation);

        let volume_texture = self.upload_volume(volume)?;
        let volume_view = volume_texture.create_view(&wgpu::TextureViewDescriptor::default());

        let uniforms = Uniforms {
            orientation: self.orientation as u32,
            output_width: target_width,
            output_height: target_height,
            volume_width: width as u32,
            volume_height: height as u32,
            volume_depth: depth as u32,
            _padding: [0; 2],
        };
        let uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Uniform Buffer"),
            contents: bytemuck::bytes_of(&uniforms),
            usage: wgpu::BufferUsages::UNIFORM,
        });

        let output_size = (target_width * target_height) as usize;
        let output_bytes = (output_size * std::mem::size_of::<u32>()) as u64;
        let output_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Output Buffer"),
            size: output_bytes,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let staging_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Staging Buffer"),
            size: output_bytes,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Volume Projection Bind Group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&volume_view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: output_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: uniform_buffer.as_entire_binding(),
                },
            ],
        });

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Volume Projection Encoder"),
        });
        {
            let mut compute_pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Volume Projection Pass"),
                timestamp_writes: None,
            });
            compute_pass.set_pipeline(&self.pipeline);
            compute_pass.set_bind_group(0, &bind_group, &[]);
            compute_pass.dispatch_workgroups(
                target_width.div_ceil(WORKGROUP_SIZE),
                target_height.div_ceil(WORKGROUP_SIZE),
                1,
            );
        }
        encoder.copy_buffer_to_buffer(&output_buffer, 0, &staging_buffer, 0, output_bytes);
        queue.submit(Some(encoder.finish()));

        let buffer_slice = staging_buffer.slice(..);
        let (sender, receiver) = futures::channel::oneshot::channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        device
            .poll(PollType::Wait {
                submission_index: None,
                timeout: None,
            })
            .map_err(|e| RenderError::Gpu(e.to_string()))?;
        receiver
            .await
            .map_err(|_| RenderError::Gpu("buffer mapping was cancelled".to_string()))?
            .map_err(|e| RenderError::Gpu(e.to_string()))?;

        let data = buffer_slice.get_mapped_range();
        let u32_data: &[u32] = bytemuck::cast_slice(&data);
        let pixel_data: Vec<u8> = u32_data.iter().map(|&v| v.min(255) as u8).collect();
        drop(data);
        staging_buffer.unmap();

        debug!(
            renderer = self.name(),
            orientation = self.orientation.name(),
            width = target_width,
            height = target_height,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "projection finished"
        );
        ImageBuffer::from_raw(target_width, target_height, pixel_data)
            .ok_or_else(|| RenderError::Gpu("projection size mismatch".to_string()))
    }
}

impl VolumeRenderer for GpuRenderer {
    fn name(&self) -> &'static str {
        "gpu"
    }

    fn render(&self, volume: &Volume) -> Result<DisplayArtifact, RenderError> {
        futures::executor::block_on(self.render_image(volume)).map(DisplayArtifact::Image)
    }
}
