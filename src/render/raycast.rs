use super::{DisplayArtifact, RenderError, VolumeRenderer};
use crate::{interpolator::Interpolator, volume::Volume};

use image::{GrayImage, ImageBuffer};
use rayon::prelude::*;
use tracing::debug;
use web_time::Instant;

type Vec3 = [f32; 3];

#[derive(Debug, Clone, Copy)]
pub struct RaycastOptions {
    pub width: u32,
    pub height: u32,
    /// Distance between samples along a ray, in voxels
    pub step: f32,
    /// Opacity follows a sigmoid over `[-slope, slope]` across the intensity range
    pub sigmoid_slope: f32,
    /// Rays stop once accumulated opacity reaches this value
    pub opacity_cutoff: f32,
}

impl Default for RaycastOptions {
    fn default() -> Self {
        Self {
            width: 512,
            height: 512,
            step: 0.5,
            sigmoid_slope: 6.0,
            opacity_cutoff: 0.99,
        }
    }
}

/// Front-to-back compositing ray caster with an orthographic isometric
/// camera and a gray color map
#[derive(Debug, Clone, Default)]
pub struct RaycastRenderer {
    options: RaycastOptions,
}

struct Camera {
    center: Vec3,
    direction: Vec3,
    right: Vec3,
    up: Vec3,
    radius: f32,
}

impl Camera {
    /// Looks at the volume center from the (+x, +y, +z) diagonal with z up.
    /// World axes are (column, row, slice).
    fn isometric(dim: (usize, usize, usize)) -> Self {
        let (depth, height, width) = (dim.0 as f32, dim.1 as f32, dim.2 as f32);
        let center = [(width - 1.0) / 2.0, (height - 1.0) / 2.0, (depth - 1.0) / 2.0];
        let direction = normalize([-1.0, -1.0, -1.0]);
        let right = normalize(cross(direction, [0.0, 0.0, 1.0]));
        let up = cross(right, direction);
        let radius = 0.5 * (width * width + height * height + depth * depth).sqrt();

        Self {
            center,
            direction,
            right,
            up,
            radius,
        }
    }

    /// Ray origin for normalized image plane coordinates in `[-1, 1]`
    fn origin(&self, u: f32, v: f32) -> Vec3 {
        let mut origin = self.center;
        for i in 0..3 {
            origin[i] += (u * self.right[i] + v * self.up[i] - self.direction[i]) * self.radius;
        }
        origin
    }
}

impl RaycastRenderer {
    pub fn new(options: RaycastOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &RaycastOptions {
        &self.options
    }

    pub fn render_image(&self, volume: &Volume) -> Result<GrayImage, RenderError> {
        if volume.is_empty() {
            return Err(RenderError::EmptyVolume);
        }
        let started = Instant::now();
        let RaycastOptions { width, height, .. } = self.options;
        let camera = Camera::isometric(volume.dim());

        let pixel_data: Vec<u8> = (0..height)
            .into_par_iter()
            .flat_map(|y| {
                (0..width)
                    .map(|x| {
                        let u = (x as f32 + 0.5) / width as f32 * 2.0 - 1.0;
                        let v = 1.0 - (y as f32 + 0.5) / height as f32 * 2.0;
                        self.cast_ray(volume, &camera, camera.origin(u, v))
                    })
                    .collect::<Vec<u8>>()
            })
            .collect();

        debug!(
            renderer = self.name(),
            width,
            height,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "ray casting finished"
        );
        ImageBuffer::from_raw(width, height, pixel_data).ok_or(RenderError::EmptyVolume)
    }

    fn cast_ray(&self, volume: &Volume, camera: &Camera, origin: Vec3) -> u8 {
        let data = volume.data().view();
        let (depth, height, width) = volume.dim();
        let upper = [width as f32 - 0.5, height as f32 - 0.5, depth as f32 - 0.5];
        let step = self.options.step.max(f32::EPSILON);
        let samples = (2.0 * camera.radius / step).ceil() as usize;

        let mut color = 0.0_f32;
        let mut opacity = 0.0_f32;
        for i in 0..=samples {
            let t = i as f32 * step;
            let point = [
                origin[0] + camera.direction[0] * t,
                origin[1] + camera.direction[1] * t,
                origin[2] + camera.direction[2] * t,
            ];
            if (0..3).any(|axis| point[axis] < -0.5 || point[axis] > upper[axis]) {
                continue;
            }

            let x = point[0].clamp(0.0, (width - 1) as f32);
            let y = point[1].clamp(0.0, (height - 1) as f32);
            let z = point[2].clamp(0.0, (depth - 1) as f32);
            let intensity = Interpolator::trilinear_interpolate(&data, z, y, x) / 255.0;

            let alpha = 1.0 - (1.0 - self.opacity(intensity)).powf(step);
            color += (1.0 - opacity) * alpha * intensity;
            opacity += (1.0 - opacity) * alpha;
            if opacity >= self.options.opacity_cutoff {
                break;
            }
        }

        (color * 255.0).round().clamp(0.0, 255.0) as u8
    }

    fn opacity(&self, intensity: f32) -> f32 {
        let slope = self.options.sigmoid_slope;
        1.0 / (1.0 + (-slope * (2.0 * intensity - 1.0)).exp())
    }
}

impl VolumeRenderer for RaycastRenderer {
    fn name(&self) -> &'static str {
        "raycast"
    }

    fn render(&self, volume: &Volume) -> Result<DisplayArtifact, RenderError> {
        self.render_image(volume).map(DisplayArtifact::Image)
    }
}

fn cross(a: Vec3, b: Vec3) -> Vec3 {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

fn normalize(v: Vec3) -> Vec3 {
    let length = (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt();
    [v[0] / length, v[1] / length, v[2] / length]
}

#[cfg(test)]
mod tests {
    use super::*;

    use ndarray::Array3;

    fn small_options() -> RaycastOptions {
        RaycastOptions {
            width: 32,
            height: 24,
            ..RaycastOptions::default()
        }
    }

    #[test]
    fn empty_volume_is_rejected() {
        let renderer = RaycastRenderer::default();
        assert!(matches!(
            renderer.render(&Volume::default()),
            Err(RenderError::EmptyVolume)
        ));
    }

    #[test]
    fn black_volume_renders_black() {
        let renderer = RaycastRenderer::new(small_options());
        let volume = Volume::new(Array3::zeros((6, 7, 8)));

        let image = renderer.render_image(&volume).unwrap();

        assert_eq!(image.dimensions(), (32, 24));
        assert!(image.pixels().all(|p| p.0 == [0]));
    }

    #[test]
    fn bright_cube_is_visible_in_the_center() {
        let renderer = RaycastRenderer::new(small_options());
        let volume = Volume::new(Array3::from_elem((8, 8, 8), 255));

        let image = renderer.render_image(&volume).unwrap();

        assert!(image.get_pixel(16, 12).0[0] > 200);
        assert_eq!(image.get_pixel(0, 0).0, [0]);
    }

    #[test]
    fn camera_basis_is_orthonormal() {
        let camera = Camera::isometric((4, 5, 6));
        let dot = |a: Vec3, b: Vec3| a[0] * b[0] + a[1] * b[1] + a[2] * b[2];

        assert!(dot(camera.direction, camera.right).abs() < 1e-6);
        assert!(dot(camera.direction, camera.up).abs() < 1e-6);
        assert!((dot(camera.up, camera.up) - 1.0).abs() < 1e-5);
        assert!(camera.up[2] > 0.0);
    }
}
