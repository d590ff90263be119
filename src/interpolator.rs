use ndarray::ArrayView3;

pub(crate) struct Interpolator;

impl Interpolator {
    /// Sample at fractional (z, y, x); the point must lie inside the volume
    #[inline]
    pub(crate) fn trilinear_interpolate(volume: &ArrayView3<u8>, z: f32, y: f32, x: f32) -> f32 {
        let (depth, height, width) = volume.dim();

        let z0 = (z.floor() as usize).min(depth - 1);
        let y0 = (y.floor() as usize).min(height - 1);
        let x0 = (x.floor() as usize).min(width - 1);
        let z1 = (z0 + 1).min(depth - 1);
        let y1 = (y0 + 1).min(height - 1);
        let x1 = (x0 + 1).min(width - 1);

        let dz = z - z0 as f32;
        let dy = y - y0 as f32;
        let dx = x - x0 as f32;

        let lerp = |a: u8, b: u8, t: f32| (a as f32).mul_add(1.0 - t, b as f32 * t);

        let c00 = lerp(volume[[z0, y0, x0]], volume[[z0, y0, x1]], dx);
        let c01 = lerp(volume[[z0, y1, x0]], volume[[z0, y1, x1]], dx);
        let c10 = lerp(volume[[z1, y0, x0]], volume[[z1, y0, x1]], dx);
        let c11 = lerp(volume[[z1, y1, x0]], volume[[z1, y1, x1]], dx);

        let c0 = c00.mul_add(1.0 - dy, c01 * dy);
        let c1 = c10.mul_add(1.0 - dy, c11 * dy);

        c0.mul_add(1.0 - dz, c1 * dz)
    }
}
