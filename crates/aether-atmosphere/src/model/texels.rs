//! CPU texel buffers for the reference model.
//!
//! Addressing matches the GPU textures (row-major, then slice-major) and
//! sampling reproduces a linear clamp-to-edge sampler, so kernels read a
//! table on the CPU the way the shaders read it on the GPU.

use glam::{Vec2, Vec3, Vec4};

use crate::lut::{LutExtent, LutImage};

/// CPU texel buffer with the same addressing and linear clamp-to-edge
/// filtering as the GPU sampler.
#[derive(Debug, Clone, PartialEq)]
pub struct Texels {
    pub extent: LutExtent,
    pub data: Vec<Vec4>,
}

impl Texels {
    pub fn zeroed(extent: LutExtent) -> Self {
        Self {
            extent,
            data: vec![Vec4::ZERO; extent.texel_count()],
        }
    }

    pub fn from_image(image: &LutImage) -> Self {
        Self {
            extent: image.extent,
            data: image.texels().into_iter().map(Vec4::from_array).collect(),
        }
    }

    pub fn to_image(&self) -> LutImage {
        let texels: Vec<[f32; 4]> = self.data.iter().map(|t| t.to_array()).collect();
        LutImage::from_texels(self.extent, &texels)
    }

    pub fn index(&self, x: u32, y: u32, z: u32) -> usize {
        ((z * self.extent.height + y) * self.extent.width + x) as usize
    }

    pub fn get(&self, x: u32, y: u32, z: u32) -> Vec4 {
        self.data[self.index(x, y, z)]
    }

    /// Bilinear sample of slice 0.
    pub fn sample_2d(&self, uv: Vec2) -> Vec4 {
        let (x0, x1, tx) = filter_axis(uv.x, self.extent.width);
        let (y0, y1, ty) = filter_axis(uv.y, self.extent.height);
        let top = self.get(x0, y0, 0).lerp(self.get(x1, y0, 0), tx);
        let bottom = self.get(x0, y1, 0).lerp(self.get(x1, y1, 0), tx);
        top.lerp(bottom, ty)
    }

    /// Trilinear sample.
    pub fn sample_3d(&self, uvw: Vec3) -> Vec4 {
        let (x0, x1, tx) = filter_axis(uvw.x, self.extent.width);
        let (y0, y1, ty) = filter_axis(uvw.y, self.extent.height);
        let (z0, z1, tz) = filter_axis(uvw.z, self.extent.depth);
        let plane = |z: u32| {
            let top = self.get(x0, y0, z).lerp(self.get(x1, y0, z), tx);
            let bottom = self.get(x0, y1, z).lerp(self.get(x1, y1, z), tx);
            top.lerp(bottom, ty)
        };
        plane(z0).lerp(plane(z1), tz)
    }
}

/// Neighbouring texel indices and blend weight for a normalized coordinate.
fn filter_axis(coord: f32, size: u32) -> (u32, u32, f32) {
    let x = coord * size as f32 - 0.5;
    let base = x.floor();
    let t = if x.is_finite() { x - base } else { 0.0 };
    let last = size as i64 - 1;
    let i0 = (base as i64).clamp(0, last) as u32;
    let i1 = (base as i64 + 1).clamp(0, last) as u32;
    (i0, i1, t)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(width: u32, height: u32, depth: u32) -> Texels {
        let extent = LutExtent {
            width,
            height,
            depth,
        };
        let mut t = Texels::zeroed(extent);
        for z in 0..depth {
            for y in 0..height {
                for x in 0..width {
                    let i = t.index(x, y, z);
                    t.data[i] = Vec4::new(x as f32, y as f32, z as f32, 1.0);
                }
            }
        }
        t
    }

    #[test]
    fn test_sample_at_texel_center_is_exact() {
        let t = ramp(4, 2, 1);
        let v = t.sample_2d(Vec2::new(2.5 / 4.0, 0.5 / 2.0));
        assert!((v - Vec4::new(2.0, 0.0, 0.0, 1.0)).length() < 1e-6);
    }

    #[test]
    fn test_sample_between_centers_interpolates() {
        let t = ramp(4, 2, 1);
        let v = t.sample_2d(Vec2::new(0.5, 0.5));
        assert!((v.x - 1.5).abs() < 1e-6);
        assert!((v.y - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_sample_clamps_to_edge() {
        let t = ramp(4, 2, 3);
        let low = t.sample_3d(Vec3::new(-1.0, -1.0, -1.0));
        let high = t.sample_3d(Vec3::new(2.0, 2.0, 2.0));
        assert_eq!(low, Vec4::new(0.0, 0.0, 0.0, 1.0));
        assert_eq!(high, Vec4::new(3.0, 1.0, 2.0, 1.0));
    }

    #[test]
    fn test_image_roundtrip_preserves_texels() {
        let t = ramp(3, 2, 2);
        assert_eq!(Texels::from_image(&t.to_image()), t);
    }
}
