//! Lookup-table dimensions, CPU images, and the persistent GPU texture set.
//!
//! The scattering LUT stores a 4D function of `(r, mu, mu_s, nu)` in a 3D
//! texture: `r` is the depth slice, `mu` the row, and each row packs
//! `NU_SIZE` blocks of `MU_S_SIZE` columns.

use crate::error::PrecomputeError;

use aether_gpu::{
    GpuContext, ReadbackError, RenderTexture, RenderTextureDescriptor, TextureError,
    create_render_texture, create_render_texture_with_data, read_texture,
};

pub const TRANSMITTANCE_TEXTURE_WIDTH: u32 = 256;
pub const TRANSMITTANCE_TEXTURE_HEIGHT: u32 = 64;

pub const IRRADIANCE_TEXTURE_WIDTH: u32 = 64;
pub const IRRADIANCE_TEXTURE_HEIGHT: u32 = 16;

pub const SCATTERING_TEXTURE_R_SIZE: u32 = 32;
pub const SCATTERING_TEXTURE_MU_SIZE: u32 = 128;
pub const SCATTERING_TEXTURE_MU_S_SIZE: u32 = 32;
pub const SCATTERING_TEXTURE_NU_SIZE: u32 = 8;

pub const SCATTERING_TEXTURE_WIDTH: u32 = SCATTERING_TEXTURE_NU_SIZE * SCATTERING_TEXTURE_MU_S_SIZE;
pub const SCATTERING_TEXTURE_HEIGHT: u32 = SCATTERING_TEXTURE_MU_SIZE;
pub const SCATTERING_TEXTURE_DEPTH: u32 = SCATTERING_TEXTURE_R_SIZE;

/// Highest scattering order accumulated by default.
pub const MAX_SCATTERING_ORDER: u32 = 4;

/// Texel format of every LUT, scratch textures included.
pub const LUT_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba32Float;
pub const BYTES_PER_TEXEL: usize = 16;

/// Width, height and depth of one LUT. Depth is 1 for 2D tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LutExtent {
    pub width: u32,
    pub height: u32,
    pub depth: u32,
}

impl LutExtent {
    pub const fn new_2d(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            depth: 1,
        }
    }

    pub const fn texel_count(&self) -> usize {
        self.width as usize * self.height as usize * self.depth as usize
    }

    pub const fn byte_size(&self) -> usize {
        self.texel_count() * BYTES_PER_TEXEL
    }
}

/// Table sizes in use. [`LutDimensions::STANDARD`] is what files and the
/// runtime renderer use; reduced sets keep CPU validation fast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LutDimensions {
    pub transmittance_width: u32,
    pub transmittance_height: u32,
    pub irradiance_width: u32,
    pub irradiance_height: u32,
    pub scattering_r_size: u32,
    pub scattering_mu_size: u32,
    pub scattering_mu_s_size: u32,
    pub scattering_nu_size: u32,
}

impl LutDimensions {
    pub const STANDARD: Self = Self {
        transmittance_width: TRANSMITTANCE_TEXTURE_WIDTH,
        transmittance_height: TRANSMITTANCE_TEXTURE_HEIGHT,
        irradiance_width: IRRADIANCE_TEXTURE_WIDTH,
        irradiance_height: IRRADIANCE_TEXTURE_HEIGHT,
        scattering_r_size: SCATTERING_TEXTURE_R_SIZE,
        scattering_mu_size: SCATTERING_TEXTURE_MU_SIZE,
        scattering_mu_s_size: SCATTERING_TEXTURE_MU_S_SIZE,
        scattering_nu_size: SCATTERING_TEXTURE_NU_SIZE,
    };

    pub const fn transmittance(&self) -> LutExtent {
        LutExtent::new_2d(self.transmittance_width, self.transmittance_height)
    }

    pub const fn irradiance(&self) -> LutExtent {
        LutExtent::new_2d(self.irradiance_width, self.irradiance_height)
    }

    pub const fn scattering(&self) -> LutExtent {
        LutExtent {
            width: self.scattering_nu_size * self.scattering_mu_s_size,
            height: self.scattering_mu_size,
            depth: self.scattering_r_size,
        }
    }

    pub const fn extent(&self, kind: LutKind) -> LutExtent {
        match kind {
            LutKind::Transmittance => self.transmittance(),
            LutKind::Irradiance => self.irradiance(),
            LutKind::Scattering => self.scattering(),
        }
    }

    /// Every size must be at least 2: the texel-center mappings divide by
    /// `size - 1`.
    pub fn validate(&self) -> Result<(), PrecomputeError> {
        let sizes = [
            ("transmittance_width", self.transmittance_width),
            ("transmittance_height", self.transmittance_height),
            ("irradiance_width", self.irradiance_width),
            ("irradiance_height", self.irradiance_height),
            ("scattering_r_size", self.scattering_r_size),
            ("scattering_mu_size", self.scattering_mu_size),
            ("scattering_mu_s_size", self.scattering_mu_s_size),
            ("scattering_nu_size", self.scattering_nu_size),
        ];
        match sizes.into_iter().find(|&(_, value)| value < 2) {
            Some((name, value)) => Err(PrecomputeError::InvalidDimension { name, value }),
            None => Ok(()),
        }
    }

    /// WGSL constant declarations matching these dimensions.
    pub fn wgsl_prelude(&self) -> String {
        format!(
            "const TRANSMITTANCE_TEXTURE_WIDTH: f32 = {}.0;\n\
             const TRANSMITTANCE_TEXTURE_HEIGHT: f32 = {}.0;\n\
             const IRRADIANCE_TEXTURE_WIDTH: f32 = {}.0;\n\
             const IRRADIANCE_TEXTURE_HEIGHT: f32 = {}.0;\n\
             const SCATTERING_TEXTURE_R_SIZE: f32 = {}.0;\n\
             const SCATTERING_TEXTURE_MU_SIZE: f32 = {}.0;\n\
             const SCATTERING_TEXTURE_MU_S_SIZE: f32 = {}.0;\n\
             const SCATTERING_TEXTURE_NU_SIZE: f32 = {}.0;\n",
            self.transmittance_width,
            self.transmittance_height,
            self.irradiance_width,
            self.irradiance_height,
            self.scattering_r_size,
            self.scattering_mu_size,
            self.scattering_mu_s_size,
            self.scattering_nu_size,
        )
    }
}

impl Default for LutDimensions {
    fn default() -> Self {
        Self::STANDARD
    }
}

/// The three persistent tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LutKind {
    Transmittance,
    Irradiance,
    Scattering,
}

impl LutKind {
    pub const ALL: [LutKind; 3] = [Self::Transmittance, Self::Irradiance, Self::Scattering];

    pub fn name(self) -> &'static str {
        match self {
            Self::Transmittance => "transmittance",
            Self::Irradiance => "irradiance",
            Self::Scattering => "scattering",
        }
    }

    pub fn is_3d(self) -> bool {
        matches!(self, Self::Scattering)
    }
}

/// Tightly packed CPU copy of one LUT: row-major, then slice-major.
#[derive(Debug, Clone, PartialEq)]
pub struct LutImage {
    pub extent: LutExtent,
    pub data: Vec<u8>,
}

impl LutImage {
    pub fn zeroed(extent: LutExtent) -> Self {
        Self {
            extent,
            data: vec![0; extent.byte_size()],
        }
    }

    pub fn from_texels(extent: LutExtent, texels: &[[f32; 4]]) -> Self {
        Self {
            extent,
            data: bytemuck::cast_slice(texels).to_vec(),
        }
    }

    /// Texels as RGBA floats. The byte buffer carries no alignment guarantee,
    /// so this copies.
    pub fn texels(&self) -> Vec<[f32; 4]> {
        self.data
            .chunks_exact(BYTES_PER_TEXEL)
            .map(|t| bytemuck::pod_read_unaligned::<[f32; 4]>(t))
            .collect()
    }

    /// One texel, or `None` outside the extent.
    pub fn texel(&self, x: u32, y: u32, z: u32) -> Option<[f32; 4]> {
        let e = self.extent;
        if x >= e.width || y >= e.height || z >= e.depth {
            return None;
        }
        let index = ((z * e.height + y) * e.width + x) as usize * BYTES_PER_TEXEL;
        self.data
            .get(index..index + BYTES_PER_TEXEL)
            .map(bytemuck::pod_read_unaligned)
    }

    pub fn is_well_sized(&self) -> bool {
        self.data.len() == self.extent.byte_size()
    }
}

/// CPU copies of the three persistent tables.
#[derive(Debug, Clone, PartialEq)]
pub struct LutImages {
    pub transmittance: LutImage,
    pub irradiance: LutImage,
    pub scattering: LutImage,
}

impl LutImages {
    pub fn zeroed(dims: &LutDimensions) -> Self {
        Self {
            transmittance: LutImage::zeroed(dims.transmittance()),
            irradiance: LutImage::zeroed(dims.irradiance()),
            scattering: LutImage::zeroed(dims.scattering()),
        }
    }

    pub fn get(&self, kind: LutKind) -> &LutImage {
        match kind {
            LutKind::Transmittance => &self.transmittance,
            LutKind::Irradiance => &self.irradiance,
            LutKind::Scattering => &self.scattering,
        }
    }

    /// Total texel bytes of the three images.
    pub fn byte_size(&self) -> usize {
        LutKind::ALL.iter().map(|&k| self.get(k).data.len()).sum()
    }
}

/// Descriptor for a LUT-sized render texture.
pub fn lut_texture_descriptor(label: &str, extent: LutExtent) -> RenderTextureDescriptor<'_> {
    RenderTextureDescriptor {
        label,
        width: extent.width,
        height: extent.height,
        depth: extent.depth,
        dimension: if extent.depth > 1 {
            wgpu::TextureDimension::D3
        } else {
            wgpu::TextureDimension::D2
        },
        format: LUT_FORMAT,
    }
}

/// Create a LUT-sized render texture. 3D-ness follows the extent, except for
/// the scattering family which is always 3D so shaders can bind it as such.
pub fn create_lut_texture(
    device: &wgpu::Device,
    label: &str,
    extent: LutExtent,
    is_3d: bool,
) -> Result<RenderTexture, TextureError> {
    let mut desc = lut_texture_descriptor(label, extent);
    if is_3d {
        desc.dimension = wgpu::TextureDimension::D3;
    }
    create_render_texture(device, &desc)
}

/// The three persistent LUTs on the GPU, read-only once filled.
pub struct LutTextures {
    pub dims: LutDimensions,
    pub transmittance: RenderTexture,
    pub irradiance: RenderTexture,
    pub scattering: RenderTexture,
}

impl LutTextures {
    /// Empty tables (zero-filled by wgpu on first use).
    pub fn create(device: &wgpu::Device, dims: LutDimensions) -> Result<Self, TextureError> {
        Ok(Self {
            dims,
            transmittance: create_lut_texture(
                device,
                "lut-transmittance",
                dims.transmittance(),
                false,
            )?,
            irradiance: create_lut_texture(device, "lut-irradiance", dims.irradiance(), false)?,
            scattering: create_lut_texture(device, "lut-scattering", dims.scattering(), true)?,
        })
    }

    /// Upload decoded images.
    pub fn upload(
        ctx: &GpuContext,
        dims: LutDimensions,
        images: &LutImages,
    ) -> Result<Self, TextureError> {
        let upload = |kind: LutKind, label: &str| {
            let mut desc = lut_texture_descriptor(label, dims.extent(kind));
            if kind.is_3d() {
                desc.dimension = wgpu::TextureDimension::D3;
            }
            create_render_texture_with_data(&ctx.device, &ctx.queue, &desc, &images.get(kind).data)
        };
        Ok(Self {
            dims,
            transmittance: upload(LutKind::Transmittance, "lut-transmittance")?,
            irradiance: upload(LutKind::Irradiance, "lut-irradiance")?,
            scattering: upload(LutKind::Scattering, "lut-scattering")?,
        })
    }

    /// Read all three tables back, tightly packed. Blocks until prior GPU
    /// work writing them has completed.
    pub fn read_back(&self, ctx: &GpuContext) -> Result<LutImages, ReadbackError> {
        let read = |kind: LutKind| -> Result<LutImage, ReadbackError> {
            Ok(LutImage {
                extent: self.dims.extent(kind),
                data: read_texture(&ctx.device, &ctx.queue, &self.get(kind).texture)?,
            })
        };
        Ok(LutImages {
            transmittance: read(LutKind::Transmittance)?,
            irradiance: read(LutKind::Irradiance)?,
            scattering: read(LutKind::Scattering)?,
        })
    }

    pub fn get(&self, kind: LutKind) -> &RenderTexture {
        match kind {
            LutKind::Transmittance => &self.transmittance,
            LutKind::Irradiance => &self.irradiance,
            LutKind::Scattering => &self.scattering,
        }
    }

    /// GPU bytes held by the three tables.
    pub fn memory_bytes(&self) -> usize {
        LutKind::ALL
            .iter()
            .map(|&k| self.dims.extent(k).byte_size())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_dimensions() {
        let dims = LutDimensions::STANDARD;
        assert_eq!(dims.transmittance(), LutExtent::new_2d(256, 64));
        assert_eq!(dims.irradiance(), LutExtent::new_2d(64, 16));
        assert_eq!(
            dims.scattering(),
            LutExtent {
                width: 256,
                height: 128,
                depth: 32
            }
        );
        assert_eq!(SCATTERING_TEXTURE_WIDTH, 256);
    }

    #[test]
    fn test_texel_size_matches_format() {
        assert_eq!(LUT_FORMAT.block_copy_size(None), Some(BYTES_PER_TEXEL as u32));
    }

    #[test]
    fn test_image_texel_indexing() {
        let extent = LutExtent {
            width: 2,
            height: 2,
            depth: 2,
        };
        let texels: Vec<[f32; 4]> = (0..8).map(|i| [i as f32, 0.0, 0.0, 1.0]).collect();
        let image = LutImage::from_texels(extent, &texels);
        assert!(image.is_well_sized());
        assert_eq!(image.texel(1, 0, 0).unwrap()[0], 1.0);
        assert_eq!(image.texel(0, 1, 0).unwrap()[0], 2.0);
        assert_eq!(image.texel(1, 1, 1).unwrap()[0], 7.0);
        assert_eq!(image.texels(), texels);
    }

    #[test]
    fn test_texel_out_of_range() {
        let extent = LutExtent::new_2d(2, 2);
        let image = LutImage::from_texels(extent, &[[1.0; 4]; 4]);
        assert_eq!(image.texel(1, 1, 0), Some([1.0; 4]));
        assert_eq!(image.texel(2, 0, 0), None);
        assert_eq!(image.texel(0, 2, 0), None);
        assert_eq!(image.texel(0, 0, 1), None);

        let mut short = image.clone();
        short.data.truncate(BYTES_PER_TEXEL * 3);
        assert_eq!(short.texel(1, 1, 0), None);
    }

    #[test]
    fn test_dimension_validation() {
        assert!(LutDimensions::STANDARD.validate().is_ok());

        let mut dims = LutDimensions::STANDARD;
        dims.scattering_nu_size = 1;
        assert!(matches!(
            dims.validate(),
            Err(PrecomputeError::InvalidDimension {
                name: "scattering_nu_size",
                value: 1
            })
        ));

        let mut dims = LutDimensions::STANDARD;
        dims.transmittance_height = 0;
        assert!(dims.validate().is_err());
    }

    #[test]
    fn test_prelude_contains_dimensions() {
        let prelude = LutDimensions::STANDARD.wgsl_prelude();
        assert!(prelude.contains("const TRANSMITTANCE_TEXTURE_WIDTH: f32 = 256.0;"));
        assert!(prelude.contains("const SCATTERING_TEXTURE_NU_SIZE: f32 = 8.0;"));
    }

    #[test]
    fn test_images_byte_size() {
        let images = LutImages::zeroed(&LutDimensions::STANDARD);
        assert_eq!(
            images.byte_size(),
            (256 * 64 + 64 * 16 + 256 * 128 * 32) * BYTES_PER_TEXEL
        );
    }
}
