//! Render-target textures usable as color outputs, shader inputs and copy sources.
//!
//! [`create_render_texture`] validates the request against the format and the
//! device limits before touching the GPU, so a bad request surfaces as a
//! [`TextureError`] naming the texture, its extent and format.

/// A GPU texture with its default view and creation metadata.
pub struct RenderTexture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub extent: wgpu::Extent3d,
    pub format: wgpu::TextureFormat,
    pub dimension: wgpu::TextureDimension,
}

/// Parameters for [`create_render_texture`].
#[derive(Debug, Clone, Copy)]
pub struct RenderTextureDescriptor<'a> {
    pub label: &'a str,
    pub width: u32,
    pub height: u32,
    /// Depth for 3D textures, 1 for 2D.
    pub depth: u32,
    pub dimension: wgpu::TextureDimension,
    pub format: wgpu::TextureFormat,
}

impl RenderTextureDescriptor<'_> {
    pub fn extent(&self) -> wgpu::Extent3d {
        wgpu::Extent3d {
            width: self.width,
            height: self.height,
            depth_or_array_layers: self.depth,
        }
    }
}

/// Errors that can occur during texture creation.
#[derive(Debug, thiserror::Error)]
pub enum TextureError {
    /// Texel data length doesn't match the expected size for the given extent and format.
    #[error(
        "texture '{label}' data size ({actual}) does not match expected ({expected}) for {width}x{height}x{depth} {format:?}"
    )]
    DataSizeMismatch {
        label: String,
        actual: usize,
        expected: usize,
        width: u32,
        height: u32,
        depth: u32,
        format: wgpu::TextureFormat,
    },

    /// Width, height or depth is zero.
    #[error("texture '{label}' dimensions must be non-zero, got {width}x{height}x{depth}")]
    ZeroDimensions {
        label: String,
        width: u32,
        height: u32,
        depth: u32,
    },

    /// The requested extent is larger than the device allows.
    #[error("texture '{label}' extent {width}x{height}x{depth} exceeds device limit {limit}")]
    ExceedsLimits {
        label: String,
        width: u32,
        height: u32,
        depth: u32,
        limit: u32,
    },

    /// The format has no single-plane texel size (compressed or depth/stencil combined).
    #[error("texture '{label}' uses unsupported format {format:?}")]
    UnsupportedFormat {
        label: String,
        format: wgpu::TextureFormat,
    },
}

/// Usage shared by every render texture: renderable, sampleable, and copyable both ways.
pub const RENDER_TEXTURE_USAGE: wgpu::TextureUsages = wgpu::TextureUsages::RENDER_ATTACHMENT
    .union(wgpu::TextureUsages::TEXTURE_BINDING)
    .union(wgpu::TextureUsages::COPY_SRC)
    .union(wgpu::TextureUsages::COPY_DST);

/// Bytes per texel, or `None` for formats without a single-plane texel size.
pub fn texel_size(format: wgpu::TextureFormat) -> Option<u32> {
    format.block_copy_size(None)
}

/// Tightly packed size in bytes of a whole texture.
pub fn expected_byte_size(extent: wgpu::Extent3d, format: wgpu::TextureFormat) -> Option<usize> {
    let texel = texel_size(format)? as usize;
    Some(
        extent.width as usize
            * extent.height as usize
            * extent.depth_or_array_layers as usize
            * texel,
    )
}

/// Create an uninitialized render texture. wgpu zero-fills it on first use.
pub fn create_render_texture(
    device: &wgpu::Device,
    desc: &RenderTextureDescriptor<'_>,
) -> Result<RenderTexture, TextureError> {
    validate(device, desc)?;

    let extent = desc.extent();
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(desc.label),
        size: extent,
        mip_level_count: 1,
        sample_count: 1,
        dimension: desc.dimension,
        format: desc.format,
        usage: RENDER_TEXTURE_USAGE,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor {
        label: Some(desc.label),
        ..Default::default()
    });

    log::debug!(
        "Created texture '{}' {}x{}x{} {:?}",
        desc.label,
        desc.width,
        desc.height,
        desc.depth,
        desc.format
    );

    Ok(RenderTexture {
        texture,
        view,
        extent,
        format: desc.format,
        dimension: desc.dimension,
    })
}

/// Create a render texture and fill it from tightly packed texel data.
pub fn create_render_texture_with_data(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    desc: &RenderTextureDescriptor<'_>,
    data: &[u8],
) -> Result<RenderTexture, TextureError> {
    let expected = expected_byte_size(desc.extent(), desc.format).ok_or_else(|| {
        TextureError::UnsupportedFormat {
            label: desc.label.to_string(),
            format: desc.format,
        }
    })?;
    if data.len() != expected {
        return Err(TextureError::DataSizeMismatch {
            label: desc.label.to_string(),
            actual: data.len(),
            expected,
            width: desc.width,
            height: desc.height,
            depth: desc.depth,
            format: desc.format,
        });
    }

    let target = create_render_texture(device, desc)?;
    let texel = texel_size(desc.format).unwrap_or(4);

    queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            texture: &target.texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        data,
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(desc.width * texel),
            rows_per_image: Some(desc.height),
        },
        desc.extent(),
    );

    Ok(target)
}

fn validate(device: &wgpu::Device, desc: &RenderTextureDescriptor<'_>) -> Result<(), TextureError> {
    if desc.width == 0 || desc.height == 0 || desc.depth == 0 {
        return Err(TextureError::ZeroDimensions {
            label: desc.label.to_string(),
            width: desc.width,
            height: desc.height,
            depth: desc.depth,
        });
    }
    if texel_size(desc.format).is_none() {
        return Err(TextureError::UnsupportedFormat {
            label: desc.label.to_string(),
            format: desc.format,
        });
    }

    let limits = device.limits();
    let limit = match desc.dimension {
        wgpu::TextureDimension::D1 => limits.max_texture_dimension_1d,
        wgpu::TextureDimension::D2 => limits.max_texture_dimension_2d,
        wgpu::TextureDimension::D3 => limits.max_texture_dimension_3d,
    };
    let largest = match desc.dimension {
        wgpu::TextureDimension::D3 => desc.width.max(desc.height).max(desc.depth),
        _ => desc.width.max(desc.height),
    };
    if largest > limit {
        return Err(TextureError::ExceedsLimits {
            label: desc.label.to_string(),
            width: desc.width,
            height: desc.height,
            depth: desc.depth,
            limit,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{GpuOptions, init_headless_blocking};

    fn descriptor(width: u32, height: u32, depth: u32) -> RenderTextureDescriptor<'static> {
        RenderTextureDescriptor {
            label: "test-texture",
            width,
            height,
            depth,
            dimension: if depth > 1 {
                wgpu::TextureDimension::D3
            } else {
                wgpu::TextureDimension::D2
            },
            format: wgpu::TextureFormat::Rgba32Float,
        }
    }

    #[test]
    fn test_expected_byte_size_rgba32f() {
        let size = expected_byte_size(descriptor(256, 128, 32).extent(), wgpu::TextureFormat::Rgba32Float);
        assert_eq!(size, Some(256 * 128 * 32 * 16));
    }

    #[test]
    fn test_expected_byte_size_unsupported_format() {
        let extent = descriptor(4, 4, 1).extent();
        assert_eq!(expected_byte_size(extent, wgpu::TextureFormat::Depth24PlusStencil8), None);
    }

    #[test]
    fn test_render_texture_usage_covers_lut_needs() {
        assert!(RENDER_TEXTURE_USAGE.contains(wgpu::TextureUsages::RENDER_ATTACHMENT));
        assert!(RENDER_TEXTURE_USAGE.contains(wgpu::TextureUsages::TEXTURE_BINDING));
        assert!(RENDER_TEXTURE_USAGE.contains(wgpu::TextureUsages::COPY_SRC));
        assert!(RENDER_TEXTURE_USAGE.contains(wgpu::TextureUsages::COPY_DST));
    }

    #[test]
    fn test_zero_dimension_rejected() {
        let Ok(ctx) = init_headless_blocking(&GpuOptions::default()) else {
            return;
        };
        let result = create_render_texture(&ctx.device, &descriptor(0, 4, 1));
        assert!(matches!(result, Err(TextureError::ZeroDimensions { .. })));
    }

    #[test]
    fn test_data_size_mismatch_rejected() {
        let Ok(ctx) = init_headless_blocking(&GpuOptions::default()) else {
            return;
        };
        let data = vec![0u8; 10];
        let result =
            create_render_texture_with_data(&ctx.device, &ctx.queue, &descriptor(2, 2, 1), &data);
        match result {
            Err(TextureError::DataSizeMismatch { expected, actual, .. }) => {
                assert_eq!(expected, 64);
                assert_eq!(actual, 10);
            }
            _ => panic!("expected DataSizeMismatch"),
        }
    }

    #[test]
    fn test_create_3d_texture() {
        let Ok(ctx) = init_headless_blocking(&GpuOptions::default()) else {
            return;
        };
        let tex = create_render_texture(&ctx.device, &descriptor(8, 4, 2)).unwrap();
        assert_eq!(tex.extent.depth_or_array_layers, 2);
        assert_eq!(tex.dimension, wgpu::TextureDimension::D3);
    }
}
