//! Headless wgpu plumbing: device setup, render-target textures, full-screen
//! passes, shader composition, and row-pitch-safe readback.

pub mod context;
pub mod pass;
pub mod readback;
pub mod shader;
pub mod texture;

pub use context::{GpuContext, GpuContextError, GpuOptions, init_headless_blocking};
pub use pass::{
    BLEND_ADDITIVE, ColorTargetsBuilder, FULLSCREEN_TRIANGLE_WGSL, FullscreenPipelineDescriptor,
    create_fullscreen_pipeline,
};
pub use readback::{ReadbackError, padded_bytes_per_row, read_texture, repack_rows};
pub use shader::{ShaderError, ShaderLibrary, compose_source};
pub use texture::{
    RENDER_TEXTURE_USAGE, RenderTexture, RenderTextureDescriptor, TextureError,
    create_render_texture, create_render_texture_with_data, expected_byte_size, texel_size,
};
