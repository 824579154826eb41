//! Precomputed atmospheric scattering.
//!
//! Builds transmittance, irradiance and multi-order in-scattering lookup
//! tables from physical [`AtmosphereParameters`], stores them in a LUT file,
//! and renders sky and aerial perspective from them at runtime.

pub mod atmosphere;
pub mod codec;
pub mod error;
pub mod inspector;
pub mod lut;
pub mod model;
pub mod params;
pub mod precompute;
pub mod renderer;

pub use atmosphere::{Atmosphere, LutSource};
pub use codec::{
    ByteReader, LUT_FILE_MAGIC, LUT_FILE_VERSION, decode, encode, expected_file_size,
    read_lut_file, write_lut_file,
};
pub use error::{AtmosphereError, LutFileError, PrecomputeError};
pub use inspector::{
    AtmosphereInspector, AtmosphereTunables, LutMemoryReport, StartupTimeline, TrackedKind,
    TrackedTexture,
};
pub use lut::{
    BYTES_PER_TEXEL, LUT_FORMAT, LutDimensions, LutExtent, LutImage, LutImages, LutKind,
    LutTextures, MAX_SCATTERING_ORDER,
};
pub use params::{AtmosphereParameters, DensityLayer};
pub use precompute::{build_schedule, precompute_cpu, precompute_gpu, run_schedule};
pub use renderer::{
    ATMOSPHERE_BLEND, AtmosphereRenderer, FrameInputs, RenderConstants, linearize_depth,
    perspective_basis, perspective_depth_coefficients,
};

use aether_gpu::GpuOptions;

pub(crate) const COMMON_WGSL: &str = include_str!("shaders/common.wgsl");

/// Filterable and blendable `Rgba32Float`, needed by every LUT pass.
pub fn required_features() -> wgpu::Features {
    wgpu::Features::FLOAT32_FILTERABLE | wgpu::Features::FLOAT32_BLENDABLE
}

/// Single scattering writes three `Rgba32Float` targets at once.
pub const REQUIRED_COLOR_ATTACHMENT_BYTES_PER_SAMPLE: u32 = 48;

pub fn required_limits() -> wgpu::Limits {
    wgpu::Limits {
        max_color_attachment_bytes_per_sample: REQUIRED_COLOR_ATTACHMENT_BYTES_PER_SAMPLE,
        ..wgpu::Limits::default()
    }
}

/// Device options that satisfy the precompute and render passes.
pub fn gpu_options(label: &'static str) -> GpuOptions {
    GpuOptions {
        label,
        required_features: required_features(),
        required_limits: required_limits(),
        ..GpuOptions::default()
    }
}
