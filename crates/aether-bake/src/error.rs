use std::path::PathBuf;

use aether_atmosphere::AtmosphereError;
use aether_config::ConfigError;
use aether_gpu::GpuContextError;

use crate::platform::PlatformError;

/// Everything that stops a bake or verify run.
#[derive(Debug, thiserror::Error)]
pub enum BakeError {
    #[error(transparent)]
    Platform(#[from] PlatformError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("GPU initialization failed: {0}")]
    Gpu(#[from] GpuContextError),

    #[error(transparent)]
    Atmosphere(#[from] AtmosphereError),

    #[error("LUT file {} does not exist", path.display())]
    MissingLutFile { path: PathBuf },

    #[error("{table} LUT failed verification: {reason}")]
    Verification { table: &'static str, reason: String },
}
