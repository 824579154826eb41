//! Error types for precomputation, LUT files and the runtime owner.

use std::path::PathBuf;

use aether_gpu::{ReadbackError, TextureError};

use crate::precompute::{InputSlot, LutTarget};

/// Errors from building or running the precomputation schedule.
#[derive(Debug, thiserror::Error)]
pub enum PrecomputeError {
    /// At least one scattering order is required.
    #[error("scattering order must be at least 1, got {0}")]
    InvalidScatteringOrder(u32),

    /// A LUT size too small for the texel-center parameterization.
    #[error("LUT dimension {name} must be at least 2, got {value}")]
    InvalidDimension { name: &'static str, value: u32 },

    /// A pass samples a scratch target no earlier pass has written.
    #[error("pass '{pass}' reads {target:?} before any pass writes it")]
    UnwrittenInput { pass: String, target: LutTarget },

    /// A kernel needs an input the pass does not bind.
    #[error("pass '{pass}' binds no input for {slot:?}")]
    MissingInput { pass: String, slot: InputSlot },

    /// A pass samples a target it also renders to.
    #[error("pass '{pass}' both reads and writes {target:?}")]
    ReadWriteAlias { pass: String, target: LutTarget },

    /// A 2D target used where a 3D one is required, or the reverse.
    #[error("pass '{pass}' uses {target:?} with the wrong dimensionality")]
    DimensionMismatch { pass: String, target: LutTarget },

    /// Creating a LUT or scratch texture failed.
    #[error("failed to create {target:?}: {source}")]
    Texture {
        target: LutTarget,
        #[source]
        source: TextureError,
    },

    /// Reading an intermediate or final table back failed.
    #[error("failed to read back {target:?}: {source}")]
    Readback {
        target: LutTarget,
        #[source]
        source: ReadbackError,
    },

    /// A snapshot was requested for a target the executor does not hold.
    #[error("{0:?} is not available for inspection")]
    NotAvailable(LutTarget),
}

/// Errors from decoding or encoding a LUT file.
#[derive(Debug, thiserror::Error)]
pub enum LutFileError {
    #[error("LUT file I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The cursor would run past the end of the data.
    #[error("LUT data truncated: needed {needed} bytes, {remaining} remaining")]
    Truncated { needed: usize, remaining: usize },

    /// Bytes remain after the last block.
    #[error("LUT data has {0} trailing bytes")]
    TrailingBytes(usize),

    #[error("not a LUT file (bad magic)")]
    BadMagic,

    #[error("unsupported LUT file version {0}")]
    UnsupportedVersion(u32),

    /// The writer used a different texel format.
    #[error("LUT texel size mismatch: file has {found} bytes, expected {expected}")]
    TexelSizeMismatch { expected: u32, found: u32 },

    /// The parameter block size changed between writer and reader.
    #[error("LUT params size mismatch: file has {found} bytes, expected {expected}")]
    ParamsSizeMismatch { expected: u32, found: u32 },

    #[error("{kind} dimensions mismatch: file has {found:?}, expected {expected:?}")]
    DimensionMismatch {
        kind: &'static str,
        expected: [u32; 3],
        found: [u32; 3],
    },

    /// The scattering sizes (r, mu, mu_s, nu) differ from the reader's.
    #[error("scattering sizes mismatch: file has {found:?}, expected {expected:?}")]
    ScatteringLayoutMismatch { expected: [u32; 4], found: [u32; 4] },

    /// An image handed to the encoder does not match its extent.
    #[error("{kind} image holds {actual} bytes, extent requires {expected}")]
    ImageSizeMismatch {
        kind: &'static str,
        expected: usize,
        actual: usize,
    },
}

/// Errors from the runtime atmosphere owner.
#[derive(Debug, thiserror::Error)]
pub enum AtmosphereError {
    #[error(transparent)]
    LutFile(#[from] LutFileError),

    #[error(transparent)]
    Precompute(#[from] PrecomputeError),

    #[error("failed to upload LUT textures: {0}")]
    Texture(#[from] TextureError),

    #[error("failed to read LUT textures back: {0}")]
    Readback(#[from] ReadbackError),
}
