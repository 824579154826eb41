//! Runtime owner of the atmosphere: parameters, their uniform buffer and the
//! three LUTs, whether precomputed in-process or imported from a file.

use std::path::Path;
use std::time::Instant;

use aether_gpu::GpuContext;
use tracing::{info, instrument, warn};

use crate::codec::{read_lut_file, write_lut_file};
use crate::error::AtmosphereError;
use crate::inspector::AtmosphereInspector;
use crate::lut::{LutDimensions, LutTextures};
use crate::params::AtmosphereParameters;
use crate::precompute::precompute_gpu;

/// Where an [`Atmosphere`]'s tables came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LutSource {
    Precomputed,
    Imported,
}

pub struct Atmosphere {
    params: AtmosphereParameters,
    params_buffer: wgpu::Buffer,
    luts: LutTextures,
    source: LutSource,
}

impl Atmosphere {
    fn new(
        ctx: &GpuContext,
        params: AtmosphereParameters,
        luts: LutTextures,
        source: LutSource,
    ) -> Self {
        let params_buffer = ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("atmosphere-params"),
            size: AtmosphereParameters::padded_size() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        ctx.queue.write_buffer(&params_buffer, 0, params.as_bytes());
        Self {
            params,
            params_buffer,
            luts,
            source,
        }
    }

    /// Precompute standard-size tables on the GPU.
    pub fn precompute(
        ctx: &GpuContext,
        params: AtmosphereParameters,
        max_order: u32,
    ) -> Result<Self, AtmosphereError> {
        Self::precompute_with_dims(ctx, params, LutDimensions::STANDARD, max_order)
    }

    pub fn precompute_with_dims(
        ctx: &GpuContext,
        params: AtmosphereParameters,
        dims: LutDimensions,
        max_order: u32,
    ) -> Result<Self, AtmosphereError> {
        let luts = precompute_gpu(ctx, &params, dims, max_order)?;
        Ok(Self::new(ctx, params, luts, LutSource::Precomputed))
    }

    /// Load standard-size tables and the parameters they were built from.
    pub fn import(ctx: &GpuContext, path: &Path) -> Result<Self, AtmosphereError> {
        Self::import_with_dims(ctx, path, LutDimensions::STANDARD)
    }

    #[instrument(skip(ctx, dims))]
    pub fn import_with_dims(
        ctx: &GpuContext,
        path: &Path,
        dims: LutDimensions,
    ) -> Result<Self, AtmosphereError> {
        let start = Instant::now();
        let (params, images) = read_lut_file(path, &dims)?;
        let luts = LutTextures::upload(ctx, dims, &images)?;
        info!(
            bytes = images.byte_size(),
            elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
            "imported atmosphere LUTs"
        );
        Ok(Self::new(ctx, params, luts, LutSource::Imported))
    }

    /// Read the tables back and write them with the parameters to `path`.
    /// Blocks until all GPU work on the tables has finished.
    #[instrument(skip(self, ctx))]
    pub fn export(&self, ctx: &GpuContext, path: &Path) -> Result<(), AtmosphereError> {
        let images = self.luts.read_back(ctx)?;
        write_lut_file(path, &self.params, &self.luts.dims, &images)?;
        info!(bytes = images.byte_size(), "exported atmosphere LUTs");
        Ok(())
    }

    /// Import `path` if it exists, otherwise precompute from `params` and
    /// export to `path`. Stages and the resulting tables are reported to
    /// `inspector`.
    pub fn load_or_precompute(
        ctx: &GpuContext,
        path: &Path,
        params: AtmosphereParameters,
        max_order: u32,
        inspector: &mut AtmosphereInspector,
    ) -> Result<Self, AtmosphereError> {
        Self::load_or_precompute_with_dims(
            ctx,
            path,
            params,
            LutDimensions::STANDARD,
            max_order,
            inspector,
        )
    }

    pub fn load_or_precompute_with_dims(
        ctx: &GpuContext,
        path: &Path,
        params: AtmosphereParameters,
        dims: LutDimensions,
        max_order: u32,
        inspector: &mut AtmosphereInspector,
    ) -> Result<Self, AtmosphereError> {
        let atmosphere = if path.exists() {
            let atmosphere = Self::import_with_dims(ctx, path, dims)?;
            if atmosphere.params != params {
                warn!(
                    path = %path.display(),
                    "LUT file was baked with different parameters; using the file's"
                );
            }
            inspector.mark_stage("lut-import");
            atmosphere
        } else {
            info!(path = %path.display(), "no LUT file, precomputing");
            let atmosphere = Self::precompute_with_dims(ctx, params, dims, max_order)?;
            inspector.mark_stage("lut-precompute");
            atmosphere.export(ctx, path)?;
            inspector.mark_stage("lut-export");
            atmosphere
        };
        inspector.track_luts(&atmosphere.luts);
        Ok(atmosphere)
    }

    pub fn params(&self) -> &AtmosphereParameters {
        &self.params
    }

    /// Uniform buffer holding [`Atmosphere::params`].
    pub fn params_buffer(&self) -> &wgpu::Buffer {
        &self.params_buffer
    }

    pub fn luts(&self) -> &LutTextures {
        &self.luts
    }

    pub fn source(&self) -> LutSource {
        self.source
    }
}
