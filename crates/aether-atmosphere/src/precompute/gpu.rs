//! wgpu executor for the precomputation schedule.
//!
//! One shader module holds every kernel. Each kernel gets its own pipeline and
//! a bind group layout listing only the textures it samples. Layered passes
//! draw one full-screen triangle per depth slice of their 3D targets, picking
//! the slice uniform through a dynamic offset.

use std::collections::{BTreeMap, HashMap};
use std::num::NonZeroU64;
use std::sync::Arc;

use aether_gpu::{
    BLEND_ADDITIVE, ColorTargetsBuilder, FULLSCREEN_TRIANGLE_WGSL, FullscreenPipelineDescriptor,
    GpuContext, RenderTexture, ShaderLibrary, compose_source, create_fullscreen_pipeline,
    read_texture,
};
use bytemuck::{Pod, Zeroable};
use tracing::debug;

use super::{BlendMode, Kernel, LutTarget, PassDescriptor, PassExecutor, PrecomputeError};
use crate::COMMON_WGSL;
use crate::lut::{LUT_FORMAT, LutDimensions, LutImage, LutKind, LutTextures, create_lut_texture};
use crate::params::AtmosphereParameters;

pub const PRECOMPUTE_SHADER_NAME: &str = "atmosphere-precompute";

const PRECOMPUTE_WGSL: &str = include_str!("../shaders/precompute.wgsl");

const PARAMS_BINDING: u32 = 0;
const PASS_BINDING: u32 = 1;
const SAMPLER_BINDING: u32 = 2;

/// Full WGSL source of the precompute module for `dims`.
pub fn precompute_shader_source(dims: &LutDimensions) -> String {
    compose_source(&[
        &dims.wgsl_prelude(),
        FULLSCREEN_TRIANGLE_WGSL,
        COMMON_WGSL,
        PRECOMPUTE_WGSL,
    ])
}

/// Per-draw uniform. Matches `PassUniforms` in `precompute.wgsl`.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct PassUniforms {
    layer: u32,
    scattering_order: i32,
    _pad: [u32; 2],
}

const PASS_UNIFORMS_SIZE: u64 = std::mem::size_of::<PassUniforms>() as u64;

struct KernelPipeline {
    bind_group_layout: wgpu::BindGroupLayout,
    pipeline: wgpu::RenderPipeline,
}

/// Runs passes on the GPU. Owns the scratch textures for the duration of one
/// precomputation; [`GpuPrecompute::finish`] keeps only the persistent LUTs.
pub struct GpuPrecompute<'a> {
    ctx: &'a GpuContext,
    dims: LutDimensions,
    module: Arc<wgpu::ShaderModule>,
    params_buffer: wgpu::Buffer,
    pass_buffer: wgpu::Buffer,
    pass_stride: u64,
    sampler: wgpu::Sampler,
    luts: LutTextures,
    scratch: BTreeMap<LutTarget, RenderTexture>,
    pipelines: HashMap<Kernel, KernelPipeline>,
}

impl<'a> GpuPrecompute<'a> {
    /// Allocate every target, clear the persistent LUTs and compile the
    /// kernels' shader module.
    pub fn new(
        ctx: &'a GpuContext,
        params: &AtmosphereParameters,
        dims: LutDimensions,
    ) -> Result<Self, PrecomputeError> {
        let device = &ctx.device;
        let create = |target: LutTarget| {
            create_lut_texture(device, target.label(), target.extent(&dims), target.is_3d())
                .map_err(|source| PrecomputeError::Texture { target, source })
        };

        let luts = LutTextures {
            dims,
            transmittance: create(LutTarget::Transmittance)?,
            irradiance: create(LutTarget::Irradiance)?,
            scattering: create(LutTarget::Scattering)?,
        };
        let mut scratch = BTreeMap::new();
        for target in LutTarget::ALL.into_iter().filter(|t| t.is_scratch()) {
            scratch.insert(target, create(target)?);
        }

        let mut shaders = ShaderLibrary::new();
        let module = shaders.load_from_source(
            device,
            PRECOMPUTE_SHADER_NAME,
            &precompute_shader_source(&dims),
        );

        let params_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("atmosphere-params"),
            size: AtmosphereParameters::padded_size() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        ctx.queue.write_buffer(&params_buffer, 0, params.as_bytes());

        let alignment = u64::from(device.limits().min_uniform_buffer_offset_alignment);
        let pass_stride = PASS_UNIFORMS_SIZE.next_multiple_of(alignment);
        let pass_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("precompute-pass-uniforms"),
            size: pass_stride * u64::from(dims.scattering_r_size.max(1)),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("lut-sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let executor = Self {
            ctx,
            dims,
            module,
            params_buffer,
            pass_buffer,
            pass_stride,
            sampler,
            luts,
            scratch,
            pipelines: HashMap::new(),
        };
        executor.clear_persistent();
        Ok(executor)
    }

    pub fn dims(&self) -> &LutDimensions {
        &self.dims
    }

    /// The persistent tables being filled.
    pub fn luts(&self) -> &LutTextures {
        &self.luts
    }

    /// Drop the scratch textures and hand over the persistent LUTs.
    pub fn finish(self) -> LutTextures {
        self.luts
    }

    fn texture(&self, target: LutTarget) -> Result<&RenderTexture, PrecomputeError> {
        match target.persistent() {
            Some(kind) => Ok(self.luts.get(kind)),
            None => self
                .scratch
                .get(&target)
                .ok_or(PrecomputeError::NotAvailable(target)),
        }
    }

    fn clear_persistent(&self) {
        let mut encoder = self.ctx.create_encoder("lut-clear");
        for kind in LutKind::ALL {
            let texture = self.luts.get(kind);
            let slices: Vec<Option<u32>> = if kind.is_3d() {
                (0..texture.extent.depth_or_array_layers).map(Some).collect()
            } else {
                vec![None]
            };
            for slice in slices {
                ColorTargetsBuilder::new()
                    .label("lut-clear")
                    .clear(&texture.view, slice, wgpu::Color::TRANSPARENT)
                    .begin(&mut encoder);
            }
        }
        self.ctx.submit(encoder);
    }

    fn bind_group(
        &self,
        pass: &PassDescriptor,
        layout: &wgpu::BindGroupLayout,
    ) -> Result<wgpu::BindGroup, PrecomputeError> {
        let mut entries = vec![
            wgpu::BindGroupEntry {
                binding: PARAMS_BINDING,
                resource: self.params_buffer.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: PASS_BINDING,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &self.pass_buffer,
                    offset: 0,
                    size: NonZeroU64::new(PASS_UNIFORMS_SIZE),
                }),
            },
            wgpu::BindGroupEntry {
                binding: SAMPLER_BINDING,
                resource: wgpu::BindingResource::Sampler(&self.sampler),
            },
        ];
        for input in &pass.inputs {
            entries.push(wgpu::BindGroupEntry {
                binding: input.slot.binding(),
                resource: wgpu::BindingResource::TextureView(&self.texture(input.source)?.view),
            });
        }
        Ok(self
            .ctx
            .device
            .create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(&pass.label),
                layout,
                entries: &entries,
            }))
    }

    /// Slices drawn by `pass`: every depth slice for layered passes, else one.
    fn layer_count(&self, pass: &PassDescriptor) -> u32 {
        if pass.layered {
            self.dims.scattering_r_size
        } else {
            1
        }
    }

    fn write_pass_uniforms(&self, pass: &PassDescriptor, layers: u32) {
        let stride = self.pass_stride as usize;
        let mut data = vec![0u8; stride * layers as usize];
        for layer in 0..layers {
            let uniforms = PassUniforms {
                layer,
                scattering_order: pass.scattering_order,
                _pad: [0; 2],
            };
            let offset = layer as usize * stride;
            data[offset..offset + PASS_UNIFORMS_SIZE as usize]
                .copy_from_slice(bytemuck::bytes_of(&uniforms));
        }
        self.ctx.queue.write_buffer(&self.pass_buffer, 0, &data);
    }
}

/// Pipeline and bind group layout for the kernel of `pass`.
fn create_kernel_pipeline(
    device: &wgpu::Device,
    module: &wgpu::ShaderModule,
    pass: &PassDescriptor,
) -> KernelPipeline {
    let uniform = |binding: u32, dynamic: bool, size: u64| wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: dynamic,
            min_binding_size: NonZeroU64::new(size),
        },
        count: None,
    };
    let mut entries = vec![
        uniform(
            PARAMS_BINDING,
            false,
            std::mem::size_of::<AtmosphereParameters>() as u64,
        ),
        uniform(PASS_BINDING, true, PASS_UNIFORMS_SIZE),
        wgpu::BindGroupLayoutEntry {
            binding: SAMPLER_BINDING,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
            count: None,
        },
    ];
    entries.extend(pass.inputs.iter().map(|input| wgpu::BindGroupLayoutEntry {
        binding: input.slot.binding(),
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: true },
            view_dimension: if input.slot.is_3d() {
                wgpu::TextureViewDimension::D3
            } else {
                wgpu::TextureViewDimension::D2
            },
            multisampled: false,
        },
        count: None,
    }));

    let label = pass.kernel.entry_point();
    let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(label),
        entries: &entries,
    });
    let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(label),
        bind_group_layouts: &[&bind_group_layout],
        immediate_size: 0,
    });
    let targets: Vec<Option<wgpu::ColorTargetState>> = pass
        .outputs
        .iter()
        .map(|output| {
            Some(wgpu::ColorTargetState {
                format: LUT_FORMAT,
                blend: match output.blend {
                    BlendMode::Replace => None,
                    BlendMode::Add => Some(BLEND_ADDITIVE),
                },
                write_mask: wgpu::ColorWrites::ALL,
            })
        })
        .collect();
    let pipeline = create_fullscreen_pipeline(
        device,
        &FullscreenPipelineDescriptor {
            label,
            layout: &layout,
            module,
            fragment_entry: label,
            targets: &targets,
        },
    );
    debug!(kernel = label, "created precompute pipeline");
    KernelPipeline {
        bind_group_layout,
        pipeline,
    }
}

impl PassExecutor for GpuPrecompute<'_> {
    fn execute(&mut self, pass: &PassDescriptor) -> Result<(), PrecomputeError> {
        if !self.pipelines.contains_key(&pass.kernel) {
            let pipeline = create_kernel_pipeline(&self.ctx.device, &self.module, pass);
            self.pipelines.insert(pass.kernel, pipeline);
        }
        let kernel = &self.pipelines[&pass.kernel];
        let bind_group = self.bind_group(pass, &kernel.bind_group_layout)?;

        let layers = self.layer_count(pass);
        self.write_pass_uniforms(pass, layers);

        let views = pass
            .outputs
            .iter()
            .map(|output| self.texture(output.target).map(|t| &t.view))
            .collect::<Result<Vec<_>, _>>()?;

        let mut encoder = self.ctx.create_encoder(&pass.label);
        for layer in 0..layers {
            let slice = pass.layered.then_some(layer);
            let targets = views
                .iter()
                .fold(ColorTargetsBuilder::new().label(&pass.label), |b, view| {
                    b.load(view, slice)
                });
            let mut render_pass = targets.begin(&mut encoder);
            render_pass.set_pipeline(&kernel.pipeline);
            let offset = (u64::from(layer) * self.pass_stride) as u32;
            render_pass.set_bind_group(0, &bind_group, &[offset]);
            render_pass.draw(0..3, 0..1);
        }
        self.ctx.submit(encoder);
        Ok(())
    }

    fn snapshot(&self, target: LutTarget) -> Result<LutImage, PrecomputeError> {
        let texture = self.texture(target)?;
        let data = read_texture(&self.ctx.device, &self.ctx.queue, &texture.texture)
            .map_err(|source| PrecomputeError::Readback { target, source })?;
        Ok(LutImage {
            extent: target.extent(&self.dims),
            data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::precompute::{CpuPrecompute, build_schedule, run_schedule};

    fn small_dims() -> LutDimensions {
        LutDimensions {
            transmittance_width: 32,
            transmittance_height: 8,
            irradiance_width: 8,
            irradiance_height: 4,
            scattering_r_size: 4,
            scattering_mu_size: 8,
            scattering_mu_s_size: 4,
            scattering_nu_size: 2,
        }
    }

    fn gpu() -> Option<GpuContext> {
        aether_gpu::init_headless_blocking(&crate::gpu_options("precompute-test")).ok()
    }

    fn max_abs_diff(a: &LutImage, b: &LutImage) -> (f32, f32) {
        let mut diff = 0.0_f32;
        let mut peak = 0.0_f32;
        for (x, y) in a.texels().iter().flatten().zip(b.texels().iter().flatten()) {
            diff = diff.max((x - y).abs());
            peak = peak.max(y.abs());
        }
        (diff, peak)
    }

    #[test]
    fn test_shader_source_contains_every_kernel() {
        let source = precompute_shader_source(&small_dims());
        for kernel in [
            Kernel::Transmittance,
            Kernel::DirectIrradiance,
            Kernel::SingleScattering,
            Kernel::ScatteringDensity,
            Kernel::IndirectIrradiance,
            Kernel::MultipleScattering,
        ] {
            assert!(source.contains(&format!("fn {}(", kernel.entry_point())));
        }
        assert!(source.contains("const SCATTERING_TEXTURE_NU_SIZE: f32 = 2.0;"));
        assert!(source.contains("fn vs_fullscreen"));
    }

    #[test]
    fn test_pass_uniforms_layout() {
        assert_eq!(PASS_UNIFORMS_SIZE, 16);
    }

    #[test]
    fn test_gpu_matches_cpu_reference() {
        let Some(ctx) = gpu() else {
            return;
        };
        let params = AtmosphereParameters::earth();
        let dims = small_dims();
        let schedule = build_schedule(2).unwrap();

        let mut gpu_exec = GpuPrecompute::new(&ctx, &params, dims).unwrap();
        run_schedule(&mut gpu_exec, &schedule, None).unwrap();
        let mut cpu_exec = CpuPrecompute::new(params, dims);
        run_schedule(&mut cpu_exec, &schedule, None).unwrap();

        let transmittance = (
            gpu_exec.snapshot(LutTarget::Transmittance).unwrap(),
            cpu_exec.snapshot(LutTarget::Transmittance).unwrap(),
        );
        let (diff, _) = max_abs_diff(&transmittance.0, &transmittance.1);
        assert!(diff < 1e-3, "transmittance differs by {diff}");

        // Hardware filtering weights are low precision; compare against the
        // table's peak rather than texel by texel.
        for target in [LutTarget::Scattering, LutTarget::Irradiance] {
            let (diff, peak) = max_abs_diff(
                &gpu_exec.snapshot(target).unwrap(),
                &cpu_exec.snapshot(target).unwrap(),
            );
            assert!(diff <= 0.05 * peak + 1e-6, "{target:?}: diff {diff}, peak {peak}");
        }
    }

    #[test]
    fn test_gpu_degenerate_atmosphere() {
        let Some(ctx) = gpu() else {
            return;
        };
        let params = AtmosphereParameters::earth().without_scattering();
        let luts = crate::precompute::precompute_gpu(&ctx, &params, small_dims(), 3).unwrap();
        let images = luts.read_back(&ctx).unwrap();
        for t in images.transmittance.texels() {
            for v in &t[..3] {
                assert!((v - 1.0).abs() < 1e-6);
            }
        }
        assert!(images.scattering.texels().iter().flatten().all(|v| *v == 0.0));
        assert!(images.irradiance.texels().iter().flatten().all(|v| *v == 0.0));
    }

    #[test]
    fn test_finish_keeps_requested_dimensions() {
        let Some(ctx) = gpu() else {
            return;
        };
        let dims = small_dims();
        let exec = GpuPrecompute::new(&ctx, &AtmosphereParameters::earth(), dims).unwrap();
        assert_eq!(exec.dims(), &dims);
        let luts = exec.finish();
        assert_eq!(luts.scattering.extent.depth_or_array_layers, 4);
        assert_eq!(luts.memory_bytes(), dims.scattering().byte_size() + 32 * 8 * 16 + 8 * 4 * 16);
    }
}
