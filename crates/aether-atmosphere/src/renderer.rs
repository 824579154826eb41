//! Runtime sky and aerial-perspective pass.
//!
//! [`AtmosphereRenderer`] draws one full-screen triangle over the scene's
//! color target. It reads the scene depth with `textureLoad` (no depth test)
//! and composites sky radiance behind geometry and in-scattered light in
//! front of it, using the three precomputed LUTs.

use std::num::NonZeroU64;

use aether_gpu::{
    ColorTargetsBuilder, FULLSCREEN_TRIANGLE_WGSL, FullscreenPipelineDescriptor, compose_source,
    create_fullscreen_pipeline,
};
use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use static_assertions::const_assert_eq;

use crate::COMMON_WGSL;
use crate::atmosphere::Atmosphere;
use crate::inspector::AtmosphereTunables;
use crate::lut::LutDimensions;
use crate::params::AtmosphereParameters;

const RENDER_WGSL: &str = include_str!("shaders/render.wgsl");

pub const RENDER_SHADER_NAME: &str = "atmosphere-render";

/// `color = src + dst * (1 - src_alpha)`, destination alpha untouched.
pub const ATMOSPHERE_BLEND: wgpu::BlendState = wgpu::BlendState {
    color: wgpu::BlendComponent {
        src_factor: wgpu::BlendFactor::One,
        dst_factor: wgpu::BlendFactor::OneMinusSrcAlpha,
        operation: wgpu::BlendOperation::Add,
    },
    alpha: wgpu::BlendComponent {
        src_factor: wgpu::BlendFactor::Zero,
        dst_factor: wgpu::BlendFactor::One,
        operation: wgpu::BlendOperation::Add,
    },
};

/// Full WGSL source of the render module for `dims`.
pub fn render_shader_source(dims: &LutDimensions) -> String {
    compose_source(&[
        &dims.wgsl_prelude(),
        FULLSCREEN_TRIANGLE_WGSL,
        COMMON_WGSL,
        RENDER_WGSL,
    ])
}

/// Per-frame uniform. Matches `RenderConstants` in `render.wgsl`.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct RenderConstants {
    pub sun_direction: [f32; 3],
    pub _pad0: f32,
    pub sun_illuminance: [f32; 3],
    pub aerial_perspective_scale: f32,
    pub camera_position: [f32; 3],
    pub _pad1: f32,
    pub camera_forward: [f32; 3],
    pub _pad2: f32,
    pub perspective_horizontal: [f32; 3],
    pub perspective_a: f32,
    pub perspective_vertical: [f32; 3],
    pub perspective_b: f32,
}

const_assert_eq!(std::mem::size_of::<RenderConstants>(), 96);

/// Camera and lighting state for one frame. Positions are meters, +Y up,
/// ground at `y = 0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameInputs {
    pub camera_position: Vec3,
    pub camera_forward: Vec3,
    pub camera_up: Vec3,
    /// Vertical field of view in radians.
    pub fov_y: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
    /// Direction towards the sun.
    pub sun_direction: Vec3,
    pub sun_illuminance: Vec3,
    pub aerial_perspective_scale: f32,
}

impl Default for FrameInputs {
    fn default() -> Self {
        Self {
            camera_position: Vec3::new(0.0, 1.0, 0.0),
            camera_forward: Vec3::NEG_Z,
            camera_up: Vec3::Y,
            fov_y: 60.0_f32.to_radians(),
            aspect: 16.0 / 9.0,
            near: 0.1,
            far: 10_000.0,
            sun_direction: Vec3::new(-1.0, 1.0, 1.0).normalize(),
            sun_illuminance: Vec3::splat(10.0),
            aerial_perspective_scale: 1.0,
        }
    }
}

impl FrameInputs {
    /// Take the sun and aerial-perspective settings from `tunables`.
    pub fn with_tunables(mut self, tunables: &AtmosphereTunables) -> Self {
        self.sun_direction = tunables.sun_direction;
        self.sun_illuminance = tunables.sun_illuminance();
        self.aerial_perspective_scale = tunables.aerial_perspective_scale;
        self
    }
}

impl RenderConstants {
    pub fn from_frame(frame: &FrameInputs) -> Self {
        let forward = frame.camera_forward.normalize_or_zero();
        let (horizontal, vertical) =
            perspective_basis(forward, frame.camera_up, frame.fov_y, frame.aspect);
        let (a, b) = perspective_depth_coefficients(frame.near, frame.far);
        Self {
            sun_direction: frame.sun_direction.normalize_or_zero().to_array(),
            _pad0: 0.0,
            sun_illuminance: frame.sun_illuminance.to_array(),
            aerial_perspective_scale: frame.aerial_perspective_scale,
            camera_position: frame.camera_position.to_array(),
            _pad1: 0.0,
            camera_forward: forward.to_array(),
            _pad2: 0.0,
            perspective_horizontal: horizontal.to_array(),
            perspective_a: a,
            perspective_vertical: vertical.to_array(),
            perspective_b: b,
        }
    }
}

/// Half-extent vectors of the image plane at unit distance along `forward`.
///
/// `forward + hor * x + ver * y` for NDC `x, y` in [-1, 1] is the view ray
/// through that pixel.
pub fn perspective_basis(forward: Vec3, up: Vec3, fov_y: f32, aspect: f32) -> (Vec3, Vec3) {
    let forward = forward.normalize_or_zero();
    let right = forward.cross(up).normalize_or_zero();
    let true_up = right.cross(forward);
    let t = (fov_y * 0.5).tan();
    (right * t * aspect, true_up * t)
}

/// `(a, b)` such that view depth `z = b / (d - a)` for a 0..1 depth buffer
/// value `d`.
pub fn perspective_depth_coefficients(near: f32, far: f32) -> (f32, f32) {
    let range = far - near;
    (far / range, -far * near / range)
}

pub fn linearize_depth(d: f32, a: f32, b: f32) -> f32 {
    b / (d - a)
}

/// Sky and aerial-perspective pass for one color format and LUT size.
pub struct AtmosphereRenderer {
    pub pipeline: wgpu::RenderPipeline,
    pub bind_group_layout: wgpu::BindGroupLayout,
    pub constants_buffer: wgpu::Buffer,
    pub lut_sampler: wgpu::Sampler,
    dims: LutDimensions,
}

impl AtmosphereRenderer {
    pub fn new(
        device: &wgpu::Device,
        color_format: wgpu::TextureFormat,
        dims: LutDimensions,
    ) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(RENDER_SHADER_NAME),
            source: wgpu::ShaderSource::Wgsl(render_shader_source(&dims).into()),
        });

        let uniform = |binding: u32, size: usize| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: NonZeroU64::new(size as u64),
            },
            count: None,
        };
        let lut = |binding: u32, view_dimension: wgpu::TextureViewDimension| {
            wgpu::BindGroupLayoutEntry {
                binding,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    view_dimension,
                    multisampled: false,
                },
                count: None,
            }
        };

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("atmosphere-render-bind-group-layout"),
            entries: &[
                uniform(0, std::mem::size_of::<AtmosphereParameters>()),
                uniform(1, std::mem::size_of::<RenderConstants>()),
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
                lut(3, wgpu::TextureViewDimension::D2),
                lut(4, wgpu::TextureViewDimension::D2),
                lut(5, wgpu::TextureViewDimension::D3),
                wgpu::BindGroupLayoutEntry {
                    binding: 6,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Depth,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("atmosphere-render-pipeline-layout"),
            bind_group_layouts: &[&bind_group_layout],
            immediate_size: 0,
        });

        let pipeline = create_fullscreen_pipeline(
            device,
            &FullscreenPipelineDescriptor {
                label: "atmosphere-render-pipeline",
                layout: &pipeline_layout,
                module: &shader,
                fragment_entry: "fs_atmosphere",
                targets: &[Some(wgpu::ColorTargetState {
                    format: color_format,
                    blend: Some(ATMOSPHERE_BLEND),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            },
        );

        let constants_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("atmosphere-render-constants"),
            size: std::mem::size_of::<RenderConstants>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let lut_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("atmosphere-render-lut-sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        Self {
            pipeline,
            bind_group_layout,
            constants_buffer,
            lut_sampler,
            dims,
        }
    }

    /// LUT dimensions the shader was compiled for.
    pub fn dims(&self) -> &LutDimensions {
        &self.dims
    }

    /// Bind `atmosphere`'s tables and the scene depth. Recreate whenever the
    /// depth texture changes.
    pub fn create_bind_group(
        &self,
        device: &wgpu::Device,
        atmosphere: &Atmosphere,
        depth_view: &wgpu::TextureView,
    ) -> wgpu::BindGroup {
        let luts = atmosphere.luts();
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("atmosphere-render-bind-group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: atmosphere.params_buffer().as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: self.constants_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(&self.lut_sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(&luts.transmittance.view),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: wgpu::BindingResource::TextureView(&luts.irradiance.view),
                },
                wgpu::BindGroupEntry {
                    binding: 5,
                    resource: wgpu::BindingResource::TextureView(&luts.scattering.view),
                },
                wgpu::BindGroupEntry {
                    binding: 6,
                    resource: wgpu::BindingResource::TextureView(depth_view),
                },
            ],
        })
    }

    /// Upload this frame's camera and sun state.
    pub fn update(&self, queue: &wgpu::Queue, frame: &FrameInputs) {
        let constants = RenderConstants::from_frame(frame);
        queue.write_buffer(&self.constants_buffer, 0, bytemuck::bytes_of(&constants));
    }

    /// Draw into an already-open pass whose color target matches the
    /// renderer's format.
    pub fn render(&self, render_pass: &mut wgpu::RenderPass<'_>, bind_group: &wgpu::BindGroup) {
        render_pass.set_pipeline(&self.pipeline);
        render_pass.set_bind_group(0, bind_group, &[]);
        render_pass.draw(0..3, 0..1);
    }

    /// Record a pass compositing the atmosphere over `color_view`.
    pub fn encode(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        color_view: &wgpu::TextureView,
        bind_group: &wgpu::BindGroup,
    ) {
        let mut pass = ColorTargetsBuilder::new()
            .label("atmosphere")
            .load(color_view, None)
            .begin(encoder);
        self.render(&mut pass, bind_group);
    }
}
