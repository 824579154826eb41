//! Full-screen pass helpers.
//!
//! Provides [`FULLSCREEN_TRIANGLE_WGSL`], [`create_fullscreen_pipeline`] for
//! pipelines drawing a single covering triangle, and [`ColorTargetsBuilder`] for
//! multi-target render passes, including per-slice targets of 3D textures.

/// Vertex stage emitting one triangle that covers the whole viewport.
///
/// Draw with `draw(0..3, 0..1)`. `uv` is (0,0) at the top-left corner.
pub const FULLSCREEN_TRIANGLE_WGSL: &str = r#"
struct FullscreenVertex {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

@vertex
fn vs_fullscreen(@builtin(vertex_index) idx: u32) -> FullscreenVertex {
    let uv = vec2<f32>(f32((idx << 1u) & 2u), f32(idx & 2u));
    var out: FullscreenVertex;
    out.position = vec4<f32>(uv.x * 2.0 - 1.0, 1.0 - uv.y * 2.0, 0.0, 1.0);
    out.uv = uv;
    return out;
}
"#;

/// Additive blend on color and alpha: `dst = src + dst`.
pub const BLEND_ADDITIVE: wgpu::BlendState = wgpu::BlendState {
    color: wgpu::BlendComponent {
        src_factor: wgpu::BlendFactor::One,
        dst_factor: wgpu::BlendFactor::One,
        operation: wgpu::BlendOperation::Add,
    },
    alpha: wgpu::BlendComponent {
        src_factor: wgpu::BlendFactor::One,
        dst_factor: wgpu::BlendFactor::One,
        operation: wgpu::BlendOperation::Add,
    },
};

/// Parameters for [`create_fullscreen_pipeline`]. The module must contain
/// [`FULLSCREEN_TRIANGLE_WGSL`].
pub struct FullscreenPipelineDescriptor<'a> {
    pub label: &'a str,
    pub layout: &'a wgpu::PipelineLayout,
    pub module: &'a wgpu::ShaderModule,
    pub fragment_entry: &'a str,
    pub targets: &'a [Option<wgpu::ColorTargetState>],
}

/// Build a pipeline with no vertex buffers, no depth test and no culling.
pub fn create_fullscreen_pipeline(
    device: &wgpu::Device,
    desc: &FullscreenPipelineDescriptor<'_>,
) -> wgpu::RenderPipeline {
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(desc.label),
        layout: Some(desc.layout),
        vertex: wgpu::VertexState {
            module: desc.module,
            entry_point: Some("vs_fullscreen"),
            buffers: &[],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            ..Default::default()
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        fragment: Some(wgpu::FragmentState {
            module: desc.module,
            entry_point: Some(desc.fragment_entry),
            targets: desc.targets,
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        multiview_mask: None,
        cache: None,
    })
}

/// Builder for render passes with several color attachments and no depth.
#[derive(Debug, Default)]
pub struct ColorTargetsBuilder<'a> {
    label: Option<&'a str>,
    attachments: Vec<Option<wgpu::RenderPassColorAttachment<'a>>>,
}

impl<'a> ColorTargetsBuilder<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set debug label for the render pass.
    pub fn label(mut self, label: &'a str) -> Self {
        self.label = Some(label);
        self
    }

    /// Append a target that keeps its current contents.
    ///
    /// `depth_slice` selects the slice of a 3D texture view; pass `None` for 2D.
    pub fn load(self, view: &'a wgpu::TextureView, depth_slice: Option<u32>) -> Self {
        self.target(view, depth_slice, wgpu::LoadOp::Load)
    }

    /// Append a target cleared to `color` at the start of the pass.
    pub fn clear(
        self,
        view: &'a wgpu::TextureView,
        depth_slice: Option<u32>,
        color: wgpu::Color,
    ) -> Self {
        self.target(view, depth_slice, wgpu::LoadOp::Clear(color))
    }

    fn target(
        mut self,
        view: &'a wgpu::TextureView,
        depth_slice: Option<u32>,
        load: wgpu::LoadOp<wgpu::Color>,
    ) -> Self {
        self.attachments.push(Some(wgpu::RenderPassColorAttachment {
            view,
            resolve_target: None,
            ops: wgpu::Operations {
                load,
                store: wgpu::StoreOp::Store,
            },
            depth_slice,
        }));
        self
    }

    pub fn len(&self) -> usize {
        self.attachments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attachments.is_empty()
    }

    /// Begin the render pass on `encoder`.
    pub fn begin<'encoder>(
        &self,
        encoder: &'encoder mut wgpu::CommandEncoder,
    ) -> wgpu::RenderPass<'encoder> {
        encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: self.label,
            color_attachments: &self.attachments,
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        })
    }
}
