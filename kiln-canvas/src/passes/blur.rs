//! Kawase blur pass: a downsample chain over a mip pyramid followed by an
//! additive upsample walk back to full resolution.
//!
//! The caller owns the pyramid. Level 0 must contain the region to blur
//! (copied from the target before the pass runs); the blurred result lands
//! back in level 0.

use bytemuck::{Pod, Zeroable};
use kiln_gpu::{
    ClearValue, Color, CommandEncoder, DescriptorSet, DescriptorSetLayout, Device, Extent2D,
    Format, GraphicsPipeline, GraphicsPipelineInfo, ImageView, LoadOp, Offset2D, PipelineCache,
    PrimitiveTopology, RasterizationState, Rect, RenderingAttachment, RenderingInfo, ResolveModes,
    Result, SampleCount, Shader, ShaderStageInfo, StoreOp,
};

use super::pass_graphics_state;

/// Push-constant block of one blur stage.
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct BlurParam {
    /// Sample-offset radius in source texels.
    pub radius: [f32; 2],
    /// Reciprocal source extent.
    pub texel: [f32; 2],
}

/// One level of the caller-owned blur pyramid.
#[derive(Debug, Clone)]
pub struct BlurMip {
    pub view: ImageView,
    /// Textures set sampling this level.
    pub texture_set: DescriptorSet,
    pub extent: Extent2D,
}

#[derive(Debug, Clone)]
pub struct BlurPassDesc<'a> {
    pub downsample_vertex_shader: Shader,
    pub downsample_fragment_shader: Shader,
    pub upsample_vertex_shader: Shader,
    pub upsample_fragment_shader: Shader,
    pub color_format: Format,
    pub textures_layout: &'a DescriptorSetLayout,
    pub cache: Option<&'a PipelineCache>,
}

pub struct BlurPassParams<'a> {
    pub mips: &'a [BlurMip],
    pub radius: u32,
}

pub struct BlurPass {
    downsample_pipeline: GraphicsPipeline,
    upsample_pipeline: GraphicsPipeline,
}

impl BlurPass {
    pub fn new(device: &Device, desc: &BlurPassDesc) -> Result<Self> {
        let opaque = [kiln_gpu::ColorBlendAttachmentState::default()];
        // upsample accumulates into the level above
        let additive = [kiln_gpu::ColorBlendAttachmentState {
            blend_enable: true,
            src_color_blend_factor: kiln_gpu::BlendFactor::One,
            dst_color_blend_factor: kiln_gpu::BlendFactor::One,
            color_blend_op: kiln_gpu::BlendOp::Add,
            src_alpha_blend_factor: kiln_gpu::BlendFactor::One,
            dst_alpha_blend_factor: kiln_gpu::BlendFactor::Zero,
            alpha_blend_op: kiln_gpu::BlendOp::Add,
            color_write_mask: kiln_gpu::ColorComponents::ALL,
        }];
        let set_layouts = [desc.textures_layout.clone()];

        let make_pipeline = |label: &'static str,
                             vertex_shader: &Shader,
                             fragment_shader: &Shader,
                             attachments: &[kiln_gpu::ColorBlendAttachmentState]|
         -> Result<GraphicsPipeline> {
            device.create_graphics_pipeline(&GraphicsPipelineInfo {
                label: Some(label),
                vertex_shader: ShaderStageInfo {
                    shader: vertex_shader.clone(),
                    entry_point: "main",
                },
                fragment_shader: Some(ShaderStageInfo {
                    shader: fragment_shader.clone(),
                    entry_point: "main",
                }),
                color_formats: &[desc.color_format],
                depth_format: None,
                stencil_format: None,
                vertex_input_bindings: &[],
                vertex_attributes: &[],
                push_constants_size: std::mem::size_of::<BlurParam>() as u32,
                descriptor_set_layouts: &set_layouts,
                primitive_topology: PrimitiveTopology::TriangleList,
                rasterization_state: RasterizationState::default(),
                depth_stencil_state: Default::default(),
                color_blend_state: kiln_gpu::ColorBlendState {
                    attachments,
                    blend_constant: [1.0; 4],
                },
                sample_count: SampleCount::Count1,
                cache: desc.cache,
            })
        };

        Ok(Self {
            downsample_pipeline: make_pipeline(
                "kawase downsample pipeline",
                &desc.downsample_vertex_shader,
                &desc.downsample_fragment_shader,
                &opaque,
            )?,
            upsample_pipeline: make_pipeline(
                "kawase upsample pipeline",
                &desc.upsample_vertex_shader,
                &desc.upsample_fragment_shader,
                &additive,
            )?,
        })
    }

    fn stage(
        &self,
        encoder: &mut CommandEncoder,
        pipeline: &GraphicsPipeline,
        source: &BlurMip,
        target: &BlurMip,
        load_op: LoadOp,
        radius: f32,
    ) {
        let color_attachment = RenderingAttachment {
            view: target.view.clone(),
            resolve: None,
            resolve_mode: ResolveModes::empty(),
            load_op,
            store_op: StoreOp::Store,
            clear: ClearValue::Color(Color::Float([0.0; 4])),
        };
        let full = Rect {
            offset: Offset2D { x: 0, y: 0 },
            extent: target.extent,
        };
        encoder.begin_rendering(&RenderingInfo {
            render_area: full,
            num_layers: 1,
            color_attachments: std::slice::from_ref(&color_attachment),
            depth_attachment: None,
            stencil_attachment: None,
        });
        encoder.bind_graphics_pipeline(pipeline);
        encoder.set_graphics_state(pass_graphics_state(full, target.extent));
        encoder.bind_descriptor_sets(std::slice::from_ref(&source.texture_set), &[]);
        let param = BlurParam {
            radius: [radius, radius],
            texel: [
                1.0 / source.extent.width.max(1) as f32,
                1.0 / source.extent.height.max(1) as f32,
            ],
        };
        encoder.push_constants(bytemuck::bytes_of(&param));
        encoder.draw(6, 1, 0, 0);
        encoder.end_rendering();
    }

    /// Runs the full chain over the pyramid: level 0 is reduced down the
    /// mips, then each level is tent-filtered back into the one above.
    pub fn add_pass(&self, encoder: &mut CommandEncoder, params: &BlurPassParams) {
        if params.mips.len() < 2 || params.radius == 0 {
            return;
        }
        let radius = params.radius as f32;
        for level in 1..params.mips.len() {
            self.stage(
                encoder,
                &self.downsample_pipeline,
                &params.mips[level - 1],
                &params.mips[level],
                LoadOp::DontCare,
                radius,
            );
        }
        for level in (1..params.mips.len()).rev() {
            self.stage(
                encoder,
                &self.upsample_pipeline,
                &params.mips[level],
                &params.mips[level - 1],
                LoadOp::Load,
                radius,
            );
        }
    }
}
