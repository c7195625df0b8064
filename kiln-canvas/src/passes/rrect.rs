//! Rounded-rectangle pass: a six-vertex unit quad instanced over a params
//! SSBO. Draws filled and stroked rrects, textured quads, and text glyphs.

use kiln_gpu::{
    ClearValue, Color, CommandEncoder, DescriptorSet, DescriptorSetLayout, Device, Extent2D,
    Format, GraphicsPipeline, GraphicsPipelineInfo, ImageView, LoadOp, Offset2D, PipelineCache,
    PrimitiveTopology, RasterizationState, Rect, RenderingAttachment, RenderingInfo, ResolveModes,
    Result, SampleCount, Shader, ShaderStageInfo, StoreOp,
};

use super::{alpha_blend_attachment, pass_graphics_state};

#[derive(Debug, Clone)]
pub struct RRectPassDesc<'a> {
    pub vertex_shader: Shader,
    pub fragment_shader: Shader,
    pub color_format: Format,
    /// Dynamic-SSBO layout holding the `RRectParam` array.
    pub params_layout: &'a DescriptorSetLayout,
    /// Variable-length sampled-texture array layout.
    pub textures_layout: &'a DescriptorSetLayout,
    pub cache: Option<&'a PipelineCache>,
}

pub struct RRectPassParams<'a> {
    pub color_view: &'a ImageView,
    pub render_extent: Extent2D,
    pub scissor: Rect,
    pub first_instance: u32,
    pub num_instances: u32,
    pub params_ssbo: &'a DescriptorSet,
    pub params_ssbo_offset: u32,
    pub textures: &'a DescriptorSet,
}

pub struct RRectPass {
    pipeline: GraphicsPipeline,
}

impl RRectPass {
    pub fn new(device: &Device, desc: &RRectPassDesc) -> Result<Self> {
        let blend_attachments = [alpha_blend_attachment()];
        let set_layouts = [desc.params_layout.clone(), desc.textures_layout.clone()];
        let pipeline = device.create_graphics_pipeline(&GraphicsPipelineInfo {
            label: Some("rrect pipeline"),
            vertex_shader: ShaderStageInfo {
                shader: desc.vertex_shader.clone(),
                entry_point: "main",
            },
            fragment_shader: Some(ShaderStageInfo {
                shader: desc.fragment_shader.clone(),
                entry_point: "main",
            }),
            color_formats: &[desc.color_format],
            depth_format: None,
            stencil_format: None,
            vertex_input_bindings: &[],
            vertex_attributes: &[],
            push_constants_size: 0,
            descriptor_set_layouts: &set_layouts,
            primitive_topology: PrimitiveTopology::TriangleList,
            rasterization_state: RasterizationState::default(),
            depth_stencil_state: Default::default(),
            color_blend_state: kiln_gpu::ColorBlendState {
                attachments: &blend_attachments,
                blend_constant: [1.0; 4],
            },
            sample_count: SampleCount::Count1,
            cache: desc.cache,
        })?;
        Ok(Self { pipeline })
    }

    /// Records one batched run: `num_instances` quads starting at row
    /// `first_instance` of the params SSBO.
    pub fn add_pass(&self, encoder: &mut CommandEncoder, params: &RRectPassParams) {
        if params.num_instances == 0 {
            return;
        }
        let color_attachment = RenderingAttachment {
            view: params.color_view.clone(),
            resolve: None,
            resolve_mode: ResolveModes::empty(),
            load_op: LoadOp::Load,
            store_op: StoreOp::Store,
            clear: ClearValue::Color(Color::Float([0.0; 4])),
        };
        encoder.begin_rendering(&RenderingInfo {
            render_area: Rect {
                offset: Offset2D { x: 0, y: 0 },
                extent: params.render_extent,
            },
            num_layers: 1,
            color_attachments: std::slice::from_ref(&color_attachment),
            depth_attachment: None,
            stencil_attachment: None,
        });
        encoder.bind_graphics_pipeline(&self.pipeline);
        encoder.set_graphics_state(pass_graphics_state(params.scissor, params.render_extent));
        encoder.bind_descriptor_sets(
            &[params.params_ssbo.clone(), params.textures.clone()],
            &[params.params_ssbo_offset],
        );
        encoder.draw(6, params.num_instances, 0, params.first_instance);
        encoder.end_rendering();
    }
}
