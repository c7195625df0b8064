//! Ngon pass: indexed triangle lists out of the canvas's shared
//! vertex/index arenas. One instanced sub-range per parameter row; used for
//! circles, arcs, polylines, and filled polygons.

use kiln_gpu::{
    Buffer, ClearValue, Color, CommandEncoder, DescriptorSet, DescriptorSetLayout, Device,
    Extent2D, Format, GraphicsPipeline, GraphicsPipelineInfo, ImageView, IndexType, LoadOp,
    Offset2D, PipelineCache, PrimitiveTopology, RasterizationState, Rect, RenderingAttachment,
    RenderingInfo, ResolveModes, Result, SampleCount, Shader, ShaderStageInfo, StoreOp,
    VertexAttribute, VertexInputBinding, VertexInputRate,
};

use super::{alpha_blend_attachment, pass_graphics_state};

#[derive(Debug, Clone)]
pub struct NgonPassDesc<'a> {
    pub vertex_shader: Shader,
    pub fragment_shader: Shader,
    pub color_format: Format,
    /// Dynamic-SSBO layout holding the `NgonParam` array.
    pub params_layout: &'a DescriptorSetLayout,
    pub textures_layout: &'a DescriptorSetLayout,
    pub cache: Option<&'a PipelineCache>,
}

pub struct NgonPassParams<'a> {
    pub color_view: &'a ImageView,
    pub render_extent: Extent2D,
    pub scissor: Rect,
    pub vertices: &'a Buffer,
    pub indices: &'a Buffer,
    /// Start of the run's index data within the shared index buffer.
    pub first_index: u32,
    /// Index-count of every row in the run, in row order.
    pub index_counts: &'a [u32],
    /// Params-SSBO row of the run's first entry.
    pub first_instance: u32,
    pub params_ssbo: &'a DescriptorSet,
    pub params_ssbo_offset: u32,
    pub textures: &'a DescriptorSet,
}

pub struct NgonPass {
    pipeline: GraphicsPipeline,
}

impl NgonPass {
    pub fn new(device: &Device, desc: &NgonPassDesc) -> Result<Self> {
        let blend_attachments = [alpha_blend_attachment()];
        let set_layouts = [desc.params_layout.clone(), desc.textures_layout.clone()];
        let vertex_bindings = [VertexInputBinding {
            binding: 0,
            stride: (std::mem::size_of::<f32>() * 2) as u32,
            input_rate: VertexInputRate::Vertex,
        }];
        let vertex_attributes = [VertexAttribute {
            binding: 0,
            location: 0,
            format: Format::Rg32Float,
            offset: 0,
        }];
        let pipeline = device.create_graphics_pipeline(&GraphicsPipelineInfo {
            label: Some("ngon pipeline"),
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
            vertex_input_bindings: &vertex_bindings,
            vertex_attributes: &vertex_attributes,
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

    /// Records one batched run: each row draws its index sub-range with the
    /// row's SSBO entry selected through the instance index.
    pub fn add_pass(&self, encoder: &mut CommandEncoder, params: &NgonPassParams) {
        if params.index_counts.is_empty() {
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
        encoder.bind_vertex_buffers(std::slice::from_ref(params.vertices), &[0]);
        encoder.bind_index_buffer(params.indices, 0, IndexType::Uint32);

        let mut first_index = params.first_index;
        for (row, &index_count) in params.index_counts.iter().enumerate() {
            encoder.draw_indexed(
                first_index,
                index_count,
                0,
                params.first_instance + row as u32,
                1,
            );
            first_index += index_count;
        }
        encoder.end_rendering();
    }
}
