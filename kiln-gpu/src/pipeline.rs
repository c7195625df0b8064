//! Shader modules, pipeline caches, and compute/graphics pipelines.

use std::ffi::CString;
use std::sync::Arc;

use ash::vk;

use crate::device::DeviceShared;
use crate::error::{Result, VkResultExt};
use crate::{
    ComputePipelineInfo, Format, GraphicsPipelineInfo, Label, SampleCount, ShaderInfo,
    MAX_PIPELINE_COLOR_ATTACHMENTS, MAX_PIPELINE_DESCRIPTOR_SETS, MAX_PUSH_CONSTANTS_SIZE,
    MAX_VERTEX_ATTRIBUTES,
};

const MAX_ENTRY_POINT_LENGTH: usize = 255;

pub(crate) struct ShaderResource {
    pub(crate) label: Label,
    pub(crate) dev: Arc<DeviceShared>,
    pub(crate) vk_module: vk::ShaderModule,
}

impl Drop for ShaderResource {
    fn drop(&mut self) {
        unsafe {
            self.dev.device.destroy_shader_module(self.vk_module, None);
        }
    }
}

/// Immutable SPIR-V shader module handle.
#[derive(Clone)]
pub struct Shader {
    pub(crate) res: Arc<ShaderResource>,
}

impl Shader {
    pub fn label(&self) -> Label {
        self.res.label
    }

    pub(crate) fn vk(&self) -> vk::ShaderModule {
        self.res.vk_module
    }
}

impl std::fmt::Debug for Shader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shader")
            .field("label", &self.res.label)
            .finish_non_exhaustive()
    }
}

pub(crate) fn create_shader(dev: Arc<DeviceShared>, info: &ShaderInfo) -> Result<Shader> {
    assert!(!info.spirv.is_empty(), "shader SPIR-V must not be empty");
    let create_info = vk::ShaderModuleCreateInfo::default().code(info.spirv);
    let vk_module = unsafe { dev.device.create_shader_module(&create_info, None) }.status()?;
    dev.set_object_name(info.label, vk_module);
    Ok(Shader {
        res: Arc::new(ShaderResource {
            label: info.label,
            dev,
            vk_module,
        }),
    })
}

pub(crate) struct PipelineCacheResource {
    pub(crate) label: Label,
    pub(crate) dev: Arc<DeviceShared>,
    pub(crate) vk_cache: vk::PipelineCache,
}

impl Drop for PipelineCacheResource {
    fn drop(&mut self) {
        unsafe {
            self.dev.device.destroy_pipeline_cache(self.vk_cache, None);
        }
    }
}

/// Opaque pipeline cache; serialized bytes round-trip through
/// `Device::get_pipeline_cache_data`.
#[derive(Clone)]
pub struct PipelineCache {
    pub(crate) res: Arc<PipelineCacheResource>,
}

impl PipelineCache {
    pub fn label(&self) -> Label {
        self.res.label
    }

    pub(crate) fn vk(&self) -> vk::PipelineCache {
        self.res.vk_cache
    }
}

impl std::fmt::Debug for PipelineCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineCache")
            .field("label", &self.res.label)
            .finish_non_exhaustive()
    }
}

pub(crate) struct ComputePipelineResource {
    pub(crate) label: Label,
    pub(crate) dev: Arc<DeviceShared>,
    pub(crate) vk_pipeline: vk::Pipeline,
    pub(crate) vk_layout: vk::PipelineLayout,
    pub(crate) push_constants_size: u32,
    pub(crate) num_sets: u32,
}

impl Drop for ComputePipelineResource {
    fn drop(&mut self) {
        unsafe {
            self.dev.device.destroy_pipeline(self.vk_pipeline, None);
            self.dev.device.destroy_pipeline_layout(self.vk_layout, None);
        }
    }
}

#[derive(Clone)]
pub struct ComputePipeline {
    pub(crate) res: Arc<ComputePipelineResource>,
}

impl ComputePipeline {
    pub fn label(&self) -> Label {
        self.res.label
    }

    pub fn push_constants_size(&self) -> u32 {
        self.res.push_constants_size
    }

    pub fn num_sets(&self) -> u32 {
        self.res.num_sets
    }

    pub(crate) fn vk(&self) -> vk::Pipeline {
        self.res.vk_pipeline
    }

    pub(crate) fn vk_layout(&self) -> vk::PipelineLayout {
        self.res.vk_layout
    }
}

impl std::fmt::Debug for ComputePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComputePipeline")
            .field("label", &self.res.label)
            .finish_non_exhaustive()
    }
}

pub(crate) struct GraphicsPipelineResource {
    pub(crate) label: Label,
    pub(crate) dev: Arc<DeviceShared>,
    pub(crate) vk_pipeline: vk::Pipeline,
    pub(crate) vk_layout: vk::PipelineLayout,
    pub(crate) push_constants_size: u32,
    pub(crate) num_sets: u32,
    pub(crate) colors: Vec<Format>,
    pub(crate) depth: Option<Format>,
    pub(crate) stencil: Option<Format>,
    pub(crate) sample_count: SampleCount,
}

impl Drop for GraphicsPipelineResource {
    fn drop(&mut self) {
        unsafe {
            self.dev.device.destroy_pipeline(self.vk_pipeline, None);
            self.dev.device.destroy_pipeline_layout(self.vk_layout, None);
        }
    }
}

#[derive(Clone)]
pub struct GraphicsPipeline {
    pub(crate) res: Arc<GraphicsPipelineResource>,
}

impl GraphicsPipeline {
    pub fn label(&self) -> Label {
        self.res.label
    }

    pub fn push_constants_size(&self) -> u32 {
        self.res.push_constants_size
    }

    pub fn num_sets(&self) -> u32 {
        self.res.num_sets
    }

    pub fn color_formats(&self) -> &[Format] {
        &self.res.colors
    }

    pub fn depth_format(&self) -> Option<Format> {
        self.res.depth
    }

    pub fn stencil_format(&self) -> Option<Format> {
        self.res.stencil
    }

    pub fn sample_count(&self) -> SampleCount {
        self.res.sample_count
    }

    pub(crate) fn vk(&self) -> vk::Pipeline {
        self.res.vk_pipeline
    }

    pub(crate) fn vk_layout(&self) -> vk::PipelineLayout {
        self.res.vk_layout
    }
}

impl std::fmt::Debug for GraphicsPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphicsPipeline")
            .field("label", &self.res.label)
            .finish_non_exhaustive()
    }
}

fn entry_point_name(entry_point: &str) -> CString {
    assert!(
        !entry_point.is_empty() && entry_point.len() <= MAX_ENTRY_POINT_LENGTH,
        "invalid shader entry point name"
    );
    CString::new(entry_point).expect("entry point contains a NUL byte")
}

fn create_pipeline_layout(
    dev: &DeviceShared,
    descriptor_set_layouts: &[crate::DescriptorSetLayout],
    push_constants_size: u32,
) -> Result<vk::PipelineLayout> {
    assert!(
        push_constants_size <= MAX_PUSH_CONSTANTS_SIZE,
        "push constants exceed MAX_PUSH_CONSTANTS_SIZE"
    );
    assert!(
        push_constants_size % 4 == 0,
        "push constants size must be 4-byte aligned"
    );
    assert!(
        descriptor_set_layouts.len() <= MAX_PIPELINE_DESCRIPTOR_SETS as usize,
        "too many descriptor set layouts"
    );

    let vk_layouts: Vec<vk::DescriptorSetLayout> =
        descriptor_set_layouts.iter().map(|l| l.vk()).collect();
    let push_constant_range = vk::PushConstantRange::default()
        .stage_flags(vk::ShaderStageFlags::ALL)
        .offset(0)
        .size(push_constants_size);

    let mut create_info = vk::PipelineLayoutCreateInfo::default().set_layouts(&vk_layouts);
    if push_constants_size != 0 {
        create_info = create_info.push_constant_ranges(std::slice::from_ref(&push_constant_range));
    }
    unsafe { dev.device.create_pipeline_layout(&create_info, None) }.status()
}

pub(crate) fn create_compute_pipeline(
    dev: Arc<DeviceShared>,
    info: &ComputePipelineInfo,
) -> Result<ComputePipeline> {
    let vk_layout =
        create_pipeline_layout(&dev, info.descriptor_set_layouts, info.push_constants_size)?;

    let entry = entry_point_name(info.compute_shader.entry_point);
    let stage = vk::PipelineShaderStageCreateInfo::default()
        .stage(vk::ShaderStageFlags::COMPUTE)
        .module(info.compute_shader.shader.vk())
        .name(&entry);

    let create_info = vk::ComputePipelineCreateInfo::default()
        .stage(stage)
        .layout(vk_layout);

    let vk_cache = info.cache.map(|c| c.vk()).unwrap_or(vk::PipelineCache::null());
    let pipelines = unsafe {
        dev.device
            .create_compute_pipelines(vk_cache, std::slice::from_ref(&create_info), None)
    };
    let vk_pipeline = match pipelines {
        Ok(pipelines) => pipelines[0],
        Err((_, result)) => {
            unsafe { dev.device.destroy_pipeline_layout(vk_layout, None) };
            return Err(result.into());
        }
    };

    dev.set_object_name(info.label, vk_pipeline);

    Ok(ComputePipeline {
        res: Arc::new(ComputePipelineResource {
            label: info.label,
            dev,
            vk_pipeline,
            vk_layout,
            push_constants_size: info.push_constants_size,
            num_sets: info.descriptor_set_layouts.len() as u32,
        }),
    })
}

pub(crate) fn create_graphics_pipeline(
    dev: Arc<DeviceShared>,
    info: &GraphicsPipelineInfo,
) -> Result<GraphicsPipeline> {
    assert!(
        info.color_formats.len() <= MAX_PIPELINE_COLOR_ATTACHMENTS as usize,
        "too many color attachment formats"
    );
    assert!(
        info.vertex_attributes.len() <= MAX_VERTEX_ATTRIBUTES as usize,
        "too many vertex attributes"
    );
    assert!(
        info.color_blend_state.attachments.is_empty()
            || info.color_blend_state.attachments.len() == info.color_formats.len(),
        "blend attachment count must match color format count"
    );

    let vk_layout =
        create_pipeline_layout(&dev, info.descriptor_set_layouts, info.push_constants_size)?;

    let vertex_entry = entry_point_name(info.vertex_shader.entry_point);
    let fragment_entry = info
        .fragment_shader
        .as_ref()
        .map(|stage| entry_point_name(stage.entry_point));

    let mut stages = Vec::with_capacity(2);
    stages.push(
        vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::VERTEX)
            .module(info.vertex_shader.shader.vk())
            .name(&vertex_entry),
    );
    if let Some(ref fragment) = info.fragment_shader {
        stages.push(
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::FRAGMENT)
                .module(fragment.shader.vk())
                .name(fragment_entry.as_ref().expect("fragment entry name")),
        );
    }

    let input_bindings: Vec<vk::VertexInputBindingDescription> = info
        .vertex_input_bindings
        .iter()
        .map(|b| {
            vk::VertexInputBindingDescription::default()
                .binding(b.binding)
                .stride(b.stride)
                .input_rate(b.input_rate.to_vk())
        })
        .collect();
    let input_attributes: Vec<vk::VertexInputAttributeDescription> = info
        .vertex_attributes
        .iter()
        .map(|a| {
            vk::VertexInputAttributeDescription::default()
                .binding(a.binding)
                .location(a.location)
                .format(a.format.to_vk())
                .offset(a.offset)
        })
        .collect();
    let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
        .vertex_binding_descriptions(&input_bindings)
        .vertex_attribute_descriptions(&input_attributes);

    let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
        .topology(info.primitive_topology.to_vk())
        .primitive_restart_enable(false);

    let viewport_state = vk::PipelineViewportStateCreateInfo::default()
        .viewport_count(1)
        .scissor_count(1);

    let raster = &info.rasterization_state;
    let rasterization = vk::PipelineRasterizationStateCreateInfo::default()
        .depth_clamp_enable(raster.depth_clamp_enable)
        .rasterizer_discard_enable(false)
        .polygon_mode(raster.polygon_mode.to_vk())
        .cull_mode(raster.cull_mode.to_vk())
        .front_face(raster.front_face.to_vk())
        .depth_bias_enable(raster.depth_bias_enable)
        .depth_bias_constant_factor(raster.depth_bias_constant_factor)
        .depth_bias_clamp(raster.depth_bias_clamp)
        .depth_bias_slope_factor(raster.depth_bias_slope_factor)
        .line_width(1.0);

    let multisample = vk::PipelineMultisampleStateCreateInfo::default()
        .rasterization_samples(info.sample_count.to_vk());

    let ds = &info.depth_stencil_state;
    let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::default()
        .depth_test_enable(ds.depth_test_enable)
        .depth_write_enable(ds.depth_write_enable)
        .depth_compare_op(ds.depth_compare_op.to_vk())
        .depth_bounds_test_enable(ds.depth_bounds_test_enable)
        .stencil_test_enable(ds.stencil_test_enable)
        .front(ds.front_stencil.to_vk())
        .back(ds.back_stencil.to_vk())
        .min_depth_bounds(ds.min_depth_bounds)
        .max_depth_bounds(ds.max_depth_bounds);

    let blend_attachments: Vec<vk::PipelineColorBlendAttachmentState> = if info
        .color_blend_state
        .attachments
        .is_empty()
    {
        info.color_formats
            .iter()
            .map(|_| {
                vk::PipelineColorBlendAttachmentState::default()
                    .blend_enable(false)
                    .color_write_mask(vk::ColorComponentFlags::RGBA)
            })
            .collect()
    } else {
        info.color_blend_state
            .attachments
            .iter()
            .map(|a| {
                vk::PipelineColorBlendAttachmentState::default()
                    .blend_enable(a.blend_enable)
                    .src_color_blend_factor(a.src_color_blend_factor.to_vk())
                    .dst_color_blend_factor(a.dst_color_blend_factor.to_vk())
                    .color_blend_op(a.color_blend_op.to_vk())
                    .src_alpha_blend_factor(a.src_alpha_blend_factor.to_vk())
                    .dst_alpha_blend_factor(a.dst_alpha_blend_factor.to_vk())
                    .alpha_blend_op(a.alpha_blend_op.to_vk())
                    .color_write_mask(a.color_write_mask.to_vk())
            })
            .collect()
    };
    let color_blend = vk::PipelineColorBlendStateCreateInfo::default()
        .logic_op_enable(false)
        .attachments(&blend_attachments)
        .blend_constants(info.color_blend_state.blend_constant);

    // everything the encoder's set_graphics_state drives is dynamic
    let dynamic_states = [
        vk::DynamicState::VIEWPORT,
        vk::DynamicState::SCISSOR,
        vk::DynamicState::BLEND_CONSTANTS,
        vk::DynamicState::STENCIL_TEST_ENABLE_EXT,
        vk::DynamicState::STENCIL_REFERENCE,
        vk::DynamicState::STENCIL_COMPARE_MASK,
        vk::DynamicState::STENCIL_WRITE_MASK,
        vk::DynamicState::STENCIL_OP_EXT,
        vk::DynamicState::CULL_MODE_EXT,
        vk::DynamicState::FRONT_FACE_EXT,
        vk::DynamicState::DEPTH_TEST_ENABLE_EXT,
        vk::DynamicState::DEPTH_COMPARE_OP_EXT,
        vk::DynamicState::DEPTH_WRITE_ENABLE_EXT,
        vk::DynamicState::DEPTH_BOUNDS_TEST_ENABLE_EXT,
    ];
    let dynamic_state =
        vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

    let color_formats: Vec<vk::Format> =
        info.color_formats.iter().map(|f| f.to_vk()).collect();
    let mut rendering_info = vk::PipelineRenderingCreateInfo::default()
        .color_attachment_formats(&color_formats)
        .depth_attachment_format(info.depth_format.unwrap_or(Format::Undefined).to_vk())
        .stencil_attachment_format(info.stencil_format.unwrap_or(Format::Undefined).to_vk());

    let create_info = vk::GraphicsPipelineCreateInfo::default()
        .stages(&stages)
        .vertex_input_state(&vertex_input)
        .input_assembly_state(&input_assembly)
        .viewport_state(&viewport_state)
        .rasterization_state(&rasterization)
        .multisample_state(&multisample)
        .depth_stencil_state(&depth_stencil)
        .color_blend_state(&color_blend)
        .dynamic_state(&dynamic_state)
        .layout(vk_layout)
        .push_next(&mut rendering_info);

    let vk_cache = info.cache.map(|c| c.vk()).unwrap_or(vk::PipelineCache::null());
    let pipelines = unsafe {
        dev.device
            .create_graphics_pipelines(vk_cache, std::slice::from_ref(&create_info), None)
    };
    let vk_pipeline = match pipelines {
        Ok(pipelines) => pipelines[0],
        Err((_, result)) => {
            unsafe { dev.device.destroy_pipeline_layout(vk_layout, None) };
            return Err(result.into());
        }
    };

    dev.set_object_name(info.label, vk_pipeline);

    Ok(GraphicsPipeline {
        res: Arc::new(GraphicsPipelineResource {
            label: info.label,
            dev,
            vk_pipeline,
            vk_layout,
            push_constants_size: info.push_constants_size,
            num_sets: info.descriptor_set_layouts.len() as u32,
            colors: info.color_formats.to_vec(),
            depth: info.depth_format,
            stencil: info.stencil_format,
            sample_count: info.sample_count,
        }),
    })
}
