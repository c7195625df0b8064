//! The command encoder: a linear recorder over one primary command buffer.
//!
//! Outside of passes the encoder records transfer, clear, resolve, and query
//! commands directly, synthesizing barriers inline. Inside a compute pass it
//! tracks the bound pipeline and descriptor sets and applies barriers before
//! each dispatch. Inside a render pass every command is deferred into a typed
//! log: `end_rendering` first walks the log to apply all resource accesses
//! (attachments included), then emits `cmd_begin_rendering`, replays the log,
//! and ends the pass. Deferral is what lets barrier synthesis run before the
//! rendering scope opens.

use std::ffi::CString;
use std::sync::Arc;

use ash::vk;

use crate::access::{BufferAccess, ImageAccess};
use crate::buffer::is_valid_buffer_access;
use crate::descriptor::SyncResource;
use crate::device::DeviceShared;
use crate::error::{Result, Status, VkResultExt};
use crate::image::is_valid_image_access;
use crate::{
    mip_down, Buffer, BufferCopy, BufferImageCopy, BufferUsage, Color, ComputePipeline,
    DepthStencil, DescriptorSet, DescriptorType, DispatchCommand, DrawCommand, DrawIndexedCommand,
    Filter, GraphicsPipeline, GraphicsState, Image, ImageAspects, ImageBlit, ImageCopy,
    ImageResolve, ImageSubresourceRange, ImageType, ImageUsage, IndexType, LoadOp,
    RenderingAttachment, RenderingInfo, SampleCount, StatisticsQuery, StoreOp,
    TimestampQuery, MAX_PIPELINE_COLOR_ATTACHMENTS, MAX_PIPELINE_DESCRIPTOR_SETS,
    MAX_PIPELINE_DYNAMIC_STORAGE_BUFFERS, MAX_PIPELINE_DYNAMIC_UNIFORM_BUFFERS,
    MAX_PUSH_CONSTANTS_SIZE, MAX_UPDATE_BUFFER_SIZE, MAX_VERTEX_ATTRIBUTES,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum EncoderState {
    #[default]
    Reset,
    Begin,
    ComputePass,
    RenderPass,
    End,
}

/// A render-pass command deferred until `end_rendering`.
enum Command {
    BindPipeline(GraphicsPipeline),
    BindDescriptorSets {
        sets: Vec<DescriptorSet>,
        dynamic_offsets: Vec<u32>,
    },
    PushConstants {
        data: [u8; MAX_PUSH_CONSTANTS_SIZE as usize],
        size: u32,
    },
    SetGraphicsState(GraphicsState),
    BindVertexBuffer {
        binding: u32,
        buffer: Buffer,
        offset: u64,
    },
    BindIndexBuffer {
        buffer: Buffer,
        offset: u64,
        index_type: IndexType,
    },
    Draw {
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    },
    DrawIndexed {
        first_index: u32,
        num_indices: u32,
        vertex_offset: i32,
        first_instance: u32,
        num_instances: u32,
    },
    DrawIndirect {
        buffer: Buffer,
        offset: u64,
        draw_count: u32,
        stride: u32,
    },
    DrawIndexedIndirect {
        buffer: Buffer,
        offset: u64,
        draw_count: u32,
        stride: u32,
    },
}

#[derive(Default)]
struct RenderPassContext {
    render_area: crate::Rect,
    num_layers: u32,
    color_attachments: Vec<RenderingAttachment>,
    depth_attachment: Option<RenderingAttachment>,
    stencil_attachment: Option<RenderingAttachment>,
    commands: Vec<Command>,
    pipeline: Option<GraphicsPipeline>,
    index_buffer: Option<Buffer>,
    index_type: IndexType,
    index_buffer_offset: u64,
    has_state: bool,
}

impl RenderPassContext {
    fn clear(&mut self) {
        self.render_area = crate::Rect::default();
        self.num_layers = 0;
        self.color_attachments.clear();
        self.depth_attachment = None;
        self.stencil_attachment = None;
        self.commands.clear();
        self.pipeline = None;
        self.index_buffer = None;
        self.index_type = IndexType::default();
        self.index_buffer_offset = 0;
        self.has_state = false;
    }
}

#[derive(Default)]
struct ComputePassContext {
    pipeline: Option<ComputePipeline>,
    sets: Vec<DescriptorSet>,
}

impl ComputePassContext {
    fn clear(&mut self) {
        self.pipeline = None;
        self.sets.clear();
    }
}

/// Records GPU commands for one frame-ring slot.
pub struct CommandEncoder {
    pub(crate) dev: Arc<DeviceShared>,
    pub(crate) vk_pool: vk::CommandPool,
    pub(crate) vk_cmd: vk::CommandBuffer,
    status: Option<Status>,
    state: EncoderState,
    render_ctx: RenderPassContext,
    compute_ctx: ComputePassContext,
}

impl Drop for CommandEncoder {
    fn drop(&mut self) {
        unsafe {
            // frees the command buffer with it
            self.dev.device.destroy_command_pool(self.vk_pool, None);
        }
    }
}

impl std::fmt::Debug for CommandEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandEncoder")
            .field("state", &self.state)
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

impl CommandEncoder {
    pub(crate) fn new(dev: Arc<DeviceShared>) -> Result<Self> {
        let pool_info = vk::CommandPoolCreateInfo::default()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(dev.queue_family);
        let vk_pool = unsafe { dev.device.create_command_pool(&pool_info, None) }.status()?;

        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(vk_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let vk_cmd = match unsafe { dev.device.allocate_command_buffers(&alloc_info) } {
            Ok(buffers) => buffers[0],
            Err(result) => {
                unsafe { dev.device.destroy_command_pool(vk_pool, None) };
                return Err(result.into());
            }
        };
        dev.set_object_name(Some("frame command buffer"), vk_cmd);

        Ok(Self {
            dev,
            vk_pool,
            vk_cmd,
            status: None,
            state: EncoderState::Reset,
            render_ctx: RenderPassContext::default(),
            compute_ctx: ComputePassContext::default(),
        })
    }

    /// Sticky error recorded by a failed recording operation; checked before
    /// submission.
    pub fn status(&self) -> Result<()> {
        match self.status {
            Some(status) => Err(status),
            None => Ok(()),
        }
    }

    pub(crate) fn is_recording(&self) -> bool {
        !matches!(self.state, EncoderState::Reset | EncoderState::End)
    }

    fn is_in_render_pass(&self) -> bool {
        self.state == EncoderState::RenderPass
    }

    fn is_in_compute_pass(&self) -> bool {
        self.state == EncoderState::ComputePass
    }

    fn is_in_pass(&self) -> bool {
        self.is_in_render_pass() || self.is_in_compute_pass()
    }

    fn recording_halted(&self) -> bool {
        self.status.is_some()
    }

    pub(crate) fn reset_contexts(&mut self) {
        self.render_ctx.clear();
        self.compute_ctx.clear();
    }

    pub(crate) fn begin(&mut self) -> Result<()> {
        unsafe {
            self.dev
                .device
                .reset_command_buffer(self.vk_cmd, vk::CommandBufferResetFlags::empty())
                .status()?;
        }
        self.reset_contexts();
        self.status = None;
        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe {
            self.dev
                .device
                .begin_command_buffer(self.vk_cmd, &begin_info)
                .status()?;
        }
        self.state = EncoderState::Begin;
        Ok(())
    }

    pub(crate) fn end(&mut self) -> Result<()> {
        unsafe {
            self.dev.device.end_command_buffer(self.vk_cmd).status()?;
        }
        self.state = EncoderState::End;
        Ok(())
    }

    // ------------------------------------------------------------------
    // barrier synthesis plumbing

    pub(crate) fn access_buffer(
        &self,
        buffer: &Buffer,
        stages: vk::PipelineStageFlags,
        access: vk::AccessFlags,
    ) {
        if let Some(scope) = buffer.sync(BufferAccess { stages, access }) {
            let barrier = vk::BufferMemoryBarrier::default()
                .src_access_mask(scope.src_access)
                .dst_access_mask(scope.dst_access)
                .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .buffer(buffer.vk())
                .offset(0)
                .size(vk::WHOLE_SIZE);
            unsafe {
                self.dev.device.cmd_pipeline_barrier(
                    self.vk_cmd,
                    scope.src_stages,
                    scope.dst_stages,
                    vk::DependencyFlags::empty(),
                    &[],
                    &[barrier],
                    &[],
                );
            }
        }
    }

    fn access_image_aspect(
        &self,
        image: &Image,
        stages: vk::PipelineStageFlags,
        access: vk::AccessFlags,
        layout: vk::ImageLayout,
        aspects: ImageAspects,
        aspect_index: usize,
    ) {
        let request = ImageAccess {
            stages,
            access,
            layout,
        };
        if let Some(transition) = image.sync_aspect(aspect_index, request) {
            let barrier = vk::ImageMemoryBarrier::default()
                .src_access_mask(transition.scope.src_access)
                .dst_access_mask(transition.scope.dst_access)
                .old_layout(transition.old_layout)
                .new_layout(transition.new_layout)
                .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .image(image.vk())
                .subresource_range(
                    vk::ImageSubresourceRange::default()
                        .aspect_mask(aspects.to_vk())
                        .base_mip_level(0)
                        .level_count(vk::REMAINING_MIP_LEVELS)
                        .base_array_layer(0)
                        .layer_count(vk::REMAINING_ARRAY_LAYERS),
                );
            unsafe {
                self.dev.device.cmd_pipeline_barrier(
                    self.vk_cmd,
                    transition.scope.src_stages,
                    transition.scope.dst_stages,
                    vk::DependencyFlags::empty(),
                    &[],
                    &[],
                    &[barrier],
                );
            }
        }
    }

    /// Combined depth+stencil images carry two independent aspect histories;
    /// everything else tracks in slot 0.
    pub(crate) fn access_image_all_aspects(
        &self,
        image: &Image,
        stages: vk::PipelineStageFlags,
        access: vk::AccessFlags,
        layout: vk::ImageLayout,
    ) {
        let aspects = image.info().aspects;
        if aspects.contains(ImageAspects::DEPTH | ImageAspects::STENCIL) {
            self.access_image_aspect(
                image,
                stages,
                access,
                layout,
                ImageAspects::DEPTH,
                crate::image::DEPTH_ASPECT_IDX,
            );
            self.access_image_aspect(
                image,
                stages,
                access,
                layout,
                ImageAspects::STENCIL,
                crate::image::STENCIL_ASPECT_IDX,
            );
        } else {
            self.access_image_aspect(image, stages, access, layout, aspects, 0);
        }
    }

    fn access_compute_bindings(&self, set: &DescriptorSet) {
        const COMPUTE: vk::PipelineStageFlags = vk::PipelineStageFlags::COMPUTE_SHADER;
        let bindings = set.bindings();
        for binding in bindings.iter() {
            match binding.ty {
                DescriptorType::CombinedImageSampler | DescriptorType::SampledImage => {
                    for resource in &binding.sync_resources {
                        if let SyncResource::Image(image) = resource {
                            self.access_image_all_aspects(
                                image,
                                COMPUTE,
                                vk::AccessFlags::SHADER_READ,
                                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                            );
                        }
                    }
                }
                DescriptorType::StorageImage => {
                    for resource in &binding.sync_resources {
                        if let SyncResource::Image(image) = resource {
                            self.access_image_all_aspects(
                                image,
                                COMPUTE,
                                vk::AccessFlags::SHADER_READ | vk::AccessFlags::SHADER_WRITE,
                                vk::ImageLayout::GENERAL,
                            );
                        }
                    }
                }
                DescriptorType::UniformBuffer
                | DescriptorType::DynamicUniformBuffer
                | DescriptorType::UniformTexelBuffer => {
                    for resource in &binding.sync_resources {
                        if let SyncResource::Buffer(buffer) = resource {
                            self.access_buffer(buffer, COMPUTE, vk::AccessFlags::SHADER_READ);
                        }
                    }
                }
                DescriptorType::StorageBuffer
                | DescriptorType::DynamicStorageBuffer
                | DescriptorType::StorageTexelBuffer => {
                    for resource in &binding.sync_resources {
                        if let SyncResource::Buffer(buffer) = resource {
                            self.access_buffer(
                                buffer,
                                COMPUTE,
                                vk::AccessFlags::SHADER_READ | vk::AccessFlags::SHADER_WRITE,
                            );
                        }
                    }
                }
                DescriptorType::Sampler | DescriptorType::InputAttachment => {}
            }
        }
    }

    fn access_graphics_bindings(&self, set: &DescriptorSet) {
        let stages =
            vk::PipelineStageFlags::VERTEX_SHADER | vk::PipelineStageFlags::FRAGMENT_SHADER;
        let bindings = set.bindings();
        for binding in bindings.iter() {
            match binding.ty {
                DescriptorType::CombinedImageSampler
                | DescriptorType::SampledImage
                | DescriptorType::InputAttachment => {
                    for resource in &binding.sync_resources {
                        if let SyncResource::Image(image) = resource {
                            self.access_image_all_aspects(
                                image,
                                stages,
                                vk::AccessFlags::SHADER_READ,
                                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                            );
                        }
                    }
                }
                // storage images are read-only in graphics passes
                DescriptorType::StorageImage => {
                    for resource in &binding.sync_resources {
                        if let SyncResource::Image(image) = resource {
                            self.access_image_all_aspects(
                                image,
                                stages,
                                vk::AccessFlags::SHADER_READ,
                                vk::ImageLayout::GENERAL,
                            );
                        }
                    }
                }
                // storage buffers are read-only in graphics passes
                DescriptorType::UniformBuffer
                | DescriptorType::DynamicUniformBuffer
                | DescriptorType::UniformTexelBuffer
                | DescriptorType::StorageBuffer
                | DescriptorType::DynamicStorageBuffer
                | DescriptorType::StorageTexelBuffer => {
                    for resource in &binding.sync_resources {
                        if let SyncResource::Buffer(buffer) = resource {
                            self.access_buffer(buffer, stages, vk::AccessFlags::SHADER_READ);
                        }
                    }
                }
                DescriptorType::Sampler => {}
            }
        }
    }

    // ------------------------------------------------------------------
    // queries and debug markers

    pub fn reset_timestamp_query(&mut self, query: &TimestampQuery) {
        if self.recording_halted() {
            return;
        }
        assert!(!self.is_in_pass(), "query reset must be outside a pass");
        unsafe {
            self.dev.device.cmd_reset_query_pool(self.vk_cmd, query.vk(), 0, 1);
        }
    }

    pub fn reset_statistics_query(&mut self, query: &StatisticsQuery) {
        if self.recording_halted() {
            return;
        }
        assert!(!self.is_in_pass(), "query reset must be outside a pass");
        unsafe {
            self.dev.device.cmd_reset_query_pool(self.vk_cmd, query.vk(), 0, 1);
        }
    }

    pub fn write_timestamp(&mut self, query: &TimestampQuery) {
        if self.recording_halted() {
            return;
        }
        assert!(!self.is_in_render_pass(), "timestamps are written outside render passes");
        unsafe {
            self.dev.device.cmd_write_timestamp(
                self.vk_cmd,
                vk::PipelineStageFlags::BOTTOM_OF_PIPE,
                query.vk(),
                0,
            );
        }
    }

    pub fn begin_statistics(&mut self, query: &StatisticsQuery) {
        if self.recording_halted() {
            return;
        }
        unsafe {
            self.dev
                .device
                .cmd_begin_query(self.vk_cmd, query.vk(), 0, vk::QueryControlFlags::empty());
        }
    }

    pub fn end_statistics(&mut self, query: &StatisticsQuery) {
        if self.recording_halted() {
            return;
        }
        unsafe {
            self.dev.device.cmd_end_query(self.vk_cmd, query.vk(), 0);
        }
    }

    pub fn begin_debug_marker(&mut self, region_name: &str, color: [f32; 4]) {
        if self.recording_halted() {
            return;
        }
        let Some(ref debug_utils) = self.dev.debug_utils else {
            return;
        };
        let Ok(name) = CString::new(region_name) else {
            return;
        };
        let label = vk::DebugUtilsLabelEXT::default()
            .label_name(&name)
            .color(color);
        unsafe {
            debug_utils.cmd_begin_debug_utils_label(self.vk_cmd, &label);
        }
    }

    pub fn end_debug_marker(&mut self) {
        if self.recording_halted() {
            return;
        }
        if let Some(ref debug_utils) = self.dev.debug_utils {
            unsafe {
                debug_utils.cmd_end_debug_utils_label(self.vk_cmd);
            }
        }
    }

    // ------------------------------------------------------------------
    // transfer commands

    pub fn fill_buffer(&mut self, dst: &Buffer, offset: u64, size: u64, data: u32) {
        if self.recording_halted() {
            return;
        }
        assert!(!self.is_in_pass(), "transfers must be outside passes");
        assert!(dst.usage().contains(BufferUsage::TRANSFER_DST));
        assert!(is_valid_buffer_access(dst.size(), offset, size, 4));
        assert!(size % 4 == 0, "fill size must be 4-byte aligned");

        self.access_buffer(
            dst,
            vk::PipelineStageFlags::TRANSFER,
            vk::AccessFlags::TRANSFER_WRITE,
        );
        unsafe {
            self.dev
                .device
                .cmd_fill_buffer(self.vk_cmd, dst.vk(), offset, size, data);
        }
    }

    pub fn copy_buffer(&mut self, src: &Buffer, dst: &Buffer, copies: &[BufferCopy]) {
        if self.recording_halted() {
            return;
        }
        assert!(!self.is_in_pass(), "transfers must be outside passes");
        assert!(src.usage().contains(BufferUsage::TRANSFER_SRC));
        assert!(dst.usage().contains(BufferUsage::TRANSFER_DST));
        assert!(!copies.is_empty());
        for copy in copies {
            assert!(is_valid_buffer_access(src.size(), copy.src_offset, copy.size, 1));
            assert!(is_valid_buffer_access(dst.size(), copy.dst_offset, copy.size, 1));
        }

        let vk_copies: Vec<vk::BufferCopy> = copies
            .iter()
            .map(|copy| {
                vk::BufferCopy::default()
                    .src_offset(copy.src_offset)
                    .dst_offset(copy.dst_offset)
                    .size(copy.size)
            })
            .collect();

        self.access_buffer(
            src,
            vk::PipelineStageFlags::TRANSFER,
            vk::AccessFlags::TRANSFER_READ,
        );
        self.access_buffer(
            dst,
            vk::PipelineStageFlags::TRANSFER,
            vk::AccessFlags::TRANSFER_WRITE,
        );
        unsafe {
            self.dev
                .device
                .cmd_copy_buffer(self.vk_cmd, src.vk(), dst.vk(), &vk_copies);
        }
    }

    pub fn update_buffer(&mut self, src: &[u8], dst_offset: u64, dst: &Buffer) {
        if self.recording_halted() {
            return;
        }
        let copy_size = src.len() as u64;
        assert!(!self.is_in_pass(), "transfers must be outside passes");
        assert!(dst.usage().contains(BufferUsage::TRANSFER_DST));
        assert!(is_valid_buffer_access(dst.size(), dst_offset, copy_size, 4));
        assert!(copy_size % 4 == 0, "update size must be 4-byte aligned");
        assert!(copy_size <= MAX_UPDATE_BUFFER_SIZE);

        self.access_buffer(
            dst,
            vk::PipelineStageFlags::TRANSFER,
            vk::AccessFlags::TRANSFER_WRITE,
        );
        unsafe {
            self.dev
                .device
                .cmd_update_buffer(self.vk_cmd, dst.vk(), dst_offset, src);
        }
    }

    fn validate_clear_ranges(image: &Image, ranges: &[ImageSubresourceRange]) {
        let info = image.info();
        for range in ranges {
            assert!(
                is_valid_image_access(
                    info.aspects,
                    info.mip_levels,
                    info.array_layers,
                    range.aspects,
                    range.first_mip_level,
                    range.num_mip_levels,
                    range.first_array_layer,
                    range.num_array_layers,
                ),
                "clear range outside the image"
            );
        }
    }

    pub fn clear_color_image(&mut self, dst: &Image, color: Color, ranges: &[ImageSubresourceRange]) {
        if self.recording_halted() {
            return;
        }
        assert!(!self.is_in_pass(), "clears must be outside passes");
        assert!(dst.info().usage.contains(ImageUsage::TRANSFER_DST));
        assert!(!ranges.is_empty());
        Self::validate_clear_ranges(dst, ranges);

        let vk_ranges: Vec<vk::ImageSubresourceRange> =
            ranges.iter().map(|range| range.to_vk()).collect();

        self.access_image_all_aspects(
            dst,
            vk::PipelineStageFlags::TRANSFER,
            vk::AccessFlags::TRANSFER_WRITE,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        );
        unsafe {
            self.dev.device.cmd_clear_color_image(
                self.vk_cmd,
                dst.vk(),
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &color.to_vk(),
                &vk_ranges,
            );
        }
    }

    pub fn clear_depth_stencil_image(
        &mut self,
        dst: &Image,
        value: DepthStencil,
        ranges: &[ImageSubresourceRange],
    ) {
        if self.recording_halted() {
            return;
        }
        assert!(!self.is_in_pass(), "clears must be outside passes");
        assert!(dst.info().usage.contains(ImageUsage::TRANSFER_DST));
        assert!(!ranges.is_empty());
        Self::validate_clear_ranges(dst, ranges);

        let vk_ranges: Vec<vk::ImageSubresourceRange> =
            ranges.iter().map(|range| range.to_vk()).collect();

        self.access_image_all_aspects(
            dst,
            vk::PipelineStageFlags::TRANSFER,
            vk::AccessFlags::TRANSFER_WRITE,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        );
        unsafe {
            self.dev.device.cmd_clear_depth_stencil_image(
                self.vk_cmd,
                dst.vk(),
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &value.to_vk(),
                &vk_ranges,
            );
        }
    }

    pub fn copy_image(&mut self, src: &Image, dst: &Image, copies: &[ImageCopy]) {
        if self.recording_halted() {
            return;
        }
        assert!(!self.is_in_pass(), "transfers must be outside passes");
        assert!(!copies.is_empty());
        assert!(src.info().usage.contains(ImageUsage::TRANSFER_SRC));
        assert!(dst.info().usage.contains(ImageUsage::TRANSFER_DST));
        for copy in copies {
            let src_info = src.info();
            let dst_info = dst.info();
            assert!(is_valid_image_access(
                src_info.aspects,
                src_info.mip_levels,
                src_info.array_layers,
                copy.src_layers.aspects,
                copy.src_layers.mip_level,
                1,
                copy.src_layers.first_array_layer,
                copy.src_layers.num_array_layers,
            ));
            assert!(is_valid_image_access(
                dst_info.aspects,
                dst_info.mip_levels,
                dst_info.array_layers,
                copy.dst_layers.aspects,
                copy.dst_layers.mip_level,
                1,
                copy.dst_layers.first_array_layer,
                copy.dst_layers.num_array_layers,
            ));

            let src_extent = mip_down(src_info.extent, copy.src_layers.mip_level);
            let dst_extent = mip_down(dst_info.extent, copy.dst_layers.mip_level);
            assert!(copy.extent.width > 0 && copy.extent.height > 0 && copy.extent.depth > 0);
            assert!(copy.src_offset.x as u32 + copy.extent.width <= src_extent.width);
            assert!(copy.src_offset.y as u32 + copy.extent.height <= src_extent.height);
            assert!(copy.src_offset.z as u32 + copy.extent.depth <= src_extent.depth);
            assert!(copy.dst_offset.x as u32 + copy.extent.width <= dst_extent.width);
            assert!(copy.dst_offset.y as u32 + copy.extent.height <= dst_extent.height);
            assert!(copy.dst_offset.z as u32 + copy.extent.depth <= dst_extent.depth);
        }

        let vk_copies: Vec<vk::ImageCopy> = copies
            .iter()
            .map(|copy| vk::ImageCopy {
                src_subresource: copy.src_layers.to_vk(),
                src_offset: vk::Offset3D {
                    x: copy.src_offset.x,
                    y: copy.src_offset.y,
                    z: copy.src_offset.z,
                },
                dst_subresource: copy.dst_layers.to_vk(),
                dst_offset: vk::Offset3D {
                    x: copy.dst_offset.x,
                    y: copy.dst_offset.y,
                    z: copy.dst_offset.z,
                },
                extent: vk::Extent3D {
                    width: copy.extent.width,
                    height: copy.extent.height,
                    depth: copy.extent.depth,
                },
            })
            .collect();

        self.access_image_all_aspects(
            src,
            vk::PipelineStageFlags::TRANSFER,
            vk::AccessFlags::TRANSFER_READ,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        );
        self.access_image_all_aspects(
            dst,
            vk::PipelineStageFlags::TRANSFER,
            vk::AccessFlags::TRANSFER_WRITE,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        );
        unsafe {
            self.dev.device.cmd_copy_image(
                self.vk_cmd,
                src.vk(),
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                dst.vk(),
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &vk_copies,
            );
        }
    }

    pub fn copy_buffer_to_image(&mut self, src: &Buffer, dst: &Image, copies: &[BufferImageCopy]) {
        if self.recording_halted() {
            return;
        }
        assert!(!self.is_in_pass(), "transfers must be outside passes");
        assert!(!copies.is_empty());
        assert!(src.usage().contains(BufferUsage::TRANSFER_SRC));
        assert!(dst.info().usage.contains(ImageUsage::TRANSFER_DST));
        for copy in copies {
            let dst_info = dst.info();
            assert!(is_valid_buffer_access(
                src.size(),
                copy.buffer_offset,
                crate::WHOLE_SIZE,
                1
            ));
            assert!(is_valid_image_access(
                dst_info.aspects,
                dst_info.mip_levels,
                dst_info.array_layers,
                copy.image_layers.aspects,
                copy.image_layers.mip_level,
                1,
                copy.image_layers.first_array_layer,
                copy.image_layers.num_array_layers,
            ));
            assert!(
                copy.image_extent.width > 0
                    && copy.image_extent.height > 0
                    && copy.image_extent.depth > 0
            );
            let dst_extent = mip_down(dst_info.extent, copy.image_layers.mip_level);
            assert!(copy.image_offset.x as u32 + copy.image_extent.width <= dst_extent.width);
            assert!(copy.image_offset.y as u32 + copy.image_extent.height <= dst_extent.height);
            assert!(copy.image_offset.z as u32 + copy.image_extent.depth <= dst_extent.depth);
        }

        let vk_copies: Vec<vk::BufferImageCopy> = copies
            .iter()
            .map(|copy| vk::BufferImageCopy {
                buffer_offset: copy.buffer_offset,
                buffer_row_length: copy.buffer_row_length,
                buffer_image_height: copy.buffer_image_height,
                image_subresource: copy.image_layers.to_vk(),
                image_offset: vk::Offset3D {
                    x: copy.image_offset.x,
                    y: copy.image_offset.y,
                    z: copy.image_offset.z,
                },
                image_extent: vk::Extent3D {
                    width: copy.image_extent.width,
                    height: copy.image_extent.height,
                    depth: copy.image_extent.depth,
                },
            })
            .collect();

        self.access_buffer(
            src,
            vk::PipelineStageFlags::TRANSFER,
            vk::AccessFlags::TRANSFER_READ,
        );
        self.access_image_all_aspects(
            dst,
            vk::PipelineStageFlags::TRANSFER,
            vk::AccessFlags::TRANSFER_WRITE,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        );
        unsafe {
            self.dev.device.cmd_copy_buffer_to_image(
                self.vk_cmd,
                src.vk(),
                dst.vk(),
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &vk_copies,
            );
        }
    }

    pub fn blit_image(&mut self, src: &Image, dst: &Image, blits: &[ImageBlit], filter: Filter) {
        if self.recording_halted() {
            return;
        }
        assert!(!self.is_in_pass(), "transfers must be outside passes");
        assert!(!blits.is_empty());
        assert!(src.info().usage.contains(ImageUsage::TRANSFER_SRC));
        assert!(dst.info().usage.contains(ImageUsage::TRANSFER_DST));
        for blit in blits {
            let src_info = src.info();
            let dst_info = dst.info();
            assert!(is_valid_image_access(
                src_info.aspects,
                src_info.mip_levels,
                src_info.array_layers,
                blit.src_layers.aspects,
                blit.src_layers.mip_level,
                1,
                blit.src_layers.first_array_layer,
                blit.src_layers.num_array_layers,
            ));
            assert!(is_valid_image_access(
                dst_info.aspects,
                dst_info.mip_levels,
                dst_info.array_layers,
                blit.dst_layers.aspects,
                blit.dst_layers.mip_level,
                1,
                blit.dst_layers.first_array_layer,
                blit.dst_layers.num_array_layers,
            ));

            let src_extent = mip_down(src_info.extent, blit.src_layers.mip_level);
            let dst_extent = mip_down(dst_info.extent, blit.dst_layers.mip_level);
            for offset in blit.src_offsets {
                assert!(offset.x as u32 <= src_extent.width);
                assert!(offset.y as u32 <= src_extent.height);
                assert!(offset.z as u32 <= src_extent.depth);
            }
            for offset in blit.dst_offsets {
                assert!(offset.x as u32 <= dst_extent.width);
                assert!(offset.y as u32 <= dst_extent.height);
                assert!(offset.z as u32 <= dst_extent.depth);
            }
            // 1D images pin y, 1D/2D pin z
            if src_info.ty == ImageType::Type1D {
                assert!(blit.src_offsets[0].y == 0 && blit.src_offsets[1].y == 1);
            }
            if src_info.ty != ImageType::Type3D {
                assert!(blit.src_offsets[0].z == 0 && blit.src_offsets[1].z == 1);
            }
            if dst_info.ty == ImageType::Type1D {
                assert!(blit.dst_offsets[0].y == 0 && blit.dst_offsets[1].y == 1);
            }
            if dst_info.ty != ImageType::Type3D {
                assert!(blit.dst_offsets[0].z == 0 && blit.dst_offsets[1].z == 1);
            }
        }

        let to_vk_offset = |offset: crate::Offset3D| vk::Offset3D {
            x: offset.x,
            y: offset.y,
            z: offset.z,
        };
        let vk_blits: Vec<vk::ImageBlit> = blits
            .iter()
            .map(|blit| vk::ImageBlit {
                src_subresource: blit.src_layers.to_vk(),
                src_offsets: [to_vk_offset(blit.src_offsets[0]), to_vk_offset(blit.src_offsets[1])],
                dst_subresource: blit.dst_layers.to_vk(),
                dst_offsets: [to_vk_offset(blit.dst_offsets[0]), to_vk_offset(blit.dst_offsets[1])],
            })
            .collect();

        self.access_image_all_aspects(
            src,
            vk::PipelineStageFlags::TRANSFER,
            vk::AccessFlags::TRANSFER_READ,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        );
        self.access_image_all_aspects(
            dst,
            vk::PipelineStageFlags::TRANSFER,
            vk::AccessFlags::TRANSFER_WRITE,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        );
        unsafe {
            self.dev.device.cmd_blit_image(
                self.vk_cmd,
                src.vk(),
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                dst.vk(),
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &vk_blits,
                filter.to_vk(),
            );
        }
    }

    pub fn resolve_image(&mut self, src: &Image, dst: &Image, resolves: &[ImageResolve]) {
        if self.recording_halted() {
            return;
        }
        assert!(!self.is_in_pass(), "transfers must be outside passes");
        assert!(!resolves.is_empty());
        assert!(src.info().usage.contains(ImageUsage::TRANSFER_SRC));
        assert!(dst.info().usage.contains(ImageUsage::TRANSFER_DST));
        assert!(
            dst.info().sample_count == SampleCount::Count1,
            "resolve destination must be single-sampled"
        );
        for resolve in resolves {
            let src_info = src.info();
            let dst_info = dst.info();
            assert!(is_valid_image_access(
                src_info.aspects,
                src_info.mip_levels,
                src_info.array_layers,
                resolve.src_layers.aspects,
                resolve.src_layers.mip_level,
                1,
                resolve.src_layers.first_array_layer,
                resolve.src_layers.num_array_layers,
            ));
            assert!(is_valid_image_access(
                dst_info.aspects,
                dst_info.mip_levels,
                dst_info.array_layers,
                resolve.dst_layers.aspects,
                resolve.dst_layers.mip_level,
                1,
                resolve.dst_layers.first_array_layer,
                resolve.dst_layers.num_array_layers,
            ));
            let src_extent = mip_down(src_info.extent, resolve.src_layers.mip_level);
            let dst_extent = mip_down(dst_info.extent, resolve.dst_layers.mip_level);
            assert!(
                resolve.extent.width > 0 && resolve.extent.height > 0 && resolve.extent.depth > 0
            );
            assert!(resolve.src_offset.x as u32 + resolve.extent.width <= src_extent.width);
            assert!(resolve.src_offset.y as u32 + resolve.extent.height <= src_extent.height);
            assert!(resolve.src_offset.z as u32 + resolve.extent.depth <= src_extent.depth);
            assert!(resolve.dst_offset.x as u32 + resolve.extent.width <= dst_extent.width);
            assert!(resolve.dst_offset.y as u32 + resolve.extent.height <= dst_extent.height);
            assert!(resolve.dst_offset.z as u32 + resolve.extent.depth <= dst_extent.depth);
        }

        let vk_resolves: Vec<vk::ImageResolve> = resolves
            .iter()
            .map(|resolve| vk::ImageResolve {
                src_subresource: resolve.src_layers.to_vk(),
                src_offset: vk::Offset3D {
                    x: resolve.src_offset.x,
                    y: resolve.src_offset.y,
                    z: resolve.src_offset.z,
                },
                dst_subresource: resolve.dst_layers.to_vk(),
                dst_offset: vk::Offset3D {
                    x: resolve.dst_offset.x,
                    y: resolve.dst_offset.y,
                    z: resolve.dst_offset.z,
                },
                extent: vk::Extent3D {
                    width: resolve.extent.width,
                    height: resolve.extent.height,
                    depth: resolve.extent.depth,
                },
            })
            .collect();

        self.access_image_all_aspects(
            src,
            vk::PipelineStageFlags::TRANSFER,
            vk::AccessFlags::TRANSFER_READ,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        );
        self.access_image_all_aspects(
            dst,
            vk::PipelineStageFlags::TRANSFER,
            vk::AccessFlags::TRANSFER_WRITE,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        );
        unsafe {
            self.dev.device.cmd_resolve_image(
                self.vk_cmd,
                src.vk(),
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                dst.vk(),
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &vk_resolves,
            );
        }
    }

    // ------------------------------------------------------------------
    // compute pass

    pub fn begin_compute_pass(&mut self) {
        if self.recording_halted() {
            return;
        }
        assert!(!self.is_in_pass(), "passes may not nest");
        self.compute_ctx.clear();
        self.state = EncoderState::ComputePass;
    }

    pub fn end_compute_pass(&mut self) {
        if self.recording_halted() {
            return;
        }
        assert!(self.is_in_compute_pass());
        self.compute_ctx.clear();
        self.state = EncoderState::Begin;
    }

    pub fn bind_compute_pipeline(&mut self, pipeline: &ComputePipeline) {
        if self.recording_halted() {
            return;
        }
        assert!(self.is_in_compute_pass());
        self.compute_ctx.pipeline = Some(pipeline.clone());
        unsafe {
            self.dev.device.cmd_bind_pipeline(
                self.vk_cmd,
                vk::PipelineBindPoint::COMPUTE,
                pipeline.vk(),
            );
        }
    }

    pub fn push_constants(&mut self, data: &[u8]) {
        if self.recording_halted() {
            return;
        }
        assert!(self.is_in_pass(), "push constants require an active pass");
        let size = data.len() as u32;
        assert!(size <= MAX_PUSH_CONSTANTS_SIZE);
        assert!(size % 4 == 0, "push constants must be 4-byte aligned");

        if self.is_in_compute_pass() {
            let pipeline = self
                .compute_ctx
                .pipeline
                .as_ref()
                .expect("push constants require a bound pipeline");
            assert!(size == pipeline.push_constants_size());
            unsafe {
                self.dev.device.cmd_push_constants(
                    self.vk_cmd,
                    pipeline.vk_layout(),
                    vk::ShaderStageFlags::ALL,
                    0,
                    data,
                );
            }
        } else {
            let pipeline = self
                .render_ctx
                .pipeline
                .as_ref()
                .expect("push constants require a bound pipeline");
            assert!(size == pipeline.push_constants_size());
            let mut stored = [0u8; MAX_PUSH_CONSTANTS_SIZE as usize];
            stored[..data.len()].copy_from_slice(data);
            self.render_ctx.commands.push(Command::PushConstants {
                data: stored,
                size,
            });
        }
    }

    pub fn bind_descriptor_sets(&mut self, sets: &[DescriptorSet], dynamic_offsets: &[u32]) {
        if self.recording_halted() {
            return;
        }
        assert!(self.is_in_pass(), "descriptor sets require an active pass");
        assert!(sets.len() as u32 <= MAX_PIPELINE_DESCRIPTOR_SETS);
        assert!(
            dynamic_offsets.len() as u32
                <= MAX_PIPELINE_DYNAMIC_UNIFORM_BUFFERS + MAX_PIPELINE_DYNAMIC_STORAGE_BUFFERS
        );
        let limits = self.dev.limits();
        for &offset in dynamic_offsets {
            assert!(
                crate::is_aligned(limits.min_uniform_buffer_offset_alignment, offset as u64)
                    || crate::is_aligned(
                        limits.min_storage_buffer_offset_alignment,
                        offset as u64
                    ),
                "dynamic offset not aligned to a buffer offset alignment"
            );
        }

        if self.is_in_compute_pass() {
            let pipeline = self
                .compute_ctx
                .pipeline
                .as_ref()
                .expect("descriptor sets require a bound pipeline");
            assert!(pipeline.num_sets() as usize == sets.len());
            let vk_layout = pipeline.vk_layout();
            self.compute_ctx.sets = sets.to_vec();
            let vk_sets: Vec<vk::DescriptorSet> = sets.iter().map(|set| set.vk()).collect();
            unsafe {
                self.dev.device.cmd_bind_descriptor_sets(
                    self.vk_cmd,
                    vk::PipelineBindPoint::COMPUTE,
                    vk_layout,
                    0,
                    &vk_sets,
                    dynamic_offsets,
                );
            }
        } else {
            let pipeline = self
                .render_ctx
                .pipeline
                .as_ref()
                .expect("descriptor sets require a bound pipeline");
            assert!(pipeline.num_sets() as usize == sets.len());
            self.render_ctx.commands.push(Command::BindDescriptorSets {
                sets: sets.to_vec(),
                dynamic_offsets: dynamic_offsets.to_vec(),
            });
        }
    }

    pub fn dispatch(&mut self, group_count_x: u32, group_count_y: u32, group_count_z: u32) {
        if self.recording_halted() {
            return;
        }
        assert!(self.is_in_compute_pass());
        assert!(self.compute_ctx.pipeline.is_some());
        let limits = self.dev.limits();
        assert!(group_count_x <= limits.max_compute_work_group_count[0]);
        assert!(group_count_y <= limits.max_compute_work_group_count[1]);
        assert!(group_count_z <= limits.max_compute_work_group_count[2]);

        for set in &self.compute_ctx.sets {
            self.access_compute_bindings(set);
        }

        unsafe {
            self.dev
                .device
                .cmd_dispatch(self.vk_cmd, group_count_x, group_count_y, group_count_z);
        }
    }

    pub fn dispatch_indirect(&mut self, buffer: &Buffer, offset: u64) {
        if self.recording_halted() {
            return;
        }
        assert!(self.is_in_compute_pass());
        assert!(self.compute_ctx.pipeline.is_some());
        assert!(buffer.usage().contains(BufferUsage::INDIRECT_BUFFER));
        assert!(is_valid_buffer_access(
            buffer.size(),
            offset,
            std::mem::size_of::<DispatchCommand>() as u64,
            4
        ));

        for set in &self.compute_ctx.sets {
            self.access_compute_bindings(set);
        }
        self.access_buffer(
            buffer,
            vk::PipelineStageFlags::DRAW_INDIRECT,
            vk::AccessFlags::INDIRECT_COMMAND_READ,
        );

        unsafe {
            self.dev
                .device
                .cmd_dispatch_indirect(self.vk_cmd, buffer.vk(), offset);
        }
    }

    // ------------------------------------------------------------------
    // render pass

    fn validate_attachment(
        attachment: &RenderingAttachment,
        aspects: ImageAspects,
        usage: ImageUsage,
    ) {
        let image = attachment.view.image();
        assert!(
            image.info().usage.contains(usage),
            "attachment image lacks the required usage"
        );
        assert!(
            attachment.view.info().aspects.contains(aspects),
            "attachment view lacks the required aspect"
        );
        if !attachment.resolve_mode.is_empty() {
            let resolve = attachment
                .resolve
                .as_ref()
                .expect("resolve mode requires a resolve attachment");
            assert!(
                resolve.image().info().sample_count == SampleCount::Count1,
                "resolve target must be single-sampled"
            );
            assert!(
                image.info().sample_count != SampleCount::Count1,
                "resolve source must be multisampled"
            );
        }
    }

    pub fn begin_rendering(&mut self, info: &RenderingInfo) {
        if self.recording_halted() {
            return;
        }
        assert!(!self.is_in_pass(), "passes may not nest");
        assert!(
            info.color_attachments.len() as u32 <= MAX_PIPELINE_COLOR_ATTACHMENTS,
            "too many color attachments"
        );
        assert!(info.render_area.extent.width > 0 && info.render_area.extent.height > 0);
        assert!(info.num_layers > 0);

        for attachment in info.color_attachments {
            Self::validate_attachment(attachment, ImageAspects::COLOR, ImageUsage::COLOR_ATTACHMENT);
        }
        if let Some(attachment) = info.depth_attachment {
            Self::validate_attachment(
                attachment,
                ImageAspects::DEPTH,
                ImageUsage::DEPTH_STENCIL_ATTACHMENT,
            );
        }
        if let Some(attachment) = info.stencil_attachment {
            Self::validate_attachment(
                attachment,
                ImageAspects::STENCIL,
                ImageUsage::DEPTH_STENCIL_ATTACHMENT,
            );
        }

        self.reset_contexts();
        self.render_ctx.render_area = info.render_area;
        self.render_ctx.num_layers = info.num_layers;
        self.render_ctx.color_attachments = info.color_attachments.to_vec();
        self.render_ctx.depth_attachment = info.depth_attachment.cloned();
        self.render_ctx.stencil_attachment = info.stencil_attachment.cloned();
        self.state = EncoderState::RenderPass;
    }

    pub fn bind_graphics_pipeline(&mut self, pipeline: &GraphicsPipeline) {
        if self.recording_halted() {
            return;
        }
        assert!(self.is_in_render_pass());
        self.validate_render_pass_compatible(pipeline);
        self.render_ctx.pipeline = Some(pipeline.clone());
        self.render_ctx
            .commands
            .push(Command::BindPipeline(pipeline.clone()));
    }

    /// The pipeline's attachment format lists must match the active
    /// attachments exactly.
    fn validate_render_pass_compatible(&self, pipeline: &GraphicsPipeline) {
        let ctx = &self.render_ctx;
        assert!(
            pipeline.color_formats().len() == ctx.color_attachments.len(),
            "pipeline color attachment count mismatch"
        );
        assert!(
            pipeline.depth_format().is_some() == ctx.depth_attachment.is_some(),
            "pipeline depth attachment mismatch"
        );
        assert!(
            pipeline.stencil_format().is_some() == ctx.stencil_attachment.is_some(),
            "pipeline stencil attachment mismatch"
        );
        for (format, attachment) in pipeline
            .color_formats()
            .iter()
            .zip(ctx.color_attachments.iter())
        {
            assert!(
                *format == attachment.view.image().info().format,
                "pipeline color format incompatible with attachment"
            );
        }
        if let (Some(format), Some(attachment)) = (pipeline.depth_format(), &ctx.depth_attachment) {
            assert!(
                format == attachment.view.image().info().format,
                "pipeline depth format incompatible with attachment"
            );
        }
        if let (Some(format), Some(attachment)) =
            (pipeline.stencil_format(), &ctx.stencil_attachment)
        {
            assert!(
                format == attachment.view.image().info().format,
                "pipeline stencil format incompatible with attachment"
            );
        }
    }

    pub fn set_graphics_state(&mut self, state: GraphicsState) {
        if self.recording_halted() {
            return;
        }
        assert!(self.is_in_render_pass());
        assert!((0.0..=1.0).contains(&state.viewport.min_depth));
        assert!((0.0..=1.0).contains(&state.viewport.max_depth));
        self.render_ctx.has_state = true;
        self.render_ctx
            .commands
            .push(Command::SetGraphicsState(state));
    }

    pub fn bind_vertex_buffers(&mut self, vertex_buffers: &[Buffer], offsets: &[u64]) {
        if self.recording_halted() {
            return;
        }
        assert!(self.is_in_render_pass());
        assert!(!vertex_buffers.is_empty());
        assert!(vertex_buffers.len() as u32 <= MAX_VERTEX_ATTRIBUTES);
        assert!(offsets.len() == vertex_buffers.len());
        for (buffer, &offset) in vertex_buffers.iter().zip(offsets.iter()) {
            assert!(offset < buffer.size());
            assert!(buffer.usage().contains(BufferUsage::VERTEX_BUFFER));
        }
        for (binding, (buffer, &offset)) in
            vertex_buffers.iter().zip(offsets.iter()).enumerate()
        {
            self.render_ctx.commands.push(Command::BindVertexBuffer {
                binding: binding as u32,
                buffer: buffer.clone(),
                offset,
            });
        }
    }

    pub fn bind_index_buffer(&mut self, index_buffer: &Buffer, offset: u64, index_type: IndexType) {
        if self.recording_halted() {
            return;
        }
        assert!(self.is_in_render_pass());
        assert!(offset < index_buffer.size());
        assert!(crate::is_aligned(index_type.size(), offset));
        assert!(index_buffer.usage().contains(BufferUsage::INDEX_BUFFER));
        self.render_ctx.index_buffer = Some(index_buffer.clone());
        self.render_ctx.index_type = index_type;
        self.render_ctx.index_buffer_offset = offset;
        self.render_ctx.commands.push(Command::BindIndexBuffer {
            buffer: index_buffer.clone(),
            offset,
            index_type,
        });
    }

    pub fn draw(
        &mut self,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    ) {
        if self.recording_halted() {
            return;
        }
        assert!(self.is_in_render_pass());
        assert!(self.render_ctx.pipeline.is_some(), "draw requires a pipeline");
        assert!(self.render_ctx.has_state, "draw requires graphics state");
        self.render_ctx.commands.push(Command::Draw {
            vertex_count,
            instance_count,
            first_vertex,
            first_instance,
        });
    }

    pub fn draw_indexed(
        &mut self,
        first_index: u32,
        num_indices: u32,
        vertex_offset: i32,
        first_instance: u32,
        num_instances: u32,
    ) {
        if self.recording_halted() {
            return;
        }
        assert!(self.is_in_render_pass());
        assert!(self.render_ctx.pipeline.is_some(), "draw requires a pipeline");
        assert!(self.render_ctx.has_state, "draw requires graphics state");
        let index_buffer = self
            .render_ctx
            .index_buffer
            .as_ref()
            .expect("indexed draw requires an index buffer");
        let index_size = self.render_ctx.index_type.size();
        let offset = self.render_ctx.index_buffer_offset;
        assert!(offset + u64::from(first_index) * index_size < index_buffer.size());
        assert!(
            offset + (u64::from(first_index) + u64::from(num_indices)) * index_size
                <= index_buffer.size(),
            "indexed draw reads past the index buffer"
        );
        self.render_ctx.commands.push(Command::DrawIndexed {
            first_index,
            num_indices,
            vertex_offset,
            first_instance,
            num_instances,
        });
    }

    pub fn draw_indirect(&mut self, buffer: &Buffer, offset: u64, draw_count: u32, stride: u32) {
        if self.recording_halted() {
            return;
        }
        assert!(self.is_in_render_pass());
        assert!(self.render_ctx.pipeline.is_some(), "draw requires a pipeline");
        assert!(self.render_ctx.has_state, "draw requires graphics state");
        assert!(buffer.usage().contains(BufferUsage::INDIRECT_BUFFER));
        assert!(offset < buffer.size());
        assert!(offset + u64::from(draw_count) * u64::from(stride) <= buffer.size());
        assert!(stride % 4 == 0);
        assert!(stride as usize >= std::mem::size_of::<DrawCommand>());
        self.render_ctx.commands.push(Command::DrawIndirect {
            buffer: buffer.clone(),
            offset,
            draw_count,
            stride,
        });
    }

    pub fn draw_indexed_indirect(
        &mut self,
        buffer: &Buffer,
        offset: u64,
        draw_count: u32,
        stride: u32,
    ) {
        if self.recording_halted() {
            return;
        }
        assert!(self.is_in_render_pass());
        assert!(self.render_ctx.pipeline.is_some(), "draw requires a pipeline");
        assert!(self.render_ctx.has_state, "draw requires graphics state");
        assert!(
            self.render_ctx.index_buffer.is_some(),
            "indexed draw requires an index buffer"
        );
        assert!(buffer.usage().contains(BufferUsage::INDIRECT_BUFFER));
        assert!(offset < buffer.size());
        assert!(offset + u64::from(draw_count) * u64::from(stride) <= buffer.size());
        assert!(stride % 4 == 0);
        assert!(stride as usize >= std::mem::size_of::<DrawIndexedCommand>());
        self.render_ctx.commands.push(Command::DrawIndexedIndirect {
            buffer: buffer.clone(),
            offset,
            draw_count,
            stride,
        });
    }

    pub fn end_rendering(&mut self) {
        if self.recording_halted() {
            return;
        }
        assert!(self.is_in_render_pass());

        // pass 1: apply every resource access recorded in the log so the
        // barriers land before the rendering scope opens
        for command in &self.render_ctx.commands {
            match command {
                Command::BindDescriptorSets { sets, .. } => {
                    for set in sets {
                        self.access_graphics_bindings(set);
                    }
                }
                Command::BindVertexBuffer { buffer, .. } => {
                    self.access_buffer(
                        buffer,
                        vk::PipelineStageFlags::VERTEX_INPUT,
                        vk::AccessFlags::VERTEX_ATTRIBUTE_READ,
                    );
                }
                Command::BindIndexBuffer { buffer, .. } => {
                    self.access_buffer(
                        buffer,
                        vk::PipelineStageFlags::VERTEX_INPUT,
                        vk::AccessFlags::INDEX_READ,
                    );
                }
                Command::DrawIndirect { buffer, .. }
                | Command::DrawIndexedIndirect { buffer, .. } => {
                    self.access_buffer(
                        buffer,
                        vk::PipelineStageFlags::DRAW_INDIRECT,
                        vk::AccessFlags::INDIRECT_COMMAND_READ,
                    );
                }
                _ => {}
            }
        }

        // attachment accesses + fully-resolved attachment descriptions
        const RESOLVE_STAGE: vk::PipelineStageFlags =
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT;
        const RESOLVE_SRC_ACCESS: vk::AccessFlags = vk::AccessFlags::COLOR_ATTACHMENT_READ;
        const RESOLVE_DST_ACCESS: vk::AccessFlags = vk::AccessFlags::from_raw(
            vk::AccessFlags::COLOR_ATTACHMENT_READ.as_raw()
                | vk::AccessFlags::COLOR_ATTACHMENT_WRITE.as_raw(),
        );

        let mut vk_color_attachments = Vec::with_capacity(self.render_ctx.color_attachments.len());
        for attachment in &self.render_ctx.color_attachments {
            let mut access = color_attachment_access(attachment.load_op, attachment.store_op);
            let mut stages = vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT;
            let layout = vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL;
            if !attachment.resolve_mode.is_empty() {
                access |= RESOLVE_SRC_ACCESS;
                stages |= RESOLVE_STAGE;
                let resolve = attachment.resolve.as_ref().expect("resolve view");
                self.access_image_aspect(
                    resolve.image(),
                    RESOLVE_STAGE,
                    RESOLVE_DST_ACCESS,
                    vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                    ImageAspects::COLOR,
                    crate::image::COLOR_ASPECT_IDX,
                );
            }
            self.access_image_aspect(
                attachment.view.image(),
                stages,
                access,
                layout,
                ImageAspects::COLOR,
                crate::image::COLOR_ASPECT_IDX,
            );

            vk_color_attachments.push(
                vk::RenderingAttachmentInfo::default()
                    .image_view(attachment.view.vk())
                    .image_layout(layout)
                    .resolve_mode(attachment.resolve_mode.to_vk())
                    .resolve_image_view(
                        attachment
                            .resolve
                            .as_ref()
                            .map(|view| view.vk())
                            .unwrap_or(vk::ImageView::null()),
                    )
                    .resolve_image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                    .load_op(attachment.load_op.to_vk())
                    .store_op(attachment.store_op.to_vk())
                    .clear_value(attachment.clear.to_vk()),
            );
        }

        let vk_depth_attachment = self.render_ctx.depth_attachment.clone().map(|attachment| {
            self.depth_stencil_attachment_info(
                &attachment,
                ImageAspects::DEPTH,
                vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL,
                vk::ImageLayout::DEPTH_READ_ONLY_OPTIMAL,
            )
        });
        let vk_stencil_attachment =
            self.render_ctx.stencil_attachment.clone().map(|attachment| {
                self.depth_stencil_attachment_info(
                    &attachment,
                    ImageAspects::STENCIL,
                    vk::ImageLayout::STENCIL_ATTACHMENT_OPTIMAL,
                    vk::ImageLayout::STENCIL_READ_ONLY_OPTIMAL,
                )
            });

        let render_area = vk::Rect2D {
            offset: vk::Offset2D {
                x: self.render_ctx.render_area.offset.x,
                y: self.render_ctx.render_area.offset.y,
            },
            extent: vk::Extent2D {
                width: self.render_ctx.render_area.extent.width,
                height: self.render_ctx.render_area.extent.height,
            },
        };
        let mut rendering_info = vk::RenderingInfo::default()
            .render_area(render_area)
            .layer_count(self.render_ctx.num_layers)
            .color_attachments(&vk_color_attachments);
        if let Some(ref attachment) = vk_depth_attachment {
            rendering_info = rendering_info.depth_attachment(attachment);
        }
        if let Some(ref attachment) = vk_stencil_attachment {
            rendering_info = rendering_info.stencil_attachment(attachment);
        }

        unsafe {
            self.dev
                .dynamic_rendering
                .cmd_begin_rendering(self.vk_cmd, &rendering_info);
        }

        // pass 2: replay the log into backend calls
        let device = &self.dev.device;
        let dynamic_state = &self.dev.extended_dynamic_state;
        let mut pipeline: Option<&GraphicsPipeline> = None;
        for command in &self.render_ctx.commands {
            match command {
                Command::BindPipeline(bound) => {
                    pipeline = Some(bound);
                    unsafe {
                        device.cmd_bind_pipeline(
                            self.vk_cmd,
                            vk::PipelineBindPoint::GRAPHICS,
                            bound.vk(),
                        );
                    }
                }
                Command::BindDescriptorSets {
                    sets,
                    dynamic_offsets,
                } => {
                    let pipeline = pipeline.expect("descriptor sets bound before a pipeline");
                    let vk_sets: Vec<vk::DescriptorSet> =
                        sets.iter().map(|set| set.vk()).collect();
                    unsafe {
                        device.cmd_bind_descriptor_sets(
                            self.vk_cmd,
                            vk::PipelineBindPoint::GRAPHICS,
                            pipeline.vk_layout(),
                            0,
                            &vk_sets,
                            dynamic_offsets,
                        );
                    }
                }
                Command::PushConstants { data, size } => {
                    let pipeline = pipeline.expect("push constants bound before a pipeline");
                    unsafe {
                        device.cmd_push_constants(
                            self.vk_cmd,
                            pipeline.vk_layout(),
                            vk::ShaderStageFlags::ALL,
                            0,
                            &data[..*size as usize],
                        );
                    }
                }
                Command::SetGraphicsState(state) => {
                    let scissor = vk::Rect2D {
                        offset: vk::Offset2D {
                            x: state.scissor.offset.x,
                            y: state.scissor.offset.y,
                        },
                        extent: vk::Extent2D {
                            width: state.scissor.extent.width,
                            height: state.scissor.extent.height,
                        },
                    };
                    let viewport = vk::Viewport {
                        x: state.viewport.x,
                        y: state.viewport.y,
                        width: state.viewport.width,
                        height: state.viewport.height,
                        min_depth: state.viewport.min_depth,
                        max_depth: state.viewport.max_depth,
                    };
                    unsafe {
                        device.cmd_set_scissor(self.vk_cmd, 0, &[scissor]);
                        device.cmd_set_viewport(self.vk_cmd, 0, &[viewport]);
                        device.cmd_set_blend_constants(self.vk_cmd, &state.blend_constant);
                        dynamic_state
                            .cmd_set_stencil_test_enable(self.vk_cmd, state.stencil_test_enable);
                        for (face, stencil) in [
                            (vk::StencilFaceFlags::FRONT, &state.front_face_stencil),
                            (vk::StencilFaceFlags::BACK, &state.back_face_stencil),
                        ] {
                            device.cmd_set_stencil_reference(self.vk_cmd, face, stencil.reference);
                            device.cmd_set_stencil_compare_mask(
                                self.vk_cmd,
                                face,
                                stencil.compare_mask,
                            );
                            device.cmd_set_stencil_write_mask(
                                self.vk_cmd,
                                face,
                                stencil.write_mask,
                            );
                            dynamic_state.cmd_set_stencil_op(
                                self.vk_cmd,
                                face,
                                stencil.fail_op.to_vk(),
                                stencil.pass_op.to_vk(),
                                stencil.depth_fail_op.to_vk(),
                                stencil.compare_op.to_vk(),
                            );
                        }
                        dynamic_state.cmd_set_cull_mode(self.vk_cmd, state.cull_mode.to_vk());
                        dynamic_state.cmd_set_front_face(self.vk_cmd, state.front_face.to_vk());
                        dynamic_state
                            .cmd_set_depth_test_enable(self.vk_cmd, state.depth_test_enable);
                        dynamic_state
                            .cmd_set_depth_compare_op(self.vk_cmd, state.depth_compare_op.to_vk());
                        dynamic_state
                            .cmd_set_depth_write_enable(self.vk_cmd, state.depth_write_enable);
                        dynamic_state.cmd_set_depth_bounds_test_enable(
                            self.vk_cmd,
                            state.depth_bounds_test_enable,
                        );
                    }
                }
                Command::BindVertexBuffer {
                    binding,
                    buffer,
                    offset,
                } => unsafe {
                    device.cmd_bind_vertex_buffers(
                        self.vk_cmd,
                        *binding,
                        &[buffer.vk()],
                        &[*offset],
                    );
                },
                Command::BindIndexBuffer {
                    buffer,
                    offset,
                    index_type,
                } => unsafe {
                    device.cmd_bind_index_buffer(
                        self.vk_cmd,
                        buffer.vk(),
                        *offset,
                        index_type.to_vk(),
                    );
                },
                Command::Draw {
                    vertex_count,
                    instance_count,
                    first_vertex,
                    first_instance,
                } => unsafe {
                    device.cmd_draw(
                        self.vk_cmd,
                        *vertex_count,
                        *instance_count,
                        *first_vertex,
                        *first_instance,
                    );
                },
                Command::DrawIndexed {
                    first_index,
                    num_indices,
                    vertex_offset,
                    first_instance,
                    num_instances,
                } => unsafe {
                    device.cmd_draw_indexed(
                        self.vk_cmd,
                        *num_indices,
                        *num_instances,
                        *first_index,
                        *vertex_offset,
                        *first_instance,
                    );
                },
                Command::DrawIndirect {
                    buffer,
                    offset,
                    draw_count,
                    stride,
                } => unsafe {
                    device.cmd_draw_indirect(
                        self.vk_cmd,
                        buffer.vk(),
                        *offset,
                        *draw_count,
                        *stride,
                    );
                },
                Command::DrawIndexedIndirect {
                    buffer,
                    offset,
                    draw_count,
                    stride,
                } => unsafe {
                    device.cmd_draw_indexed_indirect(
                        self.vk_cmd,
                        buffer.vk(),
                        *offset,
                        *draw_count,
                        *stride,
                    );
                },
            }
        }

        unsafe {
            self.dev.dynamic_rendering.cmd_end_rendering(self.vk_cmd);
        }

        self.render_ctx.clear();
        self.state = EncoderState::Begin;
    }

    fn depth_stencil_attachment_info(
        &self,
        attachment: &RenderingAttachment,
        aspect: ImageAspects,
        write_layout: vk::ImageLayout,
        read_layout: vk::ImageLayout,
    ) -> vk::RenderingAttachmentInfo<'static> {
        const RESOLVE_STAGE: vk::PipelineStageFlags =
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT;
        const RESOLVE_DST_ACCESS: vk::AccessFlags = vk::AccessFlags::from_raw(
            vk::AccessFlags::COLOR_ATTACHMENT_READ.as_raw()
                | vk::AccessFlags::COLOR_ATTACHMENT_WRITE.as_raw(),
        );

        let mut access = depth_attachment_access(attachment.load_op, attachment.store_op);
        let layout = if crate::access::has_write_access(access) {
            write_layout
        } else {
            read_layout
        };
        let mut stages = vk::PipelineStageFlags::empty();
        if crate::access::has_read_access(access) {
            stages |= vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS;
        }
        if crate::access::has_write_access(access) {
            stages |= vk::PipelineStageFlags::LATE_FRAGMENT_TESTS;
        }
        if !attachment.resolve_mode.is_empty() {
            access |= vk::AccessFlags::COLOR_ATTACHMENT_READ;
            stages |= RESOLVE_STAGE;
            let resolve = attachment.resolve.as_ref().expect("resolve view");
            self.access_image_aspect(
                resolve.image(),
                RESOLVE_STAGE,
                RESOLVE_DST_ACCESS,
                write_layout,
                aspect,
                resolve.image().tracked_aspect_index(aspect),
            );
        }
        self.access_image_aspect(
            attachment.view.image(),
            stages,
            access,
            layout,
            aspect,
            attachment.view.image().tracked_aspect_index(aspect),
        );

        vk::RenderingAttachmentInfo::default()
            .image_view(attachment.view.vk())
            .image_layout(layout)
            .resolve_mode(attachment.resolve_mode.to_vk())
            .resolve_image_view(
                attachment
                    .resolve
                    .as_ref()
                    .map(|view| view.vk())
                    .unwrap_or(vk::ImageView::null()),
            )
            .resolve_image_layout(write_layout)
            .load_op(attachment.load_op.to_vk())
            .store_op(attachment.store_op.to_vk())
            .clear_value(attachment.clear.to_vk())
    }
}

/// Load/store-derived access of a color attachment: clears and stores write,
/// loads read.
fn color_attachment_access(load_op: LoadOp, store_op: StoreOp) -> vk::AccessFlags {
    let mut access = vk::AccessFlags::NONE;
    if matches!(load_op, LoadOp::Clear | LoadOp::DontCare) || store_op == StoreOp::Store {
        access |= vk::AccessFlags::COLOR_ATTACHMENT_WRITE;
    }
    if load_op == LoadOp::Load {
        access |= vk::AccessFlags::COLOR_ATTACHMENT_READ;
    }
    access
}

fn depth_attachment_access(load_op: LoadOp, store_op: StoreOp) -> vk::AccessFlags {
    let mut access = vk::AccessFlags::NONE;
    if matches!(load_op, LoadOp::Clear | LoadOp::DontCare)
        || matches!(store_op, StoreOp::Store | StoreOp::DontCare)
    {
        access |= vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE;
    }
    if load_op == LoadOp::Load {
        access |= vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ;
    }
    access
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color_attachment_access_by_ops() {
        assert_eq!(
            color_attachment_access(LoadOp::Clear, StoreOp::Store),
            vk::AccessFlags::COLOR_ATTACHMENT_WRITE
        );
        assert_eq!(
            color_attachment_access(LoadOp::Load, StoreOp::DontCare),
            vk::AccessFlags::COLOR_ATTACHMENT_READ
        );
        assert_eq!(
            color_attachment_access(LoadOp::Load, StoreOp::Store),
            vk::AccessFlags::COLOR_ATTACHMENT_READ | vk::AccessFlags::COLOR_ATTACHMENT_WRITE
        );
    }

    #[test]
    fn depth_attachment_access_by_ops() {
        // depth writes also on DontCare stores
        assert_eq!(
            depth_attachment_access(LoadOp::Load, StoreOp::DontCare),
            vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
                | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE
        );
        assert_eq!(
            depth_attachment_access(LoadOp::Clear, StoreOp::Store),
            vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE
        );
    }
}
