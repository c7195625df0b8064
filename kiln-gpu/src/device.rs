//! The logical device: resource factories, frame pipelining, and swapchain
//! management.

use std::ffi::CString;
use std::sync::{Arc, Mutex};

use ash::vk;

use crate::buffer::{is_valid_buffer_access, BufferResource, BufferViewResource};
use crate::descriptor::{self, DescriptorHeap};
use crate::encoder::CommandEncoder;
use crate::error::{Result, Status, VkResultExt};
use crate::frame::FrameContext;
use crate::image::{ImageResource, ImageViewResource, SamplerResource};
use crate::pipeline::{self, PipelineCacheResource};
use crate::query::{QueryResource, STATISTICS_FLAGS};
use crate::swapchain::{self, Surface, Swapchain, SwapchainState};
use crate::{
    is_image_view_type_compatible, num_mip_levels, Buffer, BufferInfo, BufferView, BufferViewInfo,
    ColorSpace, ComputePipeline, ComputePipelineInfo, DescriptorSet, DescriptorSetLayout,
    DescriptorSetLayoutInfo, DescriptorSetUpdate, DeviceType, Format, FormatFeatures, FrameId,
    GraphicsPipeline, GraphicsPipelineInfo, Image, ImageInfo, ImageType, ImageUsage, ImageView,
    ImageViewInfo, Label, PipelineCache, PipelineCacheInfo, PipelineStatistics, PresentMode,
    Sampler, SamplerInfo, Shader, ShaderInfo, StatisticsQuery, SurfaceCapabilities, SurfaceFormat,
    SwapchainInfo, TimestampQuery, MAX_BINDING_DESCRIPTORS, MAX_IMAGE_ARRAY_LAYERS,
    MAX_IMAGE_EXTENT_1D, MAX_IMAGE_EXTENT_2D, MAX_IMAGE_EXTENT_3D, MAX_SAMPLER_ANISOTROPY,
    WHOLE_SIZE,
};

#[derive(Clone, Copy)]
pub(crate) struct PhysicalDevice {
    pub(crate) raw: vk::PhysicalDevice,
    pub(crate) properties: vk::PhysicalDeviceProperties,
    pub(crate) features: vk::PhysicalDeviceFeatures,
    pub(crate) memory_properties: vk::PhysicalDeviceMemoryProperties,
}

/// Backend device state shared by every resource record. Destroyed only when
/// the last handle referencing it is dropped.
pub(crate) struct DeviceShared {
    pub(crate) instance: Arc<crate::instance::InstanceShared>,
    pub(crate) phy_dev: PhysicalDevice,
    pub(crate) device: ash::Device,
    pub(crate) queue_family: u32,
    pub(crate) queue: vk::Queue,
    pub(crate) swapchain_loader: ash::khr::swapchain::Device,
    pub(crate) dynamic_rendering: ash::khr::dynamic_rendering::Device,
    pub(crate) extended_dynamic_state: ash::ext::extended_dynamic_state::Device,
    pub(crate) debug_utils: Option<ash::ext::debug_utils::Device>,
}

impl Drop for DeviceShared {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_device(None);
        }
    }
}

impl DeviceShared {
    pub(crate) fn limits(&self) -> &vk::PhysicalDeviceLimits {
        &self.phy_dev.properties.limits
    }

    /// Attaches `label` to a backend object through debug-utils when
    /// validation is enabled.
    pub(crate) fn set_object_name<T: vk::Handle>(&self, label: Label, handle: T) {
        let (Some(debug_utils), Some(label)) = (self.debug_utils.as_ref(), label) else {
            return;
        };
        let Ok(name) = CString::new(label) else {
            return;
        };
        let info = vk::DebugUtilsObjectNameInfoEXT::default()
            .object_handle(handle)
            .object_name(&name);
        unsafe {
            let _ = debug_utils.set_debug_utils_object_name(&info);
        }
    }

    pub(crate) fn find_memory_type(
        &self,
        type_bits: u32,
        flags: vk::MemoryPropertyFlags,
    ) -> Option<u32> {
        let props = &self.phy_dev.memory_properties;
        (0..props.memory_type_count).find(|&i| {
            (type_bits & (1 << i)) != 0
                && props.memory_types[i as usize].property_flags.contains(flags)
        })
    }
}

/// Device-level properties surfaced to the application.
#[derive(Debug, Clone, Default)]
pub struct DeviceProperties {
    pub api_version: u32,
    pub driver_version: u32,
    pub vendor_id: u32,
    pub device_id: u32,
    pub device_name: String,
    pub ty: Option<DeviceType>,
    pub has_unified_memory: bool,
    pub has_non_solid_fill_mode: bool,
    pub texel_buffer_offset_alignment: u64,
    pub uniform_buffer_offset_alignment: u64,
    pub storage_buffer_offset_alignment: u64,
    pub timestamp_period: f32,
    pub max_compute_work_group_invocations: u32,
    pub max_compute_shared_memory_size: u32,
    pub max_compute_work_group_count: [u32; 3],
    pub max_compute_work_group_size: [u32; 3],
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FormatProperties {
    pub linear_tiling_features: FormatFeatures,
    pub optimal_tiling_features: FormatFeatures,
    pub buffer_features: FormatFeatures,
}

/// Snapshot of the frame ring.
#[derive(Debug, Clone, Copy)]
pub struct FrameInfo {
    pub buffering: u32,
    pub current_frame: FrameId,
    /// Newest frame the GPU has fully retired.
    pub tail_frame: FrameId,
    pub ring_index: u32,
}

/// A logical GPU device plus its frame ring and descriptor heap.
///
/// Not internally synchronized: one thread drives the device, and `&mut`
/// methods encode that contract.
pub struct Device {
    pub(crate) frame: FrameContext,
    pub(crate) heap: DescriptorHeap,
    pub(crate) shared: Arc<DeviceShared>,
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("buffering", &self.frame.buffering)
            .finish_non_exhaustive()
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        unsafe {
            let _ = self.shared.device.device_wait_idle();
        }
        self.heap.lock().destroy(&self.shared);
    }
}

impl Device {
    pub(crate) fn new(shared: Arc<DeviceShared>, buffering: u32) -> Result<Self> {
        let frame = FrameContext::new(Arc::clone(&shared), buffering)?;
        Ok(Self {
            frame,
            heap: DescriptorHeap::new(MAX_BINDING_DESCRIPTORS),
            shared,
        })
    }

    pub fn get_device_properties(&self) -> DeviceProperties {
        let properties = &self.shared.phy_dev.properties;
        let features = &self.shared.phy_dev.features;
        let memory = &self.shared.phy_dev.memory_properties;
        let limits = &properties.limits;

        let has_unified_memory = (0..memory.memory_type_count).any(|i| {
            memory.memory_types[i as usize].property_flags.contains(
                vk::MemoryPropertyFlags::DEVICE_LOCAL | vk::MemoryPropertyFlags::HOST_VISIBLE,
            )
        });

        DeviceProperties {
            api_version: properties.api_version,
            driver_version: properties.driver_version,
            vendor_id: properties.vendor_id,
            device_id: properties.device_id,
            device_name: properties
                .device_name_as_c_str()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
            ty: Some(DeviceType::from_vk(properties.device_type)),
            has_unified_memory,
            has_non_solid_fill_mode: features.fill_mode_non_solid == vk::TRUE,
            texel_buffer_offset_alignment: limits.min_texel_buffer_offset_alignment,
            uniform_buffer_offset_alignment: limits.min_uniform_buffer_offset_alignment,
            storage_buffer_offset_alignment: limits.min_storage_buffer_offset_alignment,
            timestamp_period: limits.timestamp_period,
            max_compute_work_group_invocations: limits.max_compute_work_group_invocations,
            max_compute_shared_memory_size: limits.max_compute_shared_memory_size,
            max_compute_work_group_count: limits.max_compute_work_group_count,
            max_compute_work_group_size: limits.max_compute_work_group_size,
        }
    }

    pub fn get_format_properties(&self, format: Format) -> FormatProperties {
        let props = unsafe {
            self.shared
                .instance
                .instance
                .get_physical_device_format_properties(self.shared.phy_dev.raw, format.to_vk())
        };
        FormatProperties {
            linear_tiling_features: FormatFeatures::from_bits_truncate(
                props.linear_tiling_features.as_raw(),
            ),
            optimal_tiling_features: FormatFeatures::from_bits_truncate(
                props.optimal_tiling_features.as_raw(),
            ),
            buffer_features: FormatFeatures::from_bits_truncate(props.buffer_features.as_raw()),
        }
    }

    // ------------------------------------------------------------------
    // resource creation

    pub fn create_buffer(&self, info: &BufferInfo) -> Result<Buffer> {
        assert!(info.size > 0, "buffers must not be empty");
        assert!(!info.usage.is_empty(), "buffers require a usage");

        let create_info = vk::BufferCreateInfo::default()
            .size(info.size)
            .usage(info.usage.to_vk())
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        let vk_buffer =
            unsafe { self.shared.device.create_buffer(&create_info, None) }.status()?;

        let requirements =
            unsafe { self.shared.device.get_buffer_memory_requirements(vk_buffer) };
        let wanted = if info.host_mapped {
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT
        } else {
            vk::MemoryPropertyFlags::DEVICE_LOCAL
        };
        let memory_type = self
            .shared
            .find_memory_type(requirements.memory_type_bits, wanted)
            .or_else(|| {
                self.shared
                    .find_memory_type(requirements.memory_type_bits, vk::MemoryPropertyFlags::empty())
            });
        let Some(memory_type) = memory_type else {
            unsafe { self.shared.device.destroy_buffer(vk_buffer, None) };
            return Err(Status::OutOfDeviceMemory);
        };

        let alloc_info = vk::MemoryAllocateInfo::default()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type);
        let memory = match unsafe { self.shared.device.allocate_memory(&alloc_info, None) } {
            Ok(memory) => memory,
            Err(result) => {
                unsafe { self.shared.device.destroy_buffer(vk_buffer, None) };
                return Err(result.into());
            }
        };
        if let Err(result) =
            unsafe { self.shared.device.bind_buffer_memory(vk_buffer, memory, 0) }
        {
            unsafe {
                self.shared.device.destroy_buffer(vk_buffer, None);
                self.shared.device.free_memory(memory, None);
            }
            return Err(result.into());
        }

        let mapped = if info.host_mapped {
            match unsafe {
                self.shared
                    .device
                    .map_memory(memory, 0, vk::WHOLE_SIZE, vk::MemoryMapFlags::empty())
            } {
                Ok(ptr) => ptr.cast::<u8>(),
                Err(result) => {
                    unsafe {
                        self.shared.device.destroy_buffer(vk_buffer, None);
                        self.shared.device.free_memory(memory, None);
                    }
                    return Err(result.into());
                }
            }
        } else {
            std::ptr::null_mut()
        };

        self.shared.set_object_name(info.label, vk_buffer);

        Ok(Buffer {
            res: Arc::new(BufferResource {
                label: info.label,
                size: info.size,
                usage: info.usage,
                host_mapped: info.host_mapped,
                dev: Arc::clone(&self.shared),
                vk_buffer,
                memory,
                mapped,
                state: Mutex::new(Default::default()),
            }),
        })
    }

    pub fn create_buffer_view(&self, info: &BufferViewInfo) -> Result<BufferView> {
        let buffer = &info.buffer;
        assert!(
            buffer.usage().intersects(
                crate::BufferUsage::UNIFORM_TEXEL_BUFFER | crate::BufferUsage::STORAGE_TEXEL_BUFFER
            ),
            "buffer views require a texel buffer usage"
        );
        assert!(info.format != Format::Undefined);
        assert!(is_valid_buffer_access(buffer.size(), info.offset, info.size, 1));

        let view_size = if info.size == WHOLE_SIZE {
            buffer.size() - info.offset
        } else {
            info.size
        };

        let create_info = vk::BufferViewCreateInfo::default()
            .buffer(buffer.vk())
            .format(info.format.to_vk())
            .offset(info.offset)
            .range(info.size);
        let vk_view =
            unsafe { self.shared.device.create_buffer_view(&create_info, None) }.status()?;
        self.shared.set_object_name(info.label, vk_view);

        Ok(BufferView {
            res: Arc::new(BufferViewResource {
                label: info.label,
                buffer: buffer.clone(),
                format: info.format,
                offset: info.offset,
                size: view_size,
                dev: Arc::clone(&self.shared),
                vk_view,
            }),
        })
    }

    pub fn create_image(&self, info: &ImageInfo) -> Result<Image> {
        assert!(info.format != Format::Undefined);
        assert!(!info.usage.is_empty(), "images require a usage");
        assert!(!info.aspects.is_empty(), "images require an aspect");
        assert!(info.extent.width > 0 && info.extent.height > 0 && info.extent.depth > 0);
        assert!(info.mip_levels > 0);
        assert!(info.mip_levels <= num_mip_levels(info.extent));
        assert!(info.array_layers > 0);
        assert!(info.array_layers <= MAX_IMAGE_ARRAY_LAYERS);

        match info.ty {
            ImageType::Type1D => {
                assert!(info.extent.width <= MAX_IMAGE_EXTENT_1D);
                assert!(info.extent.height == 1 && info.extent.depth == 1);
            }
            ImageType::Type2D => {
                assert!(info.extent.width <= MAX_IMAGE_EXTENT_2D);
                assert!(info.extent.height <= MAX_IMAGE_EXTENT_2D);
                assert!(info.extent.depth == 1);
            }
            ImageType::Type3D => {
                assert!(info.extent.width <= MAX_IMAGE_EXTENT_3D);
                assert!(info.extent.height <= MAX_IMAGE_EXTENT_3D);
                assert!(info.extent.depth <= MAX_IMAGE_EXTENT_3D);
            }
        }

        // enable the view kinds is_image_view_type_compatible admits
        let mut flags = vk::ImageCreateFlags::empty();
        if info.ty == ImageType::Type2D
            && info.array_layers >= 6
            && info.extent.width == info.extent.height
        {
            flags |= vk::ImageCreateFlags::CUBE_COMPATIBLE;
        }
        if info.ty == ImageType::Type3D {
            flags |= vk::ImageCreateFlags::TYPE_2D_ARRAY_COMPATIBLE;
        }

        let create_info = vk::ImageCreateInfo::default()
            .flags(flags)
            .image_type(info.ty.to_vk())
            .format(info.format.to_vk())
            .extent(vk::Extent3D {
                width: info.extent.width,
                height: info.extent.height,
                depth: info.extent.depth,
            })
            .mip_levels(info.mip_levels)
            .array_layers(info.array_layers)
            .samples(info.sample_count.to_vk())
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(info.usage.to_vk())
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let vk_image = unsafe { self.shared.device.create_image(&create_info, None) }.status()?;

        let requirements = unsafe { self.shared.device.get_image_memory_requirements(vk_image) };
        let memory_type = self
            .shared
            .find_memory_type(
                requirements.memory_type_bits,
                vk::MemoryPropertyFlags::DEVICE_LOCAL,
            )
            .or_else(|| {
                self.shared
                    .find_memory_type(requirements.memory_type_bits, vk::MemoryPropertyFlags::empty())
            });
        let Some(memory_type) = memory_type else {
            unsafe { self.shared.device.destroy_image(vk_image, None) };
            return Err(Status::OutOfDeviceMemory);
        };

        let alloc_info = vk::MemoryAllocateInfo::default()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type);
        let memory = match unsafe { self.shared.device.allocate_memory(&alloc_info, None) } {
            Ok(memory) => memory,
            Err(result) => {
                unsafe { self.shared.device.destroy_image(vk_image, None) };
                return Err(result.into());
            }
        };
        if let Err(result) = unsafe { self.shared.device.bind_image_memory(vk_image, memory, 0) } {
            unsafe {
                self.shared.device.destroy_image(vk_image, None);
                self.shared.device.free_memory(memory, None);
            }
            return Err(result.into());
        }

        self.shared.set_object_name(info.label, vk_image);

        // combined depth+stencil images get independent per-aspect states
        let num_aspects = if info
            .aspects
            .contains(crate::ImageAspects::DEPTH | crate::ImageAspects::STENCIL)
        {
            2
        } else {
            1
        };

        Ok(Image {
            res: Arc::new(ImageResource {
                info: *info,
                is_swapchain_image: false,
                dev: Arc::clone(&self.shared),
                vk_image,
                memory,
                states: Mutex::new(Default::default()),
                num_aspects,
            }),
        })
    }

    pub fn create_image_view(&self, info: &ImageViewInfo) -> Result<ImageView> {
        let image_info = *info.image.info();
        assert!(info.view_format != Format::Undefined);
        assert!(
            is_image_view_type_compatible(image_info.ty, info.view_type),
            "view type incompatible with the image type"
        );
        assert!(
            crate::image::is_valid_image_access(
                image_info.aspects,
                image_info.mip_levels,
                image_info.array_layers,
                info.aspects,
                info.first_mip_level,
                info.num_mip_levels,
                info.first_array_layer,
                info.num_array_layers,
            ),
            "view subresource range outside the image"
        );

        let create_info = vk::ImageViewCreateInfo::default()
            .image(info.image.vk())
            .view_type(info.view_type.to_vk())
            .format(info.view_format.to_vk())
            .components(info.mapping.to_vk())
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(info.aspects.to_vk())
                    .base_mip_level(info.first_mip_level)
                    // the engine sentinels are the backend sentinels
                    .level_count(info.num_mip_levels)
                    .base_array_layer(info.first_array_layer)
                    .layer_count(info.num_array_layers),
            );
        let vk_view =
            unsafe { self.shared.device.create_image_view(&create_info, None) }.status()?;
        self.shared.set_object_name(info.label, vk_view);

        let mut stored = info.clone();
        if stored.num_mip_levels == crate::REMAINING_MIP_LEVELS {
            stored.num_mip_levels = image_info.mip_levels - stored.first_mip_level;
        }
        if stored.num_array_layers == crate::REMAINING_ARRAY_LAYERS {
            stored.num_array_layers = image_info.array_layers - stored.first_array_layer;
        }

        Ok(ImageView {
            res: Arc::new(ImageViewResource {
                label: info.label,
                info: stored,
                dev: Arc::clone(&self.shared),
                vk_view,
            }),
        })
    }

    pub fn create_sampler(&self, info: &SamplerInfo) -> Result<Sampler> {
        if info.anisotropy_enable {
            assert!(
                info.max_anisotropy >= 1.0 && info.max_anisotropy <= MAX_SAMPLER_ANISOTROPY,
                "max anisotropy out of range"
            );
        }
        let create_info = vk::SamplerCreateInfo::default()
            .mag_filter(info.mag_filter.to_vk())
            .min_filter(info.min_filter.to_vk())
            .mipmap_mode(info.mip_map_mode.to_vk())
            .address_mode_u(info.address_mode_u.to_vk())
            .address_mode_v(info.address_mode_v.to_vk())
            .address_mode_w(info.address_mode_w.to_vk())
            .mip_lod_bias(info.mip_lod_bias)
            .anisotropy_enable(info.anisotropy_enable)
            .max_anisotropy(info.max_anisotropy)
            .compare_enable(info.compare_enable)
            .compare_op(info.compare_op.to_vk())
            .min_lod(info.min_lod)
            .max_lod(info.max_lod)
            .border_color(info.border_color.to_vk())
            .unnormalized_coordinates(info.unnormalized_coordinates);
        let vk_sampler =
            unsafe { self.shared.device.create_sampler(&create_info, None) }.status()?;
        self.shared.set_object_name(info.label, vk_sampler);
        Ok(Sampler {
            res: Arc::new(SamplerResource {
                label: info.label,
                dev: Arc::clone(&self.shared),
                vk_sampler,
            }),
        })
    }

    pub fn create_shader(&self, info: &ShaderInfo) -> Result<Shader> {
        pipeline::create_shader(Arc::clone(&self.shared), info)
    }

    pub fn create_descriptor_set_layout(
        &self,
        info: &DescriptorSetLayoutInfo,
    ) -> Result<DescriptorSetLayout> {
        descriptor::create_descriptor_set_layout(Arc::clone(&self.shared), info)
    }

    pub fn create_descriptor_set(
        &mut self,
        layout: &DescriptorSetLayout,
        variable_lengths: &[u32],
    ) -> Result<DescriptorSet> {
        descriptor::create_descriptor_set(
            Arc::clone(&self.shared),
            &self.heap,
            layout,
            variable_lengths,
        )
    }

    pub fn update_descriptor_set(&self, set: &DescriptorSet, update: &DescriptorSetUpdate) {
        descriptor::update_descriptor_set(&self.shared, set, update);
    }

    pub fn create_pipeline_cache(&self, info: &PipelineCacheInfo) -> Result<PipelineCache> {
        let create_info = vk::PipelineCacheCreateInfo::default().initial_data(info.initial_data);
        let vk_cache =
            unsafe { self.shared.device.create_pipeline_cache(&create_info, None) }.status()?;
        self.shared.set_object_name(info.label, vk_cache);
        Ok(PipelineCache {
            res: Arc::new(PipelineCacheResource {
                label: info.label,
                dev: Arc::clone(&self.shared),
                vk_cache,
            }),
        })
    }

    pub fn get_pipeline_cache_size(&self, cache: &PipelineCache) -> Result<usize> {
        self.get_pipeline_cache_data(cache).map(|data| data.len())
    }

    pub fn get_pipeline_cache_data(&self, cache: &PipelineCache) -> Result<Vec<u8>> {
        unsafe { self.shared.device.get_pipeline_cache_data(cache.vk()) }.status()
    }

    pub fn merge_pipeline_cache(&self, dst: &PipelineCache, srcs: &[PipelineCache]) -> Result<()> {
        let vk_srcs: Vec<vk::PipelineCache> = srcs.iter().map(|cache| cache.vk()).collect();
        unsafe { self.shared.device.merge_pipeline_caches(dst.vk(), &vk_srcs) }.status()
    }

    pub fn create_compute_pipeline(&self, info: &ComputePipelineInfo) -> Result<ComputePipeline> {
        pipeline::create_compute_pipeline(Arc::clone(&self.shared), info)
    }

    pub fn create_graphics_pipeline(
        &self,
        info: &GraphicsPipelineInfo,
    ) -> Result<GraphicsPipeline> {
        pipeline::create_graphics_pipeline(Arc::clone(&self.shared), info)
    }

    pub fn create_swapchain(&self, surface: &Surface, info: &SwapchainInfo) -> Result<Swapchain> {
        Ok(swapchain::create_swapchain(
            Arc::clone(&self.shared),
            surface,
            info,
        ))
    }

    pub fn create_timestamp_query(&self) -> Result<TimestampQuery> {
        let create_info = vk::QueryPoolCreateInfo::default()
            .query_type(vk::QueryType::TIMESTAMP)
            .query_count(1);
        let vk_pool =
            unsafe { self.shared.device.create_query_pool(&create_info, None) }.status()?;
        Ok(TimestampQuery {
            res: Arc::new(QueryResource {
                dev: Arc::clone(&self.shared),
                vk_pool,
            }),
        })
    }

    pub fn create_statistics_query(&self) -> Result<StatisticsQuery> {
        let create_info = vk::QueryPoolCreateInfo::default()
            .query_type(vk::QueryType::PIPELINE_STATISTICS)
            .query_count(1)
            .pipeline_statistics(STATISTICS_FLAGS);
        let vk_pool =
            unsafe { self.shared.device.create_query_pool(&create_info, None) }.status()?;
        Ok(StatisticsQuery {
            res: Arc::new(QueryResource {
                dev: Arc::clone(&self.shared),
                vk_pool,
            }),
        })
    }

    // ------------------------------------------------------------------
    // host memory access

    /// Returns the persistent mapping of a host-mapped buffer.
    pub fn map_buffer_memory(&self, buffer: &Buffer) -> Result<*mut u8> {
        assert!(buffer.is_host_mapped(), "buffer is not host-mapped");
        Ok(buffer.res.mapped)
    }

    pub fn unmap_buffer_memory(&self, buffer: &Buffer) {
        // the mapping is persistent for the buffer's lifetime
        assert!(buffer.is_host_mapped(), "buffer is not host-mapped");
    }

    pub fn invalidate_mapped_buffer_memory(
        &self,
        buffer: &Buffer,
        offset: u64,
        size: u64,
    ) -> Result<()> {
        assert!(buffer.is_host_mapped(), "buffer is not host-mapped");
        let range = vk::MappedMemoryRange::default()
            .memory(buffer.res.memory)
            .offset(offset)
            .size(size);
        unsafe { self.shared.device.invalidate_mapped_memory_ranges(&[range]) }.status()
    }

    pub fn flush_mapped_buffer_memory(&self, buffer: &Buffer, offset: u64, size: u64) -> Result<()> {
        assert!(buffer.is_host_mapped(), "buffer is not host-mapped");
        let range = vk::MappedMemoryRange::default()
            .memory(buffer.res.memory)
            .offset(offset)
            .size(size);
        unsafe { self.shared.device.flush_mapped_memory_ranges(&[range]) }.status()
    }

    // ------------------------------------------------------------------
    // surface and swapchain queries

    pub fn get_surface_formats(&self, surface: &Surface) -> Result<Vec<SurfaceFormat>> {
        let formats = unsafe {
            self.shared
                .instance
                .surface_loader
                .get_physical_device_surface_formats(self.shared.phy_dev.raw, surface.vk())
        }
        .status()?;
        Ok(formats
            .iter()
            .filter_map(|format| {
                let engine_format = Format::from_vk(format.format)?;
                Some(SurfaceFormat {
                    format: engine_format,
                    color_space: ColorSpace::from_vk(format.color_space),
                })
            })
            .collect())
    }

    pub fn get_surface_present_modes(&self, surface: &Surface) -> Result<Vec<PresentMode>> {
        let modes = unsafe {
            self.shared
                .instance
                .surface_loader
                .get_physical_device_surface_present_modes(self.shared.phy_dev.raw, surface.vk())
        }
        .status()?;
        Ok(modes
            .iter()
            .filter_map(|&mode| match mode {
                vk::PresentModeKHR::IMMEDIATE => Some(PresentMode::Immediate),
                vk::PresentModeKHR::MAILBOX => Some(PresentMode::Mailbox),
                vk::PresentModeKHR::FIFO => Some(PresentMode::Fifo),
                vk::PresentModeKHR::FIFO_RELAXED => Some(PresentMode::FifoRelaxed),
                _ => None,
            })
            .collect())
    }

    pub fn get_surface_capabilities(&self, surface: &Surface) -> Result<SurfaceCapabilities> {
        let capabilities = unsafe {
            self.shared
                .instance
                .surface_loader
                .get_physical_device_surface_capabilities(self.shared.phy_dev.raw, surface.vk())
        }
        .status()?;
        Ok(SurfaceCapabilities {
            image_usage: ImageUsage::from_vk(capabilities.supported_usage_flags),
            composite_alpha: crate::CompositeAlpha::from_vk(
                capabilities.supported_composite_alpha,
            ),
        })
    }

    pub fn get_swapchain_state(&self, swapchain: &Swapchain) -> SwapchainState {
        let sc = swapchain.lock();
        SwapchainState {
            extent: sc.extent,
            format: sc.format,
            images: sc.images.clone(),
            current_image: sc.current_image,
        }
    }

    /// Updates the desired configuration; backend objects are untouched until
    /// the next `begin_frame` observes the dropped optimal flag.
    pub fn invalidate_swapchain(&self, swapchain: &Swapchain, info: &SwapchainInfo) {
        assert!(info.preferred_extent.width > 0 && info.preferred_extent.height > 0);
        assert!(info.preferred_buffering <= crate::MAX_SWAPCHAIN_IMAGES);
        let mut sc = swapchain.lock();
        sc.info = *info;
        sc.is_optimal = false;
    }

    // ------------------------------------------------------------------
    // query readback

    pub fn get_timestamp_query_result(&self, query: &TimestampQuery) -> Result<u64> {
        let mut result = [0u64; 1];
        unsafe {
            self.shared.device.get_query_pool_results(
                query.vk(),
                0,
                &mut result,
                vk::QueryResultFlags::TYPE_64 | vk::QueryResultFlags::WAIT,
            )
        }
        .status()?;
        Ok(result[0])
    }

    pub fn get_statistics_query_result(
        &self,
        query: &StatisticsQuery,
    ) -> Result<PipelineStatistics> {
        let mut result = [0u64; 7];
        unsafe {
            self.shared.device.get_query_pool_results(
                query.vk(),
                0,
                &mut result,
                vk::QueryResultFlags::TYPE_64 | vk::QueryResultFlags::WAIT,
            )
        }
        .status()?;
        Ok(PipelineStatistics {
            input_assembly_vertices: result[0],
            input_assembly_primitives: result[1],
            vertex_shader_invocations: result[2],
            clipping_invocations: result[3],
            clipping_primitives: result[4],
            fragment_shader_invocations: result[5],
            compute_shader_invocations: result[6],
        })
    }

    pub fn wait_idle(&self) -> Result<()> {
        unsafe { self.shared.device.device_wait_idle() }.status()
    }

    pub fn wait_queue_idle(&self) -> Result<()> {
        unsafe { self.shared.device.queue_wait_idle(self.shared.queue) }.status()
    }

    // ------------------------------------------------------------------
    // frame pipelining

    pub fn get_frame_context(&self) -> FrameInfo {
        FrameInfo {
            buffering: self.frame.buffering,
            current_frame: self.frame.current_frame,
            tail_frame: self.frame.tail_frame,
            ring_index: self.frame.ring_index,
        }
    }

    /// The command encoder of the current ring slot. Valid to record into
    /// between `begin_frame` and `submit_frame`.
    pub fn encoder_mut(&mut self) -> &mut CommandEncoder {
        let ring = self.frame.ring_index();
        &mut self.frame.encoders[ring]
    }

    /// Waits for the ring slot's previous submission, rebuilds the swapchain
    /// if it was invalidated, acquires the next image (tolerating failure),
    /// and opens the slot's encoder for recording.
    pub fn begin_frame(&mut self, swapchain: Option<&Swapchain>) -> Result<()> {
        let ring = self.frame.ring_index();
        let submit_fence = self.frame.submit_fences[ring];
        let acquire_semaphore = self.frame.acquire_semaphores[ring];

        assert!(
            !self.frame.encoders[ring].is_recording(),
            "frame already begun for this slot"
        );

        unsafe {
            self.shared
                .device
                .wait_for_fences(&[submit_fence], true, u64::MAX)
                .status()?;
            self.shared.device.reset_fences(&[submit_fence]).status()?;
        }

        if let Some(sc) = swapchain {
            let needs_recreation = {
                let inner = sc.lock();
                inner.is_out_of_date
                    || !inner.is_optimal
                    || inner.vk_swapchain == vk::SwapchainKHR::null()
            };
            if needs_recreation {
                // the retiring swapchain may still be referenced by queued
                // work
                unsafe { self.shared.device.device_wait_idle() }.status()?;
                swapchain::recreate(sc)?;
            }

            let (is_zero_sized, vk_swapchain) = {
                let inner = sc.lock();
                (inner.is_zero_sized, inner.vk_swapchain)
            };
            if !is_zero_sized {
                let acquired = unsafe {
                    self.shared.swapchain_loader.acquire_next_image(
                        vk_swapchain,
                        u64::MAX,
                        acquire_semaphore,
                        vk::Fence::null(),
                    )
                };
                let mut inner = sc.lock();
                match acquired {
                    Ok((index, suboptimal)) => {
                        if suboptimal {
                            log::warn!("swapchain image acquired suboptimal");
                            inner.is_optimal = false;
                        }
                        inner.current_image = Some(index);
                    }
                    Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                        // not an error: the frame continues offscreen and the
                        // next begin_frame rebuilds
                        log::warn!("swapchain out of date at acquire");
                        inner.is_out_of_date = true;
                        inner.current_image = None;
                    }
                    Err(result) => return Err(result.into()),
                }
            } else {
                sc.lock().current_image = None;
            }
        }

        self.frame.encoders[ring].begin()?;
        self.frame.swapchain = swapchain.cloned();
        Ok(())
    }

    /// Transitions the acquired image for present, submits the slot's
    /// commands, presents, and advances the ring.
    pub fn submit_frame(&mut self, swapchain: Option<&Swapchain>) -> Result<()> {
        let ring = self.frame.ring_index();
        let submit_fence = self.frame.submit_fences[ring];
        let acquire_semaphore = self.frame.acquire_semaphores[ring];
        let submit_semaphore = self.frame.submit_semaphores[ring];

        match (swapchain, &self.frame.swapchain) {
            (None, None) => {}
            (Some(given), Some(begun)) => {
                assert!(
                    given.same_resource(begun),
                    "submit_frame swapchain differs from begin_frame"
                );
            }
            _ => panic!("submit_frame swapchain differs from begin_frame"),
        }

        let (present_image, vk_swapchain, image_index, can_present) = match swapchain {
            Some(sc) => {
                let inner = sc.lock();
                let image = inner
                    .current_image
                    .map(|index| inner.images[index as usize].clone());
                let can_present =
                    !inner.is_out_of_date && !inner.is_zero_sized && image.is_some();
                (
                    image,
                    inner.vk_swapchain,
                    inner.current_image.unwrap_or(0),
                    can_present,
                )
            }
            None => (None, vk::SwapchainKHR::null(), 0, false),
        };
        let was_acquired = present_image.is_some();

        {
            let encoder = &mut self.frame.encoders[ring];
            assert!(encoder.is_recording(), "submit_frame without begin_frame");
            if let Some(ref image) = present_image {
                // store-op writes already flushed caches; present only needs
                // the layout
                encoder.access_image_all_aspects(
                    image,
                    vk::PipelineStageFlags::BOTTOM_OF_PIPE,
                    vk::AccessFlags::NONE,
                    vk::ImageLayout::PRESENT_SRC_KHR,
                );
            }
            encoder.end()?;
            encoder
                .status()
                .expect("encoder recorded an error before submission");
        }

        let vk_cmd = self.frame.encoders[ring].vk_cmd;
        let wait_semaphores = [acquire_semaphore];
        let wait_stages = [vk::PipelineStageFlags::ALL_COMMANDS];
        let signal_semaphores = [submit_semaphore];
        let command_buffers = [vk_cmd];
        let mut submit_info = vk::SubmitInfo::default().command_buffers(&command_buffers);
        if was_acquired {
            submit_info = submit_info
                .wait_semaphores(&wait_semaphores)
                .wait_dst_stage_mask(&wait_stages);
        }
        if can_present {
            submit_info = submit_info.signal_semaphores(&signal_semaphores);
        }

        unsafe {
            self.shared
                .device
                .queue_submit(self.shared.queue, &[submit_info], submit_fence)
                .status()?;
        }

        // advance even when presentation is skipped; the frame is just missed
        self.frame.advance();
        self.frame.swapchain = None;

        if can_present {
            let swapchains = [vk_swapchain];
            let image_indices = [image_index];
            let present_info = vk::PresentInfoKHR::default()
                .wait_semaphores(&signal_semaphores)
                .swapchains(&swapchains)
                .image_indices(&image_indices);
            let presented = unsafe {
                self.shared
                    .swapchain_loader
                    .queue_present(self.shared.queue, &present_info)
            };
            let sc = swapchain.expect("can_present implies a swapchain");
            let mut inner = sc.lock();
            match presented {
                Ok(false) => {}
                Ok(true) => {
                    log::warn!("swapchain suboptimal at present");
                    inner.is_optimal = false;
                }
                Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                    log::warn!("swapchain out of date at present");
                    inner.is_out_of_date = true;
                }
                Err(result) => return Err(result.into()),
            }
        }

        Ok(())
    }
}
