//! Descriptor set layouts, the pool-of-pools descriptor heap, and descriptor
//! sets with sync back-references.
//!
//! The heap grows by whole pools; each pool tracks per-descriptor-type
//! remaining capacity so allocation never fragments a backend pool. Sets keep
//! a back-reference to every bound buffer/image, which is what lets the
//! command encoder walk bindings at draw/dispatch time and synthesize
//! barriers for them.

use std::sync::{Arc, Mutex, MutexGuard};

use ash::vk;

use crate::buffer::is_valid_buffer_access;
use crate::device::DeviceShared;
use crate::error::{Result, VkResultExt};
use crate::{
    Buffer, BufferUsage, DescriptorBindingInfo, DescriptorSetLayoutInfo, DescriptorSetUpdate,
    DescriptorType, Image, ImageUsage, Label, MAX_BINDING_DESCRIPTORS,
    MAX_DESCRIPTOR_SET_BINDINGS, MAX_DESCRIPTOR_SET_DESCRIPTORS,
    MAX_PIPELINE_DYNAMIC_STORAGE_BUFFERS, MAX_PIPELINE_DYNAMIC_UNIFORM_BUFFERS,
    NUM_DESCRIPTOR_TYPES,
};

pub(crate) struct DescriptorSetLayoutResource {
    pub(crate) label: Label,
    pub(crate) dev: Arc<DeviceShared>,
    pub(crate) vk_layout: vk::DescriptorSetLayout,
    pub(crate) bindings: Vec<DescriptorBindingInfo>,
    pub(crate) num_variable_length: u32,
}

impl Drop for DescriptorSetLayoutResource {
    fn drop(&mut self) {
        unsafe {
            self.dev
                .device
                .destroy_descriptor_set_layout(self.vk_layout, None);
        }
    }
}

#[derive(Clone)]
pub struct DescriptorSetLayout {
    pub(crate) res: Arc<DescriptorSetLayoutResource>,
}

impl DescriptorSetLayout {
    pub fn label(&self) -> Label {
        self.res.label
    }

    pub fn bindings(&self) -> &[DescriptorBindingInfo] {
        &self.res.bindings
    }

    pub(crate) fn vk(&self) -> vk::DescriptorSetLayout {
        self.res.vk_layout
    }
}

impl std::fmt::Debug for DescriptorSetLayout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DescriptorSetLayout")
            .field("label", &self.res.label)
            .field("bindings", &self.res.bindings)
            .finish_non_exhaustive()
    }
}

pub(crate) fn create_descriptor_set_layout(
    dev: Arc<DeviceShared>,
    info: &DescriptorSetLayoutInfo,
) -> Result<DescriptorSetLayout> {
    let num_bindings = info.bindings.len() as u32;
    let mut num_descriptors = 0u32;
    let mut num_variable_length = 0u32;
    let mut sizing = [0u32; NUM_DESCRIPTOR_TYPES];

    for binding in info.bindings {
        num_descriptors += binding.count;
        sizing[binding.ty as usize] += binding.count;
        num_variable_length += u32::from(binding.is_variable_length);
    }

    let num_dynamic_uniform_buffers = sizing[DescriptorType::DynamicUniformBuffer as usize];
    let num_dynamic_storage_buffers = sizing[DescriptorType::DynamicStorageBuffer as usize];

    assert!(num_bindings > 0, "descriptor set layout has no bindings");
    assert!(
        num_bindings <= MAX_DESCRIPTOR_SET_BINDINGS,
        "too many descriptor set bindings"
    );
    assert!(
        num_dynamic_uniform_buffers <= MAX_PIPELINE_DYNAMIC_UNIFORM_BUFFERS,
        "too many dynamic uniform buffers"
    );
    assert!(
        num_dynamic_storage_buffers <= MAX_PIPELINE_DYNAMIC_STORAGE_BUFFERS,
        "too many dynamic storage buffers"
    );
    assert!(
        num_descriptors <= MAX_DESCRIPTOR_SET_DESCRIPTORS,
        "too many descriptors in set"
    );
    assert!(
        num_variable_length <= 1,
        "at most one variable-length binding"
    );
    assert!(
        num_variable_length == 0
            || (num_dynamic_storage_buffers == 0 && num_dynamic_uniform_buffers == 0),
        "variable-length bindings may not be mixed with dynamic buffers"
    );

    for (i, binding) in info.bindings.iter().enumerate() {
        assert!(binding.count > 0, "binding {i} has zero descriptors");
        assert!(
            binding.count <= MAX_BINDING_DESCRIPTORS,
            "binding {i} exceeds MAX_BINDING_DESCRIPTORS"
        );
        assert!(
            !binding.is_variable_length || i == info.bindings.len() - 1,
            "variable-length binding must be the last binding"
        );
    }

    let mut vk_bindings = Vec::with_capacity(info.bindings.len());
    let mut vk_binding_flags = Vec::with_capacity(info.bindings.len());
    for (i, binding) in info.bindings.iter().enumerate() {
        let stage_flags = if binding.ty == DescriptorType::InputAttachment {
            vk::ShaderStageFlags::FRAGMENT
        } else {
            vk::ShaderStageFlags::ALL
        };
        vk_bindings.push(
            vk::DescriptorSetLayoutBinding::default()
                .binding(i as u32)
                .descriptor_type(binding.ty.to_vk())
                .descriptor_count(binding.count)
                .stage_flags(stage_flags),
        );
        let mut flags = vk::DescriptorBindingFlags::UPDATE_UNUSED_WHILE_PENDING
            | vk::DescriptorBindingFlags::PARTIALLY_BOUND;
        if binding.is_variable_length {
            flags |= vk::DescriptorBindingFlags::VARIABLE_DESCRIPTOR_COUNT;
        }
        vk_binding_flags.push(flags);
    }

    let mut flags_info = vk::DescriptorSetLayoutBindingFlagsCreateInfo::default()
        .binding_flags(&vk_binding_flags);
    let create_info = vk::DescriptorSetLayoutCreateInfo::default()
        .flags(vk::DescriptorSetLayoutCreateFlags::UPDATE_AFTER_BIND_POOL)
        .bindings(&vk_bindings)
        .push_next(&mut flags_info);

    let vk_layout =
        unsafe { dev.device.create_descriptor_set_layout(&create_info, None) }.status()?;
    dev.set_object_name(info.label, vk_layout);

    Ok(DescriptorSetLayout {
        res: Arc::new(DescriptorSetLayoutResource {
            label: info.label,
            dev,
            vk_layout,
            bindings: info.bindings.to_vec(),
            num_variable_length,
        }),
    })
}

/// One resource bound into a descriptor element, mirrored for barrier
/// synthesis.
#[derive(Clone, Default)]
pub(crate) enum SyncResource {
    #[default]
    None,
    Buffer(Buffer),
    Image(Image),
}

pub(crate) struct DescriptorBinding {
    pub(crate) ty: DescriptorType,
    /// Instantiated length; for variable-length bindings this is the chosen
    /// length, bounded by the layout's `max_count`.
    pub(crate) count: u32,
    #[allow(dead_code)]
    pub(crate) max_count: u32,
    #[allow(dead_code)]
    pub(crate) is_variable_length: bool,
    /// Empty for sampler bindings; `count` entries otherwise.
    pub(crate) sync_resources: Vec<SyncResource>,
}

pub(crate) struct PoolEntry {
    pub(crate) vk_pool: vk::DescriptorPool,
    pub(crate) avail: [u32; NUM_DESCRIPTOR_TYPES],
}

pub(crate) struct HeapInner {
    pub(crate) pools: Vec<PoolEntry>,
    pub(crate) pool_size: u32,
}

impl HeapInner {
    pub(crate) fn destroy(&mut self, dev: &DeviceShared) {
        for pool in self.pools.drain(..) {
            unsafe {
                dev.device.destroy_descriptor_pool(pool.vk_pool, None);
            }
        }
    }
}

/// Application-managed collection of backend descriptor pools; grows by whole
/// pools and never frees them back.
pub(crate) struct DescriptorHeap {
    pub(crate) inner: Arc<Mutex<HeapInner>>,
}

impl DescriptorHeap {
    pub(crate) fn new(pool_size: u32) -> Self {
        Self {
            inner: Arc::new(Mutex::new(HeapInner {
                pools: Vec::new(),
                pool_size,
            })),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, HeapInner> {
        self.inner.lock().expect("descriptor heap poisoned")
    }
}

/// Per-type descriptor demand of a set instantiated from `bindings` with the
/// given variable lengths substituted into the variable-length binding.
pub(crate) fn descriptor_usage(
    bindings: &[DescriptorBindingInfo],
    variable_lengths: &[u32],
) -> ([u32; NUM_DESCRIPTOR_TYPES], Vec<u32>) {
    let mut usage = [0u32; NUM_DESCRIPTOR_TYPES];
    let mut binding_sizes = Vec::with_capacity(bindings.len());
    let mut vla_idx = 0;
    for binding in bindings {
        let count = if binding.is_variable_length {
            let count = variable_lengths[vla_idx];
            vla_idx += 1;
            count
        } else {
            binding.count
        };
        usage[binding.ty as usize] += count;
        binding_sizes.push(count);
    }
    (usage, binding_sizes)
}

/// A pool can host the set only when every requested type fits its remaining
/// capacity.
pub(crate) fn pool_fits(avail: &[u32; NUM_DESCRIPTOR_TYPES], usage: &[u32; NUM_DESCRIPTOR_TYPES]) -> bool {
    avail.iter().zip(usage.iter()).all(|(a, u)| u <= a)
}

pub(crate) struct DescriptorSetResource {
    pub(crate) dev: Arc<DeviceShared>,
    pub(crate) heap: Arc<Mutex<HeapInner>>,
    pub(crate) vk_set: vk::DescriptorSet,
    pub(crate) pool_index: usize,
    pub(crate) usage: [u32; NUM_DESCRIPTOR_TYPES],
    pub(crate) bindings: Mutex<Vec<DescriptorBinding>>,
}

impl Drop for DescriptorSetResource {
    fn drop(&mut self) {
        let mut heap = self.heap.lock().expect("descriptor heap poisoned");
        // the pool is gone when the set outlived its device
        let Some(pool) = heap.pools.get_mut(self.pool_index) else {
            return;
        };
        unsafe {
            // pools are created with FREE_DESCRIPTOR_SET
            let _ = self
                .dev
                .device
                .free_descriptor_sets(pool.vk_pool, &[self.vk_set]);
        }
        for (avail, used) in pool.avail.iter_mut().zip(self.usage.iter()) {
            *avail += used;
        }
    }
}

/// Opaque shared handle to a descriptor set.
#[derive(Clone)]
pub struct DescriptorSet {
    pub(crate) res: Arc<DescriptorSetResource>,
}

impl DescriptorSet {
    pub(crate) fn vk(&self) -> vk::DescriptorSet {
        self.res.vk_set
    }

    pub(crate) fn bindings(&self) -> MutexGuard<'_, Vec<DescriptorBinding>> {
        self.res.bindings.lock().expect("descriptor set poisoned")
    }
}

impl std::fmt::Debug for DescriptorSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DescriptorSet")
            .field("pool_index", &self.res.pool_index)
            .finish_non_exhaustive()
    }
}

fn binding_holds_resources(ty: DescriptorType) -> bool {
    ty != DescriptorType::Sampler
}

pub(crate) fn create_descriptor_set(
    dev: Arc<DeviceShared>,
    heap: &DescriptorHeap,
    layout: &DescriptorSetLayout,
    variable_lengths: &[u32],
) -> Result<DescriptorSet> {
    assert_eq!(
        variable_lengths.len() as u32,
        layout.res.num_variable_length,
        "variable length count must match the layout"
    );

    {
        let mut vla_idx = 0;
        for binding in &layout.res.bindings {
            if binding.is_variable_length {
                assert!(
                    variable_lengths[vla_idx] <= binding.count,
                    "variable length exceeds binding capacity"
                );
                vla_idx += 1;
            }
        }
    }

    let (usage, binding_sizes) = descriptor_usage(&layout.res.bindings, variable_lengths);

    let mut inner = heap.lock();
    let pool_index = match inner
        .pools
        .iter()
        .position(|pool| pool_fits(&pool.avail, &usage))
    {
        Some(index) => index,
        None => {
            // grow by one pool of fixed size
            let pool_size = inner.pool_size;
            let sizes: Vec<vk::DescriptorPoolSize> = (0..NUM_DESCRIPTOR_TYPES)
                .map(|ty| {
                    vk::DescriptorPoolSize::default()
                        .ty(vk::DescriptorType::from_raw(ty as i32))
                        .descriptor_count(pool_size)
                })
                .collect();
            let create_info = vk::DescriptorPoolCreateInfo::default()
                .flags(
                    vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET
                        | vk::DescriptorPoolCreateFlags::UPDATE_AFTER_BIND,
                )
                .max_sets(pool_size * NUM_DESCRIPTOR_TYPES as u32)
                .pool_sizes(&sizes);
            let vk_pool =
                unsafe { dev.device.create_descriptor_pool(&create_info, None) }.status()?;
            inner.pools.push(PoolEntry {
                vk_pool,
                avail: [pool_size; NUM_DESCRIPTOR_TYPES],
            });
            inner.pools.len() - 1
        }
    };

    let mut var_info = vk::DescriptorSetVariableDescriptorCountAllocateInfo::default()
        .descriptor_counts(variable_lengths);
    let vk_layout = layout.res.vk_layout;
    let alloc_info = vk::DescriptorSetAllocateInfo::default()
        .descriptor_pool(inner.pools[pool_index].vk_pool)
        .set_layouts(std::slice::from_ref(&vk_layout))
        .push_next(&mut var_info);

    let sets = unsafe { dev.device.allocate_descriptor_sets(&alloc_info) };
    let vk_set = match sets {
        Ok(sets) => sets[0],
        Err(result) => {
            // the growth policy guarantees capacity; these are heap bugs
            assert!(
                result != vk::Result::ERROR_OUT_OF_POOL_MEMORY
                    && result != vk::Result::ERROR_FRAGMENTED_POOL,
                "descriptor heap accounting violated: {result:?}"
            );
            return Err(result.into());
        }
    };

    for (avail, used) in inner.pools[pool_index].avail.iter_mut().zip(usage.iter()) {
        *avail -= used;
    }
    drop(inner);

    let bindings: Vec<DescriptorBinding> = layout
        .res
        .bindings
        .iter()
        .zip(binding_sizes.iter())
        .map(|(info, &count)| DescriptorBinding {
            ty: info.ty,
            count,
            max_count: info.count,
            is_variable_length: info.is_variable_length,
            sync_resources: if binding_holds_resources(info.ty) {
                vec![SyncResource::None; count as usize]
            } else {
                Vec::new()
            },
        })
        .collect();

    dev.set_object_name(layout.res.label, vk_set);

    Ok(DescriptorSet {
        res: Arc::new(DescriptorSetResource {
            dev,
            heap: Arc::clone(&heap.inner),
            vk_set,
            pool_index,
            usage,
            bindings: Mutex::new(bindings),
        }),
    })
}

pub(crate) fn update_descriptor_set(
    dev: &DeviceShared,
    set: &DescriptorSet,
    update: &DescriptorSetUpdate,
) {
    let limits = dev.limits();
    let ubo_offset_alignment = limits.min_uniform_buffer_offset_alignment;
    let ssbo_offset_alignment = limits.min_storage_buffer_offset_alignment;

    let mut bindings = set.bindings();
    let binding = bindings
        .get_mut(update.binding as usize)
        .expect("descriptor binding out of range");
    assert!(
        update.element < binding.count,
        "descriptor element out of range"
    );

    // usage/alignment validation per descriptor class
    match binding.ty {
        DescriptorType::UniformBuffer | DescriptorType::DynamicUniformBuffer => {
            for b in update.buffers {
                if let Some(ref buffer) = b.buffer {
                    assert!(
                        buffer.usage().contains(BufferUsage::UNIFORM_BUFFER),
                        "descriptor requires a uniform buffer"
                    );
                    assert!(
                        is_valid_buffer_access(
                            buffer.size(),
                            b.offset,
                            b.size,
                            ubo_offset_alignment
                        ),
                        "uniform buffer binding range invalid"
                    );
                }
            }
        }
        DescriptorType::StorageBuffer | DescriptorType::DynamicStorageBuffer => {
            for b in update.buffers {
                if let Some(ref buffer) = b.buffer {
                    assert!(
                        buffer.usage().contains(BufferUsage::STORAGE_BUFFER),
                        "descriptor requires a storage buffer"
                    );
                    assert!(
                        is_valid_buffer_access(
                            buffer.size(),
                            b.offset,
                            b.size,
                            ssbo_offset_alignment
                        ),
                        "storage buffer binding range invalid"
                    );
                }
            }
        }
        DescriptorType::SampledImage
        | DescriptorType::CombinedImageSampler
        | DescriptorType::InputAttachment => {
            for image in update.images {
                if let Some(ref view) = image.image_view {
                    assert!(
                        view.image().info().usage.contains(ImageUsage::SAMPLED),
                        "descriptor requires a sampled image"
                    );
                }
            }
        }
        DescriptorType::StorageImage => {
            for image in update.images {
                if let Some(ref view) = image.image_view {
                    assert!(
                        view.image().info().usage.contains(ImageUsage::STORAGE),
                        "descriptor requires a storage image"
                    );
                }
            }
        }
        DescriptorType::UniformTexelBuffer => {
            for view in update.texel_buffers.iter().flatten() {
                assert!(
                    view.buffer()
                        .usage()
                        .contains(BufferUsage::UNIFORM_TEXEL_BUFFER),
                    "descriptor requires a uniform texel buffer"
                );
            }
        }
        DescriptorType::StorageTexelBuffer => {
            for view in update.texel_buffers.iter().flatten() {
                assert!(
                    view.buffer()
                        .usage()
                        .contains(BufferUsage::STORAGE_TEXEL_BUFFER),
                    "descriptor requires a storage texel buffer"
                );
            }
        }
        DescriptorType::Sampler => {}
    }

    let mut buffer_infos = Vec::new();
    let mut image_infos = Vec::new();
    let mut texel_views = Vec::new();

    let count = match binding.ty {
        DescriptorType::UniformBuffer
        | DescriptorType::DynamicUniformBuffer
        | DescriptorType::StorageBuffer
        | DescriptorType::DynamicStorageBuffer => {
            assert!(
                update.element as usize + update.buffers.len() <= binding.count as usize,
                "descriptor write overruns the binding"
            );
            buffer_infos.extend(update.buffers.iter().map(|b| {
                vk::DescriptorBufferInfo::default()
                    .buffer(
                        b.buffer
                            .as_ref()
                            .map(|buffer| buffer.vk())
                            .unwrap_or(vk::Buffer::null()),
                    )
                    .offset(b.offset)
                    .range(b.size)
            }));
            update.buffers.len()
        }
        DescriptorType::UniformTexelBuffer | DescriptorType::StorageTexelBuffer => {
            assert!(
                update.element as usize + update.texel_buffers.len() <= binding.count as usize,
                "descriptor write overruns the binding"
            );
            texel_views.extend(update.texel_buffers.iter().map(|view| {
                view.as_ref()
                    .map(|view| view.vk())
                    .unwrap_or(vk::BufferView::null())
            }));
            update.texel_buffers.len()
        }
        DescriptorType::Sampler => {
            assert!(
                update.element as usize + update.images.len() <= binding.count as usize,
                "descriptor write overruns the binding"
            );
            image_infos.extend(update.images.iter().map(|image| {
                vk::DescriptorImageInfo::default().sampler(
                    image
                        .sampler
                        .as_ref()
                        .map(|sampler| sampler.vk())
                        .unwrap_or(vk::Sampler::null()),
                )
            }));
            update.images.len()
        }
        DescriptorType::SampledImage
        | DescriptorType::CombinedImageSampler
        | DescriptorType::StorageImage
        | DescriptorType::InputAttachment => {
            assert!(
                update.element as usize + update.images.len() <= binding.count as usize,
                "descriptor write overruns the binding"
            );
            let layout = if binding.ty == DescriptorType::StorageImage {
                vk::ImageLayout::GENERAL
            } else {
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
            };
            image_infos.extend(update.images.iter().map(|image| {
                vk::DescriptorImageInfo::default()
                    .sampler(
                        image
                            .sampler
                            .as_ref()
                            .map(|sampler| sampler.vk())
                            .unwrap_or(vk::Sampler::null()),
                    )
                    .image_view(
                        image
                            .image_view
                            .as_ref()
                            .map(|view| view.vk())
                            .unwrap_or(vk::ImageView::null()),
                    )
                    .image_layout(layout)
            }));
            update.images.len()
        }
    };

    if count == 0 {
        return;
    }

    let mut write = vk::WriteDescriptorSet::default()
        .dst_set(set.vk())
        .dst_binding(update.binding)
        .dst_array_element(update.element)
        .descriptor_type(binding.ty.to_vk());
    if !buffer_infos.is_empty() {
        write = write.buffer_info(&buffer_infos);
    } else if !image_infos.is_empty() {
        write = write.image_info(&image_infos);
    } else if !texel_views.is_empty() {
        write = write.texel_buffer_view(&texel_views);
    }

    unsafe {
        dev.device.update_descriptor_sets(&[write], &[]);
    }

    // mirror the bound resources for the encoder's barrier pre-pass
    match binding.ty {
        DescriptorType::UniformBuffer
        | DescriptorType::DynamicUniformBuffer
        | DescriptorType::StorageBuffer
        | DescriptorType::DynamicStorageBuffer => {
            for (i, b) in update.buffers.iter().enumerate() {
                binding.sync_resources[update.element as usize + i] = match b.buffer {
                    Some(ref buffer) => SyncResource::Buffer(buffer.clone()),
                    None => SyncResource::None,
                };
            }
        }
        DescriptorType::UniformTexelBuffer | DescriptorType::StorageTexelBuffer => {
            for (i, view) in update.texel_buffers.iter().enumerate() {
                binding.sync_resources[update.element as usize + i] = match view {
                    Some(view) => SyncResource::Buffer(view.buffer().clone()),
                    None => SyncResource::None,
                };
            }
        }
        DescriptorType::Sampler => {}
        DescriptorType::SampledImage
        | DescriptorType::CombinedImageSampler
        | DescriptorType::StorageImage
        | DescriptorType::InputAttachment => {
            for (i, image) in update.images.iter().enumerate() {
                binding.sync_resources[update.element as usize + i] = match image.image_view {
                    Some(ref view) => SyncResource::Image(view.image().clone()),
                    None => SyncResource::None,
                };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn binding(ty: DescriptorType, count: u32, is_variable_length: bool) -> DescriptorBindingInfo {
        DescriptorBindingInfo {
            ty,
            count,
            is_variable_length,
        }
    }

    #[test]
    fn usage_sums_per_type() {
        let bindings = [
            binding(DescriptorType::UniformBuffer, 2, false),
            binding(DescriptorType::SampledImage, 8, false),
            binding(DescriptorType::SampledImage, 64, true),
        ];
        let (usage, sizes) = descriptor_usage(&bindings, &[16]);
        assert_eq!(usage[DescriptorType::UniformBuffer as usize], 2);
        // variable-length binding contributes its instantiated length
        assert_eq!(usage[DescriptorType::SampledImage as usize], 8 + 16);
        assert_eq!(sizes, vec![2, 8, 16]);
    }

    #[test]
    fn pool_fit_requires_every_type() {
        let mut avail = [16u32; NUM_DESCRIPTOR_TYPES];
        let mut usage = [0u32; NUM_DESCRIPTOR_TYPES];
        usage[DescriptorType::UniformBuffer as usize] = 4;
        usage[DescriptorType::SampledImage as usize] = 4;
        assert!(pool_fits(&avail, &usage));

        // one exhausted type disqualifies the pool even when others fit
        avail[DescriptorType::SampledImage as usize] = 3;
        assert!(!pool_fits(&avail, &usage));
    }
}
