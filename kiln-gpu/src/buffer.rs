//! Buffer and buffer-view records.

use std::sync::{Arc, Mutex};

use ash::vk;

use crate::access::{BufferAccess, BufferState};
use crate::device::DeviceShared;
use crate::{BufferUsage, Format, Label, WHOLE_SIZE};

/// Whether `[access_offset, access_offset + access_size)` (with `WHOLE_SIZE`
/// expansion) is a usable range of a buffer of `size` bytes at the given
/// offset alignment.
pub(crate) fn is_valid_buffer_access(
    size: u64,
    access_offset: u64,
    access_size: u64,
    offset_alignment: u64,
) -> bool {
    let access_size = if access_size == WHOLE_SIZE {
        size.saturating_sub(access_offset)
    } else {
        access_size
    };
    access_size > 0
        && access_offset < size
        && access_offset.saturating_add(access_size) <= size
        && crate::is_aligned(offset_alignment, access_offset)
}

pub(crate) struct BufferResource {
    pub(crate) label: Label,
    pub(crate) size: u64,
    pub(crate) usage: BufferUsage,
    pub(crate) host_mapped: bool,
    pub(crate) dev: Arc<DeviceShared>,
    pub(crate) vk_buffer: vk::Buffer,
    pub(crate) memory: vk::DeviceMemory,
    /// Persistent mapping when `host_mapped`; address of the allocation base.
    pub(crate) mapped: *mut u8,
    pub(crate) state: Mutex<BufferState>,
}

// The mapped pointer aliases GPU memory owned by this record; it is only
// dereferenced under the caller's external serialization contract.
unsafe impl Send for BufferResource {}
unsafe impl Sync for BufferResource {}

impl Drop for BufferResource {
    fn drop(&mut self) {
        unsafe {
            if !self.mapped.is_null() {
                self.dev.device.unmap_memory(self.memory);
            }
            self.dev.device.destroy_buffer(self.vk_buffer, None);
            self.dev.device.free_memory(self.memory, None);
        }
    }
}

/// Opaque shared handle to a GPU buffer.
///
/// Dropping the last handle destroys the backing buffer; the application must
/// keep a handle alive until the last frame that references the buffer has
/// left the frame ring.
#[derive(Clone)]
pub struct Buffer {
    pub(crate) res: Arc<BufferResource>,
}

impl Buffer {
    pub fn label(&self) -> Label {
        self.res.label
    }

    pub fn size(&self) -> u64 {
        self.res.size
    }

    pub fn usage(&self) -> BufferUsage {
        self.res.usage
    }

    pub fn is_host_mapped(&self) -> bool {
        self.res.host_mapped
    }

    pub(crate) fn vk(&self) -> vk::Buffer {
        self.res.vk_buffer
    }

    pub(crate) fn sync(&self, request: BufferAccess) -> Option<crate::access::BarrierScope> {
        self.res
            .state
            .lock()
            .expect("buffer state poisoned")
            .sync(request)
    }

    pub(crate) fn same_resource(&self, other: &Buffer) -> bool {
        Arc::ptr_eq(&self.res, &other.res)
    }
}

impl std::fmt::Debug for Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer")
            .field("label", &self.res.label)
            .field("size", &self.res.size)
            .field("usage", &self.res.usage)
            .finish_non_exhaustive()
    }
}

pub(crate) struct BufferViewResource {
    pub(crate) label: Label,
    pub(crate) buffer: Buffer,
    pub(crate) format: Format,
    pub(crate) offset: u64,
    pub(crate) size: u64,
    pub(crate) dev: Arc<DeviceShared>,
    pub(crate) vk_view: vk::BufferView,
}

impl Drop for BufferViewResource {
    fn drop(&mut self) {
        unsafe {
            self.dev.device.destroy_buffer_view(self.vk_view, None);
        }
    }
}

/// Opaque shared handle to a texel-buffer view.
#[derive(Clone)]
pub struct BufferView {
    pub(crate) res: Arc<BufferViewResource>,
}

impl BufferView {
    pub fn label(&self) -> Label {
        self.res.label
    }

    pub fn buffer(&self) -> &Buffer {
        &self.res.buffer
    }

    pub fn format(&self) -> Format {
        self.res.format
    }

    pub fn offset(&self) -> u64 {
        self.res.offset
    }

    pub fn size(&self) -> u64 {
        self.res.size
    }

    pub(crate) fn vk(&self) -> vk::BufferView {
        self.res.vk_view
    }
}

impl std::fmt::Debug for BufferView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferView")
            .field("label", &self.res.label)
            .field("format", &self.res.format)
            .field("offset", &self.res.offset)
            .field("size", &self.res.size)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_access_ranges() {
        assert!(is_valid_buffer_access(256, 0, 256, 1));
        assert!(is_valid_buffer_access(256, 128, WHOLE_SIZE, 1));
        assert!(!is_valid_buffer_access(256, 256, WHOLE_SIZE, 1));
        assert!(!is_valid_buffer_access(256, 0, 257, 1));
        assert!(!is_valid_buffer_access(256, 0, 0, 1));
        // alignment applies to the offset, not the size
        assert!(is_valid_buffer_access(256, 64, 100, 64));
        assert!(!is_valid_buffer_access(256, 65, 100, 64));
    }
}
