//! Image, image-view, and sampler records.

use std::sync::{Arc, Mutex};

use ash::vk;

use crate::access::{ImageAccess, ImageBarrierScope, ImageState};
use crate::device::DeviceShared;
use crate::{
    ImageAspects, ImageInfo, ImageViewInfo, Label, REMAINING_ARRAY_LAYERS, REMAINING_MIP_LEVELS,
};

pub(crate) const COLOR_ASPECT_IDX: usize = 0;
pub(crate) const DEPTH_ASPECT_IDX: usize = 0;
pub(crate) const STENCIL_ASPECT_IDX: usize = 1;

/// Whether the requested subresource window lies inside an image with
/// `num_levels` mips, `num_layers` layers, and `aspects`. The
/// `REMAINING_*` sentinels expand to the remainder from the first
/// level/layer.
pub(crate) fn is_valid_image_access(
    aspects: ImageAspects,
    num_levels: u32,
    num_layers: u32,
    access_aspects: ImageAspects,
    access_level: u32,
    num_access_levels: u32,
    access_layer: u32,
    num_access_layers: u32,
) -> bool {
    let num_access_levels = if num_access_levels == REMAINING_MIP_LEVELS {
        num_levels.saturating_sub(access_level)
    } else {
        num_access_levels
    };
    let num_access_layers = if num_access_layers == REMAINING_ARRAY_LAYERS {
        num_layers.saturating_sub(access_layer)
    } else {
        num_access_layers
    };
    num_access_levels > 0
        && num_access_layers > 0
        && access_level < num_levels
        && access_layer < num_layers
        && access_level.saturating_add(num_access_levels) <= num_levels
        && access_layer.saturating_add(num_access_layers) <= num_layers
        && aspects.contains(access_aspects)
        && !access_aspects.is_empty()
}

pub(crate) struct ImageResource {
    pub(crate) info: ImageInfo,
    pub(crate) is_swapchain_image: bool,
    pub(crate) dev: Arc<DeviceShared>,
    pub(crate) vk_image: vk::Image,
    /// Null for swapchain images; their memory belongs to the presentation
    /// engine.
    pub(crate) memory: vk::DeviceMemory,
    /// One state slot per tracked aspect: combined depth+stencil images keep
    /// two independent access histories, everything else uses slot 0.
    pub(crate) states: Mutex<[ImageState; 2]>,
    pub(crate) num_aspects: u32,
}

impl Drop for ImageResource {
    fn drop(&mut self) {
        if self.is_swapchain_image {
            return;
        }
        unsafe {
            self.dev.device.destroy_image(self.vk_image, None);
            self.dev.device.free_memory(self.memory, None);
        }
    }
}

/// Opaque shared handle to a GPU image.
#[derive(Clone)]
pub struct Image {
    pub(crate) res: Arc<ImageResource>,
}

impl Image {
    pub fn info(&self) -> &ImageInfo {
        &self.res.info
    }

    pub fn is_swapchain_image(&self) -> bool {
        self.res.is_swapchain_image
    }

    pub(crate) fn vk(&self) -> vk::Image {
        self.res.vk_image
    }

    pub(crate) fn sync_aspect(
        &self,
        aspect_index: usize,
        request: ImageAccess,
    ) -> Option<ImageBarrierScope> {
        assert!(
            aspect_index < self.res.num_aspects as usize,
            "aspect index outside the image's tracked aspects"
        );
        self.res.states.lock().expect("image state poisoned")[aspect_index].sync(request)
    }

    /// State slot of `aspect`: combined depth+stencil images track stencil
    /// separately in slot 1, every other image tracks in slot 0.
    pub(crate) fn tracked_aspect_index(&self, aspect: ImageAspects) -> usize {
        let aspects = self.res.info.aspects;
        if aspect == ImageAspects::STENCIL
            && aspects.contains(ImageAspects::DEPTH | ImageAspects::STENCIL)
        {
            STENCIL_ASPECT_IDX
        } else {
            0
        }
    }

    /// Resets the tracked access history, e.g. after external ownership of
    /// the image contents (swapchain recreation).
    pub(crate) fn reset_state(&self) {
        *self.res.states.lock().expect("image state poisoned") = Default::default();
    }

    pub(crate) fn same_resource(&self, other: &Image) -> bool {
        Arc::ptr_eq(&self.res, &other.res)
    }
}

impl std::fmt::Debug for Image {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Image")
            .field("label", &self.res.info.label)
            .field("format", &self.res.info.format)
            .field("extent", &self.res.info.extent)
            .field("is_swapchain_image", &self.res.is_swapchain_image)
            .finish_non_exhaustive()
    }
}

pub(crate) struct ImageViewResource {
    pub(crate) label: Label,
    pub(crate) info: ImageViewInfo,
    pub(crate) dev: Arc<DeviceShared>,
    pub(crate) vk_view: vk::ImageView,
}

impl Drop for ImageViewResource {
    fn drop(&mut self) {
        unsafe {
            self.dev.device.destroy_image_view(self.vk_view, None);
        }
    }
}

/// Opaque shared handle to an image view.
#[derive(Clone)]
pub struct ImageView {
    pub(crate) res: Arc<ImageViewResource>,
}

impl ImageView {
    pub fn label(&self) -> Label {
        self.res.label
    }

    pub fn image(&self) -> &Image {
        &self.res.info.image
    }

    pub fn info(&self) -> &ImageViewInfo {
        &self.res.info
    }

    pub(crate) fn vk(&self) -> vk::ImageView {
        self.res.vk_view
    }
}

impl std::fmt::Debug for ImageView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageView")
            .field("label", &self.res.label)
            .field("format", &self.res.info.view_format)
            .finish_non_exhaustive()
    }
}

pub(crate) struct SamplerResource {
    pub(crate) label: Label,
    pub(crate) dev: Arc<DeviceShared>,
    pub(crate) vk_sampler: vk::Sampler,
}

impl Drop for SamplerResource {
    fn drop(&mut self) {
        unsafe {
            self.dev.device.destroy_sampler(self.vk_sampler, None);
        }
    }
}

/// Opaque shared handle to a sampler. Samplers carry no engine-side state.
#[derive(Clone)]
pub struct Sampler {
    pub(crate) res: Arc<SamplerResource>,
}

impl Sampler {
    pub fn label(&self) -> Label {
        self.res.label
    }

    pub(crate) fn vk(&self) -> vk::Sampler {
        self.res.vk_sampler
    }
}

impl std::fmt::Debug for Sampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sampler")
            .field("label", &self.res.label)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_access_windows() {
        let aspects = ImageAspects::COLOR;
        assert!(is_valid_image_access(
            aspects,
            4,
            2,
            ImageAspects::COLOR,
            0,
            4,
            0,
            2
        ));
        assert!(is_valid_image_access(
            aspects,
            4,
            2,
            ImageAspects::COLOR,
            2,
            REMAINING_MIP_LEVELS,
            1,
            REMAINING_ARRAY_LAYERS
        ));
        // window past the end
        assert!(!is_valid_image_access(
            aspects,
            4,
            2,
            ImageAspects::COLOR,
            3,
            2,
            0,
            1
        ));
        // aspect not present on the image
        assert!(!is_valid_image_access(
            aspects,
            4,
            2,
            ImageAspects::DEPTH,
            0,
            1,
            0,
            1
        ));
        // empty access aspect set
        assert!(!is_valid_image_access(
            aspects,
            4,
            2,
            ImageAspects::empty(),
            0,
            1,
            0,
            1
        ));
    }

    #[test]
    fn remaining_layers_expand_from_layer_count() {
        // first layer 3 of 4: sentinel must expand to exactly one layer
        assert!(is_valid_image_access(
            ImageAspects::COLOR,
            1,
            4,
            ImageAspects::COLOR,
            0,
            1,
            3,
            REMAINING_ARRAY_LAYERS
        ));
        // first layer == layer count: nothing remains
        assert!(!is_valid_image_access(
            ImageAspects::COLOR,
            1,
            4,
            ImageAspects::COLOR,
            0,
            1,
            4,
            REMAINING_ARRAY_LAYERS
        ));
    }
}
