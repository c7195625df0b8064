//! Surface and swapchain records, including the recreation path.
//!
//! A swapchain tracks desired configuration (`info`) separately from what the
//! surface currently provides. `invalidate` only updates the desired info and
//! drops the optimal flag; the next `begin_frame` observes the flags and
//! rebuilds before acquiring.

use std::sync::{Arc, Mutex, MutexGuard};

use ash::vk;

use crate::device::DeviceShared;
use crate::error::{Result, VkResultExt};
use crate::image::ImageResource;
use crate::instance::InstanceShared;
use crate::{
    resolve_min_image_count, resolve_surface_extent, CompositeAlpha, Extent2D, Extent3D, Image,
    ImageAspects, ImageInfo, ImageType, ImageUsage, SampleCount, SurfaceFormat, SwapchainInfo,
    MAX_SWAPCHAIN_IMAGES,
};

pub(crate) struct SurfaceResource {
    pub(crate) instance: Arc<InstanceShared>,
    pub(crate) vk_surface: vk::SurfaceKHR,
}

impl Drop for SurfaceResource {
    fn drop(&mut self) {
        unsafe {
            self.instance
                .surface_loader
                .destroy_surface(self.vk_surface, None);
        }
    }
}

/// Opaque shared handle to a window surface.
#[derive(Clone)]
pub struct Surface {
    pub(crate) res: Arc<SurfaceResource>,
}

impl Surface {
    pub(crate) fn vk(&self) -> vk::SurfaceKHR {
        self.res.vk_surface
    }
}

impl std::fmt::Debug for Surface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Surface").finish_non_exhaustive()
    }
}

/// Current swapchain configuration and image set, as observed after the last
/// successful recreation.
#[derive(Debug, Clone, Default)]
pub struct SwapchainState {
    pub extent: Extent2D,
    pub format: SurfaceFormat,
    pub images: Vec<Image>,
    /// Index of the image acquired for the current frame, if any.
    pub current_image: Option<u32>,
}

pub(crate) struct SwapchainResource {
    pub(crate) dev: Arc<DeviceShared>,
    pub(crate) info: SwapchainInfo,
    pub(crate) surface: Surface,
    pub(crate) is_out_of_date: bool,
    pub(crate) is_optimal: bool,
    pub(crate) is_zero_sized: bool,
    pub(crate) format: SurfaceFormat,
    pub(crate) usage: ImageUsage,
    pub(crate) extent: Extent2D,
    pub(crate) composite_alpha: CompositeAlpha,
    pub(crate) images: Vec<Image>,
    pub(crate) current_image: Option<u32>,
    pub(crate) vk_swapchain: vk::SwapchainKHR,
}

/// Opaque shared handle to a swapchain. The device mutates the record during
/// `begin_frame`/`submit_frame`; user-facing reads go through
/// `Device::get_swapchain_state`.
#[derive(Clone)]
pub struct Swapchain {
    pub(crate) res: Arc<Mutex<SwapchainResource>>,
}

impl Swapchain {
    pub(crate) fn lock(&self) -> MutexGuard<'_, SwapchainResource> {
        self.res.lock().expect("swapchain poisoned")
    }

    pub(crate) fn same_resource(&self, other: &Swapchain) -> bool {
        Arc::ptr_eq(&self.res, &other.res)
    }
}

impl Drop for SwapchainResource {
    fn drop(&mut self) {
        // images are engine wrappers only; the backend owns their memory
        self.images.clear();
        if self.vk_swapchain != vk::SwapchainKHR::null() {
            unsafe {
                self.dev
                    .swapchain_loader
                    .destroy_swapchain(self.vk_swapchain, None);
            }
        }
    }
}

impl std::fmt::Debug for Swapchain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("Swapchain")
            .field("label", &inner.info.label)
            .field("extent", &inner.extent)
            .field("is_optimal", &inner.is_optimal)
            .field("is_out_of_date", &inner.is_out_of_date)
            .field("is_zero_sized", &inner.is_zero_sized)
            .finish_non_exhaustive()
    }
}

pub(crate) fn create_swapchain(
    dev: Arc<DeviceShared>,
    surface: &Surface,
    info: &SwapchainInfo,
) -> Swapchain {
    assert!(info.preferred_extent.width > 0 && info.preferred_extent.height > 0);
    assert!(info.preferred_buffering <= MAX_SWAPCHAIN_IMAGES);
    Swapchain {
        res: Arc::new(Mutex::new(SwapchainResource {
            dev,
            info: *info,
            surface: surface.clone(),
            is_out_of_date: true,
            is_optimal: false,
            is_zero_sized: false,
            format: SurfaceFormat::default(),
            usage: ImageUsage::empty(),
            extent: Extent2D::default(),
            composite_alpha: CompositeAlpha::empty(),
            images: Vec::new(),
            current_image: None,
            vk_swapchain: vk::SwapchainKHR::null(),
        })),
    }
}

/// Rebuilds the backend swapchain from the desired info. Zero-extent surfaces
/// leave the swapchain in `is_zero_sized` without touching backend objects;
/// the caller must have drained the device of pending work beforehand.
pub(crate) fn recreate(swapchain: &Swapchain) -> Result<()> {
    let mut sc = swapchain.lock();
    let dev = Arc::clone(&sc.dev);

    assert!(sc.info.preferred_extent.width > 0 && sc.info.preferred_extent.height > 0);
    assert!(sc.info.preferred_buffering <= MAX_SWAPCHAIN_IMAGES);

    let capabilities = unsafe {
        dev.instance
            .surface_loader
            .get_physical_device_surface_capabilities(dev.phy_dev.raw, sc.surface.vk())
    }
    .status()?;

    if capabilities.current_extent.width == 0 || capabilities.current_extent.height == 0 {
        sc.is_zero_sized = true;
        return Ok(());
    }

    assert!(
        capabilities
            .supported_usage_flags
            .contains(sc.info.usage.to_vk()),
        "surface does not support the requested image usage"
    );
    assert!(
        capabilities
            .supported_composite_alpha
            .contains(sc.info.composite_alpha.to_vk()),
        "surface does not support the requested composite alpha"
    );

    let old_vk_swapchain = sc.vk_swapchain;

    sc.is_out_of_date = true;
    sc.is_optimal = false;
    sc.is_zero_sized = false;
    sc.format = SurfaceFormat::default();
    sc.usage = ImageUsage::empty();
    sc.extent = Extent2D::default();
    sc.composite_alpha = CompositeAlpha::empty();
    sc.images.clear();
    sc.current_image = None;
    sc.vk_swapchain = vk::SwapchainKHR::null();

    let extent = resolve_surface_extent(
        Extent2D::new(
            capabilities.current_extent.width,
            capabilities.current_extent.height,
        ),
        Extent2D::new(
            capabilities.min_image_extent.width,
            capabilities.min_image_extent.height,
        ),
        Extent2D::new(
            capabilities.max_image_extent.width,
            capabilities.max_image_extent.height,
        ),
        sc.info.preferred_extent,
    );
    let min_image_count = resolve_min_image_count(
        sc.info.preferred_buffering,
        capabilities.min_image_count,
        capabilities.max_image_count,
    );

    let create_info = vk::SwapchainCreateInfoKHR::default()
        .surface(sc.surface.vk())
        .min_image_count(min_image_count)
        .image_format(sc.info.format.format.to_vk())
        .image_color_space(sc.info.format.color_space.to_vk())
        .image_extent(vk::Extent2D {
            width: extent.width,
            height: extent.height,
        })
        .image_array_layers(1)
        .image_usage(sc.info.usage.to_vk())
        .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
        .pre_transform(capabilities.current_transform)
        .composite_alpha(sc.info.composite_alpha.to_vk())
        .present_mode(sc.info.present_mode.to_vk())
        .clipped(true)
        .old_swapchain(old_vk_swapchain);

    let created = unsafe { dev.swapchain_loader.create_swapchain(&create_info, None) };

    // retiring the old swapchain is unconditional once recreation was
    // attempted with it as oldSwapchain
    if old_vk_swapchain != vk::SwapchainKHR::null() {
        unsafe {
            dev.swapchain_loader.destroy_swapchain(old_vk_swapchain, None);
        }
    }

    let new_vk_swapchain = created.status()?;

    let vk_images =
        match unsafe { dev.swapchain_loader.get_swapchain_images(new_vk_swapchain) }.status() {
            Ok(images) => images,
            Err(status) => {
                unsafe {
                    dev.swapchain_loader.destroy_swapchain(new_vk_swapchain, None);
                }
                return Err(status);
            }
        };
    assert!(
        vk_images.len() as u32 <= MAX_SWAPCHAIN_IMAGES,
        "driver returned too many swapchain images"
    );

    dev.set_object_name(sc.info.label, new_vk_swapchain);

    let mut images = Vec::with_capacity(vk_images.len());
    for vk_image in &vk_images {
        dev.set_object_name(sc.info.label, *vk_image);
        images.push(Image {
            res: Arc::new(ImageResource {
                info: ImageInfo {
                    label: sc.info.label,
                    ty: ImageType::Type2D,
                    format: sc.info.format.format,
                    usage: sc.info.usage,
                    aspects: ImageAspects::COLOR,
                    extent: Extent3D::new(extent.width, extent.height, 1),
                    mip_levels: 1,
                    array_layers: 1,
                    sample_count: SampleCount::Count1,
                },
                is_swapchain_image: true,
                dev: Arc::clone(&dev),
                vk_image: *vk_image,
                memory: vk::DeviceMemory::null(),
                states: Mutex::new(Default::default()),
                num_aspects: 1,
            }),
        });
    }

    log::debug!(
        "recreated swapchain {:?}: {}x{} with {} images",
        sc.info.label,
        extent.width,
        extent.height,
        images.len()
    );

    sc.is_out_of_date = false;
    sc.is_optimal = true;
    sc.is_zero_sized = false;
    sc.format = sc.info.format;
    sc.usage = sc.info.usage;
    sc.extent = extent;
    sc.composite_alpha = sc.info.composite_alpha;
    sc.images = images;
    sc.current_image = None;
    sc.vk_swapchain = new_vk_swapchain;

    Ok(())
}
