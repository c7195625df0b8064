//! Error kinds surfaced by the GPU core.

use ash::vk;

/// Failure states of device and resource operations.
///
/// Swapchain `OutOfDate`/`Suboptimal` conditions are reported as flags on the
/// swapchain rather than through this type; they only appear here when a
/// backend call returns them in a context where no recovery is possible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Status {
    #[error("out of host memory")]
    OutOfHostMemory,
    #[error("out of device memory")]
    OutOfDeviceMemory,
    #[error("initialization failed")]
    InitializationFailed,
    #[error("device lost")]
    DeviceLost,
    #[error("memory map failed")]
    MemoryMapFailed,
    #[error("layer not present")]
    LayerNotPresent,
    #[error("extension not present")]
    ExtensionNotPresent,
    #[error("feature not present")]
    FeatureNotPresent,
    #[error("incompatible driver")]
    IncompatibleDriver,
    #[error("too many objects")]
    TooManyObjects,
    #[error("format not supported")]
    FormatNotSupported,
    #[error("fragmented pool")]
    FragmentedPool,
    #[error("surface lost")]
    SurfaceLost,
    #[error("native window in use")]
    NativeWindowInUse,
    #[error("swapchain out of date")]
    OutOfDate,
    #[error("unknown error")]
    Unknown,
}

impl From<vk::Result> for Status {
    fn from(result: vk::Result) -> Self {
        match result {
            vk::Result::ERROR_OUT_OF_HOST_MEMORY => Self::OutOfHostMemory,
            vk::Result::ERROR_OUT_OF_DEVICE_MEMORY => Self::OutOfDeviceMemory,
            vk::Result::ERROR_INITIALIZATION_FAILED => Self::InitializationFailed,
            vk::Result::ERROR_DEVICE_LOST => Self::DeviceLost,
            vk::Result::ERROR_MEMORY_MAP_FAILED => Self::MemoryMapFailed,
            vk::Result::ERROR_LAYER_NOT_PRESENT => Self::LayerNotPresent,
            vk::Result::ERROR_EXTENSION_NOT_PRESENT => Self::ExtensionNotPresent,
            vk::Result::ERROR_FEATURE_NOT_PRESENT => Self::FeatureNotPresent,
            vk::Result::ERROR_INCOMPATIBLE_DRIVER => Self::IncompatibleDriver,
            vk::Result::ERROR_TOO_MANY_OBJECTS => Self::TooManyObjects,
            vk::Result::ERROR_FORMAT_NOT_SUPPORTED => Self::FormatNotSupported,
            vk::Result::ERROR_FRAGMENTED_POOL => Self::FragmentedPool,
            vk::Result::ERROR_SURFACE_LOST_KHR => Self::SurfaceLost,
            vk::Result::ERROR_NATIVE_WINDOW_IN_USE_KHR => Self::NativeWindowInUse,
            vk::Result::ERROR_OUT_OF_DATE_KHR => Self::OutOfDate,
            _ => Self::Unknown,
        }
    }
}

pub type Result<T, E = Status> = core::result::Result<T, E>;

/// Maps a fallible ash call onto the engine error kind.
pub(crate) trait VkResultExt<T> {
    fn status(self) -> Result<T>;
}

impl<T> VkResultExt<T> for core::result::Result<T, vk::Result> {
    fn status(self) -> Result<T> {
        self.map_err(Status::from)
    }
}
