//! Kiln GPU core: a Vulkan device abstraction with automatic pipeline-barrier
//! synthesis, a frame-pipelined command encoder, a growable descriptor heap,
//! and swapchain management.
//!
//! The crate exposes opaque, reference-counted handles over heap-owned
//! resource records. Each record carries its backend object plus the
//! engine-side access history used to synthesize the minimal barrier before
//! every recorded command. Recording is single-threaded per device; callers
//! serialize access externally (one render thread).

mod access;
mod buffer;
mod descriptor;
mod device;
mod encoder;
mod error;
mod frame;
mod image;
mod instance;
mod pipeline;
mod query;
mod swapchain;

pub use buffer::{Buffer, BufferView};
pub use descriptor::{DescriptorSet, DescriptorSetLayout};
pub use device::{Device, DeviceProperties, FormatProperties, FrameInfo};
pub use encoder::CommandEncoder;
pub use error::{Result, Status};
pub use image::{Image, ImageView, Sampler};
pub use instance::{Instance, InstanceDesc};
pub use pipeline::{ComputePipeline, GraphicsPipeline, PipelineCache, Shader};
pub use query::{PipelineStatistics, StatisticsQuery, TimestampQuery};
pub use swapchain::{Surface, Swapchain, SwapchainState};

use ash::vk;

/// Maximum depth of the frame ring.
pub const MAX_FRAME_BUFFERING: u32 = 4;
/// Maximum number of images a swapchain may hand back.
pub const MAX_SWAPCHAIN_IMAGES: u32 = 8;
pub const MAX_PIPELINE_DESCRIPTOR_SETS: u32 = 8;
pub const MAX_DESCRIPTOR_SET_BINDINGS: u32 = 32;
pub const MAX_DESCRIPTOR_SET_DESCRIPTORS: u32 = 4096;
pub const MAX_BINDING_DESCRIPTORS: u32 = 1024;
pub const MAX_PUSH_CONSTANTS_SIZE: u32 = 128;
pub const MAX_VERTEX_ATTRIBUTES: u32 = 16;
pub const MAX_PIPELINE_COLOR_ATTACHMENTS: u32 = 8;
pub const MAX_PIPELINE_DYNAMIC_UNIFORM_BUFFERS: u32 = 8;
pub const MAX_PIPELINE_DYNAMIC_STORAGE_BUFFERS: u32 = 4;
pub const MAX_IMAGE_EXTENT_1D: u32 = 8192;
pub const MAX_IMAGE_EXTENT_2D: u32 = 8192;
pub const MAX_IMAGE_EXTENT_3D: u32 = 2048;
pub const MAX_IMAGE_EXTENT_CUBE: u32 = 8192;
pub const MAX_IMAGE_ARRAY_LAYERS: u32 = 2048;
pub const MAX_VIEWPORT_EXTENT: u32 = 8192;
pub const MAX_FRAMEBUFFER_EXTENT: u32 = 8192;
pub const MAX_FRAMEBUFFER_LAYERS: u32 = 1024;
pub const MAX_SAMPLER_ANISOTROPY: f32 = 16.0;
pub const MAX_UPDATE_BUFFER_SIZE: u64 = 65536;
pub const MAX_UNIFORM_BUFFER_RANGE: u64 = 65536;

/// Sentinel: the rest of the buffer from the given offset.
pub const WHOLE_SIZE: u64 = u64::MAX;
/// Sentinel: all remaining mip levels from the first.
pub const REMAINING_MIP_LEVELS: u32 = u32::MAX;
/// Sentinel: all remaining array layers from the first.
pub const REMAINING_ARRAY_LAYERS: u32 = u32::MAX;

pub(crate) const NUM_DESCRIPTOR_TYPES: usize = 11;

/// Monotonically increasing frame counter.
pub type FrameId = u64;

/// Optional static debug label attached to backend objects.
pub type Label = Option<&'static str>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Offset2D {
    pub x: i32,
    pub y: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Extent2D {
    pub width: u32,
    pub height: u32,
}

impl Extent2D {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub const fn is_zero(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Offset3D {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Extent3D {
    pub width: u32,
    pub height: u32,
    pub depth: u32,
}

impl Extent3D {
    pub const fn new(width: u32, height: u32, depth: u32) -> Self {
        Self {
            width,
            height,
            depth,
        }
    }
}

/// Scissor/render-area rectangle in surface pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rect {
    pub offset: Offset2D,
    pub extent: Extent2D,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: 0.0,
            height: 0.0,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }
}

/// Number of mip levels a full chain over `extent` has.
pub fn num_mip_levels(extent: Extent3D) -> u32 {
    let max = extent.width.max(extent.height).max(extent.depth);
    if max == 0 {
        0
    } else {
        32 - max.leading_zeros()
    }
}

/// `extent` reduced to mip level `level`, clamped to 1 per axis.
pub fn mip_down(extent: Extent3D, level: u32) -> Extent3D {
    Extent3D {
        width: (extent.width >> level).max(1),
        height: (extent.height >> level).max(1),
        depth: (extent.depth >> level).max(1),
    }
}

pub(crate) fn is_aligned(alignment: u64, value: u64) -> bool {
    alignment == 0 || value % alignment == 0
}

// Texel formats. Discriminants are the Vulkan format values so conversion is
// a transmute-free `from_raw`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(i32)]
pub enum Format {
    #[default]
    Undefined = 0,
    R8Unorm = 9,
    R8Snorm = 10,
    R8Uint = 13,
    R8Sint = 14,
    R8Srgb = 15,
    Rg8Unorm = 16,
    Rg8Srgb = 22,
    Rgba8Unorm = 37,
    Rgba8Srgb = 43,
    Bgra8Unorm = 44,
    Bgra8Srgb = 50,
    A2Bgr10Unorm = 64,
    R16Uint = 74,
    R16Sint = 75,
    R16Float = 76,
    Rg16Float = 83,
    Rgba16Unorm = 91,
    Rgba16Float = 97,
    R32Uint = 98,
    R32Sint = 99,
    R32Float = 100,
    Rg32Uint = 101,
    Rg32Sint = 102,
    Rg32Float = 103,
    Rgb32Float = 106,
    Rgba32Uint = 107,
    Rgba32Sint = 108,
    Rgba32Float = 109,
    B10G11R11UFloat = 122,
    D16Unorm = 124,
    D32Float = 126,
    S8Uint = 127,
    D16UnormS8Uint = 128,
    D24UnormS8Uint = 129,
    D32FloatS8Uint = 130,
    Bc7Unorm = 145,
    Bc7Srgb = 146,
}

impl Format {
    pub(crate) fn to_vk(self) -> vk::Format {
        vk::Format::from_raw(self as i32)
    }

    /// Engine format for a backend format; `None` for formats the engine does
    /// not model.
    pub(crate) fn from_vk(format: vk::Format) -> Option<Self> {
        const KNOWN: &[Format] = &[
            Format::R8Unorm,
            Format::R8Snorm,
            Format::R8Uint,
            Format::R8Sint,
            Format::R8Srgb,
            Format::Rg8Unorm,
            Format::Rg8Srgb,
            Format::Rgba8Unorm,
            Format::Rgba8Srgb,
            Format::Bgra8Unorm,
            Format::Bgra8Srgb,
            Format::A2Bgr10Unorm,
            Format::R16Uint,
            Format::R16Sint,
            Format::R16Float,
            Format::Rg16Float,
            Format::Rgba16Unorm,
            Format::Rgba16Float,
            Format::R32Uint,
            Format::R32Sint,
            Format::R32Float,
            Format::Rg32Uint,
            Format::Rg32Sint,
            Format::Rg32Float,
            Format::Rgb32Float,
            Format::Rgba32Uint,
            Format::Rgba32Sint,
            Format::Rgba32Float,
            Format::B10G11R11UFloat,
            Format::D16Unorm,
            Format::D32Float,
            Format::S8Uint,
            Format::D16UnormS8Uint,
            Format::D24UnormS8Uint,
            Format::D32FloatS8Uint,
            Format::Bc7Unorm,
            Format::Bc7Srgb,
        ];
        KNOWN.iter().copied().find(|&known| known.to_vk() == format)
    }

    pub fn has_depth(self) -> bool {
        matches!(
            self,
            Self::D16Unorm
                | Self::D32Float
                | Self::D16UnormS8Uint
                | Self::D24UnormS8Uint
                | Self::D32FloatS8Uint
        )
    }

    pub fn has_stencil(self) -> bool {
        matches!(
            self,
            Self::S8Uint | Self::D16UnormS8Uint | Self::D24UnormS8Uint | Self::D32FloatS8Uint
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(i32)]
pub enum ColorSpace {
    #[default]
    SrgbNonLinear = 0,
    ExtendedSrgbLinear = 1_000_104_002,
    Hdr10St2084 = 1_000_104_008,
}

impl ColorSpace {
    pub(crate) fn to_vk(self) -> vk::ColorSpaceKHR {
        vk::ColorSpaceKHR::from_raw(self as i32)
    }

    pub(crate) fn from_vk(space: vk::ColorSpaceKHR) -> Self {
        match space {
            vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT => Self::ExtendedSrgbLinear,
            vk::ColorSpaceKHR::HDR10_ST2084_EXT => Self::Hdr10St2084,
            _ => Self::SrgbNonLinear,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(i32)]
pub enum PresentMode {
    Immediate = 0,
    Mailbox = 1,
    #[default]
    Fifo = 2,
    FifoRelaxed = 3,
}

impl PresentMode {
    pub(crate) fn to_vk(self) -> vk::PresentModeKHR {
        vk::PresentModeKHR::from_raw(self as i32)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum DeviceType {
    Other = 0,
    IntegratedGpu = 1,
    DiscreteGpu = 2,
    VirtualGpu = 3,
    Cpu = 4,
}

impl DeviceType {
    pub(crate) fn to_vk(self) -> vk::PhysicalDeviceType {
        vk::PhysicalDeviceType::from_raw(self as i32)
    }

    pub(crate) fn from_vk(ty: vk::PhysicalDeviceType) -> Self {
        match ty {
            vk::PhysicalDeviceType::INTEGRATED_GPU => Self::IntegratedGpu,
            vk::PhysicalDeviceType::DISCRETE_GPU => Self::DiscreteGpu,
            vk::PhysicalDeviceType::VIRTUAL_GPU => Self::VirtualGpu,
            vk::PhysicalDeviceType::CPU => Self::Cpu,
            _ => Self::Other,
        }
    }
}

bitflags::bitflags! {
    /// Buffer usage bits; values match the Vulkan buffer usage flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct BufferUsage: u32 {
        const TRANSFER_SRC = 1 << 0;
        const TRANSFER_DST = 1 << 1;
        const UNIFORM_TEXEL_BUFFER = 1 << 2;
        const STORAGE_TEXEL_BUFFER = 1 << 3;
        const UNIFORM_BUFFER = 1 << 4;
        const STORAGE_BUFFER = 1 << 5;
        const INDEX_BUFFER = 1 << 6;
        const VERTEX_BUFFER = 1 << 7;
        const INDIRECT_BUFFER = 1 << 8;
    }
}

impl BufferUsage {
    pub(crate) fn to_vk(self) -> vk::BufferUsageFlags {
        vk::BufferUsageFlags::from_raw(self.bits())
    }
}

bitflags::bitflags! {
    /// Image usage bits; values match the Vulkan image usage flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ImageUsage: u32 {
        const TRANSFER_SRC = 1 << 0;
        const TRANSFER_DST = 1 << 1;
        const SAMPLED = 1 << 2;
        const STORAGE = 1 << 3;
        const COLOR_ATTACHMENT = 1 << 4;
        const DEPTH_STENCIL_ATTACHMENT = 1 << 5;
        const INPUT_ATTACHMENT = 1 << 7;
    }
}

impl ImageUsage {
    pub(crate) fn to_vk(self) -> vk::ImageUsageFlags {
        vk::ImageUsageFlags::from_raw(self.bits())
    }

    pub(crate) fn from_vk(flags: vk::ImageUsageFlags) -> Self {
        Self::from_bits_truncate(flags.as_raw())
    }
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ImageAspects: u32 {
        const COLOR = 1 << 0;
        const DEPTH = 1 << 1;
        const STENCIL = 1 << 2;
    }
}

impl ImageAspects {
    pub(crate) fn to_vk(self) -> vk::ImageAspectFlags {
        vk::ImageAspectFlags::from_raw(self.bits())
    }
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct CompositeAlpha: u32 {
        const OPAQUE = 1 << 0;
        const PRE_MULTIPLIED = 1 << 1;
        const POST_MULTIPLIED = 1 << 2;
        const INHERIT = 1 << 3;
    }
}

impl CompositeAlpha {
    pub(crate) fn to_vk(self) -> vk::CompositeAlphaFlagsKHR {
        vk::CompositeAlphaFlagsKHR::from_raw(self.bits())
    }

    pub(crate) fn from_vk(flags: vk::CompositeAlphaFlagsKHR) -> Self {
        Self::from_bits_truncate(flags.as_raw())
    }
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ColorComponents: u32 {
        const R = 1 << 0;
        const G = 1 << 1;
        const B = 1 << 2;
        const A = 1 << 3;
    }
}

impl ColorComponents {
    pub const ALL: Self = Self::all();

    pub(crate) fn to_vk(self) -> vk::ColorComponentFlags {
        vk::ColorComponentFlags::from_raw(self.bits())
    }
}

bitflags::bitflags! {
    /// Multisample resolve operations; values match `VkResolveModeFlagBits`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ResolveModes: u32 {
        const SAMPLE_ZERO = 1 << 0;
        const AVERAGE = 1 << 1;
        const MIN = 1 << 2;
        const MAX = 1 << 3;
    }
}

impl ResolveModes {
    pub(crate) fn to_vk(self) -> vk::ResolveModeFlags {
        vk::ResolveModeFlags::from_raw(self.bits())
    }
}

bitflags::bitflags! {
    /// Format capability bits; values match `VkFormatFeatureFlagBits`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FormatFeatures: u32 {
        const SAMPLED_IMAGE = 1 << 0;
        const STORAGE_IMAGE = 1 << 1;
        const UNIFORM_TEXEL_BUFFER = 1 << 3;
        const STORAGE_TEXEL_BUFFER = 1 << 4;
        const VERTEX_BUFFER = 1 << 6;
        const COLOR_ATTACHMENT = 1 << 7;
        const COLOR_ATTACHMENT_BLEND = 1 << 8;
        const DEPTH_STENCIL_ATTACHMENT = 1 << 9;
        const BLIT_SRC = 1 << 10;
        const BLIT_DST = 1 << 11;
        const SAMPLED_IMAGE_FILTER_LINEAR = 1 << 12;
        const TRANSFER_SRC = 1 << 14;
        const TRANSFER_DST = 1 << 15;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(i32)]
pub enum ImageType {
    Type1D = 0,
    #[default]
    Type2D = 1,
    Type3D = 2,
}

impl ImageType {
    pub(crate) fn to_vk(self) -> vk::ImageType {
        vk::ImageType::from_raw(self as i32)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(i32)]
pub enum ImageViewType {
    Type1D = 0,
    #[default]
    Type2D = 1,
    Type3D = 2,
    TypeCube = 3,
    Type1DArray = 4,
    Type2DArray = 5,
    TypeCubeArray = 6,
}

impl ImageViewType {
    pub(crate) fn to_vk(self) -> vk::ImageViewType {
        vk::ImageViewType::from_raw(self as i32)
    }
}

/// View-type/image-type compatibility, per the Vulkan image view rules.
pub fn is_image_view_type_compatible(image_type: ImageType, view_type: ImageViewType) -> bool {
    match view_type {
        ImageViewType::Type1D | ImageViewType::Type1DArray => image_type == ImageType::Type1D,
        ImageViewType::Type2D | ImageViewType::Type2DArray => {
            image_type == ImageType::Type2D || image_type == ImageType::Type3D
        }
        ImageViewType::TypeCube | ImageViewType::TypeCubeArray => image_type == ImageType::Type2D,
        ImageViewType::Type3D => image_type == ImageType::Type3D,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum SampleCount {
    #[default]
    Count1 = 1,
    Count2 = 2,
    Count4 = 4,
    Count8 = 8,
    Count16 = 16,
}

impl SampleCount {
    pub(crate) fn to_vk(self) -> vk::SampleCountFlags {
        vk::SampleCountFlags::from_raw(self as u32)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(i32)]
pub enum ComponentSwizzle {
    #[default]
    Identity = 0,
    Zero = 1,
    One = 2,
    R = 3,
    G = 4,
    B = 5,
    A = 6,
}

impl ComponentSwizzle {
    pub(crate) fn to_vk(self) -> vk::ComponentSwizzle {
        vk::ComponentSwizzle::from_raw(self as i32)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ComponentMapping {
    pub r: ComponentSwizzle,
    pub g: ComponentSwizzle,
    pub b: ComponentSwizzle,
    pub a: ComponentSwizzle,
}

impl ComponentMapping {
    pub(crate) fn to_vk(self) -> vk::ComponentMapping {
        vk::ComponentMapping {
            r: self.r.to_vk(),
            g: self.g.to_vk(),
            b: self.b.to_vk(),
            a: self.a.to_vk(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(i32)]
pub enum Filter {
    #[default]
    Nearest = 0,
    Linear = 1,
}

impl Filter {
    pub(crate) fn to_vk(self) -> vk::Filter {
        vk::Filter::from_raw(self as i32)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(i32)]
pub enum SamplerMipMapMode {
    #[default]
    Nearest = 0,
    Linear = 1,
}

impl SamplerMipMapMode {
    pub(crate) fn to_vk(self) -> vk::SamplerMipmapMode {
        vk::SamplerMipmapMode::from_raw(self as i32)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(i32)]
pub enum SamplerAddressMode {
    #[default]
    Repeat = 0,
    MirroredRepeat = 1,
    ClampToEdge = 2,
    ClampToBorder = 3,
}

impl SamplerAddressMode {
    pub(crate) fn to_vk(self) -> vk::SamplerAddressMode {
        vk::SamplerAddressMode::from_raw(self as i32)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(i32)]
pub enum BorderColor {
    #[default]
    FloatTransparentBlack = 0,
    IntTransparentBlack = 1,
    FloatOpaqueBlack = 2,
    IntOpaqueBlack = 3,
    FloatOpaqueWhite = 4,
    IntOpaqueWhite = 5,
}

impl BorderColor {
    pub(crate) fn to_vk(self) -> vk::BorderColor {
        vk::BorderColor::from_raw(self as i32)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(i32)]
pub enum CompareOp {
    #[default]
    Never = 0,
    Less = 1,
    Equal = 2,
    LessOrEqual = 3,
    Greater = 4,
    NotEqual = 5,
    GreaterOrEqual = 6,
    Always = 7,
}

impl CompareOp {
    pub(crate) fn to_vk(self) -> vk::CompareOp {
        vk::CompareOp::from_raw(self as i32)
    }
}

/// Descriptor binding types; values match `VkDescriptorType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum DescriptorType {
    Sampler = 0,
    CombinedImageSampler = 1,
    SampledImage = 2,
    StorageImage = 3,
    UniformTexelBuffer = 4,
    StorageTexelBuffer = 5,
    UniformBuffer = 6,
    StorageBuffer = 7,
    DynamicUniformBuffer = 8,
    DynamicStorageBuffer = 9,
    InputAttachment = 10,
}

impl DescriptorType {
    pub(crate) fn to_vk(self) -> vk::DescriptorType {
        vk::DescriptorType::from_raw(self as u32 as i32)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(i32)]
pub enum IndexType {
    Uint16 = 0,
    #[default]
    Uint32 = 1,
}

impl IndexType {
    pub(crate) fn to_vk(self) -> vk::IndexType {
        vk::IndexType::from_raw(self as i32)
    }

    pub fn size(self) -> u64 {
        match self {
            Self::Uint16 => 2,
            Self::Uint32 => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(i32)]
pub enum LoadOp {
    #[default]
    Load = 0,
    Clear = 1,
    DontCare = 2,
}

impl LoadOp {
    pub(crate) fn to_vk(self) -> vk::AttachmentLoadOp {
        vk::AttachmentLoadOp::from_raw(self as i32)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(i32)]
pub enum StoreOp {
    #[default]
    Store = 0,
    DontCare = 1,
}

impl StoreOp {
    pub(crate) fn to_vk(self) -> vk::AttachmentStoreOp {
        vk::AttachmentStoreOp::from_raw(self as i32)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(i32)]
pub enum BlendFactor {
    #[default]
    Zero = 0,
    One = 1,
    SrcColor = 2,
    OneMinusSrcColor = 3,
    DstColor = 4,
    OneMinusDstColor = 5,
    SrcAlpha = 6,
    OneMinusSrcAlpha = 7,
    DstAlpha = 8,
    OneMinusDstAlpha = 9,
    ConstantColor = 10,
    OneMinusConstantColor = 11,
    ConstantAlpha = 12,
    OneMinusConstantAlpha = 13,
    SrcAlphaSaturate = 14,
}

impl BlendFactor {
    pub(crate) fn to_vk(self) -> vk::BlendFactor {
        vk::BlendFactor::from_raw(self as i32)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(i32)]
pub enum BlendOp {
    #[default]
    Add = 0,
    Subtract = 1,
    ReverseSubtract = 2,
    Min = 3,
    Max = 4,
}

impl BlendOp {
    pub(crate) fn to_vk(self) -> vk::BlendOp {
        vk::BlendOp::from_raw(self as i32)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(i32)]
pub enum StencilOp {
    #[default]
    Keep = 0,
    Zero = 1,
    Replace = 2,
    IncrementAndClamp = 3,
    DecrementAndClamp = 4,
    Invert = 5,
    IncrementAndWrap = 6,
    DecrementAndWrap = 7,
}

impl StencilOp {
    pub(crate) fn to_vk(self) -> vk::StencilOp {
        vk::StencilOp::from_raw(self as i32)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(i32)]
pub enum PolygonMode {
    #[default]
    Fill = 0,
    Line = 1,
    Point = 2,
}

impl PolygonMode {
    pub(crate) fn to_vk(self) -> vk::PolygonMode {
        vk::PolygonMode::from_raw(self as i32)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum CullMode {
    #[default]
    None = 0,
    Front = 1,
    Back = 2,
    FrontAndBack = 3,
}

impl CullMode {
    pub(crate) fn to_vk(self) -> vk::CullModeFlags {
        vk::CullModeFlags::from_raw(self as u32)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(i32)]
pub enum FrontFace {
    #[default]
    CounterClockWise = 0,
    ClockWise = 1,
}

impl FrontFace {
    pub(crate) fn to_vk(self) -> vk::FrontFace {
        vk::FrontFace::from_raw(self as i32)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(i32)]
pub enum PrimitiveTopology {
    PointList = 0,
    LineList = 1,
    LineStrip = 2,
    #[default]
    TriangleList = 3,
    TriangleStrip = 4,
    TriangleFan = 5,
}

impl PrimitiveTopology {
    pub(crate) fn to_vk(self) -> vk::PrimitiveTopology {
        vk::PrimitiveTopology::from_raw(self as i32)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(i32)]
pub enum VertexInputRate {
    #[default]
    Vertex = 0,
    Instance = 1,
}

impl VertexInputRate {
    pub(crate) fn to_vk(self) -> vk::VertexInputRate {
        vk::VertexInputRate::from_raw(self as i32)
    }
}

/// Clear color for color-aspect clears; variant must match the format class.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Color {
    Float([f32; 4]),
    Int([i32; 4]),
    Uint([u32; 4]),
}

impl Default for Color {
    fn default() -> Self {
        Self::Float([0.0; 4])
    }
}

impl Color {
    pub(crate) fn to_vk(self) -> vk::ClearColorValue {
        match self {
            Self::Float(float32) => vk::ClearColorValue { float32 },
            Self::Int(int32) => vk::ClearColorValue { int32 },
            Self::Uint(uint32) => vk::ClearColorValue { uint32 },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DepthStencil {
    pub depth: f32,
    pub stencil: u32,
}

impl DepthStencil {
    pub(crate) fn to_vk(self) -> vk::ClearDepthStencilValue {
        vk::ClearDepthStencilValue {
            depth: self.depth,
            stencil: self.stencil,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClearValue {
    Color(Color),
    DepthStencil(DepthStencil),
}

impl Default for ClearValue {
    fn default() -> Self {
        Self::Color(Color::default())
    }
}

impl ClearValue {
    pub(crate) fn to_vk(self) -> vk::ClearValue {
        match self {
            Self::Color(color) => vk::ClearValue { color: color.to_vk() },
            Self::DepthStencil(ds) => vk::ClearValue {
                depth_stencil: ds.to_vk(),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// creation descriptors

#[derive(Debug, Clone, Copy, Default)]
pub struct BufferInfo {
    pub label: Label,
    pub size: u64,
    pub usage: BufferUsage,
    /// Host-mapped buffers get HOST_VISIBLE|HOST_COHERENT memory and are
    /// persistently mapped for their whole lifetime.
    pub host_mapped: bool,
}

#[derive(Debug, Clone)]
pub struct BufferViewInfo {
    pub label: Label,
    pub buffer: Buffer,
    pub format: Format,
    pub offset: u64,
    pub size: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct ImageInfo {
    pub label: Label,
    pub ty: ImageType,
    pub format: Format,
    pub usage: ImageUsage,
    pub aspects: ImageAspects,
    pub extent: Extent3D,
    pub mip_levels: u32,
    pub array_layers: u32,
    pub sample_count: SampleCount,
}

impl Default for ImageInfo {
    fn default() -> Self {
        Self {
            label: None,
            ty: ImageType::Type2D,
            format: Format::Undefined,
            usage: ImageUsage::empty(),
            aspects: ImageAspects::empty(),
            extent: Extent3D::default(),
            mip_levels: 1,
            array_layers: 1,
            sample_count: SampleCount::Count1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ImageViewInfo {
    pub label: Label,
    pub image: Image,
    pub view_type: ImageViewType,
    pub view_format: Format,
    pub mapping: ComponentMapping,
    pub aspects: ImageAspects,
    pub first_mip_level: u32,
    pub num_mip_levels: u32,
    pub first_array_layer: u32,
    pub num_array_layers: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct SamplerInfo {
    pub label: Label,
    pub mag_filter: Filter,
    pub min_filter: Filter,
    pub mip_map_mode: SamplerMipMapMode,
    pub address_mode_u: SamplerAddressMode,
    pub address_mode_v: SamplerAddressMode,
    pub address_mode_w: SamplerAddressMode,
    pub mip_lod_bias: f32,
    pub anisotropy_enable: bool,
    pub max_anisotropy: f32,
    pub compare_enable: bool,
    pub compare_op: CompareOp,
    pub min_lod: f32,
    pub max_lod: f32,
    pub border_color: BorderColor,
    pub unnormalized_coordinates: bool,
}

impl Default for SamplerInfo {
    fn default() -> Self {
        Self {
            label: None,
            mag_filter: Filter::Nearest,
            min_filter: Filter::Nearest,
            mip_map_mode: SamplerMipMapMode::Nearest,
            address_mode_u: SamplerAddressMode::Repeat,
            address_mode_v: SamplerAddressMode::Repeat,
            address_mode_w: SamplerAddressMode::Repeat,
            mip_lod_bias: 0.0,
            anisotropy_enable: false,
            max_anisotropy: 1.0,
            compare_enable: false,
            compare_op: CompareOp::Never,
            min_lod: 0.0,
            max_lod: vk::LOD_CLAMP_NONE,
            border_color: BorderColor::FloatTransparentBlack,
            unnormalized_coordinates: false,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ShaderInfo<'a> {
    pub label: Label,
    pub spirv: &'a [u32],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DescriptorBindingInfo {
    pub ty: DescriptorType,
    pub count: u32,
    /// A variable-length binding must be the last binding of the layout; its
    /// `count` is the upper bound, the actual length is chosen at set
    /// creation.
    pub is_variable_length: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct DescriptorSetLayoutInfo<'a> {
    pub label: Label,
    pub bindings: &'a [DescriptorBindingInfo],
}

/// One element written into a buffer-class binding.
#[derive(Debug, Clone, Default)]
pub struct BufferBinding {
    pub buffer: Option<Buffer>,
    pub offset: u64,
    pub size: u64,
}

/// One element written into an image-class binding.
#[derive(Debug, Clone, Default)]
pub struct ImageBinding {
    pub image_view: Option<ImageView>,
    pub sampler: Option<Sampler>,
}

/// A single-binding descriptor set write.
#[derive(Debug, Clone, Default)]
pub struct DescriptorSetUpdate<'a> {
    pub binding: u32,
    pub element: u32,
    pub buffers: &'a [BufferBinding],
    pub texel_buffers: &'a [Option<BufferView>],
    pub images: &'a [ImageBinding],
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PipelineCacheInfo<'a> {
    pub label: Label,
    pub initial_data: &'a [u8],
}

#[derive(Debug, Clone)]
pub struct ShaderStageInfo<'a> {
    pub shader: Shader,
    pub entry_point: &'a str,
}

#[derive(Debug, Clone)]
pub struct ComputePipelineInfo<'a> {
    pub label: Label,
    pub compute_shader: ShaderStageInfo<'a>,
    pub push_constants_size: u32,
    pub descriptor_set_layouts: &'a [DescriptorSetLayout],
    pub cache: Option<&'a PipelineCache>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct VertexInputBinding {
    pub binding: u32,
    pub stride: u32,
    pub input_rate: VertexInputRate,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct VertexAttribute {
    pub binding: u32,
    pub location: u32,
    pub format: Format,
    pub offset: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct RasterizationState {
    pub depth_clamp_enable: bool,
    pub polygon_mode: PolygonMode,
    pub cull_mode: CullMode,
    pub front_face: FrontFace,
    pub depth_bias_enable: bool,
    pub depth_bias_constant_factor: f32,
    pub depth_bias_clamp: f32,
    pub depth_bias_slope_factor: f32,
}

impl Default for RasterizationState {
    fn default() -> Self {
        Self {
            depth_clamp_enable: false,
            polygon_mode: PolygonMode::Fill,
            cull_mode: CullMode::None,
            front_face: FrontFace::CounterClockWise,
            depth_bias_enable: false,
            depth_bias_constant_factor: 0.0,
            depth_bias_clamp: 0.0,
            depth_bias_slope_factor: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StencilOpState {
    pub fail_op: StencilOp,
    pub pass_op: StencilOp,
    pub depth_fail_op: StencilOp,
    pub compare_op: CompareOp,
    pub compare_mask: u32,
    pub write_mask: u32,
    pub reference: u32,
}

impl StencilOpState {
    pub(crate) fn to_vk(self) -> vk::StencilOpState {
        vk::StencilOpState {
            fail_op: self.fail_op.to_vk(),
            pass_op: self.pass_op.to_vk(),
            depth_fail_op: self.depth_fail_op.to_vk(),
            compare_op: self.compare_op.to_vk(),
            compare_mask: self.compare_mask,
            write_mask: self.write_mask,
            reference: self.reference,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DepthStencilState {
    pub depth_test_enable: bool,
    pub depth_write_enable: bool,
    pub depth_compare_op: CompareOp,
    pub depth_bounds_test_enable: bool,
    pub stencil_test_enable: bool,
    pub front_stencil: StencilOpState,
    pub back_stencil: StencilOpState,
    pub min_depth_bounds: f32,
    pub max_depth_bounds: f32,
}

#[derive(Debug, Clone, Copy)]
pub struct ColorBlendAttachmentState {
    pub blend_enable: bool,
    pub src_color_blend_factor: BlendFactor,
    pub dst_color_blend_factor: BlendFactor,
    pub color_blend_op: BlendOp,
    pub src_alpha_blend_factor: BlendFactor,
    pub dst_alpha_blend_factor: BlendFactor,
    pub alpha_blend_op: BlendOp,
    pub color_write_mask: ColorComponents,
}

impl Default for ColorBlendAttachmentState {
    fn default() -> Self {
        Self {
            blend_enable: false,
            src_color_blend_factor: BlendFactor::Zero,
            dst_color_blend_factor: BlendFactor::Zero,
            color_blend_op: BlendOp::Add,
            src_alpha_blend_factor: BlendFactor::Zero,
            dst_alpha_blend_factor: BlendFactor::Zero,
            alpha_blend_op: BlendOp::Add,
            color_write_mask: ColorComponents::ALL,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ColorBlendState<'a> {
    pub attachments: &'a [ColorBlendAttachmentState],
    pub blend_constant: [f32; 4],
}

#[derive(Debug, Clone)]
pub struct GraphicsPipelineInfo<'a> {
    pub label: Label,
    pub vertex_shader: ShaderStageInfo<'a>,
    pub fragment_shader: Option<ShaderStageInfo<'a>>,
    /// Formats of the render-pass attachments this pipeline is compatible
    /// with; checked against the active attachments at bind time.
    pub color_formats: &'a [Format],
    pub depth_format: Option<Format>,
    pub stencil_format: Option<Format>,
    pub vertex_input_bindings: &'a [VertexInputBinding],
    pub vertex_attributes: &'a [VertexAttribute],
    pub push_constants_size: u32,
    pub descriptor_set_layouts: &'a [DescriptorSetLayout],
    pub primitive_topology: PrimitiveTopology,
    pub rasterization_state: RasterizationState,
    pub depth_stencil_state: DepthStencilState,
    pub color_blend_state: ColorBlendState<'a>,
    pub sample_count: SampleCount,
    pub cache: Option<&'a PipelineCache>,
}

// ---------------------------------------------------------------------------
// recording descriptors

#[derive(Debug, Clone, Copy, Default)]
pub struct BufferCopy {
    pub src_offset: u64,
    pub dst_offset: u64,
    pub size: u64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ImageSubresourceLayers {
    pub aspects: ImageAspects,
    pub mip_level: u32,
    pub first_array_layer: u32,
    pub num_array_layers: u32,
}

impl ImageSubresourceLayers {
    pub(crate) fn to_vk(self) -> vk::ImageSubresourceLayers {
        vk::ImageSubresourceLayers {
            aspect_mask: self.aspects.to_vk(),
            mip_level: self.mip_level,
            base_array_layer: self.first_array_layer,
            layer_count: self.num_array_layers,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ImageSubresourceRange {
    pub aspects: ImageAspects,
    pub first_mip_level: u32,
    pub num_mip_levels: u32,
    pub first_array_layer: u32,
    pub num_array_layers: u32,
}

impl ImageSubresourceRange {
    pub(crate) fn to_vk(self) -> vk::ImageSubresourceRange {
        vk::ImageSubresourceRange {
            aspect_mask: self.aspects.to_vk(),
            base_mip_level: self.first_mip_level,
            level_count: self.num_mip_levels,
            base_array_layer: self.first_array_layer,
            layer_count: self.num_array_layers,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ImageCopy {
    pub src_layers: ImageSubresourceLayers,
    pub src_offset: Offset3D,
    pub dst_layers: ImageSubresourceLayers,
    pub dst_offset: Offset3D,
    pub extent: Extent3D,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BufferImageCopy {
    pub buffer_offset: u64,
    pub buffer_row_length: u32,
    pub buffer_image_height: u32,
    pub image_layers: ImageSubresourceLayers,
    pub image_offset: Offset3D,
    pub image_extent: Extent3D,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ImageBlit {
    pub src_layers: ImageSubresourceLayers,
    pub src_offsets: [Offset3D; 2],
    pub dst_layers: ImageSubresourceLayers,
    pub dst_offsets: [Offset3D; 2],
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ImageResolve {
    pub src_layers: ImageSubresourceLayers,
    pub src_offset: Offset3D,
    pub dst_layers: ImageSubresourceLayers,
    pub dst_offset: Offset3D,
    pub extent: Extent3D,
}

#[derive(Debug, Clone)]
pub struct RenderingAttachment {
    pub view: ImageView,
    pub resolve: Option<ImageView>,
    pub resolve_mode: ResolveModes,
    pub load_op: LoadOp,
    pub store_op: StoreOp,
    pub clear: ClearValue,
}

#[derive(Debug, Clone, Default)]
pub struct RenderingInfo<'a> {
    pub render_area: Rect,
    pub num_layers: u32,
    pub color_attachments: &'a [RenderingAttachment],
    pub depth_attachment: Option<&'a RenderingAttachment>,
    pub stencil_attachment: Option<&'a RenderingAttachment>,
}

/// Dynamic rasterizer state applied between draws.
#[derive(Debug, Clone, Copy)]
pub struct GraphicsState {
    pub scissor: Rect,
    pub viewport: Viewport,
    pub blend_constant: [f32; 4],
    pub stencil_test_enable: bool,
    pub front_face_stencil: StencilOpState,
    pub back_face_stencil: StencilOpState,
    pub cull_mode: CullMode,
    pub front_face: FrontFace,
    pub depth_test_enable: bool,
    pub depth_compare_op: CompareOp,
    pub depth_write_enable: bool,
    pub depth_bounds_test_enable: bool,
}

impl Default for GraphicsState {
    fn default() -> Self {
        Self {
            scissor: Rect::default(),
            viewport: Viewport::default(),
            blend_constant: [0.0; 4],
            stencil_test_enable: false,
            front_face_stencil: StencilOpState::default(),
            back_face_stencil: StencilOpState::default(),
            cull_mode: CullMode::None,
            front_face: FrontFace::CounterClockWise,
            depth_test_enable: false,
            depth_compare_op: CompareOp::Never,
            depth_write_enable: false,
            depth_bounds_test_enable: false,
        }
    }
}

/// Layout of a `dispatch_indirect` record.
#[derive(Debug, Clone, Copy, Default)]
#[repr(C)]
pub struct DispatchCommand {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

/// Layout of a `draw_indirect` record.
#[derive(Debug, Clone, Copy, Default)]
#[repr(C)]
pub struct DrawCommand {
    pub vertex_count: u32,
    pub instance_count: u32,
    pub first_vertex: u32,
    pub first_instance: u32,
}

/// Layout of a `draw_indexed_indirect` record.
#[derive(Debug, Clone, Copy, Default)]
#[repr(C)]
pub struct DrawIndexedCommand {
    pub index_count: u32,
    pub instance_count: u32,
    pub first_index: u32,
    pub vertex_offset: i32,
    pub first_instance: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SurfaceFormat {
    pub format: Format,
    pub color_space: ColorSpace,
}

#[derive(Debug, Clone, Copy)]
pub struct SwapchainInfo {
    pub label: Label,
    pub format: SurfaceFormat,
    pub usage: ImageUsage,
    pub preferred_buffering: u32,
    pub present_mode: PresentMode,
    pub preferred_extent: Extent2D,
    pub composite_alpha: CompositeAlpha,
}

/// Surface limits relevant to swapchain creation.
#[derive(Debug, Clone, Copy, Default)]
pub struct SurfaceCapabilities {
    pub image_usage: ImageUsage,
    pub composite_alpha: CompositeAlpha,
}

/// Resolves the swapchain extent from surface capabilities: surfaces that
/// report the undefined-extent sentinel let the application choose within
/// `[min, max]`; everything else is pinned to `current_extent`.
pub(crate) fn resolve_surface_extent(
    current: Extent2D,
    min: Extent2D,
    max: Extent2D,
    preferred: Extent2D,
) -> Extent2D {
    if current.width == u32::MAX && current.height == u32::MAX {
        Extent2D {
            width: preferred.width.clamp(min.width, max.width),
            height: preferred.height.clamp(min.height, max.height),
        }
    } else {
        current
    }
}

/// Clamps the preferred image count into the surface-supported range; a zero
/// `max` means "no upper bound".
pub(crate) fn resolve_min_image_count(preferred: u32, min: u32, max: u32) -> u32 {
    if max != 0 {
        preferred.clamp(min, max)
    } else {
        preferred.max(min)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mip_chain_counts() {
        assert_eq!(num_mip_levels(Extent3D::new(1, 1, 1)), 1);
        assert_eq!(num_mip_levels(Extent3D::new(256, 256, 1)), 9);
        assert_eq!(num_mip_levels(Extent3D::new(640, 480, 1)), 10);
        assert_eq!(num_mip_levels(Extent3D::new(0, 0, 0)), 0);
        assert_eq!(mip_down(Extent3D::new(256, 128, 1), 3), Extent3D::new(32, 16, 1));
        assert_eq!(mip_down(Extent3D::new(4, 4, 1), 4), Extent3D::new(1, 1, 1));
    }

    #[test]
    fn view_type_compatibility() {
        assert!(is_image_view_type_compatible(
            ImageType::Type2D,
            ImageViewType::Type2DArray
        ));
        assert!(is_image_view_type_compatible(
            ImageType::Type3D,
            ImageViewType::Type2D
        ));
        assert!(is_image_view_type_compatible(
            ImageType::Type2D,
            ImageViewType::TypeCube
        ));
        assert!(!is_image_view_type_compatible(
            ImageType::Type1D,
            ImageViewType::Type2D
        ));
        assert!(!is_image_view_type_compatible(
            ImageType::Type2D,
            ImageViewType::Type3D
        ));
    }

    #[test]
    fn surface_extent_resolution() {
        let sentinel = Extent2D::new(u32::MAX, u32::MAX);
        let min = Extent2D::new(1, 1);
        let max = Extent2D::new(4096, 4096);
        // undefined extent: preferred is clamped
        assert_eq!(
            resolve_surface_extent(sentinel, min, max, Extent2D::new(8000, 600)),
            Extent2D::new(4096, 600)
        );
        // defined extent wins over the preference
        assert_eq!(
            resolve_surface_extent(Extent2D::new(1280, 720), min, max, Extent2D::new(64, 64)),
            Extent2D::new(1280, 720)
        );
    }

    #[test]
    fn min_image_count_resolution() {
        assert_eq!(resolve_min_image_count(2, 3, 8), 3);
        assert_eq!(resolve_min_image_count(10, 2, 8), 8);
        // zero max means unbounded
        assert_eq!(resolve_min_image_count(5, 2, 0), 5);
        assert_eq!(resolve_min_image_count(1, 2, 0), 2);
    }

    #[test]
    fn flag_bits_match_vulkan() {
        assert_eq!(
            BufferUsage::STORAGE_BUFFER.to_vk(),
            vk::BufferUsageFlags::STORAGE_BUFFER
        );
        assert_eq!(
            ImageUsage::DEPTH_STENCIL_ATTACHMENT.to_vk(),
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT
        );
        assert_eq!(Format::Bgra8Unorm.to_vk(), vk::Format::B8G8R8A8_UNORM);
        assert_eq!(Format::D32FloatS8Uint.to_vk(), vk::Format::D32_SFLOAT_S8_UINT);
        assert_eq!(
            DescriptorType::DynamicStorageBuffer.to_vk(),
            vk::DescriptorType::STORAGE_BUFFER_DYNAMIC
        );
        assert_eq!(CullMode::Back.to_vk(), vk::CullModeFlags::BACK);
    }
}
