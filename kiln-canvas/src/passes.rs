//! Pass executors: each owns its graphics pipeline(s) and translates a run's
//! parameter rows into GPU draws.

pub mod blur;
pub mod ngon;
pub mod rrect;

use kiln_gpu::{
    BlendFactor, BlendOp, ColorBlendAttachmentState, ColorComponents, GraphicsState, Rect,
    Viewport,
};

/// Premultiplied-style alpha blending shared by the shape pipelines.
pub(crate) fn alpha_blend_attachment() -> ColorBlendAttachmentState {
    ColorBlendAttachmentState {
        blend_enable: true,
        src_color_blend_factor: BlendFactor::SrcAlpha,
        dst_color_blend_factor: BlendFactor::OneMinusSrcAlpha,
        color_blend_op: BlendOp::Add,
        src_alpha_blend_factor: BlendFactor::One,
        dst_alpha_blend_factor: BlendFactor::OneMinusSrcAlpha,
        alpha_blend_op: BlendOp::Add,
        color_write_mask: ColorComponents::ALL,
    }
}

/// Baseline dynamic state for a canvas pass: the run's scissor and a
/// full-target viewport, everything else off.
pub(crate) fn pass_graphics_state(scissor: Rect, extent: kiln_gpu::Extent2D) -> GraphicsState {
    GraphicsState {
        scissor,
        viewport: Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        },
        blend_constant: [1.0, 1.0, 1.0, 1.0],
        ..GraphicsState::default()
    }
}
