//! Kiln 2D canvas.
//!
//! The [`Canvas`] records shapes, text, blurs, and custom passes into typed
//! parameter arrays batched into pass runs; the [`CanvasRenderer`] uploads
//! those arrays and replays the runs through the rrect/ngon/blur pass
//! executors against the GPU core.

mod canvas;
mod path;
mod passes;
mod renderer;
mod text;

pub use canvas::{
    Canvas, CanvasBlurParam, CanvasPassRun, CanvasPassType, CanvasSurface, CustomPass, NgonParam,
    RRectParam, ShapeDesc, DEFAULT_SCISSOR,
};
pub use passes::blur::{BlurMip, BlurPass, BlurPassDesc, BlurPassParams};
pub use passes::ngon::{NgonPass, NgonPassDesc, NgonPassParams};
pub use passes::rrect::{RRectPass, RRectPassDesc, RRectPassParams};
pub use path::Path;
pub use renderer::{CanvasRenderer, CanvasRendererDesc, CanvasTarget};
pub use text::{AtlasGlyph, GlyphAtlas, ShapedGlyph, TextBlock, TextBlockStyle, TextLayout, TextRunStyle};
