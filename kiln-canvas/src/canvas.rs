//! Shape recording and pass-run batching.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec2, Vec3, Vec4};
use kiln_gpu::{CommandEncoder, Extent2D, Offset2D, Rect};

use crate::path::Path;
use crate::text::{GlyphAtlas, TextBlock, TextBlockStyle, TextLayout};

/// Scissor covering everything; runs recorded with it merge freely.
pub const DEFAULT_SCISSOR: Rect = Rect {
    offset: Offset2D { x: 0, y: 0 },
    extent: Extent2D {
        width: u32::MAX,
        height: u32::MAX,
    },
};

const NGON_CIRCLE_SEGMENTS: u32 = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CanvasPassType {
    #[default]
    None,
    RRect,
    Blur,
    Ngon,
    Custom,
}

/// A contiguous range of typed parameter rows drawn with one pass executor
/// under one scissor. `end` is exclusive and indexes the pass type's
/// parameter array; the run starts where the previous run of the same type
/// ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanvasPassRun {
    pub ty: CanvasPassType,
    pub end: u32,
    pub scissor: Rect,
}

/// Parameters shared by every high-level canvas draw.
#[derive(Debug, Clone, Copy)]
pub struct ShapeDesc {
    /// Center position in viewport units.
    pub center: Vec2,
    pub extent: Vec2,
    /// Corner radii: top-left, top-right, bottom-right, bottom-left.
    pub border_radii: Vec4,
    /// 0 = filled, 1 = fully stroked.
    pub stroke: f32,
    /// Stroke/line thickness in viewport units.
    pub thickness: f32,
    /// Per-corner tint: top-left, top-right, bottom-right, bottom-left.
    pub tint: [Vec4; 4],
    /// Index into the bound texture array.
    pub texture: u32,
    pub uv: [Vec2; 2],
    pub tiling: f32,
    pub edge_smoothness: f32,
    pub transform: Mat4,
    /// Scissor in surface pixel coordinates.
    pub scissor: Rect,
}

impl Default for ShapeDesc {
    fn default() -> Self {
        Self {
            center: Vec2::ZERO,
            extent: Vec2::ZERO,
            border_radii: Vec4::ZERO,
            stroke: 0.0,
            thickness: 1.0,
            tint: [Vec4::ONE; 4],
            texture: 0,
            uv: [Vec2::ZERO, Vec2::ONE],
            tiling: 1.0,
            edge_smoothness: 0.0015,
            transform: Mat4::IDENTITY,
            scissor: DEFAULT_SCISSOR,
        }
    }
}

/// One instanced rounded-rectangle row, indexed by the rrect pass shader as
/// `params[gl_InstanceIndex + first_instance]`.
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct RRectParam {
    pub transform: [[f32; 4]; 4],
    pub tint: [[f32; 4]; 4],
    pub radii: [f32; 4],
    pub uv: [f32; 4],
    pub tiling: f32,
    pub aspect_ratio: f32,
    pub stroke: f32,
    pub thickness: f32,
    pub edge_smoothness: f32,
    pub albedo: u32,
    pub _pad: [u32; 2],
}

/// One indexed-triangle-list row; the matching entry of
/// `ngon_index_counts` sizes its index sub-range.
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct NgonParam {
    pub transform: [[f32; 4]; 4],
    pub tint: [f32; 4],
    pub uv: [f32; 4],
    pub tiling: f32,
    pub albedo: u32,
    pub _pad: [u32; 2],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanvasBlurParam {
    /// Blurred region in surface pixel coordinates.
    pub area: Rect,
    pub radius: u32,
}

/// Application-recorded pass invoked between batched runs, in submission
/// order.
pub type CustomPass = Box<dyn Fn(&mut CommandEncoder)>;

/// Mapping between viewport units and surface pixels for one frame.
#[derive(Debug, Clone, Copy, Default)]
pub struct CanvasSurface {
    pub viewport_offset: Vec2,
    pub viewport_extent: Vec2,
    pub surface_offset: [u32; 2],
    pub surface_extent: [u32; 2],
}

impl CanvasSurface {
    pub fn aspect_ratio(&self) -> f32 {
        if self.viewport_extent.y == 0.0 {
            0.0
        } else {
            self.viewport_extent.x / self.viewport_extent.y
        }
    }

    /// Model-view-projection for a shape: inverse-viewport scale, center
    /// translation, the shape transform, then half-extent scale.
    pub fn mvp(&self, center: Vec2, object_extent: Vec2, transform: Mat4) -> Mat4 {
        Mat4::from_scale(Vec3::new(
            1.0 / self.viewport_extent.x,
            1.0 / self.viewport_extent.y,
            1.0,
        )) * Mat4::from_translation(center.extend(0.0))
            * transform
            * Mat4::from_scale(Vec3::new(
                object_extent.x / 2.0,
                object_extent.y / 2.0,
                1.0,
            ))
    }
}

/// Host-side draw list. Cleared and refilled every frame; consumed by
/// [`crate::CanvasRenderer`].
#[derive(Default)]
pub struct Canvas {
    pub surface: CanvasSurface,
    pub vertices: Vec<Vec2>,
    pub indices: Vec<u32>,
    pub ngon_index_counts: Vec<u32>,
    pub ngon_params: Vec<NgonParam>,
    pub rrect_params: Vec<RRectParam>,
    pub blur_params: Vec<CanvasBlurParam>,
    pub custom_params: Vec<CustomPass>,
    pub pass_runs: Vec<CanvasPassRun>,
    scratch: Vec<Vec2>,
}

impl Canvas {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a frame: captures the viewport mapping and clears every array.
    pub fn begin(&mut self, surface: CanvasSurface) {
        self.clear();
        self.surface = surface;
    }

    pub fn clear(&mut self) {
        self.vertices.clear();
        self.indices.clear();
        self.ngon_index_counts.clear();
        self.ngon_params.clear();
        self.rrect_params.clear();
        self.blur_params.clear();
        self.custom_params.clear();
        self.pass_runs.clear();
    }

    /// Extends the last run when type and scissor match, otherwise opens a
    /// new one. Keeps submission order across mixed shape types while
    /// batching homogeneous adjacent draws.
    fn add_run(&mut self, ty: CanvasPassType, scissor: Rect, end: u32) {
        if let Some(last) = self.pass_runs.last_mut() {
            if last.ty == ty && last.scissor == scissor {
                last.end = end;
                return;
            }
        }
        self.pass_runs.push(CanvasPassRun { ty, end, scissor });
    }

    fn push_rrect_param(&mut self, desc: &ShapeDesc, radii: Vec4) {
        let aspect_ratio = if desc.extent.y == 0.0 {
            1.0
        } else {
            desc.extent.x / desc.extent.y
        };
        self.rrect_params.push(RRectParam {
            transform: self
                .surface
                .mvp(desc.center, desc.extent, desc.transform)
                .to_cols_array_2d(),
            tint: [
                desc.tint[0].to_array(),
                desc.tint[1].to_array(),
                desc.tint[2].to_array(),
                desc.tint[3].to_array(),
            ],
            radii: radii.to_array(),
            uv: [desc.uv[0].x, desc.uv[0].y, desc.uv[1].x, desc.uv[1].y],
            tiling: desc.tiling,
            aspect_ratio,
            stroke: desc.stroke,
            thickness: desc.thickness,
            edge_smoothness: desc.edge_smoothness,
            albedo: desc.texture,
            _pad: [0; 2],
        });
        let end = self.rrect_params.len() as u32;
        self.add_run(CanvasPassType::RRect, desc.scissor, end);
    }

    pub fn rect(&mut self, desc: &ShapeDesc) {
        self.push_rrect_param(desc, Vec4::ZERO);
    }

    pub fn rrect(&mut self, desc: &ShapeDesc) {
        self.push_rrect_param(desc, desc.border_radii);
    }

    pub fn circle(&mut self, desc: &ShapeDesc) {
        let mut points = std::mem::take(&mut self.scratch);
        points.clear();
        Path::circle(&mut points, NGON_CIRCLE_SEGMENTS);
        self.ngon(desc, &points);
        self.scratch = points;
    }

    /// Filled convex polygon from points in [-1, +1]².
    pub fn ngon(&mut self, desc: &ShapeDesc, points: &[Vec2]) {
        if points.len() < 3 {
            return;
        }
        let first_index = self.indices.len();
        Path::triangulate_ngon(points, &mut self.vertices, &mut self.indices);
        self.push_ngon_param(desc, (self.indices.len() - first_index) as u32);
    }

    /// Stroked polyline from points in [-1, +1]².
    pub fn line(&mut self, desc: &ShapeDesc, points: &[Vec2]) {
        if points.len() < 2 {
            return;
        }
        // thickness in viewport units, extruded in normalized shape space
        let reference = desc.extent.min_element().max(f32::EPSILON);
        let thickness = (2.0 * desc.thickness / reference).min(2.0);
        let first_index = self.indices.len();
        Path::triangulate_stroke(points, &mut self.vertices, &mut self.indices, thickness);
        self.push_ngon_param(desc, (self.indices.len() - first_index) as u32);
    }

    fn push_ngon_param(&mut self, desc: &ShapeDesc, index_count: u32) {
        if index_count == 0 {
            return;
        }
        self.ngon_index_counts.push(index_count);
        self.ngon_params.push(NgonParam {
            transform: self
                .surface
                .mvp(desc.center, desc.extent, desc.transform)
                .to_cols_array_2d(),
            tint: desc.tint[0].to_array(),
            uv: [desc.uv[0].x, desc.uv[0].y, desc.uv[1].x, desc.uv[1].y],
            tiling: desc.tiling,
            albedo: desc.texture,
            _pad: [0; 2],
        });
        let end = self.ngon_params.len() as u32;
        self.add_run(CanvasPassType::Ngon, desc.scissor, end);
    }

    /// Blurs the scissor region of the already-rendered surface.
    pub fn blur(&mut self, desc: &ShapeDesc, radius: u32) {
        if radius == 0 {
            return;
        }
        self.blur_params.push(CanvasBlurParam {
            area: desc.scissor,
            radius,
        });
        let end = self.blur_params.len() as u32;
        self.add_run(CanvasPassType::Blur, desc.scissor, end);
    }

    pub fn custom(&mut self, scissor: Rect, pass: CustomPass) {
        self.custom_params.push(pass);
        let end = self.custom_params.len() as u32;
        self.add_run(CanvasPassType::Custom, scissor, end);
    }

    /// Submits one rrect-like quad per shaped glyph, UVs from the SDF atlas
    /// bin and tint from the glyph's run style.
    pub fn text(
        &mut self,
        desc: &ShapeDesc,
        block: &TextBlock,
        layout: &TextLayout,
        style: &TextBlockStyle,
        atlas: &GlyphAtlas,
    ) {
        let _ = block;
        let origin = desc.center - layout.extent * 0.5;
        for shaped in &layout.glyphs {
            let Some(bin) = atlas.get(shaped.glyph) else {
                continue;
            };
            let run_style = style.run(shaped.run);
            let scale = run_style.font_height / atlas.font_height.max(f32::EPSILON);
            let glyph_extent = bin.extent * scale;
            if glyph_extent.x <= 0.0 || glyph_extent.y <= 0.0 {
                continue;
            }
            let center = origin + shaped.offset + bin.bearing * scale + glyph_extent * 0.5;
            let glyph_desc = ShapeDesc {
                center,
                extent: glyph_extent,
                border_radii: Vec4::ZERO,
                stroke: 0.0,
                tint: [run_style.color; 4],
                texture: bin.texture,
                uv: [bin.uv0, bin.uv1],
                ..*desc
            };
            self.push_rrect_param(&glyph_desc, Vec4::ZERO);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn surface() -> CanvasSurface {
        CanvasSurface {
            viewport_offset: Vec2::ZERO,
            viewport_extent: Vec2::new(1920.0, 1080.0),
            surface_offset: [0, 0],
            surface_extent: [1920, 1080],
        }
    }

    fn scissored(scissor: Rect) -> ShapeDesc {
        ShapeDesc {
            extent: Vec2::new(100.0, 50.0),
            scissor,
            ..ShapeDesc::default()
        }
    }

    #[test]
    fn adjacent_same_type_runs_merge() {
        let mut canvas = Canvas::new();
        canvas.begin(surface());
        let desc = scissored(DEFAULT_SCISSOR);

        canvas.rrect(&desc);
        canvas.rrect(&desc);
        let triangle = [Vec2::new(-1.0, -1.0), Vec2::new(1.0, -1.0), Vec2::new(0.0, 1.0)];
        canvas.ngon(&desc, &triangle);
        canvas.rrect(&desc);

        let runs: Vec<(CanvasPassType, u32)> =
            canvas.pass_runs.iter().map(|run| (run.ty, run.end)).collect();
        assert_eq!(
            runs,
            vec![
                (CanvasPassType::RRect, 2),
                (CanvasPassType::Ngon, 1),
                (CanvasPassType::RRect, 3),
            ]
        );
    }

    #[test]
    fn differing_scissors_split_runs() {
        let mut canvas = Canvas::new();
        canvas.begin(surface());
        let clip = Rect {
            offset: Offset2D { x: 10, y: 10 },
            extent: Extent2D {
                width: 64,
                height: 64,
            },
        };

        canvas.rect(&scissored(DEFAULT_SCISSOR));
        canvas.rect(&scissored(clip));
        canvas.rect(&scissored(clip));

        assert_eq!(canvas.pass_runs.len(), 2);
        assert_eq!(canvas.pass_runs[0].end, 1);
        assert_eq!(canvas.pass_runs[1].end, 3);
        assert_eq!(canvas.pass_runs[1].scissor, clip);
    }

    #[test]
    fn no_adjacent_runs_share_type_and_scissor() {
        let mut canvas = Canvas::new();
        canvas.begin(surface());
        let clip = Rect {
            offset: Offset2D { x: 0, y: 0 },
            extent: Extent2D {
                width: 128,
                height: 128,
            },
        };
        let triangle = [Vec2::new(-1.0, -1.0), Vec2::new(1.0, -1.0), Vec2::new(0.0, 1.0)];

        canvas.rect(&scissored(DEFAULT_SCISSOR));
        canvas.ngon(&scissored(DEFAULT_SCISSOR), &triangle);
        canvas.rect(&scissored(clip));
        canvas.rect(&scissored(clip));
        canvas.blur(&scissored(clip), 4);
        canvas.rect(&scissored(clip));

        for pair in canvas.pass_runs.windows(2) {
            assert!(
                pair[0].ty != pair[1].ty || pair[0].scissor != pair[1].scissor,
                "adjacent runs with identical type and scissor must merge"
            );
        }
    }

    #[test]
    fn ngon_rows_track_index_counts() {
        let mut canvas = Canvas::new();
        canvas.begin(surface());
        let desc = scissored(DEFAULT_SCISSOR);
        let quad = [
            Vec2::new(-1.0, -1.0),
            Vec2::new(1.0, -1.0),
            Vec2::new(1.0, 1.0),
            Vec2::new(-1.0, 1.0),
        ];
        let triangle = [Vec2::new(-1.0, -1.0), Vec2::new(1.0, -1.0), Vec2::new(0.0, 1.0)];

        canvas.ngon(&desc, &quad);
        canvas.ngon(&desc, &triangle);

        assert_eq!(canvas.ngon_index_counts, vec![6, 3]);
        assert_eq!(canvas.indices.len(), 9);
        assert_eq!(canvas.ngon_params.len(), 2);
        // indices are absolute into the shared vertex arena
        assert!(canvas.indices[6..].iter().all(|&i| i >= 4));
    }

    #[test]
    fn mvp_scales_center_into_viewport() {
        let surface = surface();
        let mvp = surface.mvp(Vec2::new(960.0, 540.0), Vec2::new(200.0, 100.0), Mat4::IDENTITY);
        // shape-space corner (1, 1) lands at center + half-extent, divided by
        // the viewport extent
        let corner = mvp * Vec4::new(1.0, 1.0, 0.0, 1.0);
        assert!((corner.x - (960.0 + 100.0) / 1920.0).abs() < 1e-5);
        assert!((corner.y - (540.0 + 50.0) / 1080.0).abs() < 1e-5);
    }

    #[test]
    fn begin_resets_previous_frame() {
        let mut canvas = Canvas::new();
        canvas.begin(surface());
        canvas.rect(&scissored(DEFAULT_SCISSOR));
        canvas.blur(&scissored(DEFAULT_SCISSOR), 2);
        assert!(!canvas.pass_runs.is_empty());

        canvas.begin(surface());
        assert!(canvas.rrect_params.is_empty());
        assert!(canvas.blur_params.is_empty());
        assert!(canvas.pass_runs.is_empty());
    }

    #[test]
    fn zero_radius_blur_is_dropped() {
        let mut canvas = Canvas::new();
        canvas.begin(surface());
        canvas.blur(&scissored(DEFAULT_SCISSOR), 0);
        assert!(canvas.blur_params.is_empty());
        assert!(canvas.pass_runs.is_empty());
    }
}
