//! Pre-shaped text consumption.
//!
//! Shaping and atlas packing happen outside the canvas; what arrives here is
//! a glyph layout plus the SDF atlas bins the glyphs were packed into. The
//! canvas turns each glyph into one textured quad.

use glam::{Vec2, Vec4};

/// Placement of one glyph in the SDF atlas.
#[derive(Debug, Clone, Copy, Default)]
pub struct AtlasGlyph {
    pub uv0: Vec2,
    pub uv1: Vec2,
    /// Glyph extent in atlas pixels at the atlas font height.
    pub extent: Vec2,
    /// Offset from the pen position to the glyph box origin.
    pub bearing: Vec2,
    /// Index of the atlas texture in the bound texture array.
    pub texture: u32,
}

/// Lookup table from glyph index to atlas bin, produced by the font
/// rasterizer.
#[derive(Debug, Clone, Default)]
pub struct GlyphAtlas {
    pub glyphs: Vec<AtlasGlyph>,
    /// Font height the atlas was rasterized at; styles scale relative to it.
    pub font_height: f32,
}

impl GlyphAtlas {
    pub fn get(&self, glyph: u32) -> Option<&AtlasGlyph> {
        self.glyphs.get(glyph as usize)
    }
}

/// One positioned glyph out of the shaper.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShapedGlyph {
    pub glyph: u32,
    /// Index of the style run this glyph belongs to.
    pub run: u32,
    /// Pen offset from the block origin, layout-resolved.
    pub offset: Vec2,
    pub advance: f32,
}

/// Source text; carried alongside the layout for callers that need to map
/// glyphs back to clusters.
#[derive(Debug, Clone, Default)]
pub struct TextBlock {
    pub text: String,
}

/// Shaped layout of a block: absolute glyph offsets plus the block extent.
#[derive(Debug, Clone, Default)]
pub struct TextLayout {
    pub glyphs: Vec<ShapedGlyph>,
    pub extent: Vec2,
}

#[derive(Debug, Clone, Copy)]
pub struct TextRunStyle {
    pub color: Vec4,
    pub font_height: f32,
}

impl Default for TextRunStyle {
    fn default() -> Self {
        Self {
            color: Vec4::ONE,
            font_height: 16.0,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TextBlockStyle {
    pub runs: Vec<TextRunStyle>,
    pub default_style: TextRunStyle,
}

impl TextBlockStyle {
    /// Style of run `index`, falling back to the block default.
    pub fn run(&self, index: u32) -> TextRunStyle {
        self.runs
            .get(index as usize)
            .copied()
            .unwrap_or(self.default_style)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::{Canvas, CanvasPassType, CanvasSurface, ShapeDesc, DEFAULT_SCISSOR};

    fn atlas() -> GlyphAtlas {
        GlyphAtlas {
            glyphs: vec![
                AtlasGlyph {
                    uv0: Vec2::new(0.0, 0.0),
                    uv1: Vec2::new(0.25, 0.25),
                    extent: Vec2::new(10.0, 14.0),
                    bearing: Vec2::new(1.0, 2.0),
                    texture: 3,
                },
                AtlasGlyph {
                    uv0: Vec2::new(0.25, 0.0),
                    uv1: Vec2::new(0.5, 0.25),
                    extent: Vec2::new(8.0, 14.0),
                    bearing: Vec2::ZERO,
                    texture: 3,
                },
            ],
            font_height: 16.0,
        }
    }

    #[test]
    fn glyphs_expand_to_rrect_quads() {
        let mut canvas = Canvas::new();
        canvas.begin(CanvasSurface {
            viewport_extent: Vec2::new(800.0, 600.0),
            surface_extent: [800, 600],
            ..CanvasSurface::default()
        });

        let layout = TextLayout {
            glyphs: vec![
                ShapedGlyph {
                    glyph: 0,
                    run: 0,
                    offset: Vec2::new(0.0, 0.0),
                    advance: 11.0,
                },
                ShapedGlyph {
                    glyph: 1,
                    run: 0,
                    offset: Vec2::new(11.0, 0.0),
                    advance: 9.0,
                },
                // out-of-atlas glyph is skipped
                ShapedGlyph {
                    glyph: 99,
                    run: 0,
                    offset: Vec2::new(20.0, 0.0),
                    advance: 9.0,
                },
            ],
            extent: Vec2::new(29.0, 16.0),
        };
        let style = TextBlockStyle {
            runs: vec![TextRunStyle {
                color: Vec4::new(1.0, 0.5, 0.0, 1.0),
                font_height: 32.0,
            }],
            ..TextBlockStyle::default()
        };

        canvas.text(
            &ShapeDesc::default(),
            &TextBlock {
                text: "ab?".to_string(),
            },
            &layout,
            &style,
            &atlas(),
        );

        assert_eq!(canvas.rrect_params.len(), 2);
        assert_eq!(canvas.pass_runs.len(), 1);
        assert_eq!(canvas.pass_runs[0].ty, CanvasPassType::RRect);
        assert_eq!(canvas.pass_runs[0].end, 2);
        assert_eq!(canvas.pass_runs[0].scissor, DEFAULT_SCISSOR);
        // the 2x style scale doubles the quad and carries the atlas bin
        let first = &canvas.rrect_params[0];
        assert_eq!(first.albedo, 3);
        assert_eq!(first.uv, [0.0, 0.0, 0.25, 0.25]);
        assert_eq!(first.tint[0], [1.0, 0.5, 0.0, 1.0]);
    }
}
