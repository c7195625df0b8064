//! Stateless path generators and triangulators.
//!
//! All generators emit points in the [-1, +1] square; callers scale them to
//! shape extents through the per-draw transform. Triangulators turn point
//! lists into vertex/index pairs appended to the canvas's shared arenas.

use glam::Vec2;

pub struct Path;

impl Path {
    pub fn rect(vtx: &mut Vec<Vec2>) {
        vtx.extend_from_slice(&[
            Vec2::new(-1.0, -1.0),
            Vec2::new(1.0, -1.0),
            Vec2::new(1.0, 1.0),
            Vec2::new(-1.0, 1.0),
        ]);
    }

    /// Unit-circle arc from `start` to `stop` radians, `segments` points.
    pub fn arc(vtx: &mut Vec<Vec2>, segments: u32, start: f32, stop: f32) {
        if segments < 2 {
            return;
        }
        let step = (stop - start) / (segments - 1) as f32;
        vtx.reserve(segments as usize);
        for i in 0..segments {
            let angle = start + step * i as f32;
            vtx.push(Vec2::new(angle.cos(), angle.sin()));
        }
    }

    pub fn circle(vtx: &mut Vec<Vec2>, segments: u32) {
        if segments < 3 {
            return;
        }
        let step = std::f32::consts::TAU / segments as f32;
        vtx.reserve(segments as usize);
        for i in 0..segments {
            let angle = step * i as f32;
            vtx.push(Vec2::new(angle.cos(), angle.sin()));
        }
    }

    /// Rounded rectangle outline; `radii` are the normalized corner radii in
    /// the order top-left, top-right, bottom-right, bottom-left, `segments`
    /// points per corner arc.
    pub fn rrect(vtx: &mut Vec<Vec2>, segments: u32, radii: glam::Vec4) {
        use std::f32::consts::FRAC_PI_2;
        if segments < 2 {
            return;
        }
        let radii = radii.clamp(glam::Vec4::ZERO, glam::Vec4::ONE);
        // corner centers, arc start angles
        let corners = [
            (Vec2::new(1.0 - radii.z, 1.0 - radii.z), 0.0, radii.z),
            (Vec2::new(-1.0 + radii.w, 1.0 - radii.w), FRAC_PI_2, radii.w),
            (Vec2::new(-1.0 + radii.x, -1.0 + radii.x), 2.0 * FRAC_PI_2, radii.x),
            (Vec2::new(1.0 - radii.y, -1.0 + radii.y), 3.0 * FRAC_PI_2, radii.y),
        ];
        let step = FRAC_PI_2 / (segments - 1) as f32;
        for (center, start, radius) in corners {
            for i in 0..segments {
                let angle = start + step * i as f32;
                vtx.push(center + radius * Vec2::new(angle.cos(), angle.sin()));
            }
        }
    }

    /// Beveled rectangle; `slants` are the normalized corner cut lengths in
    /// the order top-left, top-right, bottom-right, bottom-left.
    pub fn brect(vtx: &mut Vec<Vec2>, slants: glam::Vec4) {
        let slants = slants.clamp(glam::Vec4::ZERO, glam::Vec4::splat(2.0));
        vtx.extend_from_slice(&[
            Vec2::new(-1.0 + slants.x, -1.0),
            Vec2::new(1.0 - slants.y, -1.0),
            Vec2::new(1.0, -1.0 + slants.y),
            Vec2::new(1.0, 1.0 - slants.z),
            Vec2::new(1.0 - slants.z, 1.0),
            Vec2::new(-1.0 + slants.w, 1.0),
            Vec2::new(-1.0, 1.0 - slants.w),
            Vec2::new(-1.0, -1.0 + slants.x),
        ]);
    }

    pub fn bezier(vtx: &mut Vec<Vec2>, segments: u32, cp0: Vec2, cp1: Vec2, cp2: Vec2) {
        if segments < 2 {
            return;
        }
        let step = 1.0 / (segments - 1) as f32;
        vtx.reserve(segments as usize);
        for i in 0..segments {
            let t = step * i as f32;
            let u = 1.0 - t;
            vtx.push(u * u * cp0 + 2.0 * u * t * cp1 + t * t * cp2);
        }
    }

    pub fn cubic_bezier(
        vtx: &mut Vec<Vec2>,
        segments: u32,
        cp0: Vec2,
        cp1: Vec2,
        cp2: Vec2,
        cp3: Vec2,
    ) {
        if segments < 2 {
            return;
        }
        let step = 1.0 / (segments - 1) as f32;
        vtx.reserve(segments as usize);
        for i in 0..segments {
            let t = step * i as f32;
            let u = 1.0 - t;
            vtx.push(
                u * u * u * cp0
                    + 3.0 * u * u * t * cp1
                    + 3.0 * u * t * t * cp2
                    + t * t * t * cp3,
            );
        }
    }

    /// Catmull-Rom segment through `cp1..cp2` with `cp0`/`cp3` as tangent
    /// controls.
    pub fn catmull_rom(
        vtx: &mut Vec<Vec2>,
        segments: u32,
        cp0: Vec2,
        cp1: Vec2,
        cp2: Vec2,
        cp3: Vec2,
    ) {
        if segments < 2 {
            return;
        }
        let step = 1.0 / (segments - 1) as f32;
        vtx.reserve(segments as usize);
        for i in 0..segments {
            let t = step * i as f32;
            let t2 = t * t;
            let t3 = t2 * t;
            vtx.push(
                0.5 * ((2.0 * cp1)
                    + (-cp0 + cp2) * t
                    + (2.0 * cp0 - 5.0 * cp1 + 4.0 * cp2 - cp3) * t2
                    + (-cp0 + 3.0 * cp1 - 3.0 * cp2 + cp3) * t3),
            );
        }
    }

    /// Convex-fan triangulation of a polygon outline. Appends to the shared
    /// arenas; emitted indices are relative to the appended vertices.
    pub fn triangulate_ngon(points: &[Vec2], vtx: &mut Vec<Vec2>, idx: &mut Vec<u32>) {
        if points.len() < 3 {
            return;
        }
        let first = vtx.len() as u32;
        vtx.extend_from_slice(points);
        for i in 1..(points.len() as u32 - 1) {
            idx.extend_from_slice(&[first, first + i, first + i + 1]);
        }
    }

    /// Extrudes a polyline to `thickness` along per-segment normals and
    /// joins segments with bevels at the shared point.
    pub fn triangulate_stroke(points: &[Vec2], vtx: &mut Vec<Vec2>, idx: &mut Vec<u32>, thickness: f32) {
        if points.len() < 2 {
            return;
        }
        let half = thickness * 0.5;
        let mut previous_edge: Option<(u32, u32)> = None;

        for window in points.windows(2) {
            let (a, b) = (window[0], window[1]);
            let direction = b - a;
            if direction.length_squared() <= f32::EPSILON {
                continue;
            }
            let normal = Vec2::new(-direction.y, direction.x).normalize() * half;

            let base = vtx.len() as u32;
            vtx.extend_from_slice(&[a + normal, a - normal, b + normal, b - normal]);
            idx.extend_from_slice(&[base, base + 2, base + 1, base + 1, base + 2, base + 3]);

            // bevel the joint between this segment and the previous one
            if let Some((prev_top, prev_bottom)) = previous_edge {
                let joint = vtx.len() as u32;
                vtx.push(a);
                idx.extend_from_slice(&[prev_top, base, joint, base + 1, prev_bottom, joint]);
            }
            previous_edge = Some((base + 2, base + 3));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rect_is_a_unit_quad() {
        let mut vtx = Vec::new();
        Path::rect(&mut vtx);
        assert_eq!(vtx.len(), 4);
        assert!(vtx.iter().all(|p| p.abs().max_element() <= 1.0));
    }

    #[test]
    fn circle_points_lie_on_the_unit_circle() {
        let mut vtx = Vec::new();
        Path::circle(&mut vtx, 16);
        assert_eq!(vtx.len(), 16);
        for point in &vtx {
            assert!((point.length() - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn arc_spans_requested_angles() {
        let mut vtx = Vec::new();
        Path::arc(&mut vtx, 8, 0.0, std::f32::consts::FRAC_PI_2);
        assert_eq!(vtx.len(), 8);
        assert!((vtx[0] - Vec2::new(1.0, 0.0)).length() < 1e-5);
        assert!((vtx[7] - Vec2::new(0.0, 1.0)).length() < 1e-5);
    }

    #[test]
    fn rrect_with_zero_radii_collapses_to_corners() {
        let mut vtx = Vec::new();
        Path::rrect(&mut vtx, 4, glam::Vec4::ZERO);
        assert_eq!(vtx.len(), 16);
        // each corner arc degenerates onto its corner point
        for point in &vtx {
            assert!((point.x.abs() - 1.0).abs() < 1e-5);
            assert!((point.y.abs() - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn rrect_with_full_radii_is_the_unit_circle() {
        let mut vtx = Vec::new();
        Path::rrect(&mut vtx, 8, glam::Vec4::ONE);
        assert_eq!(vtx.len(), 32);
        for point in &vtx {
            assert!((point.length() - 1.0).abs() < 1e-5);
            assert!(point.abs().max_element() <= 1.0 + 1e-5);
        }
    }

    #[test]
    fn brect_cuts_the_slanted_corners() {
        let mut vtx = Vec::new();
        Path::brect(&mut vtx, glam::Vec4::new(0.5, 0.0, 0.0, 0.0));
        assert_eq!(vtx.len(), 8);
        // top-left corner is cut, the others stay sharp
        assert!((vtx[0] - Vec2::new(-0.5, -1.0)).length() < 1e-5);
        assert!((vtx[7] - Vec2::new(-1.0, -0.5)).length() < 1e-5);
        assert!((vtx[1] - Vec2::new(1.0, -1.0)).length() < 1e-5);
        assert!((vtx[4] - Vec2::new(1.0, 1.0)).length() < 1e-5);
        assert!(vtx.iter().all(|p| p.abs().max_element() <= 1.0));
    }

    #[test]
    fn bezier_interpolates_its_endpoints() {
        let mut vtx = Vec::new();
        let (cp0, cp1, cp2) = (
            Vec2::new(-1.0, 0.0),
            Vec2::new(0.0, 1.0),
            Vec2::new(1.0, 0.0),
        );
        Path::bezier(&mut vtx, 9, cp0, cp1, cp2);
        assert_eq!(vtx.len(), 9);
        assert!((vtx[0] - cp0).length() < 1e-5);
        assert!((vtx[8] - cp2).length() < 1e-5);
        // quadratic midpoint: cp0/4 + cp1/2 + cp2/4
        let mid = 0.25 * cp0 + 0.5 * cp1 + 0.25 * cp2;
        assert!((vtx[4] - mid).length() < 1e-5);
    }

    #[test]
    fn cubic_bezier_interpolates_its_endpoints() {
        let mut vtx = Vec::new();
        let (cp0, cp1, cp2, cp3) = (
            Vec2::new(-1.0, -1.0),
            Vec2::new(-0.5, 1.0),
            Vec2::new(0.5, 1.0),
            Vec2::new(1.0, -1.0),
        );
        Path::cubic_bezier(&mut vtx, 9, cp0, cp1, cp2, cp3);
        assert_eq!(vtx.len(), 9);
        assert!((vtx[0] - cp0).length() < 1e-5);
        assert!((vtx[8] - cp3).length() < 1e-5);
        // cubic midpoint: (cp0 + 3 cp1 + 3 cp2 + cp3) / 8
        let mid = (cp0 + 3.0 * cp1 + 3.0 * cp2 + cp3) / 8.0;
        assert!((vtx[4] - mid).length() < 1e-5);
    }

    #[test]
    fn catmull_rom_passes_through_its_inner_controls() {
        let mut vtx = Vec::new();
        let (cp0, cp1, cp2, cp3) = (
            Vec2::new(-1.0, 0.0),
            Vec2::new(-0.5, 0.5),
            Vec2::new(0.5, -0.5),
            Vec2::new(1.0, 0.0),
        );
        Path::catmull_rom(&mut vtx, 9, cp0, cp1, cp2, cp3);
        assert_eq!(vtx.len(), 9);
        // the spline interpolates cp1..cp2; cp0/cp3 only shape the tangents
        assert!((vtx[0] - cp1).length() < 1e-5);
        assert!((vtx[8] - cp2).length() < 1e-5);
    }

    #[test]
    fn ngon_fan_topology() {
        let mut vtx = Vec::new();
        let mut idx = Vec::new();
        let pentagon: Vec<Vec2> = (0..5)
            .map(|i| {
                let angle = std::f32::consts::TAU * i as f32 / 5.0;
                Vec2::new(angle.cos(), angle.sin())
            })
            .collect();
        Path::triangulate_ngon(&pentagon, &mut vtx, &mut idx);
        assert_eq!(vtx.len(), 5);
        // n-gon fan: n - 2 triangles
        assert_eq!(idx.len(), 3 * 3);
        assert!(idx.iter().all(|&i| (i as usize) < vtx.len()));
    }

    #[test]
    fn ngon_indices_are_arena_relative() {
        let mut vtx = vec![Vec2::ZERO; 7];
        let mut idx = Vec::new();
        let triangle = [Vec2::new(0.0, 0.0), Vec2::new(1.0, 0.0), Vec2::new(0.0, 1.0)];
        Path::triangulate_ngon(&triangle, &mut vtx, &mut idx);
        assert_eq!(idx, vec![7, 8, 9]);
    }

    #[test]
    fn stroke_emits_quads_and_bevels() {
        let mut vtx = Vec::new();
        let mut idx = Vec::new();
        let polyline = [
            Vec2::new(-1.0, 0.0),
            Vec2::new(0.0, 0.0),
            Vec2::new(0.0, 1.0),
        ];
        Path::triangulate_stroke(&polyline, &mut vtx, &mut idx, 0.2);
        // two segment quads (4 verts each) plus one bevel joint vertex
        assert_eq!(vtx.len(), 9);
        // two quads (6 indices each) plus two bevel triangles
        assert_eq!(idx.len(), 12 + 6);
        assert!(idx.iter().all(|&i| (i as usize) < vtx.len()));
    }

    #[test]
    fn degenerate_inputs_produce_nothing() {
        let mut vtx = Vec::new();
        let mut idx = Vec::new();
        Path::triangulate_ngon(&[Vec2::ZERO, Vec2::ONE], &mut vtx, &mut idx);
        Path::triangulate_stroke(&[Vec2::ZERO], &mut vtx, &mut idx, 1.0);
        assert!(vtx.is_empty() && idx.is_empty());
    }
}
