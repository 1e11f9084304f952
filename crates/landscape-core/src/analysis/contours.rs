//! Iso-roughness contour lines by marching squares.
//!
//! Cells are the quads between four neighbouring samples. Corner bits:
//! top-left 8, top-right 4, bottom-right 2, bottom-left 1, where "top" is
//! the lower row index. A bit is set when the corner lies above the level.
//! Segment endpoints are in metric coordinates.
use serde::{Deserialize, Serialize};

use crate::field::ScalarField;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContourSegment {
    pub a: [f64; 2],
    pub b: [f64; 2],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContourLevel {
    pub level: f64,
    pub segments: Vec<ContourSegment>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Edge {
    Top,
    Right,
    Bottom,
    Left,
}

/// Edge pairs crossed for each corner mask. Saddles (5, 10) depend on the
/// centre value and are resolved in [`cell_edges`].
const CASES: [&[(Edge, Edge)]; 16] = {
    use Edge::*;
    [
        &[],
        &[(Left, Bottom)],
        &[(Bottom, Right)],
        &[(Left, Right)],
        &[(Top, Right)],
        &[],
        &[(Top, Bottom)],
        &[(Left, Top)],
        &[(Left, Top)],
        &[(Top, Bottom)],
        &[],
        &[(Top, Right)],
        &[(Left, Right)],
        &[(Bottom, Right)],
        &[(Left, Bottom)],
        &[],
    ]
};

fn cell_edges(mask: u8, centre_above: bool) -> &'static [(Edge, Edge)] {
    use Edge::*;
    match (mask, centre_above) {
        // tr + bl above. Joined through the centre: cut off tl and br.
        (5, true) => &[(Left, Top), (Bottom, Right)],
        (5, false) => &[(Top, Right), (Left, Bottom)],
        // tl + br above.
        (10, true) => &[(Top, Right), (Left, Bottom)],
        (10, false) => &[(Left, Top), (Bottom, Right)],
        _ => CASES[mask as usize & 15],
    }
}

/// Position along an edge from `(p0, v0)` to `(p1, v1)` where the level is
/// crossed; the midpoint when the two values coincide.
fn interpolate(p0: [f64; 2], v0: f64, p1: [f64; 2], v1: f64, level: f64) -> [f64; 2] {
    let dv = v1 - v0;
    let t = if dv.abs() < 1e-15 { 0.5 } else { ((level - v0) / dv).clamp(0.0, 1.0) };
    [p0[0] + (p1[0] - p0[0]) * t, p0[1] + (p1[1] - p0[1]) * t]
}

/// Segments of the `level` iso-line. Cells with a non-finite corner are skipped.
pub fn build_contours(field: &ScalarField, level: f64) -> Vec<ContourSegment> {
    let (w, h) = (field.width, field.height);
    let mut out = Vec::new();
    if w < 2 || h < 2 || !level.is_finite() {
        return out;
    }
    let (mx, my) = (&field.metric_x, &field.metric_y);
    for r in 0..h - 1 {
        for c in 0..w - 1 {
            let tl = field.get(r, c);
            let tr = field.get(r, c + 1);
            let br = field.get(r + 1, c + 1);
            let bl = field.get(r + 1, c);
            if ![tl, tr, br, bl].iter().all(|v| v.is_finite()) {
                continue;
            }
            let mask = (u8::from(tl > level) << 3)
                | (u8::from(tr > level) << 2)
                | (u8::from(br > level) << 1)
                | u8::from(bl > level);
            if mask == 0 || mask == 15 {
                continue;
            }
            let centre_above = (tl + tr + br + bl) * 0.25 > level;

            let p_tl = [mx[c], my[r]];
            let p_tr = [mx[c + 1], my[r]];
            let p_br = [mx[c + 1], my[r + 1]];
            let p_bl = [mx[c], my[r + 1]];
            let point = |e: Edge| match e {
                Edge::Top => interpolate(p_tl, tl, p_tr, tr, level),
                Edge::Right => interpolate(p_tr, tr, p_br, br, level),
                Edge::Bottom => interpolate(p_bl, bl, p_br, br, level),
                Edge::Left => interpolate(p_tl, tl, p_bl, bl, level),
            };
            for &(e0, e1) in cell_edges(mask, centre_above) {
                out.push(ContourSegment { a: point(e0), b: point(e1) });
            }
        }
    }
    out
}

pub fn build_contour_levels(field: &ScalarField, levels: &[f64]) -> Vec<ContourLevel> {
    levels
        .iter()
        .map(|&level| ContourLevel { level, segments: build_contours(field, level) })
        .collect()
}

/// `count` evenly spaced levels strictly inside `(min, max)`.
pub fn contour_levels(min: f64, max: f64, count: usize) -> Vec<f64> {
    if !(min.is_finite() && max.is_finite()) || max <= min {
        return Vec::new();
    }
    let step = (max - min) / (count + 1) as f64;
    (1..=count).map(|k| min + step * k as f64).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 2×2 field on the unit square with the corners set from `mask`.
    fn quad(mask: u8) -> ScalarField {
        let bit = |b: u8| if mask & b != 0 { 1.0 } else { 0.0 };
        // Row-major: tl, tr, bl, br.
        ScalarField::uniform(2, 2, vec![bit(8), bit(4), bit(1), bit(2)])
    }

    fn edge_of(p: [f64; 2]) -> Edge {
        match p {
            [x, _] if x == 0.0 => Edge::Left,
            [x, _] if x == 1.0 => Edge::Right,
            [_, y] if y == 0.0 => Edge::Top,
            _ => Edge::Bottom,
        }
    }

    fn edges(segs: &[ContourSegment]) -> Vec<(Edge, Edge)> {
        segs.iter().map(|s| (edge_of(s.a), edge_of(s.b))).collect()
    }

    #[test]
    fn uniform_cells_emit_nothing() {
        assert!(build_contours(&quad(0), 0.5).is_empty());
        assert!(build_contours(&quad(15), 0.5).is_empty());
    }

    #[test]
    fn every_case_separates_above_from_below() {
        use Edge::*;
        let expected: [&[(Edge, Edge)]; 16] = [
            &[],
            &[(Left, Bottom)],
            &[(Bottom, Right)],
            &[(Left, Right)],
            &[(Top, Right)],
            &[(Top, Right), (Left, Bottom)],
            &[(Top, Bottom)],
            &[(Left, Top)],
            &[(Left, Top)],
            &[(Top, Bottom)],
            &[(Left, Top), (Bottom, Right)],
            &[(Top, Right)],
            &[(Left, Right)],
            &[(Bottom, Right)],
            &[(Left, Bottom)],
            &[],
        ];
        // Level 0.6 puts the saddle centre (0.5) below.
        for mask in 0..16u8 {
            let segs = build_contours(&quad(mask), 0.6);
            assert_eq!(edges(&segs), expected[mask as usize].to_vec(), "mask {mask}");
        }
    }

    #[test]
    fn saddles_follow_centre_average() {
        use Edge::*;
        // Level 0.4: centre 0.5 is above, the above corners join.
        assert_eq!(edges(&build_contours(&quad(5), 0.4)), vec![(Left, Top), (Bottom, Right)]);
        assert_eq!(edges(&build_contours(&quad(10), 0.4)), vec![(Top, Right), (Left, Bottom)]);
    }

    #[test]
    fn crossings_are_interpolated() {
        let f = ScalarField::uniform(2, 2, vec![0.0, 4.0, 0.0, 4.0]);
        let segs = build_contours(&f, 1.0);
        assert_eq!(segs.len(), 1);
        assert_eq!(segs[0].a, [0.25, 0.0]);
        assert_eq!(segs[0].b, [0.25, 1.0]);
    }

    #[test]
    fn equal_corners_use_midpoint() {
        assert_eq!(interpolate([0.0, 0.0], 2.0, [2.0, 0.0], 2.0, 2.0), [1.0, 0.0]);
    }

    #[test]
    fn levels_are_interior_and_even() {
        assert_eq!(contour_levels(0.0, 1.0, 3), vec![0.25, 0.5, 0.75]);
        assert!(contour_levels(1.0, 1.0, 3).is_empty());
        let f = ScalarField::uniform(3, 3, (0..9).map(|i| i as f64).collect());
        let per_level = build_contour_levels(&f, &contour_levels(0.0, 8.0, 3));
        assert_eq!(per_level.len(), 3);
        assert!(per_level.iter().all(|l| !l.segments.is_empty()));
    }

    #[test]
    fn nan_cells_are_skipped() {
        let f = ScalarField::uniform(2, 2, vec![f64::NAN, 1.0, 0.0, 1.0]);
        assert!(build_contours(&f, 0.5).is_empty());
    }
}
