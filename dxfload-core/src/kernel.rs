//! 平面几何内核。
//!
//! 导入引擎只通过 [`GeometryKernel`] 使用几何运算；[`PlanarKernel`] 是基于 `geo`
//! 的默认实现。坐标比较一律使用精确的浮点相等。

use geo::coordinate_position::{CoordPos, CoordinatePosition};
use geo::line_intersection::{LineIntersection, line_intersection};
use geo::{
    Area, BoundingRect, Contains, Coord, InteriorPoint, Line, LineString, MultiLineString,
    MultiPolygon, Point, Polygon, Rect, Rotate, Translate,
};

use crate::rings;

pub trait GeometryKernel {
    /// 将无序线集装配为（可能带洞的）多边形；无法闭合时返回 `None`。
    fn assemble_polygon(&self, lines: &[LineString<f64>]) -> Option<MultiPolygon<f64>>;

    /// 线集与自身求并，合并共线重叠部分。
    fn union(&self, lines: &MultiLineString<f64>) -> MultiLineString<f64>;

    /// 线集与区域求交，区域边界视为区域的一部分。
    fn intersect(
        &self,
        area: &MultiPolygon<f64>,
        lines: &MultiLineString<f64>,
    ) -> MultiLineString<f64>;

    /// 绕原点按角度（度，逆时针为正）旋转。
    fn rotate(&self, lines: &MultiLineString<f64>, degrees: f64) -> MultiLineString<f64>;

    fn translate(&self, lines: &MultiLineString<f64>, dx: f64, dy: f64) -> MultiLineString<f64>;

    fn bounding_rect(&self, area: &MultiPolygon<f64>) -> Option<Rect<f64>>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PlanarKernel;

impl PlanarKernel {
    pub fn new() -> Self {
        Self
    }
}

impl GeometryKernel for PlanarKernel {
    fn assemble_polygon(&self, lines: &[LineString<f64>]) -> Option<MultiPolygon<f64>> {
        let rings = rings::assemble_rings(lines)?;
        let mut candidates: Vec<(f64, Polygon<f64>)> = rings
            .into_iter()
            .map(|ring| Polygon::new(ring, Vec::new()))
            .map(|polygon| (polygon.unsigned_area(), polygon))
            .filter(|(area, _)| *area > 0.0)
            .collect();
        if candidates.is_empty() {
            return None;
        }
        candidates.sort_by(|a, b| b.0.total_cmp(&a.0));

        // 从大到小归类：落在某外环内且不在其内环内的为内环，否则为新的外环
        let mut shells: Vec<(Polygon<f64>, Vec<Polygon<f64>>)> = Vec::new();
        for (_, candidate) in candidates {
            let Some(inside) = candidate.interior_point() else {
                continue;
            };
            let owner = shells.iter().rposition(|(shell, holes)| {
                shell.contains(&inside) && !holes.iter().any(|hole| hole.contains(&inside))
            });
            match owner {
                Some(index) => shells[index].1.push(candidate),
                None => shells.push((candidate, Vec::new())),
            }
        }

        let polygons = shells
            .into_iter()
            .map(|(shell, holes)| {
                let (exterior, _) = shell.into_inner();
                let interiors = holes
                    .into_iter()
                    .map(|hole| hole.into_inner().0)
                    .collect();
                Polygon::new(exterior, interiors)
            })
            .collect();
        Some(MultiPolygon::new(polygons))
    }

    fn union(&self, lines: &MultiLineString<f64>) -> MultiLineString<f64> {
        let segments: Vec<Line<f64>> = lines
            .iter()
            .flat_map(|ls| ls.lines())
            .filter(|line| line.start != line.end)
            .collect();

        // 先按方向与法向偏移分组，只在组内做精确的共线合并
        let mut merged: Vec<(usize, Line<f64>)> = Vec::with_capacity(segments.len());
        for group in carrier_groups(&segments) {
            merged.extend(merge_group(&segments, &group));
        }
        merged.sort_by_key(|(order, _)| *order);
        MultiLineString::new(
            merged
                .into_iter()
                .map(|(_, line)| LineString::from(vec![line.start, line.end]))
                .collect(),
        )
    }

    fn intersect(
        &self,
        area: &MultiPolygon<f64>,
        lines: &MultiLineString<f64>,
    ) -> MultiLineString<f64> {
        let edges: Vec<Line<f64>> = area
            .iter()
            .flat_map(|polygon| {
                std::iter::once(polygon.exterior())
                    .chain(polygon.interiors().iter())
                    .flat_map(|ring| ring.lines())
            })
            .collect();
        let clipped = lines
            .iter()
            .flat_map(|ls| ls.lines())
            .flat_map(|segment| clip_segment(area, &edges, segment))
            .collect();
        MultiLineString::new(clipped)
    }

    fn rotate(&self, lines: &MultiLineString<f64>, degrees: f64) -> MultiLineString<f64> {
        lines.rotate_around_point(degrees, Point::new(0.0, 0.0))
    }

    fn translate(&self, lines: &MultiLineString<f64>, dx: f64, dy: f64) -> MultiLineString<f64> {
        Translate::translate(lines, dx, dy)
    }

    fn bounding_rect(&self, area: &MultiPolygon<f64>) -> Option<Rect<f64>> {
        area.bounding_rect()
    }
}

/// 分组时使用的容差，只影响候选分组，合并本身仍是精确判断。
const CARRIER_TOLERANCE: f64 = 1e-9;

/// 线段所在直线的 (方向角, 法向偏移)，方向角规约到 [0, π)。
fn carrier(line: Line<f64>) -> (f64, f64) {
    let delta = line.delta();
    let mut angle = delta.y.atan2(delta.x);
    if angle < 0.0 {
        angle += std::f64::consts::PI;
    }
    if angle >= std::f64::consts::PI {
        angle -= std::f64::consts::PI;
    }
    let (sin, cos) = angle.sin_cos();
    (angle, line.start.y * cos - line.start.x * sin)
}

#[inline]
fn close(a: f64, b: f64) -> bool {
    (a - b).abs() <= CARRIER_TOLERANCE * (1.0 + a.abs().max(b.abs()))
}

/// 把可能共线的线段归为一组：先按方向角排序分段，再在每段内按偏移排序分段。
fn carrier_groups(segments: &[Line<f64>]) -> Vec<Vec<usize>> {
    let keys: Vec<(f64, f64)> = segments.iter().map(|line| carrier(*line)).collect();
    let mut order: Vec<usize> = (0..segments.len()).collect();
    order.sort_by(|&a, &b| keys[a].0.total_cmp(&keys[b].0));

    let mut groups = Vec::new();
    for mut by_offset in split_runs(order, |a, b| close(keys[a].0, keys[b].0)) {
        by_offset.sort_by(|&a, &b| keys[a].1.total_cmp(&keys[b].1));
        groups.extend(split_runs(by_offset, |a, b| close(keys[a].1, keys[b].1)));
    }
    groups
}

/// 按相邻元素是否满足 `same` 把有序序列切成连续段。
fn split_runs(sorted: Vec<usize>, same: impl Fn(usize, usize) -> bool) -> Vec<Vec<usize>> {
    let mut runs: Vec<Vec<usize>> = Vec::new();
    for index in sorted {
        match runs.last_mut() {
            Some(run) if run.last().is_some_and(|&prev| same(prev, index)) => run.push(index),
            _ => runs.push(vec![index]),
        }
    }
    runs
}

/// 组内两两合并共线重叠的线段，结果带上参与合并的最早输入序号。
fn merge_group(segments: &[Line<f64>], group: &[usize]) -> Vec<(usize, Line<f64>)> {
    let mut merged: Vec<(usize, Line<f64>)> = Vec::new();
    for &index in group {
        let mut current = (index, segments[index]);
        let mut cursor = 0;
        while cursor < merged.len() {
            match merge_collinear(merged[cursor].1, current.1) {
                Some(joined) => {
                    current = (current.0.min(merged[cursor].0), joined);
                    merged.swap_remove(cursor);
                    cursor = 0;
                }
                None => cursor += 1,
            }
        }
        merged.push(current);
    }
    merged
}

fn lines_overlap_box(a: Line<f64>, b: Line<f64>) -> bool {
    let (a_min_x, a_max_x) = min_max(a.start.x, a.end.x);
    let (a_min_y, a_max_y) = min_max(a.start.y, a.end.y);
    let (b_min_x, b_max_x) = min_max(b.start.x, b.end.x);
    let (b_min_y, b_max_y) = min_max(b.start.y, b.end.y);
    a_min_x <= b_max_x && b_min_x <= a_max_x && a_min_y <= b_max_y && b_min_y <= a_max_y
}

#[inline]
fn min_max(a: f64, b: f64) -> (f64, f64) {
    if a <= b { (a, b) } else { (b, a) }
}

/// 两条共线且重叠的线段合并为覆盖两者的线段。
fn merge_collinear(a: Line<f64>, b: Line<f64>) -> Option<Line<f64>> {
    if !lines_overlap_box(a, b) {
        return None;
    }
    match line_intersection(a, b)? {
        LineIntersection::Collinear { .. } => {}
        LineIntersection::SinglePoint { .. } => return None,
    }
    let delta = a.delta();
    let length_sq = delta.x * delta.x + delta.y * delta.y;
    let param =
        |c: Coord<f64>| ((c.x - a.start.x) * delta.x + (c.y - a.start.y) * delta.y) / length_sq;
    let mut ends = [
        (0.0, a.start),
        (1.0, a.end),
        (param(b.start), b.start),
        (param(b.end), b.end),
    ];
    ends.sort_by(|x, y| x.0.total_cmp(&y.0));
    Some(Line::new(ends[0].1, ends[3].1))
}

/// 按区域裁剪单条线段，相邻的区域内子段合并为一段。
fn clip_segment(
    area: &MultiPolygon<f64>,
    edges: &[Line<f64>],
    segment: Line<f64>,
) -> Vec<LineString<f64>> {
    let delta = segment.delta();
    let length_sq = delta.x * delta.x + delta.y * delta.y;
    if length_sq == 0.0 {
        return Vec::new();
    }
    let param = |c: Coord<f64>| {
        ((c.x - segment.start.x) * delta.x + (c.y - segment.start.y) * delta.y) / length_sq
    };
    let at = |t: f64| {
        if t == 1.0 {
            segment.end
        } else {
            Coord {
                x: segment.start.x + delta.x * t,
                y: segment.start.y + delta.y * t,
            }
        }
    };

    let mut params = vec![0.0, 1.0];
    for edge in edges {
        match line_intersection(segment, *edge) {
            Some(LineIntersection::SinglePoint { intersection, .. }) => {
                params.push(param(intersection));
            }
            Some(LineIntersection::Collinear { intersection }) => {
                params.push(param(intersection.start));
                params.push(param(intersection.end));
            }
            None => {}
        }
    }
    params.retain(|t| (0.0..=1.0).contains(t));
    params.sort_by(f64::total_cmp);
    params.dedup();

    let mut pieces = Vec::new();
    let mut run: Option<(f64, f64)> = None;
    for window in params.windows(2) {
        let (t0, t1) = (window[0], window[1]);
        let mid = at((t0 + t1) / 2.0);
        if area.coordinate_position(&mid) != CoordPos::Outside {
            run = Some(match run {
                Some((start, _)) => (start, t1),
                None => (t0, t1),
            });
        } else if let Some((start, end)) = run.take() {
            pieces.push(LineString::from(vec![at(start), at(end)]));
        }
    }
    if let Some((start, end)) = run {
        pieces.push(LineString::from(vec![at(start), at(end)]));
    }
    pieces
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::coord;

    fn segment(x0: f64, y0: f64, x1: f64, y1: f64) -> LineString<f64> {
        LineString::from(vec![coord! { x: x0, y: y0 }, coord! { x: x1, y: y1 }])
    }

    fn square_segments(min: f64, max: f64) -> Vec<LineString<f64>> {
        vec![
            segment(min, min, max, min),
            segment(max, min, max, max),
            segment(max, max, min, max),
            segment(min, max, min, min),
        ]
    }

    #[test]
    fn assembles_unordered_segments_into_polygon_with_hole() {
        let mut lines = square_segments(3.0, 7.0);
        lines.extend(square_segments(0.0, 10.0));
        lines.swap(1, 6);

        let result = PlanarKernel.assemble_polygon(&lines).expect("应当装配成功");
        assert_eq!(result.0.len(), 1);
        let polygon = &result.0[0];
        assert_eq!(polygon.interiors().len(), 1);
        assert_eq!(polygon.unsigned_area(), 100.0 - 16.0);
    }

    #[test]
    fn disjoint_rings_become_separate_polygons() {
        let mut lines = square_segments(0.0, 1.0);
        lines.extend(square_segments(5.0, 6.0));
        let result = PlanarKernel.assemble_polygon(&lines).expect("应当装配成功");
        assert_eq!(result.0.len(), 2);
        assert!(result.0.iter().all(|p| p.interiors().is_empty()));
    }

    #[test]
    fn open_line_set_does_not_assemble() {
        let lines = vec![segment(0.0, 0.0, 1.0, 0.0), segment(1.0, 0.0, 1.0, 1.0)];
        assert!(PlanarKernel.assemble_polygon(&lines).is_none());
    }

    #[test]
    fn intersect_keeps_lines_on_the_boundary() {
        let area = PlanarKernel
            .assemble_polygon(&square_segments(0.0, 10.0))
            .expect("正方形");
        let lines = MultiLineString::new(vec![
            segment(-5.0, 5.0, 15.0, 5.0),
            segment(0.0, -10.0, 0.0, 30.0),
            segment(20.0, 0.0, 20.0, 10.0),
        ]);
        let clipped = PlanarKernel.intersect(&area, &lines);
        assert_eq!(clipped.0.len(), 2);
        assert_eq!(clipped.0[0], segment(0.0, 5.0, 10.0, 5.0));
        assert_eq!(clipped.0[1], segment(0.0, 0.0, 0.0, 10.0));
    }

    #[test]
    fn intersect_splits_lines_crossing_a_hole() {
        let mut lines = square_segments(0.0, 10.0);
        lines.extend(square_segments(4.0, 6.0));
        let area = PlanarKernel.assemble_polygon(&lines).expect("带洞正方形");
        let clipped = PlanarKernel.intersect(
            &area,
            &MultiLineString::new(vec![segment(-2.0, 5.0, 14.0, 5.0)]),
        );
        assert_eq!(clipped.0.len(), 2);
        assert_eq!(clipped.0[0], segment(0.0, 5.0, 4.0, 5.0));
        assert_eq!(clipped.0[1], segment(6.0, 5.0, 10.0, 5.0));
    }

    #[test]
    fn union_merges_overlapping_collinear_lines() {
        let lines = MultiLineString::new(vec![
            segment(0.0, 0.0, 5.0, 0.0),
            segment(3.0, 0.0, 8.0, 0.0),
            segment(0.0, 1.0, 8.0, 1.0),
            segment(0.0, 1.0, 8.0, 1.0),
        ]);
        let merged = PlanarKernel.union(&lines);
        assert_eq!(merged.0.len(), 2);
        assert!(merged.0.contains(&segment(0.0, 0.0, 8.0, 0.0)));
    }

    #[test]
    fn union_keeps_input_order_and_separates_parallel_lines() {
        let lines = MultiLineString::new(
            (0..2_000)
                .map(|k| segment(k as f64, 0.0, k as f64 + 10.0, 10.0))
                .chain([segment(5.0, 5.0, 20.0, 20.0)])
                .collect(),
        );
        let merged = PlanarKernel.union(&lines);
        assert_eq!(merged.0.len(), 2_000);
        assert_eq!(merged.0[0], segment(0.0, 0.0, 20.0, 20.0));
        assert_eq!(merged.0[1], segment(1.0, 0.0, 11.0, 10.0));
    }

    #[test]
    fn rotate_is_counter_clockwise_about_origin() {
        let lines = MultiLineString::new(vec![segment(1.0, 0.0, 2.0, 0.0)]);
        let rotated = PlanarKernel.rotate(&lines, 90.0);
        let start = rotated.0[0].0[0];
        assert!(start.x.abs() < 1e-12);
        assert!((start.y - 1.0).abs() < 1e-12);
    }
}
