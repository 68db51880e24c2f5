//! 填充线生成：由边界路径装配区域，再按角度与间距生成平行线族并裁剪到区域内。

use geo::{LineString, MultiLineString, MultiPolygon, coord};
use tracing::{debug, warn};

use crate::geometry::Point2;
use crate::kernel::GeometryKernel;
use crate::model::{AreaPolygon, Hatch, Segment};

/// 填充线生成结果。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillOutcome {
    /// 已生成指定数量的填充线段。
    Filled(usize),
    /// 边界路径无法装配为多边形，不生成填充。
    NoBoundary,
    /// 间距或基点不是有限值，边界已保存但不生成填充。
    BadSpacing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Family {
    Vertical,
    Horizontal,
    Oblique,
}

/// 将角度规约到 (-360, 360)。
#[inline]
pub fn normalize_angle(angle: f64) -> f64 {
    angle % 360.0
}

fn classify(angle: f64) -> Family {
    match normalize_angle(angle) {
        a if a == 90.0 || a == -90.0 || a == 270.0 || a == -270.0 => Family::Vertical,
        a if a == 0.0 || a == 180.0 || a == -180.0 => Family::Horizontal,
        _ => Family::Oblique,
    }
}

/// 为填充实体生成边界区域与填充线段，结果写回 `hatch.boundary` 与 `hatch.fill`。
pub fn generate_fill<K>(kernel: &K, hatch: &mut Hatch) -> FillOutcome
where
    K: GeometryKernel + ?Sized,
{
    let edges: Vec<LineString<f64>> = hatch
        .paths
        .iter()
        .flat_map(|path| path.segments.iter())
        .map(|segment| {
            LineString::from(vec![
                coord! { x: segment.start.x(), y: segment.start.y() },
                coord! { x: segment.end.x(), y: segment.end.y() },
            ])
        })
        .collect();
    let Some(area) = kernel.assemble_polygon(&edges) else {
        debug!(edges = edges.len(), "填充边界无法闭合");
        return FillOutcome::NoBoundary;
    };
    let Some(bbox) = kernel.bounding_rect(&area) else {
        return FillOutcome::NoBoundary;
    };
    hatch.boundary = to_area_polygons(&area);

    let spacing = hatch.spacing.abs();
    let (min, max) = (bbox.min(), bbox.max());
    let family = classify(hatch.angle);

    let Some(count) = (match family {
        Family::Vertical => family_size(min.x, max.x, hatch.base.x(), spacing),
        Family::Horizontal => family_size(min.y, max.y, hatch.base.y(), spacing),
        Family::Oblique => {
            let half = 2.5 * bbox.width().max(bbox.height());
            family_size(-half, half, 0.0, spacing)
        }
    }) else {
        warn!(spacing, "填充间距或基点无效，不生成填充线");
        return FillOutcome::BadSpacing;
    };

    let lines = match family {
        Family::Vertical => {
            let origin = family_origin(min.x, hatch.base.x(), spacing);
            MultiLineString::new(
                (0..count)
                    .map(|i| origin + (i as f64 - 1.0) * spacing)
                    .map(|x| {
                        LineString::from(vec![coord! { x: x, y: min.y }, coord! { x: x, y: max.y }])
                    })
                    .collect(),
            )
        }
        Family::Horizontal => {
            let origin = family_origin(min.y, hatch.base.y(), spacing);
            MultiLineString::new(
                (0..count)
                    .map(|i| origin + (i as f64 - 1.0) * spacing)
                    .map(|y| {
                        LineString::from(vec![coord! { x: min.x, y: y }, coord! { x: max.x, y: y }])
                    })
                    .collect(),
            )
        }
        Family::Oblique => {
            let half = 2.5 * bbox.width().max(bbox.height());
            let origin = family_origin(-half, 0.0, spacing);
            let flat = MultiLineString::new(
                (0..count)
                    .map(|i| origin + (i as f64 - 1.0) * spacing)
                    .map(|y| {
                        LineString::from(vec![coord! { x: -half, y: y }, coord! { x: half, y: y }])
                    })
                    .collect(),
            );
            // DXF 角度逆时针为正，与内核的旋转方向一致
            let rotated = kernel.rotate(&flat, hatch.angle);
            kernel.translate(
                &rotated,
                min.x + hatch.base.x(),
                min.y + hatch.base.y(),
            )
        }
    };

    let merged = kernel.union(&lines);
    let clipped = kernel.intersect(&area, &merged);
    hatch.fill = clipped
        .iter()
        .filter(|line| line.0.len() == 2)
        .map(|line| {
            Segment::new(
                Point2::new(line.0[0].x, line.0[0].y),
                Point2::new(line.0[1].x, line.0[1].y),
            )
        })
        .collect();
    debug!(
        family = ?family,
        candidates = count,
        segments = hatch.fill.len(),
        "填充线已生成"
    );
    FillOutcome::Filled(hatch.fill.len())
}

/// 不大于 `min` 的最后一条线的位置，线位于 `base + k * spacing`。
///
/// 先把基点折算到 `min` 附近，基点远离边界时也不会溢出。
#[inline]
fn family_origin(min: f64, base: f64, spacing: f64) -> f64 {
    min - (min - base).rem_euclid(spacing)
}

/// 覆盖 [min, max] 且两端各多出一条线时的线数。
fn family_size(min: f64, max: f64, base: f64, spacing: f64) -> Option<usize> {
    if !(spacing > 0.0) || !spacing.is_finite() {
        return None;
    }
    let origin = family_origin(min, base, spacing);
    let count = ((max - origin) / spacing).ceil() + 3.0;
    if count.is_finite() && count >= 0.0 && count <= usize::MAX as f64 {
        Some(count as usize)
    } else {
        None
    }
}

fn to_area_polygons(area: &MultiPolygon<f64>) -> Vec<AreaPolygon> {
    let ring = |ls: &LineString<f64>| -> Vec<Point2> {
        ls.0.iter().map(|c| Point2::new(c.x, c.y)).collect()
    };
    area.iter()
        .map(|polygon| AreaPolygon {
            exterior: ring(polygon.exterior()),
            interiors: polygon.interiors().iter().map(ring).collect(),
        })
        .collect()
}
