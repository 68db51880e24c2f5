//! 多边形环结构恢复。
//!
//! 两个启发式算法（环连接、环拆分）修改单条多段线；通用环装配器把任意线串集合
//! 串接成闭合环。三者都使用精确的坐标相等判断，不做容差吸附。

use std::collections::VecDeque;

use geo::{Coord, LineString, MultiPolygon};
use tracing::debug;

use crate::geometry::Point3;
use crate::kernel::GeometryKernel;
use crate::model::{Hole, Polyline};

/// 启发式算法的结果。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RingOutcome {
    /// 前置条件不满足（没有可抵消的边、候选环不足两个），未尝试装配。
    NotApplicable,
    /// 已尝试装配，但结果不是恰好一个带洞多边形，多段线保持不变。
    Rejected,
    /// 多段线已被改写为外环加内环。
    Rewritten,
}

/// 环连接：抵消正反方向重复出现的边，再把剩余边装配为带洞多边形。
pub fn link_rings<K>(kernel: &K, polyline: &mut Polyline) -> RingOutcome
where
    K: GeometryKernel + ?Sized,
{
    let segments: Vec<(Coord<f64>, Coord<f64>)> = polyline
        .points
        .windows(2)
        .map(|pair| (coord(pair[0]), coord(pair[1])))
        .filter(|(start, end)| start != end)
        .collect();

    let mut alive = vec![true; segments.len()];
    let mut cancelled = false;
    for i in 0..segments.len() {
        if !alive[i] {
            continue;
        }
        let (a, b) = segments[i];
        let twin = (i + 1..segments.len()).find(|&j| {
            alive[j] && {
                let (c, d) = segments[j];
                (a == d && b == c) || (a == c && b == d)
            }
        });
        if let Some(j) = twin {
            alive[i] = false;
            alive[j] = false;
            cancelled = true;
        }
    }
    if !cancelled {
        return RingOutcome::NotApplicable;
    }

    let survivors: Vec<LineString<f64>> = segments
        .iter()
        .zip(&alive)
        .filter(|(_, alive)| **alive)
        .map(|((start, end), _)| LineString::from(vec![*start, *end]))
        .collect();
    debug!(
        segments = segments.len(),
        survivors = survivors.len(),
        "环连接：已抵消重复边"
    );
    accept(kernel.assemble_polygon(&survivors), polyline)
}

/// 环拆分：按回到候选环起点的顶点切分顶点序列，再装配为带洞多边形。
pub fn split_rings<K>(kernel: &K, polyline: &mut Polyline) -> RingOutcome
where
    K: GeometryKernel + ?Sized,
{
    let candidates = split_candidates(&polyline.points);
    if candidates.len() < 2 {
        return RingOutcome::NotApplicable;
    }
    debug!(candidates = candidates.len(), "环拆分：得到候选环");
    let rings: Vec<LineString<f64>> = candidates
        .iter()
        .map(|ring| ring.iter().copied().map(coord).collect())
        .collect();
    accept(kernel.assemble_polygon(&rings), polyline)
}

/// 顺序扫描顶点：后续顶点与当前候选环起点重合时闭合该环，并从下一个顶点开始新环。
/// 最后一个未闭合的尾段被忽略。
pub fn split_candidates(points: &[Point3]) -> Vec<Vec<Point3>> {
    let mut rings = Vec::new();
    let mut start = 0;
    while start < points.len() {
        let origin = coord(points[start]);
        let Some(close) = (start + 1..points.len()).find(|&i| coord(points[i]) == origin) else {
            break;
        };
        rings.push(points[start..=close].to_vec());
        start = close + 1;
    }
    rings
}

/// 通用环装配：以任一未使用的线串为种子，反复在开放环两端接上端点重合的线串
/// （必要时反向），两端重合即闭合成环。任何线串无法接入时整体失败。
pub fn assemble_rings(lines: &[LineString<f64>]) -> Option<Vec<LineString<f64>>> {
    let mut consumed: Vec<bool> = lines.iter().map(|line| line.0.is_empty()).collect();
    let mut rings = Vec::new();

    while let Some(seed) = consumed.iter().position(|used| !used) {
        consumed[seed] = true;
        let mut ring: VecDeque<Coord<f64>> = lines[seed].0.iter().copied().collect();

        while !is_closed(&ring) {
            let head = *ring.front()?;
            let tail = *ring.back()?;
            let (index, joint) = lines.iter().enumerate().find_map(|(index, line)| {
                if consumed[index] {
                    return None;
                }
                let first = *line.0.first()?;
                let last = *line.0.last()?;
                let joint = if first == tail {
                    Joint::AppendForward
                } else if last == tail {
                    Joint::AppendReversed
                } else if last == head {
                    Joint::PrependForward
                } else if first == head {
                    Joint::PrependReversed
                } else {
                    return None;
                };
                Some((index, joint))
            })?;
            consumed[index] = true;

            let coords = &lines[index].0;
            match joint {
                Joint::AppendForward => ring.extend(coords.iter().skip(1).copied()),
                Joint::AppendReversed => ring.extend(coords.iter().rev().skip(1).copied()),
                Joint::PrependForward => {
                    for c in coords.iter().rev().skip(1) {
                        ring.push_front(*c);
                    }
                }
                Joint::PrependReversed => {
                    for c in coords.iter().skip(1) {
                        ring.push_front(*c);
                    }
                }
            }
        }
        rings.push(LineString::from(Vec::from(ring)));
    }
    Some(rings)
}

#[derive(Debug, Clone, Copy)]
enum Joint {
    AppendForward,
    AppendReversed,
    PrependForward,
    PrependReversed,
}

#[inline]
fn is_closed(ring: &VecDeque<Coord<f64>>) -> bool {
    ring.len() > 1 && ring.front() == ring.back()
}

#[inline]
fn coord(point: Point3) -> Coord<f64> {
    Coord {
        x: point.x(),
        y: point.y(),
    }
}

/// 仅接受恰好一个且至少带一个内环的多边形。
fn accept(result: Option<MultiPolygon<f64>>, polyline: &mut Polyline) -> RingOutcome {
    let Some(mut result) = result else {
        return RingOutcome::Rejected;
    };
    if result.0.len() != 1 || result.0[0].interiors().is_empty() {
        return RingOutcome::Rejected;
    }
    let Some(polygon) = result.0.pop() else {
        return RingOutcome::Rejected;
    };

    let original = std::mem::take(&mut polyline.points);
    let lift = |c: &Coord<f64>| {
        let z = original
            .iter()
            .find(|p| p.x() == c.x && p.y() == c.y)
            .map_or(0.0, |p| p.z());
        Point3::new(c.x, c.y, z)
    };
    let (exterior, interiors) = polygon.into_inner();
    polyline.points = exterior.0.iter().map(lift).collect();
    polyline.holes = interiors
        .iter()
        .map(|ring| Hole {
            points: ring.0.iter().map(lift).collect(),
        })
        .collect();
    polyline.closed = true;
    RingOutcome::Rewritten
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::PlanarKernel;
    use geo::coord;

    fn chain(coords: &[(f64, f64)]) -> Vec<Point3> {
        coords.iter().map(|&(x, y)| Point3::new(x, y, 0.0)).collect()
    }

    const OUTER: [(f64, f64); 5] = [(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0), (0.0, 0.0)];
    const INNER: [(f64, f64); 5] = [(3.0, 3.0), (3.0, 7.0), (7.0, 7.0), (7.0, 3.0), (3.0, 3.0)];

    #[test]
    fn link_rings_recovers_hole_joined_by_shared_edge() {
        // 外环 -> 连接边 -> 内环 -> 沿连接边返回
        let mut coords = OUTER.to_vec();
        coords.extend_from_slice(&INNER);
        coords.push((0.0, 0.0));
        let mut polyline = Polyline::new(chain(&coords), false);

        let outcome = link_rings(&PlanarKernel, &mut polyline);
        assert_eq!(outcome, RingOutcome::Rewritten);
        assert!(polyline.closed);
        assert_eq!(polyline.holes.len(), 1);
        assert_eq!(polyline.points.len(), OUTER.len());
        assert_eq!(polyline.holes[0].points.len(), INNER.len());
    }

    #[test]
    fn link_rings_leaves_simple_ring_untouched() {
        let mut polyline = Polyline::new(chain(&OUTER), true);
        let before = polyline.clone();
        assert_eq!(
            link_rings(&PlanarKernel, &mut polyline),
            RingOutcome::NotApplicable
        );
        assert_eq!(polyline, before);
    }

    #[test]
    fn link_rings_rejects_result_without_hole() {
        // 一条来回走的毛刺被抵消后只剩一个简单正方形
        let mut coords = OUTER.to_vec();
        coords.push((-5.0, 0.0));
        coords.push((0.0, 0.0));
        let mut polyline = Polyline::new(chain(&coords), false);
        let before = polyline.clone();
        assert_eq!(link_rings(&PlanarKernel, &mut polyline), RingOutcome::Rejected);
        assert_eq!(polyline, before);
    }

    #[test]
    fn split_candidates_cuts_at_repeated_start_vertex() {
        let coords = [
            (0.0, 0.0),
            (1.0, 0.0),
            (1.0, 1.0),
            (0.0, 0.0),
            (5.0, 5.0),
            (6.0, 5.0),
            (6.0, 6.0),
            (5.0, 5.0),
        ];
        let candidates = split_candidates(&chain(&coords));
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].len(), 4);
        assert_eq!(candidates[1][0], Point3::new(5.0, 5.0, 0.0));
    }

    #[test]
    fn split_rings_rejects_two_disjoint_squares() {
        let mut coords = OUTER.to_vec();
        coords.extend_from_slice(&[(20.0, 0.0), (30.0, 0.0), (30.0, 10.0), (20.0, 0.0)]);
        let mut polyline = Polyline::new(chain(&coords), false);
        assert_eq!(split_candidates(&polyline.points).len(), 2);
        let before = polyline.clone();
        assert_eq!(split_rings(&PlanarKernel, &mut polyline), RingOutcome::Rejected);
        assert_eq!(polyline, before);
    }

    #[test]
    fn split_rings_turns_nested_rings_into_hole() {
        let mut coords = OUTER.to_vec();
        coords.extend_from_slice(&INNER);
        let mut points = chain(&coords);
        for p in &mut points {
            *p = Point3::new(p.x(), p.y(), 4.0);
        }
        let mut polyline = Polyline::new(points, false);
        assert_eq!(split_rings(&PlanarKernel, &mut polyline), RingOutcome::Rewritten);
        assert!(polyline.closed);
        assert_eq!(polyline.holes.len(), 1);
        assert!(polyline.points.iter().all(|p| p.z() == 4.0));
    }

    #[test]
    fn split_rings_needs_two_candidates() {
        let mut polyline = Polyline::new(chain(&OUTER), false);
        assert_eq!(
            split_rings(&PlanarKernel, &mut polyline),
            RingOutcome::NotApplicable
        );
    }

    #[test]
    fn assemble_rings_reverses_and_prepends() {
        let lines = vec![
            LineString::from(vec![coord! { x: 0.0, y: 0.0 }, coord! { x: 1.0, y: 0.0 }]),
            LineString::from(vec![coord! { x: 0.0, y: 1.0 }, coord! { x: 0.0, y: 0.0 }]),
            LineString::from(vec![coord! { x: 1.0, y: 1.0 }, coord! { x: 1.0, y: 0.0 }]),
            LineString::from(vec![coord! { x: 1.0, y: 1.0 }, coord! { x: 0.0, y: 1.0 }]),
        ];
        let rings = assemble_rings(&lines).expect("应当闭合");
        assert_eq!(rings.len(), 1);
        assert_eq!(rings[0].0.len(), 5);
        assert_eq!(rings[0].0.first(), rings[0].0.last());
    }

    #[test]
    fn assemble_rings_fails_on_dangling_line() {
        let lines = vec![
            LineString::from(vec![
                coord! { x: 0.0, y: 0.0 },
                coord! { x: 1.0, y: 0.0 },
                coord! { x: 1.0, y: 1.0 },
                coord! { x: 0.0, y: 0.0 },
            ]),
            LineString::from(vec![coord! { x: 5.0, y: 5.0 }, coord! { x: 6.0, y: 5.0 }]),
        ];
        assert!(assemble_rings(&lines).is_none());
    }
}
