//! 实体构建器：累积组码值，在刷新时物化为模型实体。

use dxfload_core::geometry::{Point2, Point3};
use dxfload_core::model::Point as PointEntity;
use dxfload_core::model::{
    Block, BlockPayload, BoundaryPath, DEFAULT_LAYER, ExtraAttr, Hatch, Polyline, Segment, Text,
};
use tracing::warn;

use crate::reader::parse_value;

/// 各类实体共用的图层名与 XDATA 累积。
#[derive(Debug, Default)]
pub(crate) struct Scratch {
    layer: Option<String>,
    attributes: Vec<ExtraAttr>,
    xdata_app: Option<String>,
}

impl Scratch {
    /// 处理通用组码，返回是否已消费。
    pub(crate) fn apply(&mut self, code: i32, value: &str) -> bool {
        match code {
            8 => self.layer = Some(value.trim().to_string()),
            1001 => self.xdata_app = Some(value.trim().to_string()),
            1000 => {
                let key = self.xdata_app.as_deref().unwrap_or("XDATA");
                self.attributes.push(ExtraAttr::new(key, value));
            }
            _ => return false,
        }
        true
    }

    pub(crate) fn into_parts(self) -> (String, Vec<ExtraAttr>) {
        let layer = self.layer.unwrap_or_else(|| DEFAULT_LAYER.to_string());
        (layer, self.attributes)
    }
}

/// 由可选分量组成的坐标累积，缺省分量为 0。
#[derive(Debug, Default, Clone, Copy)]
struct Coords {
    x: Option<f64>,
    y: Option<f64>,
    z: Option<f64>,
}

impl Coords {
    fn apply(&mut self, code: i32, value: &str, line: usize) -> bool {
        let slot = match code {
            10 => &mut self.x,
            20 => &mut self.y,
            30 => &mut self.z,
            _ => return false,
        };
        if let Some(parsed) = parse_value(value, code, line) {
            *slot = Some(parsed);
        }
        true
    }

    fn point(self) -> Point3 {
        Point3::new(
            self.x.unwrap_or(0.0),
            self.y.unwrap_or(0.0),
            self.z.unwrap_or(0.0),
        )
    }
}

#[derive(Debug, Default)]
pub(crate) struct LayerBuilder {
    name: Option<String>,
}

impl LayerBuilder {
    pub(crate) fn apply(&mut self, code: i32, value: &str) {
        if code == 2 {
            self.name = Some(value.trim().to_string());
        }
    }

    pub(crate) fn finish(self) -> Option<String> {
        self.name.filter(|name| !name.is_empty())
    }
}

/// 块定义头：图层、块名与基点。
#[derive(Debug, Default)]
pub(crate) struct BlockBuilder {
    scratch: Scratch,
    id: String,
    base: Coords,
    pub(crate) payload: Option<BlockPayload>,
}

impl BlockBuilder {
    pub(crate) fn apply(&mut self, code: i32, value: &str, line: usize) {
        if self.scratch.apply(code, value) || self.base.apply(code, value, line) {
            return;
        }
        if code == 2 {
            self.id = value.trim().to_string();
        }
    }

    pub(crate) fn id(&self) -> &str {
        &self.id
    }

    pub(crate) fn finish(self) -> Block {
        let (layer, _) = self.scratch.into_parts();
        Block {
            layer,
            id: self.id,
            base: self.base.point(),
            payload: self.payload,
        }
    }
}

/// INSERT 引用：目标块名与插入点。
#[derive(Debug, Default)]
pub(crate) struct InsertBuilder {
    scratch: Scratch,
    block: String,
    position: Coords,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct InsertRequest {
    pub layer: String,
    pub block: String,
    pub position: Point3,
    pub attributes: Vec<ExtraAttr>,
}

impl InsertBuilder {
    pub(crate) fn apply(&mut self, code: i32, value: &str, line: usize) {
        if self.scratch.apply(code, value) || self.position.apply(code, value, line) {
            return;
        }
        if code == 2 {
            self.block = value.trim().to_string();
        }
    }

    pub(crate) fn finish(self) -> InsertRequest {
        let (layer, attributes) = self.scratch.into_parts();
        InsertRequest {
            layer,
            block: self.block,
            position: self.position.point(),
            attributes,
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct TextBuilder {
    scratch: Scratch,
    content: String,
    position: Coords,
    height: f64,
    rotation: f64,
}

impl TextBuilder {
    pub(crate) fn apply(&mut self, code: i32, value: &str, line: usize) {
        if self.scratch.apply(code, value) || self.position.apply(code, value, line) {
            return;
        }
        match code {
            1 => self.content = value.to_string(),
            40 => {
                if let Some(height) = parse_value(value, code, line) {
                    self.height = height;
                }
            }
            50 => {
                if let Some(rotation) = parse_value(value, code, line) {
                    self.rotation = rotation;
                }
            }
            _ => {}
        }
    }

    pub(crate) fn finish(self) -> (String, Text) {
        let (layer, attributes) = self.scratch.into_parts();
        let text = Text {
            position: self.position.point(),
            content: self.content,
            height: self.height,
            rotation: self.rotation,
            attributes,
        };
        (layer, text)
    }
}

#[derive(Debug, Default)]
pub(crate) struct PointBuilder {
    scratch: Scratch,
    position: Coords,
}

impl PointBuilder {
    pub(crate) fn apply(&mut self, code: i32, value: &str, line: usize) {
        if !self.scratch.apply(code, value) {
            self.position.apply(code, value, line);
        }
    }

    pub(crate) fn finish(self) -> (String, PointEntity) {
        let (layer, attributes) = self.scratch.into_parts();
        let point = PointEntity {
            position: self.position.point(),
            attributes,
        };
        (layer, point)
    }
}

/// 经典 POLYLINE：头部组码之后跟随若干 VERTEX 记录。
#[derive(Debug, Default)]
pub(crate) struct PolylineBuilder {
    scratch: Scratch,
    flags: i32,
    elevation: f64,
    points: Vec<Point3>,
    vertex: Option<Coords>,
}

impl PolylineBuilder {
    pub(crate) fn apply(&mut self, code: i32, value: &str, line: usize) {
        if let Some(vertex) = self.vertex.as_mut() {
            vertex.apply(code, value, line);
            return;
        }
        if self.scratch.apply(code, value) {
            return;
        }
        match code {
            70 => {
                if let Some(flags) = parse_value(value, code, line) {
                    self.flags = flags;
                }
            }
            30 => {
                if let Some(elevation) = parse_value(value, code, line) {
                    self.elevation = elevation;
                }
            }
            _ => {}
        }
    }

    /// 提交当前顶点并开始新的顶点。
    pub(crate) fn begin_vertex(&mut self) {
        self.commit_vertex();
        self.vertex = Some(Coords::default());
    }

    fn commit_vertex(&mut self) {
        let Some(vertex) = self.vertex.take() else {
            return;
        };
        match (vertex.x, vertex.y) {
            (Some(x), Some(y)) => {
                let z = vertex.z.unwrap_or(self.elevation);
                self.points.push(Point3::new(x, y, z));
            }
            _ => warn!("VERTEX 缺少 X/Y 坐标，已跳过"),
        }
    }

    /// 顶点为空时返回 `None`。
    pub(crate) fn finish(mut self) -> Option<(String, Polyline)> {
        self.commit_vertex();
        if self.points.is_empty() {
            return None;
        }
        let (layer, attributes) = self.scratch.into_parts();
        let mut polyline = Polyline::new(self.points, self.flags & 1 != 0);
        polyline.attributes = attributes;
        Some((layer, polyline))
    }
}

/// 轻量多段线：顶点以 10/20 内联，20 提交一个顶点。
#[derive(Debug, Default)]
pub(crate) struct LwPolylineBuilder {
    scratch: Scratch,
    flags: i32,
    elevation: f64,
    pending_x: Option<f64>,
    points: Vec<Point3>,
}

impl LwPolylineBuilder {
    pub(crate) fn apply(&mut self, code: i32, value: &str, line: usize) {
        if self.scratch.apply(code, value) {
            return;
        }
        match code {
            70 => {
                if let Some(flags) = parse_value(value, code, line) {
                    self.flags = flags;
                }
            }
            38 => {
                if let Some(elevation) = parse_value(value, code, line) {
                    self.elevation = elevation;
                }
            }
            10 => self.pending_x = parse_value(value, code, line),
            20 => {
                let y = parse_value::<f64>(value, code, line);
                match (self.pending_x.take(), y) {
                    (Some(x), Some(y)) => self.points.push(Point3::new(x, y, self.elevation)),
                    _ => warn!(line, "LWPOLYLINE 顶点坐标不完整，已跳过"),
                }
            }
            _ => {}
        }
    }

    pub(crate) fn finish(self) -> Option<(String, Polyline)> {
        if self.points.is_empty() {
            return None;
        }
        let (layer, attributes) = self.scratch.into_parts();
        let mut polyline = Polyline::new(self.points, self.flags & 1 != 0);
        polyline.attributes = attributes;
        Some((layer, polyline))
    }
}

/// 正在读取的边界路径。
#[derive(Debug)]
enum PathBuilder {
    /// 多段线路径：顶点序列，始终闭合。
    Polyline {
        vertices: Vec<Point2>,
        pending_x: Option<f64>,
    },
    /// 边路径：仅直线边（类型 1）生成线段。
    Edges {
        edge_type: i32,
        start: (Option<f64>, Option<f64>),
        end_x: Option<f64>,
        segments: Vec<Segment>,
    },
}

impl PathBuilder {
    fn new(flags: i32) -> Self {
        if flags & 2 != 0 {
            PathBuilder::Polyline {
                vertices: Vec::new(),
                pending_x: None,
            }
        } else {
            PathBuilder::Edges {
                edge_type: 0,
                start: (None, None),
                end_x: None,
                segments: Vec::new(),
            }
        }
    }

    fn apply(&mut self, code: i32, value: &str, line: usize) {
        match self {
            PathBuilder::Polyline {
                vertices,
                pending_x,
            } => match code {
                10 => *pending_x = parse_value(value, code, line),
                20 => {
                    if let (Some(x), Some(y)) = (pending_x.take(), parse_value(value, code, line)) {
                        vertices.push(Point2::new(x, y));
                    }
                }
                // 72 凸度标记、73 闭合标记：路径总按闭合处理
                _ => {}
            },
            PathBuilder::Edges {
                edge_type,
                start,
                end_x,
                segments,
            } => match code {
                72 => {
                    if let Some(kind) = parse_value(value, code, line) {
                        *edge_type = kind;
                    }
                }
                10 => start.0 = parse_value(value, code, line),
                20 => start.1 = parse_value(value, code, line),
                11 => *end_x = parse_value(value, code, line),
                21 if *edge_type == 1 => {
                    let end_y = parse_value::<f64>(value, code, line);
                    match (*start, end_x.take(), end_y) {
                        ((Some(sx), Some(sy)), Some(ex), Some(ey)) => {
                            let (from, to) = (Point2::new(sx, sy), Point2::new(ex, ey));
                            if from != to {
                                segments.push(Segment::new(from, to));
                            }
                        }
                        _ => warn!(line, "HATCH 直线边坐标不完整，已跳过"),
                    }
                    *start = (None, None);
                }
                _ => {}
            },
        }
    }

    fn finish(self) -> BoundaryPath {
        let segments = match self {
            PathBuilder::Polyline { vertices, .. } => {
                let n = vertices.len();
                (0..n)
                    .map(|i| Segment::new(vertices[i], vertices[(i + 1) % n]))
                    .filter(|segment| segment.start != segment.end)
                    .collect()
            }
            PathBuilder::Edges { segments, .. } => segments,
        };
        BoundaryPath { segments }
    }
}

#[derive(Debug, Default)]
pub(crate) struct HatchBuilder {
    scratch: Scratch,
    hatch: Hatch,
    path: Option<PathBuilder>,
}

impl HatchBuilder {
    pub(crate) fn apply(&mut self, code: i32, value: &str, line: usize) {
        if code == 8 {
            // 图层组码开启一个新的填充实体，之前累积的参数作废
            self.hatch = Hatch::default();
            self.path = None;
        }
        if self.scratch.apply(code, value) {
            return;
        }
        match code {
            92 => {
                self.end_path();
                if let Some(flags) = parse_value(value, code, line) {
                    self.path = Some(PathBuilder::new(flags));
                }
            }
            97 | 75 => self.end_path(),
            _ if self.path.is_some() => {
                if let Some(path) = self.path.as_mut() {
                    path.apply(code, value, line);
                }
            }
            41 => assign(&mut self.hatch.spacing, value, code, line),
            52 => assign(&mut self.hatch.angle, value, code, line),
            30 => assign(&mut self.hatch.elevation, value, code, line),
            43 => assign_x(&mut self.hatch.base, value, code, line),
            44 => assign_y(&mut self.hatch.base, value, code, line),
            45 => assign_x(&mut self.hatch.offset, value, code, line),
            46 => assign_y(&mut self.hatch.offset, value, code, line),
            _ => {}
        }
    }

    fn end_path(&mut self) {
        if let Some(path) = self.path.take() {
            let path = path.finish();
            if !path.segments.is_empty() {
                self.hatch.paths.push(path);
            }
        }
    }

    pub(crate) fn finish(mut self) -> (String, Hatch) {
        self.end_path();
        let (layer, attributes) = self.scratch.into_parts();
        self.hatch.attributes = attributes;
        (layer, self.hatch)
    }
}

fn assign(slot: &mut f64, value: &str, code: i32, line: usize) {
    if let Some(parsed) = parse_value(value, code, line) {
        *slot = parsed;
    }
}

fn assign_x(slot: &mut Point2, value: &str, code: i32, line: usize) {
    if let Some(x) = parse_value(value, code, line) {
        *slot = Point2::new(x, slot.y());
    }
}

fn assign_y(slot: &mut Point2, value: &str, code: i32, line: usize) {
    if let Some(y) = parse_value(value, code, line) {
        *slot = Point2::new(slot.x(), y);
    }
}
