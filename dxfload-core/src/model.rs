//! 导入结果的图层模型：图层、块以及各类实体。
//!
//! 所有节点都由 [`Drawing`] 独占持有，销毁时按树形结构自动释放。

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::geometry::{Point2, Point3, Vector3};
use crate::options::DimensionMode;

/// 未指定组码 8 时使用的图层名。
pub const DEFAULT_LAYER: &str = "0";

/// 扩展属性（XDATA），挂在紧随其后完成的实体上。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtraAttr {
    pub key: String,
    pub value: String,
}

impl ExtraAttr {
    #[inline]
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Text {
    pub position: Point3,
    pub content: String,
    pub height: f64,
    /// 旋转角（度）。
    pub rotation: f64,
    #[serde(default)]
    pub attributes: Vec<ExtraAttr>,
}

impl Text {
    #[inline]
    pub fn is_3d(&self) -> bool {
        self.position.has_z()
    }

    pub fn translated(&self, offset: Vector3) -> Self {
        Self {
            position: self.position.translate(offset),
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub position: Point3,
    #[serde(default)]
    pub attributes: Vec<ExtraAttr>,
}

impl Point {
    #[inline]
    pub fn is_3d(&self) -> bool {
        self.position.has_z()
    }

    pub fn translated(&self, offset: Vector3) -> Self {
        Self {
            position: self.position.translate(offset),
            attributes: self.attributes.clone(),
        }
    }
}

/// 多边形内环。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hole {
    pub points: Vec<Point3>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Polyline {
    pub points: Vec<Point3>,
    pub closed: bool,
    #[serde(default)]
    pub holes: Vec<Hole>,
    #[serde(default)]
    pub attributes: Vec<ExtraAttr>,
}

impl Polyline {
    pub fn new(points: Vec<Point3>, closed: bool) -> Self {
        Self {
            points,
            closed,
            holes: Vec::new(),
            attributes: Vec::new(),
        }
    }

    pub fn is_3d(&self) -> bool {
        self.points.iter().any(|p| p.has_z())
            || self
                .holes
                .iter()
                .any(|hole| hole.points.iter().any(|p| p.has_z()))
    }

    pub fn translated(&self, offset: Vector3) -> Self {
        Self {
            points: self.points.iter().map(|p| p.translate(offset)).collect(),
            closed: self.closed,
            holes: self
                .holes
                .iter()
                .map(|hole| Hole {
                    points: hole.points.iter().map(|p| p.translate(offset)).collect(),
                })
                .collect(),
            attributes: self.attributes.clone(),
        }
    }
}

/// 显式两点线段，用于填充边界与生成的填充线。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub start: Point2,
    pub end: Point2,
}

impl Segment {
    #[inline]
    pub fn new(start: Point2, end: Point2) -> Self {
        Self { start, end }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundaryPath {
    pub segments: Vec<Segment>,
}

/// 带内环的平面多边形（填充边界）。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AreaPolygon {
    pub exterior: Vec<Point2>,
    pub interiors: Vec<Vec<Point2>>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Hatch {
    pub spacing: f64,
    /// 填充角（度）。
    pub angle: f64,
    pub base: Point2,
    pub offset: Point2,
    pub elevation: f64,
    pub paths: Vec<BoundaryPath>,
    /// 由边界路径装配出的区域；仅在填充线生成后存在。
    #[serde(default)]
    pub boundary: Vec<AreaPolygon>,
    #[serde(default)]
    pub fill: Vec<Segment>,
    #[serde(default)]
    pub attributes: Vec<ExtraAttr>,
}

impl Hatch {
    /// 至少一条边界路径且间距非零。
    #[inline]
    pub fn is_valid(&self) -> bool {
        !self.paths.is_empty() && self.spacing != 0.0
    }

    #[inline]
    pub fn is_3d(&self) -> bool {
        self.elevation != 0.0
    }
}

/// 图层上的派生标记，随实体加入增量更新。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LayerFlags {
    pub has_3d_text: bool,
    pub has_3d_point: bool,
    pub has_3d_line: bool,
    pub has_3d_polygon: bool,
    pub has_3d_hatch: bool,
    pub has_extra_text: bool,
    pub has_extra_point: bool,
    pub has_extra_line: bool,
    pub has_extra_polygon: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Layer {
    pub name: String,
    pub dimension: DimensionMode,
    pub flags: LayerFlags,
    pub texts: Vec<Text>,
    pub points: Vec<Point>,
    pub lines: Vec<Polyline>,
    pub polygons: Vec<Polyline>,
    pub hatches: Vec<Hatch>,
}

impl Layer {
    /// 强制维度模式下，3D 标记在创建时即确定。
    pub fn new(name: impl Into<String>, dimension: DimensionMode) -> Self {
        let forced = dimension == DimensionMode::Force3d;
        Self {
            name: name.into(),
            dimension,
            flags: LayerFlags {
                has_3d_text: forced,
                has_3d_point: forced,
                has_3d_line: forced,
                has_3d_polygon: forced,
                has_3d_hatch: forced,
                ..LayerFlags::default()
            },
            texts: Vec::new(),
            points: Vec::new(),
            lines: Vec::new(),
            polygons: Vec::new(),
            hatches: Vec::new(),
        }
    }

    #[inline]
    fn detects_z(&self) -> bool {
        self.dimension == DimensionMode::Auto
    }

    pub fn add_text(&mut self, text: Text) {
        if self.detects_z() && text.is_3d() {
            self.flags.has_3d_text = true;
        }
        if !text.attributes.is_empty() {
            self.flags.has_extra_text = true;
        }
        self.texts.push(text);
    }

    pub fn add_point(&mut self, point: Point) {
        if self.detects_z() && point.is_3d() {
            self.flags.has_3d_point = true;
        }
        if !point.attributes.is_empty() {
            self.flags.has_extra_point = true;
        }
        self.points.push(point);
    }

    /// 闭合多段线归入多边形集合，否则归入线集合。
    pub fn add_polyline(&mut self, polyline: Polyline) {
        let is_3d = self.detects_z() && polyline.is_3d();
        let has_extra = !polyline.attributes.is_empty();
        if polyline.closed {
            self.flags.has_3d_polygon |= is_3d;
            self.flags.has_extra_polygon |= has_extra;
            self.polygons.push(polyline);
        } else {
            self.flags.has_3d_line |= is_3d;
            self.flags.has_extra_line |= has_extra;
            self.lines.push(polyline);
        }
    }

    pub fn add_hatch(&mut self, hatch: Hatch) {
        if self.detects_z() && hatch.is_3d() {
            self.flags.has_3d_hatch = true;
        }
        self.hatches.push(hatch);
    }

    /// 按块内容的实体种类分派到对应集合。
    pub fn add_payload(&mut self, payload: BlockPayload) {
        match payload {
            BlockPayload::Text(text) => self.add_text(text),
            BlockPayload::Point(point) => self.add_point(point),
            BlockPayload::Polyline(polyline) => self.add_polyline(polyline),
        }
    }

    pub fn entity_count(&self) -> usize {
        self.texts.len()
            + self.points.len()
            + self.lines.len()
            + self.polygons.len()
            + self.hatches.len()
    }
}

/// 块内容：恰好一种实体。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BlockPayload {
    Text(Text),
    Point(Point),
    Polyline(Polyline),
}

impl BlockPayload {
    pub fn translated(&self, offset: Vector3) -> Self {
        match self {
            BlockPayload::Text(text) => BlockPayload::Text(text.translated(offset)),
            BlockPayload::Point(point) => BlockPayload::Point(point.translated(offset)),
            BlockPayload::Polyline(polyline) => BlockPayload::Polyline(polyline.translated(offset)),
        }
    }

    pub fn attributes_mut(&mut self) -> &mut Vec<ExtraAttr> {
        match self {
            BlockPayload::Text(text) => &mut text.attributes,
            BlockPayload::Point(point) => &mut point.attributes,
            BlockPayload::Polyline(polyline) => &mut polyline.attributes,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            BlockPayload::Text(_) => "TEXT",
            BlockPayload::Point(_) => "POINT",
            BlockPayload::Polyline(_) => "POLYLINE",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub layer: String,
    pub id: String,
    pub base: Point3,
    pub payload: Option<BlockPayload>,
}

/// 块注册表：块按定义顺序存放，另建 (图层, 块名) 与块名两级索引。
#[derive(Debug, Clone, Default, Serialize)]
pub struct BlockRegistry {
    blocks: Vec<Block>,
    #[serde(skip)]
    by_key: HashMap<(String, String), usize>,
    #[serde(skip)]
    by_id: HashMap<String, usize>,
}

impl BlockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册块；若 (图层, 块名) 已存在则保留先定义的块并返回 `false`。
    pub fn register(&mut self, block: Block) -> bool {
        let key = (block.layer.clone(), block.id.clone());
        if self.by_key.contains_key(&key) {
            return false;
        }
        let index = self.blocks.len();
        self.by_id.entry(block.id.clone()).or_insert(index);
        self.by_key.insert(key, index);
        self.blocks.push(block);
        true
    }

    /// 先按 (图层, 块名) 精确查找，再回退到任意图层上首个同名块。
    pub fn resolve(&self, layer: &str, id: &str) -> Option<&Block> {
        let key = (layer.to_string(), id.to_string());
        self.by_key
            .get(&key)
            .or_else(|| self.by_id.get(id))
            .and_then(|&index| self.blocks.get(index))
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &Block> {
        self.blocks.iter()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

/// 导入结果：有序图层列表与块注册表。
#[derive(Debug, Clone, Default, Serialize)]
pub struct Drawing {
    srid: Option<i32>,
    dimension: DimensionMode,
    layers: Vec<Layer>,
    #[serde(skip)]
    layer_index: HashMap<String, usize>,
    blocks: BlockRegistry,
}

impl Drawing {
    pub fn new(srid: Option<i32>, dimension: DimensionMode) -> Self {
        Self {
            srid,
            dimension,
            ..Self::default()
        }
    }

    #[inline]
    pub fn srid(&self) -> Option<i32> {
        self.srid
    }

    #[inline]
    pub fn dimension(&self) -> DimensionMode {
        self.dimension
    }

    /// 由 LAYER 表项声明图层；重名时返回 `false`。
    pub fn declare_layer(&mut self, name: &str) -> bool {
        if self.layer_index.contains_key(name) {
            return false;
        }
        self.push_layer(name);
        true
    }

    /// 获取图层，不存在时强制创建。
    pub fn ensure_layer(&mut self, name: &str) -> &mut Layer {
        let index = match self.layer_index.get(name) {
            Some(&index) => index,
            None => {
                debug!(layer = name, "图层未在 LAYER 表中声明，强制创建");
                self.push_layer(name)
            }
        };
        &mut self.layers[index]
    }

    fn push_layer(&mut self, name: &str) -> usize {
        let index = self.layers.len();
        self.layers.push(Layer::new(name, self.dimension));
        self.layer_index.insert(name.to_string(), index);
        index
    }

    #[inline]
    pub fn layer(&self, name: &str) -> Option<&Layer> {
        self.layer_index
            .get(name)
            .and_then(|&index| self.layers.get(index))
    }

    #[inline]
    pub fn layers(&self) -> impl Iterator<Item = &Layer> {
        self.layers.iter()
    }

    #[inline]
    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    #[inline]
    pub fn blocks(&self) -> &BlockRegistry {
        &self.blocks
    }

    #[inline]
    pub fn blocks_mut(&mut self) -> &mut BlockRegistry {
        &mut self.blocks
    }

    pub fn entity_count(&self) -> usize {
        self.layers.iter().map(Layer::entity_count).sum()
    }
}
