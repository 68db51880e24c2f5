//! 解析状态：段模式、当前打开的实体与块。

use crate::builders::{
    BlockBuilder, HatchBuilder, InsertBuilder, LayerBuilder, LwPolylineBuilder, PointBuilder,
    PolylineBuilder, TextBuilder,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Section {
    Outside,
    /// 已读到 SECTION，等待组码 2 的段名。
    Unnamed,
    Tables,
    Blocks,
    Entities,
    /// HEADER、CLASSES、OBJECTS 等不处理的段。
    Other,
}

impl Section {
    pub(crate) fn named(name: &str) -> Self {
        match name {
            "TABLES" => Section::Tables,
            "BLOCKS" => Section::Blocks,
            "ENTITIES" => Section::Entities,
            _ => Section::Other,
        }
    }

    #[inline]
    pub(crate) fn is_open(self) -> bool {
        self != Section::Outside
    }
}

/// 当前组码 0 之后打开的记录。
#[derive(Debug, Default)]
pub(crate) enum OpenEntity {
    #[default]
    None,
    /// 未知或不在有效上下文中的实体，其组码全部忽略。
    Skipped,
    Layer(LayerBuilder),
    /// BLOCK 头部；组码写入 `ParserState::open_block`。
    BlockHeader,
    Insert(InsertBuilder),
    Text(TextBuilder),
    Point(PointBuilder),
    Polyline(PolylineBuilder),
    LwPolyline(LwPolylineBuilder),
    Hatch(HatchBuilder),
}

impl OpenEntity {
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            OpenEntity::None => "NONE",
            OpenEntity::Skipped => "SKIPPED",
            OpenEntity::Layer(_) => "LAYER",
            OpenEntity::BlockHeader => "BLOCK",
            OpenEntity::Insert(_) => "INSERT",
            OpenEntity::Text(_) => "TEXT",
            OpenEntity::Point(_) => "POINT",
            OpenEntity::Polyline(_) => "POLYLINE",
            OpenEntity::LwPolyline(_) => "LWPOLYLINE",
            OpenEntity::Hatch(_) => "HATCH",
        }
    }
}

#[derive(Debug)]
pub(crate) struct ParserState {
    pub section: Section,
    pub open: OpenEntity,
    pub open_block: Option<BlockBuilder>,
    pub eof: bool,
    pub error: bool,
}

impl Default for ParserState {
    fn default() -> Self {
        Self {
            section: Section::Outside,
            open: OpenEntity::None,
            open_block: None,
            eof: false,
            error: false,
        }
    }
}

impl ParserState {
    #[inline]
    pub(crate) fn in_block(&self) -> bool {
        self.open_block.is_some()
    }

    /// TEXT、POINT、POLYLINE、HATCH 可出现在 ENTITIES 段或打开的块中。
    #[inline]
    pub(crate) fn accepts_drawable(&self) -> bool {
        self.section == Section::Entities || self.in_block()
    }
}
