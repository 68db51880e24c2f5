//! 组码状态机：逐对读取组码与值，驱动段/实体/块的嵌套状态并把实体写入图层模型。

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use dxfload_core::hatch::{self, FillOutcome};
use dxfload_core::kernel::{GeometryKernel, PlanarKernel};
use dxfload_core::model::{BlockPayload, Drawing, Polyline};
use dxfload_core::options::{ImportOptions, RingMode};
use dxfload_core::rings::{self, RingOutcome};
use tracing::{debug, info, trace, warn};

use crate::ImportError;
use crate::blocks::resolve_insert;
use crate::builders::{
    BlockBuilder, HatchBuilder, InsertBuilder, LayerBuilder, LwPolylineBuilder, PointBuilder,
    PolylineBuilder, TextBuilder,
};
use crate::reader::LineReader;
use crate::state::{OpenEntity, ParserState, Section};

/// 被静默丢弃或未按预期处理的内容。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    /// INSERT 引用的块不存在。
    UnknownBlock { id: String },
    /// INSERT 引用的块没有内容。
    EmptyBlock { id: String },
    /// 图层被单图层过滤排除。
    FilteredLayer { layer: String },
    /// 填充缺少边界路径或间距为 0。
    InvalidHatch,
    /// 块内的填充不受支持。
    HatchInBlock,
    /// 块已有内容，后续实体被丢弃。
    ExtraBlockPayload { block: String },
    /// 同一 (图层, 块名) 的重复定义，保留先定义者。
    DuplicateBlock { layer: String, id: String },
    /// 多段线没有可用顶点。
    EmptyGeometry,
    /// 环重建结果不是单个带洞多边形，多段线按原样保留。
    RingsRejected,
    /// 填充边界无法装配或间距无效，填充实体保留但没有填充线。
    FillAborted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dropped {
    pub line: usize,
    pub reason: DropReason,
}

/// DXF 导入器。每个实例只能解析一次输入。
pub struct DxfImporter<K = PlanarKernel> {
    options: ImportOptions,
    kernel: K,
    drawing: Drawing,
    state: ParserState,
    dropped: Vec<Dropped>,
    line_count: usize,
    started: bool,
}

impl DxfImporter<PlanarKernel> {
    pub fn new(options: ImportOptions) -> Self {
        Self::with_kernel(options, PlanarKernel::new())
    }
}

impl<K: GeometryKernel> DxfImporter<K> {
    pub fn with_kernel(options: ImportOptions, kernel: K) -> Self {
        let drawing = Drawing::new(options.srid, options.dimension);
        Self {
            options,
            kernel,
            drawing,
            state: ParserState::default(),
            dropped: Vec::new(),
            line_count: 0,
            started: false,
        }
    }

    pub fn options(&self) -> &ImportOptions {
        &self.options
    }

    pub fn drawing(&self) -> &Drawing {
        &self.drawing
    }

    pub fn into_drawing(self) -> Drawing {
        self.drawing
    }

    /// 已消费的输入行数。
    pub fn line_count(&self) -> usize {
        self.line_count
    }

    pub fn is_eof(&self) -> bool {
        self.state.eof
    }

    pub fn has_error(&self) -> bool {
        self.state.error
    }

    pub fn dropped(&self) -> &[Dropped] {
        &self.dropped
    }

    pub fn parse_file(&mut self, path: &Path) -> Result<(), ImportError> {
        if self.started {
            return Err(ImportError::AlreadyParsed);
        }
        let file = File::open(path).map_err(|source| ImportError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "开始导入 DXF 文件");
        self.parse_reader(BufReader::new(file))
    }

    pub fn parse_reader<R: BufRead>(&mut self, reader: R) -> Result<(), ImportError> {
        if self.started {
            return Err(ImportError::AlreadyParsed);
        }
        self.started = true;

        let mut lines = LineReader::new(reader);
        let result = self.run(&mut lines);
        self.line_count = lines.line_count();
        match result {
            Ok(()) => {
                info!(
                    lines = self.line_count,
                    layers = self.drawing.layer_count(),
                    entities = self.drawing.entity_count(),
                    blocks = self.drawing.blocks().len(),
                    dropped = self.dropped.len(),
                    "DXF 导入完成"
                );
                Ok(())
            }
            Err(err) => {
                self.state.error = true;
                warn!(
                    lines = self.line_count,
                    layers = self.drawing.layer_count(),
                    "DXF 导入中止: {err}"
                );
                Err(err)
            }
        }
    }

    fn run<R: BufRead>(&mut self, lines: &mut LineReader<R>) -> Result<(), ImportError> {
        loop {
            if self.state.eof {
                return match lines.next_line()? {
                    Some(_) => Err(ImportError::structure(
                        lines.line_count(),
                        "EOF 标记之后仍有数据",
                    )),
                    None => Ok(()),
                };
            }
            let Some((code, value)) = lines.next_pair()? else {
                break;
            };
            let line = lines.line_count();
            if code == 0 {
                self.on_tag(value.trim(), line)?;
            } else {
                self.on_value(code, &value, line);
            }
        }

        warn!(line = lines.line_count(), "输入在 EOF 标记之前结束");
        let open = std::mem::take(&mut self.state.open);
        self.flush(open, lines.line_count());
        self.close_block(lines.line_count());
        Ok(())
    }

    fn on_tag(&mut self, tag: &str, line: usize) -> Result<(), ImportError> {
        // POLYLINE 在 VERTEX 记录之间保持打开
        match std::mem::take(&mut self.state.open) {
            OpenEntity::Polyline(mut builder) if tag == "VERTEX" => {
                builder.begin_vertex();
                self.state.open = OpenEntity::Polyline(builder);
                return Ok(());
            }
            OpenEntity::Polyline(builder) if tag == "SEQEND" => {
                self.flush(OpenEntity::Polyline(builder), line);
                self.state.open = OpenEntity::Skipped;
                return Ok(());
            }
            open => self.flush(open, line),
        }

        let section = self.state.section;
        self.state.open = match tag {
            "SECTION" => {
                if section.is_open() {
                    return Err(ImportError::structure(line, "SECTION 出现在未结束的段内"));
                }
                self.state.section = Section::Unnamed;
                OpenEntity::None
            }
            "ENDSEC" => {
                if !section.is_open() {
                    return Err(ImportError::structure(line, "ENDSEC 没有对应的 SECTION"));
                }
                self.close_block(line);
                self.state.section = Section::Outside;
                OpenEntity::None
            }
            "EOF" => {
                self.close_block(line);
                self.state.eof = true;
                debug!(line, "读到 EOF 标记");
                OpenEntity::None
            }
            "BLOCK" if section == Section::Blocks => {
                self.close_block(line);
                self.state.open_block = Some(BlockBuilder::default());
                OpenEntity::BlockHeader
            }
            "ENDBLK" if section == Section::Blocks => {
                self.close_block(line);
                OpenEntity::Skipped
            }
            "LAYER" if section == Section::Tables => OpenEntity::Layer(LayerBuilder::default()),
            "INSERT" if section == Section::Entities => {
                OpenEntity::Insert(InsertBuilder::default())
            }
            "LWPOLYLINE" if section == Section::Entities => {
                OpenEntity::LwPolyline(LwPolylineBuilder::default())
            }
            "TEXT" if self.state.accepts_drawable() => OpenEntity::Text(TextBuilder::default()),
            "POINT" if self.state.accepts_drawable() => OpenEntity::Point(PointBuilder::default()),
            "POLYLINE" if self.state.accepts_drawable() => {
                OpenEntity::Polyline(PolylineBuilder::default())
            }
            "HATCH" if self.state.accepts_drawable() => OpenEntity::Hatch(HatchBuilder::default()),
            _ => OpenEntity::Skipped,
        };
        if section == Section::Unnamed && self.state.section == Section::Unnamed {
            // SECTION 之后直接出现记录：视为不处理的段
            self.state.section = Section::Other;
        }
        Ok(())
    }

    fn on_value(&mut self, code: i32, value: &str, line: usize) {
        if self.state.section == Section::Unnamed {
            if code == 2 {
                self.state.section = Section::named(value.trim());
                debug!(line, section = value.trim(), "进入段");
            }
            return;
        }
        match &mut self.state.open {
            OpenEntity::None | OpenEntity::Skipped => {}
            OpenEntity::Layer(builder) => builder.apply(code, value),
            OpenEntity::BlockHeader => {
                if let Some(block) = self.state.open_block.as_mut() {
                    block.apply(code, value, line);
                }
            }
            OpenEntity::Insert(builder) => builder.apply(code, value, line),
            OpenEntity::Text(builder) => builder.apply(code, value, line),
            OpenEntity::Point(builder) => builder.apply(code, value, line),
            OpenEntity::Polyline(builder) => builder.apply(code, value, line),
            OpenEntity::LwPolyline(builder) => builder.apply(code, value, line),
            OpenEntity::Hatch(builder) => builder.apply(code, value, line),
        }
    }

    fn record(&mut self, line: usize, reason: DropReason) {
        debug!(line, reason = ?reason, "实体未按原样导入");
        self.dropped.push(Dropped { line, reason });
    }

    fn flush(&mut self, open: OpenEntity, line: usize) {
        trace!(line, kind = open.kind(), "刷新实体");
        match open {
            OpenEntity::None | OpenEntity::Skipped | OpenEntity::BlockHeader => {}
            OpenEntity::Layer(builder) => {
                let Some(name) = builder.finish() else {
                    return;
                };
                if !self.options.accepts_layer(&name) {
                    self.record(line, DropReason::FilteredLayer { layer: name });
                } else if !self.drawing.declare_layer(&name) {
                    debug!(line, layer = %name, "重复的 LAYER 表项");
                }
            }
            OpenEntity::Insert(builder) => {
                match resolve_insert(self.drawing.blocks(), builder.finish()) {
                    Ok((layer, payload)) => self.place(layer, payload, line),
                    Err(reason) => self.record(line, reason),
                }
            }
            OpenEntity::Text(builder) => {
                let (layer, text) = builder.finish();
                self.store(layer, BlockPayload::Text(text), line);
            }
            OpenEntity::Point(builder) => {
                let (layer, point) = builder.finish();
                self.store(layer, BlockPayload::Point(point), line);
            }
            OpenEntity::Polyline(builder) => match builder.finish() {
                Some((layer, polyline)) => self.store_polyline(layer, polyline, line),
                None => self.record(line, DropReason::EmptyGeometry),
            },
            OpenEntity::LwPolyline(builder) => match builder.finish() {
                Some((layer, polyline)) => self.store_polyline(layer, polyline, line),
                None => self.record(line, DropReason::EmptyGeometry),
            },
            OpenEntity::Hatch(builder) => self.store_hatch(builder, line),
        }
    }

    /// 块内实体成为块内容，其余实体写入图层。
    fn store(&mut self, layer: String, payload: BlockPayload, line: usize) {
        if let Some(block) = self.state.open_block.as_mut() {
            if block.payload.is_none() {
                debug!(line, block = block.id(), kind = payload.kind(), "块内容已设置");
                block.payload = Some(payload);
            } else {
                let block = block.id().to_string();
                self.record(line, DropReason::ExtraBlockPayload { block });
            }
            return;
        }
        self.place(layer, payload, line);
    }

    fn store_polyline(&mut self, layer: String, mut polyline: Polyline, line: usize) {
        if self.state.in_block() || !self.options.accepts_layer(&layer) {
            self.store(layer, BlockPayload::Polyline(polyline), line);
            return;
        }
        let outcome = match self.options.ring_mode {
            RingMode::None => RingOutcome::NotApplicable,
            RingMode::Link => rings::link_rings(&self.kernel, &mut polyline),
            RingMode::Split => rings::split_rings(&self.kernel, &mut polyline),
        };
        match outcome {
            RingOutcome::Rewritten => {
                debug!(line, holes = polyline.holes.len(), "多段线已重建为带洞多边形");
            }
            RingOutcome::Rejected => self.record(line, DropReason::RingsRejected),
            RingOutcome::NotApplicable => {}
        }
        self.place(layer, BlockPayload::Polyline(polyline), line);
    }

    fn store_hatch(&mut self, builder: HatchBuilder, line: usize) {
        let (layer, mut hatch) = builder.finish();
        if self.state.in_block() {
            self.record(line, DropReason::HatchInBlock);
            return;
        }
        if !hatch.is_valid() {
            self.record(line, DropReason::InvalidHatch);
            return;
        }
        if !self.options.accepts_layer(&layer) {
            self.record(line, DropReason::FilteredLayer { layer });
            return;
        }
        match hatch::generate_fill(&self.kernel, &mut hatch) {
            FillOutcome::Filled(segments) => debug!(line, segments, "填充线已生成"),
            FillOutcome::NoBoundary | FillOutcome::BadSpacing => {
                self.record(line, DropReason::FillAborted);
            }
        }
        self.drawing.ensure_layer(&layer).add_hatch(hatch);
    }

    /// 按图层过滤写入模型，图层不存在时强制创建。
    fn place(&mut self, layer: String, payload: BlockPayload, line: usize) {
        if !self.options.accepts_layer(&layer) {
            self.record(line, DropReason::FilteredLayer { layer });
            return;
        }
        self.drawing.ensure_layer(&layer).add_payload(payload);
    }

    fn close_block(&mut self, line: usize) {
        let Some(builder) = self.state.open_block.take() else {
            return;
        };
        let block = builder.finish();
        let (layer, id) = (block.layer.clone(), block.id.clone());
        if self.drawing.blocks_mut().register(block) {
            debug!(line, layer = %layer, id = %id, "块已注册");
        } else {
            self.record(line, DropReason::DuplicateBlock { layer, id });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dxfload_core::geometry::Point3;
    use dxfload_core::options::DimensionMode;
    use std::io::Cursor;

    /// 由 (组码, 值) 序列拼出 DXF 文本。
    fn dxf(pairs: &[(i32, &str)]) -> String {
        pairs
            .iter()
            .map(|(code, value)| format!("{code:>3}\n{value}\n"))
            .collect()
    }

    fn parse(options: ImportOptions, pairs: &[(i32, &str)]) -> DxfImporter {
        let mut importer = DxfImporter::new(options);
        importer
            .parse_reader(Cursor::new(dxf(pairs)))
            .expect("解析应当成功");
        importer
    }

    #[test]
    fn vertex_sequence_stays_in_one_polyline() {
        let importer = parse(
            ImportOptions::default(),
            &[
                (0, "SECTION"),
                (2, "ENTITIES"),
                (0, "POLYLINE"),
                (8, "ROADS"),
                (0, "VERTEX"),
                (10, "0"),
                (20, "0"),
                (0, "VERTEX"),
                (10, "1"),
                (20, "0"),
                (0, "VERTEX"),
                (10, "2"),
                (20, "1"),
                (0, "SEQEND"),
                (8, "ROADS"),
                (0, "ENDSEC"),
                (0, "EOF"),
            ],
        );
        let roads = importer.drawing().layer("ROADS").expect("ROADS 图层");
        assert_eq!(roads.lines.len(), 1);
        assert_eq!(roads.lines[0].points.len(), 3);
        assert_eq!(roads.lines[0].points[2], Point3::new(2.0, 1.0, 0.0));
        assert!(importer.is_eof());
        assert!(!importer.has_error());
    }

    #[test]
    fn block_keeps_first_payload_only() {
        let importer = parse(
            ImportOptions::default(),
            &[
                (0, "SECTION"),
                (2, "BLOCKS"),
                (0, "BLOCK"),
                (8, "0"),
                (2, "MARK"),
                (0, "POINT"),
                (10, "1"),
                (20, "1"),
                (0, "TEXT"),
                (1, "ignored"),
                (0, "HATCH"),
                (0, "ENDBLK"),
                (0, "ENDSEC"),
                (0, "EOF"),
            ],
        );
        let block = importer.drawing().blocks().resolve("0", "MARK").expect("块");
        assert!(matches!(block.payload, Some(BlockPayload::Point(_))));
        let reasons: Vec<&DropReason> = importer.dropped().iter().map(|d| &d.reason).collect();
        assert_eq!(
            reasons,
            vec![
                &DropReason::ExtraBlockPayload {
                    block: "MARK".to_string()
                },
                &DropReason::HatchInBlock,
            ]
        );
        assert_eq!(importer.drawing().layer_count(), 0);
    }

    #[test]
    fn entities_outside_valid_sections_are_skipped() {
        let importer = parse(
            ImportOptions::default(),
            &[
                (0, "SECTION"),
                (2, "TABLES"),
                (0, "POINT"),
                (8, "WRONG"),
                (0, "ENDSEC"),
                (0, "SECTION"),
                (2, "ENTITIES"),
                (0, "LAYER"),
                (2, "WRONG"),
                (0, "CIRCLE"),
                (8, "WRONG"),
                (10, "1"),
                (0, "ENDSEC"),
                (0, "EOF"),
            ],
        );
        assert_eq!(importer.drawing().layer_count(), 0);
    }

    #[test]
    fn missing_eof_still_flushes_open_entity() {
        let importer = parse(
            ImportOptions::default(),
            &[(0, "SECTION"), (2, "ENTITIES"), (0, "POINT"), (8, "P"), (10, "3")],
        );
        assert!(!importer.is_eof());
        let layer = importer.drawing().layer("P").expect("P 图层");
        assert_eq!(layer.points[0].position, Point3::new(3.0, 0.0, 0.0));
    }

    #[test]
    fn section_inside_section_is_fatal() {
        let mut importer = DxfImporter::new(ImportOptions::default());
        let err = importer
            .parse_reader(Cursor::new(dxf(&[
                (0, "SECTION"),
                (2, "ENTITIES"),
                (0, "SECTION"),
            ])))
            .expect_err("应当失败");
        assert!(matches!(err, ImportError::Structure { line: 6, .. }));
        assert!(importer.has_error());
    }

    #[test]
    fn stray_endsec_is_fatal() {
        let mut importer = DxfImporter::new(ImportOptions::default());
        let err = importer
            .parse_reader(Cursor::new(dxf(&[(0, "ENDSEC")])))
            .expect_err("应当失败");
        assert!(matches!(err, ImportError::Structure { .. }));
    }

    #[test]
    fn ring_link_mode_rewrites_polylines() {
        let mut pairs = vec![(0, "SECTION"), (2, "ENTITIES"), (0, "LWPOLYLINE"), (8, "PARCELS")];
        let coords = [
            ("0", "0"),
            ("10", "0"),
            ("10", "10"),
            ("0", "10"),
            ("0", "0"),
            ("3", "3"),
            ("3", "7"),
            ("7", "7"),
            ("7", "3"),
            ("3", "3"),
            ("0", "0"),
        ];
        for (x, y) in coords {
            pairs.push((10, x));
            pairs.push((20, y));
        }
        pairs.extend([(0, "ENDSEC"), (0, "EOF")]);
        let importer = parse(
            ImportOptions {
                ring_mode: RingMode::Link,
                ..ImportOptions::default()
            },
            &pairs,
        );
        let layer = importer.drawing().layer("PARCELS").expect("PARCELS 图层");
        assert!(layer.lines.is_empty());
        assert_eq!(layer.polygons.len(), 1);
        assert_eq!(layer.polygons[0].holes.len(), 1);
        assert_eq!(layer.polygons[0].points.len(), 5);
    }

    #[test]
    fn forced_dimension_applies_to_new_layers() {
        let importer = parse(
            ImportOptions {
                dimension: DimensionMode::Force3d,
                ..ImportOptions::default()
            },
            &[(0, "SECTION"), (2, "ENTITIES"), (0, "POINT"), (0, "ENDSEC"), (0, "EOF")],
        );
        let layer = importer.drawing().layer("0").expect("默认图层");
        assert!(layer.flags.has_3d_point);
        assert!(layer.flags.has_3d_hatch);
    }

    #[test]
    fn large_oblique_hatch_is_filled_without_drops() {
        let importer = parse(
            ImportOptions::default(),
            &[
                (0, "SECTION"),
                (2, "ENTITIES"),
                (0, "HATCH"),
                (8, "FILL"),
                (91, "1"),
                (92, "2"),
                (93, "4"),
                (10, "0"),
                (20, "0"),
                (10, "10000"),
                (20, "0"),
                (10, "10000"),
                (20, "10000"),
                (10, "0"),
                (20, "10000"),
                (97, "0"),
                (52, "45"),
                (41, "3.175"),
                (0, "ENDSEC"),
                (0, "EOF"),
            ],
        );
        assert!(importer.dropped().is_empty(), "{:?}", importer.dropped());
        let hatch = &importer.drawing().layer("FILL").expect("FILL 图层").hatches[0];
        assert!(hatch.fill.len() > 4_000);
    }
}
