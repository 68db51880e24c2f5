use dxfload_core::kernel::GeometryKernel;
use dxfload_core::model::{Layer, LayerFlags};
use dxfload_io::DxfImporter;
use tracing::info;

/// 打印导入结果概览：按图层列出实体数量与维度标记。
pub fn print<K: GeometryKernel>(importer: &DxfImporter<K>) {
    let drawing = importer.drawing();
    info!(
        layer_count = drawing.layer_count(),
        entity_count = drawing.entity_count(),
        block_count = drawing.blocks().len(),
        "导入结果统计"
    );

    println!("DXF 导入结果");
    println!(
        "  行数={}, EOF={}, 错误={}",
        importer.line_count(),
        if importer.is_eof() { "是" } else { "否" },
        if importer.has_error() { "是" } else { "否" }
    );
    match drawing.srid() {
        Some(srid) => println!("  SRID={srid}"),
        None => println!("  SRID 未设置"),
    }

    println!("图层：");
    for layer in drawing.layers() {
        print_layer(layer);
    }

    println!("块定义：");
    if drawing.blocks().is_empty() {
        println!("  （无）");
    }
    for block in drawing.blocks().iter() {
        let kind = block.payload.as_ref().map_or("空", |payload| payload.kind());
        println!(
            "  - {} @ {}，基点=({:.2}, {:.2}, {:.2})，内容={}",
            block.id,
            block.layer,
            block.base.x(),
            block.base.y(),
            block.base.z(),
            kind
        );
    }

    let dropped = importer.dropped();
    if !dropped.is_empty() {
        println!("未导入或降级处理的内容：{} 项", dropped.len());
        for entry in dropped {
            println!("  - 第 {} 行: {:?}", entry.line, entry.reason);
        }
    }
}

fn print_layer(layer: &Layer) {
    println!(
        "  - {}：文字={}, 点={}, 线={}, 多边形={}, 填充={}{}",
        layer.name,
        layer.texts.len(),
        layer.points.len(),
        layer.lines.len(),
        layer.polygons.len(),
        layer.hatches.len(),
        describe_flags(&layer.flags)
    );
    let holes: usize = layer.polygons.iter().map(|polygon| polygon.holes.len()).sum();
    if holes > 0 {
        println!("      内环={holes}");
    }
    let fill: usize = layer.hatches.iter().map(|hatch| hatch.fill.len()).sum();
    if fill > 0 {
        println!("      填充线段={fill}");
    }
}

fn describe_flags(flags: &LayerFlags) -> String {
    let mut tags = Vec::new();
    for (set, name) in [
        (flags.has_3d_text, "3D文字"),
        (flags.has_3d_point, "3D点"),
        (flags.has_3d_line, "3D线"),
        (flags.has_3d_polygon, "3D多边形"),
        (flags.has_3d_hatch, "3D填充"),
    ] {
        if set {
            tags.push(name);
        }
    }
    if flags.has_extra_text || flags.has_extra_point || flags.has_extra_line || flags.has_extra_polygon
    {
        tags.push("扩展属性");
    }
    if tags.is_empty() {
        String::new()
    } else {
        format!(" [{}]", tags.join(", "))
    }
}
