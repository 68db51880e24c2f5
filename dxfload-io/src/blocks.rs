//! INSERT 解析：在块注册表中查找模板并生成平移后的副本。

use dxfload_core::geometry::Vector3;
use dxfload_core::model::{BlockPayload, BlockRegistry};

use crate::builders::InsertRequest;
use crate::importer::DropReason;

/// 查找块并按插入点平移其内容；块的基点不参与平移。
pub(crate) fn resolve_insert(
    registry: &BlockRegistry,
    insert: InsertRequest,
) -> Result<(String, BlockPayload), DropReason> {
    let block = registry
        .resolve(&insert.layer, &insert.block)
        .ok_or_else(|| DropReason::UnknownBlock {
            id: insert.block.clone(),
        })?;
    let payload = block.payload.as_ref().ok_or_else(|| DropReason::EmptyBlock {
        id: insert.block.clone(),
    })?;

    let mut placed = payload.translated(Vector3::from(insert.position));
    placed.attributes_mut().extend(insert.attributes);
    Ok((insert.layer, placed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use dxfload_core::geometry::Point3;
    use dxfload_core::model::{Block, ExtraAttr, Hole, Point, Polyline};

    fn insert(layer: &str, block: &str, at: Point3) -> InsertRequest {
        InsertRequest {
            layer: layer.to_string(),
            block: block.to_string(),
            position: at,
            attributes: vec![ExtraAttr::new("APP", "insert")],
        }
    }

    #[test]
    fn point_is_translated_by_insertion_point() {
        let mut registry = BlockRegistry::new();
        registry.register(Block {
            layer: "0".to_string(),
            id: "B1".to_string(),
            base: Point3::new(100.0, 100.0, 0.0),
            payload: Some(BlockPayload::Point(Point {
                position: Point3::new(1.0, 1.0, 0.0),
                attributes: vec![ExtraAttr::new("APP", "block")],
            })),
        });

        let (layer, payload) =
            resolve_insert(&registry, insert("SITES", "B1", Point3::new(5.0, 5.0, 0.0)))
                .expect("块应当被解析");
        assert_eq!(layer, "SITES");
        let BlockPayload::Point(point) = payload else {
            panic!("期望点实体");
        };
        assert_eq!(point.position, Point3::new(6.0, 6.0, 0.0));
        assert_eq!(point.attributes.len(), 2);
        assert_eq!(point.attributes[1].value, "insert");

        // 模板本身不受影响
        let template = registry.resolve("0", "B1").and_then(|b| b.payload.clone());
        assert!(matches!(
            template,
            Some(BlockPayload::Point(p)) if p.position == Point3::new(1.0, 1.0, 0.0)
        ));
    }

    #[test]
    fn holes_move_with_the_polygon() {
        let mut polyline = Polyline::new(vec![Point3::new(0.0, 0.0, 0.0)], true);
        polyline.holes.push(Hole {
            points: vec![Point3::new(1.0, 2.0, 3.0)],
        });
        let mut registry = BlockRegistry::new();
        registry.register(Block {
            layer: "A".to_string(),
            id: "P".to_string(),
            base: Point3::new(0.0, 0.0, 0.0),
            payload: Some(BlockPayload::Polyline(polyline)),
        });
        let (_, payload) =
            resolve_insert(&registry, insert("B", "P", Point3::new(1.0, 1.0, 1.0))).expect("解析");
        let BlockPayload::Polyline(moved) = payload else {
            panic!("期望多段线");
        };
        assert_eq!(moved.holes[0].points[0], Point3::new(2.0, 3.0, 4.0));
    }

    #[test]
    fn unknown_and_empty_blocks_are_reported() {
        let mut registry = BlockRegistry::new();
        registry.register(Block {
            layer: "0".to_string(),
            id: "EMPTY".to_string(),
            base: Point3::new(0.0, 0.0, 0.0),
            payload: None,
        });
        let origin = Point3::new(0.0, 0.0, 0.0);
        assert_eq!(
            resolve_insert(&registry, insert("0", "NOPE", origin)).err(),
            Some(DropReason::UnknownBlock {
                id: "NOPE".to_string()
            })
        );
        assert_eq!(
            resolve_insert(&registry, insert("0", "EMPTY", origin)).err(),
            Some(DropReason::EmptyBlock {
                id: "EMPTY".to_string()
            })
        );
    }
}
