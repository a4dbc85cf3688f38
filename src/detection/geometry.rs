// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 边界框几何工具
//! Bounding box geometry helpers

use super::types::PixelBox;

/// 角点框 → 状态量 `[cx, cy, w, h]`
pub fn bbox_to_state(bbox: &PixelBox) -> [f32; 4] {
    let cx = (bbox.x1 + bbox.x2) as f32 / 2.0;
    let cy = (bbox.y1 + bbox.y2) as f32 / 2.0;
    let w = bbox.width() as f32;
    let h = bbox.height() as f32;
    [cx, cy, w, h]
}

/// 状态量 `[cx, cy, w, h, ..]` → 角点框 (截断取整)
pub fn state_to_bbox(state: &[f32]) -> PixelBox {
    let (cx, cy, w, h) = (state[0], state[1], state[2], state[3]);
    PixelBox {
        x1: (cx - w / 2.0) as i32,
        y1: (cy - h / 2.0) as i32,
        x2: (cx + w / 2.0) as i32,
        y2: (cy + h / 2.0) as i32,
    }
}

/// 计算两个边界框的IOU (Intersection over Union)
pub fn compute_iou(bbox1: &PixelBox, bbox2: &PixelBox) -> f32 {
    let x1 = bbox1.x1.max(bbox2.x1);
    let y1 = bbox1.y1.max(bbox2.y1);
    let x2 = bbox1.x2.min(bbox2.x2);
    let y2 = bbox1.y2.min(bbox2.y2);

    let intersection = (x2 - x1).max(0) as i64 * (y2 - y1).max(0) as i64;
    let area1 = bbox1.width() as i64 * bbox1.height() as i64;
    let area2 = bbox2.width() as i64 * bbox2.height() as i64;
    let union = area1 + area2 - intersection;

    if union <= 0 {
        return 0.0;
    }

    (intersection as f64 / union as f64) as f32
}
