// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 检测框与轨迹的 IOU 关联
//!
//! 每个检测框独立地与全部轨迹比较, 取 IOU 最大且超过阈值的轨迹。
//! 被匹配过的轨迹不会被标记占用, 同一帧内后续检测框仍可能再次匹配到它
//! (贪心、非互斥, 非全局最优)。需要一对一分配时可在此处替换为
//! 二分图匹配 (例如匈牙利算法), 调用方接口不变。

use super::geometry::compute_iou;
use super::types::PixelBox;

/// 在候选轨迹中寻找最佳匹配
///
/// `candidates` 为 `(轨迹ID, 预测框)`; 返回 `(轨迹ID, IOU)`。
/// IOU 相同时保留先出现的候选。
pub fn best_match<'a, I>(bbox: &PixelBox, candidates: I, iou_threshold: f32) -> Option<(u64, f32)>
where
    I: IntoIterator<Item = (u64, &'a PixelBox)>,
{
    let mut best: Option<(u64, f32)> = None;

    for (id, predicted) in candidates {
        let iou = compute_iou(predicted, bbox);
        if iou <= iou_threshold {
            continue;
        }
        match best {
            Some((_, best_iou)) if iou <= best_iou => {}
            _ => best = Some((id, iou)),
        }
    }

    best
}
