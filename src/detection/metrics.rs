// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 接近速度与碰撞时间 (TTC) 估计
//!
//! 以边界框宽度的相对增长近似接近速率, 仅适用于近似正面接近。

use std::collections::VecDeque;

/// 根据宽度历史计算 `(speed %, momentary ttc 秒)`
///
/// 历史不足 `gap + 2` 个样本、历史宽度非正或 fps 非法时返回 `(0.0, +inf)`。
pub fn compute_metrics(width_history: &VecDeque<(i32, u64)>, fps: f64, gap: usize) -> (f64, f64) {
    let span = gap + 2;
    if width_history.len() < span || !(fps.is_finite() && fps > 0.0) {
        return (0.0, f64::INFINITY);
    }

    let (current_width, current_frame) = width_history[width_history.len() - 1];
    let (prev_width, prev_frame) = width_history[width_history.len() - span];
    if prev_width <= 0 {
        return (0.0, f64::INFINITY);
    }

    let current_width = current_width as f64;
    let prev_width = prev_width as f64;
    let ratio = current_width / prev_width;
    let delta_time = current_frame.saturating_sub(prev_frame) as f64 / fps;

    let speed = 100.0 * (current_width - prev_width) / prev_width;
    let ttc = if ratio > 1.0 {
        delta_time / (ratio - 1.0)
    } else {
        f64::INFINITY
    };

    (speed, ttc)
}
