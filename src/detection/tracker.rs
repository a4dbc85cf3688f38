// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 车辆跟踪器 (轨迹生命周期管理)
//! Vehicle tracker: track lifecycle, association and warning evaluation

use std::collections::{BTreeMap, VecDeque};

use super::association::best_match;
use super::kalman::KalmanBoxFilter;
use super::metrics::compute_metrics;
use super::types::{
    frame_norm, validate_detection, DetectionBox, FrameSize, PixelBox, TrackSnapshot,
};
use super::warning::{WarningState, WarningThresholds};
use crate::alert::WarningFlag;
use crate::config::TrackerConfig;
use crate::error::{Result, TrackError};

// ========== 跟踪对象 ==========

/// 跟踪中的车辆
#[derive(Clone, Debug)]
pub struct Track {
    /// 唯一跟踪ID (单调递增, 不复用)
    pub id: u64,

    /// 当前边界框 (像素, 卡尔曼滤波后)
    pub bbox: PixelBox,

    /// 最近一次匹配的检测置信度
    pub confidence: f32,

    /// 宽度历史 `(宽度, 帧号)`, 先进先出
    pub width_history: VecDeque<(i32, u64)>,

    /// 瞬时TTC历史 `(ttc, 帧号)`
    pub ttc_history: VecDeque<(f64, u64)>,

    pub last_update_frame: u64,

    /// 宽度相对变化 (%)
    pub speed: f64,

    /// 碰撞时间 (秒)
    pub ttc: f64,

    warning: WarningState,
    kalman: KalmanBoxFilter,
}

impl Track {
    fn new(
        id: u64,
        bbox: PixelBox,
        confidence: f32,
        frame_index: u64,
        ignore_warning: bool,
        config: &TrackerConfig,
    ) -> Self {
        let kalman = KalmanBoxFilter::new(
            &bbox,
            config.kalman_process_noise,
            config.kalman_measurement_noise,
        )
        .with_adaptive_noise(config.kalman_adaptive_noise);

        let mut width_history = VecDeque::with_capacity(config.max_history + 1);
        width_history.push_back((bbox.width(), frame_index));
        let mut ttc_history = VecDeque::with_capacity(config.max_history + 1);
        ttc_history.push_back((f64::INFINITY, frame_index));

        Self {
            id,
            bbox,
            confidence,
            width_history,
            ttc_history,
            last_update_frame: frame_index,
            speed: 0.0,
            ttc: f64::INFINITY,
            warning: WarningState::new(ignore_warning),
            kalman,
        }
    }

    pub fn warning(&self) -> bool {
        self.warning.is_active()
    }

    pub fn ignore_warning(&self) -> bool {
        self.warning.is_ignored()
    }

    pub fn warning_trigger_frame(&self) -> Option<u64> {
        self.warning.trigger_frame()
    }

    pub fn snapshot(&self) -> TrackSnapshot {
        TrackSnapshot {
            id: self.id,
            bbox: self.bbox.to_array(),
            confidence: self.confidence,
            speed: self.speed,
            ttc: self.ttc,
            warning: self.warning(),
        }
    }

    fn predict(&mut self) {
        self.bbox = self.kalman.predict();
    }

    fn refresh_metrics(&mut self, fps: f64, gap: usize) {
        let (speed, ttc) = compute_metrics(&self.width_history, fps, gap);
        self.speed = speed;
        self.ttc = ttc;
    }

    /// 融合匹配到的检测, 返回预警状态是否切换
    #[allow(clippy::too_many_arguments)]
    fn absorb(
        &mut self,
        bbox: &PixelBox,
        confidence: f32,
        ignore_warning: bool,
        frame_index: u64,
        fps: f64,
        config: &TrackerConfig,
        thresholds: &WarningThresholds,
    ) -> Result<bool> {
        self.kalman.correct(bbox)?;
        self.bbox = self.kalman.bbox();
        self.confidence = confidence;
        self.last_update_frame = frame_index;
        push_bounded(
            &mut self.width_history,
            (bbox.width(), frame_index),
            config.max_history,
        );

        let was_active = self.warning.is_active();
        self.warning.exempt(ignore_warning);

        self.refresh_metrics(fps, config.metric_history_gap);
        push_bounded(
            &mut self.ttc_history,
            (self.ttc, frame_index),
            config.max_history,
        );

        let switched = self
            .warning
            .update(self.speed, self.ttc, frame_index, thresholds);
        Ok(switched || was_active != self.warning.is_active())
    }
}

fn push_bounded<T>(queue: &mut VecDeque<T>, item: T, capacity: usize) {
    queue.push_back(item);
    while queue.len() > capacity {
        queue.pop_front();
    }
}

// ========== 跟踪器 ==========

/// 车辆跟踪器
///
/// 每帧调用一次 [`VehicleTracker::update`]; 不支持并发调用。
/// 预警汇总结果通过 [`WarningFlag`] 共享给告警线程。
pub struct VehicleTracker {
    config: TrackerConfig,
    thresholds: WarningThresholds,

    /// 轨迹表 (按ID有序, 关联时IOU相同则先建的轨迹优先)
    tracks: BTreeMap<u64, Track>,

    /// 下一个分配的ID
    next_id: u64,

    /// 已处理的帧数
    frame_count: u64,

    warning_flag: WarningFlag,
}

impl VehicleTracker {
    pub fn new(config: TrackerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: TrackerConfig) -> Self {
        Self {
            thresholds: WarningThresholds::from(&config),
            config,
            tracks: BTreeMap::new(),
            next_id: 0,
            frame_count: 0,
            warning_flag: WarningFlag::new(),
        }
    }

    /// 更新跟踪 (每帧一次)
    ///
    /// 顺序: 预测 → 删除过期轨迹 → 重算指标 → 置信度过滤 → 匹配/新建 → 汇总预警。
    /// 输入非法时返回错误, 且不修改任何内部状态。
    ///
    /// # 参数
    /// - `detections`: 当前帧检测框 (归一化坐标)
    /// - `frame`: 帧尺寸 (像素)
    /// - `frame_index`: 帧序号
    /// - `fps`: 当前帧率估计
    ///
    /// # 返回
    /// 当前所有轨迹的快照 (按ID排列, 调用方不应依赖顺序)
    pub fn update<D: DetectionBox>(
        &mut self,
        detections: &[D],
        frame: FrameSize,
        frame_index: u64,
        fps: f64,
    ) -> Result<Vec<TrackSnapshot>> {
        // 0. 输入校验
        frame.validate()?;
        if !(fps.is_finite() && fps > 0.0) {
            return Err(TrackError::InvalidFps(fps));
        }
        for (index, det) in detections.iter().enumerate() {
            validate_detection(index, det)?;
        }
        self.frame_count += 1;

        // 1. 所有轨迹先预测
        for track in self.tracks.values_mut() {
            track.predict();
        }

        // 2. 删除丢失太久的轨迹
        let remove_time = self.config.remove_time_frame;
        self.tracks.retain(|id, track| {
            let keep = frame_index.saturating_sub(track.last_update_frame) <= remove_time;
            if !keep {
                log::debug!("🗑️  车辆 #{} 已丢失, 移除 (最后更新帧 {})", id, track.last_update_frame);
            }
            keep
        });

        // 3. 重算所有存活轨迹的指标
        let gap = self.config.metric_history_gap;
        for track in self.tracks.values_mut() {
            track.refresh_metrics(fps, gap);
        }

        // 4. 置信度过滤 + 5. 匹配或新建
        let min_confidence = self.config.confidence_threshold;
        let (roi_min, roi_max) = (self.config.roi_min, self.config.roi_max);
        for det in detections
            .iter()
            .filter(|det| det.confidence() >= min_confidence)
        {
            let cx = det.center_x();
            let ignore_for_warning = cx < roi_min || cx > roi_max;

            let bbox = frame_norm(frame, det);
            if !bbox.is_valid() {
                log::trace!("退化检测框被丢弃: {:?}", bbox);
                continue;
            }

            let candidates = self.tracks.iter().map(|(id, track)| (*id, &track.bbox));
            match best_match(&bbox, candidates, self.config.iou_threshold) {
                Some((id, iou)) => {
                    log::trace!("检测 {:?} → 车辆 #{} (IOU {:.2})", bbox, id, iou);
                    self.absorb(id, &bbox, det.confidence(), ignore_for_warning, frame_index, fps);
                }
                None => self.spawn(bbox, det.confidence(), frame_index, ignore_for_warning),
            }
        }

        // 6. 汇总预警
        let any_warning = self.tracks.values().any(Track::warning);
        self.warning_flag.set(any_warning);

        Ok(self.tracks.values().map(Track::snapshot).collect())
    }

    fn absorb(
        &mut self,
        id: u64,
        bbox: &PixelBox,
        confidence: f32,
        ignore_for_warning: bool,
        frame_index: u64,
        fps: f64,
    ) {
        let Some(track) = self.tracks.get_mut(&id) else {
            return;
        };

        match track.absorb(
            bbox,
            confidence,
            ignore_for_warning,
            frame_index,
            fps,
            &self.config,
            &self.thresholds,
        ) {
            Ok(true) if track.warning() => log::info!(
                "⚠️  车辆 #{} 触发碰撞预警: 速度 {:.1}% | TTC {:.2}s",
                id,
                track.speed,
                track.ttc
            ),
            Ok(true) => log::info!("✅ 车辆 #{} 预警解除", id),
            Ok(false) => {}
            Err(e) => log::warn!("⚠️  车辆 #{} 观测融合失败, 本次检测被丢弃: {}", id, e),
        }
    }

    fn spawn(&mut self, bbox: PixelBox, confidence: f32, frame_index: u64, ignore_warning: bool) {
        let id = self.next_id;
        self.next_id += 1;

        log::debug!(
            "🚗 新车辆 #{}: {:?} 置信度 {:.2}{}",
            id,
            bbox,
            confidence,
            if ignore_warning { " (ROI外, 不预警)" } else { "" }
        );
        let track = Track::new(
            id,
            bbox,
            confidence,
            frame_index,
            ignore_warning,
            &self.config,
        );
        self.tracks.insert(id, track);
    }

    /// 是否存在任何预警中的轨迹
    pub fn has_warning(&self) -> bool {
        self.warning_flag.get()
    }

    /// 预警标记句柄 (交给告警线程)
    pub fn warning_flag(&self) -> WarningFlag {
        self.warning_flag.clone()
    }

    pub fn track(&self, id: u64) -> Option<&Track> {
        self.tracks.get(&id)
    }

    pub fn tracks(&self) -> impl Iterator<Item = &Track> {
        self.tracks.values()
    }

    /// 获取当前跟踪数量
    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// 清除所有跟踪 (ID 继续递增, 不复用)
    pub fn reset(&mut self) {
        self.tracks.clear();
        self.warning_flag.set(false);
    }

    /// 获取跟踪统计信息
    pub fn get_stats(&self) -> String {
        format!(
            "跟踪: {} 辆 | 总ID: {} | 预警: {}",
            self.tracks.len(),
            self.next_id,
            if self.has_warning() { "是" } else { "否" }
        )
    }
}

impl Default for VehicleTracker {
    fn default() -> Self {
        Self::build(TrackerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::types::Detection;

    const FPS: f64 = 30.0;

    fn frame() -> FrameSize {
        FrameSize::new(640, 480)
    }

    /// 800x600 帧内 x 从 0.25 开始、y 为 [0.25, 0.5] 的检测框
    fn det_wide(xmax: f32) -> Detection {
        Detection::new(0.25, 0.25, xmax, 0.5, 0.9)
    }

    fn big_frame() -> FrameSize {
        FrameSize::new(800, 600)
    }

    /// 宽度 100px 三帧, 第4帧起变为 120px
    fn approach(tracker: &mut VehicleTracker, frames: std::ops::RangeInclusive<u64>) -> Vec<Vec<TrackSnapshot>> {
        frames
            .map(|frame| {
                let xmax = if frame <= 3 { 0.375 } else { 0.4 };
                tracker
                    .update(&[det_wide(xmax)], big_frame(), frame, FPS)
                    .unwrap()
            })
            .collect()
    }

    #[test]
    fn test_initialization() {
        let tracker = VehicleTracker::default();
        assert_eq!(tracker.track_count(), 0);
        assert_eq!(tracker.frame_count(), 0);
        assert!(!tracker.has_warning());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = TrackerConfig {
            max_history: 2,
            ..Default::default()
        };
        assert!(VehicleTracker::new(config).is_err());
    }

    #[test]
    fn test_update_with_detections() {
        let mut tracker = VehicleTracker::default();
        let detections = [
            Detection::new(0.1, 0.1, 0.3, 0.4, 0.9),
            Detection::new(0.5, 0.5, 0.7, 0.8, 0.5),
        ];
        let tracks = tracker.update(&detections, frame(), 1, FPS).unwrap();
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].confidence, 0.9);
        assert_eq!(tracks[0].bbox, [64, 48, 192, 192]);
        assert_eq!(tracks[0].ttc, f64::INFINITY);
    }

    #[test]
    fn test_low_confidence_never_updates() {
        let mut tracker = VehicleTracker::default();
        tracker
            .update(&[Detection::new(0.1, 0.1, 0.3, 0.4, 0.9)], frame(), 1, FPS)
            .unwrap();

        let weak = Detection::new(0.1, 0.1, 0.3, 0.4, 0.69);
        let tracks = tracker.update(&[weak], frame(), 2, FPS).unwrap();
        assert_eq!(tracks.len(), 1);
        let track = tracker.track(tracks[0].id).unwrap();
        assert_eq!(track.last_update_frame, 1);
        assert_eq!(track.confidence, 0.9);
        assert_eq!(track.width_history.len(), 1);
    }

    #[test]
    fn test_track_matching() {
        let mut tracker = VehicleTracker::default();
        let first = tracker
            .update(&[Detection::new(0.1, 0.1, 0.3, 0.4, 0.9)], frame(), 1, FPS)
            .unwrap();
        let second = tracker
            .update(&[Detection::new(0.11, 0.11, 0.31, 0.41, 0.85)], frame(), 2, FPS)
            .unwrap();

        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 1);
        assert_eq!(first[0].id, second[0].id);
        assert_eq!(second[0].confidence, 0.85);
        assert_eq!(tracker.track(second[0].id).unwrap().last_update_frame, 2);
    }

    #[test]
    fn test_track_removal() {
        let mut tracker = VehicleTracker::default();
        tracker
            .update(&[Detection::new(0.1, 0.1, 0.3, 0.4, 0.9)], frame(), 1, FPS)
            .unwrap();

        let none: [Detection; 0] = [];
        for frame_index in 2..=20 {
            let tracks = tracker.update(&none, frame(), frame_index, FPS).unwrap();
            // 9 - 1 = 8 未超过 REMOVE_TIME_FRAME
            if frame_index <= 9 {
                assert_eq!(tracks.len(), 1, "frame {}", frame_index);
            } else {
                assert!(tracks.is_empty(), "frame {}", frame_index);
            }
        }
        assert_eq!(tracker.track_count(), 0);
    }

    #[test]
    fn test_ids_increase_and_are_not_reused() {
        let mut tracker = VehicleTracker::default();
        let detections = [
            Detection::new(0.1, 0.1, 0.2, 0.2, 0.9),
            Detection::new(0.5, 0.5, 0.6, 0.6, 0.9),
        ];
        let tracks = tracker.update(&detections, frame(), 1, FPS).unwrap();
        let ids: Vec<u64> = tracks.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![0, 1]);

        tracker.reset();
        let tracks = tracker.update(&detections[..1], frame(), 2, FPS).unwrap();
        assert_eq!(tracks[0].id, 2);
    }

    #[test]
    fn test_history_is_bounded() {
        let mut tracker = VehicleTracker::default();
        for frame_index in 1..=25 {
            tracker
                .update(&[Detection::new(0.1, 0.1, 0.3, 0.4, 0.9)], frame(), frame_index, FPS)
                .unwrap();
        }
        let track = tracker.tracks().next().unwrap();
        assert_eq!(track.width_history.len(), 10);
        assert_eq!(track.ttc_history.len(), 10);
        assert_eq!(track.width_history.front().unwrap().1, 16);
        assert_eq!(track.width_history.back().unwrap().1, 25);
    }

    #[test]
    fn test_approaching_vehicle_warns() {
        let mut tracker = VehicleTracker::default();
        let frames = approach(&mut tracker, 1..=4);

        for tracks in &frames[..3] {
            assert_eq!(tracks.len(), 1);
            assert!(!tracks[0].warning);
        }
        let last = &frames[3][0];
        assert_eq!(last.speed, 20.0);
        assert!(last.ttc.is_finite() && last.ttc > 0.0);
        assert!((last.ttc - 0.5).abs() < 1e-9);
        assert!(last.warning);
        assert!(tracker.has_warning());
        assert!(tracker.warning_flag().get());
    }

    #[test]
    fn test_warning_is_sticky_then_decays() {
        let mut tracker = VehicleTracker::default();
        let frames = approach(&mut tracker, 1..=17);

        // 第6帧最后一次满足触发条件, 保持到第16帧
        let track = tracker.tracks().next().unwrap();
        assert_eq!(track.warning_trigger_frame(), None);
        for (i, tracks) in frames.iter().enumerate() {
            let frame_index = i as u64 + 1;
            let expected = (4..=16).contains(&frame_index);
            assert_eq!(tracks[0].warning, expected, "frame {}", frame_index);
        }
        assert!(!tracker.has_warning());
    }

    #[test]
    fn test_track_outside_roi_never_warns() {
        let mut tracker = VehicleTracker::default();
        let size = FrameSize::new(1000, 600);
        // 中心 0.12, 位于 ROI 左侧
        let widths = [0.17, 0.17, 0.17, 0.20, 0.22];
        for (i, xmax) in widths.iter().enumerate() {
            let det = Detection::new(0.07, 0.25, *xmax, 0.5, 0.9);
            let tracks = tracker.update(&[det], size, i as u64 + 1, FPS).unwrap();
            assert_eq!(tracks.len(), 1);
            assert!(!tracks[0].warning);
        }
        let track = tracker.tracks().next().unwrap();
        assert!(track.ignore_warning());
        assert!(track.speed > 5.0);

        // 回到 ROI 内仍然豁免
        for frame_index in 6..=9 {
            let det = Detection::new(0.1, 0.25, 0.22, 0.5, 0.9);
            let tracks = tracker.update(&[det], size, frame_index, FPS).unwrap();
            assert_eq!(tracks.len(), 1);
            assert!(!tracks[0].warning);
        }
        assert!(tracker.tracks().next().unwrap().ignore_warning());
    }

    #[test]
    fn test_leaving_roi_clears_active_warning() {
        let config = TrackerConfig {
            roi_max: 0.33,
            ..Default::default()
        };
        let mut tracker = VehicleTracker::new(config).unwrap();
        approach(&mut tracker, 1..=4);
        assert!(tracker.has_warning());

        // 中心 ≈ 0.336 > 0.33
        let det = Detection::new(0.265625, 0.25, 0.40625, 0.5, 0.9);
        let tracks = tracker.update(&[det], big_frame(), 5, FPS).unwrap();
        assert_eq!(tracks.len(), 1);
        assert!(!tracks[0].warning);
        assert!(!tracker.has_warning());

        let tracks = approach(&mut tracker, 6..=8);
        assert!(tracks.iter().all(|t| !t[0].warning));
        assert!(tracker.tracks().next().unwrap().ignore_warning());
    }

    #[test]
    fn test_two_detections_match_same_track() {
        let mut tracker = VehicleTracker::default();
        tracker
            .update(&[Detection::new(0.1, 0.1, 0.3, 0.4, 0.9)], frame(), 1, FPS)
            .unwrap();

        // 非互斥关联: 两个检测都匹配到同一条轨迹, 不会新建轨迹
        let detections = [
            Detection::new(0.11, 0.11, 0.31, 0.41, 0.85),
            Detection::new(0.11, 0.11, 0.31, 0.41, 0.8),
        ];
        let tracks = tracker.update(&detections, frame(), 2, FPS).unwrap();
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].confidence, 0.8);

        let track = tracker.track(tracks[0].id).unwrap();
        let frames: Vec<u64> = track.width_history.iter().map(|(_, f)| *f).collect();
        assert_eq!(frames, vec![1, 2, 2]);
        assert_eq!(track.ttc_history.len(), 3);
    }

    #[test]
    fn test_invalid_input_leaves_state_untouched() {
        let mut tracker = VehicleTracker::default();
        tracker
            .update(&[Detection::new(0.1, 0.1, 0.3, 0.4, 0.9)], frame(), 1, FPS)
            .unwrap();
        let before = tracker.track(0).unwrap().bbox;

        let bad = [
            Detection::new(0.1, 0.1, 0.3, 0.4, 0.9),
            Detection::new(0.2, 0.2, f32::NAN, 0.4, 0.9),
        ];
        let err = tracker.update(&bad, frame(), 2, FPS).unwrap_err();
        assert!(matches!(
            err,
            TrackError::InvalidDetection {
                index: 1,
                field: "xmax",
                ..
            }
        ));
        assert_eq!(tracker.frame_count(), 1);
        assert_eq!(tracker.track(0).unwrap().bbox, before);
        assert_eq!(tracker.track(0).unwrap().last_update_frame, 1);

        assert!(matches!(
            tracker.update(&bad[..1], frame(), 2, 0.0),
            Err(TrackError::InvalidFps(_))
        ));
        assert!(matches!(
            tracker.update(&bad[..1], FrameSize::new(0, 0), 2, FPS),
            Err(TrackError::InvalidFrameSize { .. })
        ));
    }

    #[test]
    fn test_degenerate_detection_dropped() {
        let mut tracker = VehicleTracker::default();
        let flat = Detection::new(0.3, 0.4, 0.5, 0.4, 0.9);
        let inverted = Detection::new(0.5, 0.1, 0.3, 0.4, 0.9);
        let tracks = tracker.update(&[flat, inverted], frame(), 1, FPS).unwrap();
        assert!(tracks.is_empty());
    }

    #[test]
    fn test_reset_clears_warning() {
        let mut tracker = VehicleTracker::default();
        approach(&mut tracker, 1..=4);
        assert!(tracker.has_warning());
        tracker.reset();
        assert!(!tracker.has_warning());
        assert_eq!(tracker.track_count(), 0);
    }
}
