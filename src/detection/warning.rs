// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 单轨迹粘滞预警状态机
//!
//! Idle ⇄ Active. 触发条件 `speed > 速度阈值 && ttc < TTC阈值`,
//! 每次重新满足条件刷新触发帧; 距上次触发超过保持帧数后回到 Idle。
//! 一旦轨迹被豁免 (中心离开 ROI), 永久不再预警。

use crate::config::TrackerConfig;

/// 预警判定阈值
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WarningThresholds {
    pub speed: f64,
    pub ttc: f64,
    pub sticky_frames: u64,
}

impl From<&TrackerConfig> for WarningThresholds {
    fn from(config: &TrackerConfig) -> Self {
        Self {
            speed: config.speed_threshold,
            ttc: config.ttc_threshold,
            sticky_frames: config.warning_sticky_time_frame,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct WarningState {
    active: bool,
    trigger_frame: Option<u64>,
    ignored: bool,
}

impl WarningState {
    pub fn new(ignored: bool) -> Self {
        Self {
            ignored,
            ..Default::default()
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_ignored(&self) -> bool {
        self.ignored
    }

    /// 最近一次满足触发条件的帧
    pub fn trigger_frame(&self) -> Option<u64> {
        self.trigger_frame
    }

    /// 并入豁免标记 (单向, 不可撤销); 豁免后立即清除预警
    pub fn exempt(&mut self, ignore: bool) {
        self.ignored |= ignore;
        if self.ignored {
            self.active = false;
            self.trigger_frame = None;
        }
    }

    /// 推进一步, 返回是否发生状态切换
    pub fn update(
        &mut self,
        speed: f64,
        ttc: f64,
        current_frame: u64,
        thresholds: &WarningThresholds,
    ) -> bool {
        if self.ignored {
            return false;
        }
        let was_active = self.active;

        if speed > thresholds.speed && ttc < thresholds.ttc {
            self.active = true;
            self.trigger_frame = Some(current_frame);
        }

        if self.active {
            let since = self.trigger_frame.unwrap_or(current_frame);
            if current_frame.saturating_sub(since) > thresholds.sticky_frames {
                self.active = false;
                self.trigger_frame = None;
            }
        }

        was_active != self.active
    }
}
