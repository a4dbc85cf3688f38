// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 跟踪器配置 - 通过JSON文件调整参数

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TrackError};

/// 跟踪器参数配置
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    // === 检测与跟踪参数 ===
    pub confidence_threshold: f32, // 检测置信度阈值
    pub max_history: usize,        // 每条轨迹保留的历史长度
    pub remove_time_frame: u64,    // 超过该帧数未更新则删除轨迹
    pub iou_threshold: f32,        // 轨迹匹配IOU阈值

    // === 预警参数 ===
    pub speed_threshold: f64,           // 接近速度阈值 (%)
    pub ttc_threshold: f64,             // 碰撞时间阈值 (秒)
    pub warning_sticky_time_frame: u64, // 触发后预警保持帧数
    pub metric_history_gap: usize,      // 计算速度/TTC时的历史间隔
    pub roi_min: f32,                   // 水平感兴趣区下界 (归一化)
    pub roi_max: f32,                   // 水平感兴趣区上界 (归一化)

    // === 卡尔曼滤波参数 ===
    pub kalman_process_noise: [f32; 8], // Q对角线 [x, y, w, h, dx, dy, dw, dh]
    pub kalman_measurement_noise: [f32; 4], // R对角线 [x, y, w, h]
    pub kalman_adaptive_noise: bool,    // 按变化率自适应调整 x/w 观测噪声

    // === 告警线程参数 ===
    pub alert_poll_interval_ms: u64, // 轮询间隔, 也是停止线程的最长等待
    pub alert_clip_ms: u64,          // 单次告警持续时长
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            // 检测与跟踪
            confidence_threshold: 0.7,
            max_history: 10,
            remove_time_frame: 8,
            iou_threshold: 0.3,

            // 预警
            speed_threshold: 5.0,
            ttc_threshold: 2.0,
            warning_sticky_time_frame: 10,
            metric_history_gap: 2,
            roi_min: 0.15,
            roi_max: 0.85,

            // 卡尔曼滤波: x/w 预测更可信, y/h 响应更快
            kalman_process_noise: [0.01, 0.03, 0.01, 0.02, 0.01, 0.03, 0.01, 0.02],
            kalman_measurement_noise: [0.7, 0.1, 0.7, 0.2],
            kalman_adaptive_noise: false,

            // 告警线程
            alert_poll_interval_ms: 100,
            alert_clip_ms: 1500,
        }
    }
}

impl TrackerConfig {
    /// 从JSON文件加载配置
    ///
    /// 解析失败时回退到默认值; 文件不存在时写出一份默认配置。
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(json) => match serde_json::from_str(&json) {
                Ok(config) => {
                    log::info!("✅ 配置已从 {} 加载", path.display());
                    config
                }
                Err(e) => {
                    log::warn!("⚠️  配置文件解析失败: {}, 使用默认值", e);
                    Self::default()
                }
            },
            Err(_) => {
                log::info!("📝 配置文件不存在,创建默认配置...");
                let config = Self::default();
                if let Err(e) = config.save(path) {
                    log::error!("❌ 保存配置失败: {}", e);
                }
                config
            }
        }
    }

    /// 保存配置到JSON文件
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path.as_ref(), json)?;
        log::info!("💾 配置已保存到 {}", path.as_ref().display());
        Ok(())
    }

    /// 检查参数一致性
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(TrackError::InvalidConfig(msg));

        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return invalid(format!(
                "confidence_threshold 超出 [0,1]: {}",
                self.confidence_threshold
            ));
        }
        if !(0.0..=1.0).contains(&self.iou_threshold) {
            return invalid(format!("iou_threshold 超出 [0,1]: {}", self.iou_threshold));
        }
        if self.max_history < self.metric_history_gap + 2 {
            return invalid(format!(
                "max_history ({}) 必须 >= metric_history_gap + 2 ({})",
                self.max_history,
                self.metric_history_gap + 2
            ));
        }
        if !(0.0..=1.0).contains(&self.roi_min)
            || !(0.0..=1.0).contains(&self.roi_max)
            || self.roi_min >= self.roi_max
        {
            return invalid(format!(
                "ROI 区间非法: [{}, {}]",
                self.roi_min, self.roi_max
            ));
        }
        if !self.speed_threshold.is_finite() || !self.ttc_threshold.is_finite() {
            return invalid("speed_threshold / ttc_threshold 必须为有限值".to_string());
        }
        if self.ttc_threshold < 0.0 {
            return invalid(format!("ttc_threshold 不能为负: {}", self.ttc_threshold));
        }
        let noise_ok = |v: &f32| v.is_finite() && *v > 0.0;
        if !self.kalman_process_noise.iter().all(noise_ok)
            || !self.kalman_measurement_noise.iter().all(noise_ok)
        {
            return invalid("卡尔曼噪声必须为正有限值".to_string());
        }
        if self.alert_poll_interval_ms == 0 || self.alert_poll_interval_ms >= 1000 {
            return invalid(format!(
                "alert_poll_interval_ms 必须在 (0, 1000) 内: {}",
                self.alert_poll_interval_ms
            ));
        }
        Ok(())
    }

    /// 打印当前配置
    pub fn print_summary(&self) {
        log::info!("🎛️  当前跟踪器配置:");
        log::info!("  检测置信度: {:.2}", self.confidence_threshold);
        log::info!("  匹配IOU阈值: {:.2}", self.iou_threshold);
        log::info!("  最大丢失帧: {}", self.remove_time_frame);
        log::info!(
            "  预警阈值: 速度 > {:.1}% 且 TTC < {:.1}s",
            self.speed_threshold,
            self.ttc_threshold
        );
        log::info!("  预警保持帧: {}", self.warning_sticky_time_frame);
        log::info!("  ROI: [{:.2}, {:.2}]", self.roi_min, self.roi_max);
        log::info!(
            "  卡尔曼观测噪声: {:?} (自适应: {})",
            self.kalman_measurement_noise,
            self.kalman_adaptive_noise
        );
    }
}
