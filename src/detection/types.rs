// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 跟踪引擎数据结构定义
//! Data structures exchanged with the detector and the renderer

use serde::{Deserialize, Serialize};

use crate::error::{Result, TrackError};

// ========== 检测输入接口 ==========

/// 检测框接口 (外部检测器适配层实现此 trait)
///
/// 坐标为归一化的角点形式 `[0, 1]`。
pub trait DetectionBox {
    fn xmin(&self) -> f32;
    fn ymin(&self) -> f32;
    fn xmax(&self) -> f32;
    fn ymax(&self) -> f32;
    fn confidence(&self) -> f32;
    fn label(&self) -> i32;

    /// 归一化水平中心
    fn center_x(&self) -> f32 {
        (self.xmin() + self.xmax()) / 2.0
    }
}

/// 检测框 (Detection bounding box)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub xmin: f32,
    pub ymin: f32,
    pub xmax: f32,
    pub ymax: f32,
    pub confidence: f32,
    #[serde(default)]
    pub label: i32,
}

impl Detection {
    pub fn new(xmin: f32, ymin: f32, xmax: f32, ymax: f32, confidence: f32) -> Self {
        Self {
            xmin,
            ymin,
            xmax,
            ymax,
            confidence,
            label: 0,
        }
    }
}

impl DetectionBox for Detection {
    fn xmin(&self) -> f32 {
        self.xmin
    }

    fn ymin(&self) -> f32 {
        self.ymin
    }

    fn xmax(&self) -> f32 {
        self.xmax
    }

    fn ymax(&self) -> f32 {
        self.ymax
    }

    fn confidence(&self) -> f32 {
        self.confidence
    }

    fn label(&self) -> i32 {
        self.label
    }
}

/// 检查检测框字段是否为有限值
pub(crate) fn validate_detection<D: DetectionBox>(index: usize, det: &D) -> Result<()> {
    let fields = [
        ("xmin", det.xmin()),
        ("ymin", det.ymin()),
        ("xmax", det.xmax()),
        ("ymax", det.ymax()),
        ("confidence", det.confidence()),
    ];
    for (field, value) in fields {
        if !value.is_finite() {
            return Err(TrackError::InvalidDetection {
                index,
                field,
                value,
            });
        }
    }
    Ok(())
}

// ========== 像素坐标 ==========

/// 帧尺寸 (像素)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl FrameSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(TrackError::InvalidFrameSize {
                width: self.width,
                height: self.height,
            });
        }
        Ok(())
    }
}

/// 像素边界框 (角点形式, 整数坐标)
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PixelBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl PixelBox {
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> i32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> i32 {
        self.y2 - self.y1
    }

    /// 宽高都大于0
    pub fn is_valid(&self) -> bool {
        self.width() > 0 && self.height() > 0
    }

    pub fn to_array(&self) -> [i32; 4] {
        [self.x1, self.y1, self.x2, self.y2]
    }
}

/// 归一化坐标 → 像素坐标 (先裁剪到 [0,1], 再截断取整)
pub fn frame_norm<D: DetectionBox>(frame: FrameSize, det: &D) -> PixelBox {
    let w = frame.width as f32;
    let h = frame.height as f32;
    let px = |v: f32, scale: f32| (v.clamp(0.0, 1.0) * scale) as i32;

    PixelBox {
        x1: px(det.xmin(), w),
        y1: px(det.ymin(), h),
        x2: px(det.xmax(), w),
        y2: px(det.ymax(), h),
    }
}

// ========== 输出 ==========

/// 单条轨迹的对外快照 (渲染 / 告警层使用)
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TrackSnapshot {
    pub id: u64,
    pub bbox: [i32; 4],
    pub confidence: f32,
    /// 宽度相对变化 (%)
    pub speed: f64,
    /// 碰撞时间 (秒), 无接近趋势时为 +inf (JSON 中为 null)
    pub ttc: f64,
    pub warning: bool,
}
