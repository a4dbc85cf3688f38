// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 跟踪引擎错误类型
//! Error types of the tracking engine

use thiserror::Error;

pub type Result<T, E = TrackError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum TrackError {
    /// 检测框字段为 NaN / 无穷大
    #[error("检测 #{index} 字段非法: {field} = {value}")]
    InvalidDetection {
        index: usize,
        field: &'static str,
        value: f32,
    },

    #[error("帧尺寸非法: {width}x{height}")]
    InvalidFrameSize { width: u32, height: u32 },

    #[error("fps 必须为正有限值, 实际为 {0}")]
    InvalidFps(f64),

    /// 宽或高 <= 0 的观测, 不允许进入卡尔曼滤波
    #[error("退化观测框: {width}x{height}")]
    DegenerateMeasurement { width: f32, height: f32 },

    #[error("新息协方差矩阵不可逆")]
    SingularInnovation,

    #[error("配置非法: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
