// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 自行车前向碰撞预警引擎
//!
//! 输入每帧的车辆检测框, 输出带持久ID的轨迹、接近速度、碰撞时间 (TTC)
//! 以及粘滞的碰撞预警, 预警汇总后交给后台告警线程。
pub mod alert; // 预警汇总与告警线程
pub mod config; // 跟踪器参数配置
pub mod detection; // 跟踪与预警引擎
pub mod error;

pub use crate::alert::{AlertSink, AlertWorker, LogAlertSink, WarningFlag};
pub use crate::config::TrackerConfig;
pub use crate::detection::{
    Detection, DetectionBox, FrameSize, PixelBox, Track, TrackSnapshot, VehicleTracker,
};
pub use crate::error::{Result, TrackError};
