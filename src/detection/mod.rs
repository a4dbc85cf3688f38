/// 跟踪与预警引擎 (Tracking & Warning Engine)
///
/// 每帧一次同步调用 `VehicleTracker::update`:
/// - Kalman:      匀速模型卡尔曼滤波, 预测与校正
/// - Association: IOU 关联检测框与轨迹
/// - Metrics:     宽度变化率 → 接近速度 / TTC
/// - Warning:     单轨迹粘滞预警状态机
/// - Tracker:     轨迹生命周期管理
pub mod association;
pub mod geometry;
pub mod kalman;
pub mod metrics;
pub mod tracker;
pub mod types;
pub mod warning;

pub use geometry::compute_iou;
pub use kalman::KalmanBoxFilter;
pub use tracker::{Track, VehicleTracker};
pub use types::{Detection, DetectionBox, FrameSize, PixelBox, TrackSnapshot};
