// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 匀速模型卡尔曼滤波器
//! Constant-velocity Kalman filter over `[x, y, w, h, dx, dy, dw, dh]`

use nalgebra::{SMatrix, SVector};

use super::geometry::{bbox_to_state, state_to_bbox};
use super::types::PixelBox;
use crate::error::{Result, TrackError};

type Matrix8 = SMatrix<f32, 8, 8>;
type Matrix4x8 = SMatrix<f32, 4, 8>;
type Matrix4 = SMatrix<f32, 4, 4>;
type Vector8 = SVector<f32, 8>;
type Vector4 = SVector<f32, 4>;

/// 根据相对变化率给出观测噪声
///
/// 小于5%的变化可信 (0.1), 大于20%的变化高度怀疑 (2.0), 中间线性插值。
pub fn adaptive_noise(change_ratio: f32) -> f32 {
    if change_ratio < 0.05 {
        0.1
    } else if change_ratio > 0.20 {
        2.0
    } else {
        0.1 + (change_ratio - 0.05) * (2.0 - 0.1) / (0.20 - 0.05)
    }
}

/// 边界框卡尔曼滤波器 (每条轨迹独占一个)
///
/// 状态向量: [x_center, y_center, width, height, vx, vy, vw, vh]
/// 观测向量: [x_center, y_center, width, height]
#[derive(Clone, Debug)]
pub struct KalmanBoxFilter {
    /// 状态估计
    state: Vector8,

    /// 估计误差协方差 P
    covariance: Matrix8,

    /// 状态转移矩阵 A (p' = p + v, v' = v)
    transition: Matrix8,

    /// 观测矩阵 H (只取位置/尺寸分量)
    measurement: Matrix4x8,

    /// 过程噪声 Q
    process_noise: Matrix8,

    /// 观测噪声 R
    measurement_noise: Matrix4,

    /// 是否按变化率调整 x / w 的观测噪声
    adaptive: bool,

    /// 最近一次校正后的边界框
    bbox: PixelBox,
}

impl KalmanBoxFilter {
    /// 创建新的卡尔曼滤波器
    ///
    /// # 参数
    /// - `bbox`: 初始边界框 (速度初始化为0)
    /// - `q`: 过程噪声对角线 `[x, y, w, h, dx, dy, dw, dh]`
    /// - `r`: 观测噪声对角线 `[x, y, w, h]`
    pub fn new(bbox: &PixelBox, q: [f32; 8], r: [f32; 4]) -> Self {
        let [cx, cy, w, h] = bbox_to_state(bbox);

        let mut transition = Matrix8::identity();
        let mut measurement = Matrix4x8::zeros();
        for i in 0..4 {
            transition[(i, i + 4)] = 1.0;
            measurement[(i, i)] = 1.0;
        }

        Self {
            state: Vector8::from([cx, cy, w, h, 0.0, 0.0, 0.0, 0.0]),
            covariance: Matrix8::zeros(),
            transition,
            measurement,
            process_noise: Matrix8::from_diagonal(&Vector8::from(q)),
            measurement_noise: Matrix4::from_diagonal(&Vector4::from(r)),
            adaptive: false,
            bbox: *bbox,
        }
    }

    /// 启用自适应观测噪声
    pub fn with_adaptive_noise(mut self, enabled: bool) -> Self {
        self.adaptive = enabled;
        self
    }

    /// 预测下一帧状态, 返回先验边界框
    pub fn predict(&mut self) -> PixelBox {
        self.state = self.transition * self.state;
        self.covariance =
            self.transition * self.covariance * self.transition.transpose() + self.process_noise;
        state_to_bbox(self.state.as_slice())
    }

    /// 融合观测值
    ///
    /// 宽或高 <= 0 的观测直接拒绝, 滤波器状态保持不变。
    pub fn correct(&mut self, bbox: &PixelBox) -> Result<()> {
        let [cx, cy, w, h] = bbox_to_state(bbox);
        if w <= 0.0 || h <= 0.0 {
            return Err(TrackError::DegenerateMeasurement {
                width: w,
                height: h,
            });
        }
        let z = Vector4::new(cx, cy, w, h);

        let r = if self.adaptive {
            self.adapted_noise(&z)
        } else {
            self.measurement_noise
        };

        // 新息及其协方差: y = z - Hx, S = HPH' + R
        let innovation = z - self.measurement * self.state;
        let s = self.measurement * self.covariance * self.measurement.transpose() + r;
        let s_inv = s.try_inverse().ok_or(TrackError::SingularInnovation)?;

        // 卡尔曼增益: K = PH'S^-1
        let gain = self.covariance * self.measurement.transpose() * s_inv;

        self.state += gain * innovation;
        self.covariance = (Matrix8::identity() - gain * self.measurement) * self.covariance;
        self.bbox = state_to_bbox(self.state.as_slice());
        Ok(())
    }

    fn adapted_noise(&self, z: &Vector4) -> Matrix4 {
        let ratio = |current: f32, observed: f32| {
            if current != 0.0 {
                ((observed - current) / current).abs()
            } else {
                0.0
            }
        };

        let mut r = self.measurement_noise;
        r[(0, 0)] = adaptive_noise(ratio(self.state[0], z[0]));
        r[(2, 2)] = adaptive_noise(ratio(self.state[2], z[2]));
        r
    }

    /// 最近一次校正后的边界框
    pub fn bbox(&self) -> PixelBox {
        self.bbox
    }

    /// 当前状态向量
    pub fn state(&self) -> [f32; 8] {
        let mut out = [0.0; 8];
        out.copy_from_slice(self.state.as_slice());
        out
    }
}
