/// 距离估计器
///
/// 处理顺序：
/// - 原始距离进入滚动窗口（最多 18 个样本）
/// - 窗口中位数剔除单点尖峰
/// - 指数平滑（α = 0.25）去除残余抖动
/// - 窗口 MAD 衡量离散程度

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::algorithms::robust_stats::{mad_with_floor, median};
use crate::config::EstimatorConfig;

// ============================================================================
// 指数平滑
// ============================================================================

/// 一阶指数平滑器
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ExponentialSmoother {
    /// 平滑系数
    pub alpha: f64,
    /// 当前估计值，首次更新前为空
    pub value: Option<f64>,
}

impl ExponentialSmoother {
    /// 从已有估计值继续平滑，`value` 为空时下一次更新直接采用测量值
    pub fn resume(alpha: f64, value: Option<f64>) -> Self {
        ExponentialSmoother { alpha, value }
    }

    /// 更新并返回新的估计值；第一次更新直接采用测量值
    pub fn update(&mut self, measurement: f64) -> f64 {
        let next = match self.value {
            None => measurement,
            // 等价于 α·x + (1-α)·prev，结果不会越过两端
            Some(prev) => prev + self.alpha * (measurement - prev),
        };
        self.value = Some(next);
        next
    }
}

// ============================================================================
// 单个信标的测距状态
// ============================================================================

/// 单个信标的测距状态
///
/// 只在第一次观测到该信标时创建，之后每次观测整体替换。
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RangeState {
    samples: VecDeque<f64>,
    /// 最近一次被接受的观测时间
    pub last_seen: DateTime<Utc>,
    /// 当前平滑距离（米）
    pub ema_distance: Option<f64>,
    /// 上一次的平滑距离，至少两次观测后才有值
    pub last_ema_distance: Option<f64>,
    /// 窗口 MAD，样本不足时为空
    pub mad_distance: Option<f64>,
    /// `ema_distance - last_ema_distance`
    pub delta_distance: Option<f64>,
    /// 最近一次的原始信号强度（dBm），仅用于显示
    pub last_signal_strength: f64,
}

impl RangeState {
    /// 当前窗口中的原始样本，按到达顺序排列
    pub fn samples(&self) -> &VecDeque<f64> {
        &self.samples
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }
}

// ============================================================================
// 估计器
// ============================================================================

/// 距离估计器：中位数预滤波 + 指数平滑
///
/// `update` 是 (旧状态, 新样本, 到达时间) 的纯函数，没有隐藏状态。
#[derive(Clone, Debug, PartialEq)]
pub struct DistanceEstimator {
    pub window_size: usize,
    pub alpha: f64,
    pub mad_min_samples: usize,
}

impl DistanceEstimator {
    pub fn new(config: &EstimatorConfig) -> Self {
        DistanceEstimator {
            window_size: config.window_size,
            alpha: config.ema_alpha,
            mad_min_samples: config.mad_min_samples,
        }
    }

    /// 根据旧状态和新样本计算新状态
    ///
    /// 调用方负责保证 `sample` 为有限非负实数。
    pub fn update(
        &self,
        previous: Option<&RangeState>,
        sample: f64,
        signal_strength: f64,
        arrival: DateTime<Utc>,
    ) -> RangeState {
        let mut samples = previous
            .map(|s| s.samples.clone())
            .unwrap_or_else(|| VecDeque::with_capacity(self.window_size + 1));
        samples.push_back(sample);
        while samples.len() > self.window_size {
            samples.pop_front();
        }

        let window = samples.make_contiguous();
        let med = median(window).unwrap_or(sample);
        let mad = mad_with_floor(window, self.mad_min_samples);

        let ema_previous = previous.and_then(|s| s.ema_distance);
        let ema = ExponentialSmoother::resume(self.alpha, ema_previous).update(med);
        let delta = ema_previous.map(|prev| ema - prev);

        RangeState {
            samples,
            last_seen: arrival,
            ema_distance: Some(ema),
            last_ema_distance: ema_previous,
            mad_distance: mad,
            delta_distance: delta,
            last_signal_strength: signal_strength,
        }
    }
}

impl Default for DistanceEstimator {
    fn default() -> Self {
        DistanceEstimator::new(&EstimatorConfig::default())
    }
}
