/// 稳定性、趋势与新鲜度分类
///
/// 都是对数值状态的纯函数，每次读取时重新计算，不单独存储。

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::EstimatorConfig;

/// 测距稳定性（基于 MAD）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stability {
    WarmingUp,
    Stable,
    Moderate,
    Unstable,
}

impl Stability {
    /// 按默认阈值分类
    pub fn from_mad(mad: Option<f64>) -> Self {
        let defaults = EstimatorConfig::default();
        Self::classify(mad, defaults.stable_mad, defaults.moderate_mad)
    }

    /// 任意实数 MAD 都会落入唯一的一个标签；NaN 视为 "Unstable"
    pub fn classify(mad: Option<f64>, stable_below: f64, moderate_below: f64) -> Self {
        match mad {
            None => Stability::WarmingUp,
            Some(m) if m < stable_below => Stability::Stable,
            Some(m) if m < moderate_below => Stability::Moderate,
            Some(_) => Stability::Unstable,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Stability::WarmingUp => "Warming up",
            Stability::Stable => "Stable",
            Stability::Moderate => "Moderate",
            Stability::Unstable => "Unstable",
        }
    }
}

impl fmt::Display for Stability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// 距离趋势（基于相邻两次平滑估计的差值）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Trend {
    Collecting,
    Flat,
    GettingCloser,
    GettingFarther,
}

impl Trend {
    pub fn from_delta(delta: Option<f64>) -> Self {
        Self::classify(delta, EstimatorConfig::default().trend_deadband)
    }

    pub fn classify(delta: Option<f64>, deadband: f64) -> Self {
        match delta {
            None => Trend::Collecting,
            Some(d) if d.abs() < deadband => Trend::Flat,
            Some(d) if d < 0.0 => Trend::GettingCloser,
            Some(_) => Trend::GettingFarther,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Trend::Collecting => "Collecting",
            Trend::Flat => "Flat",
            Trend::GettingCloser => "Getting closer",
            Trend::GettingFarther => "Getting farther",
        }
    }
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// 新鲜度判断：距离最后一次观测不超过窗口即为新鲜
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Freshness {
    window_ms: i64,
}

impl Freshness {
    pub fn new(window_ms: i64) -> Self {
        Freshness { window_ms }
    }

    pub fn window_ms(&self) -> i64 {
        self.window_ms
    }

    /// 距离最后一次观测的毫秒数
    pub fn age_ms(last_seen: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
        now.signed_duration_since(last_seen).num_milliseconds()
    }

    pub fn is_fresh(&self, last_seen: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        Self::age_ms(last_seen, now) <= self.window_ms
    }
}

impl Default for Freshness {
    fn default() -> Self {
        Freshness::new(EstimatorConfig::default().freshness_ms)
    }
}
