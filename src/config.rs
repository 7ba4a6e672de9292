/// 引擎配置
///
/// 所有阈值都是经验值，保留原有数值以保证行为一致，但允许通过 JSON 覆盖。

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::algorithms::RSSIModel;
use crate::error::ConfigError;
use crate::geo::GeoPoint;

/// 距离估计与分类参数
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    /// 滚动窗口最大样本数
    pub window_size: usize,
    /// 指数平滑系数 α
    pub ema_alpha: f64,
    /// 计算 MAD 所需的最少样本数
    pub mad_min_samples: usize,
    /// MAD 低于该值为 "Stable"（米）
    pub stable_mad: f64,
    /// MAD 低于该值为 "Moderate"（米）
    pub moderate_mad: f64,
    /// 趋势死区（米）
    pub trend_deadband: f64,
    /// 新鲜度窗口（毫秒）
    pub freshness_ms: i64,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        EstimatorConfig {
            window_size: 18,
            ema_alpha: 0.25,
            mad_min_samples: 4,
            stable_mad: 0.25,
            moderate_mad: 0.6,
            trend_deadband: 0.2,
            freshness_ms: 3000,
        }
    }
}

/// 模拟观测生成器参数
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// 节拍间隔（毫秒）
    pub tick_ms: u64,
    /// 每个节拍最多模拟的实体数
    pub max_entities: usize,
    /// 初始真实距离下限（米）
    pub initial_min_m: f64,
    /// 初始真实距离随机跨度（米）
    pub initial_span_m: f64,
    /// 靠近目标时每拍的位移（米，正数表示缩短）
    pub approach_step_m: f64,
    /// 非目标实体每拍向外漂移（米）
    pub drift_step_m: f64,
    /// 距离噪声幅度 ±（米）
    pub distance_noise_m: f64,
    pub min_distance_m: f64,
    pub max_distance_m: f64,
    /// 对数路径损耗模型截距 A（1 米处 dBm）
    pub rssi_ref_dbm: f64,
    /// 对数路径损耗模型斜率 B
    pub rssi_slope: f64,
    /// RSSI 噪声幅度 ±（dBm）
    pub rssi_noise_dbm: f64,
    /// 随机种子；为空时使用系统熵
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            tick_ms: 650,
            max_entities: 12,
            initial_min_m: 6.0,
            initial_span_m: 25.0,
            approach_step_m: 0.35,
            drift_step_m: 0.05,
            distance_noise_m: 0.3,
            min_distance_m: 0.8,
            max_distance_m: 35.0,
            rssi_ref_dbm: -45.0,
            rssi_slope: -18.0,
            rssi_noise_dbm: 5.0,
            seed: None,
        }
    }
}

/// 地理坐标放置参数
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeoConfig {
    /// 以观察者为圆心的放置半径（米）
    pub placement_radius_m: f64,
    /// 定位失败时使用的参考坐标
    pub fallback_reference: GeoPoint,
    /// 备用抖动范围 ±（度），0.001° 约 110 米
    pub fallback_jitter_deg: f64,
    /// 获取观察者位置的超时（毫秒）
    pub fix_timeout_ms: u64,
}

impl Default for GeoConfig {
    fn default() -> Self {
        GeoConfig {
            placement_radius_m: 45.0,
            fallback_reference: GeoPoint::new(37.7749, -122.4194),
            fallback_jitter_deg: 0.001,
            fix_timeout_ms: 5000,
        }
    }
}

/// 引擎总配置
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub estimator: EstimatorConfig,
    pub simulation: SimulationConfig,
    pub geo: GeoConfig,
}

impl EngineConfig {
    /// 从 JSON 字符串加载，缺省字段使用默认值
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// 从 JSON 文件加载
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// 校验配置的合理性
    pub fn validate(&self) -> Result<(), ConfigError> {
        let e = &self.estimator;
        if e.window_size == 0 {
            return Err(ConfigError::Invalid("window_size 必须大于 0".to_string()));
        }
        if !(e.ema_alpha > 0.0 && e.ema_alpha <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "ema_alpha 必须在 (0, 1] 内，实际为 {}",
                e.ema_alpha
            )));
        }
        if e.mad_min_samples == 0 {
            return Err(ConfigError::Invalid("mad_min_samples 必须大于 0".to_string()));
        }
        if !(e.stable_mad >= 0.0 && e.stable_mad < e.moderate_mad) {
            return Err(ConfigError::Invalid(
                "需要满足 0 <= stable_mad < moderate_mad".to_string(),
            ));
        }
        if e.trend_deadband < 0.0 || e.freshness_ms <= 0 {
            return Err(ConfigError::Invalid(
                "trend_deadband 不能为负且 freshness_ms 必须为正".to_string(),
            ));
        }

        let s = &self.simulation;
        if s.tick_ms == 0 {
            return Err(ConfigError::Invalid("tick_ms 必须大于 0".to_string()));
        }
        if !(s.min_distance_m > 0.0 && s.min_distance_m < s.max_distance_m) {
            return Err(ConfigError::Invalid(format!(
                "距离夹取范围无效: [{}, {}]",
                s.min_distance_m, s.max_distance_m
            )));
        }
        if s.initial_span_m < 0.0 || s.distance_noise_m < 0.0 || s.rssi_noise_dbm < 0.0 {
            return Err(ConfigError::Invalid("跨度和噪声幅度不能为负".to_string()));
        }
        RSSIModel::from_simulation(s).validate()?;

        let g = &self.geo;
        if g.placement_radius_m <= 0.0 || g.fallback_jitter_deg < 0.0 {
            return Err(ConfigError::Invalid("放置半径必须为正且抖动不能为负".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.estimator.window_size, 18);
        assert_eq!(config.simulation.tick_ms, 650);
        assert_eq!(config.estimator.freshness_ms, 3000);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config =
            EngineConfig::from_json_str(r#"{"estimator": {"freshness_ms": 5000}}"#).unwrap();
        assert_eq!(config.estimator.freshness_ms, 5000);
        assert_eq!(config.estimator.ema_alpha, 0.25);
        assert_eq!(config.geo.placement_radius_m, 45.0);
    }

    #[test]
    fn test_invalid_thresholds_rejected() {
        let result =
            EngineConfig::from_json_str(r#"{"estimator": {"stable_mad": 0.7, "moderate_mad": 0.6}}"#);
        assert!(matches!(result, Err(ConfigError::Invalid(_))));

        let result = EngineConfig::from_json_str(r#"{"estimator": {"ema_alpha": 0.0}}"#);
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_malformed_json() {
        let result = EngineConfig::from_json_str("{ not json");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }
}
