/// RSSI 与距离互相转换的对数路径损耗模型
///
/// 公式: RSSI(d) = A + B * log10(d)，距离单位固定为米

use std::fmt;

use rand::Rng;

use crate::config::SimulationConfig;
use crate::error::ConfigError;

/// RSSI 转距离模型
#[derive(Clone, Debug, PartialEq)]
pub struct RSSIModel {
    /// 截距 A (dBm) - 1 米处的参考功率
    pub a: f64,
    /// 斜率 B - 衰减速率
    pub b: f64,
}

impl RSSIModel {
    /// 模拟器使用的模型参数
    pub fn from_simulation(config: &SimulationConfig) -> Self {
        RSSIModel {
            a: config.rssi_ref_dbm,
            b: config.rssi_slope,
        }
    }

    /// 反解距离: d = 10^((RSSI - A) / B)
    pub fn rssi_to_distance(&self, rssi: f64) -> f64 {
        let exponent = (rssi - self.a) / self.b;
        10_f64.powf(exponent)
    }

    /// 根据距离计算 RSSI；非正距离没有意义，返回负无穷
    pub fn distance_to_rssi(&self, distance: f64) -> f64 {
        if distance <= 0.0 {
            return f64::NEG_INFINITY;
        }
        self.a + self.b * distance.log10()
    }

    /// 叠加均匀噪声后取整，得到一次合成的 RSSI 读数
    pub fn sample_rssi<R: Rng + ?Sized>(&self, distance: f64, noise_dbm: f64, rng: &mut R) -> f64 {
        let noise = if noise_dbm > 0.0 {
            rng.gen_range(-noise_dbm..=noise_dbm)
        } else {
            0.0
        };
        (self.distance_to_rssi(distance) + noise).round()
    }

    /// 验证模型的合理性
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.b >= 0.0 {
            return Err(ConfigError::Invalid(
                "斜率 B 应为负数（RSSI 随距离增加而减小）".to_string(),
            ));
        }
        if self.a > 0.0 {
            return Err(ConfigError::Invalid(
                "截距 A 通常为负（功率以 dBm 表示）".to_string(),
            ));
        }
        Ok(())
    }

    pub fn description(&self) -> String {
        format!("RSSI模型 - A={:.2} dBm, B={:.2}", self.a, self.b)
    }
}

impl Default for RSSIModel {
    fn default() -> Self {
        RSSIModel::from_simulation(&SimulationConfig::default())
    }
}

impl fmt::Display for RSSIModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}
