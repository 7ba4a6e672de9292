/// 错误类型定义
///
/// 所有错误都不是致命的：观测被拒绝时状态保持不变，定位失败时退化到备用坐标。

use chrono::{DateTime, Utc};
use thiserror::Error;

/// 观测数据在入口处被拒绝的原因
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ObservationError {
    /// 距离不是有限实数（NaN 或无穷大）
    #[error("距离不是有限值: {0}")]
    NonFiniteDistance(f64),

    /// 距离为负数
    #[error("距离不能为负数: {0} m")]
    NegativeDistance(f64),

    /// 信号强度不是有限实数
    #[error("信号强度不是有限值: {0}")]
    NonFiniteSignal(f64),

    /// 观测时间早于该信标最后一次被接受的时间
    #[error("观测时间 {arrival} 早于最后接收时间 {last_seen}")]
    OutOfOrder {
        last_seen: DateTime<Utc>,
        arrival: DateTime<Utc>,
    },
}

/// 配置加载或校验失败
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("读取配置文件失败: {0}")]
    Io(#[from] std::io::Error),

    #[error("解析配置失败: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("配置无效: {0}")]
    Invalid(String),
}

/// 观察者位置服务失败
///
/// 只会让目标坐标放置退化为备用路径，不会影响测距和排序。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocationError {
    #[error("位置服务不可用")]
    Unavailable,

    #[error("获取位置超时 ({0} ms)")]
    Timeout(u64),

    #[error("位置权限被拒绝: {0}")]
    Denied(String),
}

/// 资产目录加载失败
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("读取资产目录失败: {0}")]
    Io(#[from] std::io::Error),

    #[error("解析资产目录失败: {0}")]
    Parse(#[from] serde_json::Error),
}
