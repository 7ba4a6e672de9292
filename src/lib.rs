/// 蓝牙信标接近度估计与排序
///
/// 功能：
/// - 稳健统计 + 指数平滑的距离估计
/// - 稳定性、趋势、新鲜度分类
/// - 按新鲜度、距离、名称排序资产
/// - 无硬件时的模拟观测生成
/// - 地理坐标放置与大圆距离交叉对照

pub mod algorithms;
pub mod config;
pub mod engine;
pub mod error;
pub mod geo;
pub mod simulation;
pub mod store;

pub use config::EngineConfig;
pub use engine::{ProximityEngine, RankingSnapshot};
pub use error::{CatalogError, ConfigError, LocationError, ObservationError};
pub use store::RangeStore;

use tracing_subscriber::EnvFilter;

/// 安装 fmt 日志订阅者，日志级别取自 `RUST_LOG`，默认 info
///
/// 重复调用无副作用。
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
