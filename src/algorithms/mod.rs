/// 信标测距算法模块
///
/// 该模块提供与运行时无关的纯计算部分：
/// - 稳健统计（中位数、MAD）
/// - 距离估计（中位数预滤波 + 指数平滑）
/// - 稳定性、趋势、新鲜度分类
/// - RSSI 路径损耗模型
/// - 信标身份与资产目录

pub mod robust_stats;
pub mod estimator;
pub mod classifier;
pub mod rssi_model;
pub mod beacon;
pub mod results;

pub use robust_stats::*;
pub use estimator::*;
pub use classifier::*;
pub use rssi_model::*;
pub use beacon::*;
pub use results::*;
