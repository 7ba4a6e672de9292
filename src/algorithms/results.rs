/// 观测输入与只读视图输出
///
/// 视图在读取时根据当前时间生成，过期实体不暴露距离和信号数值。

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::algorithms::beacon::{Asset, BeaconIdentity};
use crate::algorithms::classifier::{Freshness, Stability, Trend};
use crate::algorithms::estimator::RangeState;
use crate::algorithms::rssi_model::RSSIModel;
use crate::config::EstimatorConfig;
use crate::error::ObservationError;

/// 单次原始观测
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Observation {
    pub identity: BeaconIdentity,
    /// 原始距离（米）
    pub distance_m: f64,
    /// 信号强度（dBm）
    pub signal_dbm: f64,
    /// 到达时间
    pub at: DateTime<Utc>,
}

impl Observation {
    pub fn new(identity: BeaconIdentity, distance_m: f64, signal_dbm: f64, at: DateTime<Utc>) -> Self {
        Observation {
            identity,
            distance_m,
            signal_dbm,
            at,
        }
    }

    /// 硬件只给出 RSSI 时，用路径损耗模型换算距离
    pub fn from_rssi(
        identity: BeaconIdentity,
        rssi: f64,
        model: &RSSIModel,
        at: DateTime<Utc>,
    ) -> Self {
        Observation::new(identity, model.rssi_to_distance(rssi), rssi, at)
    }

    /// 入口校验：距离必须是有限非负实数，信号必须是有限实数
    pub fn validate(&self) -> Result<(), ObservationError> {
        if !self.distance_m.is_finite() {
            return Err(ObservationError::NonFiniteDistance(self.distance_m));
        }
        if self.distance_m < 0.0 {
            return Err(ObservationError::NegativeDistance(self.distance_m));
        }
        if !self.signal_dbm.is_finite() {
            return Err(ObservationError::NonFiniteSignal(self.signal_dbm));
        }
        Ok(())
    }
}

/// 某个信标在某一时刻的只读视图
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RangeView {
    pub identity: BeaconIdentity,
    pub fresh: bool,
    /// 平滑距离（米），过期或尚无观测时为空
    pub distance_estimate: Option<f64>,
    pub stability: Stability,
    pub trend: Trend,
    /// 距最后一次观测的毫秒数，从未观测时为空
    pub last_seen_age_ms: Option<i64>,
    /// 最近一次信号强度，过期时为空
    pub last_signal_strength: Option<f64>,
    pub sample_count: usize,
}

impl RangeView {
    /// 从测距状态生成视图
    pub fn from_state(
        identity: &BeaconIdentity,
        state: Option<&RangeState>,
        now: DateTime<Utc>,
        config: &EstimatorConfig,
    ) -> Self {
        let Some(state) = state else {
            return RangeView::unseen(identity);
        };

        let fresh = Freshness::new(config.freshness_ms).is_fresh(state.last_seen, now);
        RangeView {
            identity: identity.clone(),
            fresh,
            distance_estimate: state.ema_distance.filter(|_| fresh),
            stability: Stability::classify(state.mad_distance, config.stable_mad, config.moderate_mad),
            trend: Trend::classify(state.delta_distance, config.trend_deadband),
            last_seen_age_ms: Some(Freshness::age_ms(state.last_seen, now)),
            last_signal_strength: Some(state.last_signal_strength).filter(|_| fresh),
            sample_count: state.sample_count(),
        }
    }

    /// 从未观测到的信标
    pub fn unseen(identity: &BeaconIdentity) -> Self {
        RangeView {
            identity: identity.clone(),
            fresh: false,
            distance_estimate: None,
            stability: Stability::WarmingUp,
            trend: Trend::Collecting,
            last_seen_age_ms: None,
            last_signal_strength: None,
            sample_count: 0,
        }
    }

    pub fn distance_label(&self) -> String {
        match self.distance_estimate {
            Some(d) => format!("{:.1} m", d),
            None => "unknown".to_string(),
        }
    }

    pub fn signal_label(&self) -> String {
        match self.last_signal_strength {
            Some(rssi) => format!("{:.0} dBm", rssi),
            None => "unknown".to_string(),
        }
    }
}

impl fmt::Display for RangeView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] {} / {} / {}",
            self.identity,
            if self.fresh { "live" } else { "stale" },
            self.distance_label(),
            self.stability,
            self.trend
        )
    }
}

/// 排序结果中的一项
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RankedAsset {
    pub asset: Asset,
    pub view: RangeView,
}

impl fmt::Display for RankedAsset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}) {} {}",
            self.asset.name,
            self.view.signal_label(),
            self.view.distance_label(),
            self.view.trend
        )
    }
}
