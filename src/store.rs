/// 观测接入管道与测距状态表
///
/// 每个信标身份一把锁：同一信标的读改写整体串行，不同信标之间互不阻塞。
/// 全表写锁只在首次出现某个信标时短暂持有。

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::algorithms::{
    AssetCatalog, AssetFilter, BeaconIdentity, DistanceEstimator, Observation, RangeState,
    RangeView, RankedAsset,
};
use crate::config::EstimatorConfig;
use crate::error::ObservationError;

type Slot = Arc<Mutex<Option<RangeState>>>;

/// 测距状态表（线程安全）
pub struct RangeStore {
    estimator: DistanceEstimator,
    config: EstimatorConfig,
    /// key 为信标身份
    states: RwLock<HashMap<BeaconIdentity, Slot>>,
}

impl RangeStore {
    pub fn new(config: EstimatorConfig) -> Self {
        RangeStore {
            estimator: DistanceEstimator::new(&config),
            config,
            states: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &EstimatorConfig {
        &self.config
    }

    /// 接入一次观测
    pub async fn ingest(
        &self,
        identity: &BeaconIdentity,
        raw_distance: f64,
        signal_strength: f64,
        arrival: DateTime<Utc>,
    ) -> Result<RangeView, ObservationError> {
        let observation = Observation::new(identity.clone(), raw_distance, signal_strength, arrival);
        self.ingest_observation(&observation).await
    }

    /// 接入一次观测；被拒绝时状态保持不变
    pub async fn ingest_observation(
        &self,
        observation: &Observation,
    ) -> Result<RangeView, ObservationError> {
        if let Err(e) = observation.validate() {
            warn!(beacon = %observation.identity, error = %e, "丢弃无效观测");
            return Err(e);
        }

        let slot = self.slot_or_insert(&observation.identity).await;
        let mut guard = slot.lock().await;

        if let Some(previous) = guard.as_ref() {
            if observation.at < previous.last_seen {
                let e = ObservationError::OutOfOrder {
                    last_seen: previous.last_seen,
                    arrival: observation.at,
                };
                warn!(beacon = %observation.identity, error = %e, "丢弃乱序观测");
                return Err(e);
            }
        }

        let next = self.estimator.update(
            guard.as_ref(),
            observation.distance_m,
            observation.signal_dbm,
            observation.at,
        );
        debug!(
            beacon = %observation.identity,
            raw = observation.distance_m,
            ema = ?next.ema_distance,
            mad = ?next.mad_distance,
            "接收观测"
        );
        let view = RangeView::from_state(&observation.identity, Some(&next), observation.at, &self.config);
        *guard = Some(next);
        Ok(view)
    }

    /// 当前状态的快照
    pub async fn state(&self, identity: &BeaconIdentity) -> Option<RangeState> {
        let slot = self.states.read().await.get(identity).cloned()?;
        let guard = slot.lock().await;
        guard.clone()
    }

    /// 某个信标在 `now` 时刻的视图
    pub async fn view(&self, identity: &BeaconIdentity, now: DateTime<Utc>) -> RangeView {
        let state = self.state(identity).await;
        RangeView::from_state(identity, state.as_ref(), now, &self.config)
    }

    /// 已有测距状态的信标数量
    pub async fn len(&self) -> usize {
        let mut count = 0;
        for slot in self.slots().await {
            if slot.lock().await.is_some() {
                count += 1;
            }
        }
        count
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// 所有状态的快照
    pub async fn snapshot(&self) -> HashMap<BeaconIdentity, RangeState> {
        let entries: Vec<(BeaconIdentity, Slot)> = {
            let states = self.states.read().await;
            states.iter().map(|(k, v)| (k.clone(), Arc::clone(v))).collect()
        };

        let mut snapshot = HashMap::with_capacity(entries.len());
        for (identity, slot) in entries {
            if let Some(state) = slot.lock().await.clone() {
                snapshot.insert(identity, state);
            }
        }
        snapshot
    }

    /// 按过滤条件生成排序后的资产列表
    ///
    /// 排序键：新鲜优先 → 平滑距离升序（无距离排最后）→ 名称（不区分大小写）。
    /// 排序是稳定的，名称也相同时保持目录顺序。
    pub async fn rank(
        &self,
        catalog: &AssetCatalog,
        filter: &AssetFilter,
        now: DateTime<Utc>,
    ) -> Vec<RankedAsset> {
        let mut entries = Vec::new();
        for asset in catalog.filtered(filter) {
            let state = self.state(&asset.identity).await;
            let view = RangeView::from_state(&asset.identity, state.as_ref(), now, &self.config);
            let distance = state
                .as_ref()
                .and_then(|s| s.ema_distance)
                .unwrap_or(f64::INFINITY);
            let name_key = asset.name.to_lowercase();
            entries.push((
                RankedAsset {
                    asset: asset.clone(),
                    view,
                },
                distance,
                name_key,
            ));
        }

        entries.sort_by(|(a, da, na), (b, db, nb)| compare_rank(a.view.fresh, *da, na, b.view.fresh, *db, nb));
        entries.into_iter().map(|(ranked, _, _)| ranked).collect()
    }

    async fn slot_or_insert(&self, identity: &BeaconIdentity) -> Slot {
        if let Some(slot) = self.states.read().await.get(identity) {
            return Arc::clone(slot);
        }
        let mut states = self.states.write().await;
        Arc::clone(
            states
                .entry(identity.clone())
                .or_insert_with(|| Arc::new(Mutex::new(None))),
        )
    }

    async fn slots(&self) -> Vec<Slot> {
        self.states.read().await.values().cloned().collect()
    }
}

impl Default for RangeStore {
    fn default() -> Self {
        RangeStore::new(EstimatorConfig::default())
    }
}

fn compare_rank(
    a_fresh: bool,
    a_distance: f64,
    a_name: &str,
    b_fresh: bool,
    b_distance: f64,
    b_name: &str,
) -> Ordering {
    b_fresh
        .cmp(&a_fresh)
        .then_with(|| a_distance.total_cmp(&b_distance))
        .then_with(|| a_name.cmp(b_name))
}
