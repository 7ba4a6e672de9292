/// 信标接近度引擎
///
/// 对外的唯一入口：资产目录、观测接入、排序读取、模拟任务和地理交叉对照。

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tracing::info;

use crate::algorithms::{AssetCatalog, AssetFilter, BeaconIdentity, Observation, RangeView, RankedAsset};
use crate::config::EngineConfig;
use crate::error::{ConfigError, ObservationError};
use crate::geo::{LocationSource, LocationWatch, ObserverFix, TargetPlacement};
use crate::simulation::{SimulationHandle, Simulator};
use crate::store::RangeStore;

/// 给界面层的排序快照
#[derive(Clone, Debug, Serialize)]
pub struct RankingSnapshot {
    pub generated_at: DateTime<Utc>,
    pub site: Option<u16>,
    pub query: Option<String>,
    pub entries: Vec<RankedAsset>,
}

pub struct ProximityEngine {
    config: EngineConfig,
    store: Arc<RangeStore>,
    catalog: Arc<RwLock<AssetCatalog>>,
    /// 模拟器使用的当前过滤条件（只看站点）
    filter: Arc<RwLock<AssetFilter>>,
    /// 走向目标和真实距离跨越多次启停保留
    simulator: Arc<Mutex<Simulator>>,
    simulation: Mutex<Option<SimulationHandle>>,
    placement: RwLock<Option<Arc<TargetPlacement>>>,
    rng: Mutex<StdRng>,
}

impl ProximityEngine {
    pub fn new(config: EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let rng = match config.simulation.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(1)),
            None => StdRng::from_entropy(),
        };
        Ok(ProximityEngine {
            store: Arc::new(RangeStore::new(config.estimator.clone())),
            catalog: Arc::new(RwLock::new(AssetCatalog::new())),
            filter: Arc::new(RwLock::new(AssetFilter::all())),
            simulator: Arc::new(Mutex::new(Simulator::new(config.simulation.clone()))),
            simulation: Mutex::new(None),
            placement: RwLock::new(None),
            rng: Mutex::new(rng),
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> Arc<RangeStore> {
        Arc::clone(&self.store)
    }

    /// 替换资产目录；目标坐标会在下一次 `place_targets` 时重新计算
    pub async fn set_catalog(&self, catalog: AssetCatalog) {
        info!(assets = catalog.len(), "资产目录已更新");
        *self.catalog.write().await = catalog;
        *self.placement.write().await = None;
    }

    pub async fn catalog(&self) -> AssetCatalog {
        self.catalog.read().await.clone()
    }

    /// 设置模拟器使用的过滤条件
    pub async fn set_filter(&self, filter: AssetFilter) {
        *self.filter.write().await = filter;
    }

    pub async fn ingest(
        &self,
        identity: &BeaconIdentity,
        raw_distance: f64,
        signal_strength: f64,
        arrival: DateTime<Utc>,
    ) -> Result<RangeView, ObservationError> {
        self.store.ingest(identity, raw_distance, signal_strength, arrival).await
    }

    pub async fn ingest_observation(&self, observation: &Observation) -> Result<RangeView, ObservationError> {
        self.store.ingest_observation(observation).await
    }

    pub async fn view(&self, identity: &BeaconIdentity, now: DateTime<Utc>) -> RangeView {
        self.store.view(identity, now).await
    }

    /// 按过滤条件排序当前目录
    pub async fn ranked(&self, filter: &AssetFilter, now: DateTime<Utc>) -> Vec<RankedAsset> {
        let catalog = self.catalog.read().await;
        self.store.rank(&catalog, filter, now).await
    }

    pub async fn snapshot(&self, filter: &AssetFilter, now: DateTime<Utc>) -> RankingSnapshot {
        RankingSnapshot {
            generated_at: now,
            site: filter.site_filter(),
            query: filter.text().map(str::to_string),
            entries: self.ranked(filter, now).await,
        }
    }

    pub async fn snapshot_json(
        &self,
        filter: &AssetFilter,
        now: DateTime<Utc>,
    ) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.snapshot(filter, now).await)
    }

    // ========================================================================
    // 模拟
    // ========================================================================

    /// 启动模拟任务；已在运行时不做任何事
    ///
    /// 之前选择的走向目标和各实体的真实距离继续沿用。
    pub async fn start_simulation(&self) {
        let mut simulation = self.simulation.lock().await;
        if simulation.as_ref().is_some_and(|h| h.is_running()) {
            return;
        }
        *simulation = Some(
            SimulationHandle::spawn(
                Arc::clone(&self.simulator),
                Arc::clone(&self.store),
                Arc::clone(&self.catalog),
                Arc::clone(&self.filter),
            )
            .await,
        );
    }

    pub async fn stop_simulation(&self) {
        let handle = self.simulation.lock().await.take();
        if let Some(handle) = handle {
            handle.stop().await;
        }
    }

    pub async fn simulation_running(&self) -> bool {
        self.simulation
            .lock()
            .await
            .as_ref()
            .is_some_and(|h| h.is_running())
    }

    pub async fn simulation_ticks(&self) -> u64 {
        self.simulation.lock().await.as_ref().map_or(0, |h| h.ticks())
    }

    /// 设置“走向”目标；模拟未运行时也会保留，下次启动生效
    pub async fn set_walk_target(&self, target: Option<BeaconIdentity>) {
        match &target {
            Some(id) => info!(beacon = %id, "切换走向目标"),
            None => info!("取消走向目标"),
        }
        self.simulator.lock().await.set_target(target);
    }

    pub async fn walk_target(&self) -> Option<BeaconIdentity> {
        self.simulator.lock().await.target().cloned()
    }

    /// 模拟器内部的真实距离，只用于调试和测试对照
    pub async fn simulated_distance(&self, identity: &BeaconIdentity) -> Option<f64> {
        self.simulator.lock().await.true_distance(identity)
    }

    // ========================================================================
    // 地理交叉对照
    // ========================================================================

    /// 为当前目录放置目标坐标；本会话已放置过则直接返回
    pub async fn place_targets<S: LocationSource>(&self, source: &S) -> Arc<TargetPlacement> {
        if let Some(existing) = self.placement.read().await.as_ref() {
            return Arc::clone(existing);
        }

        let identities = self.catalog.read().await.identities();
        let mut placement_guard = self.placement.write().await;
        if let Some(existing) = placement_guard.as_ref() {
            return Arc::clone(existing);
        }

        let placement = {
            let mut rng = self.rng.lock().await;
            TargetPlacement::resolve(source, &identities, &self.config.geo, &mut *rng).await
        };
        let placement = Arc::new(placement);
        *placement_guard = Some(Arc::clone(&placement));
        placement
    }

    pub async fn placement(&self) -> Option<Arc<TargetPlacement>> {
        self.placement.read().await.clone()
    }

    /// 观察者当前位置到目标的大圆距离
    pub async fn geo_distance(&self, identity: &BeaconIdentity, observer: &ObserverFix) -> Option<f64> {
        self.placement
            .read()
            .await
            .as_ref()
            .and_then(|p| p.distance_from(identity, &observer.point))
    }

    /// 为详情页启动位置订阅；尚未放置目标时返回 `None`
    pub async fn watch_location<S: LocationSource>(
        &self,
        source: &S,
        identity: BeaconIdentity,
    ) -> Option<LocationWatch> {
        let placement = self.placement().await?;
        Some(LocationWatch::start(source, identity, placement))
    }
}
