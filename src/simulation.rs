/// 模拟观测生成器
///
/// 没有真实蓝牙硬件时，用它按固定节拍产生 (距离, RSSI) 观测。
/// 每个实体的“真实距离”只属于模拟器，和测距状态表中的平滑估计完全分开。

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::{Mutex, RwLock, watch};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

use crate::algorithms::{Asset, AssetCatalog, AssetFilter, BeaconIdentity, Observation, RSSIModel};
use crate::config::SimulationConfig;
use crate::store::RangeStore;

/// 单个模拟实体的私有状态
#[derive(Clone, Copy, Debug, PartialEq)]
struct SimulatedEntity {
    true_distance: f64,
}

/// 模拟观测生成器
pub struct Simulator {
    config: SimulationConfig,
    model: RSSIModel,
    rng: StdRng,
    entities: HashMap<BeaconIdentity, SimulatedEntity>,
    /// 当前“走向”的目标，同一时间最多一个
    target: Option<BeaconIdentity>,
}

impl Simulator {
    pub fn new(config: SimulationConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Simulator {
            model: RSSIModel::from_simulation(&config),
            config,
            rng,
            entities: HashMap::new(),
            target: None,
        }
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// 设置走向目标；`None` 时所有实体恢复向外漂移
    ///
    /// 切换目标不会重置任何实体的真实距离。
    pub fn set_target(&mut self, target: Option<BeaconIdentity>) {
        self.target = target;
    }

    pub fn target(&self) -> Option<&BeaconIdentity> {
        self.target.as_ref()
    }

    /// 模拟器内部的真实距离，尚未模拟过的实体返回 `None`
    pub fn true_distance(&self, identity: &BeaconIdentity) -> Option<f64> {
        self.entities.get(identity).map(|e| e.true_distance)
    }

    /// 本节拍参与模拟的资产：允许模拟、匹配站点过滤，按目录顺序取前 N 个
    pub fn eligible<'a>(&self, catalog: &'a AssetCatalog, filter: &AssetFilter) -> Vec<&'a Asset> {
        let site = filter.site_filter();
        catalog
            .iter()
            .filter(|a| a.simulate)
            .filter(move |a| site.is_none_or(|s| a.site() == s))
            .take(self.config.max_entities)
            .collect()
    }

    /// 推进一个节拍，返回本节拍产生的观测
    pub fn tick(
        &mut self,
        catalog: &AssetCatalog,
        filter: &AssetFilter,
        now: DateTime<Utc>,
    ) -> Vec<Observation> {
        let identities: Vec<BeaconIdentity> = self
            .eligible(catalog, filter)
            .into_iter()
            .map(|a| a.identity.clone())
            .collect();

        identities
            .into_iter()
            .map(|identity| {
                let distance = self.step(&identity);
                let rssi = self
                    .model
                    .sample_rssi(distance, self.config.rssi_noise_dbm, &mut self.rng);
                Observation::new(identity, distance, rssi, now)
            })
            .collect()
    }

    /// 推进单个实体的真实距离：漂移 + 噪声，然后夹取到感知范围
    fn step(&mut self, identity: &BeaconIdentity) -> f64 {
        let cfg = &self.config;
        let rng = &mut self.rng;

        let entity = self
            .entities
            .entry(identity.clone())
            .or_insert_with(|| SimulatedEntity {
                true_distance: cfg.initial_min_m + rng.gen_range(0.0..=1.0) * cfg.initial_span_m,
            });

        let drift = if self.target.as_ref() == Some(identity) {
            -cfg.approach_step_m
        } else {
            cfg.drift_step_m
        };
        let noise = if cfg.distance_noise_m > 0.0 {
            rng.gen_range(-cfg.distance_noise_m..=cfg.distance_noise_m)
        } else {
            0.0
        };

        entity.true_distance =
            (entity.true_distance + drift + noise).clamp(cfg.min_distance_m, cfg.max_distance_m);
        entity.true_distance
    }
}

/// 后台模拟任务句柄
///
/// `stop` 或 drop 都会释放定时器。模拟器本身由调用方持有，
/// 任务停止后走向目标和真实距离仍然保留，下次启动继续使用。
pub struct SimulationHandle {
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
    ticks: Arc<AtomicU64>,
}

impl SimulationHandle {
    /// 启动周期任务：每个节拍生成观测并送入测距状态表
    pub async fn spawn(
        simulator: Arc<Mutex<Simulator>>,
        store: Arc<RangeStore>,
        catalog: Arc<RwLock<AssetCatalog>>,
        filter: Arc<RwLock<AssetFilter>>,
    ) -> Self {
        let period = Duration::from_millis(simulator.lock().await.config().tick_ms);
        let ticks = Arc::new(AtomicU64::new(0));
        let (shutdown, mut shutdown_rx) = watch::channel(false);

        let task_simulator = Arc::clone(&simulator);
        let task_ticks = Arc::clone(&ticks);
        let task = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        let observations = {
                            let catalog = catalog.read().await;
                            let filter = filter.read().await;
                            task_simulator.lock().await.tick(&catalog, &filter, Utc::now())
                        };
                        for observation in &observations {
                            if let Err(e) = store.ingest_observation(observation).await {
                                warn!(beacon = %observation.identity, error = %e, "模拟观测被拒绝");
                            }
                        }
                        let n = task_ticks.fetch_add(1, Ordering::Relaxed) + 1;
                        debug!(tick = n, observations = observations.len(), "模拟节拍");
                    }
                }
            }
            info!("模拟任务已停止");
        });

        info!(tick_ms = period.as_millis() as u64, "模拟任务已启动");
        SimulationHandle {
            shutdown,
            task: Some(task),
            ticks,
        }
    }

    /// 已完成的节拍数
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// 停止任务并等待其退出
    pub async fn stop(mut self) {
        let _ = self.shutdown.send(true);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for SimulationHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
