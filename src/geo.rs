/// 目标地理坐标放置与大圆距离
///
/// 目标坐标每个会话只计算一次；观察者坐标持续更新时只重新计算 haversine 距离，
/// 作为 RSSI 测距之外的独立参照。

use std::collections::HashMap;
use std::f64::consts::PI;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::algorithms::BeaconIdentity;
use crate::config::GeoConfig;
use crate::error::LocationError;

/// 地球平均半径（米）
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// 经纬度坐标（度）
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        GeoPoint { lat, lon }
    }

    /// haversine 大圆距离（米）
    pub fn haversine_m(&self, other: &GeoPoint) -> f64 {
        let phi1 = self.lat.to_radians();
        let phi2 = other.lat.to_radians();
        let d_phi = (other.lat - self.lat).to_radians();
        let d_lambda = (other.lon - self.lon).to_radians();

        let a = (d_phi / 2.0).sin().powi(2)
            + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
        EARTH_RADIUS_M * c
    }

    /// 按北向/东向米数偏移，经度方向考虑纬度缩放
    pub fn offset_m(&self, north_m: f64, east_m: f64) -> GeoPoint {
        let d_lat = (north_m / EARTH_RADIUS_M).to_degrees();
        let lon_scale = self.lat.to_radians().cos().max(1e-12);
        let d_lon = (east_m / (EARTH_RADIUS_M * lon_scale)).to_degrees();
        GeoPoint::new(self.lat + d_lat, self.lon + d_lon)
    }
}

/// 观察者的一次定位结果
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ObserverFix {
    pub point: GeoPoint,
    /// 定位精度（米）
    pub accuracy_m: f64,
}

impl ObserverFix {
    pub fn new(lat: f64, lon: f64, accuracy_m: f64) -> Self {
        ObserverFix {
            point: GeoPoint::new(lat, lon),
            accuracy_m,
        }
    }
}

pub type FixUpdate = Option<Result<ObserverFix, LocationError>>;

/// 观察者位置来源
///
/// `current_fix` 用于一次性放置目标；`subscribe` 提供持续更新的位置流。
pub trait LocationSource: Send + Sync {
    fn current_fix(&self) -> impl Future<Output = Result<ObserverFix, LocationError>> + Send;

    fn subscribe(&self) -> watch::Receiver<FixUpdate>;
}

/// 外部位置回调的适配器：回调里调用 `publish` / `fail`
pub struct LocationFeed {
    tx: watch::Sender<FixUpdate>,
}

impl LocationFeed {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        LocationFeed { tx }
    }

    pub fn publish(&self, fix: ObserverFix) {
        self.tx.send_replace(Some(Ok(fix)));
    }

    pub fn fail(&self, error: LocationError) {
        self.tx.send_replace(Some(Err(error)));
    }
}

impl Default for LocationFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl LocationSource for LocationFeed {
    async fn current_fix(&self) -> Result<ObserverFix, LocationError> {
        let mut rx = self.tx.subscribe();
        loop {
            let current = rx.borrow_and_update().clone();
            if let Some(result) = current {
                return result;
            }
            rx.changed().await.map_err(|_| LocationError::Unavailable)?;
        }
    }

    fn subscribe(&self) -> watch::Receiver<FixUpdate> {
        self.tx.subscribe()
    }
}

/// 固定位置（桌面环境或测试）
pub struct FixedLocation(pub ObserverFix);

impl LocationSource for FixedLocation {
    async fn current_fix(&self) -> Result<ObserverFix, LocationError> {
        Ok(self.0)
    }

    fn subscribe(&self) -> watch::Receiver<FixUpdate> {
        watch::channel(Some(Ok(self.0))).1
    }
}

/// 没有位置服务
pub struct NoLocation;

impl LocationSource for NoLocation {
    async fn current_fix(&self) -> Result<ObserverFix, LocationError> {
        Err(LocationError::Unavailable)
    }

    fn subscribe(&self) -> watch::Receiver<FixUpdate> {
        watch::channel(Some(Err(LocationError::Unavailable))).1
    }
}

// ============================================================================
// 目标放置
// ============================================================================

/// 目标坐标的来源
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum PlacementMode {
    /// 以观察者为圆心的圆盘内
    Observer,
    /// 固定参考点附近的抖动框内
    Fallback,
}

/// 一次会话内各信标的目标坐标
#[derive(Clone, Debug, PartialEq)]
pub struct TargetPlacement {
    pub mode: PlacementMode,
    /// 放置时的中心点
    pub center: GeoPoint,
    points: HashMap<BeaconIdentity, GeoPoint>,
}

impl TargetPlacement {
    /// 在半径 `radius_m` 的圆盘内均匀放置：r = R·√u，θ = 2π·v
    pub fn around_observer<R: Rng + ?Sized>(
        observer: GeoPoint,
        identities: &[BeaconIdentity],
        radius_m: f64,
        rng: &mut R,
    ) -> Self {
        let mut points = HashMap::with_capacity(identities.len());
        for identity in identities {
            if points.contains_key(identity) {
                continue;
            }
            let r = radius_m * rng.gen_range(0.0..1.0f64).sqrt();
            let theta = 2.0 * PI * rng.gen_range(0.0..1.0f64);
            points.insert(identity.clone(), observer.offset_m(r * theta.cos(), r * theta.sin()));
        }
        TargetPlacement {
            mode: PlacementMode::Observer,
            center: observer,
            points,
        }
    }

    /// 在参考点 ±`jitter_deg` 的经纬度框内放置
    pub fn fallback<R: Rng + ?Sized>(
        reference: GeoPoint,
        identities: &[BeaconIdentity],
        jitter_deg: f64,
        rng: &mut R,
    ) -> Self {
        let mut points = HashMap::with_capacity(identities.len());
        for identity in identities {
            if points.contains_key(identity) {
                continue;
            }
            let (d_lat, d_lon) = if jitter_deg > 0.0 {
                (
                    rng.gen_range(-jitter_deg..=jitter_deg),
                    rng.gen_range(-jitter_deg..=jitter_deg),
                )
            } else {
                (0.0, 0.0)
            };
            points.insert(
                identity.clone(),
                GeoPoint::new(reference.lat + d_lat, reference.lon + d_lon),
            );
        }
        TargetPlacement {
            mode: PlacementMode::Fallback,
            center: reference,
            points,
        }
    }

    /// 带超时地获取观察者位置，失败或超时都退化为备用放置
    pub async fn resolve<S, R>(
        source: &S,
        identities: &[BeaconIdentity],
        config: &GeoConfig,
        rng: &mut R,
    ) -> Self
    where
        S: LocationSource,
        R: Rng + ?Sized,
    {
        let timeout = Duration::from_millis(config.fix_timeout_ms);
        let outcome = match tokio::time::timeout(timeout, source.current_fix()).await {
            Ok(result) => result,
            Err(_) => Err(LocationError::Timeout(config.fix_timeout_ms)),
        };

        match outcome {
            Ok(fix) => {
                info!(
                    lat = fix.point.lat,
                    lon = fix.point.lon,
                    count = identities.len(),
                    "以观察者位置放置目标"
                );
                Self::around_observer(fix.point, identities, config.placement_radius_m, rng)
            }
            Err(e) => {
                warn!(error = %e, "无法获取观察者位置，使用备用参考点");
                Self::fallback(config.fallback_reference, identities, config.fallback_jitter_deg, rng)
            }
        }
    }

    pub fn get(&self, identity: &BeaconIdentity) -> Option<GeoPoint> {
        self.points.get(identity).copied()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&BeaconIdentity, &GeoPoint)> {
        self.points.iter()
    }

    /// 观察者到某个目标的大圆距离
    pub fn distance_from(&self, identity: &BeaconIdentity, observer: &GeoPoint) -> Option<f64> {
        self.get(identity).map(|p| observer.haversine_m(&p))
    }

    pub fn geo_distance(&self, identity: &BeaconIdentity, fix: &ObserverFix) -> Option<GeoDistance> {
        let target = self.get(identity)?;
        Some(GeoDistance {
            identity: identity.clone(),
            observer: fix.point,
            target,
            distance_m: fix.point.haversine_m(&target),
            accuracy_m: fix.accuracy_m,
        })
    }
}

/// 基于地理坐标的辅助距离，仅用于交叉对照
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GeoDistance {
    pub identity: BeaconIdentity,
    pub observer: GeoPoint,
    pub target: GeoPoint,
    pub distance_m: f64,
    pub accuracy_m: f64,
}

// ============================================================================
// 位置订阅
// ============================================================================

/// 针对单个目标的位置订阅
///
/// 切换目标时先取消旧订阅再启动新订阅；drop 时取消。
pub struct LocationWatch {
    identity: BeaconIdentity,
    latest: watch::Receiver<Option<GeoDistance>>,
    task: Option<JoinHandle<()>>,
}

impl LocationWatch {
    pub fn start<S: LocationSource>(
        source: &S,
        identity: BeaconIdentity,
        placement: Arc<TargetPlacement>,
    ) -> Self {
        let mut fixes = source.subscribe();
        let (tx, latest) = watch::channel(None);
        let target = identity.clone();

        let task = tokio::spawn(async move {
            loop {
                let update = fixes.borrow_and_update().clone();
                match update {
                    Some(Ok(fix)) => {
                        if let Some(distance) = placement.geo_distance(&target, &fix) {
                            tx.send_replace(Some(distance));
                        }
                    }
                    Some(Err(e)) => debug!(beacon = %target, error = %e, "位置更新失败"),
                    None => {}
                }
                if fixes.changed().await.is_err() || tx.is_closed() {
                    break;
                }
            }
        });

        LocationWatch {
            identity,
            latest,
            task: Some(task),
        }
    }

    pub fn identity(&self) -> &BeaconIdentity {
        &self.identity
    }

    /// 最近一次的辅助距离
    pub fn latest(&self) -> Option<GeoDistance> {
        self.latest.borrow().clone()
    }

    /// 等待下一次更新；订阅结束时返回 `None`
    pub async fn changed(&mut self) -> Option<GeoDistance> {
        self.latest.changed().await.ok()?;
        self.latest.borrow_and_update().clone()
    }

    /// 切换到新的目标
    pub fn retarget<S: LocationSource>(
        &mut self,
        source: &S,
        identity: BeaconIdentity,
        placement: Arc<TargetPlacement>,
    ) {
        self.stop();
        *self = LocationWatch::start(source, identity, placement);
    }

    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for LocationWatch {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn ids(n: u16) -> Vec<BeaconIdentity> {
        (0..n).map(|i| BeaconIdentity::new("ORG", 1, i)).collect()
    }

    #[test]
    fn test_haversine_known_distance() {
        // 赤道上经度相差 1 度约 111.19 km
        let a = GeoPoint::new(0.0, 0.0);
        let b = GeoPoint::new(0.0, 1.0);
        assert!((a.haversine_m(&b) - 111_195.0).abs() < 5.0);
        assert_eq!(a.haversine_m(&a), 0.0);
    }

    #[test]
    fn test_offset_roundtrip_distance() {
        let origin = GeoPoint::new(60.0, 10.0);
        let moved = origin.offset_m(30.0, 40.0);
        assert!((origin.haversine_m(&moved) - 50.0).abs() < 0.1);
    }

    #[test]
    fn test_observer_disk() {
        let mut rng = StdRng::seed_from_u64(11);
        let observer = GeoPoint::new(31.2304, 121.4737);
        let placement = TargetPlacement::around_observer(observer, &ids(200), 45.0, &mut rng);
        assert_eq!(placement.mode, PlacementMode::Observer);
        assert_eq!(placement.len(), 200);
        for (_, point) in placement.iter() {
            assert!(observer.haversine_m(point) <= 45.0 + 0.01);
        }
    }

    #[test]
    fn test_duplicate_identities_placed_once() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut list = ids(3);
        list.push(list[0].clone());
        let placement =
            TargetPlacement::fallback(GeoPoint::new(0.0, 0.0), &list, 0.001, &mut rng);
        assert_eq!(placement.len(), 3);
    }

    #[tokio::test]
    async fn test_resolve_without_location_uses_fallback_box() {
        let config = GeoConfig::default();
        let mut rng = StdRng::seed_from_u64(9);
        let placement = TargetPlacement::resolve(&NoLocation, &ids(50), &config, &mut rng).await;
        assert_eq!(placement.mode, PlacementMode::Fallback);
        let reference = config.fallback_reference;
        for (_, p) in placement.iter() {
            assert!((p.lat - reference.lat).abs() <= config.fallback_jitter_deg);
            assert!((p.lon - reference.lon).abs() <= config.fallback_jitter_deg);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolve_times_out() {
        // 没有任何回调的 feed 永远等不到位置
        let feed = LocationFeed::new();
        let config = GeoConfig::default();
        let mut rng = StdRng::seed_from_u64(9);
        let placement = TargetPlacement::resolve(&feed, &ids(2), &config, &mut rng).await;
        assert_eq!(placement.mode, PlacementMode::Fallback);
    }
}
