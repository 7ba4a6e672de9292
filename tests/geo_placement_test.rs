/// 地理坐标放置与位置订阅测试

use std::sync::Arc;

use bluprox::algorithms::*;
use bluprox::config::EngineConfig;
use bluprox::geo::*;
use bluprox::{LocationError, ProximityEngine};
use tokio::time::{Duration, timeout};

fn catalog() -> AssetCatalog {
    AssetCatalog::from_vec(
        (1..=6)
            .map(|i| Asset::new(BeaconIdentity::new("ORG", 3, i), format!("Crate {}", i)))
            .collect(),
    )
}

fn seeded_engine() -> ProximityEngine {
    let mut config = EngineConfig::default();
    config.simulation.seed = Some(99);
    ProximityEngine::new(config).unwrap()
}

#[tokio::test]
async fn test_place_around_observer() {
    let engine = seeded_engine();
    engine.set_catalog(catalog()).await;

    let observer = ObserverFix::new(22.5431, 114.0579, 8.0);
    let placement = engine.place_targets(&FixedLocation(observer)).await;
    assert_eq!(placement.mode, PlacementMode::Observer);
    assert_eq!(placement.len(), 6);

    for id in catalog().identities() {
        let d = engine.geo_distance(&id, &observer).await.unwrap();
        assert!(d <= 45.01, "{} 距离 {:.2} m 超出半径", id, d);
    }
}

#[tokio::test]
async fn test_placement_computed_once_per_session() {
    let engine = seeded_engine();
    engine.set_catalog(catalog()).await;

    let first = engine.place_targets(&NoLocation).await;
    let second = engine
        .place_targets(&FixedLocation(ObserverFix::new(0.0, 0.0, 5.0)))
        .await;
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(second.mode, PlacementMode::Fallback);

    // 目录更新后重新放置
    engine.set_catalog(catalog()).await;
    assert!(engine.placement().await.is_none());
    let third = engine
        .place_targets(&FixedLocation(ObserverFix::new(0.0, 0.0, 5.0)))
        .await;
    assert_eq!(third.mode, PlacementMode::Observer);
}

#[tokio::test]
async fn test_fallback_jitter_box() {
    let engine = seeded_engine();
    engine.set_catalog(catalog()).await;
    let placement = engine.place_targets(&NoLocation).await;

    let geo = &engine.config().geo;
    let reference = geo.fallback_reference;
    for (_, p) in placement.iter() {
        assert!((p.lat - reference.lat).abs() <= geo.fallback_jitter_deg);
        assert!((p.lon - reference.lon).abs() <= geo.fallback_jitter_deg);
        // 约 110 m 的框，对角线不超过 ~160 m
        assert!(reference.haversine_m(p) < 160.0);
    }
}

#[tokio::test]
async fn test_location_watch_follows_observer() {
    let engine = seeded_engine();
    engine.set_catalog(catalog()).await;

    let feed = LocationFeed::new();
    feed.publish(ObserverFix::new(48.8566, 2.3522, 12.0));
    let placement = engine.place_targets(&feed).await;
    assert_eq!(placement.mode, PlacementMode::Observer);

    let first = BeaconIdentity::new("ORG", 3, 1);
    let mut watch = engine.watch_location(&feed, first.clone()).await.unwrap();
    let initial = timeout(Duration::from_secs(1), watch.changed())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(initial.identity, first);
    assert!(initial.distance_m <= 45.01);

    // 观察者移动到目标所在位置，距离归零
    let target_point = placement.get(&first).unwrap();
    feed.publish(ObserverFix {
        point: target_point,
        accuracy_m: 3.0,
    });
    let moved = timeout(Duration::from_secs(1), watch.changed())
        .await
        .unwrap()
        .unwrap();
    assert!(moved.distance_m < 1e-6);
    assert_eq!(moved.accuracy_m, 3.0);

    // 定位失败不会覆盖上一次结果
    feed.fail(LocationError::Unavailable);
    tokio::task::yield_now().await;
    assert!(watch.latest().unwrap().distance_m < 1e-6);

    // 切换目标
    let second = BeaconIdentity::new("ORG", 3, 2);
    watch.retarget(&feed, second.clone(), Arc::clone(&placement));
    feed.publish(ObserverFix::new(48.8566, 2.3522, 12.0));
    let switched = timeout(Duration::from_secs(1), watch.changed())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(switched.identity, second);
    assert_eq!(watch.identity(), &second);

    watch.stop();
    assert!(!watch.is_active());
}

#[tokio::test]
async fn test_watch_requires_placement() {
    let engine = seeded_engine();
    engine.set_catalog(catalog()).await;
    let feed = LocationFeed::new();
    assert!(
        engine
            .watch_location(&feed, BeaconIdentity::new("ORG", 3, 1))
            .await
            .is_none()
    );
}
