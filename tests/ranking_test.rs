/// 排序与过滤测试
///
/// 排序键：新鲜优先 → 平滑距离升序 → 名称（不区分大小写）

use bluprox::algorithms::*;
use bluprox::RangeStore;
use chrono::{DateTime, Duration, Utc};

const ORG: &str = "FDA50693-A4E2-4FB1-AFCF-C6EB07647825";

fn asset(minor: u16, name: &str) -> Asset {
    Asset::new(BeaconIdentity::new(ORG, 100, minor), name)
}

async fn seed_store(store: &RangeStore, now: DateTime<Utc>) {
    // A 新鲜 2.0 m，B 过期，C 新鲜 5.0 m
    store
        .ingest(&BeaconIdentity::new(ORG, 100, 1), 2.0, -50.0, now)
        .await
        .unwrap();
    store
        .ingest(&BeaconIdentity::new(ORG, 100, 2), 0.5, -40.0, now - Duration::seconds(10))
        .await
        .unwrap();
    store
        .ingest(&BeaconIdentity::new(ORG, 100, 3), 5.0, -58.0, now)
        .await
        .unwrap();
}

fn names(ranked: &[RankedAsset]) -> Vec<&str> {
    ranked.iter().map(|r| r.asset.name.as_str()).collect()
}

#[tokio::test]
async fn test_rank_fresh_then_distance() {
    let store = RangeStore::default();
    let now = Utc::now();
    seed_store(&store, now).await;

    for order in [[1, 2, 3], [3, 2, 1], [2, 3, 1]] {
        let catalog = AssetCatalog::from_vec(
            order
                .iter()
                .map(|&m| asset(m, ["A", "B", "C"][m as usize - 1]))
                .collect(),
        );
        let ranked = store.rank(&catalog, &AssetFilter::all(), now).await;
        assert_eq!(names(&ranked), vec!["A", "C", "B"]);
    }
}

#[tokio::test]
async fn test_rank_distance_dominates_name() {
    let store = RangeStore::default();
    let now = Utc::now();
    seed_store(&store, now).await;

    let catalog = AssetCatalog::from_vec(vec![
        asset(1, "zebra"),
        asset(2, "B"),
        asset(3, "Aardvark"),
    ]);
    let ranked = store.rank(&catalog, &AssetFilter::all(), now).await;
    assert_eq!(names(&ranked), vec!["zebra", "Aardvark", "B"]);

    let stale = &ranked[2].view;
    assert!(!stale.fresh);
    assert_eq!(stale.distance_estimate, None);
    assert_eq!(stale.distance_label(), "unknown");
}

#[tokio::test]
async fn test_rank_name_tie_break_is_case_insensitive() {
    let store = RangeStore::default();
    let now = Utc::now();
    for minor in 1..=3 {
        store
            .ingest(&BeaconIdentity::new(ORG, 100, minor), 4.0, -60.0, now)
            .await
            .unwrap();
    }
    let catalog = AssetCatalog::from_vec(vec![
        asset(1, "charlie"),
        asset(2, "Bravo"),
        asset(3, "alpha"),
    ]);

    let first = store.rank(&catalog, &AssetFilter::all(), now).await;
    let second = store.rank(&catalog, &AssetFilter::all(), now).await;
    assert_eq!(names(&first), vec!["alpha", "Bravo", "charlie"]);
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_rank_with_filters() {
    let store = RangeStore::default();
    let now = Utc::now();
    seed_store(&store, now).await;

    let other_site = Asset::new(BeaconIdentity::new(ORG, 200, 1), "Forklift");
    let catalog = AssetCatalog::from_vec(vec![
        asset(1, "Infusion Pump").with_tag("MED-001"),
        asset(2, "Wheelchair").with_type("Mobility"),
        asset(3, "Pump Stand"),
        other_site,
    ]);

    let site = store.rank(&catalog, &AssetFilter::site(100), now).await;
    assert_eq!(site.len(), 3);

    let pumps = store
        .rank(&catalog, &AssetFilter::all().with_text("PUMP"), now)
        .await;
    assert_eq!(names(&pumps), vec!["Infusion Pump", "Pump Stand"]);

    let by_type = store
        .rank(&catalog, &AssetFilter::site(100).with_text("mobility"), now)
        .await;
    assert_eq!(names(&by_type), vec!["Wheelchair"]);

    let nothing = store
        .rank(&catalog, &AssetFilter::site(300), now)
        .await;
    assert!(nothing.is_empty());
}

#[tokio::test]
async fn test_freshness_flips_after_window() {
    let store = RangeStore::default();
    let id = BeaconIdentity::new(ORG, 100, 1);
    let seen = Utc::now();
    for i in 0..6 {
        store
            .ingest(&id, 1.5, -48.0, seen - Duration::milliseconds(650 * (5 - i)))
            .await
            .unwrap();
    }

    let at_edge = store.view(&id, seen + Duration::milliseconds(3000)).await;
    assert!(at_edge.fresh);
    assert_eq!(at_edge.distance_estimate, Some(1.5));

    let past_edge = store.view(&id, seen + Duration::milliseconds(3001)).await;
    assert!(!past_edge.fresh);
    assert_eq!(past_edge.distance_estimate, None);
    assert_eq!(past_edge.last_signal_strength, None);
    // 过期只是读取时的判断，稳定性标签仍基于最后的数值
    assert_eq!(past_edge.stability, Stability::Stable);

    // 再次观测后恢复新鲜
    let revived = store
        .ingest(&id, 1.5, -48.0, seen + Duration::milliseconds(5000))
        .await
        .unwrap();
    assert!(revived.fresh);
    assert_eq!(revived.sample_count, 7);
}

#[test]
fn test_rank_from_sync_context() {
    // 非异步调用方（例如界面线程）可以直接阻塞等待
    let store = RangeStore::default();
    let now = Utc::now();
    let id = BeaconIdentity::new(ORG, 100, 1);
    let view = tokio_test::block_on(store.ingest(&id, 3.5, -61.0, now)).unwrap();
    assert_eq!(view.distance_estimate, Some(3.5));

    let catalog = AssetCatalog::from_vec(vec![asset(1, "Cart")]);
    let ranked = tokio_test::block_on(store.rank(&catalog, &AssetFilter::all(), now));
    assert_eq!(names(&ranked), vec!["Cart"]);
}
