use std::time::Duration;

use beacon_core::{BeaconError, ClusterSeed, Role};
use tokio_util::sync::CancellationToken;

#[path = "support/mod.rs"]
mod support;

use support::{Cluster, PATIENCE, SEED_PATH, eventually, t0};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_leaders_converge_on_one_seed() {
    let cluster = Cluster::new();
    let cancel = CancellationToken::new();

    let mut handles = Vec::new();
    for _ in 0..4 {
        let coordinator = cluster.coordinator(Role::Leader);
        let cancel = cancel.clone();
        handles.push(tokio::spawn(async move { coordinator.resolve(&cancel).await }));
    }

    let mut resolved = Vec::new();
    for handle in handles {
        resolved.push(handle.await.unwrap().unwrap());
    }

    let published = cluster.published().await.expect("seed published");
    for seed in &resolved {
        assert_eq!(seed, &published);
    }
    assert_eq!(cluster.elected().await.unwrap().uid, published.uid);
    assert_eq!(cluster.kv.writes(), 1);
}

#[tokio::test]
async fn fresh_cluster_leader_publishes_and_follower_adopts() {
    let cluster = Cluster::new();
    let cancel = CancellationToken::new();

    let follower = cluster.coordinator(Role::Follower);
    let follower_cancel = cancel.clone();
    let follower = tokio::spawn(async move { follower.resolve(&follower_cancel).await });

    let leader = cluster.coordinator(Role::Leader).resolve(&cancel).await.unwrap();
    let follower = tokio::time::timeout(PATIENCE, follower)
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    assert_eq!(follower.uid, leader.uid);
    assert_eq!(cluster.published().await.unwrap(), leader);
    assert_eq!(cluster.blobs.puts(), 1);
}

#[tokio::test]
async fn new_leader_adopts_existing_cluster() {
    let cluster = Cluster::new();
    let existing = ClusterSeed::new("abc", "0.9.0", t0());
    cluster.publish(&existing).await;

    let resolved = cluster
        .coordinator(Role::Leader)
        .resolve(&CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(resolved, existing);
    assert_eq!(cluster.blobs.puts(), 0);
    assert_eq!(cluster.kv.writes(), 0);
    assert_eq!(cluster.published().await.unwrap(), existing);
}

#[tokio::test]
async fn published_blob_wins_over_fresh_election() {
    let cluster = Cluster::new();
    let existing = ClusterSeed::new("abc", "0.9.0", t0());
    cluster.blobs.insert_raw(SEED_PATH, serde_json::to_vec(&existing).unwrap()).await;

    let resolved = cluster
        .coordinator(Role::Leader)
        .resolve(&CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(resolved, existing);
    assert_eq!(cluster.blobs.puts(), 0);
}

#[tokio::test]
async fn corrupt_blob_is_deleted_once_then_follower_waits_for_republish() {
    let cluster = Cluster::new();
    cluster.blobs.insert_raw(SEED_PATH, b"{not json".to_vec()).await;

    let follower = cluster.coordinator(Role::Follower);
    let cancel = CancellationToken::new();
    let follower_cancel = cancel.clone();
    let follower = tokio::spawn(async move { follower.resolve(&follower_cancel).await });

    let blobs = cluster.blobs.clone();
    eventually(|| {
        let blobs = blobs.clone();
        async move { blobs.deletes() == 1 }
    })
    .await;
    assert!(cluster.blobs.contents(SEED_PATH).await.is_none());

    // Give the follower a few more NotFound reads before the leader shows up.
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!follower.is_finished());

    let leader = cluster.coordinator(Role::Leader).resolve(&cancel).await.unwrap();
    let follower = tokio::time::timeout(PATIENCE, follower)
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    assert_eq!(follower.uid, leader.uid);
    assert_eq!(cluster.blobs.deletes(), 1);
}

#[tokio::test]
async fn leader_recovers_from_corrupt_blob() {
    let cluster = Cluster::new();
    cluster.blobs.insert_raw(SEED_PATH, b"\x00\x01garbage".to_vec()).await;

    let resolved = cluster
        .coordinator(Role::Leader)
        .resolve(&CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(cluster.blobs.deletes(), 1);
    assert_eq!(cluster.published().await.unwrap(), resolved);
}

#[tokio::test]
async fn leader_retries_through_coordination_outage() {
    let cluster = Cluster::new();
    cluster.kv.fail_next(3);

    let resolved = cluster
        .coordinator(Role::Leader)
        .resolve(&CancellationToken::new())
        .await
        .unwrap();

    assert!(cluster.kv.cas_calls() >= 4);
    assert_eq!(cluster.published().await.unwrap(), resolved);
}

#[tokio::test]
async fn leader_retries_failed_publish_with_the_same_seed() {
    let cluster = Cluster::new();
    cluster.blobs.fail_puts(2);

    let resolved = cluster
        .coordinator(Role::Leader)
        .resolve(&CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(cluster.blobs.puts(), 3);
    assert_eq!(cluster.published().await.unwrap(), resolved);
    assert_eq!(cluster.elected().await.unwrap().uid, resolved.uid);
}

#[tokio::test]
async fn follower_retries_through_read_errors() {
    let cluster = Cluster::new();
    let seed = ClusterSeed::new("abc", "1.0.0", t0());
    cluster.publish(&seed).await;
    cluster.blobs.fail_gets(3);

    let resolved = cluster
        .coordinator(Role::Follower)
        .resolve(&CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(resolved, seed);
    assert_eq!(cluster.blobs.gets(), 4);
    assert_eq!(cluster.blobs.deletes(), 0);
}

#[tokio::test]
async fn follower_never_writes() {
    let cluster = Cluster::new();
    let cancel = CancellationToken::new();

    let follower = cluster.coordinator(Role::Follower);
    let follower_cancel = cancel.clone();
    let handle = tokio::spawn(async move { follower.resolve(&follower_cancel).await });

    tokio::time::sleep(Duration::from_millis(30)).await;
    cancel.cancel();

    let err = tokio::time::timeout(PATIENCE, handle)
        .await
        .unwrap()
        .unwrap()
        .unwrap_err();
    assert!(matches!(err, BeaconError::Cancelled(_)));
    assert_eq!(cluster.kv.cas_calls(), 0);
    assert_eq!(cluster.blobs.puts(), 0);
}
