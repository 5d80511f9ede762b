use dispatchnet::base::dispatcherror::PoolError;
use dispatchnet::socket::pool::{ConnectionPool, DestinationKey};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn dest(host: &str) -> DestinationKey {
    DestinationKey::new("http", host, 80)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_caps_hold_under_contention() {
    let pool = ConnectionPool::new(6, 2).unwrap();
    let hosts = ["a.test", "b.test", "c.test", "d.test"];
    let over_cap = Arc::new(AtomicUsize::new(0));

    let mut tasks = Vec::new();
    for i in 0..200 {
        let pool = pool.clone();
        let over_cap = Arc::clone(&over_cap);
        let destination = dest(hosts[i % hosts.len()]);
        tasks.push(tokio::spawn(async move {
            let lease = pool.acquire(&destination).await;
            if pool.active_for(&destination) > 2 || pool.active_count() > 6 {
                over_cap.fetch_add(1, Ordering::SeqCst);
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
            drop(lease);
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let stats = pool.stats();
    assert_eq!(over_cap.load(Ordering::SeqCst), 0);
    assert!(stats.peak_total <= 6);
    assert!(stats.peak_per_destination() <= 2);
    assert_eq!(stats.total_active, 0);
    assert_eq!(stats.pending, 0);
}

#[tokio::test]
async fn test_single_destination_with_equal_caps_does_not_deadlock() {
    let pool = ConnectionPool::new(4, 4).unwrap();
    let destination = dest("only.test");

    let mut tasks = Vec::new();
    for _ in 0..50 {
        let pool = pool.clone();
        let destination = destination.clone();
        tasks.push(tokio::spawn(async move {
            let _lease = pool.acquire(&destination).await;
            tokio::task::yield_now().await;
        }));
    }

    let all = futures::future::join_all(tasks);
    let results = tokio::time::timeout(Duration::from_secs(5), all).await.expect("pool deadlocked");
    assert!(results.iter().all(|r| r.is_ok()));
    assert_eq!(pool.stats().peak_total, 4);
}

#[tokio::test]
async fn test_double_release_keeps_other_counters() {
    let pool = ConnectionPool::new(4, 4).unwrap();
    let destination = dest("x.test");
    let first = pool.acquire(&destination).await;
    let second = pool.acquire(&destination).await;

    pool.release(&first).unwrap();
    assert_eq!(pool.release(&first), Err(PoolError::DoubleRelease { lease: first.id() }));
    assert_eq!(pool.active_for(&destination), 1);
    assert!(!second.is_released());

    drop(first);
    assert_eq!(pool.active_count(), 1);
    pool.release(&second).unwrap();
    assert_eq!(pool.active_count(), 0);
}

#[tokio::test]
async fn test_acquire_timeout_then_immediate_acquire() {
    let pool = ConnectionPool::new(1, 1).unwrap();
    let destination = dest("slow.test");
    let held = pool.acquire(&destination).await;

    let err = pool.acquire_timeout(&destination, Duration::from_millis(20)).await.unwrap_err();
    assert!(matches!(err, PoolError::AcquireTimeout { .. }));
    assert_eq!(pool.pending_count(), 0, "timed out waiter must not linger");

    drop(held);
    let lease = tokio::time::timeout(Duration::from_millis(100), pool.acquire(&destination))
        .await
        .expect("slot should be free right away");
    assert_eq!(pool.active_count(), 1);
    drop(lease);
}

#[tokio::test]
async fn test_busy_destination_does_not_block_others() {
    let pool = ConnectionPool::new(4, 1).unwrap();
    let busy = dest("busy.test");
    let _held = pool.acquire(&busy).await;

    let queued = {
        let pool = pool.clone();
        let busy = busy.clone();
        tokio::spawn(async move { pool.acquire(&busy).await })
    };
    tokio::task::yield_now().await;

    let other = tokio::time::timeout(Duration::from_millis(100), pool.acquire(&dest("idle.test"))).await;
    assert!(other.is_ok());
    queued.abort();
}
