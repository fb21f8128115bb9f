//! Integration tests against a real Redis server.

use rlock_core::prelude::*;
use rlock_redis::RedisLockStore;
use std::sync::Arc;
use std::time::Duration;

/// Helper to get Redis URL from environment or use default.
fn get_redis_url() -> String {
    std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string())
}

async fn client() -> LockClient<RedisLockStore> {
    let store = RedisLockStore::builder()
        .url(get_redis_url())
        .key_prefix("rlock-test:")
        .build()
        .await
        .unwrap();
    LockClient::new(store)
}

#[tokio::test]
#[ignore] // Requires Redis server running
async fn test_exclusive_lock_acquisition() {
    let client = client().await;
    let lease = Duration::from_secs(60);

    let handle1 = client.try_lock("job-7", lease, None).await.unwrap();

    // Second acquisition should fail (lock is held)
    let handle2 = client.try_lock("job-7", lease, None).await;
    assert!(matches!(handle2, Err(LockError::Contended { .. })));

    handle1.unlock(None).await.unwrap();

    // Now acquisition should succeed
    let handle3 = client.try_lock("job-7", lease, None).await.unwrap();
    handle3.unlock(None).await.unwrap();
}

#[tokio::test]
#[ignore] // Requires Redis server running
async fn test_retrying_lock_waits_for_release() {
    let client = client().await;
    let lease = Duration::from_secs(60);
    let holder = client.try_lock("test-blocking", lease, None).await.unwrap();

    let waiter_client = client.clone();
    let waiter = tokio::spawn(async move {
        waiter_client
            .lock(
                "test-blocking",
                lease,
                FixedIntervalRetry::new(Duration::from_millis(50), 40),
                Duration::from_secs(1),
                never_cancelled(),
            )
            .await
    });

    tokio::time::sleep(Duration::from_millis(120)).await;
    holder.unlock(None).await.unwrap();

    let lock = tokio::time::timeout(Duration::from_secs(3), waiter)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    lock.unlock(None).await.unwrap();
}

#[tokio::test]
#[ignore] // Requires Redis server running
async fn test_lock_expiry_and_refresh() {
    let client = client().await;
    let lock = client
        .try_lock("test-expiry", Duration::from_millis(300), None)
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;
    lock.refresh(None).await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    // Refreshed, so still held past the original lease
    let contender = client.try_lock("test-expiry", Duration::from_millis(300), None).await;
    assert!(matches!(contender, Err(LockError::Contended { .. })));

    tokio::time::sleep(Duration::from_millis(400)).await;
    let result = lock.refresh(None).await;
    assert!(matches!(result, Err(LockError::NotHeld { .. })));
}

#[tokio::test]
#[ignore] // Requires Redis server running
async fn test_auto_refresh_outlives_lease() {
    let client = client().await;
    let lock = Arc::new(
        client
            .try_lock("test-auto-refresh", Duration::from_millis(300), None)
            .await
            .unwrap(),
    );
    let daemon = lock.spawn_auto_refresh(Duration::from_millis(100), Duration::from_millis(100));

    tokio::time::sleep(Duration::from_secs(1)).await;
    let contender = client
        .try_lock("test-auto-refresh", Duration::from_millis(300), None)
        .await;
    assert!(matches!(contender, Err(LockError::Contended { .. })));

    lock.unlock(None).await.unwrap();
    daemon.await.unwrap().unwrap();
}
