//! Example: Using Redis distributed locks
//!
//! Run with: `cargo run -p rlock --example redis_lock`
//!
//! Requires a Redis server. Set REDIS_URL environment variable
//! or modify the URL below.

use rlock::*;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // Get Redis URL from environment or use default
    let redis_url =
        std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());

    println!("Connecting to Redis...");
    let store = RedisLockStore::builder()
        .url(&redis_url)
        .key_prefix("rlock:")
        .build()
        .await?;
    let client = LockClient::new(store);

    // Best effort: one attempt
    let lease = Duration::from_secs(10);
    let lock = Arc::new(client.try_lock("example-resource", lease, None).await?);
    println!("Lock acquired with token {}", lock.token());

    match client.try_lock("example-resource", lease, None).await {
        Err(LockError::Contended { key }) => println!("Second try_lock on {key} is contended"),
        other => println!("Unexpected: {other:?}"),
    }

    // Renew every 3 seconds while working
    let daemon = lock.spawn_auto_refresh(Duration::from_secs(3), Duration::from_millis(500));
    println!("Doing long-running work...");
    tokio::time::sleep(Duration::from_secs(15)).await;
    println!("Work completed");

    lock.unlock(Some(Duration::from_secs(1))).await?;
    daemon.await??;
    println!("Lock released");

    // Retrying acquisition with backoff, cancellable with Ctrl-C
    let (cancel, cancel_receiver) = cancel_signal();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.send_replace(true);
        }
    });
    let retry = ExponentialBackoffRetry::new(Duration::from_millis(50), Duration::from_secs(1), 8)
        .with_jitter();
    let lock = client
        .lock("example-resource", lease, retry, Duration::from_millis(500), cancel_receiver)
        .await?;
    println!("Re-acquired with backoff");
    lock.unlock(None).await?;

    Ok(())
}
