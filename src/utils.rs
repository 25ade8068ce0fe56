use std::future::Future;
use std::time::Duration;

use futures::FutureExt;
use tokio::select;
use tokio::task::JoinHandle;
use tracing::error;

use crate::shutdown::Shutdown;

/// Seconds since the UNIX epoch; the age assigned to ingested snapshots.
#[must_use]
pub fn unix_timestamp() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Spawns a future that will retry on failure with a backoff duration
///
/// The future will retry until it succeeds or a shutdown signal is received.
/// During a shutdown, the task is cancelled immediately, which aborts any
/// pending sleep and drops in-flight work (killing spawned subprocesses).
pub fn spawn_with_backoff_cancel_on_shutdown<S, F>(
    future_spawner: S,
    backoff_duration: Duration,
    shutdown: Shutdown,
) -> JoinHandle<()>
where
    F: Future<Output = anyhow::Result<()>> + Send + 'static,
    S: Fn() -> F + Send + Sync + 'static,
{
    // Run task in background, returning a handle.
    tokio::spawn(async move {
        select! {
            () = retry_future(future_spawner, backoff_duration) => {},
            () = shutdown.await_shutdown() => {},
        }
    })
}

async fn retry_future<S, F>(future_spawner: S, backoff_duration: Duration)
where
    F: Future<Output = anyhow::Result<()>> + Send + 'static,
    S: Fn() -> F + Send + Sync + 'static,
{
    loop {
        // Wrap in `AssertUnwindSafe` so we can call `FuturesExt::catch_unwind` on it.
        let future = std::panic::AssertUnwindSafe(future_spawner());

        match future.catch_unwind().await {
            Ok(Ok(())) => return,
            Ok(Err(error)) => error!("Task failed: {error:?}"),
            Err(panic) => error!("Task panicked: {panic:?}"),
        }

        tokio::time::sleep(backoff_duration).await;
    }
}
