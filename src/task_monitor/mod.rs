use std::sync::Arc;
use std::time::Duration;

use futures::stream::FuturesUnordered;
use futures::StreamExt;
use tokio::select;
use tokio::task::JoinHandle;
use tracing::{error, info, instrument, warn};

use crate::app::App;
use crate::shutdown::Shutdown;
use crate::utils;

pub mod tasks;

const REFRESH_BACKOFF: Duration = Duration::from_secs(5);

/// A task manager for all long running tasks
///
/// It's assumed that there is only one instance at a time per app.
pub struct TaskMonitor;

impl TaskMonitor {
    /// Spawn one refresh task per configured scraper source and a supervisor
    /// that turns a task panic into a process-wide shutdown.
    #[instrument(level = "debug", skip_all)]
    pub async fn init(main_app: Arc<App>, shutdown: Shutdown) {
        let handles = FuturesUnordered::new();

        for source in main_app.config.scrapers.clone() {
            let app = main_app.clone();
            let refresh = move || tasks::refresh::refresh(app.clone(), source.clone());
            let handle =
                utils::spawn_with_backoff_cancel_on_shutdown(refresh, REFRESH_BACKOFF, shutdown.clone());
            handles.push(handle);
        }

        if handles.is_empty() {
            info!("no scraper sources configured");
            return;
        }

        tokio::spawn(Self::monitor_shutdown(handles, shutdown));
    }

    async fn monitor_shutdown(mut handles: FuturesUnordered<JoinHandle<()>>, shutdown: Shutdown) {
        select! {
            // Wait for the shutdown signal
            () = shutdown.await_shutdown() => {}
            // Or wait for a task to panic
            () = Self::await_task_panic(&mut handles, shutdown.clone()) => {}
        }
    }

    async fn await_task_panic(handles: &mut FuturesUnordered<JoinHandle<()>>, shutdown: Shutdown) {
        while let Some(result) = handles.next().await {
            if !shutdown.is_shutting_down() {
                match result {
                    Ok(()) => {
                        info!("task exited");
                    }
                    Err(error) => {
                        error!(?error, "task panicked");
                        // Instruct the rest of the app to shutdown
                        shutdown.shutdown();
                        return;
                    }
                }
            }
        }
        warn!("all tasks have returned unexpectedly");
    }
}
