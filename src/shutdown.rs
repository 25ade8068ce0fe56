use tokio::sync::watch;
use tracing::{error, info};

/// Cloneable handle used to trigger and observe process shutdown.
#[derive(Debug, Clone)]
pub struct Shutdown {
    sender: watch::Sender<bool>,
}

impl Shutdown {
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self { sender }
    }

    /// Send the signal to shutdown the program.
    pub fn shutdown(&self) {
        self.sender.send_replace(true);
    }

    /// Are we currently shutting down?
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        *self.sender.borrow()
    }

    /// Wait for the program to shutdown.
    ///
    /// Resolves immediately if the program is already shutting down.
    /// The resulting future is safe to cancel by dropping.
    pub async fn await_shutdown(&self) {
        let mut watch = self.sender.subscribe();
        if *watch.borrow_and_update() {
            return;
        }
        // Does not fail because we hold the sender.
        watch.changed().await.unwrap();
    }

    /// Translate SIGINT/SIGTERM (Ctrl-C elsewhere) into the shutdown signal.
    pub fn spawn_signal_handler(&self) {
        let this = self.clone();
        tokio::spawn(async move {
            if let Err(err) = signal_shutdown().await {
                error!("Error handling shutdown signal: {err}");
            }
            this.shutdown();
        });
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
async fn signal_shutdown() -> anyhow::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let sigint = signal(SignalKind::interrupt())?;
    let sigterm = signal(SignalKind::terminate())?;
    tokio::pin!(sigint);
    tokio::pin!(sigterm);
    tokio::select! {
        _ = sigint.recv() => { info!("SIGINT received, shutting down"); }
        _ = sigterm.recv() => { info!("SIGTERM received, shutting down"); }
    };
    Ok(())
}

#[cfg(not(unix))]
async fn signal_shutdown() -> anyhow::Result<()> {
    use tokio::signal::ctrl_c;

    ctrl_c().await?;
    info!("Ctrl-C received, shutting down");
    Ok(())
}
