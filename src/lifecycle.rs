//! Process-wide running flag and ordered teardown.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{FrameSource, PlaybackController};

/// Shared "keep going" flag. Starts `true`; cleared once by [`Lifecycle`].
///
/// Readers poll [`is_running`](Self::is_running) on every iteration or await
/// [`stopped`](Self::stopped) to wake as soon as it is cleared.
#[derive(Clone, Debug)]
pub struct RunningFlag {
    tx: Arc<watch::Sender<bool>>,
}

impl RunningFlag {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(true);
        Self { tx: Arc::new(tx) }
    }

    pub fn is_running(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn stop(&self) {
        self.tx.send_replace(false);
    }

    /// Resolves once the flag has been cleared.
    pub async fn stopped(&self) {
        let mut rx = self.tx.subscribe();
        let _ = rx.wait_for(|running| !*running).await;
    }
}

impl Default for RunningFlag {
    fn default() -> Self {
        Self::new()
    }
}

/// Owns everything that must be torn down on exit.
pub struct Lifecycle {
    running: RunningFlag,
    playback: PlaybackController,
    frames: Arc<dyn FrameSource>,
    sensing: Option<JoinHandle<()>>,
    grace: Duration,
}

impl Lifecycle {
    pub fn new(
        running: RunningFlag,
        playback: PlaybackController,
        frames: Arc<dyn FrameSource>,
        sensing: JoinHandle<()>,
    ) -> Self {
        Self {
            running,
            playback,
            frames,
            sensing: Some(sensing),
            grace: Duration::from_secs(5),
        }
    }

    /// How long [`shutdown`](Self::shutdown) waits for the sensing loop.
    pub fn grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Clear the flag, stop playback, release the frame source, then wait for
    /// the sensing loop to leave at its next cycle boundary.
    ///
    /// Playback must be closed before the camera is released.
    pub async fn shutdown(mut self) -> anyhow::Result<()> {
        info!("shutting down");
        self.running.stop();
        self.playback.close().await;
        self.frames.release().await;
        debug!("frame source released");

        if let Some(handle) = self.sensing.take() {
            match tokio::time::timeout(self.grace, handle).await {
                Ok(Ok(())) => debug!("sensing loop joined"),
                Ok(Err(e)) => warn!(?e, "sensing loop ended abnormally"),
                Err(_) => warn!(grace = ?self.grace, "sensing loop still busy; detaching"),
            }
        }
        info!("shutdown complete");
        Ok(())
    }
}

/// Waits for either `Ctrl+C` or `SIGTERM` (on Unix).
pub async fn shutdown_signal() -> anyhow::Result<()> {
    debug!("awaiting shutdown signal");
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut term = signal(SignalKind::terminate())?;
        tokio::select! {
            res = tokio::signal::ctrl_c() => res?,
            _ = term.recv() => {},
        }
    }
    #[cfg(not(unix))]
    tokio::signal::ctrl_c().await?;
    debug!("shutdown signal received");
    Ok(())
}
