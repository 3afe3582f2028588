use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::watch;
use tracing::info;

use crate::RunningFlag;

pub const DETECTING: &str = "Detecting Emotion...";
pub const INITIALIZING: &str = "Initializing Music...";

/// Passive consumer of human readable status lines.
///
/// Publishing never blocks and never fails as far as the caller can tell.
pub trait DisplaySink: Send + Sync {
    fn publish(&self, status: &str, track: &str);
}

/// Latest published status pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub emotion: String,
    pub track: String,
}

impl Default for Status {
    fn default() -> Self {
        Self {
            emotion: DETECTING.into(),
            track: INITIALIZING.into(),
        }
    }
}

/// Display sink keeping only the newest [`Status`] for readers.
pub struct StatusBoard {
    tx: watch::Sender<Status>,
}

impl StatusBoard {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(Status::default());
        Self { tx }
    }

    pub fn subscribe(&self) -> watch::Receiver<Status> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> Status {
        self.tx.borrow().clone()
    }
}

impl Default for StatusBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl DisplaySink for StatusBoard {
    fn publish(&self, status: &str, track: &str) {
        self.tx.send_replace(Status {
            emotion: status.to_string(),
            track: track.to_string(),
        });
    }
}

/// Display sink that writes every publication to the log.
pub struct LogDisplay;

impl DisplaySink for LogDisplay {
    fn publish(&self, status: &str, track: &str) {
        info!(target: "moodplay::status", %status, %track);
    }
}

/// Fans one publication out to several sinks.
impl<S: DisplaySink> DisplaySink for Vec<S> {
    fn publish(&self, status: &str, track: &str) {
        for sink in self {
            sink.publish(status, track);
        }
    }
}

impl<S: DisplaySink + ?Sized> DisplaySink for Box<S> {
    fn publish(&self, status: &str, track: &str) {
        (**self).publish(status, track)
    }
}

impl<S: DisplaySink + ?Sized> DisplaySink for std::sync::Arc<S> {
    fn publish(&self, status: &str, track: &str) {
        (**self).publish(status, track)
    }
}

/// Render status changes to `out` until `running` is cleared.
///
/// Only reads the board; it never feeds anything back into the pipeline.
pub async fn render_status<W: AsyncWrite + Unpin>(
    mut rx: watch::Receiver<Status>,
    running: RunningFlag,
    mut out: W,
) -> std::io::Result<()> {
    loop {
        let status = rx.borrow_and_update().clone();
        let line = format!("{} | {}\n", status.emotion, status.track);
        out.write_all(line.as_bytes()).await?;
        out.flush().await?;
        tokio::select! {
            changed = rx.changed() => if changed.is_err() { break },
            _ = running.stopped() => break,
        }
    }
    Ok(())
}
