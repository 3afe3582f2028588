use std::process::Stdio;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::{Child, Command};
use tracing::{debug, info};

use crate::TrackItem;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("failed to launch player `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{0}")]
    Other(String),
}

/// Starts and stops playback of a single [`TrackItem`].
///
/// `stop` consumes the handle, so a handle can only be released once.
#[async_trait]
pub trait MediaBackend: Send + Sync + 'static {
    type Handle: Send + 'static;

    async fn start(&self, item: &TrackItem) -> Result<Self::Handle, BackendError>;

    async fn stop(&self, handle: Self::Handle);
}

/// Plays each track in an external player process.
///
/// The track path is appended after `args`. The child is killed on stop and
/// on drop.
#[derive(Debug, Clone)]
pub struct ProcessBackend {
    program: String,
    args: Vec<String>,
}

impl ProcessBackend {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

#[async_trait]
impl MediaBackend for ProcessBackend {
    type Handle = Child;

    async fn start(&self, item: &TrackItem) -> Result<Child, BackendError> {
        let child = Command::new(&self.program)
            .args(&self.args)
            .arg(&item.path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| BackendError::Spawn {
                program: self.program.clone(),
                source,
            })?;
        info!(player = %self.program, pid = ?child.id(), track = %item.display_name, "player started");
        Ok(child)
    }

    async fn stop(&self, mut child: Child) {
        let pid = child.id();
        // kill() also reaps the process
        if let Err(e) = child.kill().await {
            debug!(?e, ?pid, "player already gone");
        }
        debug!(?pid, "player stopped");
    }
}
