use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use crate::{Frame, FrameSource};

/// Grabs a single encoded frame per call by running a capture command and
/// reading its stdout, e.g. `ffmpeg ... -frames:v 1 -f mjpeg -`.
///
/// A failing or silent command means "no frame right now".
pub struct CommandFrameSource {
    program: String,
    args: Vec<String>,
    released: AtomicBool,
}

impl CommandFrameSource {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            released: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl FrameSource for CommandFrameSource {
    async fn next_frame(&self) -> Option<Frame> {
        if self.released.load(Ordering::SeqCst) {
            return None;
        }
        let output = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await;
        match output {
            Ok(out) if out.status.success() && !out.stdout.is_empty() => {
                Some(Frame::new(out.stdout))
            }
            Ok(out) => {
                debug!(status = ?out.status, bytes = out.stdout.len(), "capture produced no frame");
                None
            }
            Err(e) => {
                debug!(?e, program = %self.program, "capture command failed");
                None
            }
        }
    }

    async fn release(&self) {
        if !self.released.swap(true, Ordering::SeqCst) {
            info!(program = %self.program, "camera released");
        }
    }
}
