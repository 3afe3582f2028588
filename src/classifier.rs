use std::path::PathBuf;

use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tracing::trace;

use crate::{EmotionClassifier, Frame};

const NO_FACES: &str = "(no faces detected)";

/// Client for a face-analysis daemon listening on a Unix socket.
///
/// One connection per frame: the raw image is written, the write half is
/// shut down and the reply is read to EOF. The reply is either a plain label
/// line or JSON carrying `dominant_emotion`.
pub struct SocketClassifier {
    socket: PathBuf,
}

impl SocketClassifier {
    pub fn new(socket: impl Into<PathBuf>) -> Self {
        Self {
            socket: socket.into(),
        }
    }
}

#[derive(Deserialize)]
struct Analysis {
    dominant_emotion: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Reply {
    One(Analysis),
    Many(Vec<Analysis>),
}

/// Extract the label from a daemon reply.
fn parse_reply(reply: &str) -> anyhow::Result<String> {
    let reply = reply.trim();
    if reply.is_empty() || reply == NO_FACES {
        anyhow::bail!("no face detected");
    }
    if reply.starts_with('{') || reply.starts_with('[') {
        let parsed: Reply = serde_json::from_str(reply).context("malformed analysis")?;
        return match parsed {
            Reply::One(a) => Ok(a.dominant_emotion),
            Reply::Many(list) => list
                .into_iter()
                .next()
                .map(|a| a.dominant_emotion)
                .context("empty analysis list"),
        };
    }
    Ok(reply.lines().next().unwrap_or_default().trim().to_string())
}

#[async_trait]
impl EmotionClassifier for SocketClassifier {
    async fn classify(&self, frame: &Frame) -> anyhow::Result<String> {
        let mut stream = UnixStream::connect(&self.socket)
            .await
            .with_context(|| format!("connect {}", self.socket.display()))?;
        stream.write_all(frame.bytes()).await?;
        stream.shutdown().await?;
        let mut reply = String::new();
        stream.read_to_string(&mut reply).await?;
        trace!(%reply, "classifier reply");
        parse_reply(&reply)
    }
}
