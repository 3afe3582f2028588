use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, trace};

use crate::EmotionLabel;

/// Raw encoded image bytes handed from a [`FrameSource`] to a classifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame(Vec<u8>);

impl Frame {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Supplies video frames on demand.
#[async_trait]
pub trait FrameSource: Send + Sync {
    /// Grab the next frame. `None` means no frame is available right now.
    async fn next_frame(&self) -> Option<Frame>;

    /// Release the underlying device. Later calls to
    /// [`next_frame`](Self::next_frame) return `None`.
    async fn release(&self);
}

/// Turns a frame into a raw emotion label.
#[async_trait]
pub trait EmotionClassifier: Send + Sync {
    async fn classify(&self, frame: &Frame) -> anyhow::Result<String>;
}

/// Why a sensing cycle produced no label.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SampleError {
    #[error("no frame available")]
    NoFrame,
    #[error("classification failed: {0}")]
    ClassifierFailed(String),
}

/// One successful classification.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationSample {
    pub label: EmotionLabel,
    pub timestamp: DateTime<Utc>,
}

/// Classification adapter: one frame in, one label (or typed failure) out.
///
/// Underlying classifier errors are reduced to
/// [`SampleError::ClassifierFailed`] so callers decide whether to absorb them.
pub struct Sampler {
    frames: Arc<dyn FrameSource>,
    classifier: Arc<dyn EmotionClassifier>,
    timeout: Option<Duration>,
}

impl Sampler {
    pub fn new(frames: Arc<dyn FrameSource>, classifier: Arc<dyn EmotionClassifier>) -> Self {
        Self {
            frames,
            classifier,
            timeout: None,
        }
    }

    /// Bound every classification call by `timeout`.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub async fn sample(&self) -> Result<ClassificationSample, SampleError> {
        let frame = self.frames.next_frame().await.ok_or(SampleError::NoFrame)?;
        trace!(bytes = frame.bytes().len(), "frame captured");

        let answer = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, self.classifier.classify(&frame))
                .await
                .map_err(|_| SampleError::ClassifierFailed(format!("timed out after {limit:?}")))?,
            None => self.classifier.classify(&frame).await,
        };
        let raw = answer.map_err(|e| {
            debug!(?e, "classifier failed");
            SampleError::ClassifierFailed(e.to_string())
        })?;

        match EmotionLabel::normalize(&raw) {
            EmotionLabel::Unknown => Err(SampleError::ClassifierFailed(format!(
                "inconclusive answer {raw:?}"
            ))),
            label => Ok(ClassificationSample {
                label,
                timestamp: Utc::now(),
            }),
        }
    }
}
