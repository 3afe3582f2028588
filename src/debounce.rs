use crate::{ClassificationSample, EmotionLabel, SampleError};

/// A confirmed change of the accepted emotion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    /// `None` when nothing had been accepted yet.
    pub from: Option<EmotionLabel>,
    pub to: EmotionLabel,
}

/// Suppresses repeated labels so only genuine changes propagate.
///
/// Inconclusive input ([`EmotionLabel::Unknown`] or any [`SampleError`]) is
/// absorbed: the previously accepted emotion stays in force and no event is
/// emitted, so a failed classification never interrupts playback.
#[derive(Debug, Default)]
pub struct DebounceTracker {
    last_accepted: Option<EmotionLabel>,
}

impl DebounceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_accepted(&self) -> Option<&EmotionLabel> {
        self.last_accepted.as_ref()
    }

    pub fn observe(&mut self, label: &EmotionLabel) -> Option<ChangeEvent> {
        if label.is_unknown() || self.last_accepted.as_ref() == Some(label) {
            return None;
        }
        let from = self.last_accepted.replace(label.clone());
        Some(ChangeEvent {
            from,
            to: label.clone(),
        })
    }

    /// Undo `change` so the same label is reported again next time. No-op if
    /// another label was accepted since.
    pub fn revert(&mut self, change: &ChangeEvent) {
        if self.last_accepted.as_ref() == Some(&change.to) {
            self.last_accepted = change.from.clone();
        }
    }

    pub fn observe_sample(
        &mut self,
        sample: &Result<ClassificationSample, SampleError>,
    ) -> Option<ChangeEvent> {
        match sample {
            Ok(sample) => self.observe(&sample.label),
            Err(_) => None,
        }
    }
}
