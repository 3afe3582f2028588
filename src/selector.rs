use std::sync::Arc;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tracing::debug;

use crate::{EmotionLabel, TrackCatalog, TrackItem};

/// Picks one track uniformly at random from the catalog entry of a label.
pub struct TrackSelector {
    catalog: Arc<dyn TrackCatalog>,
    rng: StdRng,
}

impl TrackSelector {
    pub fn new(catalog: Arc<dyn TrackCatalog>) -> Self {
        Self {
            catalog,
            rng: StdRng::from_entropy(),
        }
    }

    /// Use a deterministic random source.
    pub fn with_seed(catalog: Arc<dyn TrackCatalog>, seed: u64) -> Self {
        Self {
            catalog,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Returns `Ok(None)` when the catalog has nothing for `label`; the
    /// caller must then leave playback alone.
    pub async fn select(&mut self, label: &EmotionLabel) -> anyhow::Result<Option<TrackItem>> {
        if label.is_unknown() {
            return Ok(None);
        }
        let items = self.catalog.items_for(label).await?;
        let choice = items.choose(&mut self.rng).cloned();
        debug!(%label, candidates = items.len(), choice = ?choice.as_ref().map(|t| &t.display_name), "track selected");
        Ok(choice)
    }
}
