use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::EmotionLabel;

/// A playable media item.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TrackItem {
    pub path: PathBuf,
    pub display_name: String,
}

impl TrackItem {
    /// Create an item whose display name is the file name of `path`.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let display_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self { path, display_name }
    }
}

/// Maps an emotion to candidate tracks. No ordering is guaranteed.
#[async_trait]
pub trait TrackCatalog: Send + Sync {
    async fn items_for(&self, label: &EmotionLabel) -> anyhow::Result<Vec<TrackItem>>;
}

/// Catalog backed by a directory per emotion: `<root>/<Label>/<track>`.
///
/// Only files whose extension is in the allow list are returned. A missing
/// label directory is an empty catalog, not an error.
pub struct DirCatalog {
    root: PathBuf,
    extensions: Vec<String>,
}

impl DirCatalog {
    pub fn new(root: impl Into<PathBuf>, extensions: Vec<String>) -> Self {
        Self {
            root: root.into(),
            extensions: extensions
                .into_iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
        }
    }

    fn accepts(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| self.extensions.iter().any(|x| x.eq_ignore_ascii_case(e)))
            .unwrap_or(false)
    }
}

#[async_trait]
impl TrackCatalog for DirCatalog {
    async fn items_for(&self, label: &EmotionLabel) -> anyhow::Result<Vec<TrackItem>> {
        let dir = self.root.join(label.as_str());
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(dir = %dir.display(), "no track folder");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };
        let mut items = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !self.accepts(&path) {
                continue;
            }
            // follows symlinks; dangling links are skipped
            match tokio::fs::metadata(&path).await {
                Ok(meta) if meta.is_file() => items.push(TrackItem::from_path(path)),
                Ok(_) => {}
                Err(e) => debug!(path = %path.display(), error = %e, "unreadable entry skipped"),
            }
        }
        debug!(dir = %dir.display(), count = items.len(), "scanned track folder");
        Ok(items)
    }
}

/// Fixed in-memory catalog.
#[derive(Debug, Default, Clone)]
pub struct MemoryCatalog {
    tracks: HashMap<EmotionLabel, Vec<TrackItem>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, label: EmotionLabel, items: Vec<TrackItem>) -> Self {
        self.tracks.insert(label, items);
        self
    }
}

#[async_trait]
impl TrackCatalog for MemoryCatalog {
    async fn items_for(&self, label: &EmotionLabel) -> anyhow::Result<Vec<TrackItem>> {
        Ok(self.tracks.get(label).cloned().unwrap_or_default())
    }
}
