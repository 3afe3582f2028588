use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Folder holding one sub-folder per emotion.
    pub root: PathBuf,
    pub extensions: Vec<String>,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("songs"),
            extensions: vec!["mp3".into(), "m4a".into()],
        }
    }
}

/// An external program; the per-call argument (if any) is appended.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CommandConfig {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

fn default_player() -> CommandConfig {
    CommandConfig {
        program: "ffplay".into(),
        args: ["-nodisp", "-autoexit", "-loglevel", "quiet"]
            .map(String::from)
            .to_vec(),
    }
}

fn default_capture() -> CommandConfig {
    CommandConfig {
        program: "ffmpeg".into(),
        args: [
            "-loglevel", "quiet", "-f", "v4l2", "-i", "/dev/video0", "-frames:v", "1", "-f",
            "mjpeg", "-",
        ]
        .map(String::from)
        .to_vec(),
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub socket: PathBuf,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            socket: PathBuf::from("/run/moodplay/classifier.sock"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub period_ms: u64,
    pub no_frame_backoff_ms: u64,
    pub classify_timeout_ms: u64,
    pub queue_capacity: usize,
    pub shutdown_grace_ms: u64,
    pub catalog: CatalogConfig,
    pub player: CommandConfig,
    pub capture: CommandConfig,
    pub classifier: ClassifierConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            period_ms: 2000,
            no_frame_backoff_ms: 200,
            classify_timeout_ms: 10_000,
            queue_capacity: 4,
            shutdown_grace_ms: 5000,
            catalog: CatalogConfig::default(),
            player: default_player(),
            capture: default_capture(),
            classifier: ClassifierConfig::default(),
        }
    }
}

impl Config {
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }

    pub fn no_frame_backoff(&self) -> Duration {
        Duration::from_millis(self.no_frame_backoff_ms)
    }

    pub fn classify_timeout(&self) -> Duration {
        Duration::from_millis(self.classify_timeout_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

/// Load a [`Config`] from a TOML file.
///
/// # Examples
///
/// ```no_run
/// use moodplay::config::load;
/// # tokio_test::block_on(async {
/// let cfg = load("moodplay.toml").await.unwrap();
/// assert!(cfg.period_ms > 0);
/// # });
/// ```
pub async fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
    let text = tokio::fs::read_to_string(path).await?;
    Ok(toml::from_str(&text)?)
}

/// Like [`load`], but a missing file yields the defaults.
pub async fn load_or_default<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
    match tokio::fs::try_exists(path.as_ref()).await {
        Ok(true) => load(path).await,
        _ => Ok(Config::default()),
    }
}
