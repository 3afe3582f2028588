use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use tracing_subscriber::filter::LevelFilter;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

/// `moodplay` — plays music that matches the listener's facial expression
#[derive(Parser, Debug)]
#[command(name = "moodplay", version, about = "Emotion-driven music player")]
pub struct Cli {
    /// Path to the TOML configuration; defaults apply when it is missing
    #[arg(long, default_value = "moodplay.toml", env = "MOODPLAY_CONFIG")]
    pub config: PathBuf,

    /// Folder with one sub-folder of tracks per emotion
    #[arg(long)]
    pub songs: Option<PathBuf>,

    /// Unix socket of the face analysis daemon
    #[arg(long)]
    pub classifier_socket: Option<PathBuf>,

    /// Logging verbosity level
    #[arg(long, default_value = "info")]
    pub log_level: LogLevel,

    /// Do not print the live status line
    #[arg(short, long)]
    pub quiet: bool,
}

impl Cli {
    /// Apply command line overrides on top of a loaded configuration.
    pub fn apply(&self, config: &mut crate::Config) {
        if let Some(songs) = &self.songs {
            config.catalog.root = songs.clone();
        }
        if let Some(socket) = &self.classifier_socket {
            config.classifier.socket = socket.clone();
        }
    }
}
