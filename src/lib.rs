//! Core of the `moodplay` emotion-driven music player.
//!
//! A [`SensingLoop`] samples the listener's facial emotion through a
//! [`Sampler`], debounces it with a [`DebounceTracker`], picks a track with a
//! [`TrackSelector`] and hands it to the single-slot [`PlaybackController`].
//! [`Lifecycle`] tears everything down in order.

mod backend;
mod cadence;
mod catalog;
#[cfg(unix)]
mod classifier;
mod debounce;
mod label;
mod lifecycle;
mod playback;
mod sampler;
mod selector;
mod sensing;

pub mod capture;
pub mod cli;
pub mod config;
pub mod status;

pub use backend::{BackendError, MediaBackend, ProcessBackend};
pub use cadence::{Cadence, SleepCadence, StepCadence, Stepper};
pub use capture::CommandFrameSource;
pub use catalog::{DirCatalog, MemoryCatalog, TrackCatalog, TrackItem};
#[cfg(unix)]
pub use classifier::SocketClassifier;
pub use config::Config;
pub use debounce::{ChangeEvent, DebounceTracker};
pub use label::EmotionLabel;
pub use lifecycle::{Lifecycle, RunningFlag, shutdown_signal};
pub use playback::{PlaybackController, PlaybackError, PlaybackEvent, PlaybackState};
pub use sampler::{ClassificationSample, EmotionClassifier, Frame, FrameSource, SampleError, Sampler};
pub use selector::TrackSelector;
pub use sensing::{CycleOutcome, SensingLoop};
pub use status::{DisplaySink, LogDisplay, Status, StatusBoard};
