use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::status::INITIALIZING;
use crate::{
    Cadence, ChangeEvent, DebounceTracker, DisplaySink, EmotionLabel, PlaybackController,
    PlaybackEvent, PlaybackState, RunningFlag, SampleError, Sampler, SleepCadence, TrackItem,
    TrackSelector,
};

/// What one sensing cycle observed and did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleOutcome {
    /// Label shown in the status line.
    pub label: EmotionLabel,
    pub no_frame: bool,
    pub change: Option<ChangeEvent>,
    /// Track handed to the playback controller this cycle.
    pub dispatched: Option<TrackItem>,
}

/// Dedicated worker turning classifications into playback changes.
///
/// Each cycle: sample, debounce, on change select and dispatch a track,
/// publish one status line, then wait for the cadence.
pub struct SensingLoop {
    sampler: Sampler,
    tracker: DebounceTracker,
    selector: TrackSelector,
    playback: PlaybackController,
    events: broadcast::Receiver<PlaybackEvent>,
    display: Arc<dyn DisplaySink>,
    running: RunningFlag,
    cadence: Box<dyn Cadence>,
    period: Duration,
    no_frame_backoff: Duration,
    track_line: String,
    shown: Option<TrackItem>,
}

impl SensingLoop {
    pub fn new(
        sampler: Sampler,
        selector: TrackSelector,
        playback: PlaybackController,
        display: Arc<dyn DisplaySink>,
        running: RunningFlag,
    ) -> Self {
        let events = playback.subscribe();
        Self {
            sampler,
            tracker: DebounceTracker::new(),
            selector,
            playback,
            events,
            display,
            running,
            cadence: Box::new(SleepCadence),
            period: Duration::from_secs(2),
            no_frame_backoff: Duration::from_millis(200),
            track_line: INITIALIZING.to_string(),
            shown: None,
        }
    }

    /// Delay between cycles.
    pub fn period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    /// Shorter delay used after a cycle that got no frame.
    pub fn no_frame_backoff(mut self, backoff: Duration) -> Self {
        self.no_frame_backoff = backoff;
        self
    }

    pub fn cadence(mut self, cadence: impl Cadence + 'static) -> Self {
        self.cadence = Box::new(cadence);
        self
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Run cycles until the running flag is cleared.
    ///
    /// A failing or panicking cycle is logged and the loop moves on.
    pub async fn run(mut self) {
        info!(period = ?self.period, "sensing loop started");
        while self.running.is_running() {
            let delay = match AssertUnwindSafe(self.cycle()).catch_unwind().await {
                Ok(Ok(outcome)) if outcome.no_frame => self.no_frame_backoff,
                Ok(Ok(_)) => self.period,
                Ok(Err(e)) => {
                    warn!(?e, "sensing cycle failed");
                    self.period
                }
                Err(_) => {
                    error!("sensing cycle panicked");
                    self.period
                }
            };
            tokio::select! {
                _ = self.cadence.wait(delay) => {}
                _ = self.running.stopped() => break,
            }
        }
        info!("sensing loop stopped");
    }

    /// Run a single cycle. Exactly one status line is published, even when
    /// track selection fails.
    pub async fn cycle(&mut self) -> anyhow::Result<CycleOutcome> {
        self.drain_playback_events();

        let sample = self.sampler.sample().await;
        let label = match &sample {
            Ok(s) => s.label.clone(),
            Err(e) => {
                debug!(error = %e, "sample absorbed");
                EmotionLabel::Unknown
            }
        };
        let no_frame = matches!(sample, Err(SampleError::NoFrame));
        let change = self.tracker.observe_sample(&sample);

        let dispatched = match &change {
            Some(change) => {
                info!(from = ?change.from.as_ref().map(|l| l.as_str()), to = %change.to, "emotion changed");
                self.on_change(change).await
            }
            None => Ok(None),
        };

        self.display
            .publish(&format!("Emotion: {label}"), &self.track_line);

        Ok(CycleOutcome {
            label,
            no_frame,
            change,
            dispatched: dispatched?,
        })
    }

    async fn on_change(&mut self, change: &ChangeEvent) -> anyhow::Result<Option<TrackItem>> {
        let Some(track) = self.selector.select(&change.to).await? else {
            info!(label = %change.to, "no tracks for emotion; playback unchanged");
            return Ok(None);
        };
        if !self.running.is_running() {
            debug!(track = %track.display_name, "shutting down; not dispatching");
            return Ok(None);
        }
        match self.playback.dispatch(track.clone()) {
            Ok(()) => {
                self.track_line = format!("Now Playing: {}", track.display_name);
                self.shown = Some(track.clone());
                Ok(Some(track))
            }
            Err(e) => {
                warn!(error = %e, track = %track.display_name, "playback dispatch dropped; retrying next cycle");
                self.tracker.revert(change);
                Ok(None)
            }
        }
    }

    fn drain_playback_events(&mut self) {
        let mut lagged = false;
        loop {
            match self.events.try_recv() {
                Ok(PlaybackEvent::Failed { item, error }) => {
                    warn!(track = %item.display_name, %error, "playback failed");
                    if self.shown.as_ref() == Some(&item) {
                        self.track_line = format!("Playback failed: {}", item.display_name);
                    }
                }
                Ok(event) => debug!(?event, "playback event"),
                Err(TryRecvError::Lagged(n)) => {
                    debug!(skipped = n, "playback events lagged");
                    lagged = true;
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            }
        }
        if lagged {
            self.resync_track_line();
        }
    }

    /// Rebuild the track line from controller state after missed events.
    fn resync_track_line(&mut self) {
        let failed = self.playback.last_failure();
        if let PlaybackState::Playing(item) = self.playback.state() {
            self.track_line = format!("Now Playing: {}", item.display_name);
            self.shown = Some(item);
        } else if let Some(shown) = self.shown.as_ref().filter(|s| failed.as_ref() == Some(*s)) {
            self.track_line = format!("Playback failed: {}", shown.display_name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        BackendError, EmotionClassifier, Frame, FrameSource, MediaBackend, MemoryCatalog,
        StatusBoard, StepCadence,
    };
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct Camera;

    #[async_trait]
    impl FrameSource for Camera {
        async fn next_frame(&self) -> Option<Frame> {
            Some(Frame::new(vec![0xff, 0xd8]))
        }
        async fn release(&self) {}
    }

    struct NoCamera;

    #[async_trait]
    impl FrameSource for NoCamera {
        async fn next_frame(&self) -> Option<Frame> {
            None
        }
        async fn release(&self) {}
    }

    /// Answers from a script; `"!"` is a failure and `"panic"` panics.
    struct Script(Mutex<Vec<&'static str>>);

    #[async_trait]
    impl EmotionClassifier for Script {
        async fn classify(&self, _frame: &Frame) -> anyhow::Result<String> {
            let next = self.0.lock().unwrap().remove(0);
            match next {
                "!" => anyhow::bail!("no face"),
                "panic" => panic!("classifier blew up"),
                label => Ok(label.to_string()),
            }
        }
    }

    struct Silent;

    #[async_trait]
    impl MediaBackend for Silent {
        type Handle = ();
        async fn start(&self, item: &TrackItem) -> Result<(), BackendError> {
            if item.display_name == "broken.mp3" {
                return Err(BackendError::Other("no audio device".into()));
            }
            Ok(())
        }
        async fn stop(&self, _handle: ()) {}
    }

    /// Never finishes starting, so queued plays pile up.
    struct Stuck;

    #[async_trait]
    impl MediaBackend for Stuck {
        type Handle = ();
        async fn start(&self, _item: &TrackItem) -> Result<(), BackendError> {
            std::future::pending().await
        }
        async fn stop(&self, _handle: ()) {}
    }

    fn build(
        frames: Arc<dyn FrameSource>,
        script: Vec<&'static str>,
        catalog: MemoryCatalog,
    ) -> (SensingLoop, Arc<StatusBoard>, PlaybackController) {
        build_on(PlaybackController::spawn(Silent, 4), frames, script, catalog)
    }

    fn build_on(
        playback: PlaybackController,
        frames: Arc<dyn FrameSource>,
        script: Vec<&'static str>,
        catalog: MemoryCatalog,
    ) -> (SensingLoop, Arc<StatusBoard>, PlaybackController) {
        let sampler = Sampler::new(frames, Arc::new(Script(Mutex::new(script))));
        let board = Arc::new(StatusBoard::new());
        let sensing = SensingLoop::new(
            sampler,
            TrackSelector::with_seed(Arc::new(catalog), 1),
            playback.clone(),
            board.clone(),
            RunningFlag::new(),
        );
        (sensing, board, playback)
    }

    fn happy_catalog() -> MemoryCatalog {
        MemoryCatalog::new().with(
            EmotionLabel::known("Happy"),
            vec![TrackItem::from_path("h1.mp3")],
        )
    }

    #[tokio::test]
    async fn change_dispatches_and_publishes() {
        let (mut sensing, board, _playback) = build(Arc::new(Camera), vec!["happy"], happy_catalog());
        let outcome = sensing.cycle().await.unwrap();
        assert_eq!(outcome.dispatched, Some(TrackItem::from_path("h1.mp3")));
        assert_eq!(board.current().emotion, "Emotion: Happy");
        assert_eq!(board.current().track, "Now Playing: h1.mp3");
    }

    #[tokio::test]
    async fn failure_publishes_unknown_and_keeps_track_line() {
        let (mut sensing, board, _playback) =
            build(Arc::new(Camera), vec!["happy", "!"], happy_catalog());
        sensing.cycle().await.unwrap();
        let outcome = sensing.cycle().await.unwrap();
        assert_eq!(outcome.label, EmotionLabel::Unknown);
        assert!(outcome.change.is_none());
        assert_eq!(board.current().emotion, "Emotion: Unknown");
        assert_eq!(board.current().track, "Now Playing: h1.mp3");
    }

    #[tokio::test]
    async fn no_frame_uses_backoff() {
        let (sensing, board, _playback) = build(Arc::new(NoCamera), vec![], happy_catalog());
        let (cadence, stepper) = StepCadence::new();
        let running = sensing.running.clone();
        let handle = sensing
            .period(Duration::from_secs(2))
            .no_frame_backoff(Duration::from_millis(200))
            .cadence(cadence)
            .spawn();
        stepper.step();
        while stepper.delays().len() < 2 {
            tokio::task::yield_now().await;
        }
        running.stop();
        handle.await.unwrap();
        assert!(
            stepper
                .delays()
                .iter()
                .all(|d| *d == Duration::from_millis(200))
        );
        assert_eq!(board.current().emotion, "Emotion: Unknown");
    }

    #[tokio::test]
    async fn panicking_cycle_does_not_stop_the_loop() {
        let (sensing, board, _playback) =
            build(Arc::new(Camera), vec!["panic", "happy"], happy_catalog());
        let (cadence, stepper) = StepCadence::new();
        let running = sensing.running.clone();
        let handle = sensing.cadence(cadence).spawn();
        stepper.step();
        while stepper.delays().len() < 2 {
            tokio::task::yield_now().await;
        }
        running.stop();
        handle.await.unwrap();
        assert_eq!(board.current().emotion, "Emotion: Happy");
    }

    #[tokio::test]
    async fn failed_start_is_reported_in_status() {
        let catalog = MemoryCatalog::new().with(
            EmotionLabel::known("Angry"),
            vec![TrackItem::from_path("broken.mp3")],
        );
        let (mut sensing, board, playback) =
            build(Arc::new(Camera), vec!["angry", "angry"], catalog);
        let mut events = playback.subscribe();
        sensing.cycle().await.unwrap();
        assert!(matches!(
            events.recv().await.unwrap(),
            PlaybackEvent::Failed { .. }
        ));
        sensing.cycle().await.unwrap();
        assert_eq!(board.current().track, "Playback failed: broken.mp3");
    }

    #[tokio::test]
    async fn full_queue_retries_change_next_cycle() {
        let playback = PlaybackController::spawn(Stuck, 1);
        let fill = |playback: &PlaybackController| {
            while playback.dispatch(TrackItem::from_path("filler.mp3")).is_ok() {}
        };
        fill(&playback);
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        fill(&playback);

        let (mut sensing, board, _playback) =
            build_on(playback, Arc::new(Camera), vec!["happy", "happy"], happy_catalog());
        let first = sensing.cycle().await.unwrap();
        assert!(first.change.is_some());
        assert_eq!(first.dispatched, None);
        assert_eq!(sensing.tracker.last_accepted(), None);
        assert_eq!(board.current().track, INITIALIZING);

        let second = sensing.cycle().await.unwrap();
        assert_eq!(
            second.change.map(|c| c.to),
            Some(EmotionLabel::known("Happy"))
        );
    }

    #[tokio::test]
    async fn missed_failure_is_recovered_after_lag() {
        let catalog = MemoryCatalog::new().with(
            EmotionLabel::known("Angry"),
            vec![TrackItem::from_path("broken.mp3")],
        );
        let (mut sensing, board, playback) = build(Arc::new(Camera), vec!["angry", "!"], catalog);
        let mut events = playback.subscribe();
        sensing.cycle().await.unwrap();
        assert_eq!(board.current().track, "Now Playing: broken.mp3");
        assert!(matches!(
            events.recv().await.unwrap(),
            PlaybackEvent::Failed { .. }
        ));

        // enough traffic to push the failure out of the event buffer
        for i in 0..10 {
            playback
                .play(TrackItem::from_path(format!("other{i}.mp3")))
                .await
                .unwrap();
            assert!(playback.stop().await);
        }

        sensing.cycle().await.unwrap();
        assert_eq!(board.current().track, "Playback failed: broken.mp3");
    }
}
