//! Single-slot playback.
//!
//! [`PlaybackController`] is a cheap handle to an actor task that exclusively
//! owns the [`MediaBackend`] and the live playback handle. Commands travel
//! through one bounded queue and are processed strictly in order, so a
//! stop/start pair never interleaves with another and at most one handle is
//! ever open.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use crate::{BackendError, MediaBackend, TrackItem};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PlaybackState {
    #[default]
    Idle,
    Playing(TrackItem),
}

/// Outcome notifications, mostly for dispatched plays nobody awaits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackEvent {
    Started(TrackItem),
    Stopped(TrackItem),
    Failed { item: TrackItem, error: String },
}

#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("playback queue full")]
    QueueFull,
    #[error("playback controller closed")]
    Closed,
}

enum Command {
    Play {
        item: TrackItem,
        reply: Option<oneshot::Sender<Result<(), PlaybackError>>>,
    },
    Stop {
        reply: oneshot::Sender<bool>,
    },
    Close {
        reply: oneshot::Sender<()>,
    },
}

#[derive(Clone)]
pub struct PlaybackController {
    tx: mpsc::Sender<Command>,
    state: watch::Receiver<PlaybackState>,
    failed: watch::Receiver<Option<TrackItem>>,
    events: broadcast::Sender<PlaybackEvent>,
    closed: Arc<AtomicBool>,
}

impl PlaybackController {
    /// Spawn the actor owning `backend`. `capacity` bounds the number of
    /// queued commands.
    pub fn spawn<B: MediaBackend>(backend: B, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let (state_tx, state) = watch::channel(PlaybackState::Idle);
        let (failed_tx, failed) = watch::channel(None);
        let (events, _) = broadcast::channel(16);
        let actor = Actor {
            backend,
            active: None,
            closed: false,
            state: state_tx,
            failed: failed_tx,
            events: events.clone(),
        };
        tokio::spawn(actor.run(rx));
        Self {
            tx,
            state,
            failed,
            events,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Start `item`, stopping whatever is playing first, and wait for the
    /// outcome.
    pub async fn play(&self, item: TrackItem) -> Result<(), PlaybackError> {
        if self.is_closed() {
            return Err(PlaybackError::Closed);
        }
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Play {
                item,
                reply: Some(reply),
            })
            .await
            .map_err(|_| PlaybackError::Closed)?;
        rx.await.map_err(|_| PlaybackError::Closed)?
    }

    /// Queue `item` without waiting. The result arrives as a
    /// [`PlaybackEvent`].
    pub fn dispatch(&self, item: TrackItem) -> Result<(), PlaybackError> {
        if self.is_closed() {
            return Err(PlaybackError::Closed);
        }
        self.tx
            .try_send(Command::Play { item, reply: None })
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => PlaybackError::QueueFull,
                mpsc::error::TrySendError::Closed(_) => PlaybackError::Closed,
            })
    }

    /// Stop the current track. Returns whether anything was playing.
    pub async fn stop(&self) -> bool {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(Command::Stop { reply }).await.is_err() {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    /// Stop playback and refuse every later play. Commands queued before the
    /// close still run first.
    pub async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let (reply, rx) = oneshot::channel();
        if self.tx.send(Command::Close { reply }).await.is_ok() {
            let _ = rx.await;
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> PlaybackState {
        self.state.borrow().clone()
    }

    /// Most recent track that failed to start, if any.
    pub fn last_failure(&self) -> Option<TrackItem> {
        self.failed.borrow().clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlaybackEvent> {
        self.events.subscribe()
    }
}

struct Actor<B: MediaBackend> {
    backend: B,
    active: Option<(TrackItem, B::Handle)>,
    closed: bool,
    state: watch::Sender<PlaybackState>,
    failed: watch::Sender<Option<TrackItem>>,
    events: broadcast::Sender<PlaybackEvent>,
}

impl<B: MediaBackend> Actor<B> {
    async fn run(mut self, mut rx: mpsc::Receiver<Command>) {
        while let Some(cmd) = rx.recv().await {
            match cmd {
                Command::Play { item, reply } => {
                    let result = self.start(item).await;
                    if let Some(reply) = reply {
                        let _ = reply.send(result);
                    }
                }
                Command::Stop { reply } => {
                    let stopped = self.release().await;
                    let _ = reply.send(stopped);
                }
                Command::Close { reply } => {
                    self.closed = true;
                    self.release().await;
                    info!("playback closed");
                    let _ = reply.send(());
                }
            }
        }
        // every controller handle is gone
        self.release().await;
        debug!("playback actor exiting");
    }

    async fn start(&mut self, item: TrackItem) -> Result<(), PlaybackError> {
        if self.closed {
            debug!(track = %item.display_name, "play refused after close");
            return Err(PlaybackError::Closed);
        }
        self.release().await;
        match self.backend.start(&item).await {
            Ok(handle) => {
                self.state.send_replace(PlaybackState::Playing(item.clone()));
                let _ = self.events.send(PlaybackEvent::Started(item.clone()));
                self.active = Some((item, handle));
                Ok(())
            }
            Err(e) => {
                warn!(track = %item.display_name, error = %e, "playback failed to start");
                self.failed.send_replace(Some(item.clone()));
                let _ = self.events.send(PlaybackEvent::Failed {
                    item,
                    error: e.to_string(),
                });
                Err(e.into())
            }
        }
    }

    async fn release(&mut self) -> bool {
        let Some((item, handle)) = self.active.take() else {
            return false;
        };
        self.backend.stop(handle).await;
        self.state.send_replace(PlaybackState::Idle);
        let _ = self.events.send(PlaybackEvent::Stopped(item));
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        Start(String),
        Stop(String),
    }

    /// Records calls and fails to start any track named `broken.mp3`.
    #[derive(Clone, Default)]
    struct Recorder {
        log: Arc<Mutex<Vec<Call>>>,
        live: Arc<AtomicUsize>,
        max_live: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl MediaBackend for Recorder {
        type Handle = String;

        async fn start(&self, item: &TrackItem) -> Result<String, BackendError> {
            if item.display_name == "broken.mp3" {
                return Err(BackendError::Other("decoder error".into()));
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
            let live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_live.fetch_max(live, Ordering::SeqCst);
            self.log
                .lock()
                .unwrap()
                .push(Call::Start(item.display_name.clone()));
            Ok(item.display_name.clone())
        }

        async fn stop(&self, handle: String) {
            tokio::time::sleep(Duration::from_millis(2)).await;
            self.live.fetch_sub(1, Ordering::SeqCst);
            self.log.lock().unwrap().push(Call::Stop(handle));
        }
    }

    fn track(name: &str) -> TrackItem {
        TrackItem::from_path(name)
    }

    #[tokio::test]
    async fn second_play_stops_first_before_starting() {
        let backend = Recorder::default();
        let controller = PlaybackController::spawn(backend.clone(), 4);
        controller.play(track("x.mp3")).await.unwrap();
        controller.play(track("y.mp3")).await.unwrap();
        assert_eq!(
            *backend.log.lock().unwrap(),
            vec![
                Call::Start("x.mp3".into()),
                Call::Stop("x.mp3".into()),
                Call::Start("y.mp3".into()),
            ]
        );
        assert_eq!(controller.state(), PlaybackState::Playing(track("y.mp3")));
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let backend = Recorder::default();
        let controller = PlaybackController::spawn(backend.clone(), 4);
        controller.play(track("x.mp3")).await.unwrap();
        assert!(controller.stop().await);
        assert!(!controller.stop().await);
        assert_eq!(controller.state(), PlaybackState::Idle);
        assert_eq!(backend.log.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn backend_failure_leaves_controller_idle() {
        let backend = Recorder::default();
        let controller = PlaybackController::spawn(backend.clone(), 4);
        let mut events = controller.subscribe();
        controller.play(track("x.mp3")).await.unwrap();
        let err = controller.play(track("broken.mp3")).await.unwrap_err();
        assert!(matches!(err, PlaybackError::Backend(_)));
        assert_eq!(controller.state(), PlaybackState::Idle);
        assert_eq!(controller.last_failure(), Some(track("broken.mp3")));
        assert_eq!(events.recv().await.unwrap(), PlaybackEvent::Started(track("x.mp3")));
        assert_eq!(events.recv().await.unwrap(), PlaybackEvent::Stopped(track("x.mp3")));
        assert!(matches!(
            events.recv().await.unwrap(),
            PlaybackEvent::Failed { .. }
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn racing_plays_never_overlap() {
        let backend = Recorder::default();
        let controller = PlaybackController::spawn(backend.clone(), 64);
        let mut tasks = Vec::new();
        for i in 0..16 {
            let controller = controller.clone();
            tasks.push(tokio::spawn(async move {
                controller.play(track(&format!("t{i}.mp3"))).await.unwrap();
            }));
        }
        for t in tasks {
            t.await.unwrap();
        }
        assert_eq!(backend.max_live.load(Ordering::SeqCst), 1);
        assert_eq!(backend.live.load(Ordering::SeqCst), 1);
        let last_started = backend
            .log
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find_map(|c| match c {
                Call::Start(name) => Some(name.clone()),
                Call::Stop(_) => None,
            })
            .unwrap();
        assert_eq!(
            controller.state(),
            PlaybackState::Playing(track(&last_started))
        );
    }

    #[tokio::test]
    async fn dispatch_reports_through_events() {
        let controller = PlaybackController::spawn(Recorder::default(), 4);
        let mut events = controller.subscribe();
        controller.dispatch(track("x.mp3")).unwrap();
        assert_eq!(events.recv().await.unwrap(), PlaybackEvent::Started(track("x.mp3")));
    }

    #[tokio::test]
    async fn close_runs_queued_plays_then_refuses() {
        let backend = Recorder::default();
        let controller = PlaybackController::spawn(backend.clone(), 4);
        controller.dispatch(track("x.mp3")).unwrap();
        controller.close().await;
        assert_eq!(controller.state(), PlaybackState::Idle);
        assert!(matches!(
            controller.play(track("y.mp3")).await,
            Err(PlaybackError::Closed)
        ));
        assert!(matches!(
            controller.dispatch(track("z.mp3")),
            Err(PlaybackError::Closed)
        ));
        assert_eq!(
            *backend.log.lock().unwrap(),
            vec![Call::Start("x.mp3".into()), Call::Stop("x.mp3".into())]
        );
    }
}
