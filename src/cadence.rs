use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

/// Inter-cycle delay policy of the sensing loop.
#[async_trait]
pub trait Cadence: Send {
    async fn wait(&mut self, delay: Duration);
}

/// Real clock: sleeps for the requested delay.
#[derive(Debug, Default, Clone, Copy)]
pub struct SleepCadence;

#[async_trait]
impl Cadence for SleepCadence {
    async fn wait(&mut self, delay: Duration) {
        tokio::time::sleep(delay).await;
    }
}

/// Manual clock. Each [`Stepper::step`] releases exactly one wait; the
/// requested delays are recorded instead of slept.
///
/// ```
/// use moodplay::{Cadence, StepCadence};
/// use std::time::Duration;
///
/// # tokio_test::block_on(async {
/// let (mut cadence, stepper) = StepCadence::new();
/// stepper.step();
/// cadence.wait(Duration::from_secs(2)).await;
/// assert_eq!(stepper.delays(), vec![Duration::from_secs(2)]);
/// # });
/// ```
pub struct StepCadence {
    steps: mpsc::UnboundedReceiver<()>,
    delays: Arc<Mutex<Vec<Duration>>>,
}

/// Driver half of a [`StepCadence`].
#[derive(Clone)]
pub struct Stepper {
    tx: mpsc::UnboundedSender<()>,
    delays: Arc<Mutex<Vec<Duration>>>,
}

impl StepCadence {
    pub fn new() -> (Self, Stepper) {
        let (tx, steps) = mpsc::unbounded_channel();
        let delays = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                steps,
                delays: delays.clone(),
            },
            Stepper { tx, delays },
        )
    }
}

#[async_trait]
impl Cadence for StepCadence {
    async fn wait(&mut self, delay: Duration) {
        if let Ok(mut delays) = self.delays.lock() {
            delays.push(delay);
        }
        if self.steps.recv().await.is_none() {
            // stepper dropped: the clock never advances again
            std::future::pending::<()>().await;
        }
    }
}

impl Stepper {
    pub fn step(&self) {
        let _ = self.tx.send(());
    }

    /// Delays requested so far, in order.
    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().map(|d| d.clone()).unwrap_or_default()
    }
}
