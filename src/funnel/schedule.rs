//! Typing delays and cancelable pauses.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::error::FunnelError;

/// Simulated "typing" delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypingDelays {
    /// Before the first message.
    pub warm_up: Duration,
    /// Lower bound of the delay before each following message.
    pub min: Duration,
    /// Upper bound of the delay before each following message.
    pub max: Duration,
}

impl Default for TypingDelays {
    fn default() -> Self {
        Self {
            warm_up: Duration::from_millis(1500),
            min: Duration::from_millis(1000),
            max: Duration::from_millis(2000),
        }
    }
}

impl TypingDelays {
    /// No delays at all.
    pub fn instant() -> Self {
        Self {
            warm_up: Duration::ZERO,
            min: Duration::ZERO,
            max: Duration::ZERO,
        }
    }

    /// Uniform sample in `[min, max]`.
    pub fn sample(&self) -> Duration {
        let min = self.min.as_millis() as u64;
        let max = self.max.as_millis() as u64;
        if max <= min {
            return self.min;
        }
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }
}

/// Shutdown signal shared by every pause of one engine.
#[derive(Debug)]
pub struct Shutdown {
    tx: watch::Sender<bool>,
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    /// Cancel every pending and future pause.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    /// Sleep for `duration`, or return `Cancelled` as soon as shutdown fires.
    pub async fn pause(&self, duration: Duration) -> Result<(), FunnelError> {
        let mut rx = self.tx.subscribe();
        if *rx.borrow() {
            return Err(FunnelError::Cancelled);
        }
        tokio::select! {
            _ = tokio::time::sleep(duration) => Ok(()),
            _ = rx.wait_for(|cancelled| *cancelled) => Err(FunnelError::Cancelled),
        }
    }
}

/// Handle to a spawned funnel operation. Aborted when cancelled or dropped.
#[derive(Debug)]
pub struct ScheduledTask<T> {
    handle: JoinHandle<T>,
}

impl<T: Send + 'static> ScheduledTask<T> {
    pub fn spawn<F>(future: F) -> Self
    where
        F: Future<Output = T> + Send + 'static,
    {
        Self {
            handle: tokio::spawn(future),
        }
    }

    pub fn cancel(&self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the result. `None` if the task was cancelled or panicked.
    pub async fn join(mut self) -> Option<T> {
        (&mut self.handle).await.ok()
    }
}

impl<T> Drop for ScheduledTask<T> {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
