//! Cooperative shutdown signal shared by long-running work
//!
//! Rollup passes check the signal at their fan-in barriers; a triggered
//! signal makes them stop between buckets, leaving unconsumed work-queue
//! entries in place for the next pass.

use std::sync::Arc;

use tokio::sync::watch;

/// Cloneable handle to a watch-backed shutdown flag
#[derive(Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
    // keeps the channel open for signals created without an external sender
    _keepalive: Option<Arc<watch::Sender<bool>>>,
}

impl ShutdownSignal {
    /// Create a signal plus the sender that triggers it
    pub fn new() -> (watch::Sender<bool>, Self) {
        let (tx, rx) = watch::channel(false);
        (
            tx,
            Self {
                rx,
                _keepalive: None,
            },
        )
    }

    /// Signal that never triggers, for callers without a shutdown story
    pub fn never() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            rx,
            _keepalive: Some(Arc::new(tx)),
        }
    }

    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait until the signal is triggered (or the sender goes away)
    pub async fn triggered(&mut self) {
        while !*self.rx.borrow() {
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }
}
