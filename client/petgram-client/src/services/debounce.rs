//! Quiet-period coalescing for search-as-you-type

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Cloneable input side of a [`Debouncer`]
#[derive(Clone)]
pub struct DebounceHandle<T> {
    tx: Arc<watch::Sender<T>>,
}

impl<T> DebounceHandle<T> {
    pub fn push(&self, value: T) {
        self.tx.send_replace(value);
    }
}

/// Forwards only the latest value once input has been quiet for `quiet`
pub struct Debouncer<T> {
    tx: Arc<watch::Sender<T>>,
    rx: watch::Receiver<T>,
    quiet: Duration,
    primed: bool,
}

impl<T: Clone> Debouncer<T> {
    /// The initial value is emitted by the first [`Debouncer::settled`] call
    /// without waiting.
    pub fn new(initial: T, quiet: Duration) -> Self {
        let (tx, rx) = watch::channel(initial);
        Self {
            tx: Arc::new(tx),
            rx,
            quiet,
            primed: false,
        }
    }

    pub fn handle(&self) -> DebounceHandle<T> {
        DebounceHandle {
            tx: self.tx.clone(),
        }
    }

    pub fn push(&self, value: T) {
        self.tx.send_replace(value);
    }

    pub fn quiet(&self) -> Duration {
        self.quiet
    }

    /// Wait for the next input burst to go quiet and return its last value
    pub async fn settled(&mut self) -> T {
        if !self.primed {
            self.primed = true;
            return self.rx.borrow_and_update().clone();
        }

        // `self.tx` keeps the channel open, so `changed` cannot fail
        let _ = self.rx.changed().await;
        loop {
            tokio::select! {
                _ = self.rx.changed() => continue,
                _ = tokio::time::sleep(self.quiet) => break,
            }
        }
        self.rx.borrow_and_update().clone()
    }
}
