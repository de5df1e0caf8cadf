//! Run-level stop signal.
//!
//! The scheduler checks the flag before dispatching each new task; workers
//! already in flight either finish naturally or, for forceful termination,
//! have their underlying git process killed when [`Shutdown::wait`] resolves.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::watch;

/// Cooperative shutdown signal shared between the front-end and the engine.
#[derive(Debug)]
pub struct Shutdown {
    flag: AtomicBool,
    tx: watch::Sender<bool>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            flag: AtomicBool::new(false),
            tx,
        }
    }

    /// Request shutdown. Idempotent.
    pub fn request(&self) {
        self.flag.store(true, Ordering::Release);
        let _ = self.tx.send(true);
    }

    /// Whether shutdown has been requested.
    pub fn is_requested(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// Resolve once shutdown is requested. Used in `select!` against blocking
    /// child-process waits so in-flight work can be terminated.
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        while !*rx.borrow() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
