//! Fan-out/fan-in completion barrier.
//!
//! The count starts at the number of queued requests, grows when a script
//! fans out into a batch, and shrinks as each request or batch member
//! settles. [`Barrier::wait`] returns once it reaches zero.

use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Notify;

#[derive(Debug)]
pub struct Barrier {
    outstanding: AtomicUsize,
    done: Notify,
}

impl Barrier {
    pub fn new(initial: usize) -> Self {
        Self {
            outstanding: AtomicUsize::new(initial),
            done: Notify::new(),
        }
    }

    /// Register `n` more units of work. Must be called before the unit that
    /// fans out settles.
    pub fn add(&self, n: usize) {
        self.outstanding.fetch_add(n, Ordering::SeqCst);
    }

    /// Mark one unit settled, successful or not.
    pub fn settle(&self) {
        let previous = self.outstanding.fetch_sub(1, Ordering::SeqCst);
        debug_assert!(previous > 0, "barrier settled more often than registered");
        if previous == 1 {
            self.done.notify_one();
        }
    }

    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }

    pub async fn wait(&self) {
        while self.outstanding() > 0 {
            self.done.notified().await;
        }
    }
}
