// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

//! Fixed-interval polling on a background thread.
//!
//! Each subscription carries a generation number. Ticks are tagged with it so
//! a consumer that has moved on to a newer subscription can drop late results
//! from an older one.

use std::sync::mpsc::{self, RecvTimeoutError, Sender, TryRecvError};
use std::thread;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub struct PollTick<T> {
    pub generation: u64,
    /// 1 for the first fetch of this subscription.
    pub sequence: u64,
    pub value: T,
}

/// Live polling subscription. Dropping the handle cancels it; a fetch already
/// in flight finishes but its result is not delivered.
#[derive(Debug)]
pub struct PollHandle {
    generation: u64,
    stop_tx: Option<Sender<()>>,
}

impl PollHandle {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_active(&self) -> bool {
        self.stop_tx.is_some()
    }

    pub fn stop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
            debug!(generation = self.generation, "poll stopped");
        }
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Runs `fetch` every `interval` and hands each result to `sink` until the
/// handle is stopped or `sink` returns false. The first fetch happens after
/// one interval; callers load the initial state themselves.
pub fn spawn<T, F, S>(generation: u64, interval: Duration, mut fetch: F, mut sink: S) -> PollHandle
where
    T: Send + 'static,
    F: FnMut() -> T + Send + 'static,
    S: FnMut(PollTick<T>) -> bool + Send + 'static,
{
    let (stop_tx, stop_rx) = mpsc::channel::<()>();
    thread::spawn(move || {
        let mut sequence = 0;
        loop {
            match stop_rx.recv_timeout(interval) {
                Err(RecvTimeoutError::Timeout) => {}
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
            let value = fetch();
            if !matches!(stop_rx.try_recv(), Err(TryRecvError::Empty)) {
                break;
            }
            sequence += 1;
            if !sink(PollTick {
                generation,
                sequence,
                value,
            }) {
                break;
            }
        }
        debug!(generation, "poll thread exited");
    });
    PollHandle {
        generation,
        stop_tx: Some(stop_tx),
    }
}
