use crate::queue::{Task, TaskQueue};
use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// User interrupt (SIGINT / SIGTERM).
    Interrupt,
    /// A worker reported a failure; stop starting new work.
    Failure,
}

#[derive(Debug)]
struct Inner {
    interrupted: AtomicBool,
    triggered: AtomicBool,
    exit: CancellationToken,
    alive_writers: AtomicUsize,
    queue: TaskQueue,
}

/// Shared cancellation state for one import run.
///
/// The first trigger cancels the exit token that readers and writers watch,
/// then queues one stop sentinel per live writer so none of them stays
/// parked on an empty queue. Later triggers only record an interrupt.
#[derive(Debug, Clone)]
pub struct CancellationController {
    inner: Arc<Inner>,
}

impl CancellationController {
    pub fn new(queue: TaskQueue) -> Self {
        Self {
            inner: Arc::new(Inner {
                interrupted: AtomicBool::new(false),
                triggered: AtomicBool::new(false),
                exit: CancellationToken::new(),
                alive_writers: AtomicUsize::new(0),
                queue,
            }),
        }
    }

    /// Returns true if this call performed the cancellation.
    pub fn trigger(&self, reason: CancelReason) -> bool {
        // An interrupt arriving after a failure still decides the run status.
        if reason == CancelReason::Interrupt {
            self.inner.interrupted.store(true, Ordering::SeqCst);
        }
        if self.inner.triggered.swap(true, Ordering::SeqCst) {
            debug!(?reason, "Cancellation already in progress");
            return false;
        }

        self.inner.exit.cancel();

        let writers = self.inner.alive_writers.load(Ordering::SeqCst);
        let queued = (0..writers)
            .filter(|_| self.inner.queue.try_push(Task::Stop))
            .count();
        info!(?reason, writers, sentinels = queued, "Cancelling import");
        true
    }

    pub fn interrupt(&self) -> bool {
        self.trigger(CancelReason::Interrupt)
    }

    pub fn is_interrupted(&self) -> bool {
        self.inner.interrupted.load(Ordering::SeqCst)
    }

    pub fn is_exit_requested(&self) -> bool {
        self.inner.exit.is_cancelled()
    }

    pub fn exit_token(&self) -> CancellationToken {
        self.inner.exit.clone()
    }

    /// Registers a running writer. Dropping the guard marks it finished.
    pub fn writer_started(&self) -> WriterGuard {
        self.inner.alive_writers.fetch_add(1, Ordering::SeqCst);
        WriterGuard {
            controller: self.clone(),
        }
    }

    pub fn alive_writers(&self) -> usize {
        self.inner.alive_writers.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
pub struct WriterGuard {
    controller: CancellationController,
}

impl Drop for WriterGuard {
    fn drop(&mut self) {
        self.controller
            .inner
            .alive_writers
            .fetch_sub(1, Ordering::SeqCst);
    }
}
