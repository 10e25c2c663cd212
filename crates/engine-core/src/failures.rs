use model::execution::failure::ImportFailure;
use tokio::sync::mpsc;
use tracing::error;

/// Creates the shared failure channel: a cloneable, never-blocking sender
/// for readers and writers, and the collector owned by the coordinator.
pub fn failure_channel() -> (FailureSender, FailureCollector) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        FailureSender { tx },
        FailureCollector {
            rx,
            collected: Vec::new(),
        },
    )
}

#[derive(Debug, Clone)]
pub struct FailureSender {
    tx: mpsc::UnboundedSender<ImportFailure>,
}

impl FailureSender {
    pub fn report(&self, failure: ImportFailure) {
        error!(kind = %failure.kind, file = ?failure.file, at = %failure.at, "{}", failure.message);
        // The collector only goes away once every worker has stopped.
        let _ = self.tx.send(failure);
    }
}

#[derive(Debug)]
pub struct FailureCollector {
    rx: mpsc::UnboundedReceiver<ImportFailure>,
    collected: Vec<ImportFailure>,
}

impl FailureCollector {
    /// Moves everything currently queued into the collected list and
    /// returns how many new failures arrived.
    pub fn drain(&mut self) -> usize {
        let before = self.collected.len();
        while let Ok(failure) = self.rx.try_recv() {
            self.collected.push(failure);
        }
        self.collected.len() - before
    }

    pub fn has_failures(&self) -> bool {
        !self.collected.is_empty()
    }

    pub fn failures(&self) -> &[ImportFailure] {
        &self.collected
    }

    pub fn push(&mut self, failure: ImportFailure) {
        self.collected.push(failure);
    }

    pub fn into_failures(mut self) -> Vec<ImportFailure> {
        self.drain();
        self.collected
    }
}
