use crate::retry::RetryPolicy;
use connectors::store::ConnectionSettings;
use model::{
    execution::write::{ConflictPolicy, Durability, WriteOptions},
    records::batch::BatchLimits,
};
use std::{num::NonZeroUsize, time::Duration};

pub const DEFAULT_CLIENTS: usize = 8;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How writers react to a connection that keeps failing. Every failure
/// without progress in between counts towards `threshold`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectSettings {
    pub threshold: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            threshold: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
        }
    }
}

/// Validated options for one import run.
#[derive(Debug, Clone)]
pub struct ImportSettings {
    pub connection: ConnectionSettings,
    pub clients: NonZeroUsize,
    pub write: WriteOptions,
    pub batch_limits: BatchLimits,
    /// Bounded queue size; `None` means four slots per writer.
    pub queue_capacity: Option<usize>,
    pub poll_interval: Duration,
    pub retry: RetryPolicy,
    pub reconnect: ReconnectSettings,
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            connection: ConnectionSettings::default(),
            clients: NonZeroUsize::new(DEFAULT_CLIENTS).unwrap_or(NonZeroUsize::MIN),
            write: WriteOptions::default(),
            batch_limits: BatchLimits::default(),
            queue_capacity: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            retry: RetryPolicy::default(),
            reconnect: ReconnectSettings::default(),
        }
    }
}

impl ImportSettings {
    pub fn new(connection: ConnectionSettings) -> Self {
        Self {
            connection,
            ..Default::default()
        }
    }

    pub fn with_clients(mut self, clients: NonZeroUsize) -> Self {
        self.clients = clients;
        self
    }

    pub fn with_durability(mut self, durability: Durability) -> Self {
        self.write.durability = durability;
        self
    }

    pub fn with_conflict(mut self, conflict: ConflictPolicy) -> Self {
        self.write.conflict = conflict;
        self
    }

    pub fn with_batch_limits(mut self, limits: BatchLimits) -> Self {
        self.batch_limits = limits;
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = Some(capacity.max(1));
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_reconnect(mut self, reconnect: ReconnectSettings) -> Self {
        self.reconnect = reconnect;
        self
    }

    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
            .unwrap_or_else(|| self.clients.get().saturating_mul(4))
    }

    /// Whether existing rows may be overwritten, i.e. `--force`.
    pub fn force(&self) -> bool {
        self.write.conflict.overwrites()
    }
}
