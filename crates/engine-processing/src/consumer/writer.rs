use crate::{
    cb::{CircuitBreaker, CircuitBreakerState},
    error::ConsumerError,
    retry::classify_store_error,
};
use connectors::store::{RowError, StoreConnection, StoreConnector, error::StoreError};
use engine_core::{metrics::Metrics, retry::RetryDisposition};
use model::{
    execution::write::WriteOptions,
    records::{batch::Batch, record::primary_key},
};
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// What a writer keeps about a batch whose insert was cut short.
#[derive(Debug)]
pub struct ResumeState {
    /// Rows of this batch known to be committed.
    pub committed: u64,
    /// Rows still to be written. Shrinks as reconciliation confirms rows.
    pub batch: Batch,
    resuming: bool,
}

impl ResumeState {
    fn new(batch: Batch) -> Self {
        Self {
            committed: 0,
            batch,
            resuming: false,
        }
    }
}

enum AttemptError {
    Transient(StoreError),
    Fatal(ConsumerError),
}

/// Applies batches through one store connection, reconnecting on
/// connection-class failures and resuming the same batch afterwards.
///
/// Under the `error` conflict policy a resumed batch is first reconciled
/// against the store: rows already stored unchanged count as committed
/// and are dropped, rows stored differently are a fatal conflict, absent
/// rows are sent again. Under `replace` the batch is simply resent.
pub struct ResumableWriter {
    connector: Arc<dyn StoreConnector>,
    conn: Option<Box<dyn StoreConnection>>,
    options: WriteOptions,
    breaker: CircuitBreaker,
    metrics: Metrics,
    cancel: CancellationToken,
}

impl ResumableWriter {
    pub fn new(
        connector: Arc<dyn StoreConnector>,
        options: WriteOptions,
        breaker: CircuitBreaker,
        metrics: Metrics,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            connector,
            conn: None,
            options,
            breaker,
            metrics,
            cancel,
        }
    }

    /// Writes the whole batch and returns how many of its rows ended up
    /// committed.
    pub async fn write(&mut self, batch: Batch) -> Result<u64, ConsumerError> {
        let mut state = ResumeState::new(batch);

        loop {
            match self.attempt(&mut state).await {
                Ok(()) => return Ok(state.committed),
                Err(AttemptError::Fatal(err)) => return Err(err),
                Err(AttemptError::Transient(err)) => {
                    self.conn = None;
                    state.resuming = true;
                    self.backoff(&state, err).await?;
                }
            }
        }
    }

    async fn attempt(&mut self, state: &mut ResumeState) -> Result<(), AttemptError> {
        let conn = match self.conn.take() {
            Some(conn) => conn,
            None => {
                let conn = self
                    .connector
                    .connect()
                    .await
                    .map_err(|e| self.store_failure(&state.batch, e))?;
                if state.resuming {
                    self.metrics.increment_reconnects();
                }
                conn
            }
        };

        if state.resuming && !self.options.conflict.overwrites() {
            let found = self.reconcile(conn.as_ref(), &mut state.batch).await?;
            if found > 0 {
                debug!(batch_id = %state.batch.id, rows = found, "Rows already committed before reconnect");
                state.committed += found;
                self.metrics.add_rows_written(found);
                self.metrics.add_rows_reconciled(found);
                self.breaker.record_success();
            }
        }
        state.resuming = false;

        if state.batch.is_empty() {
            self.conn = Some(conn);
            return Ok(());
        }

        let outcome = conn
            .insert(&state.batch.target, &state.batch.rows, self.options)
            .await
            .map_err(|e| self.store_failure(&state.batch, e))?;
        self.conn = Some(conn);
        self.breaker.record_success();

        if outcome.errors > 0 {
            let table = &state.batch.target;
            let err = match outcome.first_error {
                Some(row_err) => ConsumerError::from_row_error(table, row_err),
                None => ConsumerError::Rejected {
                    table: table.clone(),
                    reason: format!("{} rows rejected", outcome.errors),
                },
            };
            return Err(AttemptError::Fatal(err));
        }

        let sent = state.batch.len() as u64;
        state.committed += sent;
        self.metrics.add_rows_written(sent);
        self.metrics.increment_batches();
        debug!(batch_id = %state.batch.id, table = %state.batch.target, rows = sent, "Batch written");
        Ok(())
    }

    /// Drops every row of `batch` already present and identical in the
    /// store. Returns how many rows were dropped.
    async fn reconcile(
        &self,
        conn: &dyn StoreConnection,
        batch: &mut Batch,
    ) -> Result<u64, AttemptError> {
        let table = batch.target.clone();
        let key_field = conn
            .table_info(&table)
            .await
            .map_err(|e| self.store_failure(batch, e))?
            .primary_key;

        let mut found = 0u64;
        let mut kept = Vec::with_capacity(batch.rows.len());
        let mut pending = std::mem::take(&mut batch.rows).into_iter();
        while let Some(row) = pending.next() {
            let Some(key) = primary_key(&row, &key_field).cloned() else {
                return Err(AttemptError::Fatal(ConsumerError::MissingKey {
                    table,
                    key_field,
                }));
            };

            let stored = match conn.get_row(&table, &key).await {
                Ok(stored) => stored,
                Err(e) => {
                    // Put everything back so the next attempt sees the full remainder.
                    kept.push(row);
                    kept.extend(pending);
                    batch.rows = kept;
                    return Err(self.store_failure(batch, e));
                }
            };

            match stored {
                None => kept.push(row),
                Some(stored) if stored == row => found += 1,
                Some(stored) => {
                    return Err(AttemptError::Fatal(ConsumerError::Conflict(
                        RowError::DuplicateKey {
                            key_field,
                            stored: Value::Object(stored),
                            incoming: Value::Object(row),
                        },
                    )));
                }
            }
        }
        batch.rows = kept;
        Ok(found)
    }

    async fn backoff(&mut self, state: &ResumeState, err: StoreError) -> Result<(), ConsumerError> {
        self.metrics.increment_retries();
        match self.breaker.record_failure() {
            CircuitBreakerState::Open => Err(ConsumerError::CircuitBreakerOpen {
                table: state.batch.target.clone(),
                failures: self.breaker.consecutive_failures(),
                last_error: err.to_string(),
            }),
            CircuitBreakerState::RetryAfter(delay) => {
                warn!(
                    error = %err,
                    batch_id = %state.batch.id,
                    committed = state.committed,
                    remaining = state.batch.len(),
                    ?delay,
                    "Connection lost while writing, reconnecting"
                );
                tokio::select! {
                    _ = self.cancel.cancelled() => Err(ConsumerError::Interrupted),
                    _ = tokio::time::sleep(delay) => Ok(()),
                }
            }
        }
    }

    fn store_failure(&self, batch: &Batch, err: StoreError) -> AttemptError {
        match classify_store_error(&err) {
            RetryDisposition::Retry => AttemptError::Transient(err),
            RetryDisposition::Stop => AttemptError::Fatal(ConsumerError::Store {
                batch_id: batch.id.clone(),
                table: batch.target.clone(),
                source: err,
            }),
        }
    }
}
