use connectors::store::error::StoreError;
use engine_core::retry::RetryDisposition;
use tokio_postgres::{Error as PgError, error::SqlState};

/// Splits store errors into the transient (reconnect and retry) and the
/// application class (never retried).
pub fn classify_store_error(err: &StoreError) -> RetryDisposition {
    match err {
        StoreError::Connection(_) => RetryDisposition::Retry,
        StoreError::Tls(_) => RetryDisposition::Retry,
        StoreError::Postgres(pg_err) => classify_pg_error(pg_err),
        StoreError::DatabaseNotFound(_)
        | StoreError::DatabaseExists(_)
        | StoreError::TableNotFound(_)
        | StoreError::TableExists(_)
        | StoreError::Application(_)
        | StoreError::InvalidSettings(_) => RetryDisposition::Stop,
    }
}

pub fn classify_pg_error(err: &PgError) -> RetryDisposition {
    if err.is_closed() {
        return RetryDisposition::Retry;
    }

    if let Some(code) = err.code()
        && is_retryable_pg_code(code)
    {
        return RetryDisposition::Retry;
    }

    RetryDisposition::Stop
}

fn is_retryable_pg_code(code: &SqlState) -> bool {
    matches!(
        *code,
        SqlState::T_R_SERIALIZATION_FAILURE
            | SqlState::T_R_DEADLOCK_DETECTED
            | SqlState::LOCK_NOT_AVAILABLE
            | SqlState::TOO_MANY_CONNECTIONS
            | SqlState::ADMIN_SHUTDOWN
            | SqlState::CRASH_SHUTDOWN
            | SqlState::CANNOT_CONNECT_NOW
            | SqlState::CONNECTION_FAILURE
            | SqlState::CONNECTION_DOES_NOT_EXIST
            | SqlState::SQLCLIENT_UNABLE_TO_ESTABLISH_SQLCONNECTION
            | SqlState::SQLSERVER_REJECTED_ESTABLISHMENT_OF_SQLCONNECTION
            | SqlState::CONNECTION_EXCEPTION
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::core::table::TableRef;

    #[test]
    fn connection_errors_are_retried() {
        assert_eq!(
            classify_store_error(&StoreError::connection("reset")),
            RetryDisposition::Retry
        );
    }

    #[test]
    fn application_errors_stop() {
        assert_eq!(
            classify_store_error(&StoreError::TableNotFound(TableRef::new("a", "b"))),
            RetryDisposition::Stop
        );
        assert_eq!(
            classify_store_error(&StoreError::Application("bad".into())),
            RetryDisposition::Stop
        );
    }

    #[test]
    fn deadlocks_are_transient() {
        assert!(is_retryable_pg_code(&SqlState::T_R_DEADLOCK_DETECTED));
        assert!(!is_retryable_pg_code(&SqlState::UNIQUE_VIOLATION));
    }
}
