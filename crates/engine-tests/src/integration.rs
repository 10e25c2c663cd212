#[cfg(test)]
mod tests {
    use crate::{
        import, import_unchecked, test_settings,
        utils::{assert_rows, json_rows, rec, stored},
        write_fixture,
    };
    use connectors::store::memory::MemoryStore;
    use engine_runtime::{execution::summary::ImportStatus, preflight::PreflightOptions};
    use model::{
        core::table::TableRef,
        execution::{
            failure::FailureKind,
            job::{CsvOptions, FileFormat, ImportJob},
            write::ConflictPolicy,
        },
        records::{batch::BatchLimits, record::FieldFilter},
    };
    use serde_json::json;
    use std::sync::Arc;
    use tracing_test::traced_test;

    #[traced_test]
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_json_import_into_new_table() {
        // Scenario: `[{"id":1,"v":"a"},{"id":2,"v":"b"}]` into an empty store
        // Expected Outcome: database and table created, both rows stored,
        // summary reads "2 rows imported in 1 table"
        let dir = tempfile::tempdir().unwrap();
        let path = write_fixture(
            dir.path(),
            "t.json",
            r#"[{"id":1,"v":"a"},{"id":2,"v":"b"}]"#,
        );
        let store = MemoryStore::new();
        let target = TableRef::new("test", "t");
        let job = ImportJob::new(&path, FileFormat::Json, target.clone());

        let report = import(
            Arc::new(store.clone()),
            test_settings(2),
            vec![job],
            PreflightOptions::default(),
        )
        .await;

        assert_eq!(report.status, ImportStatus::Completed, "{:?}", report.failures);
        assert!(report.failures.is_empty());
        assert!(store.has_database("test"));
        assert_rows(
            &store,
            &target,
            vec![json!({"id": 1, "v": "a"}), json!({"id": 2, "v": "b"})],
        );
        assert_eq!(report.summary.to_string(), "2 rows imported in 1 table");
        assert!(store.has_table(&target));
    }

    #[traced_test]
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_csv_import_drops_empty_values() {
        // Scenario: CSV with header `id,name` and rows `1,Alice` and `2,`
        // Expected Outcome: the empty `name` is omitted, values stay strings
        let dir = tempfile::tempdir().unwrap();
        let path = write_fixture(dir.path(), "people.csv", "id,name\n1,Alice\n2,\n");
        let store = MemoryStore::new();
        let target = TableRef::new("test", "people");
        let job = ImportJob::new(&path, FileFormat::Csv, target.clone());

        let report = import(
            Arc::new(store.clone()),
            test_settings(1),
            vec![job],
            PreflightOptions::default(),
        )
        .await;

        assert!(report.is_success(), "{:?}", report.failures);
        assert_rows(
            &store,
            &target,
            vec![json!({"id": "1", "name": "Alice"}), json!({"id": "2"})],
        );
        assert_eq!(report.summary.rows, 2);
    }

    #[traced_test]
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_duplicate_key_fails_under_error_policy() {
        // Scenario: table already holds {"id":1}; import {"id":1,"v":"x"}
        // Expected Outcome: run fails with a conflict naming the key field
        // and both documents; the stored row is untouched
        let dir = tempfile::tempdir().unwrap();
        let path = write_fixture(dir.path(), "t.json", r#"[{"id":1,"v":"x"}]"#);
        let store = MemoryStore::new();
        let target = TableRef::new("test", "t");
        store.ensure_table(&target, "id");
        store.put_row(&target, rec(json!({"id": 1}))).unwrap();
        let job = ImportJob::new(&path, FileFormat::Json, target.clone());

        let report = import_unchecked(&store, test_settings(1), vec![job]).await;

        assert_eq!(report.status, ImportStatus::Failed);
        let failure = report.failures.first().expect("conflict failure");
        assert_eq!(failure.kind, FailureKind::Conflict);
        assert!(failure.message.contains("Duplicate primary key `id`"));
        assert!(failure.message.contains(r#"{"id":1}"#));
        assert!(failure.message.contains(r#"{"id":1,"v":"x"}"#));
        assert_eq!(failure.file.as_deref(), Some(path.as_path()));
        assert_rows(&store, &target, vec![json!({"id": 1})]);
    }

    #[traced_test]
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_duplicate_key_replaced_under_force() {
        // Scenario: same data as above, conflict policy Replace and a forced
        // preflight over the existing table
        // Expected Outcome: the stored row becomes {"id":1,"v":"x"}
        let dir = tempfile::tempdir().unwrap();
        let path = write_fixture(dir.path(), "t.json", r#"[{"id":1,"v":"x"}]"#);
        let store = MemoryStore::new();
        let target = TableRef::new("test", "t");
        store.ensure_table(&target, "id");
        store.put_row(&target, rec(json!({"id": 1}))).unwrap();
        let job = ImportJob::new(&path, FileFormat::Json, target.clone());

        let report = import(
            Arc::new(store.clone()),
            test_settings(1).with_conflict(ConflictPolicy::Replace),
            vec![job],
            PreflightOptions {
                force: true,
                adopt_primary_key: false,
            },
        )
        .await;

        assert!(report.is_success(), "{:?}", report.failures);
        assert_rows(&store, &target, vec![json!({"id": 1, "v": "x"})]);
    }

    #[traced_test]
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_import_twice_with_replace_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_fixture(dir.path(), "t.json", &json_rows(120));
        let store = MemoryStore::new();
        let target = TableRef::new("test", "t");
        let job = ImportJob::new(&path, FileFormat::Json, target.clone());
        let settings = test_settings(3)
            .with_conflict(ConflictPolicy::Replace)
            .with_batch_limits(BatchLimits::new(25, 1024 * 1024));
        let forced = PreflightOptions {
            force: true,
            adopt_primary_key: false,
        };

        let first = import(
            Arc::new(store.clone()),
            settings.clone(),
            vec![job.clone()],
            forced,
        )
        .await;
        assert!(first.is_success(), "{:?}", first.failures);
        let after_first = stored(&store, &target);

        let second = import(Arc::new(store.clone()), settings, vec![job], forced).await;
        assert!(second.is_success(), "{:?}", second.failures);

        assert_eq!(after_first.len(), 120);
        assert_eq!(stored(&store, &target), after_first);
    }

    #[traced_test]
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_existing_table_rejected_without_force() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_fixture(dir.path(), "t.json", r#"[{"id":1}]"#);
        let store = MemoryStore::new();
        let target = TableRef::new("test", "t");
        store.ensure_table(&target, "id");
        let job = ImportJob::new(&path, FileFormat::Json, target.clone());

        let err = crate::try_import(
            Arc::new(store.clone()),
            test_settings(1),
            vec![job],
            PreflightOptions::default(),
        )
        .await
        .expect_err("existing table must be rejected");

        assert!(err.to_string().contains("test.t"), "{err}");
        assert_eq!(store.stats().insert_calls, 0);
    }

    #[traced_test]
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_many_small_batches_keep_every_row() {
        // Scenario: 1,000 rows, batches capped at 7 rows and 200 bytes
        // Expected Outcome: every row stored exactly once and rows written
        // equals the number of records in the file
        let dir = tempfile::tempdir().unwrap();
        let path = write_fixture(dir.path(), "many.json", &json_rows(1000));
        let store = MemoryStore::new();
        let target = TableRef::new("bulk", "many");
        let job = ImportJob::new(&path, FileFormat::Json, target.clone());

        let report = import(
            Arc::new(store.clone()),
            test_settings(4).with_batch_limits(BatchLimits::new(7, 200)),
            vec![job],
            PreflightOptions::default(),
        )
        .await;

        assert!(report.is_success(), "{:?}", report.failures);
        assert_eq!(store.row_count(&target), 1000);
        assert_eq!(report.summary.rows, 1000);
        assert_eq!(report.summary.metrics.rows_written, 1000);
        assert!(report.summary.metrics.batches_written >= 1000 / 7);
    }

    #[traced_test]
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_multiple_files_into_multiple_tables() {
        let dir = tempfile::tempdir().unwrap();
        let users = write_fixture(dir.path(), "app/users.json", &json_rows(30));
        let orders = write_fixture(
            dir.path(),
            "app/orders.csv",
            "id;total;note\n1;10;\n2;20;rush\n3;30;\n",
        );
        let store = MemoryStore::new();
        let users_table = TableRef::new("app", "users");
        let orders_table = TableRef::new("app", "orders");
        let jobs = vec![
            ImportJob::new(&users, FileFormat::Json, users_table.clone()),
            ImportJob::new(&orders, FileFormat::Csv, orders_table.clone())
                .with_csv_options(CsvOptions::default().with_delimiter(b';')),
        ];

        let report = import(
            Arc::new(store.clone()),
            test_settings(2),
            jobs,
            PreflightOptions::default(),
        )
        .await;

        assert!(report.is_success(), "{:?}", report.failures);
        assert_eq!(store.row_count(&users_table), 30);
        assert_rows(
            &store,
            &orders_table,
            vec![
                json!({"id": "1", "total": "10"}),
                json!({"id": "2", "total": "20", "note": "rush"}),
                json!({"id": "3", "total": "30"}),
            ],
        );
        assert_eq!(report.summary.to_string(), "33 rows imported in 2 tables");
    }

    #[traced_test]
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_field_filter_and_custom_primary_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_fixture(
            dir.path(),
            "users.json",
            r#"{"uid":"a","name":"Ann","secret":"x"}
               {"uid":"b","name":"Bob","secret":"y"}"#,
        );
        let store = MemoryStore::new();
        let target = TableRef::new("test", "users");
        let job = ImportJob::new(&path, FileFormat::Json, target.clone())
            .with_primary_key("uid")
            .with_fields(FieldFilter::parse("uid,name"));

        let report = import(
            Arc::new(store.clone()),
            test_settings(1),
            vec![job],
            PreflightOptions::default(),
        )
        .await;

        assert!(report.is_success(), "{:?}", report.failures);
        assert_rows(
            &store,
            &target,
            vec![
                json!({"uid": "a", "name": "Ann"}),
                json!({"uid": "b", "name": "Bob"}),
            ],
        );
    }

    #[traced_test]
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_malformed_json_fails_with_file_context() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_fixture(dir.path(), "bad.json", r#"[{"id":1}, oops]"#);
        let store = MemoryStore::new();
        let job = ImportJob::new(&path, FileFormat::Json, TableRef::new("test", "bad"));

        let report = import(
            Arc::new(store.clone()),
            test_settings(1),
            vec![job],
            PreflightOptions::default(),
        )
        .await;

        assert_eq!(report.status, ImportStatus::Failed);
        let failure = report.failures.first().expect("format failure");
        assert_eq!(failure.kind, FailureKind::Format);
        assert_eq!(failure.file.as_deref(), Some(path.as_path()));
    }

    #[traced_test]
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_csv_column_mismatch_fails_run() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_fixture(dir.path(), "bad.csv", "id,name\n1,Ann\n2,Bob,extra\n");
        let store = MemoryStore::new();
        let job = ImportJob::new(&path, FileFormat::Csv, TableRef::new("test", "bad"));

        let report = import(
            Arc::new(store.clone()),
            test_settings(1),
            vec![job],
            PreflightOptions::default(),
        )
        .await;

        assert_eq!(report.status, ImportStatus::Failed);
        let failure = report.failures.first().expect("format failure");
        assert_eq!(failure.kind, FailureKind::Format);
        assert!(failure.message.contains("line 3"), "{}", failure.message);
    }

    #[traced_test]
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_empty_file_completes_with_zero_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_fixture(dir.path(), "empty.json", "[]");
        let store = MemoryStore::new();
        let target = TableRef::new("test", "empty");
        let job = ImportJob::new(&path, FileFormat::Json, target.clone());

        let report = import(
            Arc::new(store.clone()),
            test_settings(2),
            vec![job],
            PreflightOptions::default(),
        )
        .await;

        assert!(report.is_success(), "{:?}", report.failures);
        assert!(store.has_table(&target));
        assert_eq!(report.summary.to_string(), "0 rows imported in 1 table");
    }
}
