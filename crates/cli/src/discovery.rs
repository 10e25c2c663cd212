//! Finds the jobs of a directory import.
//!
//! The expected layout is `DIR/<db>/<table>.{json,csv}`, each data file next
//! to a `<table>.info` file carrying the table's primary key. Anything else
//! is skipped and reported back as ignored.

use crate::error::CliError;
use model::{
    core::table::TableRef,
    execution::job::{FileFormat, ImportJob},
    records::record::FieldFilter,
};
use serde::Deserialize;
use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
};
use tracing::debug;

const INFO_EXTENSION: &str = "info";

/// A `-i db` or `-i db.table` restriction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableFilter {
    pub db: String,
    pub table: Option<String>,
}

impl TableFilter {
    pub fn parse(value: &str) -> Result<Self, CliError> {
        if !value.contains('.') {
            if value.is_empty() {
                return Err(CliError::usage("Error: Invalid empty --import option"));
            }
            return Ok(Self {
                db: value.to_string(),
                table: None,
            });
        }
        let target: TableRef = value.parse()?;
        Ok(Self {
            db: target.db,
            table: Some(target.table),
        })
    }

    fn covers_db(&self, db: &str) -> bool {
        self.db == db
    }

    fn covers(&self, target: &TableRef) -> bool {
        self.db == target.db && self.table.as_ref().is_none_or(|t| *t == target.table)
    }
}

#[derive(Debug, Default)]
pub struct Discovery {
    pub jobs: Vec<ImportJob>,
    pub ignored: Vec<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct InfoFile {
    primary_key: String,
}

pub fn discover(
    root: &Path,
    filters: &[TableFilter],
    fields: Option<&FieldFilter>,
) -> Result<Discovery, CliError> {
    let mut found = Discovery::default();
    let mut seen: HashSet<TableRef> = HashSet::new();

    for entry in sorted_entries(root)? {
        if !entry.is_dir() {
            found.ignored.push(entry);
            continue;
        }
        let Some(db) = file_name(&entry) else {
            found.ignored.push(entry);
            continue;
        };
        if !filters.is_empty() && !filters.iter().any(|f| f.covers_db(&db)) {
            debug!(db, "Skipping database not selected for import");
            continue;
        }

        for path in sorted_entries(&entry)? {
            let Some((table, format)) = data_file(&path) else {
                if !is_info_file(&path) {
                    found.ignored.push(path);
                }
                continue;
            };
            let info_path = path.with_extension(INFO_EXTENSION);
            if !info_path.is_file() {
                found.ignored.push(path);
                continue;
            }

            let target = TableRef::new(db.clone(), table);
            if !filters.is_empty() && !filters.iter().any(|f| f.covers(&target)) {
                continue;
            }
            if !seen.insert(target.clone()) {
                return Err(CliError::DuplicateTable(target));
            }

            let info = read_info(&info_path)?;
            let mut job = ImportJob::new(&path, format, target).with_primary_key(info.primary_key);
            if let Some(fields) = fields {
                job = job.with_fields(fields.clone());
            }
            debug!(file = %path.display(), table = %job.target, "Discovered import job");
            found.jobs.push(job);
        }
    }

    Ok(found)
}

fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>, CliError> {
    let mut paths = fs::read_dir(dir)
        .map_err(|e| CliError::io(dir, e))?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| CliError::io(dir, e))?;
    paths.sort();
    Ok(paths)
}

fn file_name(path: &Path) -> Option<String> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
}

/// `<table>.json` or `<table>.csv` with exactly one dot in the name.
fn data_file(path: &Path) -> Option<(String, FileFormat)> {
    if path.is_dir() {
        return None;
    }
    let name = file_name(path)?;
    let (table, ext) = name.split_once('.')?;
    if table.is_empty() || ext.contains('.') {
        return None;
    }
    let format = match ext {
        "json" => FileFormat::Json,
        "csv" => FileFormat::Csv,
        _ => return None,
    };
    Some((table.to_string(), format))
}

fn is_info_file(path: &Path) -> bool {
    path.is_file()
        && file_name(path).is_some_and(|name| {
            name.split_once('.')
                .is_some_and(|(stem, ext)| !stem.is_empty() && ext == INFO_EXTENSION)
        })
}

fn read_info(path: &Path) -> Result<InfoFile, CliError> {
    let raw = fs::read_to_string(path).map_err(|e| CliError::io(path, e))?;
    serde_json::from_str(&raw).map_err(|source| CliError::InfoFile {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(root: &Path, rel: &str, contents: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    fn export_tree() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(root, "README.txt", "top-level files are ignored");
        touch(root, "app/users.json", "[]");
        touch(root, "app/users.info", r#"{"primary_key": "uid"}"#);
        touch(root, "app/orders.csv", "id\n");
        touch(root, "app/orders.info", r#"{"primary_key": "id", "indexes": []}"#);
        touch(root, "app/notes.json", "[]");
        touch(root, "app/archive.tar.gz", "");
        touch(root, "app/nested/deep.json", "[]");
        touch(root, "logs/events.json", "[]");
        touch(root, "logs/events.info", r#"{"primary_key": "id"}"#);
        dir
    }

    fn targets(found: &Discovery) -> Vec<String> {
        found.jobs.iter().map(|j| j.target.to_string()).collect()
    }

    #[test]
    fn discovers_jobs_with_sidecars() {
        let dir = export_tree();
        let found = discover(dir.path(), &[], None).unwrap();

        assert_eq!(targets(&found), vec!["app.orders", "app.users", "logs.events"]);
        let users = &found.jobs[1];
        assert_eq!(users.primary_key, "uid");
        assert_eq!(users.format, FileFormat::Json);
        assert_eq!(found.jobs[0].format, FileFormat::Csv);
    }

    #[test]
    fn reports_ignored_files() {
        let dir = export_tree();
        let found = discover(dir.path(), &[], None).unwrap();

        let ignored: Vec<String> = found
            .ignored
            .iter()
            .map(|p| {
                p.strip_prefix(dir.path())
                    .unwrap()
                    .to_string_lossy()
                    .into_owned()
            })
            .collect();
        assert_eq!(
            ignored,
            vec!["README.txt", "app/archive.tar.gz", "app/nested", "app/notes.json"]
        );
    }

    #[test]
    fn filters_by_db_and_table() {
        let dir = export_tree();

        let found = discover(dir.path(), &[TableFilter::parse("logs").unwrap()], None).unwrap();
        assert_eq!(targets(&found), vec!["logs.events"]);

        let only_users = [TableFilter::parse("app.users").unwrap()];
        let fields = FieldFilter::parse("uid");
        let found = discover(dir.path(), &only_users, Some(&fields)).unwrap();
        assert_eq!(targets(&found), vec!["app.users"]);
        assert_eq!(found.jobs[0].fields.as_ref(), Some(&fields));
    }

    #[test]
    fn rejects_duplicate_tables() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "app/users.json", "[]");
        touch(dir.path(), "app/users.csv", "id\n");
        touch(dir.path(), "app/users.info", r#"{"primary_key": "id"}"#);

        let err = discover(dir.path(), &[], None).unwrap_err();
        assert!(matches!(err, CliError::DuplicateTable(ref t) if t.to_string() == "app.users"));
    }

    #[test]
    fn invalid_info_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "app/users.json", "[]");
        touch(dir.path(), "app/users.info", r#"{"pk": "id"}"#);

        let err = discover(dir.path(), &[], None).unwrap_err();
        assert!(matches!(err, CliError::InfoFile { .. }));
    }

    #[test]
    fn parses_table_filters() {
        assert_eq!(
            TableFilter::parse("app").unwrap(),
            TableFilter {
                db: "app".into(),
                table: None
            }
        );
        assert_eq!(
            TableFilter::parse("app.users").unwrap().table.as_deref(),
            Some("users")
        );
        assert!(TableFilter::parse("app.").is_err());
        assert!(TableFilter::parse("").is_err());
    }
}
