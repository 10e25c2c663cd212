use crate::{
    core::{identifiers::JobId, table::TableRef},
    records::record::FieldFilter,
};
use serde::{Deserialize, Serialize};
use std::{
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
};
use thiserror::Error;

pub const DEFAULT_PRIMARY_KEY: &str = "id";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileFormat {
    Json,
    Csv,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unknown format '{0}', valid options are 'csv' and 'json'")]
pub struct UnknownFormat(pub String);

impl FileFormat {
    /// Infers the format from a file extension, defaulting to JSON.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("csv") => FileFormat::Csv,
            _ => FileFormat::Json,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileFormat::Json => "json",
            FileFormat::Csv => "csv",
        }
    }
}

impl FromStr for FileFormat {
    type Err = UnknownFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(FileFormat::Json),
            "csv" => Ok(FileFormat::Csv),
            other => Err(UnknownFormat(other.to_string())),
        }
    }
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Delimited-text options. Ignored for JSON jobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CsvOptions {
    pub delimiter: u8,
    /// The file has no header row; `custom_header` must then be provided.
    pub no_header: bool,
    /// Field names to use instead of (or in the absence of) the file header.
    pub custom_header: Option<Vec<String>>,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            delimiter: b',',
            no_header: false,
            custom_header: None,
        }
    }
}

impl CsvOptions {
    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn with_custom_header(mut self, header: Vec<String>) -> Self {
        self.custom_header = Some(header);
        self
    }

    pub fn without_header(mut self) -> Self {
        self.no_header = true;
        self
    }
}

/// One source file mapped to one destination table.
///
/// Built once during discovery and never mutated afterwards; each job is
/// consumed by exactly one reader unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportJob {
    pub id: JobId,
    pub path: PathBuf,
    pub format: FileFormat,
    pub target: TableRef,
    pub primary_key: String,
    pub fields: Option<FieldFilter>,
    pub csv: CsvOptions,
}

impl ImportJob {
    pub fn new(path: impl Into<PathBuf>, format: FileFormat, target: TableRef) -> Self {
        let path = path.into();
        Self {
            id: JobId::new(target.to_string()),
            path,
            format,
            target,
            primary_key: DEFAULT_PRIMARY_KEY.to_string(),
            fields: None,
            csv: CsvOptions::default(),
        }
    }

    pub fn with_primary_key(mut self, key: impl Into<String>) -> Self {
        self.primary_key = key.into();
        self
    }

    pub fn with_fields(mut self, fields: FieldFilter) -> Self {
        self.fields = Some(fields);
        self
    }

    pub fn with_csv_options(mut self, options: CsvOptions) -> Self {
        self.csv = options;
        self
    }

    pub fn file_name(&self) -> String {
        self.path.display().to_string()
    }
}
