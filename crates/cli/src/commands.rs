use crate::{discovery::TableFilter, error::CliError};
use clap::{Args, Subcommand};
use connectors::store::ConnectionSettings;
use engine_core::settings::ImportSettings;
use model::{
    core::table::TableRef,
    execution::{
        job::{CsvOptions, FileFormat, ImportJob},
        write::{ConflictPolicy, Durability},
    },
    records::record::FieldFilter,
};
use std::{num::NonZeroUsize, path::PathBuf};

const DEFAULT_PORT: u16 = 5432;

#[derive(Subcommand)]
pub enum Commands {
    /// Load a directory tree or a single JSON/CSV file into the store
    Import(ImportArgs),
    /// Connect to the store and list its databases
    TestConn {
        #[command(flatten)]
        connection: ConnectionArgs,
    },
}

#[derive(Args, Debug, Clone)]
pub struct ConnectionArgs {
    #[arg(
        short = 'c',
        long = "connect",
        value_name = "HOST:PORT",
        env = "BULKLOAD_CONNECT",
        default_value = "localhost:5432",
        help = "Host and client port of the store to connect to"
    )]
    pub connect: String,

    #[arg(long, env = "BULKLOAD_USER", default_value = "postgres")]
    pub user: String,

    #[arg(long, env = "BULKLOAD_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    #[arg(
        long,
        env = "BULKLOAD_DATABASE",
        default_value = "postgres",
        help = "Database to connect to; imported databases become schemas inside it"
    )]
    pub database: String,

    #[arg(long, help = "Negotiate TLS with the server")]
    pub tls: bool,
}

impl ConnectionArgs {
    pub fn settings(&self) -> Result<ConnectionSettings, CliError> {
        let (host, port) = parse_connect(&self.connect)?;
        Ok(ConnectionSettings::new(host, port)
            .with_user(&self.user)
            .with_password(self.password.clone())
            .with_database(&self.database)
            .with_tls(self.tls))
    }
}

fn parse_connect(value: &str) -> Result<(String, u16), CliError> {
    match value.rsplit_once(':') {
        None => Ok((value.to_string(), DEFAULT_PORT)),
        Some((host, port)) => {
            let port = port.parse::<u16>().map_err(|_| {
                CliError::usage(format!("Error: Invalid port in --connect option: {value}"))
            })?;
            if host.is_empty() {
                return Err(CliError::usage(format!(
                    "Error: Invalid host in --connect option: {value}"
                )));
            }
            Ok((host.to_string(), port))
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct ImportArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    #[arg(
        long,
        default_value = "8",
        help = "Number of client connections to use"
    )]
    pub clients: NonZeroUsize,

    #[arg(long, help = "Use hard durability writes (slower, but less memory consumption on the server)")]
    pub hard_durability: bool,

    #[arg(long, help = "Import data even if a table already exists, and overwrite duplicate primary keys")]
    pub force: bool,

    #[arg(long, help = "Log debugging output")]
    pub debug: bool,

    #[arg(short = 'd', long, value_name = "DIR", help = "Directory to import data from")]
    pub directory: Option<PathBuf>,

    #[arg(
        short = 'i',
        long = "import",
        value_name = "DB | DB.TABLE",
        help = "Limit a directory import to the given database or table (may be repeated)"
    )]
    pub tables: Vec<String>,

    #[arg(short = 'f', long, value_name = "FILE", help = "File to import data from")]
    pub file: Option<PathBuf>,

    #[arg(long, value_name = "json | csv", help = "Format of the file (default json, or csv for a .csv extension)")]
    pub format: Option<FileFormat>,

    #[arg(long, value_name = "DB.TABLE", help = "Table to import the file into")]
    pub table: Option<String>,

    #[arg(long, value_name = "KEY", help = "Primary key of the destination table (default id)")]
    pub pkey: Option<String>,

    #[arg(long, value_name = "FIELD,FIELD...", help = "Limit which fields are imported")]
    pub fields: Option<String>,

    #[arg(long, value_name = "CHARACTER", help = "Field delimiter of a CSV file (default ',', '\\t' for tab)")]
    pub delimiter: Option<String>,

    #[arg(long, help = "The CSV file has no header row; requires --custom-header")]
    pub no_header: bool,

    #[arg(long, value_name = "FIELD,FIELD...", help = "Field names to use instead of the CSV header row")]
    pub custom_header: Option<String>,
}

/// Where the jobs of an import come from, after option validation.
#[derive(Debug, Clone, PartialEq)]
pub enum Source {
    Directory {
        root: PathBuf,
        filters: Vec<TableFilter>,
        fields: Option<FieldFilter>,
    },
    File {
        job: ImportJob,
        /// `--pkey` was given; otherwise an existing table's key is adopted.
        explicit_key: bool,
    },
}

impl ImportArgs {
    pub fn import_settings(&self) -> Result<ImportSettings, CliError> {
        let durability = if self.hard_durability {
            Durability::Hard
        } else {
            Durability::Soft
        };
        Ok(ImportSettings::new(self.connection.settings()?)
            .with_clients(self.clients)
            .with_durability(durability)
            .with_conflict(ConflictPolicy::from_force(self.force)))
    }

    pub fn source(&self) -> Result<Source, CliError> {
        match (&self.directory, &self.file) {
            (Some(_), Some(_)) => Err(CliError::usage(
                "Error: --file option is not valid when importing a directory",
            )),
            (Some(dir), None) => self.directory_source(dir),
            (None, Some(file)) => self.file_source(file),
            (None, None) => Err(CliError::usage(
                "Error: Must specify a source to import from using either --file or --directory",
            )),
        }
    }

    fn directory_source(&self, dir: &PathBuf) -> Result<Source, CliError> {
        let file_only = [
            ("--format", self.format.is_some()),
            ("--table", self.table.is_some()),
            ("--pkey", self.pkey.is_some()),
            ("--delimiter", self.delimiter.is_some()),
            ("--no-header", self.no_header),
            ("--custom-header", self.custom_header.is_some()),
        ];
        if let Some((flag, _)) = file_only.iter().find(|(_, set)| *set) {
            return Err(CliError::usage(format!(
                "Error: {flag} option is not valid when importing a directory"
            )));
        }
        if !dir.is_dir() {
            return Err(CliError::usage(format!(
                "Error: Directory to import does not exist: {}",
                dir.display()
            )));
        }

        let filters = self
            .tables
            .iter()
            .map(|t| TableFilter::parse(t))
            .collect::<Result<Vec<_>, _>>()?;

        let fields = match &self.fields {
            None => None,
            Some(list) => match filters.as_slice() {
                [TableFilter { table: Some(_), .. }] => Some(FieldFilter::parse(list)),
                _ => {
                    return Err(CliError::usage(
                        "Error: Can only use the --fields option when importing a single table",
                    ));
                }
            },
        };

        Ok(Source::Directory {
            root: dir.clone(),
            filters,
            fields,
        })
    }

    fn file_source(&self, file: &PathBuf) -> Result<Source, CliError> {
        if !self.tables.is_empty() {
            return Err(CliError::usage(
                "Error: --import option is not valid when importing a single file",
            ));
        }
        if !file.is_file() {
            return Err(CliError::usage(format!(
                "Error: File to import does not exist: {}",
                file.display()
            )));
        }

        let format = self.format.unwrap_or_else(|| FileFormat::from_path(file));
        let table = self.table.as_deref().ok_or_else(|| {
            CliError::usage(
                "Error: Must specify a destination table to import into using the --table option",
            )
        })?;
        let target: TableRef = table.parse()?;

        let mut job = ImportJob::new(file, format, target);
        if let Some(key) = &self.pkey {
            job = job.with_primary_key(key.clone());
        }
        if let Some(list) = &self.fields {
            job = job.with_fields(FieldFilter::parse(list));
        }
        match format {
            FileFormat::Csv => job = job.with_csv_options(self.csv_options()?),
            FileFormat::Json => {
                let csv_only = [
                    ("--delimiter", self.delimiter.is_some()),
                    ("--no-header", self.no_header),
                    ("--custom-header", self.custom_header.is_some()),
                ];
                if let Some((flag, _)) = csv_only.iter().find(|(_, set)| *set) {
                    return Err(CliError::usage(format!(
                        "Error: {flag} option is only valid for CSV file formats"
                    )));
                }
            }
        }

        Ok(Source::File {
            job,
            explicit_key: self.pkey.is_some(),
        })
    }

    fn csv_options(&self) -> Result<CsvOptions, CliError> {
        let mut options = CsvOptions::default();
        if let Some(delimiter) = &self.delimiter {
            options = options.with_delimiter(parse_delimiter(delimiter)?);
        }
        if let Some(header) = &self.custom_header {
            options = options.with_custom_header(
                header.split(',').map(|field| field.trim().to_string()).collect(),
            );
        }
        if self.no_header {
            if options.custom_header.is_none() {
                return Err(CliError::usage(
                    "Error: Cannot import a CSV file with --no-header and no --custom-header option",
                ));
            }
            options = options.without_header();
        }
        Ok(options)
    }
}

fn parse_delimiter(value: &str) -> Result<u8, CliError> {
    match value.as_bytes() {
        [byte] => Ok(*byte),
        b"\\t" => Ok(b'\t'),
        _ => Err(CliError::usage(
            "Error: Specify exactly one character for the --delimiter option",
        )),
    }
}
