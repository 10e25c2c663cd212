use crate::file::error::FileError;
use ::csv::{ReaderBuilder, StringRecord};
use model::{
    execution::{job::CsvOptions, progress::JobProgress},
    records::record::Record,
};
use serde_json::Value;
use std::io::{BufRead, Read};
use tracing::{debug, info};

/// Counts lines the way a line iterator would: a trailing fragment without
/// a final newline still counts as a line.
pub fn count_lines<R: BufRead>(mut reader: R) -> std::io::Result<u64> {
    let mut lines = 0u64;
    let mut last = None;
    loop {
        let chunk = reader.fill_buf()?;
        if chunk.is_empty() {
            break;
        }
        lines += chunk.iter().filter(|&&b| b == b'\n').count() as u64;
        last = chunk.last().copied();
        let len = chunk.len();
        reader.consume(len);
    }
    if matches!(last, Some(b) if b != b'\n') {
        lines += 1;
    }
    Ok(lines)
}

/// Decoder for delimited text. Every value is kept as a string and empty
/// values are left out of the record entirely.
pub struct CsvDecoder<R> {
    reader: R,
    file: String,
    options: CsvOptions,
    progress: Option<JobProgress>,
}

impl<R: Read> CsvDecoder<R> {
    pub fn new(reader: R, file: impl Into<String>, options: CsvOptions) -> Self {
        Self {
            reader,
            file: file.into(),
            options,
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: JobProgress) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn decode<F, E>(self, mut on_record: F) -> Result<u64, E>
    where
        F: FnMut(Record) -> Result<(), E>,
        E: From<FileError>,
    {
        let file = self.file;
        let mut reader = ReaderBuilder::new()
            .delimiter(self.options.delimiter)
            .has_headers(false)
            .flexible(true)
            .from_reader(self.reader);
        let csv_err = |source| FileError::Csv {
            file: file.clone(),
            source,
        };

        let mut row = StringRecord::new();
        let file_header = if self.options.no_header {
            None
        } else if reader.read_record(&mut row).map_err(csv_err)? {
            Some(row.iter().map(str::to_string).collect::<Vec<_>>())
        } else {
            None
        };

        let header = match (self.options.custom_header, file_header) {
            (Some(custom), file_header) => {
                if let Some(ignored) = file_header {
                    info!(file = %file, header = ?ignored, "Ignoring header row");
                }
                custom
            }
            (None, Some(header)) => header,
            (None, None) => {
                return Err(FileError::MissingHeader { file: file.clone() }.into());
            }
        };

        let mut count = 0u64;
        while reader.read_record(&mut row).map_err(csv_err)? {
            let line = row.position().map(|p| p.line()).unwrap_or_default();
            if let Some(progress) = &self.progress {
                progress.set_current(line);
            }

            if row.len() != header.len() {
                return Err(FileError::ColumnCount {
                    file: file.clone(),
                    line,
                }
                .into());
            }

            let record: Record = header
                .iter()
                .zip(row.iter())
                .filter(|(_, value)| !value.is_empty())
                .map(|(name, value)| (name.clone(), Value::String(value.to_string())))
                .collect();

            on_record(record)?;
            count += 1;
        }

        if let Some(progress) = &self.progress {
            progress.finish();
        }
        debug!(file = %file, records = count, "CSV file decoded");
        Ok(count)
    }
}
