use crate::file::{csv::CsvDecoder, error::FileError, json::JsonDecoder};
use model::{
    execution::{
        job::{FileFormat, ImportJob},
        progress::JobProgress,
    },
    records::record::Record,
};
use std::{fs::File, io::BufReader};

pub mod csv;
pub mod error;
pub mod json;

/// Decodes the file behind `job`, calling `on_record` for every top-level
/// record in file order. Returns the number of records produced.
///
/// Progress totals are set up front (file size for JSON, line count for
/// CSV) and `current` is advanced as the decoder moves through the file.
pub fn decode_file<F, E>(job: &ImportJob, progress: &JobProgress, on_record: F) -> Result<u64, E>
where
    F: FnMut(Record) -> Result<(), E>,
    E: From<FileError>,
{
    let label = job.file_name();
    let file = File::open(&job.path).map_err(|e| FileError::io(&label, e))?;

    match job.format {
        FileFormat::Json => {
            let size = file
                .metadata()
                .map_err(|e| FileError::io(&label, e))?
                .len();
            progress.set_total(size);
            JsonDecoder::new(file, label)
                .with_progress(progress.clone())
                .decode(on_record)
        }
        FileFormat::Csv => {
            let lines = csv::count_lines(BufReader::new(file)).map_err(|e| FileError::io(&label, e))?;
            progress.set_total(lines);
            // Second pass decodes; the first one only counted lines.
            let file = File::open(&job.path).map_err(|e| FileError::io(&label, e))?;
            CsvDecoder::new(BufReader::new(file), label, job.csv.clone())
                .with_progress(progress.clone())
                .decode(on_record)
        }
    }
}
