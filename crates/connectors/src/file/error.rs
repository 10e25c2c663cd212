use thiserror::Error;

/// Errors raised while decoding a source file. Every variant is fatal to
/// the job that owns the file.
#[derive(Debug, Error)]
pub enum FileError {
    #[error("I/O error reading '{file}': {source}")]
    Io {
        file: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON format not recognized in '{file}': {reason}")]
    JsonFormat { file: String, reason: String },

    #[error("Invalid JSON in '{file}' in the value starting at byte {offset}: {message}")]
    JsonSyntax {
        file: String,
        offset: u64,
        message: String,
    },

    #[error("Invalid input in '{file}', expected an object, but got {found}")]
    NotAnObject { file: String, found: &'static str },

    #[error("JSON value in '{file}' did not complete within the {limit}-byte buffer limit")]
    BufferLimit { file: String, limit: usize },

    #[error("File '{file}' line {line} has an inconsistent number of columns")]
    ColumnCount { file: String, line: u64 },

    #[error("No field name information available for '{file}'")]
    MissingHeader { file: String },

    #[error("CSV error in '{file}': {source}")]
    Csv {
        file: String,
        #[source]
        source: csv::Error,
    },
}

impl FileError {
    pub fn io(file: &str, source: std::io::Error) -> Self {
        FileError::Io {
            file: file.to_string(),
            source,
        }
    }

    pub fn json_format(file: &str, reason: impl Into<String>) -> Self {
        FileError::JsonFormat {
            file: file.to_string(),
            reason: reason.into(),
        }
    }
}
