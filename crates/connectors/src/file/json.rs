use crate::file::error::FileError;
use model::{execution::progress::JobProgress, records::record::Record};
use serde_json::{Deserializer, Value};
use std::io::Read;
use tracing::debug;

pub const READ_CHUNK_SIZE: usize = 32 * 1024;
pub const MAX_BUFFER_SIZE: usize = 16 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Layout {
    /// `[ {..}, {..} ]`
    Array,
    /// `{..}` or `{..} {..} ...` with optional separators.
    Stream,
}

enum Parsed {
    Value(Value, usize),
    Incomplete,
}

/// Incremental decoder for a file holding one object, an array of objects,
/// or a stream of concatenated objects.
///
/// The decoder keeps a growable window over the input: it reads fixed-size
/// chunks, parses one value at the current offset and discards consumed
/// bytes. A value that cannot complete within `max_buffer` bytes is a
/// format error.
pub struct JsonDecoder<R> {
    reader: R,
    file: String,
    buf: Vec<u8>,
    pos: usize,
    /// Bytes discarded from the front of `buf` so far.
    consumed: u64,
    eof: bool,
    chunk_size: usize,
    max_buffer: usize,
    progress: Option<JobProgress>,
}

impl<R: Read> JsonDecoder<R> {
    pub fn new(reader: R, file: impl Into<String>) -> Self {
        Self {
            reader,
            file: file.into(),
            buf: Vec::with_capacity(READ_CHUNK_SIZE),
            pos: 0,
            consumed: 0,
            eof: false,
            chunk_size: READ_CHUNK_SIZE,
            max_buffer: MAX_BUFFER_SIZE,
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: JobProgress) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn with_max_buffer(mut self, max_buffer: usize) -> Self {
        self.max_buffer = max_buffer;
        self
    }

    pub fn decode<F, E>(mut self, mut on_record: F) -> Result<u64, E>
    where
        F: FnMut(Record) -> Result<(), E>,
        E: From<FileError>,
    {
        let layout = match self.peek_non_ws()? {
            Some(b'[') => {
                self.pos += 1;
                Layout::Array
            }
            Some(b'{') => Layout::Stream,
            _ => {
                return Err(FileError::json_format(
                    &self.file,
                    "file does not begin with an object or array",
                )
                .into());
            }
        };

        let mut count = 0u64;
        loop {
            match (layout, self.peek_non_ws()?) {
                (Layout::Array, Some(b']')) => {
                    self.pos += 1;
                    break;
                }
                (Layout::Array, None) => {
                    return Err(
                        FileError::json_format(&self.file, "unexpected end of array").into(),
                    );
                }
                (Layout::Stream, None) => break,
                _ => {}
            }

            let record = self.next_object()?;
            on_record(record)?;
            count += 1;
            self.report_progress();

            match (layout, self.peek_non_ws()?) {
                (Layout::Array, Some(b',')) => self.pos += 1,
                (Layout::Array, Some(b']')) => {}
                (Layout::Array, _) => {
                    return Err(FileError::json_format(
                        &self.file,
                        "expected ',' or ']' after object",
                    )
                    .into());
                }
                (Layout::Stream, Some(b',')) => self.pos += 1,
                (Layout::Stream, _) => {}
            }
        }

        if layout == Layout::Array && self.peek_non_ws()?.is_some() {
            return Err(FileError::json_format(
                &self.file,
                "extra characters found after end of data",
            )
            .into());
        }

        if let Some(progress) = &self.progress {
            progress.finish();
        }
        debug!(file = %self.file, records = count, "JSON file decoded");
        Ok(count)
    }

    fn next_object(&mut self) -> Result<Record, FileError> {
        loop {
            match self.parse_at_pos()? {
                Parsed::Value(value, len) => {
                    self.pos += len;
                    return match value {
                        Value::Object(map) => Ok(map),
                        other => Err(FileError::NotAnObject {
                            file: self.file.clone(),
                            found: type_name(&other),
                        }),
                    };
                }
                Parsed::Incomplete => {
                    if self.eof {
                        return Err(FileError::json_format(
                            &self.file,
                            "unexpected end of file inside a value",
                        ));
                    }
                    if self.buf.len() - self.pos > self.max_buffer {
                        return Err(FileError::BufferLimit {
                            file: self.file.clone(),
                            limit: self.max_buffer,
                        });
                    }
                    self.fill()?;
                }
            }
        }
    }

    fn parse_at_pos(&self) -> Result<Parsed, FileError> {
        let mut stream = Deserializer::from_slice(&self.buf[self.pos..]).into_iter::<Value>();
        match stream.next() {
            Some(Ok(value)) => Ok(Parsed::Value(value, stream.byte_offset())),
            Some(Err(e)) if e.is_eof() => Ok(Parsed::Incomplete),
            Some(Err(e)) => Err(FileError::JsonSyntax {
                file: self.file.clone(),
                offset: self.consumed + self.pos as u64,
                message: e.to_string(),
            }),
            None => Ok(Parsed::Incomplete),
        }
    }

    /// Skips whitespace, reading more input as needed, and returns the next
    /// byte without consuming it. `None` means end of input.
    fn peek_non_ws(&mut self) -> Result<Option<u8>, FileError> {
        loop {
            while let Some(&b) = self.buf.get(self.pos) {
                if !is_ws(b) {
                    return Ok(Some(b));
                }
                self.pos += 1;
            }
            if self.eof {
                return Ok(None);
            }
            self.fill()?;
        }
    }

    /// Drops consumed bytes and appends one more chunk from the reader.
    fn fill(&mut self) -> Result<(), FileError> {
        if self.pos > 0 {
            self.buf.drain(..self.pos);
            self.consumed += self.pos as u64;
            self.pos = 0;
        }

        let read = (&mut self.reader)
            .take(self.chunk_size as u64)
            .read_to_end(&mut self.buf)
            .map_err(|e| FileError::io(&self.file, e))?;
        if read == 0 {
            self.eof = true;
        }
        Ok(())
    }

    fn report_progress(&self) {
        if let Some(progress) = &self.progress {
            progress.set_current(self.consumed + self.pos as u64);
        }
    }
}

fn is_ws(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n' | b'\r')
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
