//! JSON-lines element source.
//!
//! One element per line, tagged by `"kind"`:
//!
//! ```text
//! {"kind":"vertex","id":"v1","label":"station","partition_key":"west","properties":{"name":"A"}}
//! {"kind":"edge","id":"e1","label":"route","partition_key":"west","source_id":"v1","target_id":"v2"}
//! ```
//!
//! Blank lines are skipped. A line that does not parse, including one that is
//! not valid UTF-8, is logged with its row number and counted as rejected;
//! reading continues with the next line. I/O errors end the read.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::element::GraphElement;

/// Rows logged at debug level before the reader goes quiet, unless verbose.
const PREVIEW_ROWS: u64 = 5;

/// Reads [`GraphElement`]s in batches from a line-oriented source.
pub struct ElementReader<R: BufRead> {
    reader: R,
    buf: Vec<u8>,
    row: u64,
    rows_read: u64,
    rows_rejected: u64,
    verbose: bool,
    exhausted: bool,
}

impl ElementReader<BufReader<File>> {
    /// Open a JSON-lines file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("Failed to open element file {}", path.display()))?;
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: BufRead> ElementReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::new(),
            row: 0,
            rows_read: 0,
            rows_rejected: 0,
            verbose: false,
            exhausted: false,
        }
    }

    /// Log every parsed element instead of only the first few.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Elements parsed so far.
    pub fn rows_read(&self) -> u64 {
        self.rows_read
    }

    /// Lines skipped because they did not parse.
    pub fn rows_rejected(&self) -> u64 {
        self.rows_rejected
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Read up to `batch_size` elements. An empty vector means the source is exhausted.
    pub fn next_batch(&mut self, batch_size: usize) -> Result<Vec<Arc<GraphElement>>> {
        let mut batch = Vec::with_capacity(batch_size.min(1024));
        while batch.len() < batch_size {
            self.buf.clear();
            let read = self
                .reader
                .read_until(b'\n', &mut self.buf)
                .with_context(|| format!("Failed to read row {}", self.row + 1))?;
            if read == 0 {
                self.exhausted = true;
                break;
            }
            self.row += 1;

            let line = match std::str::from_utf8(&self.buf) {
                Ok(line) => line.trim(),
                Err(e) => {
                    self.rows_rejected += 1;
                    tracing::warn!(row = self.row, error = %e, "Skipping row that is not UTF-8");
                    continue;
                }
            };
            if line.is_empty() {
                continue;
            }

            match serde_json::from_str::<GraphElement>(line) {
                Ok(element) => {
                    self.rows_read += 1;
                    if self.verbose || self.rows_read <= PREVIEW_ROWS {
                        tracing::debug!(row = self.row, element = %element, "Parsed element");
                    }
                    batch.push(Arc::new(element));
                }
                Err(e) => {
                    self.rows_rejected += 1;
                    tracing::warn!(row = self.row, error = %e, "Skipping malformed row");
                }
            }
        }
        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};

    const ROWS: &str = r#"{"kind":"vertex","id":"v1","label":"station","partition_key":"west","properties":{"name":"A"}}

{"kind":"vertex","id":"v2","label":"station","partition_key":"east"}
not json
{"kind":"edge","id":"e1","label":"route","partition_key":"west","source_id":"v1","target_id":"v2","properties":{"km":12}}
{"kind":"widget","id":"w1"}
"#;

    #[test]
    fn test_batches_skip_blank_and_malformed_rows() {
        let mut reader = ElementReader::new(Cursor::new(ROWS));

        let first = reader.next_batch(2).unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].id(), "v1");
        assert_eq!(first[1].id(), "v2");
        assert!(!reader.is_exhausted());

        let second = reader.next_batch(2).unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].id(), "e1");
        assert!(!second[0].is_vertex());
        assert!(reader.is_exhausted());

        assert!(reader.next_batch(2).unwrap().is_empty());
        assert_eq!(reader.rows_read(), 3);
        assert_eq!(reader.rows_rejected(), 2);
    }

    #[test]
    fn test_invalid_utf8_row_is_rejected_and_reading_continues() {
        let mut input = Vec::new();
        input.extend_from_slice(br#"{"kind":"vertex","id":"v1","label":"station","partition_key":"west"}"#);
        input.extend_from_slice(b"\n\xFF\xFE\n");
        input.extend_from_slice(br#"{"kind":"vertex","id":"v2","label":"station","partition_key":"east"}"#);

        let mut reader = ElementReader::new(Cursor::new(input));
        let batch = reader.next_batch(10).unwrap();

        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].id(), "v1");
        assert_eq!(batch[1].id(), "v2");
        assert_eq!(reader.rows_read(), 2);
        assert_eq!(reader.rows_rejected(), 1);
        assert!(reader.is_exhausted());
    }

    #[test]
    fn test_io_error_ends_the_read() {
        struct Broken;
        impl std::io::Read for Broken {
            fn read(&mut self, _: &mut [u8]) -> std::io::Result<usize> {
                Err(std::io::Error::new(std::io::ErrorKind::Other, "disk gone"))
            }
        }

        let mut reader = ElementReader::new(std::io::BufReader::new(Broken));
        let err = reader.next_batch(10).unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to read row 1"));
        assert!(format!("{:#}", err).contains("disk gone"));
    }

    #[test]
    fn test_open_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(ROWS.as_bytes()).unwrap();

        let mut reader = ElementReader::open(file.path()).unwrap().with_verbose(true);
        let batch = reader.next_batch(100).unwrap();
        assert_eq!(batch.len(), 3);
        assert!(reader.is_exhausted());
    }

    #[test]
    fn test_open_missing_file_names_path() {
        let err = ElementReader::open("/nonexistent/elements.jsonl").err().unwrap();
        assert!(err.to_string().contains("/nonexistent/elements.jsonl"));
    }
}
