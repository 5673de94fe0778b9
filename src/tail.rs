//! Append-to-file writer and incremental tail reader.
//!
//! The writer and reader halves of the log channel, for the append-only-file
//! transport: a native process appends one encoded line per record, and a
//! supervising process polls the file for new content. One line is one
//! record; a line is complete once its `\n` has been written.
//!
//! # Tailing
//!
//! [`read_from`] is stateless: the caller keeps a byte offset between polls
//! and passes it back in. Each call returns the complete records found after
//! the offset plus, when the file ends mid-line, an advisory decode of the
//! unterminated tail. `next_offset` only ever advances past complete lines,
//! so the next poll re-reads the tail and reconciles the advisory record
//! with the fully-flushed one.
//!
//! # Corruption vs. truncation
//!
//! An unterminated final line is truncation: the writer is mid-flush and the
//! bytes are still arriving. An undecodable *complete* line is corruption:
//! it is skipped, counted, and logged, and reading continues. The reader
//! never writes or truncates the file; it does not own it.

use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::codec;
use crate::record::LogRecord;

/// Writes encoded records to an append-only log file.
///
/// Appends do not fsync; tailing latency beats durability for logs. Callers
/// that need durability call [`LogWriter::sync`] themselves.
pub struct LogWriter {
    /// The underlying file handle, opened for append.
    file: File,
    /// Path to the log file.
    path: PathBuf,
}

impl LogWriter {
    /// Opens an existing log file for append, or creates a new one.
    ///
    /// The handle starts positioned at the end of the file, so
    /// [`LogWriter::position`] is a valid cursor even before the first
    /// append.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        // append mode moves the fd offset only when writing; land at the
        // end now so position() does not report 0 on a non-empty log
        file.seek(SeekFrom::End(0))?;

        Ok(LogWriter { file, path })
    }

    /// Appends a message stamped with the current wall-clock time.
    ///
    /// Returns the record that was written, timestamp included.
    pub fn append(&mut self, message: &str) -> io::Result<LogRecord> {
        let record = LogRecord::now(message);
        self.append_record(&record)?;
        Ok(record)
    }

    /// Appends a record with an explicit timestamp.
    pub fn append_record(&mut self, record: &LogRecord) -> io::Result<()> {
        let line = codec::encode_line(record.ts, &record.message);
        writeln!(self.file, "{}", line)
    }

    /// Forces fsync of the log file.
    pub fn sync(&self) -> io::Result<()> {
        self.file.sync_all()
    }

    /// Returns the current byte position in the log file.
    ///
    /// Usable as a [`read_from`] cursor for readers that only want records
    /// appended after this point.
    pub fn position(&mut self) -> io::Result<u64> {
        self.file.stream_position()
    }

    /// Returns the path to the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// The result of one tail poll.
#[derive(Debug)]
pub struct TailRead {
    /// Records decoded from complete lines, in file order.
    pub records: Vec<LogRecord>,
    /// Advisory decode of an unterminated final line, when one exists and
    /// at least its timestamp has arrived.
    pub partial: Option<LogRecord>,
    /// Where the next poll should start: past every complete line seen,
    /// never into the unterminated tail.
    pub next_offset: u64,
    /// Complete lines that could not be decoded and were skipped.
    pub skipped: usize,
}

impl TailRead {
    fn empty(next_offset: u64) -> Self {
        TailRead {
            records: Vec::new(),
            partial: None,
            next_offset,
            skipped: 0,
        }
    }
}

/// Reads records appended after `offset`, tolerating a mid-flush tail.
///
/// A missing file means the writer has not started yet and yields an empty
/// result with `next_offset` 0; an offset at or past EOF yields an empty
/// result with `next_offset` unchanged. Neither is an error.
///
/// Complete lines that are blank are skipped silently. Complete lines that
/// do not decode (or are not UTF-8) are corrupt, not truncated: they are
/// counted in [`TailRead::skipped`] and logged at `warn`. An unterminated
/// final line is decoded leniently into [`TailRead::partial`]; invalid
/// UTF-8 there means a multi-byte character is mid-flush and the line stays
/// pending.
pub fn read_from(path: impl AsRef<Path>, offset: u64) -> io::Result<TailRead> {
    let path = path.as_ref();

    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(TailRead::empty(0)),
        Err(e) => return Err(e),
    };
    let file_len = file.metadata()?.len();
    if offset >= file_len {
        return Ok(TailRead::empty(offset));
    }

    let mut reader = BufReader::new(file);
    reader.seek(SeekFrom::Start(offset))?;

    let mut read = TailRead::empty(offset);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        let bytes_read = reader.read_until(b'\n', &mut buf)?;
        if bytes_read == 0 {
            break;
        }

        if buf.last() != Some(&b'\n') {
            // Unterminated tail: the writer is mid-flush. Decode what has
            // arrived, but leave next_offset before the line so the next
            // poll sees the finished version.
            if let Ok(raw) = std::str::from_utf8(&buf) {
                read.partial = codec::decode_line(raw).ok();
            }
            break;
        }

        read.next_offset += bytes_read as u64;
        match std::str::from_utf8(&buf) {
            Ok(line) if line.trim().is_empty() => {}
            Ok(line) => match codec::decode_line(line) {
                Ok(record) => read.records.push(record),
                Err(e) => {
                    read.skipped += 1;
                    warn!(
                        path = %path.display(),
                        line = %line.trim_end(),
                        error = %e,
                        "Skipping undecodable log line"
                    );
                }
            },
            Err(e) => {
                read.skipped += 1;
                warn!(
                    path = %path.display(),
                    error = %e,
                    "Skipping log line that is not valid UTF-8"
                );
            }
        }
    }

    Ok(read)
}
