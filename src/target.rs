// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Log File access.
//!
//! The writer reopens its target on every attempt so that storage which
//! comes back is picked up by the next append without a restart.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::record::FormattedRecord;

/// Something records can be appended to.
pub trait LogTarget: Send {
    type Sink: RecordSink;

    /// Open the destination for appending.
    fn open(&self) -> io::Result<Self::Sink>;
}

/// An open append handle. A record counts as written once `write_record` returns `Ok`.
pub trait RecordSink {
    fn write_record(&mut self, record: &FormattedRecord) -> io::Result<()>;
}

/// Append-only text file on the local filesystem.
#[derive(Debug, Clone)]
pub struct FileTarget {
    path: PathBuf,
    sync: bool,
}

impl FileTarget {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            sync: false,
        }
    }

    /// Fsync each record before it is considered written.
    pub fn with_sync(mut self, sync: bool) -> Self {
        self.sync = sync;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LogTarget for FileTarget {
    type Sink = FileSink;

    fn open(&self) -> io::Result<FileSink> {
        // Parent directories are deliberately not created.
        let mut file = OpenOptions::new()
            .read(true)
            .create(true)
            .append(true)
            .open(&self.path)?;
        let torn = ends_mid_line(&mut file)?;
        if torn {
            tracing::warn!(
                "Log File {:?} ends mid-line; next record starts a new line",
                self.path
            );
        }
        Ok(FileSink {
            file,
            sync: self.sync,
            torn,
        })
    }
}

/// A non-empty file whose last byte is not a newline holds a fragment.
fn ends_mid_line(file: &mut File) -> io::Result<bool> {
    if file.metadata()?.len() == 0 {
        return Ok(false);
    }
    let mut last = [0u8; 1];
    file.seek(SeekFrom::End(-1))?;
    file.read_exact(&mut last)?;
    Ok(last[0] != b'\n')
}

pub struct FileSink {
    file: File,
    sync: bool,
    torn: bool,
}

impl RecordSink for FileSink {
    fn write_record(&mut self, record: &FormattedRecord) -> io::Result<()> {
        append_line(&mut self.file, record.as_bytes(), self.sync, &mut self.torn)
    }
}

/// File operations needed to undo a write that did not complete.
trait AppendFile: Write {
    fn current_len(&self) -> io::Result<u64>;
    fn truncate_to(&mut self, len: u64) -> io::Result<()>;
    fn sync(&self) -> io::Result<()>;
}

impl AppendFile for File {
    fn current_len(&self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }

    fn truncate_to(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }

    fn sync(&self) -> io::Result<()> {
        self.sync_data()
    }
}

/// Append one line. On failure the bytes written so far are cut off again;
/// if that is impossible, `torn` is set and the next line is preceded by a
/// newline so it never shares a line with the fragment.
fn append_line<F: AppendFile>(
    file: &mut F,
    line: &[u8],
    sync: bool,
    torn: &mut bool,
) -> io::Result<()> {
    if *torn {
        file.write_all(b"\n")?;
        *torn = false;
    }

    let start = file.current_len()?;
    let written = file
        .write_all(line)
        .and_then(|()| if sync { file.sync() } else { Ok(()) });

    if let Err(e) = written {
        if let Err(trunc_err) = file.truncate_to(start) {
            // Unknown how much landed; only a grown file can hold a fragment.
            *torn = file.current_len().map_or(true, |len| len > start);
            tracing::warn!(
                "Could not drop partial record after failed write ({}); fragment left: {}",
                trunc_err,
                *torn
            );
        }
        return Err(e);
    }
    Ok(())
}
