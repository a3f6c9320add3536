// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Overflow reservoir: records waiting for the Log File to come back.
//!
//! Records leave the reservoir strictly from the front and only after the
//! writer has confirmed them on the Log File, so arrival order survives
//! any number of failed attempts.
//!
//! The reservoir is volatile unless a snapshot path is configured. With a
//! snapshot, the pending records are mirrored to a JSON side file
//! (`<path>.tmp` written, then renamed into place) and reloaded on startup.

use std::collections::VecDeque;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ReservoirError, Unrecoverable};
use crate::record::FormattedRecord;

const SNAPSHOT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize, Debug)]
struct ReservoirSnapshot {
    version: u32,
    records: Vec<String>,
}

#[derive(Debug, Default)]
pub struct Reservoir {
    records: VecDeque<FormattedRecord>,
    capacity: Option<usize>,
    snapshot_path: Option<PathBuf>,
    dirty: bool,
}

impl Reservoir {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse new records once `capacity` are pending.
    pub fn with_capacity_limit(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }

    /// Mirror pending records to `path`, loading whatever a previous run left there.
    pub fn with_snapshot<P: AsRef<Path>>(mut self, path: P) -> Result<Self, ReservoirError> {
        let path = path.as_ref().to_path_buf();
        let restored = load_snapshot(&path)?;
        if !restored.is_empty() {
            tracing::info!(
                "Restored {} pending records from reservoir snapshot {:?}",
                restored.len(),
                path
            );
        }
        // Restored records arrived before anything accepted by this process.
        for rec in restored.into_iter().rev() {
            self.records.push_front(rec);
        }
        self.snapshot_path = Some(path);
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &FormattedRecord> {
        self.records.iter()
    }

    pub(crate) fn front(&self) -> Option<&FormattedRecord> {
        self.records.front()
    }

    /// Drop the oldest record after it has been confirmed written.
    pub(crate) fn pop_confirmed(&mut self) -> Option<FormattedRecord> {
        let rec = self.records.pop_front();
        if rec.is_some() {
            self.dirty = true;
        }
        rec
    }

    pub(crate) fn push(&mut self, record: FormattedRecord) -> Result<usize, Unrecoverable> {
        if let Some(capacity) = self.capacity {
            if self.records.len() >= capacity {
                return Err(Unrecoverable::BufferExhausted { capacity });
            }
        }
        self.records.push_back(record);
        self.dirty = true;
        Ok(self.records.len())
    }

    /// Bring the snapshot file in line with memory. Best effort; a failed
    /// write leaves the reservoir dirty so the next call tries again.
    pub(crate) fn checkpoint(&mut self) {
        if !self.dirty {
            return;
        }
        let Some(path) = self.snapshot_path.as_deref() else {
            self.dirty = false;
            return;
        };
        match save_snapshot(path, &self.records) {
            Ok(()) => self.dirty = false,
            Err(e) => tracing::warn!(
                "Reservoir snapshot to {:?} failed ({} records pending); until a retry succeeds \
                 a restart may replay records already in the Log File: {}",
                path,
                self.records.len(),
                e
            ),
        }
    }

    pub fn snapshot_is_stale(&self) -> bool {
        self.dirty && self.snapshot_path.is_some()
    }
}

fn load_snapshot(path: &Path) -> Result<Vec<FormattedRecord>, ReservoirError> {
    let data = match fs::read(path) {
        Ok(data) => data,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(ReservoirError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    let snapshot: ReservoirSnapshot = serde_json::from_slice(&data)?;
    if snapshot.version != SNAPSHOT_VERSION {
        return Err(ReservoirError::UnsupportedVersion(snapshot.version));
    }

    snapshot
        .records
        .into_iter()
        .enumerate()
        .map(|(index, line)| {
            FormattedRecord::try_from(line)
                .map_err(|source| ReservoirError::InvalidRecord { index, source })
        })
        .collect()
}

fn save_snapshot(path: &Path, records: &VecDeque<FormattedRecord>) -> io::Result<()> {
    if records.is_empty() {
        return match fs::remove_file(path) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        };
    }

    let snapshot = ReservoirSnapshot {
        version: SNAPSHOT_VERSION,
        records: records.iter().map(|r| r.as_str().to_owned()).collect(),
    };
    let encoded = serde_json::to_vec(&snapshot)?;

    let tmp_path = tmp_path_for(path);
    fs::write(&tmp_path, encoded)?;
    fs::rename(&tmp_path, path)
}

/// `<path>.tmp`, keeping any extension the snapshot already has.
fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}
