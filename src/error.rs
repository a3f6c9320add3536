// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Error types.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Conditions the writer cannot absorb by buffering.
#[derive(Error, Debug)]
pub enum Unrecoverable {
    /// The reservoir reached its configured capacity; the record was not kept.
    #[error("overflow reservoir is full ({capacity} records pending)")]
    BufferExhausted { capacity: usize },
    /// The log target rejected the request itself rather than failing transiently.
    #[error("log target is misconfigured: {0}")]
    Misconfigured(#[source] io::Error),
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum RecordError {
    #[error("record is not newline-terminated")]
    Unterminated,
}

/// Failures loading a reservoir snapshot at startup.
#[derive(Error, Debug)]
pub enum ReservoirError {
    #[error("IO error on reservoir snapshot {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Reservoir snapshot is malformed: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("Unsupported reservoir snapshot version {0}")]
    UnsupportedVersion(u32),
    #[error("Reservoir snapshot entry {index} is invalid: {source}")]
    InvalidRecord {
        index: usize,
        #[source]
        source: RecordError,
    },
}

pub type Result<T> = std::result::Result<T, Unrecoverable>;
