// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Submissions and their persisted line form.

use std::fmt;

use chrono::{Local, NaiveDateTime};

use crate::error::RecordError;

/// Arrival timestamp layout, second precision, local time.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One unit of incoming data, stamped at receipt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    payload: Vec<u8>,
    received_at: NaiveDateTime,
}

impl Submission {
    pub fn new(payload: impl Into<Vec<u8>>, received_at: NaiveDateTime) -> Self {
        Self {
            payload: payload.into(),
            received_at,
        }
    }

    /// Stamps the payload with the current wall-clock time.
    pub fn received_now(payload: impl Into<Vec<u8>>) -> Self {
        Self::new(payload, Local::now().naive_local())
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn received_at(&self) -> NaiveDateTime {
        self.received_at
    }

    /// Renders `"<timestamp> <payload>\n"`.
    ///
    /// Invalid UTF-8 in the payload is replaced rather than rejected.
    pub fn format(&self) -> FormattedRecord {
        let text = String::from_utf8_lossy(&self.payload);
        FormattedRecord(format!(
            "{} {}\n",
            self.received_at.format(TIMESTAMP_FORMAT),
            text
        ))
    }
}

/// A newline-terminated log line. The unit of persistence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormattedRecord(String);

impl FormattedRecord {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// The line without its terminator.
    pub fn line(&self) -> &str {
        &self.0[..self.0.len() - 1]
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl TryFrom<String> for FormattedRecord {
    type Error = RecordError;

    fn try_from(line: String) -> Result<Self, Self::Error> {
        if line.ends_with('\n') {
            Ok(Self(line))
        } else {
            Err(RecordError::Unterminated)
        }
    }
}

impl fmt::Display for FormattedRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.line())
    }
}
