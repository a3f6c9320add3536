// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Durable Log Writer.
//!
//! Every append first drains the reservoir, oldest first, then writes the
//! new record. A record leaves the reservoir only once its write is
//! confirmed; if the Log File cannot be opened, or a write fails part way
//! through the drain, the unconfirmed records stay queued and the new
//! record is queued behind them.
//!
//! The writer takes `&mut self` and holds no lock of its own. Callers that
//! share it wrap the whole writer in a single mutex, which serializes the
//! drain/write/queue sequence.

use std::io;

use crate::error::{Result, Unrecoverable};
use crate::record::FormattedRecord;
use crate::reservoir::Reservoir;
use crate::target::{FileTarget, LogTarget, RecordSink};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// The record reached the Log File, after `flushed` older buffered records.
    Persisted { flushed: usize },
    /// The record is held in the reservoir; `pending` records are waiting in total.
    Buffered { pending: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushOutcome {
    pub flushed: usize,
    pub pending: usize,
}

pub struct DurableLogWriter<T: LogTarget = FileTarget> {
    target: T,
    reservoir: Reservoir,
}

impl<T: LogTarget> DurableLogWriter<T> {
    pub fn new(target: T) -> Self {
        Self::with_reservoir(target, Reservoir::new())
    }

    pub fn with_reservoir(target: T, reservoir: Reservoir) -> Self {
        Self { target, reservoir }
    }

    pub fn target(&self) -> &T {
        &self.target
    }

    /// Read-only view of the records still waiting for the Log File.
    pub fn reservoir(&self) -> &Reservoir {
        &self.reservoir
    }

    pub fn pending(&self) -> usize {
        self.reservoir.len()
    }

    /// Append one record, draining the reservoir ahead of it.
    ///
    /// Transient storage failures are absorbed by buffering and reported as
    /// `AppendOutcome::Buffered`. `Err` is only returned when the record
    /// could not be kept at all.
    pub fn append(&mut self, record: FormattedRecord) -> Result<AppendOutcome> {
        // Retry a snapshot left stale by an earlier failure before changing anything.
        self.reservoir.checkpoint();
        let result = self.append_inner(record);
        self.reservoir.checkpoint();
        result
    }

    /// Drain the reservoir without a new record.
    ///
    /// Also retries a stale reservoir snapshot, even when nothing is pending.
    pub fn flush_pending(&mut self) -> Result<FlushOutcome> {
        self.reservoir.checkpoint();
        if self.reservoir.is_empty() {
            return Ok(FlushOutcome {
                flushed: 0,
                pending: 0,
            });
        }

        let result = self.flush_inner();
        self.reservoir.checkpoint();
        result
    }

    fn flush_inner(&mut self) -> Result<FlushOutcome> {
        let mut sink = match self.target.open() {
            Ok(sink) => sink,
            Err(e) => {
                let e = classify(e)?;
                tracing::debug!("Log File still unavailable for flush: {}", e);
                return Ok(FlushOutcome {
                    flushed: 0,
                    pending: self.reservoir.len(),
                });
            }
        };

        let (flushed, failure) = self.drain_into(&mut sink);
        if let Some(e) = failure {
            let e = classify(e)?;
            tracing::warn!(
                "Reservoir flush stopped after {} records, {} still pending: {}",
                flushed,
                self.reservoir.len(),
                e
            );
        }
        Ok(FlushOutcome {
            flushed,
            pending: self.reservoir.len(),
        })
    }

    fn append_inner(&mut self, record: FormattedRecord) -> Result<AppendOutcome> {
        let mut sink = match self.target.open() {
            Ok(sink) => sink,
            Err(e) => return self.defer(record, e),
        };

        let (flushed, failure) = self.drain_into(&mut sink);
        if let Some(e) = failure {
            return self.defer(record, e);
        }

        if let Err(e) = sink.write_record(&record) {
            return self.defer(record, e);
        }

        Ok(AppendOutcome::Persisted { flushed })
    }

    /// Write buffered records oldest first, removing each one as it is confirmed.
    fn drain_into(&mut self, sink: &mut T::Sink) -> (usize, Option<io::Error>) {
        let mut flushed = 0;
        while let Some(pending) = self.reservoir.front() {
            if let Err(e) = sink.write_record(pending) {
                return (flushed, Some(e));
            }
            self.reservoir.pop_confirmed();
            flushed += 1;
        }
        if flushed > 0 {
            tracing::info!("Reservoir dumped: {} buffered records written", flushed);
        }
        (flushed, None)
    }

    fn defer(&mut self, record: FormattedRecord, err: io::Error) -> Result<AppendOutcome> {
        let err = classify(err)?;
        let pending = self.reservoir.push(record)?;
        tracing::warn!(
            "Log File write failed, record saved to reservoir ({} pending): {}",
            pending,
            err
        );
        Ok(AppendOutcome::Buffered { pending })
    }
}

/// Separate retryable storage failures from ones buffering cannot fix.
fn classify(err: io::Error) -> Result<io::Error> {
    match err.kind() {
        io::ErrorKind::InvalidInput | io::ErrorKind::Unsupported => {
            tracing::error!("Log target rejected the request: {}", err);
            Err(Unrecoverable::Misconfigured(err))
        }
        _ => Ok(err),
    }
}
