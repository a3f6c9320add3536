// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! reservoir-kernel: timestamped append-only logging with an in-memory
//! overflow reservoir that absorbs storage outages without losing records.

pub mod error;
pub mod record;
pub mod reservoir;
pub mod target;
pub mod writer;

pub use error::{RecordError, ReservoirError, Unrecoverable};
pub use record::{FormattedRecord, Submission, TIMESTAMP_FORMAT};
pub use reservoir::Reservoir;
pub use target::{FileTarget, LogTarget, RecordSink};
pub use writer::{AppendOutcome, DurableLogWriter, FlushOutcome};
