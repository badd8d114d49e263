use crate::dialect::Dialect;
use std::io::{Read, Write};
use std::time::Duration;

/// One CSV record, addressed by zero-based field index.
pub type Row = Vec<String>;

/// Result of running a row through a stage or the whole pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowOutcome {
    /// Keep going with this (possibly rewritten) row
    Keep(Row),
    /// Emit nothing for this input row
    Drop,
}

impl RowOutcome {
    pub fn is_drop(&self) -> bool {
        matches!(self, RowOutcome::Drop)
    }

    pub fn into_row(self) -> Option<Row> {
        match self {
            RowOutcome::Keep(row) => Some(row),
            RowOutcome::Drop => None,
        }
    }
}

/// What a stage's `exit` hook decides about a failure it was shown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitAction {
    /// Let the failure (if any) continue outwards
    Propagate,
    /// Stop the failure here; outer stages see a clean run
    Swallow,
}

/// Context handed to every stage hook.
///
/// Carries the shared `-A` arguments and CSV reader/writer factories bound
/// to the run's dialect, so stages read and write side files the same way
/// the main stream is handled.
#[derive(Debug, Clone, Default)]
pub struct StageContext {
    args: Vec<String>,
    dialect: Dialect,
}

impl StageContext {
    pub fn new(args: Vec<String>, dialect: Dialect) -> Self {
        StageContext { args, dialect }
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn reader<R: Read>(&self, input: R) -> csv::Reader<R> {
        self.dialect.reader(input)
    }

    pub fn writer<W: Write>(&self, output: W) -> csv::Writer<W> {
        self.dialect.writer(output)
    }
}

/// Runtime statistics
#[derive(Debug, Default, Clone)]
pub struct ProcessingStats {
    pub records_read: usize,
    pub records_dropped: usize,
    pub records_written: usize,
    pub processing_time: Duration,
}
