// src/pipeline/stream.rs
use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, trace};

use crate::error::{Failure, ProcessingError};
use crate::pipeline::config::FilterConfig;
use crate::pipeline::context::{ExitAction, ProcessingStats, Row, RowOutcome, StageContext};
use crate::pipeline::registry::StageRegistry;
use crate::pipeline::row::{project, rewrite_row};
use crate::rules::RuleTable;

/// A pluggable row transformation with an optional setup/teardown lifecycle.
///
/// `enter` runs once before the first row and `exit` once after the last
/// (or after a failure), each only for stages whose `enter` succeeded.
pub trait Stage {
    fn name(&self) -> &str;

    fn enter(&mut self, _ctx: &StageContext) -> anyhow::Result<()> {
        Ok(())
    }

    fn transform(&mut self, row: Row, ctx: &StageContext) -> anyhow::Result<RowOutcome>;

    /// `failure` is `None` when the run went well. Returning
    /// `ExitAction::Swallow` stops a failure from reaching outer stages and
    /// the caller; returning an error replaces it.
    fn exit(&mut self, _failure: Option<&Failure>, _ctx: &StageContext) -> anyhow::Result<ExitAction> {
        Ok(ExitAction::Propagate)
    }
}

/// Where the driver is in a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    NotStarted,
    Entering,
    Running,
    Exiting,
    Completed,
    Failed,
}

/// Owns the record loop and the lifecycle of every stage around it
pub struct StreamDriver {
    stages: Vec<Box<dyn Stage>>,
    rules: RuleTable,
    config: FilterConfig,
    context: StageContext,
    state: DriverState,
    interrupt: Option<Arc<AtomicBool>>,
    stats: ProcessingStats,
}

impl StreamDriver {
    pub fn new(
        config: FilterConfig,
        rules: RuleTable,
        registry: StageRegistry,
        context: StageContext,
    ) -> Self {
        StreamDriver {
            stages: registry.into_stages(),
            rules,
            config,
            context,
            state: DriverState::NotStarted,
            interrupt: None,
            stats: ProcessingStats::default(),
        }
    }

    pub fn add_stage(&mut self, stage: Box<dyn Stage>) {
        self.stages.push(stage);
    }

    /// Checked before every record; once set the run stops and goes through
    /// the normal teardown path with an `Interrupted` failure.
    pub fn set_interrupt(&mut self, flag: Arc<AtomicBool>) {
        self.interrupt = Some(flag);
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    pub fn get_stats(&self) -> &ProcessingStats {
        &self.stats
    }

    /// Run the whole stream: enter every stage (first registered is
    /// outermost), process all records, then exit the entered stages
    /// innermost first.
    pub fn process_stream<R: Read, W: Write>(
        &mut self,
        input: R,
        output: W,
    ) -> Result<ProcessingStats, ProcessingError> {
        let start_time = Instant::now();
        self.stats = ProcessingStats::default();

        self.state = DriverState::Entering;
        let mut entered = 0;
        let mut pending: Option<ProcessingError> = None;
        for stage in self.stages.iter_mut() {
            debug!(stage = stage.name(), "entering stage");
            if let Err(source) = stage.enter(&self.context) {
                pending = Some(ProcessingError::Setup {
                    stage: stage.name().to_string(),
                    source,
                });
                break;
            }
            entered += 1;
        }

        if pending.is_none() {
            self.state = DriverState::Running;
            if let Err(err) = self.process_records(input, output) {
                pending = Some(err);
            }
        }

        self.state = DriverState::Exiting;
        for stage in self.stages[..entered].iter_mut().rev() {
            let failure = pending.as_ref().map(ProcessingError::describe);
            debug!(stage = stage.name(), failed = failure.is_some(), "exiting stage");
            match stage.exit(failure.as_ref(), &self.context) {
                Ok(ExitAction::Propagate) => {}
                Ok(ExitAction::Swallow) => {
                    if let Some(err) = pending.take() {
                        debug!(stage = stage.name(), "failure swallowed: {}", err);
                    }
                }
                Err(source) => {
                    pending = Some(ProcessingError::Teardown {
                        stage: stage.name().to_string(),
                        source,
                    });
                }
            }
        }

        self.stats.processing_time = start_time.elapsed();
        debug!(
            read = self.stats.records_read,
            dropped = self.stats.records_dropped,
            written = self.stats.records_written,
            "processing complete in {:?}",
            self.stats.processing_time
        );

        match pending {
            Some(err) => {
                self.state = DriverState::Failed;
                Err(err)
            }
            None => {
                self.state = DriverState::Completed;
                Ok(self.stats.clone())
            }
        }
    }

    fn interrupted(&self) -> bool {
        self.interrupt
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }

    fn process_records<R: Read, W: Write>(&mut self, input: R, output: W) -> Result<(), ProcessingError> {
        let mut reader = self.context.reader(input);
        let mut writer = self.context.writer(output);
        let mut record = csv::StringRecord::new();
        let mut record_number = 0;

        loop {
            if self.interrupted() {
                return Err(ProcessingError::Interrupted {
                    record: record_number,
                });
            }

            match reader.read_record(&mut record) {
                Ok(true) => {}
                Ok(false) => break,
                // An interruptible input gives up with an error once the flag is up
                Err(_) if self.interrupted() => {
                    return Err(ProcessingError::Interrupted {
                        record: record_number,
                    })
                }
                Err(source) => {
                    return Err(ProcessingError::Input {
                        record: record_number + 1,
                        source,
                    })
                }
            }
            record_number += 1;
            self.stats.records_read += 1;

            let row: Row = record.iter().map(str::to_string).collect();
            let row = match rewrite_row(row, record_number, &mut self.stages, &self.rules, &self.context)? {
                RowOutcome::Keep(row) => row,
                RowOutcome::Drop => {
                    trace!(record = record_number, "row dropped");
                    self.stats.records_dropped += 1;
                    continue;
                }
            };

            let fields = project(&row, &self.config.projection, &self.rules.mri);
            if !self.config.output {
                continue;
            }
            if let Err(source) = writer.write_record(&fields) {
                if is_broken_pipe(&source) {
                    debug!(record = record_number, "output closed, stopping");
                    return Ok(());
                }
                return Err(ProcessingError::Output {
                    record: record_number,
                    source,
                });
            }
            self.stats.records_written += 1;
        }

        match writer.flush() {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

fn is_broken_pipe(err: &csv::Error) -> bool {
    matches!(err.kind(), csv::ErrorKind::Io(e) if e.kind() == std::io::ErrorKind::BrokenPipe)
}
