// src/processors/trace.rs
use crate::error::Failure;
use crate::pipeline::context::{ExitAction, Row, RowOutcome, StageContext};
use crate::pipeline::stream::Stage;

/// Passes rows through untouched and reports its lifecycle on stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct Trace;

impl Stage for Trace {
    fn name(&self) -> &str {
        "trace"
    }

    fn enter(&mut self, ctx: &StageContext) -> anyhow::Result<()> {
        eprintln!("csvf: trace: entering with {:?}", ctx.args());
        Ok(())
    }

    fn transform(&mut self, row: Row, _ctx: &StageContext) -> anyhow::Result<RowOutcome> {
        Ok(RowOutcome::Keep(row))
    }

    fn exit(&mut self, failure: Option<&Failure>, _ctx: &StageContext) -> anyhow::Result<ExitAction> {
        match failure {
            Some(failure) => eprintln!("csvf: trace: exiting with {}", failure),
            None => eprintln!("csvf: trace: exiting cleanly"),
        }
        Ok(ExitAction::Propagate)
    }
}
