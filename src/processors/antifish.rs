// src/processors/antifish.rs
use crate::pipeline::context::{Row, RowOutcome, StageContext};
use crate::pipeline::stream::Stage;

/// Drops every row whose first field is exactly `fish`.
#[derive(Debug, Default, Clone, Copy)]
pub struct AntiFish;

impl Stage for AntiFish {
    fn name(&self) -> &str {
        "antifish"
    }

    fn transform(&mut self, row: Row, _ctx: &StageContext) -> anyhow::Result<RowOutcome> {
        if row.first().map(String::as_str) == Some("fish") {
            Ok(RowOutcome::Drop)
        } else {
            Ok(RowOutcome::Keep(row))
        }
    }
}
