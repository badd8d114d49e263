// src/processors/csv_replace.rs
use crate::error::Failure;
use crate::pipeline::context::{ExitAction, Row, RowOutcome, StageContext};
use crate::pipeline::stream::Stage;
use anyhow::Context;
use std::collections::HashMap;
use std::fs::File;

/// Replaces whole field values using tables read from two-column CSV files.
///
/// Each shared argument names a mapping file, read with the run's dialect
/// during `enter`. Later files override earlier ones for the same key.
#[derive(Debug, Default)]
pub struct CsvReplace {
    replacements: HashMap<String, String>,
}

impl CsvReplace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.replacements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.replacements.is_empty()
    }

    fn load(&mut self, path: &str, ctx: &StageContext) -> anyhow::Result<()> {
        let file = File::open(path).with_context(|| format!("cannot open replacements file '{}'", path))?;
        let mut reader = ctx.reader(file);
        for record in reader.records() {
            let record = record.with_context(|| format!("cannot read replacements file '{}'", path))?;
            if record.len() != 2 {
                anyhow::bail!(
                    "bad row {:?} from {}",
                    record.iter().collect::<Vec<_>>(),
                    path
                );
            }
            self.replacements
                .insert(record[0].to_string(), record[1].to_string());
        }
        Ok(())
    }
}

impl Stage for CsvReplace {
    fn name(&self) -> &str {
        "csv-replace"
    }

    fn enter(&mut self, ctx: &StageContext) -> anyhow::Result<()> {
        for path in ctx.args() {
            self.load(path, ctx)?;
        }
        tracing::debug!(entries = self.replacements.len(), "replacement table loaded");
        Ok(())
    }

    fn transform(&mut self, mut row: Row, _ctx: &StageContext) -> anyhow::Result<RowOutcome> {
        for field in row.iter_mut() {
            if let Some(replacement) = self.replacements.get(field.as_str()) {
                field.clone_from(replacement);
            }
        }
        Ok(RowOutcome::Keep(row))
    }

    fn exit(&mut self, _failure: Option<&Failure>, _ctx: &StageContext) -> anyhow::Result<ExitAction> {
        self.replacements.clear();
        Ok(ExitAction::Propagate)
    }
}
