// src/pipeline/registry.rs
use crate::error::ConfigError;
use crate::pipeline::processors::ScriptStage;
use crate::pipeline::stream::Stage;
use crate::processors::{AntiFish, CsvReplace, Trace};
use std::path::Path;
use tracing::debug;

/// Names accepted by `-P` besides script paths
pub const BUILTIN_STAGES: &[&str] = &["antifish", "csv-replace", "trace"];

/// Ordered list of loaded stages. Registration order is run order.
#[derive(Default)]
pub struct StageRegistry {
    stages: Vec<Box<dyn Stage>>,
}

impl StageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve and load every identifier, failing on the first one that
    /// cannot be loaded.
    pub fn load_all<I, S>(identifiers: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut registry = StageRegistry::new();
        for identifier in identifiers {
            registry.load(identifier.as_ref())?;
        }
        Ok(registry)
    }

    pub fn load(&mut self, identifier: &str) -> Result<(), ConfigError> {
        let stage = resolve(identifier)?;
        debug!(stage = stage.name(), "loaded stage");
        self.register(stage);
        Ok(())
    }

    pub fn register(&mut self, stage: Box<dyn Stage>) {
        self.stages.push(stage);
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.stages.iter().map(|stage| stage.name()).collect()
    }

    pub fn into_stages(self) -> Vec<Box<dyn Stage>> {
        self.stages
    }
}

/// Scripts are recognised by a `.star` suffix or by naming an existing
/// file; anything else must be a built-in stage name.
fn resolve(identifier: &str) -> Result<Box<dyn Stage>, ConfigError> {
    let path = Path::new(identifier);
    if identifier.ends_with(".star") || path.is_file() {
        return Ok(Box::new(ScriptStage::from_file(path)?));
    }

    match identifier {
        "antifish" => Ok(Box::new(AntiFish)),
        "csv-replace" | "csv_replace" => Ok(Box::new(CsvReplace::new())),
        "trace" | "trivial" => Ok(Box::new(Trace)),
        _ => Err(ConfigError::UnknownStage(identifier.to_string())),
    }
}
