// src/pipeline.rs
pub mod config;
pub mod context;
pub mod global_functions;
pub mod processors;
pub mod registry;
pub mod row;
pub mod stream;

pub use config::{FilterConfig, Projection};
pub use context::{ExitAction, ProcessingStats, Row, RowOutcome, StageContext};
pub use processors::ScriptStage;
pub use registry::StageRegistry;
pub use row::{apply_rules, project, rewrite_row};
pub use stream::{DriverState, Stage, StreamDriver};
