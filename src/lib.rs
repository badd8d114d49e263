// src/lib.rs
pub mod dialect;
pub mod error;
pub mod interrupt;
pub mod logging;
pub mod pipeline;
pub mod processors;
pub mod rules;

pub use error::*;
pub use pipeline::*;

pub use dialect::Dialect;
pub use processors::{AntiFish, CsvReplace, Trace};
pub use rules::{RuleKind, RuleTable};
