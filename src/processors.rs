// src/processors.rs
//! Stages built into the binary, selectable by name with `-P`.
pub mod antifish;
pub mod csv_replace;
pub mod trace;

pub use antifish::AntiFish;
pub use csv_replace::CsvReplace;
pub use trace::Trace;
