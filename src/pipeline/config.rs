use crate::error::ConfigError;
use crate::rules::zero_based;

/// Which fields to emit for each surviving row
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Projection {
    /// Emit the whole row as the pipeline left it
    #[default]
    All,
    /// Emit these zero-based fields, in this order
    Fields(Vec<usize>),
}

impl Projection {
    /// Build from user-facing (one-based) field numbers; none means all.
    pub fn from_field_numbers(fields: &[i64]) -> Result<Self, ConfigError> {
        if fields.is_empty() {
            return Ok(Projection::All);
        }
        let indices = fields
            .iter()
            .map(|&field| zero_based("output", field))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Projection::Fields(indices))
    }
}

/// Configuration for filter behavior
#[derive(Debug, Clone)]
pub struct FilterConfig {
    pub projection: Projection,
    /// When false rows still go through the whole pipeline but nothing is
    /// written.
    pub output: bool,
}

impl Default for FilterConfig {
    fn default() -> Self {
        FilterConfig {
            projection: Projection::All,
            output: true,
        }
    }
}
