use std::fmt;

/// Errors raised while building the filter, before any row is read.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid {kind} field number '{value}'")]
    BadFieldNumber { kind: &'static str, value: String },

    #[error("{kind} field numbers should be positive, got {value}")]
    NonPositiveField { kind: &'static str, value: i64 },

    #[error("{kind} rules take {expected} values each, got {got} values")]
    Arity {
        kind: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("invalid pattern '{pattern}' for field {field}: {source}")]
    Pattern {
        field: i64,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("invalid replacement '{template}' for field {field}: {message}")]
    Template {
        field: i64,
        template: String,
        message: String,
    },

    #[error("unknown dialect '{0}' (expected one of: excel, excel-tab, unix)")]
    UnknownDialect(String),

    #[error("unknown stage '{0}'")]
    UnknownStage(String),

    #[error("cannot load stage '{name}': {message}")]
    StageLoad { name: String, message: String },

    #[error("stage '{0}' does not define process(row)")]
    MissingProcess(String),

    #[error("failed to read rules file '{path}': {source}")]
    RulesFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid rules file '{path}': {source}")]
    RulesFormat {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Errors that abort a run once the stream driver has started.
#[derive(Debug, thiserror::Error)]
pub enum ProcessingError {
    #[error("stage '{stage}' failed during setup: {source}")]
    Setup {
        stage: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("stage '{stage}' failed at record {record}: {source}")]
    Transform {
        stage: String,
        record: usize,
        #[source]
        source: anyhow::Error,
    },

    #[error("stage '{stage}' failed during teardown: {source}")]
    Teardown {
        stage: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("cannot read record {record}: {source}")]
    Input {
        record: usize,
        #[source]
        source: csv::Error,
    },

    #[error("cannot write record {record}: {source}")]
    Output {
        record: usize,
        #[source]
        source: csv::Error,
    },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("interrupted at record {record}")]
    Interrupted { record: usize },
}

impl ProcessingError {
    /// Describe this error the way `exit` hooks see it.
    pub fn describe(&self) -> Failure {
        let (kind, location) = match self {
            ProcessingError::Setup { stage, .. } => {
                (FailureKind::Setup, Some(format!("stage '{}'", stage)))
            }
            ProcessingError::Transform { stage, record, .. } => (
                FailureKind::Transform,
                Some(format!("stage '{}', record {}", stage, record)),
            ),
            ProcessingError::Teardown { stage, .. } => {
                (FailureKind::Teardown, Some(format!("stage '{}'", stage)))
            }
            ProcessingError::Input { record, .. } => {
                (FailureKind::Input, Some(format!("record {}", record)))
            }
            ProcessingError::Output { record, .. } => {
                (FailureKind::Output, Some(format!("record {}", record)))
            }
            ProcessingError::IoError(_) => (FailureKind::Output, None),
            ProcessingError::Interrupted { record } => {
                (FailureKind::Interrupted, Some(format!("record {}", record)))
            }
        };
        Failure {
            kind,
            message: self.to_string(),
            location,
        }
    }

    pub fn is_interrupt(&self) -> bool {
        matches!(self, ProcessingError::Interrupted { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Setup,
    Transform,
    Teardown,
    Input,
    Output,
    Interrupted,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Setup => "SetupError",
            FailureKind::Transform => "TransformError",
            FailureKind::Teardown => "TeardownError",
            FailureKind::Input => "InputError",
            FailureKind::Output => "OutputError",
            FailureKind::Interrupted => "Interrupted",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What an `exit` hook is told about a failed run.
///
/// `location` is best effort: the stage and/or record being handled when
/// the failure happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub kind: FailureKind,
    pub message: String,
    pub location: Option<String>,
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some(location) => write!(f, "{}: {} ({})", self.kind, self.message, location),
            None => write!(f, "{}: {}", self.kind, self.message),
        }
    }
}
