use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
/// Batch error
pub enum BatchError {
    /// A record could not be parsed from the input (wrong field count, bad encoding).
    #[error("ItemReader from: {0}")]
    ItemReader(String),

    /// A record could not be normalized.
    #[error("ItemProcessor from: {0}")]
    ItemProcessor(String),

    /// A chunk could not be persisted.
    #[error("ItemWriter from: {0}")]
    ItemWriter(String),

    /// The input stream or the output connection is unavailable.
    #[error("Resource unavailable: {0}")]
    Resource(String),

    #[error("Step failed: {0}")]
    Step(String),

    #[error("Step already completed and not restartable: {0}")]
    StepAlreadyComplete(String),

    #[error("Tasklet from: {0}")]
    Tasklet(String),

    #[error("Invalid configuration: {0}")]
    Configuration(String),
}

/// Coarse classification of a [`BatchError`], reported to operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    Parse,
    Transform,
    Write,
    Resource,
    Step,
    Tasklet,
    Configuration,
}

impl BatchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BatchError::ItemReader(_) => ErrorKind::Parse,
            BatchError::ItemProcessor(_) => ErrorKind::Transform,
            BatchError::ItemWriter(_) => ErrorKind::Write,
            BatchError::Resource(_) => ErrorKind::Resource,
            BatchError::Step(_) | BatchError::StepAlreadyComplete(_) => ErrorKind::Step,
            BatchError::Tasklet(_) => ErrorKind::Tasklet,
            BatchError::Configuration(_) => ErrorKind::Configuration,
        }
    }

    /// Record-local errors only affect the record being read or processed.
    /// Everything else aborts the step regardless of the skip policy.
    pub fn is_record_local(&self) -> bool {
        matches!(self.kind(), ErrorKind::Parse | ErrorKind::Transform)
    }
}
