use std::fmt;

use crate::pipeline::pipeline_error::PipelineError;

/// Why a pipeline stopped.
#[derive(Debug)]
pub enum TerminationReason {
    /// The termination signal was raised, or the frame limit was reached.
    UserRequestedExit,
    /// The source reported end of stream.
    SourceExhausted,
    UnrecoverableError(PipelineError),
}

impl TerminationReason {
    /// Whether the run ended without a failure.
    pub fn is_clean(&self) -> bool {
        !matches!(self, Self::UnrecoverableError(_))
    }
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UserRequestedExit => f.write_str("stopped on request"),
            Self::SourceExhausted => f.write_str("source exhausted"),
            Self::UnrecoverableError(e) => write!(f, "failed: {e}"),
        }
    }
}

/// `Running` until the first terminating event; `Terminated` is final.
#[derive(Debug)]
pub enum PipelineState {
    Running,
    Terminated(TerminationReason),
}

impl PipelineState {
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }
}
