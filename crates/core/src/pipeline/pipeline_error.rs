use thiserror::Error;

use crate::capture::domain::source_error::SourceError;
use crate::detection::domain::detector_error::InferenceError;
use crate::pipeline::frame_sink::SinkError;

/// Any failure that ends a pipeline run.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Inference(#[from] InferenceError),
    #[error(transparent)]
    Sink(#[from] SinkError),
}
