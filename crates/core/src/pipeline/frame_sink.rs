use serde::Serialize;
use thiserror::Error;

use crate::shared::detection::Detection;
use crate::shared::frame::Frame;

/// Structured per-frame output, independent of any pixel data.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DetectionEvent {
    pub frame_index: u64,
    pub frame_width: u32,
    pub frame_height: u32,
    pub detections: Vec<Detection>,
}

impl DetectionEvent {
    pub fn new(frame: &Frame, detections: Vec<Detection>) -> Self {
        Self {
            frame_index: frame.index(),
            frame_width: frame.width(),
            frame_height: frame.height(),
            detections,
        }
    }
}

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("{sink}: I/O error: {source}")]
    Io {
        sink: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{sink}: could not encode event: {source}")]
    Encode {
        sink: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("{sink}: {message}")]
    Other { sink: String, message: String },
}

impl SinkError {
    pub fn io(sink: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            sink: sink.into(),
            source,
        }
    }

    pub fn other(sink: impl Into<String>, message: impl ToString) -> Self {
        Self::Other {
            sink: sink.into(),
            message: message.to_string(),
        }
    }
}

/// Receives each processed frame: the annotated image for display or
/// storage, and the detection event for downstream publishing.
///
/// Called in frame order, once per frame. An error ends the run.
pub trait FrameSink: Send {
    fn emit(&mut self, annotated: &Frame, event: &DetectionEvent) -> Result<(), SinkError>;

    /// Flushes buffered output. Called once when the pipeline stops.
    fn close(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}
