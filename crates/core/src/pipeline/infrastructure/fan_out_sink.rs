use crate::pipeline::frame_sink::{DetectionEvent, FrameSink, SinkError};
use crate::shared::frame::Frame;

/// Forwards every frame to each inner sink in order. The first error stops
/// forwarding for that frame and is returned.
pub struct FanOutSink {
    sinks: Vec<Box<dyn FrameSink>>,
}

impl FanOutSink {
    pub fn new(sinks: Vec<Box<dyn FrameSink>>) -> Self {
        Self { sinks }
    }
}

impl FrameSink for FanOutSink {
    fn emit(&mut self, annotated: &Frame, event: &DetectionEvent) -> Result<(), SinkError> {
        for sink in &mut self.sinks {
            sink.emit(annotated, event)?;
        }
        Ok(())
    }

    /// Closes every sink, even after a failure; reports the first error.
    fn close(&mut self) -> Result<(), SinkError> {
        let mut first_error = None;
        for sink in &mut self.sinks {
            if let Err(e) = sink.close() {
                log::warn!("Failed to close sink: {e}");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}
