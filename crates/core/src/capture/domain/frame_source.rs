use crate::capture::domain::source_error::SourceError;
use crate::shared::frame::Frame;

/// Outcome of a successful read.
#[derive(Debug)]
pub enum FrameRead {
    Frame(Frame),
    EndOfStream,
}

/// Produces frames on demand from a camera, video, or image sequence.
///
/// `read_frame` blocks until a frame is available and advances the
/// underlying stream; a frame is never returned twice. Sources do not
/// retry failed reads.
pub trait FrameSource: Send {
    /// Human-readable identity of the device, used in error messages.
    fn describe(&self) -> String;

    fn read_frame(&mut self) -> Result<FrameRead, SourceError>;
}
