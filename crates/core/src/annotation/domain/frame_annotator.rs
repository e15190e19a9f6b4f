use crate::shared::detection::Detection;
use crate::shared::frame::Frame;

/// Domain interface for rendering detections onto a frame.
///
/// Rendering never fails: detections arrive already clamped to the frame,
/// and anything that still falls outside is clipped while drawing.
pub trait FrameAnnotator: Send {
    /// Draws `detections` onto `frame` in place.
    fn draw(&self, frame: &mut Frame, detections: &[Detection]);

    /// Returns an annotated copy, leaving `frame` untouched.
    fn annotate(&self, frame: &Frame, detections: &[Detection]) -> Frame {
        let mut annotated = frame.clone();
        self.draw(&mut annotated, detections);
        annotated
    }
}
