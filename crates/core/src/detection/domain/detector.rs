use crate::detection::domain::detector_error::InferenceError;
use crate::shared::detection::RawDetection;
use crate::shared::frame::{Frame, Size};

/// Coordinate system in which a detector expresses its raw boxes.
///
/// Fixed for a detector's lifetime, which lets the mapper cache its
/// scale factors.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReferenceSpace {
    /// Pixel coordinates of the frame passed to `detect`.
    Frame,
    /// Coordinates in `[0, 1]`, each axis relative to the model input
    /// resolution independently.
    Normalized { input: Size },
}

impl ReferenceSpace {
    /// The extent that maps onto the full target frame.
    pub fn extent(&self, frame: Size) -> (f64, f64) {
        match self {
            ReferenceSpace::Frame => (frame.width as f64, frame.height as f64),
            ReferenceSpace::Normalized { .. } => (1.0, 1.0),
        }
    }
}

/// Domain interface for object/face detection backends.
///
/// Implementations must not mutate the frame. They may hold state (an
/// inference session), hence `&mut self`. Threshold filtering happens
/// inside `detect`.
pub trait Detector: Send {
    /// Backend name used to identify failures.
    fn name(&self) -> &'static str;

    fn reference_space(&self) -> ReferenceSpace;

    fn detect(&mut self, frame: &Frame) -> Result<Vec<RawDetection>, InferenceError>;
}
