use serde::Serialize;

/// Axis-aligned box in integer pixel coordinates of a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Exclusive right edge.
    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    /// Exclusive bottom edge.
    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    pub fn is_degenerate(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// A detection in frame pixel space, ready for rendering or publishing.
///
/// `confidence` is absent for backends that do not score (the cascade
/// classifier); `class_id` is absent for single-class backends.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Detection {
    #[serde(flatten)]
    pub bbox: BoundingBox,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_id: Option<i32>,
}

/// Corner-form box in a detector's reference coordinate space.
///
/// Units depend on the detector: frame pixels for the cascade, values in
/// `[0, 1]` for the neural detector.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RawBox {
    pub x_min: f64,
    pub y_min: f64,
    pub x_max: f64,
    pub y_max: f64,
}

impl RawBox {
    /// Builds a box from the `[y_min, x_min, y_max, x_max]` layout used by
    /// SSD-style model outputs.
    pub fn from_yxyx(values: [f32; 4]) -> Self {
        Self {
            y_min: values[0] as f64,
            x_min: values[1] as f64,
            y_max: values[2] as f64,
            x_max: values[3] as f64,
        }
    }

    pub fn from_xywh(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x_min: x,
            y_min: y,
            x_max: x + width,
            y_max: y + height,
        }
    }
}

/// A detection as produced by a detector, before coordinate mapping.
#[derive(Clone, Debug, PartialEq)]
pub struct RawDetection {
    pub bbox: RawBox,
    pub confidence: Option<f32>,
    pub class_id: Option<i32>,
}

impl From<&Detection> for RawDetection {
    fn from(d: &Detection) -> Self {
        Self {
            bbox: RawBox::from_xywh(
                d.bbox.x as f64,
                d.bbox.y as f64,
                d.bbox.width as f64,
                d.bbox.height as f64,
            ),
            confidence: d.confidence,
            class_id: d.class_id,
        }
    }
}
