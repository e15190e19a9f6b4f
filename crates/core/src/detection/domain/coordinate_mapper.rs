use std::fmt;

use crate::detection::domain::detector::ReferenceSpace;
use crate::shared::detection::{BoundingBox, Detection, RawBox, RawDetection};
use crate::shared::frame::Size;

/// What the mapper did to a box that did not fit the target frame.
#[derive(Clone, Debug, PartialEq)]
pub enum GeometryAction {
    Clipped(BoundingBox),
    Dropped,
}

/// Non-fatal report of a box that fell outside the frame after mapping.
#[derive(Clone, Debug, PartialEq)]
pub struct GeometryWarning {
    /// Position of the detection in the detector's output.
    pub index: usize,
    pub raw: RawBox,
    pub action: GeometryAction,
}

impl fmt::Display for GeometryWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let r = &self.raw;
        match &self.action {
            GeometryAction::Clipped(b) => write!(
                f,
                "detection {} ({:.3},{:.3})-({:.3},{:.3}) clipped to {}x{} at ({}, {})",
                self.index, r.x_min, r.y_min, r.x_max, r.y_max, b.width, b.height, b.x, b.y
            ),
            GeometryAction::Dropped => write!(
                f,
                "detection {} ({:.3},{:.3})-({:.3},{:.3}) lies outside the frame and was dropped",
                self.index, r.x_min, r.y_min, r.x_max, r.y_max
            ),
        }
    }
}

/// Result of mapping one frame's detections.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MappedDetections {
    pub detections: Vec<Detection>,
    pub warnings: Vec<GeometryWarning>,
}

#[derive(Clone, Copy, Debug)]
struct ScaleFactors {
    extent: (f64, f64),
    target: Size,
    sx: f64,
    sy: f64,
}

/// Rescales raw detector boxes into a target frame's pixel space.
///
/// Each axis is scaled independently (`x` by target width, `y` by target
/// height), rounded to the nearest pixel and clamped so that every box
/// satisfies `x + width <= W` and `y + height <= H`. Boxes entirely outside
/// the frame are dropped. Scale factors are cached per (reference, target)
/// pair; the target size is not assumed fixed across calls.
#[derive(Debug, Default)]
pub struct CoordinateMapper {
    cache: Option<ScaleFactors>,
}

impl CoordinateMapper {
    pub fn new() -> Self {
        Self { cache: None }
    }

    pub fn map(
        &mut self,
        raw: &[RawDetection],
        reference: ReferenceSpace,
        target: Size,
    ) -> MappedDetections {
        let (sx, sy) = self.scale_factors(reference.extent(target), target);
        let mut mapped = MappedDetections {
            detections: Vec::with_capacity(raw.len()),
            warnings: Vec::new(),
        };

        for (index, det) in raw.iter().enumerate() {
            let b = &det.bbox;
            let corners = [
                (b.x_min.min(b.x_max) * sx).round(),
                (b.y_min.min(b.y_max) * sy).round(),
                (b.x_min.max(b.x_max) * sx).round(),
                (b.y_min.max(b.y_max) * sy).round(),
            ];

            match clamp_to_frame(corners, target) {
                Some((bbox, clipped)) => {
                    if clipped {
                        mapped.warnings.push(GeometryWarning {
                            index,
                            raw: *b,
                            action: GeometryAction::Clipped(bbox),
                        });
                    }
                    mapped.detections.push(Detection {
                        bbox,
                        confidence: det.confidence,
                        class_id: det.class_id,
                    });
                }
                None => mapped.warnings.push(GeometryWarning {
                    index,
                    raw: *b,
                    action: GeometryAction::Dropped,
                }),
            }
        }

        mapped
    }

    fn scale_factors(&mut self, extent: (f64, f64), target: Size) -> (f64, f64) {
        if let Some(c) = self.cache {
            if c.extent == extent && c.target == target {
                return (c.sx, c.sy);
            }
        }
        let sx = if extent.0 > 0.0 {
            target.width as f64 / extent.0
        } else {
            0.0
        };
        let sy = if extent.1 > 0.0 {
            target.height as f64 / extent.1
        } else {
            0.0
        };
        self.cache = Some(ScaleFactors {
            extent,
            target,
            sx,
            sy,
        });
        (sx, sy)
    }
}

/// Clamps `[x1, y1, x2, y2]` into the frame. Returns `None` when the box
/// has no part inside it, otherwise the box and whether it was altered.
fn clamp_to_frame(corners: [f64; 4], target: Size) -> Option<(BoundingBox, bool)> {
    let [x1, y1, x2, y2] = corners;
    let w = target.width as f64;
    let h = target.height as f64;

    if corners.iter().any(|v| !v.is_finite()) || w == 0.0 || h == 0.0 {
        return None;
    }
    if x1 >= w || y1 >= h || x2 < 0.0 || y2 < 0.0 {
        return None;
    }

    let cx1 = x1.clamp(0.0, w - 1.0);
    let cy1 = y1.clamp(0.0, h - 1.0);
    let cx2 = x2.clamp(cx1, w);
    let cy2 = y2.clamp(cy1, h);
    let clipped = cx1 != x1 || cy1 != y1 || cx2 != x2 || cy2 != y2;

    let bbox = BoundingBox::new(
        cx1 as u32,
        cy1 as u32,
        (cx2 - cx1) as u32,
        (cy2 - cy1) as u32,
    );
    Some((bbox, clipped))
}
