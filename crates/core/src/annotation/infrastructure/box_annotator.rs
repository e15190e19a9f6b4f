use crate::annotation::domain::frame_annotator::FrameAnnotator;
use crate::shared::detection::{BoundingBox, Detection};
use crate::shared::frame::Frame;

use super::glyphs::{glyph, ADVANCE, GLYPH_HEIGHT, GLYPH_WIDTH};

/// Gap between a box's right edge and its label.
const LABEL_OFFSET_X: i64 = 10;

/// Colors are BGR.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AnnotationStyle {
    pub box_color: [u8; 3],
    /// Outline width in pixels, growing inward from the box border.
    pub thickness: u32,
    pub label_color: [u8; 3],
    pub draw_labels: bool,
}

impl Default for AnnotationStyle {
    fn default() -> Self {
        Self {
            box_color: [0, 255, 0],
            thickness: 1,
            label_color: [255, 0, 0],
            draw_labels: true,
        }
    }
}

/// Draws rectangle outlines and `"{score}% | {class}"` labels.
///
/// A label sits to the right of its box with its baseline on the box's
/// bottom edge. Anything falling outside the frame is clipped.
#[derive(Clone, Debug, Default)]
pub struct BoxAnnotator {
    style: AnnotationStyle,
}

impl BoxAnnotator {
    pub fn new(style: AnnotationStyle) -> Self {
        Self { style }
    }

    pub fn style(&self) -> &AnnotationStyle {
        &self.style
    }

    fn draw_outline(&self, frame: &mut Frame, bbox: &BoundingBox) {
        if bbox.is_degenerate() {
            return;
        }
        let color = self.style.box_color;
        for k in 0..self.style.thickness.max(1) as i64 {
            let x0 = bbox.x as i64 + k;
            let y0 = bbox.y as i64 + k;
            let x1 = bbox.right() as i64 - 1 - k;
            let y1 = bbox.bottom() as i64 - 1 - k;
            if x0 > x1 || y0 > y1 {
                break;
            }
            for x in x0..=x1 {
                frame.put_pixel(x, y0, color);
                frame.put_pixel(x, y1, color);
            }
            for y in y0..=y1 {
                frame.put_pixel(x0, y, color);
                frame.put_pixel(x1, y, color);
            }
        }
    }

    fn draw_text(&self, frame: &mut Frame, left: i64, baseline: i64, text: &str) {
        let top = baseline - GLYPH_HEIGHT;
        let mut x = left;
        for ch in text.chars() {
            if x >= frame.width() as i64 {
                break;
            }
            for (row, bits) in glyph(ch).iter().enumerate() {
                for col in 0..GLYPH_WIDTH {
                    if (bits >> (GLYPH_WIDTH - 1 - col)) & 1 == 1 {
                        frame.put_pixel(x + col, top + row as i64, self.style.label_color);
                    }
                }
            }
            x += ADVANCE;
        }
    }
}

impl FrameAnnotator for BoxAnnotator {
    fn draw(&self, frame: &mut Frame, detections: &[Detection]) {
        for d in detections {
            self.draw_outline(frame, &d.bbox);
        }
        if !self.style.draw_labels {
            return;
        }
        for d in detections {
            if let Some(text) = label_text(d) {
                let left = d.bbox.right() as i64 + LABEL_OFFSET_X;
                self.draw_text(frame, left, d.bbox.bottom() as i64, &text);
            }
        }
    }
}

/// Label for a detection, or `None` when it carries neither score nor class.
pub fn label_text(detection: &Detection) -> Option<String> {
    match (detection.confidence, detection.class_id) {
        (Some(score), Some(class)) => Some(format!("{:.0}% | {}", score * 100.0, class)),
        (Some(score), None) => Some(format!("{:.0}%", score * 100.0)),
        (None, Some(class)) => Some(class.to_string()),
        (None, None) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const GREEN: [u8; 3] = [0, 255, 0];
    const BLUE: [u8; 3] = [255, 0, 0];

    fn det(
        x: u32,
        y: u32,
        w: u32,
        h: u32,
        confidence: Option<f32>,
        class_id: Option<i32>,
    ) -> Detection {
        Detection {
            bbox: BoundingBox::new(x, y, w, h),
            confidence,
            class_id,
        }
    }

    fn count(frame: &Frame, color: [u8; 3]) -> usize {
        frame.data().chunks_exact(3).filter(|px| *px == color).count()
    }

    #[test]
    fn test_zero_detections_returns_identical_frame() {
        let mut frame = Frame::black(64, 48, 3);
        frame.put_pixel(5, 5, [1, 2, 3]);
        let annotated = BoxAnnotator::default().annotate(&frame, &[]);
        assert_eq!(annotated, frame);
    }

    #[test]
    fn test_outline_lies_exactly_on_box_border() {
        let frame = Frame::black(640, 480, 0);
        let annotated =
            BoxAnnotator::default().annotate(&frame, &[det(100, 100, 50, 50, Some(0.9), None)]);

        for (x, y) in [(100, 100), (149, 100), (100, 149), (149, 149), (125, 100), (100, 125)] {
            assert_eq!(annotated.pixel(x, y), Some(&GREEN[..]), "({x}, {y})");
        }
        for (x, y) in [(101, 101), (125, 125), (148, 148), (99, 100), (150, 100), (100, 150)] {
            assert_eq!(annotated.pixel(x, y), Some(&[0, 0, 0][..]), "({x}, {y})");
        }
        assert_eq!(count(&annotated, GREEN), 4 * 50 - 4);
    }

    #[test]
    fn test_label_is_drawn_right_of_box_above_bottom_edge() {
        let frame = Frame::black(640, 480, 0);
        let annotated =
            BoxAnnotator::default().annotate(&frame, &[det(100, 100, 50, 50, Some(0.9), Some(1))]);

        let mut label_pixels = 0;
        for y in 0..480 {
            for x in 0..640 {
                if annotated.pixel(x, y) == Some(&BLUE[..]) {
                    assert!((160..160 + 9 * 6).contains(&x), "x={x}");
                    assert!((143..150).contains(&y), "y={y}");
                    label_pixels += 1;
                }
            }
        }
        assert!(label_pixels > 0);
    }

    #[test]
    fn test_annotate_leaves_input_untouched() {
        let frame = Frame::black(32, 32, 0);
        let annotated = BoxAnnotator::default().annotate(&frame, &[det(2, 2, 10, 10, None, None)]);
        assert_ne!(annotated, frame);
        assert_eq!(count(&frame, GREEN), 0);
    }

    #[rstest]
    #[case::zero_width(det(10, 10, 0, 5, None, None))]
    #[case::zero_height(det(10, 10, 5, 0, None, None))]
    #[case::zero_area(det(0, 0, 0, 0, None, None))]
    fn test_degenerate_boxes_draw_nothing(#[case] d: Detection) {
        let frame = Frame::black(32, 32, 0);
        assert_eq!(BoxAnnotator::default().annotate(&frame, &[d]), frame);
    }

    #[test]
    fn test_label_near_frame_edge_is_clipped() {
        let frame = Frame::black(64, 48, 0);
        let annotated =
            BoxAnnotator::default().annotate(&frame, &[det(40, 0, 20, 4, Some(0.5), Some(12))]);
        assert_eq!(annotated.pixel(40, 0), Some(&GREEN[..]));
    }

    #[test]
    fn test_thickness_grows_inward() {
        let style = AnnotationStyle {
            thickness: 3,
            ..AnnotationStyle::default()
        };
        let annotated = BoxAnnotator::new(style)
            .annotate(&Frame::black(40, 40, 0), &[det(10, 10, 20, 20, None, None)]);
        assert_eq!(annotated.pixel(12, 15), Some(&GREEN[..]));
        assert_eq!(annotated.pixel(13, 15), Some(&[0, 0, 0][..]));
        assert_eq!(annotated.pixel(9, 15), Some(&[0, 0, 0][..]));
    }

    #[test]
    fn test_labels_can_be_disabled() {
        let style = AnnotationStyle {
            draw_labels: false,
            ..AnnotationStyle::default()
        };
        let annotated = BoxAnnotator::new(style)
            .annotate(&Frame::black(200, 100, 0), &[det(10, 10, 20, 20, Some(0.8), Some(3))]);
        assert_eq!(count(&annotated, BLUE), 0);
    }

    #[rstest]
    #[case(Some(0.9), Some(1), Some("90% | 1"))]
    #[case(Some(0.5), None, Some("50%"))]
    #[case(None, Some(7), Some("7"))]
    #[case(None, None, None)]
    fn test_label_text(
        #[case] confidence: Option<f32>,
        #[case] class_id: Option<i32>,
        #[case] expected: Option<&str>,
    ) {
        let d = det(0, 0, 1, 1, confidence, class_id);
        assert_eq!(label_text(&d).as_deref(), expected);
    }
}
