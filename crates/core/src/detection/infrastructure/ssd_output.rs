use crate::shared::detection::{RawBox, RawDetection};

/// Decodes single-shot-detector outputs into normalized detections.
///
/// `boxes` holds `[y_min, x_min, y_max, x_max]` quadruples in `[0, 1]`,
/// `scores` and `classes` one value per slot, and `num` the count of valid
/// slots reported by the model. Detections scoring below `threshold` are
/// discarded; the rest are returned highest score first, at most
/// `max_detections` of them.
pub fn decode_detections(
    boxes: &[f32],
    scores: &[f32],
    classes: &[f32],
    num: usize,
    threshold: f32,
    max_detections: usize,
) -> Vec<RawDetection> {
    let valid = num
        .min(boxes.len() / 4)
        .min(scores.len())
        .min(classes.len());

    let mut kept: Vec<usize> = (0..valid)
        .filter(|&i| scores[i].is_finite() && scores[i] >= threshold)
        .collect();
    kept.sort_by(|&a, &b| {
        scores[b]
            .partial_cmp(&scores[a])
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    kept.truncate(max_detections);

    kept.into_iter()
        .map(|i| {
            let b = &boxes[i * 4..i * 4 + 4];
            RawDetection {
                bbox: RawBox::from_yxyx([b[0], b[1], b[2], b[3]]),
                confidence: Some(scores[i]),
                class_id: Some(classes[i].round() as i32),
            }
        })
        .collect()
}
