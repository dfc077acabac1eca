use crate::detect::{ClassNames, DetectionResult};
use crate::protocol::BoxRecord;

/// Flatten model results into wire boxes.
///
/// Boxes are normalized so `x1 <= x2` and `y1 <= y2`, and confidence is clamped to
/// `[0, 1]`. Detections with non-finite coordinates are dropped.
pub fn detections_to_boxes(results: &[DetectionResult], names: &ClassNames) -> Vec<BoxRecord> {
    let mut boxes = Vec::new();
    for result in results.iter().filter(|r| !r.is_empty()) {
        for det in &result.detections {
            let coords = [det.x1, det.y1, det.x2, det.y2];
            if coords.iter().any(|c| !c.is_finite()) {
                log::debug!("dropping detection with non-finite box {:?}", coords);
                continue;
            }
            let conf = if det.confidence.is_finite() {
                det.confidence.clamp(0.0, 1.0)
            } else {
                0.0
            };
            boxes.push(BoxRecord {
                x1: det.x1.min(det.x2),
                y1: det.y1.min(det.y2),
                x2: det.x1.max(det.x2),
                y2: det.y1.max(det.y2),
                conf,
                class_id: det.class_id,
                name: names.name(det.class_id).into_owned(),
                id: det.track_id,
            });
        }
    }
    boxes
}
