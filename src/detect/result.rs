/// Result of running detection on one image.
#[derive(Clone, Debug, Default)]
pub struct DetectionResult {
    /// Detections in source-image pixel coordinates.
    pub detections: Vec<Detection>,
    /// Width of the source image.
    pub width: u32,
    /// Height of the source image.
    pub height: u32,
}

impl DetectionResult {
    pub fn new(detections: Vec<Detection>, width: u32, height: u32) -> Self {
        Self {
            detections,
            width,
            height,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }
}

/// A single detected object.
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub confidence: f32,
    pub class_id: usize,
    /// Assigned by the tracker; `None` for plain detection.
    pub track_id: Option<u64>,
}

impl Detection {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32, confidence: f32, class_id: usize) -> Self {
        Self {
            x1,
            y1,
            x2,
            y2,
            confidence,
            class_id,
            track_id: None,
        }
    }

    pub fn with_track_id(mut self, track_id: u64) -> Self {
        self.track_id = Some(track_id);
        self
    }

    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    pub fn area(&self) -> f32 {
        self.width().max(0.0) * self.height().max(0.0)
    }

    /// Intersection over union with another detection.
    pub fn iou(&self, other: &Detection) -> f32 {
        let ix1 = self.x1.max(other.x1);
        let iy1 = self.y1.max(other.y1);
        let ix2 = self.x2.min(other.x2);
        let iy2 = self.y2.min(other.y2);
        let inter = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }
}

/// Greedy per-class non-maximum suppression.
///
/// Keeps the highest-confidence box of each overlapping group and at most
/// `max_detections` boxes overall.
pub fn non_max_suppression(
    mut detections: Vec<Detection>,
    iou_threshold: f32,
    max_detections: usize,
) -> Vec<Detection> {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut keep: Vec<Detection> = Vec::with_capacity(detections.len().min(max_detections));
    'outer: for det in detections {
        for kept in &keep {
            if kept.class_id == det.class_id && kept.iou(&det) > iou_threshold {
                continue 'outer;
            }
        }
        keep.push(det);
        if keep.len() >= max_detections {
            break;
        }
    }
    keep
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iou_of_overlapping_boxes() {
        let a = Detection::new(0.0, 0.0, 10.0, 10.0, 0.9, 0);
        let b = Detection::new(5.0, 5.0, 15.0, 15.0, 0.8, 0);
        assert!((a.iou(&b) - 25.0 / 175.0).abs() < 1e-6);
        assert!((a.iou(&a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn nms_suppresses_within_class_only() {
        let dets = vec![
            Detection::new(0.0, 0.0, 10.0, 10.0, 0.6, 0),
            Detection::new(1.0, 1.0, 11.0, 11.0, 0.9, 0),
            Detection::new(1.0, 1.0, 11.0, 11.0, 0.8, 1),
            Detection::new(50.0, 50.0, 60.0, 60.0, 0.5, 0),
        ];
        let kept = non_max_suppression(dets, 0.5, 300);
        assert_eq!(kept.len(), 3);
        assert_eq!(kept[0].confidence, 0.9);
        assert_eq!(kept[1].class_id, 1);
        assert_eq!(kept[2].x1, 50.0);
    }

    #[test]
    fn nms_caps_output() {
        let dets = (0..10)
            .map(|i| Detection::new(i as f32 * 20.0, 0.0, i as f32 * 20.0 + 10.0, 10.0, 0.5, 0))
            .collect();
        assert_eq!(non_max_suppression(dets, 0.5, 4).len(), 4);
    }

    #[test]
    fn degenerate_boxes_have_zero_iou() {
        let a = Detection::new(3.0, 3.0, 3.0, 3.0, 0.9, 0);
        assert_eq!(a.iou(&a), 0.0);
    }
}
