use detection_bridge::{ByteTracker, Detection, TrackerSettings};

fn walker(step: usize, x0: f32) -> Detection {
    let x = x0 + step as f32 * 4.0;
    Detection::new(x, 50.0, x + 30.0, 130.0, 0.85, 0)
}

#[test]
fn two_objects_keep_distinct_ids_while_moving() {
    let mut tracker = ByteTracker::new(TrackerSettings::default());
    let mut seen = Vec::new();
    for step in 0..20 {
        let out = tracker.update(&[walker(step, 10.0), walker(step, 300.0)]);
        assert_eq!(out.len(), 2, "frame {}", step);
        let mut frame: Vec<(f32, u64)> = out
            .iter()
            .map(|d| (d.x1, d.track_id.expect("tracked detections carry ids")))
            .collect();
        frame.sort_by(|a, b| a.0.total_cmp(&b.0));
        seen.push((frame[0].1, frame[1].1));
    }
    assert!(seen.iter().all(|ids| *ids == seen[0]));
    assert_ne!(seen[0].0, seen[0].1);
}

#[test]
fn track_expires_after_buffer() {
    let settings = TrackerSettings {
        track_buffer: 3,
        ..TrackerSettings::default()
    };
    let mut tracker = ByteTracker::new(settings);
    tracker.update(&[walker(0, 10.0)]);
    for _ in 0..5 {
        assert!(tracker.update(&[]).is_empty());
    }
    let out = tracker.update(&[walker(0, 10.0)]);
    assert_eq!(out.len(), 0, "a fresh track is unconfirmed on its first frame");
    let out = tracker.update(&[walker(0, 10.0)]);
    assert_eq!(out[0].track_id, Some(2));
}

#[test]
fn class_follows_latest_detection() {
    let mut tracker = ByteTracker::new(TrackerSettings::default());
    tracker.update(&[Detection::new(0.0, 0.0, 40.0, 80.0, 0.9, 1)]);
    let out = tracker.update(&[Detection::new(1.0, 0.0, 41.0, 80.0, 0.9, 2)]);
    assert_eq!(out[0].class_id, 2);
}

#[test]
fn occluded_object_keeps_id_when_it_reappears_on_its_path() {
    let mut tracker = ByteTracker::new(TrackerSettings::default());
    let at = |step: usize| {
        let x = 20.0 + step as f32 * 8.0;
        Detection::new(x, 40.0, x + 30.0, 120.0, 0.9, 0)
    };
    for step in 0..15 {
        let out = tracker.update(&[at(step)]);
        assert_eq!(out[0].track_id, Some(1), "frame {}", step);
    }
    for _ in 15..20 {
        assert!(tracker.update(&[]).is_empty());
    }
    let out = tracker.update(&[at(20)]);
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].track_id, Some(1));
    let out = tracker.update(&[at(21)]);
    assert_eq!(out[0].track_id, Some(1));
}
