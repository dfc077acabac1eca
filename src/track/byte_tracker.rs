//! ByteTrack multi-object tracker.
//!
//! Associates detections with existing tracks in two passes: confident detections
//! first (IoU plus optional score fusion), then low-confidence detections against the
//! tracks left over. Unmatched confident detections start new tracks; tracks that go
//! unmatched are kept as lost for `max_time_lost` frames before removal.

use std::collections::HashSet;

use crate::detect::Detection;
use crate::track::kalman::KalmanFilter;
use crate::track::matching::{self, Assignment};
use crate::track::rect::Rect;
use crate::track::settings::TrackerSettings;
use crate::track::strack::{STrack, TrackState};

const SECOND_MATCH_THRESH: f32 = 0.5;
const UNCONFIRMED_MATCH_THRESH: f32 = 0.7;
const DUPLICATE_IOU: f32 = 0.85;

pub struct ByteTracker {
    settings: TrackerSettings,
    kalman: KalmanFilter,
    tracked: Vec<STrack>,
    lost: Vec<STrack>,
    frame_id: u32,
    max_time_lost: u32,
    next_id: u64,
}

impl ByteTracker {
    pub fn new(settings: TrackerSettings) -> Self {
        let max_time_lost = settings.max_time_lost();
        Self {
            settings,
            kalman: KalmanFilter::new(),
            tracked: Vec::new(),
            lost: Vec::new(),
            frame_id: 0,
            max_time_lost,
            next_id: 0,
        }
    }

    pub fn settings(&self) -> &TrackerSettings {
        &self.settings
    }

    pub fn frame_id(&self) -> u32 {
        self.frame_id
    }

    /// Drop all tracks and restart ID assignment.
    pub fn reset(&mut self) {
        self.tracked.clear();
        self.lost.clear();
        self.frame_id = 0;
        self.next_id = 0;
    }

    fn next_track_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    /// Advance one frame and return the confirmed tracks as detections carrying a
    /// track ID.
    pub fn update(&mut self, detections: &[Detection]) -> Vec<Detection> {
        self.frame_id += 1;
        let frame_id = self.frame_id;

        let mut activated = Vec::new();
        let mut refound = Vec::new();
        let mut lost = Vec::new();
        let mut removed = 0usize;

        let mut high = Vec::new();
        let mut low = Vec::new();
        for det in detections {
            let track = STrack::new(
                Rect::from_tlbr(det.x1, det.y1, det.x2, det.y2),
                det.confidence,
                det.class_id,
            );
            if det.confidence >= self.settings.track_high_thresh {
                high.push(track);
            } else if det.confidence > self.settings.track_low_thresh {
                low.push(track);
            }
        }

        let (mut confirmed, mut unconfirmed): (Vec<STrack>, Vec<STrack>) =
            self.tracked.drain(..).partition(|t| t.is_activated);
        // Lost tracks are predicted in place so they keep coasting while unmatched.
        for track in confirmed.iter_mut().chain(self.lost.iter_mut()) {
            track.predict(&self.kalman);
        }
        let pool = joint_stracks(confirmed, &self.lost);

        // First association: confident detections against every live track.
        let mut dists = matching::iou_distance(&rects(&pool), &rects(&high));
        if self.settings.fuse_score {
            matching::fuse_score(&mut dists, &scores(&high));
        }
        let Assignment {
            matches,
            unmatched_tracks,
            unmatched_detections,
        } = matching::linear_assignment(&dists, self.settings.match_thresh);

        for (itrack, idet) in matches {
            let mut track = pool[itrack].clone();
            if track.state == TrackState::Tracked {
                track.update(&high[idet], &self.kalman, frame_id);
                activated.push(track);
            } else {
                track.re_activate(&high[idet], &self.kalman, frame_id);
                refound.push(track);
            }
        }

        // Second association: low-score detections against tracks still tracked.
        let leftover: Vec<STrack> = unmatched_tracks
            .iter()
            .map(|&i| &pool[i])
            .filter(|t| t.state == TrackState::Tracked)
            .cloned()
            .collect();
        let dists = matching::iou_distance(&rects(&leftover), &rects(&low));
        let second = matching::linear_assignment(&dists, SECOND_MATCH_THRESH);
        for &(itrack, idet) in &second.matches {
            let mut track = leftover[itrack].clone();
            track.update(&low[idet], &self.kalman, frame_id);
            activated.push(track);
        }
        for &i in &second.unmatched_tracks {
            let mut track = leftover[i].clone();
            track.mark_lost();
            lost.push(track);
        }

        // Unconfirmed tracks only get one chance to match.
        let remaining: Vec<STrack> = unmatched_detections
            .iter()
            .map(|&i| high[i].clone())
            .collect();
        let mut dists = matching::iou_distance(&rects(&unconfirmed), &rects(&remaining));
        if self.settings.fuse_score {
            matching::fuse_score(&mut dists, &scores(&remaining));
        }
        let third = matching::linear_assignment(&dists, UNCONFIRMED_MATCH_THRESH);
        for &(itrack, idet) in &third.matches {
            unconfirmed[itrack].update(&remaining[idet], &self.kalman, frame_id);
            activated.push(unconfirmed[itrack].clone());
        }
        removed += third.unmatched_tracks.len();

        for &i in &third.unmatched_detections {
            let mut track = remaining[i].clone();
            if track.score < self.settings.new_track_thresh {
                continue;
            }
            let id = self.next_track_id();
            track.activate(&self.kalman, id, frame_id);
            activated.push(track);
        }

        for track in self.lost.drain(..) {
            if frame_id - track.end_frame() > self.max_time_lost {
                removed += 1;
            } else {
                lost.push(track);
            }
        }

        let tracked: Vec<STrack> = activated
            .into_iter()
            .chain(refound)
            .filter(|t| t.state == TrackState::Tracked)
            .collect();
        let lost = sub_stracks(lost, &tracked);
        let (tracked, lost) = remove_duplicate_stracks(tracked, lost);
        self.tracked = tracked;
        self.lost = lost;

        if removed > 0 {
            log::trace!("frame {}: removed {} tracks", frame_id, removed);
        }

        self.tracked
            .iter()
            .filter(|t| t.is_activated)
            .map(|t| {
                let [x1, y1, x2, y2] = t.rect().to_tlbr();
                Detection::new(x1, y1, x2, y2, t.score, t.class_id).with_track_id(t.track_id)
            })
            .collect()
    }
}

fn rects(tracks: &[STrack]) -> Vec<Rect> {
    tracks.iter().map(STrack::rect).collect()
}

fn scores(tracks: &[STrack]) -> Vec<f32> {
    tracks.iter().map(|t| t.score).collect()
}

fn joint_stracks(first: Vec<STrack>, second: &[STrack]) -> Vec<STrack> {
    let mut seen: HashSet<u64> = first.iter().map(|t| t.track_id).collect();
    let mut joined = first;
    for track in second {
        if seen.insert(track.track_id) {
            joined.push(track.clone());
        }
    }
    joined
}

fn sub_stracks(tracks: Vec<STrack>, exclude: &[STrack]) -> Vec<STrack> {
    let ids: HashSet<u64> = exclude.iter().map(|t| t.track_id).collect();
    tracks
        .into_iter()
        .filter(|t| !ids.contains(&t.track_id))
        .collect()
}

/// Where a tracked and a lost track overlap heavily, keep the older one.
fn remove_duplicate_stracks(
    tracked: Vec<STrack>,
    lost: Vec<STrack>,
) -> (Vec<STrack>, Vec<STrack>) {
    if tracked.is_empty() || lost.is_empty() {
        return (tracked, lost);
    }
    let dists = matching::iou_distance(&rects(&tracked), &rects(&lost));
    let mut drop_tracked = vec![false; tracked.len()];
    let mut drop_lost = vec![false; lost.len()];
    for ((i, j), dist) in dists.indexed_iter() {
        if 1.0 - dist > DUPLICATE_IOU {
            let age_tracked = tracked[i].frame_id - tracked[i].start_frame;
            let age_lost = lost[j].frame_id - lost[j].start_frame;
            if age_tracked > age_lost {
                drop_lost[j] = true;
            } else {
                drop_tracked[i] = true;
            }
        }
    }
    let keep = |tracks: Vec<STrack>, drop: &[bool]| -> Vec<STrack> {
        tracks
            .into_iter()
            .zip(drop)
            .filter_map(|(t, &d)| (!d).then_some(t))
            .collect()
    };
    (keep(tracked, &drop_tracked), keep(lost, &drop_lost))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person(x: f32, score: f32) -> Detection {
        Detection::new(x, 10.0, x + 40.0, 110.0, score, 0)
    }

    #[test]
    fn first_frame_tracks_are_confirmed() {
        let mut tracker = ByteTracker::new(TrackerSettings::default());
        let out = tracker.update(&[person(0.0, 0.9), person(200.0, 0.8)]);
        assert_eq!(out.len(), 2);
        let mut ids: Vec<u64> = out.iter().filter_map(|d| d.track_id).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn ids_persist_across_frames() {
        let mut tracker = ByteTracker::new(TrackerSettings::default());
        let first = tracker.update(&[person(0.0, 0.9)]);
        let second = tracker.update(&[person(3.0, 0.9)]);
        assert_eq!(first[0].track_id, Some(1));
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].track_id, Some(1));
    }

    #[test]
    fn low_score_detection_keeps_track_alive() {
        let mut tracker = ByteTracker::new(TrackerSettings::default());
        tracker.update(&[person(0.0, 0.9)]);
        let out = tracker.update(&[person(2.0, 0.15)]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].track_id, Some(1));
    }

    #[test]
    fn low_score_detection_does_not_start_track() {
        let mut tracker = ByteTracker::new(TrackerSettings::default());
        assert!(tracker.update(&[person(0.0, 0.2)]).is_empty());
    }

    #[test]
    fn lost_track_is_recovered_with_same_id() {
        let mut tracker = ByteTracker::new(TrackerSettings::default());
        tracker.update(&[person(0.0, 0.9)]);
        assert!(tracker.update(&[]).is_empty());
        let out = tracker.update(&[person(0.0, 0.9)]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].track_id, Some(1));
    }

    #[test]
    fn separate_trackers_count_ids_independently() {
        let mut a = ByteTracker::new(TrackerSettings::default());
        let mut b = ByteTracker::new(TrackerSettings::default());
        a.update(&[person(0.0, 0.9), person(200.0, 0.9)]);
        let out = b.update(&[person(0.0, 0.9)]);
        assert_eq!(out[0].track_id, Some(1));
    }

    #[test]
    fn reset_restarts_ids() {
        let mut tracker = ByteTracker::new(TrackerSettings::default());
        tracker.update(&[person(0.0, 0.9), person(200.0, 0.9)]);
        tracker.reset();
        let out = tracker.update(&[person(400.0, 0.9)]);
        assert_eq!(out[0].track_id, Some(1));
        assert_eq!(tracker.frame_id(), 1);
    }
}
