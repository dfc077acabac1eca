//! Single-object track state.

use crate::track::kalman::{KalmanFilter, StateCovariance, StateMean};
use crate::track::rect::Rect;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrackState {
    #[default]
    New,
    Tracked,
    Lost,
}

#[derive(Debug, Clone)]
pub struct STrack {
    /// Zero until the track is activated.
    pub track_id: u64,
    pub state: TrackState,
    pub is_activated: bool,
    pub score: f32,
    pub class_id: usize,
    pub frame_id: u32,
    pub start_frame: u32,
    kalman: Option<(StateMean, StateCovariance)>,
    detection: Rect,
}

impl STrack {
    pub fn new(detection: Rect, score: f32, class_id: usize) -> Self {
        Self {
            track_id: 0,
            state: TrackState::New,
            is_activated: false,
            score,
            class_id,
            frame_id: 0,
            start_frame: 0,
            kalman: None,
            detection,
        }
    }

    /// Current box estimate: the filtered state when available, else the detection.
    pub fn rect(&self) -> Rect {
        match &self.kalman {
            Some((mean, _)) => Rect::from_xyah(
                mean[0] as f32,
                mean[1] as f32,
                mean[2] as f32,
                mean[3] as f32,
            ),
            None => self.detection,
        }
    }

    pub fn end_frame(&self) -> u32 {
        self.frame_id
    }

    pub fn activate(&mut self, kf: &KalmanFilter, track_id: u64, frame_id: u32) {
        self.track_id = track_id;
        self.kalman = Some(kf.initiate(self.detection.to_xyah()));
        self.state = TrackState::Tracked;
        // Tracks born on the first frame are confirmed immediately.
        self.is_activated = frame_id == 1;
        self.frame_id = frame_id;
        self.start_frame = frame_id;
    }

    pub fn re_activate(&mut self, detection: &STrack, kf: &KalmanFilter, frame_id: u32) {
        self.correct(detection, kf);
        self.state = TrackState::Tracked;
        self.is_activated = true;
        self.frame_id = frame_id;
    }

    pub fn update(&mut self, detection: &STrack, kf: &KalmanFilter, frame_id: u32) {
        self.correct(detection, kf);
        self.frame_id = frame_id;
        self.state = TrackState::Tracked;
        self.is_activated = true;
    }

    fn correct(&mut self, detection: &STrack, kf: &KalmanFilter) {
        if let Some((mean, cov)) = &self.kalman {
            self.kalman = Some(kf.update(mean, cov, detection.detection.to_xyah()));
        }
        self.score = detection.score;
        self.class_id = detection.class_id;
    }

    pub fn predict(&mut self, kf: &KalmanFilter) {
        if let Some((mean, cov)) = &self.kalman {
            let mut mean = *mean;
            if self.state != TrackState::Tracked {
                mean[7] = 0.0;
            }
            self.kalman = Some(kf.predict(&mean, cov));
        }
    }

    pub fn mark_lost(&mut self) {
        self.state = TrackState::Lost;
    }
}
