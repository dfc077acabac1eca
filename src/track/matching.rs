//! Cost matrices and linear assignment for track/detection association.

use ndarray::Array2;

use crate::track::rect::Rect;

/// Cost assigned to padding cells when squaring the cost matrix.
const PAD_COST: f64 = 1e6;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Assignment {
    pub matches: Vec<(usize, usize)>,
    pub unmatched_tracks: Vec<usize>,
    pub unmatched_detections: Vec<usize>,
}

/// `1 - IoU` between every track box (rows) and detection box (columns).
pub fn iou_distance(tracks: &[Rect], detections: &[Rect]) -> Array2<f32> {
    Array2::from_shape_fn((tracks.len(), detections.len()), |(i, j)| {
        1.0 - tracks[i].iou(&detections[j])
    })
}

/// Blend detection confidence into an IoU distance matrix.
pub fn fuse_score(cost: &mut Array2<f32>, scores: &[f32]) {
    for ((_, j), value) in cost.indexed_iter_mut() {
        *value = 1.0 - (1.0 - *value) * scores[j];
    }
}

/// Solve the assignment problem, rejecting pairs costlier than `thresh`.
pub fn linear_assignment(cost: &Array2<f32>, thresh: f32) -> Assignment {
    let (rows, cols) = cost.dim();
    if rows == 0 || cols == 0 {
        return Assignment {
            matches: Vec::new(),
            unmatched_tracks: (0..rows).collect(),
            unmatched_detections: (0..cols).collect(),
        };
    }

    let size = rows.max(cols);
    let padded = Array2::<f64>::from_shape_fn((size, size), |(i, j)| {
        if i < rows && j < cols {
            cost[[i, j]] as f64
        } else {
            PAD_COST
        }
    });

    let mut assignment = Assignment::default();
    let mut detection_free = vec![true; cols];
    match lapjv::lapjv(&padded) {
        Ok((row_to_col, _)) => {
            for (row, &col) in row_to_col.iter().enumerate().take(rows) {
                if col < cols && cost[[row, col]] <= thresh {
                    assignment.matches.push((row, col));
                    detection_free[col] = false;
                } else {
                    assignment.unmatched_tracks.push(row);
                }
            }
        }
        Err(_) => {
            log::warn!("linear assignment did not converge, leaving tracks unmatched");
            assignment.unmatched_tracks = (0..rows).collect();
        }
    }
    assignment.unmatched_detections = detection_free
        .iter()
        .enumerate()
        .filter_map(|(j, free)| free.then_some(j))
        .collect();
    assignment
}
