//! Constant-velocity Kalman filter over `[cx, cy, aspect, h]` box measurements.

use nalgebra::{SMatrix, SVector};

pub type StateMean = SVector<f64, 8>;
pub type StateCovariance = SMatrix<f64, 8, 8>;
type Measurement = SVector<f64, 4>;

const STD_WEIGHT_POSITION: f64 = 1.0 / 20.0;
const STD_WEIGHT_VELOCITY: f64 = 1.0 / 160.0;

#[derive(Debug, Clone)]
pub struct KalmanFilter {
    motion: SMatrix<f64, 8, 8>,
    update: SMatrix<f64, 4, 8>,
}

impl Default for KalmanFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl KalmanFilter {
    pub fn new() -> Self {
        let mut motion = SMatrix::<f64, 8, 8>::identity();
        let mut update = SMatrix::<f64, 4, 8>::zeros();
        for i in 0..4 {
            motion[(i, 4 + i)] = 1.0;
            update[(i, i)] = 1.0;
        }
        Self { motion, update }
    }

    /// Create a track state from an unassociated measurement.
    pub fn initiate(&self, measurement: [f32; 4]) -> (StateMean, StateCovariance) {
        let mut mean = StateMean::zeros();
        for (i, value) in measurement.iter().enumerate() {
            mean[i] = *value as f64;
        }
        let h = mean[3];
        let std = [
            2.0 * STD_WEIGHT_POSITION * h,
            2.0 * STD_WEIGHT_POSITION * h,
            1e-2,
            2.0 * STD_WEIGHT_POSITION * h,
            10.0 * STD_WEIGHT_VELOCITY * h,
            10.0 * STD_WEIGHT_VELOCITY * h,
            1e-5,
            10.0 * STD_WEIGHT_VELOCITY * h,
        ];
        (mean, diagonal(std))
    }

    pub fn predict(
        &self,
        mean: &StateMean,
        covariance: &StateCovariance,
    ) -> (StateMean, StateCovariance) {
        let h = mean[3];
        let std = [
            STD_WEIGHT_POSITION * h,
            STD_WEIGHT_POSITION * h,
            1e-2,
            STD_WEIGHT_POSITION * h,
            STD_WEIGHT_VELOCITY * h,
            STD_WEIGHT_VELOCITY * h,
            1e-5,
            STD_WEIGHT_VELOCITY * h,
        ];
        let mean = self.motion * mean;
        let covariance = self.motion * covariance * self.motion.transpose() + diagonal(std);
        (mean, covariance)
    }

    /// Correct a predicted state with a measurement.
    ///
    /// A singular innovation covariance leaves the state untouched.
    pub fn update(
        &self,
        mean: &StateMean,
        covariance: &StateCovariance,
        measurement: [f32; 4],
    ) -> (StateMean, StateCovariance) {
        let h = mean[3];
        let std = [
            STD_WEIGHT_POSITION * h,
            STD_WEIGHT_POSITION * h,
            1e-1,
            STD_WEIGHT_POSITION * h,
        ];
        let innovation_cov = diagonal(std);
        let projected_mean = self.update * mean;
        let projected_cov = self.update * covariance * self.update.transpose() + innovation_cov;

        let Some(projected_inv) = projected_cov.try_inverse() else {
            return (*mean, *covariance);
        };
        let gain = covariance * self.update.transpose() * projected_inv;
        let measured = Measurement::from_iterator(measurement.iter().map(|v| *v as f64));
        let innovation = measured - projected_mean;

        let mean = mean + gain * innovation;
        let covariance = covariance - gain * projected_cov * gain.transpose();
        (mean, covariance)
    }
}

fn diagonal<const N: usize>(std: [f64; N]) -> SMatrix<f64, N, N> {
    let mut out = SMatrix::<f64, N, N>::zeros();
    for (i, s) in std.iter().enumerate() {
        out[(i, i)] = s * s;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initiate_copies_measurement() {
        let kf = KalmanFilter::new();
        let (mean, cov) = kf.initiate([100.0, 200.0, 0.5, 50.0]);
        assert_eq!(mean[0], 100.0);
        assert_eq!(mean[3], 50.0);
        assert_eq!(mean[4], 0.0);
        assert!(cov[(0, 0)] > 0.0);
    }

    #[test]
    fn update_moves_toward_measurement() {
        let kf = KalmanFilter::new();
        let (mean, cov) = kf.initiate([100.0, 100.0, 1.0, 50.0]);
        let (mean, cov) = kf.predict(&mean, &cov);
        let (mean, _) = kf.update(&mean, &cov, [110.0, 100.0, 1.0, 50.0]);
        assert!(mean[0] > 100.0 && mean[0] < 110.0);
        assert!(mean[4] > 0.0);
    }
}
