//! Image-plane Kalman filter with constant transition and measurement
//! matrices.
//!
//! State layout is `(cx, cy, vx, vy, ax, ay)`: centre position, velocity and
//! acceleration in pixels. Only the position is ever measured.

use anyhow::{anyhow, Result};
use nalgebra::{Matrix2, Matrix2x6, Matrix6, Vector2, Vector6};

/// Six-state filter for one tracked target.
#[derive(Debug, Clone)]
pub struct Kalman {
    x: Vector6<f64>,
    p: Matrix6<f64>,
    r: Matrix2<f64>,
    q: Matrix6<f64>,
}

impl Kalman {
    /// Filter seeded at the given centre with zero velocity. `initial_error`,
    /// `measure_variance` and `process_variance` are the diagonal entries of
    /// `P`, `R` and `Q`.
    pub fn new(
        cx: f64,
        cy: f64,
        initial_error: f64,
        measure_variance: f64,
        process_variance: f64,
    ) -> Self {
        Self {
            x: Vector6::new(cx, cy, 0.0, 0.0, 0.0, 0.0),
            p: Matrix6::identity() * initial_error,
            r: Matrix2::identity() * measure_variance,
            q: Matrix6::identity() * process_variance,
        }
    }

    /// Transition integrates velocity into position and acceleration into
    /// velocity per step. The acceleration rows are zero, so acceleration is
    /// never propagated: constant-velocity behaviour with spare slots.
    fn transition() -> Matrix6<f64> {
        #[rustfmt::skip]
        let a = Matrix6::new(
            1.0, 0.0, 1.0, 0.0, 0.0, 0.0,
            0.0, 1.0, 0.0, 1.0, 0.0, 0.0,
            0.0, 0.0, 1.0, 0.0, 1.0, 0.0,
            0.0, 0.0, 0.0, 1.0, 0.0, 1.0,
            0.0, 0.0, 0.0, 0.0, 0.0, 0.0,
            0.0, 0.0, 0.0, 0.0, 0.0, 0.0,
        );
        a
    }

    /// Measurement picks the centre position out of the state.
    fn measurement() -> Matrix2x6<f64> {
        #[rustfmt::skip]
        let h = Matrix2x6::new(
            1.0, 0.0, 0.0, 0.0, 0.0, 0.0,
            0.0, 1.0, 0.0, 0.0, 0.0, 0.0,
        );
        h
    }

    /// Time update: `X ← A·X`, `P ← A·P·Aᵀ + Q`.
    pub fn predict(&mut self) {
        let a = Self::transition();
        self.x = a * self.x;
        self.p = a * self.p * a.transpose() + self.q;
    }

    /// Measurement update with the observed centre `(cx, cy)`.
    ///
    /// The innovation covariance is 2×2 and positive-definite in practice;
    /// a singular one is reported instead of corrupting the state.
    pub fn correct(&mut self, cx: f64, cy: f64) -> Result<()> {
        let h = Self::measurement();
        let z = Vector2::new(cx, cy);

        let s = h * self.p * h.transpose() + self.r;
        let s_inv = s
            .try_inverse()
            .ok_or_else(|| anyhow!("singular innovation covariance: {s}"))?;

        let k = self.p * h.transpose() * s_inv;
        self.x += k * (z - h * self.x);
        self.p = (Matrix6::identity() - k * h) * self.p;

        Ok(())
    }

    /// Estimated centre position.
    pub fn position(&self) -> (f64, f64) {
        (self.x[0], self.x[1])
    }

    /// Estimated velocity in pixels per step.
    pub fn velocity(&self) -> (f64, f64) {
        (self.x[2], self.x[3])
    }

    /// Overwrites the velocity components, leaving the rest of the state.
    pub fn set_velocity(&mut self, vx: f64, vy: f64) {
        self.x[2] = vx;
        self.x[3] = vy;
    }

    /// Full state vector `(cx, cy, vx, vy, ax, ay)`.
    pub fn state(&self) -> &Vector6<f64> {
        &self.x
    }

    /// Error covariance.
    pub fn covariance(&self) -> &Matrix6<f64> {
        &self.p
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn filter_at(cx: f64, cy: f64) -> Kalman {
        Kalman::new(cx, cy, 100.0, 10.0, 0.1)
    }

    #[test]
    fn predict_integrates_velocity() {
        let mut kf = filter_at(100.0, 50.0);
        kf.set_velocity(10.0, -5.0);

        kf.predict();
        let (cx, cy) = kf.position();
        assert_abs_diff_eq!(cx, 110.0, epsilon = 1e-9);
        assert_abs_diff_eq!(cy, 45.0, epsilon = 1e-9);

        // velocity itself is unchanged: acceleration rows are zero
        let (vx, vy) = kf.velocity();
        assert_abs_diff_eq!(vx, 10.0, epsilon = 1e-9);
        assert_abs_diff_eq!(vy, -5.0, epsilon = 1e-9);
    }

    #[test]
    fn acceleration_never_propagates() {
        let mut kf = filter_at(0.0, 0.0);
        kf.x[4] = 3.0;
        kf.x[5] = 7.0;

        kf.predict();
        // acceleration feeds velocity once, then dies
        assert_abs_diff_eq!(kf.state()[2], 3.0, epsilon = 1e-9);
        assert_abs_diff_eq!(kf.state()[4], 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(kf.state()[5], 0.0, epsilon = 1e-9);
    }

    #[test]
    fn correct_pulls_toward_measurement() {
        let mut kf = filter_at(100.0, 100.0);
        kf.predict();
        kf.correct(110.0, 100.0).unwrap();

        let (cx, cy) = kf.position();
        assert!(cx > 100.0 && cx <= 110.0);
        assert_abs_diff_eq!(cy, 100.0, epsilon = 1e-6);
    }

    #[test]
    fn correct_with_exact_measurement_is_stable() {
        let mut kf = filter_at(50.0, 50.0);
        for _ in 0..10 {
            kf.predict();
            kf.correct(50.0, 50.0).unwrap();
        }
        let (cx, cy) = kf.position();
        assert_abs_diff_eq!(cx, 50.0, epsilon = 1e-6);
        assert_abs_diff_eq!(cy, 50.0, epsilon = 1e-6);
    }
}
