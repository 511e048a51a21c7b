//! A single tracked target and the observations that feed it.

use std::time::Instant;

use crate::kalman::Kalman;
use crate::tracker::TrackerConfig;

/// Track lifecycle: `Init` from birth until the first association promotes
/// it to `Active`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackState {
    Init,
    Active,
}

/// One detection offered to the tracker, in source-frame pixels. `class` is
/// whatever the caller partitions targets by; associations never cross it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation<C> {
    pub class: C,
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl<C> Observation<C> {
    /// Centre of the detection rectangle.
    pub fn center(&self) -> (f64, f64) {
        (self.x + self.w / 2.0, self.y + self.h / 2.0)
    }
}

/// A persistent identity following one object across frames.
///
/// `id` and `class` are fixed at birth; the rectangle mirrors the last
/// associated observation while the filter carries the motion estimate.
#[derive(Debug, Clone)]
pub struct Track<C> {
    id: u32,
    class: C,
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
    state: TrackState,
    stamp: Instant,
    pub(crate) touched: bool,
    kalman: Kalman,
}

impl<C: Copy + PartialEq> Track<C> {
    pub(crate) fn new(id: u32, obs: &Observation<C>, now: Instant, config: &TrackerConfig) -> Self {
        let (cx, cy) = obs.center();
        Self {
            id,
            class: obs.class,
            x: obs.x,
            y: obs.y,
            w: obs.w,
            h: obs.h,
            state: TrackState::Init,
            stamp: now,
            touched: true,
            kalman: Kalman::new(
                cx,
                cy,
                config.initial_error,
                config.measure_variance,
                config.process_variance,
            ),
        }
    }

    /// Tracker-assigned id, unique and strictly increasing per tracker.
    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn class(&self) -> C {
        self.class
    }

    pub fn state(&self) -> TrackState {
        self.state
    }

    /// Time of the last associated observation.
    pub fn stamp(&self) -> Instant {
        self.stamp
    }

    /// Centre the filter currently predicts.
    pub fn predicted_center(&self) -> (f64, f64) {
        self.kalman.position()
    }

    /// Estimated velocity in pixels per tick.
    pub fn velocity(&self) -> (f64, f64) {
        self.kalman.velocity()
    }

    /// Euclidean distance from the predicted centre to `(cx, cy)`.
    pub fn distance_to(&self, cx: f64, cy: f64) -> f64 {
        let (px, py) = self.kalman.position();
        ((cx - px).powi(2) + (cy - py).powi(2)).sqrt()
    }

    /// Time-only update: advances the motion estimate one step along the
    /// last trajectory and marks the track touched for this tick.
    pub(crate) fn advance(&mut self) {
        self.touched = true;
        self.kalman.predict();
    }

    /// Fuses an associated observation into the track.
    ///
    /// On the first association the velocity is seeded from the centre
    /// delta, so a target picked up twice starts moving immediately instead
    /// of waiting for the filter to converge.
    pub(crate) fn observe(&mut self, obs: &Observation<C>, now: Instant) {
        self.stamp = now;
        self.x = obs.x;
        self.y = obs.y;
        self.w = obs.w;
        self.h = obs.h;

        let (cx, cy) = obs.center();
        if self.state == TrackState::Init {
            let (px, py) = self.kalman.position();
            self.kalman.set_velocity(cx - px, cy - py);
        }
        self.advance();
        self.state = TrackState::Active;

        if let Err(err) = self.kalman.correct(cx, cy) {
            // keep the prediction; the tick becomes a no-op for this track
            log::error!("track {}: measurement fuse failed: {err}", self.id);
        }
    }
}
