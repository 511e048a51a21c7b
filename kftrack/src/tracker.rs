//! Multi-object tracker core.
//!
//! One tracker tick is: untouch → associate → spawn → advance untouched →
//! evict. [`MultiTracker::step`] composes the phases; they are also exposed
//! individually so a caller can instrument each one.

use std::time::{Duration, Instant};

use ndarray::Array2;

use crate::hungarian::{self, FORBIDDEN};
use crate::track::{Observation, Track};

/// Tracker tuning, immutable after construction.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Maximum centre-to-centre association distance in pixels (inclusive).
    pub max_dist: f64,
    /// Tracks unseen strictly longer than this are evicted.
    pub max_time: Duration,
    /// Diagonal of the initial error covariance `P`.
    pub initial_error: f64,
    /// Diagonal of the measurement covariance `R`.
    pub measure_variance: f64,
    /// Diagonal of the process covariance `Q`.
    pub process_variance: f64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            max_dist: 100.0,
            max_time: Duration::from_millis(1000),
            initial_error: 100.0,
            measure_variance: 10.0,
            process_variance: 0.1,
        }
    }
}

/// Tracks a population of targets across ticks.
#[derive(Debug)]
pub struct MultiTracker<C> {
    config: TrackerConfig,
    tracks: Vec<Track<C>>,
    track_cnt: u32,
}

impl<C: Copy + PartialEq> MultiTracker<C> {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            tracks: Vec::new(),
            track_cnt: 0,
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Live tracks, in birth order.
    pub fn tracks(&self) -> &[Track<C>] {
        &self.tracks
    }

    /// Total tracks ever created; also the highest id handed out.
    pub fn total_spawned(&self) -> u32 {
        self.track_cnt
    }

    /// One full tick. Association, birth and advancement only happen when
    /// the batch is non-empty; eviction always runs.
    pub fn step(&mut self, targets: Vec<Observation<C>>, now: Instant) {
        if !targets.is_empty() {
            self.untouch();
            let leftover = self.associate(targets, now);
            self.spawn(leftover, now);
            self.advance_untouched();
        }
        self.evict(now);
    }

    /// Clears the per-tick `touched` flag on every track.
    pub fn untouch(&mut self) {
        for track in &mut self.tracks {
            track.touched = false;
        }
    }

    /// Assigns observations to tracks and fuses the matches.
    ///
    /// The cost matrix holds predicted-centre distances for same-class
    /// pairs and [`FORBIDDEN`] otherwise; an assignment is only consumed
    /// when its cost is within `max_dist`, so cross-class pairings and
    /// dummy pad columns never fuse. Returns the unconsumed observations.
    pub fn associate(
        &mut self,
        targets: Vec<Observation<C>>,
        now: Instant,
    ) -> Vec<Observation<C>> {
        if self.tracks.is_empty() || targets.is_empty() {
            return targets;
        }

        let mut costs = Array2::from_elem((self.tracks.len(), targets.len()), FORBIDDEN);
        for (k, obs) in targets.iter().enumerate() {
            let (cx, cy) = obs.center();
            for (i, track) in self.tracks.iter().enumerate() {
                if track.class() == obs.class {
                    costs[[i, k]] = track.distance_to(cx, cy);
                }
            }
        }

        let assignment = hungarian::solve(costs.view());

        let mut used = vec![false; targets.len()];
        for (i, assigned) in assignment.iter().enumerate() {
            let Some(k) = *assigned else { continue };
            if costs[[i, k]] <= self.config.max_dist {
                self.tracks[i].observe(&targets[k], now);
                used[k] = true;
            }
        }

        let mut leftover = Vec::with_capacity(targets.len());
        for (k, obs) in targets.into_iter().enumerate() {
            if !used[k] {
                leftover.push(obs);
            }
        }
        leftover
    }

    /// Births a new `Init` track for every remaining observation. Ids come
    /// from a pre-incremented counter: the first track is 1 and ids never
    /// repeat within a tracker.
    pub fn spawn(&mut self, targets: Vec<Observation<C>>, now: Instant) {
        for obs in &targets {
            self.track_cnt += 1;
            self.tracks
                .push(Track::new(self.track_cnt, obs, now, &self.config));
        }
    }

    /// Time-advances every track the current tick did not associate, so
    /// fresh tracks keep their stamp-derived lifetime and stale ones keep
    /// moving along their last estimated trajectory.
    pub fn advance_untouched(&mut self) {
        for track in &mut self.tracks {
            if !track.touched {
                track.advance();
            }
        }
    }

    /// Drops every track unseen strictly longer than `max_time`.
    pub fn evict(&mut self, now: Instant) {
        let max_time = self.config.max_time;
        let before = self.tracks.len();
        self.tracks
            .retain(|track| now.duration_since(track.stamp()) <= max_time);
        let dropped = before - self.tracks.len();
        if dropped > 0 {
            log::debug!("evicted {dropped} stale track(s), {} remain", self.tracks.len());
        }
    }
}
