//! Kalman-filter multi-object tracking with Hungarian data association.
//!
//! This crate holds the tracking math only: no threads, no I/O. Callers feed
//! batches of [`Observation`]s into a [`MultiTracker`] once per pipeline tick
//! and read the surviving [`Track`]s back out.
//!
//! ```rust
//! use std::time::Instant;
//! use kftrack::{MultiTracker, Observation, TrackerConfig};
//!
//! let mut tracker: MultiTracker<u8> = MultiTracker::new(TrackerConfig::default());
//! let obs = Observation { class: 0, x: 100.0, y: 100.0, w: 20.0, h: 20.0 };
//! tracker.step(vec![obs], Instant::now());
//! assert_eq!(tracker.tracks().len(), 1);
//! ```

pub mod hungarian;
pub mod kalman;
pub mod track;
pub mod tracker;

pub use kalman::Kalman;
pub use track::{Observation, Track, TrackState};
pub use tracker::{MultiTracker, TrackerConfig};
