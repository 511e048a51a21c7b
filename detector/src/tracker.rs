//! Tracking stage.
//!
//! Consumes detection batches, drives the [`kftrack::MultiTracker`] through
//! one tick per batch and publishes the surviving tracks to the encoder.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use kftrack::{MultiTracker, Observation, TrackerConfig};

use crate::listener::{Listener, Mailbox};
use crate::stopwatch::Stopwatch;
use crate::types::{BoxBuf, TargetClass, TrackBuf};
use crate::worker::Stage;

struct TrackerInner {
    tracker: MultiTracker<TargetClass>,
    differ_untouch: Stopwatch,
    differ_associate: Stopwatch,
    differ_create: Stopwatch,
    differ_touch: Stopwatch,
    differ_cleanup: Stopwatch,
    differ_post: Stopwatch,
    differ_tot: Stopwatch,
}

/// Worker stage between inference and the encoder.
pub struct Tracker {
    mailbox: Mailbox<Vec<Observation<TargetClass>>>,
    sink: Arc<dyn Listener<Arc<Vec<TrackBuf>>> + Send + Sync>,
    target_classes: Vec<TargetClass>,
    on: AtomicBool,
    inner: Mutex<TrackerInner>,
    quiet: bool,
}

impl Tracker {
    pub fn new(
        config: TrackerConfig,
        target_classes: Vec<TargetClass>,
        sink: Arc<dyn Listener<Arc<Vec<TrackBuf>>> + Send + Sync>,
        quiet: bool,
    ) -> Self {
        log::info!(
            "tracker: max_dist={:.1}px max_time={}ms classes={:?}",
            config.max_dist,
            config.max_time.as_millis(),
            target_classes
        );
        Self {
            mailbox: Mailbox::new(),
            sink,
            target_classes,
            on: AtomicBool::new(false),
            inner: Mutex::new(TrackerInner {
                tracker: MultiTracker::new(config),
                differ_untouch: Stopwatch::new(),
                differ_associate: Stopwatch::new(),
                differ_create: Stopwatch::new(),
                differ_touch: Stopwatch::new(),
                differ_cleanup: Stopwatch::new(),
                differ_post: Stopwatch::new(),
                differ_tot: Stopwatch::new(),
            }),
            quiet,
        }
    }

    fn tick(inner: &mut TrackerInner, targets: Option<Vec<Observation<TargetClass>>>) {
        let now = Instant::now();

        if let Some(targets) = targets {
            if !targets.is_empty() {
                inner.differ_untouch.begin();
                inner.tracker.untouch();
                inner.differ_untouch.end();

                inner.differ_associate.begin();
                let leftover = inner.tracker.associate(targets, now);
                inner.differ_associate.end();

                inner.differ_create.begin();
                inner.tracker.spawn(leftover, now);
                inner.differ_create.end();

                inner.differ_touch.begin();
                inner.tracker.advance_untouched();
                inner.differ_touch.end();
            }
        }

        inner.differ_cleanup.begin();
        inner.tracker.evict(now);
        inner.differ_cleanup.end();
    }

    fn snapshot(inner: &TrackerInner) -> Vec<TrackBuf> {
        inner
            .tracker
            .tracks()
            .iter()
            .map(|track| TrackBuf {
                class: track.class(),
                id: track.id(),
                x: track.x.round() as u32,
                y: track.y.round() as u32,
                w: track.w.round() as u32,
                h: track.h.round() as u32,
            })
            .collect()
    }
}

impl Listener<Arc<Vec<BoxBuf>>> for Tracker {
    /// Filters the batch down to the tracked classes before overwriting the
    /// inbox slot.
    fn add_message(&self, boxes: Arc<Vec<BoxBuf>>) -> bool {
        let targets: Vec<Observation<TargetClass>> = boxes
            .iter()
            .filter(|b| self.target_classes.contains(&b.class))
            .map(|b| Observation {
                class: b.class,
                x: f64::from(b.x),
                y: f64::from(b.y),
                w: f64::from(b.w),
                h: f64::from(b.h),
            })
            .collect();

        let posted = self.mailbox.post(targets);
        if !posted {
            log::debug!("tracker inbox busy, detections dropped");
        }
        posted
    }
}

impl Stage for Tracker {
    fn waiting_to_run(&self) -> bool {
        if !self.on.swap(true, Ordering::SeqCst) {
            self.inner.lock().unwrap().differ_tot.begin();
        }
        true
    }

    fn running(&self) -> bool {
        if !self.on.load(Ordering::SeqCst) {
            return true;
        }

        let targets = self.mailbox.take();
        let mut inner = self.inner.lock().unwrap();
        Self::tick(&mut inner, targets);

        inner.differ_post.begin();
        let tracks = Self::snapshot(&inner);
        inner.differ_post.end();

        // an empty batch is meaningful: it tells the encoder "no tracks"
        if !self.sink.add_message(Arc::new(tracks)) {
            log::debug!("encoder busy, track batch dropped");
        }
        true
    }

    fn paused(&self) -> bool {
        true
    }

    fn waiting_to_halt(&self) -> bool {
        if self.on.swap(false, Ordering::SeqCst) {
            let mut inner = self.inner.lock().unwrap();
            inner.differ_tot.end();
            if !self.quiet {
                eprintln!("\nTracker Results...");
                eprintln!("      target untouch time (us): {}", inner.differ_untouch);
                eprintln!("  target association time (us): {}", inner.differ_associate);
                eprintln!("        track create time (us): {}", inner.differ_create);
                eprintln!("        target touch time (us): {}", inner.differ_touch);
                eprintln!("       track cleanup time (us): {}", inner.differ_cleanup);
                eprintln!("          track post time (us): {}", inner.differ_post);
                eprintln!("                  total tracks: {}", inner.tracker.total_spawned());
                eprintln!(
                    "               total test time: {} sec",
                    inner.differ_tot.avg as f32 / 1_000_000.0
                );
                eprintln!();
            }
        }
        true
    }
}
