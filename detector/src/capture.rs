//! Frame acquisition stage.
//!
//! The stage owns a [`FrameSource`] and pushes its frames into the inference
//! inbox at a configured rate. Which device (or file, or pattern generator)
//! backs the source is out of scope here.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::error::Result;
use crate::listener::Listener;
use crate::stopwatch::Stopwatch;
use crate::types::FrameBuf;
use crate::worker::Stage;

/// Produces raw RGB24 frames for the pipeline.
pub trait FrameSource: Send {
    fn next_frame(&mut self) -> Result<FrameBuf>;
}

/// Deterministic moving-bar test pattern, for running without camera
/// hardware.
pub struct TestPattern {
    width: u32,
    height: u32,
    next_id: u32,
}

impl TestPattern {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            next_id: 0,
        }
    }
}

impl FrameSource for TestPattern {
    fn next_frame(&mut self) -> Result<FrameBuf> {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);

        let bar = (id % self.width) as usize;
        let mut data = vec![0u8; (self.width * self.height * 3) as usize];
        for row in 0..self.height as usize {
            let offset = (row * self.width as usize + bar) * 3;
            data[offset] = 0xff;
        }
        Ok(FrameBuf::new(id, self.width, self.height, data))
    }
}

struct CaptureInner {
    source: Box<dyn FrameSource>,
    interval: Duration,
    due: Instant,
    on: bool,
    differ_frame: Stopwatch,
    differ_tot: Stopwatch,
}

/// Worker stage feeding frames downstream.
pub struct Capture {
    inner: Mutex<CaptureInner>,
    sink: Arc<dyn Listener<Arc<FrameBuf>> + Send + Sync>,
    quiet: bool,
}

impl Capture {
    /// `fps == 0` produces a frame on every tick.
    pub fn new(
        source: Box<dyn FrameSource>,
        fps: u32,
        sink: Arc<dyn Listener<Arc<FrameBuf>> + Send + Sync>,
        quiet: bool,
    ) -> Self {
        let interval = if fps == 0 {
            Duration::ZERO
        } else {
            Duration::from_secs(1) / fps
        };
        Self {
            inner: Mutex::new(CaptureInner {
                source,
                interval,
                due: Instant::now(),
                on: false,
                differ_frame: Stopwatch::new(),
                differ_tot: Stopwatch::new(),
            }),
            sink,
            quiet,
        }
    }
}

impl Stage for Capture {
    fn waiting_to_run(&self) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if !inner.on {
            inner.on = true;
            inner.due = Instant::now();
            inner.differ_tot.begin();
        }
        true
    }

    fn running(&self) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if !inner.on {
            return true;
        }

        let now = Instant::now();
        if now < inner.due {
            return true;
        }
        inner.due = now + inner.interval;

        inner.differ_frame.begin();
        let frame = match inner.source.next_frame() {
            Ok(frame) => frame,
            Err(err) => {
                log::error!("frame source failed: {err}");
                return false;
            }
        };
        inner.differ_frame.end();

        let id = frame.id;
        if !self.sink.add_message(Arc::new(frame)) {
            log::debug!("inference busy, frame {id} dropped");
        }
        true
    }

    fn paused(&self) -> bool {
        true
    }

    fn waiting_to_halt(&self) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if inner.on {
            inner.on = false;
            inner.differ_tot.end();
            if !self.quiet {
                eprintln!("\nCapture Results...");
                eprintln!("      frame acquire time (us): {}", inner.differ_frame);
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_frames_are_valid_and_numbered() {
        let mut source = TestPattern::new(64, 48);

        let first = source.next_frame().unwrap();
        let second = source.next_frame().unwrap();

        assert_eq!(first.id, 0);
        assert_eq!(second.id, 1);
        assert!(first.validate());
        assert_ne!(first.data, second.data, "pattern must move");
    }
}
