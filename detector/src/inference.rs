//! Inference stage.
//!
//! Consumes the freshest frame from its one-slot inbox, resizes it to the
//! backend's input geometry, evaluates the model and publishes the mapped,
//! thresholded detections to the tracker.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use image::imageops::{self, FilterType};
use image::RgbImage;

use crate::backend::Backend;
use crate::labels::LabelTable;
use crate::listener::{Listener, Mailbox};
use crate::stopwatch::Stopwatch;
use crate::types::{BoxBuf, FrameBuf, TargetClass};
use crate::worker::Stage;

struct InferenceInner {
    backend: Box<dyn Backend>,
    labels: LabelTable,
    threshold: f32,
    max_results: usize,
    next_box_id: u32,
    differ_prep: Stopwatch,
    differ_eval: Stopwatch,
    differ_post: Stopwatch,
    differ_tot: Stopwatch,
}

/// Worker stage between capture and tracking.
pub struct Inference {
    mailbox: Mailbox<Arc<FrameBuf>>,
    sink: Arc<dyn Listener<Arc<Vec<BoxBuf>>> + Send + Sync>,
    on: AtomicBool,
    inner: Mutex<InferenceInner>,
    quiet: bool,
}

impl Inference {
    pub fn new(
        backend: Box<dyn Backend>,
        labels: LabelTable,
        threshold: f32,
        max_results: usize,
        sink: Arc<dyn Listener<Arc<Vec<BoxBuf>>> + Send + Sync>,
        quiet: bool,
    ) -> Self {
        Self {
            mailbox: Mailbox::new(),
            sink,
            on: AtomicBool::new(false),
            inner: Mutex::new(InferenceInner {
                backend,
                labels,
                threshold,
                max_results,
                next_box_id: 0,
                differ_prep: Stopwatch::new(),
                differ_eval: Stopwatch::new(),
                differ_post: Stopwatch::new(),
                differ_tot: Stopwatch::new(),
            }),
            quiet,
        }
    }

    fn evaluate(inner: &mut InferenceInner, frame: &FrameBuf) -> Option<Vec<BoxBuf>> {
        let (want_w, want_h) = inner.backend.input_size();

        inner.differ_prep.begin();
        let Some(src) = RgbImage::from_raw(frame.width, frame.height, frame.data.clone()) else {
            log::error!(
                "frame {}: buffer length {} does not match {}x{}",
                frame.id,
                frame.length(),
                frame.width,
                frame.height
            );
            return None;
        };
        let resized = if (frame.width, frame.height) == (want_w, want_h) {
            src
        } else {
            imageops::resize(&src, want_w, want_h, FilterType::Nearest)
        };
        inner.differ_prep.end();

        inner.differ_eval.begin();
        let mut raw = match inner.backend.detect(resized.as_raw()) {
            Ok(raw) => raw,
            Err(err) => {
                log::error!("frame {}: inference failed: {err}", frame.id);
                return None;
            }
        };
        inner.differ_eval.end();

        inner.differ_post.begin();
        raw.sort_by(|a, b| b.score.total_cmp(&a.score));
        raw.truncate(inner.max_results);

        // back to source-frame pixels
        let sx = frame.width as f32 / want_w as f32;
        let sy = frame.height as f32 / want_h as f32;

        let mut boxes = Vec::with_capacity(raw.len());
        for det in &raw {
            if det.score < inner.threshold {
                continue;
            }
            let class = inner.labels.class(det.class_id);
            if class == TargetClass::Unknown {
                log::debug!(
                    "frame {}: dropping unmapped label {:?}",
                    frame.id,
                    inner.labels.label(det.class_id)
                );
                continue;
            }
            inner.next_box_id = inner.next_box_id.wrapping_add(1);
            boxes.push(BoxBuf {
                class,
                id: inner.next_box_id,
                x: (det.x * sx).round().max(0.0) as u32,
                y: (det.y * sy).round().max(0.0) as u32,
                w: (det.w * sx).round().max(0.0) as u32,
                h: (det.h * sy).round().max(0.0) as u32,
            });
        }
        inner.differ_post.end();
        Some(boxes)
    }
}

impl Listener<Arc<FrameBuf>> for Inference {
    fn add_message(&self, frame: Arc<FrameBuf>) -> bool {
        let posted = self.mailbox.post(frame);
        if !posted {
            log::debug!("inference inbox busy, frame dropped");
        }
        posted
    }
}

impl Stage for Inference {
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
        let Some(frame) = self.mailbox.take() else {
            return true;
        };

        let mut inner = self.inner.lock().unwrap();
        let Some(boxes) = Self::evaluate(&mut inner, &frame) else {
            return false;
        };

        if !self.sink.add_message(Arc::new(boxes)) {
            log::debug!("tracker busy, detections for frame {} dropped", frame.id);
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
                eprintln!("\nInference Results...");
                eprintln!("         frame prep time (us): {}", inner.differ_prep);
                eprintln!("         model eval time (us): {}", inner.differ_eval);
                eprintln!("        publish box time (us): {}", inner.differ_post);
                eprintln!("                 total boxes: {}", inner.next_box_id);
                eprintln!(
                    "             total test time: {} sec",
                    inner.differ_tot.avg as f32 / 1_000_000.0
                );
                eprintln!();
            }
        }
        true
    }
}
