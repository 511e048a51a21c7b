//! Pipeline harness.
//!
//! Wires Capture → Inference → Tracker → Encoder together and sequences
//! their workers: downstream stages come up before anything produces into
//! them, and teardown runs upstream-first so the tail can drain.

use std::sync::Arc;

use kftrack::TrackerConfig;

use crate::backend::Backend;
use crate::capture::{Capture, FrameSource};
use crate::encoder::{Encoder, TrackSink};
use crate::error::{PipelineError, Result};
use crate::inference::Inference;
use crate::labels::LabelTable;
use crate::listener::Listener;
use crate::tracker::Tracker;
use crate::types::{BoxBuf, FrameBuf, TargetClass, TrackBuf};
use crate::worker::{State, Worker, DEFAULT_YIELD_US};

/// How long the harness waits for each worker to reach a requested state.
const SEQUENCE_WAIT_US: u64 = 5_000_000;

/// Everything the harness needs to assemble the stages.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Capture geometry.
    pub width: u32,
    pub height: u32,
    /// Capture rate; 0 means one frame per tick.
    pub fps: u32,
    /// Minimum detection confidence.
    pub threshold: f32,
    /// Most detections kept per frame.
    pub max_results: usize,
    /// Classes the tracker follows.
    pub target_classes: Vec<TargetClass>,
    /// Tracker tuning.
    pub tracker: TrackerConfig,
    /// Worker scheduling priority.
    pub priority: u32,
    /// Inter-hook yield applied to every worker, in µs.
    pub yield_us: u32,
    /// Suppress the per-stage statistics tables.
    pub quiet: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            fps: 20,
            threshold: 0.5,
            max_results: 10,
            target_classes: TargetClass::tracked().to_vec(),
            tracker: TrackerConfig::default(),
            priority: 50,
            yield_us: DEFAULT_YIELD_US,
            quiet: false,
        }
    }
}

impl PipelineConfig {
    fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(PipelineError::config(format!(
                "invalid capture geometry {}x{}",
                self.width, self.height
            )));
        }
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(PipelineError::config(format!(
                "threshold {} outside 0..=1",
                self.threshold
            )));
        }
        if self.target_classes.is_empty() {
            return Err(PipelineError::config("no target classes to track"));
        }
        Ok(())
    }
}

/// Owns the four stage workers for one capture-to-encoder flow.
pub struct Pipeline {
    capture: Worker,
    inference: Worker,
    tracker: Worker,
    encoder: Worker,
    priority: u32,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("states", &self.states())
            .field("priority", &self.priority)
            .finish()
    }
}

impl Pipeline {
    /// Assembles the stages. Nothing runs until [`Pipeline::start`].
    pub fn build(
        config: PipelineConfig,
        source: Box<dyn FrameSource>,
        backend: Box<dyn Backend>,
        labels: LabelTable,
        sink: Box<dyn TrackSink>,
    ) -> Result<Self> {
        config.validate()?;

        let encoder_stage = Arc::new(Encoder::new(sink, config.quiet));
        let tracker_stage = Arc::new(Tracker::new(
            config.tracker.clone(),
            config.target_classes.clone(),
            Arc::clone(&encoder_stage) as Arc<dyn Listener<Arc<Vec<TrackBuf>>> + Send + Sync>,
            config.quiet,
        ));
        let inference_stage = Arc::new(Inference::new(
            backend,
            labels,
            config.threshold,
            config.max_results,
            Arc::clone(&tracker_stage) as Arc<dyn Listener<Arc<Vec<BoxBuf>>> + Send + Sync>,
            config.quiet,
        ));
        let capture_stage = Arc::new(Capture::new(
            source,
            config.fps,
            Arc::clone(&inference_stage) as Arc<dyn Listener<Arc<FrameBuf>> + Send + Sync>,
            config.quiet,
        ));

        let mut pipeline = Self {
            capture: Worker::new(capture_stage),
            inference: Worker::new(inference_stage),
            tracker: Worker::new(tracker_stage),
            encoder: Worker::new(encoder_stage),
            priority: config.priority,
        };
        for worker in pipeline.downstream_first() {
            worker.set_sleep_time(config.yield_us);
        }
        Ok(pipeline)
    }

    fn downstream_first(&mut self) -> [&mut Worker; 4] {
        [
            &mut self.encoder,
            &mut self.tracker,
            &mut self.inference,
            &mut self.capture,
        ]
    }

    /// Brings every stage to `Running`, downstream first.
    pub fn start(&mut self) -> Result<()> {
        if let Err(err) = self.try_start() {
            log::error!("pipeline start failed: {err}");
            self.abort();
            return Err(err);
        }
        log::info!("pipeline running");
        Ok(())
    }

    fn try_start(&mut self) -> Result<()> {
        let priority = self.priority;
        let names = ["encoder", "tracker", "inference", "capture"];
        for (worker, name) in self.downstream_first().into_iter().zip(names) {
            worker.start(name, priority)?;
            worker.wait(State::Paused, SEQUENCE_WAIT_US)?;
        }
        for worker in self.downstream_first() {
            worker.run()?;
            worker.wait(State::Running, SEQUENCE_WAIT_US)?;
        }
        Ok(())
    }

    /// Stops every stage, upstream first so in-flight batches drain.
    pub fn stop(&mut self) -> Result<()> {
        for worker in [
            &mut self.capture,
            &mut self.inference,
            &mut self.tracker,
            &mut self.encoder,
        ] {
            worker.stop()?;
        }
        log::info!("pipeline stopped");
        Ok(())
    }

    /// Best-effort teardown of whatever got started.
    fn abort(&mut self) {
        for worker in self.downstream_first() {
            match worker.state() {
                State::Stopped => continue,
                State::Paused | State::Running => {
                    let _ = worker.stop();
                }
                // a transition state settles within a few yields
                _ => {
                    let _ = worker.wait(State::Paused, 100_000);
                    if let Err(err) = worker.stop() {
                        log::warn!("abort: {err}");
                    }
                }
            }
        }
    }

    /// Observed state of each stage, capture first.
    pub fn states(&self) -> [State; 4] {
        [
            self.capture.state(),
            self.inference.state(),
            self.tracker.state(),
            self.encoder.state(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{CannedBackend, RawDetection};
    use crate::capture::TestPattern;
    use crate::encoder::NullSink;
    use crate::types::TrackBuf;
    use std::sync::Mutex;
    use std::thread;
    use std::time::Duration;

    struct MemorySink {
        batches: Arc<Mutex<Vec<Vec<TrackBuf>>>>,
    }

    impl TrackSink for MemorySink {
        fn consume(&mut self, tracks: &[TrackBuf]) -> Result<()> {
            self.batches.lock().unwrap().push(tracks.to_vec());
            Ok(())
        }
    }

    fn test_config() -> PipelineConfig {
        PipelineConfig {
            width: 64,
            height: 64,
            fps: 100,
            priority: 0,
            quiet: true,
            ..PipelineConfig::default()
        }
    }

    #[test]
    fn end_to_end_flow_produces_tracked_boxes() {
        let batches = Arc::new(Mutex::new(Vec::new()));
        let backend = CannedBackend::new(
            (64, 64),
            vec![RawDetection {
                class_id: 0,
                score: 0.9,
                x: 10.0,
                y: 10.0,
                w: 20.0,
                h: 20.0,
            }],
        );

        let mut pipeline = Pipeline::build(
            test_config(),
            Box::new(TestPattern::new(64, 64)),
            Box::new(backend),
            LabelTable::parse("person\n"),
            Box::new(MemorySink {
                batches: Arc::clone(&batches),
            }),
        )
        .unwrap();

        pipeline.start().unwrap();
        assert_eq!(pipeline.states(), [State::Running; 4]);

        thread::sleep(Duration::from_millis(300));
        pipeline.stop().unwrap();
        assert_eq!(pipeline.states(), [State::Stopped; 4]);

        let batches = batches.lock().unwrap();
        assert!(!batches.is_empty(), "encoder saw at least one batch");
        let tracked: Vec<&TrackBuf> = batches.iter().flatten().collect();
        assert!(!tracked.is_empty(), "a track was published");
        for track in tracked {
            assert_eq!(track.class, TargetClass::Person);
            assert_eq!(track.id, 1, "one stationary target, one track id");
        }
    }

    #[test]
    fn invalid_geometry_is_rejected_before_threads_exist() {
        let config = PipelineConfig {
            width: 0,
            ..test_config()
        };
        let err = Pipeline::build(
            config,
            Box::new(TestPattern::new(64, 64)),
            Box::new(CannedBackend::new((64, 64), Vec::new())),
            LabelTable::parse("person\n"),
            Box::new(NullSink),
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::ConfigError(_)));
    }

    #[test]
    fn restart_after_stop() {
        let mut pipeline = Pipeline::build(
            test_config(),
            Box::new(TestPattern::new(64, 64)),
            Box::new(CannedBackend::new((64, 64), Vec::new())),
            LabelTable::parse("person\n"),
            Box::new(NullSink),
        )
        .unwrap();

        pipeline.start().unwrap();
        pipeline.stop().unwrap();
        pipeline.start().unwrap();
        pipeline.stop().unwrap();
        assert_eq!(pipeline.states(), [State::Stopped; 4]);
    }
}
