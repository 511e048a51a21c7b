//! Detection backend seam.
//!
//! The pipeline only needs a model input geometry and a per-frame detect
//! call; which runtime actually evaluates the network stays behind this
//! trait.

use std::path::Path;

use crate::error::{PipelineError, Result};

/// One raw model output, in model-input pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawDetection {
    pub class_id: usize,
    pub score: f32,
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

/// Common interface for detection backends.
pub trait Backend: Send {
    fn name(&self) -> &str;

    /// Model input size `(width, height)`; frames are resized to this
    /// before [`Backend::detect`].
    fn input_size(&self) -> (u32, u32);

    /// Runs the model over one RGB24 buffer of `input_size` geometry.
    fn detect(&mut self, rgb: &[u8]) -> Result<Vec<RawDetection>>;
}

/// Backend stand-in: validates the model file at construction and then
/// reports nothing, so the rest of the pipeline can run without a runtime.
pub struct NullBackend {
    input: (u32, u32),
}

impl NullBackend {
    pub fn new(model: &Path, threads: u32) -> Result<Self> {
        if !model.is_file() {
            return Err(PipelineError::config(format!(
                "model not found: {}",
                model.display()
            )));
        }
        log::info!(
            "null backend: {} present, {} thread(s) requested, no runtime loaded",
            model.display(),
            threads
        );
        Ok(Self { input: (300, 300) })
    }
}

impl Backend for NullBackend {
    fn name(&self) -> &str {
        "null"
    }

    fn input_size(&self) -> (u32, u32) {
        self.input
    }

    fn detect(&mut self, _rgb: &[u8]) -> Result<Vec<RawDetection>> {
        Ok(Vec::new())
    }
}

/// Backend that reports the same canned detections for every frame. Used to
/// exercise the downstream stages deterministically.
pub struct CannedBackend {
    input: (u32, u32),
    detections: Vec<RawDetection>,
}

impl CannedBackend {
    pub fn new(input: (u32, u32), detections: Vec<RawDetection>) -> Self {
        Self { input, detections }
    }
}

impl Backend for CannedBackend {
    fn name(&self) -> &str {
        "canned"
    }

    fn input_size(&self) -> (u32, u32) {
        self.input
    }

    fn detect(&mut self, _rgb: &[u8]) -> Result<Vec<RawDetection>> {
        Ok(self.detections.clone())
    }
}
