//! Real-time object detection and tracking pipeline.
//!
//! Four stages, each on its own worker thread, connected by one-slot
//! overwrite inboxes:
//!
//! ```text
//! Capture ──FrameBuf──> Inference ──Vec<BoxBuf>──> Tracker ──Vec<TrackBuf>──> Encoder
//! ```
//!
//! Every stage reuses the same [`worker::Worker`] lifecycle state machine
//! and implements [`worker::Stage`] for its hooks plus [`listener::Listener`]
//! for its inbox. The bus drops rather than queues: in a real-time pipeline a
//! backlog of stale frames is worse than a missing one.
//!
//! The tracking math itself lives in the `kftrack` crate; [`tracker::Tracker`]
//! is the worker stage driving it.

pub mod backend;
pub mod capture;
pub mod encoder;
pub mod error;
pub mod inference;
pub mod labels;
pub mod listener;
pub mod pipeline;
pub mod stopwatch;
pub mod tracker;
pub mod types;
pub mod worker;

pub use backend::{Backend, NullBackend, RawDetection};
pub use capture::{FrameSource, TestPattern};
pub use encoder::{JsonLinesSink, NullSink, TrackSink};
pub use error::{PipelineError, Result};
pub use labels::LabelTable;
pub use listener::{Listener, Mailbox};
pub use pipeline::{Pipeline, PipelineConfig};
pub use stopwatch::Stopwatch;
pub use types::{BoxBuf, FrameBuf, TargetClass, TrackBuf};
pub use worker::{Stage, State, Worker};
