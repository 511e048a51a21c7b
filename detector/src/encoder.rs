//! Downstream hand-off stage.
//!
//! How a bitstream gets produced is not this crate's business; the stage
//! drains track batches from its inbox and gives them to a [`TrackSink`].

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::Result;
use crate::listener::{Listener, Mailbox};
use crate::stopwatch::Stopwatch;
use crate::types::TrackBuf;
use crate::worker::Stage;

/// Consumer of published track batches.
pub trait TrackSink: Send {
    fn consume(&mut self, tracks: &[TrackBuf]) -> Result<()>;
}

/// Writes one JSON array per batch, newline separated. This is the shape a
/// downstream overlay encoder reads.
pub struct JsonLinesSink<W: Write + Send> {
    out: W,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }
}

impl<W: Write + Send> TrackSink for JsonLinesSink<W> {
    fn consume(&mut self, tracks: &[TrackBuf]) -> Result<()> {
        serde_json::to_writer(&mut self.out, tracks)?;
        self.out.write_all(b"\n")?;
        Ok(())
    }
}

/// Swallows batches; for deployments with no track output configured.
pub struct NullSink;

impl TrackSink for NullSink {
    fn consume(&mut self, _tracks: &[TrackBuf]) -> Result<()> {
        Ok(())
    }
}

struct EncoderInner {
    sink: Box<dyn TrackSink>,
    batches: u64,
    tracks_seen: u64,
    differ_consume: Stopwatch,
    differ_tot: Stopwatch,
}

/// Terminal worker stage of the pipeline.
pub struct Encoder {
    mailbox: Mailbox<Arc<Vec<TrackBuf>>>,
    on: AtomicBool,
    inner: Mutex<EncoderInner>,
    quiet: bool,
}

impl Encoder {
    pub fn new(sink: Box<dyn TrackSink>, quiet: bool) -> Self {
        Self {
            mailbox: Mailbox::new(),
            on: AtomicBool::new(false),
            inner: Mutex::new(EncoderInner {
                sink,
                batches: 0,
                tracks_seen: 0,
                differ_consume: Stopwatch::new(),
                differ_tot: Stopwatch::new(),
            }),
            quiet,
        }
    }
}

impl Listener<Arc<Vec<TrackBuf>>> for Encoder {
    fn add_message(&self, tracks: Arc<Vec<TrackBuf>>) -> bool {
        let posted = self.mailbox.post(tracks);
        if !posted {
            log::debug!("encoder inbox busy, track batch dropped");
        }
        posted
    }
}

impl Stage for Encoder {
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
        let Some(tracks) = self.mailbox.take() else {
            return true;
        };

        let mut inner = self.inner.lock().unwrap();
        inner.batches += 1;
        inner.tracks_seen += tracks.len() as u64;

        inner.differ_consume.begin();
        let outcome = inner.sink.consume(&tracks);
        inner.differ_consume.end();

        if let Err(err) = outcome {
            log::error!("track sink failed: {err}");
            return false;
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
                eprintln!("\nEncoder Results...");
                eprintln!("       batch consume time (us): {}", inner.differ_consume);
                eprintln!("                 total batches: {}", inner.batches);
                eprintln!("                  total tracks: {}", inner.tracks_seen);
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
    use crate::types::TargetClass;

    #[test]
    fn json_lines_shape() {
        let mut buf = Vec::new();
        {
            let mut sink = JsonLinesSink::new(&mut buf);
            sink.consume(&[TrackBuf {
                class: TargetClass::Person,
                id: 3,
                x: 10,
                y: 20,
                w: 30,
                h: 40,
            }])
            .unwrap();
            sink.consume(&[]).unwrap();
        }

        let text = String::from_utf8(buf).unwrap();
        let mut lines = text.lines();
        let first: Vec<TrackBuf> = serde_json::from_str(lines.next().unwrap()).unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].id, 3);
        assert_eq!(lines.next(), Some("[]"));
        assert_eq!(lines.next(), None);
    }

    #[test]
    fn encoder_drains_latest_batch() {
        let encoder = Encoder::new(Box::new(NullSink), true);
        assert!(encoder.waiting_to_run());

        let old = Arc::new(vec![]);
        let new = Arc::new(vec![TrackBuf {
            class: TargetClass::Pet,
            id: 1,
            x: 0,
            y: 0,
            w: 5,
            h: 5,
        }]);
        assert!(encoder.add_message(old));
        assert!(encoder.add_message(new));

        assert!(encoder.running());
        let inner = encoder.inner.lock().unwrap();
        assert_eq!(inner.batches, 1, "older batch was overwritten");
        assert_eq!(inner.tracks_seen, 1);
    }
}
