//! Duration statistics for pipeline phases.

use std::fmt;
use std::time::Instant;

/// Accumulates begin/end duration samples in microseconds and keeps
/// high/average/low/count over them. Cheap enough to leave in the hot path;
/// the tables it feeds are only printed at teardown.
#[derive(Debug, Clone, Default)]
pub struct Stopwatch {
    started: Option<Instant>,
    pub high: u32,
    pub avg: u32,
    pub low: u32,
    pub cnt: u32,
    total: u64,
}

impl Stopwatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts one sample. A second `begin` before `end` restarts it.
    pub fn begin(&mut self) {
        self.started = Some(Instant::now());
    }

    /// Closes the open sample; without a matching `begin` this is a no-op.
    pub fn end(&mut self) {
        let Some(started) = self.started.take() else {
            return;
        };
        let us = started.elapsed().as_micros().min(u128::from(u32::MAX)) as u32;
        self.record(us);
    }

    fn record(&mut self, us: u32) {
        self.cnt += 1;
        self.total += u64::from(us);
        self.high = self.high.max(us);
        self.low = if self.cnt == 1 { us } else { self.low.min(us) };
        self.avg = (self.total / u64::from(self.cnt)) as u32;
    }
}

impl fmt::Display for Stopwatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "high:{} avg:{} low:{} cnt:{}",
            self.high, self.avg, self.low, self.cnt
        )
    }
}
