//! Worker lifecycle state machine shared by every pipeline stage.
//!
//! A worker owns one OS thread and walks it through six externally
//! observable states:
//!
//! ```text
//!             start()                      run()
//!   Stopped ──────────> WaitingToPause ─> Paused ──> WaitingToRun ─> Running
//!      ^                      ^                                         │
//!      │                      └──────────────── pause() ────────────────┘
//!      │                stop()
//!      └─── WaitingToStop <──── Paused | Running
//! ```
//!
//! The `WaitingTo…` states are single-shot: only the worker thread leaves
//! them, after running the matching [`Stage`] hook. `waiting_to_halt` runs
//! once on the way into `Paused` (including the implicit pause right after
//! `start`) and once on the way into `Stopped`.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crate::error::{PipelineError, Result};

/// Default inter-hook yield in microseconds.
pub const DEFAULT_YIELD_US: u32 = 1000;

/// OS thread names are truncated to this many bytes.
const MAX_NAME_LEN: usize = 15;

/// Externally observable worker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    WaitingToStop,
    Stopped,
    WaitingToPause,
    Paused,
    WaitingToRun,
    Running,
}

/// Hooks a pipeline stage plugs into its worker thread.
///
/// All four run on the worker's own thread, never concurrently. A hook
/// returning `false` is logged and the loop continues; the only fatal
/// shutdown is an external [`Worker::stop`].
pub trait Stage: Send + Sync {
    /// One-shot setup before entering `Running`.
    fn waiting_to_run(&self) -> bool;
    /// One tick of steady-state work; called repeatedly while `Running`.
    fn running(&self) -> bool;
    /// One tick while `Paused`.
    fn paused(&self) -> bool;
    /// One-shot teardown before entering `Paused` or `Stopped`.
    fn waiting_to_halt(&self) -> bool;
}

struct Control {
    state: Mutex<State>,
    changed: Condvar,
    yield_us: AtomicU32,
}

impl Control {
    fn state(&self) -> State {
        *self.state.lock().unwrap()
    }

    fn set_state(&self, state: State) {
        *self.state.lock().unwrap() = state;
        self.changed.notify_all();
    }

    /// Completes a single-shot transition, unless the controller moved the
    /// state underneath us (forced teardown) while the hook ran.
    fn finish_transition(&self, from: State, to: State) {
        let mut state = self.state.lock().unwrap();
        if *state == from {
            *state = to;
        }
        self.changed.notify_all();
    }
}

/// Drives one stage on one thread through the lifecycle states.
pub struct Worker {
    stage: Arc<dyn Stage>,
    control: Arc<Control>,
    name: String,
    priority: u32,
    handle: Option<thread::JoinHandle<()>>,
}

impl Worker {
    pub fn new(stage: Arc<dyn Stage>) -> Self {
        Self {
            stage,
            control: Arc::new(Control {
                state: Mutex::new(State::Stopped),
                changed: Condvar::new(),
                yield_us: AtomicU32::new(DEFAULT_YIELD_US),
            }),
            name: String::new(),
            priority: 0,
            handle: None,
        }
    }

    /// Creates the worker thread. Only valid from `Stopped`; the observable
    /// state settles in `Paused` once the thread has run `waiting_to_halt`.
    ///
    /// The requested scheduling priority is applied where the platform
    /// allows realtime scheduling; otherwise it is recorded and a warning
    /// logged.
    pub fn start(&mut self, name: &str, priority: u32) -> Result<()> {
        {
            let mut state = self.control.state.lock().unwrap();
            if *state != State::Stopped {
                return Err(PipelineError::InvalidTransition {
                    op: "start",
                    state: *state,
                });
            }
            *state = State::WaitingToPause;
        }

        self.name = truncate_name(name);
        self.priority = priority;

        let stage = Arc::clone(&self.stage);
        let control = Arc::clone(&self.control);
        let thread_name = self.name.clone();
        let spawned = thread::Builder::new().name(self.name.clone()).spawn(move || {
            apply_priority(&thread_name, priority);
            worker_loop(&thread_name, stage, control);
        });

        match spawned {
            Ok(handle) => {
                self.handle = Some(handle);
                Ok(())
            }
            Err(err) => {
                self.control.set_state(State::Stopped);
                Err(err.into())
            }
        }
    }

    /// Moves a `Paused` worker toward `Running` via `WaitingToRun`.
    pub fn run(&self) -> Result<()> {
        self.request("run", State::Paused, State::WaitingToRun)
    }

    /// Moves a `Running` worker toward `Paused` via `WaitingToPause`.
    pub fn pause(&self) -> Result<()> {
        self.request("pause", State::Running, State::WaitingToPause)
    }

    fn request(&self, op: &'static str, from: State, to: State) -> Result<()> {
        let mut state = self.control.state.lock().unwrap();
        if *state != from {
            return Err(PipelineError::InvalidTransition { op, state: *state });
        }
        *state = to;
        self.control.changed.notify_all();
        Ok(())
    }

    /// Tears the thread down from `Paused` or `Running`; returns once it is
    /// joined and the observable state is `Stopped`.
    pub fn stop(&mut self) -> Result<()> {
        {
            let mut state = self.control.state.lock().unwrap();
            match *state {
                State::Paused | State::Running => {
                    *state = State::WaitingToStop;
                    self.control.changed.notify_all();
                }
                other => {
                    return Err(PipelineError::InvalidTransition {
                        op: "stop",
                        state: other,
                    })
                }
            }
        }

        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("{}: worker thread panicked", self.name);
                self.control.set_state(State::Stopped);
            }
        }
        Ok(())
    }

    /// Blocks up to `usec` microseconds until the observed state is `state`.
    pub fn wait(&self, state: State, usec: u64) -> Result<()> {
        let deadline = Instant::now() + Duration::from_micros(usec);
        let mut current = self.control.state.lock().unwrap();
        while *current != state {
            let now = Instant::now();
            if now >= deadline {
                return Err(PipelineError::WaitTimeout { state, usec });
            }
            let (guard, timeout) = self
                .control
                .changed
                .wait_timeout(current, deadline - now)
                .unwrap();
            current = guard;
            if timeout.timed_out() && *current != state {
                return Err(PipelineError::WaitTimeout { state, usec });
            }
        }
        Ok(())
    }

    pub fn state(&self) -> State {
        self.control.state()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn priority(&self) -> u32 {
        self.priority
    }

    /// Inter-hook yield in microseconds.
    pub fn sleep_time(&self) -> u32 {
        self.control.yield_us.load(Ordering::Relaxed)
    }

    /// Adjusts the inter-hook yield at runtime.
    pub fn set_sleep_time(&self, usec: u32) {
        self.control.yield_us.store(usec, Ordering::Relaxed);
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        // best-effort teardown when the owner never called stop()
        if let Some(handle) = self.handle.take() {
            self.control.set_state(State::WaitingToStop);
            let _ = handle.join();
        }
    }
}

fn truncate_name(name: &str) -> String {
    let mut truncated = String::with_capacity(MAX_NAME_LEN);
    for ch in name.chars() {
        if truncated.len() + ch.len_utf8() > MAX_NAME_LEN {
            break;
        }
        truncated.push(ch);
    }
    truncated
}

fn worker_loop(name: &str, stage: Arc<dyn Stage>, control: Arc<Control>) {
    log::debug!("{name}: worker thread up");
    loop {
        match control.state() {
            State::WaitingToRun => {
                if !stage.waiting_to_run() {
                    log::warn!("{name}: setup hook failed");
                }
                control.finish_transition(State::WaitingToRun, State::Running);
            }
            State::Running => {
                if !stage.running() {
                    log::warn!("{name}: running hook failed, continuing");
                }
            }
            State::WaitingToPause => {
                if !stage.waiting_to_halt() {
                    log::warn!("{name}: teardown hook failed");
                }
                control.finish_transition(State::WaitingToPause, State::Paused);
            }
            State::Paused => {
                if !stage.paused() {
                    log::warn!("{name}: paused hook failed, continuing");
                }
            }
            State::WaitingToStop => {
                if !stage.waiting_to_halt() {
                    log::warn!("{name}: teardown hook failed");
                }
                control.set_state(State::Stopped);
                break;
            }
            State::Stopped => break,
        }
        let yield_us = control.yield_us.load(Ordering::Relaxed);
        thread::sleep(Duration::from_micros(u64::from(yield_us)));
    }
    log::debug!("{name}: worker thread down");
}

#[cfg(unix)]
fn apply_priority(name: &str, priority: u32) {
    if priority == 0 {
        return;
    }
    let param = libc::sched_param {
        sched_priority: priority.min(99) as libc::c_int,
    };
    // SAFETY: pthread_self() is the calling thread; param outlives the call.
    let rc = unsafe { libc::pthread_setschedparam(libc::pthread_self(), libc::SCHED_RR, &param) };
    if rc != 0 {
        log::warn!(
            "{name}: realtime priority {priority} unavailable (errno {rc}), keeping default scheduling"
        );
    }
}

#[cfg(not(unix))]
fn apply_priority(name: &str, priority: u32) {
    if priority != 0 {
        log::warn!("{name}: thread priority {priority} recorded but not applied on this platform");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    const WAIT_US: u64 = 2_000_000;

    #[derive(Default)]
    struct CountingStage {
        setups: AtomicU32,
        ticks: AtomicU32,
        idles: AtomicU32,
        halts: AtomicU32,
    }

    impl Stage for CountingStage {
        fn waiting_to_run(&self) -> bool {
            self.setups.fetch_add(1, Ordering::SeqCst);
            true
        }

        fn running(&self) -> bool {
            self.ticks.fetch_add(1, Ordering::SeqCst);
            true
        }

        fn paused(&self) -> bool {
            self.idles.fetch_add(1, Ordering::SeqCst);
            true
        }

        fn waiting_to_halt(&self) -> bool {
            self.halts.fetch_add(1, Ordering::SeqCst);
            true
        }
    }

    #[test]
    fn full_lifecycle_invokes_each_hook_per_contract() {
        let stage = Arc::new(CountingStage::default());
        let mut worker = Worker::new(stage.clone());

        worker.start("t", 0).unwrap();
        worker.wait(State::Paused, WAIT_US).unwrap();

        worker.run().unwrap();
        worker.wait(State::Running, WAIT_US).unwrap();
        thread::sleep(Duration::from_millis(20));

        worker.pause().unwrap();
        worker.wait(State::Paused, WAIT_US).unwrap();

        worker.stop().unwrap();
        worker.wait(State::Stopped, WAIT_US).unwrap();

        assert_eq!(stage.setups.load(Ordering::SeqCst), 1);
        assert!(stage.ticks.load(Ordering::SeqCst) >= 1);
        // once for the implicit pause after start, once for pause, once for stop
        assert_eq!(stage.halts.load(Ordering::SeqCst), 3);
        assert_eq!(worker.state(), State::Stopped);
    }

    #[test]
    fn restart_cycle_leaves_no_thread_behind() {
        let stage = Arc::new(CountingStage::default());
        let mut worker = Worker::new(stage.clone());

        for _ in 0..2 {
            worker.start("cycler", 0).unwrap();
            worker.wait(State::Paused, WAIT_US).unwrap();
            worker.stop().unwrap();
            assert_eq!(worker.state(), State::Stopped);
        }

        // one halt per implicit pause plus one per stop, never a setup
        assert_eq!(stage.halts.load(Ordering::SeqCst), 4);
        assert_eq!(stage.setups.load(Ordering::SeqCst), 0);
        assert_eq!(stage.ticks.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn invalid_transitions_fail_without_side_effects() {
        let stage = Arc::new(CountingStage::default());
        let mut worker = Worker::new(stage.clone());

        assert!(worker.run().is_err());
        assert!(worker.pause().is_err());
        assert!(worker.stop().is_err());
        assert_eq!(worker.state(), State::Stopped);

        worker.start("t", 0).unwrap();
        worker.wait(State::Paused, WAIT_US).unwrap();

        assert!(worker.start("t", 0).is_err(), "start while started");
        assert!(worker.pause().is_err(), "pause while already paused");

        worker.run().unwrap();
        worker.wait(State::Running, WAIT_US).unwrap();
        assert!(worker.run().is_err(), "run while already running");

        worker.stop().unwrap();
        assert_eq!(worker.state(), State::Stopped);
        assert_eq!(stage.halts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn wait_times_out_on_wrong_state() {
        let stage = Arc::new(CountingStage::default());
        let mut worker = Worker::new(stage);

        worker.start("t", 0).unwrap();
        worker.wait(State::Paused, WAIT_US).unwrap();

        let err = worker.wait(State::Running, 10_000).unwrap_err();
        assert!(matches!(err, PipelineError::WaitTimeout { .. }));

        worker.stop().unwrap();
    }

    #[test]
    fn name_is_truncated_and_observable() {
        let stage = Arc::new(CountingStage::default());
        let mut worker = Worker::new(stage);

        worker.start("a-very-long-worker-name", 0).unwrap();
        assert_eq!(worker.name(), "a-very-long-wor");
        assert_eq!(worker.name().len(), 15);
        assert_eq!(worker.priority(), 0);
        assert_eq!(worker.sleep_time(), DEFAULT_YIELD_US);

        worker.set_sleep_time(250);
        assert_eq!(worker.sleep_time(), 250);

        worker.wait(State::Paused, WAIT_US).unwrap();
        worker.stop().unwrap();
    }
}
