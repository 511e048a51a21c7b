//! One-slot message hand-off between pipeline stages.
//!
//! The bus favours freshness over completeness: a backlog of stale frames is
//! worse than a dropped frame, so the inbox holds at most one message and new
//! arrivals replace unread ones. Producers that cannot take the slot within
//! the hand-off timeout drop the message instead of queueing.

use std::sync::{Mutex, TryLockError};
use std::thread;
use std::time::{Duration, Instant};

/// How long a producer waits on a busy inbox before dropping, in µs.
pub const HANDOFF_TIMEOUT_US: u64 = 1000;

/// A stage that consumes messages of type `T`.
pub trait Listener<T> {
    /// Offers a message. `false` means the inbox stayed busy for the whole
    /// hand-off timeout and the message was dropped, not delayed.
    fn add_message(&self, msg: T) -> bool;
}

/// Single-slot overwrite inbox backing a [`Listener`] implementation.
#[derive(Debug, Default)]
pub struct Mailbox<T> {
    slot: Mutex<Option<T>>,
}

impl<T> Mailbox<T> {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }

    /// Bounded-wait post. Overwrites any unread message; returns `false`
    /// without buffering when the slot lock stays contended past
    /// [`HANDOFF_TIMEOUT_US`].
    pub fn post(&self, msg: T) -> bool {
        let deadline = Instant::now() + Duration::from_micros(HANDOFF_TIMEOUT_US);
        loop {
            match self.slot.try_lock() {
                Ok(mut slot) => {
                    *slot = Some(msg);
                    return true;
                }
                Err(TryLockError::WouldBlock) => {
                    if Instant::now() >= deadline {
                        return false;
                    }
                    thread::yield_now();
                }
                Err(TryLockError::Poisoned(err)) => {
                    *err.into_inner() = Some(msg);
                    return true;
                }
            }
        }
    }

    /// Moves the pending message out, if any. The consumer calls this at the
    /// top of its tick; the lock is held only for the move.
    pub fn take(&self) -> Option<T> {
        match self.slot.lock() {
            Ok(mut slot) => slot.take(),
            Err(err) => err.into_inner().take(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn newest_message_wins() {
        let mailbox = Mailbox::new();
        assert!(mailbox.post("a"));
        assert!(mailbox.post("b"));

        assert_eq!(mailbox.take(), Some("b"));
        assert_eq!(mailbox.take(), None);
    }

    #[test]
    fn post_gives_up_on_contended_slot() {
        let mailbox = Mailbox::new();
        let guard = mailbox.slot.lock().unwrap();

        let begun = Instant::now();
        assert!(!mailbox.post(1u32));
        let waited = begun.elapsed();
        drop(guard);

        assert!(waited >= Duration::from_micros(HANDOFF_TIMEOUT_US));
        assert!(waited < Duration::from_millis(100), "gave up promptly");
        assert_eq!(mailbox.take(), None, "nothing was buffered");
    }

    #[test]
    fn fast_producer_slow_consumer_drops_not_queues() {
        let mailbox = Arc::new(Mailbox::new());
        let done = Arc::new(AtomicBool::new(false));

        let producer = {
            let mailbox = Arc::clone(&mailbox);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                let mut sent = 0u32;
                let mut dropped = 0u32;
                let mut seq = 0u32;
                while !done.load(Ordering::Relaxed) {
                    seq += 1;
                    if mailbox.post(seq) {
                        sent += 1;
                    } else {
                        dropped += 1;
                    }
                }
                (sent, dropped)
            })
        };

        // slow consumer: hold the slot for a while, then read one message
        let mut received = 0u32;
        for _ in 0..10 {
            let guard = mailbox.slot.lock().unwrap();
            thread::sleep(Duration::from_millis(5));
            drop(guard);
            received += u32::from(mailbox.take().is_some());
        }
        done.store(true, Ordering::Relaxed);
        let (sent, dropped) = producer.join().unwrap();

        assert!(sent >= received, "consumer never sees more than was sent");
        assert!(received <= 10, "at most one message per consumer tick");
        assert!(dropped > 0, "contention must surface as drops");
    }
}
