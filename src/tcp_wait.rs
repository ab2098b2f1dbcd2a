//! Socket Wait Conditions
//!
//! Each socket carries four conditions, one per blocking application call.
//! Notifications are latched as a per-condition generation counter, so a
//! waiter that samples the generation before checking its predicate never
//! misses a wakeup fired in between. The send window additionally keeps an
//! "open" flag that writers re-check instead of relying on the signal alone.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Condition a blocked application call waits on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WaitEvent {
    /// connect: SYN_SENT -> ESTABLISHED
    Connect = 0,
    /// accept: a child entered the ready queue (fired on the parent)
    Accept = 1,
    /// send: the peer's window went from zero to non-zero
    Send = 2,
    /// receive: payload was delivered to the receive buffer
    Recv = 3,
}

/// Outcome of a blocking wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitResult {
    Notified,
    /// The socket was destroyed while waiting
    Closed,
    TimedOut,
}

#[derive(Debug, Default)]
struct Latch {
    generation: [u64; 4],
    send_open: bool,
    reset: bool,
    closed: bool,
}

#[derive(Debug, Default)]
pub struct SockEvents {
    latch: Mutex<Latch>,
    cond: Condvar,
}

impl SockEvents {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Latch> {
        self.latch.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Release everything blocked on `event`. Safe with no waiters.
    pub fn notify(&self, event: WaitEvent) {
        let mut latch = self.lock();
        latch.generation[event as usize] += 1;
        if event == WaitEvent::Send {
            latch.send_open = true;
        }
        self.cond.notify_all();
    }

    /// Number of notifications fired for `event` so far
    pub fn generation(&self, event: WaitEvent) -> u64 {
        self.lock().generation[event as usize]
    }

    pub fn send_open(&self) -> bool {
        self.lock().send_open
    }

    /// The peer advertised a zero window
    pub fn close_send_window(&self) {
        self.lock().send_open = false;
    }

    /// Record that the connection died because of a reset
    pub fn mark_reset(&self) {
        self.lock().reset = true;
    }

    pub fn is_reset(&self) -> bool {
        self.lock().reset
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Socket destroyed: wake every waiter for good
    pub fn shutdown(&self) {
        let mut latch = self.lock();
        latch.closed = true;
        latch.send_open = false;
        self.cond.notify_all();
    }

    /// Block until `event` fires after generation `seen`, the socket is
    /// destroyed, or `timeout` elapses.
    pub fn wait(&self, event: WaitEvent, seen: u64, timeout: Option<Duration>) -> WaitResult {
        self.wait_while(timeout, |latch| latch.generation[event as usize] == seen)
    }

    /// Block until the send window is latched open.
    pub fn wait_send_open(&self, timeout: Option<Duration>) -> WaitResult {
        self.wait_while(timeout, |latch| !latch.send_open)
    }

    fn wait_while(
        &self,
        timeout: Option<Duration>,
        mut blocked: impl FnMut(&Latch) -> bool,
    ) -> WaitResult {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut latch = self.lock();
        loop {
            if latch.closed {
                return WaitResult::Closed;
            }
            if !blocked(&latch) {
                return WaitResult::Notified;
            }
            latch = match deadline {
                None => self.cond.wait(latch).unwrap_or_else(PoisonError::into_inner),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return WaitResult::TimedOut;
                    }
                    self.cond
                        .wait_timeout(latch, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
            };
        }
    }
}
