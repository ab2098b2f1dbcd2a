//! Collaborator Interfaces
//!
//! The engine reaches the outside world only through these traits: the IP
//! output path that carries replies, the timer wheel that ends TIME_WAIT, and
//! the byte buffer holding received data until the application reads it.

use std::collections::VecDeque;

use crate::tcp_types::{ControlSegment, SockId};

/// Transmission and timers
pub trait TcpEnv {
    /// Hand a reply to the IP layer.
    ///
    /// Failures are logged by the caller and treated as loss on the wire.
    fn transmit(&mut self, seg: &ControlSegment) -> anyhow::Result<()>;

    /// Schedule destruction of a TIME_WAIT socket after the quiet period.
    ///
    /// When the timer fires the host calls
    /// [`TcpStack::time_wait_expired`](crate::tcp_api::TcpStack::time_wait_expired).
    fn arm_time_wait(&mut self, id: SockId);
}

/// Byte accumulator for received payload
pub trait RecvBuffer: Send {
    fn append(&mut self, bytes: &[u8]);

    /// Move up to `buf.len()` bytes out, returning the count.
    fn read(&mut self, buf: &mut [u8]) -> usize;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RecvBuffer for VecDeque<u8> {
    fn append(&mut self, bytes: &[u8]) {
        self.extend(bytes.iter().copied());
    }

    fn read(&mut self, buf: &mut [u8]) -> usize {
        let n = buf.len().min(VecDeque::len(self));
        for (dst, src) in buf.iter_mut().zip(self.drain(..n)) {
            *dst = src;
        }
        n
    }

    fn len(&self) -> usize {
        VecDeque::len(self)
    }
}
