//! Connection Management Component
//!
//! This component owns the TCP state, the connection identifier and the
//! listen/accept bookkeeping linking a listening socket to its children.

use std::collections::VecDeque;
use std::net::SocketAddrV4;

use crate::state::TcpState;
use crate::tcp_types::{FourTuple, SockId};

/// Which of its parent's queues a child currently sits in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueKind {
    /// Handshake in progress (SYN_RECV)
    Pending,
    /// Handshake complete, waiting for `accept`
    Ready,
}

/// Connection Management State
///
/// Addressing is written once when the socket is allocated and never
/// touched again by the input path.
#[derive(Debug, Clone)]
pub struct ConnectionManagementState {
    /* Connection Identifier (Tuple) */
    pub local: SocketAddrV4,
    pub remote: SocketAddrV4,

    /* Lifecycle State */
    pub state: TcpState,

    /* Listening socket that spawned us; back-reference only */
    pub parent: Option<SockId>,
    pub queued: Option<QueueKind>,

    /* Listening side */
    pub backlog: usize,
    pub listen_queue: VecDeque<SockId>,
    pub accept_queue: VecDeque<SockId>,
}

impl ConnectionManagementState {
    pub fn new(local: SocketAddrV4, remote: SocketAddrV4, backlog: usize) -> Self {
        Self {
            local,
            remote,
            state: TcpState::Closed,
            parent: None,
            queued: None,
            backlog,
            listen_queue: VecDeque::new(),
            accept_queue: VecDeque::new(),
        }
    }

    pub fn four_tuple(&self) -> FourTuple {
        FourTuple::new(self.local, self.remote)
    }

    /// Children counted against the backlog: pending plus ready
    pub fn queue_depth(&self) -> usize {
        self.listen_queue.len() + self.accept_queue.len()
    }

    /// Overwrite the state, returning the previous one
    pub fn set_state(&mut self, state: TcpState) -> TcpState {
        std::mem::replace(&mut self.state, state)
    }
}
