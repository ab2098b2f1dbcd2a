//! TCP Connection State
//!
//! This module provides the complete socket state by aggregating the
//! disjoint state components from the components module.

use std::fmt;
use std::net::SocketAddrV4;
use std::sync::Arc;

pub use crate::components::{
    ConnectionManagementState, FlowControlState, QueueKind, ReliableOrderedDeliveryState,
};
use crate::tcp_env::RecvBuffer;
use crate::tcp_types::{FourTuple, SockId};
use crate::tcp_wait::SockEvents;

/// TCP State Machine States
#[repr(u32)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TcpState {
    Closed = 0,
    Listen = 1,
    SynSent = 2,
    SynRecv = 3,
    Established = 4,
    FinWait1 = 5,
    FinWait2 = 6,
    CloseWait = 7,
    Closing = 8,
    LastAck = 9,
    TimeWait = 10,
}

impl TcpState {
    /// States served by a dedicated handshake handler rather than the
    /// post-handshake processor.
    pub fn is_pre_handshake(&self) -> bool {
        *self <= TcpState::SynRecv
    }

    /// The peer's FIN has been consumed; no more data will arrive.
    pub fn peer_closed(&self) -> bool {
        matches!(
            self,
            TcpState::CloseWait | TcpState::LastAck | TcpState::Closing | TcpState::TimeWait
        )
    }

    /// States in which the application may still queue outbound data.
    pub fn can_send(&self) -> bool {
        matches!(self, TcpState::Established | TcpState::CloseWait)
    }
}

impl fmt::Display for TcpState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TcpState::Closed => "CLOSED",
            TcpState::Listen => "LISTEN",
            TcpState::SynSent => "SYN_SENT",
            TcpState::SynRecv => "SYN_RECV",
            TcpState::Established => "ESTABLISHED",
            TcpState::FinWait1 => "FIN_WAIT_1",
            TcpState::FinWait2 => "FIN_WAIT_2",
            TcpState::CloseWait => "CLOSE_WAIT",
            TcpState::Closing => "CLOSING",
            TcpState::LastAck => "LAST_ACK",
            TcpState::TimeWait => "TIME_WAIT",
        };
        f.write_str(name)
    }
}

/// One endpoint of a TCP connection, or a listening endpoint
///
/// Aggregates the state components, the receive buffer and the wait
/// conditions the application side blocks on.
pub struct TcpSock {
    pub id: SockId,
    pub conn_mgmt: ConnectionManagementState,
    pub rod: ReliableOrderedDeliveryState,
    pub flow_ctrl: FlowControlState,
    pub rcv_buf: Box<dyn RecvBuffer>,
    pub events: Arc<SockEvents>,
}

impl TcpSock {
    pub fn new(
        id: SockId,
        local: SocketAddrV4,
        remote: SocketAddrV4,
        iss: u32,
        rcv_wnd: u16,
        backlog: usize,
        rcv_buf: Box<dyn RecvBuffer>,
    ) -> Self {
        Self {
            id,
            conn_mgmt: ConnectionManagementState::new(local, remote, backlog),
            rod: ReliableOrderedDeliveryState::new(iss),
            flow_ctrl: FlowControlState::new(rcv_wnd),
            rcv_buf,
            events: Arc::new(SockEvents::new()),
        }
    }

    pub fn state(&self) -> TcpState {
        self.conn_mgmt.state
    }

    pub fn parent(&self) -> Option<SockId> {
        self.conn_mgmt.parent
    }

    pub fn four_tuple(&self) -> FourTuple {
        self.conn_mgmt.four_tuple()
    }
}

impl fmt::Debug for TcpSock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TcpSock")
            .field("id", &self.id)
            .field("conn_mgmt", &self.conn_mgmt)
            .field("rod", &self.rod)
            .field("flow_ctrl", &self.flow_ctrl)
            .field("rcv_buf_len", &self.rcv_buf.len())
            .finish()
    }
}
