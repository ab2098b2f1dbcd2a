//! TCP Common Types
//!
//! Shared types used across TCP implementation modules: socket identity,
//! the incoming segment descriptor handed over by the parsing layer, the
//! outgoing control segment handed to the transmission layer, and the
//! tagged result of processing one segment.

use std::fmt;
use std::net::{Ipv4Addr, SocketAddrV4};

use crate::state::TcpState;
use crate::tcp_proto::TcpFlags;

/// Handle of a socket owned by the [`SockTable`](crate::tcp_sock::SockTable).
///
/// Parent links and queue entries hold these, never the socket itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SockId(pub u32);

impl fmt::Display for SockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sock {}", self.0)
    }
}

/// Connection identifier, seen from the local end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FourTuple {
    pub local: SocketAddrV4,
    pub remote: SocketAddrV4,
}

impl FourTuple {
    pub fn new(local: SocketAddrV4, remote: SocketAddrV4) -> Self {
        Self { local, remote }
    }
}

impl fmt::Display for FourTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <-> {}", self.local, self.remote)
    }
}

/// Unspecified endpoint, used as the remote end of listening sockets.
pub const UNSPECIFIED: SocketAddrV4 = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0);

/// Parsed TCP segment information
///
/// Built by the parsing layer and borrowed by the input path for the
/// duration of a single call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpSegment {
    pub src: SocketAddrV4,
    pub dst: SocketAddrV4,
    pub seqno: u32,
    pub ackno: u32,
    pub flags: TcpFlags,
    /// Receive window advertised by the sender
    pub wnd: u16,
    pub payload: Vec<u8>,
}

impl TcpSegment {
    pub fn new(
        src: SocketAddrV4,
        dst: SocketAddrV4,
        seqno: u32,
        ackno: u32,
        flags: TcpFlags,
        wnd: u16,
    ) -> Self {
        Self {
            src,
            dst,
            seqno,
            ackno,
            flags,
            wnd,
            payload: Vec::new(),
        }
    }

    pub fn with_payload(mut self, data: &[u8]) -> Self {
        self.payload = data.to_vec();
        self
    }

    pub fn payload_len(&self) -> u32 {
        self.payload.len() as u32
    }

    /// Sequence number following the last payload byte (`seq` for control-only segments)
    pub fn seq_end(&self) -> u32 {
        self.seqno.wrapping_add(self.payload_len())
    }

    /// The 4-tuple of the connection this segment belongs to, seen from the receiver
    pub fn four_tuple(&self) -> FourTuple {
        FourTuple::new(self.dst, self.src)
    }
}

impl fmt::Display for TcpSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {} [{}] seq={} ack={} wnd={} len={}",
            self.src,
            self.dst,
            self.flags,
            self.seqno,
            self.ackno,
            self.wnd,
            self.payload.len()
        )
    }
}

/// Reply produced by the engine
///
/// Only the fields the state machine decides; header layout and checksum
/// are the transmission layer's business.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlSegment {
    pub src: SocketAddrV4,
    pub dst: SocketAddrV4,
    pub seqno: u32,
    pub ackno: u32,
    pub flags: TcpFlags,
    pub wnd: u16,
}

/// Why a segment was dropped without a reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Sequence number outside the receive window
    OutOfWindow,
    /// Listening socket has no room for another connection
    BacklogFull,
    /// Reset in a state where it is ignored
    ResetIgnored,
    /// SYN_RECV socket whose listening parent is gone
    NoParent,
    /// Segment starts beyond `rcv_nxt`; nothing can be consumed yet
    OutOfOrder,
    /// No rule of the current state applies
    Unmatched,
    /// No socket to deliver to
    NoSocket,
}

/// Action taken after processing input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputAction {
    /// Segment dropped, nothing sent
    Drop(DropReason),
    /// Reset sent in reply; socket state untouched
    Reset,
    /// Listening socket spawned a child which answered SYN+ACK
    Spawned(SockId),
    /// Socket changed state
    Transition { from: TcpState, to: TcpState },
    /// Payload delivered in ESTABLISHED (count of new bytes, may be zero)
    Delivered(usize),
    /// Socket destroyed; nothing reaches it any more
    Destroyed,
    /// Segment accepted without visible effect
    Accepted,
}
